use crate::ipc::helpers::{
    admin_only, as_of, optional_date, optional_semester, optional_str, optional_tahun_ajaran,
    to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use rusqlite::Connection;
use serde_json::Value;

fn kepatuhan(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let semester = optional_semester(params)?;
    let tahun_ajaran = optional_tahun_ajaran(params)?;
    let out = reports::kepatuhan_guru(conn, semester, tahun_ajaran.as_deref(), as_of(params)?)?;
    to_json(&out)
}

fn ketercapaian(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let guru_id = optional_str(params, "guruId")?;
    let from = optional_date(params, "from")?;
    let to = optional_date(params, "to")?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(HandlerErr::bad_params("from must not be after to"));
        }
    }
    let out = reports::rekap_ketercapaian(conn, guru_id.as_deref(), from, to)?;
    to_json(&out)
}

fn dashboard(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let out = reports::dashboard_admin(conn, as_of(params)?)?;
    to_json(&out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.kepatuhan" => Some(admin_only(state, req, kepatuhan)),
        "reports.ketercapaian" => Some(admin_only(state, req, ketercapaian)),
        "reports.dashboard" => Some(admin_only(state, req, dashboard)),
        _ => None,
    }
}
