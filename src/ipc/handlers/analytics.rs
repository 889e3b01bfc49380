use crate::analytics::{self, DEFAULT_WINDOW_DAYS};
use crate::ipc::handlers::setup::{load_section, SetupSection};
use crate::ipc::helpers::{
    as_of, ensure_owner, optional_i64, optional_semester, optional_tahun_ajaran, required_str,
    respond, scoped_guru_id, to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

const MAX_WINDOW_DAYS: i64 = 366;

fn required_guru(req: &Request) -> Result<String, HandlerErr> {
    scoped_guru_id(req, true)?.ok_or_else(|| HandlerErr::bad_params("missing guruId"))
}

/// `days` from the request, else the workspace default window.
fn window_days(conn: &Connection, params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let days = match optional_i64(params, "days")? {
        Some(d) => d,
        None => load_section(conn, SetupSection::Analytics)
            .map_err(HandlerErr::query)?
            .get("defaultWindowDays")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_WINDOW_DAYS),
    };
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(HandlerErr::bad_params(format!(
            "days must be in 1..={}",
            MAX_WINDOW_DAYS
        )));
    }
    Ok(days)
}

fn keterlaksanaan_tp(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = required_guru(req)?;
    let semester = optional_semester(&req.params)?;
    let tahun_ajaran = optional_tahun_ajaran(&req.params)?;
    let today = as_of(&req.params)?;
    let out = analytics::keterlaksanaan_tp(conn, &guru_id, semester, tahun_ajaran.as_deref(), today)?;
    to_json(&out)
}

fn top_absent(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = required_guru(req)?;
    let days = window_days(conn, &req.params)?;
    let out = analytics::top_absent_students(conn, &guru_id, days, as_of(&req.params)?)?;
    to_json(&out)
}

fn tindak_lanjut(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = required_guru(req)?;
    to_json(&analytics::tindak_lanjut_summary(conn, &guru_id)?)
}

fn siswa(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let siswa_id = required_str(&req.params, "siswaId")?;
    let guru_id = scoped_guru_id(req, false)?;
    to_json(&analytics::siswa_analytics(conn, &siswa_id, guru_id.as_deref())?)
}

fn mark_done(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let tag_record_id = required_str(&req.params, "tagRecordId")?;
    let owner: Option<String> = conn
        .query_row(
            "SELECT j.guru_id
             FROM tag_siswa_records t
             JOIN jurnal j ON j.id = t.jurnal_id
             WHERE t.id = ?",
            [&tag_record_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if let Some(owner) = &owner {
        ensure_owner(req, owner)?;
    }

    let out = analytics::mark_tindak_lanjut_done(conn, &tag_record_id, Utc::now())?;
    if out.updated {
        tracing::info!(tag_record_id = %tag_record_id, "tindak lanjut marked done");
    }
    to_json(&out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let body: fn(&Connection, &Request) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "analytics.keterlaksanaanTp" => keterlaksanaan_tp,
            "analytics.topAbsent" => top_absent,
            "analytics.tindakLanjut" => tindak_lanjut,
            "analytics.siswa" => siswa,
            "tags.markDone" => mark_done,
            _ => return None,
        };
    Some(respond(state, req, |conn| body(conn, req)))
}
