use crate::analytics::DEFAULT_WINDOW_DAYS;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_admin;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
pub enum SetupSection {
    Sekolah,
    Jurnal,
    Analytics,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "sekolah" => Some(Self::Sekolah),
            "jurnal" => Some(Self::Jurnal),
            "analytics" => Some(Self::Analytics),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Sekolah => "setup.sekolah",
            Self::Jurnal => "setup.jurnal",
            Self::Analytics => "setup.analytics",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Sekolah => json!({
            "namaSekolah": "",
            "kepalaSekolah": "",
            "alamat": ""
        }),
        SetupSection::Jurnal => json!({
            "requireRefleksi": false,
            "maxBackdateDays": null
        }),
        SetupSection::Analytics => json!({
            "defaultWindowDays": DEFAULT_WINDOW_DAYS
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Sekolah => match k.as_str() {
                "namaSekolah" | "kepalaSekolah" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "alamat" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 300)?));
                }
                _ => return Err(format!("unknown sekolah field: {}", k)),
            },
            SetupSection::Jurnal => match k.as_str() {
                "requireRefleksi" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "maxBackdateDays" => {
                    let n = if v.is_null() {
                        Value::Null
                    } else {
                        Value::from(parse_i64_range(v, k, 0, 366)?)
                    };
                    obj.insert(k.clone(), n);
                }
                _ => return Err(format!("unknown jurnal field: {}", k)),
            },
            SetupSection::Analytics => match k.as_str() {
                "defaultWindowDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 366)?));
                }
                _ => return Err(format!("unknown analytics field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values must not block setup reads.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.key(), error = %e, "saved settings partly ignored");
            }
        }
    }
    Ok(current)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for (name, section) in [
        ("sekolah", SetupSection::Sekolah),
        ("jurnal", SetupSection::Jurnal),
        ("analytics", SetupSection::Analytics),
    ] {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(name.to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(req) {
        return e.response(&req.id);
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.key(), "settings updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
