use crate::ipc::helpers::{
    admin_only, optional_i64, optional_str, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, HandlerErr> {
    conn.query_row(sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
        .map_err(HandlerErr::query)
}

fn count(conn: &Connection, sql: &str, id: &str) -> Result<i64, HandlerErr> {
    conn.query_row(sql, [id], |r| r.get(0))
        .map_err(HandlerErr::query)
}

fn optional_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

fn guru_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let include_inactive = optional_bool(params, "includeInactive")?.unwrap_or(false);
    let mut stmt = conn
        .prepare(
            "SELECT id, nip, nama, email, active
             FROM guru
             WHERE active = 1 OR ?
             ORDER BY nama",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([include_inactive], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "nip": r.get::<_, Option<String>>(1)?,
                "nama": r.get::<_, String>(2)?,
                "email": r.get::<_, Option<String>>(3)?,
                "active": r.get::<_, i64>(4)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "guru": rows }))
}

fn guru_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let g = store::NewGuru {
        nip: optional_str(params, "nip")?,
        nama: required_str(params, "nama")?,
        email: optional_str(params, "email")?,
    };
    let id = store::insert_guru(conn, &g, chrono::Utc::now())
        .map_err(|e| HandlerErr::with_table("db_insert_failed", e, "guru"))?;
    tracing::info!(guru_id = %id, "guru created");
    Ok(json!({ "guruId": id, "nama": g.nama }))
}

fn guru_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = required_str(params, "guruId")?;
    let current = conn
        .query_row(
            "SELECT nip, nama, email, active FROM guru WHERE id = ?",
            [&guru_id],
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, i64>(3)? != 0,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((nip, nama, email, active)) = current else {
        return Err(HandlerErr::new("not_found", "guru not found"));
    };

    // Explicit null clears optional fields; omitted keys keep the stored value.
    let nip = if params.get("nip").is_some() { optional_str(params, "nip")? } else { nip };
    let email = if params.get("email").is_some() { optional_str(params, "email")? } else { email };
    let nama = if params.get("nama").is_some() { required_str(params, "nama")? } else { nama };
    let active = optional_bool(params, "active")?.unwrap_or(active);

    conn.execute(
        "UPDATE guru SET nip = ?, nama = ?, email = ?, active = ? WHERE id = ?",
        (&nip, &nama, &email, active, &guru_id),
    )
    .map_err(|e| HandlerErr::with_table("db_update_failed", e, "guru"))?;
    Ok(json!({ "guruId": guru_id, "nip": nip, "nama": nama, "email": email, "active": active }))
}

fn guru_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = required_str(params, "guruId")?;
    if !exists(conn, "SELECT 1 FROM guru WHERE id = ?", &guru_id)? {
        return Err(HandlerErr::new("not_found", "guru not found"));
    }
    let jadwal = count(conn, "SELECT COUNT(*) FROM jadwal WHERE guru_id = ?", &guru_id)?;
    if jadwal > 0 {
        return Err(HandlerErr {
            code: "in_use",
            message: "guru still has jadwal; deactivate instead".to_string(),
            details: Some(json!({ "jadwalCount": jadwal })),
        });
    }
    conn.execute("DELETE FROM guru WHERE id = ?", [&guru_id])
        .map_err(|e| HandlerErr::with_table("db_delete_failed", e, "guru"))?;
    tracing::info!(guru_id = %guru_id, "guru deleted");
    Ok(json!({ "ok": true }))
}

fn mapel_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, kode, nama FROM mata_pelajaran ORDER BY nama")
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "kode": r.get::<_, String>(1)?,
                "nama": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "mapel": rows }))
}

fn mapel_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kode = required_str(params, "kode")?.to_ascii_uppercase();
    let nama = required_str(params, "nama")?;
    let id = store::insert_mapel(conn, &kode, &nama)
        .map_err(|e| HandlerErr::with_table("db_insert_failed", e, "mata_pelajaran"))?;
    Ok(json!({ "mapelId": id, "kode": kode, "nama": nama }))
}

fn mapel_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mapel_id = required_str(params, "mapelId")?;
    let current = conn
        .query_row(
            "SELECT kode, nama FROM mata_pelajaran WHERE id = ?",
            [&mapel_id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((kode, nama)) = current else {
        return Err(HandlerErr::new("not_found", "mapel not found"));
    };
    let kode = match optional_str(params, "kode")? {
        Some(k) => k.to_ascii_uppercase(),
        None => kode,
    };
    let nama = optional_str(params, "nama")?.unwrap_or(nama);
    conn.execute(
        "UPDATE mata_pelajaran SET kode = ?, nama = ? WHERE id = ?",
        (&kode, &nama, &mapel_id),
    )
    .map_err(|e| HandlerErr::with_table("db_update_failed", e, "mata_pelajaran"))?;
    Ok(json!({ "mapelId": mapel_id, "kode": kode, "nama": nama }))
}

fn mapel_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mapel_id = required_str(params, "mapelId")?;
    if !exists(conn, "SELECT 1 FROM mata_pelajaran WHERE id = ?", &mapel_id)? {
        return Err(HandlerErr::new("not_found", "mapel not found"));
    }
    let jadwal = count(conn, "SELECT COUNT(*) FROM jadwal WHERE mapel_id = ?", &mapel_id)?;
    if jadwal > 0 {
        return Err(HandlerErr {
            code: "in_use",
            message: "mapel is referenced by jadwal".to_string(),
            details: Some(json!({ "jadwalCount": jadwal })),
        });
    }
    conn.execute("DELETE FROM mata_pelajaran WHERE id = ?", [&mapel_id])
        .map_err(|e| HandlerErr::with_table("db_delete_failed", e, "mata_pelajaran"))?;
    Ok(json!({ "ok": true }))
}

fn kelas_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT
               k.id,
               k.nama,
               k.tingkat,
               (SELECT COUNT(*) FROM siswa s WHERE s.kelas_id = k.id) AS siswa_count
             FROM kelas k
             ORDER BY k.nama",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "nama": r.get::<_, String>(1)?,
                "tingkat": r.get::<_, Option<i64>>(2)?,
                "siswaCount": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "kelas": rows }))
}

fn kelas_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let nama = required_str(params, "nama")?;
    let tingkat = optional_i64(params, "tingkat")?;
    if let Some(t) = tingkat {
        if !(1..=12).contains(&t) {
            return Err(HandlerErr::bad_params("tingkat must be in 1..=12"));
        }
    }
    let id = store::insert_kelas(conn, &nama, tingkat)
        .map_err(|e| HandlerErr::with_table("db_insert_failed", e, "kelas"))?;
    Ok(json!({ "kelasId": id, "nama": nama, "tingkat": tingkat }))
}

fn siswa_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kelas_id = optional_str(params, "kelasId")?;
    let mut stmt = conn
        .prepare(
            "SELECT id, nis, nama, kelas_id
             FROM siswa
             WHERE ?1 IS NULL OR kelas_id = ?1
             ORDER BY nama",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([&kelas_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "nis": r.get::<_, Option<String>>(1)?,
                "nama": r.get::<_, String>(2)?,
                "kelasId": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "siswa": rows }))
}

fn siswa_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let nama = required_str(params, "nama")?;
    let kelas_id = required_str(params, "kelasId")?;
    let nis = optional_str(params, "nis")?;
    if !exists(conn, "SELECT 1 FROM kelas WHERE id = ?", &kelas_id)? {
        return Err(HandlerErr::new("not_found", "kelas not found"));
    }
    let id = store::insert_siswa(conn, nis.as_deref(), &nama, &kelas_id)
        .map_err(|e| HandlerErr::with_table("db_insert_failed", e, "siswa"))?;
    Ok(json!({ "siswaId": id, "nama": nama, "kelasId": kelas_id }))
}

fn siswa_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let siswa_id = required_str(params, "siswaId")?;
    let current = conn
        .query_row(
            "SELECT nis, nama, kelas_id FROM siswa WHERE id = ?",
            [&siswa_id],
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((nis, nama, kelas_id)) = current else {
        return Err(HandlerErr::new("not_found", "siswa not found"));
    };
    let nis = if params.get("nis").is_some() { optional_str(params, "nis")? } else { nis };
    let nama = optional_str(params, "nama")?.unwrap_or(nama);
    let kelas_id = match optional_str(params, "kelasId")? {
        Some(k) => {
            if !exists(conn, "SELECT 1 FROM kelas WHERE id = ?", &k)? {
                return Err(HandlerErr::new("not_found", "kelas not found"));
            }
            k
        }
        None => kelas_id,
    };
    conn.execute(
        "UPDATE siswa SET nis = ?, nama = ?, kelas_id = ? WHERE id = ?",
        (&nis, &nama, &kelas_id, &siswa_id),
    )
    .map_err(|e| HandlerErr::with_table("db_update_failed", e, "siswa"))?;
    Ok(json!({ "siswaId": siswa_id, "nis": nis, "nama": nama, "kelasId": kelas_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "guru.list" => respond(state, req, |conn| guru_list(conn, &req.params)),
        "guru.create" => admin_only(state, req, guru_create),
        "guru.update" => admin_only(state, req, guru_update),
        "guru.delete" => admin_only(state, req, guru_delete),
        "mapel.list" => respond(state, req, mapel_list),
        "mapel.create" => admin_only(state, req, mapel_create),
        "mapel.update" => admin_only(state, req, mapel_update),
        "mapel.delete" => admin_only(state, req, mapel_delete),
        "kelas.list" => respond(state, req, kelas_list),
        "kelas.create" => admin_only(state, req, kelas_create),
        "siswa.list" => respond(state, req, |conn| siswa_list(conn, &req.params)),
        "siswa.create" => admin_only(state, req, siswa_create),
        "siswa.update" => admin_only(state, req, siswa_update),
        _ => return None,
    };
    Some(resp)
}
