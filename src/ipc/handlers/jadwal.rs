use crate::ipc::helpers::{
    admin_only, optional_i64, optional_semester, optional_tahun_ajaran, required_str, respond,
    scoped_guru_id, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model;
use crate::store;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;

fn jadwal_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = scoped_guru_id(req, false)?;
    let semester = optional_semester(&req.params)?;
    let tahun_ajaran = optional_tahun_ajaran(&req.params)?;

    let mut stmt = conn
        .prepare(
            "SELECT jd.id, jd.guru_id, g.nama, jd.kelas_id, k.nama, jd.mapel_id, m.nama,
                    jd.semester, jd.tahun_ajaran, jd.hari, jd.jam_mulai, jd.jam_selesai,
                    (SELECT COUNT(*) FROM jurnal j WHERE j.jadwal_id = jd.id) AS jurnal_count
             FROM jadwal jd
             JOIN guru g ON g.id = jd.guru_id
             JOIN kelas k ON k.id = jd.kelas_id
             JOIN mata_pelajaran m ON m.id = jd.mapel_id
             WHERE (?1 IS NULL OR jd.guru_id = ?1)
               AND (?2 IS NULL OR jd.semester = ?2)
               AND (?3 IS NULL OR jd.tahun_ajaran = ?3)
             ORDER BY jd.hari, jd.jam_mulai, k.nama",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map(params![guru_id, semester, tahun_ajaran], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "guruId": r.get::<_, String>(1)?,
                "guruNama": r.get::<_, String>(2)?,
                "kelasId": r.get::<_, String>(3)?,
                "kelasNama": r.get::<_, String>(4)?,
                "mapelId": r.get::<_, String>(5)?,
                "mapelNama": r.get::<_, String>(6)?,
                "semester": r.get::<_, i64>(7)?,
                "tahunAjaran": r.get::<_, String>(8)?,
                "hari": r.get::<_, i64>(9)?,
                "jamMulai": r.get::<_, String>(10)?,
                "jamSelesai": r.get::<_, String>(11)?,
                "jurnalCount": r.get::<_, i64>(12)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "jadwal": rows }))
}

fn ensure_exists(conn: &Connection, table: &str, id: &str, what: &str) -> Result<(), HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found = conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map_err(HandlerErr::query)?;
    if found.is_none() {
        return Err(HandlerErr::new("not_found", format!("{} not found", what)));
    }
    Ok(())
}

fn jadwal_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = required_str(params, "guruId")?;
    let kelas_id = required_str(params, "kelasId")?;
    let mapel_id = required_str(params, "mapelId")?;
    let Some(semester) = optional_semester(params)? else {
        return Err(HandlerErr::bad_params("missing semester"));
    };
    let Some(tahun_ajaran) = optional_tahun_ajaran(params)? else {
        return Err(HandlerErr::bad_params("missing tahunAjaran"));
    };
    let hari = optional_i64(params, "hari")?.ok_or_else(|| HandlerErr::bad_params("missing hari"))?;
    if !(1..=7).contains(&hari) {
        return Err(HandlerErr::bad_params("hari must be in 1..=7"));
    }
    let jam_mulai = required_str(params, "jamMulai")?;
    let jam_selesai = required_str(params, "jamSelesai")?;
    if !model::is_valid_jam(&jam_mulai) || !model::is_valid_jam(&jam_selesai) {
        return Err(HandlerErr::bad_params("jamMulai/jamSelesai must be HH:MM"));
    }
    // Zero-padded HH:MM compares correctly as text.
    if jam_mulai >= jam_selesai {
        return Err(HandlerErr::bad_params("jamMulai must be before jamSelesai"));
    }

    ensure_exists(conn, "guru", &guru_id, "guru")?;
    ensure_exists(conn, "kelas", &kelas_id, "kelas")?;
    ensure_exists(conn, "mata_pelajaran", &mapel_id, "mapel")?;

    let id = store::insert_jadwal(
        conn,
        &store::NewJadwal {
            guru_id,
            kelas_id,
            mapel_id,
            semester,
            tahun_ajaran,
            hari,
            jam_mulai,
            jam_selesai,
        },
    )
    .map_err(|e| HandlerErr::with_table("db_insert_failed", e, "jadwal"))?;
    Ok(json!({ "jadwalId": id }))
}

fn jadwal_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let jadwal_id = required_str(params, "jadwalId")?;
    ensure_exists(conn, "jadwal", &jadwal_id, "jadwal")?;
    let jurnal: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM jurnal WHERE jadwal_id = ?",
            [&jadwal_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    if jurnal > 0 {
        return Err(HandlerErr {
            code: "in_use",
            message: "jadwal already has jurnal entries".to_string(),
            details: Some(json!({ "jurnalCount": jurnal })),
        });
    }
    conn.execute("DELETE FROM jadwal WHERE id = ?", [&jadwal_id])
        .map_err(|e| HandlerErr::with_table("db_delete_failed", e, "jadwal"))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "jadwal.list" => respond(state, req, |conn| jadwal_list(conn, req)),
        "jadwal.create" => admin_only(state, req, jadwal_create),
        "jadwal.delete" => admin_only(state, req, jadwal_delete),
        _ => return None,
    };
    Some(resp)
}
