use crate::ipc::handlers::setup::{load_section, SetupSection};
use crate::ipc::helpers::{
    ensure_owner, optional_date, optional_i64, optional_str, required_str, respond,
    scoped_guru_id, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{StatusAbsensi, StatusKetercapaian, TagSiswa};
use crate::store::{self, NewJurnal, NewTag};
use chrono::{Duration, Local, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

fn parse_absensi(params: &serde_json::Value) -> Result<Vec<(String, StatusAbsensi)>, HandlerErr> {
    let Some(raw) = params.get("absensi") else {
        return Ok(Vec::new());
    };
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("absensi must be an array"));
    };
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let siswa_id = required_str(item, "siswaId")
            .map_err(|_| HandlerErr::bad_params(format!("absensi[{}].siswaId is required", i)))?;
        let status = item
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(StatusAbsensi::parse)
            .ok_or_else(|| {
                HandlerErr::bad_params(format!(
                    "absensi[{}].status must be one of HADIR, SAKIT, IZIN, ALPA",
                    i
                ))
            })?;
        if !seen.insert(siswa_id.clone()) {
            return Err(HandlerErr::bad_params(format!(
                "absensi lists siswa {} more than once",
                siswa_id
            )));
        }
        out.push((siswa_id, status));
    }
    Ok(out)
}

fn parse_tags(params: &serde_json::Value) -> Result<Vec<NewTag>, HandlerErr> {
    let Some(raw) = params.get("tags") else {
        return Ok(Vec::new());
    };
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("tags must be an array"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let siswa_id = required_str(item, "siswaId")
                .map_err(|_| HandlerErr::bad_params(format!("tags[{}].siswaId is required", i)))?;
            let tag = item
                .get("tag")
                .and_then(|v| v.as_str())
                .and_then(TagSiswa::parse)
                .ok_or_else(|| HandlerErr::bad_params(format!("tags[{}].tag is not a known tag", i)))?;
            Ok(NewTag {
                siswa_id,
                tag,
                keterangan: optional_str(item, "keterangan")?,
            })
        })
        .collect()
}

fn kelas_members(conn: &Connection, kelas_id: &str) -> Result<HashSet<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id FROM siswa WHERE kelas_id = ?")
        .map_err(HandlerErr::query)?;
    stmt.query_map([kelas_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<HashSet<_>, _>>())
        .map_err(HandlerErr::query)
}

fn jurnal_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let params = &req.params;
    let jadwal_id = required_str(params, "jadwalId")?;
    let tanggal = optional_date(params, "tanggal")?
        .ok_or_else(|| HandlerErr::bad_params("missing tanggal"))?;
    let status_ketercapaian = params
        .get("statusKetercapaian")
        .and_then(|v| v.as_str())
        .and_then(StatusKetercapaian::parse)
        .ok_or_else(|| {
            HandlerErr::bad_params(
                "statusKetercapaian must be one of TERCAPAI, SEBAGIAN_TERCAPAI, TIDAK_TERCAPAI",
            )
        })?;
    let new = NewJurnal {
        jadwal_id,
        tanggal,
        tujuan_pembelajaran: required_str(params, "tujuanPembelajaran")?,
        kegiatan: required_str(params, "kegiatan")?,
        penilaian: required_str(params, "penilaian")?,
        status_ketercapaian,
        refleksi: optional_str(params, "refleksi")?,
        kendala: optional_str(params, "kendala")?,
        solusi: optional_str(params, "solusi")?,
        absensi: parse_absensi(params)?,
        tags: parse_tags(params)?,
    };

    let jadwal = store::jadwal_ref(conn, &new.jadwal_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::new("not_found", "jadwal not found"))?;
    ensure_owner(req, &jadwal.guru_id)?;

    let rules = load_section(conn, SetupSection::Jurnal).map_err(HandlerErr::query)?;
    if rules["requireRefleksi"].as_bool() == Some(true) && new.refleksi.is_none() {
        return Err(HandlerErr::bad_params("refleksi is required"));
    }
    if let Some(max_days) = rules["maxBackdateDays"].as_i64() {
        let earliest = Local::now().date_naive() - Duration::days(max_days);
        if new.tanggal < earliest {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("tanggal is more than {} days in the past", max_days),
                details: Some(json!({ "earliest": store::date_key(earliest) })),
            });
        }
    }

    let members = kelas_members(conn, &jadwal.kelas_id)?;
    let outsiders: Vec<&str> = new
        .absensi
        .iter()
        .map(|(id, _)| id.as_str())
        .chain(new.tags.iter().map(|t| t.siswa_id.as_str()))
        .filter(|id| !members.contains(*id))
        .collect();
    if !outsiders.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "siswa does not belong to the jadwal's kelas".to_string(),
            details: Some(json!({ "siswaIds": outsiders })),
        });
    }

    let jurnal_id = store::insert_jurnal(conn, &new, Utc::now())
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tracing::info!(
        jurnal_id = %jurnal_id,
        guru_id = %jadwal.guru_id,
        absensi = new.absensi.len(),
        tags = new.tags.len(),
        "jurnal submitted"
    );
    Ok(json!({
        "jurnalId": jurnal_id,
        "guruId": jadwal.guru_id,
        "absensiCount": new.absensi.len(),
        "tagCount": new.tags.len(),
    }))
}

fn jurnal_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let jurnal_id = required_str(&req.params, "jurnalId")?;
    let jurnal = conn
        .query_row(
            "SELECT j.id, j.jadwal_id, j.guru_id, j.tanggal, j.tujuan_pembelajaran, j.kegiatan,
                    j.penilaian, j.status_ketercapaian, j.refleksi, j.kendala, j.solusi, j.created_at,
                    m.nama, k.nama
             FROM jurnal j
             JOIN jadwal jd ON jd.id = j.jadwal_id
             JOIN mata_pelajaran m ON m.id = jd.mapel_id
             JOIN kelas k ON k.id = jd.kelas_id
             WHERE j.id = ?",
            [&jurnal_id],
            |r| {
                Ok((
                    r.get::<_, String>(2)?,
                    json!({
                        "id": r.get::<_, String>(0)?,
                        "jadwalId": r.get::<_, String>(1)?,
                        "guruId": r.get::<_, String>(2)?,
                        "tanggal": r.get::<_, String>(3)?,
                        "tujuanPembelajaran": r.get::<_, String>(4)?,
                        "kegiatan": r.get::<_, String>(5)?,
                        "penilaian": r.get::<_, String>(6)?,
                        "statusKetercapaian": r.get::<_, String>(7)?,
                        "refleksi": r.get::<_, Option<String>>(8)?,
                        "kendala": r.get::<_, Option<String>>(9)?,
                        "solusi": r.get::<_, Option<String>>(10)?,
                        "createdAt": r.get::<_, String>(11)?,
                        "mapel": r.get::<_, String>(12)?,
                        "kelas": r.get::<_, String>(13)?,
                    }),
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((guru_id, mut jurnal)) = jurnal else {
        return Err(HandlerErr::new("not_found", "jurnal not found"));
    };
    ensure_owner(req, &guru_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT a.siswa_id, s.nama, a.status
             FROM absensi a
             JOIN siswa s ON s.id = a.siswa_id
             WHERE a.jurnal_id = ?
             ORDER BY s.nama",
        )
        .map_err(HandlerErr::query)?;
    let absensi = stmt
        .query_map([&jurnal_id], |r| {
            Ok(json!({
                "siswaId": r.get::<_, String>(0)?,
                "siswaName": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.siswa_id, s.nama, t.tag, t.ditindaklanjuti, t.keterangan
             FROM tag_siswa_records t
             JOIN siswa s ON s.id = t.siswa_id
             WHERE t.jurnal_id = ?
             ORDER BY s.nama, t.rowid",
        )
        .map_err(HandlerErr::query)?;
    let tags = stmt
        .query_map([&jurnal_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "siswaId": r.get::<_, String>(1)?,
                "siswaName": r.get::<_, String>(2)?,
                "tag": r.get::<_, String>(3)?,
                "ditindaklanjuti": r.get::<_, i64>(4)? != 0,
                "keterangan": r.get::<_, Option<String>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    jurnal["absensi"] = json!(absensi);
    jurnal["tags"] = json!(tags);
    Ok(json!({ "jurnal": jurnal }))
}

fn jurnal_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let guru_id = scoped_guru_id(req, false)?;
    let from = optional_date(&req.params, "from")?.map(store::date_key);
    let to = optional_date(&req.params, "to")?.map(store::date_key);
    let limit = optional_i64(&req.params, "limit")?.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(HandlerErr::bad_params(format!(
            "limit must be in 1..={}",
            MAX_LIST_LIMIT
        )));
    }

    let mut stmt = conn
        .prepare(
            "SELECT j.id, j.jadwal_id, j.guru_id, j.tanggal, j.status_ketercapaian,
                    m.nama, k.nama,
                    (SELECT COUNT(*) FROM absensi a WHERE a.jurnal_id = j.id AND a.status <> 'HADIR')
             FROM jurnal j
             JOIN jadwal jd ON jd.id = j.jadwal_id
             JOIN mata_pelajaran m ON m.id = jd.mapel_id
             JOIN kelas k ON k.id = jd.kelas_id
             WHERE (?1 IS NULL OR j.guru_id = ?1)
               AND (?2 IS NULL OR j.tanggal >= ?2)
               AND (?3 IS NULL OR j.tanggal <= ?3)
             ORDER BY j.tanggal DESC, j.created_at DESC
             LIMIT ?4",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map(params![guru_id, from, to, limit], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "jadwalId": r.get::<_, String>(1)?,
                "guruId": r.get::<_, String>(2)?,
                "tanggal": r.get::<_, String>(3)?,
                "statusKetercapaian": r.get::<_, String>(4)?,
                "mapel": r.get::<_, String>(5)?,
                "kelas": r.get::<_, String>(6)?,
                "tidakHadirCount": r.get::<_, i64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "jurnal": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "jurnal.create" => respond(state, req, |conn| jurnal_create(conn, req)),
        "jurnal.get" => respond(state, req, |conn| jurnal_get(conn, req)),
        "jurnal.list" => respond(state, req, |conn| jurnal_list(conn, req)),
        _ => return None,
    };
    Some(resp)
}
