use crate::model::{self, StatusAbsensi, TagSiswa};
use crate::store;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const TOP_ABSENT_LIMIT: usize = 10;
pub const SISWA_ABSENSI_LIMIT: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsError {
    pub code: &'static str,
    pub message: String,
}

impl AnalyticsError {
    /// Wraps a store failure with the name of the aggregation being computed.
    pub fn failed(what: &str, cause: impl Display) -> Self {
        Self::with_message(format!("Failed to get {}: {}", what, cause))
    }

    fn with_message(message: String) -> Self {
        Self {
            code: "aggregation_failed",
            message,
        }
    }
}

impl Display for AnalyticsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AnalyticsError {}

pub fn persentase(part: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (100.0 * part as f64 / total as f64).round() as i64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeterlaksanaanTp {
    #[serde(rename = "totalTP")]
    pub total_tp: i64,
    pub terlaksana: i64,
    pub persentase: i64,
    pub semester: i64,
    pub tahun_ajaran: String,
}

pub fn keterlaksanaan_tp(
    conn: &Connection,
    guru_id: &str,
    semester: Option<i64>,
    tahun_ajaran: Option<&str>,
    today: NaiveDate,
) -> Result<KeterlaksanaanTp, AnalyticsError> {
    let semester = semester.unwrap_or_else(|| model::default_semester(today));
    let tahun_ajaran = tahun_ajaran
        .map(|s| s.to_string())
        .unwrap_or_else(|| model::default_tahun_ajaran(today));

    let (total_tp, terlaksana) = count_keterlaksanaan(conn, guru_id, semester, &tahun_ajaran)
        .map_err(|e| AnalyticsError::failed("keterlaksanaan TP", e))?;

    Ok(KeterlaksanaanTp {
        total_tp,
        terlaksana,
        persentase: persentase(terlaksana, total_tp),
        semester,
        tahun_ajaran,
    })
}

pub(crate) fn count_keterlaksanaan(
    conn: &Connection,
    guru_id: &str,
    semester: i64,
    tahun_ajaran: &str,
) -> rusqlite::Result<(i64, i64)> {
    let total_tp: i64 = conn.query_row(
        "SELECT COUNT(*) FROM jadwal WHERE guru_id = ? AND semester = ? AND tahun_ajaran = ?",
        (guru_id, semester, tahun_ajaran),
        |r| r.get(0),
    )?;
    // Duplicate journals for one slot count once.
    let terlaksana: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT j.jadwal_id)
         FROM jurnal j
         JOIN jadwal jd ON jd.id = j.jadwal_id
         WHERE j.guru_id = ? AND jd.semester = ? AND jd.tahun_ajaran = ?",
        (guru_id, semester, tahun_ajaran),
        |r| r.get(0),
    )?;
    Ok((total_tp, terlaksana))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsentStudent {
    pub siswa_id: String,
    pub siswa_name: String,
    pub total_absen: i64,
    pub sakit: i64,
    pub izin: i64,
    pub alpa: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopAbsent {
    pub top_absent_students: Vec<AbsentStudent>,
    pub total_days: i64,
}

pub fn top_absent_students(
    conn: &Connection,
    guru_id: &str,
    days: i64,
    as_of: NaiveDate,
) -> Result<TopAbsent, AnalyticsError> {
    let start = Duration::try_days(days)
        .and_then(|d| as_of.checked_sub_signed(d))
        .ok_or_else(|| {
            AnalyticsError::with_message(format!(
                "Failed to get top absent students: {} days before {} is out of range",
                days, as_of
            ))
        })?;
    let rows = load_non_present(conn, guru_id, &store::date_key(start))
        .map_err(|e| AnalyticsError::failed("top absent students", e))?;

    Ok(TopAbsent {
        top_absent_students: rank_absences(rows),
        total_days: days,
    })
}

fn load_non_present(
    conn: &Connection,
    guru_id: &str,
    start: &str,
) -> rusqlite::Result<Vec<(String, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT a.siswa_id, s.nama, a.status
         FROM absensi a
         JOIN jurnal j ON j.id = a.jurnal_id
         JOIN siswa s ON s.id = a.siswa_id
         WHERE j.guru_id = ? AND j.tanggal >= ? AND a.status <> 'HADIR'
         ORDER BY j.tanggal, j.created_at, a.rowid",
    )?;
    stmt.query_map((guru_id, start), |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

/// Groups non-present rows per student, keeping first-occurrence order so the
/// stable sort leaves ties where they were first seen.
fn rank_absences(rows: Vec<(String, String, String)>) -> Vec<AbsentStudent> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<AbsentStudent> = Vec::new();

    for (siswa_id, siswa_name, status) in rows {
        let status = match StatusAbsensi::parse(&status) {
            Some(StatusAbsensi::Hadir) | None => continue,
            Some(s) => s,
        };
        let i = *index.entry(siswa_id.clone()).or_insert_with(|| {
            out.push(AbsentStudent {
                siswa_id,
                siswa_name,
                total_absen: 0,
                sakit: 0,
                izin: 0,
                alpa: 0,
            });
            out.len() - 1
        });
        let entry = &mut out[i];
        match status {
            StatusAbsensi::Sakit => entry.sakit += 1,
            StatusAbsensi::Izin => entry.izin += 1,
            StatusAbsensi::Alpa => entry.alpa += 1,
            StatusAbsensi::Hadir => {}
        }
        entry.total_absen += 1;
    }

    out.sort_by(|a, b| b.total_absen.cmp(&a.total_absen));
    out.truncate(TOP_ABSENT_LIMIT);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TindakLanjutItem {
    pub id: String,
    pub siswa_id: String,
    pub siswa_name: String,
    pub tag: TagSiswa,
    pub jurnal_id: String,
    pub tanggal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keterangan: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TindakLanjutSummary {
    pub perlu_remedial: i64,
    pub perlu_pengayaan: i64,
    pub masalah_perilaku: i64,
    #[serde(rename = "rujukBK")]
    pub rujuk_bk: i64,
    pub items: Vec<TindakLanjutItem>,
}

pub fn tindak_lanjut_summary(
    conn: &Connection,
    guru_id: &str,
) -> Result<TindakLanjutSummary, AnalyticsError> {
    let items = load_unresolved_tags(conn, guru_id)
        .map_err(|e| AnalyticsError::failed("tindak lanjut summary", e))?;

    let mut summary = TindakLanjutSummary::default();
    for item in &items {
        match item.tag {
            TagSiswa::PerluRemedial => summary.perlu_remedial += 1,
            TagSiswa::PerluPengayaan => summary.perlu_pengayaan += 1,
            TagSiswa::MasalahPerilaku => summary.masalah_perilaku += 1,
            TagSiswa::RujukBk => summary.rujuk_bk += 1,
        }
    }
    summary.items = items;
    Ok(summary)
}

fn load_unresolved_tags(conn: &Connection, guru_id: &str) -> rusqlite::Result<Vec<TindakLanjutItem>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.siswa_id, s.nama, t.tag, t.jurnal_id, j.tanggal, t.keterangan
         FROM tag_siswa_records t
         JOIN jurnal j ON j.id = t.jurnal_id
         JOIN siswa s ON s.id = t.siswa_id
         WHERE j.guru_id = ? AND t.ditindaklanjuti = 0
         ORDER BY t.created_at DESC, t.rowid DESC",
    )?;
    let rows = stmt
        .query_map([guru_id], |r| {
            let tag: String = r.get(3)?;
            Ok((
                tag,
                TindakLanjutItem {
                    id: r.get(0)?,
                    siswa_id: r.get(1)?,
                    siswa_name: r.get(2)?,
                    tag: TagSiswa::PerluRemedial,
                    jurnal_id: r.get(4)?,
                    tanggal: r.get(5)?,
                    keterangan: r.get(6)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Rows carrying an unknown tag cannot be tallied and are left out of both
    // the counts and the list.
    Ok(rows
        .into_iter()
        .filter_map(|(raw, mut item)| {
            item.tag = TagSiswa::parse(&raw)?;
            Some(item)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkDone {
    pub id: String,
    pub updated: bool,
}

/// Idempotent: re-marking keeps the first resolution timestamp.
pub fn mark_tindak_lanjut_done(
    conn: &Connection,
    tag_record_id: &str,
    now: DateTime<Utc>,
) -> Result<MarkDone, AnalyticsError> {
    let changed = conn
        .execute(
            "UPDATE tag_siswa_records
             SET ditindaklanjuti = 1,
                 ditindaklanjuti_at = COALESCE(ditindaklanjuti_at, ?)
             WHERE id = ?",
            (store::timestamp(now), tag_record_id),
        )
        .map_err(|e| AnalyticsError::with_message(format!("Failed to mark tindak lanjut: {}", e)))?;
    Ok(MarkDone {
        id: tag_record_id.to_string(),
        updated: changed > 0,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiswaInfo {
    pub id: String,
    pub nama: String,
    pub kelas_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiswaAbsensiRow {
    pub jurnal_id: String,
    pub tanggal: String,
    pub status: StatusAbsensi,
    pub guru_id: String,
    pub mapel: String,
    pub kelas: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiswaTagRow {
    pub id: String,
    pub jurnal_id: String,
    pub tanggal: String,
    pub tag: TagSiswa,
    pub ditindaklanjuti: bool,
    pub keterangan: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AbsensiTally {
    pub hadir: i64,
    pub sakit: i64,
    pub izin: i64,
    pub alpa: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiswaAnalytics {
    pub siswa: Option<SiswaInfo>,
    pub absensi: Vec<SiswaAbsensiRow>,
    pub tags: Vec<SiswaTagRow>,
    pub summary: AbsensiTally,
}

/// Drill-down for one student. The tally covers only the returned (most
/// recent) attendance rows, not all-time totals.
pub fn siswa_analytics(
    conn: &Connection,
    siswa_id: &str,
    guru_id: Option<&str>,
) -> Result<SiswaAnalytics, AnalyticsError> {
    let wrap = |e: rusqlite::Error| AnalyticsError::failed("siswa analytics", e);

    let siswa = conn
        .query_row(
            "SELECT id, nama, kelas_id FROM siswa WHERE id = ?",
            [siswa_id],
            |r| {
                Ok(SiswaInfo {
                    id: r.get(0)?,
                    nama: r.get(1)?,
                    kelas_id: r.get(2)?,
                })
            },
        )
        .optional()
        .map_err(wrap)?;
    let absensi = load_siswa_absensi(conn, siswa_id, guru_id).map_err(wrap)?;
    let tags = load_siswa_tags(conn, siswa_id, guru_id).map_err(wrap)?;

    let mut summary = AbsensiTally::default();
    for row in &absensi {
        match row.status {
            StatusAbsensi::Hadir => summary.hadir += 1,
            StatusAbsensi::Sakit => summary.sakit += 1,
            StatusAbsensi::Izin => summary.izin += 1,
            StatusAbsensi::Alpa => summary.alpa += 1,
        }
    }

    Ok(SiswaAnalytics {
        siswa,
        absensi,
        tags,
        summary,
    })
}

fn load_siswa_absensi(
    conn: &Connection,
    siswa_id: &str,
    guru_id: Option<&str>,
) -> rusqlite::Result<Vec<SiswaAbsensiRow>> {
    let mut stmt = conn.prepare(
        "SELECT j.id, j.tanggal, a.status, j.guru_id, m.nama, k.nama
         FROM absensi a
         JOIN jurnal j ON j.id = a.jurnal_id
         JOIN jadwal jd ON jd.id = j.jadwal_id
         JOIN mata_pelajaran m ON m.id = jd.mapel_id
         JOIN kelas k ON k.id = jd.kelas_id
         WHERE a.siswa_id = ?1 AND (?2 IS NULL OR j.guru_id = ?2)
         ORDER BY j.tanggal DESC, j.created_at DESC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![siswa_id, guru_id, SISWA_ABSENSI_LIMIT], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(jurnal_id, tanggal, status, guru_id, mapel, kelas)| {
            Some(SiswaAbsensiRow {
                jurnal_id,
                tanggal,
                status: StatusAbsensi::parse(&status)?,
                guru_id,
                mapel,
                kelas,
            })
        })
        .collect())
}

fn load_siswa_tags(
    conn: &Connection,
    siswa_id: &str,
    guru_id: Option<&str>,
) -> rusqlite::Result<Vec<SiswaTagRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.jurnal_id, j.tanggal, t.tag, t.ditindaklanjuti, t.keterangan, t.created_at
         FROM tag_siswa_records t
         JOIN jurnal j ON j.id = t.jurnal_id
         WHERE t.siswa_id = ?1 AND (?2 IS NULL OR j.guru_id = ?2)
         ORDER BY t.created_at DESC, t.rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![siswa_id, guru_id], |r| {
            Ok((
                r.get::<_, String>(3)?,
                SiswaTagRow {
                    id: r.get(0)?,
                    jurnal_id: r.get(1)?,
                    tanggal: r.get(2)?,
                    tag: TagSiswa::PerluRemedial,
                    ditindaklanjuti: r.get::<_, i64>(4)? != 0,
                    keterangan: r.get(5)?,
                    created_at: r.get(6)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(raw, mut row)| {
            row.tag = TagSiswa::parse(&raw)?;
            Some(row)
        })
        .collect())
}
