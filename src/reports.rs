//! Admin roll-ups across teachers: compliance, achievement recap and the
//! dashboard counters.

use crate::analytics::{count_keterlaksanaan, persentase, AnalyticsError};
use crate::model::{self, StatusKetercapaian};
use crate::store;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KepatuhanRow {
    pub guru_id: String,
    pub nama: String,
    #[serde(rename = "totalTP")]
    pub total_tp: i64,
    pub terlaksana: i64,
    pub persentase: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kepatuhan {
    pub semester: i64,
    pub tahun_ajaran: String,
    pub rows: Vec<KepatuhanRow>,
}

/// Completion rate of every active teacher, least compliant first.
pub fn kepatuhan_guru(
    conn: &Connection,
    semester: Option<i64>,
    tahun_ajaran: Option<&str>,
    today: NaiveDate,
) -> Result<Kepatuhan, AnalyticsError> {
    let semester = semester.unwrap_or_else(|| model::default_semester(today));
    let tahun_ajaran = tahun_ajaran
        .map(|s| s.to_string())
        .unwrap_or_else(|| model::default_tahun_ajaran(today));
    let wrap = |e: rusqlite::Error| AnalyticsError::failed("laporan kepatuhan", e);

    let mut stmt = conn
        .prepare("SELECT id, nama FROM guru WHERE active = 1 ORDER BY nama")
        .map_err(wrap)?;
    let gurus = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(wrap)?;

    let mut rows = Vec::with_capacity(gurus.len());
    for (guru_id, nama) in gurus {
        let (total_tp, terlaksana) =
            count_keterlaksanaan(conn, &guru_id, semester, &tahun_ajaran).map_err(wrap)?;
        rows.push(KepatuhanRow {
            guru_id,
            nama,
            total_tp,
            terlaksana,
            persentase: persentase(terlaksana, total_tp),
        });
    }
    rows.sort_by(|a, b| a.persentase.cmp(&b.persentase).then_with(|| a.nama.cmp(&b.nama)));

    Ok(Kepatuhan {
        semester,
        tahun_ajaran,
        rows,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KetercapaianCounts {
    pub tercapai: i64,
    pub sebagian_tercapai: i64,
    pub tidak_tercapai: i64,
    pub total: i64,
}

impl KetercapaianCounts {
    fn add(&mut self, status: StatusKetercapaian, n: i64) {
        match status {
            StatusKetercapaian::Tercapai => self.tercapai += n,
            StatusKetercapaian::SebagianTercapai => self.sebagian_tercapai += n,
            StatusKetercapaian::TidakTercapai => self.tidak_tercapai += n,
        }
        self.total += n;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KetercapaianPerMapel {
    pub mapel_id: String,
    pub mapel: String,
    #[serde(flatten)]
    pub counts: KetercapaianCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RekapKetercapaian {
    pub guru_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(flatten)]
    pub counts: KetercapaianCounts,
    pub per_mapel: Vec<KetercapaianPerMapel>,
}

/// Journal counts by learning-objective status. Date bounds are inclusive.
pub fn rekap_ketercapaian(
    conn: &Connection,
    guru_id: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<RekapKetercapaian, AnalyticsError> {
    let from = from.map(store::date_key);
    let to = to.map(store::date_key);

    let rows = load_ketercapaian_groups(conn, guru_id, from.as_deref(), to.as_deref())
        .map_err(|e| AnalyticsError::failed("rekap ketercapaian", e))?;

    let mut counts = KetercapaianCounts::default();
    let mut per_mapel: Vec<KetercapaianPerMapel> = Vec::new();
    for (mapel_id, mapel, status, n) in rows {
        let Some(status) = StatusKetercapaian::parse(&status) else {
            continue;
        };
        counts.add(status, n);
        match per_mapel.last_mut() {
            Some(last) if last.mapel_id == mapel_id => last.counts.add(status, n),
            _ => {
                let mut c = KetercapaianCounts::default();
                c.add(status, n);
                per_mapel.push(KetercapaianPerMapel {
                    mapel_id,
                    mapel,
                    counts: c,
                });
            }
        }
    }

    Ok(RekapKetercapaian {
        guru_id: guru_id.map(|s| s.to_string()),
        from,
        to,
        counts,
        per_mapel,
    })
}

fn load_ketercapaian_groups(
    conn: &Connection,
    guru_id: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> rusqlite::Result<Vec<(String, String, String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.nama, j.status_ketercapaian, COUNT(*)
         FROM jurnal j
         JOIN jadwal jd ON jd.id = j.jadwal_id
         JOIN mata_pelajaran m ON m.id = jd.mapel_id
         WHERE (?1 IS NULL OR j.guru_id = ?1)
           AND (?2 IS NULL OR j.tanggal >= ?2)
           AND (?3 IS NULL OR j.tanggal <= ?3)
         GROUP BY m.id, m.nama, j.status_ketercapaian
         ORDER BY m.nama, m.id",
    )?;
    stmt.query_map(params![guru_id, from, to], |r| {
        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAdmin {
    pub tanggal: String,
    pub guru_aktif: i64,
    pub siswa: i64,
    pub kelas: i64,
    pub mapel: i64,
    pub jurnal_hari_ini: i64,
    pub tag_belum_ditindaklanjuti: i64,
}

pub fn dashboard_admin(conn: &Connection, as_of: NaiveDate) -> Result<DashboardAdmin, AnalyticsError> {
    let tanggal = store::date_key(as_of);
    let count = |sql: &str| -> Result<i64, AnalyticsError> {
        conn.query_row(sql, [], |r| r.get(0))
            .map_err(|e| AnalyticsError::failed("dashboard admin", e))
    };

    let jurnal_hari_ini: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM jurnal WHERE tanggal = ?",
            [&tanggal],
            |r| r.get(0),
        )
        .map_err(|e| AnalyticsError::failed("dashboard admin", e))?;

    Ok(DashboardAdmin {
        guru_aktif: count("SELECT COUNT(*) FROM guru WHERE active = 1")?,
        siswa: count("SELECT COUNT(*) FROM siswa")?,
        kelas: count("SELECT COUNT(*) FROM kelas")?,
        mapel: count("SELECT COUNT(*) FROM mata_pelajaran")?,
        jurnal_hari_ini,
        tag_belum_ditindaklanjuti: count(
            "SELECT COUNT(*) FROM tag_siswa_records WHERE ditindaklanjuti = 0",
        )?,
        tanggal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagSiswa;
    use crate::store::fixtures::*;
    use crate::store::{insert_jurnal, insert_siswa, NewJurnal};
    use chrono::Duration;

    fn date(s: &str) -> NaiveDate {
        model::parse_date(s).expect("date")
    }

    #[test]
    fn kepatuhan_orders_least_compliant_first() {
        let conn = memory_db();
        let ani = school(&conn, "Ani");
        let budi = school(&conn, "Budi");
        let a1 = jadwal(&conn, &ani, 2, "2024/2025");
        jadwal(&conn, &ani, 2, "2024/2025");
        let b1 = jadwal(&conn, &budi, 2, "2024/2025");
        jurnal(&conn, &a1, date("2025-02-03"), vec![], vec![], now());
        jurnal(&conn, &b1, date("2025-02-03"), vec![], vec![], now());

        let got = kepatuhan_guru(&conn, Some(2), Some("2024/2025"), date("2025-03-10")).expect("report");
        assert_eq!(got.rows.len(), 2);
        assert_eq!(got.rows[0].nama, "Ani");
        assert_eq!(got.rows[0].persentase, 50);
        assert_eq!(got.rows[1].nama, "Budi");
        assert_eq!(got.rows[1].persentase, 100);
    }

    #[test]
    fn rekap_groups_by_mapel_and_respects_range() {
        let conn = memory_db();
        let s = school(&conn, "Ani");
        let slot = jadwal(&conn, &s, 2, "2024/2025");
        let mut base = NewJurnal {
            jadwal_id: slot,
            tanggal: date("2025-02-01"),
            tujuan_pembelajaran: "a".into(),
            kegiatan: "b".into(),
            penilaian: "c".into(),
            status_ketercapaian: StatusKetercapaian::Tercapai,
            refleksi: None,
            kendala: None,
            solusi: None,
            absensi: vec![],
            tags: vec![],
        };
        insert_jurnal(&conn, &base, now()).expect("jurnal");
        base.tanggal = date("2025-02-02");
        base.status_ketercapaian = StatusKetercapaian::TidakTercapai;
        insert_jurnal(&conn, &base, now()).expect("jurnal");
        base.tanggal = date("2025-04-01");
        insert_jurnal(&conn, &base, now()).expect("jurnal");

        let got = rekap_ketercapaian(
            &conn,
            Some(&s.guru_id),
            Some(date("2025-02-01")),
            Some(date("2025-02-28")),
        )
        .expect("report");
        assert_eq!(got.counts.total, 2);
        assert_eq!(got.counts.tercapai, 1);
        assert_eq!(got.counts.tidak_tercapai, 1);
        assert_eq!(got.per_mapel.len(), 1);
        assert_eq!(got.per_mapel[0].counts.total, 2);

        let all = rekap_ketercapaian(&conn, None, None, None).expect("report");
        assert_eq!(all.counts.total, 3);
        let v = serde_json::to_value(&all).expect("json");
        assert_eq!(v["tidakTercapai"], 2);
        assert_eq!(v["perMapel"][0]["mapel"], "Matematika");
    }

    #[test]
    fn dashboard_counts_today_and_open_tags() {
        let conn = memory_db();
        let s = school(&conn, "Ani");
        let slot = jadwal(&conn, &s, 2, "2024/2025");
        let siswa = insert_siswa(&conn, None, "Ayu", &s.kelas_id).expect("siswa");
        let today = date("2025-03-10");
        jurnal(&conn, &slot, today, vec![], vec![tag(&siswa, TagSiswa::PerluPengayaan)], now());
        jurnal(&conn, &slot, today - Duration::days(1), vec![], vec![], now());

        let got = dashboard_admin(&conn, today).expect("report");
        assert_eq!(got.guru_aktif, 1);
        assert_eq!(got.siswa, 1);
        assert_eq!(got.jurnal_hari_ini, 1);
        assert_eq!(got.tag_belum_ditindaklanjuti, 1);
    }
}
