use crate::model::{StatusAbsensi, StatusKetercapaian, TagSiswa};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

/// Fixed-width UTC timestamps so `ORDER BY created_at` sorts chronologically.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone)]
pub struct NewGuru {
    pub nip: Option<String>,
    pub nama: String,
    pub email: Option<String>,
}

pub fn insert_guru(conn: &Connection, g: &NewGuru, now: DateTime<Utc>) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO guru(id, nip, nama, email, active, created_at) VALUES(?, ?, ?, ?, 1, ?)",
        (&id, &g.nip, &g.nama, &g.email, timestamp(now)),
    )?;
    Ok(id)
}

pub fn insert_kelas(conn: &Connection, nama: &str, tingkat: Option<i64>) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO kelas(id, nama, tingkat) VALUES(?, ?, ?)",
        (&id, nama, tingkat),
    )?;
    Ok(id)
}

pub fn insert_mapel(conn: &Connection, kode: &str, nama: &str) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO mata_pelajaran(id, kode, nama) VALUES(?, ?, ?)",
        (&id, kode, nama),
    )?;
    Ok(id)
}

pub fn insert_siswa(
    conn: &Connection,
    nis: Option<&str>,
    nama: &str,
    kelas_id: &str,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO siswa(id, nis, nama, kelas_id) VALUES(?, ?, ?, ?)",
        (&id, nis, nama, kelas_id),
    )?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct NewJadwal {
    pub guru_id: String,
    pub kelas_id: String,
    pub mapel_id: String,
    pub semester: i64,
    pub tahun_ajaran: String,
    pub hari: i64,
    pub jam_mulai: String,
    pub jam_selesai: String,
}

pub fn insert_jadwal(conn: &Connection, j: &NewJadwal) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO jadwal(id, guru_id, kelas_id, mapel_id, semester, tahun_ajaran, hari, jam_mulai, jam_selesai)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &j.guru_id,
            &j.kelas_id,
            &j.mapel_id,
            j.semester,
            &j.tahun_ajaran,
            j.hari,
            &j.jam_mulai,
            &j.jam_selesai,
        ),
    )?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct JadwalRef {
    pub guru_id: String,
    pub kelas_id: String,
}

pub fn jadwal_ref(conn: &Connection, jadwal_id: &str) -> rusqlite::Result<Option<JadwalRef>> {
    conn.query_row(
        "SELECT guru_id, kelas_id FROM jadwal WHERE id = ?",
        [jadwal_id],
        |r| {
            Ok(JadwalRef {
                guru_id: r.get(0)?,
                kelas_id: r.get(1)?,
            })
        },
    )
    .optional()
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub siswa_id: String,
    pub tag: TagSiswa,
    pub keterangan: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewJurnal {
    pub jadwal_id: String,
    pub tanggal: NaiveDate,
    pub tujuan_pembelajaran: String,
    pub kegiatan: String,
    pub penilaian: String,
    pub status_ketercapaian: StatusKetercapaian,
    pub refleksi: Option<String>,
    pub kendala: Option<String>,
    pub solusi: Option<String>,
    pub absensi: Vec<(String, StatusAbsensi)>,
    pub tags: Vec<NewTag>,
}

/// Inserts the journal entry with its attendance and tag rows in one
/// transaction. The owning teacher is taken from the schedule slot.
pub fn insert_jurnal(conn: &Connection, j: &NewJurnal, now: DateTime<Utc>) -> anyhow::Result<String> {
    let Some(jadwal) = jadwal_ref(conn, &j.jadwal_id)? else {
        anyhow::bail!("jadwal not found: {}", j.jadwal_id);
    };

    let created_at = timestamp(now);
    let jurnal_id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO jurnal(
            id, jadwal_id, guru_id, tanggal, tujuan_pembelajaran, kegiatan, penilaian,
            status_ketercapaian, refleksi, kendala, solusi, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &jurnal_id,
            &j.jadwal_id,
            &jadwal.guru_id,
            date_key(j.tanggal),
            &j.tujuan_pembelajaran,
            &j.kegiatan,
            &j.penilaian,
            j.status_ketercapaian.as_str(),
            &j.refleksi,
            &j.kendala,
            &j.solusi,
            &created_at,
        ),
    )?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO absensi(id, jurnal_id, siswa_id, status) VALUES(?, ?, ?, ?)")?;
        for (siswa_id, status) in &j.absensi {
            stmt.execute((
                Uuid::new_v4().to_string(),
                &jurnal_id,
                siswa_id,
                status.as_str(),
            ))?;
        }
        let mut stmt = tx.prepare(
            "INSERT INTO tag_siswa_records(id, jurnal_id, siswa_id, tag, ditindaklanjuti, keterangan, created_at)
             VALUES(?, ?, ?, ?, 0, ?, ?)",
        )?;
        for t in &j.tags {
            stmt.execute((
                Uuid::new_v4().to_string(),
                &jurnal_id,
                &t.siswa_id,
                t.tag.as_str(),
                &t.keterangan,
                &created_at,
            ))?;
        }
    }
    tx.commit()?;
    Ok(jurnal_id)
}
