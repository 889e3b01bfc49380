use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "jurnal.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS guru(
            id TEXT PRIMARY KEY,
            nip TEXT UNIQUE,
            nama TEXT NOT NULL,
            email TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kelas(
            id TEXT PRIMARY KEY,
            nama TEXT NOT NULL UNIQUE,
            tingkat INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mata_pelajaran(
            id TEXT PRIMARY KEY,
            kode TEXT NOT NULL UNIQUE,
            nama TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS siswa(
            id TEXT PRIMARY KEY,
            nis TEXT,
            nama TEXT NOT NULL,
            kelas_id TEXT NOT NULL,
            FOREIGN KEY(kelas_id) REFERENCES kelas(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_siswa_kelas ON siswa(kelas_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jadwal(
            id TEXT PRIMARY KEY,
            guru_id TEXT NOT NULL,
            kelas_id TEXT NOT NULL,
            mapel_id TEXT NOT NULL,
            semester INTEGER NOT NULL,
            tahun_ajaran TEXT NOT NULL,
            hari INTEGER NOT NULL,
            jam_mulai TEXT NOT NULL,
            jam_selesai TEXT NOT NULL,
            FOREIGN KEY(guru_id) REFERENCES guru(id),
            FOREIGN KEY(kelas_id) REFERENCES kelas(id),
            FOREIGN KEY(mapel_id) REFERENCES mata_pelajaran(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jadwal_guru_period ON jadwal(guru_id, semester, tahun_ajaran)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jurnal(
            id TEXT PRIMARY KEY,
            jadwal_id TEXT NOT NULL,
            guru_id TEXT NOT NULL,
            tanggal TEXT NOT NULL,
            tujuan_pembelajaran TEXT NOT NULL,
            kegiatan TEXT NOT NULL,
            penilaian TEXT NOT NULL,
            status_ketercapaian TEXT NOT NULL,
            refleksi TEXT,
            kendala TEXT,
            solusi TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(jadwal_id) REFERENCES jadwal(id),
            FOREIGN KEY(guru_id) REFERENCES guru(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jurnal_guru_tanggal ON jurnal(guru_id, tanggal)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jurnal_jadwal ON jurnal(jadwal_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS absensi(
            id TEXT PRIMARY KEY,
            jurnal_id TEXT NOT NULL,
            siswa_id TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(jurnal_id) REFERENCES jurnal(id),
            FOREIGN KEY(siswa_id) REFERENCES siswa(id),
            UNIQUE(jurnal_id, siswa_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_absensi_siswa ON absensi(siswa_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tag_siswa_records(
            id TEXT PRIMARY KEY,
            jurnal_id TEXT NOT NULL,
            siswa_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            ditindaklanjuti INTEGER NOT NULL DEFAULT 0,
            keterangan TEXT,
            created_at TEXT NOT NULL,
            ditindaklanjuti_at TEXT,
            FOREIGN KEY(jurnal_id) REFERENCES jurnal(id),
            FOREIGN KEY(siswa_id) REFERENCES siswa(id)
        )",
        [],
    )?;
    // Workspaces created before follow-up timestamps were tracked lack this column.
    ensure_tag_records_done_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tag_records_jurnal ON tag_siswa_records(jurnal_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tag_records_siswa ON tag_siswa_records(siswa_id)",
        [],
    )?;

    Ok(())
}

fn ensure_tag_records_done_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "tag_siswa_records", "ditindaklanjuti_at")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE tag_siswa_records ADD COLUMN ditindaklanjuti_at TEXT",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
