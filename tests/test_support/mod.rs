#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_jurnald");
    let mut child = Command::new(exe)
        .env_remove("JURNALD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn jurnald");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn send(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    payload: Value,
) -> Value {
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", payload);
    serde_json::from_str(line.trim()).expect("parse response json")
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = send(
        stdin,
        reader,
        json!({ "id": id, "method": method, "params": params }),
    );
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_as(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
    actor: Value,
) -> Value {
    let value = send(
        stdin,
        reader,
        json!({ "id": id, "method": method, "params": params, "actor": actor }),
    );
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(resp: &Value) -> &str {
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false), "expected error: {}", resp);
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

pub fn guru_actor(guru_id: &str) -> Value {
    json!({ "role": "GURU", "guruId": guru_id })
}

/// One teacher teaching one subject to one class of `siswa_count` students.
pub struct Seed {
    pub guru_id: String,
    pub kelas_id: String,
    pub mapel_id: String,
    pub siswa_ids: Vec<String>,
}

pub fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    tag: &str,
    siswa_count: usize,
) -> Seed {
    let guru = request_ok(
        stdin,
        reader,
        &format!("{}-guru", tag),
        "guru.create",
        json!({ "nama": format!("Guru {}", tag) }),
    );
    let kelas = request_ok(
        stdin,
        reader,
        &format!("{}-kelas", tag),
        "kelas.create",
        json!({ "nama": format!("X-{}", tag), "tingkat": 10 }),
    );
    let mapel = request_ok(
        stdin,
        reader,
        &format!("{}-mapel", tag),
        "mapel.create",
        json!({ "kode": format!("MTK{}", tag), "nama": format!("Matematika {}", tag) }),
    );
    let kelas_id = kelas["kelasId"].as_str().expect("kelasId").to_string();
    let siswa_ids = (0..siswa_count)
        .map(|i| {
            let s = request_ok(
                stdin,
                reader,
                &format!("{}-siswa-{}", tag, i),
                "siswa.create",
                json!({ "nama": format!("Siswa {} {:02}", tag, i), "kelasId": kelas_id }),
            );
            s["siswaId"].as_str().expect("siswaId").to_string()
        })
        .collect();
    Seed {
        guru_id: guru["guruId"].as_str().expect("guruId").to_string(),
        kelas_id,
        mapel_id: mapel["mapelId"].as_str().expect("mapelId").to_string(),
        siswa_ids,
    }
}

pub fn create_jadwal(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    seed: &Seed,
    semester: i64,
    tahun_ajaran: &str,
    hari: i64,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "jadwal.create",
        json!({
            "guruId": seed.guru_id,
            "kelasId": seed.kelas_id,
            "mapelId": seed.mapel_id,
            "semester": semester,
            "tahunAjaran": tahun_ajaran,
            "hari": hari,
            "jamMulai": "07:00",
            "jamSelesai": "08:30",
        }),
    );
    res["jadwalId"].as_str().expect("jadwalId").to_string()
}

pub fn jurnal_params(jadwal_id: &str, tanggal: &str, absensi: Value, tags: Value) -> Value {
    json!({
        "jadwalId": jadwal_id,
        "tanggal": tanggal,
        "tujuanPembelajaran": "Memahami persamaan linear",
        "kegiatan": "Diskusi dan latihan soal",
        "penilaian": "Kuis singkat",
        "statusKetercapaian": "TERCAPAI",
        "absensi": absensi,
        "tags": tags,
    })
}

pub fn shutdown(mut child: Child, stdin: ChildStdin) {
    drop(stdin);
    let _ = child.wait();
}
