mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, select_workspace, shutdown, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("jurnald-router-smoke");
    let (child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());
    assert_eq!(health["version"].as_str(), Some(env!("CARGO_PKG_VERSION")));

    let before = request(&mut stdin, &mut reader, "2", "guru.list", json!({}));
    assert_eq!(error_code(&before), "no_workspace");

    select_workspace(&mut stdin, &mut reader, &workspace);
    assert!(workspace.join("jurnal.sqlite3").exists());

    let methods = [
        ("setup.get", json!({})),
        ("guru.list", json!({})),
        ("mapel.list", json!({})),
        ("kelas.list", json!({})),
        ("siswa.list", json!({})),
        ("jadwal.list", json!({})),
        ("jurnal.list", json!({})),
        ("analytics.keterlaksanaanTp", json!({ "guruId": "g" })),
        ("analytics.topAbsent", json!({ "guruId": "g" })),
        ("analytics.tindakLanjut", json!({ "guruId": "g" })),
        ("analytics.siswa", json!({ "siswaId": "s" })),
        ("tags.markDone", json!({ "tagRecordId": "t" })),
        ("reports.kepatuhan", json!({})),
        ("reports.ketercapaian", json!({})),
        ("reports.dashboard", json!({})),
    ];
    for (i, (method, params)) in methods.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("m{}", i), method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "3", "grades.open", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    // Unknown guru ids are empty results, not errors.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "analytics.topAbsent",
        json!({ "guruId": "nobody", "asOf": "2025-03-31" }),
    );
    assert_eq!(empty["topAbsentStudents"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(empty["totalDays"].as_i64(), Some(30));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse bad_json");
    assert_eq!(bad["error"]["code"].as_str(), Some("bad_json"));

    // The loop keeps serving after a bad line.
    let _ = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));

    shutdown(child, stdin);
}
