mod test_support;

use serde_json::json;
use test_support::{
    create_jadwal, error_code, guru_actor, jurnal_params, request_as, request_ok, seed_school,
    select_workspace, shutdown, spawn_sidecar, temp_dir,
};

#[test]
fn guru_actor_is_confined_to_own_data() {
    let workspace = temp_dir("jurnald-actor-scope");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let a = seed_school(&mut stdin, &mut reader, "A", 2);
    let b = seed_school(&mut stdin, &mut reader, "B", 2);
    let jadwal_a = create_jadwal(&mut stdin, &mut reader, "jda", &a, 2, "2024/2025", 1);
    let jadwal_b = create_jadwal(&mut stdin, &mut reader, "jdb", &b, 2, "2024/2025", 1);
    let as_a = guru_actor(&a.guru_id);

    // Omitted guruId resolves to the actor.
    let own = request_as(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.keterlaksanaanTp",
        json!({ "semester": 2, "tahunAjaran": "2024/2025" }),
        as_a.clone(),
    );
    assert_eq!(own["ok"].as_bool(), Some(true), "{}", own);
    assert_eq!(own["result"]["totalTP"].as_i64(), Some(1));

    for (i, method) in [
        "analytics.keterlaksanaanTp",
        "analytics.topAbsent",
        "analytics.tindakLanjut",
        "jadwal.list",
        "jurnal.list",
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request_as(
            &mut stdin,
            &mut reader,
            &format!("other-{}", i),
            method,
            json!({ "guruId": b.guru_id }),
            as_a.clone(),
        );
        assert_eq!(error_code(&resp), "forbidden", "{}", method);
    }

    // Writing a jurnal on someone else's slot.
    let resp = request_as(
        &mut stdin,
        &mut reader,
        "2",
        "jurnal.create",
        jurnal_params(&jadwal_b, "2025-03-03", json!([]), json!([])),
        as_a.clone(),
    );
    assert_eq!(error_code(&resp), "forbidden");

    let resp = request_as(
        &mut stdin,
        &mut reader,
        "3",
        "jurnal.create",
        jurnal_params(
            &jadwal_a,
            "2025-03-03",
            json!([]),
            json!([{ "siswaId": a.siswa_ids[0], "tag": "MASALAH_PERILAKU" }]),
        ),
        as_a.clone(),
    );
    assert_eq!(resp["ok"].as_bool(), Some(true), "{}", resp);

    // B's actor cannot resolve A's tag.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "analytics.tindakLanjut",
        json!({ "guruId": a.guru_id }),
    );
    let tag_id = summary["items"][0]["id"].as_str().expect("tag id").to_string();
    let resp = request_as(
        &mut stdin,
        &mut reader,
        "5",
        "tags.markDone",
        json!({ "tagRecordId": tag_id }),
        guru_actor(&b.guru_id),
    );
    assert_eq!(error_code(&resp), "forbidden");
    let resp = request_as(
        &mut stdin,
        &mut reader,
        "6",
        "tags.markDone",
        json!({ "tagRecordId": tag_id }),
        as_a.clone(),
    );
    assert_eq!(resp["result"]["updated"].as_bool(), Some(true), "{}", resp);

    // Drill-down is scoped to the actor's own jurnal.
    let resp = request_as(
        &mut stdin,
        &mut reader,
        "7",
        "analytics.siswa",
        json!({ "siswaId": a.siswa_ids[0] }),
        guru_actor(&b.guru_id),
    );
    assert_eq!(resp["ok"].as_bool(), Some(true), "{}", resp);
    assert_eq!(resp["result"]["tags"].as_array().map(|t| t.len()), Some(0));

    shutdown(child, stdin);
}

#[test]
fn guru_actor_cannot_call_admin_methods() {
    let workspace = temp_dir("jurnald-actor-admin");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let a = seed_school(&mut stdin, &mut reader, "A", 1);
    let as_a = guru_actor(&a.guru_id);

    let calls = [
        ("guru.create", json!({ "nama": "Guru Baru" })),
        ("mapel.delete", json!({ "mapelId": a.mapel_id })),
        ("kelas.create", json!({ "nama": "XI-1" })),
        ("siswa.create", json!({ "nama": "Siswa", "kelasId": a.kelas_id })),
        (
            "jadwal.create",
            json!({
                "guruId": a.guru_id,
                "kelasId": a.kelas_id,
                "mapelId": a.mapel_id,
                "semester": 1,
                "tahunAjaran": "2025/2026",
                "hari": 1,
                "jamMulai": "07:00",
                "jamSelesai": "08:00"
            }),
        ),
        ("setup.update", json!({ "section": "sekolah", "patch": { "namaSekolah": "X" } })),
        ("reports.kepatuhan", json!({})),
        ("reports.ketercapaian", json!({})),
        ("reports.dashboard", json!({})),
        ("workspace.select", json!({ "path": workspace.to_string_lossy() })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request_as(
            &mut stdin,
            &mut reader,
            &format!("{}", i),
            method,
            params,
            as_a.clone(),
        );
        assert_eq!(error_code(&resp), "forbidden", "{}", method);
    }

    // Read-only master data stays open to teachers.
    let resp = request_as(&mut stdin, &mut reader, "r1", "kelas.list", json!({}), as_a.clone());
    assert_eq!(resp["ok"].as_bool(), Some(true), "{}", resp);

    let admin = request_as(
        &mut stdin,
        &mut reader,
        "r2",
        "reports.dashboard",
        json!({}),
        json!({ "role": "ADMIN" }),
    );
    assert_eq!(admin["ok"].as_bool(), Some(true), "{}", admin);

    shutdown(child, stdin);
}
