mod test_support;

use serde_json::json;
use test_support::{
    create_jadwal, error_code, jurnal_params, request, request_ok, seed_school, select_workspace,
    shutdown, spawn_sidecar, temp_dir,
};

#[test]
fn admin_reports_roll_up_across_teachers() {
    let workspace = temp_dir("jurnald-reports");
    let (child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let a = seed_school(&mut stdin, &mut reader, "A", 2);
    let b = seed_school(&mut stdin, &mut reader, "B", 1);

    let a1 = create_jadwal(&mut stdin, &mut reader, "a1", &a, 2, "2024/2025", 1);
    let _a2 = create_jadwal(&mut stdin, &mut reader, "a2", &a, 2, "2024/2025", 2);
    let b1 = create_jadwal(&mut stdin, &mut reader, "b1", &b, 2, "2024/2025", 1);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "j1",
        "jurnal.create",
        jurnal_params(
            &a1,
            "2025-03-03",
            json!([{ "siswaId": a.siswa_ids[0], "status": "SAKIT" }]),
            json!([{ "siswaId": a.siswa_ids[1], "tag": "PERLU_PENGAYAAN" }]),
        ),
    );
    let mut partial = jurnal_params(&b1, "2025-03-03", json!([]), json!([]));
    partial["statusKetercapaian"] = json!("TIDAK_TERCAPAI");
    let _ = request_ok(&mut stdin, &mut reader, "j2", "jurnal.create", partial);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "j3",
        "jurnal.create",
        jurnal_params(&b1, "2025-03-10", json!([]), json!([])),
    );

    let kepatuhan = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "reports.kepatuhan",
        json!({ "semester": 2, "tahunAjaran": "2024/2025" }),
    );
    let rows = kepatuhan["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["guruId"].as_str(), Some(a.guru_id.as_str()));
    assert_eq!(rows[0]["totalTP"].as_i64(), Some(2));
    assert_eq!(rows[0]["persentase"].as_i64(), Some(50));
    assert_eq!(rows[1]["persentase"].as_i64(), Some(100));

    let rekap = request_ok(&mut stdin, &mut reader, "r2", "reports.ketercapaian", json!({}));
    assert_eq!(rekap["total"].as_i64(), Some(3));
    assert_eq!(rekap["tercapai"].as_i64(), Some(2));
    assert_eq!(rekap["tidakTercapai"].as_i64(), Some(1));
    assert_eq!(rekap["perMapel"].as_array().map(|a| a.len()), Some(2));

    let scoped = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "reports.ketercapaian",
        json!({ "guruId": b.guru_id, "from": "2025-03-04", "to": "2025-03-31" }),
    );
    assert_eq!(scoped["total"].as_i64(), Some(1));
    assert_eq!(scoped["tidakTercapai"].as_i64(), Some(0));

    let reversed = request(
        &mut stdin,
        &mut reader,
        "r4",
        "reports.ketercapaian",
        json!({ "from": "2025-04-01", "to": "2025-03-01" }),
    );
    assert_eq!(error_code(&reversed), "bad_params");

    let dashboard = request_ok(
        &mut stdin,
        &mut reader,
        "r5",
        "reports.dashboard",
        json!({ "asOf": "2025-03-03" }),
    );
    assert_eq!(dashboard["tanggal"].as_str(), Some("2025-03-03"));
    assert_eq!(dashboard["guruAktif"].as_i64(), Some(2));
    assert_eq!(dashboard["siswa"].as_i64(), Some(3));
    assert_eq!(dashboard["kelas"].as_i64(), Some(2));
    assert_eq!(dashboard["mapel"].as_i64(), Some(2));
    assert_eq!(dashboard["jurnalHariIni"].as_i64(), Some(2));
    assert_eq!(dashboard["tagBelumDitindaklanjuti"].as_i64(), Some(1));

    shutdown(child, stdin);
}
