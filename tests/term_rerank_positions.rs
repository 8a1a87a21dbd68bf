
use serde_json::json;
use test_support::{create_exam, request_ok, seed_cohort, spawn_sidecar, temp_dir};

fn cohort_rows(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    cohort: &test_support::Cohort,
) -> Vec<serde_json::Value> {
    let term = request_ok(
        stdin,
        reader,
        id,
        "term.results",
        json!({
            "schoolId": cohort.school_id,
            "classId": cohort.class_id,
            "subjectId": cohort.subject_id,
            "term": 1,
            "academicYear": "2024/2025"
        }),
    );
    term["results"].as_array().expect("results").clone()
}

#[test]
fn cohort_positions_follow_descending_totals_and_share_ties() {
    let workspace = temp_dir("edutrac-term-rerank");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let cohort = seed_cohort(&mut stdin, &mut reader, &workspace, 3);
    let final_exam = create_exam(
        &mut stdin,
        &mut reader,
        &cohort,
        "End of Term",
        "final_exam",
        100.0,
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "record",
        "scores.record",
        json!({
            "schoolId": cohort.school_id,
            "examId": final_exam,
            "recordedBy": "teacher-1",
            "scores": [
                { "studentId": cohort.student_ids[0], "score": 90.0 },
                { "studentId": cohort.student_ids[1], "score": 75.0 },
                { "studentId": cohort.student_ids[2], "score": 75.0 }
            ]
        }),
    );

    let rows = cohort_rows(&mut stdin, &mut reader, "term-1", &cohort);
    assert_eq!(rows.len(), 3);
    assert!((rows[0]["totalScore"].as_f64().expect("total") - 63.0).abs() < 1e-9);
    assert_eq!(rows[0]["position"].as_i64(), Some(1));
    // The two tied students share 2nd; nobody is 3rd.
    assert_eq!(rows[1]["position"].as_i64(), Some(2));
    assert_eq!(rows[2]["position"].as_i64(), Some(2));
    assert_eq!(rows[1]["positionLabel"].as_str(), Some("2nd"));

    // Rescoring one member re-ranks the whole cohort, not just that row.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "rescore",
        "scores.record",
        json!({
            "schoolId": cohort.school_id,
            "examId": final_exam,
            "recordedBy": "teacher-1",
            "scores": [ { "studentId": cohort.student_ids[0], "score": 10.0 } ]
        }),
    );

    let rows = cohort_rows(&mut stdin, &mut reader, "term-2", &cohort);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["position"].as_i64(), Some(1));
    assert_eq!(rows[1]["position"].as_i64(), Some(1));
    let demoted = rows
        .iter()
        .find(|r| r["studentId"].as_str() == Some(cohort.student_ids[0].as_str()))
        .expect("demoted row");
    assert!((demoted["totalScore"].as_f64().expect("total") - 7.0).abs() < 1e-9);
    assert_eq!(demoted["position"].as_i64(), Some(3));
}
