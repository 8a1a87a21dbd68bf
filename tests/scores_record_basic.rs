
use serde_json::json;
use test_support::{create_exam, request_ok, seed_cohort, spawn_sidecar, temp_dir};

#[test]
fn ca_scores_convert_and_grade_from_raw_percent() {
    let workspace = temp_dir("edutrac-scores-basic");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let cohort = seed_cohort(&mut stdin, &mut reader, &workspace, 3);
    let exam_id = create_exam(
        &mut stdin,
        &mut reader,
        &cohort,
        "Class Test 1",
        "continuous_assessment",
        50.0,
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "record",
        "scores.record",
        json!({
            "schoolId": cohort.school_id,
            "examId": exam_id,
            "recordedBy": "teacher-1",
            "scores": [
                { "studentId": cohort.student_ids[0], "score": 40.0 },
                { "studentId": cohort.student_ids[1], "score": 25.0 },
                { "studentId": cohort.student_ids[2], "score": 10.0 }
            ]
        }),
    );

    assert_eq!(result["count"].as_i64(), Some(3));
    assert_eq!(result["errors"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(result["gradingComplete"].as_bool(), Some(true));

    let processed = result["processed"].as_array().expect("processed");
    // 40/50 onto the 30-point CA weight; grade from the raw 80%.
    assert_eq!(processed[0]["convertedScore"].as_f64(), Some(24.0));
    assert_eq!(processed[0]["grade"].as_str(), Some("1"));
    assert_eq!(processed[0]["remark"].as_str(), Some("Excellent"));
    assert_eq!(processed[1]["convertedScore"].as_f64(), Some(15.0));
    assert_eq!(processed[1]["grade"].as_str(), Some("4"));
    assert_eq!(processed[1]["remark"].as_str(), Some("Credit"));
    assert_eq!(processed[2]["convertedScore"].as_f64(), Some(6.0));
    assert_eq!(processed[2]["grade"].as_str(), Some("9"));
    assert_eq!(processed[2]["remark"].as_str(), Some("Fail"));
}

#[test]
fn scores_get_reports_statistics_and_positions() {
    let workspace = temp_dir("edutrac-scores-get");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let cohort = seed_cohort(&mut stdin, &mut reader, &workspace, 3);
    let exam_id = create_exam(
        &mut stdin,
        &mut reader,
        &cohort,
        "Class Test 1",
        "continuous_assessment",
        50.0,
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "record",
        "scores.record",
        json!({
            "schoolId": cohort.school_id,
            "examId": exam_id,
            "recordedBy": "teacher-1",
            "scores": [
                { "studentId": cohort.student_ids[0], "score": 40.0 },
                { "studentId": cohort.student_ids[1], "score": 25.0 },
                { "studentId": cohort.student_ids[2], "score": 10.0 }
            ]
        }),
    );

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "scores.get",
        json!({ "schoolId": cohort.school_id, "examId": exam_id }),
    );

    // Statistics run on the percentage scale: 80 / 50 / 20.
    let stats = &view["statistics"];
    assert_eq!(stats["count"].as_u64(), Some(3));
    assert_eq!(stats["mean"].as_f64(), Some(50.0));
    assert_eq!(stats["highest"].as_f64(), Some(80.0));
    assert_eq!(stats["lowest"].as_f64(), Some(20.0));
    assert_eq!(stats["passed"].as_u64(), Some(2));
    assert_eq!(stats["failed"].as_u64(), Some(1));
    assert_eq!(stats["passRate"].as_f64(), Some(66.67));

    let students = view["students"].as_array().expect("students");
    assert_eq!(students.len(), 3);
    for s in students {
        assert_eq!(s["submitted"].as_bool(), Some(true));
        let position = s["position"].as_u64().expect("position");
        match s["score"].as_f64().expect("score") as i64 {
            40 => {
                assert_eq!(position, 1);
                assert_eq!(s["positionLabel"].as_str(), Some("1st out of 3"));
            }
            25 => assert_eq!(position, 2),
            10 => assert_eq!(position, 3),
            other => panic!("unexpected score {}", other),
        }
    }
    assert_eq!(view.pointer("/exam/gradingComplete").and_then(|v| v.as_bool()), Some(true));
}
