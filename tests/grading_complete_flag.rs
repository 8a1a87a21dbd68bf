
use serde_json::json;
use test_support::{create_exam, request_ok, seed_cohort, spawn_sidecar, temp_dir};

#[test]
fn flag_flips_only_once_every_enrolled_student_is_scored() {
    let workspace = temp_dir("edutrac-grading-complete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let cohort = seed_cohort(&mut stdin, &mut reader, &workspace, 3);
    let exam_id = create_exam(
        &mut stdin,
        &mut reader,
        &cohort,
        "Class Test 1",
        "continuous_assessment",
        100.0,
    );

    let partial = request_ok(
        &mut stdin,
        &mut reader,
        "record-partial",
        "scores.record",
        json!({
            "schoolId": cohort.school_id,
            "examId": exam_id,
            "recordedBy": "teacher-1",
            "scores": [
                { "studentId": cohort.student_ids[0], "score": 62.0 },
                { "studentId": cohort.student_ids[1], "score": 48.0 }
            ]
        }),
    );
    assert_eq!(partial["gradingComplete"].as_bool(), Some(false));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "get-partial",
        "scores.get",
        json!({ "schoolId": cohort.school_id, "examId": exam_id }),
    );
    assert_eq!(
        view.pointer("/exam/gradingComplete").and_then(|v| v.as_bool()),
        Some(false)
    );

    let last = request_ok(
        &mut stdin,
        &mut reader,
        "record-last",
        "scores.record",
        json!({
            "schoolId": cohort.school_id,
            "examId": exam_id,
            "recordedBy": "teacher-1",
            "scores": [ { "studentId": cohort.student_ids[2], "score": 75.0 } ]
        }),
    );
    assert_eq!(last["gradingComplete"].as_bool(), Some(true));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "get-complete",
        "scores.get",
        json!({ "schoolId": cohort.school_id, "examId": exam_id }),
    );
    assert_eq!(
        view.pointer("/exam/gradingComplete").and_then(|v| v.as_bool()),
        Some(true)
    );
}
