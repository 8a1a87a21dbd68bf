use crate::grading::{
    competition_rank, convert_score, ordinal, resolve_grade, round_to_2dp, score_statistics,
    ExamCategory, PercentageSplit,
};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const RECORD_MAX_ENTRIES: usize = 5000;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn db(e: rusqlite::Error) -> Self {
        Self {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

struct ExamRow {
    id: String,
    school_id: String,
    class_id: String,
    subject_id: String,
    term: i64,
    academic_year: String,
    category: ExamCategory,
    total_marks: f64,
    percentage_config_id: Option<String>,
}

fn fetch_exam(conn: &Connection, exam_id: &str, school_id: &str) -> Result<ExamRow, HandlerErr> {
    let row: Option<(String, String, String, String, i64, String, String, f64, Option<String>)> =
        conn.query_row(
            "SELECT id, school_id, class_id, subject_id, term, academic_year,
                    category, total_marks, percentage_config_id
             FROM exams
             WHERE id = ? AND school_id = ?",
            (exam_id, school_id),
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                    r.get(7)?,
                    r.get(8)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::db)?;

    let Some((id, school_id, class_id, subject_id, term, academic_year, category, total_marks, cfg)) =
        row
    else {
        return Err(HandlerErr {
            code: "not_found",
            message: "exam not found".to_string(),
            details: Some(json!({ "examId": exam_id })),
        });
    };
    let Some(category) = ExamCategory::parse(&category) else {
        return Err(HandlerErr {
            code: "invalid_exam_config",
            message: "exam has an unknown category".to_string(),
            details: Some(json!({ "category": category })),
        });
    };
    Ok(ExamRow {
        id,
        school_id,
        class_id,
        subject_id,
        term,
        academic_year,
        category,
        total_marks,
        percentage_config_id: cfg,
    })
}

/// Resolves the CA/exam weight split once per request: the exam's own
/// config when set, otherwise the school default.
fn resolve_split(conn: &Connection, exam: &ExamRow) -> Result<PercentageSplit, HandlerErr> {
    let row: Option<(f64, f64)> = match &exam.percentage_config_id {
        Some(cfg_id) => conn
            .query_row(
                "SELECT ca_percent, exam_percent FROM percentage_configs WHERE id = ?",
                [cfg_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(HandlerErr::db)?,
        None => conn
            .query_row(
                "SELECT ca_percent, exam_percent
                 FROM percentage_configs
                 WHERE school_id = ? AND is_default = 1
                 LIMIT 1",
                [&exam.school_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(HandlerErr::db)?,
    };

    let Some((ca_percent, exam_percent)) = row else {
        return Err(HandlerErr {
            code: "missing_config",
            message: "no percentage configuration found for this exam or school".to_string(),
            details: Some(json!({ "schoolId": exam.school_id })),
        });
    };

    let split = PercentageSplit {
        ca_percent,
        exam_percent,
    };
    split.validate().map_err(|e| HandlerErr {
        code: "invalid_percentage_config",
        message: e.message,
        details: e.details,
    })?;
    Ok(split)
}

/// Active roster of the exam's class, restricted to students of the exam's
/// school. Scope for entry validation, completeness and ranking.
fn fetch_roster(conn: &Connection, exam: &ExamRow) -> Result<HashSet<String>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id
             FROM class_enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.class_id = ? AND e.status = 'active' AND s.school_id = ? AND s.active = 1",
        )
        .map_err(HandlerErr::db)?;
    let ids = stmt
        .query_map((&exam.class_id, &exam.school_id), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<HashSet<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(ids)
}

fn upsert_exam_result(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
    score: f64,
    converted_score: f64,
    grade: &str,
    remark: &str,
    recorded_by: &str,
) -> Result<(), HandlerErr> {
    let result_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO exam_results(id, exam_id, student_id, score, converted_score,
                                  grade, remark, recorded_by, recorded_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(exam_id, student_id) DO UPDATE SET
           score = excluded.score,
           converted_score = excluded.converted_score,
           grade = excluded.grade,
           remark = excluded.remark,
           recorded_by = excluded.recorded_by,
           updated_at = excluded.updated_at",
        rusqlite::params![
            &result_id,
            exam_id,
            student_id,
            score,
            converted_score,
            grade,
            remark,
            recorded_by,
            &now,
            &now,
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "exam_results" })),
    })?;
    Ok(())
}

/// Recombines a student's stored CA conversions with the just-recorded
/// final-exam conversion into a term total and upserts the term result row.
/// A student with no result for some CA exam simply contributes 0 for it.
fn aggregate_term_result(
    conn: &Connection,
    exam: &ExamRow,
    student_id: &str,
    final_converted: f64,
) -> Result<(), HandlerErr> {
    let ca_sum: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(r.converted_score), 0)
             FROM exam_results r
             JOIN exams a ON a.id = r.exam_id
             WHERE r.student_id = ?
               AND a.school_id = ? AND a.class_id = ? AND a.subject_id = ?
               AND a.term = ? AND a.academic_year = ?
               AND a.category = 'continuous_assessment'",
            rusqlite::params![
                student_id,
                &exam.school_id,
                &exam.class_id,
                &exam.subject_id,
                exam.term,
                &exam.academic_year,
            ],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;

    let total = round_to_2dp(ca_sum + final_converted);
    let info = resolve_grade(total);

    let result_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO term_results(id, school_id, student_id, class_id, subject_id,
                                  term, academic_year, ca_score, exam_score, total_score,
                                  grade, remark, percentage_config_id, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, subject_id, term, academic_year) DO UPDATE SET
           ca_score = excluded.ca_score,
           exam_score = excluded.exam_score,
           total_score = excluded.total_score,
           grade = excluded.grade,
           remark = excluded.remark,
           percentage_config_id = excluded.percentage_config_id,
           updated_at = excluded.updated_at",
        rusqlite::params![
            &result_id,
            &exam.school_id,
            student_id,
            &exam.class_id,
            &exam.subject_id,
            exam.term,
            &exam.academic_year,
            round_to_2dp(ca_sum),
            round_to_2dp(final_converted),
            total,
            info.grade.to_string(),
            info.remark,
            &exam.percentage_config_id,
            &now,
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "term_results" })),
    })?;
    Ok(())
}

/// Full re-rank of the cohort sharing (subject, class, term, year). Runs
/// after every term-result change; positions use competition ranking, so
/// equal totals share a position.
fn rerank_cohort(conn: &Connection, exam: &ExamRow) -> Result<(), HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, total_score
             FROM term_results
             WHERE subject_id = ? AND class_id = ? AND term = ? AND academic_year = ?",
        )
        .map_err(HandlerErr::db)?;
    let rows: Vec<(String, f64)> = stmt
        .query_map(
            rusqlite::params![&exam.subject_id, &exam.class_id, exam.term, &exam.academic_year],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let totals: Vec<f64> = rows.iter().map(|(_, t)| *t).collect();
    for (id, total) in &rows {
        let position = competition_rank(*total, totals.iter().copied()) as i64;
        conn.execute(
            "UPDATE term_results SET position = ? WHERE id = ?",
            (position, id),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: None,
        })?;
    }
    Ok(())
}

struct ProcessedEntry {
    student_id: String,
    score: f64,
    converted_score: f64,
    grade: String,
    remark: &'static str,
}

/// The whole submission runs inside one transaction: result upserts, the
/// completion flag, term aggregation and the cohort re-rank commit together
/// or not at all. The daemon handles requests sequentially, so the
/// transaction also serializes re-ranks per cohort.
fn record_scores_tx(
    conn: &Connection,
    exam: &ExamRow,
    split: &PercentageSplit,
    recorded_by: &str,
    entries: &[serde_json::Value],
) -> Result<serde_json::Value, HandlerErr> {
    let roster = fetch_roster(conn, exam)?;
    let target_weight = split.weight_for(exam.category);

    let mut processed: Vec<ProcessedEntry> = Vec::new();
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("entry at index {} must be an object", i),
            }));
            continue;
        };

        let Some(student_id) = obj.get("studentId").and_then(|v| v.as_str()) else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("entry at index {} missing studentId", i),
            }));
            continue;
        };
        if !roster.contains(student_id) {
            errors.push(json!({
                "index": i,
                "studentId": student_id,
                "code": "invalid_student",
                "message": "student is not on the active roster for this exam's class",
            }));
            continue;
        }

        let score = obj.get("score").and_then(|v| v.as_f64());
        let score = match score {
            Some(v) if v.is_finite() && v >= 0.0 && v <= exam.total_marks => v,
            _ => {
                errors.push(json!({
                    "index": i,
                    "studentId": student_id,
                    "code": "invalid_score",
                    "message": format!(
                        "score must be a number in [0, {}]",
                        exam.total_marks
                    ),
                }));
                continue;
            }
        };

        let converted = convert_score(score, exam.total_marks, target_weight)
            .map_err(|e| HandlerErr {
                code: "invalid_exam_config",
                message: e.message,
                details: e.details,
            })?;
        let converted = round_to_2dp(converted);
        // Grade follows the raw percentage, not the converted score.
        let info = resolve_grade(score / exam.total_marks * 100.0);
        let grade = info.grade.to_string();

        upsert_exam_result(
            conn,
            &exam.id,
            student_id,
            score,
            converted,
            &grade,
            info.remark,
            recorded_by,
        )?;

        processed.push(ProcessedEntry {
            student_id: student_id.to_string(),
            score,
            converted_score: converted,
            grade,
            remark: info.remark,
        });
    }

    // Completeness: the exam is fully graded once every active roster
    // member has a result row.
    let results_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM exam_results WHERE exam_id = ?",
            [&exam.id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;
    let grading_complete = !roster.is_empty() && results_count >= roster.len() as i64;
    if grading_complete {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE exams SET grading_complete = 1, updated_at = ? WHERE id = ?",
            (&now, &exam.id),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: None,
        })?;
    }

    if exam.category == ExamCategory::FinalExam {
        // A student repeated in one batch aggregates once, from the entry
        // that won the upsert.
        let mut latest: HashMap<&str, f64> = HashMap::new();
        for entry in &processed {
            latest.insert(entry.student_id.as_str(), entry.converted_score);
        }
        for (&student_id, &converted) in &latest {
            aggregate_term_result(conn, exam, student_id, converted)?;
        }
        if !latest.is_empty() {
            rerank_cohort(conn, exam)?;
        }
    }

    let processed_json: Vec<serde_json::Value> = processed
        .iter()
        .map(|p| {
            json!({
                "studentId": p.student_id,
                "score": p.score,
                "convertedScore": p.converted_score,
                "grade": p.grade,
                "remark": p.remark,
            })
        })
        .collect();

    Ok(json!({
        "processed": processed_json,
        "count": processed.len(),
        "errors": errors,
        "gradingComplete": grading_complete,
    }))
}

fn handle_scores_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let exam_id = match req.params.get("examId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examId", None),
    };
    let recorded_by = match req.params.get("recordedBy").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing recordedBy", None),
    };
    let Some(entries) = req.params.get("scores").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing scores[]", None);
    };
    if entries.len() > RECORD_MAX_ENTRIES {
        return err(
            &req.id,
            "bad_params",
            "score payload is too large",
            Some(json!({
                "entries": entries.len(),
                "maxEntries": RECORD_MAX_ENTRIES
            })),
        );
    }
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let exam = match fetch_exam(&tx, &exam_id, &school_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let split = match resolve_split(&tx, &exam) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let result = match record_scores_tx(&tx, &exam, &split, &recorded_by, entries) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, result)
}

fn handle_scores_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let exam_id = match req.params.get("examId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examId", None),
    };

    let exam = match fetch_exam(conn, &exam_id, &school_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let exam_meta: (String, String, i64) = match conn.query_row(
        "SELECT title, category, grading_complete FROM exams WHERE id = ?",
        [&exam.id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut roster_stmt = match conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, s.student_no
         FROM class_enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.class_id = ? AND e.status = 'active' AND s.active = 1
         ORDER BY s.last_name, s.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let roster: Vec<(String, String, Option<String>)> = match roster_stmt
        .query_map([&exam.class_id], |r| {
            let first: String = r.get(1)?;
            let last: String = r.get(2)?;
            Ok((r.get(0)?, format!("{} {}", first, last), r.get(3)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut results_stmt = match conn.prepare(
        "SELECT student_id, score, converted_score, grade, remark
         FROM exam_results WHERE exam_id = ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let result_rows: Vec<(String, f64, f64, String, String)> = match results_stmt
        .query_map([&exam.id], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let by_student: HashMap<&str, &(String, f64, f64, String, String)> = result_rows
        .iter()
        .map(|row| (row.0.as_str(), row))
        .collect();
    let raw_scores: Vec<f64> = result_rows.iter().map(|r| r.1).collect();
    let percentages: Vec<f64> = raw_scores
        .iter()
        .map(|s| s / exam.total_marks * 100.0)
        .collect();
    let stats = score_statistics(percentages.iter().copied());
    let submitted_count = result_rows.len();

    let students: Vec<serde_json::Value> = roster
        .iter()
        .map(|(student_id, name, student_no)| {
            match by_student.get(student_id.as_str()) {
                Some((_, score, converted, grade, remark)) => {
                    let rank = competition_rank(*score, raw_scores.iter().copied());
                    json!({
                        "studentId": student_id,
                        "name": name,
                        "studentNo": student_no,
                        "score": score,
                        "convertedScore": converted,
                        "grade": grade,
                        "remark": remark,
                        "position": rank,
                        "positionLabel": format!("{} out of {}", ordinal(rank), submitted_count),
                        "submitted": true,
                    })
                }
                None => json!({
                    "studentId": student_id,
                    "name": name,
                    "studentNo": student_no,
                    "score": null,
                    "convertedScore": null,
                    "grade": null,
                    "remark": null,
                    "position": null,
                    "positionLabel": null,
                    "submitted": false,
                }),
            }
        })
        .collect();

    ok(
        &req.id,
        json!({
            "exam": {
                "examId": exam.id,
                "title": exam_meta.0,
                "category": exam_meta.1,
                "totalMarks": exam.total_marks,
                "term": exam.term,
                "academicYear": exam.academic_year,
                "gradingComplete": exam_meta.2 != 0,
            },
            "students": students,
            "statistics": stats,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.record" => Some(handle_scores_record(state, req)),
        "scores.get" => Some(handle_scores_get(state, req)),
        _ => None,
    }
}
