use crate::grading::ordinal;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_term_results(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let subject_id = match req.params.get("subjectId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing subjectId", None),
    };
    let term = match req.params.get("term").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid term", None),
    };
    let academic_year = match req.params.get("academicYear").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing academicYear", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT t.student_id, s.first_name, s.last_name,
                t.ca_score, t.exam_score, t.total_score, t.grade, t.remark, t.position
         FROM term_results t
         JOIN students s ON s.id = t.student_id
         WHERE t.school_id = ? AND t.class_id = ? AND t.subject_id = ?
           AND t.term = ? AND t.academic_year = ?
         ORDER BY t.total_score DESC, s.last_name, s.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map(
            rusqlite::params![&school_id, &class_id, &subject_id, term, &academic_year],
            |r| {
                let first: String = r.get(1)?;
                let last: String = r.get(2)?;
                let position: Option<i64> = r.get(8)?;
                Ok(json!({
                    "studentId": r.get::<_, String>(0)?,
                    "name": format!("{} {}", first, last),
                    "caScore": r.get::<_, f64>(3)?,
                    "examScore": r.get::<_, f64>(4)?,
                    "totalScore": r.get::<_, f64>(5)?,
                    "grade": r.get::<_, String>(6)?,
                    "remark": r.get::<_, String>(7)?,
                    "position": position,
                    "positionLabel": position.map(|p| ordinal(p as usize)),
                }))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(results) => ok(
            &req.id,
            json!({
                "term": term,
                "academicYear": academic_year,
                "count": results.len(),
                "results": results,
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "term.results" => Some(handle_term_results(state, req)),
        _ => None,
    }
}
