use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_student_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match req.params.get("schoolId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };
    let first_name = match req.params.get("firstName").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing firstName", None),
    };
    let last_name = match req.params.get("lastName").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing lastName", None),
    };
    let student_no = req
        .params
        .get("studentNo")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let student_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, school_id, first_name, last_name, student_no, active, updated_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        (&student_id, &school_id, &first_name, &last_name, &student_no, &now),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_enrollment_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    // The student and the class must live in the same school.
    let pair: Option<(String, String)> = match conn
        .query_row(
            "SELECT c.school_id, s.school_id
             FROM classes c, students s
             WHERE c.id = ? AND s.id = ?",
            (&class_id, &student_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match pair {
        None => return err(&req.id, "not_found", "class or student not found", None),
        Some((class_school, student_school)) if class_school != student_school => {
            return err(
                &req.id,
                "bad_params",
                "student belongs to a different school than the class",
                None,
            )
        }
        Some(_) => {}
    }

    if let Err(e) = conn.execute(
        "INSERT INTO class_enrollments(class_id, student_id, status)
         VALUES(?, ?, 'active')
         ON CONFLICT(class_id, student_id) DO UPDATE SET status = 'active'",
        (&class_id, &student_id),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_roster_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, s.student_no
         FROM class_enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.class_id = ? AND e.status = 'active'
         ORDER BY s.last_name, s.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&class_id], |r| {
            let first: String = r.get(1)?;
            let last: String = r.get(2)?;
            let student_no: Option<String> = r.get(3)?;
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "name": format!("{} {}", first, last),
                "studentNo": student_no,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(students) => ok(
            &req.id,
            json!({ "count": students.len(), "students": students }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "student.create" => Some(handle_student_create(state, req)),
        "enrollment.add" => Some(handle_enrollment_add(state, req)),
        "roster.get" => Some(handle_roster_get(state, req)),
        _ => None,
    }
}
