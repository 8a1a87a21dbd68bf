use crate::grading::{ExamCategory, PercentageSplit};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn require_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_school_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let school_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO schools(id, name) VALUES(?, ?)",
        (&school_id, &name),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "schoolId": school_id }))
}

fn handle_class_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match require_str(req, "schoolId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, school_id, name) VALUES(?, ?, ?)",
        (&class_id, &school_id, &name),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "classId": class_id }))
}

fn handle_subject_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match require_str(req, "schoolId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, school_id, name) VALUES(?, ?, ?)",
        (&subject_id, &school_id, &name),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "subjectId": subject_id }))
}

fn handle_config_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match require_str(req, "schoolId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ca_percent = match req.params.get("caPercent").and_then(|v| v.as_f64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid caPercent", None),
    };
    let exam_percent = match req.params.get("examPercent").and_then(|v| v.as_f64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid examPercent", None),
    };
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("Default")
        .to_string();
    let is_default = req
        .params
        .get("isDefault")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let split = PercentageSplit {
        ca_percent,
        exam_percent,
    };
    if let Err(e) = split.validate() {
        return err(&req.id, &e.code, e.message, e.details);
    }

    // Only one default split per school.
    if is_default {
        if let Err(e) = conn.execute(
            "UPDATE percentage_configs SET is_default = 0 WHERE school_id = ?",
            [&school_id],
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    let config_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO percentage_configs(id, school_id, name, is_default, ca_percent, exam_percent)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &config_id,
            &school_id,
            &name,
            is_default as i64,
            ca_percent,
            exam_percent,
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "configId": config_id }))
}

fn handle_exam_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_id = match require_str(req, "schoolId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let class_id = match require_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject_id = match require_str(req, "subjectId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = match require_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let academic_year = match require_str(req, "academicYear") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term = match req.params.get("term").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid term", None),
    };
    let category_raw = match require_str(req, "category") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(category) = ExamCategory::parse(&category_raw) else {
        return err(
            &req.id,
            "bad_params",
            "category must be continuous_assessment or final_exam",
            Some(json!({ "category": category_raw })),
        );
    };
    let total_marks = match req.params.get("totalMarks").and_then(|v| v.as_f64()) {
        Some(v) if v > 0.0 => v,
        Some(v) => {
            return err(
                &req.id,
                "invalid_exam_config",
                "totalMarks must be > 0",
                Some(json!({ "totalMarks": v })),
            )
        }
        None => return err(&req.id, "bad_params", "missing/invalid totalMarks", None),
    };

    // Class and subject must belong to the same school as the exam.
    let class_school: Option<String> = match conn
        .query_row("SELECT school_id FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_school.as_deref() != Some(school_id.as_str()) {
        return err(&req.id, "not_found", "class not found in school", None);
    }
    let subject_school: Option<String> = match conn
        .query_row(
            "SELECT school_id FROM subjects WHERE id = ?",
            [&subject_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if subject_school.as_deref() != Some(school_id.as_str()) {
        return err(&req.id, "not_found", "subject not found in school", None);
    }

    let percentage_config_id = req
        .params
        .get("percentageConfigId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    if let Some(cfg_id) = &percentage_config_id {
        let cfg_school: Option<String> = match conn
            .query_row(
                "SELECT school_id FROM percentage_configs WHERE id = ?",
                [cfg_id],
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if cfg_school.as_deref() != Some(school_id.as_str()) {
            return err(
                &req.id,
                "not_found",
                "percentage config not found in school",
                None,
            );
        }
    }

    let exam_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO exams(id, school_id, class_id, subject_id, term, academic_year,
                           title, category, total_marks, percentage_config_id,
                           grading_complete, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        rusqlite::params![
            &exam_id,
            &school_id,
            &class_id,
            &subject_id,
            term,
            &academic_year,
            &title,
            category.as_str(),
            total_marks,
            &percentage_config_id,
            &now,
            &now,
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "examId": exam_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "school.create" => Some(handle_school_create(state, req)),
        "class.create" => Some(handle_class_create(state, req)),
        "subject.create" => Some(handle_subject_create(state, req)),
        "config.set" => Some(handle_config_set(state, req)),
        "exam.create" => Some(handle_exam_create(state, req)),
        _ => None,
    }
}
