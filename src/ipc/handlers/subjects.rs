use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    let Some(grade) = req.params.get("grade").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing grade", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, credit_hours, max_theory, max_practical, sort_order
         FROM subjects
         WHERE grade = ?
         ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([grade], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let credit_hours: f64 = row.get(2)?;
            let max_theory: f64 = row.get(3)?;
            let max_practical: f64 = row.get(4)?;
            let sort_order: i64 = row.get(5)?;
            Ok(json!({
                "subjectId": id,
                "name": name,
                "creditHours": credit_hours,
                "maxTheory": max_theory,
                "maxPractical": max_practical,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

struct SubjectUpsert {
    grade: String,
    name: String,
    credit_hours: f64,
    max_theory: f64,
    max_practical: f64,
}

fn parse_subject_upsert(params: &serde_json::Value) -> Result<SubjectUpsert, HandlerErr> {
    let grade = params
        .get("grade")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("missing grade"))?;
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("missing name"))?;

    let credit_hours = params
        .get("creditHours")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params("missing creditHours"))?;
    if credit_hours <= 0.0 {
        return Err(HandlerErr::bad_params("creditHours must be > 0"));
    }

    // A subject with no practical component is stored with 0, never null.
    let max_theory = params
        .get("maxTheory")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let max_practical = params
        .get("maxPractical")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    if max_theory < 0.0 || max_practical < 0.0 {
        return Err(HandlerErr::bad_params("maxima must not be negative"));
    }
    if max_theory + max_practical <= 0.0 {
        return Err(HandlerErr::bad_params(
            "a subject needs a positive total maximum",
        ));
    }

    Ok(SubjectUpsert {
        grade: grade.to_string(),
        name: name.to_string(),
        credit_hours,
        max_theory,
        max_practical,
    })
}

fn handle_subjects_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let up = match parse_subject_upsert(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM subjects WHERE grade = ? AND name = ?",
            (&up.grade, &up.name),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Some(subject_id) = existing {
        if let Err(e) = conn.execute(
            "UPDATE subjects SET credit_hours = ?, max_theory = ?, max_practical = ? WHERE id = ?",
            (up.credit_hours, up.max_theory, up.max_practical, &subject_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
        return ok(&req.id, json!({ "subjectId": subject_id, "created": false }));
    }

    let next_sort: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM subjects WHERE grade = ?",
        [&up.grade],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, grade, name, credit_hours, max_theory, max_practical, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &subject_id,
            &up.grade,
            &up.name,
            up.credit_hours,
            up.max_theory,
            up.max_practical,
            next_sort,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }

    ok(&req.id, json!({ "subjectId": subject_id, "created": true }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(subject_id) = req.params.get("subjectId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing subjectId", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM marks WHERE subject_id = ?", [subject_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        );
    }
    let deleted = match tx.execute("DELETE FROM subjects WHERE id = ?", [subject_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "subjects" })),
            );
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "subject not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.upsert" => Some(handle_subjects_upsert(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
