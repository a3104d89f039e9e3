use crate::db;
use crate::defaults;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn student_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let grade: String = row.get(1)?;
    let section: String = row.get(2)?;
    let roll_no: i64 = row.get(3)?;
    let last_name: String = row.get(4)?;
    let first_name: String = row.get(5)?;
    let guardian: Option<String> = row.get(6)?;
    let monthly_fee: f64 = row.get(7)?;
    let active: i64 = row.get(8)?;
    Ok(json!({
        "studentId": id,
        "grade": grade,
        "section": section,
        "rollNo": roll_no,
        "lastName": last_name,
        "firstName": first_name,
        "guardian": guardian,
        "monthlyFee": monthly_fee,
        "active": active != 0
    }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let grade = req.params.get("grade").and_then(|v| v.as_str());
    let section = req.params.get("section").and_then(|v| v.as_str());

    let base = "SELECT id, grade, section, roll_no, last_name, first_name, guardian, monthly_fee, active
                FROM students";
    let (sql, binds): (String, Vec<String>) = match (grade, section) {
        (Some(g), Some(s)) => (
            format!("{base} WHERE grade = ? AND section = ? ORDER BY roll_no"),
            vec![g.to_string(), s.to_string()],
        ),
        (Some(g), None) => (
            format!("{base} WHERE grade = ? ORDER BY section, roll_no"),
            vec![g.to_string()],
        ),
        _ => (format!("{base} ORDER BY grade, section, roll_no"), vec![]),
    };

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds), student_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

struct NewStudent {
    grade: String,
    section: String,
    roll_no: i64,
    last_name: String,
    first_name: String,
    guardian: Option<String>,
    monthly_fee: f64,
}

fn parse_new_student(conn: &Connection, params: &serde_json::Value) -> Result<NewStudent, HandlerErr> {
    let config = defaults::load_config(conn).map_err(HandlerErr::db_query)?;

    let grade = params
        .get("grade")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("missing grade"))?;
    if !config.has_grade(grade) {
        return Err(HandlerErr::with_details(
            "bad_params",
            "grade is not in the configured grade list",
            json!({ "grade": grade }),
        ));
    }

    let section_raw = params
        .get("section")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    // Store the canonical code from config, whatever casing came in.
    let section = config
        .sections
        .iter()
        .find(|s| s.code.eq_ignore_ascii_case(section_raw))
        .map(|s| s.code.clone())
        .ok_or_else(|| {
            HandlerErr::with_details(
                "bad_params",
                "section is not configured",
                json!({ "section": section_raw }),
            )
        })?;

    let roll_no = params
        .get("rollNo")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing rollNo"))?;
    if roll_no < 1 {
        return Err(HandlerErr::bad_params("rollNo must be >= 1"));
    }

    let last_name = params
        .get("lastName")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("missing lastName"))?;
    let first_name = params
        .get("firstName")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("missing firstName"))?;
    let guardian = params
        .get("guardian")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let monthly_fee = match params.get("monthlyFee") {
        Some(v) if !v.is_null() => {
            let fee = v
                .as_f64()
                .ok_or_else(|| HandlerErr::bad_params("monthlyFee must be numeric"))?;
            if fee < 0.0 {
                return Err(HandlerErr::bad_params("monthlyFee must not be negative"));
            }
            fee
        }
        _ => config.monthly_fee_for(grade),
    };

    Ok(NewStudent {
        grade: grade.to_string(),
        section,
        roll_no,
        last_name: last_name.to_string(),
        first_name: first_name.to_string(),
        guardian,
        monthly_fee,
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let new = match parse_new_student(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, grade, section, roll_no, last_name, first_name, guardian, monthly_fee, active, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &student_id,
            &new.grade,
            &new.section,
            new.roll_no,
            &new.last_name,
            &new.first_name,
            &new.guardian,
            new.monthly_fee,
            db::now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "monthlyFee": new.monthly_fee }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    for (key, value) in patch {
        let result = match key.as_str() {
            "firstName" | "lastName" => {
                let column = if key == "firstName" {
                    "first_name"
                } else {
                    "last_name"
                };
                match value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                    Some(s) => conn.execute(
                        &format!("UPDATE students SET {} = ? WHERE id = ?", column),
                        (s, student_id),
                    ),
                    None => return err(&req.id, "bad_params", format!("{key} must be a non-empty string"), None),
                }
            }
            "guardian" => {
                let guardian = value.as_str().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
                conn.execute(
                    "UPDATE students SET guardian = ? WHERE id = ?",
                    (guardian, student_id),
                )
            }
            "section" => {
                let Some(raw) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "section must be a non-empty string", None);
                };
                let config = match defaults::load_config(conn) {
                    Ok(c) => c,
                    Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
                };
                let Some(canonical) = config
                    .sections
                    .iter()
                    .find(|s| s.code.eq_ignore_ascii_case(raw))
                    .map(|s| s.code.clone())
                else {
                    return err(
                        &req.id,
                        "bad_params",
                        "section is not configured",
                        Some(json!({ "section": raw })),
                    );
                };
                conn.execute(
                    "UPDATE students SET section = ? WHERE id = ?",
                    (canonical, student_id),
                )
            }
            "rollNo" => match value.as_i64().filter(|n| *n >= 1) {
                Some(n) => conn.execute(
                    "UPDATE students SET roll_no = ? WHERE id = ?",
                    (n, student_id),
                ),
                None => return err(&req.id, "bad_params", "rollNo must be an integer >= 1", None),
            },
            "monthlyFee" => match value.as_f64().filter(|f| *f >= 0.0) {
                Some(f) => conn.execute(
                    "UPDATE students SET monthly_fee = ? WHERE id = ?",
                    (f, student_id),
                ),
                None => return err(&req.id, "bad_params", "monthlyFee must be >= 0", None),
            },
            "active" => match value.as_bool() {
                Some(b) => conn.execute(
                    "UPDATE students SET active = ? WHERE id = ?",
                    (b as i64, student_id),
                ),
                None => return err(&req.id, "bad_params", "active must be boolean", None),
            },
            other => {
                return err(
                    &req.id,
                    "bad_params",
                    "unknown student field",
                    Some(json!({ "field": other })),
                )
            }
        };
        if let Err(e) = result {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    if let Err(e) = conn.execute(
        "UPDATE students SET updated_at = ? WHERE id = ?",
        (db::now_rfc3339(), student_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Marks first; no ON DELETE CASCADE.
    if let Err(e) = tx.execute("DELETE FROM marks WHERE student_id = ?", [student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
