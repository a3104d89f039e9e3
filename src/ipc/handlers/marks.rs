use crate::db;
use crate::defaults;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::scoring::{aggregate_subject, RawSubjectMarks};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

const MARKS_SAVE_MAX_ENTRIES: usize = 5000;

fn handle_marks_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(grade), Some(section), Some(term)) = (
        req.params.get("grade").and_then(|v| v.as_str()),
        req.params.get("section").and_then(|v| v.as_str()),
        req.params.get("term").and_then(|v| v.as_str()),
    ) else {
        return err(&req.id, "bad_params", "missing grade/section/term", None);
    };

    match marks_grid(conn, grade, section, term) {
        Ok(grid) => ok(&req.id, grid),
        Err(e) => e.response(&req.id),
    }
}

fn marks_grid(
    conn: &Connection,
    grade: &str,
    section: &str,
    term: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let mut subjects_stmt = conn
        .prepare(
            "SELECT id, name, credit_hours, max_theory, max_practical
             FROM subjects WHERE grade = ? ORDER BY sort_order",
        )
        .map_err(HandlerErr::db_query)?;
    let subjects: Vec<(String, String, f64, f64, f64)> = subjects_stmt
        .query_map([grade], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut students_stmt = conn
        .prepare(
            "SELECT id, roll_no, last_name, first_name
             FROM students WHERE grade = ? AND section = ? ORDER BY roll_no",
        )
        .map_err(HandlerErr::db_query)?;
    let students: Vec<(String, i64, String, String)> = students_stmt
        .query_map((grade, section), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut marks_stmt = conn
        .prepare(
            "SELECT m.student_id, m.subject_id, m.theory, m.practical, m.final_grade, m.grade_point
             FROM marks m
             JOIN students s ON s.id = m.student_id
             WHERE s.grade = ? AND s.section = ? AND m.term = ?",
        )
        .map_err(HandlerErr::db_query)?;
    let mut by_pair: HashMap<(String, String), serde_json::Value> = HashMap::new();
    let rows = marks_stmt
        .query_map((grade, section, term), |r| {
            let student_id: String = r.get(0)?;
            let subject_id: String = r.get(1)?;
            let theory: f64 = r.get(2)?;
            let practical: f64 = r.get(3)?;
            let final_grade: Option<String> = r.get(4)?;
            let grade_point: Option<f64> = r.get(5)?;
            Ok((
                (student_id, subject_id.clone()),
                json!({
                    "subjectId": subject_id,
                    "theory": theory,
                    "practical": practical,
                    "finalGrade": final_grade,
                    "gradePoint": grade_point
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for (key, value) in rows {
        by_pair.insert(key, value);
    }

    let subject_defs: Vec<serde_json::Value> = subjects
        .iter()
        .map(|(id, name, credit, max_t, max_p)| {
            json!({
                "subjectId": id,
                "name": name,
                "creditHours": credit,
                "maxTheory": max_t,
                "maxPractical": max_p
            })
        })
        .collect();

    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|(student_id, roll_no, last, first)| {
            let entries: Vec<serde_json::Value> = subjects
                .iter()
                .filter_map(|(subject_id, ..)| {
                    by_pair
                        .get(&(student_id.clone(), subject_id.clone()))
                        .cloned()
                })
                .collect();
            json!({
                "studentId": student_id,
                "rollNo": roll_no,
                "displayName": format!("{}, {}", last, first),
                "entries": entries
            })
        })
        .collect();

    Ok(json!({
        "grade": grade,
        "section": section,
        "term": term,
        "subjects": subject_defs,
        "rows": rows
    }))
}

struct MarkEntry {
    student_id: String,
    subject_id: String,
    theory: f64,
    practical: f64,
}

fn parse_entries(params: &serde_json::Value) -> Result<Vec<MarkEntry>, HandlerErr> {
    let Some(items) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("entries must be an array"));
    };
    if items.is_empty() {
        return Err(HandlerErr::bad_params("entries must not be empty"));
    }
    if items.len() > MARKS_SAVE_MAX_ENTRIES {
        return Err(HandlerErr::with_details(
            "bad_params",
            "too many entries in one save",
            json!({ "max": MARKS_SAVE_MAX_ENTRIES, "got": items.len() }),
        ));
    }

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let student_id = item
            .get("studentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HandlerErr::with_details(
                    "bad_params",
                    "entry missing studentId",
                    json!({ "index": i }),
                )
            })?;
        let subject_id = item
            .get("subjectId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HandlerErr::with_details(
                    "bad_params",
                    "entry missing subjectId",
                    json!({ "index": i }),
                )
            })?;
        // Blank cells arrive as null; store as 0, never missing.
        let theory = item.get("theory").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let practical = item
            .get("practical")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        out.push(MarkEntry {
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            theory,
            practical,
        });
    }
    Ok(out)
}

fn handle_marks_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(term) = req
        .params
        .get("term")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return err(&req.id, "bad_params", "missing term", None);
    };
    let entries = match parse_entries(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let config = match defaults::load_config(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // One transaction for the whole grid save; a bad cell rolls back all
    // of it instead of leaving a half-written term.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let now = db::now_rfc3339();
    for (i, entry) in entries.iter().enumerate() {
        let subject: Option<(String, f64, f64, f64)> = match tx
            .query_row(
                "SELECT name, credit_hours, max_theory, max_practical FROM subjects WHERE id = ?",
                [&entry.subject_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
        };
        let Some((subject_name, credit_hours, max_theory, max_practical)) = subject else {
            let _ = tx.rollback();
            return err(
                &req.id,
                "not_found",
                "subject not found",
                Some(json!({ "index": i, "subjectId": entry.subject_id })),
            );
        };

        if entry.theory < 0.0 || entry.theory > max_theory {
            let _ = tx.rollback();
            return err(
                &req.id,
                "bad_params",
                "theory marks out of range",
                Some(json!({ "index": i, "value": entry.theory, "max": max_theory })),
            );
        }
        if entry.practical < 0.0 || entry.practical > max_practical {
            let _ = tx.rollback();
            return err(
                &req.id,
                "bad_params",
                "practical marks out of range",
                Some(json!({ "index": i, "value": entry.practical, "max": max_practical })),
            );
        }

        // Letter grade and grade point are snapshotted at entry time for
        // the grid; ledger output recomputes from raw marks instead.
        let result = aggregate_subject(
            &config.grade_scale,
            &RawSubjectMarks {
                subject_name,
                theory: entry.theory,
                practical: entry.practical,
                max_theory,
                max_practical,
                credit_hours,
            },
        );

        if let Err(e) = tx.execute(
            "INSERT INTO marks(id, student_id, subject_id, term, theory, practical, final_grade, grade_point, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, term) DO UPDATE SET
               theory = excluded.theory,
               practical = excluded.practical,
               final_grade = excluded.final_grade,
               grade_point = excluded.grade_point,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &entry.student_id,
                &entry.subject_id,
                term,
                entry.theory,
                entry.practical,
                &result.grade,
                result.grade_point,
                &now,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "marks", "index": i })),
            );
        }
    }

    let saved = entries.len();
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "savedCount": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.get" => Some(handle_marks_get(state, req)),
        "marks.save" => Some(handle_marks_save(state, req)),
        _ => None,
    }
}
