use crate::db;
use crate::defaults;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::promotion::next_grade;
use serde_json::json;
use std::collections::HashSet;

fn selected_students(params: &serde_json::Value) -> Option<HashSet<String>> {
    params.get("studentIds").and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect()
    })
}

fn handle_promotion_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(grade) = req.params.get("grade").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing grade", None);
    };
    let double_promotion = req
        .params
        .get("doublePromotion")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let config = match defaults::load_config(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !config.has_grade(grade) {
        return err(
            &req.id,
            "bad_params",
            "grade is not in the configured grade list",
            Some(json!({ "grade": grade })),
        );
    }

    let target = next_grade(grade, &config.grades, double_promotion);

    let mut stmt = match conn.prepare(
        "SELECT id, roll_no, last_name, first_name, section, monthly_fee
         FROM students WHERE grade = ? AND active = 1 ORDER BY section, roll_no",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([grade], |r| {
            let id: String = r.get(0)?;
            let roll_no: i64 = r.get(1)?;
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            let section: String = r.get(4)?;
            let monthly_fee: f64 = r.get(5)?;
            Ok(match target {
                Some(to) => json!({
                    "studentId": id,
                    "rollNo": roll_no,
                    "displayName": format!("{}, {}", last, first),
                    "section": section,
                    "fromGrade": grade,
                    "toGrade": to,
                    "currentFee": monthly_fee,
                    "newFee": config.monthly_fee_for(to)
                }),
                None => json!({
                    "studentId": id,
                    "rollNo": roll_no,
                    "displayName": format!("{}, {}", last, first),
                    "section": section,
                    "fromGrade": grade,
                    "toGrade": null,
                    "skipReason": "top_grade"
                }),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(
            &req.id,
            json!({
                "fromGrade": grade,
                "targetGrade": target,
                "doublePromotion": double_promotion,
                "students": students
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_promotion_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(grade) = req.params.get("grade").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing grade", None);
    };
    let double_promotion = req
        .params
        .get("doublePromotion")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let selection = selected_students(&req.params);

    let config = match defaults::load_config(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(target) = next_grade(grade, &config.grades, double_promotion) else {
        return err(
            &req.id,
            "bad_params",
            "no grade to promote into",
            Some(json!({ "grade": grade, "doublePromotion": double_promotion })),
        );
    };
    // Section carries over unchanged; only the fee is re-derived, from
    // the fee table with the per-grade default fallback.
    let new_fee = config.monthly_fee_for(target);

    let mut stmt = match conn.prepare("SELECT id FROM students WHERE grade = ? AND active = 1") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let all_ids: Vec<String> = match stmt
        .query_map([grade], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let chosen: Vec<&String> = match &selection {
        Some(set) => all_ids.iter().filter(|id| set.contains(*id)).collect(),
        None => all_ids.iter().collect(),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let now = db::now_rfc3339();
    for student_id in &chosen {
        if let Err(e) = tx.execute(
            "UPDATE students SET grade = ?, monthly_fee = ?, updated_at = ? WHERE id = ?",
            (target, new_fee, &now, student_id.as_str()),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "studentId": student_id })),
            );
        }
    }
    let promoted = chosen.len();
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "fromGrade": grade,
            "toGrade": target,
            "promotedCount": promoted,
            "newFee": new_fee
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "promotion.preview" => Some(handle_promotion_preview(state, req)),
        "promotion.apply" => Some(handle_promotion_apply(state, req)),
        _ => None,
    }
}
