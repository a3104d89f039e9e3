use crate::defaults;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::normalize_sections;
use crate::scoring::GradeBand;
use serde_json::json;
use std::collections::HashMap;

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let config = match defaults::load_config(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // The fee map returned to the UI is fully materialized: explicit
    // entries plus the per-grade fallback for the rest.
    let fees: HashMap<&str, f64> = config
        .grades
        .iter()
        .map(|g| (g.as_str(), config.monthly_fee_for(g)))
        .collect();

    ok(
        &req.id,
        json!({
            "grades": config.grades,
            "sections": config.sections,
            "fees": fees,
            "gradeScale": config.grade_scale
        }),
    )
}

fn parse_grades_patch(patch: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = patch.as_array() else {
        return Err(HandlerErr::bad_params("grades must be an array of names"));
    };
    let mut grades: Vec<String> = Vec::new();
    for item in items {
        let Some(name) = item.as_str() else {
            return Err(HandlerErr::bad_params("grade names must be strings"));
        };
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(HandlerErr::bad_params("grade names must not be empty"));
        }
        if grades.contains(&name) {
            return Err(HandlerErr::with_details(
                "bad_params",
                "duplicate grade name",
                json!({ "grade": name }),
            ));
        }
        grades.push(name);
    }
    if grades.is_empty() {
        return Err(HandlerErr::bad_params("grades must not be empty"));
    }
    Ok(grades)
}

fn parse_fees_patch(patch: &serde_json::Value) -> Result<HashMap<String, f64>, HandlerErr> {
    let Some(obj) = patch.as_object() else {
        return Err(HandlerErr::bad_params(
            "fees must be an object of grade -> monthly fee",
        ));
    };
    let mut fees = HashMap::new();
    for (grade, value) in obj {
        let Some(fee) = value.as_f64() else {
            return Err(HandlerErr::bad_params("fee values must be numeric"));
        };
        if fee < 0.0 {
            return Err(HandlerErr::with_details(
                "bad_params",
                "fees must not be negative",
                json!({ "grade": grade, "fee": fee }),
            ));
        }
        fees.insert(grade.clone(), fee);
    }
    Ok(fees)
}

fn parse_grade_scale_patch(patch: &serde_json::Value) -> Result<Vec<GradeBand>, HandlerErr> {
    let scale: Vec<GradeBand> = serde_json::from_value(patch.clone())
        .map_err(|e| HandlerErr::bad_params(format!("bad grade scale: {}", e)))?;
    if scale.is_empty() {
        return Err(HandlerErr::bad_params("grade scale must not be empty"));
    }
    for band in &scale {
        if band.grade.trim().is_empty() {
            return Err(HandlerErr::bad_params("band grades must not be empty"));
        }
        if band.grade_point < 0.0 {
            return Err(HandlerErr::bad_params("grade points must not be negative"));
        }
    }
    for pair in scale.windows(2) {
        if pair[0].min_percent <= pair[1].min_percent {
            return Err(HandlerErr::bad_params(
                "grade scale cutoffs must be strictly descending",
            ));
        }
    }
    if scale.last().map(|b| b.min_percent) != Some(0.0) {
        return Err(HandlerErr::bad_params(
            "the last band must be the catch-all with cutoff 0",
        ));
    }
    Ok(scale)
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let saved = match section {
        "grades" => match parse_grades_patch(patch) {
            Ok(grades) => defaults::save_grades(conn, &grades),
            Err(e) => return e.response(&req.id),
        },
        "sections" => {
            let normalized = normalize_sections(patch);
            if normalized.is_empty() {
                return err(
                    &req.id,
                    "bad_params",
                    "sections must normalize to at least one entry",
                    None,
                );
            }
            defaults::save_sections(conn, &normalized)
        }
        "fees" => match parse_fees_patch(patch) {
            Ok(fees) => defaults::save_fees(conn, &fees),
            Err(e) => return e.response(&req.id),
        },
        "gradeScale" => match parse_grade_scale_patch(patch) {
            Ok(scale) => defaults::save_grade_scale(conn, &scale),
            Err(e) => return e.response(&req.id),
        },
        other => {
            return err(
                &req.id,
                "bad_params",
                "unknown config section",
                Some(json!({ "section": other })),
            )
        }
    };

    match saved {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
