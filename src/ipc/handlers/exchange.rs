use crate::defaults;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn handle_export_ledger_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let Some(out_path) = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    let config = match defaults::load_config(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let model = match super::ledger::build_ledger(conn, &config, grade, section, term) {
        Ok(m) => m,
        Err(e) => return e.response(&req.id),
    };

    let mut csv = String::from(
        "roll_no,student,total_marks,max_total,percentage,gpa,grade,result,rank\n",
    );
    for row in &model.rows {
        let a = &row.aggregate;
        csv.push_str(&format!(
            "{},{},{},{},{:.2},{:.2},{},{},{}\n",
            a.roll_no,
            csv_quote(&row.display_name),
            a.total_marks,
            a.max_total,
            a.percentage,
            a.gpa,
            csv_quote(&a.overall_grade),
            if a.passed { "PASS" } else { "FAIL" },
            a.rank.map(|r| r.to_string()).unwrap_or_default(),
        ));
    }

    if let Err(e) = std::fs::write(&out_path, csv) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "outPath": out_path.to_string_lossy() })),
        );
    }

    ok(
        &req.id,
        json!({
            "outPath": out_path.to_string_lossy(),
            "rowCount": model.rows.len()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportLedgerCsv" => Some(handle_export_ledger_csv(state, req)),
        _ => None,
    }
}
