use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::seed;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "demoMode": state.demo_mode
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let demo_mode = req
        .params
        .get("demoMode")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match db::open_db(&path) {
        Ok(conn) => {
            if demo_mode {
                if let Err(e) = seed::seed_demo_workspace(&conn) {
                    return err(&req.id, "seed_failed", e.to_string(), None);
                }
            }
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.demo_mode = demo_mode;
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "demoMode": demo_mode
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
