use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "datasetCount": state.datasets.len()
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    if let Err(e) = std::fs::create_dir_all(&path) {
        return err(
            &req.id,
            "workspace_open_failed",
            format!("failed to create {}: {}", path.to_string_lossy(), e),
            None,
        );
    }

    // A bad config file must not keep the workspace from opening.
    let cfg = config::load_config(&path);
    tracing::info!(path = %path.display(), "workspace selected");
    state.workspace = Some(path.clone());
    state.config = cfg;
    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "config": state.config
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
