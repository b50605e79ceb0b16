use crate::config::{merge_section_patch, save_config, ConfigSection};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!(state.config))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = ConfigSection::parse(section_raw) else {
        return err(
            &req.id,
            "bad_params",
            "section must be one of: document, workbook, export",
            None,
        );
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut next = state.config.clone();
    if let Err(msg) = merge_section_patch(&mut next, section, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = save_config(&workspace, &next) {
        return err(&req.id, "config_write_failed", format!("{e:#}"), None);
    }
    state.config = next;
    ok(&req.id, json!(state.config))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
