use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, optional_str, required_str};
use crate::ipc::types::{AppState, Dataset, Request};
use crate::records::{normalize, RecordKind};
use serde_json::json;
use uuid::Uuid;

pub fn parse_kind(req: &Request) -> Result<RecordKind, serde_json::Value> {
    let raw = required_str(req, "kind")?;
    RecordKind::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "kind must be one of: subscriptions, quizAttempts",
            Some(json!({ "kind": raw })),
        )
    })
}

pub fn records_param<'a>(req: &'a Request) -> Result<&'a Vec<serde_json::Value>, serde_json::Value> {
    req.params
        .get("records")
        .and_then(|v| v.as_array())
        .ok_or_else(|| err(&req.id, "bad_params", "records must be an array", None))
}

fn handle_datasets_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let kind = match parse_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw = match records_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let outcome = normalize(kind, raw);

    // Passing an existing datasetId is a refresh: the old RecordSet is replaced.
    let replace_id = optional_str(req, "datasetId");
    if let Some(id) = replace_id.as_deref() {
        match state.dataset(id) {
            None => return err(&req.id, "not_found", "dataset not found", Some(json!({ "datasetId": id }))),
            Some(existing) if existing.records.kind() != kind => {
                return err(
                    &req.id,
                    "bad_params",
                    "kind does not match the dataset being replaced",
                    Some(json!({ "datasetId": id, "kind": existing.records.kind().as_str() })),
                )
            }
            Some(_) => {}
        }
    }

    let id = replace_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let record_count = outcome.records.len();
    let dataset = Dataset {
        id: id.clone(),
        records: outcome.records,
        loaded_at: now_iso(),
    };
    match state.datasets.iter_mut().find(|d| d.id == id) {
        Some(slot) => *slot = dataset,
        None => state.datasets.push(dataset),
    }
    tracing::info!(
        dataset = %id,
        kind = kind.as_str(),
        records = record_count,
        skipped = outcome.skipped,
        "dataset loaded"
    );

    ok(
        &req.id,
        json!({
            "datasetId": id,
            "kind": kind.as_str(),
            "recordCount": record_count,
            "skippedCount": outcome.skipped
        }),
    )
}

fn handle_datasets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let datasets: Vec<serde_json::Value> = state
        .datasets
        .iter()
        .map(|d| {
            json!({
                "datasetId": d.id,
                "kind": d.records.kind().as_str(),
                "recordCount": d.records.len(),
                "loadedAt": d.loaded_at
            })
        })
        .collect();
    ok(&req.id, json!({ "datasets": datasets }))
}

fn handle_datasets_drop(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_str(req, "datasetId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let before = state.datasets.len();
    state.datasets.retain(|d| d.id != id);
    let dropped = state.datasets.len() != before;
    if dropped {
        tracing::info!(dataset = %id, "dataset dropped");
    }
    ok(&req.id, json!({ "dropped": dropped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "datasets.load" => Some(handle_datasets_load(state, req)),
        "datasets.list" => Some(handle_datasets_list(state, req)),
        "datasets.drop" => Some(handle_datasets_drop(state, req)),
        _ => None,
    }
}
