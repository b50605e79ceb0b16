use crate::export::{to_document, to_workbook, PageLayout};
use crate::filter::{parse_filter_spec, FilterSpec};
use crate::ipc::error::{err, ok, report_err};
use crate::ipc::helpers::{now_iso, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{normalize, QuizAttempt, RecordKind, RecordSet, Subscription};
use crate::render::{self, sha256_hex, ExportFormat};
use crate::reports::{find_chart, options, parse_sort, prepare, ReportRecord, SortSpec};
use anyhow::Context;
use serde_json::json;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use super::datasets::{parse_kind, records_param};

/// The RecordSet a report runs over: a loaded dataset or inline records.
fn resolve_source<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<Cow<'a, RecordSet>, serde_json::Value> {
    if let Some(id) = optional_str(req, "datasetId") {
        return state
            .dataset(&id)
            .map(|d| Cow::Borrowed(&d.records))
            .ok_or_else(|| {
                err(
                    &req.id,
                    "not_found",
                    "dataset not found",
                    Some(json!({ "datasetId": id })),
                )
            });
    }
    if req.params.get("records").is_none() {
        return Err(err(
            &req.id,
            "bad_params",
            "provide datasetId or kind + records",
            None,
        ));
    }
    let kind = parse_kind(req)?;
    let raw = records_param(req)?;
    Ok(Cow::Owned(normalize(kind, raw).records))
}

struct View {
    filters: FilterSpec,
    sort: Option<SortSpec>,
}

fn parse_view<R: ReportRecord>(req: &Request) -> Result<View, serde_json::Value> {
    let filters = parse_filter_spec(req.params.get("filters"), R::FILTERS)
        .map_err(|e| report_err(&req.id, e))?;
    let sort = parse_sort(req.params.get("sort"), R::SORT_FIELDS)
        .map_err(|e| report_err(&req.id, e))?;
    Ok(View { filters, sort })
}

fn table_model<R: ReportRecord>(req: &Request, records: &[R]) -> serde_json::Value {
    let view = match parse_view::<R>(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = prepare(records, &view.filters, view.sort.as_ref());
    let columns = R::columns();
    let normalized: Vec<serde_json::Value> = rows.iter().map(R::to_json).collect();

    ok(
        &req.id,
        json!({
            "title": R::TITLE,
            "columns": columns.headers(),
            "rows": columns.rows(&rows),
            "records": normalized,
            "totalRows": rows.len(),
            "sourceRows": records.len(),
            "summary": R::summary(&rows),
            "empty": rows.is_empty(),
            "appliedFilters": view.filters,
            "sort": view.sort
        }),
    )
}

fn chart_model<R: ReportRecord>(req: &Request, records: &[R]) -> serde_json::Value {
    let name = match required_str(req, "chart") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(def) = find_chart::<R>(&name) else {
        let allowed: Vec<&str> = R::CHARTS.iter().map(|c| c.name).collect();
        return err(
            &req.id,
            "bad_params",
            format!("chart must be one of: {}", allowed.join(", ")),
            None,
        );
    };
    let view = match parse_view::<R>(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = prepare(records, &view.filters, None);
    let series = R::chart(def, &rows);

    ok(
        &req.id,
        json!({
            "chart": def.name,
            "chartType": def.chart_type,
            "chronological": def.chronological,
            "labels": series.labels,
            "values": series.values,
            "empty": series.is_empty(),
            "recordCount": rows.len()
        }),
    )
}

struct ExportModels {
    workbook: crate::export::Workbook,
    document: crate::export::Document,
}

fn export_models<R: ReportRecord>(
    state: &AppState,
    req: &Request,
    records: &[R],
) -> Result<ExportModels, serde_json::Value> {
    let view = parse_view::<R>(req)?;
    let rows = prepare(records, &view.filters, view.sort.as_ref());
    let columns = R::columns();
    let layout = PageLayout::from_settings(&state.config.document, Some(now_iso()));
    Ok(ExportModels {
        workbook: to_workbook(R::SHEET_NAME, &rows, &columns),
        document: to_document(R::TITLE, &rows, &columns, layout),
    })
}

fn export_model<R: ReportRecord>(
    state: &AppState,
    req: &Request,
    records: &[R],
) -> serde_json::Value {
    match export_models(state, req, records) {
        Ok(m) => ok(
            &req.id,
            json!({
                "workbook": m.workbook,
                "document": m.document
            }),
        ),
        Err(e) => e,
    }
}

fn default_export_path(state: &AppState, stem: &str, format: ExportFormat) -> Option<PathBuf> {
    let workspace = state.workspace.as_ref()?;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    Some(
        workspace
            .join(&state.config.export.directory)
            .join(format!("{}-{}.{}", stem, stamp, format.extension())),
    )
}

fn write_export(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(())
}

fn export_file<R: ReportRecord>(
    state: &AppState,
    req: &Request,
    records: &[R],
) -> serde_json::Value {
    let format_raw = match required_str(req, "format") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(format) = ExportFormat::parse(&format_raw) else {
        return err(&req.id, "bad_params", "format must be one of: xlsx, pdf", None);
    };
    let out_path = match optional_str(req, "outPath") {
        Some(p) => PathBuf::from(p),
        None => match default_export_path(state, R::FILE_STEM, format) {
            Some(p) => p,
            None => {
                return err(
                    &req.id,
                    "no_workspace",
                    "select a workspace first or pass outPath",
                    None,
                )
            }
        },
    };
    let models = match export_models(state, req, records) {
        Ok(m) => m,
        Err(e) => return e,
    };

    let (bytes, row_count) = match format {
        ExportFormat::Xlsx => (
            render::xlsx::write_workbook(&models.workbook, &state.config.workbook),
            models.workbook.rows.len(),
        ),
        ExportFormat::Pdf => (
            render::pdf::write_document(&models.document),
            models.document.rows.len(),
        ),
    };
    let bytes = match bytes {
        Ok(b) => b,
        Err(e) => return err(&req.id, "export_failed", format!("{e:#}"), None),
    };
    if let Err(e) = write_export(&out_path, &bytes) {
        return err(&req.id, "export_failed", format!("{e:#}"), None);
    }
    tracing::info!(
        path = %out_path.display(),
        format = format.extension(),
        rows = row_count,
        bytes = bytes.len(),
        "report exported"
    );

    ok(
        &req.id,
        json!({
            "path": out_path.to_string_lossy(),
            "format": format.extension(),
            "bytes": bytes.len(),
            "sha256": sha256_hex(&bytes),
            "rowCount": row_count
        }),
    )
}

fn handle_reports_options(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match parse_kind(req) {
        Ok(RecordKind::Subscriptions) => ok(&req.id, options::<Subscription>()),
        Ok(RecordKind::QuizAttempts) => ok(&req.id, options::<QuizAttempt>()),
        Err(e) => e,
    }
}

fn handle_reports_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let source = match resolve_source(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match source.as_ref() {
        RecordSet::Subscriptions(v) => table_model(req, v),
        RecordSet::QuizAttempts(v) => table_model(req, v),
    }
}

fn handle_reports_chart(state: &mut AppState, req: &Request) -> serde_json::Value {
    let source = match resolve_source(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match source.as_ref() {
        RecordSet::Subscriptions(v) => chart_model(req, v),
        RecordSet::QuizAttempts(v) => chart_model(req, v),
    }
}

fn handle_reports_export_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let source = match resolve_source(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match source.as_ref() {
        RecordSet::Subscriptions(v) => export_model(state, req, v),
        RecordSet::QuizAttempts(v) => export_model(state, req, v),
    }
}

fn handle_reports_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let source = match resolve_source(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match source.as_ref() {
        RecordSet::Subscriptions(v) => export_file(state, req, v),
        RecordSet::QuizAttempts(v) => export_file(state, req, v),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.options" => Some(handle_reports_options(state, req)),
        "reports.table" => Some(handle_reports_table(state, req)),
        "reports.chart" => Some(handle_reports_chart(state, req)),
        "reports.exportModel" => Some(handle_reports_export_model(state, req)),
        "reports.export" => Some(handle_reports_export(state, req)),
        _ => None,
    }
}
