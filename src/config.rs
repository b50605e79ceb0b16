use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::export::{Orientation, PageSize};

pub const CONFIG_FILE: &str = "reportd.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentSettings {
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub font_size: f32,
    pub margin_mm: f32,
    pub show_generated_at: bool,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            orientation: Orientation::Portrait,
            font_size: 9.0,
            margin_mm: 12.0,
            show_generated_at: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkbookSettings {
    pub bold_header: bool,
    pub fit_columns: bool,
}

impl Default for WorkbookSettings {
    fn default() -> Self {
        Self {
            bold_header: true,
            fit_columns: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    /// Relative to the workspace.
    pub directory: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            directory: "exports".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    pub document: DocumentSettings,
    pub workbook: WorkbookSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Document,
    Workbook,
    Export,
}

impl ConfigSection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(Self::Document),
            "workbook" => Some(Self::Workbook),
            "export" => Some(Self::Export),
            _ => None,
        }
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_f32_range(v: &Value, key: &str, min: f32, max: f32) -> Result<f32, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))? as f32;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_choice<'a>(v: &Value, key: &str, allowed: &[&'a str]) -> Result<&'a str, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?
        .trim()
        .to_ascii_lowercase();
    allowed
        .iter()
        .find(|a| **a == s)
        .copied()
        .ok_or_else(|| format!("{} must be one of: {}", key, allowed.join(", ")))
}

fn parse_directory(v: &Value, key: &str) -> Result<String, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?
        .trim();
    if s.is_empty() || s.len() > 120 {
        return Err(format!("{} length must be in 1..=120", key));
    }
    let p = Path::new(s);
    if p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(format!("{} must be a relative path inside the workspace", key));
    }
    Ok(s.to_string())
}

/// Applies a validated patch to one section. On error `cfg` is left untouched.
pub fn merge_section_patch(
    cfg: &mut ReportConfig,
    section: ConfigSection,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let mut next = cfg.clone();
    for (k, v) in patch {
        match section {
            ConfigSection::Document => match k.as_str() {
                "pageSize" => {
                    next.document.page_size = match parse_choice(v, k, &["a4", "letter"])? {
                        "letter" => PageSize::Letter,
                        _ => PageSize::A4,
                    };
                }
                "orientation" => {
                    next.document.orientation =
                        match parse_choice(v, k, &["portrait", "landscape"])? {
                            "landscape" => Orientation::Landscape,
                            _ => Orientation::Portrait,
                        };
                }
                "fontSize" => next.document.font_size = parse_f32_range(v, k, 6.0, 14.0)?,
                "marginMm" => next.document.margin_mm = parse_f32_range(v, k, 5.0, 30.0)?,
                "showGeneratedAt" => next.document.show_generated_at = parse_bool(v, k)?,
                _ => return Err(format!("unknown document field: {}", k)),
            },
            ConfigSection::Workbook => match k.as_str() {
                "boldHeader" => next.workbook.bold_header = parse_bool(v, k)?,
                "fitColumns" => next.workbook.fit_columns = parse_bool(v, k)?,
                _ => return Err(format!("unknown workbook field: {}", k)),
            },
            ConfigSection::Export => match k.as_str() {
                "directory" => next.export.directory = parse_directory(v, k)?,
                _ => return Err(format!("unknown export field: {}", k)),
            },
        }
    }
    *cfg = next;
    Ok(())
}

/// Reads `reportd.json`; missing or malformed files fall back to defaults.
pub fn load_config(workspace: &Path) -> ReportConfig {
    let path = workspace.join(CONFIG_FILE);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return ReportConfig::default();
    };
    match serde_json::from_str::<ReportConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
            ReportConfig::default()
        }
    }
}

pub fn save_config(workspace: &Path, cfg: &ReportConfig) -> anyhow::Result<()> {
    let path = workspace.join(CONFIG_FILE);
    let text = serde_json::to_string_pretty(cfg).context("failed to serialize config")?;
    std::fs::write(&path, text)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(())
}
