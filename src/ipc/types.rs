use std::path::PathBuf;

use serde::Deserialize;

use crate::config::ReportConfig;
use crate::records::RecordSet;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One fetched RecordSet. Replaced wholesale on refresh, never edited.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub records: RecordSet,
    pub loaded_at: String,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub config: ReportConfig,
    pub datasets: Vec<Dataset>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            config: ReportConfig::default(),
            datasets: Vec::new(),
        }
    }

    pub fn dataset(&self, id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.id == id)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
