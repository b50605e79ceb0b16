use serde::{Deserialize, Serialize};

use crate::config::DocumentSettings;

/// Header row fill shared by every report type's document.
pub const HEADER_FILL: Rgb = Rgb {
    r: 41,
    g: 128,
    b: 185,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Text form used by the on-screen table and the document.
    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => format!("{}", n),
        }
    }
}

pub struct Column<R> {
    pub header: &'static str,
    pub extract: fn(&R) -> CellValue,
}

/// The one column definition per report type. Table rows, workbook rows and
/// document rows all come from here.
pub struct ColumnSpec<R> {
    columns: Vec<Column<R>>,
}

impl<R> ColumnSpec<R> {
    pub fn new(columns: Vec<Column<R>>) -> Self {
        Self { columns }
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header.to_string()).collect()
    }

    pub fn row(&self, record: &R) -> Vec<CellValue> {
        self.columns.iter().map(|c| (c.extract)(record)).collect()
    }

    pub fn rows(&self, records: &[R]) -> Vec<Vec<CellValue>> {
        records.iter().map(|r| self.row(r)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workbook {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageSize {
    A4,
    Letter,
}

impl PageSize {
    /// Portrait width and height in millimetres.
    pub fn dimensions_mm(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (210.0, 297.0),
            PageSize::Letter => (215.9, 279.4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Page metadata handed to the paginating table writer. Page breaks themselves
/// are decided by the writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub margin_mm: f32,
    pub font_size: f32,
    pub repeat_header: bool,
    pub generated_at: Option<String>,
}

impl PageLayout {
    pub fn from_settings(settings: &DocumentSettings, generated_at: Option<String>) -> Self {
        Self {
            page_size: settings.page_size,
            orientation: settings.orientation,
            margin_mm: settings.margin_mm,
            font_size: settings.font_size,
            repeat_header: true,
            generated_at: if settings.show_generated_at {
                generated_at
            } else {
                None
            },
        }
    }

    pub fn page_mm(&self) -> (f32, f32) {
        let (w, h) = self.page_size.dimensions_mm();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::from_settings(&DocumentSettings::default(), None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub header_fill: Rgb,
    pub layout: PageLayout,
}

/// Rows follow the order of `records` as passed in. No records still yields a
/// headers-only sheet.
pub fn to_workbook<R>(sheet_name: &str, records: &[R], spec: &ColumnSpec<R>) -> Workbook {
    Workbook {
        sheet_name: sheet_name.to_string(),
        headers: spec.headers(),
        rows: spec.rows(records),
    }
}

pub fn to_document<R>(
    title: &str,
    records: &[R],
    spec: &ColumnSpec<R>,
    layout: PageLayout,
) -> Document {
    Document {
        title: title.to_string(),
        headers: spec.headers(),
        rows: spec.rows(records),
        header_fill: HEADER_FILL,
        layout,
    }
}
