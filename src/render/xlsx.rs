use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

use crate::config::WorkbookSettings;
use crate::export::{CellValue, Workbook};

const SHEET_NAME_MAX: usize = 31;

/// Excel rejects `[]:*?/\` in sheet names and anything over 31 characters.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(SHEET_NAME_MAX)
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').trim().to_string();
    if cleaned.is_empty() {
        "Report".to_string()
    } else {
        cleaned
    }
}

pub fn write_workbook(workbook: &Workbook, settings: &WorkbookSettings) -> anyhow::Result<Vec<u8>> {
    let mut xlsx = XlsxWorkbook::new();
    let sheet = xlsx.add_worksheet();
    let name = sanitize_sheet_name(&workbook.sheet_name);
    sheet.set_name(&name)?;

    let mut header_format = Format::new();
    if settings.bold_header {
        header_format = header_format.set_bold();
    }
    for (col, header) in workbook.headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (i, row) in workbook.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                CellValue::Text(s) => {
                    sheet.write_string(r, col as u16, s)?;
                }
                CellValue::Number(n) => {
                    sheet.write_number(r, col as u16, *n)?;
                }
            }
        }
    }

    if settings.fit_columns {
        sheet.autofit();
    }

    Ok(xlsx.save_to_buffer()?)
}
