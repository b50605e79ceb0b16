use anyhow::anyhow;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfLayerReference, Rect, Rgb as PdfRgb,
};
use std::ops::Range;

use crate::export::{Document, Rgb};

const PT_TO_MM: f32 = 0.3528;
const TITLE_SIZE: f32 = 16.0;
const META_SIZE: f32 = 8.0;
const CELL_PAD_MM: f32 = 1.5;
// Helvetica averages roughly half an em per glyph.
const AVG_GLYPH_EM: f32 = 0.5;

/// Where the table sits on each page, derived from the layout and content.
#[derive(Debug, Clone, PartialEq)]
struct TableGeometry {
    page_w: f32,
    page_h: f32,
    margin: f32,
    row_h: f32,
    first_top: f32,
    top: f32,
    bottom: f32,
    col_widths: Vec<f32>,
}

impl TableGeometry {
    fn new(doc: &Document) -> Self {
        let layout = &doc.layout;
        let (page_w, page_h) = layout.page_mm();
        let margin = layout.margin_mm;
        let row_h = layout.font_size * PT_TO_MM + 2.0 * CELL_PAD_MM;

        let mut first_top = page_h - margin - TITLE_SIZE * PT_TO_MM - 4.0;
        if layout.generated_at.is_some() {
            first_top -= META_SIZE * PT_TO_MM + 2.0;
        }
        let bottom = margin + META_SIZE * PT_TO_MM + 2.0;

        Self {
            page_w,
            page_h,
            margin,
            row_h,
            first_top,
            top: page_h - margin,
            bottom,
            col_widths: column_widths(doc, page_w - 2.0 * margin),
        }
    }

    /// Body rows that fit under the header row between `top` and the footer.
    fn capacity(&self, top: f32) -> usize {
        let usable = top - self.bottom - self.row_h;
        ((usable / self.row_h).floor() as isize).max(1) as usize
    }
}

// Proportional to the longest text in each column, within sane bounds.
fn column_widths(doc: &Document, usable: f32) -> Vec<f32> {
    let n = doc.headers.len().max(1);
    let weights: Vec<f32> = (0..n)
        .map(|c| {
            let header = doc.headers.get(c).map(|h| h.chars().count()).unwrap_or(0);
            let longest = doc
                .rows
                .iter()
                .filter_map(|r| r.get(c))
                .map(|v| v.display().chars().count())
                .max()
                .unwrap_or(0);
            header.max(longest).clamp(4, 40) as f32
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.iter().map(|w| usable * w / total).collect()
}

/// Splits `rows` body rows into pages. There is always at least one page so
/// an empty report still prints its title and header row.
pub fn paginate(rows: usize, first_capacity: usize, capacity: usize) -> Vec<Range<usize>> {
    let first_capacity = first_capacity.max(1);
    let capacity = capacity.max(1);
    let mut pages = Vec::new();
    let mut start = 0;
    let mut cap = first_capacity;
    loop {
        let end = (start + cap).min(rows);
        pages.push(start..end);
        if end >= rows {
            break;
        }
        start = end;
        cap = capacity;
    }
    pages
}

// Windows-1252 code points outside Latin-1 that the built-in fonts can show.
const WIN_ANSI_EXTRAS: &[char] = &[
    '€', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', 'Ž', '‘', '’', '“', '”', '•', '–',
    '—', '˜', '™', 'š', '›', 'œ', 'ž', 'Ÿ',
];

fn win_ansi_encodable(c: char) -> bool {
    matches!(c, ' '..='~' | '\u{A0}'..='\u{FF}') || WIN_ANSI_EXTRAS.contains(&c)
}

/// Built-in Helvetica is WinAnsi-encoded and printpdf drops anything else, so
/// unencodable characters become `?`. Returns the text and how many were replaced.
pub fn to_win_ansi(text: &str) -> (String, usize) {
    let mut replaced = 0;
    let out: String = text
        .chars()
        .map(|c| {
            if win_ansi_encodable(c) {
                c
            } else {
                replaced += 1;
                '?'
            }
        })
        .collect();
    (out, replaced)
}

pub fn fit_text(text: &str, width_mm: f32, font_size: f32) -> String {
    let glyph = font_size * PT_TO_MM * AVG_GLYPH_EM;
    let max = ((width_mm - 2.0 * CELL_PAD_MM) / glyph).floor().max(1.0) as usize;
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

fn pdf_color(c: Rgb) -> Color {
    Color::Rgb(PdfRgb::new(
        c.r as f32 / 255.0,
        c.g as f32 / 255.0,
        c.b as f32 / 255.0,
        None,
    ))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn draw_row(
    layer: &PdfLayerReference,
    g: &TableGeometry,
    cells: &[String],
    top: f32,
    font: &IndirectFontRef,
    font_size: f32,
) -> usize {
    let baseline = top - g.row_h + CELL_PAD_MM + 0.3;
    let mut x = g.margin;
    let mut replaced = 0;
    for (i, w) in g.col_widths.iter().enumerate() {
        if let Some(text) = cells.get(i) {
            let (encoded, n) = to_win_ansi(text);
            replaced += n;
            layer.use_text(
                fit_text(&encoded, *w, font_size),
                font_size,
                Mm(x + CELL_PAD_MM),
                Mm(baseline),
                font,
            );
        }
        x += w;
    }
    replaced
}

fn draw_header(
    layer: &PdfLayerReference,
    g: &TableGeometry,
    doc: &Document,
    top: f32,
    fonts: &Fonts,
) -> usize {
    layer.set_fill_color(pdf_color(doc.header_fill));
    let rect = Rect::new(
        Mm(g.margin),
        Mm(top - g.row_h),
        Mm(g.page_w - g.margin),
        Mm(top),
    )
    .with_mode(PaintMode::Fill);
    layer.add_rect(rect);
    layer.set_fill_color(pdf_color(Rgb { r: 255, g: 255, b: 255 }));
    let replaced = draw_row(layer, g, &doc.headers, top, &fonts.bold, doc.layout.font_size);
    layer.set_fill_color(pdf_color(Rgb { r: 0, g: 0, b: 0 }));
    replaced
}

/// Renders the title, then a table that breaks across pages with the header
/// row repeated on each one, then a `Page i of n` footer.
pub fn write_document(doc: &Document) -> anyhow::Result<Vec<u8>> {
    let g = TableGeometry::new(doc);
    let font_size = doc.layout.font_size;
    let pages = paginate(
        doc.rows.len(),
        g.capacity(g.first_top),
        g.capacity(g.top),
    );

    let (pdf, first_page, first_layer) =
        PdfDocument::new(&doc.title, Mm(g.page_w), Mm(g.page_h), "table");
    let fonts = Fonts {
        regular: pdf
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("failed to load Helvetica: {e:?}"))?,
        bold: pdf
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("failed to load Helvetica-Bold: {e:?}"))?,
    };

    let total = pages.len();
    let mut replaced = 0;
    for (i, range) in pages.into_iter().enumerate() {
        let layer = if i == 0 {
            pdf.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = pdf.add_page(Mm(g.page_w), Mm(g.page_h), "table");
            pdf.get_page(page).get_layer(layer)
        };

        let mut top = g.top;
        if i == 0 {
            let (title, n) = to_win_ansi(&doc.title);
            replaced += n;
            layer.use_text(
                title,
                TITLE_SIZE,
                Mm(g.margin),
                Mm(g.page_h - g.margin - TITLE_SIZE * PT_TO_MM),
                &fonts.bold,
            );
            if let Some(at) = doc.layout.generated_at.as_deref() {
                layer.use_text(
                    format!("Generated {}", at),
                    META_SIZE,
                    Mm(g.margin),
                    Mm(g.first_top + 2.0),
                    &fonts.regular,
                );
            }
            top = g.first_top;
        }

        if i == 0 || doc.layout.repeat_header {
            replaced += draw_header(&layer, &g, doc, top, &fonts);
            top -= g.row_h;
        }
        for row in &doc.rows[range] {
            let cells: Vec<String> = row.iter().map(|c| c.display()).collect();
            replaced += draw_row(&layer, &g, &cells, top, &fonts.regular, font_size);
            top -= g.row_h;
        }

        layer.use_text(
            format!("Page {} of {}", i + 1, total),
            META_SIZE,
            Mm(g.page_w - g.margin - 22.0),
            Mm(g.margin),
            &fonts.regular,
        );
    }

    if replaced > 0 {
        tracing::warn!(
            title = %doc.title,
            replaced,
            "pdf text outside WinAnsi replaced with '?'"
        );
    }

    pdf.save_to_bytes()
        .map_err(|e| anyhow!("failed to serialize pdf: {e:?}"))
}
