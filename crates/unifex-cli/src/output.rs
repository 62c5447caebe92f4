use std::io::Write;

use owo_colors::OwoColorize;
use unifex_core::{ExtractionResult, Page, PageError, TextBlock};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// One text block: `[x0,y0,x1,y1] (conf) text`.
fn format_block(block: &TextBlock) -> String {
    let b = &block.bbox;
    let conf = block
        .confidence
        .map(|c| format!(" ({c:.2})"))
        .unwrap_or_default();
    format!(
        "[{:.1},{:.1},{:.1},{:.1}]{} {}",
        b.x0, b.y0, b.x1, b.y1, conf, block.text
    )
}

fn print_page(w: &mut dyn Write, page: &Page, color: ColorMode) -> std::io::Result<()> {
    let header = format!("=== Page {} ===", page.page + 1);
    if color.enabled() {
        writeln!(w, "{}", header.bold().cyan())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    for block in &page.texts {
        writeln!(w, "{}", format_block(block))?;
    }
    for (i, table) in page.tables.iter().enumerate() {
        writeln!(
            w,
            "--- Table {} ({}x{}) ---",
            i + 1,
            table.row_count,
            table.col_count
        )?;
        for row in table.to_grid() {
            writeln!(w, "{}", row.join(" | "))?;
        }
    }
    writeln!(w)?;
    Ok(())
}

fn print_failure(w: &mut dyn Write, error: &PageError, color: ColorMode) -> std::io::Result<()> {
    let line = format!("Page {} failed ({}): {}", error.page + 1, error.kind, error.message);
    if color.enabled() {
        writeln!(w, "{}", line.red())
    } else {
        writeln!(w, "{}", line)
    }
}

/// Print the document in reading order, then any failed pages.
pub fn print_result(
    w: &mut dyn Write,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    for page in &result.document.pages {
        print_page(w, page, color)?;
    }
    if !result.failed_pages.is_empty() {
        let summary = format!("{} page(s) failed:", result.failure_count());
        if color.enabled() {
            writeln!(w, "{}", summary.bold().red())?;
        } else {
            writeln!(w, "{}", summary)?;
        }
        for error in result.failed_pages.values() {
            print_failure(w, error, color)?;
        }
    }
    Ok(())
}

/// Print the whole result as pretty JSON.
pub fn print_json(w: &mut dyn Write, result: &ExtractionResult) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *w, result)?;
    writeln!(w)?;
    Ok(())
}
