use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Right-aligned count; zero is dimmed, and `highlight` colors non-zero
/// values.
pub fn count_cell(count: usize, highlight: Option<Color>) -> Cell {
    let cell = Cell::new(count).set_alignment(CellAlignment::Right);
    match (count, highlight) {
        (0, _) => cell.fg(Color::DarkGrey),
        (_, Some(color)) => cell.fg(color).add_attribute(Attribute::Bold),
        (_, None) => cell,
    }
}

/// Creates a new `indicatif::ProgressBar` with standard styling.
///
/// Without a known length the bar is a spinner counting processed items.
pub fn new_progress_bar(len: Option<u64>) -> ProgressBar {
    let (pb, template) = match len {
        Some(len) => (
            ProgressBar::new(len),
            "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ),
        None => (
            ProgressBar::no_length(),
            "{spinner:.green} {msg} [{elapsed_precise}] {pos} processed ({per_sec})",
        ),
    };
    let style = ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
