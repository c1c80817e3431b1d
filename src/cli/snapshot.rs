use super::ui;
use crate::core::config::AppConfig;
use crate::snapshot::{SnapshotReport, SnapshotWriter};
use crate::store::db;
use anyhow::{Context, Result};
use comfy_table::Cell;

impl SnapshotReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Source table"),
            ui::header_cell("History table"),
            ui::header_cell("Rows"),
        ]);
        for count in &self.tables {
            table.add_row(vec![
                Cell::new(count.table),
                Cell::new(count.history_table),
                ui::count_cell(count.rows, None),
            ]);
        }

        let mut output = format!(
            "Snapshot at {}\n\n",
            ui::style_text(&self.captured_at.to_rfc3339(), ui::StyleType::Title)
        );
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n\n{}: {}",
            ui::style_text("Rows inserted", ui::StyleType::TotalLabel),
            ui::style_text(&self.total_rows().to_string(), ui::StyleType::TotalValue)
        ));
        output
    }
}

/// Snapshots every current-price table into history and prints the counts.
pub async fn run(config: &AppConfig) -> Result<()> {
    let pool = db::connect(&config.database_url).await?;
    db::ensure_history_schema(&pool).await?;

    let report = SnapshotWriter::new(pool)
        .run()
        .await
        .context("Snapshot rolled back")?;

    println!("{}", report.display_as_table());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::TableCount;
    use chrono::{TimeZone, Utc};
    use comfy_table::Color;

    #[test]
    fn test_display_as_table_lists_every_table() {
        let report = SnapshotReport {
            captured_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            tables: vec![
                TableCount {
                    table: "tcgplayer_prices",
                    history_table: "card_price_history",
                    rows: 12,
                },
                TableCount {
                    table: "sealed_prices",
                    history_table: "sealed_price_history",
                    rows: 0,
                },
            ],
        };

        let output = console::strip_ansi_codes(&report.display_as_table()).to_string();
        assert!(output.contains("2024-05-01T12:00:00+00:00"));
        assert!(output.contains("tcgplayer_prices"));
        assert!(output.contains("sealed_price_history"));
        assert!(output.contains("Rows inserted: 12"));
    }

    #[test]
    fn test_zero_count_is_dimmed() {
        let cell = ui::count_cell(0, Some(Color::Green));
        assert_eq!(cell.content(), "0");
    }
}
