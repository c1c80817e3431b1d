use super::ui;
use crate::core::config::AppConfig;
use crate::harvest::{DoneReason, HarvestOptions, HarvestReport, Harvester};
use crate::providers::PricingEndpoint;
use crate::store::{FileCursorStore, SqliteIdSource, db};
use anyhow::Result;
use comfy_table::Color;
use std::time::Duration;
use tracing::{debug, info};

/// Command-line settings of one harvest run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestArgs {
    /// Walk every id instead of only those without a fresh listing price.
    pub all: bool,
    pub freshness_days: i64,
    /// Zero is unlimited.
    pub limit: usize,
    pub batch: usize,
    pub concurrency: usize,
    pub start_after: Option<String>,
    pub dry_run: bool,
    pub base: Option<String>,
    pub delay_ms: u64,
    pub timeout_secs: u64,
}

impl HarvestArgs {
    pub fn options(&self) -> HarvestOptions {
        HarvestOptions {
            batch_size: self.batch,
            concurrency: self.concurrency,
            limit: (self.limit > 0).then_some(self.limit),
            start_after: self.start_after.clone(),
            dry_run: self.dry_run,
            batch_delay: Duration::from_millis(self.delay_ms),
        }
        .normalized()
    }

    fn freshness(&self) -> Option<chrono::Duration> {
        (!self.all).then(|| chrono::Duration::days(self.freshness_days.max(0)))
    }
}

impl HarvestReport {
    pub fn display_as_table(&self) -> String {
        let stats = &self.stats;
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Batches"),
            ui::header_cell("Processed"),
            ui::header_cell("Found"),
            ui::header_cell("Not found"),
            ui::header_cell("Errors"),
        ]);
        table.add_row(vec![
            ui::count_cell(stats.batches, None),
            ui::count_cell(stats.processed, None),
            ui::count_cell(stats.found, Some(Color::Green)),
            ui::count_cell(stats.not_found, None),
            ui::count_cell(stats.errors, Some(Color::Red)),
        ]);

        let title = if self.dry_run {
            "Harvest (dry run)"
        } else {
            "Harvest"
        };
        let mut output = format!("{}\n\n", ui::style_text(title, ui::StyleType::Title));
        output.push_str(&table.to_string());

        let reason = match self.reason {
            DoneReason::Exhausted => "id space exhausted",
            DoneReason::LimitReached => "item limit reached",
        };
        let cursor = stats.last_cursor.as_deref().unwrap_or("-");
        output.push_str(&format!(
            "\n\n{}: {} {}",
            ui::style_text("Stopped", ui::StyleType::TotalLabel),
            reason,
            ui::style_text(&format!("(last id {cursor})"), ui::StyleType::Subtle)
        ));
        output
    }
}

/// Runs the harvester against the configured database and pricing service.
///
/// Credentials and the pricing base URL are checked before anything is
/// opened, so a misconfigured scheduled run fails without touching the
/// cursor.
pub async fn run(config: &AppConfig, args: &HarvestArgs) -> Result<()> {
    let credentials = config.harvest_credentials()?;
    debug!(client_id = %credentials.client_id, "Harvest credentials present");

    let base_url = args.base.as_deref().unwrap_or(&config.pricing_base_url);
    let endpoint = PricingEndpoint::new(
        base_url,
        &credentials.cron_secret,
        Duration::from_secs(args.timeout_secs.max(1)),
    )?;

    let pool = db::connect(&config.database_url).await?;
    let ids = SqliteIdSource::new(pool, args.freshness());
    let cursor_path = config.cursor_path()?;
    info!(
        base = %base_url,
        cursor = %cursor_path.display(),
        all = args.all,
        "Harvest configured"
    );
    let cursor_store = FileCursorStore::new(cursor_path);

    let options = args.options();
    let progress = ui::new_progress_bar(options.limit.map(|l| l as u64));
    progress.set_message("Harvesting");

    let report = Harvester::new(&ids, &endpoint, &cursor_store, options)
        .with_progress(progress)
        .run()
        .await?;

    println!("{}", report.display_as_table());
    if report.stats.errors > 0 {
        println!(
            "{}",
            ui::style_text(
                &format!("{} lookups failed, see log for details", report.stats.errors),
                ui::StyleType::Error
            )
        );
    }
    Ok(())
}
