//! Cursor-driven, concurrency-bounded harvesting of listing prices.
//!
//! The harvester walks the id space in ascending order, one batch at a
//! time:
//!
//! ```text
//! FETCH_BATCH -> DISPATCH (<= N in flight) -> AWAIT_BATCH_COMPLETE
//!             -> ADVANCE_CURSOR -> FETCH_BATCH | DONE
//! ```
//!
//! The cursor is persisted only once every lookup of a batch has resolved,
//! so a crash never skips ids; it may re-issue lookups of the batch that
//! was in flight, which the pricing endpoint has to tolerate.

use crate::core::error::Result;
use crate::core::price::{Lookup, PriceLookup};
use crate::store::CursorStore;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const MIN_BATCH_SIZE: usize = 50;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_FRESHNESS_DAYS: i64 = 7;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(750);

/// Ordered id space being harvested.
#[async_trait]
pub trait IdSource: Send + Sync {
    /// Up to `limit` ids strictly greater than `after`, ascending.
    async fn next_batch(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum HarvestOutcome {
    Found { price: f64, url: Option<String> },
    NotFound,
    Error(String),
}

impl From<anyhow::Result<Lookup>> for HarvestOutcome {
    fn from(result: anyhow::Result<Lookup>) -> Self {
        match result {
            Ok(Lookup::Found { price, url }) => HarvestOutcome::Found { price, url },
            Ok(Lookup::NotFound) => HarvestOutcome::NotFound,
            Err(e) => HarvestOutcome::Error(format!("{e:#}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Stop once this many ids were processed; `None` is unlimited.
    pub limit: Option<usize>,
    pub start_after: Option<String>,
    pub dry_run: bool,
    pub batch_delay: Duration,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            limit: None,
            start_after: None,
            dry_run: false,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

impl HarvestOptions {
    /// Applies the batch floor and the concurrency bounds.
    pub fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(MIN_BATCH_SIZE);
        self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        self.limit = self.limit.filter(|l| *l > 0);
        self.start_after = self.start_after.filter(|s| !s.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    Exhausted,
    LimitReached,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestStats {
    pub batches: usize,
    pub processed: usize,
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
    pub last_cursor: Option<String>,
}

impl HarvestStats {
    fn record(&mut self, outcomes: &[(String, HarvestOutcome)]) {
        self.batches += 1;
        self.processed += outcomes.len();
        for (_, outcome) in outcomes {
            match outcome {
                HarvestOutcome::Found { .. } => self.found += 1,
                HarvestOutcome::NotFound => self.not_found += 1,
                HarvestOutcome::Error(_) => self.errors += 1,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReport {
    pub stats: HarvestStats,
    pub reason: DoneReason,
    pub dry_run: bool,
}

enum Phase {
    FetchBatch,
    Dispatch(Vec<String>),
    AdvanceCursor(String),
    Done(DoneReason),
}

pub struct Harvester<'a> {
    ids: &'a dyn IdSource,
    lookup: &'a dyn PriceLookup,
    cursor_store: &'a dyn CursorStore,
    options: HarvestOptions,
    progress: ProgressBar,
}

impl<'a> Harvester<'a> {
    pub fn new(
        ids: &'a dyn IdSource,
        lookup: &'a dyn PriceLookup,
        cursor_store: &'a dyn CursorStore,
        options: HarvestOptions,
    ) -> Self {
        Self {
            ids,
            lookup,
            cursor_store,
            options: options.normalized(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Runs batches until the id space or the item limit is exhausted.
    ///
    /// Per-id failures are counted, never returned. An error is returned
    /// only when the id source or the cursor store fails; batches completed
    /// before that stay committed.
    pub async fn run(&self) -> Result<HarvestReport> {
        let mut cursor = match &self.options.start_after {
            Some(start) => {
                info!(start_after = %start, "Starting after explicit cursor");
                Some(start.clone())
            }
            None => self.cursor_store.load().await?,
        };
        info!(
            cursor = ?cursor,
            batch = self.options.batch_size,
            concurrency = self.options.concurrency,
            limit = ?self.options.limit,
            dry_run = self.options.dry_run,
            "Harvest starting"
        );

        let mut stats = HarvestStats::default();
        let mut phase = Phase::FetchBatch;
        loop {
            phase = match phase {
                Phase::FetchBatch => {
                    let remaining = self.options.limit.map(|l| l.saturating_sub(stats.processed));
                    if remaining == Some(0) {
                        Phase::Done(DoneReason::LimitReached)
                    } else {
                        let size = remaining.map_or(self.options.batch_size, |r| {
                            r.min(self.options.batch_size)
                        });
                        let batch = self.ids.next_batch(cursor.as_deref(), size).await?;
                        if batch.is_empty() {
                            Phase::Done(DoneReason::Exhausted)
                        } else {
                            Phase::Dispatch(batch)
                        }
                    }
                }
                Phase::Dispatch(batch) => {
                    if self.options.dry_run {
                        info!(
                            count = batch.len(),
                            first = ?batch.first(),
                            last = ?batch.last(),
                            "Dry run, would fetch batch"
                        );
                        debug!(ids = ?batch, "Dry run batch ids");
                        stats.batches += 1;
                        stats.processed += batch.len();
                    } else {
                        let outcomes = self.run_batch(&batch).await;
                        stats.record(&outcomes);
                    }
                    match batch.into_iter().last() {
                        Some(last) => Phase::AdvanceCursor(last),
                        None => Phase::Done(DoneReason::Exhausted),
                    }
                }
                Phase::AdvanceCursor(last) => {
                    if !self.options.dry_run {
                        self.cursor_store.save(&last).await?;
                    }
                    info!(
                        cursor = %last,
                        processed = stats.processed,
                        found = stats.found,
                        not_found = stats.not_found,
                        errors = stats.errors,
                        "Batch complete"
                    );
                    stats.last_cursor = Some(last.clone());
                    cursor = Some(last);
                    tokio::time::sleep(self.options.batch_delay).await;
                    Phase::FetchBatch
                }
                Phase::Done(reason) => {
                    if reason == DoneReason::Exhausted && !self.options.dry_run {
                        // next scheduled run starts a fresh pass
                        self.cursor_store.clear().await?;
                    }
                    info!(?reason, processed = stats.processed, "Harvest done");
                    self.progress.finish_and_clear();
                    return Ok(HarvestReport {
                        stats,
                        reason,
                        dry_run: self.options.dry_run,
                    });
                }
            };
        }
    }

    /// Looks up every id of the batch with at most `concurrency` lookups in
    /// flight, and returns once all of them resolved.
    #[instrument(name = "HarvestBatch", skip_all, fields(size = batch.len()))]
    pub async fn run_batch(&self, batch: &[String]) -> Vec<(String, HarvestOutcome)> {
        stream::iter(batch)
            .map(|id| async move {
                let outcome = HarvestOutcome::from(self.lookup.lookup(id).await);
                match &outcome {
                    HarvestOutcome::Found { price, .. } => debug!(%id, price, "Found"),
                    HarvestOutcome::NotFound => debug!(%id, "Not found"),
                    HarvestOutcome::Error(e) => warn!(%id, error = %e, "Lookup failed"),
                }
                self.progress.inc(1);
                (id.clone(), outcome)
            })
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await
    }
}
