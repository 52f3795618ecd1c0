//! Page queue orchestrator: one loaded document, one run at a time.
//!
//! ## Run lifecycle
//!
//! ```text
//! load ──▶ start(mode) ──▶ workers claim pages ──▶ RunHandle::wait
//!               │                 ▲
//!               └── stop() ───────┘ (checked before each claim)
//! ```
//!
//! A run queues every page that is `pending` or `failed`, in document order.
//! Completed pages are never touched again, so calling `start` after a stop
//! or after failures resumes exactly where the document needs work.
//!
//! Cancellation is cooperative. `stop` raises a flag that workers check
//! before claiming their next page; a page already being analysed runs to
//! completion and its result is recorded.
//!
//! ## Concurrency
//!
//! `concurrency` logical workers run inside one spawned task and share an
//! atomic cursor into the queue. With the default of one worker, pages are
//! processed strictly in order.

use crate::config::ReviewConfig;
use crate::error::{PageError, ReviewError};
use crate::output::{AnalysisItem, ItemField, TaskMode};
use crate::pipeline::encode::encode_page;
use crate::pipeline::gateway::PageAnalyzer;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::store::{ProgressStats, ResultStore, Snapshot};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Pages the run claimed.
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    /// The run was stopped before its queue was exhausted.
    pub cancelled: bool,
}

/// Raises the cancellation flag of one run. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            info!("Stop requested; in-flight pages will finish");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A started run.
#[derive(Debug)]
pub struct RunHandle {
    join: JoinHandle<RunSummary>,
    stop: StopHandle,
}

impl RunHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait until every worker has exited.
    pub async fn wait(self) -> Result<RunSummary, ReviewError> {
        self.join
            .await
            .map_err(|e| ReviewError::Internal(format!("Run task panicked: {e}")))
    }
}

struct Session {
    renderer: Arc<dyn PageRenderer>,
    store: ResultStore,
    stop: Option<StopHandle>,
}

/// Drives page analysis for one document.
pub struct Orchestrator {
    config: ReviewConfig,
    analyzer: Arc<dyn PageAnalyzer>,
    session: Option<Session>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("pages", &self.session.as_ref().map(|s| s.store.page_count()))
            .finish()
    }
}

impl Orchestrator {
    pub fn new(config: ReviewConfig, analyzer: Arc<dyn PageAnalyzer>) -> Self {
        Self {
            config,
            analyzer,
            session: None,
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    // ── Session ───────────────────────────────────────────────────────────

    /// Replace the session with a fresh one: one pending record per page.
    /// Any active run is stopped first.
    pub fn load(&mut self, renderer: Arc<dyn PageRenderer>) -> usize {
        self.stop();
        let pages = renderer.page_count();
        self.session = Some(Session {
            store: ResultStore::new(pages),
            renderer,
            stop: None,
        });
        info!("Document loaded: {} pages", pages);
        pages
    }

    /// Open a local path or HTTP(S) URL with pdfium and load it.
    ///
    /// On failure the previous session is left as it was.
    pub async fn load_pdf(&mut self, input: &str) -> Result<usize, ReviewError> {
        let renderer = PdfiumRenderer::open(input, &self.config).await?;
        Ok(self.load(renderer.into_shared()))
    }

    /// Stop any run and discard the session.
    pub fn reset(&mut self) {
        self.stop();
        self.session = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.store.is_running())
    }

    // ── Runs ──────────────────────────────────────────────────────────────

    /// Start processing every pending or failed page with `mode`.
    ///
    /// If the session holds results of the other mode, all non-pending pages
    /// are reset to pending first.
    pub fn start(&mut self, mode: TaskMode) -> Result<RunHandle, ReviewError> {
        let session = self.session.as_mut().ok_or(ReviewError::NoDocument)?;
        if session.store.is_running() {
            return Err(ReviewError::RunInProgress);
        }

        let queue = session.store.begin_run(mode);
        let stop = StopHandle::default();
        session.stop = Some(stop.clone());

        info!(
            "Starting {} run: {} of {} pages queued, concurrency {}",
            mode,
            queue.len(),
            session.store.page_count(),
            self.config.concurrency
        );

        let ctx = RunContext {
            renderer: Arc::clone(&session.renderer),
            analyzer: Arc::clone(&self.analyzer),
            store: session.store.clone(),
            stop: stop.clone(),
            mode,
            jpeg_quality: self.config.jpeg_quality,
            concurrency: self.config.concurrency,
        };
        let join = tokio::spawn(run_queue(ctx, queue));

        Ok(RunHandle { join, stop })
    }

    /// Ask the active run to stop. Idempotent; a no-op without a run.
    pub fn stop(&self) {
        if let Some(stop) = self.session.as_ref().and_then(|s| s.stop.as_ref()) {
            stop.stop();
        }
    }

    // ── Results ───────────────────────────────────────────────────────────

    /// Overwrite one field of one item (0-based indices). Permitted during
    /// a run; never changes the page status.
    pub fn update_item(
        &self,
        page_index: usize,
        item_index: usize,
        field: ItemField,
        value: impl Into<String>,
    ) -> Result<(), ReviewError> {
        self.store()?
            .update_item(page_index, item_index, field, value)
    }

    pub fn store(&self) -> Result<&ResultStore, ReviewError> {
        self.session
            .as_ref()
            .map(|s| &s.store)
            .ok_or(ReviewError::NoDocument)
    }

    /// Current state; empty when nothing is loaded.
    pub fn snapshot(&self) -> Snapshot {
        self.store().map(ResultStore::snapshot).unwrap_or_default()
    }

    pub fn stats(&self) -> ProgressStats {
        self.store().map(ResultStore::stats).unwrap_or_default()
    }

    pub fn subscribe(&self) -> Result<watch::Receiver<Snapshot>, ReviewError> {
        self.store().map(ResultStore::subscribe)
    }
}

// ── Workers ──────────────────────────────────────────────────────────────────

struct RunContext {
    renderer: Arc<dyn PageRenderer>,
    analyzer: Arc<dyn PageAnalyzer>,
    store: ResultStore,
    stop: StopHandle,
    mode: TaskMode,
    jpeg_quality: u8,
    concurrency: usize,
}

/// Ends the run in the store even if a worker panics, failing the pages
/// that were left mid-flight.
struct RunGuard(ResultStore);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.end_run();
    }
}

#[derive(Default)]
struct Tally {
    completed: usize,
    failed: usize,
}

async fn run_queue(ctx: RunContext, queue: Vec<usize>) -> RunSummary {
    let _guard = RunGuard(ctx.store.clone());
    let start = Instant::now();
    let cursor = AtomicUsize::new(0);

    let workers = ctx.concurrency.max(1).min(queue.len());
    let tallies = join_all((0..workers).map(|_| worker(&ctx, &queue, &cursor))).await;

    let mut summary = RunSummary::default();
    for t in tallies {
        summary.completed += t.completed;
        summary.failed += t.failed;
    }
    summary.attempted = summary.completed + summary.failed;
    summary.cancelled = ctx.stop.is_stopped() && summary.attempted < queue.len();

    info!(
        "Run finished in {:.1}s: {} completed, {} failed{}",
        start.elapsed().as_secs_f64(),
        summary.completed,
        summary.failed,
        if summary.cancelled { " (stopped)" } else { "" }
    );
    summary
}

async fn worker(ctx: &RunContext, queue: &[usize], cursor: &AtomicUsize) -> Tally {
    let mut tally = Tally::default();
    loop {
        if ctx.stop.is_stopped() {
            break;
        }
        let Some(&index) = queue.get(cursor.fetch_add(1, Ordering::SeqCst)) else {
            break;
        };
        if process_page(ctx, index).await {
            tally.completed += 1;
        } else {
            tally.failed += 1;
        }
    }
    tally
}

/// Returns whether the page completed.
async fn process_page(ctx: &RunContext, index: usize) -> bool {
    let page = index + 1;
    let total = ctx.store.page_count();
    if let Err(e) = ctx.store.mark_processing(index) {
        warn!("Page {}: {}", page, e);
        return false;
    }

    let start = Instant::now();
    let recorded = match analyze_page(ctx, index).await {
        Ok(items) => {
            info!(
                "Page {}/{} analysed: {} items ({} ms)",
                page,
                total,
                items.len(),
                start.elapsed().as_millis()
            );
            ctx.store.complete(index, items).map(|_| true)
        }
        Err(e) => {
            warn!("Page {}/{} failed: {}", page, total, e);
            if let Some(raw) = e.raw() {
                debug!("Page {} raw model output: {}", page, raw);
            }
            ctx.store.fail(index, e.to_string()).map(|_| false)
        }
    };

    recorded.unwrap_or_else(|e| {
        warn!("Page {}: could not record result: {}", page, e);
        false
    })
}

async fn analyze_page(ctx: &RunContext, index: usize) -> Result<Vec<AnalysisItem>, PageError> {
    let image = ctx.renderer.render_page(index).await?;
    let encoded = encode_page(&image, ctx.jpeg_quality).map_err(|e| PageError::RenderFailed {
        page: index + 1,
        detail: format!("JPEG encoding failed: {e}"),
    })?;
    ctx.analyzer.analyze(&encoded, ctx.mode).await
}
