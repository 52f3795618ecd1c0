//! Page records for one loaded document, shared between the run workers,
//! the editing API and any number of observers.
//!
//! The whole state lives in a single [`Snapshot`] behind a
//! `tokio::sync::watch` channel. Every mutation replaces exactly one page
//! record (or, for run bookkeeping, the run flags) inside one
//! `send_modify` call, so a reader never sees a half-written record and a
//! concurrent edit can never be lost to a stale copy.
//!
//! Observers either call [`ResultStore::snapshot`] when they need the
//! current state, or hold a [`ResultStore::subscribe`] receiver /
//! [`ResultStore::updates`] stream and redraw on change.

use crate::error::ReviewError;
use crate::output::{AnalysisItem, ItemField, PageRecord, PageStatus, TaskMode};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

/// Error recorded on a page whose worker died before settling it.
pub const RUN_ABORTED: &str = "Run aborted before this page finished";

/// Point-in-time view of every page of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub pages: Vec<PageRecord>,
    /// Mode of the most recent run; `None` before the first run.
    pub mode: Option<TaskMode>,
    pub running: bool,
}

impl Snapshot {
    pub fn stats(&self) -> ProgressStats {
        let mut stats = ProgressStats {
            total: self.pages.len(),
            ..Default::default()
        };
        for page in &self.pages {
            match page.status {
                PageStatus::Pending => stats.pending += 1,
                PageStatus::Processing => stats.processing += 1,
                PageStatus::Completed => stats.completed += 1,
                PageStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

/// Counts derived from a [`Snapshot`]; never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ProgressStats {
    /// `completed / total`; 0.0 for an empty document.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Progress as a whole-number percentage.
    pub fn percent(&self) -> f64 {
        (self.progress() * 100.0).round()
    }

    /// Pages that reached a terminal state (completed or failed).
    pub fn settled(&self) -> usize {
        self.completed + self.failed
    }
}

/// Shared, observable page records. Cloning shares the same store.
#[derive(Debug, Clone)]
pub struct ResultStore {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl ResultStore {
    /// One `pending` record per page, numbered `1..=page_count`.
    pub fn new(page_count: usize) -> Self {
        let snapshot = Snapshot {
            pages: (1..=page_count).map(PageRecord::pending).collect(),
            mode: None,
            running: false,
        };
        let (tx, _rx) = watch::channel(snapshot);
        Self { tx: Arc::new(tx) }
    }

    pub fn page_count(&self) -> usize {
        self.tx.borrow().pages.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn stats(&self) -> ProgressStats {
        self.tx.borrow().stats()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Stream of snapshots, starting with the current one.
    pub fn updates(&self) -> WatchStream<Snapshot> {
        WatchStream::new(self.tx.subscribe())
    }

    // ── Run bookkeeping ───────────────────────────────────────────────────

    /// Mark a run of `mode` as active and return the page indices it should
    /// process, in document order.
    ///
    /// When the previous run used a different mode, every page that is not
    /// pending is cleared back to pending first, since its items have the
    /// other shape.
    pub fn begin_run(&self, mode: TaskMode) -> Vec<usize> {
        let mut queue = Vec::new();
        self.tx.send_modify(|snap| {
            if snap.mode.is_some_and(|m| m != mode) {
                let mut cleared = 0;
                for page in snap.pages.iter_mut() {
                    if page.status != PageStatus::Pending {
                        *page = PageRecord::pending(page.page_number);
                        cleared += 1;
                    }
                }
                debug!("Mode switched to {}; cleared {} pages", mode, cleared);
            }
            snap.mode = Some(mode);
            snap.running = true;
            queue = resumable(&snap.pages);
        });
        queue
    }

    /// Mark the run as finished.
    ///
    /// A page still `processing` at this point lost its worker (a panic in
    /// the renderer or analyzer); it is failed so the next run retries it.
    pub fn end_run(&self) {
        self.tx.send_modify(|snap| {
            snap.running = false;
            let mut aborted = 0;
            for page in snap.pages.iter_mut() {
                if page.status == PageStatus::Processing {
                    page.status = PageStatus::Failed;
                    page.items.clear();
                    page.error = Some(RUN_ABORTED.to_string());
                    aborted += 1;
                }
            }
            if aborted > 0 {
                warn!("Run ended with {} unfinished pages; marked failed", aborted);
            }
        });
    }

    pub fn is_running(&self) -> bool {
        self.tx.borrow().running
    }

    // ── Page transitions ──────────────────────────────────────────────────

    pub fn mark_processing(&self, index: usize) -> Result<(), ReviewError> {
        self.modify_page(index, |page| {
            page.status = PageStatus::Processing;
            page.error = None;
            Ok(())
        })
    }

    /// Record a successful analysis. An empty list is a valid result.
    pub fn complete(&self, index: usize, items: Vec<AnalysisItem>) -> Result<(), ReviewError> {
        self.modify_page(index, |page| {
            page.status = PageStatus::Completed;
            page.items = items;
            page.error = None;
            Ok(())
        })
    }

    pub fn fail(&self, index: usize, message: impl Into<String>) -> Result<(), ReviewError> {
        let message = message.into();
        self.modify_page(index, |page| {
            page.status = PageStatus::Failed;
            page.items.clear();
            page.error = Some(message);
            Ok(())
        })
    }

    /// Overwrite one field of one item. Allowed at any time, including while
    /// a run is active; the page status is left as it is.
    pub fn update_item(
        &self,
        page_index: usize,
        item_index: usize,
        field: ItemField,
        value: impl Into<String>,
    ) -> Result<(), ReviewError> {
        let value = value.into();
        self.modify_page(page_index, |page| {
            let number = page.page_number;
            let len = page.items.len();
            let item = page
                .items
                .get_mut(item_index)
                .ok_or(ReviewError::ItemOutOfRange {
                    page: number,
                    item: item_index,
                    len,
                })?;
            item.set(field, value)
        })
    }

    /// Apply `f` to one record; subscribers are only notified on success.
    fn modify_page<F>(&self, index: usize, f: F) -> Result<(), ReviewError>
    where
        F: FnOnce(&mut PageRecord) -> Result<(), ReviewError>,
    {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|snap| {
            let total = snap.pages.len();
            outcome = match snap.pages.get_mut(index) {
                Some(page) => f(page),
                None => Err(ReviewError::PageOutOfRange { index, total }),
            };
            outcome.is_ok()
        });
        outcome
    }
}

fn resumable(pages: &[PageRecord]) -> Vec<usize> {
    pages
        .iter()
        .enumerate()
        .filter(|(_, p)| p.status.is_resumable())
        .map(|(i, _)| i)
        .collect()
}
