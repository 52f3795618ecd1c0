//! Orchestrator behaviour with an in-memory renderer and a scripted analyzer.
//!
//! Each fake page is rendered with a distinct width (8 px per page number),
//! so the analyzer can tell which page it was handed by decoding the JPEG,
//! independent of scheduling order.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_pagereview::pipeline::encode::EncodedImage;
use edgequake_pagereview::{
    AnalysisItem, ItemField, Orchestrator, PageAnalyzer, PageError, PageRenderer, PageStatus,
    ReviewConfig, ReviewError, RunSummary, Snapshot, TaskMode,
};
use edgequake_pagereview::store::RUN_ABORTED;
use image::DynamicImage;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeRenderer {
    pages: usize,
    broken: HashSet<usize>,
}

impl FakeRenderer {
    fn new(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            broken: HashSet::new(),
        })
    }

    fn with_broken(pages: usize, broken: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            pages,
            broken: broken.iter().copied().collect(),
        })
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    fn page_count(&self) -> usize {
        self.pages
    }

    async fn render_page(&self, page_index: usize) -> Result<DynamicImage, PageError> {
        let page = page_index + 1;
        if self.broken.contains(&page) {
            return Err(PageError::RenderFailed {
                page,
                detail: "corrupt content stream".into(),
            });
        }
        Ok(DynamicImage::new_rgb8(8 * page as u32, 8))
    }
}

/// Fails the pages in `failing` while `failures_on` is set; blocks on
/// `gate` when asked for `gated_page`; panics on `panicking_page` while
/// `failures_on` is set.
struct ScriptedAnalyzer {
    failing: HashSet<usize>,
    failures_on: AtomicBool,
    panicking_page: Option<usize>,
    gated_page: Option<usize>,
    gate: Semaphore,
    calls: Mutex<Vec<(usize, TaskMode)>>,
}

impl ScriptedAnalyzer {
    fn new() -> Self {
        Self {
            failing: HashSet::new(),
            failures_on: AtomicBool::new(true),
            panicking_page: None,
            gated_page: None,
            gate: Semaphore::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, pages: &[usize]) -> Self {
        self.failing = pages.iter().copied().collect();
        self
    }

    fn panicking(mut self, page: usize) -> Self {
        self.panicking_page = Some(page);
        self
    }

    fn gated(mut self, page: usize) -> Self {
        self.gated_page = Some(page);
        self
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }

    fn called_pages(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }
}

fn page_of(image: &EncodedImage) -> usize {
    let bytes = STANDARD.decode(&image.data).expect("valid base64");
    let decoded = image::load_from_memory(&bytes).expect("valid JPEG");
    (decoded.width() / 8) as usize
}

#[async_trait]
impl PageAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        image: &EncodedImage,
        mode: TaskMode,
    ) -> Result<Vec<AnalysisItem>, PageError> {
        let page = page_of(image);
        self.calls.lock().unwrap().push((page, mode));

        if self.gated_page == Some(page) {
            self.gate.acquire().await.expect("gate open").forget();
        }

        if self.failures_on.load(Ordering::SeqCst) && self.panicking_page == Some(page) {
            panic!("analyzer crashed on page {page}");
        }

        if self.failures_on.load(Ordering::SeqCst) && self.failing.contains(&page) {
            return Err(PageError::GatewayFailed {
                detail: "Primary and fallback models failed. Primary: quota. Fallback: quota"
                    .into(),
            });
        }

        Ok(match mode {
            TaskMode::Translate => vec![AnalysisItem::Translation {
                original: format!("标题 {page}"),
                translated: format!("Title {page}"),
            }],
            TaskMode::Proofread => vec![AnalysisItem::Correction {
                context: format!("teh page {page}"),
                correction: format!("the page {page}"),
                explanation: "typo".into(),
            }],
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn setup(analyzer: ScriptedAnalyzer, concurrency: usize) -> (Orchestrator, Arc<ScriptedAnalyzer>) {
    let analyzer = Arc::new(analyzer);
    let config = ReviewConfig::builder()
        .concurrency(concurrency)
        .build()
        .unwrap();
    (Orchestrator::new(config, analyzer.clone()), analyzer)
}

fn statuses(snap: &Snapshot) -> Vec<PageStatus> {
    snap.pages.iter().map(|p| p.status).collect()
}

async fn wait_until(review: &Orchestrator, pred: impl Fn(&Snapshot) -> bool) {
    let mut rx = review.subscribe().unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("state reached in time")
        .expect("store alive");
}

// ── Loading ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn load_creates_one_pending_record_per_page() {
    let (mut review, _) = setup(ScriptedAnalyzer::new(), 1);
    assert_eq!(review.load(FakeRenderer::new(4)), 4);

    let snap = review.snapshot();
    let numbers: Vec<_> = snap.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert!(snap.pages.iter().all(|p| p.items.is_empty() && p.error.is_none()));
    assert_eq!(review.stats().pending, 4);
    assert!(!review.is_running());
}

#[tokio::test]
async fn load_pdf_failure_keeps_no_session() {
    let (mut review, _) = setup(ScriptedAnalyzer::new(), 1);
    let err = assert_err!(review.load_pdf("/definitely/not/here.pdf").await);
    assert!(matches!(err, ReviewError::Load(_)), "got: {err}");
    assert!(!review.is_loaded());
}

#[tokio::test]
async fn reset_discards_session() {
    let (mut review, _) = setup(ScriptedAnalyzer::new(), 1);
    review.load(FakeRenderer::new(2));
    review.reset();
    assert!(review.snapshot().pages.is_empty());
    assert!(matches!(
        review.update_item(0, 0, ItemField::Original, "x"),
        Err(ReviewError::NoDocument)
    ));
}

// ── Runs ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_without_document_is_rejected() {
    let (mut review, _) = setup(ScriptedAnalyzer::new(), 1);
    assert!(matches!(
        review.start(TaskMode::Translate),
        Err(ReviewError::NoDocument)
    ));
}

#[tokio::test]
async fn middle_page_failure_is_isolated() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new().failing(&[2]), 1);
    review.load(FakeRenderer::new(3));

    let summary = review.start(TaskMode::Translate).unwrap().wait().await.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            attempted: 3,
            completed: 2,
            failed: 1,
            cancelled: false
        }
    );

    let snap = review.snapshot();
    assert_eq!(
        statuses(&snap),
        vec![PageStatus::Completed, PageStatus::Failed, PageStatus::Completed]
    );
    assert!(snap.pages[1].items.is_empty());
    assert!(snap.pages[1]
        .error
        .as_deref()
        .unwrap()
        .contains("Primary and fallback models failed"));
    assert_eq!(snap.pages[2].items.len(), 1);
    assert!((review.stats().progress() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(analyzer.called_pages(), vec![1, 2, 3]);
    assert!(!review.is_running());
}

#[tokio::test]
async fn empty_document_runs_nothing() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new(), 2);
    assert_eq!(review.load(FakeRenderer::new(0)), 0);

    let summary = review.start(TaskMode::Translate).unwrap().wait().await.unwrap();
    assert_eq!(summary, RunSummary::default());
    assert!(review.snapshot().pages.is_empty());
    assert_eq!(review.stats().progress(), 0.0);
    assert!(analyzer.called_pages().is_empty());
    assert!(!review.is_running());
}

#[tokio::test]
async fn crashed_worker_leaves_page_failed_and_retryable() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new().panicking(2), 1);
    review.load(FakeRenderer::new(3));

    let err = assert_err!(review.start(TaskMode::Translate).unwrap().wait().await);
    assert!(matches!(err, ReviewError::Internal(_)), "got: {err}");
    assert!(!review.is_running());

    let snap = review.snapshot();
    assert_eq!(
        statuses(&snap),
        vec![PageStatus::Completed, PageStatus::Failed, PageStatus::Pending]
    );
    assert_eq!(snap.pages[1].error.as_deref(), Some(RUN_ABORTED));
    assert_eq!(review.stats().processing, 0);

    analyzer.failures_on.store(false, Ordering::SeqCst);
    let summary = review.start(TaskMode::Translate).unwrap().wait().await.unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(analyzer.called_pages(), vec![1, 2, 2, 3]);
    assert!(review
        .snapshot()
        .pages
        .iter()
        .all(|p| p.status == PageStatus::Completed));
}

#[tokio::test]
async fn render_failure_is_recorded_on_the_page() {
    let analyzer = ScriptedAnalyzer::new();
    let (mut review, analyzer) = setup(analyzer, 1);
    review.load(FakeRenderer::with_broken(3, &[2]));

    review.start(TaskMode::Translate).unwrap().wait().await.unwrap();

    let snap = review.snapshot();
    assert_eq!(snap.pages[1].status, PageStatus::Failed);
    assert!(snap.pages[1].error.as_deref().unwrap().contains("rendering failed"));
    assert_eq!(analyzer.called_pages(), vec![1, 3]);
}

#[tokio::test]
async fn second_run_only_retries_failed_pages() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new().failing(&[2]), 1);
    review.load(FakeRenderer::new(3));
    review.start(TaskMode::Translate).unwrap().wait().await.unwrap();
    let first_page = review.snapshot().pages[0].clone();

    analyzer.failures_on.store(false, Ordering::SeqCst);
    let summary = review.start(TaskMode::Translate).unwrap().wait().await.unwrap();

    assert_eq!(summary.attempted, 1);
    assert_eq!(analyzer.called_pages(), vec![1, 2, 3, 2]);
    let snap = review.snapshot();
    assert!(snap.pages.iter().all(|p| p.status == PageStatus::Completed));
    assert_eq!(snap.pages[0], first_page);
    assert_eq!(snap.pages[1].error, None);
}

#[tokio::test]
async fn completed_document_runs_nothing() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new(), 1);
    review.load(FakeRenderer::new(2));
    review.start(TaskMode::Translate).unwrap().wait().await.unwrap();

    let summary = review.start(TaskMode::Translate).unwrap().wait().await.unwrap();
    assert_eq!(summary, RunSummary::default());
    assert_eq!(analyzer.called_pages().len(), 2);
}

#[tokio::test]
async fn concurrent_workers_process_each_page_once() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new(), 3);
    review.load(FakeRenderer::new(7));

    let summary = review.start(TaskMode::Translate).unwrap().wait().await.unwrap();
    assert_eq!(summary.completed, 7);

    let mut pages = analyzer.called_pages();
    pages.sort_unstable();
    assert_eq!(pages, (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn start_while_running_is_rejected() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new().gated(1), 1);
    review.load(FakeRenderer::new(2));

    let handle = review.start(TaskMode::Translate).unwrap();
    assert!(review.is_running());
    assert!(matches!(
        review.start(TaskMode::Translate),
        Err(ReviewError::RunInProgress)
    ));

    analyzer.release();
    handle.wait().await.unwrap();
    assert!(!review.is_running());
}

// ── Stop ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_without_run_is_a_no_op() {
    let (mut review, _) = setup(ScriptedAnalyzer::new(), 1);
    review.stop();
    review.load(FakeRenderer::new(1));
    review.stop();
    review.stop();
    assert_eq!(review.stats().pending, 1);
}

#[tokio::test]
async fn stop_lets_in_flight_page_finish() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new().gated(1), 1);
    review.load(FakeRenderer::new(3));

    let handle = review.start(TaskMode::Translate).unwrap();
    wait_until(&review, |s| s.pages[0].status == PageStatus::Processing).await;

    review.stop();
    review.stop();
    handle.stop();
    analyzer.release();

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert!(summary.cancelled);
    assert_eq!(
        statuses(&review.snapshot()),
        vec![PageStatus::Completed, PageStatus::Pending, PageStatus::Pending]
    );

    // Resuming picks up exactly the untouched pages.
    review.start(TaskMode::Translate).unwrap().wait().await.unwrap();
    assert_eq!(analyzer.called_pages(), vec![1, 2, 3]);
    assert_eq!(review.stats().completed, 3);
}

// ── Editing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_item_round_trip() {
    let (mut review, _) = setup(ScriptedAnalyzer::new(), 1);
    review.load(FakeRenderer::new(1));
    review.start(TaskMode::Translate).unwrap().wait().await.unwrap();

    assert_ok!(review.update_item(0, 0, ItemField::Translated, "Headline 1"));
    assert_ok!(review.update_item(0, 0, ItemField::Original, ""));

    let page = &review.snapshot().pages[0];
    assert_eq!(page.status, PageStatus::Completed);
    assert_eq!(
        page.items[0],
        AnalysisItem::Translation {
            original: String::new(),
            translated: "Headline 1".into()
        }
    );

    assert!(matches!(
        review.update_item(0, 0, ItemField::Correction, "x"),
        Err(ReviewError::FieldMismatch { .. })
    ));
    assert!(matches!(
        review.update_item(0, 4, ItemField::Original, "x"),
        Err(ReviewError::ItemOutOfRange { .. })
    ));
}

#[tokio::test]
async fn edits_are_allowed_during_a_run() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new().gated(2), 1);
    review.load(FakeRenderer::new(2));

    let handle = review.start(TaskMode::Translate).unwrap();
    wait_until(&review, |s| s.pages[1].status == PageStatus::Processing).await;

    assert_ok!(review.update_item(0, 0, ItemField::Translated, "Edited"));
    analyzer.release();
    handle.wait().await.unwrap();

    let snap = review.snapshot();
    assert_eq!(snap.pages[0].items[0].get(ItemField::Translated), Some("Edited"));
    assert_eq!(snap.pages[1].status, PageStatus::Completed);
}

// ── Mode switch ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn switching_mode_reprocesses_every_page() {
    let (mut review, analyzer) = setup(ScriptedAnalyzer::new(), 1);
    review.load(FakeRenderer::new(3));
    review.start(TaskMode::Translate).unwrap().wait().await.unwrap();

    let summary = review.start(TaskMode::Proofread).unwrap().wait().await.unwrap();
    assert_eq!(summary.completed, 3);

    let snap = review.snapshot();
    assert_eq!(snap.mode, Some(TaskMode::Proofread));
    assert!(snap
        .pages
        .iter()
        .all(|p| p.items.iter().all(|i| i.mode() == TaskMode::Proofread)));

    let proofread_calls = analyzer
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, m)| *m == TaskMode::Proofread)
        .count();
    assert_eq!(proofread_calls, 3);
}
