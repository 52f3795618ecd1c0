//! End-to-end integration tests for edgequake-pagereview.
//!
//! These tests use real PDF files in `./test_cases/`, a pdfium library and,
//! for the review tests, live Gemini calls. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GOOGLE_API_KEY=... DYLD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture

use edgequake_pagereview::{
    docx_report, json_report, GatewayConfig, GeminiClient, ModelGateway, Orchestrator,
    PageRenderer, PageStatus, PdfiumRenderer, ReviewConfig, TaskMode,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Same as [`e2e_skip_unless_ready`], and also requires a Gemini key.
macro_rules! e2e_skip_unless_key {
    ($path:expr) => {{
        let p = e2e_skip_unless_ready!($path);
        match std::env::var("GOOGLE_API_KEY") {
            Ok(key) if !key.trim().is_empty() => (p, key),
            _ => {
                println!("SKIP — GOOGLE_API_KEY is not set");
                return;
            }
        }
    }};
}

fn orchestrator(key: String) -> Orchestrator {
    let model = Arc::new(GeminiClient::new(reqwest::Client::new(), key));
    let gateway = ModelGateway::new(model, GatewayConfig::default());
    let config = ReviewConfig::builder()
        .concurrency(2)
        .build()
        .expect("valid config");
    Orchestrator::new(config, Arc::new(gateway))
}

// ── Rendering (no model calls) ───────────────────────────────────────────────

#[tokio::test]
async fn test_render_irs_form() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));

    let renderer = PdfiumRenderer::open(path.to_str().unwrap(), &ReviewConfig::default())
        .await
        .expect("open should succeed");
    assert_eq!(renderer.page_count(), 2, "IRS form should have 2 pages");

    let image = renderer.render_page(0).await.expect("page 1 renders");
    assert!(image.width() > 600, "scale 1.5 should exceed 600 px wide");

    let err = renderer.render_page(5).await.unwrap_err();
    assert!(err.to_string().contains("rendering failed"));
}

#[tokio::test]
async fn test_load_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let mut review = orchestrator("unused".into());
    let result = review.load_pdf("/definitely/not/a/real/file.pdf").await;
    assert!(result.is_err(), "load_pdf() should fail for a missing file");
    assert!(!review.is_loaded());
}

// ── Review runs (need GOOGLE_API_KEY) ────────────────────────────────────────

#[tokio::test]
async fn test_translate_irs_form() {
    let (path, key) = e2e_skip_unless_key!(test_cases_dir().join("irs_form_1040.pdf"));

    let mut review = orchestrator(key);
    review
        .load_pdf(path.to_str().unwrap())
        .await
        .expect("load should succeed");

    let summary = review
        .start(TaskMode::Translate)
        .expect("run starts")
        .wait()
        .await
        .expect("run finishes");
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failed, 0, "No pages should fail");

    let snap = review.snapshot();
    assert!(snap.pages.iter().all(|p| p.status == PageStatus::Completed));
    assert!(
        snap.pages.iter().all(|p| p.items.iter().all(|i| i.mode() == TaskMode::Translate)),
        "Every item should be a translation"
    );

    let report = docx_report(&snap.pages, TaskMode::Translate).expect("report builds");
    let out_path = output_dir().join("irs_form_translation.docx");
    std::fs::write(&out_path, report).ok();
    println!("[translate] Saved to {}", out_path.display());
}

#[tokio::test]
async fn test_proofread_json_report() {
    let (path, key) = e2e_skip_unless_key!(test_cases_dir().join("irs_form_1040.pdf"));

    let mut review = orchestrator(key);
    review
        .load_pdf(path.to_str().unwrap())
        .await
        .expect("load should succeed");
    review
        .start(TaskMode::Proofread)
        .expect("run starts")
        .wait()
        .await
        .expect("run finishes");

    let snap = review.snapshot();
    let json = json_report(&snap.pages, TaskMode::Proofread).expect("JSON report builds");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
    assert_eq!(value["pages"].as_array().map(Vec::len), Some(2));

    let out_path = output_dir().join("irs_form_proofread.json");
    std::fs::write(&out_path, &json).ok();
    println!("[proofread] Saved to {}", out_path.display());
}
