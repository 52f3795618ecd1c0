//! # edgequake-pagereview
//!
//! Translate the titles of a PDF, or proofread its text, page by page with a
//! Vision Language Model, then edit the findings and export a Word report.
//!
//! ## Why page images?
//!
//! Slide decks and brochures put titles in images, text boxes and rotated
//! frames that text extraction scrambles. Each page is rasterised and shown
//! to a VLM, which reads it the way a reviewer would and answers with a
//! JSON list of findings.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Render   rasterise one page via pdfium (scale 1.5, spawn_blocking)
//!  ├─ 3. Encode   JPEG (quality 80) → base64
//!  ├─ 4. Gateway  primary model, one fallback, 60 s ceiling
//!  ├─ 5. Parse    strip fences → typed items for the run's task mode
//!  └─ 6. Store    per-page status + items, observable, editable
//! ```
//!
//! Runs are resumable: `start` only queues pages that are pending or failed,
//! and `stop` lets in-flight pages finish.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pagereview::{
//!     docx_report, GatewayConfig, GeminiClient, ModelGateway, Orchestrator, ReviewConfig,
//!     TaskMode,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = std::env::var("GOOGLE_API_KEY")?;
//!     let model = Arc::new(GeminiClient::new(reqwest::Client::new(), key));
//!     let gateway = ModelGateway::new(model, GatewayConfig::default());
//!
//!     let mut review = Orchestrator::new(ReviewConfig::default(), Arc::new(gateway));
//!     review.load_pdf("deck.pdf").await?;
//!     let summary = review.start(TaskMode::Translate)?.wait().await?;
//!     eprintln!("{} pages done, {} failed", summary.completed, summary.failed);
//!
//!     let report = docx_report(&review.snapshot().pages, TaskMode::Translate)?;
//!     std::fs::write("translation-report.docx", report)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | `POST /api/analyze-page` endpoint (axum + tower-http) |
//! | `cli`    | on      | Enables the `pagereview` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-pagereview = { version = "0.1", default-features = false }
//! ```
//!
//! ## Credentials
//!
//! | Variable | Used by | Meaning |
//! |----------|---------|---------|
//! | `GOOGLE_API_KEY`    | server, CLI | Default Gemini key |
//! | `GOOGLE_MODEL_NAME` | server, CLI | Primary model (fallback is `gemini-1.5-pro`) |
//! | `ACCESS_CODE`       | server      | Phrase that unlocks the default key |
//! | `PDFIUM_LIB_PATH`   | CLI         | pdfium shared library or its directory |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod remote;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use access::{AccessError, AccessPolicy, Credential, CredentialSource};
pub use config::{GatewayConfig, GatewayConfigBuilder, ReviewConfig, ReviewConfigBuilder};
pub use error::{LoadError, PageError, ReviewError};
pub use export::{docx_report, json_report, report_file_name, write_report};
pub use orchestrator::{Orchestrator, RunHandle, RunSummary, StopHandle};
pub use output::{AnalysisItem, ItemField, PageRecord, PageStatus, TaskMode};
pub use pipeline::gateway::{
    GeminiClient, GeminiClientFactory, LlmProviderModel, ModelClientFactory, ModelGateway,
    PageAnalyzer, VisionModel,
};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use remote::RemoteAnalyzer;
pub use store::{ProgressStats, ResultStore, Snapshot};
