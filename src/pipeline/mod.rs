//! Pipeline stages for analysing one page.
//!
//! Each submodule implements exactly one transformation step so the
//! orchestrator can be driven by in-memory fakes for any of them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ gateway ──▶ parse
//! (URL/path) (pdfium)  (JPEG b64)  (VLM)      (typed items)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]: rasterise one page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: JPEG-encode and base64-wrap the page image
//! 4. [`gateway`]: primary/fallback model call under a time ceiling; the
//!    only stage with network I/O
//! 5. [`parse`]: strip code fences and build mode-shaped items

pub mod encode;
pub mod gateway;
pub mod input;
pub mod parse;
pub mod render;
