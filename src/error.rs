//! Error types for the edgequake-pagereview library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReviewError`] is **fatal**: the operation cannot proceed at all
//!   (bad input file, no document loaded, provider not configured). Returned
//!   as `Err(ReviewError)` from orchestrator and export entry points.
//!
//! * [`PageError`] is **non-fatal**: a single page failed (render glitch,
//!   gateway error, unparsable model output) but every other page is fine.
//!   Its message is recorded on the owning [`crate::output::PageRecord`] and the
//!   run moves on to the next page.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons a document could not be loaded. The session is never created
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },
}

/// All fatal errors returned by the edgequake-pagereview library.
///
/// Page-level failures use [`PageError`] and are recorded on the page
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum ReviewError {
    // ── Session errors ────────────────────────────────────────────────────
    /// The document could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// An operation needs a loaded document but the session is empty.
    #[error("No document loaded")]
    NoDocument,

    /// `start` was called while a run is still active.
    #[error("A processing run is already active; stop it before starting another")]
    RunInProgress,

    /// Page index is outside the loaded document.
    #[error("Page index {index} is out of range (document has {total} pages)")]
    PageOutOfRange { index: usize, total: usize },

    /// Item index is outside the page's item list.
    #[error("Item {item} does not exist on page {page} ({len} items)")]
    ItemOutOfRange { page: usize, item: usize, len: usize },

    /// The edited field does not exist on the item's shape.
    #[error("Field '{field}' does not exist on a {kind} item")]
    FieldMismatch { field: String, kind: &'static str },

    /// Unknown field or task name supplied as text.
    #[error("Unknown {what} '{value}'")]
    UnknownName { what: &'static str, value: String },

    // ── Gateway configuration ─────────────────────────────────────────────
    /// No credential is available to talk to the model.
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Export errors ─────────────────────────────────────────────────────
    /// The report document could not be assembled.
    #[error("Failed to build report: {0}")]
    ExportFailed(String),

    /// Could not create or write the output report file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Server ────────────────────────────────────────────────────────────
    /// The analysis endpoint could not bind or stopped with an I/O error.
    #[error("Server on {addr} failed: {source}")]
    ServeFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The run records `to_string()` of this error on the page and continues
/// with the next queued page.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation or image encoding failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Model call failed after the primary/fallback policy was exhausted.
    #[error("Model call failed: {detail}")]
    GatewayFailed { detail: String },

    /// The model answered with text that is not valid JSON.
    #[error("Failed to parse AI response: {detail}")]
    ParseFailed { detail: String, raw: String },

    /// The access phrase / credential check rejected the request.
    #[error("Access denied: {detail}")]
    AccessDenied { detail: String },

    /// The model call exceeded the hard time ceiling.
    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl PageError {
    /// Raw model output attached to a parse failure, for diagnostics.
    pub fn raw(&self) -> Option<&str> {
        match self {
            PageError::ParseFailed { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_is_transparent() {
        let e: ReviewError = LoadError::NotAPdf {
            path: "a.txt".into(),
            magic: *b"GIF8",
        }
        .into();
        assert!(e.to_string().starts_with("File is not a valid PDF"), "got: {e}");
    }

    #[test]
    fn parse_failure_keeps_raw_text() {
        let e = PageError::ParseFailed {
            detail: "expected value at line 1".into(),
            raw: "Sure! Here are the titles".into(),
        };
        assert_eq!(e.raw(), Some("Sure! Here are the titles"));
        assert!(e.to_string().contains("Failed to parse AI response"));
    }

    #[test]
    fn timeout_display() {
        let e = PageError::Timeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
        assert_eq!(e.raw(), None);
    }

    #[test]
    fn item_out_of_range_display() {
        let e = ReviewError::ItemOutOfRange {
            page: 2,
            item: 5,
            len: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains("Item 5"), "got: {msg}");
        assert!(msg.contains("page 2"), "got: {msg}");
    }
}
