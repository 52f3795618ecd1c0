//! Input resolution: normalise a user-supplied path or URL to a local PDF.
//!
//! pdfium opens documents from the file system, so URLs are downloaded into
//! a `TempDir` that lives as long as the returned [`ResolvedInput`]. The
//! `%PDF` magic is checked up front so a non-PDF fails as a [`LoadError`]
//! instead of surfacing later as a pdfium error.

use crate::error::LoadError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the PDF lives in a temp directory removed on drop.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, LoadError> {
    if input.trim().is_empty() {
        return Err(LoadError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, LoadError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(LoadError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && !is_pdf_magic(&magic) {
                return Err(LoadError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(LoadError::PermissionDenied { path });
        }
        Err(_) => return Err(LoadError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, LoadError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| LoadError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            LoadError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| failed(format!("temp dir: {e}")))?;
    let file_path = temp_dir.path().join(filename_from_url(url));

    if bytes.len() >= 4 && !is_pdf_magic(&bytes[..4]) {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(LoadError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| failed(format!("failed to write temp file: {e}")))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

fn is_pdf_magic(bytes: &[u8]) -> bool {
    bytes == b"%PDF"
}

fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_falls_back_for_bare_paths() {
        assert_eq!(filename_from_url("https://x.org/a/report.pdf"), "report.pdf");
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_load_error() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, LoadError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_by_magic() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"GIF89a not a pdf").unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5)
            .await
            .unwrap_err();
        match err {
            LoadError::NotAPdf { magic, .. } => assert_eq!(&magic, b"GIF8"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pdf_magic_is_accepted() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n").unwrap();
        let resolved = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.path(), tmp.path());
    }
}
