//! Page rasterisation via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while rasterising. Every pdfium call therefore runs on
//! the blocking thread pool so the async workers keep servicing network I/O
//! for other pages.
//!
//! Rendering goes through the [`PageRenderer`] trait so the orchestrator can
//! be driven by an in-memory renderer in tests.

use crate::config::ReviewConfig;
use crate::error::{LoadError, PageError, ReviewError};
use crate::pipeline::input::{self, ResolvedInput};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns one page of a loaded document into a raster image.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Render the page at `page_index` (0-based).
    async fn render_page(&self, page_index: usize) -> Result<DynamicImage, PageError>;
}

/// Bind to a pdfium shared library.
///
/// `lib_path` may name the library file itself or the directory holding it.
/// Without a path the current directory is tried first, then the system
/// library search path.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ReviewError> {
    let bindings = match lib_path {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ReviewError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// A PDF opened from disk or URL, rendered page-by-page with pdfium.
#[derive(Debug)]
pub struct PdfiumRenderer {
    input: ResolvedInput,
    page_count: usize,
    scale: f32,
    max_pixels: u32,
    password: Option<String>,
    lib_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Resolve `input` (path or URL), verify it is a readable PDF, and count
    /// its pages.
    pub async fn open(input: &str, config: &ReviewConfig) -> Result<Self, ReviewError> {
        let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
        let path = resolved.path().to_path_buf();
        let password = config.password.clone();
        let lib_path = config.pdfium_lib_path.clone();

        let page_count = tokio::task::spawn_blocking(move || {
            count_pages_blocking(&path, password.as_deref(), lib_path.as_deref())
        })
        .await
        .map_err(|e| ReviewError::Internal(format!("Load task panicked: {e}")))??;

        info!("PDF loaded: {} pages", page_count);

        Ok(Self {
            input: resolved,
            page_count,
            scale: config.render_scale,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            lib_path: config.pdfium_lib_path.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        self.input.path()
    }

    pub fn into_shared(self) -> Arc<dyn PageRenderer> {
        Arc::new(self)
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn render_page(&self, page_index: usize) -> Result<DynamicImage, PageError> {
        let page = page_index + 1;
        if page_index >= self.page_count {
            return Err(PageError::RenderFailed {
                page,
                detail: format!("out of range (document has {} pages)", self.page_count),
            });
        }

        let path = self.input.path().to_path_buf();
        let scale = self.scale;
        let max_pixels = self.max_pixels;
        let password = self.password.clone();
        let lib_path = self.lib_path.clone();

        tokio::task::spawn_blocking(move || {
            render_page_blocking(
                &path,
                page_index,
                scale,
                max_pixels,
                password.as_deref(),
                lib_path.as_deref(),
            )
        })
        .await
        .map_err(|e| PageError::RenderFailed {
            page,
            detail: format!("render task panicked: {e}"),
        })?
    }
}

fn count_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    lib_path: Option<&Path>,
) -> Result<usize, ReviewError> {
    let pdfium = bind_pdfium(lib_path)?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                LoadError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                LoadError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            LoadError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    Ok(document.pages().len() as usize)
}

fn render_page_blocking(
    pdf_path: &Path,
    page_index: usize,
    scale: f32,
    max_pixels: u32,
    password: Option<&str>,
    lib_path: Option<&Path>,
) -> Result<DynamicImage, PageError> {
    let page_num = page_index + 1;
    let failed = |detail: String| PageError::RenderFailed {
        page: page_num,
        detail,
    };

    let pdfium = bind_pdfium(lib_path).map_err(|e| failed(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let page = document
        .pages()
        .get(page_index as u16)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_num,
        image.width(),
        image.height()
    );

    Ok(image)
}
