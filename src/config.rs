//! Configuration types for page review runs and the model gateway.
//!
//! [`ReviewConfig`] controls how pages are rendered and scheduled;
//! [`GatewayConfig`] controls which models are called and how long a call
//! may take. Both are built through a builder so callers set only what they
//! care about and rely on documented defaults for the rest.

use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model used when the primary model fails. Also the default primary.
pub const FALLBACK_MODEL: &str = "gemini-1.5-pro";

/// Configuration for rendering and scheduling a processing run.
///
/// # Example
/// ```rust
/// use edgequake_pagereview::ReviewConfig;
///
/// let config = ReviewConfig::builder()
///     .render_scale(2.0)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Page scale factor relative to the PDF's native size (72 DPI). Default: 1.5.
    ///
    /// 1.5 renders an A4 page at roughly 890 × 1260 px, enough for a vision
    /// model to read headings and body text.
    pub render_scale: f32,

    /// Cap on either rendered dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// JPEG quality (1–100) of the image sent to the model. Default: 80.
    pub jpeg_quality: u8,

    /// Number of worker loops in a run. Default: 1 (strictly sequential).
    ///
    /// With more than one worker pages are still claimed in document order but
    /// may complete out of order.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to the pdfium shared library (file or directory).
    pub pdfium_lib_path: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.5,
            max_rendered_pixels: 2000,
            jpeg_quality: 80,
            concurrency: 1,
            password: None,
            pdfium_lib_path: None,
            download_timeout_secs: 120,
        }
    }
}

impl ReviewConfig {
    pub fn builder() -> ReviewConfigBuilder {
        ReviewConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ReviewConfig`].
#[derive(Debug)]
pub struct ReviewConfigBuilder {
    config: ReviewConfig,
}

impl ReviewConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReviewConfig, ReviewError> {
        let c = &self.config;
        if !(0.25..=5.0).contains(&c.render_scale) {
            return Err(ReviewError::InvalidConfig(format!(
                "render scale must be 0.25–5.0, got {}",
                c.render_scale
            )));
        }
        if c.concurrency == 0 {
            return Err(ReviewError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for the model gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Model tried first. Default: [`FALLBACK_MODEL`].
    ///
    /// A failed call is retried once on [`FALLBACK_MODEL`] unless this is
    /// already that model.
    pub primary_model: String,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum output tokens per page. Default: 4096.
    pub max_tokens: usize,

    /// Hard ceiling for one page analysis, fallback included. Default: 60.
    pub api_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            primary_model: FALLBACK_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            api_timeout_secs: 60,
        }
    }
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether a failed primary call should be retried on the fallback.
    pub fn has_fallback(&self) -> bool {
        self.primary_model != FALLBACK_MODEL
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn primary_model(mut self, model: impl Into<String>) -> Self {
        self.config.primary_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<GatewayConfig, ReviewError> {
        if self.config.primary_model.trim().is_empty() {
            return Err(ReviewError::InvalidConfig("primary model must not be empty".into()));
        }
        if self.config.api_timeout_secs == 0 {
            return Err(ReviewError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        Ok(self.config)
    }
}
