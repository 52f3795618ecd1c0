//! [`PageAnalyzer`] that sends pages to a running analysis endpoint.
//!
//! This is how a CLI run can share one server-side API key: the page is
//! rendered and encoded locally, posted as a data URI together with the
//! caller's access phrase, and the endpoint's status codes are mapped back
//! to [`PageError`]s.

use crate::api::{AnalyzeRequest, ErrorBody, RawAnalyzeResponse};
use crate::error::PageError;
use crate::output::{AnalysisItem, TaskMode};
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::gateway::PageAnalyzer;
use crate::pipeline::parse::items_from_values;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Path of the analysis route on a server.
pub const ANALYZE_PATH: &str = "/api/analyze-page";

#[derive(Clone)]
pub struct RemoteAnalyzer {
    http: reqwest::Client,
    endpoint: String,
    access_code: Option<String>,
}

impl fmt::Debug for RemoteAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAnalyzer")
            .field("endpoint", &self.endpoint)
            .field("access_code", &self.access_code.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl RemoteAnalyzer {
    /// `server` is a base URL such as `http://127.0.0.1:3000`; the analysis
    /// path is appended unless already present.
    pub fn new(server: &str) -> Self {
        let base = server.trim_end_matches('/');
        let endpoint = if base.ends_with(ANALYZE_PATH) {
            base.to_string()
        } else {
            format!("{base}{ANALYZE_PATH}")
        };
        Self {
            http: reqwest::Client::new(),
            endpoint,
            access_code: None,
        }
    }

    pub fn with_access_code(mut self, code: impl Into<String>) -> Self {
        self.access_code = Some(code.into());
        self
    }

    /// Client-side ceiling on one request, on top of the server's own.
    pub fn with_timeout(mut self, secs: u64) -> Result<Self, reqwest::Error> {
        self.http = reqwest::Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()?;
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PageAnalyzer for RemoteAnalyzer {
    async fn analyze(
        &self,
        image: &EncodedImage,
        mode: TaskMode,
    ) -> Result<Vec<AnalysisItem>, PageError> {
        let body = AnalyzeRequest {
            image: Some(image.to_data_uri()),
            task: mode,
            access_code: self.access_code.clone(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PageError::GatewayFailed {
                detail: format!("{}: {}", self.endpoint, e),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PageError::GatewayFailed {
            detail: format!("{}: unreadable response: {}", self.endpoint, e),
        })?;
        debug!("{} answered HTTP {}", self.endpoint, status);

        if !status.is_success() {
            return Err(error_from_response(status, &text));
        }

        let parsed: RawAnalyzeResponse =
            serde_json::from_str(&text).map_err(|e| PageError::GatewayFailed {
                detail: format!("{}: malformed response: {}", self.endpoint, e),
            })?;

        match parsed.data {
            Value::Array(values) => items_from_values(values, mode)
                .map_err(|detail| PageError::ParseFailed { detail, raw: text }),
            _ => Ok(Vec::new()),
        }
    }
}

fn error_from_response(status: StatusCode, text: &str) -> PageError {
    let body = serde_json::from_str::<ErrorBody>(text)
        .unwrap_or_else(|_| ErrorBody::new(format!("HTTP {status}")));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PageError::AccessDenied {
            detail: body.error,
        },
        StatusCode::GATEWAY_TIMEOUT => PageError::Timeout {
            secs: body.timeout_secs.unwrap_or_default(),
        },
        _ => match body.raw {
            Some(raw) => PageError::ParseFailed {
                detail: body.error,
                raw,
            },
            None => PageError::GatewayFailed { detail: body.error },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_path_is_appended_once() {
        assert_eq!(
            RemoteAnalyzer::new("http://localhost:3000/").endpoint(),
            "http://localhost:3000/api/analyze-page"
        );
        assert_eq!(
            RemoteAnalyzer::new("http://localhost:3000/api/analyze-page").endpoint(),
            "http://localhost:3000/api/analyze-page"
        );
    }

    #[test]
    fn unauthorized_maps_to_access_denied() {
        let err = error_from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"invalid access code or API key"}"#,
        );
        assert!(matches!(err, PageError::AccessDenied { .. }));
    }

    #[test]
    fn raw_field_maps_to_parse_failure() {
        let err = error_from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"Failed to parse AI response","raw":"no titles"}"#,
        );
        assert_eq!(err.raw(), Some("no titles"));
    }

    #[test]
    fn timeout_keeps_ceiling() {
        let err = error_from_response(
            StatusCode::GATEWAY_TIMEOUT,
            r#"{"error":"Model call timed out after 60s","timeout_secs":60}"#,
        );
        assert_eq!(err, PageError::Timeout { secs: 60 });
    }

    #[test]
    fn non_json_error_body_keeps_status() {
        let err = error_from_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(err.to_string().contains("502"), "got: {err}");
    }

    #[test]
    fn debug_hides_access_code() {
        let remote = RemoteAnalyzer::new("http://x").with_access_code("open-sesame");
        assert!(!format!("{remote:?}").contains("sesame"));
    }
}
