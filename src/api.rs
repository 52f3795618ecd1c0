//! JSON bodies of `POST /api/analyze-page`, shared by the server handler and
//! [`crate::remote::RemoteAnalyzer`].

use crate::output::{AnalysisItem, TaskMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body. `image` is a bare base64 payload or a data URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub task: TaskMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
}

/// Success body: items shaped by the request's task.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub data: Vec<AnalysisItem>,
}

/// Success body as read by a client; items are validated separately so key
/// casing and scalar coercion follow the same rules as model output.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnalyzeResponse {
    #[serde(default)]
    pub data: Value,
}

/// Failure body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    /// Unparsable model output, on parse failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Time ceiling that was hit, on timeouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            raw: None,
            timeout_secs: None,
        }
    }
}
