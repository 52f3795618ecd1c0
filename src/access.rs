//! Credential resolution for the analysis endpoint.
//!
//! A caller may send one string with each request. It is checked against the
//! server's access phrase; on a match the server's own API key is used. A
//! string that looks like an API key is used as the caller's own key. With
//! no access phrase configured the server key is used unconditionally.
//!
//! The resolved [`Credential`] is handed to a
//! [`crate::pipeline::gateway::ModelClientFactory`] per request, so no model
//! client outlives the request that authorised it.

use crate::error::PageError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Env var holding the shared access phrase.
pub const ACCESS_PHRASE_ENV: &str = "ACCESS_CODE";
/// Env var holding the server's default model API key.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

// NOTE: any string with this shape bypasses the access phrase.
static RE_API_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^AIza[0-9A-Za-z_\-]+$").unwrap());

/// Whether `s` has the shape of a Google API key.
pub fn looks_like_api_key(s: &str) -> bool {
    RE_API_KEY.is_match(s)
}

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The caller knew the access phrase; the server key is used.
    AccessPhrase,
    /// The caller supplied their own key.
    UserSupplied,
    /// No access phrase is configured; the server key is used.
    OpenMode,
}

/// An API key resolved for a single request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    api_key: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            api_key: api_key.into(),
            source,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("invalid access code or API key")]
    Denied,

    #[error("the server has no default API key configured (set {API_KEY_ENV})")]
    MissingServerKey,
}

impl From<AccessError> for PageError {
    fn from(e: AccessError) -> Self {
        PageError::AccessDenied {
            detail: e.to_string(),
        }
    }
}

/// Server-side access configuration.
#[derive(Clone, Default)]
pub struct AccessPolicy {
    access_phrase: Option<String>,
    default_api_key: Option<String>,
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("access_phrase", &self.access_phrase.as_ref().map(|_| "<set>"))
            .field("default_api_key", &self.default_api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl AccessPolicy {
    /// Empty strings count as unset.
    pub fn new(access_phrase: Option<String>, default_api_key: Option<String>) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Self {
            access_phrase: non_empty(access_phrase),
            default_api_key: non_empty(default_api_key),
        }
    }

    /// Read [`ACCESS_PHRASE_ENV`] and [`API_KEY_ENV`].
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(ACCESS_PHRASE_ENV).ok(),
            std::env::var(API_KEY_ENV).ok(),
        )
    }

    /// No access phrase configured: every request may use the server key.
    pub fn is_open(&self) -> bool {
        self.access_phrase.is_none()
    }

    pub fn has_default_key(&self) -> bool {
        self.default_api_key.is_some()
    }

    /// Decide which API key serves a request carrying `supplied`.
    pub fn resolve(&self, supplied: Option<&str>) -> Result<Credential, AccessError> {
        let supplied = supplied.map(str::trim).filter(|s| !s.is_empty());

        if let (Some(input), Some(phrase)) = (supplied, self.access_phrase.as_deref()) {
            if input == phrase {
                debug!("Access phrase matched; using server key");
                return self.server_key(CredentialSource::AccessPhrase);
            }
        }

        if let Some(input) = supplied {
            if looks_like_api_key(input) {
                debug!("Using caller-supplied API key");
                return Ok(Credential::new(input, CredentialSource::UserSupplied));
            }
        }

        if self.is_open() {
            return self.server_key(CredentialSource::OpenMode);
        }

        Err(AccessError::Denied)
    }

    fn server_key(&self, source: CredentialSource) -> Result<Credential, AccessError> {
        self.default_api_key
            .as_deref()
            .map(|k| Credential::new(k, source))
            .ok_or(AccessError::MissingServerKey)
    }
}
