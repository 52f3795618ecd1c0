//! HTTP analysis endpoint.
//!
//! One stateless route turns a page image into typed items:
//!
//! ```text
//! POST /api/analyze-page  { image, task?, access_code? }
//!   200 { data: [...] }
//!   400 { error }          missing image / malformed body
//!   401 { error }          access phrase rejected
//!   500 { error, raw? }    model failure, unparsable answer, no server key
//!   504 { error }          time ceiling hit
//! GET  /api/health        { status: "ok" }
//! ```
//!
//! Every request resolves its own [`Credential`](crate::access::Credential)
//! and gets its own model client from the [`ModelClientFactory`]; nothing
//! about a caller's key survives the request.

mod handlers;
mod routes;

pub use routes::{create_router, MAX_BODY_BYTES};

use std::sync::Arc;

use crate::access::AccessPolicy;
use crate::config::GatewayConfig;
use crate::error::ReviewError;
use crate::pipeline::gateway::ModelClientFactory;

/// Shared state for the endpoint.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<AccessPolicy>,
    pub factory: Arc<dyn ModelClientFactory>,
    pub gateway_config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(
        policy: AccessPolicy,
        factory: Arc<dyn ModelClientFactory>,
        gateway_config: GatewayConfig,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            factory,
            gateway_config: Arc::new(gateway_config),
        }
    }
}

/// Start the endpoint and serve until the process is stopped.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<(), ReviewError> {
    let addr = format!("{}:{}", host, port);
    let serve_failed = |source: std::io::Error| ReviewError::ServeFailed {
        addr: addr.clone(),
        source,
    };

    if state.policy.is_open() {
        tracing::warn!("No access phrase configured; every caller may use the server key");
    }
    if !state.policy.has_default_key() {
        tracing::warn!("No server API key configured; callers must supply their own");
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .map_err(serve_failed)?;
    tracing::info!("Starting server at http://{}", addr);

    axum::serve(listener, app).await.map_err(serve_failed)?;

    Ok(())
}
