//! Request handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use super::AppState;
use crate::access::AccessError;
use crate::api::{AnalyzeRequest, AnalyzeResponse, ErrorBody};
use crate::error::PageError;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::gateway::ModelGateway;

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /api/analyze-page`: one page image in, typed items out.
pub async fn analyze_page(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, ErrorBody::new(rejection.body_text()))
        }
    };

    let Some(image) = request
        .image
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(EncodedImage::from_data_uri)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorBody::new("Image data is required"),
        );
    };

    let credential = match state.policy.resolve(request.access_code.as_deref()) {
        Ok(credential) => credential,
        Err(e @ AccessError::Denied) => {
            warn!("analyze-page: {}", e);
            return error_response(StatusCode::UNAUTHORIZED, ErrorBody::new(e.to_string()));
        }
        Err(e @ AccessError::MissingServerKey) => {
            warn!("analyze-page: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(e.to_string()),
            );
        }
    };

    info!(
        "analyze-page: task={} credential={:?} image={} bytes",
        request.task,
        credential.source(),
        image.data.len()
    );

    let gateway = ModelGateway::new(
        state.factory.client_for(&credential),
        state.gateway_config.as_ref().clone(),
    );

    match gateway.analyze_page(&image, request.task).await {
        Ok(items) => Json(AnalyzeResponse { data: items }).into_response(),
        Err(e) => {
            warn!("analyze-page failed: {}", e);
            page_error_response(e)
        }
    }
}

fn page_error_response(e: PageError) -> Response {
    match e {
        PageError::AccessDenied { .. } => {
            error_response(StatusCode::UNAUTHORIZED, ErrorBody::new(e.to_string()))
        }
        PageError::Timeout { secs } => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            ErrorBody {
                timeout_secs: Some(secs),
                ..ErrorBody::new(e.to_string())
            },
        ),
        PageError::ParseFailed { raw, .. } => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody {
                raw: Some(raw),
                ..ErrorBody::new("Failed to parse AI response")
            },
        ),
        PageError::GatewayFailed { detail } => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(detail))
        }
        PageError::RenderFailed { .. } => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(e.to_string()))
        }
    }
}

fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}
