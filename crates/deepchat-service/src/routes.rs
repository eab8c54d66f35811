use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use deepchat::orchestrator::{ChatRequest, Orchestrator};
use futures::StreamExt;
use serde_json::json;
use std::{convert::Infallible, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::request::ChatPayload;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn read_payload(req: Request) -> Result<ChatPayload, ApiError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let form = Multipart::from_request(req, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        ChatPayload::from_multipart(form).await
    } else {
        let body = to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        ChatPayload::from_json(&body)
    }
}

async fn handle_chat(State(state): State<AppState>, req: Request) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat_request", %request_id);

    async move {
        let payload = read_payload(req).await.inspect_err(|e| {
            warn!(error = %e.message, "rejected chat request");
        })?;
        info!(
            session = %payload.session_id,
            messages = payload.messages.len(),
            attachments = payload.attachment_urls.len(),
            "chat request received"
        );

        if !state.orchestrator.is_configured() {
            error!("no model credentials configured");
            return Err(ApiError::internal("Missing API configuration"));
        }

        let request = ChatRequest::new(payload.session_id, payload.messages)
            .with_attachments(payload.attachment_urls);
        let stream = state.orchestrator.handle(request).await.map_err(|e| {
            error!(error = %e, "chat turn failed");
            ApiError::internal(e.to_string())
        })?;

        let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
        Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response())
    }
    .instrument(span)
    .await
}
