//! Axum HTTP handlers for the web server
//!
//! Provides the Model Context Protocol endpoint. Every POST gets its own transport.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::errors::AppError;
use crate::mcp::transport::{Transport, TransportReply};
use crate::AppState;

pub async fn mcp_endpoint(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let mut transport = Transport::new();
    transport.bind(Arc::clone(&state.registry))?;

    let transport_id = transport.id();
    transport.on_close(move |reason| {
        debug!(transport_id, reason = ?reason, "mcp request finished");
    });

    let reply = transport.handle(&body).await?;
    transport.close();

    Ok(reply.into_response())
}

impl IntoResponse for TransportReply {
    fn into_response(self) -> Response {
        match self {
            Self::Message(value) => (StatusCode::OK, Json(value)).into_response(),
            Self::Accepted => StatusCode::ACCEPTED.into_response(),
        }
    }
}
