use axum::{extract::Extension, response::IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{error_reply, invalid_request, ok, parse_identity, HandshakeResponse};
use crate::handshake::Orchestrator;

#[derive(ToSchema, Deserialize, Debug)]
pub struct CodeCancel {
    identity: String,
}

#[utoipa::path(
    post,
    path = "/v1/code-cancel",
    request_body = CodeCancel,
    responses(
        (status = 200, description = "In-flight handshake dropped", body = HandshakeResponse),
        (status = 400, description = "Invalid phone number or payload", body = HandshakeResponse),
        (status = 409, description = "Already finalized", body = HandshakeResponse)
    ),
    tag = "handshake"
)]
/// Abandon the current handshake so the next code request starts fresh.
#[instrument(skip_all)]
pub async fn code_cancel(
    orchestrator: Extension<Arc<Orchestrator>>,
    payload: Option<Json<CodeCancel>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return invalid_request("Missing payload");
    };

    let identity = match parse_identity(&request.identity) {
        Ok(identity) => identity,
        Err(reply) => return reply,
    };

    match orchestrator.cancel(&identity).await {
        Ok(()) => ok(None),
        Err(err) => error_reply(&err),
    }
}
