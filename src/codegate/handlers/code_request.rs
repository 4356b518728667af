use axum::{extract::Extension, response::IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{error_reply, invalid_request, ok, parse_identity, HandshakeResponse};
use crate::handshake::Orchestrator;

#[derive(ToSchema, Deserialize, Debug)]
pub struct CodeRequest {
    /// Phone number; spaces, dashes and parentheses are accepted.
    identity: String,
}

#[utoipa::path(
    post,
    path = "/v1/code-request",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Code sent", body = HandshakeResponse),
        (status = 400, description = "Invalid phone number or payload", body = HandshakeResponse),
        (status = 409, description = "Already finalized or a code is still valid", body = HandshakeResponse),
        (status = 503, description = "Identity provider unavailable", body = HandshakeResponse)
    ),
    tag = "handshake"
)]
/// Ask the identity provider to send a one-time code.
#[instrument(skip_all)]
pub async fn code_request(
    orchestrator: Extension<Arc<Orchestrator>>,
    payload: Option<Json<CodeRequest>>,
) -> impl IntoResponse {
    let request: CodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return invalid_request("Missing payload"),
    };

    let identity = match parse_identity(&request.identity) {
        Ok(identity) => identity,
        Err(reply) => return reply,
    };

    match orchestrator.request_code(&identity).await {
        Ok(handle) => ok(Some(handle.to_string())),
        Err(err) => error_reply(&err),
    }
}
