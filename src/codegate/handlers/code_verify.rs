//! Code verification endpoint.
//!
//! Normal handshake branches that are not a success (wrong code, expired code)
//! are still reported as `status: "error"` so clients can switch on `kind`.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{error_reply, invalid_request, ok, parse_identity, HandshakeResponse, Reply};
use crate::handshake::{CodeHandle, ErrorKind, Orchestrator, VerifyOutcome};

// No Debug: carries the code and the secondary secret.
#[derive(ToSchema, Deserialize)]
pub struct CodeVerify {
    identity: String,
    code: String,
    /// Handle returned by `/v1/code-request`.
    code_handle: String,
    /// Only needed after a `needs_secondary` response.
    #[serde(default)]
    secondary_secret: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/code-verify",
    request_body = CodeVerify,
    responses(
        (status = 200, description = "Finalized, or a secondary secret is needed", body = HandshakeResponse),
        (status = 400, description = "Invalid phone number or payload", body = HandshakeResponse),
        (status = 401, description = "Wrong code", body = HandshakeResponse),
        (status = 404, description = "No code was requested", body = HandshakeResponse),
        (status = 409, description = "Already finalized or stale code handle", body = HandshakeResponse),
        (status = 410, description = "Code expired", body = HandshakeResponse),
        (status = 429, description = "Too many failed attempts", body = HandshakeResponse),
        (status = 503, description = "Identity provider unavailable", body = HandshakeResponse)
    ),
    tag = "handshake"
)]
/// Check a code (and optional secondary secret) and finalize the session.
#[instrument(skip_all)]
pub async fn code_verify(
    orchestrator: Extension<Arc<Orchestrator>>,
    payload: Option<Json<CodeVerify>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return invalid_request("Missing payload");
    };

    let identity = match parse_identity(&request.identity) {
        Ok(identity) => identity,
        Err(reply) => return reply,
    };

    let code = request.code.trim();
    if code.is_empty() {
        return invalid_request("Missing code");
    }
    if request.code_handle.trim().is_empty() {
        return invalid_request("Missing code_handle");
    }

    let handle = CodeHandle::new(request.code_handle.trim());
    let secondary_secret = request
        .secondary_secret
        .filter(|secret| !secret.is_empty())
        .map(SecretString::from);

    match orchestrator
        .verify_code(&identity, code, &handle, secondary_secret.as_ref())
        .await
    {
        Ok(outcome) => outcome_reply(outcome),
        Err(err) => error_reply(&err),
    }
}

fn outcome_reply(outcome: VerifyOutcome) -> Reply {
    match outcome {
        VerifyOutcome::Finalized { .. } => ok(None),
        VerifyOutcome::NeedsSecondary => (StatusCode::OK, Json(HandshakeResponse::NeedsSecondary)),
        VerifyOutcome::InvalidCode {
            attempts_used,
            attempts_remaining,
        } => (
            StatusCode::UNAUTHORIZED,
            Json(HandshakeResponse::Error {
                kind: ErrorKind::InvalidCode,
                message: format!("invalid code, {attempts_remaining} attempts remaining"),
                attempts_used: Some(attempts_used),
                code_handle: None,
            }),
        ),
        VerifyOutcome::Expired { reissued } => {
            let message = if reissued.is_some() {
                "code expired, a new code was sent"
            } else {
                "code expired, request a new code"
            };
            (
                StatusCode::GONE,
                Json(HandshakeResponse::Error {
                    kind: ErrorKind::ExpiredCode,
                    message: message.to_string(),
                    attempts_used: None,
                    code_handle: reissued.map(|handle| handle.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn invalid_code_carries_attempts() {
        let (status, Json(body)) = outcome_reply(VerifyOutcome::InvalidCode {
            attempts_used: 2,
            attempts_remaining: 1,
        });
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["kind"], "invalid_code");
        assert_eq!(value["attempts_used"], 2);
    }

    #[test]
    fn expired_code_carries_reissued_handle() {
        let (status, Json(body)) = outcome_reply(VerifyOutcome::Expired {
            reissued: Some(CodeHandle::new("handle-2")),
        });
        assert_eq!(status, StatusCode::GONE);
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["kind"], "expired_code");
        assert_eq!(value["code_handle"], "handle-2");
    }

    #[test]
    fn finalized_is_plain_ok() {
        let (status, Json(body)) = outcome_reply(VerifyOutcome::Finalized {
            finalized_at: Utc::now(),
        });
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, HandshakeResponse::Ok { code_handle: None });
    }
}
