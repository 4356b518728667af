pub mod code_cancel;
pub mod code_request;
pub mod code_verify;
pub mod health;

// common types for the handshake handlers
use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::handshake::{ErrorKind, HandshakeError, Identity};

/// Body of every handshake endpoint, tagged by `status`.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandshakeResponse {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        code_handle: Option<String>,
    },
    NeedsSecondary,
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts_used: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code_handle: Option<String>,
    },
}

pub type Reply = (StatusCode, Json<HandshakeResponse>);

pub fn ok(code_handle: Option<String>) -> Reply {
    (StatusCode::OK, Json(HandshakeResponse::Ok { code_handle }))
}

pub fn failure(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Reply {
    (
        status,
        Json(HandshakeResponse::Error {
            kind,
            message: message.into(),
            attempts_used: None,
            code_handle: None,
        }),
    )
}

pub fn invalid_request(message: &str) -> Reply {
    failure(StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest, message)
}

/// Map a handshake error to its HTTP reply.
pub fn error_reply(err: &HandshakeError) -> Reply {
    let status = match err {
        HandshakeError::InvalidIdentity(_) => StatusCode::BAD_REQUEST,
        HandshakeError::NoPendingHandshake => StatusCode::NOT_FOUND,
        HandshakeError::AlreadyFinalized
        | HandshakeError::InProgress
        | HandshakeError::HandleMismatch => StatusCode::CONFLICT,
        HandshakeError::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
        HandshakeError::ProviderTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
        HandshakeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match err {
        HandshakeError::Store(store_err) => {
            error!("Handshake store failure: {store_err}");
            "internal error".to_string()
        }
        other => other.to_string(),
    };

    let attempts_used = match err {
        HandshakeError::TooManyAttempts { attempts_used } => Some(*attempts_used),
        _ => None,
    };

    (
        status,
        Json(HandshakeResponse::Error {
            kind: err.kind(),
            message,
            attempts_used,
            code_handle: None,
        }),
    )
}

/// Parse the `identity` field of a request body.
///
/// # Errors
/// Returns the ready-made reply for an invalid phone number.
pub fn parse_identity(raw: &str) -> Result<Identity, Reply> {
    Identity::parse(raw).map_err(|err| error_reply(&err))
}
