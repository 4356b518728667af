//! `HttpProvider` against an in-process fake gateway.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, post},
    Json, Router,
};
use codegate::handshake::{
    provider::{HttpProvider, IdentityProvider, ProviderConnection, VerifyResponse},
    CodeHandle, HandshakeConfig, HandshakeError, HandshakeStores, Identity, Orchestrator,
    ProviderError, VerifyOutcome,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

const API_KEY: &str = "gateway-key";
const SECONDARY_PHONE: &str = "+15550000002";
const BROKEN_PHONE: &str = "+15550000503";

#[derive(Default)]
struct Gateway {
    opened: usize,
    closed: Vec<String>,
}

type Shared = Arc<Mutex<Gateway>>;

#[derive(Deserialize)]
struct CodeBody {
    identity: String,
}

#[derive(Deserialize)]
struct SignInBody {
    identity: String,
    code: String,
    code_handle: String,
    secondary_secret: Option<String>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {API_KEY}"))
}

async fn open(State(gateway): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut gateway = gateway.lock().unwrap();
    gateway.opened += 1;
    let id = format!("c{}", gateway.opened);
    (StatusCode::CREATED, Json(json!({ "connection_id": id }))).into_response()
}

async fn codes(Path(id): Path<String>, Json(body): Json<CodeBody>) -> Response {
    if body.identity == BROKEN_PHONE {
        return (StatusCode::SERVICE_UNAVAILABLE, "sms backend down").into_response();
    }
    Json(json!({ "code_handle": format!("{id}-handle") })).into_response()
}

async fn sign_in(Json(body): Json<SignInBody>) -> Response {
    let reject = |error: &str| (StatusCode::UNAUTHORIZED, Json(json!({ "error": error })));

    if body.code_handle.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    match body.code.as_str() {
        "12345" => {}
        "99999" => return reject("code_expired").into_response(),
        _ => return reject("code_invalid").into_response(),
    }
    if body.identity == SECONDARY_PHONE {
        match body.secondary_secret.as_deref() {
            None => return reject("secondary_required").into_response(),
            Some("hunter2") => {}
            Some(_) => return reject("code_invalid").into_response(),
        }
    }
    Json(json!({ "session": format!("tok-{}", body.identity) })).into_response()
}

async fn close(State(gateway): State<Shared>, Path(id): Path<String>) -> StatusCode {
    gateway.lock().unwrap().closed.push(id);
    StatusCode::NO_CONTENT
}

async fn spawn_gateway() -> (Url, Shared) {
    let gateway = Shared::default();
    let app = Router::new()
        .route("/v1/connections", post(open))
        .route("/v1/connections/:id", delete(close))
        .route("/v1/connections/:id/codes", post(codes))
        .route("/v1/connections/:id/sign-in", post(sign_in))
        .with_state(gateway.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (Url::parse(&format!("http://{addr}")).unwrap(), gateway)
}

fn provider(base: Url, key: &str) -> HttpProvider {
    HttpProvider::new(base, SecretString::from(key), Duration::from_secs(5)).unwrap()
}

fn orchestrator(base: Url) -> Orchestrator {
    Orchestrator::new(
        HandshakeConfig::new(),
        Arc::new(provider(base, API_KEY)),
        HandshakeStores::in_memory(),
    )
}

#[tokio::test]
async fn connection_lifecycle_maps_gateway_answers() {
    let (base, gateway) = spawn_gateway().await;
    let provider = provider(base, API_KEY);
    let identity = Identity::parse("+15551230000").unwrap();

    let mut connection = provider.open().await.unwrap();
    let handle = connection.request_code(&identity).await.unwrap();
    assert_eq!(handle, CodeHandle::new("c1-handle"));

    assert!(matches!(
        connection.verify(&identity, "00000", &handle, None).await,
        VerifyResponse::InvalidCode
    ));
    assert!(matches!(
        connection.verify(&identity, "99999", &handle, None).await,
        VerifyResponse::ExpiredCode
    ));
    match connection.verify(&identity, "12345", &handle, None).await {
        VerifyResponse::Authorized(token) => {
            assert_eq!(token.expose_secret(), "tok-+15551230000");
        }
        other => panic!("unexpected response {other:?}"),
    }

    connection.close().await;
    connection.close().await;
    assert_eq!(gateway.lock().unwrap().closed, vec!["c1".to_string()]);
}

#[tokio::test]
async fn secondary_secret_is_forwarded() {
    let (base, _gateway) = spawn_gateway().await;
    let provider = provider(base, API_KEY);
    let identity = Identity::parse(SECONDARY_PHONE).unwrap();

    let mut connection = provider.open().await.unwrap();
    let handle = connection.request_code(&identity).await.unwrap();

    assert!(matches!(
        connection.verify(&identity, "12345", &handle, None).await,
        VerifyResponse::NeedsSecondary
    ));
    let secret = SecretString::from("hunter2");
    assert!(matches!(
        connection
            .verify(&identity, "12345", &handle, Some(&secret))
            .await,
        VerifyResponse::Authorized(_)
    ));
    connection.close().await;
}

#[tokio::test]
async fn gateway_failures_become_provider_errors() {
    let (base, _gateway) = spawn_gateway().await;

    let err = provider(base.clone(), "wrong-key").open().await.err().unwrap();
    assert!(matches!(err, ProviderError::Rejected(_)));

    let mut connection = provider(base, API_KEY).open().await.unwrap();
    let broken = Identity::parse(BROKEN_PHONE).unwrap();
    let err = connection.request_code(&broken).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));

    let identity = Identity::parse("+15551230000").unwrap();
    assert!(matches!(
        connection
            .verify(&identity, "12345", &CodeHandle::new(""), None)
            .await,
        VerifyResponse::Failed(ProviderError::Rejected(_))
    ));
    connection.close().await;
}

#[tokio::test]
async fn unreachable_gateway_is_unavailable() {
    // Bind and drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = Url::parse(&format!("http://{addr}")).unwrap();
    let err = provider(base, API_KEY).open().await.err().unwrap();
    assert!(matches!(err, ProviderError::Unavailable(_)));
}

#[tokio::test]
async fn orchestrator_closes_every_gateway_connection() {
    let (base, gateway) = spawn_gateway().await;
    let orchestrator = orchestrator(base);
    let identity = Identity::parse("+15551230000").unwrap();

    let handle = orchestrator.request_code(&identity).await.unwrap();
    let outcome = orchestrator
        .verify_code(&identity, "00000", &handle, None)
        .await
        .unwrap();
    assert!(matches!(outcome, VerifyOutcome::InvalidCode { .. }));
    let outcome = orchestrator
        .verify_code(&identity, "12345", &handle, None)
        .await
        .unwrap();
    assert!(matches!(outcome, VerifyOutcome::Finalized { .. }));

    let broken = Identity::parse(BROKEN_PHONE).unwrap();
    assert!(matches!(
        orchestrator.request_code(&broken).await,
        Err(HandshakeError::ProviderTransient(ProviderError::Unavailable(_)))
    ));

    let gateway = gateway.lock().unwrap();
    assert_eq!(gateway.opened, 4);
    assert_eq!(gateway.closed.len(), 4);
}
