use utoipa::OpenApi;

use crate::codegate::handlers::{code_cancel, code_request, code_verify, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        code_request::code_request,
        code_verify::code_verify,
        code_cancel::code_cancel,
    ),
    components(schemas(
        health::Health,
        code_request::CodeRequest,
        code_verify::CodeVerify,
        code_cancel::CodeCancel,
        crate::codegate::handlers::HandshakeResponse,
        crate::handshake::ErrorKind,
    )),
    tags(
        (name = "handshake", description = "Phone code verification handshake"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/code-request",
            "/v1/code-verify",
            "/v1/code-cancel",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
