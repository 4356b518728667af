//! JSON-over-HTTP provider gateway adapter.
//!
//! A connection is a server-side session created with
//! `POST {base}/v1/connections` and released with
//! `DELETE {base}/v1/connections/{id}`. Code requests and sign-ins are scoped
//! to that session.

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{IdentityProvider, ProviderConnection, VerifyResponse};
use crate::handshake::error::ProviderError;
use crate::handshake::identity::{CodeHandle, Identity};
use crate::APP_USER_AGENT;

#[derive(Deserialize)]
struct OpenResponse {
    connection_id: String,
}

#[derive(Serialize)]
struct CodeRequest<'a> {
    identity: &'a str,
}

#[derive(Deserialize)]
struct CodeResponse {
    code_handle: String,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    identity: &'a str,
    code: &'a str,
    code_handle: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary_secret: Option<&'a str>,
}

#[derive(Deserialize)]
struct SignInResponse {
    session: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl HttpProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Unavailable(format!("http client: {err}")))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Append `segments` to `base`, percent-encoding each one.
    fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::Rejected(format!("invalid provider url: {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn connection_url(&self, connection_id: &str) -> Result<Url, ProviderError> {
        if matches!(connection_id, "" | "." | "..") {
            return Err(ProviderError::Rejected(format!(
                "invalid connection id {connection_id:?}"
            )));
        }
        Self::endpoint(&self.base_url, &["v1", "connections", connection_id])
    }
}

fn transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

async fn unexpected_status(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Unavailable(format!("{status}: {body}"))
    } else {
        ProviderError::Rejected(format!("{status}: {body}"))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for HttpProvider {
    #[instrument(skip(self))]
    async fn open(&self) -> Result<Box<dyn ProviderConnection>, ProviderError> {
        let url = Self::endpoint(&self.base_url, &["v1", "connections"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| transport_error(&err))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response).await);
        }

        let opened: OpenResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Rejected(format!("malformed open response: {err}")))?;

        debug!(connection_id = %opened.connection_id, "provider connection opened");

        let base = self.connection_url(&opened.connection_id)?;

        Ok(Box::new(HttpConnection {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base,
            closed: false,
        }))
    }
}

struct HttpConnection {
    client: Client,
    api_key: SecretString,
    base: Url,
    closed: bool,
}

#[async_trait::async_trait]
impl ProviderConnection for HttpConnection {
    async fn request_code(&mut self, identity: &Identity) -> Result<CodeHandle, ProviderError> {
        let url = HttpProvider::endpoint(&self.base, &["codes"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&CodeRequest {
                identity: identity.as_str(),
            })
            .send()
            .await
            .map_err(|err| transport_error(&err))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response).await);
        }

        let body: CodeResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Rejected(format!("malformed code response: {err}")))?;

        Ok(CodeHandle::new(body.code_handle))
    }

    async fn verify(
        &mut self,
        identity: &Identity,
        code: &str,
        handle: &CodeHandle,
        secondary_secret: Option<&SecretString>,
    ) -> VerifyResponse {
        let url = match HttpProvider::endpoint(&self.base, &["sign-in"]) {
            Ok(url) => url,
            Err(err) => return VerifyResponse::Failed(err),
        };

        let request = SignInRequest {
            identity: identity.as_str(),
            code,
            code_handle: handle.as_str(),
            secondary_secret: secondary_secret.map(|secret| secret.expose_secret()),
        };

        let response = match self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return VerifyResponse::Failed(transport_error(&err)),
        };

        match response.status() {
            status if status.is_success() => match response.json::<SignInResponse>().await {
                Ok(body) => VerifyResponse::Authorized(SecretString::from(body.session)),
                Err(err) => VerifyResponse::Failed(ProviderError::Rejected(format!(
                    "malformed sign-in response: {err}"
                ))),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let status = response.status();
                match response.json::<ErrorResponse>().await {
                    Ok(body) => match body.error.as_str() {
                        "secondary_required" => VerifyResponse::NeedsSecondary,
                        "code_invalid" => VerifyResponse::InvalidCode,
                        "code_expired" => VerifyResponse::ExpiredCode,
                        other => VerifyResponse::Failed(ProviderError::Rejected(format!(
                            "{status}: {other}"
                        ))),
                    },
                    Err(_) => VerifyResponse::Failed(ProviderError::Rejected(status.to_string())),
                }
            }
            _ => VerifyResponse::Failed(unexpected_status(response).await),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let result = self
            .client
            .delete(self.base.clone())
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await;

        if let Err(err) = result {
            warn!("Failed to close provider connection: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base: &str) -> HttpProvider {
        HttpProvider::new(
            Url::parse(base).unwrap(),
            SecretString::from("key"),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn connection_id_stays_one_path_segment() {
        let url = provider("http://gateway.test")
            .connection_url("c1/../admin?all=1#x")
            .unwrap();
        assert_eq!(url.path(), "/v1/connections/c1%2F..%2Fadmin%3Fall=1%23x");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let codes = HttpProvider::endpoint(&url, &["codes"]).unwrap();
        assert_eq!(codes.path(), "/v1/connections/c1%2F..%2Fadmin%3Fall=1%23x/codes");
    }

    #[test]
    fn base_path_is_kept() {
        let url = provider("http://gateway.test/sms/").connection_url("c1").unwrap();
        assert_eq!(url.as_str(), "http://gateway.test/sms/v1/connections/c1");
    }

    #[test]
    fn dot_segments_are_rejected() {
        let provider = provider("http://gateway.test");
        for id in ["", ".", ".."] {
            assert!(
                matches!(provider.connection_url(id), Err(ProviderError::Rejected(_))),
                "{id:?} should be rejected"
            );
        }
    }
}
