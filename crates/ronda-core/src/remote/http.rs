//! HTTP adapter for the central incident API.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{RemoteError, RemoteIncidentStore, RemoteResult};
use crate::models::{IncidentCode, IncidentRecord};
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Clone)]
pub struct HttpIncidentStore {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpIncidentStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpIncidentStore")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpIncidentStore {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into())).ok_or_else(|| {
            crate::Error::InvalidInput("remote base URL must not be empty".to_string())
        })?;
        if !is_http_url(&base_url) {
            return Err(crate::Error::InvalidInput(
                "remote base URL must include http:// or https://".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                crate::Error::InvalidInput(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: normalize_text_option(auth_token),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json");
        match self.auth_token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|error| RemoteError::Transient(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Map a non-success response onto the transient/rejected split.
async fn classify_failure(response: reqwest::Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = parse_api_error(status, &body);

    if is_credential_failure(status) {
        tracing::error!(
            "Remote store refused our credentials ({}); check RONDA_REMOTE_TOKEN",
            message
        );
        return RemoteError::Transient(message);
    }
    if is_retryable_status(status) {
        RemoteError::Transient(message)
    } else {
        RemoteError::Rejected(message)
    }
}

/// Auth failures are a client configuration problem, not a verdict on the record.
fn is_credential_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> RemoteResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|error| RemoteError::Transient(format!("invalid response body: {error}")))
}

#[async_trait]
impl RemoteIncidentStore for HttpIncidentStore {
    async fn find_by_code(&self, code: &IncidentCode) -> RemoteResult<Option<IncidentRecord>> {
        let response = self
            .send(
                self.request(reqwest::Method::GET, "/v1/incidents/by-code")
                    .query(&[("code", code.to_string())]),
            )
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => decode(response).await.map(Some),
            _ => Err(classify_failure(response).await),
        }
    }

    async fn list_codes_for_year(&self, year: i32) -> RemoteResult<BTreeSet<String>> {
        let response = self
            .send(
                self.request(reqwest::Method::GET, "/v1/incidents/codes")
                    .query(&[("year", year)]),
            )
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(response).await);
        }
        decode(response).await
    }

    async fn upsert(&self, record: &IncidentRecord) -> RemoteResult<()> {
        let response = self
            .send(
                self.request(reqwest::Method::PUT, &format!("/v1/incidents/{}", record.id))
                    .json(record),
            )
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(classify_failure(response).await)
        }
    }

    async fn ping(&self) -> RemoteResult<()> {
        let response = self
            .send(self.request(reqwest::Method::GET, "/healthz"))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RemoteError::Transient(format!(
                "health check returned HTTP {}",
                response.status().as_u16()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_base_urls() {
        let timeout = Duration::from_secs(1);
        assert!(HttpIncidentStore::new("  ", None, timeout).is_err());
        assert!(HttpIncidentStore::new("api.example.com", None, timeout).is_err());

        let store = HttpIncidentStore::new("https://api.example.com/", None, timeout).unwrap();
        assert_eq!(store.base_url(), "https://api.example.com");
    }

    #[test]
    fn debug_redacts_token() {
        let store = HttpIncidentStore::new(
            "https://api.example.com",
            Some("secret-token".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::CONFLICT));
        assert!(!is_retryable_status(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn credential_failures_are_not_record_rejections() {
        assert!(is_credential_failure(StatusCode::UNAUTHORIZED));
        assert!(is_credential_failure(StatusCode::FORBIDDEN));
        assert!(!is_credential_failure(StatusCode::BAD_REQUEST));
        assert!(!is_credential_failure(StatusCode::CONFLICT));
    }

    #[test]
    fn parse_api_error_prefers_json_message() {
        assert_eq!(
            parse_api_error(StatusCode::CONFLICT, r#"{"error":"code taken"}"#),
            "code taken (409)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_REQUEST, "  "), "HTTP 400");
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, "plain failure"),
            "plain failure (400)"
        );
    }
}
