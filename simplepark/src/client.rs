//! SimplePark API client implementation

use crate::error::ClientError;
use chrono::{DateTime, Utc};
use parksync_core::error::GatewayOperation;
use parksync_core::{
    BeginSession, GatewayError, GatewayFuture, GatewayResponse, GatewayResult, LifecycleGateway,
    ServiceFault,
};
use parksync_runtime::metrics::GatewayMetrics;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`SimpleParkClient`].
#[derive(Clone, Debug)]
pub struct SimpleParkConfig {
    /// Root URL, e.g. `https://api.simplepark.example/v1`
    pub base_url: String,
    /// Value sent in the `X-API-Key` header
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl SimpleParkConfig {
    /// Settings with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    license_plate: &'a str,
    area_code: &'a str,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtendRequest {
    new_end_time: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest {
    actual_end_time: DateTime<Utc>,
}

/// SimplePark API client
///
/// Stateless apart from its connection pool; cheap to clone.
#[derive(Clone, Debug)]
pub struct SimpleParkClient {
    client: Client,
    base_url: String,
}

impl SimpleParkClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidBaseUrl`] if the base URL is not an http(s) URL
    /// - [`ClientError::InvalidApiKey`] if the key is empty or not header-safe
    /// - [`ClientError::Http`] if the HTTP client cannot be built
    pub fn new(config: SimpleParkConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let parsed =
            Url::parse(&base_url).map_err(|e| ClientError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl(base_url));
        }

        if config.api_key.trim().is_empty() {
            return Err(ClientError::InvalidApiKey);
        }
        let mut api_key =
            HeaderValue::from_str(&config.api_key).map_err(|_| ClientError::InvalidApiKey)?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Base URL requests are sent to, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a parking session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ClientFault`] on a 4xx answer and
    /// [`GatewayError::ServiceFault`] on anything else that is not a decodable
    /// success.
    pub async fn start_parking(&self, request: &BeginSession) -> GatewayResult<GatewayResponse> {
        let body = StartRequest {
            license_plate: &request.license_plate,
            area_code: &request.area_code,
            start_time: request.start_time,
            end_time: request.end_time,
        };
        self.post(GatewayOperation::Begin, "/parking/start", &body)
            .await
    }

    /// Move the end time of a session.
    ///
    /// # Errors
    ///
    /// Same classification as [`SimpleParkClient::start_parking`].
    pub async fn extend_parking(
        &self,
        external_id: &str,
        new_end_time: DateTime<Utc>,
    ) -> GatewayResult<GatewayResponse> {
        let path = format!("/parking/{external_id}/extend");
        self.post(GatewayOperation::Extend, &path, &ExtendRequest { new_end_time })
            .await
    }

    /// Stop a session.
    ///
    /// # Errors
    ///
    /// Same classification as [`SimpleParkClient::start_parking`].
    pub async fn stop_parking(
        &self,
        external_id: &str,
        actual_end_time: DateTime<Utc>,
    ) -> GatewayResult<GatewayResponse> {
        let path = format!("/parking/{external_id}/stop");
        self.post(GatewayOperation::End, &path, &StopRequest { actual_end_time })
            .await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        operation: GatewayOperation,
        path: &str,
        body: &B,
    ) -> GatewayResult<GatewayResponse> {
        let started = Instant::now();
        let result = self.send(path, body).await;

        let label = match &result {
            Ok(_) => "success",
            Err(GatewayError::ClientFault { .. }) => "client_fault",
            Err(GatewayError::ServiceFault(_)) => "service_fault",
        };
        GatewayMetrics::record_request(operation, label, started.elapsed());

        match &result {
            Ok(response) => tracing::debug!(
                operation = %operation,
                external_id = %response.external_id,
                status = %response.status,
                "SimplePark call succeeded"
            ),
            Err(error @ GatewayError::ClientFault { .. }) => {
                tracing::error!(operation = %operation, path, error = %error, "SimplePark client error");
            },
            Err(error) => {
                tracing::warn!(operation = %operation, path, error = %error, "SimplePark unavailable");
            },
        }

        result
    }

    async fn send<B: Serialize + Sync>(&self, path: &str, body: &B) -> GatewayResult<GatewayResponse> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;

        if status.is_client_error() {
            return Err(GatewayError::ClientFault {
                status: status.as_u16(),
                message: text,
            });
        }
        if status.is_server_error() {
            return Err(ServiceFault::ServerError {
                status: status.as_u16(),
                message: text,
            }
            .into());
        }
        if !status.is_success() {
            return Err(ServiceFault::Unexpected(format!("unexpected status {status}")).into());
        }

        serde_json::from_str::<GatewayResponse>(&text)
            .map_err(|e| ServiceFault::Unexpected(format!("undecodable response: {e}")).into())
    }
}

fn classify_transport_error(error: reqwest::Error) -> GatewayError {
    let fault = if error.is_timeout() {
        ServiceFault::Timeout
    } else if error.is_connect() {
        ServiceFault::Unreachable(error.to_string())
    } else {
        ServiceFault::Unexpected(error.to_string())
    };
    fault.into()
}

impl LifecycleGateway for SimpleParkClient {
    fn begin(&self, request: BeginSession) -> GatewayFuture<'_> {
        Box::pin(async move { self.start_parking(&request).await })
    }

    fn extend(&self, external_id: &str, new_end_time: DateTime<Utc>) -> GatewayFuture<'_> {
        let external_id = external_id.to_string();
        Box::pin(async move { self.extend_parking(&external_id, new_end_time).await })
    }

    fn end(&self, external_id: &str, actual_end_time: DateTime<Utc>) -> GatewayFuture<'_> {
        let external_id = external_id.to_string();
        Box::pin(async move { self.stop_parking(&external_id, actual_end_time).await })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client =
            SimpleParkClient::new(SimpleParkConfig::new("http://localhost:8080/api/", "key")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/api");
    }

    #[test]
    fn rejects_non_http_base_url() {
        for url in ["", "localhost:8080", "ftp://example.com"] {
            let result = SimpleParkClient::new(SimpleParkConfig::new(url, "key"));
            assert!(matches!(result, Err(ClientError::InvalidBaseUrl(_))), "{url}");
        }
    }

    #[test]
    fn rejects_blank_api_key() {
        let result = SimpleParkClient::new(SimpleParkConfig::new("http://localhost", "  "));
        assert!(matches!(result, Err(ClientError::InvalidApiKey)));
    }

    #[test]
    fn start_body_uses_wire_field_names() {
        let t = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = serde_json::to_value(StartRequest {
            license_plate: "ABC-123",
            area_code: "Z1",
            start_time: t,
            end_time: None,
        })
        .unwrap();

        assert_eq!(body["licensePlate"], "ABC-123");
        assert_eq!(body["areaCode"], "Z1");
        assert!(body["startTime"].is_string());
        assert!(body["endTime"].is_null());
    }

    #[test]
    fn default_timeout_is_five_seconds() {
        let config = SimpleParkConfig::new("http://localhost", "key");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.with_timeout(Duration::from_secs(1)).timeout,
            Duration::from_secs(1)
        );
    }
}
