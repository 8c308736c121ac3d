use crate::api::types::{
    ChannelConfig, ChannelStatus, DashboardResponse, GeminiSweep, PingResult, PingSweepEntry,
    RawSweepEntry,
};
use crate::api::Credentials;
use crate::sync::{Category, DashboardSource};
use crate::util::{validate_base_url, UrlValidationError};
use futures::StreamExt;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Largest admin response body the client will buffer.
pub const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024; // 4MB

/// Errors returned by the admin API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// The request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP 401; the held credential has been cleared
    #[error("Authentication failed, please re-enter the access key")]
    Unauthorized,
    /// Any other non-2xx response
    #[error("{message} (HTTP {status})")]
    Http { status: u16, message: String },
    /// Response body exceeded [`MAX_RESPONSE_SIZE`]
    #[error("Response exceeds {} byte limit", MAX_RESPONSE_SIZE)]
    ResponseTooLarge,
    /// Response body was not the expected JSON shape
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// The request could not be built from the given arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The configured base URL failed validation
    #[error(transparent)]
    BaseUrl(#[from] UrlValidationError),
}

impl ApiError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }

    /// HTTP status when the proxy answered with an error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Preference order: JSON `error` string, JSON `message` string, the raw text
/// body, then a generic `Request failed (<status>)`.
pub(crate) fn error_message(body: &str, status: u16) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("Request failed ({status})");
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => ["error", "message"]
            .iter()
            .find_map(|key| map.get(*key).and_then(serde_json::Value::as_str))
            .filter(|msg| !msg.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Request failed ({status})")),
        Ok(serde_json::Value::String(text)) if !text.is_empty() => text,
        Ok(_) => format!("Request failed ({status})"),
        Err(_) => body.to_string(),
    }
}

/// Typed client for the proxy's `/api` admin surface.
///
/// Cheap to clone; clones share the connection pool and the credential holder.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    api_root: String,
    credentials: Credentials,
}

impl ApiClient {
    /// Build a client for `base_url` (e.g. `http://localhost:3000`).
    ///
    /// # Errors
    ///
    /// - [`ApiError::BaseUrl`] if the URL fails [`validate_base_url`]
    /// - [`ApiError::Network`] if the HTTP client cannot be constructed
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base = validate_base_url(base_url)?;
        let api_root = format!("{}/api", base.as_str().trim_end_matches('/'));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Network)?;

        tracing::debug!(
            api_root = %api_root,
            timeout_secs = timeout.as_secs(),
            "Admin API client ready"
        );

        Ok(Self {
            http,
            api_root,
            credentials,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_root, path))
            .header(CONTENT_TYPE, "application/json")
    }

    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let request = match self.credentials.with_key(HeaderValue::from_str) {
            Some(Ok(mut value)) => {
                value.set_sensitive(true);
                request.header("x-api-key", value)
            }
            Some(Err(_)) => {
                return Err(ApiError::InvalidRequest(
                    "access key contains characters not allowed in a header".to_string(),
                ))
            }
            None => request,
        };

        let response = request.send().await.map_err(ApiError::from_transport)?;
        let status = response.status();
        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let body = String::from_utf8_lossy(&bytes);

        if status == StatusCode::UNAUTHORIZED {
            self.credentials.clear();
            tracing::warn!("Admin API rejected the access key, credentials cleared");
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: error_message(&body, status.as_u16()),
            });
        }

        Ok(body.into_owned())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.execute(self.request(Method::GET, path)).await?;
        // 204 / empty body reads as JSON null
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ApiError> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }
        self.execute(request).await?;
        Ok(())
    }

    // ========================================================================
    // Dashboard / Ping
    // ========================================================================

    /// Channels, strategy, metrics and stats for `category` in one call.
    pub async fn dashboard(&self, category: Category) -> Result<DashboardResponse, ApiError> {
        let path = match category {
            Category::Messages => "/messages/channels/dashboard",
            Category::Responses => "/messages/channels/dashboard?type=responses",
            Category::Gemini => "/gemini/channels/dashboard",
        };
        self.get_json(path).await
    }

    pub async fn ping(&self, category: Category, index: u32) -> Result<PingResult, ApiError> {
        self.get_json(&format!("/{category}/ping/{index}")).await
    }

    /// Ping every channel of `category`. The gemini endpoint wraps its results
    /// differently; both shapes normalize to [`PingSweepEntry`].
    pub async fn ping_all(&self, category: Category) -> Result<Vec<PingSweepEntry>, ApiError> {
        let path = format!("/{category}/ping");
        let entries = match category {
            Category::Gemini => {
                let sweep: GeminiSweep = self.get_json(&path).await?;
                sweep.channels.into_iter().map(PingSweepEntry::from).collect()
            }
            Category::Messages | Category::Responses => {
                let raw: Option<Vec<RawSweepEntry>> = self.get_json(&path).await?;
                raw.unwrap_or_default()
                    .into_iter()
                    .map(PingSweepEntry::from)
                    .collect()
            }
        };
        Ok(entries)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn add_channel(
        &self,
        category: Category,
        config: &ChannelConfig,
    ) -> Result<(), ApiError> {
        self.send(Method::POST, &format!("/{category}/channels"), Some(config))
            .await
    }

    pub async fn update_channel(
        &self,
        category: Category,
        index: u32,
        config: &ChannelConfig,
    ) -> Result<(), ApiError> {
        self.send(
            Method::PUT,
            &format!("/{category}/channels/{index}"),
            Some(config),
        )
        .await
    }

    pub async fn delete_channel(&self, category: Category, index: u32) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, &format!("/{category}/channels/{index}"), None)
            .await
    }

    pub async fn reorder_channels(
        &self,
        category: Category,
        order: &[u32],
    ) -> Result<(), ApiError> {
        self.send(
            Method::POST,
            &format!("/{category}/channels/reorder"),
            Some(&serde_json::json!({ "order": order })),
        )
        .await
    }

    pub async fn set_channel_status(
        &self,
        category: Category,
        index: u32,
        status: ChannelStatus,
    ) -> Result<(), ApiError> {
        if status == ChannelStatus::Unset {
            return Err(ApiError::InvalidRequest(
                "status must be active, suspended or disabled".to_string(),
            ));
        }
        self.send(
            Method::PATCH,
            &format!("/{category}/channels/{index}/status"),
            Some(&serde_json::json!({ "status": status.as_str() })),
        )
        .await
    }

    /// Give a channel scheduling priority for `duration`.
    pub async fn set_channel_promotion(
        &self,
        category: Category,
        index: u32,
        duration: Duration,
    ) -> Result<(), ApiError> {
        self.send(
            Method::POST,
            &format!("/{category}/channels/{index}/promotion"),
            Some(&serde_json::json!({ "duration": duration.as_secs() })),
        )
        .await
    }

    pub async fn update_load_balance(
        &self,
        category: Category,
        strategy: &str,
    ) -> Result<(), ApiError> {
        let path = match category {
            Category::Messages => "/loadbalance",
            Category::Responses => "/responses/loadbalance",
            Category::Gemini => "/gemini/loadbalance",
        };
        self.send(
            Method::PUT,
            path,
            Some(&serde_json::json!({ "strategy": strategy })),
        )
        .await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    // Fast path: the declared length is already too big
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(ApiError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::from_transport)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

impl DashboardSource for ApiClient {
    async fn fetch_dashboard(&self, category: Category) -> Result<DashboardResponse, ApiError> {
        self.dashboard(category).await
    }

    async fn ping(&self, category: Category, index: u32) -> Result<PingResult, ApiError> {
        ApiClient::ping(self, category, index).await
    }

    async fn ping_all(&self, category: Category) -> Result<Vec<PingSweepEntry>, ApiError> {
        ApiClient::ping_all(self, category).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: Option<&str>) -> ApiClient {
        let creds = Credentials::new(key.map(|k| SecretString::from(k.to_string())));
        ApiClient::new(&server.uri(), creds, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_error_message_preference() {
        assert_eq!(error_message(r#"{"error":"bad id"}"#, 400), "bad id");
        assert_eq!(
            error_message(r#"{"message":"nope","error":""}"#, 400),
            "Request failed (400)"
        );
        assert_eq!(error_message(r#"{"message":"nope"}"#, 400), "nope");
        assert_eq!(error_message("plain failure", 502), "plain failure");
        assert_eq!(error_message("", 503), "Request failed (503)");
        assert_eq!(error_message("[1,2]", 500), "Request failed (500)");
    }

    #[test]
    fn test_rejects_insecure_remote_base() {
        let result = ApiClient::new(
            "http://proxy.example.com",
            Credentials::default(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(ApiError::BaseUrl(_))));
    }

    #[tokio::test]
    async fn test_dashboard_paths_per_category() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages/channels/dashboard"))
            .and(query_param("type", "responses"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"loadBalance":"failover"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/gemini/channels/dashboard"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"loadBalance":"random"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let responses = client.dashboard(Category::Responses).await.unwrap();
        assert_eq!(responses.load_balance, "failover");
        let gemini = client.dashboard(Category::Gemini).await.unwrap();
        assert_eq!(gemini.load_balance, "random");
    }

    #[tokio::test]
    async fn test_sends_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages/ping/3"))
            .and(header("x-api-key", "admin-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":true,"latency":42,"status":"healthy"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("admin-key"));
        let result = client.ping(Category::Messages, 3).await.unwrap();
        assert_eq!(result.latency, 42);
        assert_eq!(result.status, "healthy");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"bad key"}"#))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("stale"));
        assert!(client.credentials().is_authenticated());

        let err = client.dashboard(Category::Messages).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(err.status(), Some(401));
        assert!(!client.credentials().is_authenticated());
    }

    #[tokio::test]
    async fn test_http_error_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"Channel not found"}"#),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        match client.delete_channel(Category::Gemini, 9).await.unwrap_err() {
            ApiError::Http { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Channel not found");
            }
            e => panic!("Expected Http error, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_ping_all_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/responses/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id":0,"name":"a","latency":30,"status":"healthy","success":true},
                    {"id":1,"name":"b","latency":0,"status":"error","success":false}]"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/gemini/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"channels":[{"index":2,"name":"g","latency":70,"success":true}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/messages/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);

        let responses = client.ping_all(Category::Responses).await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].status, "error");

        let gemini = client.ping_all(Category::Gemini).await.unwrap();
        assert_eq!(gemini[0].id, 2);
        assert_eq!(gemini[0].status, "healthy");

        // Go encodes an empty result slice as null
        assert!(client.ping_all(Category::Messages).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/responses/channels/reorder"))
            .and(body_json(serde_json::json!({ "order": [3, 0, 1] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/messages/channels/1/status"))
            .and(body_json(serde_json::json!({ "status": "suspended" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/gemini/channels/2/promotion"))
            .and(body_json(serde_json::json!({ "duration": 300 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/loadbalance"))
            .and(body_json(serde_json::json!({ "strategy": "failover" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        client
            .reorder_channels(Category::Responses, &[3, 0, 1])
            .await
            .unwrap();
        client
            .set_channel_status(Category::Messages, 1, ChannelStatus::Suspended)
            .await
            .unwrap();
        client
            .set_channel_promotion(Category::Gemini, 2, Duration::from_secs(300))
            .await
            .unwrap();
        client
            .update_load_balance(Category::Messages, "failover")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = MockServer::start().await;
        let padding = "x".repeat(MAX_RESPONSE_SIZE);
        Mock::given(method("GET"))
            .and(path("/api/messages/channels/dashboard"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"loadBalance":"failover","pad":"{padding}"}}"#
            )))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.dashboard(Category::Messages).await.unwrap_err();
        assert!(matches!(err, ApiError::ResponseTooLarge));
    }

    #[tokio::test]
    async fn test_body_under_limit_accepted() {
        let server = MockServer::start().await;
        let padding = "x".repeat(MAX_RESPONSE_SIZE / 2);
        Mock::given(method("GET"))
            .and(path("/api/messages/channels/dashboard"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"loadBalance":"failover","pad":"{padding}"}}"#
            )))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let dashboard = client.dashboard(Category::Messages).await.unwrap();
        assert_eq!(dashboard.load_balance, "failover");
    }

    #[tokio::test]
    async fn test_unset_status_rejected_locally() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);
        let err = client
            .set_channel_status(Category::Messages, 0, ChannelStatus::Unset)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
