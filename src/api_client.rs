use anyhow::{Context, Result};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{RefreshCoordinator, TokenStore};
use crate::dashboard::{DashboardData, UserData};
use crate::error::ClientError;

/// Options for a single API request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: Vec::new(),
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Authenticated client for the protected API
///
/// Attaches the session's bearer token and recovers from one 401 by
/// refreshing and retrying. Constructed once and shared; the token store is
/// passed per call.
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    base_url: String,

    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    /// Create a new API client with the given timeouts (seconds)
    pub fn new(
        base_url: &str,
        coordinator: Arc<RefreshCoordinator>,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            coordinator,
        })
    }

    /// Issue a request against the protected API and decode the JSON result
    ///
    /// Retries at most once, and only after a 401 for which a refresh
    /// produced a new token.
    pub async fn request<T: DeserializeOwned>(
        &self,
        store: &dyn TokenStore,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut access_token = self.coordinator.get_valid_access_token(store).await;

        let mut response = self.send(&url, &options, access_token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && access_token.is_some() {
            tracing::warn!(url = %url, "Received 401, refreshing session and retrying once");

            access_token = self.coordinator.refresh(store).await;
            if let Some(ref token) = access_token {
                response = self.send(&url, &options, Some(token)).await?;
            }
        }

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()));
        }

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %url, "Request unauthorized, clearing session");
            store.clear();
            return Err(ClientError::Unauthorized);
        }

        let message = error_message(status, response).await;
        tracing::error!(
            status = status.as_u16(),
            url = %url,
            message = %message,
            "API request failed with error response"
        );
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        access_token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut builder = self
            .client
            .request(options.method.clone(), url)
            .headers(request_headers(&options.headers));

        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }

        if let Some(ref body) = options.body {
            builder = builder.body(body.to_string());
        }

        tracing::debug!(
            method = %options.method,
            url = %url,
            authenticated = access_token.is_some(),
            "Sending API request"
        );

        builder.send().await.map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else {
                "request_error"
            };
            tracing::warn!(error_kind = error_kind, error = %e, url = %url, "HTTP request error");
            ClientError::Network(e.to_string())
        })
    }

    /// Fetch the dashboard summary
    pub async fn get_dashboard(&self, store: &dyn TokenStore) -> Result<DashboardData, ClientError> {
        self.request(store, "/api/dashboard", RequestOptions::get())
            .await
    }

    /// Fetch the signed-in user's profile
    pub async fn get_user(&self, store: &dyn TokenStore) -> Result<UserData, ClientError> {
        self.request(store, "/api/user", RequestOptions::get()).await
    }
}

/// Default JSON content type, overridden by any caller header of the same name
fn request_headers(extra: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    for (name, value) in extra {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid request header"),
        }
    }

    headers
}

/// Best message for a failed response: the body's `message`, then the
/// status reason phrase, then a generic fallback
async fn error_message(status: StatusCode, response: Response) -> String {
    let fallback = format!("API Error: {}", status.as_u16());

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => json
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or(fallback),
        Err(_) => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthBackend, MemoryTokenStore, RefreshMode, TokenPair};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use chrono::{Duration, Utc};
    use mockito::Matcher;
    use serde_json::{json, Value};

    fn token(name: &str, exp_offset_secs: i64) -> String {
        let exp = (Utc::now() + Duration::seconds(exp_offset_secs)).timestamp();
        let payload = json!({ "sub": name, "exp": exp });
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload.to_string()))
    }

    fn client(url: &str) -> ApiClient {
        let backend = Arc::new(AuthBackend::new(url, 5, 5).unwrap());
        let coordinator = Arc::new(RefreshCoordinator::new(backend, RefreshMode::Independent));
        ApiClient::new(url, coordinator, 5, 5).unwrap()
    }

    fn store_with(access: &str, refresh: &str) -> MemoryTokenStore {
        MemoryTokenStore::with_pair(TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        })
    }

    #[tokio::test]
    async fn test_request_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let access = token("u1", 900);
        let mock = server
            .mock("GET", "/api/ping")
            .match_header("authorization", format!("Bearer {}", access).as_str())
            .match_header("content-type", "application/json")
            .match_header("x-trace", "abc")
            .with_status(200)
            .with_body(r#"{"pong":true}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&access, "r1");

        let body: Value = client
            .request(&store, "/api/ping", RequestOptions::get().header("x-trace", "abc"))
            .await
            .unwrap();

        assert_eq!(body["pong"], true);
        mock.assert_async().await;
    }

    #[test]
    fn test_caller_content_type_replaces_default() {
        let headers = request_headers(&[
            ("Content-Type".to_string(), "text/plain".to_string()),
            ("x-trace".to_string(), "abc".to_string()),
        ]);

        let content_types: Vec<_> = headers.get_all(header::CONTENT_TYPE).iter().collect();
        assert_eq!(content_types, vec!["text/plain"]);
        assert_eq!(headers.get("x-trace").unwrap(), "abc");

        let headers = request_headers(&[]);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_invalid_caller_header_is_skipped() {
        let headers = request_headers(&[("bad header".to_string(), "x".to_string())]);
        assert_eq!(headers.len(), 1);
    }

    #[tokio::test]
    async fn test_request_sends_caller_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/notes")
            .match_header("content-type", "text/plain")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let store = store_with(&token("u1", 900), "r1");
        let options = RequestOptions::post(json!("hello")).header("Content-Type", "text/plain");
        let result: Result<Value, _> = client(&server.url())
            .request(&store, "/api/notes", options)
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_without_session_is_unauthenticated() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/public")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = client(&server.url());
        let body: Vec<Value> = client
            .request(&MemoryTokenStore::new(), "/api/public", RequestOptions::get())
            .await
            .unwrap();

        assert!(body.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/notes")
            .match_body(Matcher::Json(json!({ "text": "hello" })))
            .with_status(201)
            .with_body(r#"{"id":"n1"}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&token("u1", 900), "r1");
        let body: Value = client
            .request(&store, "/api/notes", RequestOptions::post(json!({ "text": "hello" })))
            .await
            .unwrap();

        assert_eq!(body["id"], "n1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_single_401_refreshes_and_retries_once() {
        let mut server = mockito::Server::new_async().await;
        let old_access = token("old", 900);
        let new_access = token("new", 900);

        let rejected = server
            .mock("GET", "/api/user")
            .match_header("authorization", format!("Bearer {}", old_access).as_str())
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .match_body(Matcher::Json(json!({ "refreshToken": "r1" })))
            .with_status(200)
            .with_body(json!({ "accessToken": new_access, "refreshToken": "r2" }).to_string())
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("GET", "/api/user")
            .match_header("authorization", format!("Bearer {}", new_access).as_str())
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&old_access, "r1");

        let body: Value = client
            .request(&store, "/api/user", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
        assert_eq!(store.get().unwrap().access_token, new_access);
        assert_eq!(store.get().unwrap().refresh_token, "r2");
        rejected.assert_async().await;
        refresh.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_401_surfaces_unauthorized_without_third_attempt() {
        let mut server = mockito::Server::new_async().await;
        let api = server
            .mock("GET", "/api/dashboard")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(json!({ "accessToken": token("new", 900), "refreshToken": "r2" }).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&token("old", 900), "r1");

        let err = client
            .request::<Value>(&store, "/api/dashboard", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::Unauthorized);
        assert!(store.get().is_none());
        api.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_with_failed_refresh_is_unauthorized_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let api = server
            .mock("GET", "/api/dashboard")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&token("old", 900), "r1");

        let err = client
            .request::<Value>(&store, "/api/dashboard", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::Unauthorized);
        assert!(store.refresh_token().is_none());
        api.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_without_token_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let api = server
            .mock("GET", "/api/user")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let client = client(&server.url());
        let err = client
            .request::<Value>(&MemoryTokenStore::new(), "/api/user", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::Unauthorized);
        api.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_message_from_json_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/dashboard")
            .with_status(404)
            .with_body(r#"{"message":"Dashboard not found"}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&token("u1", 900), "r1");
        let err = client
            .request::<Value>(&store, "/api/dashboard", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ClientError::Api {
                status: 404,
                message: "Dashboard not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_error_message_falls_back_to_status_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/dashboard")
            .with_status(503)
            .with_body("<html>down</html>")
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&token("u1", 900), "r1");
        let err = client
            .request::<Value>(&store, "/api/dashboard", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ClientError::Api {
                status: 503,
                message: "Service Unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_error_message_json_without_message_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/dashboard")
            .with_status(500)
            .with_body(r#"{"error":"boom"}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&token("u1", 900), "r1");
        let err = client
            .request::<Value>(&store, "/api/dashboard", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ClientError::Api {
                status: 500,
                message: "API Error: 500".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_network_failure() {
        let client = client("http://127.0.0.1:9");
        let err = client
            .request::<Value>(&MemoryTokenStore::new(), "/api/user", RequestOptions::get())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Network(_)));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/dashboard")
            .with_status(200)
            .with_body(r#"{"unexpected":true}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let store = store_with(&token("u1", 900), "r1");
        let err = client.get_dashboard(&store).await.unwrap_err();

        assert!(matches!(err, ClientError::Decode(_)));
    }
}
