use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use relay_core::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::credentials::CredentialSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL, or a path resolved against the client's base URL.
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), query: Vec::new(), body: None }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, url).with_body(body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Request for the page a cursor points at. Link-style cursors are full
    /// URLs that already carry the query; opaque cursors ride as a parameter.
    pub fn follow(&self, cursor: &str) -> Self {
        if cursor.starts_with("http://") || cursor.starts_with("https://") {
            return Self {
                method: self.method,
                url: cursor.to_owned(),
                query: Vec::new(),
                body: self.body.clone(),
            };
        }

        let mut next = self.clone();
        next.query.retain(|(key, _)| key != "cursor");
        next.query.push(("cursor".to_owned(), cursor.to_owned()));
        next
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub next_cursor: Option<String>,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body, next_cursor: None }
    }

    pub fn with_next_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        token: &SecretString,
    ) -> Result<ApiResponse, TransportError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("platform credentials rejected: {0}")]
    Auth(String),
    #[error("platform returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<ApiError> for ApplicationError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Auth(detail) => Self::Auth(detail),
            ApiError::Upstream { status, message } => Self::Upstream { status, message },
            ApiError::Transport(error) => Self::Upstream { status: 0, message: error.to_string() },
            ApiError::Decode(detail) => Self::Upstream { status: 0, message: detail },
        }
    }
}

/// One page of a listing and the cursor to the next one, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T: DeserializeOwned> Page<T> {
    pub fn from_response(response: ApiResponse) -> Result<Self, ApiError> {
        let mut body = response.body;
        let items = match body.get_mut("items").map(Value::take) {
            Some(items) => serde_json::from_value(items)
                .map_err(|error| ApiError::Decode(error.to_string()))?,
            None => Vec::new(),
        };
        Ok(Self { items, cursor: response.next_cursor })
    }
}

/// Authenticated platform client. A rejected credential is refreshed at most
/// once per call and the call retried at most once.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialSource>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_owned(), transport, credentials }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resolve(&self, request: &ApiRequest) -> ApiRequest {
        if request.url.starts_with("http://") || request.url.starts_with("https://") {
            return request.clone();
        }
        let mut resolved = request.clone();
        resolved.url = format!("{}/{}", self.base_url, request.url.trim_start_matches('/'));
        resolved
    }

    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let request = self.resolve(request);
        let token = self.credentials.access_token().await;
        let response = self.transport.send(&request, &token).await?;

        let response = if response.is_unauthorized() {
            warn!(
                event_name = "webex.api.unauthorized",
                url = %request.url,
                "credential rejected, refreshing once"
            );
            let refreshed = self
                .credentials
                .refresh(&token)
                .await
                .map_err(|error| ApiError::Auth(error.to_string()))?;
            let retried = self.transport.send(&request, &refreshed).await?;
            if retried.is_unauthorized() {
                return Err(ApiError::Auth(
                    "credential rejected again after refresh".to_owned(),
                ));
            }
            retried
        } else {
            response
        };

        if !response.is_success() {
            return Err(ApiError::Upstream {
                status: response.status,
                message: upstream_message(&response.body),
            });
        }

        debug!(event_name = "webex.api.call", url = %request.url, status = response.status);
        Ok(response)
    }

    pub async fn call_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.call(request).await?;
        serde_json::from_value(response.body).map_err(|error| ApiError::Decode(error.to_string()))
    }

    /// Lazily walks a paginated listing. A page is only requested when the
    /// consumer polls past the previous one; a cursor-less page ends the stream.
    pub fn list_all<'a, T>(&'a self, request: ApiRequest) -> BoxStream<'a, Result<Page<T>, ApiError>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        stream::try_unfold(Some(request), move |next| async move {
            let Some(request) = next else {
                return Ok(None);
            };
            let page = Page::<T>::from_response(self.call(&request).await?)?;
            let following = page.cursor.as_deref().map(|cursor| request.follow(cursor));
            Ok(Some((page, following)))
        })
        .boxed()
    }

    pub fn list_items<'a, T>(&'a self, request: ApiRequest) -> BoxStream<'a, Result<T, ApiError>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        self.list_all::<T>(request)
            .map_ok(|page| stream::iter(page.items.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

fn upstream_message(body: &Value) -> String {
    match body.get("message").and_then(Value::as_str) {
        Some(message) => message.to_owned(),
        None if body.is_null() => "no response body".to_owned(),
        None => body.to_string(),
    }
}

/// reqwest-backed transport speaking bearer auth and `Link` pagination.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        token: &SecretString,
    ) -> Result<ApiResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder =
            self.client.request(method, &request.url).bearer_auth(token.expose_secret());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Request(error.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let next_cursor = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_link);
        let bytes =
            response.bytes().await.map_err(|error| TransportError::Request(error.to_string()))?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(ApiResponse { status, body, next_cursor })
    }
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param.eq_ignore_ascii_case("rel=\"next\"") || param.eq_ignore_ascii_case("rel=next")
        });
        if !is_next {
            return None;
        }
        target.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')).map(str::to_owned)
    })
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use futures::{StreamExt, TryStreamExt};
    use secrecy::SecretString;
    use serde_json::{json, Value};

    use super::testing::{CountingCredentials, ScriptedTransport};
    use super::{parse_next_link, ApiClient, ApiError, ApiRequest, ApiResponse, Page};
    use crate::credentials::StaticToken;

    fn page(items: &[i64], next: Option<&str>) -> ApiResponse {
        let response = ApiResponse::new(200, json!({ "items": items }));
        match next {
            Some(cursor) => response.with_next_cursor(cursor),
            None => response,
        }
    }

    fn unauthorized() -> ApiResponse {
        ApiResponse::new(401, json!({ "message": "The request requires a valid access token." }))
    }

    fn client(
        transport: Arc<ScriptedTransport>,
        credentials: Arc<CountingCredentials>,
    ) -> ApiClient {
        ApiClient::new("https://webex.test/v1/", transport, credentials)
    }

    #[tokio::test]
    async fn pagination_yields_every_item_and_stops_after_last_page() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(page(&[1, 2], Some("https://webex.test/v1/people?cursor=p2"))),
            Ok(page(&[3, 4], Some("https://webex.test/v1/people?cursor=p3"))),
            Ok(page(&[5], None)),
        ]));
        let client = client(transport.clone(), Arc::new(CountingCredentials::default()));

        let items: Vec<i64> = client
            .list_items::<i64>(ApiRequest::get("/people").with_query("max", "2"))
            .try_collect()
            .await
            .expect("listing");

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        let sent = transport.sent().await;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].request.url, "https://webex.test/v1/people");
        assert_eq!(sent[0].request.query, vec![("max".to_owned(), "2".to_owned())]);
        assert_eq!(sent[1].request.url, "https://webex.test/v1/people?cursor=p2");
        assert!(sent[1].request.query.is_empty());
    }

    #[tokio::test]
    async fn pagination_fetches_lazily() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(page(&[1, 2], Some("https://webex.test/v1/people?cursor=p2"))),
            Ok(page(&[3], None)),
        ]));
        let client = client(transport.clone(), Arc::new(CountingCredentials::default()));

        let mut pages = client.list_all::<i64>(ApiRequest::get("/people"));
        let first = pages.next().await.expect("first page").expect("ok");
        drop(pages);

        assert_eq!(first.items, vec![1, 2]);
        assert_eq!(transport.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn opaque_cursor_replaces_cursor_parameter() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(page(&[1], Some("abc"))),
            Ok(page(&[2], None)),
        ]));
        let client = client(transport.clone(), Arc::new(CountingCredentials::default()));

        let pages: Vec<Page<i64>> = client
            .list_all(ApiRequest::get("/rooms").with_query("max", "1"))
            .try_collect()
            .await
            .expect("listing");

        assert_eq!(pages.len(), 2);
        let sent = transport.sent().await;
        assert_eq!(sent[1].request.url, "https://webex.test/v1/rooms");
        assert_eq!(
            sent[1].request.query,
            vec![("max".to_owned(), "1".to_owned()), ("cursor".to_owned(), "abc".to_owned())]
        );
    }

    #[tokio::test]
    async fn page_without_items_field_is_empty() {
        let page = Page::<i64>::from_response(ApiResponse::new(200, json!({}))).expect("page");

        assert!(page.items.is_empty());
        assert_eq!(page.cursor, None);
    }

    #[tokio::test]
    async fn unauthorized_then_success_refreshes_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(unauthorized()),
            Ok(ApiResponse::new(200, json!({ "id": "me" }))),
        ]));
        let credentials = Arc::new(CountingCredentials::default());
        let client = client(transport.clone(), credentials.clone());

        let body: Value = client.call_json(&ApiRequest::get("/people/me")).await.expect("call");

        assert_eq!(body["id"], "me");
        assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
        let sent = transport.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].token, "token-0");
        assert_eq!(sent[1].token, "token-1");
    }

    #[tokio::test]
    async fn unauthorized_twice_is_auth_error_after_one_refresh() {
        let transport =
            Arc::new(ScriptedTransport::new(vec![Ok(unauthorized()), Ok(unauthorized())]));
        let credentials = Arc::new(CountingCredentials::default());
        let client = client(transport.clone(), credentials.clone());

        let error = client.call(&ApiRequest::get("/people/me")).await.expect_err("auth failure");

        assert!(matches!(error, ApiError::Auth(_)));
        assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn static_token_rejection_is_auth_error_without_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(unauthorized())]));
        let client = ApiClient::new(
            "https://webex.test/v1",
            transport.clone(),
            Arc::new(StaticToken::new(SecretString::from("bot".to_owned()))),
        );

        let error = client.call(&ApiRequest::get("/people/me")).await.expect_err("auth failure");

        assert!(matches!(error, ApiError::Auth(_)));
        assert_eq!(transport.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error_with_platform_message() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(ApiResponse::new(
            404,
            json!({ "message": "The requested resource could not be found." }),
        ))]));
        let credentials = Arc::new(CountingCredentials::default());
        let client = client(transport, credentials.clone());

        let error = client.call(&ApiRequest::get("/people/missing")).await.expect_err("404");

        assert_eq!(
            error,
            ApiError::Upstream {
                status: 404,
                message: "The requested resource could not be found.".to_owned()
            }
        );
        assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_mid_listing_surfaces_after_earlier_pages() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(page(&[1, 2], Some("https://webex.test/v1/people?cursor=p2"))),
            Ok(ApiResponse::new(502, Value::Null)),
        ]));
        let client = client(transport, Arc::new(CountingCredentials::default()));

        let results: Vec<Result<i64, ApiError>> =
            client.list_items(ApiRequest::get("/people")).collect().await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(1));
        assert_eq!(results[1], Ok(2));
        assert!(matches!(results[2], Err(ApiError::Upstream { status: 502, .. })));
    }

    #[test]
    fn next_link_is_parsed_from_link_header() {
        let header = "<https://webexapis.com/v1/people?cursor=abc>; rel=\"next\"";
        assert_eq!(
            parse_next_link(header),
            Some("https://webexapis.com/v1/people?cursor=abc".to_owned())
        );

        let multiple = "<https://x.test/prev>; rel=\"prev\", <https://x.test/next>; rel=next";
        assert_eq!(parse_next_link(multiple), Some("https://x.test/next".to_owned()));

        assert_eq!(parse_next_link("<https://x.test/prev>; rel=\"prev\""), None);
    }
}
