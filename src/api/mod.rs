//! Authenticated HTTP client for the KageControl REST API
//!
//! Every request is built against a fixed base URL with a JSON content type
//! and, when a credential is persisted, an `Authorization: Bearer` header.
//! The credential is read from storage right before each request, so a
//! login or logout elsewhere takes effect on the very next call.
//!
//! Failures are not retried. Non-2xx answers come back as
//! [`ClientError::Http`] carrying the status and body.

mod endpoints;

pub use endpoints::{KageApi, ReportSection};

use crate::auth::Credential;
use crate::config::{join_url, ClientConfig};
use crate::error::{ClientError, Result};
use crate::storage::CredentialStore;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Called when the server answers 401, with the stored credential the
/// rejected request carried (`None` if it went out without one)
pub type UnauthorizedHook = Arc<dyn Fn(Option<&Credential>) + Send + Sync>;

/// Request body variants the backend accepts
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<RequestBody>,
    /// Applied last; an `Authorization` entry here replaces the bearer
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn json<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self {
            body: Some(RequestBody::Json(serde_json::to_value(body)?)),
            ..Default::default()
        })
    }

    pub fn form<K: Into<String>, V: Into<String>>(fields: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            body: Some(RequestBody::Form(
                fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            )),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct ApiInner {
    base: Url,
    http: reqwest::Client,
    credentials: CredentialStore,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

/// HTTP client wrapper
///
/// Cheaply cloneable; clones share the connection pool and hook.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiInner>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, credentials: CredentialStore) -> Result<Self> {
        let base = Url::parse(&config.api_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiInner {
                base,
                http,
                credentials,
                on_unauthorized: RwLock::new(None),
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Install the hook run on every 401 answer
    pub fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        *self.inner.on_unauthorized.write() = Some(hook);
    }

    /// Resolve an API path against the base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        join_url(&self.inner.base, path)
    }

    /// Build a request without sending it
    pub fn build(&self, method: Method, path: &str, options: RequestOptions) -> Result<reqwest::Request> {
        self.prepare(method, path, options).map(|(request, _)| request)
    }

    /// Build a request and report which stored credential it carries.
    /// A per-call `Authorization` override means none does.
    fn prepare(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<(reqwest::Request, Option<Credential>)> {
        let url = self.url(path)?;
        let mut builder = self.inner.http.request(method, url);

        // form bodies carry their own content type
        if !matches!(options.body, Some(RequestBody::Form(_))) {
            builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let mut attached = self.inner.credentials.load()?;
        if let Some(credential) = &attached {
            let mut value = HeaderValue::from_str(&credential.bearer()).map_err(|_| {
                ClientError::Authentication("stored credential is not a valid header value".into())
            })?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }
        if options.headers.contains_key(AUTHORIZATION) {
            attached = None;
        }

        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }

        builder = match options.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        builder = builder.headers(options.headers);

        Ok((builder.build()?, attached))
    }

    /// Send a request, turning non-2xx answers into errors
    pub async fn send(&self, method: Method, path: &str, options: RequestOptions) -> Result<reqwest::Response> {
        let (request, sent) = self.prepare(method, path, options)?;
        debug!(method = %request.method(), url = %request.url(), "Sending request");

        let response = self.inner.http.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), path, "Request failed");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            let hook = self.inner.on_unauthorized.read().clone();
            if let Some(hook) = hook {
                hook(sent.as_ref());
            }
        }

        Err(ClientError::Http {
            status: status.as_u16(),
            body,
        })
    }

    /// Send and decode the JSON answer. An empty body decodes as `null`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let response = self.send(method, path, options).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, RequestOptions::default()).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, RequestOptions::json(body)?).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::PATCH, path, RequestOptions::json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::DELETE, path, RequestOptions::default()).await
    }

    pub async fn post_form<T: DeserializeOwned>(&self, path: &str, fields: &[(&str, &str)]) -> Result<T> {
        self.request(Method::POST, path, RequestOptions::form(fields.iter().copied()))
            .await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.inner.base.as_str())
            .field("credentials", &self.inner.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ClientConfig::new(base), CredentialStore::in_memory()).unwrap()
    }

    #[test]
    fn test_url_join() {
        let api = client("http://localhost:8000");
        assert_eq!(api.url("/tables").unwrap().as_str(), "http://localhost:8000/tables");
        assert_eq!(api.url("orders/7").unwrap().as_str(), "http://localhost:8000/orders/7");
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let api = client("https://kage.example.com/api");
        assert_eq!(
            api.url("/menu/available").unwrap().as_str(),
            "https://kage.example.com/api/menu/available"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiClient::new(&ClientConfig::new("not a url"), CredentialStore::in_memory());
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_without_credential() {
        let api = client("http://localhost:8000");
        let request = api.build(Method::GET, "/tables", RequestOptions::default()).unwrap();

        assert!(request.headers().get(AUTHORIZATION).is_none());
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_build_with_credential() {
        let api = client("http://localhost:8000");
        api.credentials().save(&Credential::new("abc.def.ghi")).unwrap();

        let request = api.build(Method::GET, "/tables", RequestOptions::default()).unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc.def.ghi");
    }

    #[test]
    fn test_build_reads_credential_every_time() {
        let api = client("http://localhost:8000");
        api.credentials().save(&Credential::new("first")).unwrap();
        let _ = api.build(Method::GET, "/tables", RequestOptions::default()).unwrap();

        api.credentials().clear().unwrap();
        let request = api.build(Method::GET, "/tables", RequestOptions::default()).unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_build_header_override_wins() {
        let api = client("http://localhost:8000");
        api.credentials().save(&Credential::new("stored")).unwrap();

        let options = RequestOptions::default()
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer override"));
        let request = api.build(Method::GET, "/tables", options).unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer override");
    }

    #[test]
    fn test_build_form_body() {
        let api = client("http://localhost:8000");
        let options = RequestOptions::form([("username", "ana"), ("password", "p w")]);
        let request = api.build(Method::POST, "/auth/login", options).unwrap();

        assert_eq!(
            request.headers()[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"username=ana&password=p+w");
    }

    #[test]
    fn test_build_query() {
        let api = client("http://localhost:8000");
        let options = RequestOptions::default().query("status", "listo");
        let request = api.build(Method::PATCH, "/orders/3/status", options).unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8000/orders/3/status?status=listo");
    }

    #[test]
    fn test_build_json_body() {
        let api = client("http://localhost:8000");
        let options = RequestOptions::json(&serde_json::json!({"table_id": 4})).unwrap();
        let request = api.build(Method::POST, "/arrivals", options).unwrap();

        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"table_id":4}"#);
    }
}
