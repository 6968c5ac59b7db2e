//! Google Ads Client
//!
//! [`GoogleAdsClient`] holds the OAuth client and developer-token settings
//! shared by every customer, plus any service-account or ADC credentials;
//! [`Customer`] is a session bound to one customer account, owning its call
//! headers and service cache.

use super::auth::{Credentials, ServiceAccountKey, DEFAULT_TOKEN_URI};
use super::cache::{ServiceCache, ServiceCacheConfig, StubLease};
use super::errors::{translate, AdsError, AdsResult};
use super::http::TokenHttpClient;
use super::services::{RpcRequest, RpcResponse, RpcStream, ServiceName, StubFactory, TransportOptions};
use crate::request::mutate::{build_mutate_request, build_service_mutate_request};
use crate::request::query::{build_search_request, build_search_stream_request, SummaryRowSetting};
use crate::request::{MutateOperation, MutateOptions, MutateResponse, SearchOptions, SearchPage};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tokio::sync::OnceCell;
use tonic::{Request, Status};

/// Stream of search-stream batches
pub type SearchStream = BoxStream<'static, AdsResult<SearchPage>>;

/// Settings shared by every customer session
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub client_id: String,
    pub client_secret: String,
    pub developer_token: String,
    /// Parsed and validated service-account key; takes precedence over refresh tokens
    pub service_account_key: Option<ServiceAccountKey>,
    /// Subject of service-account assertions (domain-wide delegation)
    pub impersonated_email: Option<String>,
    pub login_customer_id: Option<String>,
    /// Fall back to Application Default Credentials when nothing else is configured
    pub use_application_default_credentials: bool,
    pub token_uri: String,
    pub transport: TransportOptions,
    pub cache: ServiceCacheConfig,
}

impl ClientOptions {
    pub fn new(client_id: &str, client_secret: &str, developer_token: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            developer_token: developer_token.to_string(),
            service_account_key: None,
            impersonated_email: None,
            login_customer_id: None,
            use_application_default_credentials: false,
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            transport: TransportOptions::default(),
            cache: ServiceCacheConfig::default(),
        }
    }

    /// Parse a service-account key document; a malformed key fails here
    pub fn with_service_account_key_json(mut self, json: &str) -> AdsResult<Self> {
        self.service_account_key = Some(ServiceAccountKey::from_json(json)?);
        Ok(self)
    }

    pub fn with_service_account_key(mut self, key: ServiceAccountKey) -> Self {
        self.service_account_key = Some(key);
        self
    }

    pub fn with_impersonated_email(mut self, email: &str) -> Self {
        self.impersonated_email = Some(email.to_string());
        self
    }

    pub fn with_login_customer_id(mut self, id: &str) -> Self {
        self.login_customer_id = Some(id.to_string());
        self
    }

    pub fn with_application_default_credentials(mut self, enabled: bool) -> Self {
        self.use_application_default_credentials = enabled;
        self
    }

    pub fn with_token_uri(mut self, uri: &str) -> Self {
        self.token_uri = uri.to_string();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.transport.endpoint = endpoint.to_string();
        self
    }

    pub fn with_cache_config(mut self, cache: ServiceCacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// Settings of one customer session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerOptions {
    pub customer_id: String,
    /// Overrides the client-level login customer id
    pub login_customer_id: Option<String>,
    pub linked_customer_id: Option<String>,
    pub refresh_token: Option<String>,
}

impl CustomerOptions {
    pub fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_login_customer_id(mut self, id: &str) -> Self {
        self.login_customer_id = Some(id.to_string());
        self
    }

    pub fn with_linked_customer_id(mut self, id: &str) -> Self {
        self.linked_customer_id = Some(id.to_string());
        self
    }

    pub fn with_refresh_token(mut self, token: &str) -> Self {
        self.refresh_token = Some(token.to_string());
        self
    }
}

/// Normalize a customer id: dashes and spaces are dropped, 10 digits remain
pub fn normalize_customer_id(id: &str) -> AdsResult<String> {
    let digits: String = id.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect();
    if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AdsError::Configuration(format!(
            "Invalid customer id '{}': expected 10 digits",
            id
        )));
    }
    Ok(digits)
}

fn normalize_optional(id: Option<&str>) -> AdsResult<Option<String>> {
    id.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(normalize_customer_id)
        .transpose()
}

/// Headers attached to every call of a customer session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHeaders {
    pub developer_token: String,
    pub login_customer_id: Option<String>,
    pub linked_customer_id: Option<String>,
}

impl CallHeaders {
    /// Write the headers plus `authorization` into request metadata
    pub fn apply(&self, metadata: &mut MetadataMap, access_token: &str) -> AdsResult<()> {
        metadata.insert("developer-token", ascii_value("developer-token", &self.developer_token)?);
        if let Some(id) = &self.login_customer_id {
            metadata.insert("login-customer-id", ascii_value("login-customer-id", id)?);
        }
        if let Some(id) = &self.linked_customer_id {
            metadata.insert("linked-customer-id", ascii_value("linked-customer-id", id)?);
        }
        metadata.insert(
            "authorization",
            ascii_value("authorization", &format!("Bearer {}", access_token))?,
        );
        Ok(())
    }
}

fn ascii_value(name: &str, value: &str) -> AdsResult<AsciiMetadataValue> {
    value
        .parse::<AsciiMetadataValue>()
        .map_err(|_| AdsError::Configuration(format!("{} is not a valid header value", name)))
}

/// Entry point: shared settings plus the stub factory
#[derive(Clone)]
pub struct GoogleAdsClient {
    options: Arc<ClientOptions>,
    factory: Arc<dyn StubFactory>,
    http: TokenHttpClient,
    /// Service-account or ADC credentials, built on first use and shared by
    /// every customer session so their token cache is shared too
    shared_credentials: Arc<OnceCell<Credentials>>,
}

impl GoogleAdsClient {
    /// Create a new client. Fails on a missing developer token or a malformed
    /// login customer id.
    pub fn new(options: ClientOptions, factory: Arc<dyn StubFactory>) -> AdsResult<Self> {
        if options.developer_token.trim().is_empty() {
            return Err(AdsError::Configuration("developer_token is required".to_string()));
        }
        normalize_optional(options.login_customer_id.as_deref())?;

        let http = TokenHttpClient::new()?;

        Ok(Self {
            options: Arc::new(options),
            factory,
            http,
            shared_credentials: Arc::new(OnceCell::new()),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Open a session for one customer
    pub async fn customer(&self, options: CustomerOptions) -> AdsResult<Customer> {
        let customer_id = normalize_customer_id(&options.customer_id)?;
        let login_customer_id = match normalize_optional(options.login_customer_id.as_deref())? {
            Some(id) => Some(id),
            None => normalize_optional(self.options.login_customer_id.as_deref())?,
        };
        let linked_customer_id = normalize_optional(options.linked_customer_id.as_deref())?;

        let credentials = self.credentials_for(&options).await?;
        tracing::info!(
            "Opened session for customer {} using {} credentials",
            customer_id,
            credentials.kind()
        );

        let cache = ServiceCache::new(
            self.factory.clone(),
            self.options.transport.clone(),
            &self.options.cache,
        );

        Ok(Customer {
            customer_id,
            credentials,
            headers: CallHeaders {
                developer_token: self.options.developer_token.clone(),
                login_customer_id,
                linked_customer_id,
            },
            _close_guard: Arc::new(CloseOnDrop { cache: cache.clone() }),
            cache,
        })
    }

    /// Refresh-token credentials belong to the customer; the others are
    /// client-wide and exchanged at most once per client
    async fn credentials_for(&self, customer: &CustomerOptions) -> AdsResult<Credentials> {
        let has_refresh_token = customer
            .refresh_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        let client_wide = self.options.service_account_key.is_some()
            || (!has_refresh_token && self.options.use_application_default_credentials);

        if !client_wide {
            return select_credentials(&self.options, customer, self.http.clone()).await;
        }

        let credentials = self
            .shared_credentials
            .get_or_try_init(|| select_credentials(&self.options, customer, self.http.clone()))
            .await?;
        Ok(credentials.clone())
    }
}

/// Pick the credential source: service-account key, then refresh token, then
/// Application Default Credentials when enabled
pub async fn select_credentials(
    options: &ClientOptions,
    customer: &CustomerOptions,
    http: TokenHttpClient,
) -> AdsResult<Credentials> {
    if let Some(key) = &options.service_account_key {
        return Credentials::from_service_account(
            key,
            options.impersonated_email.as_deref(),
            &options.token_uri,
            http,
        );
    }

    if let Some(refresh_token) = customer.refresh_token.as_deref().filter(|t| !t.trim().is_empty()) {
        return Credentials::from_refresh_token(
            &options.client_id,
            &options.client_secret,
            refresh_token,
            &options.token_uri,
            http,
        );
    }

    if options.use_application_default_credentials {
        return Credentials::application_default(http).await;
    }

    Err(AdsError::Configuration(
        "No credentials configured: provide a service account key or a refresh token".to_string(),
    ))
}

/// A session bound to one customer account.
///
/// Call [`Customer::close`] when done: it waits for in-flight calls and closes
/// every cached stub. If the last clone is dropped without `close()`, the
/// stubs are closed on a spawned task when a tokio runtime is available, and
/// left to the transport otherwise.
#[derive(Clone)]
pub struct Customer {
    customer_id: String,
    credentials: Credentials,
    headers: CallHeaders,
    cache: ServiceCache,
    _close_guard: Arc<CloseOnDrop>,
}

impl Customer {
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn headers(&self) -> &CallHeaders {
        &self.headers
    }

    pub fn service_cache(&self) -> &ServiceCache {
        &self.cache
    }

    async fn request(&self, method: &str, body: Value) -> AdsResult<Request<RpcRequest>> {
        let token = self.credentials.access_token().await?;
        let mut request = Request::new(RpcRequest::new(method, body));
        self.headers.apply(request.metadata_mut(), &token)?;
        Ok(request)
    }

    /// Generic unary call; failures go through the error translator
    pub async fn call(&self, service: ServiceName, method: &str, body: Value) -> AdsResult<RpcResponse> {
        let stub = self.cache.get(service).await?;
        let request = self.request(method, body).await?;

        tracing::debug!("{}.{} for customer {}", service, method, self.customer_id);
        stub.unary(request).await.map_err(|status| {
            tracing::warn!("{}.{} failed: {}", service, method, status.code());
            translate(status)
        })
    }

    /// Fetch one page of results
    pub async fn search(&self, query: &str, options: &SearchOptions) -> AdsResult<SearchPage> {
        let body = build_search_request(&self.customer_id, query, options)?;
        let response = self.call(ServiceName::GoogleAdsService, "Search", body).await?;
        Ok(SearchPage::from_body(response.body))
    }

    /// Fetch all rows (auto-paginate)
    pub async fn query(&self, query: &str) -> AdsResult<Vec<Value>> {
        let mut rows = Vec::new();
        let mut options = SearchOptions::default();

        loop {
            let page = self.search(query, &options).await?;
            rows.extend(page.results);

            let Some(token) = page.next_page_token else {
                break;
            };
            if options.page_token.as_deref() == Some(token.as_str()) {
                tracing::warn!("Search returned the same page token twice, stopping");
                break;
            }
            options.page_token = Some(token);
        }

        tracing::debug!("Query returned {} rows", rows.len());
        Ok(rows)
    }

    /// Server-streamed search. The stub stays leased until the stream is dropped.
    pub async fn search_stream(
        &self,
        query: &str,
        summary_row_setting: Option<SummaryRowSetting>,
    ) -> AdsResult<SearchStream> {
        let body = build_search_stream_request(&self.customer_id, query, summary_row_setting)?;
        let stub = self.cache.get(ServiceName::GoogleAdsService).await?;
        let request = self.request("SearchStream", body).await?;

        tracing::debug!("GoogleAdsService.SearchStream for customer {}", self.customer_id);
        let inner = stub.server_streaming(request).await.map_err(translate)?;

        let stream = LeasedStream { inner, _lease: stub };
        Ok(stream
            .map(|item| item.map(|response| SearchPage::from_body(response.body)).map_err(translate))
            .boxed())
    }

    /// Mixed-entity mutate through `GoogleAdsService.Mutate`
    pub async fn mutate_resources(
        &self,
        operations: &[MutateOperation],
        options: &MutateOptions,
    ) -> AdsResult<MutateResponse> {
        let body = build_mutate_request(&self.customer_id, operations, options)?;
        let response = self.call(ServiceName::GoogleAdsService, "Mutate", body).await?;
        let result = MutateResponse::from_rpc(response, "mutate_operation_responses")?;
        log_partial_failures(&result);
        Ok(result)
    }

    /// Single-entity mutate through the entity's own service
    pub async fn mutate_entity(
        &self,
        operations: &[MutateOperation],
        options: &MutateOptions,
    ) -> AdsResult<MutateResponse> {
        let (service, method, body) = build_service_mutate_request(&self.customer_id, operations, options)?;
        let response = self.call(service, method, body).await?;
        let result = MutateResponse::from_rpc(response, "results")?;
        log_partial_failures(&result);
        Ok(result)
    }

    /// Resource names of customers the credentials can access
    pub async fn list_accessible_customers(&self) -> AdsResult<Vec<String>> {
        let response = self
            .call(ServiceName::CustomerService, "ListAccessibleCustomers", json!({}))
            .await?;

        Ok(response
            .body
            .get("resource_names")
            .and_then(|v| v.as_array())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Close every cached stub
    pub async fn close(&self) {
        self.cache.clear().await;
        tracing::info!("Closed session for customer {}", self.customer_id);
    }
}

fn log_partial_failures(result: &MutateResponse) {
    if result.has_partial_failures() {
        let count: usize = result
            .mutate_operation_responses
            .iter()
            .map(|failure| failure.errors.len())
            .sum();
        tracing::warn!("Mutate completed with {} partial failure error(s)", count);
    }
}

/// Closes the session's stubs when the last `Customer` clone goes away
struct CloseOnDrop {
    cache: ServiceCache,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let cache = self.cache.clone();
                handle.spawn(async move { cache.clear().await });
            }
            Err(_) => tracing::debug!("No runtime at drop, cached stubs left open"),
        }
    }
}

/// A response stream that keeps its stub leased
struct LeasedStream {
    inner: RpcStream,
    _lease: StubLease,
}

impl Stream for LeasedStream {
    type Item = Result<RpcResponse, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_customer_id() {
        assert_eq!(normalize_customer_id("123-456-7890").unwrap(), "1234567890");
        assert_eq!(normalize_customer_id("1234567890").unwrap(), "1234567890");
        assert!(normalize_customer_id("12345").is_err());
        assert!(normalize_customer_id("123-456-789a").is_err());
        assert!(normalize_customer_id("").unwrap_err().is_configuration());
    }

    #[test]
    fn test_headers_only_include_configured_ids() {
        let headers = CallHeaders {
            developer_token: "dev-token".to_string(),
            login_customer_id: None,
            linked_customer_id: Some("9876543210".to_string()),
        };
        let mut metadata = MetadataMap::new();
        headers.apply(&mut metadata, "ya29.token").unwrap();

        let header = |name: &str| metadata.get(name).map(|v| v.to_str().unwrap().to_string());
        assert_eq!(header("developer-token").as_deref(), Some("dev-token"));
        assert_eq!(header("login-customer-id"), None);
        assert_eq!(header("linked-customer-id").as_deref(), Some("9876543210"));
        assert_eq!(header("authorization").as_deref(), Some("Bearer ya29.token"));
    }

    #[test]
    fn test_invalid_header_value_is_configuration_error() {
        let headers = CallHeaders {
            developer_token: "bad\ntoken".to_string(),
            login_customer_id: None,
            linked_customer_id: None,
        };
        let err = headers.apply(&mut MetadataMap::new(), "t").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_client_options_reject_malformed_key() {
        let err = ClientOptions::new("id", "secret", "dev")
            .with_service_account_key_json("{\"type\": \"service_account\"}")
            .unwrap_err();
        assert!(matches!(err, AdsError::InvalidCredentials(_)));
    }
}
