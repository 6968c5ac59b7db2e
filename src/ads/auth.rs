//! Google Ads Authentication
//!
//! Produces OAuth access tokens from one of three sources:
//!
//! - a refresh token plus OAuth client id/secret,
//! - a service-account key (RS256 JWT assertion exchanged at the token endpoint),
//! - Application Default Credentials, through `gcp_auth`.
//!
//! Tokens are cached until shortly before they expire. Refreshes are
//! single-flight: callers arriving during a refresh wait for it instead of
//! starting their own exchange.

use super::errors::{AdsError, AdsResult};
use super::http::{TokenHttpClient, TokenResponse};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// OAuth scope of the Google Ads API
pub const ADS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

/// Google's OAuth 2.0 token endpoint
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed service-account assertion
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Service-account key document, as downloaded from the Cloud console
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse and validate a key document. The private key is checked here so a
    /// bad key fails before any network call.
    pub fn from_json(json: &str) -> AdsResult<Self> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| AdsError::InvalidCredentials(format!("Malformed service account key: {}", e)))?;

        if let Some(key_type) = key.key_type.as_deref() {
            if key_type != "service_account" {
                return Err(AdsError::InvalidCredentials(format!(
                    "Expected a service_account key, got '{}'",
                    key_type
                )));
            }
        }
        if key.client_email.trim().is_empty() {
            return Err(AdsError::InvalidCredentials(
                "Service account key has an empty client_email".to_string(),
            ));
        }
        key.signing_key()?;

        Ok(key)
    }

    /// Read and validate a key file
    pub fn from_file(path: &Path) -> AdsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdsError::InvalidCredentials(format!(
                "Failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    fn signing_key(&self) -> AdsResult<EncodingKey> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            AdsError::InvalidCredentials(format!("Service account private key is not a valid RSA PEM: {}", e))
        })
    }
}

/// Claims of the JWT bearer assertion
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a JWT bearer assertion for `subject`, issued at `issued_at` (unix seconds)
pub fn sign_assertion(
    key: &ServiceAccountKey,
    signing_key: &EncodingKey,
    subject: &str,
    audience: &str,
    issued_at: i64,
) -> AdsResult<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        sub: subject.to_string(),
        aud: audience.to_string(),
        scope: ADS_SCOPE.to_string(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    Ok(jsonwebtoken::encode(&header, &claims, signing_key)?)
}

enum TokenSource {
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
    ServiceAccount {
        key: ServiceAccountKey,
        signing_key: EncodingKey,
        subject: String,
        token_uri: String,
    },
    ApplicationDefault(Arc<dyn gcp_auth::TokenProvider>),
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn new(token: String, lifetime: Duration) -> Self {
        Self {
            token,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_BUFFER),
        }
    }

    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Google Ads credentials holder with token caching
#[derive(Clone)]
pub struct Credentials {
    source: Arc<TokenSource>,
    http: TokenHttpClient,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
    refresh_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("kind", &self.kind()).finish()
    }
}

impl Credentials {
    fn with_source(source: TokenSource, http: TokenHttpClient) -> Self {
        Self {
            source: Arc::new(source),
            http,
            token_cache: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// OAuth refresh-token credentials
    pub fn from_refresh_token(
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        token_uri: &str,
        http: TokenHttpClient,
    ) -> AdsResult<Self> {
        for (name, value) in [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ] {
            if value.trim().is_empty() {
                return Err(AdsError::InvalidCredentials(format!("{} is required", name)));
            }
        }

        Ok(Self::with_source(
            TokenSource::RefreshToken {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                refresh_token: refresh_token.to_string(),
                token_uri: token_uri.to_string(),
            },
            http,
        ))
    }

    /// Service-account credentials. The assertion subject is the service
    /// account itself unless `impersonated_email` is given.
    pub fn from_service_account(
        key: &ServiceAccountKey,
        impersonated_email: Option<&str>,
        default_token_uri: &str,
        http: TokenHttpClient,
    ) -> AdsResult<Self> {
        let signing_key = key.signing_key()?;
        let token_uri = key
            .token_uri
            .clone()
            .unwrap_or_else(|| default_token_uri.to_string());
        let subject = impersonated_email
            .unwrap_or(key.client_email.as_str())
            .to_string();

        tracing::info!("Using service account {} (subject {})", key.client_email, subject);

        Ok(Self::with_source(
            TokenSource::ServiceAccount {
                key: key.clone(),
                signing_key,
                subject,
                token_uri,
            },
            http,
        ))
    }

    /// Application Default Credentials
    pub async fn application_default(http: TokenHttpClient) -> AdsResult<Self> {
        let provider = gcp_auth::provider().await.map_err(|e| {
            AdsError::DefaultCredentials(format!(
                "{}. Run 'gcloud auth application-default login --scopes={}'",
                e, ADS_SCOPE
            ))
        })?;

        Ok(Self::with_source(TokenSource::ApplicationDefault(provider), http))
    }

    /// Which credential source backs these credentials
    pub fn kind(&self) -> &'static str {
        match self.source.as_ref() {
            TokenSource::RefreshToken { .. } => "refresh_token",
            TokenSource::ServiceAccount { .. } => "service_account",
            TokenSource::ApplicationDefault(_) => "application_default",
        }
    }

    /// Get an access token for API calls
    pub async fn access_token(&self) -> AdsResult<String> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *self.token_cache.write().await = Some(fresh);

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh(&self) -> AdsResult<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.access_token().await
    }

    async fn cached_token(&self) -> Option<String> {
        let cache = self.token_cache.read().await;
        match cache.as_ref() {
            Some(cached) if cached.is_valid() => Some(cached.token.clone()),
            Some(_) => {
                tracing::debug!("Cached token expired, fetching new token");
                None
            }
            None => None,
        }
    }

    async fn fetch_token(&self) -> AdsResult<CachedToken> {
        match self.source.as_ref() {
            TokenSource::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                let response = self
                    .http
                    .exchange(
                        token_uri,
                        &[
                            ("grant_type", "refresh_token"),
                            ("client_id", client_id.as_str()),
                            ("client_secret", client_secret.as_str()),
                            ("refresh_token", refresh_token.as_str()),
                        ],
                    )
                    .await?;
                Ok(cache_response(response))
            }
            TokenSource::ServiceAccount {
                key,
                signing_key,
                subject,
                token_uri,
            } => {
                let assertion = sign_assertion(
                    key,
                    signing_key,
                    subject,
                    token_uri,
                    chrono::Utc::now().timestamp(),
                )?;
                let response = self
                    .http
                    .exchange(
                        token_uri,
                        &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
                    )
                    .await?;
                Ok(cache_response(response))
            }
            TokenSource::ApplicationDefault(provider) => {
                let token = provider
                    .token(&[ADS_SCOPE])
                    .await
                    .map_err(|e| AdsError::DefaultCredentials(e.to_string()))?;
                tracing::debug!("New ADC token cached");
                Ok(CachedToken::new(token.as_str().to_string(), DEFAULT_TOKEN_TTL))
            }
        }
    }
}

fn cache_response(response: TokenResponse) -> CachedToken {
    let lifetime = response
        .expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_TTL);

    tracing::debug!("New token cached, expires in ~{} minutes", lifetime.as_secs() / 60);

    CachedToken::new(response.access_token, lifetime)
}
