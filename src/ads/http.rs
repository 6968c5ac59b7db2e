//! HTTP utilities for the OAuth token endpoint

use super::errors::{AdsError, AdsResult};
use reqwest::Client;
use serde::Deserialize;
use tonic::Code;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let total = body.chars().count();
    let truncated = if total > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Successful token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// HTTP client wrapper for token exchanges
#[derive(Clone)]
pub struct TokenHttpClient {
    client: Client,
}

impl TokenHttpClient {
    /// Create a new HTTP client
    pub fn new() -> AdsResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("gads-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// POST a form to the token endpoint and parse the token response
    pub async fn exchange(&self, token_uri: &str, form: &[(&str, &str)]) -> AdsResult<TokenResponse> {
        tracing::debug!("POST {}", token_uri);

        let response = self.client.post(token_uri).form(form).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Only log a sanitized/truncated body; error payloads can echo credentials
            let sanitized = sanitize_for_log(&body);
            tracing::error!("Token endpoint error: {} - {}", status, sanitized);
            return Err(AdsError::TokenExchange {
                status: status.as_u16(),
                body: sanitized,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            AdsError::InvalidCredentials(format!("Unexpected token endpoint response: {}", e))
        })
    }
}

/// Format an [`AdsError`] for display to a user
pub fn format_ads_error(error: &AdsError) -> String {
    match error {
        AdsError::TokenExchange { status: 400 | 401, .. } => {
            "Authentication failed. Check your client id/secret and refresh token or service account key.".to_string()
        }
        AdsError::InvalidCredentials(msg) => format!("Invalid credentials: {}", msg),
        AdsError::Configuration(msg) => format!("Configuration error: {}", msg),
        AdsError::UnknownService(name) => format!("Unknown Google Ads service: {}", name),
        AdsError::GoogleAds { failure, .. } => {
            let mut out = format!("Google Ads API error: {}", failure);
            if let Some(request_id) = error.request_id() {
                out.push_str(&format!(" [request-id: {}]", request_id));
            }
            out
        }
        AdsError::Transport(status) => match status.code() {
            Code::Unauthenticated => "Authentication failed. The access token was rejected.".to_string(),
            Code::PermissionDenied => {
                "Permission denied. Check the developer token and login-customer-id.".to_string()
            }
            Code::ResourceExhausted => "Rate limit exceeded. Please try again later.".to_string(),
            Code::Unavailable => "Google Ads API temporarily unavailable. Please try again.".to_string(),
            Code::DeadlineExceeded => "Request timed out.".to_string(),
            _ => truncate_message(&format!("RPC failed: {}", status.message())),
        },
        other => truncate_message(&other.to_string()),
    }
}

/// Truncate long error messages and remove control characters
fn truncate_message(message: &str) -> String {
    let sanitized = message
        .chars()
        .filter(|c| !c.is_control())
        .take(120)
        .collect::<String>();

    if sanitized.chars().count() < message.chars().count() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
