//! Configuration Management
//!
//! Loads `google-ads.yaml` and applies `GOOGLE_ADS_*` environment overrides.
//!
//! The file is looked up in order: an explicit path, the
//! `GOOGLE_ADS_CONFIGURATION_FILE_PATH` variable, then `$HOME/google-ads.yaml`.

use crate::ads::auth::{ServiceAccountKey, DEFAULT_TOKEN_URI};
use crate::ads::client::{ClientOptions, CustomerOptions};
use crate::ads::errors::{AdsError, AdsResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "GOOGLE_ADS_CONFIGURATION_FILE_PATH";

/// Default file name, looked up in the home directory
pub const CONFIG_FILE_NAME: &str = "google-ads.yaml";

/// Settings read from `google-ads.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdsConfig {
    #[serde(default)]
    pub developer_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Path to a service-account key file
    #[serde(default)]
    pub json_key_file_path: Option<PathBuf>,
    #[serde(default)]
    pub impersonated_email: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub login_customer_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub linked_customer_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub use_application_default_credentials: Option<bool>,
}

/// Customer ids are often written unquoted in YAML
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}

impl AdsConfig {
    /// Default config file path (`$HOME/google-ads.yaml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> AdsResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| AdsError::Configuration(format!("Invalid {}: {}", CONFIG_FILE_NAME, e)))
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> AdsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdsError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from disk and the process environment
    pub fn load(explicit: Option<&Path>) -> AdsResult<Self> {
        Self::load_with(explicit, |name| std::env::var(name).ok())
    }

    /// Load configuration with a custom environment lookup
    pub fn load_with<F>(explicit: Option<&Path>, lookup: F) -> AdsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = lookup(CONFIG_PATH_ENV).filter(|p| !p.is_empty()).map(PathBuf::from);
        let required = explicit.map(Path::to_path_buf).or(from_env);

        let mut config = match required {
            // A path the user named must exist
            Some(path) => {
                tracing::info!("Loading configuration from {:?}", path);
                Self::from_file(&path)?
            }
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::info!("Loading configuration from {:?}", path);
                    Self::from_file(&path)?
                }
                None => {
                    tracing::debug!("No {} found, using environment only", CONFIG_FILE_NAME);
                    Self::default()
                }
            },
        };

        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Override file values with `GOOGLE_ADS_*` variables
    pub fn apply_env<F>(&mut self, lookup: F) -> AdsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let strings: [(&str, &mut Option<String>); 10] = [
            ("GOOGLE_ADS_DEVELOPER_TOKEN", &mut self.developer_token),
            ("GOOGLE_ADS_CLIENT_ID", &mut self.client_id),
            ("GOOGLE_ADS_CLIENT_SECRET", &mut self.client_secret),
            ("GOOGLE_ADS_REFRESH_TOKEN", &mut self.refresh_token),
            ("GOOGLE_ADS_IMPERSONATED_EMAIL", &mut self.impersonated_email),
            ("GOOGLE_ADS_LOGIN_CUSTOMER_ID", &mut self.login_customer_id),
            ("GOOGLE_ADS_LINKED_CUSTOMER_ID", &mut self.linked_customer_id),
            ("GOOGLE_ADS_CUSTOMER_ID", &mut self.customer_id),
            ("GOOGLE_ADS_ENDPOINT", &mut self.endpoint),
            ("GOOGLE_ADS_TOKEN_URI", &mut self.token_uri),
        ];
        for (name, slot) in strings {
            if let Some(value) = var(name) {
                *slot = Some(value);
            }
        }

        if let Some(path) = var("GOOGLE_ADS_JSON_KEY_FILE_PATH") {
            self.json_key_file_path = Some(PathBuf::from(path));
        }

        if let Some(flag) = var("GOOGLE_ADS_USE_APPLICATION_DEFAULT_CREDENTIALS") {
            let enabled = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(AdsError::Configuration(format!(
                        "GOOGLE_ADS_USE_APPLICATION_DEFAULT_CREDENTIALS must be true or false, got '{}'",
                        other
                    )))
                }
            };
            self.use_application_default_credentials = Some(enabled);
        }

        Ok(())
    }

    /// Build client options; reads and validates the service-account key file
    pub fn client_options(&self) -> AdsResult<ClientOptions> {
        let Some(developer_token) = self.developer_token.as_deref() else {
            return Err(AdsError::Configuration("developer_token is required".to_string()));
        };

        let mut options = ClientOptions::new(
            self.client_id.as_deref().unwrap_or_default(),
            self.client_secret.as_deref().unwrap_or_default(),
            developer_token,
        );

        if let Some(path) = &self.json_key_file_path {
            options = options.with_service_account_key(ServiceAccountKey::from_file(path)?);
        }
        if let Some(email) = &self.impersonated_email {
            options = options.with_impersonated_email(email);
        }
        if let Some(id) = &self.login_customer_id {
            options = options.with_login_customer_id(id);
        }
        if let Some(endpoint) = &self.endpoint {
            options = options.with_endpoint(endpoint);
        }
        options = options.with_token_uri(&validate_token_uri(
            self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI),
        )?);
        options = options.with_application_default_credentials(
            self.use_application_default_credentials.unwrap_or(false),
        );

        Ok(options)
    }

    /// Build customer options; `customer_id` overrides the configured one
    pub fn customer_options(&self, customer_id: Option<&str>) -> AdsResult<CustomerOptions> {
        let Some(id) = customer_id.or(self.customer_id.as_deref()) else {
            return Err(AdsError::Configuration("customer_id is required".to_string()));
        };

        let mut options = CustomerOptions::new(id);
        if let Some(linked) = &self.linked_customer_id {
            options = options.with_linked_customer_id(linked);
        }
        if let Some(token) = &self.refresh_token {
            options = options.with_refresh_token(token);
        }
        Ok(options)
    }
}

fn validate_token_uri(uri: &str) -> AdsResult<String> {
    let parsed = url::Url::parse(uri)
        .map_err(|e| AdsError::Configuration(format!("Invalid token_uri '{}': {}", uri, e)))?;
    match parsed.scheme() {
        "https" | "http" => Ok(parsed.to_string()),
        other => Err(AdsError::Configuration(format!(
            "Invalid token_uri '{}': unsupported scheme {}",
            uri, other
        ))),
    }
}
