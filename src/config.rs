use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_BANK_ID: &str = "ANSBIR";
/// Bank id the provider expects outside sandbox mode in place of [`DEFAULT_BANK_ID`].
pub const PRODUCTION_BANK_ID: &str = "BOOMIR";

pub const DEFAULT_AUTHORIZATION_URL: &str = "https://app.tosanboom.com:4433/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://app.tosanboom.com:4433/oauth/token";
pub const DEFAULT_PROFILE_URL: &str = "https://app.tosanboom.com:4432/v1/accounts";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub strategy: TosanOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How the profile handed to the verifier is built.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// Authenticated GET against `profile_url`.
    #[default]
    Endpoint,
    /// Built from the token exchange response, no extra request.
    TokenParams,
}

/// Requested scope: a string is sent verbatim, a list is joined with `scope_separator`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Scope {
    Single(String),
    List(Vec<String>),
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Single(String::new())
    }
}

/// Raw strategy options as supplied by the embedding application.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TosanOptions {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub scope: Option<Scope>,
    pub scope_separator: Option<String>,
    pub callback_url: Option<String>,
    pub profile_url: Option<String>,
    pub sandbox: Option<bool>,
    pub bank_id: Option<String>,
    pub boom_token: Option<String>,
    pub device_id: Option<String>,
    pub state: Option<String>,
    pub profile_source: Option<ProfileSource>,
}

/// Fully populated strategy configuration. Read-only once built.
#[derive(Clone, PartialEq, Eq)]
pub struct TosanConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_url: String,
    pub token_url: String,
    pub scope: Scope,
    pub scope_separator: String,
    pub callback_url: String,
    pub profile_url: String,
    pub sandbox: bool,
    pub bank_id: String,
    pub boom_token: String,
    pub device_id: String,
    pub state: String,
    pub profile_source: ProfileSource,
    basic_auth: String,
}

impl TosanConfig {
    pub fn from_options(options: TosanOptions) -> Self {
        let sandbox = options.sandbox.unwrap_or(false);

        let mut bank_id = options
            .bank_id
            .unwrap_or_else(|| DEFAULT_BANK_ID.to_string());
        if !sandbox && bank_id == DEFAULT_BANK_ID {
            bank_id = PRODUCTION_BANK_ID.to_string();
        }

        let client_id = options.client_id.unwrap_or_default();
        let client_secret = options.client_secret.unwrap_or_default();
        let basic_auth = STANDARD.encode(format!("{}:{}", client_id, client_secret));

        Self {
            client_id,
            client_secret,
            authorization_url: options
                .authorization_url
                .unwrap_or_else(|| DEFAULT_AUTHORIZATION_URL.to_string()),
            token_url: options
                .token_url
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            scope: options.scope.unwrap_or_default(),
            scope_separator: options.scope_separator.unwrap_or_else(|| ",".to_string()),
            callback_url: options.callback_url.unwrap_or_default(),
            profile_url: options
                .profile_url
                .unwrap_or_else(|| DEFAULT_PROFILE_URL.to_string()),
            sandbox,
            bank_id,
            boom_token: options.boom_token.unwrap_or_default(),
            device_id: options.device_id.unwrap_or_default(),
            state: options.state.unwrap_or_else(|| "1".to_string()),
            profile_source: options.profile_source.unwrap_or_default(),
            basic_auth,
        }
    }

    /// Value of the `Authorization` header sent with every token exchange.
    pub fn basic_auth_header(&self) -> String {
        format!("Basic {}", self.basic_auth)
    }

    /// Scope string as sent to the provider, `None` when no scope is configured.
    pub fn joined_scope(&self) -> Option<String> {
        let joined = match &self.scope {
            Scope::Single(scope) => scope.clone(),
            Scope::List(scopes) => scopes.join(&self.scope_separator),
        };
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

impl From<TosanOptions> for TosanConfig {
    fn from(options: TosanOptions) -> Self {
        Self::from_options(options)
    }
}

impl fmt::Debug for TosanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TosanConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authorization_url", &self.authorization_url)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .field("scope_separator", &self.scope_separator)
            .field("callback_url", &self.callback_url)
            .field("profile_url", &self.profile_url)
            .field("sandbox", &self.sandbox)
            .field("bank_id", &self.bank_id)
            .field("device_id", &self.device_id)
            .field("state", &self.state)
            .field("profile_source", &self.profile_source)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::new_with_config("config/default")
    }

    pub fn new_with_config(config_path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(Environment::with_prefix("TOSAN_AUTH").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn strategy_config(&self) -> TosanConfig {
        TosanConfig::from_options(self.strategy.clone())
    }
}
