use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::basic::BasicErrorResponseType;
use oauth2::StandardErrorResponse;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::auth::domain::{
    AuthError, AuthOutcome, AuthResult, CallbackQuery, Profile, RequestScope, TokenError,
    TokenSet, TransportError,
};
use crate::auth::ports::{OAuth2Port, StrategyHooks, Verifier};
use crate::config::{ProfileSource, TosanConfig};

const PROFILE_QUERY: [(&str, &str); 3] = [("has_address", "true"), ("length", "2"), ("offset", "0")];

const FAILED_TOKEN: &str = "failed to obtain access token";
const FAILED_PROFILE: &str = "failed to fetch user profile";

pub struct TosanStrategy<C: OAuth2Port> {
    config: TosanConfig,
    client: Arc<C>,
}

impl<C: OAuth2Port> TosanStrategy<C> {
    pub fn new(config: TosanConfig, client: Arc<C>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &TosanConfig {
        &self.config
    }

    /// Pre-flight check on an inbound request.
    ///
    /// Fails when the provider reported an error through `error_code` without
    /// the standard `error` parameter. Otherwise returns the scope for this
    /// attempt, picking up a `bank_id` override from the query.
    pub fn intercept(&self, query: &CallbackQuery) -> AuthResult<RequestScope> {
        if let (Some(code), None) = (&query.error_code, &query.error) {
            warn!("Provider reported authorization error code {}", code);
            return Err(AuthError::Authorization {
                message: query.error_message.clone().unwrap_or_default(),
                code: parse_error_code(code),
            });
        }

        let bank_id = query
            .bank_id
            .clone()
            .unwrap_or_else(|| self.config.bank_id.clone());
        Ok(RequestScope { bank_id })
    }

    pub fn authorization_url(&self, scope: &RequestScope) -> AuthResult<String> {
        self.client
            .authorization_url(&self.authorization_params(scope))
    }

    /// Drives one request: redirect when there is no code yet, otherwise
    /// exchange the code, build the profile and hand both to `verifier`.
    pub async fn authenticate<V: Verifier>(
        &self,
        query: &CallbackQuery,
        verifier: &V,
    ) -> AuthResult<AuthOutcome<V::User>> {
        let scope = self.intercept(query)?;

        if let Some(error) = &query.error {
            warn!("Authorization denied by provider: {}", error);
            return Err(AuthError::Denied {
                error: error.clone(),
                description: query.error_description.clone(),
                uri: query.error_uri.clone(),
            });
        }

        let Some(code) = &query.code else {
            info!("Redirecting to authorization endpoint (bank {})", scope.bank_id);
            return Ok(AuthOutcome::Redirect(self.authorization_url(&scope)?));
        };

        info!("Exchanging authorization code for token");
        let headers = [("Authorization".to_string(), self.config.basic_auth_header())];
        let tokens = self
            .client
            .exchange_code(code, &headers)
            .await
            .map_err(|e| match e {
                TransportError::Response { status, body } => {
                    self.parse_error_response(&body, status)
                }
                TransportError::Request(cause) => AuthError::internal(FAILED_TOKEN, cause),
            })?;

        let profile = self.resolve_profile(&tokens, &scope).await?;
        debug!("Profile resolved for provider {:?}", profile.provider());

        let user = verifier.verify(&tokens, profile).await?;
        Ok(AuthOutcome::Authenticated(user))
    }

    async fn resolve_profile(&self, tokens: &TokenSet, scope: &RequestScope) -> AuthResult<Profile> {
        match self.config.profile_source {
            ProfileSource::Endpoint => self.user_profile(&tokens.access_token, scope).await,
            ProfileSource::TokenParams => Ok(Profile::normalize(
                tokens.to_profile_document(),
                &scope.bank_id,
            )),
        }
    }
}

#[async_trait]
impl<C: OAuth2Port> StrategyHooks for TosanStrategy<C> {
    fn authorization_params(&self, scope: &RequestScope) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("device_id".to_string(), self.config.device_id.clone()),
            ("state".to_string(), self.config.state.clone()),
            ("sandbox".to_string(), self.config.sandbox.to_string()),
            ("bank_id".to_string(), scope.bank_id.clone()),
            ("boom_token".to_string(), self.config.boom_token.clone()),
            ("response_type".to_string(), "code".to_string()),
            ("client_id".to_string(), self.config.client_id.clone()),
        ])
    }

    fn parse_error_response(&self, body: &[u8], status: u16) -> AuthError {
        let doc: Value = match serde_json::from_slice(body) {
            Ok(doc) => doc,
            Err(e) => return AuthError::from(e),
        };

        if let Some(error) = structured_error(&doc) {
            warn!("Token endpoint returned {}: {}", status, error.message);
            return AuthError::Token(error);
        }

        standard_error(doc, status)
    }

    async fn user_profile(&self, access_token: &str, scope: &RequestScope) -> AuthResult<Profile> {
        let body = self
            .client
            .get(&self.config.profile_url, &PROFILE_QUERY, access_token)
            .await
            .map_err(|e| match e {
                TransportError::Response { status, body } => serde_json::from_slice::<Value>(&body)
                    .ok()
                    .as_ref()
                    .and_then(structured_error)
                    .map(AuthError::Token)
                    .unwrap_or_else(|| {
                        AuthError::internal(FAILED_PROFILE, format!("status {}", status))
                    }),
                TransportError::Request(cause) => AuthError::internal(FAILED_PROFILE, cause),
            })?;

        let doc: Value = serde_json::from_slice(&body)?;
        Ok(Profile::normalize(doc, &scope.bank_id))
    }
}

/// `error` as an object rather than the string OAuth 2.0 prescribes.
fn structured_error(doc: &Value) -> Option<TokenError> {
    let error = doc.get("error")?.as_object()?;
    Some(TokenError {
        message: string_field(error, "message"),
        kind: string_field(error, "type"),
        code: int_field(error, "code"),
        subcode: int_field(error, "error_subcode").or_else(|| int_field(error, "subcode")),
    })
}

fn standard_error(doc: Value, status: u16) -> AuthError {
    match serde_json::from_value::<StandardErrorResponse<BasicErrorResponseType>>(doc) {
        Ok(response) => AuthError::OAuth {
            error: response.error().as_ref().to_string(),
            description: response.error_description().cloned(),
            uri: response.error_uri().cloned(),
        },
        Err(_) => AuthError::internal(FAILED_TOKEN, format!("status {}", status)),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn int_field(map: &Map<String, Value>, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_error_code(s),
        _ => None,
    }
}

/// Leading integer of `raw`, ignoring surrounding whitespace and trailing garbage.
fn parse_error_code(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let end = raw
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    raw[..end].parse().ok()
}
