use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tosan_auth::auth::domain::{AuthResult, TokenSet, TransportError};
use tosan_auth::auth::ports::OAuth2Port;

/// Records what the strategy sends and replays canned responses.
pub struct MockOAuth2Client {
    exchange_response: Arc<RwLock<Option<Result<TokenSet, TransportError>>>>,
    get_response: Arc<RwLock<Option<Result<Vec<u8>, TransportError>>>>,
    pub exchange_calls: Arc<RwLock<Vec<(String, Vec<(String, String)>)>>>,
    pub get_calls: Arc<RwLock<Vec<(String, Vec<(String, String)>, String)>>>,
    pub last_authorization_params: Arc<RwLock<Option<BTreeMap<String, String>>>>,
}

#[allow(dead_code)]
impl MockOAuth2Client {
    pub fn new() -> Self {
        Self {
            exchange_response: Arc::new(RwLock::new(None)),
            get_response: Arc::new(RwLock::new(None)),
            exchange_calls: Arc::new(RwLock::new(Vec::new())),
            get_calls: Arc::new(RwLock::new(Vec::new())),
            last_authorization_params: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_exchange_response(&self, response: Result<TokenSet, TransportError>) {
        *self.exchange_response.write() = Some(response);
    }

    pub fn set_get_response(&self, response: Result<Vec<u8>, TransportError>) {
        *self.get_response.write() = Some(response);
    }

    pub fn exchange_count(&self) -> usize {
        self.exchange_calls.read().len()
    }
}

#[async_trait]
impl OAuth2Port for MockOAuth2Client {
    fn authorization_url(&self, params: &BTreeMap<String, String>) -> AuthResult<String> {
        *self.last_authorization_params.write() = Some(params.clone());
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        Ok(format!("https://provider.test/authorize?{}", query.join("&")))
    }

    async fn exchange_code(
        &self,
        code: &str,
        headers: &[(String, String)],
    ) -> Result<TokenSet, TransportError> {
        self.exchange_calls
            .write()
            .push((code.to_string(), headers.to_vec()));
        self.exchange_response
            .read()
            .clone()
            .unwrap_or(Err(TransportError::Request("No mock response set".to_string())))
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Result<Vec<u8>, TransportError> {
        self.get_calls.write().push((
            url.to_string(),
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            access_token.to_string(),
        ));
        self.get_response
            .read()
            .clone()
            .unwrap_or(Err(TransportError::Request("No mock response set".to_string())))
    }
}

pub fn token_set(access_token: &str) -> TokenSet {
    TokenSet {
        access_token: access_token.to_string(),
        token_type: "bearer".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_in: Some(3600),
        scope: Some("accounts".to_string()),
        expires_at: None,
    }
}
