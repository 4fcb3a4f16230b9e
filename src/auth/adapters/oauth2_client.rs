use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::{
    basic::BasicClient,
    http::{HeaderName, HeaderValue},
    reqwest::async_http_client,
    url::Url,
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, HttpRequest, RedirectUrl,
    RequestTokenError, TokenResponse as OAuth2TokenResponse, TokenUrl,
};
use parking_lot::Mutex;
use reqwest::Client as HttpClient;
use time::OffsetDateTime;
use tracing::{debug, error, info};

use crate::auth::domain::{AuthError, AuthResult, TokenSet, TransportError};
use crate::auth::ports::OAuth2Port;
use crate::config::TosanConfig;

/// OAuth2 client mechanics backed by the `oauth2` crate and `reqwest`.
pub struct OAuth2Client {
    oauth_client: BasicClient,
    http_client: HttpClient,
    authorization_url: Url,
    client_id: String,
    redirect_uri: Option<String>,
    scope: Option<String>,
}

impl OAuth2Client {
    pub fn new(config: &TosanConfig) -> AuthResult<Self> {
        let auth_url = AuthUrl::new(config.authorization_url.clone())
            .map_err(|e| AuthError::ConfigError(format!("authorization_url: {}", e)))?;
        let authorization_url = auth_url.url().clone();

        // 認証情報はボディに載せ、Basic ヘッダーは交換時に別途付与する
        let mut oauth_client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(
                TokenUrl::new(config.token_url.clone())
                    .map_err(|e| AuthError::ConfigError(format!("token_url: {}", e)))?,
            ),
        )
        .set_auth_type(AuthType::RequestBody);

        let redirect_uri = if config.callback_url.is_empty() {
            None
        } else {
            let redirect = RedirectUrl::new(config.callback_url.clone())
                .map_err(|e| AuthError::ConfigError(format!("callback_url: {}", e)))?;
            oauth_client = oauth_client.set_redirect_uri(redirect);
            Some(config.callback_url.clone())
        };

        Ok(Self {
            oauth_client,
            http_client: HttpClient::new(),
            authorization_url,
            client_id: config.client_id.clone(),
            redirect_uri,
            scope: config.joined_scope(),
        })
    }

    fn convert_token_response(
        token_result: &impl OAuth2TokenResponse<oauth2::basic::BasicTokenType>,
    ) -> TokenSet {
        let expires_in = token_result.expires_in().map(|d| d.as_secs());
        TokenSet {
            access_token: token_result.access_token().secret().to_string(),
            token_type: token_result.token_type().as_ref().to_string(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().to_string()),
            expires_in,
            scope: token_result.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
            // 範囲外の有効期限は None とする
            expires_at: expires_in.and_then(|secs| {
                let secs = i64::try_from(secs).ok()?;
                OffsetDateTime::now_utc().checked_add(time::Duration::seconds(secs))
            }),
        }
    }
}

fn header_pairs(
    headers: &[(String, String)],
) -> Result<Vec<(HeaderName, HeaderValue)>, TransportError> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Request(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Request(format!("invalid header value: {}", e)))?;
            Ok((name, value))
        })
        .collect()
}

#[async_trait]
impl OAuth2Port for OAuth2Client {
    fn authorization_url(&self, params: &BTreeMap<String, String>) -> AuthResult<String> {
        let mut merged = BTreeMap::new();
        merged.insert("response_type".to_string(), "code".to_string());
        merged.insert("client_id".to_string(), self.client_id.clone());
        if let Some(redirect_uri) = &self.redirect_uri {
            merged.insert("redirect_uri".to_string(), redirect_uri.clone());
        }
        if let Some(scope) = &self.scope {
            merged.insert("scope".to_string(), scope.clone());
        }
        for (key, value) in params {
            merged.insert(key.clone(), value.clone());
        }

        let mut url = self.authorization_url.clone();
        let existing: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(key, _)| !merged.contains_key(key))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(existing)
            .extend_pairs(merged.iter());

        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        headers: &[(String, String)],
    ) -> Result<TokenSet, TransportError> {
        let extra_headers = header_pairs(headers)?;
        let last_response: Arc<Mutex<Option<(u16, Vec<u8>)>>> = Arc::new(Mutex::new(None));
        let sink = last_response.clone();

        let http_client = move |mut request: HttpRequest| {
            for (name, value) in extra_headers {
                request.headers.insert(name, value);
            }
            async move {
                let result = async_http_client(request).await;
                if let Ok(response) = &result {
                    *sink.lock() = Some((response.status_code.as_u16(), response.body.clone()));
                }
                result
            }
        };

        let result = self
            .oauth_client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(http_client)
            .await;

        match result {
            Ok(token) => {
                info!("Token exchange succeeded");
                Ok(Self::convert_token_response(&token))
            }
            Err(RequestTokenError::Request(e)) => {
                error!("Token request failed: {}", e);
                Err(TransportError::Request(e.to_string()))
            }
            // 応答本文はプロバイダー固有のパーサーに渡す
            Err(e) => {
                let captured = last_response.lock().take();
                match captured {
                    Some((status, body)) => {
                        debug!("Token endpoint answered with status {}", status);
                        Err(TransportError::Response { status, body })
                    }
                    None => Err(TransportError::Request(e.to_string())),
                }
            }
        }
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .to_vec();

        if !status.is_success() {
            error!("GET {} failed: {:?}", url, status);
            return Err(TransportError::Response {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Scope, TosanOptions};

    fn client(options: TosanOptions) -> OAuth2Client {
        OAuth2Client::new(&TosanConfig::from_options(options)).unwrap()
    }

    fn query_of(url: &str) -> Vec<(String, String)> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_authorization_url_merges_without_duplicates() {
        let client = client(TosanOptions {
            client_id: Some("cid".to_string()),
            callback_url: Some("https://app.example/cb".to_string()),
            scope: Some(Scope::List(vec!["accounts".to_string(), "cards".to_string()])),
            ..Default::default()
        });
        let params = BTreeMap::from([
            ("client_id".to_string(), "cid".to_string()),
            ("response_type".to_string(), "code".to_string()),
            ("bank_id".to_string(), "BOOMIR".to_string()),
        ]);

        let url = client.authorization_url(&params).unwrap();
        let pairs = query_of(&url);

        assert!(url.starts_with("https://app.tosanboom.com:4433/oauth/authorize?"));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "client_id").count(), 1);
        assert_eq!(pairs.iter().filter(|(k, _)| k == "response_type").count(), 1);
        assert!(pairs.contains(&("bank_id".to_string(), "BOOMIR".to_string())));
        assert!(pairs.contains(&("redirect_uri".to_string(), "https://app.example/cb".to_string())));
        assert!(pairs.contains(&("scope".to_string(), "accounts,cards".to_string())));
    }

    #[test]
    fn test_authorization_url_omits_empty_callback_and_scope() {
        let client = client(TosanOptions::default());
        let url = client.authorization_url(&BTreeMap::new()).unwrap();
        let pairs = query_of(&url);
        assert!(!pairs.iter().any(|(k, _)| k == "redirect_uri" || k == "scope"));
    }

    #[test]
    fn test_authorization_url_keeps_scope_string() {
        let client = client(TosanOptions {
            scope: Some(Scope::Single("accounts cards".to_string())),
            ..Default::default()
        });
        let url = client.authorization_url(&BTreeMap::new()).unwrap();
        assert!(query_of(&url).contains(&("scope".to_string(), "accounts cards".to_string())));
    }

    #[test]
    fn test_invalid_authorization_url_names_the_field() {
        let result = OAuth2Client::new(&TosanConfig::from_options(TosanOptions {
            authorization_url: Some("not a url".to_string()),
            ..Default::default()
        }));
        assert!(matches!(
            result,
            Err(AuthError::ConfigError(ref msg)) if msg.starts_with("authorization_url:")
        ));
    }

    #[test]
    fn test_invalid_token_url_is_a_config_error() {
        let result = OAuth2Client::new(&TosanConfig::from_options(TosanOptions {
            token_url: Some("not a url".to_string()),
            ..Default::default()
        }));
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_header_pairs_rejects_bad_values() {
        let headers = [("Authorization".to_string(), "Basic\nbad".to_string())];
        assert!(header_pairs(&headers).is_err());
    }
}
