use std::collections::HashMap;

use oauth2::url::form_urlencoded;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::PRODUCTION_BANK_ID;

pub const PROVIDER_NAME: &str = "tosan";
/// 本番用の内部 ID の代わりに呼び出し側へ返す銀行 ID
pub const DISPLAY_BANK_ID: &str = "ANSBIR";

/// コード交換に成功したときのトークン
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl TokenSet {
    /// トークン交換のパラメータをプロフィール文書として返す
    pub fn to_profile_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("access_token".into(), Value::String(self.access_token.clone()));
        if let Some(refresh) = &self.refresh_token {
            doc.insert("refresh_token".into(), Value::String(refresh.clone()));
        }
        if let Some(expires_in) = self.expires_in {
            doc.insert("expires_in".into(), Value::from(expires_in));
        }
        if let Some(scope) = &self.scope {
            doc.insert("scope".into(), Value::String(scope.clone()));
        }
        Value::Object(doc)
    }
}

/// 正規化済みプロフィール（プロバイダーの文書に `provider` と `bankId` を付与）
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct Profile(Map<String, Value>);

impl Profile {
    /// `doc` にプロバイダー名と表示用の `bank_id` を付与
    ///
    /// JSON オブジェクト以外の文書は `data` の下に格納する
    pub fn normalize(doc: Value, bank_id: &str) -> Self {
        let mut map = match doc {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".into(), other);
                map
            }
        };
        map.insert("provider".into(), Value::String(PROVIDER_NAME.to_string()));
        map.insert(
            "bankId".into(),
            Value::String(display_bank_id(bank_id).to_string()),
        );
        Self(map)
    }

    pub fn provider(&self) -> Option<&str> {
        self.0.get("provider").and_then(Value::as_str)
    }

    pub fn bank_id(&self) -> Option<&str> {
        self.0.get("bankId").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

pub fn display_bank_id(bank_id: &str) -> &str {
    if bank_id == PRODUCTION_BANK_ID {
        DISPLAY_BANK_ID
    } else {
        bank_id
    }
}

/// 1 回の認証試行に属する状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub bank_id: String,
}

/// 認可・コールバックリクエストのクエリパラメータ
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub bank_id: Option<String>,
}

impl CallbackQuery {
    /// `a=b&c=d` 形式のクエリ文字列を解析。空の値は未指定として扱う
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self::from_pairs(map.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_str() {
                "code" => &mut query.code,
                "state" => &mut query.state,
                "error" => &mut query.error,
                "error_description" => &mut query.error_description,
                "error_uri" => &mut query.error_uri,
                "error_code" => &mut query.error_code,
                "error_message" => &mut query.error_message,
                "bank_id" => &mut query.bank_id,
                _ => continue,
            };
            *slot = Some(value);
        }
        query
    }
}

/// [`PassThrough`](crate::auth::ports::PassThrough) が返す値
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub tokens: TokenSet,
    pub profile: Profile,
}

/// ストラテジーで 1 リクエストを処理した結果
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome<U> {
    /// ユーザーエージェントをこの認可 URL へ送る
    Redirect(String),
    Authenticated(U),
}

/// トークンエンドポイントが返す構造化エラー
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: Option<i64>,
    pub subcode: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// プロバイダーが拒否した。拒否処理へ回す
    Denied,
    /// 通信・解析・設定の障害
    Fault,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization failed: {message}")]
    Authorization { message: String, code: Option<i64> },

    #[error("authorization denied: {error}")]
    Denied {
        error: String,
        description: Option<String>,
        uri: Option<String>,
    },

    #[error("token error: {}", .0.message)]
    Token(TokenError),

    #[error("oauth error: {error}")]
    OAuth {
        error: String,
        description: Option<String>,
        uri: Option<String>,
    },

    #[error("{message}: {cause}")]
    Internal { message: String, cause: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl AuthError {
    pub fn internal(message: impl Into<String>, cause: impl ToString) -> Self {
        AuthError::Internal {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Authorization { .. }
            | AuthError::Denied { .. }
            | AuthError::Token(_)
            | AuthError::OAuth { .. } => ErrorKind::Denied,
            AuthError::Internal { .. } | AuthError::Parse(_) | AuthError::ConfigError(_) => {
                ErrorKind::Fault
            }
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Parse(err.to_string())
    }
}

/// OAuth2 クライアントの外部呼び出しの失敗
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 応答はあったが成功本文ではない
    #[error("unexpected response with status {status}")]
    Response { status: u16, body: Vec<u8> },

    /// 送信できなかった、または応答を読めなかった
    #[error("request failed: {0}")]
    Request(String),
}

pub type AuthResult<T> = Result<T, AuthError>;
