use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::auth::domain::{
    AuthError, AuthResult, AuthenticatedUser, Profile, RequestScope, TokenSet, TransportError,
};

/// ストラテジーが利用する汎用 OAuth2 クライアント
#[async_trait]
pub trait OAuth2Port: Send + Sync {
    /// 標準パラメータに `params` をマージした認可 URL
    fn authorization_url(&self, params: &BTreeMap<String, String>) -> AuthResult<String>;

    /// 認可コードをトークンと交換（`headers` を付与して送信）
    async fn exchange_code(
        &self,
        code: &str,
        headers: &[(String, String)],
    ) -> Result<TokenSet, TransportError>;

    /// Bearer 認証付き GET。成功時は応答本文をそのまま返す
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Result<Vec<u8>, TransportError>;
}

/// [`OAuth2Port`] の上に載るプロバイダー固有のフック
#[async_trait]
pub trait StrategyHooks: Send + Sync {
    /// 認可リダイレクトに追加するクエリパラメータ
    fn authorization_params(&self, scope: &RequestScope) -> BTreeMap<String, String>;

    /// 失敗したトークン交換の応答本文をエラーに変換
    fn parse_error_response(&self, body: &[u8], status: u16) -> AuthError;

    /// ユーザープロフィールを取得して正規化
    async fn user_profile(&self, access_token: &str, scope: &RequestScope) -> AuthResult<Profile>;
}

/// アプリケーション側の検証コールバック
#[async_trait]
pub trait Verifier: Send + Sync {
    type User: Send;

    async fn verify(&self, tokens: &TokenSet, profile: Profile) -> AuthResult<Self::User>;
}

/// 認証済みユーザーをそのまま受け入れる
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl Verifier for PassThrough {
    type User = AuthenticatedUser;

    async fn verify(&self, tokens: &TokenSet, profile: Profile) -> AuthResult<Self::User> {
        Ok(AuthenticatedUser {
            tokens: tokens.clone(),
            profile,
        })
    }
}
