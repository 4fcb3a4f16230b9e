use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::error;

use crate::auth::adapters::tosan::TosanStrategy;
use crate::auth::domain::{AuthError, AuthOutcome, CallbackQuery};
use crate::auth::ports::{OAuth2Port, PassThrough};
use crate::generated::tosan_auth::{
    callback_response::Outcome, tosan_auth_server::TosanAuth, Authenticated,
    AuthorizationUrlRequest, AuthorizationUrlResponse, CallbackRequest, CallbackResponse,
};

pub struct GrpcTosanService<C: OAuth2Port> {
    strategy: Arc<TosanStrategy<C>>,
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Authorization { message, code } => Status::permission_denied(match code {
                Some(code) => format!("{} (code {})", message, code),
                None => message,
            }),
            AuthError::Denied { error, description, .. } => {
                Status::permission_denied(description.unwrap_or(error))
            }
            AuthError::Token(token_error) => Status::unauthenticated(token_error.message),
            AuthError::OAuth { error, description, .. } => {
                Status::unauthenticated(description.unwrap_or(error))
            }
            AuthError::ConfigError(msg) => Status::failed_precondition(msg),
            // 内部エラーの詳細はクライアントに返さない
            AuthError::Internal { .. } | AuthError::Parse(_) => {
                error!("Internal error during authentication: {:?}", err);
                Status::internal("Internal server error")
            }
        }
    }
}

impl<C: OAuth2Port> GrpcTosanService<C> {
    pub fn new(strategy: Arc<TosanStrategy<C>>) -> Self {
        Self { strategy }
    }
}

#[tonic::async_trait]
impl<C: OAuth2Port + 'static> TosanAuth for GrpcTosanService<C> {
    async fn authorization_url(
        &self,
        request: Request<AuthorizationUrlRequest>,
    ) -> Result<Response<AuthorizationUrlResponse>, Status> {
        let req = request.into_inner();
        let query = CallbackQuery {
            bank_id: req.bank_id.filter(|bank_id| !bank_id.is_empty()),
            ..Default::default()
        };

        let scope = self.strategy.intercept(&query)?;
        let url = self.strategy.authorization_url(&scope)?;

        Ok(Response::new(AuthorizationUrlResponse { url }))
    }

    async fn callback(
        &self,
        request: Request<CallbackRequest>,
    ) -> Result<Response<CallbackResponse>, Status> {
        let req = request.into_inner();
        let query = CallbackQuery::from_map(&req.query);

        let outcome = match self.strategy.authenticate(&query, &PassThrough).await? {
            AuthOutcome::Redirect(url) => Outcome::RedirectUrl(url),
            AuthOutcome::Authenticated(user) => {
                let profile_json =
                    serde_json::to_string(&user.profile).map_err(AuthError::from)?;
                Outcome::Authenticated(Authenticated {
                    access_token: user.tokens.access_token,
                    refresh_token: user.tokens.refresh_token.unwrap_or_default(),
                    expires_in: user
                        .tokens
                        .expires_in
                        .and_then(|secs| i64::try_from(secs).ok())
                        .unwrap_or_default(),
                    scope: user.tokens.scope.unwrap_or_default(),
                    profile_json,
                })
            }
        };

        Ok(Response::new(CallbackResponse {
            outcome: Some(outcome),
        }))
    }
}
