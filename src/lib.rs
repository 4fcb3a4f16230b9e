pub mod auth;
pub mod config;
#[cfg(feature = "grpc")]
pub mod generated;

pub use auth::adapters::oauth2_client::OAuth2Client;
pub use auth::adapters::tosan::TosanStrategy;
pub use crate::config::{Scope, Settings, TosanConfig, TosanOptions};
