pub mod domain;
pub mod ports;
pub mod adapters;

pub use ports::{OAuth2Port, StrategyHooks, Verifier};
pub use domain::{AuthError, AuthOutcome, AuthResult, Profile, TokenError};
