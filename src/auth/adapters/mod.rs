pub mod oauth2_client;
pub mod tosan;
#[cfg(feature = "grpc")]
pub mod grpc;
