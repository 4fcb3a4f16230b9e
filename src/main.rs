use std::error::Error;
use std::sync::Arc;

use tonic::transport::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tosan_auth::auth::adapters::grpc::GrpcTosanService;
use tosan_auth::generated::tosan_auth::tosan_auth_server::TosanAuthServer;
use tosan_auth::{OAuth2Client, Settings, TosanStrategy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Tosan authentication server...");

    // Load configuration
    let settings = Settings::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let config = settings.strategy_config();
    info!(
        "Strategy configured (sandbox: {}, bank: {}, profile: {:?})",
        config.sandbox, config.bank_id, config.profile_source
    );

    let client = OAuth2Client::new(&config)?;
    let strategy = Arc::new(TosanStrategy::new(config, Arc::new(client)));

    let addr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let grpc_service = GrpcTosanService::new(strategy);

    info!("Starting gRPC server on {}", addr);

    tokio::select! {
        res = Server::builder()
            .add_service(TosanAuthServer::new(grpc_service))
            .serve(addr) => {
            if let Err(e) = res {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutting down server...");
        }
    }

    Ok(())
}

// Signal handling for graceful shutdown
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
