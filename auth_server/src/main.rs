//! Authentication service entry point: wires the state, binds the gRPC
//! server and drains on SIGINT/SIGTERM.

use std::net::SocketAddr;

use anyhow::Result;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth_server::config::AppConfig;
use auth_server::rpc::AuthApi;
use auth_server::state::AppState;
use civica_protos::civica::v1::AuthServiceServer;

#[tokio::main]
async fn main() -> Result<()> {
  dotenv::dotenv().ok();

  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let config = AppConfig::load()?;
  info!("{}", config.summary());

  let addr = SocketAddr::from(([0, 0, 0, 0], config.server.grpc_port));
  let state = AppState::try_new(config).await?;

  // kept out of the server so teardown can run after the drain
  let publisher = state.publisher.clone();
  let pool = state.pool.clone();

  info!("auth server listening on {}", addr);
  Server::builder()
    .add_service(AuthServiceServer::new(AuthApi::new(state)))
    .serve_with_shutdown(addr, shutdown_signal())
    .await?;

  publisher.close().await;
  pool.close().await;
  info!("auth server stopped");

  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    tokio::signal::ctrl_c()
      .await
      .expect("failed to install SIGINT handler");
  };

  #[cfg(unix)]
  let terminate = async {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
      .expect("failed to install SIGTERM handler")
      .recv()
      .await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }

  info!("shutdown signal received, draining in-flight calls");
}
