mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is a development convenience
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("ronda_api=info,ronda_core=info,tower_http=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting ronda-api with config: {:?}", config);

    let state = AppState::from_config(config);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("ronda-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
