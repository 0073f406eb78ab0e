mod api;
mod app_config;
mod router;
mod state;

use std::sync::Arc;

use tracing::info;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    showroom_core::config::load_dotenv();
    let config = showroom_core::Config::from_env();
    config.log_summary();

    let service = app_config::build_service(&config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, service));
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr} (API docs at /docs)");
    axum::serve(listener, app).await?;
    Ok(())
}
