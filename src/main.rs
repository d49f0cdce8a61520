use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use substack_classic::config::Config;
use substack_classic::feed::Rss2JsonClient;
use substack_classic::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "substack_classic=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("SUBSTACK_CLASSIC_CONFIG").unwrap_or_else(|_| "classic.toml".to_string());
    let config = Config::load_or_default(&config_path)?;
    info!("Using feed proxy {}", config.proxy_url);

    let feeds = Rss2JsonClient::new(&config)?;
    let state = Arc::new(AppState::new(Arc::new(feeds), config.clone()));

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
