// src/main.rs

use std::sync::Arc;

use dotenvy::dotenv;
use threads::config::Config;
use threads::routes;
use threads::services::Forum;
use threads::state::AppState;
use threads::store::{MemoryStore, PgStore};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let forum = match &config.database_url {
        Some(url) => match PgStore::connect(url).await {
            Ok(store) => Forum::new(
                Arc::new(store),
                config.cache_capacity,
                config.max_reply_depth,
            ),
            Err(e) => {
                tracing::error!("Failed to open the comment store: {}", e);
                return;
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, comments are kept in memory only");
            let store = MemoryStore::new();
            for post_id in &config.seed_posts {
                store.seed_post(*post_id);
            }
            tracing::info!("Seeded {} posts", config.seed_posts.len());
            Forum::new(
                Arc::new(store),
                config.cache_capacity,
                config.max_reply_depth,
            )
        }
    };

    let addr = config.bind_addr.clone();
    let state = AppState { forum, config };

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Listening on {}", addr);

    // Start the server
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
