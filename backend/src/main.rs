use backend::config::Config;
use backend::{app, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::from_config(&config).await?;
    let app = app(state);

    info!(
        bind = %config.bind,
        persist = ?config.persist_path,
        wishlist_edits_after_shuffle = config.allow_wishlist_edits_after_shuffle,
        "starting gift exchange"
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
