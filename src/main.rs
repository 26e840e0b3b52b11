use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use microblog::auth::accounts;
use microblog::config::{Cli, Config};
use microblog::db;
use microblog::routes;
use microblog::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    let db_path = config
        .db_path()
        .cloned()
        .unwrap_or_else(|| data_dir.join("microblog.db"));

    // Initialize database
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;

    let synced = {
        let mut conn = pool.get()?;
        accounts::sync_accounts(&mut conn, &config.auth.accounts, config.auth.bcrypt_cost)?
    };
    if config.auth.accounts.is_empty() {
        tracing::warn!("No accounts configured; nobody will be able to log in");
    } else {
        tracing::info!(
            "{} accounts configured ({} updated)",
            config.auth.accounts.len(),
            synced
        );
    }

    let state = AppState::new(config, pool);
    let purged = state.sessions.purge_expired().await?;
    if purged > 0 {
        tracing::info!("Purged {} expired sessions", purged);
    }

    let config = &state.config;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::app(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
