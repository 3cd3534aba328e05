use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use construction_docs::auth::jwt::JwtService;
use construction_docs::config::AppConfig;
use construction_docs::state::AppState;
use construction_docs::storage::LocalFileStore;
use construction_docs::{bootstrap, db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        files_staging_dir = %config.files_staging_dir.display(),
        bootstrap_admin = config.bootstrap_admin.is_some(),
        "loaded backend configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;

    let applied = db::run_migrations(&pool)?;
    tracing::info!(applied, "database migrations complete");

    if let Some(admin) = config.bootstrap_admin.as_ref() {
        let mut conn = pool
            .get()
            .context("failed to get database connection for admin bootstrap")?;
        bootstrap::ensure_admin(&mut conn, &admin.email, &admin.password)?;
    }

    tokio::fs::create_dir_all(&config.files_staging_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create staging directory {}",
                config.files_staging_dir.display()
            )
        })?;

    let files = Arc::new(LocalFileStore::new());
    let jwt = JwtService::from_config(&config)?;

    let state = AppState::new(pool, config, files, jwt);
    let listen_addr: SocketAddr = {
        let config = state.config.clone();
        format!("{}:{}", config.server_host, config.server_port).parse()?
    };
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("server received shutdown signal");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
