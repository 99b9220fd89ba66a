use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use listing_vault::{
    auth::jwt::JwtService,
    clock::SystemClock,
    config::{AppConfig, StoreBackend},
    create_router, db,
    mailer::mailer_from_config,
    store::{MemoryStore, PgStore, Store},
    vault::spawn_sweeper,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        store = config.store_backend.as_str(),
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        mail_api_configured = config.mail_api_url.is_some(),
        token_ttl_days = config.restoration_token_ttl_days,
        "loaded backend configuration"
    );

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool =
                db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
            db::run_migrations(&pool)?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let jwt = JwtService::from_config(&config)?;
    let mailer = Arc::from(mailer_from_config(&config));
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("SERVER_HOST and SERVER_PORT must form a socket address")?;
    let sweep_interval = config.vault_sweep_interval;

    let state = AppState::new(store, config, jwt, Arc::new(SystemClock), mailer);
    let sweeper = spawn_sweeper(state.clone(), sweep_interval);
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("server received shutdown signal");
        })
        .await?;

    sweeper.abort();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
