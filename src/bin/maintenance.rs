use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use listing_vault::{
    auth::jwt::JwtService,
    clock::SystemClock,
    config::{AppConfig, StoreBackend},
    db,
    mailer::LogMailer,
    store::{Directory, PgStore},
    vault, AppState,
};

const USAGE: &str = "Usage: maintenance <purge-expired-tokens | issue-token <user-id>>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("purge-expired-tokens") => purge_expired_tokens().await?,
        Some("issue-token") => {
            let user_id = args
                .next()
                .context("issue-token needs a user id")?
                .parse::<Uuid>()
                .context("user id must be a UUID")?;
            issue_token(user_id).await?
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<(AppConfig, PgStore)> {
    let config = AppConfig::from_env()?;
    if config.store_backend != StoreBackend::Postgres {
        bail!("maintenance commands need STORE_BACKEND=postgres");
    }
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded backend configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    Ok((config, PgStore::new(pool)))
}

async fn purge_expired_tokens() -> Result<()> {
    let (config, store) = connect()?;
    let jwt = JwtService::from_config(&config)?;
    let state = AppState::new(
        Arc::new(store),
        config,
        jwt,
        Arc::new(SystemClock),
        Arc::new(LogMailer),
    );
    let purged = vault::sweep_expired(&state)
        .await
        .context("failed to purge expired vault entries")?;
    println!("Purged {purged} expired vault entries.");
    Ok(())
}

/// Mints an access token for an existing account, for operators poking at
/// the API by hand.
async fn issue_token(user_id: Uuid) -> Result<()> {
    let (config, store) = connect()?;
    let account = store
        .find_account(user_id)
        .await
        .context("failed to load account")?
        .with_context(|| format!("no account with id {user_id}"))?;
    let jwt = JwtService::from_config(&config)?;
    let token = jwt.generate_token(account.id, &account.username, &account.role)?;
    println!("{token}");
    Ok(())
}
