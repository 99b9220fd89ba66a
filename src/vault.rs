//! Restoration tokens and the expiry sweep over vault entries.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::state::AppState;
use crate::store::{StoreResult, TokenVault};

const TOKEN_BYTES: usize = 32;

/// 256 bits from the OS RNG, hex encoded so it is safe in a URL.
pub fn generate_restoration_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Tokens are stored hashed; only the owner's email carries the raw value.
pub fn hash_restoration_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn token_expiry(deleted_at: DateTime<Utc>, ttl_days: i64) -> DateTime<Utc> {
    deleted_at + ChronoDuration::days(ttl_days)
}

pub fn restore_link(public_base_url: &str, token: &str) -> String {
    format!(
        "{}/restore?token={}",
        public_base_url.trim_end_matches('/'),
        token
    )
}

/// Removes entries whose token expired without a restoration.
pub async fn sweep_expired(state: &AppState) -> StoreResult<usize> {
    let now = state.clock.now();
    let purged = state.store.purge_expired_vault_entries(now).await?;
    if purged > 0 {
        info!(purged, "purged expired vault entries");
    }
    Ok(purged)
}

pub fn spawn_sweeper(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_expired(&state).await {
                error!(error = %err, "vault sweep failed");
            }
        }
    })
}
