use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::mailer::OutboundEmail;
use crate::models::{ListingSnapshot, NotificationKind, VaultEntry};
use crate::notify::{self, NotificationDraft};
use crate::state::AppState;
use crate::store::{Directory, RestorationClaim, RestorationOutcome, TokenVault};
use crate::vault::hash_restoration_token;

use super::best_effort;

#[derive(Debug, Clone, Serialize)]
pub struct OwnerContact {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestorationPreview {
    pub listing_id: Uuid,
    pub listing: ListingSnapshot,
    pub owner: OwnerContact,
    pub deleted_at: DateTime<Utc>,
    pub token_expires_at: DateTime<Utc>,
    pub deletion_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoredListing {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub price: Option<i64>,
    pub restored_at: DateTime<Utc>,
}

async fn usable_entry(state: &AppState, token: &str) -> ServiceResult<VaultEntry> {
    let token_hash = hash_restoration_token(token);
    let entry = state
        .store
        .find_vault_entry_by_token_hash(&token_hash)
        .await?
        .ok_or(ServiceError::NotFound("restoration token"))?;
    if entry.is_restored {
        return Err(ServiceError::AlreadyRestored);
    }
    if !entry.token_valid(state.clock.now()) {
        return Err(ServiceError::TokenExpiredOrUsed);
    }
    Ok(entry)
}

fn snapshot_of(entry: &VaultEntry) -> ServiceResult<ListingSnapshot> {
    entry.listing_snapshot().map_err(|err| {
        ServiceError::Internal(format!(
            "vault entry {} holds an unreadable snapshot: {err}",
            entry.id
        ))
    })
}

/// Read-only check of a restoration token. Calling it any number of
/// times changes nothing.
pub async fn verify(state: &AppState, token: &str) -> ServiceResult<RestorationPreview> {
    let entry = usable_entry(state, token).await?;
    let listing = snapshot_of(&entry)?;
    let owner = state.store.find_account(entry.owner_id).await?;

    Ok(RestorationPreview {
        listing_id: entry.original_listing_id,
        listing,
        owner: OwnerContact {
            id: entry.owner_id,
            username: owner.as_ref().map(|owner| owner.username.clone()),
            email: owner.map(|owner| owner.email),
        },
        deleted_at: entry.deleted_at,
        token_expires_at: entry.token_expires_at,
        deletion_reason: entry.deletion_reason,
    })
}

/// Recreates the listing under its original id and consumes the token.
/// Of two concurrent calls with the same token exactly one succeeds.
pub async fn restore(
    state: &AppState,
    token: &str,
    confirm: bool,
    caller_id: Option<Uuid>,
) -> ServiceResult<RestoredListing> {
    if !confirm {
        return Err(ServiceError::invalid("restoration must be confirmed"));
    }

    let entry = usable_entry(state, token).await?;
    let listing_id = entry.original_listing_id;
    let snapshot = snapshot_of(&entry)?;
    let now = state.clock.now();
    let claim = RestorationClaim {
        entry_id: entry.id,
        token_hash: entry.token_hash.clone(),
        listing: snapshot.into_listing(listing_id, now),
        restored_by: caller_id.unwrap_or(entry.owner_id),
        restored_at: now,
    };

    let listing = match state.store.complete_restoration(claim).await? {
        RestorationOutcome::Restored(listing) => listing,
        RestorationOutcome::ListingExists => return Err(listing_exists()),
        RestorationOutcome::Stale => return Err(stale_claim_error(state, &entry.token_hash).await),
    };
    info!(%listing_id, entry_id = %entry.id, "listing restored");

    let draft = NotificationDraft::new(
        NotificationKind::ListingRestored,
        "Listing restored",
        format!("Your listing \"{}\" has been restored.", listing.name),
    )
    .listing(listing.id)
    .meta("listing_name", listing.name.as_str());
    best_effort(
        state,
        "notify owner",
        listing_id,
        notify::notify_recipient(state, listing.owner_id, &draft),
    )
    .await;

    match state.store.find_account(listing.owner_id).await {
        Ok(Some(owner)) => {
            let email = OutboundEmail {
                to: owner.email,
                subject: format!("Your listing \"{}\" was restored", listing.name),
                text: format!(
                    "Hello {},\n\nYour listing \"{}\" at {} is live again.\n",
                    owner.username, listing.name, listing.address
                ),
            };
            best_effort(state, "email owner", listing_id, state.mailer.send(email)).await;
        }
        Ok(None) => warn!(%listing_id, "owner account not found; restoration email skipped"),
        Err(err) => warn!(%listing_id, error = %err, "owner lookup failed; restoration email skipped"),
    }

    Ok(RestoredListing {
        id: listing.id,
        price: listing.effective_price(),
        name: listing.name,
        address: listing.address,
        restored_at: now,
    })
}

fn listing_exists() -> ServiceError {
    ServiceError::Conflict("a listing with this id already exists".to_string())
}

/// Someone else changed the entry between our read and the claim.
async fn stale_claim_error(state: &AppState, token_hash: &str) -> ServiceError {
    match state.store.find_vault_entry_by_token_hash(token_hash).await {
        Ok(Some(entry)) if entry.is_restored => ServiceError::AlreadyRestored,
        Ok(Some(_)) => ServiceError::TokenExpiredOrUsed,
        Ok(None) => ServiceError::NotFound("restoration token"),
        Err(err) => err.into(),
    }
}
