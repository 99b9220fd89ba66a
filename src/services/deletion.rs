use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ServiceError, ServiceResult};
use crate::mailer::OutboundEmail;
use crate::models::{Account, DeletionKind, Listing, NewVaultEntry, NotificationKind};
use crate::notify::{self, ListingEvent, NotificationDraft};
use crate::state::AppState;
use crate::store::{Directory, ListingCatalog, SubscriptionStore, TokenVault};
use crate::vault::{generate_restoration_token, hash_restoration_token, restore_link, token_expiry};

use super::{best_effort, detach_after_timeout, optional_text};

#[derive(Debug, Clone, Serialize)]
pub struct DeletionOutcome {
    pub listing_id: Uuid,
    pub deletion_kind: DeletionKind,
    pub restoration_available: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub owner_emailed: bool,
    /// `None` when subscriber delivery was still running at response time.
    pub subscribers_notified: Option<usize>,
    pub message: String,
}

struct IssuedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Deletes a listing for its owner or an administrator.
///
/// The canonical delete is the only step that can fail the call. Owner
/// deletions also write a vault entry carrying a fresh restoration token;
/// the raw token leaves the process only in the owner's email.
pub async fn delete_listing(
    state: &AppState,
    actor: &Actor,
    listing_id: Uuid,
    reason: Option<String>,
) -> ServiceResult<DeletionOutcome> {
    let listing = state
        .store
        .find_listing(listing_id)
        .await?
        .ok_or(ServiceError::NotFound("listing"))?;

    let deletion_kind = if listing.owner_id == actor.id() {
        DeletionKind::Owner
    } else if actor.is_privileged() {
        DeletionKind::Admin
    } else {
        return Err(ServiceError::forbidden(
            "only the owner or an administrator can delete this listing",
        ));
    };

    let reason = optional_text(reason);
    if deletion_kind == DeletionKind::Admin && reason.is_none() {
        return Err(ServiceError::invalid(
            "a reason is required when removing another user's listing",
        ));
    }

    let now = state.clock.now();
    let owner = best_effort(
        state,
        "load listing owner",
        listing_id,
        state.store.find_account(listing.owner_id),
    )
    .await
    .flatten();
    let subscribers = best_effort(
        state,
        "capture subscribers",
        listing_id,
        state.store.subscribers_of(listing_id),
    )
    .await
    .unwrap_or_default();

    let issued = match deletion_kind {
        DeletionKind::Owner => {
            issue_restoration_token(state, &listing, actor.id(), reason.clone(), now).await
        }
        DeletionKind::Admin => None,
    };

    if !state.store.delete_listing(listing_id).await? {
        return Err(ServiceError::NotFound("listing"));
    }
    info!(
        %listing_id,
        actor_id = %actor.id(),
        deletion_kind = deletion_kind.as_str(),
        restorable = issued.is_some(),
        "listing deleted"
    );

    best_effort(
        state,
        "purge subscriptions",
        listing_id,
        state.store.purge_subscriptions(listing_id),
    )
    .await;

    let owner_draft = owner_notification(&listing, deletion_kind, reason.as_deref(), actor.id());
    best_effort(
        state,
        "notify owner",
        listing_id,
        notify::notify_recipient(state, listing.owner_id, &owner_draft),
    )
    .await;

    let owner_emailed = match &owner {
        Some(owner) => {
            let email = owner_email(
                state,
                owner,
                &listing,
                deletion_kind,
                reason.as_deref(),
                issued.as_ref(),
            );
            best_effort(state, "email owner", listing_id, state.mailer.send(email))
                .await
                .is_some()
        }
        None => {
            warn!(%listing_id, owner_id = %listing.owner_id, "owner account not found; email skipped");
            false
        }
    };

    let removal = {
        let state = state.clone();
        let event = ListingEvent::Removed {
            reason: reason.clone(),
        };
        let listing_name = listing.name.clone();
        let exclude = [listing.owner_id, actor.id()];
        async move {
            notify::notify_users(&state, subscribers, listing_id, &listing_name, &event, &exclude)
                .await
        }
    };
    let subscribers_notified =
        detach_after_timeout(state, "notify subscribers", listing_id, removal)
            .await
            .map(|report| report.persisted);

    Ok(DeletionOutcome {
        listing_id,
        deletion_kind,
        restoration_available: issued.is_some(),
        token_expires_at: issued.as_ref().map(|issued| issued.expires_at),
        owner_emailed,
        subscribers_notified,
        message: outcome_message(deletion_kind, issued.is_some(), owner_emailed),
    })
}

/// A failure here only costs the owner the ability to restore; the
/// deletion itself still goes ahead.
async fn issue_restoration_token(
    state: &AppState,
    listing: &Listing,
    deleted_by: Uuid,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Option<IssuedToken> {
    let snapshot = match serde_json::to_value(listing.snapshot()) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(listing_id = %listing.id, error = %err, "failed to snapshot listing");
            return None;
        }
    };

    let token = generate_restoration_token();
    let expires_at = token_expiry(now, state.config.restoration_token_ttl_days);
    let entry = NewVaultEntry {
        id: Uuid::new_v4(),
        original_listing_id: listing.id,
        snapshot,
        owner_id: listing.owner_id,
        deleted_by,
        deletion_kind: DeletionKind::Owner.as_str().to_string(),
        deletion_reason: reason,
        token_hash: hash_restoration_token(&token),
        deleted_at: now,
        token_expires_at: expires_at,
        is_used: false,
        is_restored: false,
        restored_at: None,
        restored_by: None,
        updated_at: now,
    };

    match state.store.upsert_vault_entry(entry).await {
        Ok(stored) => {
            info!(listing_id = %listing.id, entry_id = %stored.id, %expires_at, "restoration token issued");
            Some(IssuedToken { token, expires_at })
        }
        Err(err) => {
            error!(listing_id = %listing.id, error = %err, "failed to write vault entry; listing will not be restorable");
            None
        }
    }
}

fn owner_notification(
    listing: &Listing,
    deletion_kind: DeletionKind,
    reason: Option<&str>,
    actor_id: Uuid,
) -> NotificationDraft {
    let draft = match deletion_kind {
        DeletionKind::Owner => NotificationDraft::new(
            NotificationKind::ListingDeleted,
            "Listing deleted",
            format!(
                "Your listing \"{}\" was deleted. Check your email for a link to restore it.",
                listing.name
            ),
        ),
        DeletionKind::Admin => NotificationDraft::new(
            NotificationKind::ListingDeleted,
            "Listing removed by an administrator",
            format!(
                "Your listing \"{}\" was removed by an administrator. Reason: {}",
                listing.name,
                reason.unwrap_or_default()
            ),
        )
        .acting_admin(actor_id),
    };

    let draft = draft
        .listing(listing.id)
        .meta("listing_name", listing.name.as_str())
        .meta("deletion_kind", deletion_kind.as_str());
    match reason {
        Some(reason) => draft.meta("reason", reason),
        None => draft,
    }
}

fn owner_email(
    state: &AppState,
    owner: &Account,
    listing: &Listing,
    deletion_kind: DeletionKind,
    reason: Option<&str>,
    issued: Option<&IssuedToken>,
) -> OutboundEmail {
    let mut text = format!("Hello {},\n\n", owner.username);
    let subject = match deletion_kind {
        DeletionKind::Owner => {
            text.push_str(&format!(
                "Your listing \"{}\" at {} was deleted.\n\n",
                listing.name, listing.address
            ));
            match issued {
                Some(issued) => {
                    text.push_str(&format!(
                        "You can restore it until {}.\n\nRestore link: {}\nRestoration token: {}\n",
                        issued.expires_at.format("%Y-%m-%d %H:%M UTC"),
                        restore_link(&state.config.public_base_url, &issued.token),
                        issued.token,
                    ));
                }
                None => text.push_str(
                    "We could not prepare a restoration link for this listing. Contact support if this was a mistake.\n",
                ),
            }
            format!("Your listing \"{}\" was deleted", listing.name)
        }
        DeletionKind::Admin => {
            text.push_str(&format!(
                "Your listing \"{}\" at {} was removed by an administrator.\n\nReason: {}\n",
                listing.name,
                listing.address,
                reason.unwrap_or_default()
            ));
            format!("Your listing \"{}\" was removed", listing.name)
        }
    };

    OutboundEmail {
        to: owner.email.clone(),
        subject,
        text,
    }
}

fn outcome_message(deletion_kind: DeletionKind, restorable: bool, owner_emailed: bool) -> String {
    let message = match (deletion_kind, owner_emailed) {
        (DeletionKind::Owner, true) if restorable => {
            "Listing deleted. A confirmation email with restoration instructions has been sent."
        }
        (DeletionKind::Owner, true) => "Listing deleted. A confirmation email has been sent.",
        (DeletionKind::Owner, false) => {
            "Listing deleted, but the confirmation email could not be sent."
        }
        (DeletionKind::Admin, true) => "Listing removed. The owner has been notified by email.",
        (DeletionKind::Admin, false) => {
            "Listing removed, but the owner could not be notified by email."
        }
    };
    message.to_string()
}
