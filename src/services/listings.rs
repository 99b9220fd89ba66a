use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Listing, ListingChanges};
use crate::notify::events::{price_change, status_change, PriceState};
use crate::notify::{self, ListingEvent};
use crate::state::AppState;
use crate::store::{ListingCatalog, SubscriptionStore};

use super::detach_after_timeout;

#[derive(Debug, Clone, Serialize)]
pub struct ListingUpdateOutcome {
    pub listing: Listing,
    pub events: Vec<&'static str>,
    /// `None` when delivery was still running at response time.
    pub subscribers_notified: Option<usize>,
}

/// Applies an owner or admin edit and tells subscribers about effective
/// price movements and status changes.
pub async fn update_listing(
    state: &AppState,
    actor: &Actor,
    listing_id: Uuid,
    mut changes: ListingChanges,
) -> ServiceResult<ListingUpdateOutcome> {
    if changes.is_empty() {
        return Err(ServiceError::invalid("no changes provided"));
    }
    let negative = [changes.regular_price, changes.discount_price]
        .into_iter()
        .flatten()
        .flatten()
        .any(|price| price < 0);
    if negative {
        return Err(ServiceError::invalid("prices cannot be negative"));
    }
    if let Some(status) = &changes.status {
        if status.trim().is_empty() {
            return Err(ServiceError::invalid("status cannot be empty"));
        }
        changes.status = Some(status.trim().to_string());
    }

    let before = state
        .store
        .find_listing(listing_id)
        .await?
        .ok_or(ServiceError::NotFound("listing"))?;
    if before.owner_id != actor.id() && !actor.is_privileged() {
        return Err(ServiceError::forbidden(
            "only the owner or an administrator can edit this listing",
        ));
    }

    changes.updated_at = Some(state.clock.now());
    let after = state
        .store
        .update_listing(listing_id, changes)
        .await?
        .ok_or(ServiceError::NotFound("listing"))?;

    let events: Vec<ListingEvent> = [
        price_change(PriceState::from(&before), PriceState::from(&after)),
        status_change(&before.status, &after.status),
    ]
    .into_iter()
    .flatten()
    .collect();

    let subscribers_notified = if events.is_empty() {
        Some(0)
    } else {
        let delivery = {
            let state = state.clone();
            let events = events.clone();
            let listing_name = after.name.clone();
            let exclude = [actor.id()];
            async move {
                let mut persisted = 0;
                for event in &events {
                    match notify::notify_subscribers(
                        &state,
                        listing_id,
                        &listing_name,
                        event,
                        &exclude,
                    )
                    .await
                    {
                        Ok(report) => persisted += report.persisted,
                        Err(err) => warn!(
                            %listing_id,
                            kind = event.kind().as_str(),
                            error = %err,
                            "failed to load subscribers"
                        ),
                    }
                }
                persisted
            }
        };
        detach_after_timeout(state, "notify subscribers", listing_id, delivery).await
    };

    info!(
        %listing_id,
        actor_id = %actor.id(),
        events = events.len(),
        "listing updated"
    );

    Ok(ListingUpdateOutcome {
        events: events.iter().map(|event| event.kind().as_str()).collect(),
        listing: after,
        subscribers_notified,
    })
}

/// Idempotent; subscribing twice is a no-op.
pub async fn subscribe(state: &AppState, actor: &Actor, listing_id: Uuid) -> ServiceResult<bool> {
    state
        .store
        .find_listing(listing_id)
        .await?
        .ok_or(ServiceError::NotFound("listing"))?;
    let created = state
        .store
        .add_subscription(actor.id(), listing_id, state.clock.now())
        .await?;
    Ok(created)
}

pub async fn unsubscribe(state: &AppState, actor: &Actor, listing_id: Uuid) -> ServiceResult<bool> {
    Ok(state.store.remove_subscription(actor.id(), listing_id).await?)
}
