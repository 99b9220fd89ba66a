//! Fan-out of notifications to subscribers, administrators and single
//! recipients. Every notification is persisted before it is pushed; a push
//! that fails or stalls never undoes the stored row.

pub mod dedup;
pub mod events;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Notification, NotificationKind};
use crate::realtime::RealtimeEvent;
use crate::state::AppState;
use crate::store::{Directory, NotificationStore, ReadMark, StoreResult, SubscriptionStore};

pub use events::ListingEvent;

/// A notification before it has a recipient.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub listing_id: Option<Uuid>,
    pub acting_admin_id: Option<Uuid>,
    pub meta: Map<String, Value>,
}

impl NotificationDraft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            listing_id: None,
            acting_admin_id: None,
            meta: Map::new(),
        }
    }

    pub fn listing(mut self, listing_id: Uuid) -> Self {
        self.listing_id = Some(listing_id);
        self
    }

    pub fn acting_admin(mut self, admin_id: Uuid) -> Self {
        self.acting_admin_id = Some(admin_id);
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    fn address(&self, recipient_id: Uuid, group_id: Option<Uuid>, state: &AppState) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind: self.kind.as_str().to_string(),
            title: self.title.clone(),
            message: self.message.clone(),
            listing_id: self.listing_id,
            acting_admin_id: self.acting_admin_id,
            broadcast_group_id: group_id,
            meta: Value::Object(self.meta.clone()),
            is_read: false,
            read_at: None,
            created_at: state.clock.now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub recipients: usize,
    pub persisted: usize,
    pub pushed: usize,
    pub failed: usize,
}

enum Delivery {
    Pushed,
    StoredOnly,
    Failed,
}

/// Persists and pushes one notification. Only the insert can fail the call.
pub async fn notify_recipient(
    state: &AppState,
    recipient_id: Uuid,
    draft: &NotificationDraft,
) -> StoreResult<Notification> {
    let stored = state
        .store
        .insert_notification(draft.address(recipient_id, None, state))
        .await?;
    push_event(
        state,
        recipient_id,
        RealtimeEvent::NotificationCreated(stored.clone()),
    )
    .await;
    Ok(stored)
}

/// Delivers a draft to each recipient once, with bounded concurrency.
/// Individual failures are counted and logged, never returned.
pub async fn fan_out(
    state: &AppState,
    recipients: Vec<Uuid>,
    draft: &NotificationDraft,
    group_id: Option<Uuid>,
) -> FanOutReport {
    let mut seen = HashSet::with_capacity(recipients.len());
    let recipients: Vec<Uuid> = recipients
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect();

    let mut report = FanOutReport {
        recipients: recipients.len(),
        ..FanOutReport::default()
    };
    if recipients.is_empty() {
        return report;
    }

    let limit = state.config.fanout_concurrency.max(1);
    let deliveries: Vec<Delivery> = stream::iter(recipients)
        .map(|recipient_id| deliver(state, recipient_id, draft, group_id))
        .buffer_unordered(limit)
        .collect()
        .await;

    for delivery in deliveries {
        match delivery {
            Delivery::Pushed => {
                report.persisted += 1;
                report.pushed += 1;
            }
            Delivery::StoredOnly => report.persisted += 1,
            Delivery::Failed => report.failed += 1,
        }
    }

    debug!(
        kind = draft.kind.as_str(),
        recipients = report.recipients,
        persisted = report.persisted,
        failed = report.failed,
        "fan-out finished"
    );
    report
}

async fn deliver(
    state: &AppState,
    recipient_id: Uuid,
    draft: &NotificationDraft,
    group_id: Option<Uuid>,
) -> Delivery {
    let notification = draft.address(recipient_id, group_id, state);
    let stored = match state.store.insert_notification(notification).await {
        Ok(stored) => stored,
        Err(err) => {
            warn!(
                %recipient_id,
                kind = draft.kind.as_str(),
                error = %err,
                "failed to persist notification"
            );
            return Delivery::Failed;
        }
    };
    if push_event(state, recipient_id, RealtimeEvent::NotificationCreated(stored)).await {
        Delivery::Pushed
    } else {
        Delivery::StoredOnly
    }
}

/// Notifies a listing's subscribers, skipping the given users.
pub async fn notify_subscribers(
    state: &AppState,
    listing_id: Uuid,
    listing_name: &str,
    event: &ListingEvent,
    exclude: &[Uuid],
) -> StoreResult<FanOutReport> {
    let subscribers = state.store.subscribers_of(listing_id).await?;
    Ok(notify_users(state, subscribers, listing_id, listing_name, event, exclude).await)
}

/// Same as [`notify_subscribers`] for a subscriber set captured earlier,
/// used once the listing and its subscriptions are gone.
pub async fn notify_users(
    state: &AppState,
    users: Vec<Uuid>,
    listing_id: Uuid,
    listing_name: &str,
    event: &ListingEvent,
    exclude: &[Uuid],
) -> FanOutReport {
    let recipients: Vec<Uuid> = users
        .into_iter()
        .filter(|id| !exclude.contains(id))
        .collect();
    let draft = event.draft(listing_id, listing_name);
    let report = fan_out(state, recipients, &draft, None).await;
    info!(
        %listing_id,
        kind = event.kind().as_str(),
        recipients = report.recipients,
        failed = report.failed,
        "listing event delivered to subscribers"
    );
    report
}

/// One copy per privileged account, all sharing a fresh broadcast group.
pub async fn notify_admins(
    state: &AppState,
    draft: &NotificationDraft,
) -> StoreResult<(Uuid, FanOutReport)> {
    let admins = state.store.privileged_accounts().await?;
    let group_id = Uuid::new_v4();
    let recipients = admins.into_iter().map(|account| account.id).collect();
    let report = fan_out(state, recipients, draft, Some(group_id)).await;
    info!(
        %group_id,
        kind = draft.kind.as_str(),
        recipients = report.recipients,
        failed = report.failed,
        "broadcast to administrators"
    );
    Ok((group_id, report))
}

/// Tells each affected recipient which of their notifications became read,
/// with the `read_at` that was stored for them.
pub async fn push_read_marks(state: &AppState, marks: &[ReadMark], read_at: DateTime<Utc>) {
    let mut by_recipient: Vec<(Uuid, Vec<Uuid>)> = Vec::new();
    for mark in marks {
        match by_recipient
            .iter_mut()
            .find(|(recipient_id, _)| *recipient_id == mark.recipient_id)
        {
            Some((_, ids)) => ids.push(mark.notification_id),
            None => by_recipient.push((mark.recipient_id, vec![mark.notification_id])),
        }
    }

    let limit = state.config.fanout_concurrency.max(1);
    stream::iter(by_recipient)
        .for_each_concurrent(limit, |(recipient_id, notification_ids)| async move {
            push_event(
                state,
                recipient_id,
                RealtimeEvent::NotificationsRead {
                    notification_ids,
                    read_at,
                },
            )
            .await;
        })
        .await;
}

/// Returns whether the push went through within the configured timeout.
pub(crate) async fn push_event(state: &AppState, recipient_id: Uuid, event: RealtimeEvent) -> bool {
    match tokio::time::timeout(state.config.push_timeout, state.push.push(recipient_id, event)).await
    {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(%recipient_id, error = %err, "realtime push failed");
            false
        }
        Err(_) => {
            warn!(
                %recipient_id,
                timeout_ms = state.config.push_timeout.as_millis() as u64,
                "realtime push timed out"
            );
            false
        }
    }
}
