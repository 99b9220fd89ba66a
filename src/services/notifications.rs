use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Notification, NotificationKind};
use crate::notify::dedup::{apply_report_query, collapse_reports, ReportItem, ReportQuery};
use crate::notify::{self, FanOutReport, NotificationDraft};
use crate::state::AppState;
use crate::store::{Directory, NotificationStore, ReadMark};

use super::require_text;

#[derive(Debug, Clone, Serialize)]
pub struct ReadOutcome {
    pub notification_id: Uuid,
    /// Other administrators' copies of the same broadcast marked along with it.
    pub synced_copies: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkReadOutcome {
    pub marked: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncementRequest {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnouncementReceipt {
    pub broadcast_group_id: Uuid,
    pub report: FanOutReport,
}

pub async fn list_for(state: &AppState, actor: &Actor) -> ServiceResult<Vec<Notification>> {
    Ok(state.store.notifications_for(actor.id()).await?)
}

async fn owned(state: &AppState, actor: &Actor, id: Uuid) -> ServiceResult<Notification> {
    state
        .store
        .find_notification(id)
        .await?
        .filter(|notification| notification.recipient_id == actor.id())
        .ok_or(ServiceError::NotFound("notification"))
}

/// Marks one notification read. When an administrator reads their copy
/// of an administrator broadcast (a report or an announcement), every
/// other administrator's copy is marked too.
pub async fn mark_read(state: &AppState, actor: &Actor, id: Uuid) -> ServiceResult<ReadOutcome> {
    let notification = owned(state, actor, id).await?;
    let now = state.clock.now();

    let mut marks = Vec::new();
    if state.store.mark_notification_read(id, now).await? {
        marks.push(ReadMark {
            recipient_id: actor.id(),
            notification_id: id,
        });
    }

    let mut synced_copies = 0;
    if let (true, Some(group_id)) = (actor.is_privileged(), notification.broadcast_group_id) {
        let group_marks = state.store.mark_group_read(group_id, now).await?;
        synced_copies = group_marks.len();
        if synced_copies > 0 {
            info!(
                %group_id,
                kind = %notification.kind,
                synced_copies,
                "read state synced across administrators"
            );
        }
        marks.extend(group_marks);
    }

    notify::push_read_marks(state, &marks, now).await;
    Ok(ReadOutcome {
        notification_id: id,
        synced_copies,
    })
}

pub async fn mark_all_read(state: &AppState, actor: &Actor) -> ServiceResult<BulkReadOutcome> {
    let now = state.clock.now();
    let marks = state.store.mark_all_read_for(&[actor.id()], now).await?;
    notify::push_read_marks(state, &marks, now).await;
    Ok(BulkReadOutcome {
        marked: marks.len(),
    })
}

/// Clears every unread notification of every current administrator.
pub async fn mark_all_read_for_admins(
    state: &AppState,
    actor: &Actor,
) -> ServiceResult<BulkReadOutcome> {
    require_privileged(actor)?;
    let admin_ids: Vec<Uuid> = state
        .store
        .privileged_accounts()
        .await?
        .into_iter()
        .map(|account| account.id)
        .collect();
    let now = state.clock.now();
    let marks = state.store.mark_all_read_for(&admin_ids, now).await?;
    info!(actor_id = %actor.id(), marked = marks.len(), "admin notifications marked read");
    notify::push_read_marks(state, &marks, now).await;
    Ok(BulkReadOutcome {
        marked: marks.len(),
    })
}

pub async fn delete(state: &AppState, actor: &Actor, id: Uuid) -> ServiceResult<()> {
    if !state.store.delete_notification(id, actor.id()).await? {
        return Err(ServiceError::NotFound("notification"));
    }
    Ok(())
}

/// Reports as administrators see them: one item per submitted report.
pub async fn list_reports(
    state: &AppState,
    actor: &Actor,
    query: &ReportQuery,
) -> ServiceResult<Vec<ReportItem>> {
    require_privileged(actor)?;
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ServiceError::invalid("`from` must not be after `to`"));
        }
    }
    let rows = state
        .store
        .notifications_of_kinds(&NotificationKind::REPORTS)
        .await?;
    let items = collapse_reports(&rows, actor.id());
    Ok(apply_report_query(items, query))
}

pub async fn announce(
    state: &AppState,
    actor: &Actor,
    request: AnnouncementRequest,
) -> ServiceResult<AnnouncementReceipt> {
    require_privileged(actor)?;
    let title = require_text(&request.title, "title")?;
    let message = require_text(&request.message, "message")?;
    let draft = NotificationDraft::new(NotificationKind::Announcement, title, message)
        .acting_admin(actor.id())
        .meta("author_name", actor.account.username.as_str());
    let (broadcast_group_id, report) = notify::notify_admins(state, &draft).await?;
    Ok(AnnouncementReceipt {
        broadcast_group_id,
        report,
    })
}

fn require_privileged(actor: &Actor) -> ServiceResult<()> {
    if !actor.is_privileged() {
        return Err(ServiceError::forbidden("administrator access required"));
    }
    Ok(())
}
