use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{NotificationKind, ReportAudit, ReportKind};
use crate::notify::{self, FanOutReport, NotificationDraft};
use crate::rate_limit::{check_quota, ReportQuota};
use crate::state::AppState;
use crate::store::{Directory, ListingCatalog, ReportLog};

use super::{excerpt, optional_text, require_text};

const EXCERPT_CHARS: usize = 140;

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReportRequest {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReportRequest {
    pub conversation_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingReportRequest {
    pub listing_id: Uuid,
    pub category: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewReportRequest {
    pub review_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportReceipt {
    pub kind: NotificationKind,
    pub broadcast_group_id: Uuid,
    pub delivered_to: usize,
    pub message: String,
}

impl ReportReceipt {
    fn new(kind: NotificationKind, group_id: Uuid, report: FanOutReport) -> Self {
        Self {
            kind,
            broadcast_group_id: group_id,
            delivered_to: report.persisted,
            message: "Report submitted. Our moderators will review it.".to_string(),
        }
    }
}

/// The fields every report carries, rendered for humans and kept as
/// structured meta for the admin listing.
struct ReportBody<'a> {
    kind: NotificationKind,
    title: &'static str,
    reporter: &'a Actor,
    category: String,
    target_id: Uuid,
    excerpt: Option<String>,
    details: Option<String>,
    listing_id: Option<Uuid>,
}

impl ReportBody<'_> {
    fn into_draft(self) -> NotificationDraft {
        let mut lines = vec![
            format!("Reporter: {}", self.reporter.account.username),
            format!("Reason: {}", self.category),
        ];
        if let Some(excerpt) = &self.excerpt {
            lines.push(format!("Content: \"{excerpt}\""));
        }
        if let Some(details) = &self.details {
            lines.push(format!("Details: {details}"));
        }

        let mut draft = NotificationDraft::new(self.kind, self.title, lines.join("\n"))
            .meta("reporter_id", self.reporter.id().to_string())
            .meta("reporter_name", self.reporter.account.username.as_str())
            .meta("category", self.category.as_str())
            .meta("target_id", self.target_id.to_string());
        if let Some(excerpt) = self.excerpt {
            draft = draft.meta("excerpt", excerpt);
        }
        if let Some(details) = self.details {
            draft = draft.meta("details", details);
        }
        if let Some(listing_id) = self.listing_id {
            draft = draft.listing(listing_id);
        }
        draft
    }
}

pub async fn report_message(
    state: &AppState,
    actor: &Actor,
    request: MessageReportRequest,
) -> ServiceResult<ReportReceipt> {
    let reason = require_text(&request.reason, "reason")?;
    let conversation = state
        .store
        .find_conversation(request.conversation_id)
        .await?
        .ok_or(ServiceError::NotFound("conversation"))?;
    if !conversation.has_participant(actor.id()) {
        return Err(ServiceError::forbidden(
            "only participants can report messages in this conversation",
        ));
    }
    let message = state
        .store
        .find_conversation_message(conversation.id, request.message_id)
        .await?
        .ok_or(ServiceError::NotFound("message"))?;

    let quota = ReportQuota::for_kind(&state.config, ReportKind::Message);
    check_quota(state, &quota, actor.id(), conversation.id).await?;

    let body = ReportBody {
        kind: NotificationKind::MessageReport,
        title: "Message reported",
        reporter: actor,
        category: reason,
        target_id: conversation.id,
        excerpt: Some(excerpt(&message.body, EXCERPT_CHARS)),
        details: optional_text(request.details),
        listing_id: conversation.listing_id,
    };
    let receipt = broadcast(state, body).await?;
    record(state, actor.id(), conversation.id, ReportKind::Message).await;
    Ok(receipt)
}

pub async fn report_chat(
    state: &AppState,
    actor: &Actor,
    request: ChatReportRequest,
) -> ServiceResult<ReportReceipt> {
    let reason = require_text(&request.reason, "reason")?;
    let conversation = state
        .store
        .find_conversation(request.conversation_id)
        .await?
        .ok_or(ServiceError::NotFound("conversation"))?;
    if !conversation.has_participant(actor.id()) {
        return Err(ServiceError::forbidden(
            "only participants can report this conversation",
        ));
    }

    let quota = ReportQuota::for_kind(&state.config, ReportKind::Chat);
    check_quota(state, &quota, actor.id(), conversation.id).await?;

    let body = ReportBody {
        kind: NotificationKind::ChatReport,
        title: "Chat reported",
        reporter: actor,
        category: reason,
        target_id: conversation.id,
        excerpt: None,
        details: optional_text(request.details),
        listing_id: conversation.listing_id,
    };
    let receipt = broadcast(state, body).await?;
    record(state, actor.id(), conversation.id, ReportKind::Chat).await;
    Ok(receipt)
}

pub async fn report_listing(
    state: &AppState,
    actor: &Actor,
    request: ListingReportRequest,
) -> ServiceResult<ReportReceipt> {
    let category = require_text(&request.category, "category")?;
    let listing = state
        .store
        .find_listing(request.listing_id)
        .await?
        .ok_or(ServiceError::NotFound("listing"))?;

    let body = ReportBody {
        kind: NotificationKind::ListingReport,
        title: "Listing reported",
        reporter: actor,
        category,
        target_id: listing.id,
        excerpt: Some(excerpt(&listing.name, EXCERPT_CHARS)),
        details: optional_text(request.details),
        listing_id: Some(listing.id),
    };
    broadcast(state, body).await
}

pub async fn report_review(
    state: &AppState,
    actor: &Actor,
    request: ReviewReportRequest,
) -> ServiceResult<ReportReceipt> {
    let reason = require_text(&request.reason, "reason")?;
    let review = state
        .store
        .find_review(request.review_id)
        .await?
        .ok_or(ServiceError::NotFound("review"))?;

    let body = ReportBody {
        kind: NotificationKind::ReviewReport,
        title: "Review reported",
        reporter: actor,
        category: reason,
        target_id: review.id,
        excerpt: Some(excerpt(&review.comment, EXCERPT_CHARS)),
        details: optional_text(request.details),
        listing_id: Some(review.listing_id),
    };
    broadcast(state, body).await
}

async fn broadcast(state: &AppState, body: ReportBody<'_>) -> ServiceResult<ReportReceipt> {
    let kind = body.kind;
    let reporter_id = body.reporter.id();
    let target_id = body.target_id;
    let draft = body.into_draft();
    let (group_id, report) = notify::notify_admins(state, &draft).await?;
    info!(
        kind = kind.as_str(),
        %reporter_id,
        %target_id,
        %group_id,
        admins = report.recipients,
        "report submitted"
    );
    Ok(ReportReceipt::new(kind, group_id, report))
}

/// Counts toward the quota. The report is already out, so a failed write
/// is logged rather than surfaced.
async fn record(state: &AppState, user_id: Uuid, target_id: Uuid, kind: ReportKind) {
    let audit = ReportAudit {
        id: Uuid::new_v4(),
        user_id,
        target_id,
        kind: kind.as_str().to_string(),
        created_at: state.clock.now(),
    };
    if let Err(err) = state.store.append_report(audit).await {
        error!(%user_id, %target_id, kind = kind.as_str(), error = %err, "failed to record report audit");
    }
}
