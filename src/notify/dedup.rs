//! Collapsing per-admin copies of a report into one admin-facing item,
//! plus the filtering and ordering the report listing supports.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Notification;

/// Copies of one broadcast share a group id. Rows written before groups
/// existed fall back to the report's structural identity.
pub fn dedup_key(notification: &Notification) -> String {
    if let Some(group_id) = notification.broadcast_group_id {
        return format!("group:{group_id}");
    }
    let field = |key: &str| notification.meta_str(key).unwrap_or_default().to_string();
    format!(
        "report:{}|{}|{}|{}|{}",
        notification.kind,
        field("reporter_id"),
        field("category"),
        field("target_id"),
        field("excerpt"),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportItem {
    /// The viewer's own copy when there is one.
    pub notification_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub listing_id: Option<Uuid>,
    pub reporter_id: Option<String>,
    pub reporter_name: Option<String>,
    pub category: Option<String>,
    pub target_id: Option<String>,
    pub excerpt: Option<String>,
    pub details: Option<String>,
    pub is_read: bool,
    pub copies: usize,
    pub created_at: DateTime<Utc>,
}

impl ReportItem {
    fn from_notification(notification: &Notification) -> Self {
        let field = |key: &str| notification.meta_str(key).map(str::to_string);
        Self {
            notification_id: notification.id,
            kind: notification.kind.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            listing_id: notification.listing_id,
            reporter_id: field("reporter_id"),
            reporter_name: field("reporter_name"),
            category: field("category"),
            target_id: field("target_id"),
            excerpt: field("excerpt"),
            details: field("details"),
            is_read: notification.is_read,
            copies: 1,
            created_at: notification.created_at,
        }
    }

    fn matches_text(&self, needle: &str) -> bool {
        [
            Some(self.kind.as_str()),
            Some(self.title.as_str()),
            Some(self.message.as_str()),
            self.reporter_name.as_deref(),
            self.category.as_deref(),
            self.excerpt.as_deref(),
            self.details.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(needle))
    }
}

/// Collapses copies in first-seen order. Input is expected newest first.
pub fn collapse_reports(notifications: &[Notification], viewer_id: Uuid) -> Vec<ReportItem> {
    let mut items: Vec<ReportItem> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for notification in notifications {
        let key = dedup_key(notification);
        match index_by_key.get(&key) {
            Some(&index) => {
                let item = &mut items[index];
                item.copies += 1;
                if notification.recipient_id == viewer_id {
                    let copies = item.copies;
                    *item = ReportItem::from_notification(notification);
                    item.copies = copies;
                }
            }
            None => {
                index_by_key.insert(key, items.len());
                items.push(ReportItem::from_notification(notification));
            }
        }
    }
    items
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSort {
    #[default]
    Date,
    Reporter,
    Type,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub reporter: Option<String>,
    pub q: Option<String>,
    #[serde(default)]
    pub sort: ReportSort,
    #[serde(default)]
    pub order: SortOrder,
}

pub fn apply_report_query(items: Vec<ReportItem>, query: &ReportQuery) -> Vec<ReportItem> {
    let reporter = query
        .reporter
        .as_deref()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty());
    let needle = query
        .q
        .as_deref()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty());

    let mut items: Vec<ReportItem> = items
        .into_iter()
        .filter(|item| query.from.map_or(true, |from| item.created_at >= from))
        .filter(|item| query.to.map_or(true, |to| item.created_at <= to))
        .filter(|item| match &reporter {
            None => true,
            Some(reporter) => {
                item.reporter_id.as_deref().map(str::to_lowercase).as_deref()
                    == Some(reporter.as_str())
                    || item
                        .reporter_name
                        .as_deref()
                        .map_or(false, |name| name.to_lowercase().contains(reporter.as_str()))
            }
        })
        .filter(|item| needle.as_deref().map_or(true, |needle| item.matches_text(needle)))
        .collect();

    items.sort_by(|a, b| {
        let ordering = match query.sort {
            ReportSort::Date => a.created_at.cmp(&b.created_at),
            ReportSort::Reporter => compare_reporters(a, b).then(a.created_at.cmp(&b.created_at)),
            ReportSort::Type => a.kind.cmp(&b.kind).then(a.created_at.cmp(&b.created_at)),
        };
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    items
}

fn compare_reporters(a: &ReportItem, b: &ReportItem) -> Ordering {
    let name = |item: &ReportItem| item.reporter_name.as_deref().unwrap_or_default().to_lowercase();
    name(a).cmp(&name(b))
}
