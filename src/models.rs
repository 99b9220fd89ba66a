use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::*;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPER_ADMIN: &str = "super_admin";

pub const LISTING_STATUS_ACTIVE: &str = "active";
pub const LISTING_STATUS_SOLD: &str = "sold";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value {
            ROLE_ADMIN => Role::Admin,
            ROLE_SUPER_ADMIN => Role::SuperAdmin,
            _ => Role::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => ROLE_USER,
            Role::Admin => ROLE_ADMIN,
            Role::SuperAdmin => ROLE_SUPER_ADMIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub admin_approved: bool,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    /// Approved, active admins and active super admins.
    pub fn is_privileged(&self) -> bool {
        if self.suspended {
            return false;
        }
        match self.role() {
            Role::SuperAdmin => true,
            Role::Admin => self.admin_approved,
            Role::User => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = listings)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub address: String,
    pub regular_price: Option<i64>,
    pub discount_price: Option<i64>,
    pub offer: bool,
    pub status: String,
    pub attributes: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn effective_price(&self) -> Option<i64> {
        effective_price(self.regular_price, self.discount_price, self.offer)
    }

    pub fn snapshot(&self) -> ListingSnapshot {
        ListingSnapshot {
            owner_id: self.owner_id,
            name: self.name.clone(),
            description: self.description.clone(),
            address: self.address.clone(),
            regular_price: self.regular_price,
            discount_price: self.discount_price,
            offer: self.offer,
            status: self.status.clone(),
            attributes: self.attributes.clone(),
            created_at: self.created_at,
        }
    }
}

/// The price actually charged: the discount price while an offer runs.
pub fn effective_price(regular: Option<i64>, discount: Option<i64>, offer: bool) -> Option<i64> {
    if offer {
        discount
    } else {
        regular
    }
}

/// Content of a listing captured at deletion time. Identity and the
/// modification timestamp are assigned again on restoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub address: String,
    pub regular_price: Option<i64>,
    pub discount_price: Option<i64>,
    pub offer: bool,
    pub status: String,
    pub attributes: Value,
    pub created_at: DateTime<Utc>,
}

impl ListingSnapshot {
    pub fn into_listing(self, id: Uuid, updated_at: DateTime<Utc>) -> Listing {
        Listing {
            id,
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            address: self.address,
            regular_price: self.regular_price,
            discount_price: self.discount_price,
            offer: self.offer,
            status: self.status,
            attributes: self.attributes,
            created_at: self.created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = listings)]
pub struct ListingChanges {
    pub regular_price: Option<Option<i64>>,
    pub discount_price: Option<Option<i64>>,
    pub offer: Option<bool>,
    pub status: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ListingChanges {
    pub fn is_empty(&self) -> bool {
        self.regular_price.is_none()
            && self.discount_price.is_none()
            && self.offer.is_none()
            && self.status.is_none()
    }

    pub fn apply_to(&self, listing: &mut Listing) {
        if let Some(value) = self.regular_price {
            listing.regular_price = value;
        }
        if let Some(value) = self.discount_price {
            listing.discount_price = value;
        }
        if let Some(value) = self.offer {
            listing.offer = value;
        }
        if let Some(value) = &self.status {
            listing.status = value.clone();
        }
        if let Some(value) = self.updated_at {
            listing.updated_at = value;
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = listing_subscriptions)]
pub struct ListingSubscription {
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub const DELETION_KIND_OWNER: &str = "owner";
pub const DELETION_KIND_ADMIN: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionKind {
    Owner,
    Admin,
}

impl DeletionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionKind::Owner => DELETION_KIND_OWNER,
            DeletionKind::Admin => DELETION_KIND_ADMIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = deleted_listings)]
pub struct VaultEntry {
    pub id: Uuid,
    pub original_listing_id: Uuid,
    pub snapshot: Value,
    pub owner_id: Uuid,
    pub deleted_by: Uuid,
    pub deletion_kind: String,
    pub deletion_reason: Option<String>,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub deleted_at: DateTime<Utc>,
    pub token_expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub is_restored: bool,
    pub restored_at: Option<DateTime<Utc>>,
    pub restored_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl VaultEntry {
    pub fn token_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_restored && now < self.token_expires_at
    }

    pub fn listing_snapshot(&self) -> Result<ListingSnapshot, serde_json::Error> {
        serde_json::from_value(self.snapshot.clone())
    }
}

/// Insert values for a vault entry. Also used as the overwrite changeset,
/// so `None` must clear the terminal markers rather than skip them.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = deleted_listings)]
#[diesel(treat_none_as_null = true)]
pub struct NewVaultEntry {
    pub id: Uuid,
    pub original_listing_id: Uuid,
    pub snapshot: Value,
    pub owner_id: Uuid,
    pub deleted_by: Uuid,
    pub deletion_kind: String,
    pub deletion_reason: Option<String>,
    pub token_hash: String,
    pub deleted_at: DateTime<Utc>,
    pub token_expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub is_restored: bool,
    pub restored_at: Option<DateTime<Utc>>,
    pub restored_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl NewVaultEntry {
    pub fn into_entry(self) -> VaultEntry {
        VaultEntry {
            id: self.id,
            original_listing_id: self.original_listing_id,
            snapshot: self.snapshot,
            owner_id: self.owner_id,
            deleted_by: self.deleted_by,
            deletion_kind: self.deletion_kind,
            deletion_reason: self.deletion_reason,
            token_hash: self.token_hash,
            deleted_at: self.deleted_at,
            token_expires_at: self.token_expires_at,
            is_used: self.is_used,
            is_restored: self.is_restored,
            restored_at: self.restored_at,
            restored_by: self.restored_by,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PriceDrop,
    PriceIncrease,
    Sold,
    Removed,
    Trending,
    StatusChange,
    Update,
    ListingDeleted,
    ListingRestored,
    MessageReport,
    ChatReport,
    ListingReport,
    ReviewReport,
    Announcement,
}

impl NotificationKind {
    pub const REPORTS: [NotificationKind; 4] = [
        NotificationKind::MessageReport,
        NotificationKind::ChatReport,
        NotificationKind::ListingReport,
        NotificationKind::ReviewReport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::PriceDrop => "price_drop",
            NotificationKind::PriceIncrease => "price_increase",
            NotificationKind::Sold => "sold",
            NotificationKind::Removed => "removed",
            NotificationKind::Trending => "trending",
            NotificationKind::StatusChange => "status_change",
            NotificationKind::Update => "update",
            NotificationKind::ListingDeleted => "listing_deleted",
            NotificationKind::ListingRestored => "listing_restored",
            NotificationKind::MessageReport => "message_report",
            NotificationKind::ChatReport => "chat_report",
            NotificationKind::ListingReport => "listing_report",
            NotificationKind::ReviewReport => "review_report",
            NotificationKind::Announcement => "announcement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "price_drop" => NotificationKind::PriceDrop,
            "price_increase" => NotificationKind::PriceIncrease,
            "sold" => NotificationKind::Sold,
            "removed" => NotificationKind::Removed,
            "trending" => NotificationKind::Trending,
            "status_change" => NotificationKind::StatusChange,
            "update" => NotificationKind::Update,
            "listing_deleted" => NotificationKind::ListingDeleted,
            "listing_restored" => NotificationKind::ListingRestored,
            "message_report" => NotificationKind::MessageReport,
            "chat_report" => NotificationKind::ChatReport,
            "listing_report" => NotificationKind::ListingReport,
            "review_report" => NotificationKind::ReviewReport,
            "announcement" => NotificationKind::Announcement,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub listing_id: Option<Uuid>,
    pub acting_admin_id: Option<Uuid>,
    pub broadcast_group_id: Option<Uuid>,
    pub meta: Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }
}

pub const REPORT_KIND_MESSAGE: &str = "message";
pub const REPORT_KIND_CHAT: &str = "chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Message,
    Chat,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Message => REPORT_KIND_MESSAGE,
            ReportKind::Chat => REPORT_KIND_CHAT,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = report_audits)]
pub struct ReportAudit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub listing_id: Option<Uuid>,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable)]
#[diesel(table_name = conversation_messages)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable)]
#[diesel(table_name = reviews)]
pub struct Review {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub author_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn entry(expires_at: DateTime<Utc>) -> VaultEntry {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        VaultEntry {
            id: Uuid::new_v4(),
            original_listing_id: Uuid::new_v4(),
            snapshot: json!({}),
            owner_id: Uuid::new_v4(),
            deleted_by: Uuid::new_v4(),
            deletion_kind: DELETION_KIND_OWNER.to_string(),
            deletion_reason: None,
            token_hash: "abc".to_string(),
            deleted_at: at,
            token_expires_at: expires_at,
            is_used: false,
            is_restored: false,
            restored_at: None,
            restored_by: None,
            updated_at: at,
        }
    }

    #[test]
    fn token_validity_flips_at_expiry() {
        let expires_at = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let entry = entry(expires_at);
        assert!(entry.token_valid(expires_at - Duration::seconds(1)));
        assert!(!entry.token_valid(expires_at));
        assert!(!entry.token_valid(expires_at + Duration::seconds(1)));
    }

    #[test]
    fn used_or_restored_tokens_are_invalid() {
        let expires_at = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let now = expires_at - Duration::days(1);

        let mut used = entry(expires_at);
        used.is_used = true;
        assert!(!used.token_valid(now));

        let mut restored = entry(expires_at);
        restored.is_restored = true;
        assert!(!restored.token_valid(now));
    }

    #[test]
    fn effective_price_follows_offer_flag() {
        assert_eq!(effective_price(Some(100), Some(90), false), Some(100));
        assert_eq!(effective_price(Some(100), Some(90), true), Some(90));
        assert_eq!(effective_price(Some(100), None, true), None);
    }

    #[test]
    fn privileged_requires_approval_and_no_suspension() {
        let now = Utc::now();
        let mut account = Account {
            id: Uuid::new_v4(),
            username: "moderator".to_string(),
            email: "moderator@example.com".to_string(),
            role: ROLE_ADMIN.to_string(),
            admin_approved: false,
            suspended: false,
            created_at: now,
            updated_at: now,
        };
        assert!(!account.is_privileged());
        account.admin_approved = true;
        assert!(account.is_privileged());
        account.suspended = true;
        assert!(!account.is_privileged());

        account.role = ROLE_SUPER_ADMIN.to_string();
        account.admin_approved = false;
        account.suspended = false;
        assert!(account.is_privileged());
    }

    #[test]
    fn notification_kinds_round_trip_through_strings() {
        for kind in NotificationKind::REPORTS {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::parse("nope"), None);
    }
}
