use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, Conversation, ConversationMessage, Listing, ListingChanges, NewVaultEntry,
    Notification, NotificationKind, ReportAudit, ReportKind, Review, VaultEntry,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read and write access to canonical listing records.
#[async_trait]
pub trait ListingCatalog: Send + Sync {
    async fn find_listing(&self, id: Uuid) -> StoreResult<Option<Listing>>;

    async fn update_listing(&self, id: Uuid, changes: ListingChanges)
        -> StoreResult<Option<Listing>>;

    async fn delete_listing(&self, id: Uuid) -> StoreResult<bool>;
}

pub struct RestorationClaim {
    pub entry_id: Uuid,
    pub token_hash: String,
    pub listing: Listing,
    pub restored_by: Uuid,
    pub restored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestorationOutcome {
    Restored(Listing),
    /// The entry was restored, used, expired or overwritten since it was read.
    Stale,
    /// A listing with the original id already exists; nothing was written.
    ListingExists,
}

#[async_trait]
pub trait TokenVault: Send + Sync {
    /// Inserts the entry, or overwrites the existing entry of the same
    /// listing in place.
    async fn upsert_vault_entry(&self, entry: NewVaultEntry) -> StoreResult<VaultEntry>;

    async fn find_vault_entry_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<VaultEntry>>;

    async fn find_vault_entry_for_listing(&self, listing_id: Uuid)
        -> StoreResult<Option<VaultEntry>>;

    /// Atomically flips the entry to its terminal state and recreates the
    /// listing. Either both happen or neither does.
    async fn complete_restoration(&self, claim: RestorationClaim)
        -> StoreResult<RestorationOutcome>;

    async fn purge_expired_vault_entries(&self, now: DateTime<Utc>) -> StoreResult<usize>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn add_subscription(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn remove_subscription(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<bool>;

    async fn subscribers_of(&self, listing_id: Uuid) -> StoreResult<Vec<Uuid>>;

    async fn purge_subscriptions(&self, listing_id: Uuid) -> StoreResult<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMark {
    pub recipient_id: Uuid,
    pub notification_id: Uuid,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification>;

    async fn find_notification(&self, id: Uuid) -> StoreResult<Option<Notification>>;

    /// Newest first.
    async fn notifications_for(&self, recipient_id: Uuid) -> StoreResult<Vec<Notification>>;

    async fn notifications_of_kinds(
        &self,
        kinds: &[NotificationKind],
    ) -> StoreResult<Vec<Notification>>;

    /// Returns false when the notification was already read or is missing.
    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Marks every unread copy of one broadcast read.
    async fn mark_group_read(&self, group_id: Uuid, at: DateTime<Utc>)
        -> StoreResult<Vec<ReadMark>>;

    async fn mark_all_read_for(
        &self,
        recipient_ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ReadMark>>;

    async fn delete_notification(&self, id: Uuid, recipient_id: Uuid) -> StoreResult<bool>;
}

/// Append-only audit of submitted reports, counted for rate limiting.
/// Lower edge of a report-counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStart {
    /// Audits created at exactly this instant are counted.
    Inclusive(DateTime<Utc>),
    /// Audits created at exactly this instant have aged out.
    Exclusive(DateTime<Utc>),
}

impl WindowStart {
    pub fn admits(self, created_at: DateTime<Utc>) -> bool {
        match self {
            WindowStart::Inclusive(start) => created_at >= start,
            WindowStart::Exclusive(start) => created_at > start,
        }
    }
}

#[async_trait]
pub trait ReportLog: Send + Sync {
    async fn count_reports_since(
        &self,
        user_id: Uuid,
        target_id: Uuid,
        kind: ReportKind,
        since: WindowStart,
    ) -> StoreResult<i64>;

    async fn append_report(&self, audit: ReportAudit) -> StoreResult<()>;
}

/// Accounts, roles and the chat/review records reports point at.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn privileged_accounts(&self) -> StoreResult<Vec<Account>>;

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;

    async fn find_conversation_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> StoreResult<Option<ConversationMessage>>;

    async fn find_review(&self, id: Uuid) -> StoreResult<Option<Review>>;
}

pub trait Store:
    ListingCatalog
    + TokenVault
    + SubscriptionStore
    + NotificationStore
    + ReportLog
    + Directory
    + Send
    + Sync
    + 'static
{
}

impl<T> Store for T where
    T: ListingCatalog
        + TokenVault
        + SubscriptionStore
        + NotificationStore
        + ReportLog
        + Directory
        + Send
        + Sync
        + 'static
{
}
