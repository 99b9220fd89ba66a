//! In-process store used by tests and `STORE_BACKEND=memory` runs.
//! Every operation takes the single table lock, which gives the
//! conditional updates the same atomicity as their SQL counterparts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Account, Conversation, ConversationMessage, Listing, ListingChanges, NewVaultEntry,
    Notification, NotificationKind, ReportAudit, ReportKind, Review, VaultEntry,
};

use super::{
    Directory, ListingCatalog, NotificationStore, ReadMark, ReportLog, RestorationClaim,
    RestorationOutcome, StoreResult, SubscriptionStore, TokenVault, WindowStart,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    listings: HashMap<Uuid, Listing>,
    subscriptions: Vec<(Uuid, Uuid, DateTime<Utc>)>,
    vault: HashMap<Uuid, VaultEntry>,
    notifications: Vec<Notification>,
    reports: Vec<ReportAudit>,
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, ConversationMessage>,
    reviews: HashMap<Uuid, Review>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_account(&self, account: Account) {
        self.tables
            .lock()
            .await
            .accounts
            .insert(account.id, account);
    }

    pub async fn insert_listing(&self, listing: Listing) {
        self.tables
            .lock()
            .await
            .listings
            .insert(listing.id, listing);
    }

    pub async fn insert_conversation(&self, conversation: Conversation) {
        self.tables
            .lock()
            .await
            .conversations
            .insert(conversation.id, conversation);
    }

    pub async fn insert_message(&self, message: ConversationMessage) {
        self.tables
            .lock()
            .await
            .messages
            .insert(message.id, message);
    }

    pub async fn insert_review(&self, review: Review) {
        self.tables.lock().await.reviews.insert(review.id, review);
    }

    pub async fn all_notifications(&self) -> Vec<Notification> {
        self.tables.lock().await.notifications.clone()
    }

    pub async fn report_count(&self) -> usize {
        self.tables.lock().await.reports.len()
    }
}

#[async_trait]
impl ListingCatalog for MemoryStore {
    async fn find_listing(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.tables.lock().await.listings.get(&id).cloned())
    }

    async fn update_listing(
        &self,
        id: Uuid,
        changes: ListingChanges,
    ) -> StoreResult<Option<Listing>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.listings.get_mut(&id).map(|listing| {
            changes.apply_to(listing);
            listing.clone()
        }))
    }

    async fn delete_listing(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.lock().await.listings.remove(&id).is_some())
    }
}

#[async_trait]
impl TokenVault for MemoryStore {
    async fn upsert_vault_entry(&self, entry: NewVaultEntry) -> StoreResult<VaultEntry> {
        let mut tables = self.tables.lock().await;
        let existing_id = tables
            .vault
            .values()
            .find(|current| current.original_listing_id == entry.original_listing_id)
            .map(|current| current.id);

        let mut stored = entry.into_entry();
        if let Some(existing_id) = existing_id {
            stored.id = existing_id;
        }
        tables.vault.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_vault_entry_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<VaultEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .vault
            .values()
            .find(|entry| entry.token_hash == token_hash)
            .cloned())
    }

    async fn find_vault_entry_for_listing(
        &self,
        listing_id: Uuid,
    ) -> StoreResult<Option<VaultEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .vault
            .values()
            .find(|entry| entry.original_listing_id == listing_id)
            .cloned())
    }

    async fn complete_restoration(
        &self,
        claim: RestorationClaim,
    ) -> StoreResult<RestorationOutcome> {
        let mut tables = self.tables.lock().await;

        let claimable = tables.vault.get(&claim.entry_id).is_some_and(|entry| {
            entry.token_hash == claim.token_hash && entry.token_valid(claim.restored_at)
        });
        if !claimable {
            return Ok(RestorationOutcome::Stale);
        }
        if tables.listings.contains_key(&claim.listing.id) {
            return Ok(RestorationOutcome::ListingExists);
        }

        if let Some(entry) = tables.vault.get_mut(&claim.entry_id) {
            entry.is_restored = true;
            entry.is_used = true;
            entry.restored_at = Some(claim.restored_at);
            entry.restored_by = Some(claim.restored_by);
            entry.updated_at = claim.restored_at;
        }
        tables
            .listings
            .insert(claim.listing.id, claim.listing.clone());
        Ok(RestorationOutcome::Restored(claim.listing))
    }

    async fn purge_expired_vault_entries(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut tables = self.tables.lock().await;
        let before = tables.vault.len();
        tables
            .vault
            .retain(|_, entry| entry.is_restored || entry.token_expires_at > now);
        Ok(before - tables.vault.len())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn add_subscription(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let exists = tables
            .subscriptions
            .iter()
            .any(|(user, listing, _)| *user == user_id && *listing == listing_id);
        if exists {
            return Ok(false);
        }
        tables.subscriptions.push((user_id, listing_id, at));
        Ok(true)
    }

    async fn remove_subscription(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.subscriptions.len();
        tables
            .subscriptions
            .retain(|(user, listing, _)| !(*user == user_id && *listing == listing_id));
        Ok(tables.subscriptions.len() < before)
    }

    async fn subscribers_of(&self, listing_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|(_, listing, _)| *listing == listing_id)
            .map(|(user, _, _)| *user)
            .collect())
    }

    async fn purge_subscriptions(&self, listing_id: Uuid) -> StoreResult<usize> {
        let mut tables = self.tables.lock().await;
        let before = tables.subscriptions.len();
        tables
            .subscriptions
            .retain(|(_, listing, _)| *listing != listing_id);
        Ok(before - tables.subscriptions.len())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification> {
        let mut tables = self.tables.lock().await;
        tables.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn find_notification(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .iter()
            .find(|notification| notification.id == id)
            .cloned())
    }

    async fn notifications_for(&self, recipient_id: Uuid) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Notification> = tables
            .notifications
            .iter()
            .rev()
            .filter(|notification| notification.recipient_id == recipient_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn notifications_of_kinds(
        &self,
        kinds: &[NotificationKind],
    ) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Notification> = tables
            .notifications
            .iter()
            .rev()
            .filter(|notification| {
                NotificationKind::parse(&notification.kind).is_some_and(|kind| kinds.contains(&kind))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables
            .notifications
            .iter_mut()
            .find(|notification| notification.id == id && !notification.is_read)
        {
            Some(notification) => {
                notification.is_read = true;
                notification.read_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_group_read(
        &self,
        group_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ReadMark>> {
        let mut tables = self.tables.lock().await;
        Ok(mark_read_where(&mut tables.notifications, at, |notification| {
            notification.broadcast_group_id == Some(group_id)
        }))
    }

    async fn mark_all_read_for(
        &self,
        recipient_ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ReadMark>> {
        let mut tables = self.tables.lock().await;
        Ok(mark_read_where(&mut tables.notifications, at, |notification| {
            recipient_ids.contains(&notification.recipient_id)
        }))
    }

    async fn delete_notification(&self, id: Uuid, recipient_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.notifications.len();
        tables.notifications.retain(|notification| {
            !(notification.id == id && notification.recipient_id == recipient_id)
        });
        Ok(tables.notifications.len() < before)
    }
}

fn mark_read_where<F>(notifications: &mut [Notification], at: DateTime<Utc>, matches: F) -> Vec<ReadMark>
where
    F: Fn(&Notification) -> bool,
{
    notifications
        .iter_mut()
        .filter(|notification| !notification.is_read && matches(notification))
        .map(|notification| {
            notification.is_read = true;
            notification.read_at = Some(at);
            ReadMark {
                recipient_id: notification.recipient_id,
                notification_id: notification.id,
            }
        })
        .collect()
}

#[async_trait]
impl ReportLog for MemoryStore {
    async fn count_reports_since(
        &self,
        user_id: Uuid,
        target_id: Uuid,
        kind: ReportKind,
        since: WindowStart,
    ) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        let count = tables
            .reports
            .iter()
            .filter(|audit| {
                audit.user_id == user_id
                    && audit.target_id == target_id
                    && audit.kind == kind.as_str()
                    && since.admits(audit.created_at)
            })
            .count();
        Ok(count as i64)
    }

    async fn append_report(&self, audit: ReportAudit) -> StoreResult<()> {
        self.tables.lock().await.reports.push(audit);
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn privileged_accounts(&self) -> StoreResult<Vec<Account>> {
        let tables = self.tables.lock().await;
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|account| account.is_privileged())
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.tables.lock().await.conversations.get(&id).cloned())
    }

    async fn find_conversation_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> StoreResult<Option<ConversationMessage>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .messages
            .get(&message_id)
            .filter(|message| message.conversation_id == conversation_id)
            .cloned())
    }

    async fn find_review(&self, id: Uuid) -> StoreResult<Option<Review>> {
        Ok(self.tables.lock().await.reviews.get(&id).cloned())
    }
}
