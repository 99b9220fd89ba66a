use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{
    Account, Conversation, ConversationMessage, Listing, ListingChanges, ListingSubscription,
    NewVaultEntry, Notification, NotificationKind, ReportAudit, ReportKind, Review, VaultEntry,
    ROLE_ADMIN, ROLE_SUPER_ADMIN,
};
use crate::schema::{
    conversation_messages, conversations, deleted_listings, listing_subscriptions, listings,
    notifications, report_audits, reviews, users,
};

use super::{
    Directory, ListingCatalog, NotificationStore, ReadMark, ReportLog, RestorationClaim,
    RestorationOutcome, StoreError, StoreResult, SubscriptionStore, TokenVault, WindowStart,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| StoreError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(StoreError::from)?
    }
}

enum ClaimAbort {
    Stale,
    ListingExists,
    Database(DieselError),
}

impl From<DieselError> for ClaimAbort {
    fn from(value: DieselError) -> Self {
        ClaimAbort::Database(value)
    }
}

#[async_trait]
impl ListingCatalog for PgStore {
    async fn find_listing(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        self.run(move |conn| Ok(listings::table.find(id).first(conn).optional()?))
            .await
    }

    async fn update_listing(
        &self,
        id: Uuid,
        changes: ListingChanges,
    ) -> StoreResult<Option<Listing>> {
        self.run(move |conn| {
            Ok(diesel::update(listings::table.find(id))
                .set(&changes)
                .get_result(conn)
                .optional()?)
        })
        .await
    }

    async fn delete_listing(&self, id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(listings::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[async_trait]
impl TokenVault for PgStore {
    async fn upsert_vault_entry(&self, entry: NewVaultEntry) -> StoreResult<VaultEntry> {
        self.run(move |conn| {
            Ok(diesel::insert_into(deleted_listings::table)
                .values(&entry)
                .on_conflict(deleted_listings::original_listing_id)
                .do_update()
                .set(&entry)
                .get_result(conn)?)
        })
        .await
    }

    async fn find_vault_entry_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<VaultEntry>> {
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            Ok(deleted_listings::table
                .filter(deleted_listings::token_hash.eq(token_hash))
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn find_vault_entry_for_listing(
        &self,
        listing_id: Uuid,
    ) -> StoreResult<Option<VaultEntry>> {
        self.run(move |conn| {
            Ok(deleted_listings::table
                .filter(deleted_listings::original_listing_id.eq(listing_id))
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn complete_restoration(
        &self,
        claim: RestorationClaim,
    ) -> StoreResult<RestorationOutcome> {
        self.run(move |conn| {
            let result = conn.transaction::<Listing, ClaimAbort, _>(|conn| {
                let claimed = diesel::update(
                    deleted_listings::table
                        .filter(deleted_listings::id.eq(claim.entry_id))
                        .filter(deleted_listings::token_hash.eq(&claim.token_hash))
                        .filter(deleted_listings::is_restored.eq(false))
                        .filter(deleted_listings::is_used.eq(false))
                        .filter(deleted_listings::token_expires_at.gt(claim.restored_at)),
                )
                .set((
                    deleted_listings::is_restored.eq(true),
                    deleted_listings::is_used.eq(true),
                    deleted_listings::restored_at.eq(Some(claim.restored_at)),
                    deleted_listings::restored_by.eq(Some(claim.restored_by)),
                    deleted_listings::updated_at.eq(claim.restored_at),
                ))
                .execute(conn)?;

                if claimed == 0 {
                    return Err(ClaimAbort::Stale);
                }

                match diesel::insert_into(listings::table)
                    .values(&claim.listing)
                    .get_result::<Listing>(conn)
                {
                    Ok(listing) => Ok(listing),
                    Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                        Err(ClaimAbort::ListingExists)
                    }
                    Err(err) => Err(ClaimAbort::Database(err)),
                }
            });

            match result {
                Ok(listing) => Ok(RestorationOutcome::Restored(listing)),
                Err(ClaimAbort::Stale) => Ok(RestorationOutcome::Stale),
                Err(ClaimAbort::ListingExists) => Ok(RestorationOutcome::ListingExists),
                Err(ClaimAbort::Database(err)) => Err(StoreError::from(err)),
            }
        })
        .await
    }

    async fn purge_expired_vault_entries(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.run(move |conn| {
            Ok(diesel::delete(
                deleted_listings::table
                    .filter(deleted_listings::is_restored.eq(false))
                    .filter(deleted_listings::token_expires_at.le(now)),
            )
            .execute(conn)?)
        })
        .await
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn add_subscription(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.run(move |conn| {
            let inserted = diesel::insert_into(listing_subscriptions::table)
                .values(&ListingSubscription {
                    user_id,
                    listing_id,
                    created_at: at,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn remove_subscription(&self, user_id: Uuid, listing_id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let removed =
                diesel::delete(listing_subscriptions::table.find((user_id, listing_id)))
                    .execute(conn)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn subscribers_of(&self, listing_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.run(move |conn| {
            Ok(listing_subscriptions::table
                .filter(listing_subscriptions::listing_id.eq(listing_id))
                .order(listing_subscriptions::created_at.asc())
                .select(listing_subscriptions::user_id)
                .load(conn)?)
        })
        .await
    }

    async fn purge_subscriptions(&self, listing_id: Uuid) -> StoreResult<usize> {
        self.run(move |conn| {
            Ok(diesel::delete(
                listing_subscriptions::table
                    .filter(listing_subscriptions::listing_id.eq(listing_id)),
            )
            .execute(conn)?)
        })
        .await
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification> {
        self.run(move |conn| {
            Ok(diesel::insert_into(notifications::table)
                .values(&notification)
                .get_result(conn)?)
        })
        .await
    }

    async fn find_notification(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        self.run(move |conn| Ok(notifications::table.find(id).first(conn).optional()?))
            .await
    }

    async fn notifications_for(&self, recipient_id: Uuid) -> StoreResult<Vec<Notification>> {
        self.run(move |conn| {
            Ok(notifications::table
                .filter(notifications::recipient_id.eq(recipient_id))
                .order(notifications::created_at.desc())
                .load(conn)?)
        })
        .await
    }

    async fn notifications_of_kinds(
        &self,
        kinds: &[NotificationKind],
    ) -> StoreResult<Vec<Notification>> {
        let kinds: Vec<String> = kinds.iter().map(|kind| kind.as_str().to_string()).collect();
        self.run(move |conn| {
            Ok(notifications::table
                .filter(notifications::kind.eq_any(kinds))
                .order(notifications::created_at.desc())
                .load(conn)?)
        })
        .await
    }

    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        self.run(move |conn| {
            let updated = diesel::update(
                notifications::table
                    .find(id)
                    .filter(notifications::is_read.eq(false)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(Some(at)),
            ))
            .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn mark_group_read(
        &self,
        group_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ReadMark>> {
        self.run(move |conn| {
            let rows: Vec<(Uuid, Uuid)> = diesel::update(
                notifications::table
                    .filter(notifications::broadcast_group_id.eq(group_id))
                    .filter(notifications::is_read.eq(false)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(Some(at)),
            ))
            .returning((notifications::recipient_id, notifications::id))
            .get_results(conn)?;
            Ok(to_read_marks(rows))
        })
        .await
    }

    async fn mark_all_read_for(
        &self,
        recipient_ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ReadMark>> {
        let recipient_ids = recipient_ids.to_vec();
        self.run(move |conn| {
            let rows: Vec<(Uuid, Uuid)> = diesel::update(
                notifications::table
                    .filter(notifications::recipient_id.eq_any(recipient_ids))
                    .filter(notifications::is_read.eq(false)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(Some(at)),
            ))
            .returning((notifications::recipient_id, notifications::id))
            .get_results(conn)?;
            Ok(to_read_marks(rows))
        })
        .await
    }

    async fn delete_notification(&self, id: Uuid, recipient_id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(
                notifications::table
                    .find(id)
                    .filter(notifications::recipient_id.eq(recipient_id)),
            )
            .execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }
}

fn to_read_marks(rows: Vec<(Uuid, Uuid)>) -> Vec<ReadMark> {
    rows.into_iter()
        .map(|(recipient_id, notification_id)| ReadMark {
            recipient_id,
            notification_id,
        })
        .collect()
}

#[async_trait]
impl ReportLog for PgStore {
    async fn count_reports_since(
        &self,
        user_id: Uuid,
        target_id: Uuid,
        kind: ReportKind,
        since: WindowStart,
    ) -> StoreResult<i64> {
        self.run(move |conn| {
            let query = report_audits::table
                .filter(report_audits::user_id.eq(user_id))
                .filter(report_audits::target_id.eq(target_id))
                .filter(report_audits::kind.eq(kind.as_str()))
                .into_boxed();
            let query = match since {
                WindowStart::Inclusive(start) => query.filter(report_audits::created_at.ge(start)),
                WindowStart::Exclusive(start) => query.filter(report_audits::created_at.gt(start)),
            };
            Ok(query.count().get_result(conn)?)
        })
        .await
    }

    async fn append_report(&self, audit: ReportAudit) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::insert_into(report_audits::table)
                .values(&audit)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        self.run(move |conn| Ok(users::table.find(id).first(conn).optional()?))
            .await
    }

    async fn privileged_accounts(&self) -> StoreResult<Vec<Account>> {
        self.run(move |conn| {
            Ok(users::table
                .filter(users::suspended.eq(false))
                .filter(
                    users::role.eq(ROLE_SUPER_ADMIN).or(users::role
                        .eq(ROLE_ADMIN)
                        .and(users::admin_approved.eq(true))),
                )
                .order(users::created_at.asc())
                .load(conn)?)
        })
        .await
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        self.run(move |conn| Ok(conversations::table.find(id).first(conn).optional()?))
            .await
    }

    async fn find_conversation_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> StoreResult<Option<ConversationMessage>> {
        self.run(move |conn| {
            Ok(conversation_messages::table
                .find(message_id)
                .filter(conversation_messages::conversation_id.eq(conversation_id))
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn find_review(&self, id: Uuid) -> StoreResult<Option<Review>> {
        self.run(move |conn| Ok(reviews::table.find(id).first(conn).optional()?))
            .await
    }
}
