#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use listing_vault::auth::jwt::JwtService;
use listing_vault::auth::Actor;
use listing_vault::clock::ManualClock;
use listing_vault::config::{AppConfig, StoreBackend};
use listing_vault::mailer::{Mailer, OutboundEmail};
use listing_vault::models::{
    Account, Conversation, ConversationMessage, Listing, Review, LISTING_STATUS_ACTIVE,
    ROLE_ADMIN, ROLE_SUPER_ADMIN, ROLE_USER,
};
use listing_vault::realtime::{PushChannel, RealtimeEvent};
use listing_vault::routes;
use listing_vault::state::AppState;
use listing_vault::store::MemoryStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn test_config() -> AppConfig {
    AppConfig {
        store_backend: StoreBackend::Memory,
        database_url: String::new(),
        database_max_pool_size: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        cors_allowed_origin: None,
        public_base_url: "https://market.test".to_string(),
        restoration_token_ttl_days: 30,
        message_report_daily_cap: 10,
        chat_report_hourly_cap: 5,
        report_day_utc_offset_minutes: 0,
        side_effect_timeout: Duration::from_millis(500),
        push_timeout: Duration::from_millis(200),
        fanout_concurrency: 4,
        vault_sweep_interval: Duration::from_secs(3600),
        mail_api_url: None,
        mail_api_key: None,
        mail_from: "no-reply@market.test".to_string(),
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }

    /// The raw token from the most recent email to `address`.
    pub async fn last_restoration_token(&self, address: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .filter(|email| email.to == address)
            .find_map(|email| {
                email
                    .text
                    .lines()
                    .find_map(|line| line.strip_prefix("Restoration token: "))
                    .map(|token| token.trim().to_string())
            })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("mail API unavailable");
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPush {
    events: Mutex<Vec<(Uuid, RealtimeEvent)>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl RecordingPush {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every push sleeps this long before it is recorded.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn events_for(&self, recipient_id: Uuid) -> Vec<RealtimeEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(recipient, _)| *recipient == recipient_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.events.lock().await.len()
    }
}

#[async_trait]
impl PushChannel for RecordingPush {
    async fn push(&self, recipient_id: Uuid, event: RealtimeEvent) -> Result<()> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("socket gone");
        }
        self.events.lock().await.push((recipient_id, event));
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
    pub push: Arc<RecordingPush>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let mut config = test_config();
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let mailer = Arc::new(RecordingMailer::default());
        let push = Arc::new(RecordingPush::default());
        let jwt = JwtService::from_config(&config)?;

        let state = AppState::new(store.clone(), config, jwt, clock.clone(), mailer.clone())
            .with_push(push.clone());
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            store,
            clock,
            mailer,
            push,
            router,
        })
    }

    pub async fn create_user(&self, username: &str) -> Account {
        self.create_account(username, ROLE_USER, false, false).await
    }

    pub async fn create_admin(&self, username: &str) -> Account {
        self.create_account(username, ROLE_ADMIN, true, false).await
    }

    pub async fn create_super_admin(&self, username: &str) -> Account {
        self.create_account(username, ROLE_SUPER_ADMIN, false, false)
            .await
    }

    pub async fn create_account(
        &self,
        username: &str,
        role: &str,
        admin_approved: bool,
        suspended: bool,
    ) -> Account {
        let now = self.clock_now();
        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@market.test"),
            role: role.to_string(),
            admin_approved,
            suspended,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_account(account.clone()).await;
        account
    }

    pub async fn create_listing(&self, owner: &Account, name: &str, regular_price: i64) -> Listing {
        let now = self.clock_now();
        let listing = Listing {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            name: name.to_string(),
            description: format!("{name}, freshly painted"),
            address: "12 Harbor Street".to_string(),
            regular_price: Some(regular_price),
            discount_price: None,
            offer: false,
            status: LISTING_STATUS_ACTIVE.to_string(),
            attributes: json!({ "bedrooms": 3, "parking": true }),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_listing(listing.clone()).await;
        listing
    }

    pub async fn create_conversation(&self, buyer: &Account, seller: &Account) -> Conversation {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            listing_id: None,
            buyer_id: buyer.id,
            seller_id: seller.id,
            created_at: self.clock_now(),
        };
        self.store.insert_conversation(conversation.clone()).await;
        conversation
    }

    pub async fn create_message(
        &self,
        conversation: &Conversation,
        sender: &Account,
        body: &str,
    ) -> ConversationMessage {
        let message = ConversationMessage {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender_id: sender.id,
            body: body.to_string(),
            created_at: self.clock_now(),
        };
        self.store.insert_message(message.clone()).await;
        message
    }

    pub async fn create_review(&self, listing: &Listing, author: &Account, comment: &str) -> Review {
        let review = Review {
            id: Uuid::new_v4(),
            listing_id: listing.id,
            author_id: author.id,
            rating: 1,
            comment: comment.to_string(),
            created_at: self.clock_now(),
        };
        self.store.insert_review(review.clone()).await;
        review
    }

    pub fn token_for(&self, account: &Account) -> String {
        self.state
            .jwt
            .generate_token(account.id, &account.username, &account.role)
            .expect("token generation")
    }

    pub fn actor(&self, account: &Account) -> Actor {
        Actor::new(account.clone())
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        use listing_vault::clock::Clock;
        self.clock.now()
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    pub async fn delete_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::DELETE, path, payload, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::GET, path, token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::DELETE, path, token).await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::POST, path, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn send_empty(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn json_body<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let bytes = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&bytes).with_context(|| {
        format!(
            "unexpected response body: {}",
            String::from_utf8_lossy(&bytes)
        )
    })
}
