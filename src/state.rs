use std::sync::Arc;

use crate::{
    auth::jwt::JwtService, clock::Clock, config::AppConfig, mailer::Mailer,
    realtime::{PushChannel, RealtimeHub}, store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub clock: Arc<dyn Clock>,
    pub mailer: Arc<dyn Mailer>,
    pub push: Arc<dyn PushChannel>,
    pub hub: RealtimeHub,
}

impl AppState {
    /// Pushes go through the hub that the WebSocket route registers
    /// connections with.
    pub fn new(
        store: Arc<dyn Store>,
        config: AppConfig,
        jwt: JwtService,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let hub = RealtimeHub::new();
        Self {
            store,
            config: Arc::new(config),
            jwt,
            clock,
            mailer,
            push: Arc::new(hub.clone()),
            hub,
        }
    }

    /// Replaces the push channel, keeping the hub for socket registration.
    pub fn with_push(mut self, push: Arc<dyn PushChannel>) -> Self {
        self.push = push;
        self
    }
}
