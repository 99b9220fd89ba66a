use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Outbound email. Callers treat every send as fire-and-forget.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: OutboundEmail) -> Result<()>;
}

/// Posts messages as JSON to a transactional mail API.
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
            from: from.into(),
        }
    }
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(&MailRequest {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("mail API request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("mail API responded with {status}: {body}");
        }
        Ok(())
    }
}

/// Used when no mail API is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "mail API not configured; email logged only");
        Ok(())
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Box<dyn Mailer> {
    match &config.mail_api_url {
        Some(endpoint) => Box::new(HttpMailer::new(
            endpoint.clone(),
            config.mail_api_key.clone(),
            config.mail_from.clone(),
        )),
        None => Box::new(LogMailer),
    }
}
