//! Best-effort "data refreshed" announcements.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::PublishError;

pub const UPDATES_TOPIC: &str = "updates";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateNotice {
    pub topic: String,
    pub title: String,
    pub body: String,
}

impl UpdateNotice {
    pub fn refreshed(organizations: u32, candidates: u32) -> Self {
        Self {
            topic: UPDATES_TOPIC.to_string(),
            title: "Campaign finance data updated".to_string(),
            body: format!(
                "{organizations} companies and {candidates} candidates refreshed with latest FEC data."
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &UpdateNotice) -> Result<(), PublishError>;
}

/// Posts the notice as JSON to a topic relay endpoint.
#[derive(Debug, Clone)]
pub struct TopicNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl TopicNotifier {
    pub fn new(url: &str, token: Option<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            token,
        })
    }
}

#[async_trait]
impl Notifier for TopicNotifier {
    async fn send(&self, notice: &UpdateNotice) -> Result<(), PublishError> {
        let mut request = self.client.post(&self.url).json(notice);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                operation: format!("notify {}", notice.topic),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Send and swallow failures. Returns whether the notice went out.
pub async fn notify_best_effort(notifier: &dyn Notifier, notice: &UpdateNotice) -> bool {
    match notifier.send(notice).await {
        Ok(()) => {
            info!(topic = %notice.topic, body = %notice.body, "notification sent");
            true
        }
        Err(err) => {
            warn!(topic = %notice.topic, error = %err, "notification failed (non-fatal)");
            false
        }
    }
}
