//! Operator notifications
//!
//! Every notification is best-effort. An unconfigured channel logs a warning
//! and a delivery failure logs an error; neither ever fails the caller.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{NotificationError, Result};
use crate::platforms::http_client;
use crate::types::{PostJob, Provider};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()>;
}

/// Slack Web API `chat.postMessage`
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            token: token.into(),
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl NotificationChannel for SlackClient {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": channel_id, "text": text }))
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(format!("Slack request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Delivery(format!("Slack returned HTTP {}", status)).into());
        }

        // Slack reports most failures with HTTP 200 and `ok: false`
        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::Delivery(format!("Unreadable Slack response: {}", e)))?;

        if !body.ok {
            return Err(NotificationError::Delivery(
                body.error.unwrap_or_else(|| "unknown Slack error".to_string()),
            )
            .into());
        }
        Ok(())
    }
}

/// A channel plus the id of the conversation to post into
#[derive(Clone)]
pub struct ChannelTarget {
    pub channel: Arc<dyn NotificationChannel>,
    pub channel_id: String,
}

#[derive(Clone, Default)]
pub struct Notifier {
    target: Option<ChannelTarget>,
}

impl Notifier {
    pub fn new(target: Option<ChannelTarget>) -> Self {
        Self { target }
    }

    pub fn to_channel(channel: Arc<dyn NotificationChannel>, channel_id: impl Into<String>) -> Self {
        Self::new(Some(ChannelTarget {
            channel,
            channel_id: channel_id.into(),
        }))
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Slack when both a bot token and a channel id are configured
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.slack_channel() {
            Some((token, channel_id)) => Ok(Self::to_channel(
                Arc::new(SlackClient::new(token)?),
                channel_id,
            )),
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    /// Send `text`, returning whether it was delivered
    pub async fn send(&self, text: &str) -> bool {
        let Some(target) = &self.target else {
            warn!("No notification channel configured; skipping message");
            return false;
        };

        match target.channel.send_message(&target.channel_id, text).await {
            Ok(()) => {
                debug!("Notification delivered to {}", target.channel_id);
                true
            }
            Err(e) => {
                error!("Failed to deliver notification: {}", e);
                false
            }
        }
    }

    /// Report a failed upload to one provider
    pub async fn notify_failure(
        &self,
        provider: Provider,
        error: &str,
        job: &PostJob,
        thread_id: &str,
    ) -> bool {
        self.send(&failure_message(provider, error, job, thread_id))
            .await
    }
}

/// The post body as shown in notifications
pub fn format_post(job: &PostJob) -> String {
    match &job.complex_post {
        Some(complex) => format!(
            "Main post:\n```\n{}\n```\nReply post:\n```\n{}\n```",
            complex.main_post, complex.reply_post
        ),
        None => format!("Post:\n```\n{}\n```", job.post),
    }
}

pub fn failure_message(provider: Provider, error: &str, job: &PostJob, thread_id: &str) -> String {
    let image = job
        .image
        .as_ref()
        .map(|img| format!("Image:\nURL: {}\nMIME type: {}", img.image_url, img.mime_type))
        .unwrap_or_default();

    format!(
        "❌ FAILED TO UPLOAD POST TO {} ❌\n\nError message:\n```\n{}\n```\n\nThread ID: *{}*\n\n{}\n\n{}",
        provider.display_name().to_uppercase(),
        error,
        thread_id,
        format_post(job),
        image
    )
    .trim_end()
    .to_string()
}

/// Announcement for a newly scheduled run
///
/// `scheduled_for` is a unix timestamp, `None` for immediate runs.
pub fn schedule_message(
    scheduled_for: Option<i64>,
    run_id: &str,
    thread_id: &str,
    job: &PostJob,
    text_only: bool,
) -> String {
    let when = scheduled_for
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "now".to_string());

    let image = if text_only {
        "Text only mode enabled. Image support has been disabled.".to_string()
    } else {
        match &job.image {
            Some(img) => format!("Image:\n{}", img.image_url),
            None => "No image provided".to_string(),
        }
    };

    format!(
        "*New Post Scheduled*\n\nScheduled post for: *{}*\nRun ID: *{}*\nThread ID: *{}*\n\n{}\n\n{}",
        when,
        run_id,
        thread_id,
        format_post(job),
        image
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockChannel;

    #[test]
    fn test_failure_message_single_post() {
        let job = PostJob::new("Hello world");
        let message = failure_message(Provider::Twitter, "rate limited", &job, "thread-1");

        assert!(message.starts_with("❌ FAILED TO UPLOAD POST TO TWITTER ❌"));
        assert!(message.contains("Error message:\n```\nrate limited\n```"));
        assert!(message.contains("Thread ID: *thread-1*"));
        assert!(message.contains("Post:\n```\nHello world\n```"));
        assert!(!message.contains("Image:"));
    }

    #[test]
    fn test_failure_message_thread_with_image() {
        let job = PostJob::new("")
            .with_complex_post("Main", "Reply https://link")
            .with_image("https://img/1.png", "image/png");
        let message = failure_message(Provider::LinkedIn, "boom", &job, "t");

        assert!(message.starts_with("❌ FAILED TO UPLOAD POST TO LINKEDIN ❌"));
        assert!(message.contains("Main post:\n```\nMain\n```\nReply post:\n```\nReply https://link\n```"));
        assert!(message.ends_with("Image:\nURL: https://img/1.png\nMIME type: image/png"));
    }

    #[test]
    fn test_schedule_message_variants() {
        let job = PostJob::new("Hello").with_image("https://img/1.png", "image/png");

        let message = schedule_message(None, "run-1", "thread-1", &job, false);
        assert!(message.contains("Scheduled post for: *now*"));
        assert!(message.contains("Run ID: *run-1*"));
        assert!(message.ends_with("Image:\nhttps://img/1.png"));

        let message = schedule_message(Some(0), "run-1", "thread-1", &job, true);
        assert!(message.contains("Scheduled post for: *1970-01-01 00:00:00 UTC*"));
        assert!(message.ends_with("Text only mode enabled. Image support has been disabled."));

        let message = schedule_message(None, "r", "t", &PostJob::new("Hello"), false);
        assert!(message.ends_with("No image provided"));
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_is_noop() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_configured());
        assert!(!notifier.send("hello").await);
    }

    #[tokio::test]
    async fn test_notify_failure_delivers_to_channel() {
        let channel = MockChannel::new();
        let notifier = Notifier::to_channel(Arc::new(channel.clone()), "C123");

        let delivered = notifier
            .notify_failure(Provider::Twitter, "rate limited", &PostJob::new("Hi"), "t1")
            .await;

        assert!(delivered);
        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "C123");
        assert!(messages[0].1.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let channel = MockChannel::failing("channel_not_found");
        let notifier = Notifier::to_channel(Arc::new(channel.clone()), "C123");

        assert!(!notifier.send("hello").await);
        assert_eq!(channel.attempts(), 1);
    }
}
