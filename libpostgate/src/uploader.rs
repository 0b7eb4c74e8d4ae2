//! Posting a job to every provider
//!
//! Each provider is attempted independently and concurrently. A failure is
//! captured as a string in that provider's [`UploadResult`], reported through
//! the [`Notifier`], and never stops the other provider's attempt.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::auth::CredentialProvider;
use crate::config::Config;
use crate::error::Result;
use crate::notify::Notifier;
use crate::platforms::linkedin::LinkedInClient;
use crate::platforms::media::HttpMediaFetcher;
use crate::platforms::twitter::TwitterClient;
use crate::platforms::{LinkedInPoster, MediaFetcher, MediaPayload, TweetRequest, TwitterPoster};
use crate::types::{PostContent, PostJob, Provider, RunFlags, UploadReport, UploadResult};

/// Append the attribution line unless the text already carries it
///
/// The check ignores case, so applying this twice changes nothing.
pub fn ensure_signature(text: &str, signature: &str) -> String {
    let signature = signature.trim();
    if signature.is_empty() || text.to_lowercase().contains(&signature.to_lowercase()) {
        return text.to_string();
    }
    format!("{}\n{}", text, signature)
}

/// One provider to attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub provider: Provider,
    /// Whether a failure should be reported to the operator
    pub notify_on_failure: bool,
    /// Main tweet already published by an earlier attempt; only the reply
    /// is still owed
    pub thread_root_id: Option<String>,
}

impl Attempt {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            notify_on_failure: true,
            thread_root_id: None,
        }
    }

    pub fn silent(provider: Provider) -> Self {
        Self {
            notify_on_failure: false,
            ..Self::new(provider)
        }
    }

    pub fn with_thread_root(mut self, thread_root_id: Option<String>) -> Self {
        self.thread_root_id = thread_root_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOutcome {
    pub result: UploadResult,
    /// A failure notification was delivered for this attempt
    pub notified: bool,
    /// Published main tweet of a thread, kept even when the reply failed
    pub thread_root_id: Option<String>,
}

pub struct Uploader {
    twitter: Arc<dyn TwitterPoster>,
    linkedin: Arc<dyn LinkedInPoster>,
    media: Arc<dyn MediaFetcher>,
    notifier: Notifier,
    signature: String,
}

impl Uploader {
    pub fn new(
        twitter: Arc<dyn TwitterPoster>,
        linkedin: Arc<dyn LinkedInPoster>,
        media: Arc<dyn MediaFetcher>,
        notifier: Notifier,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            twitter,
            linkedin,
            media,
            notifier,
            signature: signature.into(),
        }
    }

    /// HTTP clients backed by `credentials`
    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialProvider>,
        notifier: Notifier,
    ) -> Result<Self> {
        Ok(Self::new(
            Arc::new(TwitterClient::new(Arc::clone(&credentials))?),
            Arc::new(LinkedInClient::new(credentials)?),
            Arc::new(HttpMediaFetcher::new()?),
            notifier,
            config.posting.signature.clone(),
        ))
    }

    /// Post to both providers
    pub async fn upload(&self, job: &PostJob, flags: RunFlags, thread_id: &str) -> UploadReport {
        let attempts = [Attempt::new(Provider::Twitter), Attempt::new(Provider::LinkedIn)];
        let outcomes = self.upload_providers(job, flags, thread_id, &attempts).await;

        let result_for = |provider: Provider| {
            outcomes
                .iter()
                .find(|o| o.result.provider == provider)
                .map(|o| o.result.clone())
                .unwrap_or_else(|| UploadResult::failure(provider, "upload was not attempted"))
        };

        UploadReport {
            twitter: result_for(Provider::Twitter),
            linkedin: result_for(Provider::LinkedIn),
        }
    }

    /// Post to the given providers concurrently; outcomes keep input order
    pub async fn upload_providers(
        &self,
        job: &PostJob,
        flags: RunFlags,
        thread_id: &str,
        attempts: &[Attempt],
    ) -> Vec<ProviderOutcome> {
        let futures = attempts
            .iter()
            .map(|attempt| self.attempt(job, flags, thread_id, attempt.clone()));
        join_all(futures).await
    }

    #[instrument(skip(self, job, flags), fields(provider = %attempt.provider))]
    async fn attempt(
        &self,
        job: &PostJob,
        flags: RunFlags,
        thread_id: &str,
        attempt: Attempt,
    ) -> ProviderOutcome {
        let provider = attempt.provider;
        let mut thread_root_id = attempt.thread_root_id.clone();
        let outcome = match provider {
            Provider::Twitter => self.post_twitter(job, flags, &mut thread_root_id).await,
            Provider::LinkedIn => self.post_linkedin(job, flags).await,
        };

        match outcome {
            Ok(()) => {
                info!("Successfully uploaded post to {}", provider);
                ProviderOutcome {
                    result: UploadResult::success(provider),
                    notified: false,
                    thread_root_id,
                }
            }
            Err(e) => {
                let message = e.message();
                error!("Failed to upload post to {}: {}", provider, message);

                let notified = if attempt.notify_on_failure {
                    self.notifier
                        .notify_failure(provider, &message, job, thread_id)
                        .await
                } else {
                    false
                };

                ProviderOutcome {
                    result: UploadResult::failure(provider, message),
                    notified,
                    thread_root_id,
                }
            }
        }
    }

    async fn fetch_media(&self, job: &PostJob, flags: RunFlags) -> Result<Option<MediaPayload>> {
        if flags.text_only {
            return Ok(None);
        }
        match &job.image {
            Some(image) => Ok(Some(self.media.fetch(image).await?)),
            None => Ok(None),
        }
    }

    /// `thread_root_id` is updated as soon as a thread's main tweet is out
    async fn post_twitter(
        &self,
        job: &PostJob,
        flags: RunFlags,
        thread_root_id: &mut Option<String>,
    ) -> Result<()> {
        match job.content() {
            PostContent::Thread(complex) => {
                if let Some(root) = thread_root_id.as_deref() {
                    info!("Main tweet {} already published, posting the reply only", root);
                    self.twitter
                        .upload_tweet(TweetRequest::text(&complex.reply_post).replying_to(root))
                        .await?;
                    return Ok(());
                }

                let media = self.fetch_media(job, flags).await?;
                let main = ensure_signature(&complex.main_post, &self.signature);
                let tweets = [
                    TweetRequest::with_media(&main, media.as_ref()),
                    TweetRequest::text(&complex.reply_post),
                ];
                let outcome = self.twitter.upload_thread(&tweets).await;
                *thread_root_id = outcome.root_id().map(str::to_string);
                outcome.into_result()?;
            }
            PostContent::Single(text) => {
                let media = self.fetch_media(job, flags).await?;
                let text = ensure_signature(text, &self.signature);
                self.twitter
                    .upload_tweet(TweetRequest::with_media(&text, media.as_ref()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn post_linkedin(&self, job: &PostJob, flags: RunFlags) -> Result<()> {
        let text = ensure_signature(&linkedin_text(job), &self.signature);

        match self.fetch_media(job, flags).await? {
            Some(image) => {
                self.linkedin
                    .create_image_post(&text, &image, flags.post_to_organization)
                    .await?;
            }
            None => {
                self.linkedin
                    .create_text_post(&text, flags.post_to_organization)
                    .await?;
            }
        }
        Ok(())
    }
}

/// LinkedIn has no threads: the single post, or main and reply joined
fn linkedin_text(job: &PostJob) -> String {
    match &job.complex_post {
        Some(complex) if job.post.trim().is_empty() => {
            format!("{}\n\n{}", complex.main_post, complex.reply_post)
        }
        _ => job.post.clone(),
    }
}
