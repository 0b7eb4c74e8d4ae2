//! Mock collaborators for testing
//!
//! Configurable stand-ins for the Twitter and LinkedIn clients, the media
//! fetcher, the Twitter credential check, the auth broker and the
//! notification channel. Each mock records what it was asked to do behind an
//! `Arc<Mutex<..>>`, so a test can keep a clone and inspect the calls after
//! handing the mock to the code under test. No credentials or network access are involved.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::auth::broker::{AuthBroker, BrokerAuthResponse};
use crate::auth::TwitterVerifier;
use crate::config::TwitterCredentials;
use crate::error::{AuthError, NotificationError, PlatformError, Result};
use crate::notify::NotificationChannel;
use crate::platforms::{
    LinkedInPoster, MediaFetcher, MediaPayload, ThreadOutcome, TweetRequest, TwitterPoster,
};
use crate::types::{PostImage, Provider};

/// How a mock platform call ends
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Fail(PlatformError),
}

/// One tweet as seen by [`MockTwitter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTweet {
    pub text: String,
    pub has_media: bool,
    pub in_reply_to: Option<String>,
}

/// Twitter mock; every call (single tweet or thread) is one recorded entry
#[derive(Clone)]
pub struct MockTwitter {
    outcome: MockOutcome,
    /// Tweets of each call that go out before a failing outcome applies
    publish_before_failure: usize,
    delay: Duration,
    calls: Arc<Mutex<Vec<Vec<RecordedTweet>>>>,
    published: Arc<Mutex<Vec<RecordedTweet>>>,
}

impl MockTwitter {
    pub fn new(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            publish_before_failure: 0,
            delay: Duration::from_millis(0),
            calls: Arc::new(Mutex::new(Vec::new())),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn success() -> Self {
        Self::new(MockOutcome::Succeed)
    }

    /// Fails every upload with an upload error carrying `message`
    pub fn failure(message: &str) -> Self {
        Self::new(MockOutcome::Fail(PlatformError::Upload(message.to_string())))
    }

    pub fn rate_limited(message: &str) -> Self {
        Self::new(MockOutcome::Fail(PlatformError::RateLimit(message.to_string())))
    }

    /// Publishes the first `published` tweets of every call, then fails
    ///
    /// A call with no more than `published` tweets succeeds, so a thread
    /// breaks after its main tweet while a lone reply goes through.
    pub fn fail_after(published: usize, message: &str) -> Self {
        let mut twitter = Self::failure(message);
        twitter.publish_before_failure = published;
        twitter
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Vec<RecordedTweet>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Tweets that were actually published, across all calls
    pub fn published(&self) -> Vec<RecordedTweet> {
        self.published.lock().unwrap().clone()
    }

    async fn record(&self, tweets: &[TweetRequest<'_>]) -> ThreadOutcome {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let recorded: Vec<RecordedTweet> = tweets
            .iter()
            .map(|t| RecordedTweet {
                text: t.text.to_string(),
                has_media: t.media.is_some(),
                in_reply_to: t.in_reply_to.map(str::to_string),
            })
            .collect();

        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(recorded.clone());
            calls.len()
        };

        let (count, error) = match &self.outcome {
            MockOutcome::Succeed => (tweets.len(), None),
            MockOutcome::Fail(_) if self.publish_before_failure >= tweets.len() => {
                (tweets.len(), None)
            }
            MockOutcome::Fail(e) => (self.publish_before_failure, Some(e.clone())),
        };

        self.published
            .lock()
            .unwrap()
            .extend(recorded.into_iter().take(count));
        let ids = (0..count)
            .map(|i| format!("mock-tweet-{}-{}", call_index, i))
            .collect();

        match error {
            Some(e) => ThreadOutcome::failed(ids, e),
            None => ThreadOutcome::completed(ids),
        }
    }
}

#[async_trait]
impl TwitterPoster for MockTwitter {
    async fn upload_tweet(&self, tweet: TweetRequest<'_>) -> Result<String> {
        let mut ids = self.record(&[tweet]).await.into_result()?;
        Ok(ids.remove(0))
    }

    async fn upload_thread(&self, tweets: &[TweetRequest<'_>]) -> ThreadOutcome {
        self.record(tweets).await
    }
}

/// One share as seen by [`MockLinkedIn`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedShare {
    pub text: String,
    pub has_image: bool,
    pub post_to_organization: bool,
}

#[derive(Clone)]
pub struct MockLinkedIn {
    outcome: MockOutcome,
    delay: Duration,
    calls: Arc<Mutex<Vec<RecordedShare>>>,
}

impl MockLinkedIn {
    pub fn new(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::from_millis(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn success() -> Self {
        Self::new(MockOutcome::Succeed)
    }

    pub fn failure(message: &str) -> Self {
        Self::new(MockOutcome::Fail(PlatformError::Upload(message.to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<RecordedShare> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn record(&self, share: RecordedShare) -> Result<String> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(share);
            calls.len()
        };

        match &self.outcome {
            MockOutcome::Succeed => Ok(format!("urn:li:share:mock-{}", count)),
            MockOutcome::Fail(e) => Err(e.clone().into()),
        }
    }
}

#[async_trait]
impl LinkedInPoster for MockLinkedIn {
    async fn create_text_post(&self, text: &str, post_to_organization: bool) -> Result<String> {
        self.record(RecordedShare {
            text: text.to_string(),
            has_image: false,
            post_to_organization,
        })
        .await
    }

    async fn create_image_post(
        &self,
        text: &str,
        _image: &MediaPayload,
        post_to_organization: bool,
    ) -> Result<String> {
        self.record(RecordedShare {
            text: text.to_string(),
            has_image: true,
            post_to_organization,
        })
        .await
    }
}

/// Media fetcher returning a fixed payload (or a fixed error)
#[derive(Clone)]
pub struct MockMedia {
    result: std::result::Result<MediaPayload, PlatformError>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockMedia {
    pub fn png() -> Self {
        Self {
            result: Ok(MediaPayload {
                bytes: vec![0x89, b'P', b'N', b'G'],
                mime_type: "image/png".to_string(),
            }),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            result: Err(PlatformError::MediaFetch(message.to_string())),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs fetched so far
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for MockMedia {
    async fn fetch(&self, image: &PostImage) -> Result<MediaPayload> {
        self.fetched.lock().unwrap().push(image.image_url.clone());
        self.result.clone().map_err(Into::into)
    }
}

/// Auth broker mock
///
/// Providers without a configured response get a pending response with a
/// placeholder authorization URL.
#[derive(Clone, Default)]
pub struct MockBroker {
    responses: Arc<Mutex<HashMap<Provider, BrokerAuthResponse>>>,
    unavailable: Option<String>,
    calls: Arc<Mutex<Vec<(String, Provider, Vec<String>)>>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, provider: Provider, response: BrokerAuthResponse) -> Self {
        self.set_response(provider, response);
        self
    }

    /// Every call fails with `BrokerUnavailable`
    pub fn unavailable(mut self, message: &str) -> Self {
        self.unavailable = Some(message.to_string());
        self
    }

    /// Change a response after the mock was handed out (e.g. the user authorized)
    pub fn set_response(&self, provider: Provider, response: BrokerAuthResponse) {
        self.responses.lock().unwrap().insert(provider, response);
    }

    /// `(user_id, provider, scopes)` for every call
    pub fn calls(&self) -> Vec<(String, Provider, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthBroker for MockBroker {
    async fn start_auth(
        &self,
        user_id: &str,
        provider: Provider,
        scopes: &[String],
    ) -> Result<BrokerAuthResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), provider, scopes.to_vec()));

        if let Some(message) = &self.unavailable {
            return Err(AuthError::BrokerUnavailable(message.clone()).into());
        }

        let configured = self.responses.lock().unwrap().get(&provider).cloned();
        Ok(configured.unwrap_or_else(|| {
            BrokerAuthResponse::pending(format!("https://auth.example.com/{}", provider.as_str()))
        }))
    }
}

/// Twitter credential verifier mock
#[derive(Clone)]
pub struct MockVerifier {
    result: std::result::Result<(), PlatformError>,
    checked: Arc<Mutex<Vec<String>>>,
}

impl MockVerifier {
    fn with_result(result: std::result::Result<(), PlatformError>) -> Self {
        Self {
            result,
            checked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn accept() -> Self {
        Self::with_result(Ok(()))
    }

    /// The API answers 401/403
    pub fn reject(message: &str) -> Self {
        Self::with_result(Err(PlatformError::Authentication(message.to_string())))
    }

    /// The API cannot be reached
    pub fn unreachable(message: &str) -> Self {
        Self::with_result(Err(PlatformError::Network(message.to_string())))
    }

    /// API keys of the credentials checked so far
    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }
}

#[async_trait]
impl TwitterVerifier for MockVerifier {
    async fn verify(&self, credentials: &TwitterCredentials) -> Result<()> {
        self.checked.lock().unwrap().push(credentials.api_key.clone());
        self.result.clone().map_err(Into::into)
    }
}

/// Notification channel mock recording `(channel_id, text)` pairs
#[derive(Clone, Default)]
pub struct MockChannel {
    error: Option<String>,
    attempts: Arc<Mutex<usize>>,
    messages: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Delivered messages
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    /// Delivery attempts, including failed ones
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;

        if let Some(message) = &self.error {
            return Err(NotificationError::Delivery(message.clone()).into());
        }

        self.messages
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}
