//! Platform abstraction and implementations
//!
//! The uploader only talks to platforms through the traits in this module:
//! [`TwitterPoster`], [`LinkedInPoster`] and [`MediaFetcher`]. The reqwest
//! implementations live in the submodules; [`mock`] provides configurable
//! stand-ins for tests.
//!
//! Platform clients resolve their credentials lazily, on each upload, through
//! a [`CredentialProvider`](crate::auth::CredentialProvider). A provider whose
//! session cannot be established therefore fails only its own upload.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{ConfigError, PlatformError, PostgateError, Result};
use crate::types::PostImage;

pub mod linkedin;
pub mod media;
pub mod oauth;
pub mod twitter;

// Mock platforms are available for all builds to support integration tests
pub mod mock;

/// Timeout applied to every outbound request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Binary image payload ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// One tweet of a single post or thread
#[derive(Debug, Clone, Copy)]
pub struct TweetRequest<'a> {
    pub text: &'a str,
    pub media: Option<&'a MediaPayload>,
    /// Tweet this one replies to
    pub in_reply_to: Option<&'a str>,
}

impl<'a> TweetRequest<'a> {
    pub fn text(text: &'a str) -> Self {
        Self {
            text,
            media: None,
            in_reply_to: None,
        }
    }

    pub fn with_media(text: &'a str, media: Option<&'a MediaPayload>) -> Self {
        Self {
            text,
            media,
            in_reply_to: None,
        }
    }

    pub fn replying_to(mut self, tweet_id: &'a str) -> Self {
        self.in_reply_to = Some(tweet_id);
        self
    }
}

/// What a thread upload left behind
///
/// A thread is not atomic: tweets published before a failure stay
/// published, and `ids` lists them in order.
#[derive(Debug)]
pub struct ThreadOutcome {
    pub ids: Vec<String>,
    pub error: Option<PostgateError>,
}

impl ThreadOutcome {
    pub fn completed(ids: Vec<String>) -> Self {
        Self { ids, error: None }
    }

    pub fn failed(ids: Vec<String>, error: impl Into<PostgateError>) -> Self {
        Self {
            ids,
            error: Some(error.into()),
        }
    }

    /// First published tweet, if any
    pub fn root_id(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }

    pub fn into_result(self) -> Result<Vec<String>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.ids),
        }
    }
}

#[async_trait]
pub trait TwitterPoster: Send + Sync {
    /// Post a single tweet and return its id
    async fn upload_tweet(&self, tweet: TweetRequest<'_>) -> Result<String>;

    /// Post tweets as a reply chain
    ///
    /// Each tweet after the first replies to the one before it; the first
    /// honours its own `in_reply_to`. Posting stops at the first failure.
    async fn upload_thread(&self, tweets: &[TweetRequest<'_>]) -> ThreadOutcome;
}

#[async_trait]
pub trait LinkedInPoster: Send + Sync {
    /// Create a text-only share and return its URN
    async fn create_text_post(&self, text: &str, post_to_organization: bool) -> Result<String>;

    /// Upload an image and create a share embedding it
    async fn create_image_post(
        &self,
        text: &str,
        image: &MediaPayload,
        post_to_organization: bool,
    ) -> Result<String>;
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download an image into memory
    async fn fetch(&self, image: &PostImage) -> Result<MediaPayload>;
}

/// Shared reqwest client with Postgate's timeout and user agent
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("postgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::Invalid(format!("Failed to build HTTP client: {}", e)).into())
}

/// Map a non-success HTTP response to a platform error
///
/// 401/403 become authentication failures, 429 a rate limit, everything else
/// an upload failure carrying the response body.
pub(crate) fn status_error(platform: &str, status: reqwest::StatusCode, body: &str) -> PlatformError {
    let detail = if body.trim().is_empty() {
        format!("{} API returned HTTP {}", platform, status)
    } else {
        format!("{} API returned HTTP {}: {}", platform, status, body.trim())
    };

    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(detail),
        429 => PlatformError::RateLimit(detail),
        _ => PlatformError::Upload(detail),
    }
}

/// Map a transport failure to a platform error
pub(crate) fn transport_error(platform: &str, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Network(format!("{} request timed out: {}", platform, error))
    } else {
        PlatformError::Network(format!("{} request failed: {}", platform, error))
    }
}
