//! Twitter (X) API client
//!
//! Tweets go through the v2 `POST /2/tweets` endpoint. Media is uploaded
//! first and attached by id: user-context OAuth 1.0a credentials use the
//! v1.1 upload endpoint, broker-issued OAuth 2.0 tokens use the v2 one.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{CredentialProvider, TwitterAuth, TwitterVerifier};
use crate::config::TwitterCredentials;
use crate::error::{PlatformError, Result};
use crate::platforms::{
    http_client, oauth, status_error, transport_error, MediaPayload, ThreadOutcome, TweetRequest,
    TwitterPoster,
};

pub const TWITTER_API_BASE: &str = "https://api.x.com";
pub const TWITTER_UPLOAD_BASE: &str = "https://upload.twitter.com";

pub struct TwitterClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    api_base: String,
    upload_base: String,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

/// Accepts both the v1.1 (`media_id_string`) and v2 (`data.id`) shapes
#[derive(Deserialize)]
struct MediaUploadResponse {
    #[serde(default)]
    media_id_string: Option<String>,
    #[serde(default)]
    data: Option<UploadedMedia>,
}

#[derive(Deserialize)]
struct UploadedMedia {
    id: String,
}

impl TwitterClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            credentials,
            api_base: TWITTER_API_BASE.to_string(),
            upload_base: TWITTER_UPLOAD_BASE.to_string(),
        })
    }

    pub fn with_base_urls(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    fn media_upload_url(&self, auth: &TwitterAuth) -> String {
        match auth {
            TwitterAuth::OAuth1(_) => format!("{}/1.1/media/upload.json", self.upload_base),
            TwitterAuth::Bearer(_) => format!("{}/2/media/upload", self.api_base),
        }
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        auth: &TwitterAuth,
        method: &str,
        url: &str,
    ) -> Result<reqwest::RequestBuilder> {
        Ok(match auth {
            TwitterAuth::OAuth1(credentials) => request.header(
                AUTHORIZATION,
                oauth::authorization_header(credentials, method, url, &[])?,
            ),
            TwitterAuth::Bearer(token) => request.bearer_auth(token),
        })
    }

    async fn upload_media(&self, auth: &TwitterAuth, media: &MediaPayload) -> Result<String> {
        let url = self.media_upload_url(auth);
        let part = Part::bytes(media.bytes.clone())
            .file_name("media")
            .mime_str(&media.mime_type)
            .map_err(|e| PlatformError::Validation(format!("Invalid media type: {}", e)))?;
        let form = Form::new().part("media", part);

        let request = self.authorize(self.http.post(&url).multipart(form), auth, "POST", &url)?;
        let response = request.send().await.map_err(|e| transport_error("Twitter", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Twitter", status, &body).into());
        }

        let parsed: MediaUploadResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Upload(format!("Unreadable media upload response: {}", e)))?;

        let media_id = parsed
            .media_id_string
            .or(parsed.data.map(|d| d.id))
            .ok_or_else(|| PlatformError::Upload("Media upload returned no media id".to_string()))?;

        debug!("Uploaded {} bytes of media as {}", media.bytes.len(), media_id);
        Ok(media_id)
    }

    async fn create_tweet(
        &self,
        auth: &TwitterAuth,
        text: &str,
        media_id: Option<&str>,
        in_reply_to: Option<&str>,
    ) -> Result<String> {
        let url = format!("{}/2/tweets", self.api_base);
        let body = tweet_body(text, media_id, in_reply_to);

        let request = self.authorize(self.http.post(&url).json(&body), auth, "POST", &url)?;
        let response = request.send().await.map_err(|e| transport_error("Twitter", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Twitter", status, &body).into());
        }

        let parsed: CreateTweetResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Upload(format!("Unreadable tweet response: {}", e)))?;

        Ok(parsed.data.id)
    }

    async fn post_one(
        &self,
        auth: &TwitterAuth,
        tweet: &TweetRequest<'_>,
        in_reply_to: Option<&str>,
    ) -> Result<String> {
        let media_id = match tweet.media {
            Some(media) => Some(self.upload_media(auth, media).await?),
            None => None,
        };
        self.create_tweet(auth, tweet.text, media_id.as_deref(), in_reply_to)
            .await
    }
}

/// Signed `GET /2/users/me`, the cheapest call that proves OAuth 1.0a
/// credentials work
pub struct TwitterCredentialCheck {
    http: reqwest::Client,
    api_base: String,
}

impl TwitterCredentialCheck {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_base: TWITTER_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/2/users/me", self.api_base)
    }
}

#[async_trait]
impl TwitterVerifier for TwitterCredentialCheck {
    async fn verify(&self, credentials: &TwitterCredentials) -> Result<()> {
        let url = self.url();
        let header = oauth::authorization_header(credentials, "GET", &url, &[])?;

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| transport_error("Twitter", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Twitter", status, &body).into());
        }

        debug!("Twitter credentials verified");
        Ok(())
    }
}

/// JSON body for `POST /2/tweets`
pub fn tweet_body(text: &str, media_id: Option<&str>, in_reply_to: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({ "text": text });
    if let Some(id) = media_id {
        body["media"] = serde_json::json!({ "media_ids": [id] });
    }
    if let Some(id) = in_reply_to {
        body["reply"] = serde_json::json!({ "in_reply_to_tweet_id": id });
    }
    body
}

#[async_trait]
impl TwitterPoster for TwitterClient {
    async fn upload_tweet(&self, tweet: TweetRequest<'_>) -> Result<String> {
        let auth = self.credentials.twitter_auth().await?;
        let id = self.post_one(&auth, &tweet, tweet.in_reply_to).await?;
        info!("Posted tweet {}", id);
        Ok(id)
    }

    async fn upload_thread(&self, tweets: &[TweetRequest<'_>]) -> ThreadOutcome {
        if tweets.is_empty() {
            return ThreadOutcome::failed(
                Vec::new(),
                PlatformError::Validation("Thread has no tweets".to_string()),
            );
        }

        let auth = match self.credentials.twitter_auth().await {
            Ok(auth) => auth,
            Err(e) => return ThreadOutcome::failed(Vec::new(), e),
        };

        let mut ids: Vec<String> = Vec::with_capacity(tweets.len());
        for tweet in tweets {
            let parent = ids.last().map(String::as_str).or(tweet.in_reply_to);
            match self.post_one(&auth, tweet, parent).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!("Thread stopped after {} of {} tweets", ids.len(), tweets.len());
                    return ThreadOutcome::failed(ids, e);
                }
            }
        }

        info!("Posted thread of {} tweets starting at {}", ids.len(), ids[0]);
        ThreadOutcome::completed(ids)
    }
}
