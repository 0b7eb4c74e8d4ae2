//! LinkedIn API client (UGC posts and image assets)

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{CredentialProvider, LinkedInSession};
use crate::error::{PlatformError, Result};
use crate::platforms::{
    http_client, status_error, transport_error, LinkedInPoster, MediaPayload,
};

pub const LINKEDIN_API_BASE: &str = "https://api.linkedin.com";

pub struct LinkedInClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    api_base: String,
}

impl LinkedInClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            credentials,
            api_base: LINKEDIN_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// URN of the share author: the organization, or the member
    async fn author(&self, session: &LinkedInSession, post_to_organization: bool) -> Result<String> {
        if post_to_organization {
            return session
                .organization_id
                .as_deref()
                .map(organization_urn)
                .ok_or_else(|| {
                    PlatformError::Validation(
                        "Posting to an organization requires linkedin.organization_id".to_string(),
                    )
                    .into()
                });
        }

        if let Some(urn) = &session.person_urn {
            return Ok(urn.clone());
        }

        self.lookup_person_urn(&session.access_token).await
    }

    async fn lookup_person_urn(&self, access_token: &str) -> Result<String> {
        let url = format!("{}/v2/userinfo", self.api_base);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error("LinkedIn", e))?;

        let value = read_json(response).await?;
        let sub = value
            .get("sub")
            .and_then(|s| s.as_str())
            .ok_or_else(|| PlatformError::Authentication("LinkedIn userinfo returned no member id".to_string()))?;

        Ok(format!("urn:li:person:{}", sub))
    }

    async fn register_image(&self, session: &LinkedInSession, author: &str, image: &MediaPayload) -> Result<String> {
        let url = format!("{}/v2/assets?action=registerUpload", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&session.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&register_upload_body(author))
            .send()
            .await
            .map_err(|e| transport_error("LinkedIn", e))?;

        let value = read_json(response).await?;
        let upload_url = value
            .pointer("/value/uploadMechanism/com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest/uploadUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlatformError::Upload("LinkedIn registerUpload returned no upload URL".to_string()))?;
        let asset = value
            .pointer("/value/asset")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlatformError::Upload("LinkedIn registerUpload returned no asset".to_string()))?
            .to_string();

        let response = self
            .http
            .put(upload_url)
            .bearer_auth(&session.access_token)
            .header(reqwest::header::CONTENT_TYPE, image.mime_type.as_str())
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|e| transport_error("LinkedIn", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("LinkedIn", status, &body).into());
        }

        debug!("Uploaded image asset {}", asset);
        Ok(asset)
    }

    async fn create_share(&self, session: &LinkedInSession, body: serde_json::Value) -> Result<String> {
        let url = format!("{}/v2/ugcPosts", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&session.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("LinkedIn", e))?;

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let value = read_json(response).await?;
        let id = header_id
            .or_else(|| value.get("id").and_then(|v| v.as_str()).map(str::to_string))
            .ok_or_else(|| PlatformError::Upload("LinkedIn returned no share id".to_string()))?;

        Ok(id)
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let body = response.text().await.map_err(|e| transport_error("LinkedIn", e))?;

    if !status.is_success() {
        return Err(status_error("LinkedIn", status, &body).into());
    }
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| PlatformError::Upload(format!("Unreadable LinkedIn response: {}", e)).into())
}

pub fn organization_urn(organization_id: &str) -> String {
    format!("urn:li:organization:{}", organization_id)
}

/// JSON body for `POST /v2/ugcPosts`; `asset` switches the share to an image
pub fn share_body(author: &str, text: &str, asset: Option<&str>) -> serde_json::Value {
    let (category, media) = match asset {
        Some(asset) => (
            "IMAGE",
            serde_json::json!([{ "status": "READY", "media": asset }]),
        ),
        None => ("NONE", serde_json::json!([])),
    };

    let mut share = serde_json::json!({
        "shareCommentary": { "text": text },
        "shareMediaCategory": category,
    });
    if asset.is_some() {
        share["media"] = media;
    }

    serde_json::json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": { "com.linkedin.ugc.ShareContent": share },
        "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
    })
}

pub fn register_upload_body(owner: &str) -> serde_json::Value {
    serde_json::json!({
        "registerUploadRequest": {
            "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
            "owner": owner,
            "serviceRelationships": [{
                "relationshipType": "OWNER",
                "identifier": "urn:li:userGeneratedContent",
            }],
        }
    })
}

#[async_trait]
impl LinkedInPoster for LinkedInClient {
    async fn create_text_post(&self, text: &str, post_to_organization: bool) -> Result<String> {
        let session = self.credentials.linkedin_session().await?;
        let author = self.author(&session, post_to_organization).await?;

        let id = self.create_share(&session, share_body(&author, text, None)).await?;
        info!("Posted LinkedIn share {}", id);
        Ok(id)
    }

    async fn create_image_post(
        &self,
        text: &str,
        image: &MediaPayload,
        post_to_organization: bool,
    ) -> Result<String> {
        let session = self.credentials.linkedin_session().await?;
        let author = self.author(&session, post_to_organization).await?;

        let asset = self.register_image(&session, &author, image).await?;
        let id = self
            .create_share(&session, share_body(&author, text, Some(&asset)))
            .await?;
        info!("Posted LinkedIn image share {}", id);
        Ok(id)
    }
}
