//! Image download for media attachments

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::platforms::{http_client, MediaFetcher, MediaPayload};
use crate::types::PostImage;

/// Largest image accepted for upload (Twitter's image limit)
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Fetches images over HTTP(S)
pub struct HttpMediaFetcher {
    http: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client()?,
        })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, image: &PostImage) -> Result<MediaPayload> {
        debug!("Fetching image {}", image.image_url);

        let mut response = self
            .http
            .get(&image.image_url)
            .send()
            .await
            .map_err(|e| PlatformError::MediaFetch(format!("Failed to fetch {}: {}", image.image_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::MediaFetch(format!(
                "Failed to fetch {}: HTTP {}",
                image.image_url, status
            ))
            .into());
        }

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mime_type = resolve_mime_type(header_type.as_deref(), &image.mime_type)?;
        check_declared_length(response.content_length())?;

        // Bodies without a Content-Length are capped while reading
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PlatformError::MediaFetch(format!("Failed to read {}: {}", image.image_url, e)))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > MAX_IMAGE_BYTES {
                return Err(too_large(bytes.len()).into());
            }
        }
        check_size(bytes.len())?;

        Ok(MediaPayload { bytes, mime_type })
    }
}

/// Pick the content type from the response, falling back to the declared one
///
/// Parameters such as `; charset=binary` are dropped. Non-image types are
/// rejected so a link to an HTML page is never uploaded as media.
pub fn resolve_mime_type(header: Option<&str>, declared: &str) -> Result<String> {
    let from_header = header
        .and_then(|h| h.split(';').next())
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty() && h != "application/octet-stream");

    let mime = from_header.unwrap_or_else(|| declared.trim().to_lowercase());

    if !mime.starts_with("image/") {
        return Err(PlatformError::MediaFetch(format!(
            "Expected an image but the URL served '{}'",
            mime
        ))
        .into());
    }
    Ok(mime)
}

/// Reject a response whose Content-Length is already over the limit
fn check_declared_length(content_length: Option<u64>) -> Result<()> {
    match content_length {
        Some(len) if len > MAX_IMAGE_BYTES as u64 => Err(too_large(len as usize).into()),
        _ => Ok(()),
    }
}

fn check_size(len: usize) -> Result<()> {
    if len == 0 {
        return Err(PlatformError::MediaFetch("Image is empty".to_string()).into());
    }
    if len > MAX_IMAGE_BYTES {
        return Err(too_large(len).into());
    }
    Ok(())
}

fn too_large(len: usize) -> PlatformError {
    PlatformError::MediaFetch(format!(
        "Image is {} bytes, larger than the {} byte limit",
        len, MAX_IMAGE_BYTES
    ))
}
