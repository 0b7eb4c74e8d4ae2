//! OAuth 1.0a request signing (HMAC-SHA1) for Twitter user-context calls

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use sha1::Sha1;

use crate::config::TwitterCredentials;
use crate::error::{PlatformError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Build the `Authorization` header for a request
///
/// `params` are the query or form parameters that take part in the
/// signature. JSON and multipart bodies are not signed, so callers pass an
/// empty slice for those.
pub fn authorization_header(
    credentials: &TwitterCredentials,
    method: &str,
    url: &str,
    params: &[(&str, &str)],
) -> Result<String> {
    let nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let timestamp = chrono::Utc::now().timestamp().to_string();

    sign(credentials, method, url, params, &nonce, &timestamp)
}

/// Deterministic signing with a caller-supplied nonce and timestamp
pub fn sign(
    credentials: &TwitterCredentials,
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> Result<String> {
    let mut oauth_params = vec![
        ("oauth_consumer_key", credentials.api_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp),
        ("oauth_token", credentials.access_token.as_str()),
        ("oauth_version", "1.0"),
    ];

    let base = signature_base_string(method, url, oauth_params.iter().chain(params.iter()));
    let key = format!(
        "{}&{}",
        urlencoding::encode(&credentials.api_key_secret),
        urlencoding::encode(&credentials.access_token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| PlatformError::Authentication(format!("Invalid OAuth signing key: {}", e)))?;
    mac.update(base.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    oauth_params.push(("oauth_signature", signature.as_str()));
    oauth_params.sort();

    let fields: Vec<String> = oauth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();

    Ok(format!("OAuth {}", fields.join(", ")))
}

/// `METHOD&url&params` with every component percent-encoded
pub fn signature_base_string<'a, I>(method: &str, url: &str, params: I) -> String
where
    I: IntoIterator<Item = &'a (&'a str, &'a str)>,
{
    let mut encoded: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        urlencoding::encode(url),
        urlencoding::encode(&param_string)
    )
}
