//! Auth broker client
//!
//! The broker runs OAuth flows on behalf of a named user and hands back
//! either an authorization URL for the user to visit or, once the user has
//! authorized, an access token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BrokerConfig;
use crate::error::{AuthError, Result};
use crate::platforms::http_client;
use crate::types::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerAuthStatus {
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAuthContext {
    #[serde(default)]
    pub token: Option<String>,
}

/// Reply to a `start_auth` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAuthResponse {
    pub status: BrokerAuthStatus,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub context: Option<BrokerAuthContext>,
}

impl BrokerAuthResponse {
    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            status: BrokerAuthStatus::Pending,
            url: Some(url.into()),
            context: None,
        }
    }

    pub fn completed(token: impl Into<String>) -> Self {
        Self {
            status: BrokerAuthStatus::Completed,
            url: None,
            context: Some(BrokerAuthContext {
                token: Some(token.into()),
            }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == BrokerAuthStatus::Completed
    }

    /// Authorization URL, ignoring blank values
    pub fn authorization_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn token(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|c| c.token.as_deref())
            .filter(|t| !t.is_empty())
    }
}

#[async_trait]
pub trait AuthBroker: Send + Sync {
    /// Start (or look up) an OAuth flow for `user_id` on `provider`
    ///
    /// Transport and API failures surface as [`AuthError::BrokerUnavailable`].
    async fn start_auth(
        &self,
        user_id: &str,
        provider: Provider,
        scopes: &[String],
    ) -> Result<BrokerAuthResponse>;
}

/// Arcade (`POST /v1/auth/authorize`) broker client
pub struct ArcadeBroker {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ArcadeBroker {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn provider_id(provider: Provider) -> &'static str {
        match provider {
            Provider::Twitter => "x",
            Provider::LinkedIn => "linkedin",
        }
    }

    /// Request body for an authorization request
    pub fn request_body(user_id: &str, provider: Provider, scopes: &[String]) -> serde_json::Value {
        serde_json::json!({
            "auth_requirement": {
                "provider_id": Self::provider_id(provider),
                "oauth2": { "scopes": scopes },
            },
            "user_id": user_id,
        })
    }
}

#[async_trait]
impl AuthBroker for ArcadeBroker {
    async fn start_auth(
        &self,
        user_id: &str,
        provider: Provider,
        scopes: &[String],
    ) -> Result<BrokerAuthResponse> {
        let url = format!("{}/v1/auth/authorize", self.base_url);
        debug!("Starting {} authorization for user {}", provider, user_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(user_id, provider, scopes))
            .send()
            .await
            .map_err(|e| AuthError::BrokerUnavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::BrokerUnavailable(format!(
                "broker returned HTTP {} for {} authorization: {}",
                status,
                provider,
                body.trim()
            ))
            .into());
        }

        let parsed = response.json::<BrokerAuthResponse>().await.map_err(|e| {
            AuthError::BrokerUnavailable(format!("unreadable broker response: {}", e))
        })?;

        debug!("Broker reported {:?} for {}", parsed.status, provider);
        Ok(parsed)
    }
}
