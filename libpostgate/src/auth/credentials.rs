//! Credential providers
//!
//! A [`CredentialProvider`] answers two questions per provider: "is this
//! account usable?" (returning an [`AuthRequest`] when it is not) and "give
//! me a session to upload with". Two implementations exist:
//!
//! - [`DirectCredentialProvider`]: tokens and secrets come from the config
//!   file; missing or rejected values produce a documentation-link request
//! - [`BrokeredCredentialProvider`]: tokens come from the auth broker for a
//!   configured user id; missing authorization produces a broker URL

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::auth::broker::{AuthBroker, BrokerAuthResponse, BrokerAuthStatus};
use crate::auth::{
    linkedin_scopes, twitter_scopes, LINKEDIN_AUTHORIZATION_DOCS_URL,
    TWITTER_AUTHORIZATION_DOCS_URL,
};
use crate::config::{AuthMode, Config, LinkedInConfig, TwitterCredentials, TwitterConfig};
use crate::error::{AuthError, ConfigError, PlatformError, PostgateError, Result};
use crate::platforms::twitter::TwitterCredentialCheck;
use crate::types::{AuthRequest, Provider};

/// How Twitter requests are authorized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwitterAuth {
    /// User-context OAuth 1.0a with app and user secrets
    OAuth1(TwitterCredentials),
    /// OAuth 2.0 user token issued by the broker
    Bearer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedInSession {
    pub access_token: String,
    /// `urn:li:person:...`; looked up from the token when absent
    pub person_urn: Option<String>,
    pub organization_id: Option<String>,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn mode(&self) -> AuthMode;

    /// `None` when the provider is usable, otherwise what the operator must do
    async fn check(&self, provider: Provider) -> Result<Option<AuthRequest>>;

    async fn twitter_auth(&self) -> Result<TwitterAuth>;

    async fn linkedin_session(&self) -> Result<LinkedInSession>;
}

/// Confirms that configured Twitter credentials are accepted by the API
#[async_trait]
pub trait TwitterVerifier: Send + Sync {
    /// `PlatformError::Authentication` when the API rejects the credentials;
    /// any other error means the check itself could not be made
    async fn verify(&self, credentials: &TwitterCredentials) -> Result<()>;
}

/// Build the provider selected by `[auth] mode`
pub fn from_config(config: &Config) -> Result<Arc<dyn CredentialProvider>> {
    match config.auth.mode {
        AuthMode::Direct => Ok(Arc::new(DirectCredentialProvider::from_config(config)?)),
        AuthMode::Broker => {
            let broker_config = config
                .broker
                .as_ref()
                .ok_or_else(|| ConfigError::MissingField("broker".to_string()))?;
            let broker = crate::auth::broker::ArcadeBroker::new(broker_config)?;
            Ok(Arc::new(BrokeredCredentialProvider::from_config(
                config,
                Arc::new(broker),
            )))
        }
    }
}

// ============================================================================
// Direct
// ============================================================================

pub struct DirectCredentialProvider {
    twitter: TwitterConfig,
    linkedin: LinkedInConfig,
    post_to_organization: bool,
    verifier: Option<Arc<dyn TwitterVerifier>>,
}

impl DirectCredentialProvider {
    /// Presence checks only; see [`with_verifier`](Self::with_verifier)
    pub fn new(twitter: TwitterConfig, linkedin: LinkedInConfig, post_to_organization: bool) -> Self {
        Self {
            twitter,
            linkedin,
            post_to_organization,
            verifier: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TwitterVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = Self::new(
            config.twitter.clone(),
            config.linkedin.clone(),
            config.posting.post_to_organization,
        );
        if !config.auth.verify_credentials {
            return Ok(provider);
        }
        Ok(provider.with_verifier(Arc::new(TwitterCredentialCheck::new()?)))
    }

    fn twitter_request(&self, detail: &str) -> AuthRequest {
        AuthRequest::with_docs(
            Provider::Twitter,
            TWITTER_AUTHORIZATION_DOCS_URL,
            twitter_scopes(),
            detail,
        )
    }

    async fn check_twitter(&self) -> Result<Option<AuthRequest>> {
        let Some(credentials) = self.twitter.direct_credentials() else {
            return Ok(Some(self.twitter_request(&format!(
                "Missing Twitter credentials: {}.",
                self.twitter.missing_fields().join(", ")
            ))));
        };

        let Some(verifier) = &self.verifier else {
            return Ok(None);
        };

        match verifier.verify(&credentials).await {
            Ok(()) => {
                debug!("Twitter accepted the configured credentials");
                Ok(None)
            }
            Err(PostgateError::Platform(PlatformError::Authentication(detail))) => Ok(Some(
                self.twitter_request(&format!("Twitter rejected the configured credentials: {}", detail)),
            )),
            Err(e) => Err(e),
        }
    }

    fn linkedin_detail(&self) -> String {
        let mut missing = Vec::new();
        if self.linkedin.access_token().is_none() {
            missing.push("linkedin.access_token");
        }
        if self.linkedin.person_urn().is_none() && self.linkedin.organization_id().is_none() {
            missing.push("linkedin.person_urn or linkedin.organization_id");
        }
        format!("Missing LinkedIn credentials: {}.", missing.join(", "))
    }
}

#[async_trait]
impl CredentialProvider for DirectCredentialProvider {
    fn mode(&self) -> AuthMode {
        AuthMode::Direct
    }

    async fn check(&self, provider: Provider) -> Result<Option<AuthRequest>> {
        let request = match provider {
            Provider::Twitter => self.check_twitter().await?,
            Provider::LinkedIn => {
                if self.linkedin.has_direct_credentials() {
                    None
                } else {
                    Some(AuthRequest::with_docs(
                        Provider::LinkedIn,
                        LINKEDIN_AUTHORIZATION_DOCS_URL,
                        linkedin_scopes(self.post_to_organization),
                        &self.linkedin_detail(),
                    ))
                }
            }
        };
        Ok(request)
    }

    async fn twitter_auth(&self) -> Result<TwitterAuth> {
        self.twitter
            .direct_credentials()
            .map(TwitterAuth::OAuth1)
            .ok_or_else(|| {
                PlatformError::Authentication(format!(
                    "Twitter credentials are not configured (missing: {})",
                    self.twitter.missing_fields().join(", ")
                ))
                .into()
            })
    }

    async fn linkedin_session(&self) -> Result<LinkedInSession> {
        let access_token = self.linkedin.access_token().ok_or_else(|| {
            PlatformError::Authentication("LinkedIn access token is not configured".to_string())
        })?;

        Ok(LinkedInSession {
            access_token: access_token.to_string(),
            person_urn: self.linkedin.person_urn().map(str::to_string),
            organization_id: self.linkedin.organization_id().map(str::to_string),
        })
    }
}

// ============================================================================
// Brokered
// ============================================================================

pub struct BrokeredCredentialProvider {
    broker: Arc<dyn AuthBroker>,
    twitter_user_id: Option<String>,
    linkedin_user_id: Option<String>,
    organization_id: Option<String>,
    post_to_organization: bool,
}

impl BrokeredCredentialProvider {
    pub fn new(
        broker: Arc<dyn AuthBroker>,
        twitter_user_id: Option<String>,
        linkedin_user_id: Option<String>,
        organization_id: Option<String>,
        post_to_organization: bool,
    ) -> Self {
        Self {
            broker,
            twitter_user_id,
            linkedin_user_id,
            organization_id,
            post_to_organization,
        }
    }

    pub fn from_config(config: &Config, broker: Arc<dyn AuthBroker>) -> Self {
        Self::new(
            broker,
            config.twitter.user_id().map(str::to_string),
            config.linkedin.user_id().map(str::to_string),
            config.linkedin.organization_id().map(str::to_string),
            config.posting.post_to_organization,
        )
    }

    fn user_id(&self, provider: Provider) -> Result<&str> {
        let (value, field) = match provider {
            Provider::Twitter => (&self.twitter_user_id, "twitter.user_id"),
            Provider::LinkedIn => (&self.linkedin_user_id, "linkedin.user_id"),
        };
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingField(field.to_string()).into())
    }

    fn scopes(&self, provider: Provider) -> Vec<String> {
        match provider {
            Provider::Twitter => twitter_scopes(),
            Provider::LinkedIn => linkedin_scopes(self.post_to_organization),
        }
    }

    async fn start(&self, provider: Provider) -> Result<BrokerAuthResponse> {
        let user_id = self.user_id(provider)?;
        self.broker
            .start_auth(user_id, provider, &self.scopes(provider))
            .await
    }

    async fn token(&self, provider: Provider) -> Result<String> {
        let response = self.start(provider).await?;
        match response.token() {
            Some(token) if response.is_completed() => Ok(token.to_string()),
            _ => Err(PlatformError::Authentication(format!(
                "{} authorization with the auth broker is not complete",
                provider
            ))
            .into()),
        }
    }
}

#[async_trait]
impl CredentialProvider for BrokeredCredentialProvider {
    fn mode(&self) -> AuthMode {
        AuthMode::Broker
    }

    async fn check(&self, provider: Provider) -> Result<Option<AuthRequest>> {
        let response = self.start(provider).await?;

        if response.is_completed() {
            debug!("{} already authorized with the broker", provider);
            return Ok(None);
        }

        match response.authorization_url() {
            Some(url) => Ok(Some(AuthRequest::with_url(
                provider,
                url,
                self.scopes(provider),
            ))),
            None if response.status == BrokerAuthStatus::Failed => {
                Err(AuthError::BrokerUnavailable(format!(
                    "broker reported a failed {} authorization",
                    provider
                ))
                .into())
            }
            None => Err(AuthError::BrokerUnavailable(format!(
                "broker returned no authorization URL for {}",
                provider
            ))
            .into()),
        }
    }

    async fn twitter_auth(&self) -> Result<TwitterAuth> {
        Ok(TwitterAuth::Bearer(self.token(Provider::Twitter).await?))
    }

    async fn linkedin_session(&self) -> Result<LinkedInSession> {
        Ok(LinkedInSession {
            access_token: self.token(Provider::LinkedIn).await?,
            person_urn: None,
            organization_id: self.organization_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockBroker, MockVerifier};

    fn full_twitter() -> TwitterConfig {
        TwitterConfig {
            user_id: None,
            api_key: Some("key".to_string()),
            api_key_secret: Some("secret".to_string()),
            access_token: Some("token".to_string()),
            access_token_secret: Some("token-secret".to_string()),
        }
    }

    fn full_linkedin() -> LinkedInConfig {
        LinkedInConfig {
            user_id: None,
            access_token: Some("li-token".to_string()),
            person_urn: Some("urn:li:person:abc".to_string()),
            organization_id: None,
        }
    }

    #[tokio::test]
    async fn test_direct_complete_credentials_pass() {
        let provider = DirectCredentialProvider::new(full_twitter(), full_linkedin(), false);
        assert!(provider.check(Provider::Twitter).await.unwrap().is_none());
        assert!(provider.check(Provider::LinkedIn).await.unwrap().is_none());
        assert!(matches!(
            provider.twitter_auth().await.unwrap(),
            TwitterAuth::OAuth1(_)
        ));
    }

    #[tokio::test]
    async fn test_direct_verified_credentials_pass() {
        let verifier = MockVerifier::accept();
        let provider = DirectCredentialProvider::new(full_twitter(), full_linkedin(), false)
            .with_verifier(Arc::new(verifier.clone()));

        assert!(provider.check(Provider::Twitter).await.unwrap().is_none());
        assert_eq!(verifier.checked(), vec!["key".to_string()]);
    }

    #[tokio::test]
    async fn test_direct_rejected_credentials_give_docs_request() {
        let provider = DirectCredentialProvider::new(full_twitter(), full_linkedin(), false)
            .with_verifier(Arc::new(MockVerifier::reject("Twitter API returned HTTP 401 Unauthorized")));

        let request = provider.check(Provider::Twitter).await.unwrap().unwrap();
        assert_eq!(
            request.authorization_docs_url(),
            Some(TWITTER_AUTHORIZATION_DOCS_URL)
        );
        assert!(request.description().contains("HTTP 401 Unauthorized"));
        assert!(request.is_actionable());
    }

    #[tokio::test]
    async fn test_direct_verification_outage_propagates() {
        let provider = DirectCredentialProvider::new(full_twitter(), full_linkedin(), false)
            .with_verifier(Arc::new(MockVerifier::unreachable("Twitter request timed out")));

        let error = provider.check(Provider::Twitter).await.unwrap_err();
        assert!(matches!(
            error,
            PostgateError::Platform(PlatformError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_missing_fields_skip_verification() {
        let verifier = MockVerifier::accept();
        let provider =
            DirectCredentialProvider::new(TwitterConfig::default(), full_linkedin(), false)
                .with_verifier(Arc::new(verifier.clone()));

        assert!(provider.check(Provider::Twitter).await.unwrap().is_some());
        assert!(verifier.checked().is_empty());
    }

    #[tokio::test]
    async fn test_direct_missing_twitter_secret_gives_docs_request() {
        let mut twitter = full_twitter();
        twitter.access_token_secret = None;
        let provider = DirectCredentialProvider::new(twitter, full_linkedin(), false);

        let request = provider.check(Provider::Twitter).await.unwrap().unwrap();
        assert_eq!(request.provider(), Provider::Twitter);
        assert_eq!(request.authorization_url(), None);
        assert_eq!(
            request.authorization_docs_url(),
            Some(TWITTER_AUTHORIZATION_DOCS_URL)
        );
        assert!(request.description().contains("twitter.access_token_secret"));
        assert!(request.is_actionable());

        assert!(provider.twitter_auth().await.is_err());
    }

    #[tokio::test]
    async fn test_direct_linkedin_needs_urn_or_org() {
        let mut linkedin = full_linkedin();
        linkedin.person_urn = None;
        let provider = DirectCredentialProvider::new(full_twitter(), linkedin.clone(), true);

        let request = provider.check(Provider::LinkedIn).await.unwrap().unwrap();
        assert!(request.scopes().contains("w_organization_social"));
        assert!(request.scopes().contains("w_member_social"));

        linkedin.organization_id = Some("12345".to_string());
        let provider = DirectCredentialProvider::new(full_twitter(), linkedin, true);
        assert!(provider.check(Provider::LinkedIn).await.unwrap().is_none());

        let session = provider.linkedin_session().await.unwrap();
        assert_eq!(session.organization_id.as_deref(), Some("12345"));
    }

    #[tokio::test]
    async fn test_brokered_pending_yields_url_request() {
        let broker = MockBroker::new()
            .with_response(Provider::Twitter, BrokerAuthResponse::pending("https://broker/x"));
        let provider = BrokeredCredentialProvider::new(
            Arc::new(broker.clone()),
            Some("alice".to_string()),
            None,
            None,
            false,
        );

        let request = provider.check(Provider::Twitter).await.unwrap().unwrap();
        assert_eq!(request.authorization_url(), Some("https://broker/x"));
        assert!(request.scopes().contains("tweet.write"));

        let calls = broker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "alice");
        assert_eq!(calls[0].1, Provider::Twitter);
    }

    #[tokio::test]
    async fn test_brokered_completed_is_authorized() {
        let broker = MockBroker::new()
            .with_response(Provider::LinkedIn, BrokerAuthResponse::completed("li-token"));
        let provider = BrokeredCredentialProvider::new(
            Arc::new(broker),
            None,
            Some("alice".to_string()),
            Some("999".to_string()),
            true,
        );

        assert!(provider.check(Provider::LinkedIn).await.unwrap().is_none());
        let session = provider.linkedin_session().await.unwrap();
        assert_eq!(session.access_token, "li-token");
        assert_eq!(session.organization_id.as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn test_brokered_missing_user_id_is_config_error() {
        let provider =
            BrokeredCredentialProvider::new(Arc::new(MockBroker::new()), None, None, None, false);

        let error = provider.check(Provider::Twitter).await.unwrap_err();
        assert!(matches!(
            error,
            PostgateError::Config(ConfigError::MissingField(ref f)) if f == "twitter.user_id"
        ));
    }

    #[tokio::test]
    async fn test_brokered_pending_without_url_is_unavailable() {
        let broker = MockBroker::new().with_response(
            Provider::Twitter,
            BrokerAuthResponse {
                status: BrokerAuthStatus::Pending,
                url: None,
                context: None,
            },
        );
        let provider = BrokeredCredentialProvider::new(
            Arc::new(broker),
            Some("alice".to_string()),
            None,
            None,
            false,
        );

        let error = provider.check(Provider::Twitter).await.unwrap_err();
        assert!(matches!(
            error,
            PostgateError::Auth(AuthError::BrokerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_brokered_failure_propagates() {
        let broker = MockBroker::new().unavailable("connection refused");
        let provider = BrokeredCredentialProvider::new(
            Arc::new(broker),
            Some("alice".to_string()),
            Some("alice".to_string()),
            None,
            false,
        );

        let error = provider.check(Provider::LinkedIn).await.unwrap_err();
        assert!(error.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_brokered_incomplete_token_is_platform_auth_error() {
        let broker = MockBroker::new()
            .with_response(Provider::Twitter, BrokerAuthResponse::pending("https://broker/x"));
        let provider = BrokeredCredentialProvider::new(
            Arc::new(broker),
            Some("alice".to_string()),
            None,
            None,
            false,
        );

        let error = provider.twitter_auth().await.unwrap_err();
        assert!(matches!(
            error,
            PostgateError::Platform(PlatformError::Authentication(_))
        ));
    }
}
