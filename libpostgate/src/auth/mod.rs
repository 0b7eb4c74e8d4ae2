//! Authorization gate
//!
//! [`AuthGate`] checks each provider through the configured
//! [`CredentialProvider`] and never lets a run continue silently when an
//! account is unusable: the result is either `None` (ready) or an
//! [`AuthRequest`] describing what the operator must do.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::types::{AuthRequest, Provider};

pub mod broker;
pub mod credentials;

pub use broker::{ArcadeBroker, AuthBroker, BrokerAuthResponse, BrokerAuthStatus};
pub use credentials::{
    BrokeredCredentialProvider, CredentialProvider, DirectCredentialProvider, LinkedInSession,
    TwitterAuth, TwitterVerifier,
};

pub const TWITTER_AUTHORIZATION_DOCS_URL: &str =
    "https://developer.x.com/en/docs/authentication/oauth-1-0a/api-key-and-secret";

pub const LINKEDIN_AUTHORIZATION_DOCS_URL: &str =
    "https://learn.microsoft.com/en-us/linkedin/shared/authentication/authorization-code-flow";

/// Tweet lookup and posting
pub fn twitter_scopes() -> Vec<String> {
    ["tweet.read", "tweet.write", "users.read"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn linkedin_scopes(post_to_organization: bool) -> Vec<String> {
    let mut scopes = vec!["w_member_social".to_string()];
    if post_to_organization {
        scopes.push("w_organization_social".to_string());
    }
    scopes
}

pub struct AuthGate {
    credentials: Arc<dyn CredentialProvider>,
}

impl AuthGate {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { credentials }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(credentials::from_config(config)?))
    }

    pub fn credentials(&self) -> Arc<dyn CredentialProvider> {
        Arc::clone(&self.credentials)
    }

    pub async fn check_provider(&self, provider: Provider) -> Result<Option<AuthRequest>> {
        debug!("Checking {} credentials ({:?} mode)", provider, self.credentials.mode());

        let request = self.credentials.check(provider).await?;
        match &request {
            Some(_) => info!("{} requires authorization", provider),
            None => debug!("{} credentials are usable", provider),
        }
        Ok(request)
    }

    /// Check Twitter and LinkedIn concurrently
    ///
    /// Results come back in [`Provider::ALL`] order. Both checks always run
    /// to completion; if either fails, the first failure is returned.
    pub async fn check_all(&self) -> Result<Vec<Option<AuthRequest>>> {
        let (twitter, linkedin) = futures::join!(
            self.check_provider(Provider::Twitter),
            self.check_provider(Provider::LinkedIn)
        );

        for (provider, result) in [(Provider::Twitter, &twitter), (Provider::LinkedIn, &linkedin)] {
            if let Err(e) = result {
                warn!("{} credential check failed: {}", provider, e);
            }
        }

        Ok(vec![twitter?, linkedin?])
    }
}
