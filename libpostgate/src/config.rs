//! Configuration management for Postgate
//!
//! All provider credentials, broker settings and posting switches live in a
//! single TOML file. Components receive the parsed [`Config`] (or the
//! sections they need) explicitly; only [`resolve_config_path`] consults the
//! process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::types::RunFlags;

/// Attribution line appended to every post
pub const DEFAULT_SIGNATURE: &str = "Made by the LangChain Community";

pub const DEFAULT_BROKER_URL: &str = "https://api.arcade.dev";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub broker: Option<BrokerConfig>,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub linkedin: LinkedInConfig,
    #[serde(default)]
    pub posting: PostingConfig,
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// How provider credentials are obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Tokens and secrets are set directly in the config file
    #[default]
    Direct,
    /// Tokens are issued by the auth broker for a named user
    Broker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Re-check credentials when an interrupt is accepted
    #[serde(default)]
    pub revalidate_on_resume: bool,
    /// Confirm direct-mode Twitter credentials with a signed API call
    #[serde(default = "default_verify_credentials")]
    pub verify_credentials: bool,
}

fn default_verify_credentials() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            revalidate_on_resume: false,
            verify_credentials: default_verify_credentials(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub api_key: String,
    #[serde(default = "default_broker_url")]
    pub base_url: String,
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// Broker user id
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub api_key_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_token_secret: Option<String>,
}

/// OAuth 1.0a user-context credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_key_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl TwitterConfig {
    /// All four direct credentials, if every one is set
    pub fn direct_credentials(&self) -> Option<TwitterCredentials> {
        Some(TwitterCredentials {
            api_key: present(&self.api_key)?.to_string(),
            api_key_secret: present(&self.api_key_secret)?.to_string(),
            access_token: present(&self.access_token)?.to_string(),
            access_token_secret: present(&self.access_token_secret)?.to_string(),
        })
    }

    /// Names of the direct credential fields that are unset
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("twitter.api_key", &self.api_key),
            ("twitter.api_key_secret", &self.api_key_secret),
            ("twitter.access_token", &self.access_token),
            ("twitter.access_token_secret", &self.access_token_secret),
        ]
        .into_iter()
        .filter(|(_, value)| present(value).is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn user_id(&self) -> Option<&str> {
        present(&self.user_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkedInConfig {
    /// Broker user id
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub person_urn: Option<String>,
    pub organization_id: Option<String>,
}

impl LinkedInConfig {
    /// An access token plus either a person URN or an organization id
    pub fn has_direct_credentials(&self) -> bool {
        present(&self.access_token).is_some()
            && (present(&self.person_urn).is_some() || present(&self.organization_id).is_some())
    }

    pub fn access_token(&self) -> Option<&str> {
        present(&self.access_token)
    }

    pub fn person_urn(&self) -> Option<&str> {
        present(&self.person_urn)
    }

    pub fn organization_id(&self) -> Option<&str> {
        present(&self.organization_id)
    }

    pub fn user_id(&self) -> Option<&str> {
        present(&self.user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingConfig {
    /// Disable all image handling
    #[serde(default)]
    pub text_only: bool,
    /// Post to the LinkedIn organization instead of the member profile
    #[serde(default)]
    pub post_to_organization: bool,
    #[serde(default = "default_signature")]
    pub signature: String,
}

fn default_signature() -> String {
    DEFAULT_SIGNATURE.to_string()
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            text_only: false,
            post_to_organization: false,
            signature: default_signature(),
        }
    }
}

impl PostingConfig {
    pub fn run_flags(&self) -> RunFlags {
        RunFlags {
            post_to_organization: self.post_to_organization,
            text_only: self.text_only,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub bot_token: String,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between queue polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    60
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/postgate/postgate.db".to_string(),
            },
            auth: AuthConfig::default(),
            broker: None,
            twitter: TwitterConfig::default(),
            linkedin: LinkedInConfig::default(),
            posting: PostingConfig::default(),
            slack: None,
            dispatch: DispatchConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.auth.mode == AuthMode::Broker {
            let broker = self
                .broker
                .as_ref()
                .ok_or_else(|| ConfigError::MissingField("broker".to_string()))?;
            if broker.api_key.trim().is_empty() {
                return Err(ConfigError::MissingField("broker.api_key".to_string()).into());
            }
        }
        if let Some(slack) = &self.slack {
            if slack.bot_token.trim().is_empty() {
                return Err(ConfigError::MissingField("slack.bot_token".to_string()).into());
            }
        }
        if self.dispatch.poll_interval == 0 {
            return Err(
                ConfigError::Invalid("dispatch.poll_interval must be at least 1".to_string()).into(),
            );
        }
        Ok(())
    }

    /// Slack channel to notify, when both a token and a channel are set
    pub fn slack_channel(&self) -> Option<(&str, &str)> {
        let slack = self.slack.as_ref()?;
        let channel = present(&slack.channel_id)?;
        Some((slack.bot_token.as_str(), channel))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTGATE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postgate").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("postgate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PostgateError;
    use serial_test::serial;

    const MINIMAL: &str = r#"
[database]
path = "/tmp/postgate.db"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.auth.mode, AuthMode::Direct);
        assert!(config.auth.verify_credentials);
        assert!(!config.posting.text_only);
        assert!(!config.posting.post_to_organization);
        assert_eq!(config.posting.signature, DEFAULT_SIGNATURE);
        assert_eq!(config.dispatch.poll_interval, 60);
        assert!(config.slack_channel().is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let config = Config::parse(
            r#"
[database]
path = "~/postgate.db"

[auth]
mode = "broker"
verify_credentials = false

[broker]
api_key = "arc_key"

[twitter]
user_id = "ops@example.com"

[linkedin]
user_id = "ops@example.com"
organization_id = "12345"

[posting]
text_only = true
post_to_organization = true

[slack]
bot_token = "xoxb-1"
channel_id = "C123"

[dispatch]
poll_interval = 15
"#,
        )
        .unwrap();

        assert_eq!(config.auth.mode, AuthMode::Broker);
        assert!(!config.auth.verify_credentials);
        assert_eq!(config.broker.as_ref().unwrap().base_url, DEFAULT_BROKER_URL);
        assert_eq!(config.twitter.user_id(), Some("ops@example.com"));
        assert_eq!(config.linkedin.organization_id(), Some("12345"));
        assert_eq!(
            config.posting.run_flags(),
            RunFlags { post_to_organization: true, text_only: true }
        );
        assert_eq!(config.slack_channel(), Some(("xoxb-1", "C123")));
        assert_eq!(config.dispatch.poll_interval, 15);
    }

    #[test]
    fn test_broker_mode_requires_broker_section() {
        let result = Config::parse(
            r#"
[database]
path = "/tmp/postgate.db"

[auth]
mode = "broker"
"#,
        );
        match result {
            Err(PostgateError::Config(ConfigError::MissingField(field))) => {
                assert_eq!(field, "broker")
            }
            other => panic!("Expected missing broker field, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = Config::parse(
            r#"
[database]
path = "/tmp/postgate.db"

[dispatch]
poll_interval = 0
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_twitter_direct_credentials_require_all_fields() {
        let mut twitter = TwitterConfig {
            api_key: Some("k".to_string()),
            api_key_secret: Some("s".to_string()),
            access_token: Some("t".to_string()),
            access_token_secret: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(twitter.direct_credentials().is_none());
        assert_eq!(twitter.missing_fields(), vec!["twitter.access_token_secret"]);

        twitter.access_token_secret = Some("ts".to_string());
        assert!(twitter.direct_credentials().is_some());
        assert!(twitter.missing_fields().is_empty());
    }

    #[test]
    fn test_linkedin_needs_token_and_identity() {
        let mut linkedin = LinkedInConfig {
            access_token: Some("tok".to_string()),
            ..Default::default()
        };
        assert!(!linkedin.has_direct_credentials());

        linkedin.organization_id = Some("987".to_string());
        assert!(linkedin.has_direct_credentials());

        linkedin.organization_id = None;
        linkedin.person_urn = Some("urn:li:person:abc".to_string());
        assert!(linkedin.has_direct_credentials());

        linkedin.access_token = None;
        assert!(!linkedin.has_direct_credentials());
    }

    #[test]
    fn test_slack_channel_requires_channel_id() {
        let mut config = Config::default_config();
        config.slack = Some(SlackConfig {
            bot_token: "xoxb".to_string(),
            channel_id: None,
        });
        assert!(config.slack_channel().is_none());
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var("POSTGATE_CONFIG", "/tmp/custom-postgate.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("POSTGATE_CONFIG");
        assert_eq!(path, PathBuf::from("/tmp/custom-postgate.toml"));
    }

    #[test]
    fn test_load_from_path_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.database.path, "/tmp/postgate.db");
    }

    #[test]
    fn test_load_from_missing_path_is_read_error() {
        let result = Config::load_from_path(Path::new("/nonexistent/postgate.toml"));
        assert!(matches!(
            result,
            Err(PostgateError::Config(ConfigError::ReadError(_)))
        ));
    }
}
