//! Error types for Postgate

use thiserror::Error;

use crate::types::Provider;

pub type Result<T> = std::result::Result<T, PostgateError>;

#[derive(Error, Debug)]
pub enum PostgateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PostgateError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostgateError::InvalidInput(_) => 3,
            PostgateError::Auth(AuthError::NotPending(_)) => 3,
            PostgateError::Auth(_) => 2,
            PostgateError::Config(_) => 2,
            PostgateError::Platform(PlatformError::Authentication(_)) => 2,
            PostgateError::Platform(_) => 1,
            PostgateError::Database(_) => 1,
            PostgateError::Notification(_) => 1,
        }
    }

    /// Message suitable for an operator-facing report.
    ///
    /// Platform errors carry the upstream message verbatim, so the wrapping
    /// category prefix is dropped for them.
    pub fn message(&self) -> String {
        match self {
            PostgateError::Platform(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to (de)serialize stored record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt stored record: {0}")]
    Corrupt(String),
}

/// Failures that invalidate a whole pipeline run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Credentials missing for {0}")]
    CredentialsMissing(Provider),

    #[error("Authorization denied by user.")]
    Denied,

    #[error("User accepted authorization, but authorization is still needed for: {0}")]
    StillNeeded(String),

    #[error("Malformed interrupt: {0}")]
    MalformedInterrupt(String),

    #[error("Auth broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("No pending authorization for run {0}")]
    NotPending(String),
}

/// Failures scoped to a single platform
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Media fetch failed: {0}")]
    MediaFetch(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Content validation failed: {0}")]
    Validation(String),
}

impl PlatformError {
    /// The upstream message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            PlatformError::Authentication(m)
            | PlatformError::MediaFetch(m)
            | PlatformError::Upload(m)
            | PlatformError::Network(m)
            | PlatformError::RateLimit(m)
            | PlatformError::Validation(m) => m,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum NotificationError {
    #[error("Notification channel is not configured")]
    NotConfigured,

    #[error("Failed to deliver notification: {0}")]
    Delivery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = PostgateError::InvalidInput("Empty post".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authorization_errors() {
        assert_eq!(PostgateError::Auth(AuthError::Denied).exit_code(), 2);
        assert_eq!(
            PostgateError::Auth(AuthError::StillNeeded("Twitter".to_string())).exit_code(),
            2
        );
        assert_eq!(
            PostgateError::Auth(AuthError::MalformedInterrupt("empty".to_string())).exit_code(),
            2
        );
        assert_eq!(
            PostgateError::Auth(AuthError::NotPending("abc".to_string())).exit_code(),
            3
        );
    }

    #[test]
    fn test_exit_code_platform_errors() {
        let auth = PostgateError::Platform(PlatformError::Authentication("bad".to_string()));
        assert_eq!(auth.exit_code(), 2);

        let upload = PostgateError::Platform(PlatformError::Upload("500".to_string()));
        assert_eq!(upload.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = PostgateError::Config(ConfigError::MissingField("broker".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_error_message_formatting_denied() {
        let error = PostgateError::Auth(AuthError::Denied);
        assert_eq!(
            error.to_string(),
            "Authorization error: Authorization denied by user."
        );
    }

    #[test]
    fn test_message_strips_platform_prefix() {
        let error: PostgateError = PlatformError::RateLimit("rate limited".to_string()).into();
        assert_eq!(error.message(), "rate limited");
        assert_eq!(error.to_string(), "Platform error: Rate limit exceeded: rate limited");
    }

    #[test]
    fn test_message_keeps_other_errors_whole() {
        let error = PostgateError::InvalidInput("No post text found".to_string());
        assert_eq!(error.message(), "Invalid input: No post text found");
    }

    #[test]
    fn test_credentials_missing_names_provider() {
        let error = AuthError::CredentialsMissing(Provider::LinkedIn);
        assert_eq!(error.to_string(), "Credentials missing for LinkedIn");
    }

    #[test]
    fn test_error_conversion_from_auth_error() {
        let error: PostgateError = AuthError::BrokerUnavailable("timeout".to_string()).into();
        match error {
            PostgateError::Auth(AuthError::BrokerUnavailable(msg)) => assert_eq!(msg, "timeout"),
            _ => panic!("Expected PostgateError::Auth"),
        }
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "test",
        ));
        let error: PostgateError = db_error.into();
        assert!(matches!(error, PostgateError::Database(_)));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
