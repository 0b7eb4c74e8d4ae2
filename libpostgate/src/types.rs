//! Core types for Postgate

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{PostgateError, Result};

/// Social platforms a post is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Twitter,
    LinkedIn,
}

impl Provider {
    /// Every provider, in the order they are checked, merged and uploaded
    pub const ALL: [Provider; 2] = [Provider::Twitter, Provider::LinkedIn];

    /// Lowercase identifier used in storage and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Twitter => "twitter",
            Provider::LinkedIn => "linkedin",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Twitter => "Twitter",
            Provider::LinkedIn => "LinkedIn",
        }
    }

    /// Interrupt argument key for an interactive authorization URL
    pub fn url_arg_key(&self) -> &'static str {
        match self {
            Provider::Twitter => "authorizeTwitterURL",
            Provider::LinkedIn => "authorizeLinkedInURL",
        }
    }

    /// Interrupt argument key for an authorization docs link
    pub fn docs_arg_key(&self) -> &'static str {
        match self {
            Provider::Twitter => "twitterAuthorizationDocs",
            Provider::LinkedIn => "authorizationDocs",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Provider {
    type Err = PostgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Provider::Twitter),
            "linkedin" => Ok(Provider::LinkedIn),
            other => Err(PostgateError::InvalidInput(format!(
                "Unknown provider '{}'. Valid options: twitter, linkedin",
                other
            ))),
        }
    }
}

// ============================================================================
// Authorization
// ============================================================================

/// A provider's "authorization needed" request
///
/// Produced by the auth gate when credentials for a provider are missing.
/// Fields are private so a request cannot change after it was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    provider: Provider,
    authorization_url: Option<String>,
    authorization_docs_url: Option<String>,
    scopes: BTreeSet<String>,
    description: String,
}

impl AuthRequest {
    pub fn new(
        provider: Provider,
        authorization_url: Option<String>,
        authorization_docs_url: Option<String>,
        scopes: impl IntoIterator<Item = String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            authorization_url,
            authorization_docs_url,
            scopes: scopes.into_iter().collect(),
            description: description.into(),
        }
    }

    /// Request carrying an interactive broker URL
    pub fn with_url(
        provider: Provider,
        url: impl Into<String>,
        scopes: impl IntoIterator<Item = String>,
    ) -> Self {
        let url = url.into();
        let description = format!(
            "# Authorization Required\n\nPlease visit the following URL to authorize reading & posting to {}.\n\n{}",
            provider, url
        );
        Self::new(provider, Some(url), None, scopes, description)
    }

    /// Request pointing the operator at setup documentation
    pub fn with_docs(
        provider: Provider,
        docs_url: impl Into<String>,
        scopes: impl IntoIterator<Item = String>,
        detail: &str,
    ) -> Self {
        let docs_url = docs_url.into();
        let description = format!(
            "# Authorization Required\n\n{}\n\nPlease follow the authorization instructions [here]({}).\n\nOnce the credentials are set, accept this interrupt to continue.",
            detail, docs_url
        );
        Self::new(provider, None, Some(docs_url), scopes, description)
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn authorization_url(&self) -> Option<&str> {
        self.authorization_url.as_deref()
    }

    pub fn authorization_docs_url(&self) -> Option<&str> {
        self.authorization_docs_url.as_deref()
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Interrupt arguments contributed by this request
    ///
    /// Blank URL fields contribute nothing.
    pub fn args(&self) -> BTreeMap<String, String> {
        let mut args = BTreeMap::new();
        if let Some(url) = non_blank(self.authorization_url.as_deref()) {
            args.insert(self.provider.url_arg_key().to_string(), url.to_string());
        }
        if let Some(docs) = non_blank(self.authorization_docs_url.as_deref()) {
            args.insert(self.provider.docs_arg_key().to_string(), docs.to_string());
        }
        args
    }

    /// Whether a human can act on this request
    pub fn is_actionable(&self) -> bool {
        !self.args().is_empty()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Responses the operator may give to an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptConfig {
    pub allow_accept: bool,
    pub allow_ignore: bool,
    pub allow_respond: bool,
    pub allow_edit: bool,
}

impl InterruptConfig {
    /// Accept or ignore only
    pub fn binary_gate() -> Self {
        Self {
            allow_accept: true,
            allow_ignore: true,
            allow_respond: false,
            allow_edit: false,
        }
    }

    pub fn allows(&self, response: HumanResponse) -> bool {
        match response {
            HumanResponse::Accept => self.allow_accept,
            HumanResponse::Ignore => self.allow_ignore,
        }
    }
}

/// A paused-workflow request shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptEvent {
    pub description: String,
    pub action: String,
    pub args: BTreeMap<String, String>,
    pub config: InterruptConfig,
}

/// The operator's decision on a pending interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanResponse {
    Accept,
    Ignore,
}

impl HumanResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            HumanResponse::Accept => "accept",
            HumanResponse::Ignore => "ignore",
        }
    }
}

impl fmt::Display for HumanResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HumanResponse {
    type Err = PostgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(HumanResponse::Accept),
            "ignore" => Ok(HumanResponse::Ignore),
            "respond" | "edit" => Err(PostgateError::InvalidInput(format!(
                "'{}' is not allowed for authorization interrupts; use accept or ignore",
                s
            ))),
            other => Err(PostgateError::InvalidInput(format!(
                "Unknown response '{}'. Valid options: accept, ignore",
                other
            ))),
        }
    }
}

// ============================================================================
// Posts
// ============================================================================

/// A post split into a main body and a link-bearing reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexPost {
    pub main_post: String,
    pub reply_post: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostImage {
    pub image_url: String,
    pub mime_type: String,
}

/// A finished post waiting to be delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJob {
    pub post: String,
    #[serde(default)]
    pub complex_post: Option<ComplexPost>,
    #[serde(default)]
    pub image: Option<PostImage>,
    /// Unix timestamp to publish at; `None` publishes immediately
    #[serde(default)]
    pub schedule_at: Option<i64>,
}

impl PostJob {
    pub fn new(post: impl Into<String>) -> Self {
        Self {
            post: post.into(),
            complex_post: None,
            image: None,
            schedule_at: None,
        }
    }

    pub fn with_complex_post(mut self, main_post: impl Into<String>, reply_post: impl Into<String>) -> Self {
        self.complex_post = Some(ComplexPost {
            main_post: main_post.into(),
            reply_post: reply_post.into(),
        });
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.image = Some(PostImage {
            image_url: image_url.into(),
            mime_type: mime_type.into(),
        });
        self
    }

    pub fn with_schedule_at(mut self, timestamp: i64) -> Self {
        self.schedule_at = Some(timestamp);
        self
    }

    /// Reject jobs that cannot be uploaded
    pub fn validate(&self) -> Result<()> {
        if self.post.trim().is_empty() && self.complex_post.is_none() {
            return Err(PostgateError::InvalidInput("No post text found".to_string()));
        }
        if let Some(complex) = &self.complex_post {
            if complex.main_post.trim().is_empty() || complex.reply_post.trim().is_empty() {
                return Err(PostgateError::InvalidInput(
                    "Complex post requires both a main post and a reply post".to_string(),
                ));
            }
        }
        if let Some(image) = &self.image {
            if image.image_url.trim().is_empty() {
                return Err(PostgateError::InvalidInput(
                    "Image URL cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The shape used for thread-capable platforms
    pub fn content(&self) -> PostContent<'_> {
        match &self.complex_post {
            Some(complex) => PostContent::Thread(complex),
            None => PostContent::Single(&self.post),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostContent<'a> {
    Single(&'a str),
    Thread(&'a ComplexPost),
}

/// Per-run switches resolved when the run is created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    pub post_to_organization: bool,
    pub text_only: bool,
}

// ============================================================================
// Upload results
// ============================================================================

/// Outcome of delivering a post to one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub provider: Provider,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn success(provider: Provider) -> Self {
        Self {
            provider,
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(provider: Provider, error: impl Into<String>) -> Self {
        Self {
            provider,
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

/// Both provider results for one post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub twitter: UploadResult,
    pub linkedin: UploadResult,
}

impl UploadReport {
    pub fn get(&self, provider: Provider) -> &UploadResult {
        match provider {
            Provider::Twitter => &self.twitter,
            Provider::LinkedIn => &self.linkedin,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.twitter.succeeded && self.linkedin.succeeded
    }

    pub fn any_succeeded(&self) -> bool {
        self.twitter.succeeded || self.linkedin.succeeded
    }
}

// ============================================================================
// Durable runs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Scheduled,
    Running,
    /// Every provider succeeded
    Posted,
    /// At least one provider failed and at least one succeeded
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Scheduled => "scheduled",
            RunStatus::Running => "running",
            RunStatus::Posted => "posted",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    /// Final status for a finished upload
    pub fn from_report(report: &UploadReport) -> Self {
        if report.all_succeeded() {
            RunStatus::Posted
        } else if report.any_succeeded() {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PostgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(RunStatus::Scheduled),
            "running" => Ok(RunStatus::Running),
            "posted" => Ok(RunStatus::Posted),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            other => Err(PostgateError::InvalidInput(format!(
                "Unknown run status '{}'",
                other
            ))),
        }
    }
}

/// An upload run in the local run queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub thread_id: String,
    pub workflow: String,
    pub job: PostJob,
    pub flags: RunFlags,
    pub status: RunStatus,
    pub scheduled_for: i64,
    pub created_at: i64,
    pub error: Option<String>,
}

/// A pipeline run paused at the authorization gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub run_id: String,
    pub event: InterruptEvent,
    pub job: PostJob,
    pub flags: RunFlags,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
    pub response: Option<HumanResponse>,
}

impl PendingInterrupt {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Ledger row recording one provider attempt for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAttempt {
    pub run_id: String,
    pub provider: Provider,
    pub succeeded: bool,
    pub error: Option<String>,
    pub notified: bool,
    pub attempted_at: i64,
    /// Published main tweet of a thread, so a retry only sends the reply
    #[serde(default)]
    pub thread_root_id: Option<String>,
}
