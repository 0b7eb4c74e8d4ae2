//! Postgate - gated cross-posting to Twitter/X and LinkedIn
//!
//! A post only goes out once every target account is authorized. When an
//! account is not, the run stops with a single interrupt that lists every
//! authorization link, and waits for an operator to accept or ignore it.

pub mod auth;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod interrupt;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod platforms;
pub mod runs;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod types;
pub mod uploader;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{PostgateError, Result};
pub use pipeline::{Pipeline, ResumePolicy, SubmitOutcome};
pub use service::PostgateService;
pub use types::{HumanResponse, InterruptEvent, PostJob, Provider, RunStatus};
