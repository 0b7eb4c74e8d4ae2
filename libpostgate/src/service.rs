//! Service facade for Postgate
//!
//! [`PostgateService`] wires the database, credentials, notifier and HTTP
//! clients together from a [`Config`], so the `postgate-*` binaries share one
//! construction path.
//!
//! ```no_run
//! use libpostgate::service::PostgateService;
//! use libpostgate::types::PostJob;
//!
//! # async fn example() -> libpostgate::Result<()> {
//! let service = PostgateService::new().await?;
//! let outcome = service.pipeline().submit(PostJob::new("Hello")).await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::debug;

use crate::auth::{credentials, AuthGate, CredentialProvider};
use crate::config::Config;
use crate::db::Database;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::notify::Notifier;
use crate::pipeline::{Pipeline, ResumePolicy};
use crate::runs::LocalRunQueue;
use crate::scheduler::PostScheduler;
use crate::uploader::Uploader;

pub struct PostgateService {
    config: Arc<Config>,
    db: Database,
    pipeline: Pipeline,
    dispatcher: Dispatcher,
}

impl PostgateService {
    /// Build the service from the default configuration file
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Build the service from an already loaded configuration
    ///
    /// Opens (and migrates) the database. No network request is made here.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let credentials = credentials::from_config(&config)?;
        let notifier = Notifier::from_config(&config)?;
        debug!(
            "Credentials mode {:?}, notifications {}",
            credentials.mode(),
            if notifier.is_configured() { "on" } else { "off" }
        );

        let scheduler = PostScheduler::new(Arc::new(LocalRunQueue::new(db.clone())), notifier.clone());
        let policy = if config.auth.revalidate_on_resume {
            ResumePolicy::Revalidate
        } else {
            ResumePolicy::TrustOnResume
        };
        let pipeline = Pipeline::new(
            AuthGate::new(Arc::clone(&credentials)),
            scheduler,
            db.clone(),
            config.posting.run_flags(),
        )
        .with_resume_policy(policy);

        let uploader = Uploader::from_config(&config, credentials, notifier)?;
        let dispatcher = Dispatcher::new(db.clone(), Arc::new(uploader));

        Ok(Self {
            config: Arc::new(config),
            db,
            pipeline,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Submit and resume gated posts
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Execute due runs
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The credential mode in effect, for diagnostics
    pub fn credentials_mode(&self) -> &'static str {
        match self.config.auth.mode {
            crate::config::AuthMode::Direct => "direct",
            crate::config::AuthMode::Broker => "broker",
        }
    }
}
