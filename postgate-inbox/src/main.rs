//! postgate-inbox - Review pending authorization interrupts and upload runs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libpostgate::error::AuthError;
use libpostgate::logging::LoggingConfig;
use libpostgate::{Config, HumanResponse, PostJob, PostgateError, PostgateService, RunStatus};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "postgate-inbox")]
#[command(version)]
#[command(about = "Review pending authorization interrupts and upload runs")]
#[command(long_about = "\
postgate-inbox - Review pending authorization interrupts and upload runs

DESCRIPTION:
    When postgate-submit finds an account that needs authorization, the run
    pauses with an interrupt. postgate-inbox lists those interrupts and lets
    you resolve each one exactly once:

        accept  Continue the run; the post is queued for postgate-send
        ignore  End the run; nothing is posted

    It also shows queued upload runs and can put a partial or failed run
    back in the queue. A retried run only posts to the providers that have
    not succeeded yet.

COMMANDS:
    list      List pending interrupts
    show      Show one interrupt with its authorization links
    accept    Accept an interrupt
    ignore    Ignore an interrupt
    runs      List upload runs
    retry     Requeue a partial or failed run

USAGE EXAMPLES:
    postgate-inbox list
    postgate-inbox show <RUN_ID>
    postgate-inbox accept <RUN_ID>
    postgate-inbox runs --status partial --format json
    postgate-inbox retry <RUN_ID>

CONFIGURATION:
    Configuration file: ~/.config/postgate/config.toml
    Override with POSTGATE_CONFIG.

EXIT CODES:
    0 - Success (including an ignored interrupt)
    1 - Operation failed
    2 - Authorization or configuration error
    3 - Invalid input (unknown or already resolved run id, bad option)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List pending interrupts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show a pending or resolved interrupt
    Show {
        run_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Accept an interrupt and queue the post
    Accept { run_id: String },

    /// Ignore an interrupt and end the run
    Ignore { run_id: String },

    /// List upload runs
    Runs {
        /// Only runs with this status (scheduled, running, posted, partial, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of runs
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Requeue a partial or failed run
    Retry { run_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::for_binary(cli.verbose, "warn").init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<PostgateError>()
            .map(PostgateError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let service = PostgateService::from_config(config).await?;

    match cli.command {
        Commands::List { format } => cmd_list(&service, &format).await,
        Commands::Show { run_id, format } => cmd_show(&service, &run_id, &format).await,
        Commands::Accept { run_id } => cmd_accept(&service, &run_id).await,
        Commands::Ignore { run_id } => cmd_ignore(&service, &run_id).await,
        Commands::Runs {
            status,
            limit,
            format,
        } => cmd_runs(&service, status.as_deref(), limit, &format).await,
        Commands::Retry { run_id } => cmd_retry(&service, &run_id).await,
    }
}

fn check_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(PostgateError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        ))
        .into());
    }
    Ok(())
}

async fn cmd_list(service: &PostgateService, format: &str) -> Result<()> {
    check_format(format)?;
    let pending = service.database().pending_interrupts().await?;
    debug!("{} pending interrupt(s)", pending.len());

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp();
    for interrupt in &pending {
        let mut providers: Vec<&str> = interrupt
            .event
            .args
            .keys()
            .map(|key| provider_label(key))
            .collect();
        providers.dedup();
        println!(
            "{} | {} | {} | {}",
            interrupt.run_id,
            truncate_content(preview(&interrupt.job), 40),
            providers.join(", "),
            format_age(now, interrupt.created_at)
        );
    }
    Ok(())
}

async fn cmd_show(service: &PostgateService, run_id: &str, format: &str) -> Result<()> {
    check_format(format)?;
    let interrupt = service
        .database()
        .get_pending_interrupt(run_id)
        .await?
        .ok_or_else(|| PostgateError::InvalidInput(format!("No interrupt with run id {}", run_id)))?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&interrupt)?);
        return Ok(());
    }

    println!("{}\n", interrupt.event.description);
    println!("Action: {}", interrupt.event.action);
    for (key, value) in &interrupt.event.args {
        println!("  {} = {}", key, value);
    }
    match interrupt.response {
        Some(response) => println!("Resolved: {}", response),
        None => println!("Resolved: no (respond with accept or ignore)"),
    }
    Ok(())
}

async fn cmd_accept(service: &PostgateService, run_id: &str) -> Result<()> {
    debug!(
        "Accepting interrupt {} ({:?} on resume)",
        run_id,
        service.pipeline().resume_policy()
    );
    let scheduled = service
        .pipeline()
        .resume(run_id, HumanResponse::Accept)
        .await?;
    println!(
        "scheduled:{}:{}",
        scheduled.handle.run_id, scheduled.scheduled_for
    );
    Ok(())
}

async fn cmd_ignore(service: &PostgateService, run_id: &str) -> Result<()> {
    debug!("Ignoring interrupt {}", run_id);
    match service
        .pipeline()
        .resume(run_id, HumanResponse::Ignore)
        .await
    {
        Err(PostgateError::Auth(AuthError::Denied)) => {
            println!("denied:{}", run_id);
            Ok(())
        }
        Err(e) => Err(e.into()),
        Ok(_) => Err(anyhow::anyhow!("run {} was scheduled after ignore", run_id)),
    }
}

async fn cmd_runs(
    service: &PostgateService,
    status: Option<&str>,
    limit: usize,
    format: &str,
) -> Result<()> {
    check_format(format)?;
    let status = status.map(str::parse::<RunStatus>).transpose()?;
    let runs = service.database().list_runs(status, limit).await?;
    debug!("Listing {} run(s) (status filter: {:?})", runs.len(), status);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    for run in &runs {
        println!(
            "{} | {} | {} | {}{}",
            run.run_id,
            run.status,
            format_timestamp(run.scheduled_for),
            truncate_content(preview(&run.job), 40),
            run.error
                .as_deref()
                .map(|e| format!(" | {}", e))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_retry(service: &PostgateService, run_id: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    debug!("Requeueing run {}", run_id);
    if !service.database().requeue_run(run_id, now).await? {
        return Err(PostgateError::InvalidInput(format!(
            "Run {} does not exist or is not partial/failed",
            run_id
        ))
        .into());
    }
    println!("requeued:{}", run_id);
    Ok(())
}

fn provider_label(arg_key: &str) -> &str {
    match arg_key {
        "authorizeTwitterURL" | "twitterAuthorizationDocs" => "Twitter",
        "authorizeLinkedInURL" | "authorizationDocs" => "LinkedIn",
        other => other,
    }
}

fn preview(job: &PostJob) -> &str {
    match &job.complex_post {
        Some(complex) => &complex.main_post,
        None => &job.post,
    }
}

/// Truncate to `max_chars` characters with an ellipsis, on one line
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_age(now: i64, created_at: i64) -> String {
    let minutes = (now - created_at).max(0) / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("{} minute{} ago", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "just now".to_string()
    }
}
