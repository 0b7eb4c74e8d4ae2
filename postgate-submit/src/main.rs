//! postgate-submit - Submit a post through the authorization gate

use anyhow::{Context, Result};
use clap::Parser;
use libpostgate::logging::LoggingConfig;
use libpostgate::scheduling::ScheduleSpec;
use libpostgate::{Config, PostJob, PostgateError, PostgateService, SubmitOutcome};
use std::io::{IsTerminal, Read};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "postgate-submit")]
#[command(version)]
#[command(about = "Submit a post to Twitter/X and LinkedIn")]
#[command(long_about = "\
postgate-submit - Submit a post to Twitter/X and LinkedIn

DESCRIPTION:
    postgate-submit checks that both accounts are authorized, then queues
    the post for postgate-send. If an account needs authorization, nothing
    is queued: the run pauses with a single interrupt listing every
    authorization link, and its run id is printed. Resolve it with
    `postgate-inbox accept <RUN_ID>` or `postgate-inbox ignore <RUN_ID>`.

USAGE:
    # Post text (or pipe it on stdin)
    postgate-submit \"Shipping today\"
    echo \"Shipping today\" | postgate-submit

    # A thread: main post plus a reply (LinkedIn gets both joined)
    postgate-submit --main \"Big news\" --reply \"Details here\"

    # With an image, published in two hours
    postgate-submit \"Look\" --image-url https://cdn.example.com/a.png --schedule 2h

SCHEDULE FORMATS:
    now, 30m, 2h, \"1 hour\", tomorrow, \"2025-11-20 15:00\",
    2025-11-20T15:00:00Z, random:10m-20m

CONFIGURATION:
    Configuration file: ~/.config/postgate/config.toml
    Override with POSTGATE_CONFIG.

EXIT CODES:
    0 - Post queued, or paused waiting for authorization
    1 - Runtime error
    2 - Authorization or configuration error
    3 - Invalid input
")]
struct Cli {
    /// Post text (reads from stdin if not provided)
    text: Option<String>,

    /// Main post of a two-part thread
    #[arg(long, requires = "reply", conflicts_with = "text")]
    main: Option<String>,

    /// Reply post of a two-part thread
    #[arg(long, requires = "main")]
    reply: Option<String>,

    /// Image to attach
    #[arg(long, value_name = "URL")]
    image_url: Option<String>,

    /// MIME type of the image
    #[arg(long, value_name = "TYPE", default_value = "image/png", requires = "image_url")]
    image_mime: String,

    /// When to publish (e.g. "30m", "tomorrow", "random:10m-20m")
    #[arg(short, long, value_name = "WHEN")]
    schedule: Option<String>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::for_binary(cli.verbose, "warn").init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<PostgateError>()
        .map(PostgateError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    if cli.format != "text" && cli.format != "json" {
        return Err(PostgateError::InvalidInput(format!(
            "Invalid format '{}'. Valid options: text, json",
            cli.format
        ))
        .into());
    }

    let job = build_job(&cli)?;
    job.validate()?;

    let config = Config::load().context("Failed to load configuration")?;
    let service = PostgateService::from_config(config).await?;
    debug!("Submitting post in {} mode", service.credentials_mode());

    let outcome = service.pipeline().submit(job).await?;
    print_outcome(&outcome, &cli.format)?;
    Ok(())
}

fn build_job(cli: &Cli) -> Result<PostJob> {
    let mut job = match (&cli.main, &cli.reply) {
        (Some(main), Some(reply)) => PostJob::new("").with_complex_post(main, reply),
        _ => PostJob::new(read_text(cli.text.as_deref())?),
    };

    if let Some(url) = &cli.image_url {
        job = job.with_image(url, &cli.image_mime);
    }

    if let Some(input) = &cli.schedule {
        let now = chrono::Utc::now();
        match ScheduleSpec::parse(input, now)? {
            ScheduleSpec::Now => {}
            spec => job = job.with_schedule_at(spec.resolve(now).timestamp()),
        }
    }

    Ok(job)
}

fn read_text(arg: Option<&str>) -> Result<String> {
    if let Some(text) = arg {
        return Ok(text.to_string());
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(PostgateError::InvalidInput(
            "No post text provided. Pass it as an argument or pipe it on stdin".to_string(),
        )
        .into());
    }

    let mut text = String::new();
    stdin
        .lock()
        .read_to_string(&mut text)
        .map_err(|e| PostgateError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(text.trim_end_matches('\n').to_string())
}

fn print_outcome(outcome: &SubmitOutcome, format: &str) -> Result<()> {
    match (outcome, format) {
        (SubmitOutcome::Scheduled(scheduled), "json") => {
            let value = serde_json::json!({
                "status": "scheduled",
                "run_id": scheduled.handle.run_id,
                "thread_id": scheduled.handle.thread_id,
                "scheduled_for": scheduled.scheduled_for,
                "delay_seconds": scheduled.delay_seconds,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        (SubmitOutcome::Scheduled(scheduled), _) => {
            println!(
                "scheduled:{}:{}",
                scheduled.handle.run_id, scheduled.scheduled_for
            );
        }
        (SubmitOutcome::AwaitingAuthorization { run_id, event }, "json") => {
            let value = serde_json::json!({
                "status": "awaiting_authorization",
                "run_id": run_id,
                "interrupt": event,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        (SubmitOutcome::AwaitingAuthorization { run_id, event }, _) => {
            eprintln!("{}\n", event.description);
            println!("awaiting_authorization:{}", run_id);
        }
    }
    Ok(())
}
