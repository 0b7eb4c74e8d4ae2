//! Publish-time parsing and delay computation
//!
//! Schedule strings come from the command line and are resolved against an
//! explicit "now" so callers (and tests) control the clock:
//!
//! - `now`: publish immediately
//! - durations: `30m`, `2h`, `1 hour`
//! - natural language and absolute times: `tomorrow`, `2025-11-20 15:00`
//! - RFC 3339 timestamps: `2025-11-20T15:00:00Z`
//! - random windows: `random:10m-20m`

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::{PostgateError, Result};

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600;

/// A parsed schedule string, not yet tied to a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSpec {
    Now,
    After(Duration),
    RandomBetween(Duration, Duration),
    At(DateTime<Utc>),
}

impl ScheduleSpec {
    pub fn parse(input: &str, now: DateTime<Utc>) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(invalid("Schedule string cannot be empty"));
        }

        if input.eq_ignore_ascii_case("now") {
            return Ok(ScheduleSpec::Now);
        }

        if let Some(range) = input.strip_prefix("random:") {
            let (min, max) = range
                .split_once('-')
                .ok_or_else(|| invalid("Random format must be random:MIN-MAX"))?;
            let min = parse_duration(min)?;
            let max = parse_duration(max)?;
            check_random_window(min, max)?;
            return Ok(ScheduleSpec::RandomBetween(min, max));
        }

        if let Ok(duration) = parse_duration(input) {
            return Ok(ScheduleSpec::After(duration));
        }

        if let Ok(at) = DateTime::parse_from_rfc3339(input) {
            return Ok(ScheduleSpec::At(at.with_timezone(&Utc)));
        }

        chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us)
            .map(ScheduleSpec::At)
            .map_err(|_| invalid(&format!("Could not parse schedule string: {}", input)))
    }

    /// Concrete publish time relative to `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            ScheduleSpec::Now => now,
            ScheduleSpec::After(duration) => now + duration,
            ScheduleSpec::RandomBetween(min, max) => {
                let secs = rand::thread_rng().gen_range(min.num_seconds()..=max.num_seconds());
                now + Duration::try_seconds(secs).unwrap_or(min)
            }
            ScheduleSpec::At(at) => at,
        }
    }
}

/// Parse and resolve a schedule string in one step
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Ok(ScheduleSpec::parse(input, now)?.resolve(now))
}

/// Seconds to wait before publishing
///
/// `None` means immediate. A time in the past clamps to zero.
pub fn compute_delay(schedule_at: Option<i64>, now: i64) -> Option<u64> {
    schedule_at.map(|at| at.saturating_sub(now).max(0) as u64)
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input.trim())
        .map_err(|e| invalid(&format!("Could not parse duration '{}': {}", input, e)))?;
    let seconds = i64::try_from(std_duration.as_secs())
        .map_err(|_| invalid("Duration out of range"))?;
    Duration::try_seconds(seconds).ok_or_else(|| invalid("Duration out of range"))
}

fn check_random_window(min: Duration, max: Duration) -> Result<()> {
    if min.num_seconds() < MIN_RANDOM_SECONDS {
        return Err(invalid(&format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }
    if max.num_seconds() > MAX_RANDOM_SECONDS {
        return Err(invalid(&format!(
            "Maximum random interval must be at most {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }
    if min >= max {
        return Err(invalid("Minimum must be less than maximum"));
    }
    Ok(())
}

fn invalid(message: &str) -> PostgateError {
    PostgateError::InvalidInput(message.to_string())
}
