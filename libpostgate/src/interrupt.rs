//! Merging per-provider authorization requests into one operator interrupt

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{AuthError, PostgateError, Result};
use crate::types::{AuthRequest, HumanResponse, InterruptConfig, InterruptEvent};

pub const AUTHORIZE_ACTION: &str = "Authorize Social Media Accounts";

/// Description lines, in display order
const DESCRIPTION_LINES: [(&str, &str); 4] = [
    ("authorizeTwitterURL", "Twitter"),
    ("twitterAuthorizationDocs", "Twitter Authorization Docs"),
    ("authorizeLinkedInURL", "LinkedIn"),
    ("authorizationDocs", "LinkedIn Authorization Docs"),
];

pub struct InterruptAggregator;

impl InterruptAggregator {
    /// Combine gate results into a single interrupt
    ///
    /// Returns `None` when every provider is ready. Requests are merged in
    /// provider order (Twitter before LinkedIn); a key set twice keeps the
    /// later value. An interrupt with nothing for the operator to act on is
    /// a [`AuthError::MalformedInterrupt`].
    pub fn combine<I>(requests: I) -> Result<Option<InterruptEvent>>
    where
        I: IntoIterator<Item = Option<AuthRequest>>,
    {
        let mut pending: Vec<AuthRequest> = requests.into_iter().flatten().collect();
        if pending.is_empty() {
            return Ok(None);
        }

        // Stable, so same-provider requests keep their input order
        pending.sort_by_key(|r| r.provider());

        let mut args = BTreeMap::new();
        for request in &pending {
            args.extend(request.args());
        }

        if args.is_empty() {
            return Err(AuthError::MalformedInterrupt(
                "authorization requested but no actionable URL produced".to_string(),
            )
            .into());
        }

        debug!(
            "Combined {} authorization request(s) into {} argument(s)",
            pending.len(),
            args.len()
        );

        Ok(Some(InterruptEvent {
            description: describe(&args),
            action: AUTHORIZE_ACTION.to_string(),
            args,
            config: InterruptConfig::binary_gate(),
        }))
    }

    /// Apply the operator's decision
    ///
    /// `ignore` ends the run with [`AuthError::Denied`]; `accept` lets it
    /// continue.
    pub fn resolve(event: &InterruptEvent, response: HumanResponse) -> Result<()> {
        if !event.config.allows(response) {
            return Err(PostgateError::InvalidInput(format!(
                "'{}' is not allowed for this interrupt",
                response
            )));
        }
        match response {
            HumanResponse::Accept => Ok(()),
            HumanResponse::Ignore => Err(AuthError::Denied.into()),
        }
    }
}

fn describe(args: &BTreeMap<String, String>) -> String {
    let lines: Vec<String> = DESCRIPTION_LINES
        .iter()
        .filter_map(|(key, label)| args.get(*key).map(|value| format!("{}: {}", label, value)))
        .collect();

    format!(
        "# Authorization Required\n\nPlease visit the following URL(s) to authorize your social media accounts:\n\n{}\n\nOnce done, please 'accept' this interrupt event.",
        lines.join("\n\n")
    )
}
