//! Turns domain outcomes into protocol payloads.
//!
//! Domain and usage failures always become a [`ToolCallResult`] with
//! `isError: true`; only the dispatcher produces JSON-RPC error objects.

use crate::error::{Error, Result};
use crate::operations::DomainOutcome;
use crate::protocol::ToolCallResult;

/// Map the outcome of one tool call to its tool result.
pub fn tool_result(tool: &str, outcome: Result<DomainOutcome>) -> ToolCallResult {
    match outcome {
        Ok(outcome) => match render(&outcome) {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => ToolCallResult::error_text(format!(
                "{tool} succeeded but its result could not be serialized: {e}"
            )),
        },
        Err(e) => failure(tool, &e),
    }
}

/// Tool result for a failed call.
pub fn failure(tool: &str, error: &Error) -> ToolCallResult {
    ToolCallResult::error_text(format!("{tool} failed: {error}"))
}

/// Short human message describing a successful outcome.
pub fn success_message(outcome: &DomainOutcome) -> &'static str {
    match outcome {
        DomainOutcome::LoginStatus(_) => "login status checked",
        DomainOutcome::Published(_) => "content published",
        DomainOutcome::Feeds(_) => "feeds fetched",
        DomainOutcome::FeedDetail(_) => "feed detail fetched",
        DomainOutcome::UserProfile(_) => "user profile fetched",
        DomainOutcome::Commented(_) => "comment posted",
    }
}

fn render(outcome: &DomainOutcome) -> Result<String> {
    match outcome {
        DomainOutcome::Published(published) => Ok(format!(
            "Published \"{}\" with {} image(s): {}",
            published.title, published.images, published.status
        )),
        DomainOutcome::Commented(comment) => {
            Ok(format!("Comment posted - Feed ID: {}", comment.feed_id))
        }
        other => Ok(serde_json::to_string_pretty(&other.to_value()?)?),
    }
}
