use serde_json::json;
use tracing::{info, warn};

use crate::bot::AppState;
use crate::format::escape_html;
use crate::github::GithubError;

use super::{failure, not_configured};

/// `event_type` the check-in workflow listens for.
pub const CHECKIN_EVENT_TYPE: &str = "manual-checkin";

pub const TRIGGERED_TEXT: &str = "🚀 <b>Check-in triggered!</b>\n\n\
    The workflow usually finishes within a couple of minutes.\n\
    Send /history afterwards to see the result.";

pub async fn trigger(state: &AppState) -> String {
    let github = match state.github() {
        Ok(github) => github,
        Err(e) => return not_configured(e),
    };

    match github
        .dispatch(CHECKIN_EVENT_TYPE, json!({"trigger": "telegram"}))
        .await
    {
        Ok(()) => {
            info!("Check-in dispatch accepted");
            TRIGGERED_TEXT.to_string()
        }
        Err(GithubError::Status { status, body }) => {
            warn!("Check-in dispatch rejected with HTTP {}", status);
            format!(
                "❌ <b>Failed to trigger check-in</b>\n\nHTTP {}: <code>{}</code>",
                status,
                escape_html(&body)
            )
        }
        Err(e) => {
            warn!("Check-in dispatch failed: {}", e);
            failure("Failed to trigger check-in", &e)
        }
    }
}
