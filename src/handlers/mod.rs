pub mod checkin;
pub mod history;
pub mod status;

use crate::bot::AppState;
use crate::commands::{Command, HELP_TEXT, START_TEXT, UNKNOWN_COMMAND_TEXT};
use crate::config::ConfigError;
use crate::format::escape_html;

/// Run a command and produce its reply text. Handlers never fail: upstream
/// and configuration problems come back as explanatory replies.
pub async fn dispatch(state: &AppState, command: Command) -> String {
    match command {
        Command::Start => START_TEXT.to_string(),
        Command::Help => HELP_TEXT.to_string(),
        Command::Status => status::report(state).await,
        Command::Checkin => checkin::trigger(state).await,
        Command::History => history::recent(state).await,
        Command::Unknown => UNKNOWN_COMMAND_TEXT.to_string(),
    }
}

fn not_configured(err: &ConfigError) -> String {
    format!(
        "⚙️ <b>Not configured</b>\n\n{}. Ask the bot owner to set it up.",
        escape_html(&err.to_string())
    )
}

fn failure(action: &str, err: &dyn std::fmt::Display) -> String {
    format!(
        "❌ <b>{}</b>\n\n<code>{}</code>",
        action,
        escape_html(&err.to_string())
    )
}
