use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::bot::AppState;
use crate::format::{display_timestamp, escape_html, short_time};
use crate::github::WorkflowRun;

use super::{failure, not_configured};

/// Entries shown by `/history`.
const HISTORY_LIMIT: usize = 5;

/// One check-in as recorded by the workflow, oldest first in the artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    #[serde(alias = "time")]
    pub timestamp: String,
    #[serde(default, alias = "results")]
    pub accounts: Vec<AccountOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountOutcome {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub balance: Option<Value>,
}

pub async fn recent(state: &AppState) -> String {
    let github = match state.github() {
        Ok(github) => github,
        Err(e) => return not_configured(e),
    };

    let path = &state.config.github.history_path;
    match github.fetch_json_file::<Vec<HistoryRecord>>(path).await {
        Ok(records) => format_history(&records),
        Err(e) if e.is_not_found() => {
            info!("No history artifact at {}, listing workflow runs", path);
            match github.list_runs(HISTORY_LIMIT as u8, None).await {
                Ok(runs) => format_runs(&runs),
                Err(e) => {
                    warn!("Listing workflow runs failed: {}", e);
                    failure("Failed to load check-in history", &e)
                }
            }
        }
        Err(e) => {
            warn!("Loading history artifact failed: {}", e);
            failure("Failed to load check-in history", &e)
        }
    }
}

fn balance_text(balance: &Value) -> Option<String> {
    match balance {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Newest first, at most [`HISTORY_LIMIT`] records.
pub fn format_history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "📜 No check-ins recorded yet.\n\nSend /checkin to run one.".to_string();
    }

    let mut lines = vec!["<b>📜 Recent Check-ins</b>".to_string(), String::new()];

    for record in records.iter().rev().take(HISTORY_LIMIT) {
        let time = escape_html(&display_timestamp(&record.timestamp));
        let total = record.accounts.len();
        if total == 0 {
            lines.push(format!("🕐 <code>{}</code>", time));
        } else {
            let ok = record.accounts.iter().filter(|a| a.success).count();
            let icon = if ok == total { "✅" } else if ok > 0 { "⚠️" } else { "❌" };
            lines.push(format!("🕐 <code>{}</code> {} {}/{}", time, icon, ok, total));
        }

        for (index, outcome) in record.accounts.iter().enumerate() {
            let icon = if outcome.success { "✅" } else { "❌" };
            let name = outcome
                .name
                .clone()
                .unwrap_or_else(|| format!("Account {}", index + 1));
            match outcome.balance.as_ref().and_then(balance_text) {
                Some(balance) => lines.push(format!(
                    "   {} {}: <code>{}</code>",
                    icon,
                    escape_html(&name),
                    escape_html(&balance)
                )),
                None => lines.push(format!("   {} {}", icon, escape_html(&name))),
            }
        }
        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}

/// Fallback listing when no history artifact exists.
pub fn format_runs(runs: &[WorkflowRun]) -> String {
    if runs.is_empty() {
        return "📜 No check-in runs found.\n\nSend /checkin to run one.".to_string();
    }

    let mut lines = vec!["<b>📜 Recent Check-in Runs</b>".to_string(), String::new()];

    for run in runs.iter().take(HISTORY_LIMIT) {
        let (icon, label) = match (run.conclusion.as_deref(), run.status.as_deref()) {
            (Some("success"), _) => ("✅", "success"),
            (Some(conclusion), _) => ("❌", conclusion),
            (None, Some(status)) => ("⏳", status),
            (None, None) => ("⏳", "pending"),
        };
        lines.push(format!(
            "{} <code>{}</code> {}",
            icon,
            short_time(&run.created_at),
            escape_html(label)
        ));
    }

    lines.join("\n")
}
