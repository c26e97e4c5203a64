use chrono::Utc;
use tracing::{debug, info, warn};

use crate::balance::cookies::WafCookieStore;
use crate::balance::{format_report, AccountBalance};
use crate::bot::AppState;
use crate::config::StatusMode;
use crate::format::{escape_html, short_time};
use crate::github::{Job, WorkflowRun};

use super::{failure, not_configured};

pub async fn report(state: &AppState) -> String {
    match state.config.status.mode {
        StatusMode::Balance => balance_report(state).await,
        StatusMode::Runs => latest_run_report(state).await,
    }
}

/// The WAF cookie cache is optional: without GitHub access, or when the file
/// is absent, balances are queried with account cookies only.
async fn load_cookie_store(state: &AppState) -> (Option<WafCookieStore>, Option<String>) {
    let github = match state.github() {
        Ok(github) => github,
        Err(e) => {
            debug!("Skipping WAF cookie cache: {}", e);
            return (None, None);
        }
    };

    let path = &state.config.github.waf_cookies_path;
    match github.fetch_json_file::<WafCookieStore>(path).await {
        Ok(store) => (Some(store), None),
        Err(e) if e.is_not_found() => {
            debug!("No WAF cookie cache at {}", path);
            (None, None)
        }
        Err(e) => {
            warn!("Failed to load WAF cookie cache: {}", e);
            (None, Some(format!("⚠️ WAF cookie cache unavailable: {}", e)))
        }
    }
}

async fn balance_report(state: &AppState) -> String {
    let accounts = match state.config.accounts() {
        Ok(accounts) => accounts,
        Err(e) => return not_configured(&e),
    };

    let (store, note) = load_cookie_store(state).await;

    let mut results = Vec::with_capacity(accounts.len());
    for (index, account) in accounts.iter().enumerate() {
        let name = account.display_name(index);
        let result = match state.config.balance.providers.get(&account.provider) {
            Some(provider) => {
                let cached = store.as_ref().and_then(|s| s.cookies_for(&account.provider));
                state
                    .balance
                    .query(account, provider, cached)
                    .await
                    .map_err(|e| format!("{:#}", e))
            }
            None => Err(format!("unknown provider '{}'", account.provider)),
        };

        match &result {
            Ok(_) => info!(account = %name, "Balance fetched"),
            Err(e) => warn!(account = %name, "Balance query failed: {}", e),
        }
        results.push(AccountBalance { name, result });
    }

    let updated_at = store.as_ref().and_then(WafCookieStore::latest_update);
    let notes: Vec<String> = note.into_iter().collect();
    format_report(&results, Utc::now(), updated_at, &notes)
}

async fn latest_run_report(state: &AppState) -> String {
    let github = match state.github() {
        Ok(github) => github,
        Err(e) => return not_configured(e),
    };

    let run = match github.list_runs(1, Some("success")).await {
        Ok(runs) => match runs.into_iter().next() {
            Some(run) => run,
            None => {
                return "ℹ️ No successful check-in run yet.\n\nSend /checkin to start one."
                    .to_string()
            }
        },
        Err(e) => {
            warn!("Listing workflow runs failed: {}", e);
            return failure("Failed to query check-in runs", &e);
        }
    };

    match github.list_jobs(run.id).await {
        Ok(jobs) => format_run_summary(&run, &jobs),
        Err(e) => {
            warn!("Listing jobs of run {} failed: {}", run.id, e);
            failure("Failed to query check-in jobs", &e)
        }
    }
}

/// Time and outcome of the last successful run. Balances are not part of it.
pub fn format_run_summary(run: &WorkflowRun, jobs: &[Job]) -> String {
    let succeeded = jobs
        .iter()
        .all(|job| job.conclusion.as_deref() == Some("success"));

    let mut lines = vec![
        "<b>📋 Latest Check-in</b>".to_string(),
        String::new(),
        format!("🕐 <code>{}</code>", short_time(&run.created_at)),
    ];

    if succeeded {
        lines.push("✅ Check-in succeeded".to_string());
    } else {
        lines.push("❌ Check-in failed".to_string());
    }

    for job in jobs {
        let icon = match job.conclusion.as_deref() {
            Some("success") => "✅",
            Some(_) => "❌",
            None => "⏳",
        };
        lines.push(format!("   {} {}", icon, escape_html(&job.name)));
    }

    lines.push(String::new());
    lines.push("Balances are not tracked here. Send /checkin for fresh numbers.".to_string());
    lines.join("\n")
}
