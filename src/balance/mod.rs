pub mod cookies;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, COOKIE, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::{AccountConfig, ProviderConfig};
use crate::format::{display_timestamp, escape_html, money, short_time, SEPARATOR};

use self::cookies::{merge_cookie_header, CookieSet};

const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    quota: f64,
    #[serde(default)]
    used_quota: f64,
}

/// Balance figures already scaled to dollars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    pub balance: f64,
    pub used: f64,
}

/// Outcome of one account lookup, ready for the report.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub name: String,
    pub result: Result<Quota, String>,
}

pub struct BalanceClient {
    client: reqwest::Client,
    quota_divisor: f64,
}

impl BalanceClient {
    pub fn new(client: reqwest::Client, quota_divisor: f64) -> Self {
        Self {
            client,
            quota_divisor,
        }
    }

    /// Read one account's quota from its provider.
    pub async fn query(
        &self,
        account: &AccountConfig,
        provider: &ProviderConfig,
        cached_cookies: Option<&CookieSet>,
    ) -> Result<Quota> {
        let url = format!(
            "{}{}",
            provider.domain.trim_end_matches('/'),
            provider.user_info_path
        );
        debug!("Balance request: GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(COOKIE, merge_cookie_header(cached_cookies, &account.cookies))
            .header(provider.api_user_header.as_str(), account.api_user.as_str())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, BROWSER_AGENT)
            .send()
            .await
            .context("Balance request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {}", status.as_u16());
        }

        let info: UserInfoResponse = response
            .json()
            .await
            .context("Invalid balance response")?;

        if !info.success {
            anyhow::bail!(
                "{}",
                info.message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "request rejected".to_string())
            );
        }

        let data = info.data.context("Balance response has no data")?;
        Ok(Quota {
            balance: data.quota / self.quota_divisor,
            used: data.used_quota / self.quota_divisor,
        })
    }
}

/// Render the `/status` balance report.
pub fn format_report(
    results: &[AccountBalance],
    now: DateTime<Utc>,
    cache_updated_at: Option<&str>,
    notes: &[String],
) -> String {
    let mut lines = vec![
        "<b>📋 Account Status</b>".to_string(),
        String::new(),
        format!("🕐 <code>{}</code>", short_time(&now)),
        String::new(),
        SEPARATOR.to_string(),
        String::new(),
    ];

    for account in results {
        let name = escape_html(&account.name);
        match &account.result {
            Ok(quota) => {
                lines.push(format!("✅ <b>{}</b>", name));
                lines.push(format!("   💰 Balance: <code>{}</code>", money(quota.balance)));
                lines.push(format!("   📉 Used: <code>{}</code>", money(quota.used)));
            }
            Err(reason) => {
                lines.push(format!("❌ <b>{}</b>", name));
                lines.push(format!("   ⚠️ {}", escape_html(reason)));
            }
        }
        lines.push(String::new());
    }

    lines.push(SEPARATOR.to_string());
    lines.push(String::new());

    let total = results.len();
    let ok = results.iter().filter(|r| r.result.is_ok()).count();
    if ok == total {
        lines.push(format!("🎉 <b>All {} accounts successful!</b>", total));
    } else if ok > 0 {
        lines.push(format!("⚠️ <b>Result: {}/{} Success</b>", ok, total));
    } else {
        lines.push(format!("❌ <b>All {} accounts failed!</b>", total));
    }

    if let Some(updated) = cache_updated_at {
        lines.push(format!(
            "🍪 WAF cookies refreshed: <code>{}</code>",
            escape_html(&display_timestamp(updated))
        ));
    }

    for note in notes {
        lines.push(escape_html(note));
    }

    lines.join("\n")
}
