use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::balance::cookies::CookieSet;

/// Configuration problems that handlers surface to the user instead of failing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not configured")]
    Missing(&'static str),
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which data source backs `/status`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusMode {
    /// Query every account's balance endpoint directly.
    #[default]
    Balance,
    /// Summarise the most recent successful workflow run.
    Runs,
}

impl std::fmt::Display for StatusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusMode::Balance => write!(f, "balance"),
            StatusMode::Runs => write!(f, "runs"),
        }
    }
}

impl FromStr for StatusMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balance" => Ok(StatusMode::Balance),
            "runs" => Ok(StatusMode::Runs),
            other => Err(ConfigError::Invalid {
                name: "STATUS_MODE",
                reason: format!("unknown mode '{}' (expected 'balance' or 'runs')", other),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub accounts: Option<Vec<AccountConfig>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Comma-delimited chat ids. Empty means everyone may use the bot.
    #[serde(default)]
    pub allowed_chat_ids: String,
    /// Path segment the webhook must be delivered to (`/<secret>`).
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    /// `owner/name` of the repository running the check-in workflow.
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Workflow file name; when set, run listings are limited to it.
    #[serde(default)]
    pub workflow: Option<String>,
    #[serde(default = "default_waf_cookies_path")]
    pub waf_cookies_path: String,
    #[serde(default = "default_history_path")]
    pub history_path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatusConfig {
    #[serde(default)]
    pub mode: StatusMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BalanceConfig {
    /// Raw quota units per displayed dollar.
    #[serde(default = "default_quota_divisor")]
    pub quota_divisor: f64,
    /// Extra or overriding providers; the built-in ones are always present.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub domain: String,
    #[serde(default = "default_user_info_path")]
    pub user_info_path: String,
    #[serde(default = "default_api_user_header")]
    pub api_user_header: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub cookies: CookieSet,
    /// Value sent in the provider's user-id header.
    #[serde(default)]
    pub api_user: String,
}

impl AccountConfig {
    pub fn display_name(&self, index: usize) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Account {}", index + 1),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_waf_cookies_path() -> String {
    "waf_cookies.json".to_string()
}

fn default_history_path() -> String {
    "checkin_history.json".to_string()
}

fn default_quota_divisor() -> f64 {
    500_000.0
}

fn default_user_info_path() -> String {
    "/api/user/self".to_string()
}

fn default_api_user_header() -> String {
    "new-api-user".to_string()
}

fn default_provider() -> String {
    "anyrouter".to_string()
}

fn builtin_providers() -> HashMap<String, ProviderConfig> {
    [
        ("anyrouter", "https://anyrouter.top"),
        ("agentrouter", "https://agentrouter.org"),
    ]
    .into_iter()
    .map(|(id, domain)| {
        (
            id.to_string(),
            ProviderConfig {
                domain: domain.to_string(),
                user_info_path: default_user_info_path(),
                api_user_header: default_api_user_header(),
            },
        )
    })
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_chat_ids: String::new(),
            webhook_secret: None,
            api_url: default_telegram_api_url(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            repository: None,
            api_url: default_github_api_url(),
            workflow: None,
            waf_cookies_path: default_waf_cookies_path(),
            history_path: default_history_path(),
        }
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            quota_divisor: default_quota_divisor(),
            providers: builtin_providers(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl TelegramConfig {
    /// Parsed allow-list. Splitting `""` must not yield a single empty id.
    pub fn allow_list(&self) -> Vec<&str> {
        self.allowed_chat_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect()
    }

    pub fn is_allowed(&self, chat_id: i64) -> bool {
        let allowed = self.allow_list();
        if allowed.is_empty() {
            return true;
        }
        let chat_id = chat_id.to_string();
        allowed.iter().any(|id| *id == chat_id)
    }

    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        non_empty(self.bot_token.as_deref()).ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        non_empty(self.webhook_secret.as_deref())
    }
}

impl GithubConfig {
    /// Token and repository, both required for any GitHub call.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let token = non_empty(self.token.as_deref()).ok_or(ConfigError::Missing("GITHUB_TOKEN"))?;
        let repository =
            non_empty(self.repository.as_deref()).ok_or(ConfigError::Missing("GITHUB_REPO"))?;
        Ok((token, repository))
    }
}

impl Config {
    /// Accounts for the balance report. Absent and empty are both "missing".
    pub fn accounts(&self) -> Result<&[AccountConfig], ConfigError> {
        match self.accounts.as_deref() {
            Some(accounts) if !accounts.is_empty() => Ok(accounts),
            _ => Err(ConfigError::Missing("ACCOUNTS")),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build the configuration from a variable lookup. Blank values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Config::default();

        if let Some(addr) = var("LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        config.telegram.bot_token = var("TELEGRAM_BOT_TOKEN");
        config.telegram.allowed_chat_ids = var("ALLOWED_CHAT_IDS").unwrap_or_default();
        config.telegram.webhook_secret = var("WEBHOOK_SECRET");
        if let Some(url) = var("TELEGRAM_API_URL") {
            config.telegram.api_url = url;
        }

        config.github.token = var("GITHUB_TOKEN");
        config.github.repository = var("GITHUB_REPO");
        config.github.workflow = var("GITHUB_WORKFLOW");
        if let Some(url) = var("GITHUB_API_URL") {
            config.github.api_url = url;
        }
        if let Some(path) = var("WAF_COOKIES_PATH") {
            config.github.waf_cookies_path = path;
        }
        if let Some(path) = var("HISTORY_PATH") {
            config.github.history_path = path;
        }

        if let Some(mode) = var("STATUS_MODE") {
            config.status.mode = mode.parse()?;
        }

        if let Some(divisor) = var("QUOTA_DIVISOR") {
            config.balance.quota_divisor =
                divisor.parse().map_err(|e| ConfigError::Invalid {
                    name: "QUOTA_DIVISOR",
                    reason: format!("{}", e),
                })?;
        }

        if let Some(raw) = var("PROVIDERS") {
            let providers: HashMap<String, ProviderConfig> =
                serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                    name: "PROVIDERS",
                    reason: e.to_string(),
                })?;
            config.balance.providers.extend(providers);
        }

        if let Some(raw) = var("ACCOUNTS") {
            let accounts: Vec<AccountConfig> =
                serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                    name: "ACCOUNTS",
                    reason: e.to_string(),
                })?;
            config.accounts = Some(accounts);
        }

        config.validate()?;
        Ok(config)
    }

    /// Fill in built-in providers and check the shape of what was supplied.
    fn validate(&mut self) -> Result<(), ConfigError> {
        for (id, provider) in builtin_providers() {
            self.balance.providers.entry(id).or_insert(provider);
        }

        let divisor = self.balance.quota_divisor;
        if !divisor.is_finite() || divisor <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "QUOTA_DIVISOR",
                reason: format!("must be a positive number, got {}", divisor),
            });
        }

        for (index, account) in self.accounts.iter().flatten().enumerate() {
            if !self.balance.providers.contains_key(&account.provider) {
                return Err(ConfigError::Invalid {
                    name: "ACCOUNTS",
                    reason: format!(
                        "{} uses unknown provider '{}'",
                        account.display_name(index),
                        account.provider
                    ),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map = vars(pairs);
        Config::from_vars(|name| map.get(name).cloned())
    }

    #[test]
    fn test_empty_allow_list_allows_everyone() {
        let config = from(&[("ALLOWED_CHAT_IDS", "")]).unwrap();
        assert!(config.telegram.allow_list().is_empty());
        assert!(config.telegram.is_allowed(42));
        assert!(config.telegram.is_allowed(-100123));
    }

    #[test]
    fn test_allow_list_restricts_to_listed_ids() {
        let config = from(&[("ALLOWED_CHAT_IDS", "123, 456,,-789 ")]).unwrap();
        assert_eq!(config.telegram.allow_list(), vec!["123", "456", "-789"]);
        assert!(config.telegram.is_allowed(456));
        assert!(config.telegram.is_allowed(-789));
        assert!(!config.telegram.is_allowed(999));
    }

    #[test]
    fn test_blank_values_are_missing() {
        let config = from(&[("GITHUB_TOKEN", "  "), ("TELEGRAM_BOT_TOKEN", "")]).unwrap();
        assert_eq!(
            config.github.credentials(),
            Err(ConfigError::Missing("GITHUB_TOKEN"))
        );
        assert_eq!(
            config.telegram.bot_token(),
            Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
        );
        assert_eq!(config.accounts(), Err(ConfigError::Missing("ACCOUNTS")));
    }

    #[test]
    fn test_github_requires_repository() {
        let config = from(&[("GITHUB_TOKEN", "ghp_x")]).unwrap();
        assert_eq!(
            config.github.credentials(),
            Err(ConfigError::Missing("GITHUB_REPO"))
        );
    }

    #[test]
    fn test_accounts_with_both_cookie_shapes() {
        let config = from(&[(
            "ACCOUNTS",
            r#"[
                {"name": "main", "cookies": {"session": "abc"}, "api_user": "1001"},
                {"provider": "agentrouter", "cookies": "session=def; theme=dark", "api_user": "2002"}
            ]"#,
        )])
        .unwrap();
        let accounts = config.accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].display_name(0), "main");
        assert_eq!(accounts[0].provider, "anyrouter");
        assert_eq!(accounts[1].display_name(1), "Account 2");
        assert!(matches!(accounts[1].cookies, CookieSet::Raw(_)));
    }

    #[test]
    fn test_malformed_accounts_fail_startup() {
        let err = from(&[("ACCOUNTS", "[{not json")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ACCOUNTS", .. }));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = from(&[(
            "ACCOUNTS",
            r#"[{"provider": "nowhere", "cookies": "a=b"}]"#,
        )])
        .unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_custom_provider_extends_builtins() {
        let config = from(&[
            ("PROVIDERS", r#"{"mirror": {"domain": "https://mirror.example"}}"#),
            ("ACCOUNTS", r#"[{"provider": "mirror", "cookies": "a=b"}]"#),
        ])
        .unwrap();
        let providers = &config.balance.providers;
        assert_eq!(providers["mirror"].user_info_path, "/api/user/self");
        assert_eq!(providers["mirror"].api_user_header, "new-api-user");
        assert!(providers.contains_key("anyrouter"));
        assert!(providers.contains_key("agentrouter"));
    }

    #[test]
    fn test_status_mode_parsing() {
        assert_eq!(from(&[]).unwrap().status.mode, StatusMode::Balance);
        assert_eq!(
            from(&[("STATUS_MODE", "RUNS")]).unwrap().status.mode,
            StatusMode::Runs
        );
        assert!(from(&[("STATUS_MODE", "both")]).is_err());
    }

    #[test]
    fn test_divisor_must_be_positive() {
        assert!(from(&[("QUOTA_DIVISOR", "0")]).is_err());
        assert!(from(&[("QUOTA_DIVISOR", "ten")]).is_err());
        let config = from(&[("QUOTA_DIVISOR", "1000")]).unwrap();
        assert_eq!(config.balance.quota_divisor, 1000.0);
    }

    #[test]
    fn test_toml_config_gets_defaults() {
        let mut config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            allowed_chat_ids = ""

            [github]
            token = "ghp_x"
            repository = "me/checkin"

            [status]
            mode = "runs"

            [[accounts]]
            name = "main"
            cookies = { session = "abc" }
            api_user = "1001"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.github.credentials(), Ok(("ghp_x", "me/checkin")));
        assert_eq!(config.github.history_path, "checkin_history.json");
        assert_eq!(config.status.mode, StatusMode::Runs);
        assert_eq!(config.balance.quota_divisor, 500_000.0);
        assert!(config.balance.providers.contains_key("anyrouter"));
        assert_eq!(config.accounts().unwrap().len(), 1);
    }
}
