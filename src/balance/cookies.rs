use chrono::DateTime;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Cookies as they appear in configuration: either a ready-made header
/// string or a name/value map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CookieSet {
    Raw(String),
    Pairs(BTreeMap<String, String>),
}

impl CookieSet {
    /// Name/value pairs in header order. Raw fragments without `=` are dropped.
    pub fn pairs(&self) -> Vec<(String, String)> {
        match self {
            CookieSet::Raw(raw) => raw
                .split(';')
                .filter_map(|part| {
                    let (name, value) = part.trim().split_once('=')?;
                    let name = name.trim();
                    if name.is_empty() {
                        return None;
                    }
                    Some((name.to_string(), value.trim().to_string()))
                })
                .collect(),
            CookieSet::Pairs(map) => map
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Build one `Cookie` header from the cached provider cookies and the
/// account's own cookies. The account wins on a name clash.
pub fn merge_cookie_header(cached: Option<&CookieSet>, account: &CookieSet) -> String {
    let mut merged = cached.map(CookieSet::pairs).unwrap_or_default();

    for (name, value) in account.pairs() {
        match merged.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => merged.push((name, value)),
        }
    }

    merged
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One provider's entry in the WAF cookie cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WafEntry {
    pub cookies: CookieSet,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Browser-challenge cookies refreshed out of band and stored in the
/// automation repository, keyed by provider id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct WafCookieStore {
    pub entries: HashMap<String, WafEntry>,
}

impl WafCookieStore {
    pub fn cookies_for(&self, provider: &str) -> Option<&CookieSet> {
        self.entries.get(provider).map(|entry| &entry.cookies)
    }

    /// Most recent refresh across all providers. RFC 3339 values are compared
    /// as instants and rank above anything unparseable.
    pub fn latest_update(&self) -> Option<&str> {
        self.entries
            .values()
            .filter_map(|entry| entry.updated_at.as_deref())
            .max_by_key(|raw| (DateTime::parse_from_rfc3339(raw.trim()).ok(), *raw))
    }
}
