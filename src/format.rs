//! Text helpers shared by the command handlers.
//!
//! Replies go out in Telegram's HTML parse mode, so every piece of text that
//! comes from configuration or an upstream API passes through [`escape_html`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

/// Visual separator between report sections.
pub const SEPARATOR: &str = "━━━━━━━━━━━━━━━━━━━━";

const UTC8_SECONDS: i32 = 8 * 3600;

/// Width of `YYYY-MM-DD HH:MM`.
const DATE_MINUTE_WIDTH: usize = 16;

/// Naive layouts seen in history artifacts; these are already UTC+8.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

fn utc8() -> FixedOffset {
    FixedOffset::east_opt(UTC8_SECONDS).unwrap_or_else(|| Utc.fix())
}

pub fn escape_html(text: &str) -> String {
    teloxide::utils::html::escape(text)
}

/// `MM-DD HH:MM` in UTC+8.
pub fn short_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    time.with_timezone(&utc8()).format("%m-%d %H:%M").to_string()
}

/// Render a timestamp string from an artifact as `MM-DD HH:MM` (UTC+8).
///
/// Zoned timestamps are converted; naive ones are taken as already being in
/// UTC+8. Anything else is cut down to the `MM-DD HH:MM` character window of
/// a `YYYY-MM-DD HH:MM...` string, or returned whole when it is too short
/// for that window.
pub fn display_timestamp(raw: &str) -> String {
    let raw = raw.trim();

    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return short_time(&time);
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return naive.format("%m-%d %H:%M").to_string();
        }
    }

    if raw.chars().count() < DATE_MINUTE_WIDTH {
        return raw.to_string();
    }
    raw.chars().skip(5).take(11).collect()
}

/// Dollar amount with two decimals.
pub fn money(amount: f64) -> String {
    format!("${:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"a" & b</b>"#),
            r#"&lt;b&gt;"a" &amp; b&lt;/b&gt;"#
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_short_time_shifts_to_utc8() {
        let time = Utc.with_ymd_and_hms(2025, 1, 5, 20, 15, 0).unwrap();
        assert_eq!(short_time(&time), "01-06 04:15");
    }

    #[test]
    fn test_display_rfc3339_converted() {
        assert_eq!(display_timestamp("2025-03-01T00:30:00Z"), "03-01 08:30");
        assert_eq!(display_timestamp("2025-03-01T10:30:00+08:00"), "03-01 10:30");
    }

    #[test]
    fn test_display_naive_kept_as_is() {
        assert_eq!(display_timestamp("2025-03-01 10:30:59"), "03-01 10:30");
        assert_eq!(display_timestamp("2025-03-01 10:30:59.123456"), "03-01 10:30");
        assert_eq!(display_timestamp("2025-03-01 10:30"), "03-01 10:30");
    }

    #[test]
    fn test_display_falls_back_to_truncation() {
        assert_eq!(display_timestamp("2025-03-01 10:30 CST"), "03-01 10:30");
        assert_eq!(display_timestamp("soon"), "soon");
        assert_eq!(display_timestamp("2025-03-01"), "2025-03-01");
        assert_eq!(display_timestamp(""), "");
    }

    #[test]
    fn test_money() {
        assert_eq!(money(12.0), "$12.00");
        assert_eq!(money(0.126), "$0.13");
    }
}
