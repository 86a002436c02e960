// src/digest.rs
//! Renders the selected articles into one Telegram-HTML message.

use chrono::{DateTime, FixedOffset, Timelike};

use crate::ingest::types::Article;

pub const DEFAULT_DIGEST_TITLE: &str = "AI News Digest";

/// Coarse label for the run's local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn at(local: &DateTime<FixedOffset>) -> Self {
        match local.hour() {
            0..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
        }
    }
}

/// A composed, non-empty message ready for the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub text: String,
    pub entries: usize,
}

/// Escape the characters Telegram's HTML parse mode cares about.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `None` means "nothing to send": callers must skip delivery and commit.
pub fn compose(selection: &[Article], title: &str, local_now: &DateTime<FixedOffset>) -> Option<Digest> {
    if selection.is_empty() {
        return None;
    }

    let mut parts = vec![format!(
        "🗞️ <b>{} - {}, {}</b>\n",
        escape_html(title),
        TimeOfDay::at(local_now).as_str(),
        local_now.format("%I:%M %p")
    )];

    for (idx, a) in selection.iter().enumerate() {
        parts.push(format!("{}. {}", idx + 1, escape_html(&a.title)));
        let url = a.url.as_deref().unwrap_or("(no link)");
        parts.push(format!("   → {}\n", escape_html(url)));
    }

    Some(Digest {
        text: parts.join("\n").trim_end().to_string(),
        entries: selection.len(),
    })
}

/// Short alert sent once, best-effort, when a run fails.
pub fn compose_error_alert(title: &str, cause: &str) -> String {
    format!(
        "⚠️ <b>{} error</b>\n\n{}",
        escape_html(title),
        escape_html(cause)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lima_at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 1, h, m, 0)
            .unwrap()
    }

    #[test]
    fn empty_selection_means_nothing_to_send() {
        assert!(compose(&[], DEFAULT_DIGEST_TITLE, &lima_at(8, 0)).is_none());
    }

    #[test]
    fn numbered_entries_with_header() {
        let sel = vec![
            Article::new("A", "First <b>bold</b> & co", Some("https://a.test/1".into()), None, None),
            Article::new("B", "Second", Some("https://b.test/2?x=1&y=2".into()), None, None),
        ];
        let d = compose(&sel, DEFAULT_DIGEST_TITLE, &lima_at(8, 5)).unwrap();
        assert_eq!(d.entries, 2);

        let lines: Vec<&str> = d.text.lines().collect();
        assert_eq!(lines[0], "🗞️ <b>AI News Digest - Morning, 08:05 AM</b>");
        assert!(d.text.contains("1. First &lt;b&gt;bold&lt;/b&gt; &amp; co"));
        assert!(d.text.contains("   → https://a.test/1"));
        assert!(d.text.contains("2. Second"));
        assert!(d.text.contains("https://b.test/2?x=1&amp;y=2"));
        assert!(!d.text.ends_with('\n'));
    }

    #[test]
    fn time_of_day_buckets() {
        assert_eq!(TimeOfDay::at(&lima_at(0, 0)), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::at(&lima_at(12, 0)), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::at(&lima_at(18, 30)), TimeOfDay::Evening);
    }

    #[test]
    fn error_alert_is_escaped() {
        let s = compose_error_alert("AI News Digest", "store <broken>");
        assert!(s.contains("store &lt;broken&gt;"));
    }
}
