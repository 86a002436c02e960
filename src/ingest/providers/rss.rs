use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use crate::ingest::normalize_text;
use crate::ingest::types::{Article, FetchError, FetchWindow, SourceAdapter};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
// Vec fields: quick-xml matches on local names, so `media:title`, `atom:link` or
// `media:description` land in the same field as the plain element.
#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<Text>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(default)]
    description: Vec<Text>,
}

// Text node of an element that may also carry attributes (`<guid isPermaLink>`,
// `<media:title type="plain">`).
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

/// First non-blank text among same-named elements.
fn first_text(nodes: Vec<Text>) -> Option<String> {
    nodes
        .into_iter()
        .filter_map(|t| t.value)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// RFC 2822 as feeds use it, RFC 3339 as a fallback. Anything else counts as undated.
pub(crate) fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(odt) = OffsetDateTime::parse(ts, &Rfc2822).or_else(|_| OffsetDateTime::parse(ts, &Rfc3339)) {
        return DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond());
    }
    // chrono also accepts obsolete zone names ("GMT", "EST") that some feeds still emit.
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One configured RSS 2.0 feed.
pub struct RssFeedAdapter {
    name: String,
    mode: Mode,
}

enum Mode {
    // In-memory document, for tests and dry runs.
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedAdapter {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_items_from_str(&self, s: &str, window: FetchWindow) -> Result<Vec<Article>, FetchError> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            // guid doubles as the permalink when <link> is missing, blank or relative.
            let Some(link) = it
                .link
                .into_iter()
                .chain(it.guid)
                .filter_map(|t| t.value)
                .map(|l| l.trim().to_string())
                .find(|l| l.starts_with("http"))
            else {
                continue;
            };

            let published_at = it.pub_date.as_deref().and_then(parse_feed_date);
            if !window.admits(published_at) {
                continue;
            }

            let title = normalize_text(&first_text(it.title).unwrap_or_default());
            let title = if title.is_empty() {
                "Untitled".to_string()
            } else {
                title
            };
            let summary = first_text(it.description).map(|d| normalize_text(&d));

            out.push(Article::new(
                self.name.clone(),
                title,
                Some(link),
                published_at,
                summary,
            ));
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for RssFeedAdapter {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Article>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s, window),
            Mode::Http { url, client } => {
                let resp = client.get(url.as_str()).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::Http {
                        status: status.as_u16(),
                    });
                }
                let body = resp.text().await?;
                self.parse_items_from_str(&body, window)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
