//! Article identity: the only key the dedup store looks at.

use sha2::{Digest, Sha256};
use url::Url;

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid"];
const FINGERPRINT_HEX_LEN: usize = 32;

/// Normalize a URL so that re-fetches of the same article compare equal.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_lowercase();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    // `Url` already lowercases scheme and host.
    url.to_string()
}

/// Deterministic fingerprint: normalized URL when present, else source + title.
pub fn fingerprint_for(url: Option<&str>, source: &str, title: &str) -> String {
    let key = match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => format!("url:{}", normalize_url(u)),
        None => format!(
            "title:{}\n{}",
            source.trim().to_lowercase(),
            title.trim().to_lowercase()
        ),
    };
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(FINGERPRINT_HEX_LEN);
    for b in digest.iter().take(FINGERPRINT_HEX_LEN / 2) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_params_fragment_and_slash_are_ignored() {
        let a = fingerprint_for(
            Some("HTTPS://Example.com/news/story/?utm_source=rss&id=7#comments"),
            "Feed A",
            "x",
        );
        let b = fingerprint_for(Some("https://example.com/news/story?id=7"), "Feed B", "y");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn root_path_slash_is_kept() {
        assert_eq!(normalize_url("https://example.com"), "https://example.com/");
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn different_paths_do_not_collide() {
        let a = fingerprint_for(Some("https://example.com/a"), "s", "t");
        let b = fingerprint_for(Some("https://example.com/b"), "s", "t");
        assert_ne!(a, b);
    }

    #[test]
    fn title_fallback_is_case_insensitive() {
        let a = fingerprint_for(None, "Ars Technica", "OpenAI ships agents");
        let b = fingerprint_for(None, "ars technica", "openai ships AGENTS ");
        assert_eq!(a, b);
        assert_ne!(a, fingerprint_for(None, "Other", "OpenAI ships agents"));
    }
}
