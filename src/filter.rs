// src/filter.rs
//! Keyword gate: an article survives if any configured keyword appears in its
//! title or summary. Matching is case-insensitive; `MatchMode::Word` additionally
//! requires word boundaries around the keyword.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::ingest::types::Article;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Substring,
    Word,
}

#[derive(Debug)]
enum Matcher {
    // lowercase needle
    Substring(String),
    Word(Regex),
}

#[derive(Debug)]
pub struct KeywordFilter {
    keywords: Vec<(String, Matcher)>,
}

impl KeywordFilter {
    pub fn new(keywords: &[String], mode: MatchMode) -> Self {
        let keywords = keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| {
                let matcher = match mode {
                    MatchMode::Substring => Matcher::Substring(k.to_lowercase()),
                    MatchMode::Word => Matcher::Word(
                        RegexBuilder::new(&format!(r"\b{}\b", regex::escape(k)))
                            .case_insensitive(true)
                            .build()
                            .expect("escaped keyword is a valid regex"),
                    ),
                };
                (k.clone(), matcher)
            })
            .collect();
        Self { keywords }
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Keywords (as configured) found in the article's title or summary.
    pub fn find_matches(&self, article: &Article) -> Vec<String> {
        let text = match &article.summary {
            Some(s) => format!("{}\n{}", article.title, s),
            None => article.title.clone(),
        };
        let lowered = text.to_lowercase();

        self.keywords
            .iter()
            .filter(|(_, m)| match m {
                Matcher::Substring(needle) => lowered.contains(needle.as_str()),
                Matcher::Word(re) => re.is_match(&text),
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn matches(&self, article: &Article) -> bool {
        !self.find_matches(article).is_empty()
    }

    /// Keep matching articles, recording which keywords hit. Order is preserved.
    pub fn apply(&self, articles: Vec<Article>) -> Vec<Article> {
        articles
            .into_iter()
            .filter_map(|mut a| {
                let hits = self.find_matches(&a);
                if hits.is_empty() {
                    return None;
                }
                a.matched_keywords = hits.into_iter().collect();
                Some(a)
            })
            .collect()
    }

    /// How many of `articles` each keyword matched, in configuration order.
    pub fn keyword_stats(&self, articles: &[Article]) -> Vec<(String, usize)> {
        self.keywords
            .iter()
            .map(|(k, _)| {
                let n = articles
                    .iter()
                    .filter(|a| a.matched_keywords.contains(k))
                    .count();
                (k.clone(), n)
            })
            .collect()
    }
}
