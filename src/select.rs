// src/select.rs
use std::cmp::Ordering;

use crate::ingest::types::Article;

/// Newest first; undated articles after every dated one. The sort is stable, so
/// ties (and the undated tail) keep their incoming order.
pub fn rank(articles: &mut [Article]) {
    articles.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Top `k` by [`rank`]. Returns fewer when fewer qualify; never pads.
pub fn select(mut articles: Vec<Article>, k: usize) -> Vec<Article> {
    rank(&mut articles);
    articles.truncate(k);
    articles
}
