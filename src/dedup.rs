//! Submitted-URL normalization and duplicate detection.

use crate::error::ApiError;
use crate::models::Story;
use crate::repo::Repo;

/// Domains whose URL fragments are stripped (fragments elsewhere may be
/// meaningful anchors; these sites append junk fragments to shared links).
const FRAGMENT_STRIP_DOMAINS: &[&str] = &["medium.com"];

/// Canonicalizes a submitted URL for duplicate comparison.
///
/// In order: cut a `?utm_...` tracking suffix and everything after it, strip
/// fragments for the domain allow-list, rewrite mobile youtube links to the
/// desktop host, and trim trailing slashes. Idempotent:
/// `normalize_url(normalize_url(u)) == normalize_url(u)` for all inputs.
pub fn normalize_url(raw: &str) -> String {
    let mut url = raw.to_string();

    if let Some(pos) = url.find("?utm_") {
        url.truncate(pos);
    }

    if FRAGMENT_STRIP_DOMAINS.iter().any(|d| url.contains(d)) {
        if let Some(pos) = url.find('#') {
            url.truncate(pos);
        }
    }

    if let Some(rest) = url.strip_prefix("https://m.youtube.com") {
        url = format!("https://www.youtube.com{rest}");
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

/// Exact-match lookup by normalized URL.
pub async fn find_duplicate(repo: &dyn Repo, normalized: &str) -> Result<Option<Story>, ApiError> {
    if normalized.is_empty() {
        return Ok(None);
    }
    Ok(repo.find_story_by_url(normalized).await?)
}
