//! Discovery of new bulk files on the civil-registry index page.
//!
//! The registry publishes one CSV drop per month, listed on a single HTML
//! index page. Files are recognized by a fixed structural pattern — an anchor
//! carrying the `download-link` class whose `href` ends in `.csv` — and by
//! the `deces-YYYY-mMM.csv` token embedded in the filename.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::error::IngestError;
use crate::fetch::RateLimitedFetcher;

/// Files with an embedded month older than this many months before "today"
/// are skipped: the backfill window is bounded, not the whole archive.
const RETENTION_MONTHS: i32 = 12;

/// A downloadable monthly file discovered on the index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Filename as it appears in the link, e.g. `deces-2025-m07.csv`.
    pub filename: String,
    /// Absolute download URL.
    pub url: String,
    pub year: i32,
    pub month: u32,
}

/// Fetches the HTML index page and returns the monthly files that are both
/// recent (within the retention window ending at `today`) and novel (not in
/// `known`), sorted oldest-first so backfills proceed chronologically.
///
/// Links whose filename does not match the expected year/month pattern are
/// dropped with a warning, not an error.
///
/// # Errors
///
/// Returns [`IngestError`] if the index page cannot be fetched or its URL is
/// invalid. An index page without any matching link yields an empty list.
pub async fn discover_new_files(
    fetcher: &RateLimitedFetcher,
    index_url: &str,
    known: &HashSet<String>,
    today: NaiveDate,
) -> Result<Vec<FileRef>, IngestError> {
    let html = fetcher.get_text(index_url).await?;
    let base = reqwest::Url::parse(index_url).map_err(|e| IngestError::InvalidUrl {
        url: index_url.to_owned(),
        reason: e.to_string(),
    })?;

    let mut files: Vec<FileRef> = Vec::new();
    for href in extract_csv_links(&html) {
        let Ok(url) = base.join(&href) else {
            tracing::warn!(href, "discovered link is not a valid URL — skipping");
            continue;
        };
        let filename = match url.path_segments().and_then(Iterator::last) {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => {
                tracing::warn!(href, "discovered link has no filename — skipping");
                continue;
            }
        };

        let Some((year, month)) = parse_month_token(&filename) else {
            tracing::warn!(
                filename,
                "filename does not match the expected year/month pattern — skipping"
            );
            continue;
        };

        if months_before(today, year, month) > RETENTION_MONTHS {
            tracing::debug!(filename, "file is older than the retention window");
            continue;
        }
        if known.contains(&filename) {
            tracing::debug!(filename, "file already ingested");
            continue;
        }

        files.push(FileRef {
            filename,
            url: url.to_string(),
            year,
            month,
        });
    }

    // Oldest first: backfills proceed chronologically.
    files.sort_by_key(|f| (f.year, f.month));
    Ok(files)
}

/// Extracts the `href` of every anchor carrying the `download-link` class and
/// a `.csv` extension. The class may appear before or after the `href`.
fn extract_csv_links(html: &str) -> Vec<String> {
    let patterns = [
        r#"<a[^>]*class="[^"]*download-link[^"]*"[^>]*href="([^"]+\.csv)""#,
        r#"<a[^>]*href="([^"]+\.csv)"[^>]*class="[^"]*download-link[^"]*""#,
    ];

    let mut links: Vec<String> = Vec::new();
    for pattern in &patterns {
        let re = Regex::new(pattern).expect("valid regex");
        for cap in re.captures_iter(html) {
            if let Some(m) = cap.get(1) {
                let href = m.as_str().to_owned();
                if !links.contains(&href) {
                    links.push(href);
                }
            }
        }
    }
    links
}

/// Parses the `deces-YYYY-mMM.csv` token from a filename.
fn parse_month_token(filename: &str) -> Option<(i32, u32)> {
    let re = Regex::new(r"^deces-(\d{4})-m(\d{2})\.csv$").expect("valid regex");
    let caps = re.captures(filename)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year, month))
}

/// Whole-month distance from a file's (year, month) to `today`'s month.
fn months_before(today: NaiveDate, year: i32, month: u32) -> i32 {
    #[allow(clippy::cast_possible_wrap)]
    let month_delta = today.month() as i32 - month as i32;
    (today.year() - year) * 12 + month_delta
}
