//! Data-link harvesting: find the supplemental data a challenge page points at.
//!
//! Two extraction rules run over both the markup and the text of a page:
//! hyperlink targets (`href="..."`) and "Scrape <token>" instructions. Each
//! candidate is then classified; candidates that match no rule are dropped.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{DataReference, PageSnapshot, ReferenceKind};

/// Suffixes of files fetched as plain text.
const RAW_FILE_SUFFIXES: &[&str] = &[".csv", ".json", ".txt"];

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href=['"](\S+?)['"]"#).expect("href regex is valid"))
}

fn scrape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Scrape (\S+)").expect("scrape regex is valid"))
}

fn identity_param_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&](?:email|id)=").expect("param regex is valid"))
}

/// Harvest the data references of a page, deduplicated by locator.
///
/// Order is discovery order: markup before text, hyperlinks before scrape
/// instructions within each. Running it twice on the same snapshot yields
/// the same result.
pub fn harvest(page: &PageSnapshot) -> Vec<DataReference> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for source in [page.markup.as_str(), page.text.as_str()] {
        for locator in candidates(source) {
            if !seen.insert(locator.clone()) {
                continue;
            }
            match classify(&locator) {
                Some(kind) => {
                    tracing::debug!(%locator, %kind, "Harvested data reference");
                    refs.push(DataReference { locator, kind });
                }
                None => tracing::trace!(%locator, "Discarded link candidate"),
            }
        }
    }

    refs
}

/// Every candidate locator found in `source`, hyperlinks first.
pub fn candidates(source: &str) -> Vec<String> {
    let hrefs = href_regex()
        .captures_iter(source)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()));
    let scrapes = scrape_regex()
        .captures_iter(source)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()));
    hrefs.chain(scrapes).collect()
}

/// Classify a locator, or `None` if it is not worth fetching.
pub fn classify(locator: &str) -> Option<ReferenceKind> {
    let lower = locator.to_lowercase();

    if RAW_FILE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return Some(ReferenceKind::RawFile);
    }
    if identity_param_regex().is_match(&lower) {
        return Some(ReferenceKind::InteractivePage);
    }
    if lower.contains("data") && !lower.contains("email") {
        return Some(ReferenceKind::InteractivePage);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(markup: &str, text: &str) -> PageSnapshot {
        PageSnapshot {
            text: text.to_string(),
            markup: markup.to_string(),
        }
    }

    #[test]
    fn test_href_and_scrape_instruction() {
        let snap = page(
            r#"<a href="data.csv">file</a> <a href="/email-data-form">contact</a>"#,
            "Scrape extra-info?id=7 to get the secret.",
        );
        let refs = harvest(&snap);
        assert_eq!(
            refs,
            vec![
                DataReference {
                    locator: "data.csv".into(),
                    kind: ReferenceKind::RawFile
                },
                DataReference {
                    locator: "extra-info?id=7".into(),
                    kind: ReferenceKind::InteractivePage
                },
            ]
        );
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify("files/data.json"), Some(ReferenceKind::RawFile));
        assert_eq!(classify("notes.TXT"), Some(ReferenceKind::RawFile));
        assert_eq!(
            classify("/demo-scrape?email=me@example.com"),
            Some(ReferenceKind::InteractivePage)
        );
        assert_eq!(classify("/page?id=1"), Some(ReferenceKind::InteractivePage));
        assert_eq!(
            classify("/DataSet/page"),
            Some(ReferenceKind::InteractivePage)
        );
        assert_eq!(classify("mailto:data@example.com?subject=email"), None);
        assert_eq!(classify("/about"), None);
        assert_eq!(classify("style.css"), None);
    }

    #[test]
    fn test_duplicates_collapse() {
        let snap = page(
            r#"<a href="a.csv">1</a><a href='a.csv'>2</a>"#,
            "Scrape a.csv",
        );
        assert_eq!(harvest(&snap).len(), 1);
    }

    #[test]
    fn test_scrape_rule_applies_to_markup_too() {
        let snap = page("<p>Scrape /secret-data now</p>", "");
        let refs = harvest(&snap);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].locator, "/secret-data");
    }

    #[test]
    fn test_harvest_is_idempotent() {
        let snap = page(
            r#"<a href="x.csv"></a><a href="/data?id=2"></a><a href="/home"></a>"#,
            "Scrape y.json and Scrape /data?id=2",
        );
        assert_eq!(harvest(&snap), harvest(&snap));
    }

    #[test]
    fn test_no_candidates() {
        assert!(harvest(&page("<p>nothing</p>", "nothing here")).is_empty());
    }
}
