use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*([^<>]+?)\s*>").expect("valid regex"));

/// URIs from a `List-Unsubscribe` value, in header order. Only `http`,
/// `https` and `mailto` URIs that parse are kept.
pub fn extract_unsubscribe_candidates(value: &str) -> Vec<String> {
    let bracketed: Vec<&str> = BRACKETED
        .captures_iter(value)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    // Some senders omit the angle brackets.
    let raw: Vec<&str> = if bracketed.is_empty() {
        value.split(',').map(str::trim).collect()
    } else {
        bracketed
    };

    raw.into_iter()
        .filter_map(|candidate| {
            let url = Url::parse(candidate).ok()?;
            matches!(url.scheme(), "http" | "https" | "mailto").then(|| url.to_string())
        })
        .collect()
}

/// First HTTP(S) candidate, else the first `mailto:` one.
pub fn best_unsubscribe_link(candidates: &[String]) -> Option<&str> {
    candidates
        .iter()
        .find(|c| is_web_link(c))
        .or_else(|| candidates.first())
        .map(String::as_str)
}

pub fn is_web_link(link: &str) -> bool {
    let lower = link.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}
