//! Whitelist/blacklist matching.
//!
//! Well-formed URLs are matched structurally against their hostname first
//! (exact or dot-boundary subdomain) and only then by substring, so that a
//! pattern like `ample.com` does not hit `example.com`. Strings the URL
//! parser rejects fall back to plain substring/wildcard matching.

use regex::Regex;
use url::Url;

const WILDCARD: char = '*';

#[derive(Debug, Clone)]
enum Pattern {
    Wildcard(Regex),
    Literal(String),
}

impl Pattern {
    fn compile(raw: &str) -> Option<Self> {
        let p = raw.trim();
        if p.is_empty() {
            return None;
        }
        if p.contains(WILDCARD) {
            let body: Vec<String> = p.split(WILDCARD).map(regex::escape).collect();
            let anchored = format!("^{}$", body.join(".*"));
            // Every literal piece is escaped, so this only fails on absurd sizes.
            return Regex::new(&anchored).ok().map(Pattern::Wildcard);
        }
        Some(Pattern::Literal(p.to_string()))
    }

    fn matches_parsed(&self, host: &str, href: &str) -> bool {
        match self {
            Pattern::Wildcard(re) => re.is_match(host) || re.is_match(href),
            Pattern::Literal(p) => {
                host == p
                    || host
                        .strip_suffix(p.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
                    || href.contains(p.as_str())
            }
        }
    }

    fn matches_raw(&self, raw: &str) -> bool {
        match self {
            Pattern::Wildcard(re) => re.is_match(raw),
            Pattern::Literal(p) => raw.contains(p.as_str()),
        }
    }
}

/// A list of user patterns compiled once and reused for every tab in a tick.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| Pattern::compile(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, url: &str) -> bool {
        if self.patterns.is_empty() || url.is_empty() {
            return false;
        }

        let Ok(parsed) = Url::parse(url) else {
            return self.patterns.iter().any(|p| p.matches_raw(url));
        };
        let host = parsed.host_str().unwrap_or("");
        let href = parsed.as_str();
        self.patterns.iter().any(|p| p.matches_parsed(host, href))
    }
}

/// One-shot form of [`PatternSet::matches`].
pub fn matches<S: AsRef<str>>(url: &str, patterns: &[S]) -> bool {
    PatternSet::new(patterns).matches(url)
}

/// Hostname of a URL, or `None` when it does not parse or has no host.
pub fn hostname(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .filter(|h| !h.is_empty())
}
