use std::collections::{HashMap, HashSet};

use regex::Regex;
use thiserror::Error;

use super::signature::{normalize_body, shingle_similarity};
use crate::executor::ResponseSummary;
use crate::utils::StatusRanges;

/// Similarity score at or above which a response counts as a duplicate
/// of the `--exclude-response` reference.
pub const SIMILARITY_THRESHOLD: f64 = 0.9;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid exclude regex '{pattern}': {source}")]
    BadRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Reference response for the similarity filter, captured once per
/// target before probing starts.
#[derive(Clone, Debug)]
pub struct SimilarityRef {
    pub status: u16,
    pub normalized_body: String,
}

impl SimilarityRef {
    pub fn from_summary(summary: &ResponseSummary) -> Self {
        Self {
            status: summary.status,
            normalized_body: normalize_body(&summary.text()),
        }
    }
}

/// The include/exclude filter chain, built once per target and applied
/// to every response. Later stages (calibration, duplicate signatures)
/// live in the classifier; this type covers the configured filters.
#[derive(Debug, Default)]
pub struct FilterChain {
    include_status: StatusRanges,
    exclude_status: StatusRanges,
    min_size: usize,
    max_size: usize,
    exclude_sizes: HashSet<usize>,
    exclude_texts: Vec<String>,
    exclude_regex: Option<Regex>,
    exclude_redirect: Option<Regex>,
    similarity_ref: Option<SimilarityRef>,
    blacklists: HashMap<u16, Vec<String>>,
}

pub struct FilterChainBuilder {
    chain: FilterChain,
}

impl FilterChainBuilder {
    pub fn new() -> Self {
        Self {
            chain: FilterChain::default(),
        }
    }

    pub fn include_status(mut self, ranges: StatusRanges) -> Self {
        self.chain.include_status = ranges;
        self
    }

    pub fn exclude_status(mut self, ranges: StatusRanges) -> Self {
        self.chain.exclude_status = ranges;
        self
    }

    /// `max_size` of zero means unbounded.
    pub fn size_bounds(mut self, min_size: usize, max_size: usize) -> Self {
        self.chain.min_size = min_size;
        self.chain.max_size = max_size;
        self
    }

    pub fn exclude_sizes(mut self, sizes: HashSet<usize>) -> Self {
        self.chain.exclude_sizes = sizes;
        self
    }

    pub fn exclude_texts(mut self, texts: Vec<String>) -> Self {
        self.chain.exclude_texts = texts;
        self
    }

    pub fn exclude_regex(mut self, pattern: Option<&str>) -> Result<Self, FilterError> {
        self.chain.exclude_regex = compile(pattern)?;
        Ok(self)
    }

    pub fn exclude_redirect(mut self, pattern: Option<&str>) -> Result<Self, FilterError> {
        self.chain.exclude_redirect = compile(pattern)?;
        Ok(self)
    }

    pub fn similarity_ref(mut self, reference: Option<SimilarityRef>) -> Self {
        self.chain.similarity_ref = reference;
        self
    }

    /// Per-status path blacklists; a response whose path ends with a
    /// listed suffix is dropped for that status.
    pub fn blacklists(mut self, blacklists: HashMap<u16, Vec<String>>) -> Self {
        self.chain.blacklists = blacklists;
        self
    }

    pub fn build(self) -> FilterChain {
        self.chain
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, FilterError> {
    match pattern.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| FilterError::BadRegex {
                pattern: p.to_string(),
                source: e,
            }),
        None => Ok(None),
    }
}

impl FilterChain {
    /// Filters applied before the calibration check: status, blacklist,
    /// size. Returns the drop reason on a hit.
    pub fn excluded_early(&self, path: &str, summary: &ResponseSummary) -> Option<&'static str> {
        if !self.include_status.is_empty() && !self.include_status.contains(summary.status) {
            return Some("status-excluded");
        }
        if !self.exclude_status.is_empty() && self.exclude_status.contains(summary.status) {
            return Some("status-excluded");
        }

        if let Some(suffixes) = self.blacklists.get(&summary.status) {
            let cleaned = path.trim_end_matches('/');
            if suffixes.iter().any(|s| {
                let s = s.trim_end_matches('/');
                !s.is_empty() && cleaned.ends_with(s)
            }) {
                return Some("blacklist");
            }
        }

        if summary.body_size < self.min_size {
            return Some("size");
        }
        if self.max_size > 0 && summary.body_size > self.max_size {
            return Some("size");
        }
        if self.exclude_sizes.contains(&summary.body_size) {
            return Some("size");
        }

        None
    }

    /// Filters applied after the calibration check: text, regex,
    /// redirect, similarity. First hit drops.
    pub fn excluded_late(&self, summary: &ResponseSummary) -> Option<&'static str> {
        if !self.exclude_texts.is_empty() {
            let text = summary.text();
            if self.exclude_texts.iter().any(|t| text.contains(t.as_str())) {
                return Some("text");
            }
        }

        if let Some(re) = self.exclude_regex.as_ref() {
            if re.is_match(&summary.text()) {
                return Some("regex");
            }
        }

        if let Some(re) = self.exclude_redirect.as_ref() {
            if let Some(target) = summary.redirect_target() {
                if re.is_match(target) {
                    return Some("redirect");
                }
            }
        }

        if let Some(reference) = self.similarity_ref.as_ref() {
            if reference.status == summary.status {
                let normalized = normalize_body(&summary.text());
                if shingle_similarity(&reference.normalized_body, &normalized)
                    >= SIMILARITY_THRESHOLD
                {
                    return Some("similar");
                }
            }
        }

        None
    }
}

/// Statuses with shipped path blacklists (`<dir>/<status>_blacklist.txt`).
pub const BLACKLIST_STATUSES: [u16; 3] = [400, 403, 500];

/// Loads the per-status path blacklists. Missing files are skipped;
/// these lists are an optimization, not configuration.
pub fn load_blacklists(dir: &std::path::Path) -> HashMap<u16, Vec<String>> {
    let mut out = HashMap::new();
    for status in BLACKLIST_STATUSES {
        let path = dir.join(format!("{status}_blacklist.txt"));
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        let entries: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| crate::utils::lstrip_once(line, '/').to_string())
            .collect();
        if !entries.is_empty() {
            out.insert(status, entries);
        }
    }
    out
}
