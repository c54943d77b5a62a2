pub mod stream;

use std::sync::OnceLock;

use itertools::iproduct;
use regex::Regex;

pub use self::stream::{CaseTransforms, WordlistError, WordlistStream};

/// Placeholder substituted with each configured extension, matched
/// case-insensitively (`%EXT%`, `%ext%`, ...).
const EXTENSION_TAG: &str = r"(?i)%ext%";

/// A trailing extension the overwrite rule recognizes.
const EXTENSION_RECOGNITION: &str = r"\.[a-zA-Z0-9]{1,9}$";

fn ext_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EXTENSION_TAG).unwrap())
}

fn ext_recognition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EXTENSION_RECOGNITION).unwrap())
}

/// Where a candidate came from. Mutation-derived candidates are never
/// mutated again and never spawn sub-scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateOrigin {
    Seed,
    Mutation,
    Recursion,
}

/// One concrete path about to be probed against one target. Immutable;
/// discarded after classification.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub path: String,
    pub extension: Option<String>,
    pub depth: usize,
    pub origin: CandidateOrigin,
}

impl Candidate {
    pub fn new(path: String, depth: usize, origin: CandidateOrigin) -> Self {
        let extension = final_extension(&path);
        Self {
            path,
            extension,
            depth,
            origin,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }
}

/// Extension of the last path segment, if any.
pub fn final_extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// The pure entry → paths transformation. Given the same entry and the
/// same rules it always produces the same sequence, so expansion is
/// restartable.
#[derive(Clone, Debug, Default)]
pub struct ExpanderRules {
    pub extensions: Vec<String>,
    pub force_extensions: bool,
    pub overwrite_extensions: bool,
    pub exclude_extensions: Vec<String>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl ExpanderRules {
    pub fn expand(&self, entry: &str) -> Vec<String> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Vec::new();
        }

        let mut base: Vec<String> = Vec::new();
        if ext_tag_re().is_match(entry) {
            for ext in self.extensions.iter() {
                base.push(ext_tag_re().replace_all(entry, ext.as_str()).to_string());
            }
        } else if self.force_extensions && !entry.ends_with('/') {
            base.push(entry.to_string());
            if !entry.contains('.') {
                base.push(format!("{entry}/"));
            }
            for ext in self.extensions.iter() {
                base.push(format!("{entry}.{ext}"));
            }
        } else if self.overwrite_extensions
            && !entry.contains('?')
            && !entry.contains('#')
            && ext_recognition_re().is_match(entry)
            && !self.has_configured_extension(entry)
        {
            base.push(entry.to_string());
            let stem = entry.rsplit_once('.').map(|(s, _)| s).unwrap_or(entry);
            for ext in self.extensions.iter() {
                base.push(format!("{stem}.{ext}"));
            }
        } else {
            base.push(entry.to_string());
        }

        base.retain(|path| !self.is_excluded(path));

        if self.prefixes.is_empty() && self.suffixes.is_empty() {
            return dedup_in_order(base);
        }

        let prefixes: Vec<&str> = if self.prefixes.is_empty() {
            vec![""]
        } else {
            self.prefixes.iter().map(|s| s.as_str()).collect()
        };
        let suffixes: Vec<&str> = if self.suffixes.is_empty() {
            vec![""]
        } else {
            self.suffixes.iter().map(|s| s.as_str()).collect()
        };

        let mut out: Vec<String> = Vec::new();
        for (path, (prefix, suffix)) in iproduct!(base.iter(), iproduct!(prefixes, suffixes)) {
            // Suffixes never attach to directory entries.
            let suffix = if path.ends_with('/') { "" } else { suffix };
            out.push(format!("{prefix}{path}{suffix}"));
        }
        dedup_in_order(out)
    }

    fn has_configured_extension(&self, entry: &str) -> bool {
        final_extension(entry)
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false)
    }

    fn is_excluded(&self, path: &str) -> bool {
        if self.exclude_extensions.is_empty() {
            return false;
        }
        final_extension(path)
            .map(|ext| {
                self.exclude_extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

fn dedup_in_order(paths: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    paths
        .into_iter()
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}
