use crate::dictionary::{Candidate, CandidateOrigin};
use crate::utils::StatusRanges;

/// Decides which kept results spawn sub-scans. Depth is bounded by
/// `max_depth` (zero means unbounded); candidates of mutation origin
/// never recurse.
#[derive(Clone, Debug)]
pub struct RecursionPolicy {
    pub enabled: bool,
    pub force: bool,
    pub deep: bool,
    pub max_depth: usize,
    pub status: StatusRanges,
    pub exclude_subdirs: Vec<String>,
}

impl RecursionPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            force: false,
            deep: false,
            max_depth: 0,
            status: StatusRanges::default(),
            exclude_subdirs: Vec::new(),
        }
    }

    fn depth_allows(&self, depth: usize) -> bool {
        self.max_depth == 0 || depth < self.max_depth
    }

    fn is_excluded(&self, prefix: &str) -> bool {
        let cleaned = prefix.trim_matches('/');
        self.exclude_subdirs.iter().any(|excluded| {
            let excluded = excluded.trim_matches('/');
            !excluded.is_empty()
                && (cleaned == excluded || cleaned.starts_with(&format!("{excluded}/")))
        })
    }

    /// The sub-scan prefix derived from a kept result, if the result
    /// qualifies. Non-directory paths only qualify under force-recursive
    /// and are treated as directories by appending a slash.
    pub fn descend(&self, candidate: &Candidate, status: u16) -> Option<String> {
        if !self.enabled {
            return None;
        }
        if candidate.origin == CandidateOrigin::Mutation {
            return None;
        }
        if !candidate.is_directory() && !self.force {
            return None;
        }
        if !self.status.contains(status) {
            return None;
        }
        if !self.depth_allows(candidate.depth) {
            return None;
        }

        let prefix = if candidate.is_directory() {
            candidate.path.clone()
        } else {
            format!("{}/", candidate.path)
        };
        if self.is_excluded(&prefix) {
            return None;
        }
        Some(prefix)
    }

    /// Ancestor directories enqueued under deep-recursive: every proper
    /// ancestor of a kept result's path, innermost last.
    pub fn ancestors(&self, candidate: &Candidate) -> Vec<String> {
        if !self.enabled || !self.deep {
            return Vec::new();
        }
        if candidate.origin == CandidateOrigin::Mutation {
            return Vec::new();
        }
        if !self.depth_allows(candidate.depth) {
            return Vec::new();
        }

        let path = candidate.path.trim_end_matches('/');
        let mut out = Vec::new();
        let mut end = 0;
        for (idx, ch) in path.char_indices() {
            if ch == '/' {
                end = idx + 1;
                let ancestor = &path[..end];
                if !self.is_excluded(ancestor) {
                    out.push(ancestor.to_string());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_status_ranges;

    fn policy(max_depth: usize) -> RecursionPolicy {
        RecursionPolicy {
            enabled: true,
            force: false,
            deep: false,
            max_depth,
            status: parse_status_ranges("200-299,300-399").unwrap(),
            exclude_subdirs: Vec::new(),
        }
    }

    fn candidate(path: &str, depth: usize) -> Candidate {
        Candidate::new(path.to_string(), depth, CandidateOrigin::Seed)
    }

    #[test]
    fn directories_with_matching_status_descend() {
        let p = policy(2);
        assert_eq!(p.descend(&candidate("api/", 0), 200), Some("api/".to_string()));
        assert_eq!(p.descend(&candidate("api/", 0), 404), None);
        assert_eq!(p.descend(&candidate("api.php", 0), 200), None);
    }

    #[test]
    fn depth_bound_is_enforced() {
        let p = policy(2);
        assert!(p.descend(&candidate("a/", 0), 200).is_some());
        assert!(p.descend(&candidate("a/b/", 1), 200).is_some());
        assert!(p.descend(&candidate("a/b/c/", 2), 200).is_none());
    }

    #[test]
    fn zero_max_depth_means_unbounded() {
        let p = policy(0);
        assert!(p.descend(&candidate("deep/", 40), 200).is_some());
    }

    #[test]
    fn force_recursive_descends_into_files() {
        let mut p = policy(3);
        p.force = true;
        assert_eq!(
            p.descend(&candidate("api.php", 0), 200),
            Some("api.php/".to_string())
        );
    }

    #[test]
    fn excluded_subdirs_never_descend() {
        let mut p = policy(3);
        p.exclude_subdirs = vec!["static".to_string()];
        assert_eq!(p.descend(&candidate("static/", 0), 200), None);
        assert_eq!(p.descend(&candidate("static/img/", 1), 200), None);
        assert!(p.descend(&candidate("api/", 0), 200).is_some());
    }

    #[test]
    fn mutation_candidates_never_recurse() {
        let p = policy(3);
        let mutant = Candidate::new("api/".to_string(), 0, CandidateOrigin::Mutation);
        assert_eq!(p.descend(&mutant, 200), None);
        let mut deep = p.clone();
        deep.deep = true;
        assert!(deep.ancestors(&mutant).is_empty());
    }

    #[test]
    fn deep_recursive_collects_ancestors() {
        let mut p = policy(4);
        p.deep = true;
        let found = candidate("a/b/c/file.txt", 0);
        assert_eq!(p.ancestors(&found), vec!["a/", "a/b/", "a/b/c/"]);
        // Disabled without the deep flag.
        assert!(policy(4).ancestors(&found).is_empty());
    }
}
