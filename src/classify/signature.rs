use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use regex::Regex;
use sha2::{Digest, Sha256};

/// Size buckets are 32 bytes wide; two responses landing in the same
/// bucket count as the same size for calibration and signatures.
pub const SIZE_BUCKET: usize = 32;

/// How much of the normalized body feeds the duplicate signature.
const SIGNATURE_BODY_PREFIX: usize = 512;

fn hex_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9a-fA-F]{8,}").unwrap())
}

fn digit_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

pub fn size_bucket(size: usize) -> usize {
    (size + SIZE_BUCKET / 2) / SIZE_BUCKET * SIZE_BUCKET
}

/// Collapses random-looking tokens so reflected request paths, session
/// ids, and timestamps do not break body comparisons: long hex runs and
/// digit runs are replaced with fixed markers.
pub fn normalize_body(body: &str) -> String {
    let collapsed = hex_run_re().replace_all(body, "\u{1}");
    digit_run_re().replace_all(&collapsed, "\u{2}").into_owned()
}

/// Stable fingerprint of a whole normalized body, used by calibration.
pub fn body_fingerprint(normalized_body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Duplicate-suppression signature over (status, size bucket, normalized
/// body prefix). Identical inputs always produce identical signatures.
pub fn response_signature(status: u16, body_size: usize, normalized_body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(status.to_be_bytes());
    hasher.update((size_bucket(body_size) as u64).to_be_bytes());
    let mut prefix_end = normalized_body.len().min(SIGNATURE_BODY_PREFIX);
    while !normalized_body.is_char_boundary(prefix_end) {
        prefix_end -= 1;
    }
    hasher.update(normalized_body[..prefix_end].as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Jaccard similarity over 4-byte shingles of two normalized bodies.
pub fn shingle_similarity(a: &str, b: &str) -> f64 {
    let sa = shingles(a.as_bytes());
    let sb = shingles(b.as_bytes());
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    let union = sa.len() + sb.len() - intersection;
    intersection as f64 / union as f64
}

fn shingles(data: &[u8]) -> HashSet<u32> {
    data.windows(4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
        .collect()
}

/// Per-target duplicate accounting. `admit` is an atomic check-and-count:
/// it returns false once `threshold` responses with the same signature
/// have already been admitted. A threshold of zero disables suppression.
#[derive(Debug)]
pub struct DuplicateCounts {
    counts: Mutex<HashMap<String, u32>>,
    threshold: u32,
}

impl DuplicateCounts {
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            threshold,
        }
    }

    pub fn admit(&self, signature: &str) -> bool {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(signature.to_string()).or_insert(0);
        if self.threshold > 0 && *count >= self.threshold {
            return false;
        }
        *count += 1;
        true
    }

    pub fn seen(&self, signature: &str) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(signature)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_bucket_rounds_to_nearest_32() {
        assert_eq!(size_bucket(0), 0);
        assert_eq!(size_bucket(15), 0);
        assert_eq!(size_bucket(16), 32);
        assert_eq!(size_bucket(100), 96);
        assert_eq!(size_bucket(113), 128);
    }

    #[test]
    fn normalization_collapses_random_tokens() {
        let a = normalize_body("session 4f2a9c81e77b id 12345");
        let b = normalize_body("session 99ddeeff0011 id 777");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_is_stable_for_identical_inputs() {
        let body = normalize_body("<html>Not Found 382</html>");
        let a = response_signature(404, 120, &body);
        let b = response_signature(404, 130, &body);
        assert_eq!(a, b, "same bucket, same signature");
        let c = response_signature(404, 200, &body);
        assert_ne!(a, c, "different bucket, different signature");
    }

    #[test]
    fn similar_bodies_score_high_distinct_bodies_low() {
        let a = "<html><body>Welcome to the staging portal, please log in</body></html>";
        let b = "<html><body>Welcome to the staging portal, please log on</body></html>";
        assert!(shingle_similarity(a, b) > 0.8);
        let c = "{\"error\": \"route not registered\"}";
        assert!(shingle_similarity(a, c) < 0.2);
    }

    #[test]
    fn duplicate_counts_respect_the_threshold() {
        let counts = DuplicateCounts::new(3);
        assert!(counts.admit("sig"));
        assert!(counts.admit("sig"));
        assert!(counts.admit("sig"));
        assert!(!counts.admit("sig"));
        assert!(!counts.admit("sig"));
        assert_eq!(counts.seen("sig"), 3);
        assert!(counts.admit("other"));
    }

    #[test]
    fn zero_threshold_disables_suppression() {
        let counts = DuplicateCounts::new(0);
        for _ in 0..100 {
            assert!(counts.admit("sig"));
        }
    }
}
