use std::collections::{HashMap, HashSet};

use rand::Rng;
use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::classify::signature::{body_fingerprint, normalize_body, size_bucket};
use crate::dispatch::{execute_with_retries, DispatchOutcome, GlobalLimiter, RetryPolicy, TargetGate};
use crate::executor::{RequestExecutor, RequestSpec, ResponseSummary};

/// Number of wildcard probes issued per target.
pub const PROBE_COUNT: usize = 4;
/// A bucket is trusted once this many probes agree on it.
const AGREEMENT: usize = 2;
const TOKEN_LENGTH: usize = 16;
const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("all {count} calibration probes failed against {base_url}")]
    AllProbesFailed { base_url: String, count: usize },

    #[error("calibration cancelled")]
    Cancelled,
}

pub fn random_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

/// What the origin answers for paths that cannot exist. Built once per
/// target before real probing and immutable afterwards; a later response
/// matching any trusted bucket is a wildcard hit.
#[derive(Debug, Default)]
pub struct CalibrationData {
    status_sizes: HashSet<(u16, usize)>,
    body_hashes: HashSet<String>,
    redirect_pattern: Option<Regex>,
}

impl CalibrationData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.status_sizes.is_empty() && self.body_hashes.is_empty() && self.redirect_pattern.is_none()
    }

    /// Marks one response as a known wildcard. Used by the calibrator for
    /// trusted buckets and by tests to fabricate calibration state.
    pub fn trust_response(&mut self, summary: &ResponseSummary) {
        self.status_sizes
            .insert((summary.status, size_bucket(summary.body_size)));
        self.body_hashes
            .insert(body_fingerprint(&normalize_body(&summary.text())));
    }

    pub fn matches(&self, summary: &ResponseSummary) -> bool {
        if self
            .status_sizes
            .contains(&(summary.status, size_bucket(summary.body_size)))
        {
            return true;
        }
        if !self.body_hashes.is_empty()
            && self
                .body_hashes
                .contains(&body_fingerprint(&normalize_body(&summary.text())))
        {
            return true;
        }
        if let (Some(re), Some(target)) = (self.redirect_pattern.as_ref(), summary.redirect_target())
        {
            if re.is_match(target) {
                return true;
            }
        }
        false
    }
}

/// Probes random non-existent paths and distills the buckets at least
/// [`AGREEMENT`] probes agree on. Probes alternate between plain tokens
/// and tokens carrying a sample extension so extension-sensitive
/// wildcards are caught too.
pub async fn calibrate(
    executor: &dyn RequestExecutor,
    make_spec: &dyn Fn(&str) -> RequestSpec,
    policy: &RetryPolicy,
    limiter: &GlobalLimiter,
    gate: &TargetGate,
    cancel: &CancellationToken,
    base_url: &str,
    sample_extension: Option<&str>,
) -> Result<CalibrationData, CalibrationError> {
    let mut responses: Vec<(String, ResponseSummary)> = Vec::new();

    for probe in 0..PROBE_COUNT {
        if cancel.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }

        let token = random_token(TOKEN_LENGTH);
        let path = match sample_extension {
            Some(ext) if probe % 2 == 1 => format!("{token}.{ext}"),
            _ => token.clone(),
        };

        limiter.acquire().await;
        gate.acquire().await;
        let spec = make_spec(&path);
        match execute_with_retries(executor, &spec, policy, cancel).await {
            DispatchOutcome::Response(summary) => responses.push((token, summary)),
            DispatchOutcome::Exhausted(err) => {
                log::debug!("calibration probe against {base_url} failed: {err}");
            }
            DispatchOutcome::Cancelled => return Err(CalibrationError::Cancelled),
        }
    }

    if responses.is_empty() {
        return Err(CalibrationError::AllProbesFailed {
            base_url: base_url.to_string(),
            count: PROBE_COUNT,
        });
    }

    Ok(distill(&responses))
}

fn distill(responses: &[(String, ResponseSummary)]) -> CalibrationData {
    let mut status_size_votes: HashMap<(u16, usize), usize> = HashMap::new();
    let mut hash_votes: HashMap<String, usize> = HashMap::new();
    let mut redirect_votes: HashMap<String, usize> = HashMap::new();

    for (token, summary) in responses {
        *status_size_votes
            .entry((summary.status, size_bucket(summary.body_size)))
            .or_insert(0) += 1;
        *hash_votes
            .entry(body_fingerprint(&normalize_body(&summary.text())))
            .or_insert(0) += 1;
        if (300..400).contains(&summary.status) {
            if let Some(target) = summary.redirect_target() {
                // The probe token is replaced by a marker so probes that
                // reflect the requested path agree on one template.
                let template = target.replace(token.as_str(), "\u{0}");
                *redirect_votes.entry(template).or_insert(0) += 1;
            }
        }
    }

    let status_sizes = status_size_votes
        .into_iter()
        .filter(|(_, votes)| *votes >= AGREEMENT)
        .map(|(bucket, _)| bucket)
        .collect();
    let body_hashes = hash_votes
        .into_iter()
        .filter(|(_, votes)| *votes >= AGREEMENT)
        .map(|(hash, _)| hash)
        .collect();

    let redirect_pattern = redirect_votes
        .into_iter()
        .filter(|(_, votes)| *votes >= AGREEMENT)
        .map(|(template, _)| template)
        .next()
        .and_then(|template| {
            let escaped = regex::escape(&template).replace('\u{0}', "[a-z0-9]+");
            Regex::new(&format!("^{escaped}$")).ok()
        });

    CalibrationData {
        status_sizes,
        body_hashes,
        redirect_pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn summary(status: u16, body: &str, location: Option<&str>) -> ResponseSummary {
        let mut headers = Map::new();
        if let Some(location) = location {
            headers.insert("location".to_string(), location.to_string());
        }
        ResponseSummary {
            status,
            body: body.as_bytes().to_vec(),
            body_size: body.len(),
            headers,
            final_url: "http://example.com/x".to_string(),
            redirect_chain: Vec::new(),
            elapsed_ms: 1,
            retry_count: 0,
        }
    }

    #[test]
    fn random_tokens_are_lowercase_alphanumeric() {
        let token = random_token(16);
        assert_eq!(token.len(), 16);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(random_token(16), random_token(16));
    }

    #[test]
    fn agreed_buckets_are_trusted_and_matched() {
        let body = "Page not found";
        let responses = vec![
            ("aaaaaaaaaaaaaaaa".to_string(), summary(200, body, None)),
            ("bbbbbbbbbbbbbbbb".to_string(), summary(200, body, None)),
            ("cccccccccccccccc".to_string(), summary(500, "boom", None)),
            ("dddddddddddddddd".to_string(), summary(200, body, None)),
        ];
        let data = distill(&responses);

        assert!(data.matches(&summary(200, body, None)));
        // The lone 500 never reached agreement.
        assert!(!data.matches(&summary(500, "boom", None)));
        assert!(!data.matches(&summary(200, &"x".repeat(4096), None)));
    }

    #[test]
    fn reflected_redirects_become_a_pattern() {
        let responses = vec![
            (
                "aaaaaaaaaaaaaaaa".to_string(),
                summary(301, "", Some("/landing?from=aaaaaaaaaaaaaaaa")),
            ),
            (
                "bbbbbbbbbbbbbbbb".to_string(),
                summary(301, "", Some("/landing?from=bbbbbbbbbbbbbbbb")),
            ),
        ];
        let data = distill(&responses);

        let hit = summary(301, "", Some("/landing?from=zzzz9999zzzz9999"));
        assert!(data.matches(&hit));
        // Different status and body bucket, unrelated redirect target.
        let miss = summary(302, "redirecting you to the portal", Some("/admin"));
        assert!(!data.matches(&miss));
    }

    #[test]
    fn empty_data_matches_nothing() {
        let data = CalibrationData::empty();
        assert!(data.is_empty());
        assert!(!data.matches(&summary(200, "anything", None)));
    }
}
