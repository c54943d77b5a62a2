use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::executor::{RequestExecutor, RequestSpec, ResponseSummary, TransportError};
use crate::output::MemorySink;
use crate::runner::{Scanner, TargetOutcome};
use crate::waf::WafDatabase;

const BASE: &str = "http://target.test/";

/// In-memory origin: fixed routes, everything else answers the default
/// (a stable soft-404 the calibrator learns to suppress).
struct MockOrigin {
    routes: HashMap<String, (u16, String, Vec<(String, String)>)>,
    default: (u16, String),
    fail_everything: bool,
    requests: std::sync::Mutex<Vec<String>>,
}

impl MockOrigin {
    fn new() -> Self {
        Self {
            routes: HashMap::new(),
            default: (404, "not here".to_string()),
            fail_everything: false,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn route(mut self, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .insert(path.to_string(), (status, body.to_string(), Vec::new()));
        self
    }

    fn requested_paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RequestExecutor for MockOrigin {
    fn execute<'a>(
        &'a self,
        spec: &'a RequestSpec,
    ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>> {
        Box::pin(async move {
            let path = spec
                .url
                .strip_prefix(BASE)
                .unwrap_or(spec.url.as_str())
                .to_string();
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(path.clone());

            if self.fail_everything {
                return Err(TransportError::Connect {
                    url: spec.url.clone(),
                    message: "refused".to_string(),
                });
            }

            let (status, body, extra_headers) = match self.routes.get(&path) {
                Some((status, body, headers)) => (*status, body.clone(), headers.clone()),
                None => (self.default.0, self.default.1.clone(), Vec::new()),
            };
            let mut headers: HashMap<String, String> = HashMap::new();
            for (name, value) in extra_headers {
                headers.insert(name, value);
            }
            Ok(ResponseSummary {
                status,
                body_size: body.len(),
                body: body.into_bytes(),
                headers,
                final_url: spec.url.clone(),
                redirect_chain: Vec::new(),
                elapsed_ms: 1,
                retry_count: 0,
            })
        })
    }
}

fn wordlist(name: &str, entries: &[&str]) -> PathBuf {
    let path =
        std::env::temp_dir().join(format!("dirprobe-it-{}-{}.txt", std::process::id(), name));
    std::fs::write(&path, entries.join("\n")).unwrap();
    path
}

fn base_config(wordlist: PathBuf) -> ScanConfig {
    ScanConfig {
        urls: vec![BASE.to_string()],
        wordlists: vec![wordlist],
        threads: 4,
        blacklist_dir: None,
        ..Default::default()
    }
}

fn scanner(config: ScanConfig, origin: Arc<MockOrigin>, sink: Arc<MemorySink>) -> Scanner {
    Scanner::new(
        config,
        origin,
        Arc::new(WafDatabase::builtin()),
        vec![Box::new(sink)],
    )
    .unwrap()
}

#[tokio::test]
async fn discovery_with_calibration_and_recursion() {
    let words = wordlist("discovery", &["admin/", "index.%EXT%", "secret"]);
    let origin = Arc::new(
        MockOrigin::new()
            .route("admin/", 200, "<html>directory listing</html>")
            .route("index.php", 200, "<html>welcome to the app</html>")
            .route("admin/secret", 200, "top secret configuration data"),
    );
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.extensions = vec!["php".to_string()];
    config.recursive = true;
    config.recursion_depth = 2;
    let scanner = scanner(config, origin.clone(), sink.clone());

    let report = scanner.run(&CancellationToken::new()).await;
    std::fs::remove_file(words).ok();

    assert_eq!(report.targets.len(), 1);
    assert_eq!(report.targets[0].outcome, TargetOutcome::Completed);
    assert!(!report.interrupted);
    assert!(report.fatal_error.is_none());

    let records = sink.records();
    let mut paths: Vec<String> = records.iter().map(|r| r.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["admin/", "admin/secret", "index.php"]);

    // Wildcard 404s were calibrated away, not reported.
    assert!(records.iter().all(|r| r.status == 200));
    // The sub-scan candidate carries its recursion depth.
    let secret = records.iter().find(|r| r.path == "admin/secret").unwrap();
    assert_eq!(secret.depth, 1);
    // At-most-once delivery.
    let unique: std::collections::HashSet<_> = records.iter().map(|r| r.path.clone()).collect();
    assert_eq!(unique.len(), records.len());
    // The sub-scan actually probed under the discovered directory.
    assert!(origin
        .requested_paths()
        .iter()
        .any(|p| p == "admin/index.php"));
}

#[tokio::test]
async fn skip_on_status_cancels_the_target() {
    let words = wordlist("skip", &["blocked", "later1", "later2"]);
    let origin = Arc::new(MockOrigin::new().route("blocked", 429, "slow down"));
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.no_wildcard = true;
    config.skip_on_status = crate::utils::parse_status_ranges("429").unwrap();
    config.threads = 1;
    let scanner = scanner(config, origin, sink.clone());

    let report = scanner.run(&CancellationToken::new()).await;
    std::fs::remove_file(words).ok();

    assert_eq!(
        report.targets[0].outcome,
        TargetOutcome::SkippedOnStatus(429)
    );
    // The 429 itself is not a finding.
    assert!(sink.records().iter().all(|r| r.status != 429));
}

#[tokio::test]
async fn duplicate_signatures_stop_at_the_threshold() {
    let entries = ["a", "b", "c", "d", "e"];
    let words = wordlist("threshold", &entries);
    let mut origin = MockOrigin::new();
    for entry in entries {
        origin = origin.route(entry, 200, "identical page body every single time");
    }
    let origin = Arc::new(origin);
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.no_wildcard = true;
    config.filter_threshold = 2;
    config.threads = 1;
    let scanner = scanner(config, origin, sink.clone());

    let report = scanner.run(&CancellationToken::new()).await;
    std::fs::remove_file(words).ok();

    assert_eq!(report.targets[0].outcome, TargetOutcome::Completed);
    assert_eq!(sink.records().len(), 2);
    assert_eq!(report.targets[0].stats.kept, 2);
    assert_eq!(report.targets[0].stats.filtered, 3);
}

#[tokio::test]
async fn mutation_probes_variants_but_never_mutates_them() {
    let words = wordlist("mutation", &["admin.php"]);
    let origin = Arc::new(
        MockOrigin::new()
            .route("admin.php", 200, "<html>admin panel login form</html>")
            .route("admin.php.bak", 200, "raw php source of the admin panel"),
    );
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.no_wildcard = true;
    config.mutation = true;
    // Without calibration the 404 noise has to go through a status filter.
    config.exclude_status = crate::utils::parse_status_ranges("404").unwrap();
    let scanner = scanner(config, origin.clone(), sink.clone());

    let report = scanner.run(&CancellationToken::new()).await;
    std::fs::remove_file(words).ok();

    assert_eq!(report.targets[0].outcome, TargetOutcome::Completed);
    let mut paths: Vec<String> = sink.records().iter().map(|r| r.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["admin.php", "admin.php.bak"]);

    // The kept backup is itself a mutation result and spawns nothing.
    for probed in origin.requested_paths() {
        assert!(
            !probed.ends_with(".bak.bak") && !probed.ends_with(".bak.old"),
            "second-generation mutant probed: {probed}"
        );
    }
}

#[tokio::test]
async fn exhausted_transport_errors_drop_candidates_silently() {
    let words = wordlist("transport", &["one", "two"]);
    let mut origin = MockOrigin::new();
    origin.fail_everything = true;
    let origin = Arc::new(origin);
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.no_wildcard = true;
    config.retries = 0;
    let scanner = scanner(config, origin, sink.clone());

    let report = scanner.run(&CancellationToken::new()).await;
    std::fs::remove_file(words).ok();

    assert_eq!(report.targets[0].outcome, TargetOutcome::Completed);
    assert!(sink.records().is_empty());
    assert_eq!(report.targets[0].stats.errors, 2);
    assert!(report.fatal_error.is_none());
}

#[tokio::test]
async fn exit_on_error_turns_transport_failure_fatal() {
    let words = wordlist("fatal", &["one", "two"]);
    let mut origin = MockOrigin::new();
    origin.fail_everything = true;
    let origin = Arc::new(origin);
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.no_wildcard = true;
    config.retries = 0;
    config.exit_on_error = true;
    let scanner = scanner(config, origin, sink.clone());

    let report = scanner.run(&CancellationToken::new()).await;
    std::fs::remove_file(words).ok();

    assert!(report.fatal_error.is_some());
}

#[tokio::test]
async fn external_cancellation_marks_the_scan_interrupted() {
    let words = wordlist("interrupt", &["one", "two", "three"]);
    let origin = Arc::new(MockOrigin::new());
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.no_wildcard = true;
    let scanner = scanner(config, origin, sink);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = scanner.run(&cancel).await;
    std::fs::remove_file(words).ok();

    assert!(report.interrupted);
    assert!(!report.any_completed());
}

#[tokio::test]
async fn exclude_subdirs_suppresses_recursion() {
    let words = wordlist("exclsub", &["static/", "api/"]);
    let origin = Arc::new(
        MockOrigin::new()
            .route("static/", 200, "<html>static asset index</html>")
            .route("api/", 200, "{\"endpoints\": [\"users\", \"things\"]}"),
    );
    let sink = Arc::new(MemorySink::new());

    let mut config = base_config(words.clone());
    config.no_wildcard = true;
    config.recursive = true;
    config.recursion_depth = 1;
    config.exclude_subdirs = vec!["static".to_string()];
    let scanner = scanner(config, origin.clone(), sink);

    let report = scanner.run(&CancellationToken::new()).await;
    std::fs::remove_file(words).ok();

    assert_eq!(report.targets[0].outcome, TargetOutcome::Completed);
    let probed = origin.requested_paths();
    assert!(probed.iter().any(|p| p.starts_with("api/") && p != "api/"));
    assert!(!probed.iter().any(|p| p.starts_with("static/") && p != "static/"));
}
