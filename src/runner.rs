use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::calibrate::{self, CalibrationData, CalibrationError};
use crate::classify::filters::{load_blacklists, FilterChain, FilterChainBuilder, FilterError, SimilarityRef};
use crate::classify::Classifier;
use crate::config::ScanConfig;
use crate::dictionary::{Candidate, CandidateOrigin, CaseTransforms, ExpanderRules, WordlistStream};
use crate::dispatch::{execute_with_retries, DispatchOutcome, GlobalLimiter, RetryPolicy, TargetGate};
use crate::executor::{RequestExecutor, RequestSpec};
use crate::mutation;
use crate::output::{ResultRecord, Sink};
use crate::recursion::RecursionPolicy;
use crate::session::{PendingPrefix, SessionFile, TargetSession};
use crate::waf::WafDatabase;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no targets provided")]
    NoTargets,

    #[error("no wordlists provided")]
    NoWordlists,

    #[error("unreadable wordlist '{path}': {source}")]
    WordlistUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("invalid HTTP method: {method}")]
    InvalidMethod { method: String },

    #[error("thread count must be positive")]
    NoThreads,

    #[error(transparent)]
    Filter(#[from] FilterError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetOutcome {
    Completed,
    DeadlineExpired,
    SkippedOnStatus(u16),
    SetupFailed(String),
    Cancelled,
}

#[derive(Clone, Debug, Default)]
pub struct TargetStats {
    pub requests: u64,
    pub kept: u64,
    pub filtered: u64,
    pub errors: u64,
}

#[derive(Clone, Debug)]
pub struct TargetReport {
    pub base_url: String,
    pub outcome: TargetOutcome,
    pub stats: TargetStats,
}

#[derive(Clone, Debug, Default)]
pub struct ScanReport {
    pub targets: Vec<TargetReport>,
    pub interrupted: bool,
    pub fatal_error: Option<String>,
}

impl ScanReport {
    /// Whether at least one target was scanned to termination.
    pub fn any_completed(&self) -> bool {
        self.targets.iter().any(|t| {
            matches!(
                t.outcome,
                TargetOutcome::Completed
                    | TargetOutcome::DeadlineExpired
                    | TargetOutcome::SkippedOnStatus(_)
            )
        })
    }

    /// Resume state for the session file: targets that did not complete,
    /// with their progress counters.
    pub fn session_state(&self) -> SessionFile {
        let targets = self
            .targets
            .iter()
            .filter(|t| !matches!(t.outcome, TargetOutcome::Completed))
            .map(|t| TargetSession {
                base_url: t.base_url.clone(),
                pending: vec![PendingPrefix {
                    prefix: String::new(),
                    depth: 0,
                }],
                requests: t.stats.requests,
                kept: t.stats.kept,
                filtered: t.stats.filtered,
                errors: t.stats.errors,
            })
            .collect();
        SessionFile::new(targets)
    }
}

#[derive(Default)]
struct StatsCells {
    requests: AtomicU64,
    kept: AtomicU64,
    filtered: AtomicU64,
    errors: AtomicU64,
}

impl StatsCells {
    fn snapshot(&self) -> TargetStats {
        TargetStats {
            requests: self.requests.load(Ordering::Relaxed),
            kept: self.kept.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct FatalFlag {
    hit: AtomicBool,
    message: std::sync::Mutex<Option<String>>,
}

impl FatalFlag {
    fn trigger(&self, message: String) {
        if !self.hit.swap(true, Ordering::SeqCst) {
            *self.message.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
        }
    }

    fn is_hit(&self) -> bool {
        self.hit.load(Ordering::SeqCst)
    }

    fn message(&self) -> Option<String> {
        self.message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Immutable per-target request context: base URL, method, and the
/// header set applied to every probe.
struct TargetContext {
    base_url: String,
    method: reqwest::Method,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl TargetContext {
    fn spec(&self, path: &str) -> RequestSpec {
        RequestSpec {
            method: self.method.clone(),
            url: format!("{}{}", self.base_url, path),
            headers: self.headers.clone(),
            body: None,
            timeout: self.timeout,
        }
    }
}

/// Everything a worker needs for one scan pass over one prefix.
struct PassContext {
    config: Arc<ScanConfig>,
    executor: Arc<dyn RequestExecutor>,
    target: Arc<TargetContext>,
    classifier: Arc<Classifier>,
    recursion: Arc<RecursionPolicy>,
    limiter: Arc<GlobalLimiter>,
    gate: Arc<TargetGate>,
    policy: RetryPolicy,
    token: CancellationToken,
    stats: Arc<StatsCells>,
    emitted: Arc<std::sync::Mutex<HashSet<u64>>>,
    record_tx: mpsc::UnboundedSender<ResultRecord>,
    derived_tx: mpsc::UnboundedSender<Candidate>,
    disc_tx: mpsc::UnboundedSender<(String, usize)>,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    skip_status: Arc<AtomicU32>,
    fatal: Arc<FatalFlag>,
}

fn mark_emitted(set: &std::sync::Mutex<HashSet<u64>>, path: &str) -> bool {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    set.lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(hasher.finish())
}

/// The scan coordinator: drives per-target scans, owns the candidate
/// queue and the pending sub-scan prefixes, and dispatches kept records
/// to the attached sinks. Recursion is a queue of prefixes processed in
/// passes, never nested control flow.
pub struct Scanner {
    config: Arc<ScanConfig>,
    executor: Arc<dyn RequestExecutor>,
    waf: Arc<WafDatabase>,
    sinks: Arc<Vec<Box<dyn Sink>>>,
    method: reqwest::Method,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        executor: Arc<dyn RequestExecutor>,
        waf: Arc<WafDatabase>,
        sinks: Vec<Box<dyn Sink>>,
    ) -> Result<Self, ScanError> {
        if config.urls.is_empty() {
            return Err(ScanError::NoTargets);
        }
        if config.wordlists.is_empty() {
            return Err(ScanError::NoWordlists);
        }
        if config.threads == 0 {
            return Err(ScanError::NoThreads);
        }
        for path in config.wordlists.iter() {
            std::fs::metadata(path).map_err(|e| ScanError::WordlistUnreadable {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        for url in config.urls.iter() {
            if reqwest::Url::parse(url).is_err() {
                return Err(ScanError::InvalidUrl { url: url.clone() });
            }
        }
        let method = reqwest::Method::from_bytes(config.http_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ScanError::InvalidMethod {
                method: config.http_method.clone(),
            })?;

        // Fail on malformed filter regexes before any target is probed.
        build_filter_chain(&config, None)?;

        Ok(Self {
            config: Arc::new(config),
            executor,
            waf,
            sinks: Arc::new(sinks),
            method,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub async fn run(&self, cancel: &CancellationToken) -> ScanReport {
        let scan_token = cancel.child_token();
        let scan_done = CancellationToken::new();
        if let Some(max_time) = self.config.max_time {
            let token = scan_token.clone();
            let done = scan_done.clone();
            task::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(max_time) => token.cancel(),
                    _ = done.cancelled() => {}
                }
            });
        }

        let limiter = GlobalLimiter::new(self.config.max_rate);
        let fatal = Arc::new(FatalFlag::default());

        let (record_tx, record_rx) = mpsc::unbounded_channel::<ResultRecord>();
        let pump = task::spawn(sink_pump(self.sinks.clone(), record_rx));

        let mut report = ScanReport::default();
        for url in self.config.urls.iter() {
            if scan_token.is_cancelled() || fatal.is_hit() {
                break;
            }
            let target_report = self
                .scan_target(url, &scan_token, &limiter, &fatal, &record_tx)
                .await;
            report.targets.push(target_report);
        }

        scan_done.cancel();
        drop(record_tx);
        let _ = pump.await;

        report.interrupted = cancel.is_cancelled();
        report.fatal_error = fatal.message();
        report
    }

    async fn scan_target(
        &self,
        url: &str,
        scan_token: &CancellationToken,
        limiter: &Arc<GlobalLimiter>,
        fatal: &Arc<FatalFlag>,
        record_tx: &mpsc::UnboundedSender<ResultRecord>,
    ) -> TargetReport {
        let base_url = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };

        let stats = Arc::new(StatsCells::default());
        let target_token = scan_token.child_token();
        let deadline_hit = Arc::new(AtomicBool::new(false));
        if let Some(ttl) = self.config.target_max_time {
            let token = target_token.clone();
            let hit = deadline_hit.clone();
            task::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(ttl) => {
                        hit.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            });
        }

        let target = Arc::new(TargetContext {
            base_url: base_url.clone(),
            method: self.method.clone(),
            headers: build_headers(&self.config),
            timeout: self.config.timeout,
        });
        let gate = Arc::new(TargetGate::new(self.config.delay));
        let policy = RetryPolicy {
            retries: self.config.retries,
        };

        let calibration = if self.config.no_wildcard {
            CalibrationData::empty()
        } else {
            let make_spec = |path: &str| target.spec(path);
            let sample_extension = self.config.extensions.first().map(|s| s.as_str());
            match calibrate::calibrate(
                self.executor.as_ref(),
                &make_spec,
                &policy,
                limiter,
                &gate,
                &target_token,
                &base_url,
                sample_extension,
            )
            .await
            {
                Ok(data) => data,
                Err(CalibrationError::Cancelled) => {
                    return TargetReport {
                        base_url,
                        outcome: TargetOutcome::Cancelled,
                        stats: stats.snapshot(),
                    };
                }
                Err(err) => {
                    if self.config.exit_on_error {
                        fatal.trigger(err.to_string());
                        target_token.cancel();
                    } else {
                        log::warn!("target setup failed, skipping: {err}");
                    }
                    return TargetReport {
                        base_url,
                        outcome: TargetOutcome::SetupFailed(err.to_string()),
                        stats: stats.snapshot(),
                    };
                }
            }
        };

        let similarity = match self.config.exclude_response.as_deref() {
            Some(path) => {
                let spec = target.spec(crate::utils::lstrip_once(path, '/'));
                match execute_with_retries(self.executor.as_ref(), &spec, &policy, &target_token)
                    .await
                {
                    DispatchOutcome::Response(summary) => {
                        Some(SimilarityRef::from_summary(&summary))
                    }
                    _ => {
                        log::warn!("could not fetch exclude-response reference '{path}'");
                        None
                    }
                }
            }
            None => None,
        };

        let chain = match build_filter_chain(&self.config, similarity) {
            Ok(chain) => chain,
            Err(err) => {
                return TargetReport {
                    base_url,
                    outcome: TargetOutcome::SetupFailed(err.to_string()),
                    stats: stats.snapshot(),
                };
            }
        };
        let classifier = Arc::new(Classifier::new(
            chain,
            calibration,
            self.waf.clone(),
            self.config.filter_threshold,
        ));

        let recursion = Arc::new(RecursionPolicy {
            enabled: self.config.recursive
                || self.config.deep_recursive
                || self.config.force_recursive,
            force: self.config.force_recursive,
            deep: self.config.deep_recursive,
            max_depth: self.config.recursion_depth,
            status: self.config.recursion_status.clone(),
            exclude_subdirs: self.config.exclude_subdirs.clone(),
        });

        let emitted = Arc::new(std::sync::Mutex::new(HashSet::<u64>::new()));
        let skip_status = Arc::new(AtomicU32::new(0));

        let mut pending: VecDeque<(String, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        if self.config.subdirs.is_empty() {
            pending.push_back((String::new(), 0));
            visited.insert(String::new());
        } else {
            for subdir in self.config.subdirs.iter() {
                let mut prefix = crate::utils::lstrip_once(subdir.trim(), '/').to_string();
                if !prefix.is_empty() && !prefix.ends_with('/') {
                    prefix.push('/');
                }
                if visited.insert(prefix.clone()) {
                    pending.push_back((prefix, 0));
                }
            }
        }

        while let Some((prefix, depth)) = pending.pop_front() {
            if target_token.is_cancelled() || fatal.is_hit() {
                break;
            }
            let discovered = self
                .run_pass(
                    &prefix,
                    depth,
                    &target,
                    &classifier,
                    &recursion,
                    limiter,
                    &gate,
                    policy,
                    &target_token,
                    &stats,
                    &emitted,
                    record_tx,
                    &skip_status,
                    fatal,
                )
                .await;
            for (new_prefix, new_depth) in discovered {
                if visited.insert(new_prefix.clone()) {
                    pending.push_back((new_prefix, new_depth));
                }
            }
        }

        let outcome = if fatal.is_hit() {
            TargetOutcome::Cancelled
        } else if deadline_hit.load(Ordering::SeqCst) {
            TargetOutcome::DeadlineExpired
        } else {
            match skip_status.load(Ordering::SeqCst) {
                0 if target_token.is_cancelled() => TargetOutcome::Cancelled,
                0 => TargetOutcome::Completed,
                status => TargetOutcome::SkippedOnStatus(status as u16),
            }
        };
        target_token.cancel();

        TargetReport {
            base_url,
            outcome,
            stats: stats.snapshot(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pass(
        &self,
        prefix: &str,
        depth: usize,
        target: &Arc<TargetContext>,
        classifier: &Arc<Classifier>,
        recursion: &Arc<RecursionPolicy>,
        limiter: &Arc<GlobalLimiter>,
        gate: &Arc<TargetGate>,
        policy: RetryPolicy,
        token: &CancellationToken,
        stats: &Arc<StatsCells>,
        emitted: &Arc<std::sync::Mutex<HashSet<u64>>>,
        record_tx: &mpsc::UnboundedSender<ResultRecord>,
        skip_status: &Arc<AtomicU32>,
        fatal: &Arc<FatalFlag>,
    ) -> Vec<(String, usize)> {
        let queue_cap = self.config.threads.saturating_mul(4).max(4);
        let (cand_tx, cand_rx) = mpsc::channel::<Candidate>(queue_cap);
        let cand_rx = Arc::new(tokio::sync::Mutex::new(cand_rx));
        let (derived_tx, mut derived_rx) = mpsc::unbounded_channel::<Candidate>();
        let (disc_tx, mut disc_rx) = mpsc::unbounded_channel::<(String, usize)>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());

        let pass = Arc::new(PassContext {
            config: self.config.clone(),
            executor: self.executor.clone(),
            target: target.clone(),
            classifier: classifier.clone(),
            recursion: recursion.clone(),
            limiter: limiter.clone(),
            gate: gate.clone(),
            policy,
            token: token.clone(),
            stats: stats.clone(),
            emitted: emitted.clone(),
            record_tx: record_tx.clone(),
            derived_tx,
            disc_tx,
            in_flight: in_flight.clone(),
            drained: drained.clone(),
            skip_status: skip_status.clone(),
            fatal: fatal.clone(),
        });

        // Producer: streams the expanded dictionary into the bounded
        // queue, then keeps forwarding mutation-derived candidates until
        // every in-flight item has settled.
        let producer = {
            let pass = pass.clone();
            let prefix = prefix.to_string();
            task::spawn(async move {
                let transforms = CaseTransforms {
                    lowercase: pass.config.lowercase,
                    uppercase: pass.config.uppercase,
                    capitalization: pass.config.capitalization,
                };
                let rules = ExpanderRules {
                    extensions: pass.config.extensions.clone(),
                    force_extensions: pass.config.force_extensions,
                    overwrite_extensions: pass.config.overwrite_extensions,
                    exclude_extensions: pass.config.exclude_extensions.clone(),
                    prefixes: pass.config.prefixes.clone(),
                    suffixes: pass.config.suffixes.clone(),
                };
                let mut stream = WordlistStream::new(&pass.config.wordlists, transforms);
                let origin = if depth == 0 {
                    CandidateOrigin::Seed
                } else {
                    CandidateOrigin::Recursion
                };

                'words: loop {
                    if pass.token.is_cancelled() {
                        break;
                    }
                    let entry = match stream.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break,
                        Err(err) => {
                            log::warn!("wordlist stream stopped: {err}");
                            break;
                        }
                    };
                    for path in rules.expand(&entry) {
                        let full = format!("{prefix}{path}");
                        if !mark_emitted(&pass.emitted, &full) {
                            continue;
                        }
                        let candidate = Candidate::new(full, depth, origin);
                        pass.in_flight.fetch_add(1, Ordering::SeqCst);
                        tokio::select! {
                            sent = cand_tx.send(candidate) => {
                                if sent.is_err() {
                                    pass.in_flight.fetch_sub(1, Ordering::SeqCst);
                                    break 'words;
                                }
                            }
                            _ = pass.token.cancelled() => {
                                pass.in_flight.fetch_sub(1, Ordering::SeqCst);
                                break 'words;
                            }
                        }
                    }
                }

                // Derived candidates are already counted in in_flight by
                // the worker that produced them; forwarding transfers
                // them into the bounded queue.
                loop {
                    if pass.in_flight.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                    tokio::select! {
                        maybe = derived_rx.recv() => match maybe {
                            Some(candidate) => {
                                if cand_tx.send(candidate).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                        _ = drained.notified() => {}
                        // A worker can notify between the in_flight check
                        // and this select; the tick bounds that window.
                        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                        _ = pass.token.cancelled() => break,
                    }
                }
            })
        };

        let mut workers = Vec::with_capacity(self.config.threads);
        for _ in 0..self.config.threads {
            let pass = pass.clone();
            let cand_rx = cand_rx.clone();
            workers.push(task::spawn(async move {
                loop {
                    let candidate = {
                        let mut rx = cand_rx.lock().await;
                        tokio::select! {
                            maybe = rx.recv() => match maybe {
                                Some(candidate) => candidate,
                                None => break,
                            },
                            _ = pass.token.cancelled() => break,
                        }
                    };
                    process_candidate(&pass, candidate).await;
                    if pass.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                        pass.drained.notify_waiters();
                    }
                }
            }));
        }
        drop(pass);

        let _ = producer.await;
        for worker in workers {
            let _ = worker.await;
        }

        let mut discovered = Vec::new();
        while let Ok(item) = disc_rx.try_recv() {
            discovered.push(item);
        }
        discovered
    }
}

async fn process_candidate(pass: &PassContext, candidate: Candidate) {
    tokio::select! {
        _ = pass.limiter.acquire() => {}
        _ = pass.token.cancelled() => return,
    }
    tokio::select! {
        _ = pass.gate.acquire() => {}
        _ = pass.token.cancelled() => return,
    }

    let spec = pass.target.spec(&candidate.path);
    pass.stats.requests.fetch_add(1, Ordering::Relaxed);

    let summary = match execute_with_retries(
        pass.executor.as_ref(),
        &spec,
        &pass.policy,
        &pass.token,
    )
    .await
    {
        DispatchOutcome::Response(summary) => summary,
        DispatchOutcome::Exhausted(err) => {
            pass.stats.errors.fetch_add(1, Ordering::Relaxed);
            if pass.config.exit_on_error {
                pass.fatal.trigger(err.to_string());
                pass.token.cancel();
            } else {
                log::debug!("dropping candidate after exhausted retries: {err}");
            }
            return;
        }
        DispatchOutcome::Cancelled => return,
    };

    if pass.config.skip_on_status.contains(summary.status) {
        pass.skip_status
            .store(summary.status as u32, Ordering::SeqCst);
        pass.token.cancel();
        return;
    }

    let classification = pass.classifier.classify(&candidate.path, &summary);
    if !classification.keep {
        pass.stats.filtered.fetch_add(1, Ordering::Relaxed);
        return;
    }
    pass.stats.kept.fetch_add(1, Ordering::Relaxed);

    let record = ResultRecord::new(
        &pass.target.base_url,
        &candidate.path,
        &summary,
        &classification,
        candidate.depth,
    );
    let _ = pass.record_tx.send(record);

    // Mutation first, then recursion.
    if pass.config.mutation && candidate.origin != CandidateOrigin::Mutation {
        for variant in mutation::mutate(&candidate.path) {
            if !mark_emitted(&pass.emitted, &variant) {
                continue;
            }
            let mutant = Candidate::new(variant, candidate.depth, CandidateOrigin::Mutation);
            pass.in_flight.fetch_add(1, Ordering::SeqCst);
            if pass.derived_tx.send(mutant).is_err() {
                pass.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    if let Some(prefix) = pass.recursion.descend(&candidate, summary.status) {
        let _ = pass.disc_tx.send((prefix, candidate.depth + 1));
    }
    for ancestor in pass.recursion.ancestors(&candidate) {
        let _ = pass.disc_tx.send((ancestor, candidate.depth + 1));
    }
}

async fn sink_pump(
    sinks: Arc<Vec<Box<dyn Sink>>>,
    mut rx: mpsc::UnboundedReceiver<ResultRecord>,
) {
    let mut failed = vec![false; sinks.len()];
    while let Some(record) = rx.recv().await {
        for (idx, sink) in sinks.iter().enumerate() {
            if let Err(err) = sink.deliver(&record) {
                if !failed[idx] {
                    log::warn!("sink #{idx} failed, scan continues: {err}");
                    failed[idx] = true;
                }
            }
        }
    }
    for (idx, sink) in sinks.iter().enumerate() {
        if let Err(err) = sink.flush() {
            if !failed[idx] {
                log::warn!("sink #{idx} flush failed: {err}");
            }
        }
    }
}

fn build_headers(config: &ScanConfig) -> Vec<(String, String)> {
    let mut headers = config.headers.clone();
    if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.trim().is_empty()) {
        headers.push(("Cookie".to_string(), cookie.to_string()));
    }
    if let Some(auth) = config.auth.as_deref().filter(|a| !a.trim().is_empty()) {
        // Credentials are opaque to the engine; they ride along verbatim.
        headers.push(("Authorization".to_string(), auth.to_string()));
    }
    headers
}

fn build_filter_chain(
    config: &ScanConfig,
    similarity: Option<SimilarityRef>,
) -> Result<FilterChain, FilterError> {
    let blacklists = config
        .blacklist_dir
        .as_deref()
        .map(load_blacklists)
        .unwrap_or_default();
    Ok(FilterChainBuilder::new()
        .include_status(config.include_status.clone())
        .exclude_status(config.exclude_status.clone())
        .size_bounds(config.min_response_size, config.max_response_size)
        .exclude_sizes(config.exclude_sizes.clone())
        .exclude_texts(config.exclude_texts.clone())
        .exclude_regex(config.exclude_regex.as_deref())?
        .exclude_redirect(config.exclude_redirect.as_deref())?
        .similarity_ref(similarity)
        .blacklists(blacklists)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ResponseSummary, TransportError};
    use futures::future::BoxFuture;

    struct NullExecutor;

    impl RequestExecutor for NullExecutor {
        fn execute<'a>(
            &'a self,
            spec: &'a RequestSpec,
        ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>> {
            Box::pin(async move {
                let mut summary = ResponseSummary::failed(&spec.url, 0);
                summary.status = 404;
                Ok(summary)
            })
        }
    }

    fn scanner_with(config: ScanConfig) -> Result<Scanner, ScanError> {
        Scanner::new(
            config,
            Arc::new(NullExecutor),
            Arc::new(WafDatabase::builtin()),
            Vec::new(),
        )
    }

    fn wordlist_on_disk(name: &str) -> std::path::PathBuf {
        let path =
            std::env::temp_dir().join(format!("dirprobe-runner-{}-{}", std::process::id(), name));
        std::fs::write(&path, "admin\n").unwrap();
        path
    }

    #[test]
    fn construction_requires_targets_and_wordlists() {
        let config = ScanConfig::default();
        assert!(matches!(scanner_with(config), Err(ScanError::NoTargets)));

        let config = ScanConfig {
            urls: vec!["http://example.com/".to_string()],
            ..Default::default()
        };
        assert!(matches!(scanner_with(config), Err(ScanError::NoWordlists)));
    }

    #[test]
    fn construction_rejects_bad_urls_methods_and_regexes() {
        let wordlist = wordlist_on_disk("basic");

        let config = ScanConfig {
            urls: vec!["not a url".to_string()],
            wordlists: vec![wordlist.clone()],
            ..Default::default()
        };
        assert!(matches!(scanner_with(config), Err(ScanError::InvalidUrl { .. })));

        let config = ScanConfig {
            urls: vec!["http://example.com/".to_string()],
            wordlists: vec![wordlist.clone()],
            http_method: "NOT A METHOD".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            scanner_with(config),
            Err(ScanError::InvalidMethod { .. })
        ));

        let config = ScanConfig {
            urls: vec!["http://example.com/".to_string()],
            wordlists: vec![wordlist.clone()],
            exclude_regex: Some("(".to_string()),
            ..Default::default()
        };
        assert!(matches!(scanner_with(config), Err(ScanError::Filter(_))));

        std::fs::remove_file(wordlist).ok();
    }

    #[test]
    fn construction_rejects_missing_wordlists() {
        let config = ScanConfig {
            urls: vec!["http://example.com/".to_string()],
            wordlists: vec![std::path::PathBuf::from("/nonexistent/words.txt")],
            ..Default::default()
        };
        assert!(matches!(
            scanner_with(config),
            Err(ScanError::WordlistUnreadable { .. })
        ));
    }

    #[test]
    fn auth_and_cookie_ride_as_headers() {
        let config = ScanConfig {
            cookie: Some("session=abc".to_string()),
            auth: Some("Bearer token123".to_string()),
            ..Default::default()
        };
        let headers = build_headers(&config);
        assert!(headers.contains(&("Cookie".to_string(), "session=abc".to_string())));
        assert!(headers.contains(&("Authorization".to_string(), "Bearer token123".to_string())));
    }
}
