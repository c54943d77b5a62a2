use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::executor::{RequestExecutor, RequestSpec, ResponseSummary, TransportError};

/// Exponential backoff base for transport retries.
const BACKOFF_BASE: Duration = Duration::from_millis(250);
/// Backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(4);
/// How long an in-flight request may keep running after cancellation.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Global token bucket shared by every worker across all targets.
/// `max_rate` of zero means unlimited.
pub struct GlobalLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl GlobalLimiter {
    pub fn new(max_rate: u32) -> Arc<Self> {
        let limiter = NonZeroU32::new(max_rate)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        Arc::new(Self { limiter })
    }

    pub async fn acquire(&self) {
        if let Some(limiter) = self.limiter.as_ref() {
            limiter.until_ready().await;
        }
    }
}

/// Minimum inter-request gap for a single target. The lock is held
/// across the wait so consecutive requests to the same host are spaced
/// by at least `delay`.
pub struct TargetGate {
    delay: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl TargetGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        if self.delay.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let next = previous + self.delay;
            if next > Instant::now() {
                sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
}

impl RetryPolicy {
    /// Full-jitter backoff: uniform between zero and the capped
    /// exponential delay for this attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = BACKOFF_BASE.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(BACKOFF_CAP);
        let jittered_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64);
        Duration::from_millis(jittered_ms)
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    /// The origin answered; HTTP status responses are never retried.
    Response(ResponseSummary),
    /// Every attempt failed at the transport layer.
    Exhausted(TransportError),
    /// Cancellation fired before a usable response arrived.
    Cancelled,
}

/// Runs one request through the retry policy. Cancellation is observed
/// between attempts and during backoff; an in-flight request gets
/// [`CANCEL_GRACE`] to finish before it is abandoned.
pub async fn execute_with_retries(
    executor: &dyn RequestExecutor,
    spec: &RequestSpec,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return DispatchOutcome::Cancelled;
        }

        let fut = executor.execute(spec);
        tokio::pin!(fut);
        let result = tokio::select! {
            result = &mut fut => result,
            _ = cancel.cancelled() => {
                match tokio::time::timeout(CANCEL_GRACE, &mut fut).await {
                    Ok(result) => result,
                    Err(_) => return DispatchOutcome::Cancelled,
                }
            }
        };

        match result {
            Ok(mut summary) => {
                summary.retry_count = attempt;
                return DispatchOutcome::Response(summary);
            }
            Err(err) => {
                if attempt >= policy.retries {
                    return DispatchOutcome::Exhausted(err);
                }
                log::debug!(
                    "retrying {} after transport error (attempt {}): {err}",
                    spec.url,
                    attempt + 1
                );
                let delay = policy.backoff(attempt);
                attempt += 1;
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => return DispatchOutcome::Cancelled,
                }
            }
        }
    }
}
