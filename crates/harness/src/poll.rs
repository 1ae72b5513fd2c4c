//! Bounded-retry polling over URL predicates

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Result of one polling run (or one predicate attempt).
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub succeeded: bool,
    pub content: Option<String>,
    pub elapsed_ms: u64,
}

impl PollOutcome {
    pub fn success(content: Option<String>) -> Self {
        Self {
            succeeded: true,
            content,
            elapsed_ms: 0,
        }
    }

    pub fn failure() -> Self {
        Self {
            succeeded: false,
            content: None,
            elapsed_ms: 0,
        }
    }
}

/// Interval/timeout pair for one poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    /// Readiness polling: retry every second for up to a minute.
    pub fn readiness() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(60_000),
        }
    }

    /// Shutdown polling: retry every 100 ms for up to 5 seconds.
    pub fn shutdown() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(5_000),
        }
    }
}

/// Repeatedly evaluates `predicate` at `policy.interval` spacing until it
/// succeeds or `policy.timeout` total elapsed time is exceeded.
///
/// A timeout is reported as a failed outcome, not an error; the caller
/// decides whether that is fatal. Every wait is an `.await`, so an aborted
/// caller stops promptly instead of finishing its remaining budget.
pub async fn poll_until<F, Fut>(mut predicate: F, policy: PollPolicy) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollOutcome>,
{
    let start = Instant::now();
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        let mut outcome = predicate().await;

        if outcome.succeeded {
            outcome.elapsed_ms = start.elapsed().as_millis() as u64;
            debug!(
                "poll succeeded after {} attempt(s), {} ms",
                attempts, outcome.elapsed_ms
            );
            return outcome;
        }

        if start.elapsed() + policy.interval >= policy.timeout {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            debug!("poll exhausted after {} attempt(s), {} ms", attempts, elapsed_ms);
            return PollOutcome {
                succeeded: false,
                content: None,
                elapsed_ms,
            };
        }

        sleep(policy.interval).await;
    }
}

/// Predicate (a): fetch content from `url`, succeed if the request
/// completes with a success status and a non-empty body.
pub async fn fetch_url_content(client: &reqwest::Client, url: &str) -> PollOutcome {
    match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(body) if !body.is_empty() => PollOutcome::success(Some(body)),
            Ok(_) => PollOutcome::failure(),
            Err(e) => {
                warn!("readiness probe failed to read body: {}", e);
                PollOutcome::failure()
            }
        },
        Ok(resp) => {
            debug!("readiness probe returned {}", resp.status());
            PollOutcome::failure()
        }
        Err(e) => {
            // Connection refused is expected while the server is starting
            if !e.is_connect() {
                warn!("readiness probe error: {}", e);
            }
            PollOutcome::failure()
        }
    }
}

/// Predicate (b): probe `url`, succeed once it no longer accepts
/// connections. Used to confirm shutdown after a stop goal.
pub async fn url_is_down(client: &reqwest::Client, url: &str) -> PollOutcome {
    match client.get(url).send().await {
        Ok(_) => PollOutcome::failure(),
        Err(e) if e.is_connect() => PollOutcome::success(None),
        Err(e) => {
            debug!("shutdown probe error treated as still-up: {}", e);
            PollOutcome::failure()
        }
    }
}

/// HTTP client tuned for probing: short per-request timeout so a hung
/// server cannot stall the poll loop past its budget.
pub fn probe_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
}
