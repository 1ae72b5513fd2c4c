//! Concurrent lifecycle watcher: readiness, content capture, stop, shutdown

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::endpoint::ServiceEndpoint;
use crate::invoker::GoalInvoker;
use crate::poll::{self, PollPolicy};

/// Everything the watcher needs to issue the stop goal. Built by the
/// runner from the same property mapping as the run invocation.
pub struct StopInvocation {
    pub invoker: Arc<dyn GoalInvoker>,
    pub goal: String,
    pub system_properties: BTreeMap<String, String>,
}

/// What the watcher observed, handed back across `join`.
#[derive(Debug, Clone)]
pub struct WatcherReport {
    /// Body fetched from the service root, if readiness polling succeeded.
    pub content: Option<String>,

    /// Time readiness polling spent before succeeding or giving up.
    pub readiness_elapsed_ms: u64,

    /// Whether the service became unreachable within the shutdown budget.
    pub shutdown_confirmed: bool,
}

/// Runs the readiness/stop/shutdown sequence concurrently with the
/// blocking run goal. The run goal does not return until the service is
/// told to stop, so the stop must be issued from a separate task.
pub struct LifecycleWatcher {
    handle: JoinHandle<WatcherReport>,
}

impl LifecycleWatcher {
    /// Spawn the watcher. Call immediately before executing the run goal.
    pub fn spawn(
        case_name: String,
        endpoint: ServiceEndpoint,
        stop: StopInvocation,
        readiness: PollPolicy,
        shutdown: PollPolicy,
    ) -> Self {
        let handle = tokio::spawn(watch(case_name, endpoint, stop, readiness, shutdown));
        Self { handle }
    }

    /// Await the watcher's completion. Failures inside the watcher are
    /// absorbed into the report; nothing propagates across the join.
    pub async fn join(self) -> WatcherReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!("lifecycle watcher did not complete: {}", e);
                WatcherReport {
                    content: None,
                    readiness_elapsed_ms: 0,
                    shutdown_confirmed: false,
                }
            }
        }
    }

    /// Cancel the watcher. Polling stops at its next await point; the
    /// join then yields a degraded report.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn watch(
    case_name: String,
    endpoint: ServiceEndpoint,
    stop: StopInvocation,
    readiness: PollPolicy,
    shutdown: PollPolicy,
) -> WatcherReport {
    let url = endpoint.root_url();

    let client = match poll::probe_client() {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("[{}] probe client unavailable: {}", case_name, e);
            None
        }
    };

    // Readiness: poll until the root URL serves non-empty content. A
    // timeout is recorded, not raised; the stop goal runs either way so
    // a started service is never leaked.
    let ready = match &client {
        Some(client) => {
            poll::poll_until(
                || {
                    let client = client.clone();
                    let url = url.clone();
                    async move { poll::fetch_url_content(&client, &url).await }
                },
                readiness,
            )
            .await
        }
        None => poll::PollOutcome::failure(),
    };

    if ready.succeeded {
        info!(
            "[{}] service ready at {} after {} ms",
            case_name, url, ready.elapsed_ms
        );
    } else {
        warn!(
            "[{}] service at {} never became ready, stopping anyway",
            case_name, url
        );
    }

    match stop
        .invoker
        .execute(&stop.goal, &[], &stop.system_properties)
        .await
    {
        Ok(_) => info!("[{}] stop goal issued", case_name),
        Err(e) => warn!("[{}] stop goal failed: {}", case_name, e),
    }

    let shutdown_confirmed = match &client {
        Some(client) => {
            let down = poll::poll_until(
                || {
                    let client = client.clone();
                    let url = url.clone();
                    async move { poll::url_is_down(&client, &url).await }
                },
                shutdown,
            )
            .await;
            down.succeeded
        }
        None => false,
    };

    if !shutdown_confirmed {
        warn!(
            "[{}] service at {} still reachable after stop",
            case_name, url
        );
    }

    WatcherReport {
        content: ready.content,
        readiness_elapsed_ms: ready.elapsed_ms,
        shutdown_confirmed,
    }
}
