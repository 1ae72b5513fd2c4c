//! In-process fake of the build-tool collaborator.
//!
//! The run goal binds a real TCP listener on the case's port and serves
//! the expected page until the stop goal fires, so the harness under
//! test exercises genuine HTTP polling and concurrent stop ordering.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use devserver_e2e::error::{HarnessError, HarnessResult};
use devserver_e2e::invoker::{GoalInvoker, InvocationResult, PROP_PORT};

pub const PAGE_BODY: &str =
    "Hello from the App Engine Standard project.\nTEST_VAR=testVariableValue\n";

pub const CONFLICT_LOG: &str = "[INFO] Scanning for projects...\n\
     Both <appYamls> and <services> are defined. <appYamls> is deprecated, use <services> only.\n\
     BUILD FAILURE\n";

/// One recorded goal execution, for property assertions.
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    pub goal: String,
    pub cli_options: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct FakeBuildTool {
    /// Stop signal per service port, registered when a run goal starts.
    pub stop_signals: Mutex<HashMap<u16, Arc<Notify>>>,

    /// Every execution seen, in order.
    pub invocations: Mutex<Vec<RecordedInvocation>>,

    /// When a run goal activates this profile, fail the build with the
    /// mutually-exclusive-configuration diagnostic.
    pub conflict_profile: Option<String>,

    /// When a run goal activates this profile, serve normally but log a
    /// wrong module label (used to check sibling-case isolation).
    pub mislabel_profile: Option<String>,

    /// Never bind the listener; the run goal just waits for stop.
    pub unresponsive: bool,
}

impl FakeBuildTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self, goal: &str) -> Vec<RecordedInvocation> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.goal == goal)
            .cloned()
            .collect()
    }

    fn has_profile(cli_options: &[String], profile: &str) -> bool {
        cli_options.iter().any(|opt| opt == &format!("-P{}", profile))
    }

    fn module_label(cli_options: &[String]) -> &'static str {
        if Self::has_profile(cli_options, "services") {
            "standard-project-services"
        } else if Self::has_profile(cli_options, "appyamls") {
            "standard-project-appyamls"
        } else {
            "standard-project"
        }
    }

    fn port_from(props: &BTreeMap<String, String>) -> HarnessResult<u16> {
        props
            .get(PROP_PORT)
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| HarnessError::AssertionFailed("run goal without a port property".into()))
    }

    async fn run_goal(
        &self,
        cli_options: &[String],
        props: &BTreeMap<String, String>,
    ) -> HarnessResult<InvocationResult> {
        if let Some(profile) = &self.conflict_profile {
            if Self::has_profile(cli_options, profile) {
                return Err(HarnessError::GoalExecution {
                    message: "goal 'appengine:run' exited with exit status: 1".into(),
                    log: CONFLICT_LOG.to_string(),
                });
            }
        }

        let port = Self::port_from(props)?;
        let stop = Arc::new(Notify::new());
        self.stop_signals.lock().unwrap().insert(port, stop.clone());

        let listener = if self.unresponsive {
            None
        } else {
            Some(TcpListener::bind(("127.0.0.1", port)).await?)
        };

        // serve until the stop goal fires, like a real blocking run goal
        if let Some(listener) = listener {
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    accepted = listener.accept() => {
                        if let Ok((mut socket, _)) = accepted {
                            let mut buf = [0u8; 1024];
                            let _ = socket.read(&mut buf).await;
                            let response = format!(
                                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                PAGE_BODY.len(),
                                PAGE_BODY
                            );
                            let _ = socket.write_all(response.as_bytes()).await;
                        }
                    }
                }
            }
        } else {
            stop.notified().await;
        }

        let label = match &self.mislabel_profile {
            Some(profile) if Self::has_profile(cli_options, profile) => "wrong-module",
            _ => Self::module_label(cli_options),
        };

        Ok(InvocationResult {
            succeeded: true,
            log: format!(
                "[INFO] Scanning for projects...\n\
                 [INFO] Dev App Server is now running\n\
                 [INFO] Module instance {} is running\n\
                 [INFO] BUILD SUCCESS\n",
                label
            ),
            failure_message: None,
        })
    }

    fn stop_goal(&self, props: &BTreeMap<String, String>) -> HarnessResult<InvocationResult> {
        let port = Self::port_from(props)?;
        // stopping an already-stopped service is a no-op success
        if let Some(stop) = self.stop_signals.lock().unwrap().get(&port) {
            stop.notify_one();
        }

        Ok(InvocationResult {
            succeeded: true,
            log: "[INFO] BUILD SUCCESS\n".to_string(),
            failure_message: None,
        })
    }
}

#[async_trait]
impl GoalInvoker for FakeBuildTool {
    async fn execute(
        &self,
        goal: &str,
        cli_options: &[String],
        system_properties: &BTreeMap<String, String>,
    ) -> HarnessResult<InvocationResult> {
        self.invocations.lock().unwrap().push(RecordedInvocation {
            goal: goal.to_string(),
            cli_options: cli_options.to_vec(),
            system_properties: system_properties.clone(),
        });

        match goal {
            "appengine:run" => self.run_goal(cli_options, system_properties).await,
            "appengine:stop" => self.stop_goal(system_properties),
            other => Err(HarnessError::AssertionFailed(format!(
                "unexpected goal: {}",
                other
            ))),
        }
    }
}

/// Poll policies short enough for test budgets while preserving the
/// readiness/shutdown shape.
pub fn fast_matrix_config() -> devserver_e2e::MatrixConfig {
    use devserver_e2e::PollPolicy;
    use std::time::Duration;

    devserver_e2e::MatrixConfig {
        readiness: PollPolicy {
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(10),
        },
        shutdown: PollPolicy {
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        },
        ..Default::default()
    }
}
