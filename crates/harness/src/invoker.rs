//! Build-tool goal execution and log assertions

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};

/// System property carrying the dev server's listen port.
pub const PROP_PORT: &str = "app.devserver.port";
/// System property carrying the admin-interface port (admin-capable variant only).
pub const PROP_ADMIN_PORT: &str = "app.devserver.adminPort";
/// System property selecting the dev server version (admin-capable variant only).
pub const PROP_VERSION: &str = "app.devserver.version";
/// Version-selector value for the admin-capable variant.
pub const VERSION_2_ALPHA: &str = "2-alpha";

/// Marker lines the build tool prints on failed invocations.
const LOG_ERROR_MARKER: &str = "[ERROR]";

/// Captured outcome of one goal execution.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub succeeded: bool,
    pub log: String,
    pub failure_message: Option<String>,
}

impl InvocationResult {
    /// Assert the log contains the literal substring `text`.
    pub fn verify_text_in_log(&self, text: &str) -> HarnessResult<()> {
        if self.log.contains(text) {
            Ok(())
        } else {
            Err(HarnessError::AssertionFailed(format!(
                "log does not contain \"{}\"",
                text
            )))
        }
    }

    /// Assert the log carries no unexpected error markers.
    pub fn verify_error_free_log(&self) -> HarnessResult<()> {
        match self.log.lines().find(|line| line.contains(LOG_ERROR_MARKER)) {
            None => Ok(()),
            Some(line) => Err(HarnessError::AssertionFailed(format!(
                "log contains unexpected error line: {}",
                line.trim()
            ))),
        }
    }
}

/// The external build-tool collaborator: executes a named goal with CLI
/// options and system properties, returning the captured log. Tests
/// substitute a fake; production runs go through [`BuildToolInvoker`].
#[async_trait]
pub trait GoalInvoker: Send + Sync {
    async fn execute(
        &self,
        goal: &str,
        cli_options: &[String],
        system_properties: &BTreeMap<String, String>,
    ) -> HarnessResult<InvocationResult>;
}

/// Configuration for spawning the real build tool.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Build-tool executable (e.g. `mvn`).
    pub program: PathBuf,

    /// Directory of the module under test.
    pub working_dir: PathBuf,

    /// Arguments prepended to every invocation (e.g. `--batch-mode`).
    pub extra_args: Vec<String>,

    /// Hard ceiling on one goal execution; `None` lets a run goal block
    /// for as long as the service stays up.
    pub goal_timeout: Option<Duration>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mvn"),
            working_dir: PathBuf::from("."),
            extra_args: vec!["--batch-mode".to_string()],
            goal_timeout: None,
        }
    }
}

/// Spawns the configured build tool and captures its combined output as
/// the invocation log.
pub struct BuildToolInvoker {
    config: InvokerConfig,
}

impl BuildToolInvoker {
    pub fn new(config: InvokerConfig) -> Self {
        Self { config }
    }

    async fn run_command(
        &self,
        goal: &str,
        cli_options: &[String],
        system_properties: &BTreeMap<String, String>,
    ) -> HarnessResult<InvocationResult> {
        let mut cmd = Command::new(&self.config.program);
        cmd.current_dir(&self.config.working_dir)
            .args(&self.config.extra_args)
            .stdin(Stdio::null());

        for (key, value) in system_properties {
            cmd.arg(format!("-D{}={}", key, value));
        }
        cmd.args(cli_options);
        cmd.arg(goal);

        info!(
            "executing goal '{}' with options {:?} and {} propert(ies)",
            goal,
            cli_options,
            system_properties.len()
        );

        let output = cmd.output().await?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            debug!("goal '{}' completed, {} bytes of log", goal, log.len());
            Ok(InvocationResult {
                succeeded: true,
                log,
                failure_message: None,
            })
        } else {
            Err(HarnessError::GoalExecution {
                message: format!("goal '{}' exited with {}", goal, output.status),
                log,
            })
        }
    }
}

#[async_trait]
impl GoalInvoker for BuildToolInvoker {
    async fn execute(
        &self,
        goal: &str,
        cli_options: &[String],
        system_properties: &BTreeMap<String, String>,
    ) -> HarnessResult<InvocationResult> {
        match self.config.goal_timeout {
            None => self.run_command(goal, cli_options, system_properties).await,
            Some(limit) => {
                tokio::time::timeout(limit, self.run_command(goal, cli_options, system_properties))
                    .await
                    .map_err(|_| {
                        HarnessError::Timeout(format!(
                            "goal '{}' still running after {:?}",
                            goal, limit
                        ))
                    })?
            }
        }
    }
}
