//! Negative scenario: mutually exclusive configuration must fail the goal

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};
use crate::invoker::GoalInvoker;

/// Conflict diagnostic the build tool must print when both the
/// deprecated appYamls mode and the services mode are configured.
pub const CONFLICT_MESSAGE: &str =
    "Both <appYamls> and <services> are defined. <appYamls> is deprecated, use <services> only.";

/// Generic failure marker present in every failed build log.
pub const BUILD_FAILURE_MARKER: &str = "BUILD FAILURE";

/// Profile activating both mutually exclusive configuration modes.
pub const CONFLICTING_PROFILE: &str = "appYamlsAndServices";

/// Asserts that an invalid configuration combination fails goal
/// execution with a specific diagnostic. Never allocates an endpoint or
/// starts a watcher; this path must not start a service.
pub struct ErrorScenario {
    invoker: Arc<dyn GoalInvoker>,
    run_goal: String,
}

impl ErrorScenario {
    pub fn new(invoker: Arc<dyn GoalInvoker>, run_goal: impl Into<String>) -> Self {
        Self {
            invoker,
            run_goal: run_goal.into(),
        }
    }

    /// Invoke the run goal with `profile` active and assert it fails
    /// with a diagnostic containing every expected fragment.
    pub async fn run_error_case(
        &self,
        profile: &str,
        expected_fragments: &[&str],
    ) -> HarnessResult<()> {
        let options = vec![format!("-P{}", profile)];
        debug!("expecting goal '{}' to fail with -P{}", self.run_goal, profile);

        let diagnostic = match self
            .invoker
            .execute(&self.run_goal, &options, &BTreeMap::new())
            .await
        {
            Ok(result) if result.succeeded => {
                return Err(HarnessError::AssertionFailed(format!(
                    "goal '{}' with -P{} completed normally; expected a failure",
                    self.run_goal, profile
                )));
            }
            // an invoker may report failure as data rather than an error
            Ok(result) => {
                let mut text = result.failure_message.unwrap_or_default();
                text.push('\n');
                text.push_str(&result.log);
                text
            }
            Err(e @ HarnessError::GoalExecution { .. }) => e.diagnostic(),
            Err(other) => return Err(other),
        };

        for fragment in expected_fragments {
            if !diagnostic.contains(fragment) {
                return Err(HarnessError::AssertionFailed(format!(
                    "failure diagnostic does not contain \"{}\"",
                    fragment
                )));
            }
        }

        info!(
            "goal '{}' with -P{} failed with the expected diagnostic",
            self.run_goal, profile
        );
        Ok(())
    }

    /// The canonical negative case: the appYamls/services conflict.
    pub async fn run_conflicting_modes_case(&self) -> HarnessResult<()> {
        self.run_error_case(CONFLICTING_PROFILE, &[CONFLICT_MESSAGE, BUILD_FAILURE_MARKER])
            .await
    }
}
