//! Test-matrix enumeration and per-case orchestration

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::endpoint::ServiceEndpoint;
use crate::error::HarnessResult;
use crate::invoker::{
    GoalInvoker, PROP_ADMIN_PORT, PROP_PORT, PROP_VERSION, VERSION_2_ALPHA,
};
use crate::poll::PollPolicy;
use crate::watcher::{LifecycleWatcher, StopInvocation};

/// Content markers the served page must carry.
pub const CONTENT_GREETING: &str = "Hello from the App Engine Standard project.";
pub const CONTENT_TEST_VAR: &str = "TEST_VAR=testVariableValue";

/// Log marker printed once the dev server accepts requests.
pub const LOG_SERVER_RUNNING: &str = "Dev App Server is now running";

/// Log marker identifying the running module instance.
pub fn module_running_marker(label: &str) -> String {
    format!("Module instance {} is running", label)
}

/// Supported dev server variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionVariant {
    V1,
    V2Alpha,
}

impl VersionVariant {
    pub fn all() -> [VersionVariant; 2] {
        [VersionVariant::V1, VersionVariant::V2Alpha]
    }

    /// Only the 2-alpha variant runs a separate admin interface.
    pub fn requires_admin_interface(&self) -> bool {
        matches!(self, VersionVariant::V2Alpha)
    }

    /// Value for the version-selector property, absent for the baseline.
    pub fn version_property(&self) -> Option<&'static str> {
        match self {
            VersionVariant::V1 => None,
            VersionVariant::V2Alpha => Some(VERSION_2_ALPHA),
        }
    }
}

impl fmt::Display for VersionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionVariant::V1 => write!(f, "v1"),
            VersionVariant::V2Alpha => write!(f, "v2-alpha"),
        }
    }
}

/// One row of the profile table: the profiles to activate and the module
/// label their configuration is expected to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSet {
    pub profiles: Vec<String>,
    pub expected_label: String,
}

impl ProfileSet {
    pub fn new(profiles: &[&str], expected_label: &str) -> Self {
        Self {
            profiles: profiles.iter().map(|p| p.to_string()).collect(),
            expected_label: expected_label.to_string(),
        }
    }
}

/// The standard profile table. An empty profile set is the baseline
/// configuration.
pub fn standard_profile_sets() -> Vec<ProfileSet> {
    vec![
        ProfileSet::new(&[], "standard-project"),
        ProfileSet::new(&["base-it-profile", "appyamls"], "standard-project-appyamls"),
        ProfileSet::new(&["base-it-profile", "services"], "standard-project-services"),
    ]
}

/// One concrete scenario: variant, active profiles, expected label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub variant: VersionVariant,
    pub profiles: Vec<String>,
    pub expected_label: String,
}

impl TestCase {
    pub fn name(&self) -> String {
        format!("run-{}[{}]", self.variant, self.profiles.join(","))
    }

    /// Profile activations as build-tool CLI options. Empty profile
    /// names are skipped rather than emitted as a bare `-P`.
    pub fn cli_options(&self) -> Vec<String> {
        self.profiles
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| format!("-P{}", p))
            .collect()
    }

    /// System properties for this case against `endpoint`. The admin
    /// port and version selector are set iff the variant requires an
    /// admin interface.
    pub fn system_properties(&self, endpoint: &ServiceEndpoint) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(PROP_PORT.to_string(), endpoint.port.to_string());
        if let Some(admin_port) = endpoint.admin_port {
            props.insert(PROP_ADMIN_PORT.to_string(), admin_port.to_string());
        }
        if let Some(version) = self.variant.version_property() {
            props.insert(PROP_VERSION.to_string(), version.to_string());
        }
        props
    }
}

/// Outcome of one case, with every failed assertion listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub failures: Vec<String>,
    pub shutdown_confirmed: bool,
}

/// Aggregate over the whole matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseResult>,
}

/// Configuration for the matrix runner.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub run_goal: String,
    pub stop_goal: String,
    pub readiness: PollPolicy,
    pub shutdown: PollPolicy,
    pub output_dir: PathBuf,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            run_goal: "appengine:run".to_string(),
            stop_goal: "appengine:stop".to_string(),
            readiness: PollPolicy::readiness(),
            shutdown: PollPolicy::shutdown(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Drives one lifecycle orchestration per generated test case.
pub struct MatrixRunner {
    invoker: Arc<dyn GoalInvoker>,
    config: MatrixConfig,
}

impl MatrixRunner {
    pub fn new(invoker: Arc<dyn GoalInvoker>) -> Self {
        Self::with_config(invoker, MatrixConfig::default())
    }

    pub fn with_config(invoker: Arc<dyn GoalInvoker>, config: MatrixConfig) -> Self {
        Self { invoker, config }
    }

    /// Cross-product of variants and profile sets.
    pub fn cases(variants: &[VersionVariant], profile_sets: &[ProfileSet]) -> Vec<TestCase> {
        let mut cases = Vec::with_capacity(variants.len() * profile_sets.len());
        for variant in variants {
            for set in profile_sets {
                cases.push(TestCase {
                    variant: *variant,
                    profiles: set.profiles.clone(),
                    expected_label: set.expected_label.clone(),
                });
            }
        }
        cases
    }

    /// Run every case in the matrix. A failing case is recorded and the
    /// remaining cases still run.
    pub async fn run_matrix(
        &self,
        variants: &[VersionVariant],
        profile_sets: &[ProfileSet],
    ) -> HarnessResult<SuiteResult> {
        let cases = Self::cases(variants, profile_sets);
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        info!("running {} lifecycle case(s)...", cases.len());

        for case in &cases {
            let result = self.run_case(case).await?;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!("✗ {} - {}", result.name, result.failures.join("; "));
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "lifecycle results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(SuiteResult {
            total: cases.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Run a single case end to end: allocate ports, watch concurrently,
    /// execute the blocking run goal, join, assert.
    ///
    /// Returns `Err` only for infrastructure faults (port allocation);
    /// assertion and goal failures land in the `CaseResult`.
    pub async fn run_case(&self, case: &TestCase) -> HarnessResult<CaseResult> {
        let start = Instant::now();
        let name = case.name();
        debug!("starting case {}", name);

        let endpoint = ServiceEndpoint::allocate(case.variant.requires_admin_interface())?;
        let properties = case.system_properties(&endpoint);

        // The run goal blocks until the service stops, so the watcher
        // that issues the stop goal must be running before it starts.
        let watcher = LifecycleWatcher::spawn(
            name.clone(),
            endpoint.clone(),
            StopInvocation {
                invoker: self.invoker.clone(),
                goal: self.config.stop_goal.clone(),
                system_properties: properties.clone(),
            },
            self.config.readiness,
            self.config.shutdown,
        );

        let run_result = self
            .invoker
            .execute(&self.config.run_goal, &case.cli_options(), &properties)
            .await;

        let report = watcher.join().await;

        let mut failures = Vec::new();

        match &report.content {
            Some(content) => {
                for marker in [CONTENT_GREETING, CONTENT_TEST_VAR] {
                    if !content.contains(marker) {
                        failures.push(format!("content does not contain \"{}\"", marker));
                    }
                }
            }
            None => failures.push("no content fetched before the service stopped".to_string()),
        }

        match run_result {
            Ok(result) => {
                for check in [
                    result.verify_error_free_log(),
                    result.verify_text_in_log(LOG_SERVER_RUNNING),
                    result.verify_text_in_log(&module_running_marker(&case.expected_label)),
                ] {
                    if let Err(e) = check {
                        failures.push(e.to_string());
                    }
                }
            }
            Err(e) => failures.push(format!("run goal failed: {}", e)),
        }

        Ok(CaseResult {
            name,
            success: failures.is_empty(),
            duration_ms: start.elapsed().as_millis() as u64,
            failures,
            shutdown_confirmed: report.shutdown_confirmed,
        })
    }

    /// Write the suite result as JSON under the configured output dir.
    pub fn write_results(&self, results: &SuiteResult) -> HarnessResult<PathBuf> {
        self.write_results_to(&self.config.output_dir, results)
    }

    fn write_results_to(&self, dir: &Path, results: &SuiteResult) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("lifecycle-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("results written to: {}", path.display());
        Ok(path)
    }
}
