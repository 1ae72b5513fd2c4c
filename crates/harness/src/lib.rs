//! Dev-server lifecycle verification harness
//!
//! This crate verifies the run/stop lifecycle of a locally spawned dev
//! server controlled through an external build-tool invocation layer:
//! - Starts the service via a blocking "run" goal
//! - Polls over HTTP until it serves content, captures the body
//! - Issues the "stop" goal from a concurrent watcher
//! - Confirms the service becomes unreachable
//! - Asserts literal markers in content and captured build logs
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       MatrixRunner                           │
//! │   variants × profile sets -> TestCase                        │
//! │     ├── ServiceEndpoint::allocate() (unique port pair)       │
//! │     ├── LifecycleWatcher::spawn() ───────────────┐           │
//! │     ├── GoalInvoker::execute("run")  (blocks)    │           │
//! │     │        readiness poll ── fetch content ────┤           │
//! │     │        GoalInvoker::execute("stop") ───────┤           │
//! │     │        shutdown poll ──────────────────────┘           │
//! │     ├── watcher.join() -> WatcherReport                      │
//! │     └── assertions: content markers, log markers, error-free │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ErrorScenario: run goal with a conflicting profile must     │
//! │  fail with a specific diagnostic; never starts a service     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod endpoint;
pub mod error;
pub mod invoker;
pub mod matrix;
pub mod poll;
pub mod scenario;
pub mod watcher;

pub use endpoint::ServiceEndpoint;
pub use error::{HarnessError, HarnessResult};
pub use invoker::{BuildToolInvoker, GoalInvoker, InvocationResult, InvokerConfig};
pub use matrix::{MatrixConfig, MatrixRunner, ProfileSet, TestCase, VersionVariant};
pub use poll::{PollOutcome, PollPolicy};
pub use scenario::ErrorScenario;
pub use watcher::{LifecycleWatcher, WatcherReport};
