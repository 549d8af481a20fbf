//! API test suite
//!
//! The registry defines what to call, the runner calls it through the
//! shared client and classifies each outcome, and the report module prints
//! progress for interactive runs.

pub mod registry;
pub mod report;
pub mod result;
pub mod runner;

pub use registry::{registry, ApiFamily, Category, RunContext, Selection, TestCase};
pub use report::{Reporter, Verbosity};
pub use result::{RunHistory, Summary, TestResult, TestRun, TestStatus, HISTORY_LIMIT};
pub use runner::{CancelFlag, RunnerState, TestRunner};
