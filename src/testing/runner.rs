//! Test runner implementation
//!
//! Executes the selected cases one at a time, in registry order, through
//! the shared [`ApiClient`]. All per-run state lives in [`RunnerState`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use serde_json::Value;

use super::registry::{self, CreatedResource, RunContext, Selection, TestCase};
use super::report::Reporter;
use super::result::{RunArtifact, RunHistory, Summary, TestResult, TestRun, TestStatus};
use crate::client::{ApiClient, ExecuteRequest, FailureReason, Outcome};
use crate::common::redact::truncate_text;
use crate::common::{paths, Error, Result};

/// Longest server message copied into an HTTP failure
const HTTP_MESSAGE_LIMIT: usize = 200;

/// Shared flag that stops a run between tests
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run mutates
#[derive(Debug, Default)]
pub struct RunnerState {
    pub last_results: Vec<TestResult>,
    pub history: RunHistory,
    pub context: RunContext,
}

pub struct TestRunner {
    client: ApiClient,
    registry: Vec<TestCase>,
    state: RunnerState,
    reporter: Reporter,
    cancel: CancelFlag,
}

impl TestRunner {
    pub fn new(client: ApiClient, reporter: Reporter) -> Self {
        Self::with_registry(client, registry::registry(), reporter)
    }

    pub fn with_registry(client: ApiClient, registry: Vec<TestCase>, reporter: Reporter) -> Self {
        Self {
            client,
            registry,
            state: RunnerState::default(),
            reporter,
            cancel: CancelFlag::default(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn registry(&self) -> &[TestCase] {
        &self.registry
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the selected cases; a failing case never stops the run
    pub async fn run(&mut self, selection: &Selection) -> TestRun {
        let cases = registry::resolve(&self.registry, selection);

        self.state.last_results.clear();
        self.state.context = RunContext::seeded();
        self.client.reset_tested();

        tracing::info!(
            environment = %self.client.config().environment,
            tests = cases.len(),
            "Starting test run"
        );
        self.reporter.banner(self.client.config(), cases.len());

        let mut results = Vec::with_capacity(cases.len());
        let mut interrupted = false;

        for case in &cases {
            if self.cancel.is_cancelled() {
                interrupted = true;
                tracing::warn!(completed = results.len(), "Run interrupted");
                self.reporter.interrupted();
                break;
            }

            self.reporter.test_started(case);
            let result = self.run_case(case).await;
            tracing::info!(test = case.id, status = ?result.status, status_code = result.status_code, "Test finished");
            self.reporter.test_finished(&result);
            results.push(result);
        }

        let run = TestRun {
            timestamp: Local::now(),
            environment: self.client.config().environment,
            summary: Summary::from_results(&results),
            interrupted,
            endpoints_tested: self.client.tested_endpoints(),
            results,
        };

        tracing::info!(
            total = run.summary.total,
            passed = run.summary.passed,
            failed = run.summary.failed,
            skipped = run.summary.skipped,
            warnings = run.summary.warnings,
            "Test run complete"
        );

        self.state.last_results = run.results.clone();
        self.state.history.push(run.clone());
        run
    }

    async fn run_case(&mut self, case: &TestCase) -> TestResult {
        if let Some(key) = case.requires {
            if self.state.context.get(key).is_none() {
                return TestResult::skipped(case, format!("No {} available", key.describe()));
            }
        }

        let config = self.client.config();
        if case.is_write() && !config.can_write() {
            return TestResult::skipped(
                case,
                format!("Write operations disabled in {}", config.environment),
            );
        }

        let payload = case.payload.map(|build| build(&self.state.context));
        let mut last: Option<(String, Outcome)> = None;

        for template in case.endpoints() {
            let Some(endpoint) = self.state.context.fill(template) else {
                continue;
            };

            let mut request = ExecuteRequest::new(case.method, endpoint.clone())
                .base(case.base)
                .jwt(case.use_jwt)
                .hmac(case.use_hmac);
            request.payload = payload.clone();
            request.query = case
                .query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            match self.client.execute(&request).await {
                Ok(outcome) => {
                    let done = outcome.success;
                    last = Some((endpoint, outcome));
                    if done {
                        break;
                    }
                }
                Err(e @ Error::PermissionDenied { .. }) => {
                    return TestResult::skipped(case, e.to_string());
                }
                Err(e) => {
                    let reason = self.client.redactor().redact(&e.to_string());
                    return TestResult::not_sent(case, TestStatus::Failed, reason);
                }
            }
        }

        let Some((endpoint, outcome)) = last else {
            return TestResult::skipped(case, "No endpoint could be resolved");
        };
        self.classify(case, &endpoint, outcome)
    }

    fn classify(&mut self, case: &TestCase, endpoint: &str, outcome: Outcome) -> TestResult {
        let record = &outcome.record;

        let (status, error) = match &record.error {
            None => {
                self.capture(case, &record.data);
                (TestStatus::Passed, None)
            }
            Some(FailureReason::Http(code)) => {
                let status = if case.on_failure.is_warning(*code) {
                    TestStatus::Warning
                } else {
                    TestStatus::Failed
                };
                (status, Some(http_error_message(*code, &record.data)))
            }
            Some(reason) => (TestStatus::Failed, Some(reason.to_string())),
        };

        let error = error.map(|e| self.client.redactor().redact(&e));
        TestResult::from_record(case, endpoint, status, record, error)
    }

    fn capture(&mut self, case: &TestCase, data: &Value) {
        let Some(capture) = case.captures else {
            return;
        };
        let Some(id) = capture.extract(data) else {
            tracing::debug!(test = case.id, "No id found in response");
            return;
        };
        if case.is_write() {
            self.state.context.created.push(CreatedResource {
                test: case.id.to_string(),
                id: id.clone(),
            });
        }
        self.state.context.set_if_absent(capture.key, id);
    }

    /// Write the run artifact into `dir`
    pub fn persist(&self, run: &TestRun, dir: &Path) -> Result<PathBuf> {
        let config = self.client.config();
        paths::ensure_dir(dir)?;

        let path = paths::artifact_path(
            dir,
            &config.settings.output.file_prefix,
            config.environment,
            run.timestamp,
        );
        let artifact = RunArtifact::new(run, config, &self.state.context);
        let json = serde_json::to_string_pretty(&artifact)?;
        std::fs::write(&path, json)?;

        tracing::info!(path = %path.display(), "Results saved");
        Ok(path)
    }
}

/// `HTTP <code>`, plus the server's `message` or `error` field when present
fn http_error_message(code: u16, data: &Value) -> String {
    let message = data
        .get("message")
        .or_else(|| data.get("error"))
        .and_then(Value::as_str);
    match message {
        Some(msg) => format!("HTTP {}: {}", code, truncate_text(msg, HTTP_MESSAGE_LIMIT)),
        None => format!("HTTP {}", code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::default();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_http_error_message() {
        assert_eq!(http_error_message(404, &Value::Null), "HTTP 404");
        assert_eq!(
            http_error_message(403, &json!({"message": "Forbidden"})),
            "HTTP 403: Forbidden"
        );
        assert_eq!(
            http_error_message(500, &json!({"error": "boom"})),
            "HTTP 500: boom"
        );
    }
}
