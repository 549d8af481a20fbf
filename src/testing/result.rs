//! Test results, run summaries and bounded history

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

use super::registry::{ApiFamily, Category, RunContext, TestCase};
use crate::client::{HttpMethod, RequestSummary, ResponseRecord};
use crate::common::redact::mask_key;
use crate::common::{Config, Environment};

/// Runs kept in memory
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Warning,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "→",
            TestStatus::Warning => "⚠",
        }
    }
}

/// Outcome of one test case; built once and never changed
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub endpoint: String,
    pub method: HttpMethod,
    pub status: TestStatus,
    /// 0 when no response was received
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(rename = "duration")]
    pub duration_ms: f64,
    pub timestamp: DateTime<Local>,
    pub attempts: u32,
    pub request: RequestSummary,
    pub response: Option<Value>,
    pub error: Option<String>,
}

impl TestResult {
    /// Result for a case that reached the network
    pub fn from_record(
        case: &TestCase,
        endpoint: &str,
        status: TestStatus,
        record: &ResponseRecord,
        error: Option<String>,
    ) -> Self {
        Self {
            id: case.id.to_string(),
            name: case.name.to_string(),
            description: case.description.to_string(),
            category: case.category,
            endpoint: endpoint.to_string(),
            method: case.method,
            status,
            status_code: record.status_code.unwrap_or(0),
            duration_ms: round2(record.elapsed_ms as f64),
            timestamp: Local::now(),
            attempts: record.attempts,
            request: record.request.clone(),
            response: match &record.data {
                Value::Null => None,
                data => Some(data.clone()),
            },
            error,
        }
    }

    pub fn skipped(case: &TestCase, reason: impl Into<String>) -> Self {
        Self::not_sent(case, TestStatus::Skipped, reason)
    }

    /// Result for a case that never got a response
    pub fn not_sent(case: &TestCase, status: TestStatus, reason: impl Into<String>) -> Self {
        Self {
            id: case.id.to_string(),
            name: case.name.to_string(),
            description: case.description.to_string(),
            category: case.category,
            endpoint: case.endpoint.to_string(),
            method: case.method,
            status,
            status_code: 0,
            duration_ms: 0.0,
            timestamp: Local::now(),
            attempts: 0,
            request: RequestSummary::default(),
            response: None,
            error: Some(reason.into()),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Status counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub warnings: usize,
}

impl Summary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
                TestStatus::Warning => summary.warnings += 1,
            }
        }
        summary
    }

    /// Percentage of passed tests; 0 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

/// A completed (or interrupted) run
#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub timestamp: DateTime<Local>,
    pub environment: Environment,
    #[serde(flatten)]
    pub summary: Summary,
    pub interrupted: bool,
    pub endpoints_tested: Vec<String>,
    pub results: Vec<TestResult>,
}

impl TestRun {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
    }

    /// Per API product: `Some(true)` when any of its cases passed,
    /// `Some(false)` when some ran and none passed, `None` when none ran
    pub fn availability(&self) -> BTreeMap<ApiFamily, Option<bool>> {
        ApiFamily::ALL
            .into_iter()
            .map(|family| {
                let mut ran = self
                    .results
                    .iter()
                    .filter(|r| r.category.family() == family && r.status != TestStatus::Skipped)
                    .peekable();
                let available = match ran.peek() {
                    None => None,
                    Some(_) => Some(ran.any(|r| r.status == TestStatus::Passed)),
                };
                (family, available)
            })
            .collect()
    }
}

/// Most recent runs, oldest first
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    runs: VecDeque<TestRun>,
}

impl RunHistory {
    pub fn push(&mut self, run: TestRun) {
        self.runs.push_back(run);
        while self.runs.len() > HISTORY_LIMIT {
            self.runs.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestRun> {
        self.runs.iter()
    }

    pub fn latest(&self) -> Option<&TestRun> {
        self.runs.back()
    }
}

impl Serialize for RunHistory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.runs.iter())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactCredentials {
    pub api_key: String,
    pub iss: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactError {
    pub test: String,
    pub error: String,
}

/// What gets written to disk after a run
#[derive(Debug, Clone, Serialize)]
pub struct RunArtifact {
    #[serde(flatten)]
    pub run: TestRun,
    pub credentials: ArtifactCredentials,
    pub errors: Vec<ArtifactError>,
    pub api_availability: BTreeMap<ApiFamily, Option<bool>>,
    pub context: RunContext,
}

impl RunArtifact {
    pub fn new(run: &TestRun, config: &Config, context: &RunContext) -> Self {
        let errors = run
            .failures()
            .map(|r| ArtifactError {
                test: r.id.clone(),
                error: r
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("HTTP {}", r.status_code)),
            })
            .collect();

        Self {
            run: run.clone(),
            credentials: ArtifactCredentials {
                api_key: mask_key(&config.credentials.api_key),
                iss: config.credentials.issuer.clone(),
            },
            errors,
            api_availability: run.availability(),
            context: context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::registry::registry;

    fn result_with(status: TestStatus) -> TestResult {
        let case = registry().remove(0);
        let mut r = TestResult::skipped(&case, "x");
        r.status = status;
        r
    }

    fn run_with(statuses: &[TestStatus]) -> TestRun {
        let results: Vec<_> = statuses.iter().map(|s| result_with(*s)).collect();
        TestRun {
            timestamp: Local::now(),
            environment: Environment::Sandbox,
            summary: Summary::from_results(&results),
            interrupted: false,
            endpoints_tested: vec![],
            results,
        }
    }

    #[test]
    fn test_summary_counts_add_up() {
        use TestStatus::*;
        let run = run_with(&[Passed, Passed, Failed, Skipped, Warning, Warning]);
        let s = run.summary;
        assert_eq!(s.total, 6);
        assert_eq!(s.total, s.passed + s.failed + s.skipped + s.warnings);
        assert_eq!((s.passed, s.failed, s.skipped, s.warnings), (2, 1, 1, 2));
        assert!((s.success_rate() - 33.333).abs() < 0.01);
        assert_eq!(Summary::default().success_rate(), 0.0);
    }

    #[test]
    fn test_history_keeps_latest_ten_in_order() {
        let mut history = RunHistory::default();
        for i in 0..15 {
            let mut run = run_with(&[]);
            run.endpoints_tested = vec![format!("run-{}", i)];
            history.push(run);
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        let order: Vec<_> = history
            .iter()
            .map(|r| r.endpoints_tested[0].clone())
            .collect();
        let expected: Vec<_> = (5..15).map(|i| format!("run-{}", i)).collect();
        assert_eq!(order, expected);
        assert_eq!(history.latest().unwrap().endpoints_tested[0], "run-14");
    }

    #[test]
    fn test_availability_per_family() {
        let reg = registry();
        let case = |id: &str| reg.iter().find(|c| c.id == id).unwrap().clone();
        let with = |id: &str, status| {
            let mut r = TestResult::skipped(&case(id), "x");
            r.status = status;
            r
        };

        let mut run = run_with(&[]);
        run.results = vec![
            with("list_artists", TestStatus::Failed),
            with("auth", TestStatus::Passed),
            with("publisher_featured_song", TestStatus::Warning),
            with("conversion_init_session", TestStatus::Skipped),
        ];

        let availability = run.availability();
        assert_eq!(availability[&ApiFamily::Marketing], Some(true));
        assert_eq!(availability[&ApiFamily::Publisher], Some(false));
        assert_eq!(availability[&ApiFamily::Conversion], None);

        let value = serde_json::to_value(&availability).unwrap();
        assert_eq!(value["publisher"], false);
        assert!(value["conversion"].is_null());
    }

    #[test]
    fn test_result_serializes_wire_names() {
        let value = serde_json::to_value(result_with(TestStatus::Passed)).unwrap();
        assert_eq!(value["status"], "passed");
        assert_eq!(value["statusCode"], 0);
        assert!(value.get("duration").is_some());
        assert_eq!(value["category"], "Authentication");
        assert_eq!(value["method"], "GET");
    }

    #[test]
    fn test_run_flattens_summary() {
        let value = serde_json::to_value(run_with(&[TestStatus::Failed])).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["environment"], "sandbox");
    }
}
