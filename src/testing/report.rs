//! Console output for CLI runs

use std::path::Path;

use colored::Colorize;

use super::registry::{Category, RunContext, TestCase};
use super::result::{TestResult, TestRun, TestStatus};
use crate::common::redact::truncate_text;
use crate::common::Config;

/// Errors listed in the summary
const SUMMARY_ERRORS: usize = 5;
const ERROR_PREVIEW: usize = 100;

const RULE: &str = "======================================================================";

/// How much a run prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Nothing at all (server mode)
    Silent,
    /// Only the summary block
    Quiet,
    Normal,
}

#[derive(Debug, Clone)]
pub struct Reporter {
    verbosity: Verbosity,
    current_category: Option<Category>,
}

impl Reporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            current_category: None,
        }
    }

    pub fn silent() -> Self {
        Self::new(Verbosity::Silent)
    }

    fn verbose(&self) -> bool {
        self.verbosity == Verbosity::Normal
    }

    pub fn banner(&mut self, config: &Config, count: usize) {
        self.current_category = None;
        if !self.verbose() {
            return;
        }
        println!("\n{}", RULE.cyan());
        println!(
            "{}",
            format!("Feature.fm API Tests - {} Environment", config.environment.display_name())
                .cyan()
                .bold()
        );
        println!("{}", RULE.cyan());
        println!("Base URL: {}", config.base_url);
        println!(
            "Write operations: {}",
            if config.can_write() {
                "ENABLED".green()
            } else {
                "DISABLED".yellow()
            }
        );
        println!("Tests selected: {}", count);
    }

    pub fn test_started(&mut self, case: &TestCase) {
        if !self.verbose() {
            return;
        }
        if self.current_category != Some(case.category) {
            self.current_category = Some(case.category);
            println!("\n{}", format!("━━━ {} ━━━", case.category).yellow());
        }
        let marker = if case.is_write() { " (WRITE)" } else { "" };
        println!("\n[TEST] {}{}", case.name, marker.dimmed());
    }

    pub fn test_finished(&self, result: &TestResult) {
        if !self.verbose() {
            return;
        }
        let detail = match (&result.error, result.status_code) {
            (Some(err), _) => err.clone(),
            (None, 0) => String::new(),
            (None, code) => format!("HTTP {}", code),
        };
        let line = format!(
            "  {} {} {} ({:.0}ms)",
            result.status.symbol(),
            result.method,
            result.endpoint,
            result.duration_ms
        );
        let line = match result.status {
            TestStatus::Passed => line.green(),
            TestStatus::Failed => line.red(),
            TestStatus::Warning => line.yellow(),
            TestStatus::Skipped => line.cyan(),
        };
        if detail.is_empty() {
            println!("{}", line);
        } else {
            println!("{} {}", line, truncate_text(&detail, ERROR_PREVIEW).dimmed());
        }
    }

    pub fn interrupted(&self) {
        if self.verbosity != Verbosity::Silent {
            println!("\n{}", "Run interrupted, remaining tests not executed".yellow());
        }
    }

    pub fn summary(
        &self,
        config: &Config,
        run: &TestRun,
        context: &RunContext,
        artifact: Option<&Path>,
    ) {
        if self.verbosity == Verbosity::Silent {
            return;
        }
        let s = &run.summary;

        println!("\n{}", RULE.cyan());
        println!(
            "{}",
            format!("Test Summary - {} Environment", config.environment.display_name()).cyan()
        );
        println!("{}", RULE.cyan());

        println!("Total Tests: {}", s.total);
        println!("{}", format!("✓ Passed: {}", s.passed).green());
        println!("{}", format!("✗ Failed: {}", s.failed).red());
        println!("{}", format!("⚠ Warnings: {}", s.warnings).yellow());
        println!("{}", format!("→ Skipped: {}", s.skipped).cyan());

        if s.total > 0 {
            let rate = s.success_rate();
            let line = format!("Success Rate: {:.1}%", rate);
            let line = if rate >= 70.0 {
                line.green()
            } else if rate >= 50.0 {
                line.yellow()
            } else {
                line.red()
            };
            println!("\n{}", line);
        }

        println!("\nEndpoints tested: {}", run.endpoints_tested.len());

        println!("\n{}", "API Availability:".cyan());
        for (family, available) in run.availability() {
            let line = match available {
                Some(true) => format!("✓ {}: Available", family.display_name()).green(),
                Some(false) => format!("⚠ {}: Not Available", family.display_name()).yellow(),
                None => format!("? {}: Unknown", family.display_name()).dimmed(),
            };
            println!("  {}", line);
        }

        let failures: Vec<&TestResult> = run.failures().take(SUMMARY_ERRORS).collect();
        if !failures.is_empty() {
            println!("\n{}", "Errors encountered:".red());
            for failure in failures {
                let error = failure
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("HTTP {}", failure.status_code));
                println!("  • {}: {}", failure.id, truncate_text(&error, ERROR_PREVIEW));
            }
        }

        if !context.created.is_empty() {
            println!("\n{}", "Resources created:".cyan());
            for resource in &context.created {
                println!("  • {}: {}", resource.test, resource.id);
            }
        }

        if run.interrupted {
            println!("\n{}", "Run was interrupted".yellow());
        }

        println!("{}", RULE.cyan());

        if let Some(path) = artifact {
            println!("Results saved to: {}", path.display());
        }
    }
}
