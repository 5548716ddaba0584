//! External collection runner
//!
//! Generated collections are executed by `newman`; this module shells out to
//! it and reads back the JSON reporter output.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Collection not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} produced no usable report (exit code {exit_code}): {reason}")]
    Report {
        program: String,
        exit_code: i32,
        reason: String,
    },
}

/// Outcome of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub exit_code: i32,
    /// Requests sent
    pub requests: u64,
    /// Assertions evaluated
    pub assertions: u64,
    pub failures: Vec<RunFailure>,
}

impl RunSummary {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && self.failures.is_empty()
    }
}

/// A failed assertion or request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    /// Collection item the failure belongs to
    pub item: String,
    /// Test name, when the failure is an assertion
    pub test: Option<String>,
    pub message: String,
}

/// Executes a collection file against a host.
pub trait CollectionRunner {
    /// Check whether the runner is installed
    fn is_available(&self) -> bool;

    /// Run `collection`, overriding `baseUrl` with `host` when given
    fn run(&self, collection: &Path, host: Option<&str>) -> Result<RunSummary, RunnerError>;
}

/// Runner backed by the `newman` command line tool.
#[derive(Debug, Clone)]
pub struct NewmanRunner {
    program: String,
    verbose: bool,
}

impl Default for NewmanRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl NewmanRunner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "newman".to_string(),
            verbose: false,
        }
    }

    /// Use a specific newman binary
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pass `--verbose` through to newman
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn command(&self, collection: &Path, host: Option<&str>, report: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("run").arg(collection);
        if let Some(host) = host {
            cmd.arg("--env-var").arg(format!("baseUrl={host}"));
        }
        if self.verbose {
            cmd.arg("--verbose");
        }
        cmd.args(["--reporters", "cli,json", "--reporter-json-export"])
            .arg(report);
        cmd
    }
}

impl CollectionRunner for NewmanRunner {
    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn run(&self, collection: &Path, host: Option<&str>) -> Result<RunSummary, RunnerError> {
        if !collection.exists() {
            return Err(RunnerError::NotFound(collection.to_path_buf()));
        }

        let report = NamedTempFile::with_suffix(".json")?;
        let mut cmd = self.command(collection, host, report.path());
        debug!(command = ?cmd, "starting collection run");

        let output = cmd.output().map_err(|source| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let exit_code = output.status.code().unwrap_or(-1);

        // newman's cli reporter is the user-facing output
        print!("{}", String::from_utf8_lossy(&output.stdout));

        let content = std::fs::read_to_string(report.path())?;
        if content.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunnerError::Report {
                program: self.program.clone(),
                exit_code,
                reason: stderr.trim().to_string(),
            });
        }

        let mut summary = parse_report(&content).map_err(|e| RunnerError::Report {
            program: self.program.clone(),
            exit_code,
            reason: e.to_string(),
        })?;
        summary.exit_code = exit_code;
        info!(
            requests = summary.requests,
            assertions = summary.assertions,
            failures = summary.failures.len(),
            exit_code,
            "collection run finished"
        );
        Ok(summary)
    }
}

// ── newman JSON report ──

#[derive(Deserialize)]
struct Report {
    run: ReportRun,
}

#[derive(Deserialize)]
struct ReportRun {
    #[serde(default)]
    stats: ReportStats,
    #[serde(default)]
    failures: Vec<ReportFailure>,
}

#[derive(Default, Deserialize)]
struct ReportStats {
    #[serde(default)]
    requests: ReportCount,
    #[serde(default)]
    assertions: ReportCount,
}

#[derive(Default, Deserialize)]
struct ReportCount {
    #[serde(default)]
    total: u64,
}

#[derive(Deserialize)]
struct ReportFailure {
    #[serde(default)]
    error: ReportError,
    #[serde(default)]
    source: ReportSource,
}

#[derive(Default, Deserialize)]
struct ReportError {
    #[serde(default)]
    message: String,
    test: Option<String>,
}

#[derive(Default, Deserialize)]
struct ReportSource {
    #[serde(default)]
    name: String,
}

/// Read the counts and failures out of a newman JSON report.
///
/// # Errors
///
/// Returns error if the report is not valid JSON or has no `run` section
pub fn parse_report(content: &str) -> Result<RunSummary, serde_json::Error> {
    let report: Report = serde_json::from_str(content)?;
    Ok(RunSummary {
        exit_code: 0,
        requests: report.run.stats.requests.total,
        assertions: report.run.stats.assertions.total,
        failures: report
            .run
            .failures
            .into_iter()
            .map(|f| RunFailure {
                item: f.source.name,
                test: f.error.test,
                message: f.error.message,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "collection": {"info": {"name": "Petstore 1.0.0"}},
        "run": {
            "stats": {
                "iterations": {"total": 1, "pending": 0, "failed": 0},
                "requests": {"total": 3, "pending": 0, "failed": 0},
                "assertions": {"total": 7, "pending": 0, "failed": 1}
            },
            "failures": [{
                "error": {
                    "name": "AssertionError",
                    "message": "expected response to have status code 201 but got 500",
                    "test": "Status code is 201"
                },
                "at": "assertion:0 in test-script",
                "source": {"id": "abc", "name": "POST /pets"}
            }]
        }
    }"#;

    #[test]
    fn report_counts_and_failures() {
        let summary = parse_report(REPORT).unwrap();
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.assertions, 7);
        assert_eq!(
            summary.failures,
            vec![RunFailure {
                item: "POST /pets".into(),
                test: Some("Status code is 201".into()),
                message: "expected response to have status code 201 but got 500".into(),
            }]
        );
        assert!(!summary.passed());
    }

    #[test]
    fn clean_report_passes() {
        let summary = parse_report(r#"{"run": {"stats": {"requests": {"total": 2}}}}"#).unwrap();
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.assertions, 0);
        assert!(summary.passed());
    }

    #[test]
    fn report_without_run_is_rejected() {
        assert!(parse_report(r#"{"collection": {}}"#).is_err());
        assert!(parse_report("not json").is_err());
    }

    #[test]
    fn command_line_carries_host_and_json_reporter() {
        let runner = NewmanRunner::new().with_verbose(true);
        let cmd = runner.command(
            Path::new("collection.json"),
            Some("http://localhost:3000"),
            Path::new("/tmp/report.json"),
        );
        assert_eq!(cmd.get_program(), "newman");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "run",
                "collection.json",
                "--env-var",
                "baseUrl=http://localhost:3000",
                "--verbose",
                "--reporters",
                "cli,json",
                "--reporter-json-export",
                "/tmp/report.json",
            ]
        );
    }

    #[test]
    fn missing_collection_is_reported() {
        let runner = NewmanRunner::new().with_program("newman-not-installed");
        let err = runner
            .run(Path::new("/nonexistent/collection.json"), None)
            .unwrap_err();
        assert!(matches!(err, RunnerError::NotFound(_)));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let runner = NewmanRunner::new().with_program("newman-not-installed-anywhere");
        assert!(!runner.is_available());
    }
}
