//! JSON output formatter

use super::OutputFormatter;
use crate::diagnostic::{Issue, IssueStatus, RuleCrash, Severity};
use crate::runner::Report;
use crate::source::Source;
use serde::Serialize;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    files: Vec<JsonFile<'a>>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonFile<'a> {
    path: String,
    issues: Vec<JsonIssue<'a>>,
    crashes: &'a [RuleCrash],
    passes: usize,
    converged: bool,
    cycle: bool,
    modified: bool,
    skipped: bool,
    cancelled: bool,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    warnings: &'a [String],
}

#[derive(Serialize)]
struct JsonIssue<'a> {
    rule_id: String,
    severity: Severity,
    message: &'a str,
    line: usize,
    column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_column: Option<usize>,
    correctable: bool,
    status: IssueStatus,
}

impl<'a> From<&'a Issue> for JsonIssue<'a> {
    fn from(issue: &'a Issue) -> Self {
        Self {
            rule_id: issue.rule_id(),
            severity: issue.severity,
            message: &issue.message,
            line: issue.location.line,
            column: issue.location.column,
            end_line: issue.location.end_line,
            end_column: issue.location.end_column,
            correctable: issue.correctable,
            status: issue.status,
        }
    }
}

#[derive(Serialize)]
struct JsonSummary {
    files_processed: usize,
    files_skipped: usize,
    error_count: usize,
    warning_count: usize,
    info_count: usize,
    corrected_count: usize,
    conflict_count: usize,
    crash_count: usize,
    unconverged_count: usize,
    duration_ms: u128,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &Report) -> String {
        let files = report
            .sources
            .iter()
            .map(|s| JsonFile {
                path: s.source.display_name(),
                issues: s.issues().iter().map(JsonIssue::from).collect(),
                crashes: &s.crashes,
                passes: s.passes,
                converged: s.converged,
                cycle: s.cycle,
                modified: s.source.is_modified(),
                skipped: s.skipped,
                cancelled: s.cancelled,
                warnings: &s.warnings,
            })
            .collect();

        let output = JsonOutput {
            files,
            summary: JsonSummary {
                files_processed: report.files_processed(),
                files_skipped: report.skipped_count(),
                error_count: report.error_count(),
                warning_count: report.warning_count(),
                info_count: report.info_count(),
                corrected_count: report.corrected_count(),
                conflict_count: report.conflict_count(),
                crash_count: report.crash_count(),
                unconverged_count: report.unconverged_count(),
                duration_ms: report.duration.as_millis(),
            },
        };

        self.render(&output)
    }

    fn format_issue(&self, _source: &Source, issue: &Issue) -> String {
        self.render(&JsonIssue::from(issue))
    }
}
