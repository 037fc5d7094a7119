//! Human-readable text output formatter

use super::OutputFormatter;
use crate::diagnostic::{Issue, IssueStatus, Severity};
use crate::runner::{Report, SourceReport};
use crate::source::Source;
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show the offending source line under open issues
    pub show_source: bool,

    /// Show statistics
    pub show_stats: bool,

    /// Show per-rule timings after the summary
    pub show_timings: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_source: true,
            show_stats: true,
            show_timings: false,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn with_timings(mut self, show: bool) -> Self {
        self.show_timings = show;
        self
    }

    fn paint(&self, text: String, style: fn(ColoredString) -> ColoredString) -> String {
        if self.colored {
            style(text.as_str().normal()).to_string()
        } else {
            text
        }
    }

    fn severity_str(&self, severity: Severity) -> String {
        let s = severity.to_string();
        match severity {
            Severity::Error => self.paint(s, |s| s.red().bold()),
            Severity::Warning => self.paint(s, |s| s.yellow().bold()),
            Severity::Info => self.paint(s, |s| s.blue()),
        }
    }

    fn status_marker(&self, status: IssueStatus) -> String {
        match status {
            IssueStatus::Reported => String::new(),
            IssueStatus::Corrected => format!(" {}", self.paint("[corrected]".into(), |s| s.green())),
            IssueStatus::UnresolvedConflict => {
                format!(" {}", self.paint("[conflict]".into(), |s| s.magenta()))
            }
        }
    }

    fn format_source(&self, report: &SourceReport) -> String {
        let name = report.source.display_name();
        let mut output = String::new();

        if report.skipped {
            output.push_str(&format!("{}: skipped (run cancelled)\n", name));
            return output;
        }

        for issue in report.issues() {
            output.push_str(&self.format_issue(&report.source, issue));
        }
        for crash in &report.crashes {
            output.push_str(&format!("{}: {}\n", name, self.paint(crash.to_string(), |s| s.red())));
        }
        for warning in &report.warnings {
            output.push_str(&format!("{}: {}: {}\n", name, self.severity_str(Severity::Warning), warning));
        }
        if !report.converged {
            let reason = if report.cycle {
                "corrections cycle"
            } else {
                "iteration limit reached"
            };
            output.push_str(&format!(
                "{}: {} after {} passes ({})\n",
                name,
                self.paint("did not converge".into(), |s| s.yellow().bold()),
                report.passes,
                reason
            ));
        }
        if report.cancelled {
            output.push_str(&format!("{}: cancelled after {} passes\n", name, report.passes));
        }

        output
    }

    fn plural(count: usize, word: &str) -> String {
        if count == 1 {
            format!("{} {}", count, word)
        } else {
            format!("{} {}s", count, word)
        }
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &Report) -> String {
        let mut output = String::new();

        for source_report in &report.sources {
            let section = self.format_source(source_report);
            if !section.is_empty() {
                output.push_str(&section);
                output.push('\n');
            }
        }

        // Statistics
        if self.show_stats {
            let processed = report.files_processed();
            let issues: usize = report.sources.iter().map(|s| s.issues().len()).sum();
            output.push_str(&format!(
                "{} inspected, {} found",
                Self::plural(processed, "file"),
                Self::plural(issues, "issue")
            ));

            let mut counts = Vec::new();
            if report.error_count() > 0 {
                counts.push(self.paint(Self::plural(report.error_count(), "error"), |s| s.red()));
            }
            if report.warning_count() > 0 {
                counts.push(self.paint(Self::plural(report.warning_count(), "warning"), |s| s.yellow()));
            }
            if report.info_count() > 0 {
                counts.push(self.paint(Self::plural(report.info_count(), "info"), |s| s.blue()));
            }
            if report.corrected_count() > 0 {
                counts.push(self.paint(format!("{} corrected", report.corrected_count()), |s| s.green()));
            }
            if report.conflict_count() > 0 {
                counts.push(Self::plural(report.conflict_count(), "conflict"));
            }
            if report.crash_count() > 0 {
                counts.push(self.paint(Self::plural(report.crash_count(), "rule crash"), |s| s.red()));
            }
            if report.skipped_count() > 0 {
                counts.push(format!("{} skipped", report.skipped_count()));
            }

            if !counts.is_empty() {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');

            output.push_str(&format!("Finished in {:.2}s\n", report.duration.as_secs_f64()));
        }

        if self.show_timings {
            output.push('\n');
            output.push_str(&report.format_timings());
        }

        output
    }

    fn format_issue(&self, source: &Source, issue: &Issue) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}:{}:{}: {}[{}]: {}{}\n",
            source.display_name(),
            issue.location.line,
            issue.location.column,
            self.severity_str(issue.severity),
            self.paint(issue.rule_id(), |s| s.cyan()),
            issue.message,
            self.status_marker(issue.status)
        ));

        // Earlier-pass issues point into text that no longer exists
        if self.show_source && issue.status == IssueStatus::Reported {
            if let Some(line) = source.line(issue.location.line) {
                let bar = self.paint("|".into(), |s| s.blue());
                let number = format!("{:>4}", issue.location.line);
                output.push_str(&format!("{} {} {}\n", self.paint(number, |s| s.blue()), bar, line));

                let padding = " ".repeat(issue.location.column.saturating_sub(1));
                let underline = "^".repeat(issue.location.length().max(1));
                output.push_str(&format!(
                    "     {} {}{}\n",
                    bar,
                    padding,
                    self.paint(underline, |s| s.red())
                ));
            }
        }

        output
    }
}
