//! Issue types for lint results

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Severity level for issues
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,
    /// Warning - potential issue
    #[default]
    Warning,
    /// Error - definite problem
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "hint" | "note" | "convention" | "refactor" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" | "fatal" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Correction status of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    /// Found and left as is
    #[default]
    Reported,
    /// Fixed by autocorrection
    Corrected,
    /// Correctable, but its edit overlapped an edit that was applied first
    UnresolvedConflict,
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueStatus::Reported => write!(f, "reported"),
            IssueStatus::Corrected => write!(f, "corrected"),
            IssueStatus::UnresolvedConflict => write!(f, "unresolved-conflict"),
        }
    }
}

/// Source code location
///
/// Lines and columns are 1-based; columns count characters. The end position
/// is exclusive and absent when only a point is known (e.g. parse failures).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// End line (1-based)
    pub end_line: Option<usize>,
    /// End column (1-based, exclusive)
    pub end_column: Option<usize>,
    /// Byte range in the text version the issue was produced against
    pub offsets: Range<usize>,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            end_line: None,
            end_column: None,
            offsets: 0..0,
        }
    }

    pub fn with_end(mut self, end_line: usize, end_column: usize) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }

    pub fn with_offsets(mut self, offsets: Range<usize>) -> Self {
        self.offsets = offsets;
        self
    }

    /// Length of the highlighted region in characters, when it fits on one line
    pub fn length(&self) -> usize {
        match (self.end_line, self.end_column) {
            (Some(end_line), Some(end_column)) if end_line == self.line => {
                end_column.saturating_sub(self.column)
            }
            _ => 0,
        }
    }
}

/// A single lint finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Rule name without group (e.g. "TrailingWhitespace")
    pub rule: String,
    /// Rule group (e.g. "Layout")
    pub group: String,
    /// Severity level
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Source location
    pub location: Location,
    /// Whether the owning rule can propose an edit for this issue
    pub correctable: bool,
    /// Correction status
    #[serde(default)]
    pub status: IssueStatus,
}

impl Issue {
    /// Create a new issue
    pub fn new(
        rule: &str,
        group: &str,
        severity: Severity,
        message: &str,
        location: Location,
    ) -> Self {
        Self {
            rule: rule.to_string(),
            group: group.to_string(),
            severity,
            message: message.to_string(),
            location,
            correctable: false,
            status: IssueStatus::Reported,
        }
    }

    /// Mark the issue as correctable
    pub fn correctable(mut self) -> Self {
        self.correctable = true;
        self
    }

    /// Fully qualified rule name (e.g. "Layout/TrailingWhitespace")
    pub fn rule_id(&self) -> String {
        format!("{}/{}", self.group, self.rule)
    }

    pub fn is_corrected(&self) -> bool {
        self.status == IssueStatus::Corrected
    }

    pub fn is_conflicted(&self) -> bool {
        self.status == IssueStatus::UnresolvedConflict
    }

    /// Still open: found, and not fixed in this run
    pub fn is_open(&self) -> bool {
        self.status != IssueStatus::Corrected
    }
}

/// Phase in which a rule failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrashPhase {
    Detect,
    Correct,
}

impl std::fmt::Display for CrashPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrashPhase::Detect => write!(f, "detect"),
            CrashPhase::Correct => write!(f, "correct"),
        }
    }
}

/// A rule that failed while analysing a source. Kept apart from issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCrash {
    /// Fully qualified rule name
    pub rule_id: String,
    pub phase: CrashPhase,
    /// Pass number (1-based) in which the failure happened
    pub pass: usize,
    pub message: String,
}

impl std::fmt::Display for RuleCrash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rule {} failed during {} (pass {}): {}",
            self.rule_id, self.phase, self.pass, self.message
        )
    }
}
