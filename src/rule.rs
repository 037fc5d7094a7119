//! Rule protocol: detection and optional correction

use crate::corrector::Edit;
use crate::diagnostic::{Issue, Severity};
use crate::source::Source;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Rule group, used for bulk enable/disable and default severities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleGroup {
    /// Code that is likely wrong
    Lint,
    /// Idiomatic and consistent style rules
    Style,
    /// Whitespace and formatting
    Layout,
}

impl RuleGroup {
    /// Severity a rule inherits unless configured otherwise
    pub fn default_severity(self) -> Severity {
        match self {
            RuleGroup::Lint => Severity::Warning,
            RuleGroup::Style | RuleGroup::Layout => Severity::Info,
        }
    }
}

impl fmt::Display for RuleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleGroup::Lint => write!(f, "Lint"),
            RuleGroup::Style => write!(f, "Style"),
            RuleGroup::Layout => write!(f, "Layout"),
        }
    }
}

impl std::str::FromStr for RuleGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lint" => Ok(RuleGroup::Lint),
            "style" => Ok(RuleGroup::Style),
            "layout" => Ok(RuleGroup::Layout),
            _ => Err(format!("Unknown group: {}", s)),
        }
    }
}

/// Error raised by a rule while detecting or correcting
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("no syntax tree available")]
    MissingTree,

    #[error("{0}")]
    Failed(String),
}

/// A lint rule
///
/// Rules hold no per-file state. `detect` must not depend on any other
/// rule's findings, and `correct` must be a pure function of the current
/// text and the issue.
pub trait Rule: Send + Sync {
    /// Rule name without group (e.g. "TrailingWhitespace")
    fn name(&self) -> &str;

    fn group(&self) -> RuleGroup;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Whether `correct` can ever return an edit
    fn supports_correction(&self) -> bool {
        false
    }

    /// Scan the source and report issues
    fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError>;

    /// Propose an edit for one of this rule's correctable issues.
    ///
    /// The edit must stay within the issue's byte range.
    fn correct(&self, _source: &Source, _issue: &Issue) -> Result<Option<Edit>, RuleError> {
        Ok(None)
    }

    /// Fully qualified name (e.g. "Layout/TrailingWhitespace")
    fn id(&self) -> String {
        format!("{}/{}", self.group(), self.name())
    }
}

/// Collects the issues of one rule for one source.
///
/// Every issue is stamped with the rule's identity and configured severity.
pub struct Reporter<'a> {
    source: &'a Source,
    rule: &'a str,
    group: RuleGroup,
    severity: Severity,
    can_correct: bool,
    issues: Vec<Issue>,
}

impl<'a> Reporter<'a> {
    pub fn new(source: &'a Source, rule: &'a dyn Rule, severity: Severity) -> Self {
        Self {
            source,
            rule: rule.name(),
            group: rule.group(),
            severity,
            can_correct: rule.supports_correction(),
            issues: Vec::new(),
        }
    }

    /// Report an issue over a byte range of the current text
    pub fn add(&mut self, range: Range<usize>, message: &str) {
        let issue = self.issue(range, message);
        self.issues.push(issue);
    }

    /// Report an issue the rule can correct
    pub fn add_correctable(&mut self, range: Range<usize>, message: &str) {
        let mut issue = self.issue(range, message);
        issue.correctable = self.can_correct;
        self.issues.push(issue);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }

    fn issue(&self, range: Range<usize>, message: &str) -> Issue {
        let len = self.source.text().len();
        let end = range.end.min(len);
        let start = range.start.min(end);
        Issue::new(
            self.rule,
            &self.group.to_string(),
            self.severity,
            message,
            self.source.location(start..end),
        )
    }
}

/// Reports parse failures.
///
/// Runs before every other rule and alone when the text does not parse. It
/// is not part of any rule set, so it cannot be disabled or excluded.
pub struct SyntaxRule;

impl SyntaxRule {
    pub const NAME: &'static str = "Syntax";
}

impl Rule for SyntaxRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn group(&self) -> RuleGroup {
        RuleGroup::Lint
    }

    fn description(&self) -> &str {
        "Reports source text that cannot be parsed"
    }

    fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
        if let Some(failure) = source.parse_failure() {
            let offset = failure.offset.min(source.text().len());
            reporter.add(offset..offset, &failure.message);
        }
        Ok(())
    }
}
