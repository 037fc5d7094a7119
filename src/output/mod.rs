//! Output formatters for run reports

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::diagnostic::Issue;
use crate::runner::Report;
use crate::source::Source;

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format the entire report
    fn format(&self, report: &Report) -> String;

    /// Format a single issue of `source`
    fn format_issue(&self, source: &Source, issue: &Issue) -> String;
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}
