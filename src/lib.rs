//! Lintel - rule-driven source linter with fixpoint autocorrection
//!
//! Rules detect issues in a parsed source and may propose text edits for
//! them. With autocorrection on, the runner applies a conflict-free subset of
//! those edits, re-parses, and repeats until no correctable issue remains.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> Config -> RuleSet -> Runner -> (detect -> correct -> re-parse)* -> Report -> Formatter
//! ```
//!
//! The runner only sees resolved rules: each with its enabled flag,
//! severity and excluded paths. Parsing is behind the [`Parser`] trait; the
//! crate ships a small parser for a Ruby-like block language.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lintel::plugins::ruby::RubyParser;
//! use lintel::{Config, Registry, RuleSet, Runner, Source};
//!
//! let parser = RubyParser::new();
//! let rules = RuleSet::resolve(&Registry::builtin(), &Config::new()).unwrap();
//! let source = Source::parse("if (x)\n  y\nend\n", None, &parser);
//! let report = Runner::new(rules, Arc::new(parser)).run(vec![source], true).unwrap();
//! assert_eq!(report.sources[0].source.text(), "if x\n  y\nend\n");
//! ```

pub mod config;
pub mod corrector;
pub mod diagnostic;
pub mod directive;
pub mod output;
pub mod parser;
pub mod registry;
pub mod rule;
pub mod runner;
pub mod source;

// Re-export main types
pub use config::{Config, ConfigError};
pub use corrector::{Correction, Corrector, Edit};
pub use diagnostic::{CrashPhase, Issue, IssueStatus, Location, RuleCrash, Severity};
pub use directive::Directives;
pub use output::{JsonFormatter, OutputFormat, OutputFormatter, TextFormatter};
pub use parser::{Node, ParseFailure, Parser, SyntaxTree};
pub use registry::{ConfiguredRule, Registry, RuleEntry, RuleSet};
pub use rule::{Reporter, Rule, RuleError, RuleGroup, SyntaxRule};
pub use runner::{
    run, CancellationToken, Report, RuleTiming, RunError, RunOptions, Runner, SourceReport,
};
pub use source::Source;

// Built-in plugins
pub mod plugins {
    pub mod ruby;
}
