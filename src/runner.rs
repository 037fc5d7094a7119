//! Runner: detect, correct and re-parse each source until nothing changes

use crate::config::{Config, DEFAULT_MAX_ITERATIONS};
use crate::corrector::{Corrector, Proposal};
use crate::diagnostic::{CrashPhase, Issue, IssueStatus, RuleCrash, Severity};
use crate::directive::Directives;
use crate::parser::Parser;
use crate::registry::{ConfiguredRule, RuleSet};
use crate::rule::{Reporter, Rule, RuleError, SyntaxRule};
use crate::source::Source;
use rayon::prelude::*;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that abort a whole run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no rules configured")]
    NoRules,
}

/// Shared flag to stop a run early
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution settings
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Correction rounds allowed per source
    pub max_iterations: usize,
    /// Run sources and rules on a thread pool
    pub parallel: bool,
    /// Thread count (0 = number of CPUs)
    pub jobs: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            parallel: true,
            jobs: 0,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.engine.max_iterations,
            parallel: config.engine.parallel,
            jobs: config.engine.jobs,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default)]
pub struct RuleTiming {
    /// Rule ID
    pub rule_id: String,
    /// Total time spent in `detect`
    pub total_time: Duration,
    /// Number of times the rule was evaluated
    pub evaluation_count: usize,
    /// Number of issues reported
    pub issue_count: usize,
}

impl RuleTiming {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }

    fn add(&mut self, other: &RuleTiming) {
        self.total_time += other.total_time;
        self.evaluation_count += other.evaluation_count;
        self.issue_count += other.issue_count;
    }
}

fn merge_timings(into: &mut HashMap<String, RuleTiming>, from: &HashMap<String, RuleTiming>) {
    for (rule_id, timing) in from {
        into.entry(rule_id.clone())
            .or_insert_with(|| RuleTiming::new(rule_id))
            .add(timing);
    }
}

/// Outcome for one source
#[derive(Debug)]
pub struct SourceReport {
    /// The source with its final text and issues
    pub source: Source,
    /// Rule failures, kept apart from issues
    pub crashes: Vec<RuleCrash>,
    /// Detection passes run
    pub passes: usize,
    /// False when the pass budget ran out or corrections cycled
    pub converged: bool,
    /// Corrections reproduced an earlier text
    pub cycle: bool,
    /// Problems that did not stop the source (e.g. a reverted correction)
    pub warnings: Vec<String>,
    /// Never started because the run was cancelled
    pub skipped: bool,
    /// Stopped between passes because the run was cancelled
    pub cancelled: bool,
    /// Per-rule timing statistics (rule_id -> timing)
    pub timings: HashMap<String, RuleTiming>,
}

impl SourceReport {
    fn new(source: Source) -> Self {
        Self {
            source,
            crashes: Vec::new(),
            passes: 0,
            converged: true,
            cycle: false,
            warnings: Vec::new(),
            skipped: false,
            cancelled: false,
            timings: HashMap::new(),
        }
    }

    fn skipped(source: Source) -> Self {
        Self {
            skipped: true,
            ..Self::new(source)
        }
    }

    pub fn issues(&self) -> &[Issue] {
        self.source.issues()
    }

    /// Issues not fixed by this run
    pub fn open_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues().iter().filter(|i| i.is_open())
    }

    pub fn corrected_count(&self) -> usize {
        self.issues().iter().filter(|i| i.is_corrected()).count()
    }

    pub fn conflict_count(&self) -> usize {
        self.issues().iter().filter(|i| i.is_conflicted()).count()
    }

    fn count_open(&self, severity: Severity) -> usize {
        self.open_issues().filter(|i| i.severity == severity).count()
    }
}

/// Result of a run over many sources
#[derive(Debug, Default)]
pub struct Report {
    /// One entry per input source, in input order
    pub sources: Vec<SourceReport>,
    /// Processing duration
    pub duration: Duration,
    /// Per-rule timing statistics (rule_id -> timing)
    pub rule_timings: HashMap<String, RuleTiming>,
}

impl Report {
    /// Sources that were analysed
    pub fn files_processed(&self) -> usize {
        self.sources.iter().filter(|s| !s.skipped).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.sources.iter().filter(|s| s.skipped).count()
    }

    pub fn error_count(&self) -> usize {
        self.sources.iter().map(|s| s.count_open(Severity::Error)).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.sources.iter().map(|s| s.count_open(Severity::Warning)).sum()
    }

    pub fn info_count(&self) -> usize {
        self.sources.iter().map(|s| s.count_open(Severity::Info)).sum()
    }

    pub fn corrected_count(&self) -> usize {
        self.sources.iter().map(|s| s.corrected_count()).sum()
    }

    pub fn conflict_count(&self) -> usize {
        self.sources.iter().map(|s| s.conflict_count()).sum()
    }

    pub fn crash_count(&self) -> usize {
        self.sources.iter().map(|s| s.crashes.len()).sum()
    }

    pub fn unconverged_count(&self) -> usize {
        self.sources.iter().filter(|s| !s.converged).count()
    }

    /// Check if there are any errors (open error issues or rule crashes)
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0 || self.crash_count() > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    /// Check if result is clean (no errors or warnings left open)
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }

    /// Get exit code (0 = success, 1 = warnings, 2 = errors)
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            2
        } else if self.has_warnings() {
            1
        } else {
            0
        }
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: Report) {
        self.sources.extend(other.sources);
        self.duration += other.duration;
        merge_timings(&mut self.rule_timings, &other.rule_timings);
    }

    /// Get rule timings sorted by total time (descending)
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.rule_timings.values().collect();
        timings.sort_by(|a, b| b.total_time.cmp(&a.total_time).then(a.rule_id.cmp(&b.rule_id)));
        timings
    }

    /// Format timing statistics as a string
    pub fn format_timings(&self) -> String {
        let timings = self.sorted_timings();
        if timings.is_empty() {
            return "No timing data available".to_string();
        }

        let mut output = String::new();
        output.push_str("Rule Timing Statistics:\n");
        output.push_str(&format!(
            "{:<40} {:>12} {:>12} {:>10} {:>10}\n",
            "Rule ID", "Total", "Avg", "Evals", "Issues"
        ));
        output.push_str(&"-".repeat(88));
        output.push('\n');

        for timing in timings {
            let total_ms = timing.total_time.as_secs_f64() * 1000.0;
            let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;
            output.push_str(&format!(
                "{:<40} {:>10.2}ms {:>10.2}µs {:>10} {:>10}\n",
                timing.rule_id, total_ms, avg_us, timing.evaluation_count, timing.issue_count
            ));
        }

        output
    }
}

/// State of the per-source correction loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Analyzing,
    Correcting,
    Reparsing,
    Done,
}

/// Runs a rule set over sources
pub struct Runner {
    rules: Arc<RuleSet>,
    parser: Arc<dyn Parser>,
    options: RunOptions,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(rules: RuleSet, parser: Arc<dyn Parser>) -> Self {
        Self {
            rules: Arc::new(rules),
            parser,
            options: RunOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an existing token, e.g. one wired to Ctrl-C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Analyse every source, correcting them when `autocorrect` is set
    pub fn run(&self, sources: Vec<Source>, autocorrect: bool) -> Result<Report, RunError> {
        if self.rules.is_empty() {
            return Err(RunError::NoRules);
        }

        let start = Instant::now();
        let sources: Vec<Source> = sources
            .into_iter()
            .map(|mut s| {
                s.set_autocorrect(autocorrect);
                s
            })
            .collect();

        let reports: Vec<SourceReport> = if self.options.parallel {
            let threads = if self.options.jobs > 0 {
                self.options.jobs
            } else {
                num_cpus::get()
            };
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(|| {
                    sources
                        .into_par_iter()
                        .map(|s| self.run_source(s))
                        .collect()
                }),
                Err(e) => {
                    log::warn!("could not build thread pool, running sequentially: {}", e);
                    sources.into_iter().map(|s| self.run_source(s)).collect()
                }
            }
        } else {
            sources.into_iter().map(|s| self.run_source(s)).collect()
        };

        let mut report = Report::default();
        for source_report in &reports {
            merge_timings(&mut report.rule_timings, &source_report.timings);
        }
        report.sources = reports;
        report.duration = start.elapsed();
        Ok(report)
    }

    /// Run the detect/correct loop over one source
    pub fn run_source(&self, mut source: Source) -> SourceReport {
        if self.cancel.is_cancelled() {
            log::debug!("skipping {}: run cancelled", source.display_name());
            return SourceReport::skipped(source);
        }

        let autocorrect = source.autocorrect();
        let mut tally = Tally::new(source.display_name());
        let mut converged = true;
        let mut cycle = false;
        let mut cancelled = false;
        let mut warnings = Vec::new();

        let mut phase = Phase::Analyzing;
        let mut rounds = 0;
        let mut final_pass = false;
        let mut current: Vec<Issue> = Vec::new();
        let mut history: Vec<(usize, Issue)> = Vec::new();
        let mut pending: Option<(String, Vec<usize>, Vec<usize>)> = None;
        let mut seen = HashSet::from([text_hash(source.text())]);

        loop {
            match phase {
                Phase::Analyzing => {
                    if self.cancel.is_cancelled() {
                        log::debug!("{}: cancelled after {} passes", tally.name, tally.pass);
                        cancelled = true;
                        break;
                    }
                    tally.pass += 1;
                    log::debug!("{}: pass {}", tally.name, tally.pass);
                    current = self.analyze(&source, &mut tally);

                    let wants_correction = autocorrect
                        && source.tree().is_some()
                        && current.iter().any(|i| i.correctable);
                    phase = if !wants_correction || final_pass {
                        Phase::Done
                    } else if rounds >= self.options.max_iterations {
                        log::warn!(
                            "{}: did not converge after {} correction rounds",
                            tally.name,
                            rounds
                        );
                        converged = false;
                        Phase::Done
                    } else {
                        Phase::Correcting
                    };
                }
                Phase::Correcting => {
                    let proposals = self.propose(&source, &current, &mut tally);
                    let correction = Corrector::apply(source.text(), &mut current, proposals);
                    for (index, reason) in correction.invalid {
                        tally.crash(
                            current[index].rule_id(),
                            CrashPhase::Correct,
                            format!("invalid edit: {}", reason),
                        );
                    }

                    if correction.accepted.is_empty() {
                        phase = Phase::Done;
                    } else {
                        pending = Some((correction.text, correction.accepted, correction.conflicts));
                        phase = Phase::Reparsing;
                    }
                }
                Phase::Reparsing => {
                    let Some((text, accepted, conflicts)) = pending.take() else {
                        phase = Phase::Done;
                        continue;
                    };
                    match source.rewrite(text, self.parser.as_ref()) {
                        Ok(()) => {
                            rounds += 1;
                            let pass = tally.pass;
                            history.extend(
                                current
                                    .drain(..)
                                    .filter(|i| i.status != IssueStatus::Reported)
                                    .map(|i| (pass, i)),
                            );
                            if !seen.insert(text_hash(source.text())) {
                                log::warn!("{}: corrections cycle, stopping", tally.name);
                                cycle = true;
                                converged = false;
                                final_pass = true;
                            }
                            phase = Phase::Analyzing;
                        }
                        Err(failure) => {
                            for index in accepted.into_iter().chain(conflicts) {
                                current[index].status = IssueStatus::Reported;
                            }
                            let warning = format!(
                                "correction in pass {} reverted: corrected text does not parse: {}",
                                tally.pass, failure
                            );
                            log::warn!("{}: {}", tally.name, warning);
                            warnings.push(warning);
                            phase = Phase::Done;
                        }
                    }
                }
                Phase::Done => break,
            }
        }

        source.set_issues(final_issues(history, current, tally.pass));
        SourceReport {
            source,
            crashes: tally.crashes,
            passes: tally.pass,
            converged,
            cycle,
            warnings,
            skipped: false,
            cancelled,
            timings: tally.timings,
        }
    }

    /// One detection pass. Syntax failures short-circuit every other rule.
    fn analyze(&self, source: &Source, tally: &mut Tally) -> Vec<Issue> {
        if source.parse_failure().is_some() {
            let mut reporter = Reporter::new(source, &SyntaxRule, Severity::Error);
            if let Err(e) = SyntaxRule.detect(source, &mut reporter) {
                tally.crash(SyntaxRule.id(), CrashPhase::Detect, e.to_string());
            }
            return reporter.into_issues();
        }

        let directives = Directives::parse(source);
        let active: Vec<&ConfiguredRule> = self
            .rules
            .enabled()
            .filter(|r| !r.is_excluded(source.path()))
            .collect();

        let outcomes: Vec<(Result<Vec<Issue>, String>, Duration)> = if self.options.parallel {
            active.par_iter().map(|r| detect_one(r, source)).collect()
        } else {
            active.iter().map(|r| detect_one(r, source)).collect()
        };

        // Rule order then in-rule order; the stable sort keeps it for equal offsets
        let mut issues = Vec::new();
        for (rule, (outcome, elapsed)) in active.iter().zip(outcomes) {
            let id = rule.id();
            let timing = tally
                .timings
                .entry(id.clone())
                .or_insert_with(|| RuleTiming::new(&id));
            timing.total_time += elapsed;
            timing.evaluation_count += 1;

            match outcome {
                Ok(found) => {
                    timing.issue_count += found.len();
                    issues.extend(found.into_iter().filter(|i| {
                        !directives.is_disabled(&i.group, &i.rule, i.location.line)
                    }));
                }
                Err(message) => tally.crash(id, CrashPhase::Detect, message),
            }
        }
        issues.sort_by_key(|i| i.location.offsets.start);
        issues
    }

    /// Ask each correctable issue's rule for an edit
    fn propose(&self, source: &Source, issues: &[Issue], tally: &mut Tally) -> Vec<Proposal> {
        let mut proposals = Vec::new();
        for (index, issue) in issues.iter().enumerate() {
            if !issue.correctable || issue.status != IssueStatus::Reported {
                continue;
            }
            let id = issue.rule_id();
            let Some(configured) = self.rules.get(&id) else {
                continue;
            };
            let rule = configured.rule.as_ref();
            let result = catch_unwind(AssertUnwindSafe(|| rule.correct(source, issue)));
            match result {
                Ok(Ok(Some(edit))) => {
                    log::trace!("{} proposes {:?} for {:?}", id, edit, issue.location.offsets);
                    proposals.push(Proposal { issue: index, edit });
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tally.crash(id, CrashPhase::Correct, e.to_string()),
                Err(panic) => tally.crash(
                    id,
                    CrashPhase::Correct,
                    format!("panicked: {}", extract_panic_message(&panic)),
                ),
            }
        }
        proposals
    }
}

/// Per-source bookkeeping while the loop runs
struct Tally {
    name: String,
    pass: usize,
    crashes: Vec<RuleCrash>,
    timings: HashMap<String, RuleTiming>,
}

impl Tally {
    fn new(name: String) -> Self {
        Self {
            name,
            pass: 0,
            crashes: Vec::new(),
            timings: HashMap::new(),
        }
    }

    fn crash(&mut self, rule_id: String, phase: CrashPhase, message: String) {
        let crash = RuleCrash {
            rule_id,
            phase,
            pass: self.pass,
            message,
        };
        log::warn!("{}: {}", self.name, crash);
        self.crashes.push(crash);
    }
}

/// Run `detect` for one rule, turning errors and panics into messages
fn detect_one(rule: &ConfiguredRule, source: &Source) -> (Result<Vec<Issue>, String>, Duration) {
    let start = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| -> Result<Vec<Issue>, RuleError> {
        let mut reporter = Reporter::new(source, rule.rule.as_ref(), rule.severity);
        rule.rule.detect(source, &mut reporter)?;
        Ok(reporter.into_issues())
    }));
    let outcome = match result {
        Ok(Ok(issues)) => Ok(issues),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("panicked: {}", extract_panic_message(&panic))),
    };
    (outcome, start.elapsed())
}

/// Extract message from panic payload
fn extract_panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

fn text_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Assemble the issues reported for a source.
///
/// Corrected issues from every pass are kept, one per pass. A conflict is
/// dropped when a later pass reports the same rule on the same line with the
/// same message. The final pass's issues are kept as they are.
fn final_issues(history: Vec<(usize, Issue)>, current: Vec<Issue>, last_pass: usize) -> Vec<Issue> {
    let key = |i: &Issue| (i.rule_id(), i.location.line, i.message.clone());

    let all: Vec<(usize, Issue)> = history
        .into_iter()
        .chain(current.into_iter().map(|i| (last_pass, i)))
        .collect();

    let mut kept: Vec<Issue> = Vec::new();
    let mut unique = HashSet::new();
    for (pass, issue) in &all {
        let superseded = issue.is_conflicted()
            && all
                .iter()
                .any(|(later, other)| later > pass && key(other) == key(issue));
        if superseded {
            continue;
        }
        // Each pass's correction is its own fix, even at the same spot
        let round = if issue.is_corrected() { *pass } else { 0 };
        let identity = (key(issue), issue.location.column, issue.status, round);
        if unique.insert(identity) {
            kept.push(issue.clone());
        }
    }

    kept.sort_by_key(|i| (i.location.line, i.location.column));
    kept
}

/// Run `rules` over `sources` with default options
pub fn run(
    sources: Vec<Source>,
    rules: RuleSet,
    parser: Arc<dyn Parser>,
    autocorrect: bool,
) -> Result<Report, RunError> {
    Runner::new(rules, parser).run(sources, autocorrect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::corrector::Edit;
    use crate::plugins::ruby::rules::{
        EmptyExpression, ParenthesesAroundCondition, SpaceAfterComma, TrailingWhitespace,
    };
    use crate::plugins::ruby::RubyParser;
    use crate::registry::Registry;
    use crate::rule::RuleGroup;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    /// Flags every occurrence of a literal and replaces it
    struct Literal {
        name: &'static str,
        needle: &'static str,
        replacement: &'static str,
    }

    impl Rule for Literal {
        fn name(&self) -> &str {
            self.name
        }
        fn group(&self) -> RuleGroup {
            RuleGroup::Style
        }
        fn description(&self) -> &str {
            "replaces a literal"
        }
        fn supports_correction(&self) -> bool {
            true
        }
        fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
            for (start, _) in source.text().match_indices(self.needle) {
                reporter.add_correctable(start..start + self.needle.len(), "literal found");
            }
            Ok(())
        }
        fn correct(&self, _source: &Source, issue: &Issue) -> Result<Option<Edit>, RuleError> {
            Ok(Some(Edit::replace(issue.location.offsets.clone(), self.replacement)))
        }
    }

    fn literal(name: &'static str, needle: &'static str, replacement: &'static str) -> Arc<dyn Rule> {
        Arc::new(Literal {
            name,
            needle,
            replacement,
        })
    }

    /// Fails in detect or correct, by error or panic
    struct Broken {
        panic: bool,
        in_correct: bool,
    }

    impl Rule for Broken {
        fn name(&self) -> &str {
            "Broken"
        }
        fn group(&self) -> RuleGroup {
            RuleGroup::Lint
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn supports_correction(&self) -> bool {
            true
        }
        fn detect(&self, _source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
            if self.in_correct {
                reporter.add_correctable(0..1, "bait");
                return Ok(());
            }
            if self.panic {
                panic!("detect exploded");
            }
            Err(RuleError::Failed("cannot detect".to_string()))
        }
        fn correct(&self, _source: &Source, _issue: &Issue) -> Result<Option<Edit>, RuleError> {
            if self.panic {
                panic!("correct exploded");
            }
            Err(RuleError::Failed("cannot correct".to_string()))
        }
    }

    /// Cancels the run the first time it is evaluated
    struct Canceller(CancellationToken);

    impl Rule for Canceller {
        fn name(&self) -> &str {
            "Canceller"
        }
        fn group(&self) -> RuleGroup {
            RuleGroup::Lint
        }
        fn description(&self) -> &str {
            "cancels the run"
        }
        fn detect(&self, _source: &Source, _reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
            self.0.cancel();
            Ok(())
        }
    }

    fn source(text: &str) -> Source {
        Source::parse(text, None, &RubyParser::new())
    }

    fn runner(rules: Vec<Arc<dyn Rule>>) -> Runner {
        Runner::new(RuleSet::from_rules(rules), Arc::new(RubyParser::new()))
            .with_options(RunOptions::default().with_parallel(false))
    }

    fn run_one(rules: Vec<Arc<dyn Rule>>, text: &str, autocorrect: bool) -> SourceReport {
        let mut report = runner(rules).run(vec![source(text)], autocorrect).unwrap();
        report.sources.remove(0)
    }

    fn builtin() -> RuleSet {
        RuleSet::resolve(&Registry::builtin(), &Config::default()).unwrap()
    }

    #[test]
    fn test_empty_expression_reported() {
        let report = run_one(vec![Arc::new(EmptyExpression)], "a = ()", false);
        let issues = report.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id(), "Lint/EmptyExpression");
        assert_eq!(issues[0].location.offsets, 4..6);
        assert_eq!(issues[0].status, IssueStatus::Reported);
        assert_eq!(report.passes, 1);
    }

    #[test]
    fn test_parentheses_corrected() {
        let report = run_one(
            vec![Arc::new(ParenthesesAroundCondition)],
            "if (x > 1)\n  x\nend",
            true,
        );
        assert_eq!(report.source.text(), "if x > 1\n  x\nend");
        assert_eq!(report.issues().len(), 1);
        assert_eq!(report.issues()[0].status, IssueStatus::Corrected);
        assert_eq!(report.passes, 2);
        assert!(report.converged);
    }

    #[test]
    fn test_overlapping_edits_conflict() {
        let report = run_one(
            vec![literal("First", "hello", "HELLO"), literal("Second", "hello", "howdy")],
            "x = 'hello'\n",
            true,
        );
        assert_eq!(report.source.text(), "x = 'HELLO'\n");
        let statuses: Vec<(String, IssueStatus)> = report
            .issues()
            .iter()
            .map(|i| (i.rule.clone(), i.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("First".to_string(), IssueStatus::Corrected),
                ("Second".to_string(), IssueStatus::UnresolvedConflict),
            ]
        );
    }

    #[test]
    fn test_conflict_winner_independent_of_rule_order() {
        let text = "x = 'hello world'\n";
        for rules in [
            vec![literal("Early", "hello", "A"), literal("Late", "lo wo", "B")],
            vec![literal("Late", "lo wo", "B"), literal("Early", "hello", "A")],
        ] {
            let report = run_one(rules, text, true);
            assert_eq!(report.source.text(), "x = 'A world'\n");
            let corrected: Vec<&str> = report
                .issues()
                .iter()
                .filter(|i| i.is_corrected())
                .map(|i| i.rule.as_str())
                .collect();
            assert_eq!(corrected, vec!["Early"]);
        }
    }

    #[test]
    fn test_superseded_conflict_is_dropped() {
        // The loser of the first pass is corrected in the second
        let report = run_one(
            vec![literal("Wide", "abc", "a bc"), literal("Narrow", "bc", "BC")],
            "y = 'abc'\n",
            true,
        );
        assert_eq!(report.source.text(), "y = 'a BC'\n");
        assert_eq!(report.conflict_count(), 0);
        assert_eq!(report.corrected_count(), 2);
        assert_eq!(report.passes, 3);
    }

    #[test]
    fn test_repeated_fix_at_same_spot_counted_per_pass() {
        let report = run_one(
            vec![Arc::new(ParenthesesAroundCondition)],
            "if ((x))\n  y\nend\n",
            true,
        );
        assert_eq!(report.source.text(), "if x\n  y\nend\n");
        assert_eq!(report.passes, 3);
        assert_eq!(report.corrected_count(), 2);
        assert_eq!(report.issues().len(), 2);
    }

    #[test]
    fn test_independent_fixes_converge_in_two_passes() {
        let report = run_one(
            vec![Arc::new(SpaceAfterComma), Arc::new(TrailingWhitespace)],
            "foo(a,b,c)  \nbar(1,2) \n",
            true,
        );
        assert_eq!(report.source.text(), "foo(a, b, c)\nbar(1, 2)\n");
        assert_eq!(report.passes, 2);
        assert_eq!(report.corrected_count(), 5);
        assert!(report.converged);
    }

    #[test]
    fn test_autocorrect_is_idempotent() {
        let parser: Arc<dyn Parser> = Arc::new(RubyParser::new());
        let text = "if (a,b) \n  c(1,2)\nend\n";
        let first = run(vec![source(text)], builtin(), Arc::clone(&parser), true).unwrap();
        let fixed = first.sources[0].source.text().to_string();
        assert_ne!(fixed, text);

        let second = run(vec![source(&fixed)], builtin(), parser, true).unwrap();
        assert_eq!(second.sources[0].source.text(), fixed);
        assert_eq!(second.corrected_count(), 0);
    }

    #[test]
    fn test_report_only_runs_one_pass() {
        let report = run_one(vec![Arc::new(TrailingWhitespace)], "a = 1 \n", false);
        assert_eq!(report.passes, 1);
        assert_eq!(report.source.text(), "a = 1 \n");
        assert_eq!(report.issues()[0].status, IssueStatus::Reported);
        assert!(!report.source.is_modified());
    }

    #[test]
    fn test_syntax_error_gates_other_rules() {
        for autocorrect in [false, true] {
            let report = run_one(
                vec![Arc::new(EmptyExpression), Arc::new(TrailingWhitespace)],
                "a = () \nif x\n",
                autocorrect,
            );
            assert_eq!(report.issues().len(), 1);
            let issue = &report.issues()[0];
            assert_eq!(issue.rule_id(), "Lint/Syntax");
            assert_eq!(issue.severity, Severity::Error);
            assert_eq!(issue.status, IssueStatus::Reported);
            assert_eq!(report.passes, 1);
            assert_eq!(report.source.text(), "a = () \nif x\n");
        }
    }

    #[test]
    fn test_crashing_rule_is_isolated() {
        let rules = vec![
            Arc::new(Broken {
                panic: true,
                in_correct: false,
            }) as Arc<dyn Rule>,
            Arc::new(Broken {
                panic: false,
                in_correct: false,
            }),
            Arc::new(EmptyExpression),
        ];
        let report = runner(rules)
            .run(vec![source("a = ()\n"), source("b = ()\n")], false)
            .unwrap();

        for source_report in &report.sources {
            assert_eq!(source_report.issues().len(), 1);
            assert_eq!(source_report.crashes.len(), 2);
            assert!(source_report
                .crashes
                .iter()
                .all(|c| c.phase == CrashPhase::Detect && c.pass == 1));
        }
        assert!(report.sources[0].crashes[0].message.contains("detect exploded"));
        assert_eq!(report.sources[0].crashes[1].message, "cannot detect");
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn test_crash_during_correction() {
        let rules = vec![
            Arc::new(Broken {
                panic: true,
                in_correct: true,
            }) as Arc<dyn Rule>,
            Arc::new(TrailingWhitespace),
        ];
        let report = run_one(rules, "a = 1 \n", true);
        assert_eq!(report.source.text(), "a = 1\n");
        assert!(report
            .crashes
            .iter()
            .any(|c| c.phase == CrashPhase::Correct && c.message.contains("correct exploded")));
        let bait = report.issues().iter().find(|i| i.rule == "Broken").unwrap();
        assert_eq!(bait.status, IssueStatus::Reported);
    }

    #[test]
    fn test_invalid_edit_recorded_as_crash() {
        struct Greedy;
        impl Rule for Greedy {
            fn name(&self) -> &str {
                "Greedy"
            }
            fn group(&self) -> RuleGroup {
                RuleGroup::Layout
            }
            fn description(&self) -> &str {
                "edits outside its issue"
            }
            fn supports_correction(&self) -> bool {
                true
            }
            fn detect(&self, _s: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
                reporter.add_correctable(0..1, "first char");
                Ok(())
            }
            fn correct(&self, _s: &Source, _issue: &Issue) -> Result<Option<Edit>, RuleError> {
                Ok(Some(Edit::delete(0..3)))
            }
        }

        let report = run_one(vec![Arc::new(Greedy)], "abc = 1\n", true);
        assert_eq!(report.source.text(), "abc = 1\n");
        assert_eq!(report.crashes.len(), 1);
        assert_eq!(report.crashes[0].phase, CrashPhase::Correct);
        assert!(report.crashes[0].message.starts_with("invalid edit"));
    }

    #[test]
    fn test_syntax_breaking_correction_reverted() {
        let report = run_one(vec![literal("Unbalance", "(1)", "(1")], "a = (1)\n", true);
        assert_eq!(report.source.text(), "a = (1)\n");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("reverted"));
        assert_eq!(report.issues().len(), 1);
        assert_eq!(report.issues()[0].status, IssueStatus::Reported);
        assert_eq!(report.passes, 1);
    }

    #[test]
    fn test_cycle_detected() {
        let report = run_one(
            vec![literal("AtoB", "aa", "bb"), literal("BtoA", "bb", "aa")],
            "x = aa\n",
            true,
        );
        assert!(report.cycle);
        assert!(!report.converged);
        assert_eq!(report.source.text(), "x = aa\n");
        assert_eq!(report.passes, 3);
    }

    #[test]
    fn test_iteration_budget() {
        let runner = Runner::new(
            RuleSet::from_rules(vec![literal("Grow", "x", "xy")]),
            Arc::new(RubyParser::new()),
        )
        .with_options(RunOptions::default().with_parallel(false).with_max_iterations(3));

        let report = runner.run(vec![source("x\n")], true).unwrap();
        let report = &report.sources[0];
        assert!(!report.converged);
        assert!(!report.cycle);
        assert_eq!(report.passes, 4);
        assert_eq!(report.source.text(), "xyyy\n");
    }

    #[test]
    fn test_directives_suppress_issues() {
        let report = run_one(
            vec![Arc::new(EmptyExpression), Arc::new(TrailingWhitespace)],
            "a = () # lintel:disable EmptyExpression\nb = ()\n",
            false,
        );
        let lines: Vec<usize> = report.issues().iter().map(|i| i.location.line).collect();
        assert_eq!(lines, vec![2]);
    }

    #[test]
    fn test_excluded_rule_not_run() {
        let rule = builtin().get("Lint/EmptyExpression").unwrap().clone();
        let mut set = RuleSet::new();
        set.push(rule.with_exclude(&["vendor/**".to_string()]).unwrap());

        let parser = RubyParser::new();
        let vendored = Source::parse("a = ()\n", Some(PathBuf::from("vendor/a.rb")), &parser);
        let local = Source::parse("a = ()\n", Some(PathBuf::from("lib/a.rb")), &parser);

        let report = Runner::new(set, Arc::new(parser))
            .run(vec![vendored, local], false)
            .unwrap();
        assert!(report.sources[0].issues().is_empty());
        assert_eq!(report.sources[1].issues().len(), 1);
        assert!(report.rule_timings.contains_key("Lint/EmptyExpression"));
    }

    #[test]
    fn test_disabled_rules_skipped() {
        let mut rules = builtin();
        rules.set_enabled("Lint", false);
        let report = run(
            vec![source("a = ()\n")],
            rules,
            Arc::new(RubyParser::new()),
            false,
        )
        .unwrap();
        assert!(report.sources[0].issues().is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_cancelled_before_start() {
        let runner = runner(vec![Arc::new(EmptyExpression)]);
        runner.cancellation_token().cancel();
        let report = runner.run(vec![source("a = ()"), source("b = ()")], false).unwrap();
        assert_eq!(report.skipped_count(), 2);
        assert_eq!(report.files_processed(), 0);
        assert!(report.sources.iter().all(|s| s.issues().is_empty()));
    }

    #[test]
    fn test_cancelled_between_passes() {
        let token = CancellationToken::new();
        let rules = vec![
            Arc::new(Canceller(token.clone())) as Arc<dyn Rule>,
            Arc::new(TrailingWhitespace),
        ];
        let runner = runner(rules).with_cancellation(token);
        let report = runner
            .run(vec![source("a = 1 \n"), source("b = 2 \n")], true)
            .unwrap();

        let first = &report.sources[0];
        assert!(first.cancelled);
        assert_eq!(first.passes, 1);
        assert_eq!(first.source.text(), "a = 1\n");
        assert_eq!(first.corrected_count(), 1);
        assert!(report.sources[1].skipped);
    }

    #[test]
    fn test_no_rules_is_fatal() {
        let result = run(
            vec![source("a = 1")],
            RuleSet::new(),
            Arc::new(RubyParser::new()),
            false,
        );
        assert!(matches!(result, Err(RunError::NoRules)));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let texts = ["a = ()\n", "if (x)\n  y(1,2)\nend\n", "b = 1  \n"];
        let sources = || texts.iter().map(|t| source(t)).collect::<Vec<_>>();
        let parser: Arc<dyn Parser> = Arc::new(RubyParser::new());

        let parallel = Runner::new(builtin(), Arc::clone(&parser))
            .with_options(RunOptions::default().with_jobs(2))
            .run(sources(), true)
            .unwrap();
        let sequential = Runner::new(builtin(), parser)
            .with_options(RunOptions::default().with_parallel(false))
            .run(sources(), true)
            .unwrap();

        for (a, b) in parallel.sources.iter().zip(&sequential.sources) {
            assert_eq!(a.source.text(), b.source.text());
            let ids = |r: &SourceReport| {
                r.issues()
                    .iter()
                    .map(|i| (i.rule_id(), i.location.line, i.status))
                    .collect::<Vec<_>>()
            };
            assert_eq!(ids(a), ids(b));
        }
    }

    #[test]
    fn test_report_counts_and_exit_code() {
        let report = runner(vec![Arc::new(EmptyExpression), Arc::new(TrailingWhitespace)])
            .run(vec![source("a = () \n")], false)
            .unwrap();
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.info_count(), 1);
        assert_eq!(report.exit_code(), 1);

        let mut merged = Report::default();
        assert_eq!(merged.exit_code(), 0);
        merged.merge(report);
        assert_eq!(merged.files_processed(), 1);
        assert!(merged.format_timings().contains("Lint/EmptyExpression"));
    }
}
