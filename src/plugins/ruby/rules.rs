//! Built-in Ruby rules

use crate::corrector::Edit;
use crate::diagnostic::Issue;
use crate::parser::Node;
use crate::registry::{options, RuleEntry};
use crate::rule::{Reporter, Rule, RuleError, RuleGroup};
use crate::source::Source;
use serde::Deserialize;
use std::sync::Arc;

/// All built-in rules, in invocation order
pub fn builtin_rules() -> Vec<RuleEntry> {
    vec![
        RuleEntry {
            name: EmptyExpression::NAME,
            group: RuleGroup::Lint,
            build: |opts| {
                options::<NoOptions>(opts)?;
                Ok(Arc::new(EmptyExpression))
            },
        },
        RuleEntry {
            name: ParenthesesAroundCondition::NAME,
            group: RuleGroup::Style,
            build: |opts| {
                options::<NoOptions>(opts)?;
                Ok(Arc::new(ParenthesesAroundCondition))
            },
        },
        RuleEntry {
            name: TrailingWhitespace::NAME,
            group: RuleGroup::Layout,
            build: |opts| {
                options::<NoOptions>(opts)?;
                Ok(Arc::new(TrailingWhitespace))
            },
        },
        RuleEntry {
            name: SpaceAfterComma::NAME,
            group: RuleGroup::Layout,
            build: |opts| {
                options::<NoOptions>(opts)?;
                Ok(Arc::new(SpaceAfterComma))
            },
        },
        RuleEntry {
            name: LineLength::NAME,
            group: RuleGroup::Layout,
            build: |opts| Ok(Arc::new(LineLength::new(options(opts)?))),
        },
    ]
}

/// Options for rules that take none
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoOptions {}

fn tree_of(source: &Source) -> Result<&dyn crate::parser::SyntaxTree, RuleError> {
    source.tree().ok_or(RuleError::MissingTree)
}

fn significant<'a>(nodes: &[&'a dyn Node]) -> Vec<&'a dyn Node> {
    nodes
        .iter()
        .copied()
        .filter(|n| n.is_significant())
        .collect()
}

/// `()` with nothing inside
pub struct EmptyExpression;

impl EmptyExpression {
    pub const NAME: &'static str = "EmptyExpression";

    /// Whether `()` starting at `start` is the argument list of `previous`
    fn takes_arguments(previous: &dyn Node, start: usize) -> bool {
        let adjacent = previous.span().end == start;
        match previous.kind() {
            "ident" | "constant" => adjacent,
            "keyword" => adjacent && matches!(previous.name(), "super" | "yield"),
            "operator" => matches!(previous.name(), "." | "&."),
            _ => false,
        }
    }
}

impl Rule for EmptyExpression {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn group(&self) -> RuleGroup {
        RuleGroup::Lint
    }

    fn description(&self) -> &str {
        "Checks for empty parenthesized expressions"
    }

    fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
        for node in tree_of(source)?.iter() {
            let children = node.children();
            for (i, child) in children.iter().enumerate() {
                if child.kind() != "group" || !significant(&child.children()).is_empty() {
                    continue;
                }
                let previous = i.checked_sub(1).map(|p| children[p]);
                if !previous.is_some_and(|p| Self::takes_arguments(p, child.span().start)) {
                    reporter.add(child.span(), "Avoid empty expressions.");
                }
            }
        }
        Ok(())
    }
}

/// `if (x)` where `if x` would do
pub struct ParenthesesAroundCondition;

impl ParenthesesAroundCondition {
    pub const NAME: &'static str = "ParenthesesAroundCondition";

    const KEYWORDS: [&'static str; 4] = ["if", "unless", "while", "until"];
}

impl Rule for ParenthesesAroundCondition {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn group(&self) -> RuleGroup {
        RuleGroup::Style
    }

    fn description(&self) -> &str {
        "Checks for parentheses around the condition of if/unless/while/until"
    }

    fn supports_correction(&self) -> bool {
        true
    }

    fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
        for node in tree_of(source)?.iter() {
            if node.kind() != "block" || !Self::KEYWORDS.contains(&node.name()) {
                continue;
            }
            let children = node.children();
            let Some(first) = children.first() else {
                continue;
            };
            if first.kind() != "group" {
                continue;
            }
            let inner = first.children();
            // `(a; b)` is a compound expression, not a parenthesized condition
            if significant(&inner).is_empty() || inner.iter().any(|n| n.kind() == "semicolon") {
                continue;
            }
            // The group must be the whole condition
            let ends_condition = match children.get(1) {
                None => true,
                Some(next) => match next.kind() {
                    "newline" | "semicolon" | "comment" => true,
                    "keyword" => matches!(next.name(), "then" | "do"),
                    _ => false,
                },
            };
            if ends_condition {
                let message = format!(
                    "Don't use parentheses around the condition of an `{}`.",
                    node.name()
                );
                reporter.add_correctable(first.span(), &message);
            }
        }
        Ok(())
    }

    fn correct(&self, source: &Source, issue: &Issue) -> Result<Option<Edit>, RuleError> {
        let range = issue.location.offsets.clone();
        let text = source.text();
        let group = text
            .get(range.clone())
            .filter(|g| g.len() >= 2 && g.starts_with('(') && g.ends_with(')'))
            .ok_or_else(|| RuleError::Failed(format!("no parenthesized condition at {:?}", range)))?;

        let inner = group[1..group.len() - 1].trim();
        let space_before = text[..range.start]
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_whitespace());
        // `if (x)then` must not become `if xthen`
        let space_after = text[range.end..]
            .chars()
            .next()
            .is_some_and(|c| !c.is_whitespace() && c != ';');

        let mut replacement = String::with_capacity(inner.len() + 2);
        if space_before {
            replacement.push(' ');
        }
        replacement.push_str(inner);
        if space_after {
            replacement.push(' ');
        }
        Ok(Some(Edit::replace(range, replacement)))
    }
}

/// Spaces or tabs at the end of a line
pub struct TrailingWhitespace;

impl TrailingWhitespace {
    pub const NAME: &'static str = "TrailingWhitespace";
}

impl Rule for TrailingWhitespace {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn group(&self) -> RuleGroup {
        RuleGroup::Layout
    }

    fn description(&self) -> &str {
        "Checks for trailing whitespace"
    }

    fn supports_correction(&self) -> bool {
        true
    }

    fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
        let text = source.text();
        let mut start = 0;
        for line in text.split_inclusive('\n') {
            let content = line.trim_end_matches('\n').trim_end_matches('\r');
            let trimmed = content.trim_end_matches([' ', '\t']);
            if trimmed.len() < content.len() {
                reporter.add_correctable(
                    start + trimmed.len()..start + content.len(),
                    "Trailing whitespace detected.",
                );
            }
            start += line.len();
        }
        Ok(())
    }

    fn correct(&self, _source: &Source, issue: &Issue) -> Result<Option<Edit>, RuleError> {
        Ok(Some(Edit::delete(issue.location.offsets.clone())))
    }
}

/// `a,b` instead of `a, b`
pub struct SpaceAfterComma;

impl SpaceAfterComma {
    pub const NAME: &'static str = "SpaceAfterComma";
}

impl Rule for SpaceAfterComma {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn group(&self) -> RuleGroup {
        RuleGroup::Layout
    }

    fn description(&self) -> &str {
        "Checks for a missing space after a comma"
    }

    fn supports_correction(&self) -> bool {
        true
    }

    fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
        let text = source.text();
        for node in tree_of(source)?.iter() {
            if node.kind() != "comma" {
                continue;
            }
            let span = node.span();
            let next = text[span.end..].chars().next();
            let missing = next.is_some_and(|c| !c.is_whitespace() && !matches!(c, ')' | ']' | '}'));
            if missing {
                reporter.add_correctable(span, "Space missing after comma.");
            }
        }
        Ok(())
    }

    fn correct(&self, _source: &Source, issue: &Issue) -> Result<Option<Edit>, RuleError> {
        Ok(Some(Edit::replace(issue.location.offsets.clone(), ", ")))
    }
}

/// Options for [`LineLength`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LineLengthOptions {
    /// Maximum line length in characters
    pub max: usize,
}

impl Default for LineLengthOptions {
    fn default() -> Self {
        Self { max: 80 }
    }
}

/// Lines longer than the configured maximum
pub struct LineLength {
    options: LineLengthOptions,
}

impl LineLength {
    pub const NAME: &'static str = "LineLength";

    pub fn new(options: LineLengthOptions) -> Self {
        Self { options }
    }
}

impl Rule for LineLength {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn group(&self) -> RuleGroup {
        RuleGroup::Layout
    }

    fn description(&self) -> &str {
        "Checks the length of lines"
    }

    fn detect(&self, source: &Source, reporter: &mut Reporter<'_>) -> Result<(), RuleError> {
        let max = self.options.max;
        let mut start = 0;
        for line in source.text().split_inclusive('\n') {
            let content = line.trim_end_matches('\n').trim_end_matches('\r');
            let length = content.chars().count();
            if length > max {
                let overflow = content
                    .char_indices()
                    .nth(max)
                    .map_or(content.len(), |(i, _)| i);
                reporter.add(
                    start + overflow..start + content.len(),
                    &format!("Line is too long. [{}/{}]", length, max),
                );
            }
            start += line.len();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::plugins::ruby::RubyParser;
    use pretty_assertions::assert_eq;

    fn detect(rule: &dyn Rule, text: &str) -> (Source, Vec<Issue>) {
        let source = Source::parse(text, None, &RubyParser::new());
        let mut reporter = Reporter::new(&source, rule, rule.group().default_severity());
        rule.detect(&source, &mut reporter).unwrap();
        let issues = reporter.into_issues();
        (source, issues)
    }

    fn corrected(rule: &dyn Rule, text: &str) -> String {
        let (source, issues) = detect(rule, text);
        let mut output = text.to_string();
        for issue in issues.iter().rev() {
            let edit = rule.correct(&source, issue).unwrap().unwrap();
            output.replace_range(edit.range, &edit.replacement);
        }
        output
    }

    #[test]
    fn test_builtin_rules_registered() {
        let names: Vec<&str> = builtin_rules().iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            vec![
                "EmptyExpression",
                "ParenthesesAroundCondition",
                "TrailingWhitespace",
                "SpaceAfterComma",
                "LineLength"
            ]
        );
    }

    #[test]
    fn test_empty_expression() {
        let (_, issues) = detect(&EmptyExpression, "a = ()");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location.offsets, 4..6);
        assert_eq!(issues[0].location.column, 5);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(!issues[0].correctable);
    }

    #[test]
    fn test_empty_expression_ignores_content() {
        let (_, issues) = detect(&EmptyExpression, "a = (1)\n");
        assert!(issues.is_empty());

        let (_, issues) = detect(&EmptyExpression, "a = (\n  # note\n  b\n)\n");
        assert!(issues.is_empty());
    }

    #[test]
    fn test_empty_expression_ignores_argument_lists() {
        let text = "def foo()\n  bar()\n  Foo()\n  x.baz()\n  y&.()\n  super()\nend\n";
        let (_, issues) = detect(&EmptyExpression, text);
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);

        // A space makes `()` an argument expression of its own
        let (_, issues) = detect(&EmptyExpression, "puts ()\nfoo(())\n");
        let columns: Vec<(usize, usize)> = issues
            .iter()
            .map(|i| (i.location.line, i.location.column))
            .collect();
        assert_eq!(columns, vec![(1, 6), (2, 5)]);
    }

    #[test]
    fn test_parentheses_around_condition() {
        let text = "if (x > 1)\n  x\nend";
        let (_, issues) = detect(&ParenthesesAroundCondition, text);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].correctable);
        assert_eq!(issues[0].location.offsets, 3..10);
        assert_eq!(corrected(&ParenthesesAroundCondition, text), "if x > 1\n  x\nend");
    }

    #[test]
    fn test_parentheses_around_condition_variants() {
        assert_eq!(
            corrected(&ParenthesesAroundCondition, "while(running) do\n  tick\nend\n"),
            "while running do\n  tick\nend\n"
        );
        assert_eq!(
            corrected(&ParenthesesAroundCondition, "unless ( ok ) then x end\n"),
            "unless ok then x end\n"
        );
    }

    #[test]
    fn test_parentheses_before_keyword_keep_separation() {
        assert_eq!(
            corrected(&ParenthesesAroundCondition, "if (x)then y end\n"),
            "if x then y end\n"
        );
        assert_eq!(
            corrected(&ParenthesesAroundCondition, "while (x)do\n  y\nend\n"),
            "while x do\n  y\nend\n"
        );
        assert_eq!(
            corrected(&ParenthesesAroundCondition, "until(done);tick;end\n"),
            "until done;tick;end\n"
        );
    }

    #[test]
    fn test_parentheses_not_whole_condition() {
        for text in [
            "if (a; b)\n  x\nend\n",
            "if (a) && b\n  x\nend\n",
            "if (a).nil?\n  x\nend\n",
            "x = 1 if (y)\n",
            "if ()\nend\n",
        ] {
            let (_, issues) = detect(&ParenthesesAroundCondition, text);
            assert!(issues.is_empty(), "unexpected issue for {:?}", text);
        }
    }

    #[test]
    fn test_trailing_whitespace() {
        let text = "a = 1  \nb = 2\t\r\nc = 3 ";
        let (_, issues) = detect(&TrailingWhitespace, text);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].location.offsets, 5..7);
        assert_eq!(issues[2].location.line, 3);
        assert_eq!(corrected(&TrailingWhitespace, text), "a = 1\nb = 2\r\nc = 3");
    }

    #[test]
    fn test_space_after_comma() {
        let text = "foo(a,b, c,)\nx = 'a,b'\n";
        let (_, issues) = detect(&SpaceAfterComma, text);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location.offsets, 5..6);
        assert_eq!(corrected(&SpaceAfterComma, text), "foo(a, b, c,)\nx = 'a,b'\n");
    }

    #[test]
    fn test_line_length() {
        let rule = LineLength::new(LineLengthOptions { max: 10 });
        let (_, issues) = detect(&rule, "short\nthis line is long\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location.line, 2);
        assert_eq!(issues[0].location.column, 11);
        assert_eq!(issues[0].message, "Line is too long. [17/10]");
    }

    #[test]
    fn test_line_length_options() {
        let map: serde_yaml::Mapping = serde_yaml::from_str("max: 100").unwrap();
        let parsed: LineLengthOptions = options(&map).unwrap();
        assert_eq!(parsed.max, 100);
        assert_eq!(LineLengthOptions::default().max, 80);

        let map: serde_yaml::Mapping = serde_yaml::from_str("maximum: 1").unwrap();
        assert!(options::<LineLengthOptions>(&map).is_err());
    }

    #[test]
    fn test_no_options_rejects_keys() {
        let map: serde_yaml::Mapping = serde_yaml::from_str("max: 1").unwrap();
        let entry = &builtin_rules()[0];
        assert!((entry.build)(&map).is_err());
        assert!((entry.build)(&serde_yaml::Mapping::new()).is_ok());
    }

    #[test]
    fn test_rules_require_tree() {
        let source = Source::parse("if x\n", None, &RubyParser::new());
        let mut reporter = Reporter::new(&source, &EmptyExpression, Severity::Warning);
        assert!(matches!(
            EmptyExpression.detect(&source, &mut reporter),
            Err(RuleError::MissingTree)
        ));
    }
}
