//! Inline disable comments
//!
//! ```text
//! x = 1   # lintel:disable Layout/LineLength
//! # lintel:disable-next-line Style
//! # lintel:disable-file Layout/TrailingWhitespace, Lint/EmptyExpression
//! ```
//!
//! A name may be a qualified rule id, a bare rule name, a group, or `all`.

use crate::source::Source;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

fn directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#\s*lintel:(disable-next-line|disable-file|disable)\s+([\w/]+(?:\s*,\s*[\w/]+)*)")
            .expect("directive pattern is valid")
    })
}

/// Disable directives found in one source's comments
#[derive(Debug, Default)]
pub struct Directives {
    /// line (1-based) -> disabled names
    lines: HashMap<usize, HashSet<String>>,
    file: HashSet<String>,
}

impl Directives {
    /// Collect directives from the comment nodes of a parsed source.
    ///
    /// Text inside strings never counts. A source without a tree has none.
    pub fn parse(source: &Source) -> Self {
        let mut directives = Self::default();
        let Some(tree) = source.tree() else {
            return directives;
        };

        for node in tree.iter().filter(|n| n.kind() == "comment") {
            let (line, _) = source.position(node.span().start);
            directives.add_comment(line, node.text(source.text()));
        }

        directives
    }

    fn add_comment(&mut self, line: usize, comment: &str) {
        let Some(cap) = directive_re().captures(comment) else {
            return;
        };
        let names = cap[2]
            .split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        match &cap[1] {
            "disable-file" => self.file.extend(names),
            "disable-next-line" => self.lines.entry(line + 1).or_default().extend(names),
            _ => self.lines.entry(line).or_default().extend(names),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.file.is_empty()
    }

    /// Whether the rule `group/name` is disabled on `line`
    pub fn is_disabled(&self, group: &str, name: &str, line: usize) -> bool {
        let matches = |set: &HashSet<String>| {
            set.iter().any(|n| {
                n == "all" || n == name || n == group || *n == format!("{}/{}", group, name)
            })
        };
        matches(&self.file) || self.lines.get(&line).is_some_and(matches)
    }
}
