//! Source files: text, parse state and issues

use crate::diagnostic::{Issue, Location};
use crate::parser::{ParseFailure, Parser, SyntaxTree};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// One unit of linting work
///
/// The tree, when present, always matches `text()`: the text only changes
/// through [`Source::rewrite`], which re-parses before swapping anything in.
pub struct Source {
    path: Option<PathBuf>,
    original: String,
    text: String,
    tree: Result<Box<dyn SyntaxTree>, ParseFailure>,
    line_starts: Vec<usize>,
    issues: Vec<Issue>,
    autocorrect: bool,
}

impl Source {
    /// Parse `text` into a new source
    pub fn parse(text: impl Into<String>, path: Option<PathBuf>, parser: &dyn Parser) -> Self {
        let text = text.into();
        let tree = parser.parse(&text);
        Self {
            path,
            original: text.clone(),
            line_starts: line_starts(&text),
            text,
            tree,
            issues: Vec::new(),
            autocorrect: false,
        }
    }

    /// Read and parse a file
    pub fn from_file(path: &Path, parser: &dyn Parser) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(text, Some(path.to_path_buf()), parser))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Path for display, or a placeholder for in-memory sources
    pub fn display_name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "(memory)".to_string(),
        }
    }

    /// Current text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text as it was when the source was created
    pub fn original_text(&self) -> &str {
        &self.original
    }

    pub fn is_modified(&self) -> bool {
        self.text != self.original
    }

    /// Parsed tree of the current text, if it parsed
    pub fn tree(&self) -> Option<&dyn SyntaxTree> {
        self.tree.as_ref().ok().map(|t| t.as_ref())
    }

    pub fn parse_failure(&self) -> Option<&ParseFailure> {
        self.tree.as_ref().err()
    }

    /// Issues recorded by the last run, in position order
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub(crate) fn set_issues(&mut self, issues: Vec<Issue>) {
        self.issues = issues;
    }

    pub fn autocorrect(&self) -> bool {
        self.autocorrect
    }

    pub fn set_autocorrect(&mut self, enabled: bool) {
        self.autocorrect = enabled;
    }

    /// Replace the text and re-parse it.
    ///
    /// Nothing changes if the new text does not parse.
    pub(crate) fn rewrite(&mut self, text: String, parser: &dyn Parser) -> Result<(), ParseFailure> {
        let tree = parser.parse(&text)?;
        self.line_starts = line_starts(&text);
        self.text = text;
        self.tree = Ok(tree);
        Ok(())
    }

    /// Number of lines in the current text
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Source line at line number (1-based), without its newline
    pub fn line(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.text.len());
        self.text
            .get(start..end)
            .map(|l| l.trim_end_matches('\n').trim_end_matches('\r'))
    }

    /// 1-based (line, column) of a byte offset; columns count characters
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line.saturating_sub(1)];
        let column = match self.text.get(start..offset) {
            Some(prefix) => prefix.chars().count() + 1,
            None => offset - start + 1,
        };
        (line, column)
    }

    /// Location covering a byte range of the current text
    pub fn location(&self, range: Range<usize>) -> Location {
        let (line, column) = self.position(range.start);
        let (end_line, end_column) = self.position(range.end);
        Location::new(line, column)
            .with_end(end_line, end_column)
            .with_offsets(range)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("path", &self.path)
            .field("len", &self.text.len())
            .field("parsed", &self.tree.is_ok())
            .field("issues", &self.issues.len())
            .field("autocorrect", &self.autocorrect)
            .finish()
    }
}

fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}
