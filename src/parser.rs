//! Parser interface: turns source text into a walkable syntax tree

use std::ops::Range;
use thiserror::Error;

/// Structured parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseFailure {
    pub message: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Byte offset of the failure
    pub offset: usize,
}

impl ParseFailure {
    pub fn new(message: impl Into<String>, line: usize, column: usize, offset: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            offset,
        }
    }
}

/// A node in the parsed syntax tree
pub trait Node: Send + Sync {
    /// Node kind (e.g. "block", "group", "ident", "newline")
    fn kind(&self) -> &str;

    /// Node name: the keyword for blocks, the opening bracket for groups,
    /// the token text for leaves
    fn name(&self) -> &str;

    /// Byte range covered by this node
    fn span(&self) -> Range<usize>;

    /// Child nodes in source order
    fn children(&self) -> Vec<&dyn Node>;

    /// Slice of `text` covered by this node
    fn text<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.span()).unwrap_or("")
    }

    /// Whether this node is a leaf token
    fn is_token(&self) -> bool {
        self.children().is_empty()
    }

    /// Whether the node carries meaning (not a newline or comment)
    fn is_significant(&self) -> bool {
        !matches!(self.kind(), "newline" | "comment")
    }
}

/// A parsed document
pub trait SyntaxTree: Send + Sync {
    /// Get the root node
    fn root(&self) -> &dyn Node;

    /// Iterate over all nodes in the tree (depth-first, pre-order)
    fn iter(&self) -> Box<dyn Iterator<Item = &dyn Node> + '_> {
        let mut nodes = Vec::new();
        collect_preorder(self.root(), &mut nodes);
        Box::new(nodes.into_iter())
    }
}

fn collect_preorder<'a>(node: &'a dyn Node, out: &mut Vec<&'a dyn Node>) {
    out.push(node);
    for child in node.children() {
        collect_preorder(child, out);
    }
}

/// Parser for one source language
pub trait Parser: Send + Sync {
    /// Parser identifier (e.g. "ruby")
    fn id(&self) -> &str;

    /// File extensions this parser handles (without dot)
    fn extensions(&self) -> &[&str];

    /// Parse source text into a tree
    fn parse(&self, text: &str) -> Result<Box<dyn SyntaxTree>, ParseFailure>;
}
