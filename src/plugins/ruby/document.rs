//! Ruby syntax tree

use crate::parser::{Node, SyntaxTree};
use std::ops::Range;

/// A node in the Ruby outline tree
///
/// Composite nodes (`program`, `group`, `array`, `brace`, `block`) span their
/// delimiters but do not list them as children: a block named `if` covers
/// `if .. end` and its children are the tokens in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubyNode {
    pub kind: &'static str,
    pub name: String,
    pub span: Range<usize>,
    pub children: Vec<RubyNode>,
}

impl RubyNode {
    pub fn token(kind: &'static str, text: &str, span: Range<usize>) -> Self {
        Self {
            kind,
            name: text.to_string(),
            span,
            children: Vec::new(),
        }
    }

    pub fn composite(kind: &'static str, name: &str, start: usize) -> Self {
        Self {
            kind,
            name: name.to_string(),
            span: start..start,
            children: Vec::new(),
        }
    }
}

impl Node for RubyNode {
    fn kind(&self) -> &str {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    fn children(&self) -> Vec<&dyn Node> {
        self.children.iter().map(|c| c as &dyn Node).collect()
    }
}

/// A parsed Ruby document
#[derive(Debug, Clone)]
pub struct RubyTree {
    pub root: RubyNode,
}

impl SyntaxTree for RubyTree {
    fn root(&self) -> &dyn Node {
        &self.root
    }
}
