//! Ruby plugin: outline parser and built-in rules

mod document;
mod parser;
pub mod rules;

pub use document::{RubyNode, RubyTree};
pub use parser::{tokenize, Token, TokenKind};

use crate::parser::{ParseFailure, Parser, SyntaxTree};

/// Parser for Ruby source files
#[derive(Debug, Clone, Default)]
pub struct RubyParser;

impl RubyParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for RubyParser {
    fn id(&self) -> &str {
        "ruby"
    }

    fn extensions(&self) -> &[&str] {
        &["rb", "rake", "gemspec", "ru"]
    }

    fn parse(&self, text: &str) -> Result<Box<dyn SyntaxTree>, ParseFailure> {
        let tree = parser::parse(text)?;
        Ok(Box::new(tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_id() {
        let parser = RubyParser::new();
        assert_eq!(parser.id(), "ruby");
        assert!(parser.extensions().contains(&"rb"));
    }

    #[test]
    fn test_parse_tree_iter() {
        let tree = RubyParser::new().parse("def f\n  (1)\nend\n").unwrap();
        let kinds: Vec<&str> = tree.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds[0], "program");
        assert!(kinds.contains(&"block"));
        assert!(kinds.contains(&"group"));
    }

    #[test]
    fn test_parse_failure() {
        let err = RubyParser::new().parse("class Foo\n").err().expect("expected parse error");
        assert_eq!(err.line, 1);
        assert!(err.message.contains("class"));
    }
}
