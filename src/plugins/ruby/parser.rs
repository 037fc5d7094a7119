//! Ruby outline parser
//!
//! Recognizes tokens and nesting (brackets and keyword blocks closed by
//! `end`), not the full grammar. That is enough for rules that look at
//! shapes like `if (cond)` and for reporting unbalanced input.

use super::document::{RubyNode, RubyTree};
use crate::parser::ParseFailure;
use std::ops::Range;

/// Kind of lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Ident,
    Constant,
    Number,
    Str,
    Symbol,
    Operator,
    Comma,
    Semicolon,
    Open,
    Close,
    Comment,
    Newline,
}

impl TokenKind {
    fn node_kind(self) -> &'static str {
        match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Ident => "ident",
            TokenKind::Constant => "constant",
            TokenKind::Number => "number",
            TokenKind::Str => "string",
            TokenKind::Symbol => "symbol",
            TokenKind::Operator => "operator",
            TokenKind::Comma => "comma",
            TokenKind::Semicolon => "semicolon",
            TokenKind::Open => "open",
            TokenKind::Close => "close",
            TokenKind::Comment => "comment",
            TokenKind::Newline => "newline",
        }
    }
}

/// A lexical token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

const KEYWORDS: &[&str] = &[
    "alias", "and", "begin", "break", "case", "class", "def", "do", "else", "elsif", "end",
    "ensure", "false", "for", "if", "in", "module", "next", "nil", "not", "or", "redo",
    "rescue", "retry", "return", "self", "super", "then", "true", "undef", "unless", "until",
    "when", "while", "yield",
];

const OPERATORS_3: &[&str] = &["...", "**=", "<=>", "===", "||=", "&&=", "<<=", ">>="];
const OPERATORS_2: &[&str] = &[
    "..", "**", "==", "!=", ">=", "<=", "&&", "||", "=>", "->", "::", "+=", "-=", "*=", "/=",
    "%=", "|=", "&=", "^=", "<<", ">>", "=~", "!~", "&.",
];

/// Build a parse failure at a byte offset
pub fn failure(text: &str, offset: usize, message: impl Into<String>) -> ParseFailure {
    let prefix = text.get(..offset).unwrap_or(text);
    let line = prefix.matches('\n').count() + 1;
    let column = prefix
        .rsplit('\n')
        .next()
        .map(|l| l.chars().count())
        .unwrap_or(0)
        + 1;
    ParseFailure::new(message, line, column, offset)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn scan_ident(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && is_ident_continue(bytes[i]) {
        i += 1;
    }
    // Predicate and bang methods, but not `a!=b`
    if i < bytes.len() && (bytes[i] == b'?' || bytes[i] == b'!') && bytes.get(i + 1) != Some(&b'=')
    {
        i += 1;
    }
    i
}

fn scan_string(text: &str, start: usize) -> Result<usize, ParseFailure> {
    let bytes = text.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    loop {
        if i >= bytes.len() {
            return Err(failure(text, start, "unterminated string literal"));
        }
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
        i += 1;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
    }
    i
}

/// Split source text into tokens
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseFailure> {
    let bytes = text.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let b = bytes[i];
        let kind = match b {
            b' ' | b'\t' | b'\r' => {
                i += 1;
                continue;
            }
            b'\\' if bytes.get(i + 1) == Some(&b'\n') => {
                i += 2;
                continue;
            }
            b'\n' => {
                i += 1;
                TokenKind::Newline
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                TokenKind::Comment
            }
            b'\'' | b'"' => {
                i = scan_string(text, i)?;
                TokenKind::Str
            }
            b'0'..=b'9' => {
                i = scan_number(bytes, i);
                TokenKind::Number
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b';' => {
                i += 1;
                TokenKind::Semicolon
            }
            b'(' | b'[' | b'{' => {
                i += 1;
                TokenKind::Open
            }
            b')' | b']' | b'}' => {
                i += 1;
                TokenKind::Close
            }
            b':' if bytes.get(i + 1).is_some_and(|&n| is_ident_start(n)) => {
                i = scan_ident(bytes, i + 1);
                TokenKind::Symbol
            }
            b'@' | b'$' => {
                i += 1;
                if bytes.get(i) == Some(&b'@') {
                    i += 1;
                }
                i = scan_ident(bytes, i);
                TokenKind::Ident
            }
            _ if is_ident_start(b) => {
                i = scan_ident(bytes, i);
                let word = &text[start..i];
                let after_dot = tokens.last().is_some_and(|t| {
                    t.kind == TokenKind::Operator && matches!(&text[t.span.clone()], "." | "&.")
                });
                if KEYWORDS.contains(&word) && !after_dot {
                    TokenKind::Keyword
                } else if b.is_ascii_uppercase() {
                    TokenKind::Constant
                } else {
                    TokenKind::Ident
                }
            }
            _ => {
                let rest = &text[i..];
                let len = OPERATORS_3
                    .iter()
                    .chain(OPERATORS_2.iter())
                    .find(|op| rest.starts_with(**op))
                    .map_or(1, |op| op.len());
                i += len;
                TokenKind::Operator
            }
        };
        tokens.push(Token {
            kind,
            span: start..i,
        });
    }

    Ok(tokens)
}

struct Frame {
    node: RubyNode,
    /// A `while`/`until`/`for` header is still open; its `do` is part of it
    header_open: bool,
}

fn group_kind(opener: &str) -> &'static str {
    match opener {
        "(" => "group",
        "[" => "array",
        _ => "brace",
    }
}

fn closer_for(opener: &str) -> &'static str {
    match opener {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

fn starts_statement(kind: TokenKind, text: &str) -> bool {
    match kind {
        TokenKind::Newline | TokenKind::Semicolon | TokenKind::Open | TokenKind::Comma => true,
        TokenKind::Keyword => matches!(
            text,
            "then" | "else" | "do" | "begin" | "ensure" | "and" | "or" | "not"
        ),
        TokenKind::Operator => matches!(
            text,
            "=" | "+=" | "-=" | "*=" | "/=" | "||=" | "&&=" | "||" | "&&" | "!"
        ),
        _ => false,
    }
}

/// Parse source text into an outline tree
pub fn parse(text: &str) -> Result<RubyTree, ParseFailure> {
    let tokens = tokenize(text)?;
    let mut stack = vec![Frame {
        node: RubyNode::composite("program", "", 0),
        header_open: false,
    }];
    let mut at_statement_start = true;

    for token in tokens {
        let span = token.span.clone();
        let slice = &text[span.clone()];

        match token.kind {
            TokenKind::Open => {
                stack.push(Frame {
                    node: RubyNode::composite(group_kind(slice), slice, span.start),
                    header_open: false,
                });
            }
            TokenKind::Close => {
                let matches = stack.len() > 1
                    && stack.last().is_some_and(|f| {
                        f.node.kind != "block" && closer_for(&f.node.name) == slice
                    });
                if !matches {
                    return Err(failure(text, span.start, format!("unexpected `{}`", slice)));
                }
                close_frame(&mut stack, span.end);
            }
            TokenKind::Keyword if slice == "end" => {
                let in_block = stack.len() > 1 && stack.last().is_some_and(|f| f.node.kind == "block");
                if !in_block {
                    return Err(failure(text, span.start, "unexpected `end`"));
                }
                close_frame(&mut stack, span.end);
            }
            TokenKind::Keyword if opens_block(slice, at_statement_start, &stack) => {
                stack.push(Frame {
                    node: RubyNode::composite("block", slice, span.start),
                    header_open: matches!(slice, "while" | "until" | "for"),
                });
            }
            _ => {
                if let Some(top) = stack.last_mut() {
                    match token.kind {
                        TokenKind::Newline | TokenKind::Semicolon => top.header_open = false,
                        TokenKind::Keyword if slice == "do" => top.header_open = false,
                        _ => {}
                    }
                    top.node
                        .children
                        .push(RubyNode::token(token.kind.node_kind(), slice, span.clone()));
                }
            }
        }

        if token.kind != TokenKind::Comment {
            at_statement_start = starts_statement(token.kind, slice);
        }
    }

    if stack.len() > 1 {
        if let Some(open) = stack.last() {
            let message = if open.node.kind == "block" {
                format!("`{}` without matching `end`", open.node.name)
            } else {
                format!("unclosed `{}`", open.node.name)
            };
            return Err(failure(text, open.node.span.start, message));
        }
    }

    let mut root = match stack.pop() {
        Some(frame) => frame.node,
        None => RubyNode::composite("program", "", 0),
    };
    root.span = 0..text.len();
    Ok(RubyTree { root })
}

fn opens_block(keyword: &str, at_statement_start: bool, stack: &[Frame]) -> bool {
    match keyword {
        "def" | "class" | "module" | "begin" | "case" | "for" => true,
        "if" | "unless" | "while" | "until" => at_statement_start,
        "do" => !stack.last().is_some_and(|f| f.header_open),
        _ => false,
    }
}

fn close_frame(stack: &mut Vec<Frame>, end: usize) {
    if let Some(mut frame) = stack.pop() {
        frame.node.span.end = end;
        if let Some(parent) = stack.last_mut() {
            parent.node.children.push(frame.node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_basic() {
        use TokenKind::*;
        assert_eq!(
            kinds("a = (1, :b) # c\n"),
            vec![Ident, Operator, Open, Number, Comma, Symbol, Close, Comment, Newline]
        );
    }

    #[test]
    fn test_tokenize_keywords_and_methods() {
        use TokenKind::*;
        assert_eq!(kinds("if x.class"), vec![Keyword, Ident, Operator, Ident]);
        assert_eq!(kinds("empty? Foo"), vec![Ident, Constant]);
        assert_eq!(kinds("a != b"), vec![Ident, Operator, Ident]);
    }

    #[test]
    fn test_tokenize_strings() {
        let tokens = tokenize(r#"x = "a \" (b" + 'c'"#).unwrap();
        let strings: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::Str).collect();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings[0].span, 4..13);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc\ny").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 5);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_parse_group() {
        let tree = parse("a = ()").unwrap();
        let group = &tree.root.children[2];
        assert_eq!(group.kind, "group");
        assert_eq!(group.span, 4..6);
        assert!(group.children.is_empty());
    }

    #[test]
    fn test_parse_if_block() {
        let tree = parse("if (x > 1)\n  x\nend").unwrap();
        let block = &tree.root.children[0];
        assert_eq!(block.kind, "block");
        assert_eq!(block.name, "if");
        assert_eq!(block.span, 0..18);
        assert_eq!(block.children[0].kind, "group");
        assert_eq!(block.children[0].span, 3..10);
        assert_eq!(block.children[1].kind, "newline");
    }

    #[test]
    fn test_modifier_if_does_not_open_block() {
        let tree = parse("x = 1 if y\nreturn unless z\n").unwrap();
        assert!(tree.root.children.iter().all(|c| c.kind != "block"));
    }

    #[test]
    fn test_while_do_header() {
        let tree = parse("while x do\n  y\nend\nitems.each do |i|\n  i\nend\n").unwrap();
        let blocks: Vec<_> = tree
            .root
            .children
            .iter()
            .filter(|c| c.kind == "block")
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(blocks, vec!["while", "do"]);
    }

    #[test]
    fn test_nested_blocks() {
        let tree = parse("def f\n  if a\n    [1, 2]\n  end\nend\n").unwrap();
        let def = &tree.root.children[0];
        assert_eq!(def.name, "def");
        assert!(def.children.iter().any(|c| c.name == "if"));
    }

    #[test]
    fn test_unexpected_end() {
        let err = parse("x\nend\n").unwrap_err();
        assert_eq!(err.message, "unexpected `end`");
        assert_eq!((err.line, err.column), (2, 1));
    }

    #[test]
    fn test_missing_end() {
        let err = parse("if x\n  y\n").unwrap_err();
        assert_eq!(err.message, "`if` without matching `end`");
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_mismatched_brackets() {
        assert!(parse("(1]").is_err());
        assert!(parse("[1").is_err());
        assert!(parse("(if x)").is_err());
    }
}
