//! Content query AST and parser.
//!
//! Two input forms produce the same AST: a structured serde-tagged tree,
//! and a string mini-language:
//!
//! ```text
//! expr    ::= or
//! or      ::= and ( OR and )*
//! and     ::= unary ( AND unary )*
//! unary   ::= NOT unary | primary
//! primary ::= '(' expr ')' | NEAR '(' atom ',' atom ',' k ')' | atom
//! atom    ::= bare-term | "quoted term" | /regex/flags
//! ```
//!
//! Keywords are case-insensitive. `AND` binds tighter than `OR`; `NOT` is
//! unary with the highest precedence. NEAR accepts only atoms — a boolean
//! expression inside NEAR is a parse error, not a silent coercion. To
//! search for a literal keyword (`and`, `near`, …), quote it.

use crate::error::ParseError;
use crate::types::MatchOptions;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// A parsed content predicate. `Term` options default to the run-level
/// settings when unset; the structured form may pin them per atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryNode {
    Term {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case_sensitive: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        whole_word: Option<bool>,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        flags: String,
    },
    Near {
        left: Box<QueryNode>,
        right: Box<QueryNode>,
        k: u32,
    },
    And {
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
    Or {
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
    Not {
        node: Box<QueryNode>,
    },
}

impl QueryNode {
    pub fn term(text: impl Into<String>) -> Self {
        QueryNode::Term { text: text.into(), case_sensitive: None, whole_word: None }
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, QueryNode::Term { .. } | QueryNode::Regex { .. })
    }

    /// Enforce the NEAR-nests-only-atoms invariant on a structured tree.
    pub fn validate(&self) -> Result<(), ParseError> {
        match self {
            QueryNode::Near { left, right, .. } => {
                if !left.is_atom() || !right.is_atom() {
                    return Err(ParseError::NearOperand { offset: 0 });
                }
                Ok(())
            }
            QueryNode::And { left, right } | QueryNode::Or { left, right } => {
                left.validate()?;
                right.validate()
            }
            QueryNode::Not { node } => node.validate(),
            QueryNode::Term { .. } | QueryNode::Regex { .. } => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

/// Typed result-cache key for an atom under resolved options. Replaces the
/// original's stringified keys so distinct atoms can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomKey {
    Term { text: Box<str>, case_sensitive: bool, whole_word: bool, fuzzy: bool },
    Regex { pattern: Box<str>, flags: Box<str> },
    Near { left: Box<AtomKey>, right: Box<AtomKey>, k: u32 },
}

impl QueryNode {
    /// The cache key for an atom node under the given options. `fuzzy`
    /// reflects whichever gate applies at the call site (boolean vs NEAR).
    pub(crate) fn atom_key(&self, opts: &MatchOptions, fuzzy: bool) -> Option<AtomKey> {
        match self {
            QueryNode::Term { text, case_sensitive, whole_word } => Some(AtomKey::Term {
                text: text.as_str().into(),
                case_sensitive: case_sensitive.unwrap_or(opts.case_sensitive),
                whole_word: whole_word.unwrap_or(opts.whole_word),
                fuzzy,
            }),
            QueryNode::Regex { pattern, flags } => Some(AtomKey::Regex {
                pattern: pattern.as_str().into(),
                flags: flags.as_str().into(),
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    And,
    Or,
    Not,
    Near,
    LParen,
    RParen,
    Comma,
    Bare,
    Quoted,
    Regex,
    Eof,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    /// Bare text, quoted payload (raw, escapes intact), or regex pattern.
    text: &'a str,
    /// Regex flags; empty for every other kind.
    flags: &'a str,
    offset: usize,
}

/// Zero-copy tokenizer over the query string.
struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.peek_char() {
            self.position += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    fn next_token(&mut self) -> Result<Token<'a>, ParseError> {
        self.skip_whitespace();
        let offset = self.position;

        let Some(c) = self.peek_char() else {
            return Ok(Token { kind: TokenKind::Eof, text: "", flags: "", offset });
        };

        match c {
            '(' | ')' | ',' => {
                self.advance_char();
                let kind = match c {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    _ => TokenKind::Comma,
                };
                let text = &self.input[offset..self.position];
                Ok(Token { kind, text, flags: "", offset })
            }
            '"' => self.lex_quoted(offset),
            '/' => self.lex_regex(offset),
            _ => self.lex_bare(offset),
        }
    }

    fn lex_quoted(&mut self, offset: usize) -> Result<Token<'a>, ParseError> {
        self.advance_char(); // opening quote
        let start = self.position;
        loop {
            match self.peek_char() {
                None => {
                    return Err(ParseError::Unterminated { what: "quoted string", offset });
                }
                Some('\\') => {
                    self.advance_char();
                    self.advance_char();
                }
                Some('"') => {
                    let text = &self.input[start..self.position];
                    self.advance_char();
                    return Ok(Token { kind: TokenKind::Quoted, text, flags: "", offset });
                }
                Some(_) => self.advance_char(),
            }
        }
    }

    fn lex_regex(&mut self, offset: usize) -> Result<Token<'a>, ParseError> {
        self.advance_char(); // opening slash
        let start = self.position;
        loop {
            match self.peek_char() {
                None => return Err(ParseError::Unterminated { what: "regex literal", offset }),
                Some('\\') => {
                    self.advance_char();
                    self.advance_char();
                }
                Some('/') => {
                    let pattern = &self.input[start..self.position];
                    self.advance_char();
                    let flags_start = self.position;
                    while self.peek_char().is_some_and(|c| c.is_ascii_alphabetic()) {
                        self.advance_char();
                    }
                    let flags = &self.input[flags_start..self.position];
                    return Ok(Token { kind: TokenKind::Regex, text: pattern, flags, offset });
                }
                Some(_) => self.advance_char(),
            }
        }
    }

    fn lex_bare(&mut self, offset: usize) -> Result<Token<'a>, ParseError> {
        let start = self.position;
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || matches!(c, '(' | ')' | ',' | '"') {
                break;
            }
            self.advance_char();
        }
        let text = &self.input[start..self.position];
        let kind = match text.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "NEAR" => TokenKind::Near,
            _ => TokenKind::Bare,
        };
        Ok(Token { kind, text, flags: "", offset })
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Recursive-descent parser for the boolean mini-language.
struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<Token<'a>, ParseError> {
        let prev = self.current;
        self.current = self.lexer.next_token()?;
        Ok(prev)
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token<'a>, ParseError> {
        if self.current.kind == kind {
            self.advance()
        } else {
            Err(ParseError::Expected { expected, offset: self.current.offset })
        }
    }

    fn parse(mut self) -> Result<QueryNode, ParseError> {
        if self.current.kind == TokenKind::Eof {
            return Err(ParseError::EmptyQuery);
        }
        let node = self.parse_or()?;
        if self.current.kind != TokenKind::Eof {
            return Err(ParseError::UnexpectedToken {
                found: self.current.text.to_string(),
                offset: self.current.offset,
            });
        }
        Ok(node)
    }

    fn parse_or(&mut self) -> Result<QueryNode, ParseError> {
        let mut node = self.parse_and()?;
        while self.current.kind == TokenKind::Or {
            self.advance()?;
            let right = self.parse_and()?;
            node = QueryNode::Or { left: Box::new(node), right: Box::new(right) };
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<QueryNode, ParseError> {
        let mut node = self.parse_unary()?;
        while self.current.kind == TokenKind::And {
            self.advance()?;
            let right = self.parse_unary()?;
            node = QueryNode::And { left: Box::new(node), right: Box::new(right) };
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<QueryNode, ParseError> {
        if self.current.kind == TokenKind::Not {
            self.advance()?;
            let node = self.parse_unary()?;
            return Ok(QueryNode::Not { node: Box::new(node) });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode, ParseError> {
        match self.current.kind {
            TokenKind::LParen => {
                self.advance()?;
                let node = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(node)
            }
            TokenKind::Near => self.parse_near(),
            TokenKind::Bare | TokenKind::Quoted | TokenKind::Regex => self.parse_atom(),
            _ => Err(ParseError::UnexpectedToken {
                found: self.current.text.to_string(),
                offset: self.current.offset,
            }),
        }
    }

    fn parse_near(&mut self) -> Result<QueryNode, ParseError> {
        self.advance()?; // NEAR
        self.expect(TokenKind::LParen, "'(' after NEAR")?;
        let left = self.parse_near_operand()?;
        self.expect(TokenKind::Comma, "',' between NEAR operands")?;
        let right = self.parse_near_operand()?;
        self.expect(TokenKind::Comma, "',' before NEAR distance")?;

        let tok = self.current;
        let k = match tok.kind {
            TokenKind::Bare => tok.text.parse::<u32>().map_err(|_| ParseError::NearDistance {
                value: tok.text.to_string(),
                offset: tok.offset,
            })?,
            _ => {
                return Err(ParseError::NearDistance {
                    value: tok.text.to_string(),
                    offset: tok.offset,
                })
            }
        };
        self.advance()?;
        self.expect(TokenKind::RParen, "')' closing NEAR")?;

        Ok(QueryNode::Near { left: Box::new(left), right: Box::new(right), k })
    }

    /// A NEAR operand must be an atom; boolean structure here is an error.
    fn parse_near_operand(&mut self) -> Result<QueryNode, ParseError> {
        match self.current.kind {
            TokenKind::Bare | TokenKind::Quoted | TokenKind::Regex => self.parse_atom(),
            TokenKind::LParen | TokenKind::Not | TokenKind::Near => {
                Err(ParseError::NearOperand { offset: self.current.offset })
            }
            _ => Err(ParseError::Expected { expected: "term or regex", offset: self.current.offset }),
        }
    }

    fn parse_atom(&mut self) -> Result<QueryNode, ParseError> {
        let tok = self.advance()?;
        Ok(match tok.kind {
            TokenKind::Quoted => QueryNode::term(unescape(tok.text)),
            TokenKind::Regex => {
                QueryNode::Regex { pattern: tok.text.to_string(), flags: tok.flags.to_string() }
            }
            _ => QueryNode::term(tok.text),
        })
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a boolean-mode query string.
pub fn parse_boolean(input: &str) -> Result<QueryNode, ParseError> {
    Parser::new(input)?.parse()
}
