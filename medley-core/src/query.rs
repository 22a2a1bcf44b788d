//! Collection pattern language.
//!
//! Clients parse a pattern string into a [`Query`] tree and send the tree to
//! the daemon, which evaluates it against every media library entry.
//!
//! ```text
//! *                      everything
//! artist:Beat*           case-insensitive wildcard match
//! title~live             case-insensitive substring
//! tracknr>3  year<=1999  integer comparison
//! +title                 property present
//! beatles                *beatles* in artist, album or title
//! NOT x   -x   x OR y   x AND y   x y   ( ... )   "quoted values"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::types::PropertyValue;
use crate::wildcard;

/// Properties a bare word is matched against.
pub const DEFAULT_FIELDS: [&str; 3] = ["artist", "album", "title"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Greater,
    GreaterEq,
    Smaller,
    SmallerEq,
}

impl Comparison {
    fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparison::Greater => lhs > rhs,
            Comparison::GreaterEq => lhs >= rhs,
            Comparison::Smaller => lhs < rhs,
            Comparison::SmallerEq => lhs <= rhs,
        }
    }
}

/// Parsed collection pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Query {
    All,
    Match { key: String, pattern: String },
    Contains { key: String, text: String },
    Compare { key: String, cmp: Comparison, value: i64 },
    Has { key: String },
    Not { query: Box<Query> },
    And { queries: Vec<Query> },
    Or { queries: Vec<Query> },
}

impl Query {
    /// Parse a pattern string.
    pub fn parse(pattern: &str) -> Result<Query, QueryError> {
        let tokens = tokenize(pattern)?;
        if tokens.is_empty() {
            return Err(QueryError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let query = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(QueryError::UnexpectedToken {
                token: token.describe(),
                position: token.position,
            });
        }
        Ok(query)
    }

    /// Evaluate against an entry whose properties are reachable through `lookup`.
    pub fn matches<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<PropertyValue>,
    {
        match self {
            Query::All => true,
            Query::Match { key, pattern } => lookup(key)
                .map(|v| wildcard::matches_ignore_case(pattern, &v.to_string()))
                .unwrap_or(false),
            Query::Contains { key, text } => lookup(key)
                .map(|v| v.to_string().to_lowercase().contains(&text.to_lowercase()))
                .unwrap_or(false),
            Query::Compare { key, cmp, value } => lookup(key)
                .and_then(|v| v.as_int())
                .map(|n| cmp.holds(n, *value))
                .unwrap_or(false),
            Query::Has { key } => lookup(key).is_some(),
            Query::Not { query } => !query.matches(lookup),
            Query::And { queries } => queries.iter().all(|q| q.matches(lookup)),
            Query::Or { queries } => queries.iter().any(|q| q.matches(lookup)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    /// A term; `split` is the byte offset of the first unquoted operator.
    /// `negated` is set for a `-` directly in front of a leading quote.
    Word {
        text: String,
        quoted: bool,
        negated: bool,
        split: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

impl Token {
    fn describe(&self) -> String {
        match &self.kind {
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
            TokenKind::Word { text, .. } => text.clone(),
        }
    }

    fn keyword(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word {
                text,
                quoted: false,
                ..
            } if matches!(text.as_str(), "AND" | "OR" | "NOT") => Some(text.as_str()),
            _ => None,
        }
    }
}

const OPERATORS: [char; 4] = [':', '~', '>', '<'];

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '(' || c == ')' {
            chars.next();
            tokens.push(Token {
                kind: if c == '(' {
                    TokenKind::LParen
                } else {
                    TokenKind::RParen
                },
                position,
            });
            continue;
        }

        let mut text = String::new();
        let mut quoted = false;
        let mut negated = false;
        let mut split = None;
        while let Some(&(at, c)) = chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            chars.next();
            if c == '-' && text.is_empty() && !quoted && !negated {
                if let Some(&(_, '"')) = chars.peek() {
                    negated = true;
                    continue;
                }
            }
            if c == '"' {
                quoted = true;
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '"' {
                        closed = true;
                        break;
                    }
                    text.push(inner);
                }
                if !closed {
                    return Err(QueryError::UnterminatedQuote(at));
                }
                continue;
            }
            if split.is_none() && OPERATORS.contains(&c) && !text.is_empty() {
                split = Some(text.len());
            }
            text.push(c);
        }
        tokens.push(Token {
            kind: TokenKind::Word {
                text,
                quoted,
                negated,
                split,
            },
            position,
        });
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Query, QueryError> {
        let mut queries = vec![self.parse_and()?];
        while self.peek().and_then(Token::keyword) == Some("OR") {
            self.next();
            queries.push(self.parse_and()?);
        }
        Ok(flatten(queries, |queries| Query::Or { queries }))
    }

    fn parse_and(&mut self) -> Result<Query, QueryError> {
        let mut queries = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(token) if token.keyword() == Some("AND") => {
                    self.next();
                    queries.push(self.parse_unary()?);
                }
                Some(token)
                    if token.keyword() != Some("OR") && token.kind != TokenKind::RParen =>
                {
                    queries.push(self.parse_unary()?);
                }
                _ => break,
            }
        }
        Ok(flatten(queries, |queries| Query::And { queries }))
    }

    fn parse_unary(&mut self) -> Result<Query, QueryError> {
        if self.peek().and_then(Token::keyword) == Some("NOT") {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Query::Not {
                query: Box::new(inner),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Query, QueryError> {
        let token = self.next().ok_or(QueryError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(QueryError::UnexpectedToken {
                        token: other.describe(),
                        position: other.position,
                    }),
                    None => Err(QueryError::UnexpectedEnd),
                }
            }
            TokenKind::RParen => Err(QueryError::UnexpectedToken {
                token: ")".to_string(),
                position: token.position,
            }),
            TokenKind::Word {
                ref text,
                quoted,
                negated,
                split,
            } => {
                if text.is_empty() && !quoted {
                    return Err(QueryError::UnexpectedEnd);
                }
                let term = parse_term(text, quoted, split, token.position)?;
                Ok(if negated {
                    Query::Not {
                        query: Box::new(term),
                    }
                } else {
                    term
                })
            }
        }
    }
}

fn flatten(mut queries: Vec<Query>, wrap: impl FnOnce(Vec<Query>) -> Query) -> Query {
    if queries.len() == 1 {
        queries.remove(0)
    } else {
        wrap(queries)
    }
}

fn parse_term(
    text: &str,
    quoted: bool,
    split: Option<usize>,
    position: usize,
) -> Result<Query, QueryError> {
    if !quoted && text == "*" {
        return Ok(Query::All);
    }
    if !quoted && text.len() > 1 {
        if let Some(rest) = text.strip_prefix('-') {
            let inner = parse_term(rest, quoted, split.map(|s| s - 1), position + 1)?;
            return Ok(Query::Not {
                query: Box::new(inner),
            });
        }
        if let Some(key) = text.strip_prefix('+') {
            if split.is_none() {
                return Ok(Query::Has {
                    key: key.to_string(),
                });
            }
        }
    }

    let Some(split) = split else {
        let pattern = if wildcard::has_wildcard(text) {
            text.to_string()
        } else {
            format!("*{text}*")
        };
        let queries = DEFAULT_FIELDS
            .iter()
            .map(|key| Query::Match {
                key: key.to_string(),
                pattern: pattern.clone(),
            })
            .collect();
        return Ok(Query::Or { queries });
    };

    let key = text[..split].to_string();
    let rest = &text[split..];
    let (op, value) = if let Some(v) = rest.strip_prefix(">=") {
        (">=", v)
    } else if let Some(v) = rest.strip_prefix("<=") {
        ("<=", v)
    } else {
        rest.split_at(1)
    };

    let compare = |cmp: Comparison| -> Result<Query, QueryError> {
        let value = value.trim().parse().map_err(|_| QueryError::NotAnInteger {
            key: key.clone(),
            value: value.to_string(),
        })?;
        Ok(Query::Compare {
            key: key.clone(),
            cmp,
            value,
        })
    };

    match op {
        ":" => Ok(Query::Match {
            key: key.clone(),
            pattern: value.to_string(),
        }),
        "~" => Ok(Query::Contains {
            key: key.clone(),
            text: value.to_string(),
        }),
        ">" => compare(Comparison::Greater),
        ">=" => compare(Comparison::GreaterEq),
        "<" => compare(Comparison::Smaller),
        "<=" => compare(Comparison::SmallerEq),
        other => Err(QueryError::UnexpectedToken {
            token: other.to_string(),
            position: position + split,
        }),
    }
}
