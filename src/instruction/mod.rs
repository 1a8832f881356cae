//! Instruction Parser
//!
//! Turns one authored line into a typed argument stream. Token 0 is the type
//! keyword; the remaining tokens are read exactly once by the component
//! constructor through the cursor helpers below. Every helper fails with a
//! `ParseError` instead of running off the end of the token list.

mod tokenizer;

use std::str::FromStr;

use crate::error::{ParseError, ParseErrorKind};
use crate::id::ObjectId;
use crate::world::Location;

/// Enumerations that can be read from an argument by name
pub trait ArgEnum: Sized + Copy + 'static {
    /// Accepted names, matched case-insensitively
    const VARIANTS: &'static [(&'static str, Self)];

    fn from_arg(token: &str) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, value)| *value)
    }

    fn names() -> Vec<&'static str> {
        Self::VARIANTS.iter().map(|(name, _)| *name).collect()
    }
}

/// A tokenized quest-script line bound to the definition it came from
#[derive(Debug, Clone)]
pub struct Instruction {
    origin: ObjectId,
    raw: String,
    tokens: Vec<String>,
    consumed: Vec<bool>,
    /// Index of the last token handed out positionally
    cursor: usize,
}

impl Instruction {
    /// Tokenize a line. Fails when the line is empty or malformed.
    pub fn parse(origin: ObjectId, line: &str) -> Result<Self, ParseError> {
        let tokens = tokenizer::tokenize(line).map_err(|(index, kind)| ParseError {
            origin: origin.clone(),
            index,
            kind,
        })?;

        if tokens.is_empty() {
            return Err(ParseError {
                origin,
                index: 0,
                kind: ParseErrorKind::Invalid("instruction is empty".to_string()),
            });
        }

        let mut consumed = vec![false; tokens.len()];
        consumed[0] = true;

        Ok(Self {
            origin,
            raw: line.to_string(),
            tokens,
            consumed,
            cursor: 0,
        })
    }

    /// Definition this instruction belongs to
    pub fn origin(&self) -> &ObjectId {
        &self.origin
    }

    /// Package used to qualify relative identifiers
    pub fn package(&self) -> &str {
        self.origin.package()
    }

    pub fn keyword(&self) -> &str {
        &self.tokens[0]
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Number of tokens, keyword included
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= 1
    }

    /// Build an error pointing at a token of this instruction
    pub fn error(&self, index: usize, kind: ParseErrorKind) -> ParseError {
        ParseError {
            origin: self.origin.clone(),
            index,
            kind,
        }
    }

    /// Build an error pointing at the token last handed out
    pub fn error_here(&self, kind: ParseErrorKind) -> ParseError {
        self.error(self.cursor, kind)
    }

    /// Next unread positional token
    pub fn next(&mut self) -> Result<String, ParseError> {
        let mut index = self.cursor + 1;
        while index < self.tokens.len() && self.consumed[index] {
            index += 1;
        }
        if index >= self.tokens.len() {
            return Err(self.error(index, ParseErrorKind::MissingArgument));
        }
        self.consumed[index] = true;
        self.cursor = index;
        Ok(self.tokens[index].clone())
    }

    /// Token last handed out by a positional helper
    pub fn current(&self) -> Option<&str> {
        (self.cursor > 0).then(|| self.tokens[self.cursor].as_str())
    }

    /// Index of the token last handed out
    pub fn current_index(&self) -> usize {
        self.cursor
    }

    fn next_parsed<T: FromStr>(&mut self, expected: &'static str) -> Result<T, ParseError> {
        let token = self.next()?;
        token.parse().map_err(|_| {
            self.error_here(ParseErrorKind::InvalidNumber {
                token,
                expected,
            })
        })
    }

    pub fn next_int(&mut self) -> Result<i32, ParseError> {
        self.next_parsed("integer")
    }

    pub fn next_positive_int(&mut self) -> Result<u32, ParseError> {
        let value: u32 = self.next_parsed("positive integer")?;
        if value == 0 {
            return Err(self.error_here(ParseErrorKind::InvalidNumber {
                token: "0".to_string(),
                expected: "positive integer",
            }));
        }
        Ok(value)
    }

    pub fn next_f64(&mut self) -> Result<f64, ParseError> {
        let value: f64 = self.next_parsed("number")?;
        if !value.is_finite() {
            return Err(self.error_here(ParseErrorKind::InvalidNumber {
                token: value.to_string(),
                expected: "finite number",
            }));
        }
        Ok(value)
    }

    /// Next token matched by name against `E`'s variants
    pub fn next_enum<E: ArgEnum>(&mut self) -> Result<E, ParseError> {
        let token = self.next()?;
        E::from_arg(&token).ok_or_else(|| {
            self.error_here(ParseErrorKind::InvalidEnum {
                token,
                allowed: E::names(),
            })
        })
    }

    /// Next token split on commas, empty entries dropped
    pub fn next_list(&mut self) -> Result<Vec<String>, ParseError> {
        let token = self.next()?;
        Ok(split_list(&token))
    }

    pub fn next_location(&mut self) -> Result<Location, ParseError> {
        let token = self.next()?;
        token.parse::<Location>().map_err(|reason| {
            self.error_here(ParseErrorKind::InvalidLocation {
                token: token.clone(),
                reason,
            })
        })
    }

    /// All unread tokens joined by spaces, e.g. free text of a message
    pub fn rest(&mut self) -> Result<String, ParseError> {
        let mut parts = Vec::new();
        while let Ok(token) = self.next() {
            parts.push(token);
        }
        if parts.is_empty() {
            return Err(self.error(self.tokens.len(), ParseErrorKind::MissingArgument));
        }
        Ok(parts.join(" "))
    }

    /// Value of the first unread `key:value` token, consuming it
    pub fn optional(&mut self, key: &str) -> Option<String> {
        let index = (1..self.tokens.len()).find(|&i| {
            !self.consumed[i] && key_value(&self.tokens[i], key).is_some()
        })?;
        self.consumed[index] = true;
        key_value(&self.tokens[index], key).map(str::to_string)
    }

    /// Comma separated list behind `key:`, empty when absent
    pub fn optional_list(&mut self, key: &str) -> Vec<String> {
        self.optional(key)
            .map(|value| split_list(&value))
            .unwrap_or_default()
    }

    /// Whether a bare flag token is present, consuming it
    pub fn has_argument(&mut self, key: &str) -> bool {
        let found = (1..self.tokens.len())
            .find(|&i| !self.consumed[i] && self.tokens[i].eq_ignore_ascii_case(key));
        match found {
            Some(index) => {
                self.consumed[index] = true;
                true
            }
            None => false,
        }
    }

    /// Tokens no helper has read
    pub fn unconsumed(&self) -> Vec<&str> {
        (1..self.tokens.len())
            .filter(|&i| !self.consumed[i])
            .map(|i| self.tokens[i].as_str())
            .collect()
    }
}

fn key_value<'a>(token: &'a str, key: &str) -> Option<&'a str> {
    let (head, value) = token.split_once(':')?;
    (!value.is_empty() && head.eq_ignore_ascii_case(key)).then_some(value)
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
