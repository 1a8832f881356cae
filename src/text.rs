//! Variable-bearing values
//!
//! Instruction text may embed `%[package.]name%` references that resolve per
//! player when rendered. `%%` is a literal percent sign.

use crate::component::VariableHandle;
use crate::error::EvaluationError;
use crate::id::PlayerId;
use crate::runtime::QuestRuntime;

/// Piece of raw text before references are resolved
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawSegment {
    Literal(String),
    Reference(String),
}

/// Split raw text into literal runs and `%name%` references
pub(crate) fn scan(raw: &str) -> Vec<RawSegment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find('%') {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(0) => {
                literal.push('%');
                rest = &after[1..];
            }
            Some(end) if !after[..end].contains(char::is_whitespace) => {
                if !literal.is_empty() {
                    segments.push(RawSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(RawSegment::Reference(after[..end].to_string()));
                rest = &after[end + 1..];
            }
            _ => {
                literal.push('%');
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(RawSegment::Literal(literal));
    }
    segments
}

#[derive(Clone)]
enum Segment {
    Literal(String),
    Variable(VariableHandle),
}

/// Text with resolved variable references
#[derive(Clone)]
pub struct Text {
    segments: Vec<Segment>,
}

impl Text {
    pub fn literal(text: &str) -> Self {
        Self {
            segments: vec![Segment::Literal(text.to_string())],
        }
    }

    pub(crate) fn new() -> Self {
        Self { segments: Vec::new() }
    }

    pub(crate) fn push_literal(&mut self, text: String) {
        self.segments.push(Segment::Literal(text));
    }

    pub(crate) fn push_variable(&mut self, variable: VariableHandle) {
        self.segments.push(Segment::Variable(variable));
    }

    pub fn has_variables(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Variable(_)))
    }

    /// Render for a player; failing variables render empty
    pub fn render(&self, player: &PlayerId, rt: &QuestRuntime) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(variable) => out.push_str(&variable.resolve(player, rt)),
            }
        }
        out
    }
}

/// Number that is either a constant or read from a variable each time
#[derive(Clone)]
pub enum VarNum {
    Constant(f64),
    Variable(VariableHandle),
}

impl VarNum {
    pub fn resolve(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<f64, EvaluationError> {
        match self {
            VarNum::Constant(value) => Ok(*value),
            VarNum::Variable(variable) => {
                let value = variable.try_resolve(player, rt)?;
                value
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| EvaluationError::NotANumber {
                        id: variable.id().clone(),
                        value,
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> RawSegment {
        RawSegment::Literal(s.to_string())
    }

    fn var(s: &str) -> RawSegment {
        RawSegment::Reference(s.to_string())
    }

    #[test]
    fn test_scan_references() {
        assert_eq!(
            scan("You owe %bank.debt% coins, %name%!"),
            vec![lit("You owe "), var("bank.debt"), lit(" coins, "), var("name"), lit("!")]
        );
    }

    #[test]
    fn test_scan_literal_percent() {
        assert_eq!(scan("100%% sure"), vec![lit("100% sure")]);
        assert_eq!(scan("50% off and 20% more"), vec![lit("50% off and 20% more")]);
        assert_eq!(scan("trailing %"), vec![lit("trailing %")]);
    }

    #[test]
    fn test_scan_plain_text() {
        assert_eq!(scan("hello"), vec![lit("hello")]);
        assert!(scan("").is_empty());
    }
}
