//! Identifiers
//!
//! Package-qualified names of quest definitions and player identities.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separates the package from the local name in `package.name`
pub const PACKAGE_SEPARATOR: char = '.';

/// Kind of definition an identifier points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitionKind {
    Condition,
    Event,
    Objective,
    Variable,
    Item,
    Conversation,
}

impl DefinitionKind {
    pub const ALL: [DefinitionKind; 6] = [
        DefinitionKind::Condition,
        DefinitionKind::Event,
        DefinitionKind::Objective,
        DefinitionKind::Variable,
        DefinitionKind::Item,
        DefinitionKind::Conversation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Condition => "condition",
            DefinitionKind::Event => "event",
            DefinitionKind::Objective => "objective",
            DefinitionKind::Variable => "variable",
            DefinitionKind::Item => "item",
            DefinitionKind::Conversation => "conversation",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified reference to a definition inside a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    package: Arc<str>,
    name: Arc<str>,
}

impl ObjectId {
    pub fn new(package: &str, name: &str) -> Self {
        Self {
            package: Arc::from(package),
            name: Arc::from(name),
        }
    }

    /// Qualify a raw `[package.]name` against the package it was written in
    pub fn qualify(raw: &str, current_package: &str) -> Self {
        match raw.split_once(PACKAGE_SEPARATOR) {
            Some((package, name)) if !package.is_empty() => Self::new(package, name),
            Some((_, name)) => Self::new(current_package, name),
            None => Self::new(current_package, raw),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.package, PACKAGE_SEPARATOR, self.name)
    }
}

impl FromStr for ObjectId {
    type Err = String;

    /// Only accepts the qualified form; there is no package to default to
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(PACKAGE_SEPARATOR) {
            Some((package, name)) if !package.is_empty() && !name.is_empty() => {
                Ok(Self::new(package, name))
            }
            _ => Err(format!("'{}' is not a package-qualified identifier", s)),
        }
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a player as supplied by the hosting world
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        let local = ObjectId::qualify("sneaking", "town");
        assert_eq!(local.package(), "town");
        assert_eq!(local.name(), "sneaking");

        let foreign = ObjectId::qualify("castle.guard_talk", "town");
        assert_eq!(foreign.package(), "castle");
        assert_eq!(foreign.name(), "guard_talk");
        assert_eq!(foreign.to_string(), "castle.guard_talk");
    }

    #[test]
    fn test_parse_requires_package() {
        assert!("town.sneaking".parse::<ObjectId>().is_ok());
        assert!("sneaking".parse::<ObjectId>().is_err());
        assert!(".sneaking".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = ObjectId::new("town", "hunt");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"town.hunt\"");
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
