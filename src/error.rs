//! Error types
//!
//! Load-time failures (`ParseError`, `ObjectNotFoundError`,
//! `ConstructionError`) reject a single definition. `EvaluationError` happens
//! during live play and is always recovered where it occurs.

use std::path::PathBuf;

use thiserror::Error;

use crate::id::{DefinitionKind, ObjectId, PlayerId};

/// What went wrong while reading an instruction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("missing argument")]
    MissingArgument,

    #[error("'{token}' is not a valid {expected}")]
    InvalidNumber { token: String, expected: &'static str },

    #[error("unknown value '{token}', allowed are: {}", .allowed.join(", "))]
    InvalidEnum {
        token: String,
        allowed: Vec<&'static str>,
    },

    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("escape character at end of line")]
    DanglingEscape,

    #[error("invalid location '{token}': {reason}")]
    InvalidLocation { token: String, reason: &'static str },

    #[error("{0}")]
    Invalid(String),
}

/// Malformed instruction, with the offending token index
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{origin} (token {index}): {kind}")]
pub struct ParseError {
    /// Definition the instruction belongs to
    pub origin: ObjectId,
    /// Index of the offending token, counting the keyword as 0
    pub index: usize,
    pub kind: ParseErrorKind,
}

/// Why an identifier did not resolve
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundReason {
    #[error("package does not exist")]
    UnknownPackage,

    #[error("no such definition")]
    UnknownName,

    #[error("the name belongs to a {0}")]
    WrongKind(DefinitionKind),

    #[error("reference cycle {}", format_cycle(.0))]
    Cycle(Vec<ObjectId>),

    #[error("the definition failed to load")]
    Broken,
}

fn format_cycle(path: &[ObjectId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// An identifier that does not resolve to a definition of the expected kind
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} '{id}' not found: {reason}")]
pub struct ObjectNotFoundError {
    pub id: ObjectId,
    pub kind: DefinitionKind,
    pub reason: NotFoundReason,
}

impl ObjectNotFoundError {
    pub fn new(id: ObjectId, kind: DefinitionKind, reason: NotFoundReason) -> Self {
        Self { id, kind, reason }
    }
}

/// Failure to build a component from its instruction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    #[error("unknown {kind} type '{keyword}'")]
    UnknownKeyword {
        kind: DefinitionKind,
        keyword: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    NotFound(#[from] ObjectNotFoundError),

    #[error("{0}")]
    Invalid(String),

    #[error("{0} integration is not available")]
    FeatureUnavailable(&'static str),
}

/// Domain failure while a component runs for a player
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("player '{0}' is offline")]
    PlayerOffline(PlayerId),

    #[error("{0} integration is not available")]
    FeatureUnavailable(&'static str),

    #[error("variable '{id}' resolved to '{value}', which is not a number")]
    NotANumber { id: ObjectId, value: String },

    #[error(transparent)]
    NotFound(#[from] ObjectNotFoundError),

    #[error("world error: {0}")]
    World(String),
}

/// Configuration error when wiring component types at startup
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("{kind} type '{keyword}' is already registered")]
    Duplicate {
        kind: DefinitionKind,
        keyword: String,
    },

    #[error("conversation IO '{0}' is already registered")]
    DuplicateIo(String),
}

/// Reading packages or configuration from disk
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("package '{name}' is defined twice ({path:?})")]
    DuplicatePackage { name: String, path: PathBuf },
}

/// Persistence backend failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("progress record encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted progress record: {0}")]
    Corrupted(String),
}

/// Rejected objective operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectiveError {
    #[error("objective '{objective}' is already active for player '{player}'")]
    AlreadyActive { player: PlayerId, objective: ObjectId },

    #[error("objective '{objective}' is not active for player '{player}'")]
    NotActive { player: PlayerId, objective: ObjectId },

    #[error(transparent)]
    NotFound(#[from] ObjectNotFoundError),
}

/// Rejected conversation operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversationError {
    #[error("player '{0}' is already in a conversation")]
    AlreadyActive(PlayerId),

    #[error("player '{0}' is not in a conversation")]
    NoSession(PlayerId),

    #[error("player '{0}' is already resolving a choice")]
    Busy(PlayerId),

    #[error("invalid option index {index}, {available} options are offered")]
    InvalidSelection { index: usize, available: usize },

    #[error("conversation IO '{0}' is not registered")]
    UnknownIo(String),

    #[error(transparent)]
    NotFound(#[from] ObjectNotFoundError),
}

/// Top-level error of the host binary
#[derive(Debug, Error)]
pub enum QuestError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
