//! Quest scripting runtime
//!
//! Content authors write quests as packages of one-line instructions. This
//! crate parses them, resolves the references between them and runs them
//! against live per-player state: conditions, events, objectives that track
//! progress across game events, variables, and conversations.

pub mod component;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod id;
pub mod instruction;
pub mod objective;
pub mod package;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod text;
pub mod world;

#[cfg(test)]
mod testing;

pub use error::{
    ConstructionError, EvaluationError, ObjectNotFoundError, ObjectiveError, ParseError, QuestError,
};
pub use id::{DefinitionKind, ObjectId, PlayerId};
pub use runtime::QuestRuntime;
