//! Package Definition Structures
//!
//! These structures are deserialized from TOML package files. Every section
//! except conversations maps a local name to an instruction line.

use std::collections::HashMap;

use serde::Deserialize;

use crate::id::DefinitionKind;

/// One package file as it appears on disk
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPackage {
    #[serde(default)]
    pub conditions: HashMap<String, String>,
    #[serde(default)]
    pub events: HashMap<String, String>,
    #[serde(default)]
    pub objectives: HashMap<String, String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub items: HashMap<String, String>,
    #[serde(default)]
    pub conversations: HashMap<String, RawConversation>,
}

impl RawPackage {
    /// Instruction lines for a kind; `None` for conversations
    pub fn section(&self, kind: DefinitionKind) -> Option<&HashMap<String, String>> {
        match kind {
            DefinitionKind::Condition => Some(&self.conditions),
            DefinitionKind::Event => Some(&self.events),
            DefinitionKind::Objective => Some(&self.objectives),
            DefinitionKind::Variable => Some(&self.variables),
            DefinitionKind::Item => Some(&self.items),
            DefinitionKind::Conversation => None,
        }
    }

    pub fn declares(&self, kind: DefinitionKind, name: &str) -> bool {
        match self.section(kind) {
            Some(section) => section.contains_key(name),
            None => self.conversations.contains_key(name),
        }
    }

    /// Merge another file of the same package into this one.
    /// Returns the names that were declared twice; the later file wins.
    pub fn merge(&mut self, other: RawPackage) -> Vec<(DefinitionKind, String)> {
        let mut duplicates = Vec::new();
        let sections = [
            (DefinitionKind::Condition, &mut self.conditions, other.conditions),
            (DefinitionKind::Event, &mut self.events, other.events),
            (DefinitionKind::Objective, &mut self.objectives, other.objectives),
            (DefinitionKind::Variable, &mut self.variables, other.variables),
            (DefinitionKind::Item, &mut self.items, other.items),
        ];
        for (kind, target, source) in sections {
            for (name, line) in source {
                if target.insert(name.clone(), line).is_some() {
                    duplicates.push((kind, name));
                }
            }
        }
        for (name, conversation) in other.conversations {
            if self.conversations.insert(name.clone(), conversation).is_some() {
                duplicates.push((DefinitionKind::Conversation, name));
            }
        }
        duplicates
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
            + self.events.len()
            + self.objectives.len()
            + self.variables.len()
            + self.items.len()
            + self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Conversation graph as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConversation {
    /// Display name of the NPC, may contain variables
    pub quester: String,
    /// NPC options tried in order when the conversation starts
    pub first: Vec<String>,
    /// Rendering strategy, falls back to the configured default
    pub io: Option<String>,
    #[serde(default)]
    pub final_events: Vec<String>,
    #[serde(default)]
    pub npc_options: HashMap<String, RawOption>,
    #[serde(default)]
    pub player_options: HashMap<String, RawOption>,
}

/// One NPC line or player reply
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawOption {
    pub text: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub pointers: Vec<String>,
}
