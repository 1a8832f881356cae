//! Component Registry
//!
//! Maps instruction keywords to factories for each component kind, plus the
//! named conversation IO strategies. Built once at startup, then shared
//! read-only by every package load.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::component::{
    Condition, DynObjective, Event, EventDef, Objective, ObjectiveDef, Variable, conditions,
    events, objectives, variables,
};
use crate::conversation::{self, ConversationIo};
use crate::error::{ConstructionError, RegistryError};
use crate::id::{DefinitionKind, PlayerId};
use crate::instruction::Instruction;
use crate::package::Resolver;
use crate::world::{Integrations, Renderer};

pub type ConditionFactory = Arc<
    dyn Fn(&mut Instruction, &mut Resolver<'_>) -> Result<Box<dyn Condition>, ConstructionError>
        + Send
        + Sync,
>;

pub type EventFactory = Arc<
    dyn Fn(&mut Instruction, &mut Resolver<'_>) -> Result<Box<dyn Event>, ConstructionError>
        + Send
        + Sync,
>;

pub type VariableFactory = Arc<
    dyn Fn(&mut Instruction, &mut Resolver<'_>) -> Result<Box<dyn Variable>, ConstructionError>
        + Send
        + Sync,
>;

type ObjectiveFactory = Arc<
    dyn Fn(&mut Instruction, &mut Resolver<'_>) -> Result<Box<dyn DynObjective>, ConstructionError>
        + Send
        + Sync,
>;

/// Creates a fresh IO strategy for one conversation session
pub type IoFactory =
    Arc<dyn Fn(PlayerId, Arc<dyn Renderer>) -> Box<dyn ConversationIo> + Send + Sync>;

#[derive(Default)]
pub struct ComponentRegistry {
    conditions: HashMap<String, ConditionFactory>,
    events: HashMap<String, EventFactory>,
    objectives: HashMap<String, ObjectiveFactory>,
    variables: HashMap<String, VariableFactory>,
    ios: HashMap<String, IoFactory>,
}

impl ComponentRegistry {
    /// Empty registry, for hosts that only want their own types
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in keyword and IO strategy
    ///
    /// Keywords backed by an integration that is not present are still
    /// registered, but fail construction with a feature-unavailable error.
    pub fn with_builtins(integrations: &Integrations) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        conditions::register(&mut registry, integrations)?;
        events::register(&mut registry, integrations)?;
        objectives::register(&mut registry)?;
        variables::register(&mut registry, integrations)?;
        conversation::io::register(&mut registry)?;
        Ok(registry)
    }

    pub fn register_condition<C, F>(&mut self, keyword: &str, factory: F) -> Result<(), RegistryError>
    where
        C: Condition + 'static,
        F: Fn(&mut Instruction, &mut Resolver<'_>) -> Result<C, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        let factory: ConditionFactory = Arc::new(
            move |instruction: &mut Instruction,
                  resolver: &mut Resolver<'_>|
                  -> Result<Box<dyn Condition>, ConstructionError> {
                Ok(Box::new(factory(instruction, resolver)?))
            },
        );
        insert_unique(&mut self.conditions, DefinitionKind::Condition, keyword, factory)
    }

    pub fn register_event<E, F>(&mut self, keyword: &str, factory: F) -> Result<(), RegistryError>
    where
        E: Event + 'static,
        F: Fn(&mut Instruction, &mut Resolver<'_>) -> Result<E, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        let factory: EventFactory = Arc::new(
            move |instruction: &mut Instruction,
                  resolver: &mut Resolver<'_>|
                  -> Result<Box<dyn Event>, ConstructionError> {
                Ok(Box::new(factory(instruction, resolver)?))
            },
        );
        insert_unique(&mut self.events, DefinitionKind::Event, keyword, factory)
    }

    pub fn register_objective<O, F>(&mut self, keyword: &str, factory: F) -> Result<(), RegistryError>
    where
        O: Objective + 'static,
        F: Fn(&mut Instruction, &mut Resolver<'_>) -> Result<O, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        let factory: ObjectiveFactory = Arc::new(
            move |instruction: &mut Instruction,
                  resolver: &mut Resolver<'_>|
                  -> Result<Box<dyn DynObjective>, ConstructionError> {
                Ok(Box::new(factory(instruction, resolver)?))
            },
        );
        insert_unique(&mut self.objectives, DefinitionKind::Objective, keyword, factory)
    }

    pub fn register_variable<V, F>(&mut self, keyword: &str, factory: F) -> Result<(), RegistryError>
    where
        V: Variable + 'static,
        F: Fn(&mut Instruction, &mut Resolver<'_>) -> Result<V, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        let factory: VariableFactory = Arc::new(
            move |instruction: &mut Instruction,
                  resolver: &mut Resolver<'_>|
                  -> Result<Box<dyn Variable>, ConstructionError> {
                Ok(Box::new(factory(instruction, resolver)?))
            },
        );
        insert_unique(&mut self.variables, DefinitionKind::Variable, keyword, factory)
    }

    /// Register a keyword whose provider is missing on this server
    pub fn register_unavailable(
        &mut self,
        kind: DefinitionKind,
        keyword: &str,
        feature: &'static str,
    ) -> Result<(), RegistryError> {
        match kind {
            DefinitionKind::Condition => {
                let factory: ConditionFactory = Arc::new(
                    move |_: &mut Instruction,
                          _: &mut Resolver<'_>|
                          -> Result<Box<dyn Condition>, ConstructionError> {
                        Err(ConstructionError::FeatureUnavailable(feature))
                    },
                );
                insert_unique(&mut self.conditions, kind, keyword, factory)
            }
            DefinitionKind::Event => {
                let factory: EventFactory = Arc::new(
                    move |_: &mut Instruction,
                          _: &mut Resolver<'_>|
                          -> Result<Box<dyn Event>, ConstructionError> {
                        Err(ConstructionError::FeatureUnavailable(feature))
                    },
                );
                insert_unique(&mut self.events, kind, keyword, factory)
            }
            DefinitionKind::Objective => {
                let factory: ObjectiveFactory = Arc::new(
                    move |_: &mut Instruction,
                          _: &mut Resolver<'_>|
                          -> Result<Box<dyn DynObjective>, ConstructionError> {
                        Err(ConstructionError::FeatureUnavailable(feature))
                    },
                );
                insert_unique(&mut self.objectives, kind, keyword, factory)
            }
            DefinitionKind::Variable => {
                let factory: VariableFactory = Arc::new(
                    move |_: &mut Instruction,
                          _: &mut Resolver<'_>|
                          -> Result<Box<dyn Variable>, ConstructionError> {
                        Err(ConstructionError::FeatureUnavailable(feature))
                    },
                );
                insert_unique(&mut self.variables, kind, keyword, factory)
            }
            DefinitionKind::Item | DefinitionKind::Conversation => Ok(()),
        }
    }

    pub fn register_io<F>(&mut self, name: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(PlayerId, Arc<dyn Renderer>) -> Box<dyn ConversationIo> + Send + Sync + 'static,
    {
        let key = name.to_ascii_lowercase();
        if self.ios.contains_key(&key) {
            return Err(RegistryError::DuplicateIo(key));
        }
        self.ios.insert(key, Arc::new(factory));
        Ok(())
    }

    pub fn io(&self, name: &str) -> Option<&IoFactory> {
        self.ios.get(&name.to_ascii_lowercase())
    }

    pub fn has_keyword(&self, kind: DefinitionKind, keyword: &str) -> bool {
        match kind {
            DefinitionKind::Condition => self.conditions.contains_key(keyword),
            DefinitionKind::Event => self.events.contains_key(keyword),
            DefinitionKind::Objective => self.objectives.contains_key(keyword),
            DefinitionKind::Variable => self.variables.contains_key(keyword),
            DefinitionKind::Item | DefinitionKind::Conversation => false,
        }
    }

    /// Build a condition. Each call yields an independent instance.
    pub fn condition(
        &self,
        instruction: &mut Instruction,
        resolver: &mut Resolver<'_>,
    ) -> Result<Box<dyn Condition>, ConstructionError> {
        let factory = lookup(&self.conditions, DefinitionKind::Condition, instruction)?;
        let condition = factory(instruction, resolver)?;
        warn_unconsumed(instruction);
        Ok(condition)
    }

    /// Build an event together with its `conditions:` gate
    pub fn event(
        &self,
        instruction: &mut Instruction,
        resolver: &mut Resolver<'_>,
    ) -> Result<EventDef, ConstructionError> {
        let factory = lookup(&self.events, DefinitionKind::Event, instruction)?;
        let package = instruction.package().to_string();
        let conditions = resolver.conditions(&instruction.optional_list("conditions"), &package)?;
        let event = factory(instruction, resolver)?;
        warn_unconsumed(instruction);
        Ok(EventDef { event, conditions })
    }

    /// Build an objective together with its `conditions:` and `events:`
    pub fn objective(
        &self,
        instruction: &mut Instruction,
        resolver: &mut Resolver<'_>,
    ) -> Result<ObjectiveDef, ConstructionError> {
        let factory = lookup(&self.objectives, DefinitionKind::Objective, instruction)?;
        let package = instruction.package().to_string();
        let conditions = resolver.conditions(&instruction.optional_list("conditions"), &package)?;
        let events = resolver.events(&instruction.optional_list("events"), &package)?;
        let kind = factory(instruction, resolver)?;
        warn_unconsumed(instruction);
        Ok(ObjectiveDef {
            id: instruction.origin().clone(),
            kind,
            conditions,
            events,
        })
    }

    pub fn variable(
        &self,
        instruction: &mut Instruction,
        resolver: &mut Resolver<'_>,
    ) -> Result<Box<dyn Variable>, ConstructionError> {
        let factory = lookup(&self.variables, DefinitionKind::Variable, instruction)?;
        let variable = factory(instruction, resolver)?;
        warn_unconsumed(instruction);
        Ok(variable)
    }
}

fn insert_unique<T>(
    map: &mut HashMap<String, T>,
    kind: DefinitionKind,
    keyword: &str,
    factory: T,
) -> Result<(), RegistryError> {
    if map.contains_key(keyword) {
        return Err(RegistryError::Duplicate {
            kind,
            keyword: keyword.to_string(),
        });
    }
    map.insert(keyword.to_string(), factory);
    Ok(())
}

/// Factory registered for the instruction's keyword
fn lookup<T: Clone>(
    map: &HashMap<String, T>,
    kind: DefinitionKind,
    instruction: &Instruction,
) -> Result<T, ConstructionError> {
    map.get(instruction.keyword())
        .cloned()
        .ok_or_else(|| ConstructionError::UnknownKeyword {
            kind,
            keyword: instruction.keyword().to_string(),
        })
}

fn warn_unconsumed(instruction: &Instruction) {
    let leftover = instruction.unconsumed();
    if !leftover.is_empty() {
        warn!(
            "'{}' ignores extra arguments: {}",
            instruction.origin(),
            leftover.join(" ")
        );
    }
}
