//! Identifier resolution and lazy construction
//!
//! Definitions are built on first reference and memoized, so a component that
//! refers to another gets the shared instance. Definitions currently being
//! built form a stack; meeting one of them again is a reference cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use super::{Diagnostic, PackageSources};
use crate::component::{
    Condition, ConditionHandle, EventDef, EventHandle, ObjectiveDef, Variable, VariableHandle,
};
use crate::conversation::{self, ConversationDef};
use crate::error::{ConstructionError, NotFoundReason, ObjectNotFoundError, ParseErrorKind};
use crate::id::{DefinitionKind, ObjectId};
use crate::instruction::Instruction;
use crate::registry::ComponentRegistry;
use crate::text::{RawSegment, Text, VarNum, scan};
use crate::world::ItemTemplate;

/// Everything constructed during one package load
#[derive(Default)]
pub(crate) struct Built {
    pub conditions: HashMap<ObjectId, Arc<dyn Condition>>,
    pub events: HashMap<ObjectId, Arc<EventDef>>,
    pub objectives: HashMap<ObjectId, Arc<ObjectiveDef>>,
    pub variables: HashMap<ObjectId, Arc<dyn Variable>>,
    pub items: HashMap<ObjectId, Arc<ItemTemplate>>,
    pub conversations: HashMap<ObjectId, Arc<ConversationDef>>,
}

/// Result of a finished load
pub(crate) struct Resolved {
    pub built: Built,
    pub broken: HashSet<(DefinitionKind, ObjectId)>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Resolver<'a> {
    registry: &'a ComponentRegistry,
    sources: &'a PackageSources,
    built: Built,
    broken: HashSet<(DefinitionKind, ObjectId)>,
    in_progress: Vec<(DefinitionKind, ObjectId)>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a ComponentRegistry, sources: &'a PackageSources) -> Self {
        Self {
            registry,
            sources,
            built: Built::default(),
            broken: HashSet::new(),
            in_progress: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn registry(&self) -> &'a ComponentRegistry {
        self.registry
    }

    pub(crate) fn finish(self) -> Resolved {
        Resolved {
            built: self.built,
            broken: self.broken,
            diagnostics: self.diagnostics,
        }
    }

    /// Validate that `raw` names a definition of `kind` without building it
    pub fn locate(
        &self,
        raw: &str,
        kind: DefinitionKind,
        current_package: &str,
    ) -> Result<ObjectId, ObjectNotFoundError> {
        self.sources.locate(raw, kind, current_package)
    }

    /// Build a definition if it has not been built yet
    pub(crate) fn ensure(&mut self, kind: DefinitionKind, id: &ObjectId) -> Result<(), ObjectNotFoundError> {
        match kind {
            DefinitionKind::Condition => self.build_condition(id).map(drop),
            DefinitionKind::Event => self.build_event(id).map(drop),
            DefinitionKind::Objective => self.build_objective(id).map(drop),
            DefinitionKind::Variable => self.build_variable(id).map(drop),
            DefinitionKind::Item => self.build_item(id).map(drop),
            DefinitionKind::Conversation => self.build_conversation(id).map(drop),
        }
    }

    /// Resolve a condition reference, honoring a leading `!`
    pub fn condition(
        &mut self,
        raw: &str,
        current_package: &str,
    ) -> Result<ConditionHandle, ObjectNotFoundError> {
        let (negated, raw) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let id = self.locate(raw, DefinitionKind::Condition, current_package)?;
        let handle = ConditionHandle::new(id.clone(), self.build_condition(&id)?);
        Ok(if negated { handle.negate() } else { handle })
    }

    pub fn conditions(
        &mut self,
        raws: &[String],
        current_package: &str,
    ) -> Result<Vec<ConditionHandle>, ObjectNotFoundError> {
        raws.iter()
            .map(|raw| self.condition(raw, current_package))
            .collect()
    }

    pub fn event(&mut self, raw: &str, current_package: &str) -> Result<EventHandle, ObjectNotFoundError> {
        let id = self.locate(raw, DefinitionKind::Event, current_package)?;
        let event = self.build_event(&id)?;
        Ok(EventHandle::new(id, event))
    }

    pub fn events(
        &mut self,
        raws: &[String],
        current_package: &str,
    ) -> Result<Vec<EventHandle>, ObjectNotFoundError> {
        raws.iter()
            .map(|raw| self.event(raw, current_package))
            .collect()
    }

    pub fn variable(
        &mut self,
        raw: &str,
        current_package: &str,
    ) -> Result<VariableHandle, ObjectNotFoundError> {
        let id = self.locate(raw, DefinitionKind::Variable, current_package)?;
        let variable = self.build_variable(&id)?;
        Ok(VariableHandle::new(id, variable))
    }

    pub fn item(&mut self, raw: &str, current_package: &str) -> Result<Arc<ItemTemplate>, ObjectNotFoundError> {
        let id = self.locate(raw, DefinitionKind::Item, current_package)?;
        self.build_item(&id)
    }

    /// Objectives refer to each other freely (chains start the next one on
    /// completion), so references are only validated here.
    pub fn objective(&self, raw: &str, current_package: &str) -> Result<ObjectId, ObjectNotFoundError> {
        self.locate(raw, DefinitionKind::Objective, current_package)
    }

    /// Resolve every `%name%` reference in a piece of text
    pub fn text(&mut self, raw: &str, current_package: &str) -> Result<Text, ObjectNotFoundError> {
        let mut text = Text::new();
        for segment in scan(raw) {
            match segment {
                RawSegment::Literal(literal) => text.push_literal(literal),
                RawSegment::Reference(name) => {
                    text.push_variable(self.variable(&name, current_package)?);
                }
            }
        }
        Ok(text)
    }

    /// Next token as a number or a `%variable%`
    pub fn next_var_num(&mut self, instruction: &mut Instruction) -> Result<VarNum, ConstructionError> {
        let token = instruction.next()?;
        if let Some(name) = token
            .strip_prefix('%')
            .and_then(|t| t.strip_suffix('%'))
            .filter(|name| !name.is_empty())
        {
            let package = instruction.package().to_string();
            return Ok(VarNum::Variable(self.variable(name, &package)?));
        }
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(VarNum::Constant)
            .ok_or_else(|| {
                instruction
                    .error_here(ParseErrorKind::InvalidNumber {
                        token,
                        expected: "number or %variable%",
                    })
                    .into()
            })
    }

    /// Next token as a comma separated `item[:amount]` list
    pub fn next_items(
        &mut self,
        instruction: &mut Instruction,
    ) -> Result<Vec<(Arc<ItemTemplate>, u32)>, ConstructionError> {
        let entries = instruction.next_list()?;
        if entries.is_empty() {
            return Err(instruction.error_here(ParseErrorKind::MissingArgument).into());
        }
        let package = instruction.package().to_string();
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let (name, amount) = match entry.split_once(':') {
                Some((name, amount)) => {
                    let amount = amount.parse::<u32>().ok().filter(|a| *a > 0).ok_or_else(|| {
                        instruction.error_here(ParseErrorKind::InvalidNumber {
                            token: amount.to_string(),
                            expected: "positive item amount",
                        })
                    })?;
                    (name, amount)
                }
                None => (entry.as_str(), 1),
            };
            items.push((self.item(name, &package)?, amount));
        }
        Ok(items)
    }

    fn build_condition(&mut self, id: &ObjectId) -> Result<Arc<dyn Condition>, ObjectNotFoundError> {
        if let Some(condition) = self.built.conditions.get(id) {
            return Ok(condition.clone());
        }
        let registry = self.registry;
        let condition: Arc<dyn Condition> =
            self.construct(DefinitionKind::Condition, id, |instruction, resolver| {
                registry.condition(instruction, resolver).map(Arc::from)
            })?;
        self.built.conditions.insert(id.clone(), condition.clone());
        Ok(condition)
    }

    fn build_event(&mut self, id: &ObjectId) -> Result<Arc<EventDef>, ObjectNotFoundError> {
        if let Some(event) = self.built.events.get(id) {
            return Ok(event.clone());
        }
        let registry = self.registry;
        let event = self.construct(DefinitionKind::Event, id, |instruction, resolver| {
            registry.event(instruction, resolver).map(Arc::new)
        })?;
        self.built.events.insert(id.clone(), event.clone());
        Ok(event)
    }

    fn build_objective(&mut self, id: &ObjectId) -> Result<Arc<ObjectiveDef>, ObjectNotFoundError> {
        if let Some(objective) = self.built.objectives.get(id) {
            return Ok(objective.clone());
        }
        let registry = self.registry;
        let objective = self.construct(DefinitionKind::Objective, id, |instruction, resolver| {
            registry.objective(instruction, resolver).map(Arc::new)
        })?;
        self.built.objectives.insert(id.clone(), objective.clone());
        Ok(objective)
    }

    fn build_variable(&mut self, id: &ObjectId) -> Result<Arc<dyn Variable>, ObjectNotFoundError> {
        if let Some(variable) = self.built.variables.get(id) {
            return Ok(variable.clone());
        }
        let registry = self.registry;
        let variable: Arc<dyn Variable> =
            self.construct(DefinitionKind::Variable, id, |instruction, resolver| {
                registry.variable(instruction, resolver).map(Arc::from)
            })?;
        self.built.variables.insert(id.clone(), variable.clone());
        Ok(variable)
    }

    fn build_item(&mut self, id: &ObjectId) -> Result<Arc<ItemTemplate>, ObjectNotFoundError> {
        if let Some(item) = self.built.items.get(id) {
            return Ok(item.clone());
        }
        let item = self.construct(DefinitionKind::Item, id, |instruction, _| {
            let name = instruction.optional("name").map(|n| n.replace('_', " "));
            Ok(Arc::new(ItemTemplate {
                material: instruction.keyword().to_ascii_lowercase(),
                name,
            }))
        })?;
        self.built.items.insert(id.clone(), item.clone());
        Ok(item)
    }

    fn build_conversation(&mut self, id: &ObjectId) -> Result<Arc<ConversationDef>, ObjectNotFoundError> {
        if let Some(conversation) = self.built.conversations.get(id) {
            return Ok(conversation.clone());
        }
        self.enter(DefinitionKind::Conversation, id)?;
        let sources = self.sources;
        let raw = sources.conversation(id).ok_or_else(|| {
            ObjectNotFoundError::new(id.clone(), DefinitionKind::Conversation, NotFoundReason::UnknownName)
        })?;

        self.in_progress.push((DefinitionKind::Conversation, id.clone()));
        let result = conversation::compile(id, raw, self);
        self.in_progress.pop();

        match result {
            Ok(conversation) => {
                let conversation = Arc::new(conversation);
                self.built.conversations.insert(id.clone(), conversation.clone());
                Ok(conversation)
            }
            Err(e) => Err(self.fail(DefinitionKind::Conversation, id, None, e)),
        }
    }

    /// Parse the definition's instruction line and run `build` on it
    fn construct<T>(
        &mut self,
        kind: DefinitionKind,
        id: &ObjectId,
        build: impl FnOnce(&mut Instruction, &mut Resolver<'a>) -> Result<T, ConstructionError>,
    ) -> Result<T, ObjectNotFoundError> {
        self.enter(kind, id)?;
        let sources = self.sources;
        let line = sources
            .line(kind, id)
            .ok_or_else(|| ObjectNotFoundError::new(id.clone(), kind, NotFoundReason::UnknownName))?;

        self.in_progress.push((kind, id.clone()));
        let result = Instruction::parse(id.clone(), line)
            .map_err(ConstructionError::from)
            .and_then(|mut instruction| build(&mut instruction, self));
        self.in_progress.pop();

        result.map_err(|e| self.fail(kind, id, Some(line), e))
    }

    /// Refuse definitions that already failed or are being built right now
    fn enter(&self, kind: DefinitionKind, id: &ObjectId) -> Result<(), ObjectNotFoundError> {
        if self.broken.contains(&(kind, id.clone())) {
            return Err(ObjectNotFoundError::new(id.clone(), kind, NotFoundReason::Broken));
        }
        if let Some(start) = self
            .in_progress
            .iter()
            .position(|(k, i)| *k == kind && i == id)
        {
            let mut path: Vec<ObjectId> = self.in_progress[start..]
                .iter()
                .map(|(_, i)| i.clone())
                .collect();
            path.push(id.clone());
            return Err(ObjectNotFoundError::new(id.clone(), kind, NotFoundReason::Cycle(path)));
        }
        Ok(())
    }

    /// Record a failed definition. Referrers see it as broken, except that a
    /// cycle is passed on unchanged so every member reports the whole path.
    fn fail(
        &mut self,
        kind: DefinitionKind,
        id: &ObjectId,
        line: Option<&str>,
        error: ConstructionError,
    ) -> ObjectNotFoundError {
        match line {
            Some(line) => warn!(
                package = id.package(),
                "Failed to load {} '{}' ({}): {}",
                kind,
                id,
                line,
                error
            ),
            None => warn!(package = id.package(), "Failed to load {} '{}': {}", kind, id, error),
        }
        self.broken.insert((kind, id.clone()));
        self.diagnostics.push(Diagnostic {
            kind,
            id: id.clone(),
            line: line.map(str::to_string),
            message: error.to_string(),
        });

        match error {
            ConstructionError::NotFound(e) if matches!(e.reason, NotFoundReason::Cycle(_)) => e,
            _ => ObjectNotFoundError::new(id.clone(), kind, NotFoundReason::Broken),
        }
    }
}
