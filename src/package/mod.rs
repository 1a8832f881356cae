//! Quest Packages
//!
//! A package is a named collection of definitions. Packages are read from
//! disk into [`PackageSources`], then compiled into an immutable
//! [`PackageSet`] that the runtime swaps wholesale on reload.

mod definition;
mod loader;
mod resolver;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::component::{ConditionHandle, EventHandle, ObjectiveDef, VariableHandle};
use crate::conversation::ConversationDef;
use crate::error::{NotFoundReason, ObjectNotFoundError};
use crate::id::{DefinitionKind, ObjectId};
use crate::registry::ComponentRegistry;
use crate::world::ItemTemplate;

pub use definition::{RawConversation, RawOption, RawPackage};
pub use loader::{HotReloadEvent, PackageLoader};
pub use resolver::Resolver;

use resolver::Built;

/// Raw definitions of every package, keyed by package name
#[derive(Debug, Clone, Default)]
pub struct PackageSources {
    packages: BTreeMap<String, RawPackage>,
}

impl PackageSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or merge a package; returns names declared twice
    pub fn insert(&mut self, name: &str, raw: RawPackage) -> Vec<(DefinitionKind, String)> {
        match self.packages.get_mut(name) {
            Some(existing) => existing.merge(raw),
            None => {
                self.packages.insert(name.to_string(), raw);
                Vec::new()
            }
        }
    }

    pub fn get(&self, package: &str) -> Option<&RawPackage> {
        self.packages.get(package)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Qualify `raw` and check it names a definition of `kind`
    pub fn locate(
        &self,
        raw: &str,
        kind: DefinitionKind,
        current_package: &str,
    ) -> Result<ObjectId, ObjectNotFoundError> {
        let id = ObjectId::qualify(raw, current_package);
        self.check(&id, kind)?;
        Ok(id)
    }

    /// Check that a qualified identifier names a definition of `kind`
    pub fn check(&self, id: &ObjectId, kind: DefinitionKind) -> Result<(), ObjectNotFoundError> {
        let Some(package) = self.packages.get(id.package()) else {
            return Err(ObjectNotFoundError::new(id.clone(), kind, NotFoundReason::UnknownPackage));
        };
        if package.declares(kind, id.name()) {
            return Ok(());
        }
        let reason = DefinitionKind::ALL
            .into_iter()
            .find(|other| *other != kind && package.declares(*other, id.name()))
            .map(NotFoundReason::WrongKind)
            .unwrap_or(NotFoundReason::UnknownName);
        Err(ObjectNotFoundError::new(id.clone(), kind, reason))
    }

    /// Instruction line of a definition
    pub fn line(&self, kind: DefinitionKind, id: &ObjectId) -> Option<&str> {
        self.packages
            .get(id.package())?
            .section(kind)?
            .get(id.name())
            .map(String::as_str)
    }

    pub fn conversation(&self, id: &ObjectId) -> Option<&RawConversation> {
        self.packages.get(id.package())?.conversations.get(id.name())
    }
}

/// A definition that failed to load
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DefinitionKind,
    pub id: ObjectId,
    /// Instruction line, absent for conversations
    pub line: Option<String>,
    pub message: String,
}

/// A resolved reference of any kind
#[derive(Clone)]
pub enum Handle {
    Condition(ConditionHandle),
    Event(EventHandle),
    Objective(Arc<ObjectiveDef>),
    Variable(VariableHandle),
    Item(Arc<ItemTemplate>),
    Conversation(Arc<ConversationDef>),
}

impl Handle {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Handle::Condition(_) => DefinitionKind::Condition,
            Handle::Event(_) => DefinitionKind::Event,
            Handle::Objective(_) => DefinitionKind::Objective,
            Handle::Variable(_) => DefinitionKind::Variable,
            Handle::Item(_) => DefinitionKind::Item,
            Handle::Conversation(_) => DefinitionKind::Conversation,
        }
    }
}

/// Compiled, immutable set of packages
pub struct PackageSet {
    sources: PackageSources,
    built: Built,
    broken: HashSet<(DefinitionKind, ObjectId)>,
    diagnostics: Vec<Diagnostic>,
}

impl PackageSet {
    pub fn empty() -> Self {
        Self {
            sources: PackageSources::new(),
            built: Built::default(),
            broken: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Build every definition of every package. A definition that fails is
    /// recorded as a diagnostic and skipped; the rest still load.
    pub fn compile(sources: PackageSources, registry: &ComponentRegistry) -> Self {
        let mut resolver = Resolver::new(registry, &sources);

        for package in sources.names() {
            let Some(raw) = sources.get(package) else {
                continue;
            };
            for kind in [
                DefinitionKind::Variable,
                DefinitionKind::Item,
                DefinitionKind::Condition,
                DefinitionKind::Event,
                DefinitionKind::Objective,
            ] {
                let mut names: Vec<&String> = raw.section(kind).into_iter().flat_map(|s| s.keys()).collect();
                names.sort();
                for name in names {
                    // Failures are already recorded by the resolver
                    let _ = resolver.ensure(kind, &ObjectId::new(package, name));
                }
            }
            let mut conversations: Vec<&String> = raw.conversations.keys().collect();
            conversations.sort();
            for name in conversations {
                let _ = resolver.ensure(DefinitionKind::Conversation, &ObjectId::new(package, name));
            }
        }

        let resolved = resolver.finish();
        let set = Self {
            sources,
            built: resolved.built,
            broken: resolved.broken,
            diagnostics: resolved.diagnostics,
        };
        info!(
            "Compiled {} packages: {} conditions, {} events, {} objectives, {} variables, {} items, {} conversations ({} failed)",
            set.sources.len(),
            set.built.conditions.len(),
            set.built.events.len(),
            set.built.objectives.len(),
            set.built.variables.len(),
            set.built.items.len(),
            set.built.conversations.len(),
            set.diagnostics.len()
        );
        set
    }

    pub fn sources(&self) -> &PackageSources {
        &self.sources
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_broken(&self, kind: DefinitionKind, id: &ObjectId) -> bool {
        self.broken.contains(&(kind, id.clone()))
    }

    /// Resolve `[package.]name` written in `current_package`
    pub fn resolve(
        &self,
        raw: &str,
        kind: DefinitionKind,
        current_package: &str,
    ) -> Result<Handle, ObjectNotFoundError> {
        let (negated, raw) = match raw.strip_prefix('!') {
            Some(rest) if kind == DefinitionKind::Condition => (true, rest),
            _ => (false, raw),
        };
        let id = self.sources.locate(raw, kind, current_package)?;
        let handle = match kind {
            DefinitionKind::Condition => self.built.conditions.get(&id).map(|c| {
                let handle = ConditionHandle::new(id.clone(), c.clone());
                Handle::Condition(if negated { handle.negate() } else { handle })
            }),
            DefinitionKind::Event => self
                .built
                .events
                .get(&id)
                .map(|e| Handle::Event(EventHandle::new(id.clone(), e.clone()))),
            DefinitionKind::Objective => self.built.objectives.get(&id).cloned().map(Handle::Objective),
            DefinitionKind::Variable => self
                .built
                .variables
                .get(&id)
                .map(|v| Handle::Variable(VariableHandle::new(id.clone(), v.clone()))),
            DefinitionKind::Item => self.built.items.get(&id).cloned().map(Handle::Item),
            DefinitionKind::Conversation => self
                .built
                .conversations
                .get(&id)
                .cloned()
                .map(Handle::Conversation),
        };
        handle.ok_or_else(|| ObjectNotFoundError::new(id, kind, NotFoundReason::Broken))
    }

    pub fn objective(&self, id: &ObjectId) -> Result<Arc<ObjectiveDef>, ObjectNotFoundError> {
        self.sources.check(id, DefinitionKind::Objective)?;
        self.built.objectives.get(id).cloned().ok_or_else(|| {
            ObjectNotFoundError::new(id.clone(), DefinitionKind::Objective, NotFoundReason::Broken)
        })
    }

    pub fn conversation(&self, id: &ObjectId) -> Result<Arc<ConversationDef>, ObjectNotFoundError> {
        self.sources.check(id, DefinitionKind::Conversation)?;
        self.built.conversations.get(id).cloned().ok_or_else(|| {
            ObjectNotFoundError::new(id.clone(), DefinitionKind::Conversation, NotFoundReason::Broken)
        })
    }

    pub fn has_objective(&self, id: &ObjectId) -> bool {
        self.built.objectives.contains_key(id)
    }

    /// Identifiers of every loaded definition of a kind, sorted
    pub fn ids(&self, kind: DefinitionKind) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = match kind {
            DefinitionKind::Condition => self.built.conditions.keys().cloned().collect(),
            DefinitionKind::Event => self.built.events.keys().cloned().collect(),
            DefinitionKind::Objective => self.built.objectives.keys().cloned().collect(),
            DefinitionKind::Variable => self.built.variables.keys().cloned().collect(),
            DefinitionKind::Item => self.built.items.keys().cloned().collect(),
            DefinitionKind::Conversation => self.built.conversations.keys().cloned().collect(),
        };
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests;
