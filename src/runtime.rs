//! Quest Runtime
//!
//! The one context object every component receives. Owns the registry, the
//! loaded package set, the world adapters and all per-player state.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::conversation::{ConversationManager, ConversationState};
use crate::error::{
    ConversationError, NotFoundReason, ObjectNotFoundError, ObjectiveError, RegistryError,
};
use crate::id::{DefinitionKind, ObjectId, PlayerId};
use crate::objective::{ObjectiveRecord, ObjectiveStore, PersistHandle, PersistOp};
use crate::package::{Handle, PackageSet, PackageSources};
use crate::registry::ComponentRegistry;
use crate::scheduler::TickScheduler;
use crate::world::{GameEvent, Integrations, Renderer, World};

pub struct QuestRuntime {
    registry: Arc<ComponentRegistry>,
    packages: RwLock<Arc<PackageSet>>,
    world: Arc<dyn World>,
    renderer: Arc<dyn Renderer>,
    integrations: Integrations,
    objectives: ObjectiveStore,
    conversations: ConversationManager,
    scheduler: TickScheduler,
    persistence: Option<PersistHandle>,
    default_io: String,
}

pub struct RuntimeBuilder {
    world: Arc<dyn World>,
    renderer: Arc<dyn Renderer>,
    integrations: Integrations,
    registry: Option<ComponentRegistry>,
    persistence: Option<PersistHandle>,
    default_io: String,
}

impl RuntimeBuilder {
    pub fn integrations(mut self, integrations: Integrations) -> Self {
        self.integrations = integrations;
        self
    }

    /// Use a prepared registry instead of the built-in one
    pub fn registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn persistence(mut self, handle: PersistHandle) -> Self {
        self.persistence = Some(handle);
        self
    }

    /// IO strategy for conversations that do not name one
    pub fn default_io(mut self, name: &str) -> Self {
        self.default_io = name.to_string();
        self
    }

    pub fn build(self) -> Result<QuestRuntime, RegistryError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => ComponentRegistry::with_builtins(&self.integrations)?,
        };
        Ok(QuestRuntime {
            registry: Arc::new(registry),
            packages: RwLock::new(Arc::new(PackageSet::empty())),
            world: self.world,
            renderer: self.renderer,
            integrations: self.integrations,
            objectives: ObjectiveStore::new(),
            conversations: ConversationManager::new(),
            scheduler: TickScheduler::new(),
            persistence: self.persistence,
            default_io: self.default_io,
        })
    }
}

impl QuestRuntime {
    pub fn builder(world: Arc<dyn World>, renderer: Arc<dyn Renderer>) -> RuntimeBuilder {
        RuntimeBuilder {
            world,
            renderer,
            integrations: Integrations::default(),
            registry: None,
            persistence: None,
            default_io: "simple".to_string(),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Snapshot of the current package set
    pub fn packages(&self) -> Arc<PackageSet> {
        self.packages.read().clone()
    }

    pub fn compile(&self, sources: PackageSources) -> PackageSet {
        PackageSet::compile(sources, &self.registry)
    }

    /// Swap in a new package set. Progress of objectives that still exist
    /// is kept; running conversations finish on the definitions they started
    /// with.
    pub fn replace_packages(&self, packages: PackageSet) {
        let packages = Arc::new(packages);
        *self.packages.write() = packages.clone();
        self.objectives.retain_defined(self, &packages);
        info!("Package set replaced");
    }

    pub fn world(&self) -> &dyn World {
        self.world.as_ref()
    }

    pub fn renderer(&self) -> Arc<dyn Renderer> {
        self.renderer.clone()
    }

    pub fn integrations(&self) -> &Integrations {
        &self.integrations
    }

    pub fn objectives(&self) -> &ObjectiveStore {
        &self.objectives
    }

    pub fn conversations(&self) -> &ConversationManager {
        &self.conversations
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn default_io(&self) -> &str {
        &self.default_io
    }

    /// Queue a storage mutation; a no-op without persistence
    pub fn persist(&self, op: PersistOp) {
        if let Some(handle) = &self.persistence {
            handle.send(op);
        }
    }

    /// Advance the clock one tick, running deferred work now due
    pub fn tick(&self) -> usize {
        self.scheduler.advance(self)
    }

    /// Deliver a game event to the player's active objectives
    pub fn dispatch(&self, event: &GameEvent) {
        self.objectives.dispatch(self, event);
    }

    pub fn restore(&self, records: Vec<ObjectiveRecord>) -> usize {
        self.objectives.restore(self, records)
    }

    pub fn start_objective(&self, player: &PlayerId, objective: &ObjectId) -> Result<(), ObjectiveError> {
        self.objectives.start(self, player, objective)
    }

    pub fn cancel_objective(&self, player: &PlayerId, objective: &ObjectId) -> Result<(), ObjectiveError> {
        self.objectives.cancel(self, player, objective)
    }

    pub fn complete_objective(&self, player: &PlayerId, objective: &ObjectId) -> Result<(), ObjectiveError> {
        self.objectives.complete(self, player, objective)
    }

    pub fn start_conversation(
        &self,
        player: &PlayerId,
        conversation: &ObjectId,
    ) -> Result<ConversationState, ConversationError> {
        self.conversations.start(self, player, conversation)
    }

    pub fn select_option(&self, player: &PlayerId, index: usize) -> Result<ConversationState, ConversationError> {
        self.conversations.select(self, player, index)
    }

    /// Strategy-specific input such as "next" or "previous" for paged IO.
    /// Returns false if the IO ignored the command.
    pub fn navigate_conversation(&self, player: &PlayerId, command: &str) -> Result<bool, ConversationError> {
        self.conversations.navigate(player, command)
    }

    pub fn end_conversation(&self, player: &PlayerId) -> bool {
        self.conversations.end(self, player)
    }

    /// Player left the world; their conversation ends without final events
    pub fn player_quit(&self, player: &PlayerId) {
        self.conversations.disconnect(self, player);
    }

    /// Evaluate a condition by identifier, `!` allowed
    pub fn check(&self, player: &PlayerId, raw: &str, package: &str) -> Result<bool, ObjectNotFoundError> {
        match self.packages().resolve(raw, DefinitionKind::Condition, package)? {
            Handle::Condition(condition) => Ok(condition.check(player, self)),
            other => Err(mismatch(raw, package, DefinitionKind::Condition, &other)),
        }
    }

    /// Fire an event by identifier. Returns whether its conditions let it run.
    pub fn fire(&self, player: &PlayerId, raw: &str, package: &str) -> Result<bool, ObjectNotFoundError> {
        match self.packages().resolve(raw, DefinitionKind::Event, package)? {
            Handle::Event(event) => Ok(event.fire(player, self)),
            other => Err(mismatch(raw, package, DefinitionKind::Event, &other)),
        }
    }

    /// Resolve a variable by identifier for a player
    pub fn variable(&self, player: &PlayerId, raw: &str, package: &str) -> Result<String, ObjectNotFoundError> {
        match self.packages().resolve(raw, DefinitionKind::Variable, package)? {
            Handle::Variable(variable) => Ok(variable.resolve(player, self)),
            other => Err(mismatch(raw, package, DefinitionKind::Variable, &other)),
        }
    }
}

fn mismatch(raw: &str, package: &str, expected: DefinitionKind, found: &Handle) -> ObjectNotFoundError {
    ObjectNotFoundError::new(
        ObjectId::qualify(raw.trim_start_matches('!'), package),
        expected,
        NotFoundReason::WrongKind(found.kind()),
    )
}
