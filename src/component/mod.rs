//! Quest Components
//!
//! The four component kinds an instruction can build: conditions, events,
//! objectives and variables. Components are constructed once per package load
//! and shared read-only by every player; per-player state only ever lives in
//! the objective store.
//!
//! Other components never hold a component directly. They hold a handle that
//! carries the identifier and applies the recovery policy for live play:
//! a failing condition counts as false, a failing event is logged and skipped.

pub mod conditions;
pub mod events;
pub mod objectives;
pub mod variables;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EvaluationError;
use crate::id::{ObjectId, PlayerId};
use crate::runtime::QuestRuntime;
use crate::world::GameEvent;

/// Pure boolean predicate evaluated per player
pub trait Condition: Send + Sync {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError>;
}

/// Side-effecting action executed per player
pub trait Event: Send + Sync {
    fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError>;
}

/// On-demand text value per player. Must not mutate anything.
pub trait Variable: Send + Sync {
    fn value(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<String, EvaluationError>;
}

/// Deferred completion check, run on the next tick
pub type Recheck =
    Box<dyn FnOnce(&PlayerId, &QuestRuntime) -> Result<bool, EvaluationError> + Send>;

/// What an objective made of a game event
pub enum Outcome {
    /// Not relevant to this objective
    Ignored,
    /// Progress changed but the goal is not reached
    Progressed,
    /// Completion predicate holds
    Satisfied,
    /// Decide on the next tick using the captured inputs
    Deferred(Recheck),
}

/// Long-running per-player goal
///
/// `Data` is the objective's own progress shape. It is persisted as JSON, so
/// changing it is a storage format change.
pub trait Objective: Send + Sync {
    type Data: Serialize + DeserializeOwned + Send + 'static;

    /// Progress record created when the objective starts
    fn initial(&self) -> Self::Data;

    fn handle(
        &self,
        player: &PlayerId,
        data: &mut Self::Data,
        event: &GameEvent,
        rt: &QuestRuntime,
    ) -> Result<Outcome, EvaluationError>;

    /// Named value for the `objective` variable
    fn property(&self, _name: &str, _data: &Self::Data) -> Option<String> {
        None
    }
}

/// Object-safe view of an [`Objective`] over JSON progress records
pub(crate) trait DynObjective: Send + Sync {
    fn initial(&self) -> Value;

    fn accepts(&self, data: &Value) -> bool;

    fn handle(
        &self,
        player: &PlayerId,
        data: &mut Value,
        event: &GameEvent,
        rt: &QuestRuntime,
    ) -> Result<Outcome, EvaluationError>;

    fn property(&self, name: &str, data: &Value) -> Option<String>;
}

impl<T: Objective> DynObjective for T {
    fn initial(&self) -> Value {
        serde_json::to_value(Objective::initial(self)).unwrap_or(Value::Null)
    }

    fn accepts(&self, data: &Value) -> bool {
        serde_json::from_value::<T::Data>(data.clone()).is_ok()
    }

    fn handle(
        &self,
        player: &PlayerId,
        data: &mut Value,
        event: &GameEvent,
        rt: &QuestRuntime,
    ) -> Result<Outcome, EvaluationError> {
        let mut typed: T::Data = serde_json::from_value(data.clone())
            .map_err(|e| EvaluationError::World(format!("corrupted progress record: {}", e)))?;
        let outcome = Objective::handle(self, player, &mut typed, event, rt)?;
        *data = serde_json::to_value(&typed)
            .map_err(|e| EvaluationError::World(format!("unencodable progress record: {}", e)))?;
        Ok(outcome)
    }

    fn property(&self, name: &str, data: &Value) -> Option<String> {
        let typed: T::Data = serde_json::from_value(data.clone()).ok()?;
        Objective::property(self, name, &typed)
    }
}

/// Resolved reference to a condition, possibly negated
#[derive(Clone)]
pub struct ConditionHandle {
    id: ObjectId,
    negated: bool,
    inner: Arc<dyn Condition>,
}

impl ConditionHandle {
    pub(crate) fn new(id: ObjectId, inner: Arc<dyn Condition>) -> Self {
        Self {
            id,
            negated: false,
            inner,
        }
    }

    pub(crate) fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Raw result with negation applied; errors propagate
    pub fn evaluate(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        self.inner.check(player, rt).map(|met| met != self.negated)
    }

    /// Result for live play: an error counts as false
    pub fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> bool {
        match self.evaluate(player, rt) {
            Ok(met) => met,
            Err(e) => {
                warn!("Condition '{}' failed for player {}: {}", self.id, player, e);
                false
            }
        }
    }
}

/// Whether every condition holds, stopping at the first that does not
pub fn all_met(conditions: &[ConditionHandle], player: &PlayerId, rt: &QuestRuntime) -> bool {
    conditions.iter().all(|c| c.check(player, rt))
}

/// Constructed event with its gating conditions
pub struct EventDef {
    pub(crate) event: Box<dyn Event>,
    pub(crate) conditions: Vec<ConditionHandle>,
}

/// Resolved reference to an event
#[derive(Clone)]
pub struct EventHandle {
    id: ObjectId,
    inner: Arc<EventDef>,
}

impl EventHandle {
    pub(crate) fn new(id: ObjectId, inner: Arc<EventDef>) -> Self {
        Self { id, inner }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Fire for a player. Returns whether the event ran; failures are logged
    /// and count as attempted.
    pub fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> bool {
        if !all_met(&self.inner.conditions, player, rt) {
            debug!("Event '{}' skipped for player {}: conditions not met", self.id, player);
            return false;
        }
        if let Err(e) = self.inner.event.fire(player, rt) {
            warn!("Event '{}' failed for player {}: {}", self.id, player, e);
        }
        true
    }
}

/// Fire events in declared order
pub fn fire_all(events: &[EventHandle], player: &PlayerId, rt: &QuestRuntime) {
    for event in events {
        event.fire(player, rt);
    }
}

/// Resolved reference to a variable
#[derive(Clone)]
pub struct VariableHandle {
    id: ObjectId,
    inner: Arc<dyn Variable>,
}

impl VariableHandle {
    pub(crate) fn new(id: ObjectId, inner: Arc<dyn Variable>) -> Self {
        Self { id, inner }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn try_resolve(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<String, EvaluationError> {
        self.inner.value(player, rt)
    }

    /// Value for text rendering: an error renders as empty
    pub fn resolve(&self, player: &PlayerId, rt: &QuestRuntime) -> String {
        match self.inner.value(player, rt) {
            Ok(value) => value,
            Err(e) => {
                warn!("Variable '{}' failed for player {}: {}", self.id, player, e);
                String::new()
            }
        }
    }
}

/// Constructed objective with its gating conditions and completion events
pub struct ObjectiveDef {
    pub(crate) id: ObjectId,
    pub(crate) kind: Box<dyn DynObjective>,
    pub(crate) conditions: Vec<ConditionHandle>,
    pub(crate) events: Vec<EventHandle>,
}

impl ObjectiveDef {
    pub fn id(&self) -> &ObjectId {
        &self.id
    }
}
