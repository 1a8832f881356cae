//! Objective State Tracking
//!
//! Per-player progress of running objectives. An objective is either active
//! (it has a progress record here) or not. Completion and cancellation both
//! remove the record; completion then fires the objective's events.
//!
//! Each start gets a fresh epoch. Anything computed from an earlier snapshot
//! (a deferred re-check, a slow handler) is dropped if the epoch it saw is no
//! longer current, so a cancelled or restarted objective can never be
//! completed by stale work.

mod persist;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::component::{ObjectiveDef, Outcome, Recheck, all_met, fire_all};
use crate::error::ObjectiveError;
use crate::id::{ObjectId, PlayerId};
use crate::package::PackageSet;
use crate::runtime::QuestRuntime;
use crate::world::GameEvent;

pub use persist::{
    MemoryProgressStore, ObjectiveRecord, PersistHandle, PersistOp, ProgressStore, spawn_writer,
};

/// Status of an objective for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Inactive,
    Active,
}

impl ObjectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveStatus::Inactive => "inactive",
            ObjectiveStatus::Active => "active",
        }
    }
}

struct ActiveObjective {
    data: Value,
    epoch: u64,
    started_at: DateTime<Utc>,
}

impl ActiveObjective {
    fn record(&self, player: &PlayerId, objective: &ObjectId) -> ObjectiveRecord {
        ObjectiveRecord {
            player: player.clone(),
            objective: objective.clone(),
            data: self.data.clone(),
            started_at: self.started_at,
        }
    }
}

struct PlayerObjectives {
    /// Serializes every change to the player's objectives. Reentrant so
    /// completion events may start or dispatch again on the same thread.
    dispatch: ReentrantMutex<()>,
    /// Never held while conditions, events or handlers run
    active: RwLock<HashMap<ObjectId, ActiveObjective>>,
}

impl PlayerObjectives {
    fn new() -> Self {
        Self {
            dispatch: ReentrantMutex::new(()),
            active: RwLock::new(HashMap::new()),
        }
    }

    fn is_current(&self, objective: &ObjectId, epoch: u64) -> bool {
        self.active
            .read()
            .get(objective)
            .is_some_and(|a| a.epoch == epoch)
    }
}

#[derive(Default)]
pub struct ObjectiveStore {
    players: DashMap<PlayerId, Arc<PlayerObjectives>>,
    next_epoch: AtomicU64,
}

impl ObjectiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    fn slot(&self, player: &PlayerId) -> Arc<PlayerObjectives> {
        self.players
            .entry(player.clone())
            .or_insert_with(|| Arc::new(PlayerObjectives::new()))
            .value()
            .clone()
    }

    fn existing_slot(&self, player: &PlayerId) -> Option<Arc<PlayerObjectives>> {
        self.players.get(player).map(|s| s.value().clone())
    }

    fn is_registered(&self, player: &PlayerId, slot: &Arc<PlayerObjectives>) -> bool {
        self.players
            .get(player)
            .is_some_and(|s| Arc::ptr_eq(s.value(), slot))
    }

    /// Run `f` holding the player's dispatch lock, creating the slot if needed
    fn with_slot<R>(&self, player: &PlayerId, f: impl FnOnce(&Arc<PlayerObjectives>) -> R) -> R {
        loop {
            let slot = self.slot(player);
            let _guard = slot.dispatch.lock();
            // Pruned while we waited for the lock
            if self.is_registered(player, &slot) {
                return f(&slot);
            }
        }
    }

    /// Like `with_slot`, but `None` if the player has no objectives
    fn with_existing_slot<R>(
        &self,
        player: &PlayerId,
        f: impl FnOnce(&Arc<PlayerObjectives>) -> R,
    ) -> Option<R> {
        loop {
            let slot = self.existing_slot(player)?;
            let _guard = slot.dispatch.lock();
            if self.is_registered(player, &slot) {
                return Some(f(&slot));
            }
        }
    }

    /// Forget the player's slot once nothing is active in it. Callers hold
    /// the slot's dispatch lock.
    fn prune(&self, player: &PlayerId, slot: &Arc<PlayerObjectives>) {
        self.players
            .remove_if(player, |_, s| Arc::ptr_eq(s, slot) && s.active.read().is_empty());
    }

    /// Remove an active objective and queue its deletion. The operation is
    /// queued under the write lock so storage sees mutations in order.
    fn remove(
        &self,
        rt: &QuestRuntime,
        player: &PlayerId,
        slot: &PlayerObjectives,
        objective: &ObjectId,
        epoch: Option<u64>,
    ) -> bool {
        let mut active = slot.active.write();
        let current = active
            .get(objective)
            .is_some_and(|entry| epoch.is_none_or(|epoch| entry.epoch == epoch));
        if !current {
            return false;
        }
        active.remove(objective);
        rt.persist(PersistOp::Delete {
            player: player.clone(),
            objective: objective.clone(),
        });
        true
    }

    /// Inactive -> Active with fresh progress. Runs no events.
    pub fn start(&self, rt: &QuestRuntime, player: &PlayerId, objective: &ObjectId) -> Result<(), ObjectiveError> {
        let def = rt.packages().objective(objective)?;
        self.with_slot(player, |slot| {
            let mut active = slot.active.write();
            if active.contains_key(objective) {
                return Err(ObjectiveError::AlreadyActive {
                    player: player.clone(),
                    objective: objective.clone(),
                });
            }
            let entry = ActiveObjective {
                data: def.kind.initial(),
                epoch: self.epoch(),
                started_at: Utc::now(),
            };
            rt.persist(PersistOp::Upsert(entry.record(player, objective)));
            active.insert(objective.clone(), entry);
            Ok(())
        })?;
        info!("Player {} started objective '{}'", player, objective);
        Ok(())
    }

    /// Active -> Inactive without firing anything
    pub fn cancel(&self, rt: &QuestRuntime, player: &PlayerId, objective: &ObjectId) -> Result<(), ObjectiveError> {
        let removed = self
            .with_existing_slot(player, |slot| {
                let removed = self.remove(rt, player, slot, objective, None);
                self.prune(player, slot);
                removed
            })
            .unwrap_or(false);
        if !removed {
            return Err(ObjectiveError::NotActive {
                player: player.clone(),
                objective: objective.clone(),
            });
        }
        info!("Player {} cancelled objective '{}'", player, objective);
        Ok(())
    }

    /// Complete regardless of progress and conditions, firing the events
    pub fn complete(&self, rt: &QuestRuntime, player: &PlayerId, objective: &ObjectId) -> Result<(), ObjectiveError> {
        let def = rt.packages().objective(objective)?;
        let completed = self
            .with_existing_slot(player, |slot| {
                if !self.remove(rt, player, slot, objective, None) {
                    return false;
                }
                self.finish(rt, player, &def);
                self.prune(player, slot);
                true
            })
            .unwrap_or(false);
        if !completed {
            return Err(ObjectiveError::NotActive {
                player: player.clone(),
                objective: objective.clone(),
            });
        }
        Ok(())
    }

    /// Offer a game event to every active objective of its player
    pub fn dispatch(&self, rt: &QuestRuntime, event: &GameEvent) {
        let player = event.player_id();
        self.with_existing_slot(player, |slot| {
            let mut ids: Vec<ObjectId> = slot.active.read().keys().cloned().collect();
            ids.sort();
            let packages = rt.packages();

            for id in ids {
                let Ok(def) = packages.objective(&id) else {
                    continue;
                };
                let snapshot = slot
                    .active
                    .read()
                    .get(&id)
                    .map(|a| (a.data.clone(), a.epoch));
                let Some((mut data, epoch)) = snapshot else {
                    continue;
                };

                let outcome = match def.kind.handle(player, &mut data, event, rt) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(
                            "Objective '{}' failed to handle {} for player {}: {}",
                            id,
                            event.event_type(),
                            player,
                            e
                        );
                        continue;
                    }
                };

                match outcome {
                    Outcome::Ignored => {}
                    Outcome::Progressed => {
                        self.store_progress(rt, player, slot, &id, epoch, data);
                    }
                    Outcome::Satisfied => {
                        if self.store_progress(rt, player, slot, &id, epoch, data) {
                            self.try_complete(rt, player, slot, &def, epoch);
                        }
                    }
                    Outcome::Deferred(recheck) => self.defer(rt, player, &id, epoch, recheck),
                }
            }
        });
    }

    /// Write back progress if the objective was not restarted meanwhile
    fn store_progress(
        &self,
        rt: &QuestRuntime,
        player: &PlayerId,
        slot: &PlayerObjectives,
        objective: &ObjectId,
        epoch: u64,
        data: Value,
    ) -> bool {
        let mut active = slot.active.write();
        match active.get_mut(objective) {
            Some(entry) if entry.epoch == epoch => {
                entry.data = data;
                rt.persist(PersistOp::Upsert(entry.record(player, objective)));
                true
            }
            _ => false,
        }
    }

    fn defer(&self, rt: &QuestRuntime, player: &PlayerId, objective: &ObjectId, epoch: u64, recheck: Recheck) {
        let player = player.clone();
        let objective = objective.clone();
        rt.scheduler().schedule_next_tick(Box::new(move |rt: &QuestRuntime| {
            rt.objectives().resume(rt, &player, &objective, epoch, recheck);
        }));
    }

    /// Run a deferred re-check scheduled by `dispatch`
    fn resume(&self, rt: &QuestRuntime, player: &PlayerId, objective: &ObjectId, epoch: u64, recheck: Recheck) {
        self.with_existing_slot(player, |slot| {
            if !slot.is_current(objective, epoch) {
                debug!("Dropping stale re-check of '{}' for player {}", objective, player);
                return;
            }
            match recheck(player, rt) {
                Ok(true) => {
                    if let Ok(def) = rt.packages().objective(objective) {
                        self.try_complete(rt, player, slot, &def, epoch);
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("Re-check of '{}' failed for player {}: {}", objective, player, e),
            }
        });
    }

    /// Complete if the gating conditions pass. A failing condition leaves the
    /// objective active.
    fn try_complete(
        &self,
        rt: &QuestRuntime,
        player: &PlayerId,
        slot: &Arc<PlayerObjectives>,
        def: &ObjectiveDef,
        epoch: u64,
    ) -> bool {
        if !all_met(&def.conditions, player, rt) {
            debug!("Objective '{}' reached but conditions not met for player {}", def.id, player);
            return false;
        }
        if !self.remove(rt, player, slot, &def.id, Some(epoch)) {
            return false;
        }
        self.finish(rt, player, def);
        self.prune(player, slot);
        true
    }

    fn finish(&self, rt: &QuestRuntime, player: &PlayerId, def: &ObjectiveDef) {
        info!("Player {} completed objective '{}'", player, def.id);
        fire_all(&def.events, player, rt);
    }

    /// Recreate active objectives from storage without running start logic.
    /// Returns how many were restored.
    pub fn restore(&self, rt: &QuestRuntime, records: Vec<ObjectiveRecord>) -> usize {
        let packages = rt.packages();
        let mut restored = 0;
        for record in records {
            let def = match packages.objective(&record.objective) {
                Ok(def) => def,
                Err(e) => {
                    warn!("Not restoring progress of player {}: {}", record.player, e);
                    continue;
                }
            };
            let data = if def.kind.accepts(&record.data) {
                record.data
            } else {
                warn!(
                    "Progress of '{}' for player {} is unreadable, starting over",
                    record.objective, record.player
                );
                def.kind.initial()
            };
            let entry = ActiveObjective {
                data,
                epoch: self.epoch(),
                started_at: record.started_at,
            };
            self.with_slot(&record.player, |slot| {
                slot.active.write().insert(record.objective, entry);
            });
            restored += 1;
        }
        info!("Restored {} active objectives", restored);
        restored
    }

    /// Reconcile progress with a freshly loaded package set. Objectives no
    /// longer defined are dropped; progress the new definition cannot read
    /// starts over.
    pub fn retain_defined(&self, rt: &QuestRuntime, packages: &PackageSet) {
        let slots: Vec<(PlayerId, Arc<PlayerObjectives>)> = self
            .players
            .iter()
            .map(|s| (s.key().clone(), s.value().clone()))
            .collect();

        for (player, slot) in slots {
            let _guard = slot.dispatch.lock();
            if !self.is_registered(&player, &slot) {
                continue;
            }
            slot.active.write().retain(|id, entry| {
                let Ok(def) = packages.objective(id) else {
                    warn!("Objective '{}' no longer exists, dropping it for player {}", id, player);
                    return false;
                };
                if !def.kind.accepts(&entry.data) {
                    warn!(
                        "Objective '{}' changed type, restarting its progress for player {}",
                        id, player
                    );
                    entry.data = def.kind.initial();
                    entry.epoch = self.epoch();
                    rt.persist(PersistOp::Upsert(entry.record(&player, id)));
                }
                true
            });
            self.prune(&player, &slot);
        }
    }

    /// Players that currently have a progress slot
    pub fn tracked_players(&self) -> usize {
        self.players.len()
    }

    pub fn status(&self, player: &PlayerId, objective: &ObjectId) -> ObjectiveStatus {
        if self.is_active(player, objective) {
            ObjectiveStatus::Active
        } else {
            ObjectiveStatus::Inactive
        }
    }

    pub fn is_active(&self, player: &PlayerId, objective: &ObjectId) -> bool {
        self.existing_slot(player)
            .is_some_and(|slot| slot.active.read().contains_key(objective))
    }

    /// Active objectives of a player, sorted
    pub fn active(&self, player: &PlayerId) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .existing_slot(player)
            .map(|slot| slot.active.read().keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn record(&self, player: &PlayerId, objective: &ObjectId) -> Option<ObjectiveRecord> {
        let slot = self.existing_slot(player)?;
        let active = slot.active.read();
        active.get(objective).map(|a| a.record(player, objective))
    }

    /// Named property of an active objective's progress
    pub fn property(&self, rt: &QuestRuntime, player: &PlayerId, objective: &ObjectId, name: &str) -> Option<String> {
        let data = self.record(player, objective)?.data;
        let def = rt.packages().objective(objective).ok()?;
        def.kind.property(name, &data)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::*;
    use crate::error::{NotFoundReason, ObjectNotFoundError};
    use crate::id::DefinitionKind;
    use crate::package::{PackageSources, RawPackage};
    use crate::testing::Fixture;
    use crate::world::{Integrations, Location, SandboxPlayer, SandboxWorld};

    const PACKAGE: &str = r#"
[events]
pay = "money +10"

[objectives]
wolves = "mobkill wolf 2 events:pay"
"#;

    fn wolves() -> ObjectId {
        ObjectId::new("town", "wolves")
    }

    fn kill(player: &PlayerId) -> GameEvent {
        GameEvent::EntityKilled {
            player_id: player.clone(),
            entity_type: "wolf".to_string(),
        }
    }

    fn balance(fixture: &Fixture) -> f64 {
        fixture.world.snapshot(&fixture.player).unwrap().balance
    }

    #[test]
    fn test_start_then_cancel_leaves_nothing() {
        let fixture = Fixture::new(PACKAGE);
        let store = fixture.rt.objectives();
        fixture.rt.start_objective(&fixture.player, &wolves()).unwrap();
        assert_eq!(
            fixture.rt.start_objective(&fixture.player, &wolves()),
            Err(ObjectiveError::AlreadyActive {
                player: fixture.player.clone(),
                objective: wolves(),
            })
        );

        fixture.rt.cancel_objective(&fixture.player, &wolves()).unwrap();
        assert_eq!(store.status(&fixture.player, &wolves()), ObjectiveStatus::Inactive);
        assert!(store.record(&fixture.player, &wolves()).is_none());
        assert!(store.active(&fixture.player).is_empty());
        assert_eq!(balance(&fixture), 0.0);

        assert!(matches!(
            fixture.rt.cancel_objective(&fixture.player, &wolves()),
            Err(ObjectiveError::NotActive { .. })
        ));
    }

    #[test]
    fn test_unknown_objective_cannot_start() {
        let fixture = Fixture::new(PACKAGE);
        let err = fixture
            .rt
            .start_objective(&fixture.player, &ObjectId::new("town", "bears"))
            .unwrap_err();
        assert_eq!(
            err,
            ObjectiveError::NotFound(ObjectNotFoundError::new(
                ObjectId::new("town", "bears"),
                DefinitionKind::Objective,
                NotFoundReason::UnknownName,
            ))
        );
    }

    #[test]
    fn test_completes_exactly_once() {
        let fixture = Fixture::new(PACKAGE);
        fixture.rt.start_objective(&fixture.player, &wolves()).unwrap();

        fixture.rt.dispatch(&kill(&fixture.player));
        assert!(fixture.rt.objectives().is_active(&fixture.player, &wolves()));
        fixture.rt.dispatch(&kill(&fixture.player));
        fixture.rt.dispatch(&kill(&fixture.player));

        assert_eq!(
            fixture.rt.objectives().status(&fixture.player, &wolves()),
            ObjectiveStatus::Inactive
        );
        assert_eq!(balance(&fixture), 10.0);
    }

    #[test]
    fn test_events_of_other_players_are_ignored() {
        let fixture = Fixture::new(PACKAGE);
        fixture.rt.start_objective(&fixture.player, &wolves()).unwrap();
        fixture.rt.dispatch(&kill(&PlayerId::from("bob")));
        assert_eq!(
            fixture
                .rt
                .objectives()
                .property(&fixture.rt, &fixture.player, &wolves(), "left")
                .as_deref(),
            Some("2")
        );
    }

    #[test]
    fn test_forced_completion_fires_events() {
        let fixture = Fixture::new(PACKAGE);
        fixture.rt.start_objective(&fixture.player, &wolves()).unwrap();
        fixture.rt.complete_objective(&fixture.player, &wolves()).unwrap();
        assert_eq!(balance(&fixture), 10.0);
        assert!(!fixture.rt.objectives().is_active(&fixture.player, &wolves()));
    }

    #[test]
    fn test_restore_resumes_progress() {
        let fixture = Fixture::new(PACKAGE);
        let bob = PlayerId::from("bob");
        let records = vec![
            ObjectiveRecord {
                player: fixture.player.clone(),
                objective: wolves(),
                data: serde_json::json!({ "left": 1 }),
                started_at: Utc::now(),
            },
            ObjectiveRecord {
                player: bob.clone(),
                objective: wolves(),
                data: serde_json::json!({ "bogus": true }),
                started_at: Utc::now(),
            },
            ObjectiveRecord {
                player: bob.clone(),
                objective: ObjectId::new("town", "removed"),
                data: Value::Null,
                started_at: Utc::now(),
            },
        ];
        assert_eq!(fixture.rt.restore(records), 2);

        let store = fixture.rt.objectives();
        assert_eq!(
            store.property(&fixture.rt, &bob, &wolves(), "left").as_deref(),
            Some("2")
        );

        // Restoring does not fire anything; the next kill finishes it
        assert_eq!(balance(&fixture), 0.0);
        fixture.rt.dispatch(&kill(&fixture.player));
        assert!(!store.is_active(&fixture.player, &wolves()));
        assert_eq!(balance(&fixture), 10.0);
    }

    #[test]
    fn test_reload_drops_removed_objectives() {
        let fixture = Fixture::new(PACKAGE);
        fixture.rt.start_objective(&fixture.player, &wolves()).unwrap();

        let mut sources = PackageSources::new();
        let raw: RawPackage = toml::from_str("[objectives]\nwolves = \"mobkill wolf 5\"\n").unwrap();
        sources.insert("town", raw);
        fixture.rt.replace_packages(fixture.rt.compile(sources));
        assert!(fixture.rt.objectives().is_active(&fixture.player, &wolves()));

        fixture.rt.replace_packages(fixture.rt.compile(PackageSources::new()));
        assert!(!fixture.rt.objectives().is_active(&fixture.player, &wolves()));
    }

    #[test]
    fn test_reload_restarts_progress_of_changed_type() {
        let fixture = Fixture::new(PACKAGE);
        fixture.rt.start_objective(&fixture.player, &wolves()).unwrap();
        fixture.rt.dispatch(&kill(&fixture.player));

        let mut sources = PackageSources::new();
        let raw: RawPackage = toml::from_str(
            "[events]\npay = \"money +10\"\n[objectives]\nwolves = \"location 0;64;0;world 5 events:pay\"\n",
        )
        .unwrap();
        sources.insert("town", raw);
        fixture.rt.replace_packages(fixture.rt.compile(sources));

        let store = fixture.rt.objectives();
        let record = store.record(&fixture.player, &wolves()).unwrap();
        assert_eq!(record.data, Value::Null);

        fixture.rt.dispatch(&GameEvent::PlayerMoved {
            player_id: fixture.player.clone(),
            to: Location::new("world", 1.0, 64.0, 0.0),
        });
        assert!(!store.is_active(&fixture.player, &wolves()));
        assert_eq!(balance(&fixture), 10.0);
    }

    #[test]
    fn test_finished_players_are_forgotten() {
        let fixture = Fixture::new(PACKAGE);
        let store = fixture.rt.objectives();
        let bob = PlayerId::from("bob");

        fixture.rt.start_objective(&fixture.player, &wolves()).unwrap();
        fixture.rt.start_objective(&bob, &wolves()).unwrap();
        assert_eq!(store.tracked_players(), 2);

        fixture.rt.cancel_objective(&bob, &wolves()).unwrap();
        assert_eq!(store.tracked_players(), 1);
        // Events for players without objectives do not create slots
        fixture.rt.dispatch(&kill(&bob));
        assert_eq!(store.tracked_players(), 1);

        fixture.rt.dispatch(&kill(&fixture.player));
        fixture.rt.dispatch(&kill(&fixture.player));
        assert_eq!(store.tracked_players(), 0);
        assert_eq!(balance(&fixture), 10.0);
    }

    #[test]
    fn test_concurrent_kills_are_all_counted() {
        let fixture = Fixture::new("[objectives]\nhorde = \"mobkill wolf 1000\"\n");
        let horde = ObjectId::new("town", "horde");
        fixture.rt.start_objective(&fixture.player, &horde).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        fixture.rt.dispatch(&kill(&fixture.player));
                    }
                });
            }
        });

        assert_eq!(
            fixture
                .rt
                .objectives()
                .property(&fixture.rt, &fixture.player, &horde, "left")
                .as_deref(),
            Some("200")
        );
    }

    #[test]
    fn test_cancel_racing_dispatch_completes_at_most_once() {
        let fixture = Fixture::new("[events]\npay = \"money +10\"\n[objectives]\nwolf = \"mobkill wolf 1 events:pay\"\n");
        let wolf = ObjectId::new("town", "wolf");
        let done = AtomicBool::new(false);

        let completed = std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    fixture.rt.dispatch(&kill(&fixture.player));
                }
            });
            let mut completed = 0;
            for _ in 0..500 {
                fixture.rt.start_objective(&fixture.player, &wolf).unwrap();
                // The kill thread finished it first
                if fixture.rt.cancel_objective(&fixture.player, &wolf).is_err() {
                    completed += 1;
                }
            }
            done.store(true, Ordering::Relaxed);
            completed
        });

        assert!(!fixture.rt.objectives().is_active(&fixture.player, &wolf));
        assert_eq!(balance(&fixture), 10.0 * completed as f64);
        assert_eq!(fixture.rt.objectives().tracked_players(), 0);
    }

    fn persisted_runtime(progress: Arc<MemoryProgressStore>) -> (QuestRuntime, PersistHandle, tokio::task::JoinHandle<()>) {
        let (handle, task) = spawn_writer(progress, Duration::from_secs(3600));
        let world = Arc::new(SandboxWorld::new());
        let rt = QuestRuntime::builder(world.clone(), world.clone())
            .integrations(Integrations {
                economy: Some(world.clone()),
                stats: None,
            })
            .persistence(handle.clone())
            .build()
            .unwrap();
        let mut sources = PackageSources::new();
        sources.insert("town", toml::from_str::<RawPackage>(PACKAGE).unwrap());
        rt.replace_packages(rt.compile(sources));
        world.join(
            &PlayerId::from("alice"),
            SandboxPlayer::new("Alice", Location::new("world", 0.0, 64.0, 0.0)),
        );
        (rt, handle, task)
    }

    #[tokio::test]
    async fn test_progress_reaches_the_store() {
        let progress = Arc::new(MemoryProgressStore::new());
        let (rt, handle, task) = persisted_runtime(progress.clone());
        let player = PlayerId::from("alice");

        rt.start_objective(&player, &wolves()).unwrap();
        rt.dispatch(&kill(&player));
        handle.flush().await;
        let saved = progress.get(&player, &wolves()).unwrap();
        assert_eq!(saved.data, serde_json::json!({ "left": 1 }));

        rt.dispatch(&kill(&player));
        handle.flush().await;
        assert!(progress.is_empty());

        drop(rt);
        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_start_and_cancel_leave_store_consistent() {
        let progress = Arc::new(MemoryProgressStore::new());
        let (rt, handle, task) = persisted_runtime(progress.clone());
        let player = PlayerId::from("alice");

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..500 {
                    let _ = rt.start_objective(&player, &wolves());
                }
            });
            scope.spawn(|| {
                for _ in 0..500 {
                    let _ = rt.cancel_objective(&player, &wolves());
                }
            });
            scope.spawn(|| {
                for _ in 0..500 {
                    rt.dispatch(&kill(&player));
                }
            });
        });

        handle.flush().await;
        let in_memory = rt.objectives().record(&player, &wolves());
        let saved = progress.get(&player, &wolves());
        assert_eq!(saved.map(|r| r.data), in_memory.map(|r| r.data));

        let _ = rt.cancel_objective(&player, &wolves());
        handle.flush().await;
        assert!(progress.is_empty());

        drop(rt);
        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_reset_is_persisted() {
        let progress = Arc::new(MemoryProgressStore::new());
        let (rt, handle, task) = persisted_runtime(progress.clone());
        let player = PlayerId::from("alice");
        rt.start_objective(&player, &wolves()).unwrap();

        let mut sources = PackageSources::new();
        let raw: RawPackage = toml::from_str("[objectives]\nwolves = \"location 0;64;0;world 5\"\n").unwrap();
        sources.insert("town", raw);
        rt.replace_packages(rt.compile(sources));
        handle.flush().await;

        let saved = progress.get(&player, &wolves()).unwrap();
        assert_eq!(saved.data, Value::Null);

        drop(rt);
        drop(handle);
        task.await.unwrap();
    }
}
