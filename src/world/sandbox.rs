//! In-memory world
//!
//! Implements every adapter trait over plain maps. The development host
//! drives it over HTTP and the test suites use it as their fixture.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{Block, BlockPos, Economy, Frame, ItemTemplate, Location, Renderer, StatProvider, World};
use crate::error::EvaluationError;
use crate::id::PlayerId;

/// Everything the sandbox knows about one player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxPlayer {
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub sneaking: bool,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub stats: HashMap<String, f64>,
    /// Item key -> amount
    #[serde(default)]
    pub inventory: HashMap<String, u32>,
}

impl SandboxPlayer {
    pub fn new(name: &str, location: Location) -> Self {
        Self {
            name: name.to_string(),
            location,
            sneaking: false,
            balance: 0.0,
            stats: HashMap::new(),
            inventory: HashMap::new(),
        }
    }
}

#[derive(Default)]
pub struct SandboxWorld {
    players: DashMap<PlayerId, SandboxPlayer>,
    blocks: DashMap<BlockPos, Block>,
    projectiles: DashMap<String, Location>,
    /// Rendered output waiting to be collected, per player
    frames: DashMap<PlayerId, Vec<Frame>>,
    /// Economy lookups fail while this is set
    economy_down: AtomicBool,
}

impl SandboxWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, player: &PlayerId, data: SandboxPlayer) {
        self.players.insert(player.clone(), data);
    }

    pub fn leave(&self, player: &PlayerId) {
        self.players.remove(player);
    }

    /// Mutate a player's state; returns false if the player is unknown
    pub fn update<F: FnOnce(&mut SandboxPlayer)>(&self, player: &PlayerId, f: F) -> bool {
        match self.players.get_mut(player) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, player: &PlayerId) -> Option<SandboxPlayer> {
        self.players.get(player).map(|p| p.value().clone())
    }

    pub fn place_block(&self, at: &Location, block: Block) {
        self.blocks.insert(at.block(), block);
    }

    pub fn track_projectile(&self, projectile_id: &str, at: Location) {
        self.projectiles.insert(projectile_id.to_string(), at);
    }

    pub fn forget_projectile(&self, projectile_id: &str) {
        self.projectiles.remove(projectile_id);
    }

    pub fn set_economy_down(&self, down: bool) {
        self.economy_down
            .store(down, Ordering::SeqCst);
    }

    /// Drain everything rendered for a player so far
    pub fn take_frames(&self, player: &PlayerId) -> Vec<Frame> {
        self.frames
            .get_mut(player)
            .map(|mut frames| std::mem::take(frames.value_mut()))
            .unwrap_or_default()
    }

    fn with_player<T>(
        &self,
        player: &PlayerId,
        f: impl FnOnce(&SandboxPlayer) -> T,
    ) -> Result<T, EvaluationError> {
        self.players
            .get(player)
            .map(|p| f(p.value()))
            .ok_or_else(|| EvaluationError::PlayerOffline(player.clone()))
    }

    fn with_player_mut<T>(
        &self,
        player: &PlayerId,
        f: impl FnOnce(&mut SandboxPlayer) -> T,
    ) -> Result<T, EvaluationError> {
        self.players
            .get_mut(player)
            .map(|mut p| f(p.value_mut()))
            .ok_or_else(|| EvaluationError::PlayerOffline(player.clone()))
    }
}

impl World for SandboxWorld {
    fn is_online(&self, player: &PlayerId) -> bool {
        self.players.contains_key(player)
    }

    fn player_name(&self, player: &PlayerId) -> Result<String, EvaluationError> {
        self.with_player(player, |p| p.name.clone())
    }

    fn location(&self, player: &PlayerId) -> Result<Location, EvaluationError> {
        self.with_player(player, |p| p.location.clone())
    }

    fn is_sneaking(&self, player: &PlayerId) -> Result<bool, EvaluationError> {
        self.with_player(player, |p| p.sneaking)
    }

    fn block(&self, at: &Location) -> Option<Block> {
        self.blocks.get(&at.block()).map(|b| b.value().clone())
    }

    fn set_block(&self, at: &Location, block: Block) -> Result<(), EvaluationError> {
        self.blocks.insert(at.block(), block);
        Ok(())
    }

    fn item_count(&self, player: &PlayerId, item: &ItemTemplate) -> Result<u32, EvaluationError> {
        self.with_player(player, |p| p.inventory.get(&item.key()).copied().unwrap_or(0))
    }

    fn give_item(
        &self,
        player: &PlayerId,
        item: &ItemTemplate,
        amount: u32,
    ) -> Result<(), EvaluationError> {
        self.with_player_mut(player, |p| {
            *p.inventory.entry(item.key()).or_insert(0) += amount;
        })
    }

    fn take_item(
        &self,
        player: &PlayerId,
        item: &ItemTemplate,
        amount: u32,
    ) -> Result<u32, EvaluationError> {
        self.with_player_mut(player, |p| {
            let held = p.inventory.entry(item.key()).or_insert(0);
            let taken = amount.min(*held);
            *held -= taken;
            taken
        })
    }

    fn projectile_location(&self, projectile_id: &str) -> Option<Location> {
        self.projectiles.get(projectile_id).map(|l| l.value().clone())
    }
}

impl Economy for SandboxWorld {
    fn balance(&self, player: &PlayerId) -> Result<f64, EvaluationError> {
        if self.economy_down.load(Ordering::SeqCst) {
            return Err(EvaluationError::FeatureUnavailable("economy"));
        }
        self.with_player(player, |p| p.balance)
    }

    fn deposit(&self, player: &PlayerId, amount: f64) -> Result<(), EvaluationError> {
        self.with_player_mut(player, |p| p.balance += amount)
    }

    fn withdraw(&self, player: &PlayerId, amount: f64) -> Result<(), EvaluationError> {
        self.with_player_mut(player, |p| p.balance -= amount)
    }
}

impl StatProvider for SandboxWorld {
    fn stat(&self, player: &PlayerId, name: &str) -> Result<f64, EvaluationError> {
        self.with_player(player, |p| p.stats.get(name).copied().unwrap_or(0.0))
    }
}

impl Renderer for SandboxWorld {
    fn render(&self, player: &PlayerId, frame: Frame) {
        self.frames.entry(player.clone()).or_default().push(frame);
    }
}
