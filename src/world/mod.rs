//! World Adapters
//!
//! Boundary traits through which the runtime reads the hosting world and
//! renders output. Implementations live outside the core; `sandbox` is an
//! in-memory implementation used by tests and the development host.

mod event;
mod location;
pub mod sandbox;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::id::PlayerId;

pub use event::{GameEvent, ProjectileKind};
pub use location::{BlockPos, Location};
pub use sandbox::{SandboxPlayer, SandboxWorld};

/// State of a single block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub material: String,
    #[serde(default)]
    pub powered: bool,
}

impl Block {
    pub fn new(material: &str) -> Self {
        Self {
            material: material.to_string(),
            powered: false,
        }
    }
}

/// Item description from a package's `[items]` section
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub material: String,
    pub name: Option<String>,
}

impl ItemTemplate {
    /// Stable key identifying matching stacks
    pub fn key(&self) -> String {
        match &self.name {
            Some(name) => format!("{}|{}", self.material, name),
            None => self.material.clone(),
        }
    }
}

/// Output channel for one-off notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    Chat,
    ActionBar,
    Title,
}

/// A unit of output handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Short message on a notification channel
    Notify { channel: NotifyChannel, text: String },
    /// Lines of chat text
    Chat { lines: Vec<String> },
    /// Inventory-style option list
    Menu {
        title: String,
        text: String,
        slots: Vec<String>,
    },
    /// Close whatever menu is open
    Close,
}

/// Read access to the world plus the few side effects events perform
pub trait World: Send + Sync {
    fn is_online(&self, player: &PlayerId) -> bool;

    fn player_name(&self, player: &PlayerId) -> Result<String, EvaluationError>;

    fn location(&self, player: &PlayerId) -> Result<Location, EvaluationError>;

    fn is_sneaking(&self, player: &PlayerId) -> Result<bool, EvaluationError>;

    fn block(&self, at: &Location) -> Option<Block>;

    fn set_block(&self, at: &Location, block: Block) -> Result<(), EvaluationError>;

    fn item_count(&self, player: &PlayerId, item: &ItemTemplate) -> Result<u32, EvaluationError>;

    fn give_item(
        &self,
        player: &PlayerId,
        item: &ItemTemplate,
        amount: u32,
    ) -> Result<(), EvaluationError>;

    /// Remove up to `amount` items, returning how many were taken
    fn take_item(
        &self,
        player: &PlayerId,
        item: &ItemTemplate,
        amount: u32,
    ) -> Result<u32, EvaluationError>;

    /// Current position of a projectile, if the world still tracks it
    fn projectile_location(&self, projectile_id: &str) -> Option<Location>;
}

/// Player balances from an economy plugin
pub trait Economy: Send + Sync {
    fn balance(&self, player: &PlayerId) -> Result<f64, EvaluationError>;

    fn deposit(&self, player: &PlayerId, amount: f64) -> Result<(), EvaluationError>;

    fn withdraw(&self, player: &PlayerId, amount: f64) -> Result<(), EvaluationError>;
}

/// Numeric player stats from an RPG plugin
pub trait StatProvider: Send + Sync {
    fn stat(&self, player: &PlayerId, name: &str) -> Result<f64, EvaluationError>;
}

/// Presentation channel
pub trait Renderer: Send + Sync {
    fn render(&self, player: &PlayerId, frame: Frame);
}

/// Optional feature providers
#[derive(Clone, Default)]
pub struct Integrations {
    pub economy: Option<Arc<dyn Economy>>,
    pub stats: Option<Arc<dyn StatProvider>>,
}

impl Integrations {
    pub fn economy(&self) -> Result<&Arc<dyn Economy>, EvaluationError> {
        self.economy
            .as_ref()
            .ok_or(EvaluationError::FeatureUnavailable("economy"))
    }

    pub fn stats(&self) -> Result<&Arc<dyn StatProvider>, EvaluationError> {
        self.stats
            .as_ref()
            .ok_or(EvaluationError::FeatureUnavailable("stats"))
    }
}
