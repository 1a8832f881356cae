//! Game Event Types
//!
//! Events delivered by the hosting world that can advance objectives.

use serde::{Deserialize, Serialize};

use super::Location;
use crate::id::PlayerId;

/// Kind of projectile that hit something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileKind {
    Arrow,
    Snowball,
    Trident,
    Other,
}

/// Events that can trigger objective progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A projectile shot by the player hit a block or entity
    ProjectileHit {
        player_id: PlayerId,
        /// World handle of the projectile, used to look it up again later
        projectile_id: String,
        kind: ProjectileKind,
        /// Where the projectile was when the hit was reported
        location: Location,
    },

    /// Player moved to a new position
    PlayerMoved {
        player_id: PlayerId,
        to: Location,
    },

    /// Player killed an entity
    EntityKilled {
        player_id: PlayerId,
        /// Entity type (e.g., "zombie", "wolf")
        entity_type: String,
    },
}

impl GameEvent {
    /// Get the player ID associated with this event
    pub fn player_id(&self) -> &PlayerId {
        match self {
            GameEvent::ProjectileHit { player_id, .. } => player_id,
            GameEvent::PlayerMoved { player_id, .. } => player_id,
            GameEvent::EntityKilled { player_id, .. } => player_id,
        }
    }

    /// Get event type as string (for logging/debugging)
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::ProjectileHit { .. } => "projectile_hit",
            GameEvent::PlayerMoved { .. } => "player_moved",
            GameEvent::EntityKilled { .. } => "entity_killed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "type": "entity_killed",
            "player_id": "alice",
            "entity_type": "zombie"
        }"#;
        let event: GameEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.player_id().as_str(), "alice");
        assert_eq!(event.event_type(), "entity_killed");
    }
}
