//! Built-in objectives

use serde::{Deserialize, Serialize};

use super::{Objective, Outcome};
use crate::error::{ConstructionError, EvaluationError, RegistryError};
use crate::id::PlayerId;
use crate::registry::ComponentRegistry;
use crate::runtime::QuestRuntime;
use crate::text::VarNum;
use crate::world::{GameEvent, Location, ProjectileKind};

pub(crate) fn register(registry: &mut ComponentRegistry) -> Result<(), RegistryError> {
    registry.register_objective("arrow", |instruction, resolver| {
        Ok(ArrowObjective {
            target: instruction.next_location()?,
            range: resolver.next_var_num(instruction)?,
        })
    })?;

    registry.register_objective("location", |instruction, resolver| {
        Ok(LocationObjective {
            target: instruction.next_location()?,
            range: resolver.next_var_num(instruction)?,
        })
    })?;

    registry.register_objective("mobkill", |instruction, _| {
        let entities: Vec<String> = instruction
            .next_list()?
            .into_iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        if entities.is_empty() {
            return Err(ConstructionError::Invalid("no entity types given".to_string()));
        }
        Ok(MobKillObjective {
            entities,
            amount: instruction.next_positive_int()?,
        })
    })?;

    Ok(())
}

/// Land an arrow close to a target
///
/// The hit is reported before the arrow settles, so the distance is checked
/// one tick later against wherever the world says the arrow is by then.
struct ArrowObjective {
    target: Location,
    range: VarNum,
}

impl Objective for ArrowObjective {
    type Data = ();

    fn initial(&self) -> Self::Data {}

    fn handle(
        &self,
        _player: &PlayerId,
        _data: &mut Self::Data,
        event: &GameEvent,
        _rt: &QuestRuntime,
    ) -> Result<Outcome, EvaluationError> {
        let GameEvent::ProjectileHit {
            projectile_id,
            kind: ProjectileKind::Arrow,
            location,
            ..
        } = event
        else {
            return Ok(Outcome::Ignored);
        };

        let target = self.target.clone();
        let range = self.range.clone();
        let projectile_id = projectile_id.clone();
        let reported = location.clone();
        Ok(Outcome::Deferred(Box::new(
            move |player: &PlayerId, rt: &QuestRuntime| -> Result<bool, EvaluationError> {
                let landed = rt
                    .world()
                    .projectile_location(&projectile_id)
                    .unwrap_or(reported);
                let range = range.resolve(player, rt)?;
                Ok(target.within(&landed, range))
            },
        )))
    }
}

/// Walk into range of a location
struct LocationObjective {
    target: Location,
    range: VarNum,
}

impl Objective for LocationObjective {
    type Data = ();

    fn initial(&self) -> Self::Data {}

    fn handle(
        &self,
        player: &PlayerId,
        _data: &mut Self::Data,
        event: &GameEvent,
        rt: &QuestRuntime,
    ) -> Result<Outcome, EvaluationError> {
        let GameEvent::PlayerMoved { to, .. } = event else {
            return Ok(Outcome::Ignored);
        };
        if self.target.within(to, self.range.resolve(player, rt)?) {
            Ok(Outcome::Satisfied)
        } else {
            Ok(Outcome::Ignored)
        }
    }
}

struct MobKillObjective {
    entities: Vec<String>,
    amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MobKillData {
    left: u32,
}

impl Objective for MobKillObjective {
    type Data = MobKillData;

    fn initial(&self) -> Self::Data {
        MobKillData { left: self.amount }
    }

    fn handle(
        &self,
        _player: &PlayerId,
        data: &mut Self::Data,
        event: &GameEvent,
        _rt: &QuestRuntime,
    ) -> Result<Outcome, EvaluationError> {
        let GameEvent::EntityKilled { entity_type, .. } = event else {
            return Ok(Outcome::Ignored);
        };
        if !self.entities.iter().any(|e| e.eq_ignore_ascii_case(entity_type)) {
            return Ok(Outcome::Ignored);
        }
        data.left = data.left.saturating_sub(1);
        if data.left == 0 {
            Ok(Outcome::Satisfied)
        } else {
            Ok(Outcome::Progressed)
        }
    }

    fn property(&self, name: &str, data: &Self::Data) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "left" => Some(data.left.to_string()),
            "amount" => Some((self.amount - data.left.min(self.amount)).to_string()),
            "total" => Some(self.amount.to_string()),
            _ => None,
        }
    }
}
