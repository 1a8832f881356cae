//! Built-in conditions

use std::sync::Arc;

use rand::Rng;

use super::{Condition, ConditionHandle};
use crate::error::{EvaluationError, RegistryError};
use crate::id::{DefinitionKind, ObjectId, PlayerId};
use crate::instruction::ArgEnum;
use crate::registry::ComponentRegistry;
use crate::runtime::QuestRuntime;
use crate::text::VarNum;
use crate::world::{Integrations, ItemTemplate, Location};

pub(crate) fn register(registry: &mut ComponentRegistry, integrations: &Integrations) -> Result<(), RegistryError> {
    registry.register_condition("sneak", |_, _| Ok(SneakCondition))?;

    registry.register_condition("facing", |instruction, _| {
        Ok(FacingCondition {
            direction: instruction.next_enum()?,
        })
    })?;

    registry.register_condition("and", |instruction, resolver| {
        let package = instruction.package().to_string();
        let ids = instruction.next_list()?;
        Ok(CompoundCondition {
            conditions: resolver.conditions(&ids, &package)?,
            any: false,
        })
    })?;

    registry.register_condition("or", |instruction, resolver| {
        let package = instruction.package().to_string();
        let ids = instruction.next_list()?;
        Ok(CompoundCondition {
            conditions: resolver.conditions(&ids, &package)?,
            any: true,
        })
    })?;

    registry.register_condition("item", |instruction, resolver| {
        Ok(ItemCondition {
            items: resolver.next_items(instruction)?,
        })
    })?;

    registry.register_condition("objective", |instruction, resolver| {
        let package = instruction.package().to_string();
        let raw = instruction.next()?;
        Ok(ObjectiveCondition {
            objective: resolver.objective(&raw, &package)?,
        })
    })?;

    registry.register_condition("chance", |instruction, resolver| {
        Ok(ChanceCondition {
            probability: resolver.next_var_num(instruction)?,
        })
    })?;

    if integrations.stats.is_some() {
        registry.register_condition("stat", |instruction, _| {
            let name = instruction.next()?;
            let level = instruction.next_f64()?;
            Ok(StatCondition {
                name,
                level,
                equal: instruction.has_argument("equal"),
            })
        })?;
    } else {
        registry.register_unavailable(DefinitionKind::Condition, "stat", "stats")?;
    }

    if integrations.economy.is_some() {
        registry.register_condition("money", |instruction, resolver| {
            Ok(MoneyCondition {
                amount: resolver.next_var_num(instruction)?,
            })
        })?;
    } else {
        registry.register_unavailable(DefinitionKind::Condition, "money", "economy")?;
    }

    Ok(())
}

/// Player is sneaking
struct SneakCondition;

impl Condition for SneakCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        rt.world().is_sneaking(player)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl ArgEnum for Direction {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("north", Direction::North),
        ("east", Direction::East),
        ("south", Direction::South),
        ("west", Direction::West),
        ("up", Direction::Up),
        ("down", Direction::Down),
    ];
}

impl Direction {
    /// Direction a player looks in. Steep pitch wins over yaw.
    pub fn of(location: &Location) -> Self {
        if location.pitch > 60.0 {
            return Direction::Down;
        }
        if location.pitch < -60.0 {
            return Direction::Up;
        }
        let yaw = location.yaw.rem_euclid(360.0);
        if yaw < 45.0 {
            Direction::South
        } else if yaw < 135.0 {
            Direction::West
        } else if yaw < 225.0 {
            Direction::North
        } else if yaw < 325.0 {
            Direction::East
        } else {
            Direction::South
        }
    }
}

struct FacingCondition {
    direction: Direction,
}

impl Condition for FacingCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        let location = rt.world().location(player)?;
        Ok(Direction::of(&location) == self.direction)
    }
}

/// `and` / `or` over other conditions, short-circuiting in list order
struct CompoundCondition {
    conditions: Vec<ConditionHandle>,
    any: bool,
}

impl Condition for CompoundCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        for condition in &self.conditions {
            if condition.evaluate(player, rt)? == self.any {
                return Ok(self.any);
            }
        }
        Ok(!self.any)
    }
}

struct ItemCondition {
    items: Vec<(Arc<ItemTemplate>, u32)>,
}

impl Condition for ItemCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        for (item, amount) in &self.items {
            if rt.world().item_count(player, item)? < *amount {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

struct ObjectiveCondition {
    objective: ObjectId,
}

impl Condition for ObjectiveCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        Ok(rt.objectives().is_active(player, &self.objective))
    }
}

struct ChanceCondition {
    probability: VarNum,
}

impl Condition for ChanceCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        let probability = self.probability.resolve(player, rt)?;
        Ok(rand::thread_rng().r#gen::<f64>() < probability)
    }
}

struct StatCondition {
    name: String,
    level: f64,
    equal: bool,
}

impl Condition for StatCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        let actual = rt.integrations().stats()?.stat(player, &self.name)?;
        Ok(if self.equal {
            actual == self.level
        } else {
            actual >= self.level
        })
    }
}

struct MoneyCondition {
    amount: VarNum,
}

impl Condition for MoneyCondition {
    fn check(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        let amount = self.amount.resolve(player, rt)?;
        Ok(rt.integrations().economy()?.balance(player)? >= amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    const PACKAGE: &str = r#"
[conditions]
sneaking = "sneak"
facing_west = "facing west"
strong = "stat strength 10"
exactly_ten = "stat strength 10 equal"
rich = "money 50"
both = "and sneaking,facing_west"
either = "or sneaking,facing_west"
not_sneaking = "and !sneaking"
has_sword = "item sword:2"
never = "chance 0"
always = "chance 1"
hunting = "objective hunt"

[objectives]
hunt = "mobkill wolf 3"

[items]
sword = "iron_sword"
"#;

    #[test]
    fn test_facing_follows_yaw_and_pitch() {
        let at = |yaw, pitch| Location::new("world", 0.0, 0.0, 0.0).with_facing(yaw, pitch);
        assert_eq!(Direction::of(&at(10.0, 0.0)), Direction::South);
        assert_eq!(Direction::of(&at(90.0, 0.0)), Direction::West);
        assert_eq!(Direction::of(&at(180.0, 0.0)), Direction::North);
        assert_eq!(Direction::of(&at(-90.0, 0.0)), Direction::East);
        assert_eq!(Direction::of(&at(330.0, 0.0)), Direction::South);
        assert_eq!(Direction::of(&at(90.0, 70.0)), Direction::Down);
        assert_eq!(Direction::of(&at(90.0, -70.0)), Direction::Up);
    }

    #[test]
    fn test_compound_conditions_short_circuit() {
        let fixture = Fixture::new(PACKAGE);
        fixture.world.update(&fixture.player, |p| {
            p.location = p.location.clone().with_facing(90.0, 0.0);
        });

        assert!(!fixture.check("both"));
        assert!(fixture.check("either"));
        assert!(fixture.check("not_sneaking"));
        assert!(!fixture.check("!either"));

        fixture.world.update(&fixture.player, |p| p.sneaking = true);
        assert!(fixture.check("both"));
        assert!(!fixture.check("not_sneaking"));
    }

    #[test]
    fn test_stat_and_money() {
        let fixture = Fixture::new(PACKAGE);
        fixture.world.update(&fixture.player, |p| {
            p.stats.insert("strength".to_string(), 12.0);
            p.balance = 50.0;
        });
        assert!(fixture.check("strong"));
        assert!(!fixture.check("exactly_ten"));
        assert!(fixture.check("rich"));

        fixture.world.set_economy_down(true);
        assert!(!fixture.check("rich"));
    }

    #[test]
    fn test_item_and_chance() {
        let fixture = Fixture::new(PACKAGE);
        assert!(!fixture.check("has_sword"));
        fixture.world.update(&fixture.player, |p| {
            p.inventory.insert("iron_sword".to_string(), 2);
        });
        assert!(fixture.check("has_sword"));
        assert!(!fixture.check("never"));
        assert!(fixture.check("always"));
    }

    #[test]
    fn test_objective_condition() {
        let fixture = Fixture::new(PACKAGE);
        assert!(!fixture.check("hunting"));
        fixture
            .rt
            .start_objective(&fixture.player, &ObjectId::new("town", "hunt"))
            .unwrap();
        assert!(fixture.check("hunting"));
    }

    #[test]
    fn test_offline_player_fails_closed() {
        let fixture = Fixture::new(PACKAGE);
        fixture.world.leave(&fixture.player);
        assert!(!fixture.check("facing_west"));
        assert!(!fixture.check("!facing_west"));
    }
}
