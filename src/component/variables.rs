//! Built-in variables

use super::Variable;
use crate::error::{EvaluationError, ParseErrorKind, RegistryError};
use crate::id::{DefinitionKind, ObjectId, PlayerId};
use crate::instruction::ArgEnum;
use crate::registry::ComponentRegistry;
use crate::runtime::QuestRuntime;
use crate::world::Integrations;

pub(crate) fn register(registry: &mut ComponentRegistry, integrations: &Integrations) -> Result<(), RegistryError> {
    if integrations.economy.is_some() {
        registry.register_variable("money", |instruction, _| {
            let token = instruction.next()?;
            if token.eq_ignore_ascii_case("amount") {
                return Ok(MoneyVariable::Amount);
            }
            let target = token
                .split_once(':')
                .filter(|(key, _)| key.eq_ignore_ascii_case("left"))
                .and_then(|(_, value)| value.parse::<f64>().ok())
                .filter(|value| value.is_finite());
            match target {
                Some(target) => Ok(MoneyVariable::Left(target)),
                None => Err(instruction
                    .error_here(ParseErrorKind::Invalid(format!(
                        "expected 'amount' or 'left:<number>', got '{}'",
                        token
                    )))
                    .into()),
            }
        })?;
    } else {
        registry.register_unavailable(DefinitionKind::Variable, "money", "economy")?;
    }

    registry.register_variable("objective", |instruction, resolver| {
        let package = instruction.package().to_string();
        let raw = instruction.next()?;
        let objective = resolver.objective(&raw, &package)?;
        Ok(ObjectiveVariable {
            objective,
            property: instruction.next()?,
        })
    })?;

    registry.register_variable("player", |instruction, _| {
        Ok(PlayerVariable {
            field: instruction.next_enum()?,
        })
    })?;

    registry.register_variable("location", |instruction, _| {
        let field = if instruction.is_empty() {
            LocationField::Full
        } else {
            instruction.next_enum()?
        };
        Ok(LocationVariable { field })
    })?;

    Ok(())
}

/// Balance, or how much is missing to reach a target
enum MoneyVariable {
    Amount,
    Left(f64),
}

impl Variable for MoneyVariable {
    fn value(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<String, EvaluationError> {
        let balance = rt.integrations().economy()?.balance(player)?;
        Ok(match self {
            MoneyVariable::Amount => balance.to_string(),
            MoneyVariable::Left(target) => (target - balance).to_string(),
        })
    }
}

/// Property of an active objective; empty when it is not active
struct ObjectiveVariable {
    objective: ObjectId,
    property: String,
}

impl Variable for ObjectiveVariable {
    fn value(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<String, EvaluationError> {
        Ok(rt
            .objectives()
            .property(rt, player, &self.objective, &self.property)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerField {
    Name,
    Uuid,
}

impl ArgEnum for PlayerField {
    const VARIANTS: &'static [(&'static str, Self)] =
        &[("name", PlayerField::Name), ("uuid", PlayerField::Uuid)];
}

struct PlayerVariable {
    field: PlayerField,
}

impl Variable for PlayerVariable {
    fn value(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<String, EvaluationError> {
        match self.field {
            PlayerField::Name => rt.world().player_name(player),
            PlayerField::Uuid => Ok(player.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationField {
    Full,
    Xyz,
    X,
    Y,
    Z,
    World,
}

impl ArgEnum for LocationField {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("xyz", LocationField::Xyz),
        ("x", LocationField::X),
        ("y", LocationField::Y),
        ("z", LocationField::Z),
        ("world", LocationField::World),
    ];
}

struct LocationVariable {
    field: LocationField,
}

impl Variable for LocationVariable {
    fn value(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<String, EvaluationError> {
        let at = rt.world().location(player)?;
        Ok(match self.field {
            LocationField::Full => at.to_string(),
            LocationField::Xyz => format!("{} {} {}", at.x, at.y, at.z),
            LocationField::X => at.x.to_string(),
            LocationField::Y => at.y.to_string(),
            LocationField::Z => at.z.to_string(),
            LocationField::World => at.world,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    const PACKAGE: &str = r#"
[variables]
balance = "money amount"
missing = "money left:100"
name = "player name"
uuid = "player uuid"
where = "location"
coords = "location xyz"
height = "location y"
wolves_left = "objective wolves left"
bad_money = "money later"

[objectives]
wolves = "mobkill wolf 3"
"#;

    #[test]
    fn test_money_amount_and_left() {
        let fixture = Fixture::new(PACKAGE);
        fixture.world.update(&fixture.player, |p| p.balance = 42.0);
        assert_eq!(fixture.variable("balance"), "42");
        assert_eq!(fixture.variable("missing"), "58");
    }

    #[test]
    fn test_failing_provider_renders_empty() {
        let fixture = Fixture::new(PACKAGE);
        fixture.world.set_economy_down(true);
        assert_eq!(fixture.variable("balance"), "");
    }

    #[test]
    fn test_player_and_location() {
        let fixture = Fixture::new(PACKAGE);
        assert_eq!(fixture.variable("name"), "Alice");
        assert_eq!(fixture.variable("uuid"), "alice");
        assert_eq!(fixture.variable("where"), "0;64;0;world");
        assert_eq!(fixture.variable("coords"), "0 64 0");
        assert_eq!(fixture.variable("height"), "64");
    }

    #[test]
    fn test_objective_property() {
        let fixture = Fixture::new(PACKAGE);
        assert_eq!(fixture.variable("wolves_left"), "");
        fixture
            .rt
            .start_objective(&fixture.player, &ObjectId::new("town", "wolves"))
            .unwrap();
        assert_eq!(fixture.variable("wolves_left"), "3");
    }

    #[test]
    fn test_malformed_money_is_rejected_at_load() {
        let fixture = Fixture::new(PACKAGE);
        let packages = fixture.rt.packages();
        assert!(packages.is_broken(DefinitionKind::Variable, &ObjectId::new("town", "bad_money")));
        assert_eq!(packages.diagnostics().len(), 1);
    }
}
