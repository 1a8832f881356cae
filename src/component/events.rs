//! Built-in events

use std::sync::Arc;

use tracing::debug;

use super::{Event, EventHandle};
use crate::error::{EvaluationError, ObjectiveError, ParseErrorKind, RegistryError};
use crate::id::{DefinitionKind, ObjectId, PlayerId};
use crate::instruction::ArgEnum;
use crate::registry::ComponentRegistry;
use crate::runtime::QuestRuntime;
use crate::text::{Text, VarNum};
use crate::world::{Frame, Integrations, ItemTemplate, Location, NotifyChannel};

pub(crate) fn register(registry: &mut ComponentRegistry, integrations: &Integrations) -> Result<(), RegistryError> {
    registry.register_event("lever", |instruction, _| {
        Ok(LeverEvent {
            location: instruction.next_location()?,
            action: instruction.next_enum()?,
        })
    })?;

    registry.register_event("folder", |instruction, resolver| {
        let package = instruction.package().to_string();
        let delay = match instruction.optional("delay") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                instruction.error_here(ParseErrorKind::InvalidNumber {
                    token: raw.clone(),
                    expected: "tick count",
                })
            })?,
            None => 0,
        };
        let ids = instruction.next_list()?;
        Ok(FolderEvent {
            events: resolver.events(&ids, &package)?,
            delay,
        })
    })?;

    registry.register_event("objective", |instruction, resolver| {
        let package = instruction.package().to_string();
        let action = instruction.next_enum()?;
        let raw = instruction.next()?;
        Ok(ObjectiveEvent {
            action,
            objective: resolver.objective(&raw, &package)?,
        })
    })?;

    registry.register_event("notify", |instruction, resolver| {
        let package = instruction.package().to_string();
        let channel = match instruction.optional("io") {
            Some(raw) => NotifyChannel::from_arg(&raw).ok_or_else(|| {
                instruction.error_here(ParseErrorKind::InvalidEnum {
                    token: raw.clone(),
                    allowed: NotifyChannel::names(),
                })
            })?,
            None => NotifyChannel::Chat,
        };
        let message = instruction.rest()?;
        Ok(NotifyEvent {
            channel,
            text: resolver.text(&message, &package)?,
        })
    })?;

    registry.register_event("give", |instruction, resolver| {
        Ok(GiveEvent {
            items: resolver.next_items(instruction)?,
        })
    })?;

    registry.register_event("take", |instruction, resolver| {
        Ok(TakeEvent {
            items: resolver.next_items(instruction)?,
        })
    })?;

    if integrations.economy.is_some() {
        registry.register_event("money", |instruction, resolver| {
            Ok(MoneyEvent {
                amount: resolver.next_var_num(instruction)?,
            })
        })?;
    } else {
        registry.register_unavailable(DefinitionKind::Event, "money", "economy")?;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeverAction {
    On,
    Off,
    Toggle,
}

impl ArgEnum for LeverAction {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("on", LeverAction::On),
        ("off", LeverAction::Off),
        ("toggle", LeverAction::Toggle),
    ];
}

/// Switches a lever; anything else at the location is left alone
struct LeverEvent {
    location: Location,
    action: LeverAction,
}

impl Event for LeverEvent {
    fn fire(&self, _player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError> {
        let Some(mut block) = rt.world().block(&self.location) else {
            return Ok(());
        };
        if block.material != "lever" {
            return Ok(());
        }
        block.powered = match self.action {
            LeverAction::On => true,
            LeverAction::Off => false,
            LeverAction::Toggle => !block.powered,
        };
        rt.world().set_block(&self.location, block)
    }
}

/// Fires other events in order, optionally some ticks later
struct FolderEvent {
    events: Vec<EventHandle>,
    delay: u64,
}

impl Event for FolderEvent {
    fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError> {
        if self.delay == 0 {
            super::fire_all(&self.events, player, rt);
            return Ok(());
        }
        let events = self.events.clone();
        let player = player.clone();
        rt.scheduler().schedule_after(
            self.delay,
            Box::new(move |rt: &QuestRuntime| super::fire_all(&events, &player, rt)),
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectiveAction {
    Start,
    Cancel,
    Complete,
}

impl ArgEnum for ObjectiveAction {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("start", ObjectiveAction::Start),
        ("add", ObjectiveAction::Start),
        ("cancel", ObjectiveAction::Cancel),
        ("remove", ObjectiveAction::Cancel),
        ("complete", ObjectiveAction::Complete),
        ("finish", ObjectiveAction::Complete),
    ];
}

struct ObjectiveEvent {
    action: ObjectiveAction,
    objective: ObjectId,
}

impl Event for ObjectiveEvent {
    fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError> {
        let store = rt.objectives();
        let result = match self.action {
            ObjectiveAction::Start => store.start(rt, player, &self.objective),
            ObjectiveAction::Cancel => store.cancel(rt, player, &self.objective),
            ObjectiveAction::Complete => store.complete(rt, player, &self.objective),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e @ (ObjectiveError::AlreadyActive { .. } | ObjectiveError::NotActive { .. })) => {
                debug!("{}", e);
                Ok(())
            }
            Err(ObjectiveError::NotFound(e)) => Err(e.into()),
        }
    }
}

impl ArgEnum for NotifyChannel {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("chat", NotifyChannel::Chat),
        ("actionbar", NotifyChannel::ActionBar),
        ("title", NotifyChannel::Title),
    ];
}

struct NotifyEvent {
    channel: NotifyChannel,
    text: Text,
}

impl Event for NotifyEvent {
    fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError> {
        if !rt.world().is_online(player) {
            return Err(EvaluationError::PlayerOffline(player.clone()));
        }
        rt.renderer().render(
            player,
            Frame::Notify {
                channel: self.channel,
                text: self.text.render(player, rt),
            },
        );
        Ok(())
    }
}

struct GiveEvent {
    items: Vec<(Arc<ItemTemplate>, u32)>,
}

impl Event for GiveEvent {
    fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError> {
        for (item, amount) in &self.items {
            rt.world().give_item(player, item, *amount)?;
        }
        Ok(())
    }
}

/// Takes what the player has, up to the listed amounts
struct TakeEvent {
    items: Vec<(Arc<ItemTemplate>, u32)>,
}

impl Event for TakeEvent {
    fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError> {
        for (item, amount) in &self.items {
            let taken = rt.world().take_item(player, item, *amount)?;
            if taken < *amount {
                debug!(
                    "Player {} only had {} of {} {}",
                    player,
                    taken,
                    amount,
                    item.key()
                );
            }
        }
        Ok(())
    }
}

/// Deposits a positive amount, withdraws a negative one
struct MoneyEvent {
    amount: VarNum,
}

impl Event for MoneyEvent {
    fn fire(&self, player: &PlayerId, rt: &QuestRuntime) -> Result<(), EvaluationError> {
        let amount = self.amount.resolve(player, rt)?;
        let economy = rt.integrations().economy()?;
        if amount >= 0.0 {
            economy.deposit(player, amount)
        } else {
            economy.withdraw(player, -amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Block;
    use crate::testing::Fixture;

    const PACKAGE: &str = r#"
[conditions]
sneaking = "sneak"

[events]
lever_on = "lever 10;64;10;world on"
lever_flip = "lever 10;64;10;world toggle"
greet = "notify Hello %name%, you have %purse% coins io:actionbar"
status = "notify Conditions: are fine"
reward = "give sword:2,gold"
fine = "take gold:5"
pay = "money +25"
charge = "money -10"
start_hunt = "objective start hunt"
cancel_hunt = "objective cancel hunt"
finish_hunt = "objective complete hunt"
sneaky_reward = "give gold conditions:sneaking"
bundle = "folder pay,reward"
later = "folder pay delay:2"

[objectives]
hunt = "mobkill wolf 3 events:pay"

[variables]
name = "player name"
purse = "money amount"

[items]
sword = "iron_sword name:Old_Blade"
gold = "gold_nugget"
"#;

    fn lever(fixture: &Fixture) -> Option<Block> {
        fixture
            .rt
            .world()
            .block(&Location::new("world", 10.0, 64.0, 10.0))
    }

    #[test]
    fn test_lever_only_touches_levers() {
        let fixture = Fixture::new(PACKAGE);
        let at = Location::new("world", 10.0, 64.0, 10.0);

        fixture.world.place_block(&at, Block::new("stone"));
        fixture.fire("lever_on");
        assert_eq!(lever(&fixture), Some(Block::new("stone")));

        fixture.world.place_block(&at, Block::new("lever"));
        fixture.fire("lever_on");
        assert!(lever(&fixture).unwrap().powered);
        fixture.fire("lever_flip");
        assert!(!lever(&fixture).unwrap().powered);
    }

    #[test]
    fn test_notify_renders_variables_on_channel() {
        let fixture = Fixture::new(PACKAGE);
        fixture.world.update(&fixture.player, |p| p.balance = 12.5);
        fixture.fire("greet");
        assert_eq!(
            fixture.world.take_frames(&fixture.player),
            vec![Frame::Notify {
                channel: NotifyChannel::ActionBar,
                text: "Hello Alice, you have 12.5 coins".to_string(),
            }]
        );
    }

    #[test]
    fn test_notify_keeps_key_without_value() {
        let fixture = Fixture::new(PACKAGE);
        fixture.fire("status");
        assert_eq!(
            fixture.world.take_frames(&fixture.player),
            vec![Frame::Notify {
                channel: NotifyChannel::Chat,
                text: "Conditions: are fine".to_string(),
            }]
        );
    }

    #[test]
    fn test_items_and_money() {
        let fixture = Fixture::new(PACKAGE);
        fixture.fire("reward");
        fixture.fire("reward");
        fixture.fire("fine");
        fixture.fire("pay");
        fixture.fire("charge");

        let alice = fixture.world.snapshot(&fixture.player).unwrap();
        assert_eq!(alice.inventory.get("iron_sword|Old Blade"), Some(&4));
        assert_eq!(alice.inventory.get("gold_nugget"), Some(&0));
        assert_eq!(alice.balance, 15.0);
    }

    #[test]
    fn test_event_conditions_gate_firing() {
        let fixture = Fixture::new(PACKAGE);
        assert!(!fixture.fire("sneaky_reward"));
        fixture.world.update(&fixture.player, |p| p.sneaking = true);
        assert!(fixture.fire("sneaky_reward"));
        let alice = fixture.world.snapshot(&fixture.player).unwrap();
        assert_eq!(alice.inventory.get("gold_nugget"), Some(&1));
    }

    #[test]
    fn test_objective_actions() {
        let fixture = Fixture::new(PACKAGE);
        let hunt = ObjectId::new("town", "hunt");

        fixture.fire("start_hunt");
        fixture.fire("start_hunt");
        assert!(fixture.rt.objectives().is_active(&fixture.player, &hunt));

        fixture.fire("cancel_hunt");
        fixture.fire("cancel_hunt");
        assert!(!fixture.rt.objectives().is_active(&fixture.player, &hunt));

        fixture.fire("start_hunt");
        fixture.fire("finish_hunt");
        assert!(!fixture.rt.objectives().is_active(&fixture.player, &hunt));
        assert_eq!(fixture.world.snapshot(&fixture.player).unwrap().balance, 25.0);
    }

    #[test]
    fn test_folder_fires_in_order_and_later() {
        let fixture = Fixture::new(PACKAGE);
        fixture.fire("bundle");
        let alice = fixture.world.snapshot(&fixture.player).unwrap();
        assert_eq!(alice.balance, 25.0);
        assert_eq!(alice.inventory.get("iron_sword|Old Blade"), Some(&2));

        fixture.fire("later");
        fixture.rt.tick();
        assert_eq!(fixture.world.snapshot(&fixture.player).unwrap().balance, 25.0);
        fixture.rt.tick();
        assert_eq!(fixture.world.snapshot(&fixture.player).unwrap().balance, 50.0);
    }
}
