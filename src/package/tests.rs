use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::component::{Condition, Outcome};
use crate::error::{EvaluationError, RegistryError};
use crate::id::PlayerId;
use crate::instruction::Instruction;
use crate::objective::ObjectiveStatus;
use crate::runtime::QuestRuntime;
use crate::testing::Fixture;
use crate::world::{GameEvent, Integrations, SandboxWorld};

const TOWN: &str = r#"
[conditions]
sneaking = "sneak"
loop_a = "and loop_b"
loop_b = "or loop_a"
selfish = "and selfish"
uses_loop = "and loop_a"
guarded = "and castle.guard_near"
chatty = "sneak with extra words"

[events]
bad_lever = "lever nowhere on"
uses_bad = "folder bad_lever"
mystery = "teleport home"

[objectives]
wolves_one = "mobkill wolf 2"
wolves_two = "mobkill wolf 2"

[items]
sword = "iron_sword"
"#;

const CASTLE: &str = r#"
[conditions]
guard_near = "facing north"
"#;

fn fixture() -> Fixture {
    Fixture::with_packages(&[("town", TOWN), ("castle", CASTLE)])
}

fn reason(result: Result<Handle, ObjectNotFoundError>) -> NotFoundReason {
    match result {
        Ok(handle) => panic!("expected an error, got a {}", handle.kind()),
        Err(e) => e.reason,
    }
}

#[test]
fn test_mutual_reference_is_a_cycle() {
    let fixture = fixture();
    let packages = fixture.rt.packages();
    assert!(packages.is_broken(DefinitionKind::Condition, &ObjectId::new("town", "loop_a")));
    assert!(packages.is_broken(DefinitionKind::Condition, &ObjectId::new("town", "loop_b")));

    let cycle_reports = packages
        .diagnostics()
        .iter()
        .filter(|d| d.message.contains("town.loop_a -> town.loop_b -> town.loop_a"))
        .count();
    assert!(cycle_reports >= 2);

    assert_eq!(
        reason(packages.resolve("loop_a", DefinitionKind::Condition, "town")),
        NotFoundReason::Broken
    );
}

#[test]
fn test_self_reference_is_a_cycle() {
    let fixture = fixture();
    let packages = fixture.rt.packages();
    let diagnostic = packages
        .diagnostics()
        .iter()
        .find(|d| d.id == ObjectId::new("town", "selfish"))
        .unwrap();
    assert!(diagnostic.message.contains("town.selfish -> town.selfish"));
    assert_eq!(diagnostic.line.as_deref(), Some("and selfish"));
}

#[test]
fn test_referrer_of_cycle_fails_too() {
    let fixture = fixture();
    let packages = fixture.rt.packages();
    assert!(packages.is_broken(DefinitionKind::Condition, &ObjectId::new("town", "uses_loop")));
}

#[test]
fn test_broken_dependency_fails_only_dependents() {
    let fixture = fixture();
    let packages = fixture.rt.packages();
    assert!(packages.is_broken(DefinitionKind::Event, &ObjectId::new("town", "bad_lever")));
    assert!(packages.is_broken(DefinitionKind::Event, &ObjectId::new("town", "uses_bad")));
    assert!(packages.resolve("sneaking", DefinitionKind::Condition, "town").is_ok());
}

#[test]
fn test_unknown_keyword_is_reported() {
    let fixture = fixture();
    let packages = fixture.rt.packages();
    let diagnostic = packages
        .diagnostics()
        .iter()
        .find(|d| d.id == ObjectId::new("town", "mystery"))
        .unwrap();
    assert_eq!(diagnostic.kind, DefinitionKind::Event);
    assert!(diagnostic.message.contains("unknown event type 'teleport'"));
}

#[test]
fn test_extra_arguments_only_warn() {
    let fixture = fixture();
    assert!(!fixture.check("chatty"));
}

#[test]
fn test_resolution_failures() {
    let fixture = fixture();
    let packages = fixture.rt.packages();

    assert_eq!(
        reason(packages.resolve("sneaking", DefinitionKind::Event, "town")),
        NotFoundReason::WrongKind(DefinitionKind::Condition)
    );
    assert_eq!(
        reason(packages.resolve("dungeon.sneaking", DefinitionKind::Condition, "town")),
        NotFoundReason::UnknownPackage
    );
    assert_eq!(
        reason(packages.resolve("jumping", DefinitionKind::Condition, "town")),
        NotFoundReason::UnknownName
    );
    assert_eq!(
        reason(packages.resolve("sword", DefinitionKind::Item, "castle")),
        NotFoundReason::UnknownName
    );
}

#[test]
fn test_cross_package_reference() {
    let fixture = fixture();
    fixture.world.update(&fixture.player, |p| {
        p.location = p.location.clone().with_facing(180.0, 0.0);
    });
    assert!(fixture.check("guarded"));
    assert!(fixture.check("castle.guard_near"));
    assert!(!fixture.check("!castle.guard_near"));
}

#[test]
fn test_same_instruction_builds_independent_instances() {
    let fixture = fixture();
    let one = ObjectId::new("town", "wolves_one");
    let two = ObjectId::new("town", "wolves_two");
    fixture.rt.start_objective(&fixture.player, &one).unwrap();

    let kill = GameEvent::EntityKilled {
        player_id: fixture.player.clone(),
        entity_type: "wolf".to_string(),
    };
    fixture.rt.dispatch(&kill);
    fixture.rt.start_objective(&fixture.player, &two).unwrap();
    fixture.rt.dispatch(&kill);

    let store = fixture.rt.objectives();
    assert_eq!(store.status(&fixture.player, &one), ObjectiveStatus::Inactive);
    assert_eq!(store.status(&fixture.player, &two), ObjectiveStatus::Active);
    assert_eq!(
        store.property(&fixture.rt, &fixture.player, &two, "left").as_deref(),
        Some("1")
    );
}

#[test]
fn test_registry_builds_fresh_instance_per_call() {
    let fixture = fixture();
    let registry = ComponentRegistry::with_builtins(&Integrations::default()).unwrap();
    let sources = PackageSources::new();
    let mut resolver = Resolver::new(&registry, &sources);

    let line = Instruction::parse(ObjectId::new("town", "wolves"), "mobkill wolf 2").unwrap();
    let first = registry.objective(&mut line.clone(), &mut resolver).unwrap();
    let second = registry.objective(&mut line.clone(), &mut resolver).unwrap();
    assert_eq!(first.kind.initial(), second.kind.initial());

    let kill = GameEvent::EntityKilled {
        player_id: fixture.player.clone(),
        entity_type: "wolf".to_string(),
    };
    let mut first_data = first.kind.initial();
    let mut second_data = second.kind.initial();
    let outcome = first.kind.handle(&fixture.player, &mut first_data, &kill, &fixture.rt).unwrap();
    assert!(matches!(outcome, Outcome::Progressed));
    assert_ne!(first_data, second_data);
    assert_eq!(first.kind.property("left", &first_data).as_deref(), Some("1"));
    assert_eq!(second.kind.property("left", &second_data).as_deref(), Some("2"));

    // The second instance behaves the same from its own state
    let outcome = second.kind.handle(&fixture.player, &mut second_data, &kill, &fixture.rt).unwrap();
    assert!(matches!(outcome, Outcome::Progressed));
    assert_eq!(first_data, second_data);

    let sneak = Instruction::parse(ObjectId::new("town", "sneaky"), "sneak").unwrap();
    let one = registry.condition(&mut sneak.clone(), &mut resolver).unwrap();
    let two = registry.condition(&mut sneak.clone(), &mut resolver).unwrap();
    assert_eq!(one.check(&fixture.player, &fixture.rt), Ok(false));
    assert_eq!(two.check(&fixture.player, &fixture.rt), Ok(false));
    fixture.world.update(&fixture.player, |p| p.sneaking = true);
    assert_eq!(one.check(&fixture.player, &fixture.rt), Ok(true));
    assert_eq!(two.check(&fixture.player, &fixture.rt), Ok(true));
}

#[test]
fn test_duplicate_keyword_is_rejected() {
    let mut registry = ComponentRegistry::with_builtins(&Integrations::default()).unwrap();
    let err = registry
        .register_condition("sneak", |_, _| Ok(Always))
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::Duplicate {
            kind: DefinitionKind::Condition,
            keyword: "sneak".to_string(),
        }
    );

    // Keywords are case-sensitive
    assert!(!registry.has_keyword(DefinitionKind::Condition, "Sneak"));
    registry.register_condition("Sneak", |_, _| Ok(Always)).unwrap();
    assert!(registry.has_keyword(DefinitionKind::Condition, "Sneak"));
}

struct Always;

impl Condition for Always {
    fn check(&self, _player: &PlayerId, _rt: &QuestRuntime) -> Result<bool, EvaluationError> {
        Ok(true)
    }
}

#[test]
fn test_host_registered_keyword() {
    let mut registry = ComponentRegistry::with_builtins(&Integrations::default()).unwrap();
    registry.register_condition("always", |_, _| Ok(Always)).unwrap();

    let world = Arc::new(SandboxWorld::new());
    let rt = QuestRuntime::builder(world.clone(), world)
        .registry(registry)
        .build()
        .unwrap();
    let mut sources = PackageSources::new();
    sources.insert(
        "town",
        toml::from_str("[conditions]\nyes = \"always\"\nrich = \"money 5\"\n").unwrap(),
    );
    rt.replace_packages(rt.compile(sources));

    let player = PlayerId::from("nobody");
    assert_eq!(rt.check(&player, "yes", "town"), Ok(true));

    // No economy on this server
    let packages = rt.packages();
    let diagnostic = &packages.diagnostics()[0];
    assert_eq!(diagnostic.id, ObjectId::new("town", "rich"));
    assert!(diagnostic.message.contains("economy integration is not available"));
}

proptest! {
    #[test]
    fn prop_resolve_returns_requested_kind_or_not_found(
        name in prop::sample::select(vec![
            "sneaking", "loop_a", "bad_lever", "wolves_one", "sword", "castle.guard_near",
            "dungeon.x", "nothing", "uses_bad", "mystery",
        ]),
        kind_index in 0usize..DefinitionKind::ALL.len(),
    ) {
        let fixture = fixture();
        let kind = DefinitionKind::ALL[kind_index];
        match fixture.rt.packages().resolve(name, kind, "town") {
            Ok(handle) => prop_assert_eq!(handle.kind(), kind),
            Err(e) => prop_assert_eq!(e.kind, kind),
        }
    }
}
