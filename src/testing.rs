//! Shared test fixture: a runtime over the sandbox world with one package

use std::sync::Arc;

use crate::id::PlayerId;
use crate::package::{PackageSources, RawPackage};
use crate::runtime::QuestRuntime;
use crate::world::{Integrations, Location, SandboxPlayer, SandboxWorld};

pub(crate) struct Fixture {
    pub rt: Arc<QuestRuntime>,
    pub world: Arc<SandboxWorld>,
    /// Online at 0;64;0;world with the name "Alice"
    pub player: PlayerId,
}

impl Fixture {
    /// Load `toml` as the package `town`
    pub fn new(toml: &str) -> Self {
        Self::with_packages(&[("town", toml)])
    }

    pub fn with_packages(packages: &[(&str, &str)]) -> Self {
        let world = Arc::new(SandboxWorld::new());
        let rt = QuestRuntime::builder(world.clone(), world.clone())
            .integrations(Integrations {
                economy: Some(world.clone()),
                stats: Some(world.clone()),
            })
            .build()
            .unwrap();

        let mut sources = PackageSources::new();
        for (name, toml) in packages {
            let raw: RawPackage = toml::from_str(toml).unwrap();
            sources.insert(name, raw);
        }
        let set = rt.compile(sources);
        rt.replace_packages(set);

        let player = PlayerId::from("alice");
        world.join(
            &player,
            SandboxPlayer::new("Alice", Location::new("world", 0.0, 64.0, 0.0)),
        );

        Self {
            rt: Arc::new(rt),
            world,
            player,
        }
    }

    pub fn check(&self, condition: &str) -> bool {
        self.rt.check(&self.player, condition, "town").unwrap()
    }

    pub fn fire(&self, event: &str) -> bool {
        self.rt.fire(&self.player, event, "town").unwrap()
    }

    pub fn variable(&self, variable: &str) -> String {
        self.rt.variable(&self.player, variable, "town").unwrap()
    }
}
