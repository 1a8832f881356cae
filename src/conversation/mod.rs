//! Conversation Engine
//!
//! A conversation is a graph of NPC lines and player replies. Starting one
//! shows the first NPC line whose conditions pass; choosing a reply fires its
//! events and follows its pointers to the next NPC line.
//!
//! Session locks are never held while conditions or events run. Every step
//! re-checks that its session is still the player's current one, so a session
//! ended by an event cannot be advanced afterwards.

pub mod io;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::component::{ConditionHandle, EventHandle, all_met, fire_all};
use crate::error::{ConstructionError, ConversationError};
use crate::id::{ObjectId, PlayerId};
use crate::package::{RawConversation, RawOption, Resolver};
use crate::runtime::QuestRuntime;
use crate::text::Text;

pub use io::ConversationIo;

/// One NPC line or player reply
pub struct DialogOption {
    text: Text,
    conditions: Vec<ConditionHandle>,
    events: Vec<EventHandle>,
    pointers: Vec<String>,
}

/// Compiled conversation graph
pub struct ConversationDef {
    id: ObjectId,
    quester: Text,
    first: Vec<String>,
    io: Option<String>,
    final_events: Vec<EventHandle>,
    npc_options: HashMap<String, DialogOption>,
    player_options: HashMap<String, DialogOption>,
}

impl ConversationDef {
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn io(&self) -> Option<&str> {
        self.io.as_deref()
    }
}

/// Build a conversation, checking every pointer lands on an existing option
pub(crate) fn compile(
    id: &ObjectId,
    raw: &RawConversation,
    resolver: &mut Resolver<'_>,
) -> Result<ConversationDef, ConstructionError> {
    let package = id.package();

    if raw.first.is_empty() {
        return Err(ConstructionError::Invalid(
            "conversation has no starting NPC options".to_string(),
        ));
    }
    for pointer in &raw.first {
        if !raw.npc_options.contains_key(pointer) {
            return Err(ConstructionError::Invalid(format!(
                "starting option '{}' is not an NPC option",
                pointer
            )));
        }
    }
    for (name, option) in &raw.npc_options {
        for pointer in &option.pointers {
            if !raw.player_options.contains_key(pointer) {
                return Err(ConstructionError::Invalid(format!(
                    "NPC option '{}' points to unknown player option '{}'",
                    name, pointer
                )));
            }
        }
    }
    for (name, option) in &raw.player_options {
        for pointer in &option.pointers {
            if !raw.npc_options.contains_key(pointer) {
                return Err(ConstructionError::Invalid(format!(
                    "player option '{}' points to unknown NPC option '{}'",
                    name, pointer
                )));
            }
        }
    }
    if let Some(io) = &raw.io {
        if resolver.registry().io(io).is_none() {
            return Err(ConstructionError::Invalid(format!(
                "conversation IO '{}' is not registered",
                io
            )));
        }
    }

    let mut compile_options = |options: &HashMap<String, RawOption>| {
        options
            .iter()
            .map(|(name, option)| -> Result<(String, DialogOption), ConstructionError> {
                let compiled = DialogOption {
                    text: resolver.text(&option.text, package)?,
                    conditions: resolver.conditions(&option.conditions, package)?,
                    events: resolver.events(&option.events, package)?,
                    pointers: option.pointers.clone(),
                };
                Ok((name.clone(), compiled))
            })
            .collect::<Result<HashMap<_, _>, ConstructionError>>()
    };
    let npc_options = compile_options(&raw.npc_options)?;
    let player_options = compile_options(&raw.player_options)?;

    Ok(ConversationDef {
        id: id.clone(),
        quester: resolver.text(&raw.quester, package)?,
        first: raw.first.clone(),
        io: raw.io.clone(),
        final_events: resolver.events(&raw.final_events, package)?,
        npc_options,
        player_options,
    })
}

/// What the player currently sees
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    /// Waiting for the player to pick one of `options` (0-based)
    Selecting {
        conversation: ObjectId,
        npc_text: String,
        options: Vec<String>,
    },
    /// A choice is being carried out
    Resolving,
    Ended,
}

enum Phase {
    /// Conditions or events are running; selections are refused
    Resolving,
    Selecting {
        npc_text: String,
        /// (player option name, rendered text)
        offered: Vec<(String, String)>,
    },
    Ended,
}

struct Session {
    id: Uuid,
    def: Arc<ConversationDef>,
    phase: Phase,
    /// NPC options shown so far
    history: Vec<String>,
    io: Box<dyn ConversationIo>,
}

impl Session {
    fn state(&self) -> ConversationState {
        match &self.phase {
            Phase::Selecting { npc_text, offered } => ConversationState::Selecting {
                conversation: self.def.id.clone(),
                npc_text: npc_text.clone(),
                options: offered.iter().map(|(_, text)| text.clone()).collect(),
            },
            Phase::Resolving => ConversationState::Resolving,
            Phase::Ended => ConversationState::Ended,
        }
    }
}

type SessionRef = Arc<Mutex<Session>>;

/// Active conversation sessions, at most one per player
#[derive(Default)]
pub struct ConversationManager {
    sessions: DashMap<PlayerId, SessionRef>,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &self,
        rt: &QuestRuntime,
        player: &PlayerId,
        conversation: &ObjectId,
    ) -> Result<ConversationState, ConversationError> {
        let def = rt.packages().conversation(conversation)?;
        let io_name = def.io().unwrap_or(rt.default_io()).to_string();
        let factory = rt
            .registry()
            .io(&io_name)
            .cloned()
            .ok_or(ConversationError::UnknownIo(io_name))?;

        let session = Arc::new(Mutex::new(Session {
            id: Uuid::new_v4(),
            def: def.clone(),
            phase: Phase::Resolving,
            history: Vec::new(),
            io: factory(player.clone(), rt.renderer()),
        }));
        match self.sessions.entry(player.clone()) {
            Entry::Occupied(_) => return Err(ConversationError::AlreadyActive(player.clone())),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }
        info!(
            "Player {} started conversation '{}' (session {})",
            player,
            conversation,
            session.lock().id
        );

        Ok(self.advance(rt, player, &session, &def, &def.first))
    }

    /// Choose one of the offered replies by 0-based index
    pub fn select(
        &self,
        rt: &QuestRuntime,
        player: &PlayerId,
        index: usize,
    ) -> Result<ConversationState, ConversationError> {
        let session = self.session(player)?;
        let (def, chosen) = {
            let mut s = session.lock();
            let chosen = match &s.phase {
                Phase::Selecting { offered, .. } => offered
                    .get(index)
                    .map(|(name, _)| name.clone())
                    .ok_or(ConversationError::InvalidSelection {
                        index,
                        available: offered.len(),
                    })?,
                Phase::Resolving => return Err(ConversationError::Busy(player.clone())),
                Phase::Ended => return Err(ConversationError::NoSession(player.clone())),
            };
            s.phase = Phase::Resolving;
            (s.def.clone(), chosen)
        };
        debug!("Player {} chose '{}' in '{}'", player, chosen, def.id);

        let Some(option) = def.player_options.get(&chosen) else {
            self.finish(rt, player, &session, true);
            return Ok(ConversationState::Ended);
        };
        fire_all(&option.events, player, rt);

        if !self.is_current(player, &session) {
            return Ok(ConversationState::Ended);
        }
        if option.pointers.is_empty() {
            self.finish(rt, player, &session, true);
            return Ok(ConversationState::Ended);
        }
        Ok(self.advance(rt, player, &session, &def, &option.pointers))
    }

    /// Pass strategy-specific input (e.g. paging) to the session's IO
    pub fn navigate(&self, player: &PlayerId, command: &str) -> Result<bool, ConversationError> {
        let session = self.session(player)?;
        let mut s = session.lock();
        if !matches!(s.phase, Phase::Selecting { .. }) {
            return Ok(false);
        }
        Ok(s.io.navigate(command))
    }

    /// End the player's conversation, firing its final events.
    /// Returns false if there was nothing to end.
    pub fn end(&self, rt: &QuestRuntime, player: &PlayerId) -> bool {
        match self.session(player) {
            Ok(session) => self.finish(rt, player, &session, true),
            Err(_) => false,
        }
    }

    /// Drop the player's session without firing final events
    pub fn disconnect(&self, rt: &QuestRuntime, player: &PlayerId) -> bool {
        match self.session(player) {
            Ok(session) => self.finish(rt, player, &session, false),
            Err(_) => false,
        }
    }

    pub fn is_active(&self, player: &PlayerId) -> bool {
        self.sessions.contains_key(player)
    }

    pub fn state(&self, player: &PlayerId) -> Option<ConversationState> {
        let session = self.session(player).ok()?;
        let state = session.lock().state();
        Some(state)
    }

    /// NPC options the player has seen in the current session
    pub fn history(&self, player: &PlayerId) -> Vec<String> {
        self.session(player)
            .map(|s| s.lock().history.clone())
            .unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, player: &PlayerId) -> Result<SessionRef, ConversationError> {
        self.sessions
            .get(player)
            .map(|s| s.value().clone())
            .ok_or_else(|| ConversationError::NoSession(player.clone()))
    }

    fn is_current(&self, player: &PlayerId, session: &SessionRef) -> bool {
        self.sessions
            .get(player)
            .is_some_and(|s| Arc::ptr_eq(s.value(), session))
    }

    /// Show the first NPC option in `pointers` whose conditions pass
    fn advance(
        &self,
        rt: &QuestRuntime,
        player: &PlayerId,
        session: &SessionRef,
        def: &ConversationDef,
        pointers: &[String],
    ) -> ConversationState {
        let npc = pointers.iter().find_map(|name| {
            def.npc_options
                .get(name)
                .filter(|option| all_met(&option.conditions, player, rt))
                .map(|option| (name, option))
        });
        let Some((npc_name, npc)) = npc else {
            debug!("No NPC option available in '{}', ending", def.id);
            self.finish(rt, player, session, true);
            return ConversationState::Ended;
        };

        fire_all(&npc.events, player, rt);
        if !self.is_current(player, session) {
            return ConversationState::Ended;
        }

        let offered: Vec<(String, String)> = npc
            .pointers
            .iter()
            .filter_map(|name| {
                def.player_options
                    .get(name)
                    .filter(|option| all_met(&option.conditions, player, rt))
                    .map(|option| (name.clone(), option.text.render(player, rt)))
            })
            .collect();
        let quester = def.quester.render(player, rt);
        let npc_text = npc.text.render(player, rt);

        let state = {
            let mut s = session.lock();
            if matches!(s.phase, Phase::Ended) {
                return ConversationState::Ended;
            }
            s.history.push(npc_name.clone());
            s.io.clear();
            s.io.set_npc_response(&quester, &npc_text);
            for (_, text) in &offered {
                s.io.add_player_option(text);
            }
            s.io.display();
            s.phase = Phase::Selecting {
                npc_text,
                offered,
            };
            s.state()
        };

        if let ConversationState::Selecting { options, .. } = &state {
            if options.is_empty() {
                self.finish(rt, player, session, true);
                return ConversationState::Ended;
            }
        }
        state
    }

    /// Tear down `session` if it is still current. Only the caller that
    /// removes it from the map runs the teardown.
    fn finish(&self, rt: &QuestRuntime, player: &PlayerId, session: &SessionRef, natural: bool) -> bool {
        if self
            .sessions
            .remove_if(player, |_, current| Arc::ptr_eq(current, session))
            .is_none()
        {
            return false;
        }

        let (def, id) = {
            let mut s = session.lock();
            s.phase = Phase::Ended;
            s.io.end();
            (s.def.clone(), s.id)
        };
        if natural {
            fire_all(&def.final_events, player, rt);
        }
        info!(
            "Player {} left conversation '{}' (session {}{})",
            player,
            def.id,
            id,
            if natural { "" } else { ", interrupted" }
        );
        true
    }
}
