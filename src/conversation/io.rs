//! Conversation IO strategies
//!
//! Each session gets its own IO instance, created by name through the
//! component registry. The engine feeds it the NPC line and the offered
//! replies, then asks it to display them.

use std::sync::Arc;

use crate::error::RegistryError;
use crate::id::PlayerId;
use crate::registry::ComponentRegistry;
use crate::world::{Frame, Renderer};

/// Presentation of one conversation session
pub trait ConversationIo: Send {
    fn set_npc_response(&mut self, npc_name: &str, text: &str);

    fn add_player_option(&mut self, text: &str);

    fn display(&mut self);

    /// Forget the current prompt before the next one is set
    fn clear(&mut self);

    /// Session is over
    fn end(&mut self);

    /// Strategy-specific input such as paging. Returns whether it was handled.
    fn navigate(&mut self, _command: &str) -> bool {
        false
    }
}

pub fn register(registry: &mut ComponentRegistry) -> Result<(), RegistryError> {
    registry.register_io("simple", |player, renderer| {
        Box::new(ChatIo::new(player, renderer, None)) as Box<dyn ConversationIo>
    })?;
    registry.register_io("paged", |player, renderer| {
        Box::new(ChatIo::new(player, renderer, Some(PAGE_SIZE))) as Box<dyn ConversationIo>
    })?;
    registry.register_io("menu", |player, renderer| {
        Box::new(MenuIo::new(player, renderer, false)) as Box<dyn ConversationIo>
    })?;
    registry.register_io("combined", |player, renderer| {
        Box::new(MenuIo::new(player, renderer, true)) as Box<dyn ConversationIo>
    })?;
    Ok(())
}

const PAGE_SIZE: usize = 3;

#[derive(Default)]
struct Prompt {
    npc_name: String,
    npc_text: String,
    options: Vec<String>,
}

impl Prompt {
    fn npc_line(&self) -> String {
        format!("{}: {}", self.npc_name, self.npc_text)
    }
}

/// Numbered replies in chat, optionally split into pages
pub struct ChatIo {
    player: PlayerId,
    renderer: Arc<dyn Renderer>,
    prompt: Prompt,
    page_size: Option<usize>,
    page: usize,
}

impl ChatIo {
    pub fn new(player: PlayerId, renderer: Arc<dyn Renderer>, page_size: Option<usize>) -> Self {
        Self {
            player,
            renderer,
            prompt: Prompt::default(),
            page_size: page_size.filter(|size| *size > 0),
            page: 0,
        }
    }

    fn pages(&self) -> usize {
        match self.page_size {
            Some(size) => self.prompt.options.len().div_ceil(size).max(1),
            None => 1,
        }
    }
}

impl ConversationIo for ChatIo {
    fn set_npc_response(&mut self, npc_name: &str, text: &str) {
        self.prompt.npc_name = npc_name.to_string();
        self.prompt.npc_text = text.to_string();
    }

    fn add_player_option(&mut self, text: &str) {
        self.prompt.options.push(text.to_string());
    }

    fn display(&mut self) {
        let mut lines = vec![self.prompt.npc_line()];
        let (start, end) = match self.page_size {
            Some(size) => {
                let start = self.page * size;
                (start, (start + size).min(self.prompt.options.len()))
            }
            None => (0, self.prompt.options.len()),
        };
        for (i, option) in self.prompt.options[start..end].iter().enumerate() {
            lines.push(format!("{}. {}", start + i + 1, option));
        }
        if self.pages() > 1 {
            lines.push(format!("(page {}/{})", self.page + 1, self.pages()));
        }
        self.renderer.render(&self.player, Frame::Chat { lines });
    }

    fn clear(&mut self) {
        self.prompt = Prompt::default();
        self.page = 0;
    }

    fn end(&mut self) {}

    fn navigate(&mut self, command: &str) -> bool {
        if self.page_size.is_none() {
            return false;
        }
        let page = match command {
            "next" if self.page + 1 < self.pages() => self.page + 1,
            "previous" if self.page > 0 => self.page - 1,
            "next" | "previous" => self.page,
            _ => return false,
        };
        self.page = page;
        self.display();
        true
    }
}

/// Inventory-style menu, one slot per reply
pub struct MenuIo {
    player: PlayerId,
    renderer: Arc<dyn Renderer>,
    prompt: Prompt,
    /// Also print the NPC line in chat
    echo: bool,
}

impl MenuIo {
    pub fn new(player: PlayerId, renderer: Arc<dyn Renderer>, echo: bool) -> Self {
        Self {
            player,
            renderer,
            prompt: Prompt::default(),
            echo,
        }
    }
}

impl ConversationIo for MenuIo {
    fn set_npc_response(&mut self, npc_name: &str, text: &str) {
        self.prompt.npc_name = npc_name.to_string();
        self.prompt.npc_text = text.to_string();
    }

    fn add_player_option(&mut self, text: &str) {
        self.prompt.options.push(text.to_string());
    }

    fn display(&mut self) {
        if self.echo {
            self.renderer.render(
                &self.player,
                Frame::Chat {
                    lines: vec![self.prompt.npc_line()],
                },
            );
        }
        self.renderer.render(
            &self.player,
            Frame::Menu {
                title: self.prompt.npc_name.clone(),
                text: self.prompt.npc_text.clone(),
                slots: self.prompt.options.clone(),
            },
        );
    }

    fn clear(&mut self) {
        self.prompt = Prompt::default();
    }

    fn end(&mut self) {
        self.renderer.render(&self.player, Frame::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SandboxWorld;

    fn prompt(io: &mut dyn ConversationIo, options: &[&str]) {
        io.clear();
        io.set_npc_response("Innkeeper", "What will it be?");
        for option in options {
            io.add_player_option(option);
        }
        io.display();
    }

    #[test]
    fn test_simple_numbers_options() {
        let world = Arc::new(SandboxWorld::new());
        let player = PlayerId::from("alice");
        let mut io = ChatIo::new(player.clone(), world.clone(), None);

        prompt(&mut io, &["Ale", "Bread"]);
        assert_eq!(
            world.take_frames(&player),
            vec![Frame::Chat {
                lines: vec![
                    "Innkeeper: What will it be?".to_string(),
                    "1. Ale".to_string(),
                    "2. Bread".to_string(),
                ]
            }]
        );
        assert!(!io.navigate("next"));
    }

    #[test]
    fn test_paged_navigation() {
        let world = Arc::new(SandboxWorld::new());
        let player = PlayerId::from("alice");
        let mut io = ChatIo::new(player.clone(), world.clone(), Some(2));

        prompt(&mut io, &["a", "b", "c"]);
        let frames = world.take_frames(&player);
        assert_eq!(
            frames,
            vec![Frame::Chat {
                lines: vec![
                    "Innkeeper: What will it be?".to_string(),
                    "1. a".to_string(),
                    "2. b".to_string(),
                    "(page 1/2)".to_string(),
                ]
            }]
        );

        assert!(io.navigate("next"));
        match world.take_frames(&player).as_slice() {
            [Frame::Chat { lines }] => {
                assert_eq!(lines[1], "3. c");
                assert_eq!(lines[2], "(page 2/2)");
            }
            other => panic!("unexpected frames: {:?}", other),
        }

        // Already on the last page: re-rendered, still handled
        assert!(io.navigate("next"));
        assert!(!io.navigate("jump"));
    }

    #[test]
    fn test_combined_echoes_and_closes() {
        let world = Arc::new(SandboxWorld::new());
        let player = PlayerId::from("alice");
        let mut io = MenuIo::new(player.clone(), world.clone(), true);

        prompt(&mut io, &["Ale"]);
        io.end();
        let frames = world.take_frames(&player);
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Frame::Chat { .. }));
        assert!(matches!(&frames[1], Frame::Menu { slots, .. } if slots == &vec!["Ale".to_string()]));
        assert_eq!(frames[2], Frame::Close);
    }
}
