use crate::core::{Command, Reply, Result};
use super::Transaction;

/// Callback invoked with the reply of the command it was queued with.
///
/// Runs after the whole batch has come back, so it may queue follow-up
/// commands; those go out with the next flush.
pub type Handler = Box<dyn FnOnce(&mut Transaction, Reply) -> Result<()> + Send>;

struct Slot {
    command: Command,
    handler: Option<Handler>,
}

/// Commands waiting for the next round trip, each with its handler slot.
#[derive(Default)]
pub struct CommandBatch {
    slots: Vec<Slot>,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command, handler: Option<Handler>) {
        self.slots.push(Slot { command, handler });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.slots.iter().map(|slot| &slot.command)
    }

    /// Empties the batch. Commands and handlers stay position-matched.
    pub fn drain(&mut self) -> (Vec<Command>, Vec<Option<Handler>>) {
        self.slots
            .drain(..)
            .map(|slot| (slot.command, slot.handler))
            .unzip()
    }
}

impl std::fmt::Debug for CommandBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|slot| slot.command.to_string()))
            .finish()
    }
}
