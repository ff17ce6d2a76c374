//! Per-sheet undo/redo stacks.

use crate::command::Command;

pub const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    max_entries: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl History {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Record an executed command. Clears the redo stack and evicts the
    /// oldest entry past the cap.
    pub(crate) fn push(&mut self, command: Command) {
        self.undo_stack.push(command);
        self.redo_stack.clear();

        if self.undo_stack.len() > self.max_entries {
            let evicted = self.undo_stack.remove(0);
            log::debug!("history full, evicting oldest entry: {}", evicted.label());
        }
    }

    /// Pop the last entry for undo and move it onto the redo stack.
    pub(crate) fn undo(&mut self) -> Option<Command> {
        let command = self.undo_stack.pop()?;
        self.redo_stack.push(command.clone());
        Some(command)
    }

    /// Pop from the redo stack and move it back onto the undo stack.
    pub(crate) fn redo(&mut self) -> Option<Command> {
        let command = self.redo_stack.pop()?;
        self.undo_stack.push(command.clone());
        Some(command)
    }

    /// Swap the top undo entry for a re-recorded version of the same edit.
    pub(crate) fn replace_last_undo(&mut self, command: Command) {
        match self.undo_stack.last_mut() {
            Some(last) => *last = command,
            None => self.undo_stack.push(command),
        }
    }

    /// Change the cap, dropping the oldest entries if the stack is over it.
    pub(crate) fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        if self.undo_stack.len() > self.max_entries {
            let excess = self.undo_stack.len() - self.max_entries;
            self.undo_stack.drain(..excess);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Label of the command the next undo would revert.
    pub fn undo_label(&self) -> Option<String> {
        self.undo_stack.last().map(Command::label)
    }

    pub fn redo_label(&self) -> Option<String> {
        self.redo_stack.last().map(Command::label)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
