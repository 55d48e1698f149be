//! Undo/redo history with transactional grouping.
//!
//! Every reversible mutation is recorded as a [`Command`]. Commands pushed
//! while a [`HistoryManager::group`] guard is alive coalesce into a single
//! atomic entry that undoes in reverse order and redoes forward.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default bound on each history stack.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Errors surfaced by command execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The command outlived the state manager it mutates.
    #[error("state manager was dropped before the command ran")]
    Detached,
}

/// A reversible unit of mutation.
pub trait Command: Send {
    /// Human-readable label for the mutation.
    fn description(&self) -> &str;

    /// Apply the mutation (used by redo).
    fn execute(&mut self) -> Result<(), StateError>;

    /// Reverse the mutation.
    fn undo(&mut self) -> Result<(), StateError>;
}

/// One undo/redo stack entry.
enum Entry {
    Single(Box<dyn Command>),
    Group(Vec<Box<dyn Command>>),
}

impl Entry {
    fn label(&self) -> String {
        match self {
            Self::Single(command) => command.description().to_string(),
            Self::Group(commands) => format!("group of {} commands", commands.len()),
        }
    }
}

#[derive(Default)]
struct Stacks {
    undo: VecDeque<Entry>,
    redo: VecDeque<Entry>,
    group_depth: usize,
    pending_group: Vec<Box<dyn Command>>,
}

/// Bounded undo/redo command stacks with reentrant grouping.
///
/// Cloning shares the underlying stacks.
#[derive(Clone)]
pub struct HistoryManager {
    stacks: Arc<Mutex<Stacks>>,
    max_depth: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryManager {
    /// History bounded at [`DEFAULT_MAX_DEPTH`] entries per stack.
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// History bounded at `max_depth` entries per stack. The oldest entry
    /// is discarded silently once the bound is exceeded.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { stacks: Arc::new(Mutex::new(Stacks::default())), max_depth }
    }

    /// Record an already-executed command.
    ///
    /// Inside an open group the command joins the pending group; otherwise
    /// it lands on the undo stack and clears the redo stack.
    pub fn add_command(&self, command: Box<dyn Command>) {
        let mut stacks = self.stacks.lock();
        if stacks.group_depth > 0 {
            debug!(command = command.description(), "command added to open group");
            stacks.pending_group.push(command);
        } else {
            self.push_undo(&mut stacks, Entry::Single(command));
        }
    }

    /// Open a command group for the lifetime of the returned guard.
    ///
    /// Nested calls coalesce into the outermost group. The group closes on
    /// every exit path, including unwinding; commands accumulated before a
    /// fault are committed as the group's content.
    #[must_use = "the group stays open for the lifetime of the guard"]
    pub fn group(&self, description: &str) -> GroupGuard {
        let mut stacks = self.stacks.lock();
        stacks.group_depth += 1;
        if stacks.group_depth == 1 {
            debug!(description, "starting command group");
        }
        GroupGuard { history: self.clone(), description: description.to_string() }
    }

    /// Whether an undo entry is available.
    pub fn can_undo(&self) -> bool {
        !self.stacks.lock().undo.is_empty()
    }

    /// Whether a redo entry is available.
    pub fn can_redo(&self) -> bool {
        !self.stacks.lock().redo.is_empty()
    }

    /// Undo the most recent entry. Returns `false` on an empty stack.
    ///
    /// A group undoes its commands in reverse order. A failing command is
    /// logged and the remaining commands still run; the entry moves to the
    /// redo stack either way.
    pub fn undo(&self) -> bool {
        let mut entry = match self.stacks.lock().undo.pop_back() {
            Some(entry) => entry,
            None => {
                warn!("undo stack is empty");
                return false;
            }
        };

        debug!(entry = entry.label(), "undoing");
        match &mut entry {
            Entry::Single(command) => {
                if let Err(e) = command.undo() {
                    error!(command = command.description(), error = %e, "undo failed");
                }
            }
            Entry::Group(commands) => {
                for command in commands.iter_mut().rev() {
                    if let Err(e) = command.undo() {
                        error!(command = command.description(), error = %e, "undo failed");
                    }
                }
            }
        }
        self.stacks.lock().redo.push_back(entry);
        true
    }

    /// Redo the most recently undone entry. Returns `false` on an empty
    /// stack. A group redoes its commands in forward order.
    pub fn redo(&self) -> bool {
        let mut entry = match self.stacks.lock().redo.pop_back() {
            Some(entry) => entry,
            None => {
                warn!("redo stack is empty");
                return false;
            }
        };

        debug!(entry = entry.label(), "redoing");
        match &mut entry {
            Entry::Single(command) => {
                if let Err(e) = command.execute() {
                    error!(command = command.description(), error = %e, "redo failed");
                }
            }
            Entry::Group(commands) => {
                for command in commands.iter_mut() {
                    if let Err(e) = command.execute() {
                        error!(command = command.description(), error = %e, "redo failed");
                    }
                }
            }
        }
        self.stacks.lock().undo.push_back(entry);
        true
    }

    /// Number of entries currently undoable.
    pub fn undo_depth(&self) -> usize {
        self.stacks.lock().undo.len()
    }

    /// Number of entries currently redoable.
    pub fn redo_depth(&self) -> usize {
        self.stacks.lock().redo.len()
    }

    fn push_undo(&self, stacks: &mut Stacks, entry: Entry) {
        if let Entry::Group(commands) = &entry {
            if commands.is_empty() {
                return;
            }
        }
        debug!(entry = entry.label(), "added to undo stack, redo cleared");
        stacks.undo.push_back(entry);
        if stacks.undo.len() > self.max_depth {
            stacks.undo.pop_front();
        }
        stacks.redo.clear();
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stacks = self.stacks.lock();
        f.debug_struct("HistoryManager")
            .field("undo", &stacks.undo.len())
            .field("redo", &stacks.redo.len())
            .field("group_depth", &stacks.group_depth)
            .finish()
    }
}

/// Scope guard returned by [`HistoryManager::group`].
pub struct GroupGuard {
    history: HistoryManager,
    description: String,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let mut stacks = self.history.stacks.lock();
        stacks.group_depth -= 1;
        if stacks.group_depth == 0 {
            let commands = std::mem::take(&mut stacks.pending_group);
            debug!(
                description = self.description,
                commands = commands.len(),
                "ending command group"
            );
            self.history.push_undo(&mut stacks, Entry::Group(commands));
        }
    }
}
