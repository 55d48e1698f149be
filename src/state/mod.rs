//! Reactive application state: the path-addressed store and its
//! undo/redo history.

mod history;
mod manager;
mod pattern;

pub use history::{Command, GroupGuard, HistoryManager, StateError, DEFAULT_MAX_DEPTH};
pub use manager::{ChangeHandler, StateManager};
pub use pattern::glob_match;
