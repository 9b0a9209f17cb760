//! Per-file action state shared by indexing, metadata extraction and
//! conversion targets.

use serde::{Deserialize, Serialize};

/// State of one action on one file.
///
/// An action starts at `Todo` (or `Ignore` when the caller never requested
/// it) and may only move forward: `Todo` -> `Ignore` | `Done` | `Fail`. The
/// three non-`Todo` states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    /// Not yet attempted, an attempt is required.
    Todo,
    /// Deliberately skipped (policy, size or extension exclusion).
    Ignore,
    /// Completed, output/artifact available.
    Done,
    /// Attempted, unrecoverable error.
    Fail,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        self != ActionState::Todo
    }

    /// Apply a forward transition. Terminal states are never overwritten, so
    /// repeated policy runs cannot regress or flip an outcome.
    pub fn advance(&mut self, next: ActionState) {
        if *self == ActionState::Todo {
            *self = next;
        }
    }
}
