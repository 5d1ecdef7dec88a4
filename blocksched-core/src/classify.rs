//! Deferred-call policies.

use std::fmt;

use crate::state::BlockState;

/// How deferred calls registered in a block are guarded at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// The block runs exactly once on every path: the defer uses a static
    /// slot and needs no guard.
    Always,
    /// The block may run any number of times: every execution appends a
    /// record that is drained at exit.
    InLoop,
    /// The block may or may not run: a flag set at registration guards
    /// the call at exit.
    InCond,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Always => "always",
            ActionKind::InLoop => "in-loop",
            ActionKind::InCond => "in-cond",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Policy for a block whose scheduling state is final.
///
/// Loop membership wins over the "always" mark.
pub fn classify(state: &BlockState) -> ActionKind {
    if state.is_loop {
        ActionKind::InLoop
    } else if state.is_always {
        ActionKind::Always
    } else {
        ActionKind::InCond
    }
}
