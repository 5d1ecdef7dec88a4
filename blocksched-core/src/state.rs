//! Per-block scheduling state.
//!
//! One [`BlockState`] exists per block for the duration of a single
//! scheduling run. The states live in a `Vec` indexed by [`BlockId`], so
//! the scheduler and the loop finder address blocks by index and never
//! hold references into each other's data.
//!
//! A block moves through `unfinalized -> pending -> finalized` as its
//! predecessors are scheduled, or straight from `unfinalized` to
//! `finalized` when it is discovered as part of a loop. It never moves
//! back.

use crate::cfg::{BlockId, Cfg};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockState {
    pub remaining_predecessors: usize,
    pub successors: Vec<BlockId>,
    pub is_loop: bool,
    pub is_always: bool,
    pub is_pending: bool,
    pub is_finalized: bool,
}

impl BlockState {
    pub fn new(predecessors: usize, successors: Vec<BlockId>) -> Self {
        BlockState {
            remaining_predecessors: predecessors,
            successors,
            is_loop: false,
            is_always: false,
            is_pending: false,
            is_finalized: false,
        }
    }

    /// Fresh states for every block of `cfg`, in block order.
    pub fn for_cfg(cfg: &Cfg) -> Vec<BlockState> {
        cfg.blocks()
            .map(|(_, block)| BlockState::new(block.predecessors, block.successors.clone()))
            .collect()
    }

    /// Mark the block as a member of a discovered loop.
    ///
    /// Loop members are finalized immediately, whatever their remaining
    /// predecessor count.
    pub fn mark_loop(&mut self) {
        self.is_loop = true;
        self.is_finalized = true;
    }

    /// Account for one scheduled predecessor.
    ///
    /// Returns `true` once every predecessor has been scheduled, and
    /// marks the block pending otherwise.
    pub fn satisfy_predecessor(&mut self) -> bool {
        self.remaining_predecessors = self.remaining_predecessors.saturating_sub(1);
        if self.remaining_predecessors == 0 {
            true
        } else {
            self.is_pending = true;
            false
        }
    }

    pub fn awaits_loop(&self) -> bool {
        self.is_pending && !self.is_finalized
    }
}
