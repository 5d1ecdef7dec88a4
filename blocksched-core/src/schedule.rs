//! Linear block ordering.
//!
//! The scheduler finalizes blocks once all of their predecessors have
//! been finalized, in the order they become ready. When the work queue
//! drains while blocks remain, the remaining blocks must be waiting on a
//! loop: the pending ones are tried as [`find_loop`] seeds in index order
//! and the first loop found is scheduled as a whole.
//!
//! The result is an [`Order`] in which every block appears exactly once
//! and the entry block comes first, plus the final [`BlockState`]s the
//! defer classifier reads.

use tracing::{debug, trace};

use crate::cfg::{BlockId, Cfg};
use crate::loops::find_loop;
use crate::state::BlockState;

/// Linear emission order of a function's blocks.
///
/// The position after the last block plays the role of the no-next
/// sentinel: [`Order::next_after`] returns `None` there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    blocks: Vec<BlockId>,
}

impl Order {
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().copied()
    }

    /// The block emitted right after position `position`, if any.
    pub fn next_after(&self, position: usize) -> Option<BlockId> {
        self.blocks.get(position + 1).copied()
    }

    /// Position of every block in the order, indexed by block.
    pub fn positions(&self) -> Vec<usize> {
        let mut positions = vec![0; self.blocks.len()];
        for (position, block) in self.blocks.iter().enumerate() {
            positions[block.index()] = position;
        }
        positions
    }
}

/// Output of a successful scheduling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub order: Order,
    pub states: Vec<BlockState>,
}

/// The work queue drained and no pending block closes a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stalled {
    /// Every block that was never finalized, in index order.
    pub unresolved: Vec<BlockId>,
}

/// Compute the linear order and the per-block flags for `cfg`.
pub fn schedule(cfg: &Cfg) -> Result<Scheduled, Stalled> {
    Scheduler::new(cfg).run()
}

struct Scheduler<'a> {
    cfg: &'a Cfg,
    states: Vec<BlockState>,
    order: Vec<BlockId>,
    /// Next position of `order` to dequeue.
    cursor: usize,
    finalized: usize,
}

impl<'a> Scheduler<'a> {
    fn new(cfg: &'a Cfg) -> Self {
        Scheduler {
            cfg,
            states: BlockState::for_cfg(cfg),
            order: Vec::with_capacity(cfg.len()),
            cursor: 0,
            finalized: 0,
        }
    }

    fn run(mut self) -> Result<Scheduled, Stalled> {
        self.seed_entries();
        self.mark_always_blocks();

        loop {
            self.drain();
            if self.finalized == self.cfg.len() {
                break;
            }
            if !self.schedule_pending_loop() {
                let unresolved = self.unresolved();
                debug!(count = unresolved.len(), "scheduling stalled");
                return Err(Stalled { unresolved });
            }
        }

        debug_assert_eq!(self.order.len(), self.cfg.len());
        Ok(Scheduled {
            order: Order { blocks: self.order },
            states: self.states,
        })
    }

    /// The entry block first, then every other block nothing jumps to.
    fn seed_entries(&mut self) {
        self.order.push(BlockId::ENTRY);
        for (id, block) in self.cfg.blocks() {
            if id != BlockId::ENTRY && block.predecessors == 0 {
                self.order.push(id);
            }
        }
    }

    fn mark_always_blocks(&mut self) {
        let mut end_blocks = 0;
        let mut last_end = None;
        for (id, _) in self.cfg.blocks() {
            if self.cfg.is_end_block(id) {
                end_blocks += 1;
                last_end = Some(id);
            }
        }

        if self.cfg.block(BlockId::ENTRY).predecessors > 0 {
            // The entry takes part in a cycle back to itself.
            if let Some(members) = find_loop(&mut self.states, BlockId::ENTRY) {
                self.order
                    .extend(members.into_iter().filter(|id| *id != BlockId::ENTRY));
            }
        } else {
            self.states[BlockId::ENTRY.index()].is_always = true;
        }

        if let (1, Some(end)) = (end_blocks, last_end) {
            self.states[end.index()].is_always = true;
        }
    }

    /// Finalize queued blocks until the queue is empty.
    fn drain(&mut self) {
        while let Some(&id) = self.order.get(self.cursor) {
            self.cursor += 1;
            self.states[id.index()].is_finalized = true;
            self.finalized += 1;
            trace!(block = %id, position = self.cursor - 1, "finalized block");

            for succ in self.states[id.index()].successors.clone() {
                let state = &mut self.states[succ.index()];
                if !state.is_finalized && state.satisfy_predecessor() {
                    self.order.push(succ);
                }
            }
        }
    }

    /// Try pending blocks as loop seeds in index order and queue the first
    /// loop found.
    fn schedule_pending_loop(&mut self) -> bool {
        for index in 0..self.states.len() {
            if !self.states[index].awaits_loop() {
                continue;
            }
            if let Some(members) = find_loop(&mut self.states, BlockId(index)) {
                self.order.extend(members);
                return true;
            }
        }
        false
    }

    fn unresolved(&self) -> Vec<BlockId> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| !state.is_finalized)
            .map(|(index, _)| BlockId(index))
            .collect()
    }
}
