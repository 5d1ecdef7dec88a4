//! Loop discovery for the block scheduler.
//!
//! [`find_loop`] runs a depth-first search from a seed block over blocks
//! that are not finalized yet. Only a cycle that closes on the seed itself
//! counts: an edge back to an interior block of the current path is
//! skipped, and that block is resolved later when the scheduler seeds the
//! search from it.
//!
//! ```text
//!     seed ──> a ──> b
//!      ^             │
//!      └─────────────┘     found: [seed, a, b]
//!
//!     seed ──> a ──> b
//!              ^     │
//!              └─────┘     not found from seed (a is interior)
//! ```
//!
//! The search keeps an explicit stack so that long chains of blocks do
//! not grow the native call stack.

use tracing::debug;

use crate::cfg::BlockId;
use crate::state::BlockState;

/// One entry of the DFS path: a block and the index of its next
/// successor to examine.
struct Frame {
    block: BlockId,
    next_successor: usize,
}

/// Search for a cycle through unfinalized blocks that returns to `seed`.
///
/// On success every block on the cycle is marked as a loop member (and
/// therefore finalized), and the cycle is returned in path order,
/// starting with `seed`.
pub fn find_loop(states: &mut [BlockState], seed: BlockId) -> Option<Vec<BlockId>> {
    let mut on_path = vec![false; states.len()];
    // Blocks whose subtree was already searched without reaching `seed`.
    let mut visited = vec![false; states.len()];
    let mut path = vec![Frame {
        block: seed,
        next_successor: 0,
    }];
    on_path[seed.index()] = true;
    visited[seed.index()] = true;

    while let Some(frame) = path.last_mut() {
        let successors = &states[frame.block.index()].successors;
        let Some(&succ) = successors.get(frame.next_successor) else {
            on_path[frame.block.index()] = false;
            path.pop();
            continue;
        };
        frame.next_successor += 1;

        if states[succ.index()].is_finalized {
            continue;
        }
        if succ == seed {
            let members: Vec<BlockId> = path.iter().map(|frame| frame.block).collect();
            for member in &members {
                states[member.index()].mark_loop();
            }
            debug!(seed = %seed, size = members.len(), "found loop");
            return Some(members);
        }
        if on_path[succ.index()] || visited[succ.index()] {
            continue;
        }

        on_path[succ.index()] = true;
        visited[succ.index()] = true;
        path.push(Frame {
            block: succ,
            next_successor: 0,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg;

    fn states(successors: &[&[usize]]) -> Vec<BlockState> {
        let cfg = Cfg::from_successors(
            successors
                .iter()
                .map(|succs| succs.iter().copied().map(BlockId).collect())
                .collect(),
        )
        .expect("cfg");
        BlockState::for_cfg(&cfg)
    }

    fn ids(raw: &[usize]) -> Vec<BlockId> {
        raw.iter().copied().map(BlockId).collect()
    }

    #[test]
    fn finds_cycle_closing_on_seed() {
        let mut states = states(&[&[1], &[2], &[1, 3], &[]]);
        states[0].is_finalized = true;
        let found = find_loop(&mut states, BlockId(1));
        assert_eq!(found, Some(ids(&[1, 2])));
        assert!(states[1].is_loop && states[1].is_finalized);
        assert!(states[2].is_loop && states[2].is_finalized);
        assert!(!states[3].is_loop);
    }

    #[test]
    fn finds_self_loop() {
        let mut states = states(&[&[0, 1], &[]]);
        assert_eq!(find_loop(&mut states, BlockId(0)), Some(ids(&[0])));
        assert!(!states[1].is_finalized);
    }

    #[test]
    fn skips_back_edge_to_interior_block() {
        // 0 -> 1 -> 2 -> 1: the cycle closes on 1, not on the seed 0.
        let mut states = states(&[&[1], &[2], &[1]]);
        assert_eq!(find_loop(&mut states, BlockId(0)), None);
        assert!(states.iter().all(|state| !state.is_loop && !state.is_finalized));
    }

    #[test]
    fn ignores_finalized_blocks() {
        let mut states = states(&[&[1], &[0]]);
        states[1].is_finalized = true;
        assert_eq!(find_loop(&mut states, BlockId(0)), None);
    }

    #[test]
    fn reports_only_the_closing_path() {
        // From 1 the search first wanders into the dead end 2, then finds
        // the cycle through 3. Block 2 must not be marked.
        let mut states = states(&[&[1], &[2, 3], &[], &[1]]);
        states[0].is_finalized = true;
        assert_eq!(find_loop(&mut states, BlockId(1)), Some(ids(&[1, 3])));
        assert!(!states[2].is_loop);
    }

    #[test]
    fn handles_long_chains_without_recursion() {
        let n = 100_000;
        let successors: Vec<Vec<BlockId>> = (0..n).map(|i| vec![BlockId((i + 1) % n)]).collect();
        let cfg = Cfg::from_successors(successors).expect("cfg");
        let mut states = BlockState::for_cfg(&cfg);
        let found = find_loop(&mut states, BlockId(0)).expect("ring is a loop");
        assert_eq!(found.len(), n);
    }
}
