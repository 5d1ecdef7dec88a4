//! Emission descriptors: what the back ends read for every block.

use std::fmt;

use crate::cfg::BlockId;
use crate::classify::{ActionKind, classify};
use crate::schedule::{Order, Scheduled};
use crate::state::BlockState;

/// Defer policy and layout successor of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub action: ActionKind,
    /// Block emitted right after this one; `None` for the last block.
    pub next: Option<BlockId>,
}

/// Build one descriptor per block, indexed by block.
pub fn build_info(order: &Order, states: &[BlockState]) -> Vec<BlockInfo> {
    let mut info = vec![
        BlockInfo {
            action: ActionKind::InCond,
            next: None,
        };
        states.len()
    ];
    for (position, block) in order.iter().enumerate() {
        info[block.index()] = BlockInfo {
            action: classify(&states[block.index()]),
            next: order.next_after(position),
        };
    }
    info
}

/// Everything a back end needs to lay out one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSchedule {
    pub name: String,
    pub order: Order,
    pub info: Vec<BlockInfo>,
}

impl FunctionSchedule {
    pub fn from_scheduled(name: impl Into<String>, scheduled: &Scheduled) -> Self {
        FunctionSchedule {
            name: name.into(),
            info: build_info(&scheduled.order, &scheduled.states),
            order: scheduled.order.clone(),
        }
    }

    pub fn info(&self, block: BlockId) -> BlockInfo {
        self.info[block.index()]
    }
}

impl fmt::Display for FunctionSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {}", self.name)?;
        for block in self.order.iter() {
            let info = self.info(block);
            match info.next {
                Some(next) => writeln!(f, "  {block:<6} {:<8} next {next}", info.action)?,
                None => writeln!(f, "  {block:<6} {:<8} next -", info.action)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg;
    use crate::schedule::schedule;

    use ActionKind::{Always, InCond, InLoop};

    fn plan(successors: &[&[usize]]) -> FunctionSchedule {
        let cfg = Cfg::from_successors(
            successors
                .iter()
                .map(|succs| succs.iter().copied().map(BlockId).collect())
                .collect(),
        )
        .expect("cfg");
        let scheduled = schedule(&cfg).expect("schedule");
        FunctionSchedule::from_scheduled("test", &scheduled)
    }

    fn info(action: ActionKind, next: Option<usize>) -> BlockInfo {
        BlockInfo {
            action,
            next: next.map(BlockId),
        }
    }

    #[test]
    fn single_block() {
        assert_eq!(plan(&[&[]]).info, vec![info(Always, None)]);
    }

    #[test]
    fn linear_chain() {
        assert_eq!(
            plan(&[&[1], &[2], &[]]).info,
            vec![
                info(Always, Some(1)),
                info(InCond, Some(2)),
                info(Always, None)
            ]
        );
    }

    #[test]
    fn loop_with_exit() {
        let plan = plan(&[&[1], &[2], &[1, 3], &[]]);
        assert_eq!(plan.info[0].action, Always);
        assert_eq!(plan.info[1].action, InLoop);
        assert_eq!(plan.info[2].action, InLoop);
        assert_eq!(plan.info[3], info(Always, None));
    }

    #[test]
    fn diamond() {
        let plan = plan(&[&[1, 2], &[3], &[3], &[]]);
        let actions: Vec<_> = plan.info.iter().map(|info| info.action).collect();
        assert_eq!(actions, vec![Always, InCond, InCond, Always]);
    }

    #[test]
    fn two_end_blocks_stay_conditional() {
        let plan = plan(&[&[1, 2], &[], &[]]);
        let actions: Vec<_> = plan.info.iter().map(|info| info.action).collect();
        assert_eq!(actions, vec![Always, InCond, InCond]);
    }

    #[test]
    fn next_follows_emission_order() {
        // Order is [0, 2, 1].
        let plan = plan(&[&[1], &[], &[1]]);
        assert_eq!(plan.info[0].next, Some(BlockId(2)));
        assert_eq!(plan.info[2].next, Some(BlockId(1)));
        assert_eq!(plan.info[1].next, None);
    }

    #[test]
    fn renders_one_line_per_block() {
        let text = plan(&[&[1], &[2], &[1, 3], &[]]).to_string();
        assert!(text.starts_with("fn test\n"));
        assert!(text.contains("bb1    in-loop  next bb2"));
        assert!(text.contains("bb3    always   next -"));
        assert_eq!(text.lines().count(), 5);
    }

    /// Deterministic generator for CFGs where every block is reachable
    /// from the entry.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: usize) -> usize {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((self.0 >> 33) as usize) % bound
        }
    }

    fn reachable_cfg(rng: &mut Lcg, n: usize) -> Vec<Vec<BlockId>> {
        let mut successors = vec![Vec::new(); n];
        for block in 1..n {
            let parent = rng.next(block);
            successors[parent].push(BlockId(block));
        }
        for _ in 0..rng.next(n + 1) {
            let from = rng.next(n);
            let to = rng.next(n);
            successors[from].push(BlockId(to));
        }
        successors
    }

    #[test]
    fn reachable_graphs_schedule_every_block_once() {
        let mut rng = Lcg(0x5eed);
        for round in 0..200 {
            let n = 1 + rng.next(12);
            let cfg = Cfg::from_successors(reachable_cfg(&mut rng, n)).expect("cfg");
            let scheduled = schedule(&cfg)
                .unwrap_or_else(|stalled| panic!("round {round} stalled: {stalled:?} on {cfg:?}"));

            let mut seen: Vec<_> = scheduled.order.iter().map(BlockId::index).collect();
            assert_eq!(seen[0], 0, "round {round}: entry must come first");
            seen.sort_unstable();
            assert_eq!(seen, (0..n).collect::<Vec<_>>(), "round {round}");

            let info = build_info(&scheduled.order, &scheduled.states);
            assert_eq!(info.len(), n);

            let again = schedule(&cfg).expect("second run");
            assert_eq!(again.order, scheduled.order, "round {round}: order differs");
            assert_eq!(build_info(&again.order, &again.states), info);
        }
    }
}
