//! Control-flow graphs handed to the scheduler.
//!
//! A [`Cfg`] is an index-stable list of basic blocks. Each block knows
//! how many predecessors it has and the ordered list of its successors;
//! block 0 is always the function entry. The block listing front end
//! lowers [`crate::ast::FunctionDecl`] values into [`Function`]s here,
//! deriving predecessor counts from the successor lists.

use std::collections::HashSet;
use std::fmt;

use crate::ast::{FunctionDecl, SourceModule, Terminator};
use crate::builtins::find_builtin;
use crate::error::CoreError;

/// Index of a basic block inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("bb{}", self.0))
    }
}

/// Identifier passed to the runtime when a deferred call fires.
pub type DeferId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Number of incoming edges, duplicates included.
    ///
    /// May exceed the number of edges visible in the graph when the
    /// supplier knows about predecessors that were not materialized.
    pub predecessors: usize,
    pub successors: Vec<BlockId>,
}

impl Block {
    pub fn is_terminal(&self) -> bool {
        self.successors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cfg {
    blocks: Vec<Block>,
}

impl Cfg {
    /// Build a graph from explicit blocks.
    ///
    /// Rejects empty graphs, successors outside the block range, and
    /// predecessor counts lower than the number of incoming edges.
    pub fn new(blocks: Vec<Block>) -> Result<Self, String> {
        if blocks.is_empty() {
            return Err("a function needs at least an entry block".to_string());
        }

        let mut incoming = vec![0usize; blocks.len()];
        for (index, block) in blocks.iter().enumerate() {
            for succ in &block.successors {
                let slot = incoming.get_mut(succ.0).ok_or_else(|| {
                    format!(
                        "{} jumps to {succ}, but the function only has {} blocks",
                        BlockId(index),
                        blocks.len()
                    )
                })?;
                *slot += 1;
            }
        }

        for (index, (block, edges)) in blocks.iter().zip(&incoming).enumerate() {
            if block.predecessors < *edges {
                return Err(format!(
                    "{} declares {} predecessors but has {edges} incoming edges",
                    BlockId(index),
                    block.predecessors
                ));
            }
        }

        Ok(Cfg { blocks })
    }

    /// Build a graph from successor lists alone, counting predecessors
    /// from the edges.
    pub fn from_successors(successors: Vec<Vec<BlockId>>) -> Result<Self, String> {
        let mut predecessors = vec![0usize; successors.len()];
        for succ in successors.iter().flatten() {
            if let Some(count) = predecessors.get_mut(succ.0) {
                *count += 1;
            }
        }
        let blocks = successors
            .into_iter()
            .zip(predecessors)
            .map(|(successors, predecessors)| Block {
                predecessors,
                successors,
            })
            .collect();
        Cfg::new(blocks)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (BlockId(index), block))
    }

    /// A block with no successors that is reachable or is the entry itself.
    pub fn is_end_block(&self, id: BlockId) -> bool {
        let block = self.block(id);
        block.is_terminal() && (block.predecessors > 0 || id == BlockId::ENTRY)
    }
}

/// A function ready for scheduling: its graph plus the deferred calls
/// each block registers, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub cfg: Cfg,
    pub defers: Vec<Vec<DeferId>>,
}

impl Function {
    pub fn defers_of(&self, id: BlockId) -> &[DeferId] {
        &self.defers[id.0]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }
}

/// Lower a parsed block listing into scheduler input.
pub fn lower_module(source: &SourceModule) -> Result<Module, CoreError> {
    let mut seen = HashSet::new();
    let mut functions = Vec::with_capacity(source.functions.len());
    for decl in &source.functions {
        if !seen.insert(decl.name.as_str()) {
            return Err(invalid(&decl.name, "function is defined more than once"));
        }
        if find_builtin(&decl.name).is_some() {
            return Err(invalid(&decl.name, "name is reserved for a runtime hook"));
        }
        functions.push(lower_function(decl)?);
    }
    Ok(Module { functions })
}

fn lower_function(decl: &FunctionDecl) -> Result<Function, CoreError> {
    let mut successors = Vec::with_capacity(decl.blocks.len());
    let mut defers = Vec::with_capacity(decl.blocks.len());

    for (expected, block) in decl.blocks.iter().enumerate() {
        // ラベルは bb0 から連番で並んでいる必要がある。
        if block.label != expected {
            return Err(invalid(
                &decl.name,
                &format!(
                    "expected label {} but found {}",
                    BlockId(expected),
                    BlockId(block.label)
                ),
            ));
        }
        successors.push(match &block.terminator {
            Terminator::Return => Vec::new(),
            Terminator::Jump(targets) => targets.iter().copied().map(BlockId).collect(),
        });
        defers.push(block.defers.clone());
    }

    let cfg = Cfg::from_successors(successors).map_err(|message| invalid(&decl.name, &message))?;
    Ok(Function {
        name: decl.name.clone(),
        cfg,
        defers,
    })
}

fn invalid(function: &str, message: &str) -> CoreError {
    CoreError::InvalidCfg {
        function: function.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockDecl;

    fn ids(raw: &[usize]) -> Vec<BlockId> {
        raw.iter().copied().map(BlockId).collect()
    }

    #[test]
    fn derives_predecessor_counts_from_edges() {
        let cfg = Cfg::from_successors(vec![ids(&[1, 1]), ids(&[2]), vec![]]).expect("cfg");
        assert_eq!(cfg.block(BlockId(0)).predecessors, 0);
        assert_eq!(cfg.block(BlockId(1)).predecessors, 2);
        assert_eq!(cfg.block(BlockId(2)).predecessors, 1);
    }

    #[test]
    fn end_blocks_exclude_unreachable_terminals() {
        let cfg = Cfg::from_successors(vec![ids(&[1]), vec![], vec![]]).expect("cfg");
        assert!(!cfg.is_end_block(BlockId(0)));
        assert!(cfg.is_end_block(BlockId(1)));
        assert!(!cfg.is_end_block(BlockId(2)));
    }

    #[test]
    fn entry_without_successors_is_an_end_block() {
        let cfg = Cfg::from_successors(vec![vec![]]).expect("cfg");
        assert!(cfg.is_end_block(BlockId::ENTRY));
    }

    #[test]
    fn rejects_out_of_range_successor() {
        let err = Cfg::from_successors(vec![ids(&[4])]).unwrap_err();
        assert!(err.contains("bb4"));
    }

    #[test]
    fn rejects_predecessor_count_below_edge_count() {
        let err = Cfg::new(vec![
            Block {
                predecessors: 0,
                successors: ids(&[1]),
            },
            Block {
                predecessors: 0,
                successors: vec![],
            },
        ])
        .unwrap_err();
        assert!(err.contains("incoming edges"));
    }

    #[test]
    fn rejects_empty_graph() {
        assert!(Cfg::new(Vec::new()).is_err());
    }

    #[test]
    fn lowering_requires_dense_labels() {
        let source = SourceModule {
            functions: vec![FunctionDecl {
                name: "gap".to_string(),
                position: 0,
                blocks: vec![
                    BlockDecl {
                        label: 0,
                        position: 0,
                        defers: vec![],
                        terminator: Terminator::Jump(vec![2]),
                    },
                    BlockDecl {
                        label: 2,
                        position: 0,
                        defers: vec![],
                        terminator: Terminator::Return,
                    },
                ],
            }],
        };
        let err = lower_module(&source).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCfg { ref function, .. } if function == "gap"));
    }

    #[test]
    fn lowering_rejects_duplicate_function_names() {
        let decl = FunctionDecl {
            name: "twice".to_string(),
            position: 0,
            blocks: vec![BlockDecl {
                label: 0,
                position: 0,
                defers: vec![7],
                terminator: Terminator::Return,
            }],
        };
        let source = SourceModule {
            functions: vec![decl.clone(), decl],
        };
        assert!(matches!(
            lower_module(&source),
            Err(CoreError::InvalidCfg { .. })
        ));
    }

    #[test]
    fn lowering_rejects_runtime_hook_names() {
        let source = SourceModule {
            functions: vec![FunctionDecl {
                name: "defer_run".to_string(),
                position: 0,
                blocks: vec![BlockDecl {
                    label: 0,
                    position: 0,
                    defers: Vec::new(),
                    terminator: Terminator::Return,
                }],
            }],
        };
        let err = lower_module(&source).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }
}
