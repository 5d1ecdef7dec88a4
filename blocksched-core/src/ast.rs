use crate::cfg::DeferId;

/// A parsed `.blk` file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceModule {
    pub functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    /// Byte offset of the `fn` keyword.
    pub position: usize,
    pub blocks: Vec<BlockDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDecl {
    /// Numeric part of the `bbN` label.
    pub label: usize,
    pub position: usize,
    pub defers: Vec<DeferId>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Return,
    Jump(Vec<usize>),
}

impl Terminator {
    pub fn is_return(&self) -> bool {
        matches!(self, Terminator::Return)
    }
}
