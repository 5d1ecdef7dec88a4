use std::path::PathBuf;

use thiserror::Error;

use crate::cfg::BlockId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("unsupported emit format: {0}")]
    UnsupportedFormat(String),
    #[error("no block listing sources were found at {0}")]
    MissingSources(PathBuf),
    #[error("lex error at byte {position}: {message}")]
    LexError { position: usize, message: String },
    #[error("parse error at byte {position}: {message}")]
    ParseError { position: usize, message: String },
    #[error("invalid control-flow graph in function `{function}`: {message}")]
    InvalidCfg { function: String, message: String },
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{}: {source}", path.display())]
    InFile {
        path: PathBuf,
        source: Box<CoreError>,
    },
    /// The scheduler could not order every block of a function.
    ///
    /// This is an internal compiler error: the CFG handed to the scheduler
    /// has blocks that are neither reachable through satisfied predecessors
    /// nor part of a loop through a pending block.
    #[error(
        "internal compiler error: could not schedule blocks [{}] of function `{function}`",
        join_blocks(.unresolved)
    )]
    SchedulingInvariant {
        function: String,
        unresolved: Vec<BlockId>,
    },
}

fn join_blocks(blocks: &[BlockId]) -> String {
    blocks
        .iter()
        .map(|block| block.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
