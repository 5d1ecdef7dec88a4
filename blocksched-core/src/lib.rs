//! Core of the block scheduling toolchain.
//!
//! Given the control-flow graph of a function, the scheduler computes a
//! linear emission order for its basic blocks and classifies every block
//! by how code registered there (deferred calls) must be guarded when the
//! function exits. The pipeline is roughly:
//!
//!   source .blk
//!     -> lexer / parser   (tokens, surface listing)
//!     -> cfg              (validated blocks + defers)
//!     -> schedule         (order, loop discovery)
//!     -> classify / info  (defer policy, fallthrough successor)
//!     -> codegen_wasm / codegen_llvm
//!
//! Higher-level tools (the CLI) should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: block listings
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;
pub mod sources;

// ---------------------------------------------------------------------
// Control-flow graphs and scheduling
// ---------------------------------------------------------------------

pub mod cfg;
pub mod state;
pub mod loops;
pub mod schedule;
pub mod classify;
pub mod info;

// ---------------------------------------------------------------------
// Back-end: runtime hooks, code generation and orchestration
// ---------------------------------------------------------------------

pub mod builtins;
pub mod codegen_wasm;
pub mod codegen_llvm;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use cfg::{BlockId, Cfg, DeferId, Function, Module};
pub use classify::ActionKind;
pub use compiler::{
    CompilationArtifact, CompileOptions, PlannedFunction, compile_module, compile_wasm,
    emit_llvm_ir, emit_module_llvm_ir, parse_files, parse_module, plan_function,
    render_module_schedule, render_schedule, schedule_module,
};
pub use error::CoreError;
pub use info::{BlockInfo, FunctionSchedule};
pub use schedule::{Order, schedule};
pub use sources::{SourceFile, load_sources};
