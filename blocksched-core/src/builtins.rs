//! Host-provided runtime hooks that generated code imports.
//!
//! This module does not perform any I/O or wasm interaction itself;
//! codegen modules map these descriptors to wasm imports or LLVM
//! declarations, and the embedder supplies the implementation.

use wasm_encoder::ValType;

/// Kind of runtime hook, used by backends to decide how to lower a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Runs one deferred call, identified by its defer id.
    DeferRun,
}

/// Metadata about a single runtime hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Symbol name, shared by the wasm import and the LLVM declaration.
    pub name: &'static str,

    /// Wasm import module.
    pub module: &'static str,

    pub params: &'static [ValType],
    pub results: &'static [ValType],

    pub kind: BuiltinKind,
}

impl BuiltinDescriptor {
    /// `declare` line for the textual LLVM back end.
    pub fn llvm_declaration(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|ty| llvm_type(*ty))
            .collect::<Vec<_>>()
            .join(", ");
        let result = match self.results {
            [] => "void",
            [ty, ..] => llvm_type(*ty),
        };
        format!("declare {result} @{}({params})", self.name)
    }
}

fn llvm_type(ty: ValType) -> &'static str {
    match ty {
        ValType::I32 => "i32",
        ValType::I64 => "i64",
        ValType::F32 => "float",
        ValType::F64 => "double",
        _ => "ptr",
    }
}

/// The complete list of hooks known to the core.
pub const BUILTINS: &[BuiltinDescriptor] = &[BuiltinDescriptor {
    name: "defer_run",
    module: "env",
    params: &[ValType::I32],
    results: &[],
    kind: BuiltinKind::DeferRun,
}];

pub fn builtin(kind: BuiltinKind) -> &'static BuiltinDescriptor {
    match kind {
        BuiltinKind::DeferRun => &BUILTINS[0],
    }
}

/// Look up a hook by its symbol name.
///
/// The search is linear over `BUILTINS` because the table is small.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|descriptor| descriptor.name == name)
}
