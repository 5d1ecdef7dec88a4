use rayon::prelude::*;
use tracing::{debug, debug_span, info};

use crate::builtins::{BUILTINS, BuiltinDescriptor};
use crate::cfg::{Function, Module, lower_module};
use crate::codegen_llvm::generate_llvm_ir;
use crate::codegen_wasm::generate_wasm;
use crate::error::CoreError;
use crate::info::FunctionSchedule;
use crate::parser::parse;
use crate::schedule::schedule;
use crate::sources::SourceFile;

/// Settings shared by every compiler entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Name recorded in emitted modules.
    pub module_name: String,
    /// Schedule the functions of a module on the rayon thread pool.
    pub parallel: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            module_name: "blocksched".to_string(),
            parallel: true,
        }
    }
}

/// A function together with its emission plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFunction {
    pub function: Function,
    pub schedule: FunctionSchedule,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CompilationArtifact {
    pub wasm: Vec<u8>,
    pub functions: Vec<FunctionSchedule>,
    pub imports: Vec<BuiltinDescriptor>,
}

pub fn parse_module(source: &str) -> Result<Module, CoreError> {
    lower_module(&parse(source)?)
}

/// Parse several files into one module. Function names must be unique
/// across all of them.
pub fn parse_files(files: &[SourceFile]) -> Result<Module, CoreError> {
    let mut combined = crate::ast::SourceModule::default();
    for file in files {
        let parsed = parse(&file.contents).map_err(|source| CoreError::InFile {
            path: file.path.clone(),
            source: Box::new(source),
        })?;
        combined.functions.extend(parsed.functions);
    }
    lower_module(&combined)
}

/// Schedule one function and derive its emission descriptors.
///
/// A stalled schedule is reported as an internal compiler error naming
/// the function; no partial order is ever returned.
pub fn plan_function(function: &Function) -> Result<FunctionSchedule, CoreError> {
    let _span = debug_span!("plan", function = %function.name).entered();
    let scheduled =
        schedule(&function.cfg).map_err(|stalled| CoreError::SchedulingInvariant {
            function: function.name.clone(),
            unresolved: stalled.unresolved,
        })?;
    debug!(blocks = function.cfg.len(), "scheduled function");
    Ok(FunctionSchedule::from_scheduled(&function.name, &scheduled))
}

/// Plan every function of `module`, keeping source order.
///
/// Functions share no scheduling state, so they are planned in parallel
/// when `options.parallel` is set. The first failing function in source
/// order determines the error.
pub fn schedule_module(
    module: &Module,
    options: &CompileOptions,
) -> Result<Vec<PlannedFunction>, CoreError> {
    let plan = |function: &Function| {
        plan_function(function).map(|schedule| PlannedFunction {
            function: function.clone(),
            schedule,
        })
    };
    let results: Vec<Result<PlannedFunction, CoreError>> = if options.parallel {
        module.functions.par_iter().map(plan).collect()
    } else {
        module.functions.iter().map(plan).collect()
    };
    results.into_iter().collect()
}

pub fn plan_source(
    source: &str,
    options: &CompileOptions,
) -> Result<Vec<PlannedFunction>, CoreError> {
    schedule_module(&parse_module(source)?, options)
}

pub fn compile_module(
    module: &Module,
    options: &CompileOptions,
) -> Result<CompilationArtifact, CoreError> {
    let planned = schedule_module(module, options)?;
    let wasm = generate_wasm(&planned);
    info!(
        module = %options.module_name,
        functions = planned.len(),
        bytes = wasm.len(),
        "compiled wasm module"
    );
    Ok(CompilationArtifact {
        wasm,
        functions: planned.into_iter().map(|planned| planned.schedule).collect(),
        imports: BUILTINS.to_vec(),
    })
}

pub fn compile_wasm(
    source: &str,
    options: &CompileOptions,
) -> Result<CompilationArtifact, CoreError> {
    compile_module(&parse_module(source)?, options)
}

pub fn emit_module_llvm_ir(module: &Module, options: &CompileOptions) -> Result<String, CoreError> {
    let planned = schedule_module(module, options)?;
    Ok(generate_llvm_ir(&options.module_name, &planned))
}

pub fn emit_llvm_ir(source: &str, options: &CompileOptions) -> Result<String, CoreError> {
    emit_module_llvm_ir(&parse_module(source)?, options)
}

/// Human readable emission order and defer policy of every function.
pub fn render_module_schedule(
    module: &Module,
    options: &CompileOptions,
) -> Result<String, CoreError> {
    let planned = schedule_module(module, options)?;
    Ok(planned
        .iter()
        .map(|planned| planned.schedule.to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn render_schedule(source: &str, options: &CompileOptions) -> Result<String, CoreError> {
    render_module_schedule(&parse_module(source)?, options)
}
