use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blocksched_core::{
    CompilationArtifact, CompileOptions, CoreError, Module, compile_module, emit_module_llvm_ir,
    load_sources, parse_files, parse_module, render_module_schedule,
};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wasmi::{Caller, Engine, Linker, Module as WasmModule, Store};

/// コマンドライン引数を定義するための構造体
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        help = "Block listing file or directory of .blk files (defaults to stdin)"
    )]
    input: Option<String>,

    #[arg(short, long)]
    output: String,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "wasm",
        help = "Output format: wasm, llvm, schedule"
    )]
    emit: String,

    #[arg(long, help = "Run the code if the output format is wasm")]
    run: bool,

    #[arg(long, value_name = "NAME", help = "Function to run (defaults to the first one)")]
    function: Option<String>,

    #[arg(long, default_value_t = 0, help = "Branch fuel passed to the function")]
    fuel: u32,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let options = CompileOptions {
        module_name: module_name(cli.input.as_deref()),
        ..CompileOptions::default()
    };
    let module = read_module(cli.input.as_deref())?;
    debug!(functions = module.functions.len(), "loaded module");

    match cli.emit.as_str() {
        "wasm" => {
            let artifact = compile_module(&module, &options)?;
            write_output(&cli.output, &artifact.wasm)?;
            if cli.run {
                let name = entry_function(&module, cli.function.as_deref())?;
                let run = run_wasm(&artifact, name, cli.fuel as i32)?;
                for id in &run.deferred {
                    println!("deferred call {id}");
                }
                println!("function `{name}` executed {} blocks", run.steps);
            }
        }
        "llvm" => {
            let ir = emit_module_llvm_ir(&module, &options)?;
            write_output(&cli.output, ir.as_bytes())?;
            if cli.run {
                eprintln!("--run is ignored for non-wasm outputs");
            }
        }
        "schedule" => {
            let text = render_module_schedule(&module, &options)?;
            write_output(&cli.output, text.as_bytes())?;
            if cli.run {
                eprintln!("--run is ignored for non-wasm outputs");
            }
        }
        other => return Err(CoreError::UnsupportedFormat(other.to_string()).into()),
    }

    Ok(())
}

fn module_name(input: Option<&str>) -> String {
    input
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| CompileOptions::default().module_name)
}

fn read_module(input: Option<&str>) -> Result<Module> {
    match input {
        Some(path) => {
            let files = load_sources(path)
                .with_context(|| format!("failed to load block listings from {path}"))?;
            info!(files = files.len(), "loaded block listings");
            Ok(parse_files(&files)?)
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(parse_module(&buffer)?)
        }
    }
}

fn entry_function<'a>(module: &'a Module, requested: Option<&str>) -> Result<&'a str> {
    let function = match requested {
        Some(name) => module
            .function(name)
            .ok_or_else(|| CoreError::UnknownFunction(name.to_string()))?,
        None => module
            .functions
            .first()
            .context("the module defines no functions to run")?,
    };
    Ok(&function.name)
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}

struct RunOutcome {
    steps: i32,
    /// Defer ids in the order the host hook received them.
    deferred: Vec<i32>,
}

fn run_wasm(artifact: &CompilationArtifact, function: &str, fuel: i32) -> Result<RunOutcome> {
    let engine = Engine::default();
    let module =
        WasmModule::new(&engine, &artifact.wasm).context("failed to compile wasm artifact")?;
    let mut linker = Linker::<Vec<i32>>::new(&engine);
    linker
        .func_wrap(
            "env",
            "defer_run",
            |mut caller: Caller<'_, Vec<i32>>, id: i32| {
                caller.data_mut().push(id);
            },
        )
        .context("failed to link defer_run")?;
    let mut store = Store::new(&engine, Vec::new());
    let instance = linker
        .instantiate_and_start(&mut store, &module)
        .context("failed to instantiate module")?;
    let entry = instance
        .get_typed_func::<i32, i32>(&store, function)
        .with_context(|| format!("exported function `{function}` missing or has wrong type"))?;
    let steps = entry
        .call(&mut store, fuel)
        .with_context(|| format!("failed to execute `{function}`"))?;
    Ok(RunOutcome {
        steps,
        deferred: store.into_data(),
    })
}
