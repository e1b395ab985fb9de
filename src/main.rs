//! Bytecode runner CLI.
//!
//! Loads a program file into a fresh VM and executes it.
//!
//! # Usage
//! ```text
//! obpl <program> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: Bytecode file, either raw or wrapped in an `OBPL` container
//!
//! # Options
//! - `--mem <bytes>`: Memory region size (defaults to 64 KiB)
//! - `--stack <words>`: Operand stack capacity (defaults to 1024)
//! - `--depth <frames>`: Maximum call depth (defaults to 256)
//! - `--disasm`: Print a listing instead of executing
//! - `--trace`: Log every instruction before it executes
//! - `--log-level <level>`: Minimum log level (debug, info, warn, error)

use obpl::utils::log::{self, Level};
use obpl::virtual_machine::config::VmConfig;
use obpl::virtual_machine::disasm::{disassemble, render};
use obpl::virtual_machine::errors::VMError;
use obpl::virtual_machine::output::StdoutOutput;
use obpl::virtual_machine::program::read_program;
use obpl::virtual_machine::vm::VM;
use obpl::{debug, error, info};
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut config = VmConfig::default();
    let mut disasm = false;
    let mut trace = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--mem" | "--stack" | "--depth") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                let value = args[i].parse::<u32>().unwrap_or_else(|_| {
                    error!("Invalid value for {k}: '{}' is not a valid number", args[i]);
                    process::exit(1);
                });
                config = match k {
                    "--mem" => config.with_mem_size(value),
                    "--stack" => config.with_stack_size(value),
                    _ => config.with_max_call_depth(value),
                };
                i += 1;
            }
            "--log-level" => {
                i += 1;
                if i >= args.len() {
                    error!("--log-level requires an argument");
                    process::exit(1);
                }
                let level = Level::parse(&args[i]).unwrap_or_else(|| {
                    error!("Unknown log level: {}", args[i]);
                    process::exit(1);
                });
                log::set_min_level(level);
                i += 1;
            }
            "--disasm" => {
                disasm = true;
                i += 1;
            }
            "--trace" => {
                trace = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let raw = fs::read(input_path).unwrap_or_else(|e| {
        error!("Failed to read {}: {}", input_path, e);
        process::exit(1);
    });
    let bytecode = read_program(&raw).unwrap_or_else(|e| {
        error!("Invalid program file {}: {}", input_path, e);
        process::exit(1);
    });

    if disasm {
        match disassemble(&bytecode) {
            Ok(listing) => print!("{}", render(&listing)),
            Err(e) => {
                error!("Disassembly failed: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if trace {
        log::set_min_level(Level::Debug);
    }

    let mut vm = VM::create(config).unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });
    if let Err(e) = vm.load(&bytecode) {
        error!("{e}");
        process::exit(1);
    }

    let result = if trace {
        run_traced(&mut vm)
    } else {
        vm.execute()
    };
    if let Err(e) = result {
        error!("Execution failed: {}", e);
        process::exit(1);
    }

    if let Ok(top) = vm.peek_top() {
        println!("{top}");
    }
    info!(
        "Executed {} instructions ({} bytes of bytecode)",
        vm.instructions_executed(),
        vm.bytecode_size()
    );
}

/// Steps until the program finishes, logging each instruction first.
fn run_traced(vm: &mut VM) -> Result<(), VMError> {
    loop {
        if let Some(instr) = vm.current_instruction() {
            debug!("{instr}  stack={:?}", vm.stack());
        }
        if vm.step(&mut StdoutOutput)?.is_finished() {
            return Ok(());
        }
    }
}

const USAGE: &str = "\
Bytecode Runner

USAGE:
    {program} <program> [OPTIONS]

ARGS:
    <program>    Bytecode file (raw or OBPL container)

OPTIONS:
    --mem <bytes>          Memory region size (default 65536)
    --stack <words>        Operand stack capacity (default 1024)
    --depth <frames>       Maximum call depth (default 256)
    --disasm               Print a listing instead of executing
    --trace                Log every instruction before it executes
    --log-level <level>    Minimum log level: debug, info, warn, error
    -h, --help             Print this help message

EXAMPLES:
    # Run with default sizes
    {program} program.bin

    # Run with a small stack and trace execution
    {program} program.bin --stack 64 --trace

    # Inspect a program without running it
    {program} program.bin --disasm
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
