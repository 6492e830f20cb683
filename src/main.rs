//! Bytecode runner CLI.
//!
//! Loads a program file, runs it to completion and reports how it stopped.
//!
//! # Usage
//! ```text
//! regvm <program.bin> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program.bin`: Raw bytecode, magic header included
//!
//! # Options
//! - `-m, --magic <hex>`: Required magic header as hex (defaults to `REGVM_MAGIC`, else none)
//! - `-q, --quiet`: Only log errors
//! - `-l, --log-level <level>`: Minimum log level (`info`, `warn`, `error`)
//! - `-d, --dump`: Print non-zero registers, flags and the stack after the run
//!
//! # Examples
//! ```text
//! regvm program.bin
//! regvm program.bin --magic 52564d31 --dump
//! REGVM_MAGIC=52564d31 regvm program.bin
//! ```

use regvm::utils::log::{Level, set_min_level};
use regvm::virtual_machine::vm::{Exit, VM, VmConfig};
use regvm::{error, info, warn};
use std::env;
use std::fs;
use std::process;
use std::time::Instant;

const MAGIC_ENV: &str = "REGVM_MAGIC";

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut magic_hex: Option<String> = None;
    let mut dump = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--magic" | "-m") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                magic_hex = Some(args[i].clone());
                i += 1;
            }
            "--quiet" | "-q" => {
                set_min_level(Level::Error);
                i += 1;
            }
            k @ ("--log-level" | "-l") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                match Level::parse(&args[i]) {
                    Some(level) => set_min_level(level),
                    None => {
                        error!("Invalid log level: {}", args[i]);
                        process::exit(1);
                    }
                }
                i += 1;
            }
            "--dump" | "-d" => {
                dump = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let magic_hex = magic_hex.or_else(|| env::var(MAGIC_ENV).ok());
    let magic_header = match magic_hex.as_deref().map(str::trim) {
        None | Some("") => Vec::new(),
        Some(h) => hex::decode(h.trim_start_matches("0x")).unwrap_or_else(|e| {
            error!("Invalid magic header '{}': {}", h, e);
            process::exit(1);
        }),
    };

    let bytecode = match fs::read(input_path) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to read {}: {}", input_path, e);
            process::exit(1);
        }
    };
    info!(
        "Loaded {} ({} bytes, header {})",
        input_path,
        bytecode.len(),
        if magic_header.is_empty() {
            "none".to_string()
        } else {
            hex::encode(&magic_header)
        }
    );

    let config = VmConfig::new().with_magic_header(magic_header);
    let mut vm = VM::new(bytecode, config);

    let start = Instant::now();
    let result = vm.run();
    let elapsed = start.elapsed();

    match &result {
        Ok(Exit::Halted) => info!("Halted at offset {} after {:?}", vm.pc(), elapsed),
        Ok(Exit::EndOfProgram) => info!("Reached end of program after {:?}", elapsed),
        Err(e) => error!("Execution failed at offset {}: {}", vm.pc(), e),
    }

    if dump {
        dump_state(&vm);
    }

    if result.is_err() {
        process::exit(1);
    }
}

fn dump_state(vm: &VM) {
    let flags = vm.flags();
    println!("pc    = {}", vm.pc());
    println!("sp    = {}", vm.sp());
    println!("flags = zero:{} negative:{}", flags.is_zero, flags.is_negative);
    let mut any = false;
    for (i, value) in vm.registers().iter().enumerate() {
        if *value != 0 {
            println!("r{:<4} = {} (0x{:016x})", i, value, value);
            any = true;
        }
    }
    if !any {
        println!("(all registers zero)");
    }
    if !vm.stack().is_empty() {
        if vm.stack().len() > 16 {
            warn!("Stack holds {} slots, showing the top 16", vm.stack().len());
        }
        let top: Vec<String> = vm
            .stack()
            .iter()
            .rev()
            .take(16)
            .map(|v| v.to_string())
            .collect();
        println!("stack = [{}] (top first)", top.join(", "));
    }
}

fn print_usage(program: &str) {
    println!("Usage: {program} <program.bin> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -m, --magic <hex>   Required magic header (default: ${MAGIC_ENV}, else none)");
    println!("  -q, --quiet         Only log errors");
    println!("  -l, --log-level <l> Minimum log level: info, warn or error");
    println!("  -d, --dump          Print registers, flags and stack after the run");
    println!("  -h, --help          Show this help");
}
