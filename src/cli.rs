//! Thin CLI plumbing around [`crate::driver`]. Ambient surface only — the
//! argument shape and file I/O are explicitly out of scope for the
//! language core (spec §1).

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Args, Subcommand};

use paracl::driver::Driver;
use paracl::vm::Vm;

#[derive(Subcommand)]
pub enum Command {
    /// Compile and execute a source file; `?` reads from stdin.
    Run(RunArgs),
    /// Lex, parse, and analyze only; report diagnostics.
    Check(CheckArgs),
    /// Compile and print the bytecode disassembly.
    Disasm(DisasmArgs),
}

#[derive(Args)]
pub struct RunArgs {
    pub input: PathBuf,
}

#[derive(Args)]
pub struct CheckArgs {
    pub input: PathBuf,
}

#[derive(Args)]
pub struct DisasmArgs {
    pub input: PathBuf,
}

pub fn dispatch(command: Command) {
    match command {
        Command::Run(args) => cmd_run(args),
        Command::Check(args) => cmd_check(args),
        Command::Disasm(args) => cmd_disasm(args),
    }
}

fn read_source(path: &PathBuf) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("error: could not read {}: {err}", path.display());
        process::exit(1);
    })
}

fn cmd_run(args: RunArgs) {
    let source = read_source(&args.input);
    let mut driver = Driver::new();
    match driver.compile(&source, 0) {
        Some(image) => {
            let stdin = io::stdin();
            let stdout = io::stdout();
            let mut vm = Vm::new(image, stdin.lock(), stdout.lock());
            if let Err(err) = vm.run_to_completion() {
                eprintln!("runtime error: {err}");
                process::exit(1);
            }
        }
        None => {
            driver
                .reporter()
                .render_all(&args.input.display().to_string(), &source);
            process::exit(1);
        }
    }
}

fn cmd_check(args: CheckArgs) {
    let source = read_source(&args.input);
    let mut driver = Driver::new();
    match driver.check(&source, 0) {
        Some(_) => eprintln!("OK: {}", args.input.display()),
        None => {
            driver
                .reporter()
                .render_all(&args.input.display().to_string(), &source);
            process::exit(1);
        }
    }
}

fn cmd_disasm(args: DisasmArgs) {
    let source = read_source(&args.input);
    let mut driver = Driver::new();
    match driver.compile(&source, 0) {
        Some(image) => {
            let _ = io::stdout().write_all(image.disassemble().as_bytes());
        }
        None => {
            driver
                .reporter()
                .render_all(&args.input.display().to_string(), &source);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn read_source_reads_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        write!(file, "print 1;").unwrap();
        assert_eq!(read_source(&file.path().to_path_buf()), "print 1;");
    }
}
