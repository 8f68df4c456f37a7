//! Simple C compiler CLI
//!
//! A filter in the classic mold: `simple-c < in.c > out.s`. Input and
//! output paths are optional conveniences, as is a TOML configuration file.
//! Semantic diagnostics go to stderr without failing the process; the first
//! syntax error is fatal.

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{Shell, generate};
use scc::CompilerConfig;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "simple-c")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Simple C compiler - emits x86-64 assembly", long_about = None)]
struct Cli {
    /// Input source file (defaults to standard input)
    input: Option<PathBuf>,

    /// Output assembly file (defaults to standard output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compiler configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Generate a shell completion script and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        generate(shell, &mut command, "simple-c", &mut io::stdout());
        return;
    }

    let config = match &cli.config {
        Some(path) => {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("error reading {}: {}", path.display(), e);
                    process::exit(1);
                }
            };
            match CompilerConfig::from_toml(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        }
        None => CompilerConfig::default(),
    };

    let source = match &cli.input {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("error reading {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => {
            let mut source = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut source) {
                eprintln!("error reading standard input: {}", e);
                process::exit(1);
            }
            source
        }
    };

    let output = match scc::compile(&source, &config) {
        Ok(output) => output,
        Err(e) => {
            // Syntax errors are fatal with no recovery.
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    for diagnostic in &output.diagnostics {
        eprintln!("{}", diagnostic);
    }

    let result = match &cli.output {
        Some(path) => std::fs::write(path, &output.assembly),
        None => io::stdout().write_all(output.assembly.as_bytes()),
    };
    if let Err(e) = result {
        eprintln!("error writing output: {}", e);
        process::exit(1);
    }

    if !output.diagnostics.is_empty() && !config.continue_after_errors {
        process::exit(1);
    }
}
