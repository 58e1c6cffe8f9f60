//! `cprep` — the command-line front end for the `includium` preprocessor
//! core: flag parsing, include-directory resolution, and diagnostic
//! rendering all live here, outside the core per the crate's split between
//! the engines and their collaborators.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use includium::{
    find_include_file, Compiler, IncludeContext, IncludeKind, IncludeResolver, PreprocessorConfig,
    PreprocessorDriver,
};

#[derive(Parser)]
#[command(name = "cprep")]
#[command(about = "A standalone C-style preprocessor: comments, continuations, macros, and conditional directives")]
#[command(version)]
struct Cli {
    /// Input file to preprocess, or "-" for stdin
    input: String,

    /// Output file, or "-" for stdout
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,

    /// Define a macro: NAME, NAME=VALUE, or NAME= for an empty replacement
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    /// Undefine (and ban from redefinition) a macro name
    #[arg(short = 'U', value_name = "NAME")]
    undefine: Vec<String>,

    /// Add a directory to the `#include` search path
    #[arg(short = 'I', value_name = "DIR")]
    include_dir: Vec<String>,

    /// Target platform whose predefined macros should be seeded
    #[arg(long, value_enum, default_value_t = TargetArg::Linux)]
    target: TargetArg,

    /// Compiler dialect whose predefined macros should be seeded
    #[arg(long, value_enum)]
    compiler: Option<CompilerArg>,

    /// Maximum macro-expansion restarts before aborting with an error
    #[arg(long, default_value_t = 128)]
    recursion_limit: usize,

    /// Emit the final diagnostic (if any) as a JSON object on stderr
    #[cfg(feature = "json")]
    #[arg(long)]
    json: bool,

    /// Disable colored diagnostic output
    #[arg(long)]
    no_color: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum TargetArg {
    Linux,
    Windows,
    Macos,
}

impl std::fmt::Display for TargetArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetArg::Linux => "linux",
            TargetArg::Windows => "windows",
            TargetArg::Macos => "macos",
        };
        f.write_str(s)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CompilerArg {
    Gcc,
    Clang,
    Msvc,
}

#[cfg(feature = "json")]
#[derive(serde::Serialize)]
struct JsonDiagnostic {
    file: String,
    line: usize,
    message: String,
}

fn main() {
    let cli = Cli::parse();
    let use_color = !cli.no_color && io_stderr_is_tty();

    if let Err(err) = run(&cli) {
        report_error(&cli, use_color, &err);
        std::process::exit(1);
    }
}

fn io_stderr_is_tty() -> bool {
    atty::is(atty::Stream::Stderr)
}

fn run(cli: &Cli) -> Result<()> {
    let source = read_input(&cli.input).with_context(|| format!("reading input '{}'", cli.input))?;

    let main_dir = if cli.input == "-" {
        std::env::current_dir().unwrap_or_default()
    } else {
        Path::new(&cli.input)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    };

    let mut config = match cli.target {
        TargetArg::Linux => PreprocessorConfig::for_linux(),
        TargetArg::Windows => PreprocessorConfig::for_windows(),
        TargetArg::Macos => PreprocessorConfig::for_macos(),
    };
    if let Some(compiler) = cli.compiler {
        config = config.with_compiler(match compiler {
            CompilerArg::Gcc => Compiler::GCC,
            CompilerArg::Clang => Compiler::Clang,
            CompilerArg::Msvc => Compiler::MSVC,
        });
    }
    config = config.with_recursion_limit(cli.recursion_limit);
    config = config.with_include_resolver(build_resolver(main_dir, cli.include_dir.clone()));

    for spec in &cli.define {
        config = config.define(spec);
    }
    for name in &cli.undefine {
        config = config.undefine(name);
    }

    let mut driver = PreprocessorDriver::new();
    for dir in &cli.include_dir {
        driver.add_search_dir(dir.clone());
    }
    driver.set_current_file(display_name(&cli.input));
    driver.apply_config(&config);

    let output = driver
        .process(&source)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    write_output(&cli.output, &output)
}

fn display_name(input: &str) -> String {
    if input == "-" {
        "<stdin>".to_string()
    } else {
        input.to_string()
    }
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        fs::read_to_string(path).map_err(Into::into)
    }
}

fn write_output(path: &str, text: &str) -> Result<()> {
    if path == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(text.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    } else {
        fs::write(path, format!("{text}\n")).map_err(Into::into)
    }
}

/// Build a resolver that reads `#include` targets from disk: local (`"..."`)
/// includes probe the including file's own directory first, falling back to
/// the `-I`/`CPATH` search list exactly like a system (`<...>`) include.
fn build_resolver(main_dir: PathBuf, search_dirs: Vec<String>) -> IncludeResolver {
    Rc::new(move |target: &str, kind: IncludeKind, ctx: &IncludeContext| {
        let from_dir = ctx
            .include_stack
            .last()
            .map(Path::new)
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| main_dir.clone());

        let all_dirs: Vec<String> = search_dirs
            .iter()
            .cloned()
            .chain(ctx.include_dirs.iter().cloned())
            .collect();
        let path = find_include_file(target, &kind, Some(from_dir.as_path()), &all_dirs)?;
        fs::read_to_string(path).ok()
    })
}

fn report_error(cli: &Cli, use_color: bool, err: &anyhow::Error) {
    let message = err.to_string();

    #[cfg(feature = "json")]
    if cli.json {
        let (file, line) = split_location(&message);
        let diag = JsonDiagnostic { file, line, message: message.clone() };
        if let Ok(json) = serde_json::to_string(&diag) {
            eprintln!("{json}");
            return;
        }
    }
    let _ = cli;

    if use_color {
        eprintln!("{}: {}", "error".red().bold(), message);
    } else {
        eprintln!("error: {message}");
    }
}

#[cfg(feature = "json")]
fn split_location(message: &str) -> (String, usize) {
    let first_line = message.lines().next().unwrap_or(message);
    let mut parts = first_line.splitn(3, ':');
    let file = parts.next().unwrap_or("<unknown>").to_string();
    let line = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (file, line)
}
