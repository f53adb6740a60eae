use clap::{Parser, Subcommand};
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use weft::test_runner::{fixture_registry, TestRunner};
use weft::syntax::pretty;
use weft::vm::opcode::dump;
use weft::{compile_opcodes, Document, Scanner, WeftResult};

#[derive(Parser, Debug)]
#[command(name = "weft", version)]
#[command(about = "Weft: template block compiler and incremental rendering VM")]
struct Cli {
    /// Log every pipeline stage (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile an opcode stream and print the serialized template
    Compile {
        /// JSON file holding the opcode stream
        opcodes: PathBuf,
    },
    /// Print the VM instructions of the top-level program
    Ops {
        opcodes: PathBuf,

        /// Compile as a layout instead of an entry point
        #[arg(long)]
        layout: bool,

        /// Also print the scanned statements of every block
        #[arg(long)]
        syntax: bool,
    },
    /// Render an opcode stream to HTML
    Render {
        opcodes: PathBuf,

        /// JSON file used as `this`
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Run .weftt fixtures
    Test {
        #[arg(default_value = "tests/fixtures")]
        dir: PathBuf,
    },
}

fn read(path: &Path) -> WeftResult<String> {
    debug!("reading {}", path.display());
    Ok(fs::read_to_string(path)?)
}

fn compile(path: &Path) -> WeftResult<()> {
    let spec = compile_opcodes(&read(path)?)?;
    println!("{}", spec.to_json_string()?);
    Ok(())
}

fn ops(path: &Path, layout: bool, syntax: bool) -> WeftResult<()> {
    let spec = compile_opcodes(&read(path)?)?;
    let env = fixture_registry();
    let scanner = Scanner::new(&spec, &env);
    let (unit, ops) = if layout {
        let layout = scanner.scan_layout()?;
        (layout.unit().clone(), layout.compile(&env)?)
    } else {
        let entry = scanner.scan_entry_point()?;
        (entry.unit().clone(), entry.compile(&env)?)
    };
    if syntax {
        for (i, block) in unit.blocks().iter().enumerate() {
            println!("block #{}:", i);
            print!("{}", pretty(&block.program));
        }
        println!("top:");
        print!("{}", pretty(unit.program()));
        println!("ops:");
    }
    print!("{}", dump(&ops));
    Ok(())
}

fn render(path: &Path, data: Option<&Path>) -> WeftResult<()> {
    let spec = compile_opcodes(&read(path)?)?;
    let data = match data {
        Some(data) => serde_json::from_str(&read(data)?)?,
        None => Value::Null,
    };
    let env = fixture_registry();
    let entry = Scanner::new(&spec, &env).scan_entry_point()?;

    let mut doc = Document::new();
    let root = doc.create_fragment();
    let result = entry.render(&env, &mut doc, root, data)?;
    let stats = result.stats();
    debug!(
        "{} instructions, {} mutations",
        stats.instructions, stats.mutations
    );
    println!("{}", doc.inner_html(root));
    Ok(())
}

fn run_tests(dir: &Path, verbose: bool) -> Result<(), String> {
    let runner = TestRunner::new(dir, verbose);
    if !runner.run_all()?.is_success() {
        process::exit(1);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match &cli.command {
        Command::Compile { opcodes } => compile(opcodes).map_err(|e| e.to_string()),
        Command::Ops {
            opcodes,
            layout,
            syntax,
        } => ops(opcodes, *layout, *syntax).map_err(|e| e.to_string()),
        Command::Render { opcodes, data } => {
            render(opcodes, data.as_deref()).map_err(|e| e.to_string())
        }
        Command::Test { dir } => run_tests(dir, cli.verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
