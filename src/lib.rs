//! Weft: a template block compiler and incremental rendering VM
//!
//! The pipeline runs in three stages:
//!
//! 1. `compiler::TemplateCompiler` folds a flat opcode stream into a
//!    `SerializedTemplate` (the block form).
//! 2. `scanner::Scanner` turns the block form into an `EntryPoint` or
//!    `Layout`, resolving components and modifiers against an `Environment`.
//! 3. The `vm` lowers blocks to `OpSeq`s on first use, renders them into a
//!    `DomBackend`, and keeps what it needs to update the output in place.

pub mod blocks;
pub mod compiler;
pub mod dom;
pub mod environment;
pub mod error;
pub mod list;
pub mod scanner;
pub mod symbol_table;
pub mod syntax;
pub mod test_runner;
pub mod vm;
pub mod wire;

pub use blocks::{CompileState, EntryPoint, Layout};
pub use compiler::{parse_opcodes, TemplateCompiler};
pub use dom::{Document, DomBackend, NodeRef};
pub use environment::{ComponentDefinition, Environment, Helper, Modifier, Registry};
pub use error::{WeftError, WeftResult};
pub use scanner::Scanner;
pub use vm::{RenderResult, RenderStats};
pub use wire::SerializedTemplate;

/// Compile an opcode stream (JSON text) to its block form
pub fn compile_opcodes(source: &str) -> WeftResult<SerializedTemplate> {
    let opcodes = parse_opcodes(source)?;
    Ok(TemplateCompiler::process(&opcodes)?.to_serialized())
}
