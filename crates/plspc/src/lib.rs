//! Procedural routine compiler.
//!
//! Input is a type-resolved routine AST (JSON); output is Rust source that
//! implements the `plsp_rt` `Routine` trait on top of that runtime,
//! plus the artifact descriptor the server's loader binds.

pub mod ast;
pub mod coercion;
pub mod compile;
pub mod descriptor;
pub mod language;
pub mod template;
pub mod types;
mod writer;

pub use compile::{
    artifact_name, compile_unit, CompileErrorKind, CompileOptions, CompileOutput, CompileResult,
    CompilerError,
};
pub use descriptor::{descriptor_for, ArtifactDescriptor};
