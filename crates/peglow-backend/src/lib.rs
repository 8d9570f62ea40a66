//! Compiles PEG grammar definitions into executable parser programs.
//!
//! The input is a fully formed grammar AST ([`ast::Grammar`]); the output
//! is a [`peglow_runtime::Program`] whose rules have been lowered into
//! combinator descriptors with all rule references resolved to handles.
//! Backtracking, lookahead, and memoization semantics live in
//! `peglow-runtime`; this crate only decides what to build.

pub mod ast;
pub mod compile;
pub mod error;
pub mod lower;
pub mod resolve;

pub use compile::{compile, CompileOptions};
pub use error::CompileError;
