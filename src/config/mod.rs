//! Pingclairfile compilation pipeline.
//!
//! Text goes in, an immutable [`RuntimeConfig`] comes out:
//! lexer → parser → macro expander → semantic analyzer. The pipeline is a
//! pure, synchronous function of the source text and an explicitly passed
//! environment table; it performs no I/O and either succeeds completely or
//! installs nothing.

pub mod analyzer;
pub mod ast;
pub mod error;
pub mod expand;
pub mod lexer;
pub mod parser;
pub mod runtime;

pub use analyzer::{EnvTable, analyze};
pub use error::{CompileError, CompileErrors, Span};
pub use expand::expand;
pub use lexer::{LexError, Token, tokenize};
pub use parser::{ParseError, parse};
pub use runtime::*;

/// Compile a Pingclairfile into a [`RuntimeConfig`].
///
/// This is the validate entry point: external tooling calls it to check a
/// configuration without installing anything, and the reload coordinator
/// calls it to build a candidate before swapping. Lexing, parsing and macro
/// expansion fail fast; semantic analysis reports every error it can find
/// in one pass.
pub fn compile(text: &str, env: &EnvTable) -> Result<RuntimeConfig, CompileErrors> {
    let _span = tracing::info_span!("compile", bytes = text.len()).entered();

    let tokens = tokenize(text).map_err(|e| CompileErrors::from(CompileError::from(e)))?;
    let document = parse(&tokens).map_err(|e| CompileErrors::from(CompileError::from(e)))?;
    let expanded = expand(document).map_err(CompileErrors::from)?;
    let config = analyze(&expanded, env)?;

    tracing::debug!(
        servers = config.servers.len(),
        "configuration compiled successfully"
    );
    Ok(config)
}
