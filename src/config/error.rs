//! Compile-time error taxonomy.
//!
//! Every failure between raw text and an installed [`RuntimeConfig`] is one
//! of the variants below. Lexing, parsing and macro expansion fail fast;
//! semantic analysis aggregates everything it can detect into a single
//! [`CompileErrors`] report so operators fix a configuration in one pass.
//!
//! [`RuntimeConfig`]: crate::config::runtime::RuntimeConfig

use std::fmt;

use thiserror::Error;

use crate::config::{lexer::LexError, parser::ParseError};

/// Source position (1-based line and column) attached to diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A single compile-time failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Macro invocations form a dependency cycle.
    #[error("macro expansion cycle: {} ({span})", .chain.join(" -> "))]
    MacroCycle { chain: Vec<String>, span: Span },

    #[error("use of undefined macro '{name}!' ({span})")]
    UndefinedMacro { name: String, span: Span },

    #[error("macro '{name}!' expects {expected} argument(s), got {got} ({span})")]
    MacroArity {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("duplicate macro definition '{name}!' ({span})")]
    DuplicateMacro { name: String, span: Span },

    #[error("unknown directive '{name}' ({span})")]
    UnknownDirective { name: String, span: Span },

    /// A directive is known but cannot appear where it was found.
    #[error("directive '{name}' is not allowed here ({span})")]
    MisplacedDirective { name: String, span: Span },

    #[error(
        "invalid argument '{argument}' for '{directive}' ({span}){}",
        format_allowed(.allowed)
    )]
    InvalidArgument {
        directive: String,
        argument: String,
        allowed: Vec<String>,
        span: Span,
    },

    #[error("reference to undefined matcher '@{name}' ({span})")]
    UndefinedMatcher { name: String, span: Span },

    #[error("duplicate matcher definition '@{name}' ({span})")]
    DuplicateMatcher { name: String, span: Span },

    #[error("duplicate listen address {host}:{port} ({span})")]
    DuplicateListenAddress {
        host: String,
        port: u16,
        span: Span,
    },

    #[error("duplicate server block '{name}' ({span})")]
    DuplicateServer { name: String, span: Span },

    /// No server block declares any listen address.
    #[error("configuration declares no listen address")]
    NoListenAddress,

    #[error("environment variable '{name}' is not set and has no default ({span})")]
    UnsetEnvironmentVariable { name: String, span: Span },

    /// Route entries after a `_` fallback can never run.
    #[error("unreachable route entry after '_' fallback ({span})")]
    UnreachableRoute { span: Span },
}

fn format_allowed(allowed: &[String]) -> String {
    if allowed.is_empty() {
        String::new()
    } else {
        format!(" (allowed: {})", allowed.join(", "))
    }
}

/// Ordered collection of compile errors, as surfaced by [`compile`].
///
/// [`compile`]: crate::config::compile
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }
}

impl From<CompileError> for CompileErrors {
    fn from(err: CompileError) -> Self {
        Self(vec![err])
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} configuration error(s):", self.0.len())?;
        for err in &self.0 {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl IntoIterator for CompileErrors {
    type Item = CompileError;
    type IntoIter = std::vec::IntoIter<CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
