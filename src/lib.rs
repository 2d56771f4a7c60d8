//! Pingclair — configuration compiler and route-matching engine.
//!
//! This crate is the heart of the Pingclair web server / reverse proxy: it
//! compiles a human-authored Pingclairfile into an immutable, validated
//! [`RuntimeConfig`] and answers, per request, which handler chain and
//! which upstream target should serve it. Network listeners, TLS, protocol
//! handling, static file I/O and the admin transport are external
//! collaborators that consume the compiled output.
//!
//! # Features
//! - Caddyfile-style DSL: server blocks, named `@matchers`, ordered
//!   `route` tables, `handle` forms, parameterized macros
//! - Small compiler pipeline: lexer → parser → macro expander → semantic
//!   analyzer, with aggregated semantic diagnostics
//! - Environment-template substitution (`{$NAME}` / `{$NAME:default}`)
//!   from an explicitly passed environment table
//! - Deterministic first-match-wins route resolution with path globs,
//!   host / method / header predicates
//! - Load-balancing policy selection: round-robin, random, least
//!   connections, weighted
//! - Atomic hot reload: validate before swap, never a mixed configuration
//!
//! # Quick Example
//! ```
//! use pingclair::{EnvTable, ReloadCoordinator};
//!
//! let source = r#"
//! example.com:8443 {
//!     @api path /api/*
//!
//!     route {
//!         @api => {
//!             reverse_proxy http://10.0.0.1:3000 http://10.0.0.2:3000 {
//!                 lb_policy least_conn
//!             }
//!         }
//!         _ => {
//!             respond "not found" 404
//!         }
//!     }
//! }
//! "#;
//!
//! let coordinator = ReloadCoordinator::from_source(source, &EnvTable::empty())?;
//! let engine = coordinator.engine();
//! assert!(engine.select_server(8443, "example.com").is_some());
//! # Ok::<(), pingclair::CompileErrors>(())
//! ```
//!
//! # Architecture
//! The `config` module is the compiler: it owns the token, AST and
//! [`RuntimeConfig`] data models plus every compile stage. The `core`
//! module consumes compiled output at request time: the matching engine,
//! load-balancer selection with its mutable side state, and the reload
//! coordinator. Compilation is synchronous and I/O-free; the engine is
//! safe for unsynchronized concurrent readers because the configuration it
//! reads is immutable and only ever replaced wholesale.
//!
//! # Error Handling
//! The compile pipeline returns [`CompileErrors`], an ordered list of
//! typed diagnostics with source positions. "No matching route" at request
//! time is a normal [`MatchOutcome`] variant, never an error.

pub mod config;
pub mod core;
pub mod tracing_setup;

pub use crate::{
    config::{CompileError, CompileErrors, EnvTable, RuntimeConfig, compile},
    core::{LbState, MatchEngine, MatchOutcome, ReloadCoordinator, RequestFacts},
};
