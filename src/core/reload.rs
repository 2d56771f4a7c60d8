//! Atomic configuration reload.
//!
//! The coordinator owns the active [`RuntimeConfig`] behind an
//! [`ArcSwap`]. A reload compiles the candidate text first and only then
//! publishes it with a single atomic swap: every reader observes either
//! fully the old or fully the new configuration, never a mixture. A failed
//! compile leaves the active configuration untouched and traffic
//! undisturbed.
//!
//! Readers capture a snapshot (`snapshot()` / `engine()`) at the start of
//! route resolution and keep using it to completion, so an in-flight
//! request is never torn by a concurrent swap.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{
    config::{CompileErrors, EnvTable, RuntimeConfig, compile},
    core::engine::MatchEngine,
};

pub struct ReloadCoordinator {
    active: ArcSwap<RuntimeConfig>,
}

impl ReloadCoordinator {
    /// Install an already-compiled configuration as the active one.
    pub fn new(initial: RuntimeConfig) -> Self {
        Self {
            active: ArcSwap::new(Arc::new(initial)),
        }
    }

    /// Compile `text` and install the result, failing without side effects
    /// if compilation fails.
    pub fn from_source(text: &str, env: &EnvTable) -> Result<Self, CompileErrors> {
        Ok(Self::new(compile(text, env)?))
    }

    /// The currently active configuration snapshot.
    pub fn snapshot(&self) -> Arc<RuntimeConfig> {
        self.active.load_full()
    }

    /// A matching engine bound to the currently active snapshot.
    pub fn engine(&self) -> MatchEngine {
        MatchEngine::new(self.snapshot())
    }

    /// Compile a candidate configuration and atomically swap it in.
    ///
    /// On failure the previously active configuration stays installed and
    /// keeps serving; the full error list is returned for diagnostics.
    pub fn reload(&self, text: &str, env: &EnvTable) -> Result<(), CompileErrors> {
        match compile(text, env) {
            Ok(candidate) => {
                let servers = candidate.servers.len();
                self.active.store(Arc::new(candidate));
                tracing::info!(servers, "configuration reloaded");
                Ok(())
            }
            Err(errors) => {
                tracing::warn!(
                    errors = errors.len(),
                    "reload rejected; keeping active configuration"
                );
                Err(errors)
            }
        }
    }

    /// Run the full compile pipeline without installing anything.
    ///
    /// External tooling uses this to check a configuration before
    /// restarting or reloading the live process.
    pub fn validate(text: &str, env: &EnvTable) -> Result<RuntimeConfig, CompileErrors> {
        compile(text, env)
    }
}
