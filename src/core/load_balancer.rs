//! Load-balancer policy selection.
//!
//! Selection only: picking one upstream target among the already-known
//! targets of a compiled `reverse_proxy` chain. The network call itself is
//! the proxy layer's business.
//!
//! The configuration snapshot is never mutated by selection. Every counter
//! lives in [`LbState`], a separate, explicitly mutable side structure
//! keyed by server-block + target identity: round-robin cursors are
//! advanced here, while in-flight connection gauges are maintained by the
//! proxy layer on connection open/close and only read here. A gauge that is
//! stale by a few connections is an accepted approximation.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use scc::HashMap;

use crate::config::runtime::{LbPolicy, ProxyHandler, UpstreamTarget};

/// Shared mutable side state for load balancing.
///
/// Safe for unsynchronized concurrent use; all counters are atomic and the
/// maps are lock-free.
#[derive(Debug, Default)]
pub struct LbState {
    /// Round-robin cursor per (server, route) identity.
    cursors: HashMap<String, AtomicUsize>,
    /// In-flight connection gauge per (server, target) identity.
    inflight: HashMap<String, AtomicUsize>,
}

fn route_key(server: &str, route_index: usize) -> String {
    format!("{server}#{route_index}")
}

fn target_key(server: &str, target: &str) -> String {
    format!("{server}|{target}")
}

impl LbState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the proxy layer when it opens a connection to a target.
    pub fn connection_opened(&self, server: &str, target: &str) {
        self.inflight
            .entry_sync(target_key(server, target))
            .or_insert(AtomicUsize::new(0))
            .get()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Called by the proxy layer when a connection to a target closes.
    pub fn connection_closed(&self, server: &str, target: &str) {
        let _ = self.inflight.read_sync(&target_key(server, target), |_, gauge| {
            let _ = gauge.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
        });
    }

    /// Current in-flight connection count attributed to a target.
    pub fn inflight(&self, server: &str, target: &str) -> usize {
        self.inflight
            .read_sync(&target_key(server, target), |_, gauge| {
                gauge.load(Ordering::Relaxed)
            })
            .unwrap_or(0)
    }

    fn next_cursor(&self, server: &str, route_index: usize) -> usize {
        self.cursors
            .entry_sync(route_key(server, route_index))
            .or_insert(AtomicUsize::new(0))
            .get()
            .fetch_add(1, Ordering::Relaxed)
    }
}

/// Select one target from a compiled proxy chain according to its policy.
///
/// Returns `None` only for an empty target list, which the analyzer
/// rejects at compile time.
pub fn select_target<'p>(
    proxy: &'p ProxyHandler,
    server: &str,
    route_index: usize,
    state: &LbState,
) -> Option<&'p UpstreamTarget> {
    let targets = &proxy.targets;
    if targets.is_empty() {
        return None;
    }

    match proxy.policy {
        LbPolicy::RoundRobin => {
            let cursor = state.next_cursor(server, route_index);
            targets.get(cursor % targets.len())
        }
        LbPolicy::Random => {
            let index = rand::rng().random_range(0..targets.len());
            targets.get(index)
        }
        LbPolicy::LeastConn => targets
            .iter()
            .min_by_key(|t| state.inflight(server, &t.address)),
        LbPolicy::Weighted => {
            let total: u64 = targets.iter().map(|t| u64::from(t.weight)).sum();
            if total == 0 {
                return targets.first();
            }
            let mut draw = rand::rng().random_range(0..total);
            for target in targets {
                let weight = u64::from(target.weight);
                if draw < weight {
                    return Some(target);
                }
                draw -= weight;
            }
            targets.last()
        }
    }
}
