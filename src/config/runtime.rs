//! Compiled runtime configuration.
//!
//! This is the immutable output of a successful compile: the only structure
//! the route-matching engine reads, and the unit the reload coordinator
//! swaps wholesale. Nothing here is ever mutated in place — mutable
//! load-balancer state lives in a separate side structure
//! ([`LbState`](crate::core::load_balancer::LbState)).
//!
//! All types serialize so the admin collaborator can take a read-only JSON
//! snapshot, and compare structurally so identical compiles are equal.

use std::fmt;

use regex::Regex;
use serde::Serialize;

/// The whole compiled configuration for one compile cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct RuntimeConfig {
    pub settings: GlobalSettings,
    /// Server blocks in declaration order.
    pub servers: Vec<ServerRuntime>,
}

impl RuntimeConfig {
    /// Look up a server block by its compiled identity.
    pub fn server(&self, name: &str) -> Option<&ServerRuntime> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Read-only introspection snapshot for the admin collaborator.
    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Settings from the leading global options block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSettings {
    pub debug: bool,
    /// Master switch for automatic certificate management.
    pub auto_https: bool,
    pub log_level: Option<LogLevel>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            debug: false,
            auto_https: true,
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One compiled server block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRuntime {
    /// Explicit `server "name"` or the first normalized listen address.
    pub name: String,
    pub listens: Vec<ListenAddress>,
    /// Whether the TLS collaborator should manage certificates for this
    /// block automatically.
    pub auto_https: bool,
    /// Ordered route table; first matching entry wins.
    pub routes: Vec<CompiledRoute>,
    /// Server-attached response header operations.
    pub headers: Option<HeaderOps>,
    /// Server-attached response compression algorithms.
    pub encodings: Vec<Encoding>,
    /// Per-server access log settings.
    pub log: Option<LogSettings>,
}

/// Normalized listen address. Host `_` matches any host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenAddress {
    pub host: String,
    pub port: u16,
    pub scheme: SchemeHint,
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Plain/TLS hint for the listener collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeHint {
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledRoute {
    pub matcher: CompiledMatcher,
    pub handlers: Vec<Handler>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompiledMatcher {
    /// Catch-all from a bare `handle` or a server-level handler directive.
    Always,
    /// The explicit `_` fallback; always true, only legal as last entry.
    Fallback,
    /// Predicate conjunction: every predicate must hold.
    Predicates(Vec<Predicate>),
}

impl CompiledMatcher {
    pub fn is_fallback(&self) -> bool {
        matches!(self, CompiledMatcher::Fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Path globs; any pattern matching is enough.
    Path(Vec<String>),
    /// Host names, stored lowercase; membership is enough.
    Host(Vec<String>),
    /// Methods, stored uppercase; membership is enough.
    Method(Vec<String>),
    Header { name: String, cond: HeaderCond },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderCond {
    Exists,
    /// Case-sensitive equality.
    Equals(String),
    Prefix(String),
    Suffix(String),
    Matches(HeaderPattern),
}

/// A compiled header-value regex. Equality and serialization go through the
/// source pattern so compiled configurations stay structurally comparable.
#[derive(Debug, Clone)]
pub struct HeaderPattern {
    pattern: String,
    regex: Regex,
}

impl HeaderPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for HeaderPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Serialize for HeaderPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

/// One action in a handler chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Handler {
    ReverseProxy(ProxyHandler),
    FileServer(FileServerSettings),
    Respond {
        status: u16,
        body: Option<String>,
    },
    Redirect {
        to: String,
        code: u16,
    },
    Headers(HeaderOps),
    Encode(Vec<Encoding>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyHandler {
    /// Upstream targets in declaration order.
    pub targets: Vec<UpstreamTarget>,
    pub policy: LbPolicy,
    pub failover: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamTarget {
    /// Normalized address, always scheme-qualified.
    pub address: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LbPolicy {
    RoundRobin,
    Random,
    LeastConn,
    Weighted,
}

impl LbPolicy {
    pub const NAMES: [&'static str; 4] = ["round_robin", "random", "least_conn", "weighted"];

    /// Case-insensitive parse to the canonical policy.
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "round_robin" => Some(Self::RoundRobin),
            "random" => Some(Self::Random),
            "least_conn" => Some(Self::LeastConn),
            "weighted" => Some(Self::Weighted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileServerSettings {
    pub root: String,
    pub index: Vec<String>,
    pub browse: bool,
}

/// Ordered response-header mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct HeaderOps {
    pub set: Vec<(String, String)>,
    pub add: Vec<(String, String)>,
    pub remove: Vec<String>,
}

impl HeaderOps {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Gzip,
    Br,
    Zstd,
}

impl Encoding {
    pub const NAMES: [&'static str; 3] = ["gzip", "br", "zstd"];

    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "gzip" => Some(Self::Gzip),
            "br" => Some(Self::Br),
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSettings {
    pub output: LogOutput,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}
