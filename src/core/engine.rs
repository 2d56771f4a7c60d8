//! Request-to-route matching engine.
//!
//! The `MatchEngine` answers, per request, "which server block, which route
//! entry, which handler chain". It deliberately avoids I/O and only reads
//! an immutable [`RuntimeConfig`] snapshot, so it is safe for unsynchronized
//! concurrent use from any number of request-handling contexts.
//!
//! Selection rules:
//! * Server blocks are chosen by the accepted port plus the request's Host
//!   value: an exact host match wins, otherwise a block listening on `_`.
//! * Route tables are walked strictly in declaration order; the first
//!   predicate that evaluates true wins. There is no specificity ranking.
//! * "No matching route" is a normal, explicitly representable outcome,
//!   never an error; the proxy layer maps it to its protocol-level 404.

use std::sync::Arc;

use http::{HeaderMap, Method};

use crate::{
    config::runtime::{
        CompiledMatcher, CompiledRoute, HeaderCond, Predicate, ProxyHandler, RuntimeConfig,
        ServerRuntime, UpstreamTarget,
    },
    core::load_balancer::{LbState, select_target},
};

/// The request facts the engine matches against. Borrowed from the proxy
/// layer's in-flight request; the engine never takes ownership.
#[derive(Debug)]
pub struct RequestFacts<'r> {
    /// Host header value, possibly still carrying a port suffix.
    pub host: &'r str,
    /// URI path, already percent-decoded by the protocol layer.
    pub path: &'r str,
    pub method: &'r Method,
    pub headers: &'r HeaderMap,
}

/// Result of resolving one request against the active configuration.
#[derive(Debug)]
pub enum MatchOutcome<'c> {
    /// A route entry matched; its handler chain should run.
    Matched {
        server: &'c ServerRuntime,
        route_index: usize,
        route: &'c CompiledRoute,
    },
    /// A server block was selected but no route entry matched and the block
    /// has no `_` fallback.
    NoRoute { server: &'c ServerRuntime },
    /// No server block listens for this port/host combination.
    NoServer,
}

/// Read-only matching facade over one configuration snapshot.
///
/// Cheap to construct; request handlers grab one per request from the
/// reload coordinator's current snapshot so a mid-request reload never
/// tears their view of the configuration.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    config: Arc<RuntimeConfig>,
}

impl MatchEngine {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Select the server block for an accepted port and Host value.
    ///
    /// Exact (case-insensitive) host match first, then the first block with
    /// a `_` listen on the port.
    pub fn select_server(&self, port: u16, host: &str) -> Option<&ServerRuntime> {
        let host = normalize_host(host);

        let exact = self.config.servers.iter().find(|server| {
            server
                .listens
                .iter()
                .any(|l| l.port == port && l.host != "_" && l.host.eq_ignore_ascii_case(&host))
        });
        if exact.is_some() {
            return exact;
        }

        self.config.servers.iter().find(|server| {
            server
                .listens
                .iter()
                .any(|l| l.port == port && l.host == "_")
        })
    }

    /// Walk a server block's route table in declaration order and return
    /// the first entry whose predicate holds.
    pub fn find_route<'c>(
        &'c self,
        server: &'c ServerRuntime,
        request: &RequestFacts<'_>,
    ) -> Option<(usize, &'c CompiledRoute)> {
        server
            .routes
            .iter()
            .enumerate()
            .find(|(_, route)| matcher_holds(&route.matcher, request))
    }

    /// Full resolution: server selection plus route walk.
    pub fn resolve<'c>(&'c self, port: u16, request: &RequestFacts<'_>) -> MatchOutcome<'c> {
        let Some(server) = self.select_server(port, request.host) else {
            tracing::debug!(port, host = request.host, "no server block for request");
            return MatchOutcome::NoServer;
        };

        match self.find_route(server, request) {
            Some((route_index, route)) => MatchOutcome::Matched {
                server,
                route_index,
                route,
            },
            None => {
                tracing::debug!(
                    server = %server.name,
                    path = request.path,
                    "no route entry matched"
                );
                MatchOutcome::NoRoute { server }
            }
        }
    }

    /// Pick an upstream target for a matched `reverse_proxy` chain,
    /// consulting the compiled policy and the shared [`LbState`] side
    /// structure. Never mutates the configuration snapshot.
    pub fn select_upstream<'p>(
        &self,
        server: &ServerRuntime,
        route_index: usize,
        proxy: &'p ProxyHandler,
        state: &LbState,
    ) -> Option<&'p UpstreamTarget> {
        select_target(proxy, &server.name, route_index, state)
    }
}

/// Strip an optional port suffix from a Host value and lowercase it.
fn normalize_host(host: &str) -> String {
    let stripped = if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal.
        rest.split(']').next().unwrap_or(rest)
    } else {
        match host.rsplit_once(':') {
            Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => h,
            _ => host,
        }
    };
    stripped.to_ascii_lowercase()
}

fn matcher_holds(matcher: &CompiledMatcher, request: &RequestFacts<'_>) -> bool {
    match matcher {
        CompiledMatcher::Always | CompiledMatcher::Fallback => true,
        CompiledMatcher::Predicates(predicates) => {
            predicates.iter().all(|p| predicate_holds(p, request))
        }
    }
}

fn predicate_holds(predicate: &Predicate, request: &RequestFacts<'_>) -> bool {
    match predicate {
        Predicate::Path(globs) => globs.iter().any(|g| path_glob_matches(g, request.path)),
        Predicate::Host(hosts) => {
            let host = normalize_host(request.host);
            hosts.iter().any(|h| h.eq_ignore_ascii_case(&host))
        }
        Predicate::Method(methods) => methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(request.method.as_str())),
        Predicate::Header { name, cond } => {
            let value = request
                .headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok());
            header_cond_holds(cond, value)
        }
    }
}

fn header_cond_holds(cond: &HeaderCond, value: Option<&str>) -> bool {
    match cond {
        HeaderCond::Exists => value.is_some(),
        HeaderCond::Equals(expected) => value == Some(expected.as_str()),
        HeaderCond::Prefix(prefix) => value.is_some_and(|v| v.starts_with(prefix)),
        HeaderCond::Suffix(suffix) => value.is_some_and(|v| v.ends_with(suffix)),
        HeaderCond::Matches(pattern) => value.is_some_and(|v| pattern.is_match(v)),
    }
}

/// Path glob evaluation, segment-wise and case-sensitive.
///
/// `*` as an interior segment matches exactly one segment; `*` as the final
/// segment matches one or more remaining segments; `**` matches any
/// remainder including nothing.
pub fn path_glob_matches(pattern: &str, path: &str) -> bool {
    let pat: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut si = 0;
    for (pi, part) in pat.iter().enumerate() {
        match *part {
            "**" => return true,
            "*" if pi == pat.len() - 1 => return si < segs.len(),
            "*" => {
                if si >= segs.len() {
                    return false;
                }
                si += 1;
            }
            literal => {
                if segs.get(si) != Some(&literal) {
                    return false;
                }
                si += 1;
            }
        }
    }

    si == segs.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvTable, compile};

    fn engine(source: &str) -> MatchEngine {
        MatchEngine::new(Arc::new(compile(source, &EnvTable::empty()).unwrap()))
    }

    fn facts<'r>(host: &'r str, path: &'r str, method: &'r Method, headers: &'r HeaderMap) -> RequestFacts<'r> {
        RequestFacts {
            host,
            path,
            method,
            headers,
        }
    }

    #[test]
    fn glob_semantics() {
        assert!(path_glob_matches("/api/*", "/api/v1/x"));
        assert!(path_glob_matches("/api/*", "/api/v1"));
        assert!(!path_glob_matches("/api/*", "/api"));
        assert!(!path_glob_matches("/api/*", "/other"));
        assert!(path_glob_matches("/api/*/users", "/api/v1/users"));
        assert!(!path_glob_matches("/api/*/users", "/api/v1/v2/users"));
        assert!(path_glob_matches("/api/**", "/api"));
        assert!(path_glob_matches("/api/**", "/api/a/b/c"));
        assert!(path_glob_matches("/exact", "/exact"));
        assert!(!path_glob_matches("/exact", "/exact/sub"));
        assert!(path_glob_matches("/", "/"));
    }

    #[test]
    fn first_match_wins_in_declaration_order() {
        let engine = engine(
            ":80 {\n  route {\n    /api/* => { reverse_proxy http://a:1 }\n    /assets/* => { file_server /var/www }\n    _ => { respond 404 }\n  }\n}",
        );
        let method = Method::GET;
        let headers = HeaderMap::new();

        let index_for = |path: &str| {
            match engine.resolve(80, &facts("example.com", path, &method, &headers)) {
                MatchOutcome::Matched { route_index, .. } => route_index,
                other => panic!("expected a match, got {other:?}"),
            }
        };

        assert_eq!(index_for("/api/v1/x"), 0);
        assert_eq!(index_for("/assets/a.css"), 1);
        assert_eq!(index_for("/other"), 2);
    }

    #[test]
    fn host_selection_prefers_exact_over_wildcard() {
        let engine = engine(
            "api.example.com:8080 {\n  respond 201\n}\nserver \"catchall\" {\n  listen :8080\n  respond 404\n}",
        );
        let method = Method::GET;
        let headers = HeaderMap::new();

        let exact = engine
            .select_server(8080, "api.example.com")
            .expect("exact host should match");
        assert_eq!(exact.name, "api.example.com:8080");

        let fallback = engine
            .select_server(8080, "other.example.com")
            .expect("wildcard listen should catch unknown hosts");
        assert_eq!(fallback.name, "catchall");

        // Host values carrying a port still match.
        let with_port = engine.resolve(
            8080,
            &facts("API.EXAMPLE.COM:8080", "/", &method, &headers),
        );
        assert!(matches!(
            with_port,
            MatchOutcome::Matched { server, .. } if server.name == "api.example.com:8080"
        ));
    }

    #[test]
    fn no_server_for_unknown_port() {
        let engine = engine(":80 {\n  respond 204\n}");
        let method = Method::GET;
        let headers = HeaderMap::new();
        assert!(matches!(
            engine.resolve(9999, &facts("x", "/", &method, &headers)),
            MatchOutcome::NoServer
        ));
    }

    #[test]
    fn no_route_without_fallback_is_structural() {
        let engine = engine(":80 {\n  route {\n    /api/* => { respond 200 }\n  }\n}");
        let method = Method::GET;
        let headers = HeaderMap::new();
        assert!(matches!(
            engine.resolve(80, &facts("x", "/unmatched", &method, &headers)),
            MatchOutcome::NoRoute { .. }
        ));
    }

    #[test]
    fn method_predicate_is_case_insensitive() {
        let engine = engine(
            ":80 {\n  @writes method post put\n  route {\n    @writes => { respond 201 }\n    _ => { respond 404 }\n  }\n}",
        );
        let headers = HeaderMap::new();

        let outcome = engine.resolve(80, &facts("x", "/", &Method::POST, &headers));
        assert!(matches!(
            outcome,
            MatchOutcome::Matched { route_index: 0, .. }
        ));

        let outcome = engine.resolve(80, &facts("x", "/", &Method::GET, &headers));
        assert!(matches!(
            outcome,
            MatchOutcome::Matched { route_index: 1, .. }
        ));
    }

    #[test]
    fn header_predicates() {
        let engine = engine(
            ":80 {\n  @internal {\n    header X-Env prod\n  }\n  @tokened {\n    header Authorization Bearer*\n  }\n  route {\n    @internal => { respond 200 }\n    @tokened => { respond 202 }\n    _ => { respond 404 }\n  }\n}",
        );
        let method = Method::GET;

        let mut headers = HeaderMap::new();
        headers.insert("x-env", "prod".parse().unwrap());
        let outcome = engine.resolve(80, &facts("x", "/", &method, &headers));
        assert!(matches!(outcome, MatchOutcome::Matched { route_index: 0, .. }));

        // Header values are case-sensitive.
        let mut headers = HeaderMap::new();
        headers.insert("x-env", "PROD".parse().unwrap());
        let outcome = engine.resolve(80, &facts("x", "/", &method, &headers));
        assert!(matches!(outcome, MatchOutcome::Matched { route_index: 2, .. }));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        let outcome = engine.resolve(80, &facts("x", "/", &method, &headers));
        assert!(matches!(outcome, MatchOutcome::Matched { route_index: 1, .. }));
    }

    #[test]
    fn predicates_within_a_matcher_conjoin() {
        let engine = engine(
            ":80 {\n  @api {\n    path /api/*\n    method GET\n  }\n  route {\n    @api => { respond 200 }\n    _ => { respond 404 }\n  }\n}",
        );
        let headers = HeaderMap::new();

        let outcome = engine.resolve(80, &facts("x", "/api/v1", &Method::GET, &headers));
        assert!(matches!(outcome, MatchOutcome::Matched { route_index: 0, .. }));

        let outcome = engine.resolve(80, &facts("x", "/api/v1", &Method::POST, &headers));
        assert!(matches!(outcome, MatchOutcome::Matched { route_index: 1, .. }));
    }
}
