//! Semantic analysis and lowering.
//!
//! Takes the macro-free AST and produces a [`RuntimeConfig`], or the full
//! list of semantic errors found in one pass. Responsibilities, each
//! independently testable:
//!
//! * environment-template substitution from an explicitly passed [`EnvTable`]
//! * listen-address normalization and global duplicate detection
//! * named-matcher resolution within server-block scope
//! * directive validation against the closed directive set, with
//!   case-insensitive normalization of enum-valued arguments
//! * route-table compilation preserving declaration order
//! * load-balancer policy compilation for multi-target `reverse_proxy`
//!
//! Unlike the earlier stages this one keeps going after an error wherever it
//! can, so operators see every fixable problem at once.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use url::Url;

use crate::config::{
    ast::{
        Arg, ArgValue, DirectiveItem, DirectiveNode, Document, MatcherDef, MatcherRef, ServerBlock,
        ServerItem,
    },
    error::{CompileError, CompileErrors, Span},
    runtime::{
        CompiledMatcher, CompiledRoute, Encoding, FileServerSettings, GlobalSettings, Handler,
        HeaderCond, HeaderOps, HeaderPattern, LbPolicy, ListenAddress, LogFormat, LogLevel,
        LogOutput, LogSettings, Predicate, ProxyHandler, RuntimeConfig, SchemeHint, ServerRuntime,
        UpstreamTarget,
    },
};

/// Environment variable table, passed explicitly so compilation never reads
/// ambient process state and tests can supply synthetic environments.
#[derive(Debug, Clone, Default)]
pub struct EnvTable(HashMap<String, String>);

impl EnvTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the host process environment.
    pub fn from_process() -> Self {
        Self(std::env::vars().collect())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Lower a macro-free document into a [`RuntimeConfig`], aggregating all
/// detectable semantic errors.
pub fn analyze(doc: &Document, env: &EnvTable) -> Result<RuntimeConfig, CompileErrors> {
    let mut analyzer = Analyzer {
        env,
        errors: Vec::new(),
        seen_listens: HashSet::new(),
    };

    let settings = analyzer.global_settings(&doc.options);

    let mut servers = Vec::with_capacity(doc.servers.len());
    let mut names: HashSet<String> = HashSet::new();
    for (index, block) in doc.servers.iter().enumerate() {
        let server = analyzer.compile_server(block, index, &settings);
        if !names.insert(server.name.clone()) {
            analyzer.errors.push(CompileError::DuplicateServer {
                name: server.name.clone(),
                span: block.span,
            });
        }
        servers.push(server);
    }

    if servers.iter().all(|s| s.listens.is_empty()) {
        analyzer.errors.push(CompileError::NoListenAddress);
    }

    if analyzer.errors.is_empty() {
        Ok(RuntimeConfig { settings, servers })
    } else {
        Err(CompileErrors(analyzer.errors))
    }
}

struct Analyzer<'e> {
    env: &'e EnvTable,
    errors: Vec<CompileError>,
    /// (host, port) pairs already claimed anywhere in this compile unit.
    seen_listens: HashSet<(String, u16)>,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const REDIRECT_CODES: [u16; 4] = [301, 302, 307, 308];

impl Analyzer<'_> {
    fn invalid(&mut self, directive: &str, argument: impl Into<String>, allowed: &[&str], span: Span) {
        self.errors.push(CompileError::InvalidArgument {
            directive: directive.to_string(),
            argument: argument.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            span,
        });
    }

    // ------------------------------------------------------------------
    // Environment substitution
    // ------------------------------------------------------------------

    /// Resolve one argument to its final text, substituting environment
    /// templates. Returns `None` (with the error recorded) if a referenced
    /// variable is unset and has no default.
    fn resolve(&mut self, arg: &Arg) -> Option<String> {
        match &arg.value {
            ArgValue::Word(w) => Some(w.clone()),
            ArgValue::Str(s) => self.substitute_str(s, arg.span),
            ArgValue::Env { name, default } => self.lookup_env(name, default.as_deref(), arg.span),
        }
    }

    fn lookup_env(&mut self, name: &str, default: Option<&str>, span: Span) -> Option<String> {
        match self.env.get(name) {
            Some(value) => Some(value.to_string()),
            None => match default {
                Some(d) => Some(d.to_string()),
                None => {
                    self.errors.push(CompileError::UnsetEnvironmentVariable {
                        name: name.to_string(),
                        span,
                    });
                    None
                }
            },
        }
    }

    /// Substitute `{$NAME}` / `{$NAME:default}` occurrences inside a quoted
    /// string. Anything that does not form a complete template passes
    /// through verbatim.
    fn substitute_str(&mut self, s: &str, span: Span) -> Option<String> {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        let mut ok = true;

        while let Some(start) = rest.find("{$") {
            out.push_str(&rest[..start]);
            let tail = &rest[start + 2..];
            match tail.find('}') {
                Some(end) => {
                    let inner = &tail[..end];
                    let (name, default) = match inner.split_once(':') {
                        Some((n, d)) => (n, Some(d)),
                        None => (inner, None),
                    };
                    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    } else {
                        match self.lookup_env(name, default, span) {
                            Some(value) => out.push_str(&value),
                            None => ok = false,
                        }
                    }
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);

        ok.then_some(out)
    }

    // ------------------------------------------------------------------
    // Global options
    // ------------------------------------------------------------------

    fn global_settings(&mut self, options: &[DirectiveNode]) -> GlobalSettings {
        let mut settings = GlobalSettings::default();

        for d in options {
            // Directive names match case-insensitively.
            match d.name.to_ascii_lowercase().as_str() {
                "debug" => {
                    settings.debug = match self.first_arg(d) {
                        None => true,
                        Some(v) if v == "true" => true,
                        Some(v) if v == "false" => false,
                        Some(v) => {
                            self.invalid("debug", v, &["true", "false"], d.span);
                            true
                        }
                    };
                }
                "auto_https" => match self.first_arg(d).as_deref() {
                    Some("on") => settings.auto_https = true,
                    Some("off") => settings.auto_https = false,
                    Some(v) => self.invalid("auto_https", v, &["on", "off"], d.span),
                    None => self.invalid("auto_https", "<missing>", &["on", "off"], d.span),
                },
                "log_level" => match self.first_arg(d) {
                    Some(v) => match v.to_ascii_lowercase().as_str() {
                        "trace" => settings.log_level = Some(LogLevel::Trace),
                        "debug" => settings.log_level = Some(LogLevel::Debug),
                        "info" => settings.log_level = Some(LogLevel::Info),
                        "warn" => settings.log_level = Some(LogLevel::Warn),
                        "error" => settings.log_level = Some(LogLevel::Error),
                        _ => self.invalid("log_level", v, &LOG_LEVELS, d.span),
                    },
                    None => self.invalid("log_level", "<missing>", &LOG_LEVELS, d.span),
                },
                other => self.errors.push(CompileError::UnknownDirective {
                    name: other.to_string(),
                    span: d.span,
                }),
            }
        }

        settings
    }

    fn first_arg(&mut self, d: &DirectiveNode) -> Option<String> {
        d.args.first().cloned().and_then(|a| self.resolve(&a))
    }

    // ------------------------------------------------------------------
    // Server blocks
    // ------------------------------------------------------------------

    fn compile_server(
        &mut self,
        block: &ServerBlock,
        index: usize,
        settings: &GlobalSettings,
    ) -> ServerRuntime {
        // Listen addresses: block-introducing address list first, then any
        // `listen` directives, all semantically equivalent.
        let mut listens = Vec::new();
        for arg in &block.addresses {
            if let Some(text) = self.resolve(arg) {
                if let Some(addr) = self.parse_listen(&text, arg.span) {
                    listens.push(addr);
                }
            }
        }
        for item in &block.items {
            if let ServerItem::Listen { args, span } = item {
                if args.is_empty() {
                    self.invalid("listen", "<missing>", &["host:port", ":port"], *span);
                }
                for arg in args {
                    if let Some(text) = self.resolve(arg) {
                        if let Some(addr) = self.parse_listen(&text, arg.span) {
                            listens.push(addr);
                        }
                    }
                }
            }
        }

        let name = block
            .name
            .clone()
            .or_else(|| listens.first().map(ListenAddress::to_string))
            .unwrap_or_else(|| format!("server{index}"));

        if listens.is_empty() {
            tracing::warn!(server = %name, "server block has no listen address and can never be selected");
        }

        // Named matchers are collected up front so declaration position
        // inside the block does not matter for resolution.
        let mut matchers: HashMap<String, Vec<Predicate>> = HashMap::new();
        for item in &block.items {
            if let ServerItem::MatcherDef(def) = item {
                if matchers.contains_key(&def.name) {
                    self.errors.push(CompileError::DuplicateMatcher {
                        name: def.name.clone(),
                        span: def.span,
                    });
                    continue;
                }
                let predicates = self.compile_predicates(def);
                matchers.insert(def.name.clone(), predicates);
            }
        }

        let mut routes: Vec<CompiledRoute> = Vec::new();
        let mut fallback_seen = false;
        let mut headers: Option<HeaderOps> = None;
        let mut encodings = Vec::new();
        let mut log = None;

        let push_route = |this: &mut Self,
                              routes: &mut Vec<CompiledRoute>,
                              fallback_seen: &mut bool,
                              matcher: CompiledMatcher,
                              handlers: Vec<Handler>,
                              span: Span| {
            if *fallback_seen {
                this.errors.push(CompileError::UnreachableRoute { span });
                return;
            }
            if matcher.is_fallback() {
                *fallback_seen = true;
            }
            routes.push(CompiledRoute { matcher, handlers });
        };

        for item in &block.items {
            match item {
                ServerItem::Listen { .. } | ServerItem::MatcherDef(_) => {}
                ServerItem::Route(route) => {
                    for arm in &route.arms {
                        let matcher = self.resolve_matcher(&arm.matcher, &matchers);
                        let handlers = self.compile_chain(&arm.body);
                        push_route(
                            self,
                            &mut routes,
                            &mut fallback_seen,
                            matcher,
                            handlers,
                            arm.span,
                        );
                    }
                }
                ServerItem::Handle(handle) => {
                    let matcher = match &handle.matcher {
                        Some(m) => self.resolve_matcher(m, &matchers),
                        None => CompiledMatcher::Always,
                    };
                    let handlers = self.compile_chain(&handle.body);
                    push_route(
                        self,
                        &mut routes,
                        &mut fallback_seen,
                        matcher,
                        handlers,
                        handle.span,
                    );
                }
                ServerItem::Item(DirectiveItem::Plain(d)) => match d.name.to_ascii_lowercase().as_str() {
                    "header" => {
                        let ops = self.compile_header_ops(d);
                        match &mut headers {
                            Some(existing) => {
                                existing.set.extend(ops.set);
                                existing.add.extend(ops.add);
                                existing.remove.extend(ops.remove);
                            }
                            None => headers = Some(ops),
                        }
                    }
                    "encode" => encodings.extend(self.compile_encodings(d)),
                    "log" => log = Some(self.compile_log(d)),
                    "reverse_proxy" | "respond" | "file_server" | "redirect" => {
                        let handlers = self.compile_handler(d).into_iter().collect();
                        push_route(
                            self,
                            &mut routes,
                            &mut fallback_seen,
                            CompiledMatcher::Always,
                            handlers,
                            d.span,
                        );
                    }
                    "route" | "handle" | "listen" | "macro" | "server" | "use" => {
                        self.errors.push(CompileError::MisplacedDirective {
                            name: d.name.clone(),
                            span: d.span,
                        });
                    }
                    other => self.errors.push(CompileError::UnknownDirective {
                        name: other.to_string(),
                        span: d.span,
                    }),
                },
                ServerItem::Item(DirectiveItem::Invoke(inv)) => {
                    // Expansion runs before analysis; nothing to do but flag it.
                    debug_assert!(false, "unexpanded macro invocation reached the analyzer");
                    self.errors.push(CompileError::UndefinedMacro {
                        name: inv.name.clone(),
                        span: inv.span,
                    });
                }
            }
        }

        let auto_https = settings.auto_https
            && listens
                .iter()
                .any(|l| l.scheme == SchemeHint::Https && domain_like(&l.host));

        ServerRuntime {
            name,
            listens,
            auto_https,
            routes,
            headers: headers.filter(|h| !h.is_empty()),
            encodings,
            log,
        }
    }

    // ------------------------------------------------------------------
    // Listen addresses
    // ------------------------------------------------------------------

    fn parse_listen(&mut self, text: &str, span: Span) -> Option<ListenAddress> {
        let (explicit, rest) = if let Some(r) = text.strip_prefix("https://") {
            (Some(SchemeHint::Https), r)
        } else if let Some(r) = text.strip_prefix("http://") {
            (Some(SchemeHint::Http), r)
        } else {
            (None, text)
        };

        let (host, port_text) = if let Some(p) = rest.strip_prefix(':') {
            ("_".to_string(), p)
        } else {
            match rest.rsplit_once(':') {
                Some((h, p)) if !h.is_empty() => (h.to_ascii_lowercase(), p),
                _ => {
                    self.invalid("listen", rest, &["host:port", ":port"], span);
                    return None;
                }
            }
        };

        let port = match port_text.parse::<u16>() {
            Ok(p) if p >= 1 => p,
            _ => {
                self.invalid("listen", port_text, &["a port in 1-65535"], span);
                return None;
            }
        };

        if !self.seen_listens.insert((host.clone(), port)) {
            self.errors.push(CompileError::DuplicateListenAddress {
                host: host.clone(),
                port,
                span,
            });
            return None;
        }

        let scheme = explicit.unwrap_or(match port {
            80 => SchemeHint::Http,
            443 => SchemeHint::Https,
            _ if domain_like(&host) => SchemeHint::Https,
            _ => SchemeHint::Http,
        });

        Some(ListenAddress { host, port, scheme })
    }

    // ------------------------------------------------------------------
    // Matchers
    // ------------------------------------------------------------------

    fn compile_predicates(&mut self, def: &MatcherDef) -> Vec<Predicate> {
        let mut predicates = Vec::new();

        if def.predicates.is_empty() {
            self.invalid(
                &format!("@{}", def.name),
                "<empty>",
                &["at least one predicate"],
                def.span,
            );
            return predicates;
        }

        for line in &def.predicates {
            match line.name.to_ascii_lowercase().as_str() {
                "path" => {
                    let mut globs = Vec::new();
                    for arg in &line.args {
                        if let Some(glob) = self.resolve(arg) {
                            if glob.starts_with('/') {
                                globs.push(glob);
                            } else {
                                self.invalid("path", glob, &["a glob starting with '/'"], arg.span);
                            }
                        }
                    }
                    if globs.is_empty() {
                        self.invalid("path", "<missing>", &["a glob starting with '/'"], line.span);
                    } else {
                        predicates.push(Predicate::Path(globs));
                    }
                }
                "host" => {
                    let hosts: Vec<String> = line
                        .args
                        .iter()
                        .filter_map(|a| self.resolve(a))
                        .map(|h| h.to_ascii_lowercase())
                        .collect();
                    if hosts.is_empty() {
                        self.invalid("host", "<missing>", &["a host name"], line.span);
                    } else {
                        predicates.push(Predicate::Host(hosts));
                    }
                }
                "method" => {
                    let methods: Vec<String> = line
                        .args
                        .iter()
                        .filter_map(|a| self.resolve(a))
                        .map(|m| m.to_ascii_uppercase())
                        .collect();
                    if methods.is_empty() {
                        self.invalid("method", "<missing>", &["an HTTP method"], line.span);
                    } else {
                        predicates.push(Predicate::Method(methods));
                    }
                }
                "header" => {
                    let Some(name) = line.args.first().cloned().and_then(|a| self.resolve(&a))
                    else {
                        self.invalid("header", "<missing>", &["a header name"], line.span);
                        continue;
                    };
                    let cond = match line.args.get(1).cloned().and_then(|a| self.resolve(&a)) {
                        None => HeaderCond::Exists,
                        Some(v) if v.starts_with('~') => match HeaderPattern::new(&v[1..]) {
                            Ok(p) => HeaderCond::Matches(p),
                            Err(_) => {
                                self.invalid("header", v, &["a valid regular expression"], line.span);
                                continue;
                            }
                        },
                        Some(v) if v.len() > 1 && v.ends_with('*') => {
                            HeaderCond::Prefix(v[..v.len() - 1].to_string())
                        }
                        Some(v) if v.len() > 1 && v.starts_with('*') => {
                            HeaderCond::Suffix(v[1..].to_string())
                        }
                        Some(v) => HeaderCond::Equals(v),
                    };
                    predicates.push(Predicate::Header { name, cond });
                }
                other => self.errors.push(CompileError::UnknownDirective {
                    name: other.to_string(),
                    span: line.span,
                }),
            }
        }

        predicates
    }

    fn resolve_matcher(
        &mut self,
        mref: &MatcherRef,
        matchers: &HashMap<String, Vec<Predicate>>,
    ) -> CompiledMatcher {
        match mref {
            MatcherRef::Named { name, span } => match matchers.get(name) {
                Some(predicates) => CompiledMatcher::Predicates(predicates.clone()),
                None => {
                    self.errors.push(CompileError::UndefinedMatcher {
                        name: name.clone(),
                        span: *span,
                    });
                    CompiledMatcher::Always
                }
            },
            MatcherRef::Path { glob, span: _ } => {
                CompiledMatcher::Predicates(vec![Predicate::Path(vec![glob.clone()])])
            }
            MatcherRef::Fallback { .. } => CompiledMatcher::Fallback,
        }
    }

    // ------------------------------------------------------------------
    // Handler chains
    // ------------------------------------------------------------------

    fn compile_chain(&mut self, items: &[DirectiveItem]) -> Vec<Handler> {
        let mut handlers = Vec::new();
        for item in items {
            match item {
                DirectiveItem::Plain(d) => {
                    if let Some(h) = self.compile_handler(d) {
                        handlers.push(h);
                    }
                }
                DirectiveItem::Invoke(inv) => {
                    debug_assert!(false, "unexpanded macro invocation reached the analyzer");
                    self.errors.push(CompileError::UndefinedMacro {
                        name: inv.name.clone(),
                        span: inv.span,
                    });
                }
            }
        }
        handlers
    }

    fn compile_handler(&mut self, d: &DirectiveNode) -> Option<Handler> {
        match d.name.to_ascii_lowercase().as_str() {
            "reverse_proxy" => self.compile_reverse_proxy(d),
            "respond" => self.compile_respond(d),
            "file_server" => self.compile_file_server(d),
            "redirect" => self.compile_redirect(d),
            "header" => Some(Handler::Headers(self.compile_header_ops(d))),
            "encode" => Some(Handler::Encode(self.compile_encodings(d))),
            "route" | "handle" | "listen" | "log" | "macro" | "server" | "use" => {
                self.errors.push(CompileError::MisplacedDirective {
                    name: d.name.clone(),
                    span: d.span,
                });
                None
            }
            other => {
                self.errors.push(CompileError::UnknownDirective {
                    name: other.to_string(),
                    span: d.span,
                });
                None
            }
        }
    }

    fn compile_reverse_proxy(&mut self, d: &DirectiveNode) -> Option<Handler> {
        let mut targets = Vec::new();
        let mut policy = LbPolicy::RoundRobin;
        let mut failover = false;

        for arg in &d.args {
            if let Some(text) = self.resolve(arg) {
                if let Some(address) = self.normalize_upstream(&text, arg.span) {
                    targets.push(UpstreamTarget { address, weight: 1 });
                }
            }
        }

        if let Some(block) = &d.block {
            for sub in block {
                match sub.name.to_ascii_lowercase().as_str() {
                    "upstream" => {
                        let Some(addr) = sub.args.first().cloned().and_then(|a| self.resolve(&a))
                        else {
                            self.invalid("upstream", "<missing>", &["an upstream address"], sub.span);
                            continue;
                        };
                        let weight = match sub.args.get(1).cloned().and_then(|a| self.resolve(&a)) {
                            None => 1,
                            Some(w) => match w.parse::<u32>() {
                                Ok(n) if n >= 1 => n,
                                _ => {
                                    self.invalid("upstream", w, &["a weight >= 1"], sub.span);
                                    continue;
                                }
                            },
                        };
                        if let Some(address) = self.normalize_upstream(&addr, sub.span) {
                            targets.push(UpstreamTarget { address, weight });
                        }
                    }
                    "lb_policy" => {
                        match sub.args.first().cloned().and_then(|a| self.resolve(&a)) {
                            Some(value) => match LbPolicy::parse(&value) {
                                Some(p) => policy = p,
                                None => self.invalid("lb_policy", value, &LbPolicy::NAMES, sub.span),
                            },
                            None => {
                                self.invalid("lb_policy", "<missing>", &LbPolicy::NAMES, sub.span)
                            }
                        }
                    }
                    "failover" => {
                        failover = match sub.args.first().cloned().and_then(|a| self.resolve(&a)) {
                            None => true,
                            Some(v) if v == "true" => true,
                            Some(v) if v == "false" => false,
                            Some(v) => {
                                self.invalid("failover", v, &["true", "false"], sub.span);
                                true
                            }
                        };
                    }
                    other => self.invalid(
                        "reverse_proxy",
                        other,
                        &["upstream", "lb_policy", "failover"],
                        sub.span,
                    ),
                }
            }
        }

        if targets.is_empty() {
            self.invalid(
                "reverse_proxy",
                "upstreams",
                &["at least one upstream target"],
                d.span,
            );
            return None;
        }

        Some(Handler::ReverseProxy(ProxyHandler {
            targets,
            policy,
            failover,
        }))
    }

    /// Accepts `scheme://host[:port][/path]` or bare `host:port`, returning
    /// a scheme-qualified address.
    fn normalize_upstream(&mut self, text: &str, span: Span) -> Option<String> {
        if text.contains("://") {
            match Url::parse(text) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
                    Some(text.trim_end_matches('/').to_string())
                }
                _ => {
                    self.invalid(
                        "reverse_proxy",
                        text,
                        &["http://host[:port]", "https://host[:port]", "host:port"],
                        span,
                    );
                    None
                }
            }
        } else {
            match text.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p >= 1) => {
                    Some(format!("http://{host}:{port}"))
                }
                _ => {
                    self.invalid(
                        "reverse_proxy",
                        text,
                        &["http://host[:port]", "https://host[:port]", "host:port"],
                        span,
                    );
                    None
                }
            }
        }
    }

    fn compile_respond(&mut self, d: &DirectiveNode) -> Option<Handler> {
        let args: Vec<String> = d.args.iter().filter_map(|a| self.resolve(a)).collect();

        let (body, status) = match args.as_slice() {
            [] => {
                self.invalid("respond", "<missing>", &["[body] status"], d.span);
                return None;
            }
            [single] => match single.parse::<u16>() {
                Ok(code) => (None, code),
                Err(_) => (Some(single.clone()), 200),
            },
            [body, status, ..] => match status.parse::<u16>() {
                Ok(code) => (Some(body.clone()), code),
                Err(_) => {
                    self.invalid("respond", status, &["a status code in 100-599"], d.span);
                    return None;
                }
            },
        };

        if !(100..=599).contains(&status) {
            self.invalid(
                "respond",
                status.to_string(),
                &["a status code in 100-599"],
                d.span,
            );
            return None;
        }

        Some(Handler::Respond { status, body })
    }

    fn compile_file_server(&mut self, d: &DirectiveNode) -> Option<Handler> {
        let mut settings = FileServerSettings {
            root: ".".to_string(),
            index: vec!["index.html".to_string()],
            browse: false,
        };

        if let Some(root) = d.args.first().cloned().and_then(|a| self.resolve(&a)) {
            settings.root = root;
        }

        if let Some(block) = &d.block {
            for sub in block {
                match sub.name.to_ascii_lowercase().as_str() {
                    "root" => {
                        if let Some(root) = sub.args.first().cloned().and_then(|a| self.resolve(&a))
                        {
                            settings.root = root;
                        }
                    }
                    "index" => {
                        let index: Vec<String> =
                            sub.args.iter().filter_map(|a| self.resolve(a)).collect();
                        if !index.is_empty() {
                            settings.index = index;
                        }
                    }
                    "browse" => settings.browse = true,
                    other => {
                        self.invalid("file_server", other, &["root", "index", "browse"], sub.span)
                    }
                }
            }
        }

        Some(Handler::FileServer(settings))
    }

    fn compile_redirect(&mut self, d: &DirectiveNode) -> Option<Handler> {
        let Some(to) = d.args.first().cloned().and_then(|a| self.resolve(&a)) else {
            self.invalid("redirect", "<missing>", &["a target location"], d.span);
            return None;
        };

        let code = match d.args.get(1).cloned().and_then(|a| self.resolve(&a)) {
            None => 302,
            Some(text) => match text.parse::<u16>() {
                Ok(c) if REDIRECT_CODES.contains(&c) => c,
                _ => {
                    self.invalid("redirect", text, &["301", "302", "307", "308"], d.span);
                    return None;
                }
            },
        };

        Some(Handler::Redirect { to, code })
    }

    fn compile_header_ops(&mut self, d: &DirectiveNode) -> HeaderOps {
        let mut ops = HeaderOps::default();

        // Inline shorthand: `header Name Value` is a single set.
        if !d.args.is_empty() {
            let args: Vec<String> = d.args.iter().filter_map(|a| self.resolve(a)).collect();
            if args.len() >= 2 {
                ops.set.push((args[0].clone(), args[1..].join(" ")));
            } else {
                self.invalid("header", args.join(" "), &["name value"], d.span);
            }
        }

        if let Some(block) = &d.block {
            for sub in block {
                let args: Vec<String> = sub.args.iter().filter_map(|a| self.resolve(a)).collect();
                match sub.name.to_ascii_lowercase().as_str() {
                    "set" if args.len() >= 2 => {
                        ops.set.push((args[0].clone(), args[1..].join(" ")));
                    }
                    "add" if args.len() >= 2 => {
                        ops.add.push((args[0].clone(), args[1..].join(" ")));
                    }
                    "remove" if !args.is_empty() => ops.remove.extend(args),
                    "set" | "add" => {
                        self.invalid("header", sub.name.as_str(), &["name value"], sub.span)
                    }
                    "remove" => self.invalid("header", "remove", &["name..."], sub.span),
                    other => self.invalid("header", other, &["set", "add", "remove"], sub.span),
                }
            }
        }

        ops
    }

    fn compile_encodings(&mut self, d: &DirectiveNode) -> Vec<Encoding> {
        let mut encodings = Vec::new();

        if d.args.is_empty() {
            self.invalid("encode", "<missing>", &Encoding::NAMES, d.span);
        }
        for arg in &d.args {
            if let Some(text) = self.resolve(arg) {
                match Encoding::parse(&text) {
                    Some(e) => encodings.push(e),
                    None => self.invalid("encode", text, &Encoding::NAMES, arg.span),
                }
            }
        }

        encodings
    }

    fn compile_log(&mut self, d: &DirectiveNode) -> LogSettings {
        let mut settings = LogSettings {
            output: LogOutput::Stdout,
            format: LogFormat::Text,
        };

        if let Some(block) = &d.block {
            for sub in block {
                let args: Vec<String> = sub.args.iter().filter_map(|a| self.resolve(a)).collect();
                match sub.name.to_ascii_lowercase().as_str() {
                    "output" => match args.first().map(|s| s.to_ascii_lowercase()).as_deref() {
                        Some("stdout") => settings.output = LogOutput::Stdout,
                        Some("stderr") => settings.output = LogOutput::Stderr,
                        Some("file") => match args.get(1) {
                            Some(path) => settings.output = LogOutput::File(path.clone()),
                            None => self.invalid("log", "file", &["file <path>"], sub.span),
                        },
                        other => self.invalid(
                            "log",
                            other.unwrap_or("<missing>"),
                            &["stdout", "stderr", "file <path>"],
                            sub.span,
                        ),
                    },
                    "format" => match args.first().map(|s| s.to_ascii_lowercase()).as_deref() {
                        Some("text") => settings.format = LogFormat::Text,
                        Some("json") => settings.format = LogFormat::Json,
                        other => self.invalid(
                            "log",
                            other.unwrap_or("<missing>"),
                            &["text", "json"],
                            sub.span,
                        ),
                    },
                    other => self.invalid("log", other, &["output", "format"], sub.span),
                }
            }
        }

        settings
    }
}

/// A host that looks like a registrable domain name rather than an IP,
/// wildcard, or local alias. Domain-like hosts default to the TLS scheme
/// hint and opt into automatic certificate management.
fn domain_like(host: &str) -> bool {
    host != "_"
        && host != "localhost"
        && host.parse::<IpAddr>().is_err()
        && host.contains('.')
        && host.chars().any(|c| c.is_ascii_alphabetic())
}
