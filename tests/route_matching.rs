// Integration tests for request-time behavior: server selection, the
// declaration-order route walk, and load-balancer target selection.
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::{HeaderMap, Method};
    use pingclair::{
        EnvTable, LbState, MatchEngine, MatchOutcome, RequestFacts, compile,
        config::runtime::Handler,
    };

    fn engine(source: &str) -> MatchEngine {
        MatchEngine::new(Arc::new(compile(source, &EnvTable::empty()).unwrap()))
    }

    fn get<'r>(host: &'r str, path: &'r str, headers: &'r HeaderMap) -> RequestFacts<'r> {
        RequestFacts {
            host,
            path,
            method: &Method::GET,
            headers,
        }
    }

    #[test]
    fn api_assets_fallback_table_matches_per_declaration() {
        let engine = engine(
            r#":80 {
  route {
    /api/* => { reverse_proxy http://api:3000 }
    /assets/* => { file_server /var/www }
    _ => { respond 404 }
  }
}"#,
        );
        let headers = HeaderMap::new();

        let matched_index = |path: &str| {
            match engine.resolve(80, &get("example.com", path, &headers)) {
                MatchOutcome::Matched { route_index, .. } => route_index,
                other => panic!("expected match for {path}, got {other:?}"),
            }
        };

        assert_eq!(matched_index("/api/v1/x"), 0);
        assert_eq!(matched_index("/assets/a.css"), 1);
        assert_eq!(matched_index("/other"), 2);
    }

    #[test]
    fn handle_entries_follow_strict_declaration_order() {
        // A broad glob declared first shadows a more specific one declared
        // later; declaration order is authoritative, not specificity.
        let engine = engine(
            ":80 {\n  handle /api/* { respond 201 }\n  handle /api/v2/* { respond 202 }\n  handle { respond 404 }\n}",
        );
        let headers = HeaderMap::new();

        match engine.resolve(80, &get("x", "/api/v2/items", &headers)) {
            MatchOutcome::Matched { route_index, .. } => assert_eq!(route_index, 0),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn host_and_port_select_the_server_block() {
        let engine = engine(
            "api.example.com:8080 {\n  respond 200\n}\nweb.example.com:8080 {\n  respond 201\n}\nserver \"default\" {\n  listen :8080\n  respond 404\n}",
        );
        let headers = HeaderMap::new();

        let server_for = |host: &str| {
            engine
                .select_server(8080, host)
                .map(|s| s.name.clone())
                .expect("a server should match")
        };

        assert_eq!(server_for("api.example.com"), "api.example.com:8080");
        assert_eq!(server_for("web.example.com"), "web.example.com:8080");
        assert_eq!(server_for("unknown.example.com"), "default");
        assert!(engine.select_server(9090, "api.example.com").is_none());
    }

    #[test]
    fn no_route_is_a_structural_outcome() {
        let engine = engine(":80 {\n  route {\n    /api/* => { respond 200 }\n  }\n}");
        let headers = HeaderMap::new();
        assert!(matches!(
            engine.resolve(80, &get("x", "/elsewhere", &headers)),
            MatchOutcome::NoRoute { .. }
        ));
    }

    #[test]
    fn least_conn_always_selects_the_least_loaded() {
        let engine = engine(
            ":80 {\n  reverse_proxy http://a:1 http://b:1 http://c:1 {\n    lb_policy least_conn\n  }\n}",
        );
        let headers = HeaderMap::new();

        let MatchOutcome::Matched {
            server,
            route_index,
            route,
        } = engine.resolve(80, &get("x", "/", &headers))
        else {
            panic!("expected a match");
        };
        let Handler::ReverseProxy(proxy) = &route.handlers[0] else {
            panic!("expected proxy handler");
        };

        // In-flight counts are maintained by the proxy layer.
        let state = LbState::new();
        for _ in 0..3 {
            state.connection_opened(&server.name, "http://a:1");
        }
        state.connection_opened(&server.name, "http://b:1");
        for _ in 0..5 {
            state.connection_opened(&server.name, "http://c:1");
        }

        for _ in 0..25 {
            let target = engine
                .select_upstream(server, route_index, proxy, &state)
                .unwrap();
            assert_eq!(target.address, "http://b:1");
        }
    }

    #[test]
    fn round_robin_cycles_targets_per_route() {
        let engine = engine(
            ":80 {\n  reverse_proxy http://a:1 http://b:1 {\n    lb_policy round_robin\n  }\n}",
        );
        let headers = HeaderMap::new();

        let MatchOutcome::Matched {
            server,
            route_index,
            route,
        } = engine.resolve(80, &get("x", "/", &headers))
        else {
            panic!("expected a match");
        };
        let Handler::ReverseProxy(proxy) = &route.handlers[0] else {
            panic!("expected proxy handler");
        };

        let state = LbState::new();
        let picks: Vec<String> = (0..4)
            .map(|_| {
                engine
                    .select_upstream(server, route_index, proxy, &state)
                    .unwrap()
                    .address
                    .clone()
            })
            .collect();
        assert_eq!(
            picks,
            vec!["http://a:1", "http://b:1", "http://a:1", "http://b:1"]
        );
    }

    #[test]
    fn matching_is_safe_for_concurrent_readers() {
        let engine = engine(
            ":80 {\n  route {\n    /api/* => { respond 200 }\n    _ => { respond 404 }\n  }\n}",
        );

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let engine = engine.clone();
                scope.spawn(move || {
                    let headers = HeaderMap::new();
                    for i in 0..500 {
                        let path = if i % 2 == 0 { "/api/x" } else { "/nope" };
                        let expected = if i % 2 == 0 { 0 } else { 1 };
                        match engine.resolve(80, &get("x", path, &headers)) {
                            MatchOutcome::Matched { route_index, .. } => {
                                assert_eq!(route_index, expected)
                            }
                            other => panic!("expected match, got {other:?}"),
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn failover_flag_reaches_the_compiled_chain() {
        let engine = engine(
            ":80 {\n  reverse_proxy http://a:1 http://b:1 {\n    lb_policy random\n    failover\n  }\n}",
        );
        let headers = HeaderMap::new();

        let MatchOutcome::Matched { route, .. } = engine.resolve(80, &get("x", "/", &headers))
        else {
            panic!("expected a match");
        };
        let Handler::ReverseProxy(proxy) = &route.handlers[0] else {
            panic!("expected proxy handler");
        };
        assert!(proxy.failover);
    }
}
