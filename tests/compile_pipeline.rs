// Integration tests for the full compile pipeline: lexing through
// semantic analysis, driven only through the public `compile` entry point.
#[cfg(test)]
mod tests {
    use pingclair::{
        CompileError, EnvTable, compile,
        config::runtime::{Handler, LbPolicy, SchemeHint},
    };

    #[test]
    fn listen_address_text_forms_normalize() {
        let source = ":80 {\n}\n0.0.0.0:81 {\n}\nexample.com:443 {\n}";
        let config = compile(source, &EnvTable::empty()).unwrap();

        let listen = &config.servers[0].listens[0];
        assert_eq!((listen.host.as_str(), listen.port), ("_", 80));

        let listen = &config.servers[1].listens[0];
        assert_eq!((listen.host.as_str(), listen.port), ("0.0.0.0", 81));

        let listen = &config.servers[2].listens[0];
        assert_eq!((listen.host.as_str(), listen.port), ("example.com", 443));
        assert_eq!(listen.scheme, SchemeHint::Https);
    }

    #[test]
    fn route_table_round_trips_in_declaration_order() {
        let source = r#":80 {
  route {
    /api/* => { reverse_proxy http://a:1 }
    /assets/* => { file_server /var/www }
    _ => { respond 404 }
  }
}"#;
        let config = compile(source, &EnvTable::empty()).unwrap();
        let snapshot = config.snapshot_json();
        let routes = snapshot["servers"][0]["routes"].as_array().unwrap();

        assert_eq!(routes.len(), 3);
        assert_eq!(
            routes[0]["matcher"]["predicates"][0]["path"][0],
            serde_json::json!("/api/*")
        );
        assert_eq!(
            routes[1]["matcher"]["predicates"][0]["path"][0],
            serde_json::json!("/assets/*")
        );
        assert_eq!(routes[2]["matcher"], serde_json::json!("fallback"));
    }

    #[test]
    fn identical_compiles_are_structurally_equal() {
        let source = r#"
macro security!() {
    header {
        set X-Frame-Options DENY
    }
}

example.com:8443 {
    use security!()
    route {
        /api/* => { reverse_proxy http://a:1 http://b:2 { lb_policy weighted } }
        _ => { respond "gone" 404 }
    }
}
"#;
        let env: EnvTable = [("UNUSED", "x")].into_iter().collect();
        let first = compile(source, &env).unwrap();
        let second = compile(source, &env).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn macro_cycle_reports_the_chain() {
        let source = r#"
macro a!() {
    use b!()
}
macro b!() {
    use a!()
}
:80 {
    use a!()
}
"#;
        let errors = compile(source, &EnvTable::empty()).unwrap_err();
        match &errors.0[0] {
            CompileError::MacroCycle { chain, .. } => {
                assert_eq!(chain, &["a", "b", "a"]);
            }
            other => panic!("expected MacroCycle, got {other:?}"),
        }
    }

    #[test]
    fn macro_with_too_few_arguments_rejected() {
        let source = r#"
macro api!(upstream, policy) {
    reverse_proxy upstream { lb_policy policy }
}
:80 {
    use api!(http://a:1)
}
"#;
        let errors = compile(source, &EnvTable::empty()).unwrap_err();
        assert!(matches!(
            errors.0[0],
            CompileError::MacroArity {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[test]
    fn lb_policy_argument_is_case_insensitive() {
        let upper = compile(
            ":80 {\n  reverse_proxy http://a:1 http://b:2 { lb_policy LEAST_CONN }\n}",
            &EnvTable::empty(),
        )
        .unwrap();
        let lower = compile(
            ":80 {\n  reverse_proxy http://a:1 http://b:2 { lb_policy least_conn }\n}",
            &EnvTable::empty(),
        )
        .unwrap();

        let policy = |c: &pingclair::RuntimeConfig| match &c.servers[0].routes[0].handlers[0] {
            Handler::ReverseProxy(p) => p.policy,
            other => panic!("expected proxy handler, got {other:?}"),
        };
        assert_eq!(policy(&upper), LbPolicy::LeastConn);
        assert_eq!(policy(&upper), policy(&lower));
    }

    #[test]
    fn unset_env_variable_fails_and_set_one_substitutes() {
        let source = ":80 {\n  respond \"{$GREETING}\" 200\n}";

        let errors = compile(source, &EnvTable::empty()).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            CompileError::UnsetEnvironmentVariable { name, .. } if name == "GREETING"
        )));

        let env: EnvTable = [("GREETING", "hello from pingclair")].into_iter().collect();
        let config = compile(source, &env).unwrap();
        match &config.servers[0].routes[0].handlers[0] {
            Handler::Respond { body, status } => {
                assert_eq!(body.as_deref(), Some("hello from pingclair"));
                assert_eq!(*status, 200);
            }
            other => panic!("expected respond handler, got {other:?}"),
        }
    }

    #[test]
    fn env_default_syntax_applies_without_the_variable() {
        let config = compile(
            ":80 {\n  file_server {$DOC_ROOT:/srv/www}\n}",
            &EnvTable::empty(),
        )
        .unwrap();
        match &config.servers[0].routes[0].handlers[0] {
            Handler::FileServer(fs) => assert_eq!(fs.root, "/srv/www"),
            other => panic!("expected file server, got {other:?}"),
        }
    }

    #[test]
    fn semantic_errors_arrive_aggregated() {
        let source = r#"
:0 {
  frobnicate
  handle @missing { respond 204 }
  reverse_proxy { lb_policy sticky }
}
"#;
        let errors = compile(source, &EnvTable::empty()).unwrap_err();
        // Bad port, unknown directive, undefined matcher, bad policy,
        // empty upstreams, and no listen address at all.
        assert!(errors.len() >= 5, "got only {} errors:\n{errors}", errors.len());
    }

    #[test]
    fn entries_after_fallback_are_unreachable() {
        let source = r#"
:80 {
  route {
    _ => { respond 404 }
    /api/* => { respond 200 }
  }
}
"#;
        let errors = compile(source, &EnvTable::empty()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompileError::UnreachableRoute { .. })));
    }

    #[test]
    fn duplicate_listen_addresses_are_ambiguous() {
        let source = ":80 {\n}\nserver \"second\" {\n  listen :80\n}";
        let errors = compile(source, &EnvTable::empty()).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            CompileError::DuplicateListenAddress { port: 80, .. }
        )));
    }

    #[test]
    fn encode_algorithms_normalize_to_lowercase_canon() {
        let config = compile(":80 {\n  encode BR\n}", &EnvTable::empty()).unwrap();
        let snapshot = config.snapshot_json();
        assert_eq!(
            snapshot["servers"][0]["encodings"][0],
            serde_json::json!("br")
        );
    }

    #[test]
    fn both_listen_forms_are_equivalent() {
        let from_addresses = compile("example.com:8443 {\n}", &EnvTable::empty()).unwrap();
        let from_directive =
            compile("server \"example.com:8443\" {\n  listen example.com:8443\n}", &EnvTable::empty())
                .unwrap();
        assert_eq!(
            from_addresses.servers[0].listens,
            from_directive.servers[0].listens
        );
    }
}
