// Integration tests for the reload coordinator: validate-before-swap and
// snapshot stability for concurrent readers across a swap.
#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method};
    use pingclair::{EnvTable, MatchEngine, MatchOutcome, ReloadCoordinator, RequestFacts};

    const ACTIVE: &str = r#":80 {
  route {
    /api/* => { respond 200 }
    _ => { respond 404 }
  }
}"#;

    const BROKEN: &str = r#":80 {
  route {
    @undefined => { respond 200 }
  }
  frobnicate
}"#;

    const REPLACEMENT: &str = r#":80 {
  route {
    /v2/* => { respond 200 }
    _ => { respond 410 }
  }
}"#;

    fn matched_index(engine: &MatchEngine, path: &str) -> usize {
        let headers = HeaderMap::new();
        let method = Method::GET;
        let request = RequestFacts {
            host: "example.com",
            path,
            method: &method,
            headers: &headers,
        };
        match engine.resolve(80, &request) {
            MatchOutcome::Matched { route_index, .. } => route_index,
            other => panic!("expected match for {path}, got {other:?}"),
        }
    }

    #[test]
    fn rejected_reload_leaves_matching_behavior_untouched() {
        let coordinator = ReloadCoordinator::from_source(ACTIVE, &EnvTable::empty()).unwrap();

        let before = coordinator.snapshot();
        assert_eq!(matched_index(&coordinator.engine(), "/api/users"), 0);
        assert_eq!(matched_index(&coordinator.engine(), "/other"), 1);

        let errors = coordinator.reload(BROKEN, &EnvTable::empty()).unwrap_err();
        assert!(errors.len() >= 2);

        // Identical snapshot, identical matching.
        assert_eq!(*before, *coordinator.snapshot());
        assert_eq!(matched_index(&coordinator.engine(), "/api/users"), 0);
        assert_eq!(matched_index(&coordinator.engine(), "/other"), 1);
    }

    #[test]
    fn successful_reload_is_observed_wholesale() {
        let coordinator = ReloadCoordinator::from_source(ACTIVE, &EnvTable::empty()).unwrap();
        coordinator.reload(REPLACEMENT, &EnvTable::empty()).unwrap();

        let engine = coordinator.engine();
        assert_eq!(matched_index(&engine, "/v2/items"), 0);
        assert_eq!(matched_index(&engine, "/api/users"), 1); // falls through to `_`
    }

    #[test]
    fn validate_only_never_installs() {
        let coordinator = ReloadCoordinator::from_source(ACTIVE, &EnvTable::empty()).unwrap();

        ReloadCoordinator::validate(REPLACEMENT, &EnvTable::empty()).unwrap();
        assert!(ReloadCoordinator::validate(BROKEN, &EnvTable::empty()).is_err());

        assert_eq!(matched_index(&coordinator.engine(), "/api/users"), 0);
    }

    #[test]
    fn readers_keep_their_snapshot_through_swaps() {
        let coordinator = ReloadCoordinator::from_source(ACTIVE, &EnvTable::empty()).unwrap();

        std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let engine = coordinator.engine();
                    scope.spawn(move || {
                        // Each reader captured a snapshot before any swap;
                        // its view must stay coherent to completion.
                        for _ in 0..1000 {
                            assert_eq!(matched_index(&engine, "/api/users"), 0);
                            assert_eq!(matched_index(&engine, "/other"), 1);
                        }
                    })
                })
                .collect();

            scope.spawn(|| {
                for _ in 0..20 {
                    coordinator.reload(REPLACEMENT, &EnvTable::empty()).unwrap();
                    coordinator.reload(ACTIVE, &EnvTable::empty()).unwrap();
                }
            });

            for reader in readers {
                reader.join().unwrap();
            }
        });

        // New engines after the churn see the final configuration.
        assert_eq!(matched_index(&coordinator.engine(), "/api/users"), 0);
    }
}
