//! Integration specifications for referrer resolution across the entity
//! directory, driven through the engine facade and the HTTP router.

mod common {
    use std::sync::Arc;

    use lead_desk::directory::{
        EntityDirectory, EntityId, EntityKind, EntityRecord, MemoryCollection, ReferrerRef,
    };
    use lead_desk::dispatch::MemoryExecutivePool;
    use lead_desk::referral::HouseAccount;
    use lead_desk::stats::MemorySnapshotStore;
    use lead_desk::LeadEngine;

    pub(super) type Engine = LeadEngine<MemoryExecutivePool, MemorySnapshotStore>;

    pub(super) fn record(
        kind: EntityKind,
        id: &str,
        name: &str,
        phone: &str,
        code: Option<&str>,
        referred_by: Option<ReferrerRef>,
    ) -> EntityRecord {
        EntityRecord {
            id: EntityId(id.to_string()),
            kind,
            display_name: name.to_string(),
            phone: phone.to_string(),
            referral_code: code.map(str::to_string),
            referred_by,
        }
    }

    pub(super) fn build_engine(records: Vec<EntityRecord>) -> Arc<Engine> {
        let mut directory = EntityDirectory::new();
        for kind in [
            EntityKind::Agent,
            EntityKind::Customer,
            EntityKind::CoreMember,
            EntityKind::Investor,
            EntityKind::SkilledLabour,
            EntityKind::Nri,
            EntityKind::Property,
            EntityKind::ApprovedProperty,
        ] {
            let collection = MemoryCollection::with_records(
                records
                    .iter()
                    .filter(|record| record.kind == kind)
                    .cloned()
                    .collect(),
            );
            directory = directory.register(kind, Arc::new(collection));
        }

        Arc::new(LeadEngine::new(
            Arc::new(directory),
            Arc::new(MemoryExecutivePool::new()),
            Arc::new(MemorySnapshotStore::new()),
            HouseAccount {
                referral_code: "WA0000000001".to_string(),
                phone: "9666666666".to_string(),
            },
            None,
        ))
    }
}

mod resolution {
    use super::common::*;
    use lead_desk::directory::{EntityKind, ReferrerRef};
    use lead_desk::referral::HOUSE_NAME;

    #[test]
    fn customer_resolves_to_the_agent_behind_the_code() {
        let engine = build_engine(vec![
            record(
                EntityKind::Agent,
                "a-1",
                "Asha Rao",
                "9000000001",
                Some("WA123"),
                None,
            ),
            record(
                EntityKind::Customer,
                "c-1",
                "Vikram Shah",
                "9000000002",
                None,
                Some(ReferrerRef::Code("WA123".to_string())),
            ),
        ]);

        let resolved = engine.resolve_referrer("9000000002");
        assert_eq!(resolved.posted_by_name.as_deref(), Some("Vikram Shah"));
        assert_eq!(resolved.referrer_name, "Asha Rao");
        assert_eq!(resolved.source_kind, Some(EntityKind::Agent));
    }

    #[test]
    fn house_root_code_yields_the_sentinel() {
        let engine = build_engine(vec![record(
            EntityKind::Customer,
            "c-1",
            "Vikram Shah",
            "9000000002",
            None,
            Some(ReferrerRef::Code("WA0000000001".to_string())),
        )]);

        let resolved = engine.resolve_referrer("9000000002");
        assert_eq!(resolved.referrer_name, HOUSE_NAME);
        assert_eq!(resolved.referrer_phone, "9666666666");
        assert_eq!(resolved.source_kind, None);
    }

    #[test]
    fn corrupted_cycle_still_terminates() {
        let engine = build_engine(vec![
            record(
                EntityKind::Agent,
                "a-1",
                "Asha Rao",
                "9000000001",
                Some("WA111"),
                Some(ReferrerRef::Code("WA222".to_string())),
            ),
            record(
                EntityKind::Agent,
                "a-2",
                "Nikhil Jain",
                "9000000002",
                Some("WA222"),
                Some(ReferrerRef::Code("WA111".to_string())),
            ),
        ]);

        // Both directions return after two hops; neither loops.
        assert_eq!(engine.resolve_referrer("9000000001").referrer_name, "Nikhil Jain");
        assert_eq!(engine.resolve_referrer("9000000002").referrer_name, "Asha Rao");
    }

    #[test]
    fn secondary_collections_are_probed_after_primary() {
        let engine = build_engine(vec![
            record(
                EntityKind::SkilledLabour,
                "s-1",
                "Mohan Das",
                "9000000005",
                None,
                Some(ReferrerRef::Phone("9000000001".to_string())),
            ),
            record(
                EntityKind::Agent,
                "a-1",
                "Asha Rao",
                "9000000001",
                Some("WA123"),
                None,
            ),
        ]);

        let resolved = engine.resolve_referrer("9000000005");
        assert_eq!(resolved.posted_by_name.as_deref(), Some("Mohan Das"));
        assert_eq!(resolved.referrer_name, "Asha Rao");
    }
}

mod routing {
    use super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use lead_desk::directory::{EntityKind, ReferrerRef};
    use lead_desk::engine_router;
    use lead_desk::referral::HOUSE_NAME;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn resolve_endpoint_returns_referrer_payload() {
        let engine = build_engine(vec![
            record(
                EntityKind::Agent,
                "a-1",
                "Asha Rao",
                "9000000001",
                Some("WA123"),
                None,
            ),
            record(
                EntityKind::Customer,
                "c-1",
                "Vikram Shah",
                "9000000002",
                None,
                Some(ReferrerRef::Code("WA123".to_string())),
            ),
        ]);
        let router = engine_router(engine);

        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/referrers/resolve?phone=9000000002")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("referrer_name"), Some(&json!("Asha Rao")));
        assert_eq!(payload.get("referrer_phone"), Some(&json!("9000000001")));
    }

    #[tokio::test]
    async fn unknown_phone_still_returns_the_sentinel() {
        let engine = build_engine(Vec::new());
        let router = engine_router(engine);

        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/referrers/resolve?phone=9999999999")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("referrer_name"), Some(&json!(HOUSE_NAME)));
    }
}
