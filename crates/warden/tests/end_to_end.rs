//! End-to-end tests for the assembled engine.
//!
//! Everything runs against the in-memory stores and a manual clock, so
//! expiry can be driven deterministically.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as Days, TimeZone, Utc};
use warden::warden_abac::{MemoryRelationships, OwnerRule, RequireAuthenticationRule};
use warden::warden_audit::{AuditQuery, MemoryAuditSink};
use warden::warden_facets::MemoryFacetRepository;
use warden::warden_hierarchy::{HierarchyError, MemoryDirectory};
use warden::{
    AssignRequest, Authentication, Clock, EntityRef, FacetDefinition, FacetKey, ManualClock, ReasonCode,
    ResourceAttributes, ResourcePolicy, Visibility, Warden, WardenConfig,
};

struct Harness {
    warden: Warden,
    clock: Arc<ManualClock>,
    repository: Arc<MemoryFacetRepository>,
    audit_log: Arc<MemoryAuditSink>,
    relationships: Arc<MemoryRelationships>,
}

fn key(s: &str) -> FacetKey {
    s.parse().expect("valid facet key")
}

/// ceo -> manager -> {report, peer}; stranger and dana stand alone.
fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ));
    let repository = Arc::new(MemoryFacetRepository::new());
    let audit_log = Arc::new(MemoryAuditSink::new());
    let relationships = Arc::new(MemoryRelationships::new());
    let directory = MemoryDirectory::new()
        .with_entity("ceo", None)
        .with_entity("manager", Some("ceo"))
        .with_entity("report", Some("manager"))
        .with_entity("peer", Some("manager"))
        .with_entity("stranger", None)
        .with_entity("dana", None);

    let warden = Warden::builder(WardenConfig::default())
        .facet_repository(repository.clone())
        .reporting_store(Arc::new(directory))
        .relationships(relationships.clone())
        .clock(clock.clone())
        .audit_sink(audit_log.clone())
        .build()
        .expect("warden should build");

    for facet in ["role:admin", "role:divisional-admin", "org-division:sales"] {
        warden
            .facets()
            .define_facet(FacetDefinition::new(key(facet)))
            .expect("facet should be defined");
    }

    Harness {
        warden,
        clock,
        repository,
        audit_log,
        relationships,
    }
}

fn private_doc_of(owner: &str) -> ResourceAttributes {
    ResourceAttributes::new(&format!("doc-of-{owner}")).owned_by(owner)
}

// ============================================================================
// Line management
// ============================================================================

#[test]
fn manager_reads_report_private_resource() {
    let h = harness();
    let doc = private_doc_of("report");

    let decision = h.warden.can_read(&Authentication::user("manager"), &doc);
    assert!(decision.granted);
    assert!(decision.has_code(&ReasonCode::MANAGER));

    // Transitive management is enough
    let decision = h.warden.can_read(&Authentication::user("ceo"), &doc);
    assert!(decision.has_code(&ReasonCode::MANAGER));
}

#[test]
fn stranger_is_denied_by_default() {
    let h = harness();
    let decision = h
        .warden
        .can_read(&Authentication::user("stranger"), &private_doc_of("report"));
    assert!(!decision.granted);
    assert!(decision.has_code(&ReasonCode::DEFAULT_DENY));

    // A peer is not a manager
    let decision = h
        .warden
        .can_read(&Authentication::user("peer"), &private_doc_of("report"));
    assert!(decision.has_code(&ReasonCode::DEFAULT_DENY));
}

#[test]
fn reassignment_changes_visibility_and_rejects_cycles() {
    let h = harness();
    let lines = h.warden.reporting_lines().expect("writable store");
    let doc = private_doc_of("report");

    lines
        .reassign_manager(
            &"report".into(),
            Some(&"stranger".into()),
            Some(&"ceo".into()),
            Some("team change"),
        )
        .expect("reassignment should succeed");

    assert!(h.warden.can_read(&Authentication::user("stranger"), &doc).granted);
    assert!(!h.warden.can_read(&Authentication::user("manager"), &doc).granted);

    let result = lines.reassign_manager(&"ceo".into(), Some(&"manager".into()), None, None);
    assert!(matches!(result, Err(HierarchyError::Cycle { .. })));

    let history = lines.manager_history(&"report".into()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].changed_at, h.clock.now());
}

// ============================================================================
// Facet lifecycle
// ============================================================================

#[test]
fn division_facet_expires_after_thirty_days() {
    let h = harness();
    let facets = h.warden.facets();
    let sales = key("org-division:sales");
    let dana = EntityRef::user("dana");

    facets
        .assign_facet(
            AssignRequest::new(sales.clone(), dana.clone())
                .by("ceo")
                .with_expiry_days(30),
        )
        .unwrap();
    assert!(facets.has_facet(&dana, &sales).unwrap());

    h.clock.advance(Days::days(31));
    assert!(!facets.has_facet(&dana, &sales).unwrap());

    // Still active until reconciliation runs
    let held = facets.get_facets(&dana, Some("org-division")).unwrap();
    assert_eq!(held.len(), 1);
    assert!(held[0].is_expired);

    assert_eq!(facets.expire_stale_assignments().unwrap(), 1);
    assert!(facets.get_facets(&dana, None).unwrap().is_empty());
}

#[test]
fn divisional_admin_is_scoped_to_division() {
    let h = harness();
    let facets = h.warden.facets();
    for (facet, entity) in [
        ("role:divisional-admin", "dana"),
        ("org-division:sales", "dana"),
        ("org-division:sales", "report"),
    ] {
        facets
            .assign_facet(AssignRequest::new(key(facet), EntityRef::user(entity)))
            .unwrap();
    }

    let auth = Authentication::user("dana");
    let decision = h.warden.can_update(&auth, &private_doc_of("report"));
    assert!(decision.has_code(&ReasonCode::DIVISIONAL_ADMIN));

    let decision = h.warden.can_update(&auth, &private_doc_of("peer"));
    assert!(decision.has_code(&ReasonCode::DEFAULT_DENY));

    // Once the division facet lapses, the grant goes with it
    facets
        .revoke_facet(&key("org-division:sales"), &EntityRef::user("report"), None, None)
        .unwrap();
    let decision = h.warden.can_update(&auth, &private_doc_of("report"));
    assert!(!decision.granted);
}

#[test]
fn global_admin_and_friends() {
    let h = harness();
    h.warden
        .facets()
        .assign_facet(AssignRequest::new(key("role:admin"), EntityRef::user("stranger")))
        .unwrap();
    h.relationships.add_friendship("peer", "report");

    let doc = private_doc_of("report");
    let decision = h.warden.can_delete(&Authentication::user("stranger"), &doc);
    assert!(decision.has_code(&ReasonCode::GLOBAL_ADMIN));

    let friends_doc = doc.clone().with_visibility(Visibility::Friends);
    let decision = h.warden.can_read(&Authentication::user("peer"), &friends_doc);
    assert!(decision.has_code(&ReasonCode::FRIENDS));
}

// ============================================================================
// Fail-closed behaviour
// ============================================================================

#[test]
fn store_outage_denies_instead_of_granting() {
    let h = harness();
    h.warden
        .facets()
        .assign_facet(AssignRequest::new(key("role:admin"), EntityRef::user("stranger")))
        .unwrap();
    h.repository.set_unavailable(true);

    let decision = h
        .warden
        .can_read(&Authentication::user("stranger"), &private_doc_of("report"));
    assert!(!decision.granted);
    assert!(decision.has_code(&ReasonCode::PERMISSION_CHECK_ERROR));

    h.repository.set_unavailable(false);
    let decision = h
        .warden
        .can_read(&Authentication::user("stranger"), &private_doc_of("report"));
    assert!(decision.has_code(&ReasonCode::GLOBAL_ADMIN));
}

#[test]
fn anonymous_requests() {
    let h = harness();
    let anon = Authentication::anonymous();

    let public = private_doc_of("report").with_visibility(Visibility::Public);
    assert!(h.warden.can_read(&anon, &public).has_code(&ReasonCode::PUBLIC_VISIBILITY));

    let decision = h.warden.can_read(&anon, &private_doc_of("report"));
    assert!(decision.has_code(&ReasonCode::NOT_AUTHENTICATED));
}

// ============================================================================
// Batch filtering
// ============================================================================

#[test]
fn filter_readable_keeps_order() {
    let h = harness();
    let docs = vec![
        private_doc_of("report"),
        private_doc_of("stranger"),
        private_doc_of("peer"),
        private_doc_of("ceo"),
    ];

    let visible = h
        .warden
        .filter_readable(docs, &Authentication::user("manager"));
    let ids: Vec<&str> = visible.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["doc-of-report", "doc-of-peer"]);
}

// ============================================================================
// Audit
// ============================================================================

#[test]
fn sensitive_checks_are_audited_once() {
    let h = harness();
    let policy = ResourcePolicy::new("export", "export")
        .with_rule(RequireAuthenticationRule)
        .with_rule(OwnerRule);
    let auth = Authentication::user("report")
        .with_ip("192.0.2.10")
        .with_request_id("req-42");

    let decision = h
        .warden
        .check_sensitive(&policy, &auth, &private_doc_of("report"));
    assert!(decision.granted);

    // A plain check with no audited facet is not recorded
    h.warden.check(&policy, &auth, &private_doc_of("report"));

    assert!(h.warden.flush_audit(Duration::from_secs(5)));
    assert_eq!(h.audit_log.count(), 1);

    let event = h.audit_log.get_event(decision.decision_id).unwrap();
    assert_eq!(event.event_id, decision.decision_id);
    assert_eq!(event.context.ip_address.as_deref(), Some("192.0.2.10"));
    assert_eq!(event.context.request_id.as_deref(), Some("req-42"));
}

#[test]
fn audited_facets_and_deletes_are_recorded() {
    let h = harness();
    h.warden
        .facets()
        .define_facet(FacetDefinition::new(key("clearance:hr")).audited())
        .unwrap();

    let policy = ResourcePolicy::new("hr-read", "read").with_rule(
        warden::warden_abac::GlobalFacetRule::new(
            h.warden.facets().clone(),
            key("clearance:hr"),
        ),
    );
    let decision = h
        .warden
        .check(&policy, &Authentication::user("stranger"), &private_doc_of("report"));
    assert!(decision.has_code(&ReasonCode::DEFAULT_DENY));

    let delete = h
        .warden
        .can_delete(&Authentication::user("manager"), &private_doc_of("report"));
    assert!(delete.has_code(&ReasonCode::MANAGER));

    assert!(h.warden.flush_audit(Duration::from_secs(5)));
    assert_eq!(h.audit_log.count(), 2);

    let denials = h
        .audit_log
        .query(&AuditQuery::default().with_outcome(false));
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].context.facets_checked, vec!["clearance:hr"]);
}

#[test]
fn failed_checks_are_audited() {
    let h = harness();
    h.repository.set_unavailable(true);

    let decision = h
        .warden
        .can_read(&Authentication::user("stranger"), &private_doc_of("report"));
    assert!(decision.has_code(&ReasonCode::PERMISSION_CHECK_ERROR));

    assert!(h.warden.flush_audit(Duration::from_secs(5)));
    let failures = h.audit_log.query(
        &AuditQuery::default().with_reason_code(ReasonCode::PERMISSION_CHECK_ERROR),
    );
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].event_id, decision.decision_id);
}

#[test]
fn audit_times_follow_the_injected_clock() {
    let h = harness();
    h.clock.advance(Days::days(40));

    let decision = h
        .warden
        .can_delete(&Authentication::user("manager"), &private_doc_of("report"));
    assert_eq!(decision.timestamp, h.clock.now());

    assert!(h.warden.flush_audit(Duration::from_secs(5)));
    let event = h.audit_log.get_event(decision.decision_id).unwrap();
    assert_eq!(event.recorded_at, h.clock.now());

    let window = AuditQuery::default()
        .with_time_range(h.clock.now() - Days::hours(1), h.clock.now());
    assert_eq!(h.audit_log.query(&window).len(), 1);
}
