//! Main Warden API.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use warden_abac::{
    Authentication, ContentPolicy, Decision, DivisionSelector, ElevatedFacets, FACETS_CHECKED,
    NoRelationships, PermissionEngine, PolicyContext, ReasonCode, RelationshipResolver, Resource,
    ResourcePolicy,
};
use warden_audit::{
    AuditDispatcher, AuditEvent, AuditSink, DispatchOutcome, DispatcherConfig, TracingAuditSink,
};
use warden_config::{PolicyConfig, WardenConfig};
use warden_facets::{FacetRepository, FacetStore};
use warden_hierarchy::{EntityResolver, HierarchyResolver, ReportingLineStore, ReportingLines};
use warden_types::{Clock, FacetKey, SystemClock};

use crate::error::{Result, WardenError};

/// The assembled access-control engine.
///
/// Owns the facet store, the hierarchy resolver, the batch filter pool, the
/// standard content policy and (when enabled) the audit pipeline.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use warden::{Authentication, ResourceAttributes, Warden, WardenConfig};
/// use warden_facets::MemoryFacetRepository;
/// use warden_hierarchy::MemoryDirectory;
///
/// let directory = MemoryDirectory::new()
///     .with_entity("boss", None)
///     .with_entity("alice", Some("boss"));
///
/// let warden = Warden::builder(WardenConfig::default())
///     .facet_repository(Arc::new(MemoryFacetRepository::new()))
///     .reporting_store(Arc::new(directory))
///     .build()
///     .unwrap();
///
/// let doc = ResourceAttributes::new("doc-1").owned_by("alice");
/// let decision = warden.can_read(&Authentication::user("boss"), &doc);
/// assert!(decision.granted);
/// ```
pub struct Warden {
    config: WardenConfig,
    facets: Arc<FacetStore>,
    hierarchy: HierarchyResolver,
    reporting: Option<ReportingLines>,
    engine: PermissionEngine,
    content: ContentPolicy,
    audit: Option<AuditDispatcher>,
    clock: Arc<dyn Clock>,
}

impl Warden {
    pub fn builder(config: WardenConfig) -> WardenBuilder {
        WardenBuilder::new(config)
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Shared handle to the facet store, for custom policies.
    pub fn facets(&self) -> &Arc<FacetStore> {
        &self.facets
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    /// Cycle-guarded manager reassignment, if a writable store was supplied.
    pub fn reporting_lines(&self) -> Option<&ReportingLines> {
        self.reporting.as_ref()
    }

    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    pub fn content_policy(&self) -> &ContentPolicy {
        &self.content
    }

    pub fn audit(&self) -> Option<&AuditDispatcher> {
        self.audit.as_ref()
    }

    /// Evaluates `policy`.
    ///
    /// The decision is audited if it consulted a facet whose definition
    /// requires audit, or if the check itself failed.
    pub fn check(
        &self,
        policy: &ResourcePolicy,
        auth: &Authentication,
        resource: &dyn Resource,
    ) -> Decision {
        let decision = policy.evaluate(auth, resource);
        if decision.has_code(&ReasonCode::PERMISSION_CHECK_ERROR)
            || self.touches_audited_facet(&decision)
        {
            self.record(auth, &decision);
        }
        decision
    }

    /// Evaluates `policy` and always forwards the decision to audit.
    pub fn check_sensitive(
        &self,
        policy: &ResourcePolicy,
        auth: &Authentication,
        resource: &dyn Resource,
    ) -> Decision {
        let decision = policy.evaluate(auth, resource);
        self.record(auth, &decision);
        decision
    }

    pub fn can_read(&self, auth: &Authentication, resource: &dyn Resource) -> Decision {
        self.check_content("read", auth, resource)
    }

    pub fn can_update(&self, auth: &Authentication, resource: &dyn Resource) -> Decision {
        self.check_content("update", auth, resource)
    }

    /// Deletion is always audited.
    pub fn can_delete(&self, auth: &Authentication, resource: &dyn Resource) -> Decision {
        let decision = self.content.can_delete(auth, resource);
        self.record(auth, &decision);
        decision
    }

    /// Returns the resources `auth` may read, in their original order.
    pub fn filter_readable<T>(&self, resources: Vec<T>, auth: &Authentication) -> Vec<T>
    where
        T: Resource + Sync,
    {
        self.engine
            .filter_by_decision(resources, auth, |resource, auth| {
                self.content.can_read(auth, resource)
            })
    }

    /// Waits for queued audit events to be delivered.
    ///
    /// Returns true if nothing is pending (or audit is disabled).
    pub fn flush_audit(&self, timeout: Duration) -> bool {
        self.audit.as_ref().is_none_or(|audit| audit.flush(timeout))
    }

    fn check_content(
        &self,
        operation: &'static str,
        auth: &Authentication,
        resource: &dyn Resource,
    ) -> Decision {
        match self.content.policy_for(operation) {
            Some(policy) => self.check(policy, auth, resource),
            None => warden_abac::deny(
                auth.user_id.as_ref(),
                Some(resource.id()),
                operation,
                "No policy for operation",
            )
            .with_code(ReasonCode::DEFAULT_DENY)
            .at(self.clock.now()),
        }
    }

    fn touches_audited_facet(&self, decision: &Decision) -> bool {
        let Some(checked) = decision
            .metadata
            .get(FACETS_CHECKED)
            .and_then(|v| v.as_array())
        else {
            return false;
        };

        checked
            .iter()
            .filter_map(|k| k.as_str()?.parse::<FacetKey>().ok())
            .any(|key| match self.facets.definition(&key) {
                Ok(definition) => definition.is_some_and(|d| d.requires_audit),
                // Unreadable definition counts as audited
                Err(e) => {
                    debug!(facet = %key, error = %e, "Could not read facet definition");
                    true
                }
            })
    }

    fn record(&self, auth: &Authentication, decision: &Decision) {
        let Some(audit) = &self.audit else {
            return;
        };
        let event = AuditEvent::from_check(auth, decision.clone()).recorded_at(self.clock.now());
        if audit.dispatch(event) == DispatchOutcome::Dropped {
            warn!(decision_id = %decision.decision_id, "Sensitive decision was not audited");
        }
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Collects the injected stores and sinks for [`Warden`].
pub struct WardenBuilder {
    config: WardenConfig,
    facet_repository: Option<Arc<dyn FacetRepository>>,
    entities: Option<Arc<dyn EntityResolver>>,
    reporting_store: Option<Arc<dyn ReportingLineStore>>,
    relationships: Arc<dyn RelationshipResolver>,
    clock: Arc<dyn Clock>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    audit_fallback: Option<Arc<dyn AuditSink>>,
}

impl WardenBuilder {
    pub fn new(config: WardenConfig) -> Self {
        Self {
            config,
            facet_repository: None,
            entities: None,
            reporting_store: None,
            relationships: Arc::new(NoRelationships),
            clock: Arc::new(SystemClock),
            audit_sink: None,
            audit_fallback: None,
        }
    }

    pub fn facet_repository(mut self, repository: Arc<dyn FacetRepository>) -> Self {
        self.facet_repository = Some(repository);
        self
    }

    /// Read-only reporting graph.
    pub fn entities(mut self, entities: Arc<dyn EntityResolver>) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Writable reporting graph; also enables [`Warden::reporting_lines`].
    pub fn reporting_store(mut self, store: Arc<dyn ReportingLineStore>) -> Self {
        let entities: Arc<dyn EntityResolver> = store.clone();
        self.entities = Some(entities);
        self.reporting_store = Some(store);
        self
    }

    pub fn relationships(mut self, relationships: Arc<dyn RelationshipResolver>) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Primary audit destination. Defaults to [`TracingAuditSink`].
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Synchronous destination used when the queue is full or the primary fails.
    pub fn audit_fallback(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_fallback = Some(sink);
        self
    }

    pub fn build(self) -> Result<Warden> {
        self.config.validate()?;
        let repository = self
            .facet_repository
            .ok_or(WardenError::MissingComponent("facet repository"))?;
        let entities = self
            .entities
            .ok_or(WardenError::MissingComponent("entity resolver"))?;

        let max_depth = self.config.hierarchy.max_depth;
        let facets = Arc::new(
            FacetStore::new(repository, self.clock.clone())
                .with_review_warning_days(self.config.facets.review_warning_days),
        );
        let hierarchy = HierarchyResolver::new(entities).with_max_depth(max_depth);
        let reporting = self
            .reporting_store
            .map(|store| ReportingLines::new(store, max_depth).with_clock(self.clock.clone()));

        let context = PolicyContext {
            facets: facets.clone(),
            hierarchy: hierarchy.clone(),
            relationships: self.relationships,
            elevated: elevated_facets(&self.config.policy)?,
            clock: self.clock.clone(),
        };
        let content = ContentPolicy::new(&context);
        let engine = PermissionEngine::new(self.config.engine.filter_concurrency)?;

        let audit = if self.config.audit.enabled {
            let primary = self
                .audit_sink
                .unwrap_or_else(|| Arc::new(TracingAuditSink));
            Some(AuditDispatcher::start(
                primary,
                self.audit_fallback,
                DispatcherConfig {
                    queue_capacity: self.config.audit.queue_capacity,
                    batch_size: self.config.audit.batch_size,
                },
            )?)
        } else {
            None
        };

        info!(
            max_depth,
            filter_concurrency = self.config.engine.filter_concurrency,
            audit = audit.is_some(),
            "Warden initialized"
        );

        Ok(Warden {
            config: self.config,
            facets,
            hierarchy,
            reporting,
            engine,
            content,
            audit,
            clock: self.clock,
        })
    }
}

fn elevated_facets(policy: &PolicyConfig) -> Result<ElevatedFacets> {
    let division = match &policy.division_name {
        Some(name) => DivisionSelector::named(&policy.division_scope, name),
        None => DivisionSelector::scope(&policy.division_scope),
    };
    Ok(ElevatedFacets {
        global_admin: policy.global_admin_facet.parse()?,
        divisional_admin: policy.divisional_admin_facet.parse()?,
        division,
    })
}
