//! Individual rules of a resource policy.
//!
//! Each rule looks at one request and either grants, denies, or abstains.
//! Rules are composed into a [`ResourcePolicy`](crate::ResourcePolicy), which
//! stops at the first rule that does not abstain.

use std::collections::BTreeSet;
use std::sync::Arc;

use warden_facets::FacetStore;
use warden_hierarchy::HierarchyResolver;
use warden_types::{EntityId, EntityRef, FacetKey};

use crate::attributes::{Authentication, Resource, Visibility};
use crate::decision::ReasonCode;
use crate::error::Result;
use crate::relationships::RelationshipResolver;

// ============================================================================
// Rule contract
// ============================================================================

/// The request a rule is evaluated against.
pub struct Request<'a> {
    pub auth: &'a Authentication,
    pub resource: &'a dyn Resource,
    pub operation: &'a str,
}

impl Request<'_> {
    fn requester(&self) -> Option<&EntityId> {
        self.auth.user_id.as_ref()
    }

    fn owner(&self) -> Option<&EntityId> {
        self.resource.owner_id()
    }
}

/// Facts collected while the chain runs, surfaced in decision metadata.
#[derive(Debug, Default)]
pub struct Trace {
    facets_checked: Vec<String>,
}

impl Trace {
    pub fn record_facet(&mut self, facet: &FacetKey) {
        let key = facet.to_string();
        if !self.facets_checked.contains(&key) {
            self.facets_checked.push(key);
        }
    }

    pub fn facets_checked(&self) -> &[String] {
        &self.facets_checked
    }
}

/// What a single rule concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Grant { code: ReasonCode, reason: String },
    Deny { code: ReasonCode, reason: String },
    /// The rule has no opinion; the next one decides.
    Abstain,
}

impl RuleOutcome {
    pub fn grant(code: ReasonCode, reason: impl Into<String>) -> Self {
        Self::Grant {
            code,
            reason: reason.into(),
        }
    }

    pub fn deny(code: ReasonCode, reason: impl Into<String>) -> Self {
        Self::Deny {
            code,
            reason: reason.into(),
        }
    }
}

/// One link in a policy chain.
pub trait Rule: Send + Sync {
    /// Short name recorded in decision metadata.
    fn name(&self) -> &str;

    fn evaluate(&self, request: &Request<'_>, trace: &mut Trace) -> Result<RuleOutcome>;
}

// ============================================================================
// Visibility and identity
// ============================================================================

/// Grants public and unlisted resources to anyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicVisibilityRule;

impl Rule for PublicVisibilityRule {
    fn name(&self) -> &str {
        "public-visibility"
    }

    fn evaluate(&self, request: &Request<'_>, _trace: &mut Trace) -> Result<RuleOutcome> {
        Ok(match request.resource.visibility() {
            Visibility::Public => {
                RuleOutcome::grant(ReasonCode::PUBLIC_VISIBILITY, "Resource is public")
            }
            Visibility::Unlisted => {
                RuleOutcome::grant(ReasonCode::PUBLIC_UNLISTED, "Resource is unlisted")
            }
            Visibility::Friends | Visibility::Private => RuleOutcome::Abstain,
        })
    }
}

/// Denies anonymous requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAuthenticationRule;

impl Rule for RequireAuthenticationRule {
    fn name(&self) -> &str {
        "require-authentication"
    }

    fn evaluate(&self, request: &Request<'_>, _trace: &mut Trace) -> Result<RuleOutcome> {
        if request.auth.is_authenticated() {
            Ok(RuleOutcome::Abstain)
        } else {
            Ok(RuleOutcome::deny(
                ReasonCode::NOT_AUTHENTICATED,
                "Authentication required",
            ))
        }
    }
}

/// Grants the resource owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerRule;

impl Rule for OwnerRule {
    fn name(&self) -> &str {
        "owner"
    }

    fn evaluate(&self, request: &Request<'_>, _trace: &mut Trace) -> Result<RuleOutcome> {
        match (request.requester(), request.owner()) {
            (Some(requester), Some(owner)) if requester == owner => Ok(RuleOutcome::grant(
                ReasonCode::OWNER,
                "Requester owns the resource",
            )),
            _ => Ok(RuleOutcome::Abstain),
        }
    }
}

/// Grants friends-only resources to the owner's friends.
pub struct FriendsRule {
    relationships: Arc<dyn RelationshipResolver>,
}

impl FriendsRule {
    pub fn new(relationships: Arc<dyn RelationshipResolver>) -> Self {
        Self { relationships }
    }
}

impl Rule for FriendsRule {
    fn name(&self) -> &str {
        "friends"
    }

    fn evaluate(&self, request: &Request<'_>, _trace: &mut Trace) -> Result<RuleOutcome> {
        if request.resource.visibility() != Visibility::Friends {
            return Ok(RuleOutcome::Abstain);
        }
        let (Some(requester), Some(owner)) = (request.requester(), request.owner()) else {
            return Ok(RuleOutcome::Abstain);
        };

        if self.relationships.are_friends(requester, owner)? {
            Ok(RuleOutcome::grant(
                ReasonCode::FRIENDS,
                "Requester is a friend of the owner",
            ))
        } else {
            Ok(RuleOutcome::Abstain)
        }
    }
}

// ============================================================================
// Facet-backed rules
// ============================================================================

/// Grants holders of a global elevated facet.
pub struct GlobalFacetRule {
    facets: Arc<FacetStore>,
    facet: FacetKey,
    minimum_level: Option<i32>,
}

impl GlobalFacetRule {
    pub fn new(facets: Arc<FacetStore>, facet: FacetKey) -> Self {
        Self {
            facets,
            facet,
            minimum_level: None,
        }
    }

    /// Also requires the facet's definition to rank at least `level`.
    pub fn at_level(mut self, level: i32) -> Self {
        self.minimum_level = Some(level);
        self
    }
}

impl Rule for GlobalFacetRule {
    fn name(&self) -> &str {
        "global-facet"
    }

    fn evaluate(&self, request: &Request<'_>, trace: &mut Trace) -> Result<RuleOutcome> {
        let Some(requester) = request.requester() else {
            return Ok(RuleOutcome::Abstain);
        };
        let entity = EntityRef::user(requester.clone());

        trace.record_facet(&self.facet);
        let held = match self.minimum_level {
            Some(level) => self.facets.has_facet_at_level(&entity, &self.facet, level)?,
            None => self.facets.has_facet(&entity, &self.facet)?,
        };

        if held {
            Ok(RuleOutcome::grant(
                ReasonCode::GLOBAL_ADMIN,
                format!("Requester holds {}", self.facet),
            ))
        } else {
            Ok(RuleOutcome::Abstain)
        }
    }
}

/// Which facets place an entity in a division.
///
/// With a `name`, only `scope:name[:value]` facets count; otherwise any facet
/// in `scope` does. A facet's value (or its name when valueless) identifies
/// the division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionSelector {
    pub scope: String,
    pub name: Option<String>,
}

impl DivisionSelector {
    /// Matches every facet in `scope`, e.g. `org-division:sales`.
    pub fn scope(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            name: None,
        }
    }

    /// Matches `scope:name:*` facets, e.g. `org:division:sales`.
    pub fn named(scope: &str, name: &str) -> Self {
        Self {
            scope: scope.to_string(),
            name: Some(name.to_string()),
        }
    }
}

/// Grants holders of a scoped elevated facet who share a division with the owner.
pub struct DivisionalFacetRule {
    facets: Arc<FacetStore>,
    facet: FacetKey,
    division: DivisionSelector,
}

impl DivisionalFacetRule {
    pub fn new(facets: Arc<FacetStore>, facet: FacetKey, division: DivisionSelector) -> Self {
        Self {
            facets,
            facet,
            division,
        }
    }

    fn divisions_of(&self, entity: &EntityRef, trace: &mut Trace) -> Result<BTreeSet<String>> {
        let mut divisions = BTreeSet::new();
        for held in self.facets.get_facets(entity, Some(&self.division.scope))? {
            let key = &held.definition.key;
            if held.is_expired
                || self
                    .division
                    .name
                    .as_deref()
                    .is_some_and(|name| key.name() != name)
            {
                continue;
            }
            trace.record_facet(key);
            divisions.insert(key.value().unwrap_or(key.name()).to_string());
        }
        Ok(divisions)
    }
}

impl Rule for DivisionalFacetRule {
    fn name(&self) -> &str {
        "divisional-facet"
    }

    fn evaluate(&self, request: &Request<'_>, trace: &mut Trace) -> Result<RuleOutcome> {
        let (Some(requester), Some(owner)) = (request.requester(), request.owner()) else {
            return Ok(RuleOutcome::Abstain);
        };
        let requester_ref = EntityRef::user(requester.clone());

        trace.record_facet(&self.facet);
        if !self.facets.has_facet(&requester_ref, &self.facet)? {
            return Ok(RuleOutcome::Abstain);
        }

        let requester_divisions = self.divisions_of(&requester_ref, trace)?;
        if requester_divisions.is_empty() {
            return Ok(RuleOutcome::Abstain);
        }
        let owner_divisions = self.divisions_of(&EntityRef::user(owner.clone()), trace)?;

        match requester_divisions.intersection(&owner_divisions).next() {
            Some(shared) => Ok(RuleOutcome::grant(
                ReasonCode::DIVISIONAL_ADMIN,
                format!("Requester holds {} in division {shared}", self.facet),
            )),
            None => Ok(RuleOutcome::Abstain),
        }
    }
}

// ============================================================================
// Hierarchy-backed rules
// ============================================================================

/// Grants the owner's line manager.
#[derive(Clone)]
pub struct ManagerRule {
    hierarchy: HierarchyResolver,
    include_indirect: bool,
}

impl ManagerRule {
    /// Grants direct and transitive managers.
    pub fn new(hierarchy: HierarchyResolver) -> Self {
        Self {
            hierarchy,
            include_indirect: true,
        }
    }

    pub fn direct_only(mut self) -> Self {
        self.include_indirect = false;
        self
    }
}

impl Rule for ManagerRule {
    fn name(&self) -> &str {
        "manager"
    }

    fn evaluate(&self, request: &Request<'_>, _trace: &mut Trace) -> Result<RuleOutcome> {
        let (Some(requester), Some(owner)) = (request.requester(), request.owner()) else {
            return Ok(RuleOutcome::Abstain);
        };

        if self
            .hierarchy
            .is_administrator_for(requester, owner, self.include_indirect)?
        {
            Ok(RuleOutcome::grant(
                ReasonCode::MANAGER,
                "Requester manages the owner",
            ))
        } else {
            Ok(RuleOutcome::Abstain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::ResourceAttributes;
    use crate::relationships::MemoryRelationships;
    use chrono::{Duration, TimeZone, Utc};
    use test_case::test_case;
    use warden_facets::{AssignRequest, FacetDefinition, MemoryFacetRepository};
    use warden_hierarchy::MemoryDirectory;
    use warden_types::ManualClock;

    fn key(s: &str) -> FacetKey {
        s.parse().unwrap()
    }

    fn facets_with_clock() -> (Arc<FacetStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let store = FacetStore::new(Arc::new(MemoryFacetRepository::new()), clock.clone());
        (Arc::new(store), clock)
    }

    fn define_and_assign(store: &FacetStore, facet: &str, entity: &str) {
        if store.definition(&key(facet)).unwrap().is_none() {
            store
                .define_facet(FacetDefinition::new(key(facet)))
                .unwrap();
        }
        store
            .assign_facet(AssignRequest::new(key(facet), EntityRef::user(entity)))
            .unwrap();
    }

    fn run(rule: &dyn Rule, auth: &Authentication, resource: &ResourceAttributes) -> RuleOutcome {
        let mut trace = Trace::default();
        let request = Request {
            auth,
            resource,
            operation: "read",
        };
        rule.evaluate(&request, &mut trace).unwrap()
    }

    fn code(outcome: &RuleOutcome) -> Option<&ReasonCode> {
        match outcome {
            RuleOutcome::Grant { code, .. } | RuleOutcome::Deny { code, .. } => Some(code),
            RuleOutcome::Abstain => None,
        }
    }

    #[test_case(Visibility::Public, Some(ReasonCode::PUBLIC_VISIBILITY) ; "public")]
    #[test_case(Visibility::Unlisted, Some(ReasonCode::PUBLIC_UNLISTED) ; "unlisted")]
    #[test_case(Visibility::Friends, None ; "friends")]
    #[test_case(Visibility::Private, None ; "private")]
    fn test_public_visibility(visibility: Visibility, expected: Option<ReasonCode>) {
        let doc = ResourceAttributes::new("d").with_visibility(visibility);
        let outcome = run(&PublicVisibilityRule, &Authentication::anonymous(), &doc);
        assert_eq!(code(&outcome), expected.as_ref());
    }

    #[test]
    fn test_require_authentication() {
        let doc = ResourceAttributes::new("d");
        let outcome = run(&RequireAuthenticationRule, &Authentication::anonymous(), &doc);
        assert!(matches!(outcome, RuleOutcome::Deny { .. }));
        assert_eq!(code(&outcome), Some(&ReasonCode::NOT_AUTHENTICATED));

        let outcome = run(&RequireAuthenticationRule, &Authentication::user("u"), &doc);
        assert_eq!(outcome, RuleOutcome::Abstain);
    }

    #[test]
    fn test_owner() {
        let doc = ResourceAttributes::new("d").owned_by("alice");
        let outcome = run(&OwnerRule, &Authentication::user("alice"), &doc);
        assert_eq!(code(&outcome), Some(&ReasonCode::OWNER));

        let outcome = run(&OwnerRule, &Authentication::user("bob"), &doc);
        assert_eq!(outcome, RuleOutcome::Abstain);

        let unowned = ResourceAttributes::new("d");
        assert_eq!(
            run(&OwnerRule, &Authentication::user("alice"), &unowned),
            RuleOutcome::Abstain
        );
    }

    #[test]
    fn test_friends_only_applies_to_friends_visibility() {
        let graph = Arc::new(MemoryRelationships::new());
        graph.add_friendship("alice", "bob");
        let rule = FriendsRule::new(graph);

        let friends_doc = ResourceAttributes::new("d")
            .owned_by("alice")
            .with_visibility(Visibility::Friends);
        let outcome = run(&rule, &Authentication::user("bob"), &friends_doc);
        assert_eq!(code(&outcome), Some(&ReasonCode::FRIENDS));

        let outcome = run(&rule, &Authentication::user("carol"), &friends_doc);
        assert_eq!(outcome, RuleOutcome::Abstain);

        let private_doc = ResourceAttributes::new("d").owned_by("alice");
        let outcome = run(&rule, &Authentication::user("bob"), &private_doc);
        assert_eq!(outcome, RuleOutcome::Abstain);
    }

    #[test]
    fn test_global_facet_records_trace() {
        let (facets, _) = facets_with_clock();
        define_and_assign(&facets, "role:admin", "root");
        let rule = GlobalFacetRule::new(facets, key("role:admin"));
        let doc = ResourceAttributes::new("d").owned_by("alice");

        let mut trace = Trace::default();
        let auth = Authentication::user("root");
        let request = Request {
            auth: &auth,
            resource: &doc,
            operation: "read",
        };
        let outcome = rule.evaluate(&request, &mut trace).unwrap();
        assert_eq!(code(&outcome), Some(&ReasonCode::GLOBAL_ADMIN));
        assert_eq!(trace.facets_checked(), ["role:admin"]);

        let outcome = run(&rule, &Authentication::user("alice"), &doc);
        assert_eq!(outcome, RuleOutcome::Abstain);
    }

    #[test]
    fn test_global_facet_at_level() {
        let (facets, _) = facets_with_clock();
        facets
            .define_facet(FacetDefinition::new(key("role:moderator")).with_level(2))
            .unwrap();
        facets
            .assign_facet(AssignRequest::new(
                key("role:moderator"),
                EntityRef::user("mod"),
            ))
            .unwrap();
        let doc = ResourceAttributes::new("d");
        let auth = Authentication::user("mod");

        let low = GlobalFacetRule::new(facets.clone(), key("role:moderator")).at_level(2);
        assert_eq!(code(&run(&low, &auth, &doc)), Some(&ReasonCode::GLOBAL_ADMIN));

        let high = GlobalFacetRule::new(facets, key("role:moderator")).at_level(3);
        assert_eq!(run(&high, &auth, &doc), RuleOutcome::Abstain);
    }

    #[test]
    fn test_global_facet_expired_does_not_grant() {
        let (facets, clock) = facets_with_clock();
        facets
            .define_facet(FacetDefinition::new(key("role:admin")).with_expiry_days(1))
            .unwrap();
        facets
            .assign_facet(AssignRequest::new(key("role:admin"), EntityRef::user("root")))
            .unwrap();
        let rule = GlobalFacetRule::new(facets, key("role:admin"));
        let doc = ResourceAttributes::new("d");

        clock.advance(Duration::days(2));
        assert_eq!(
            run(&rule, &Authentication::user("root"), &doc),
            RuleOutcome::Abstain
        );
    }

    #[test]
    fn test_divisional_requires_shared_division() {
        let (facets, _) = facets_with_clock();
        define_and_assign(&facets, "role:divisional-admin", "dana");
        define_and_assign(&facets, "org-division:sales", "dana");
        define_and_assign(&facets, "org-division:sales", "sam");
        define_and_assign(&facets, "org-division:ops", "olga");

        let rule = DivisionalFacetRule::new(
            facets,
            key("role:divisional-admin"),
            DivisionSelector::scope("org-division"),
        );
        let auth = Authentication::user("dana");

        let same = ResourceAttributes::new("d").owned_by("sam");
        let outcome = run(&rule, &auth, &same);
        assert_eq!(code(&outcome), Some(&ReasonCode::DIVISIONAL_ADMIN));

        let other = ResourceAttributes::new("d").owned_by("olga");
        assert_eq!(run(&rule, &auth, &other), RuleOutcome::Abstain);

        // Same division without the elevated facet
        let outcome = run(&rule, &Authentication::user("sam"), &same);
        assert_eq!(outcome, RuleOutcome::Abstain);
    }

    #[test]
    fn test_divisional_named_selector_uses_value() {
        let (facets, _) = facets_with_clock();
        define_and_assign(&facets, "role:divisional-admin", "dana");
        define_and_assign(&facets, "org:division:sales", "dana");
        define_and_assign(&facets, "org:team:sales", "tom");
        define_and_assign(&facets, "org:division:sales", "sam");

        let rule = DivisionalFacetRule::new(
            facets,
            key("role:divisional-admin"),
            DivisionSelector::named("org", "division"),
        );
        let auth = Authentication::user("dana");

        let mut trace = Trace::default();
        let doc = ResourceAttributes::new("d").owned_by("sam");
        let request = Request {
            auth: &auth,
            resource: &doc,
            operation: "read",
        };
        let outcome = rule.evaluate(&request, &mut trace).unwrap();
        assert_eq!(code(&outcome), Some(&ReasonCode::DIVISIONAL_ADMIN));
        assert_eq!(
            trace.facets_checked(),
            ["role:divisional-admin", "org:division:sales"]
        );

        // A team facet with the same value is not a division
        let team_doc = ResourceAttributes::new("d").owned_by("tom");
        assert_eq!(run(&rule, &auth, &team_doc), RuleOutcome::Abstain);
    }

    #[test]
    fn test_manager() {
        let directory = MemoryDirectory::new()
            .with_entity("ceo", None)
            .with_entity("vp", Some("ceo"))
            .with_entity("eng", Some("vp"));
        let hierarchy = HierarchyResolver::new(Arc::new(directory));
        let doc = ResourceAttributes::new("d").owned_by("eng");

        let rule = ManagerRule::new(hierarchy.clone());
        assert_eq!(
            code(&run(&rule, &Authentication::user("ceo"), &doc)),
            Some(&ReasonCode::MANAGER)
        );
        assert_eq!(
            run(&rule, &Authentication::user("eng"), &doc),
            RuleOutcome::Abstain
        );

        let direct = ManagerRule::new(hierarchy).direct_only();
        assert_eq!(
            run(&direct, &Authentication::user("ceo"), &doc),
            RuleOutcome::Abstain
        );
        assert_eq!(
            code(&run(&direct, &Authentication::user("vp"), &doc)),
            Some(&ReasonCode::MANAGER)
        );
    }
}
