//! Resource policy definitions.
//!
//! A policy is an ordered chain of [`Rule`]s. Rules are evaluated in
//! insertion order and the first grant or deny ends the chain. When every
//! rule abstains the request is denied with [`ReasonCode::DEFAULT_DENY`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use warden_facets::FacetStore;
use warden_hierarchy::HierarchyResolver;
use warden_types::{Clock, FacetKey, SystemClock};

use crate::attributes::{Authentication, Resource};
use crate::decision::{Decision, ReasonCode, deny, grant, safe_check};
use crate::error::Result;
use crate::relationships::RelationshipResolver;
use crate::rules::{
    DivisionSelector, DivisionalFacetRule, FriendsRule, GlobalFacetRule, ManagerRule, OwnerRule,
    PublicVisibilityRule, RequireAuthenticationRule, Request, Rule, RuleOutcome, Trace,
};

/// Metadata key listing the facets consulted while deciding.
pub const FACETS_CHECKED: &str = "facetsChecked";

// ============================================================================
// ResourcePolicy
// ============================================================================

/// An ordered rule chain guarding one operation.
pub struct ResourcePolicy {
    name: String,
    operation: String,
    rules: Vec<Box<dyn Rule>>,
    clock: Arc<dyn Clock>,
}

impl ResourcePolicy {
    pub fn new(name: &str, operation: &str) -> Self {
        Self {
            name: name.to_string(),
            operation: operation.to_string(),
            rules: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used to timestamp decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Appends a rule to the chain.
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Decides whether `auth` may perform this policy's operation on `resource`.
    ///
    /// Never fails: rule errors and panics become a
    /// [`ReasonCode::PERMISSION_CHECK_ERROR`] denial.
    pub fn evaluate(&self, auth: &Authentication, resource: &dyn Resource) -> Decision {
        safe_check(|| self.evaluate_chain(auth, resource), &self.operation).at(self.clock.now())
    }

    fn evaluate_chain(&self, auth: &Authentication, resource: &dyn Resource) -> Result<Decision> {
        let request = Request {
            auth,
            resource,
            operation: &self.operation,
        };
        let mut trace = Trace::default();
        let user_id = auth.user_id.as_ref();
        let resource_id = Some(resource.id());

        for rule in &self.rules {
            let outcome = rule.evaluate(&request, &mut trace)?;
            let decision = match outcome {
                RuleOutcome::Abstain => continue,
                RuleOutcome::Grant { code, reason } => {
                    info!(
                        policy = %self.name,
                        user = ?user_id,
                        resource = %resource.id(),
                        code = %code,
                        "Access granted"
                    );
                    grant(user_id, resource_id, &self.operation, reason).with_code(code)
                }
                RuleOutcome::Deny { code, reason } => {
                    debug!(policy = %self.name, resource = %resource.id(), code = %code, "Access denied by rule");
                    deny(user_id, resource_id, &self.operation, reason).with_code(code)
                }
            };
            return Ok(self.annotate(decision, Some(rule.name()), &trace));
        }

        debug!(policy = %self.name, user = ?user_id, resource = %resource.id(), "No rule matched; denying");
        let decision = deny(
            user_id,
            resource_id,
            &self.operation,
            "No rule granted access",
        )
        .with_code(ReasonCode::DEFAULT_DENY);
        Ok(self.annotate(decision, None, &trace))
    }

    fn annotate(&self, decision: Decision, rule: Option<&str>, trace: &Trace) -> Decision {
        let checked: Vec<Value> = trace
            .facets_checked()
            .iter()
            .map(|k| Value::String(k.clone()))
            .collect();
        let decision = decision
            .with_metadata("policy", self.name.as_str())
            .with_metadata(FACETS_CHECKED, checked);
        match rule {
            Some(rule) => decision.with_metadata("rule", rule),
            None => decision,
        }
    }
}

// ============================================================================
// Standard policies
// ============================================================================

/// Facets that confer elevated access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedFacets {
    /// Grants access to everything.
    pub global_admin: FacetKey,
    /// Grants access within the holder's own division.
    pub divisional_admin: FacetKey,
    pub division: DivisionSelector,
}

/// Collaborators shared by every standard policy.
#[derive(Clone)]
pub struct PolicyContext {
    pub facets: Arc<FacetStore>,
    pub hierarchy: HierarchyResolver,
    pub relationships: Arc<dyn RelationshipResolver>,
    pub elevated: ElevatedFacets,
    /// Same clock the facet store uses, so decision times line up with expiry.
    pub clock: Arc<dyn Clock>,
}

impl PolicyContext {
    /// Builds a policy for `operation` from the canonical rule order.
    ///
    /// With `visibility_rules`, public resources are granted up front and
    /// friends-only resources are granted to friends.
    pub fn standard_policy(
        &self,
        name: &str,
        operation: &str,
        visibility_rules: bool,
    ) -> ResourcePolicy {
        let mut policy = ResourcePolicy::new(name, operation).with_clock(self.clock.clone());
        if visibility_rules {
            policy = policy.with_rule(PublicVisibilityRule);
        }
        policy = policy.with_rule(RequireAuthenticationRule).with_rule(OwnerRule);
        if visibility_rules {
            policy = policy.with_rule(FriendsRule::new(self.relationships.clone()));
        }
        policy
            .with_rule(GlobalFacetRule::new(
                self.facets.clone(),
                self.elevated.global_admin.clone(),
            ))
            .with_rule(DivisionalFacetRule::new(
                self.facets.clone(),
                self.elevated.divisional_admin.clone(),
                self.elevated.division.clone(),
            ))
            .with_rule(ManagerRule::new(self.hierarchy.clone()))
    }
}

/// Read, update and delete policies for user-owned content.
pub struct ContentPolicy {
    read: ResourcePolicy,
    update: ResourcePolicy,
    delete: ResourcePolicy,
}

impl ContentPolicy {
    pub fn new(context: &PolicyContext) -> Self {
        Self {
            read: context.standard_policy("content-read", "read", true),
            update: context.standard_policy("content-update", "update", false),
            delete: context.standard_policy("content-delete", "delete", false),
        }
    }

    pub fn can_read(&self, auth: &Authentication, resource: &dyn Resource) -> Decision {
        self.read.evaluate(auth, resource)
    }

    pub fn can_update(&self, auth: &Authentication, resource: &dyn Resource) -> Decision {
        self.update.evaluate(auth, resource)
    }

    pub fn can_delete(&self, auth: &Authentication, resource: &dyn Resource) -> Decision {
        self.delete.evaluate(auth, resource)
    }

    /// Returns the policy guarding `operation`, if there is one.
    pub fn policy_for(&self, operation: &str) -> Option<&ResourcePolicy> {
        match operation {
            "read" => Some(&self.read),
            "update" => Some(&self.update),
            "delete" => Some(&self.delete),
            _ => None,
        }
    }
}
