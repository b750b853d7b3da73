//! Attribute types for policy evaluation.
//!
//! Two attribute categories drive access decisions:
//! - **Requester attributes**: who is asking, and from where ([`Authentication`])
//! - **Resource attributes**: who owns the target and how visible it is ([`Resource`])

use serde::{Deserialize, Serialize};
use warden_types::EntityId;

// ============================================================================
// Authentication
// ============================================================================

/// The caller's view of the requester.
///
/// `user_id` is `None` for anonymous requests. The remaining fields are
/// carried through to the audit trail and never consulted by rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    pub user_id: Option<EntityId>,
    /// Snapshot of the user record, if the caller loaded one. Opaque to rules.
    pub user: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl Authentication {
    /// An unauthenticated request.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated request by `user_id`.
    pub fn user(user_id: impl Into<EntityId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, user: serde_json::Value) -> Self {
        self.user = Some(user);
        self
    }

    /// Sets the IP address.
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// Who a resource is shown to before any other rule applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Anyone, listed.
    Public,
    /// Anyone with the link, not listed.
    Unlisted,
    /// The owner's friends.
    Friends,
    /// The owner and those with elevated access.
    #[default]
    Private,
}

impl Visibility {
    /// Returns true for visibilities that need no identity at all.
    pub fn is_unrestricted(self) -> bool {
        matches!(self, Self::Public | Self::Unlisted)
    }
}

// ============================================================================
// Resource
// ============================================================================

/// The attributes a resource exposes to policies.
pub trait Resource {
    fn id(&self) -> &str;

    /// The owning entity, if the resource has one.
    fn owner_id(&self) -> Option<&EntityId>;

    fn visibility(&self) -> Visibility;
}

/// Plain resource snapshot for callers without their own resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAttributes {
    pub id: String,
    pub owner_id: Option<EntityId>,
    pub visibility: Visibility,
}

impl ResourceAttributes {
    /// Creates a private, unowned resource.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            owner_id: None,
            visibility: Visibility::Private,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<EntityId>) -> Self {
        self.owner_id = Some(owner.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

impl Resource for ResourceAttributes {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&EntityId> {
        self.owner_id.as_ref()
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_builders() {
        let auth = Authentication::user("u-1")
            .with_ip("10.0.0.1")
            .with_user_agent("curl/8")
            .with_request_id("req-9");

        assert!(auth.is_authenticated());
        assert_eq!(auth.user_id, Some(EntityId::new("u-1")));
        assert_eq!(auth.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(auth.request_id.as_deref(), Some("req-9"));
        assert!(!Authentication::anonymous().is_authenticated());
    }

    #[test]
    fn test_visibility_serde_and_default() {
        assert_eq!(Visibility::default(), Visibility::Private);
        assert_eq!(
            serde_json::to_string(&Visibility::Unlisted).unwrap(),
            "\"UNLISTED\""
        );
        assert!(Visibility::Public.is_unrestricted());
        assert!(!Visibility::Friends.is_unrestricted());
    }

    #[test]
    fn test_resource_attributes() {
        let doc = ResourceAttributes::new("doc-1")
            .owned_by("alice")
            .with_visibility(Visibility::Friends);

        assert_eq!(doc.id(), "doc-1");
        assert_eq!(doc.owner_id(), Some(&EntityId::new("alice")));
        assert_eq!(doc.visibility(), Visibility::Friends);
    }
}
