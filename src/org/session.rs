/// Per-request org session
use super::{MemberRole, MembershipManager};
use crate::{
    auth::AuthContext,
    error::{StorageContext, SteepleResult},
    policy::{self, Action},
};

/// An authenticated caller acting inside one organization.
///
/// Built once per request after the policy check and passed explicitly to
/// every data-access call that needs the caller's identity or org.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgSession {
    pub user_id: String,
    pub org_id: String,
    pub role: MemberRole,
}

impl OrgSession {
    /// Resolve the caller's membership in `org_id` and authorize `action`
    pub async fn establish(
        memberships: &MembershipManager,
        auth: &AuthContext,
        org_id: &str,
        action: Action,
    ) -> SteepleResult<Self> {
        let membership = memberships
            .get_membership(org_id, &auth.user_id)
            .await
            .storage_context("organization_members.select", "Failed to verify membership")?;

        policy::authorize(membership.as_ref(), action)?;

        Ok(OrgSession {
            user_id: auth.user_id.clone(),
            org_id: org_id.to_string(),
            role: membership.map(|m| m.role).unwrap_or(MemberRole::Member),
        })
    }
}
