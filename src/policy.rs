/// Authorization policy
///
/// One table answers "may this membership perform this action". Handlers
/// call [`authorize`] instead of comparing roles inline.
use crate::error::{SteepleError, SteepleResult};
use crate::org::{MemberRole, Membership};

/// Operations that require an org membership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SubmitReport,
    ListReports,
    ModerateReport,
    Impersonate,
    RegisterDevice,
    UpdatePreferences,
    Search,
    Rsvp,
    ViewContent,
    PostPrayer,
    ReactToPrayer,
    PublishContent,
    ViewAuditLog,
}

impl Action {
    /// Roles allowed to perform the action, given an active membership
    pub fn allowed_roles(&self) -> &'static [MemberRole] {
        const STAFF: &[MemberRole] = &[MemberRole::Owner, MemberRole::Moderator];
        const ANY_MEMBER: &[MemberRole] =
            &[MemberRole::Owner, MemberRole::Moderator, MemberRole::Member];

        match self {
            Action::ListReports
            | Action::ModerateReport
            | Action::Impersonate
            | Action::PublishContent
            | Action::ViewAuditLog => STAFF,
            Action::SubmitReport
            | Action::RegisterDevice
            | Action::UpdatePreferences
            | Action::Search
            | Action::Rsvp
            | Action::ViewContent
            | Action::PostPrayer
            | Action::ReactToPrayer => ANY_MEMBER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SubmitReport => "report.submit",
            Action::ListReports => "report.list",
            Action::ModerateReport => "report.moderate",
            Action::Impersonate => "user.impersonate",
            Action::RegisterDevice => "device.register",
            Action::UpdatePreferences => "preferences.update",
            Action::Search => "content.search",
            Action::Rsvp => "event.rsvp",
            Action::ViewContent => "content.view",
            Action::PostPrayer => "prayer.post",
            Action::ReactToPrayer => "prayer.react",
            Action::PublishContent => "content.publish",
            Action::ViewAuditLog => "audit.view",
        }
    }
}

/// Decide whether `membership` may perform `action`.
///
/// Missing and non-active memberships are rejected before the role is
/// considered.
pub fn authorize(membership: Option<&Membership>, action: Action) -> SteepleResult<()> {
    let membership = match membership {
        Some(m) if m.is_active() => m,
        _ => return Err(SteepleError::Forbidden("Membership required".to_string())),
    };

    if !action.allowed_roles().contains(&membership.role) {
        tracing::warn!(
            user_id = %membership.user_id,
            org_id = %membership.org_id,
            role = membership.role.as_str(),
            action = action.as_str(),
            "policy denied action"
        );
        return Err(SteepleError::Forbidden("Insufficient permissions".to_string()));
    }

    Ok(())
}
