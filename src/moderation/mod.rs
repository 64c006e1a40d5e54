/// Content moderation
///
/// Reports filed by members, the staff action state machine, and the audit
/// trail every staff action writes to.
pub mod audit;
pub mod reports;
pub mod service;

pub use audit::{AdminAction, AuditLog, NewAdminAction};
pub use reports::{NewReport, Report, ReportAction, ReportManager, ReportStatus, TargetType};
pub use service::{ModerationRequest, ModerationService};
