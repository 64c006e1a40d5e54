/// Moderation endpoints
use super::{org_session, require_fields, JsonBody};
use crate::{
    auth::Credentials,
    context::AppContext,
    error::{StorageContext, SteepleResult},
    metrics,
    moderation::{ModerationRequest, NewReport, Report, ReportAction, ReportStatus, TargetType},
    policy::Action,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/functions/report_action", post(report_action))
        .route("/reports", get(list_reports).post(submit_report))
        .route("/admin_actions", get(list_admin_actions))
}

#[derive(Debug, Deserialize)]
struct ReportActionPayload {
    org_id: Option<String>,
    report_id: Option<String>,
    action: Option<String>,
    hide_target: Option<bool>,
    resolution_note: Option<String>,
}

/// Report fields returned after an action
#[derive(Debug, Serialize)]
struct ReportSummary {
    id: String,
    status: ReportStatus,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolution_note: Option<String>,
    hidden_at: Option<DateTime<Utc>>,
    target_type: TargetType,
    target_id: String,
}

impl From<Report> for ReportSummary {
    fn from(report: Report) -> Self {
        Self {
            id: report.id,
            status: report.status,
            resolved_at: report.resolved_at,
            resolved_by: report.resolved_by,
            resolution_note: report.resolution_note,
            hidden_at: report.hidden_at,
            target_type: report.target_type,
            target_id: report.target_id,
        }
    }
}

/// Resolve, dismiss or reopen a report
async fn report_action(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<ReportActionPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(
        &[
            payload.org_id.as_deref(),
            payload.report_id.as_deref(),
            payload.action.as_deref(),
        ],
        &["org_id", "report_id", "action"],
    )?;
    let org_id = payload.org_id.unwrap_or_default();
    let action: ReportAction = payload.action.as_deref().unwrap_or_default().parse()?;

    let session = org_session(&ctx, &credentials, &org_id, Action::ModerateReport).await?;

    let report = ctx
        .moderation
        .act(
            &session,
            ModerationRequest {
                report_id: payload.report_id.unwrap_or_default(),
                action,
                hide_target: payload.hide_target,
                resolution_note: payload.resolution_note,
            },
        )
        .await?;

    Ok(Json(json!({
        "status": "ok",
        "report": ReportSummary::from(report),
    })))
}

#[derive(Debug, Deserialize)]
struct SubmitReportPayload {
    org_id: Option<String>,
    target_type: Option<String>,
    target_id: Option<String>,
    reason: Option<String>,
    details: Option<Value>,
}

/// File a report against content or a member
async fn submit_report(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<SubmitReportPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(
        &[
            payload.org_id.as_deref(),
            payload.target_type.as_deref(),
            payload.target_id.as_deref(),
            payload.reason.as_deref(),
        ],
        &["org_id", "target_type", "target_id", "reason"],
    )?;
    let org_id = payload.org_id.unwrap_or_default();
    let target_type: TargetType = payload.target_type.as_deref().unwrap_or_default().parse()?;

    let session = org_session(&ctx, &credentials, &org_id, Action::SubmitReport).await?;

    let report = ctx
        .reports
        .submit_report(
            &session.org_id,
            &session.user_id,
            NewReport {
                target_type,
                target_id: payload.target_id.unwrap_or_default(),
                reason: payload.reason.unwrap_or_default(),
                details: payload.details,
            },
        )
        .await
        .storage_context("reports.insert", "Failed to submit report")?;

    metrics::record_report_created(target_type.as_str());
    tracing::info!(report_id = %report.id, org_id = %report.org_id, "report submitted");

    Ok(Json(json!({ "status": "ok", "report": report })))
}

#[derive(Debug, Deserialize)]
struct ListReportsQuery {
    org_id: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
}

/// Staff view of the org's reports; defaults to the open queue
async fn list_reports(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(query): Query<ListReportsQuery>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[query.org_id.as_deref()], &["org_id"])?;
    let statuses = match query.status.as_deref() {
        Some(status) => vec![status.parse::<ReportStatus>()?],
        None => ReportStatus::queue().to_vec(),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let org_id = query.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::ListReports).await?;

    let reports = ctx
        .reports
        .list_reports(&session.org_id, &statuses, limit)
        .await
        .storage_context("reports.select", "Failed to load reports")?;

    Ok(Json(json!({ "reports": reports })))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    org_id: Option<String>,
    limit: Option<i64>,
}

/// Staff view of the org's audit trail, newest first
async fn list_admin_actions(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(query): Query<AuditQuery>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[query.org_id.as_deref()], &["org_id"])?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let org_id = query.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::ViewAuditLog).await?;

    let actions = ctx
        .audit
        .list_for_org(&session.org_id, limit)
        .await
        .storage_context("admin_actions.select", "Failed to load audit log")?;

    Ok(Json(json!({ "admin_actions": actions })))
}
