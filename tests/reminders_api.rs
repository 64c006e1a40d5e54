/// Router-level tests for reminder dispatch and receipt reconciliation
mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use steeple::{
    notifications::PreferencesPatch,
    org::MemberRole,
    push::{DeliveryStatus, PushReceipt},
};

const INVOKED_AT: &str = "2024-06-02T14:00:00Z";

fn window_start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 2, 14, 30, 0).unwrap()
}

#[tokio::test]
async fn test_requires_service_key() {
    let app = common::spawn().await;

    let (status, _) = app
        .post("/functions/event_reminder", None, json!({}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let member = app.token("member");
    let (status, _) = app
        .post("/functions/event_reminder", Some(&member), json!({}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_invoked_at() {
    let app = common::spawn().await;
    let key = app.service_key();

    let (status, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": "next tuesday" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid invoked_at timestamp");
}

#[tokio::test]
async fn test_out_of_range_window_minutes() {
    let app = common::spawn().await;
    let key = app.service_key();

    for window_minutes in [json!(9_000_000_000_000_000i64), json!(0), json!(-30), json!(1441)] {
        let (status, body) = app
            .post(
                "/functions/event_reminder",
                Some(&key),
                json!({ "window_minutes": window_minutes, "invoked_at": INVOKED_AT }),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid window_minutes");
    }
    assert!(app.gateway.sent_batches().is_empty());
}

#[tokio::test]
async fn test_empty_body_uses_defaults() {
    let app = common::spawn().await;
    let key = app.service_key();

    let (status, body) = app
        .request(Method::POST, "/functions/event_reminder", Some(&key), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], 0);
    assert!(app.gateway.sent_batches().is_empty());
}

#[tokio::test]
async fn test_event_without_rsvps_is_skipped() {
    let app = common::spawn().await;
    let event_id = app.create_event("Bible study", window_start()).await;
    let key = app.service_key();

    let (status, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], 0);
    assert_eq!(body["events"][0]["event_id"], event_id.as_str());
    assert_eq!(body["events"][0]["skipped_reason"], "no_rsvps");
    assert_eq!(body["events"][0]["sent"], 0);
}

#[tokio::test]
async fn test_reminder_message_content() {
    let app = common::spawn().await;
    app.add_member("alice", MemberRole::Member).await;
    let event_id = app.create_event("Bible study", window_start()).await;
    app.rsvp_yes(&event_id, "alice").await;
    app.register_device("alice", "ExponentPushToken[alice]").await;
    let key = app.service_key();

    let (status, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], 1);
    assert_eq!(body["tickets"][0]["status"], "ok");
    assert_eq!(body["events"][0]["sent"], 1);

    let sent = app.gateway.sent_messages();
    assert_eq!(sent[0].to, "ExponentPushToken[alice]");
    assert_eq!(sent[0].title.as_deref(), Some("Bible study • 30 minute reminder"));
    // 14:30 UTC is 9:30 AM in Chicago during daylight time
    assert_eq!(
        sent[0].body.as_deref(),
        Some("Grace Chapel: Bible study begins at 9:30 AM")
    );
    let data = sent[0].data.as_ref().unwrap();
    assert_eq!(data["url"], format!("myapp://event/{}", event_id));
}

#[tokio::test]
async fn test_window_minutes_changes_target_and_title() {
    let app = common::spawn().await;
    app.add_member("alice", MemberRole::Member).await;
    let event_id = app
        .create_event("Choir", Utc.with_ymd_and_hms(2024, 6, 2, 15, 0, 0).unwrap())
        .await;
    app.rsvp_yes(&event_id, "alice").await;
    app.register_device("alice", "ExponentPushToken[alice]").await;
    let key = app.service_key();

    let (_, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT, "window_minutes": 60 }),
        )
        .await;

    assert_eq!(body["messages"], 1);
    let sent = app.gateway.sent_messages();
    assert_eq!(sent[0].title.as_deref(), Some("Choir • 60 minute reminder"));
}

#[tokio::test]
async fn test_shared_token_gets_one_message() {
    let app = common::spawn().await;
    app.add_member("alice", MemberRole::Member).await;
    app.add_member("bob", MemberRole::Member).await;
    let event_id = app.create_event("Potluck", window_start()).await;
    app.rsvp_yes(&event_id, "alice").await;
    app.rsvp_yes(&event_id, "bob").await;
    app.register_device("alice", "ExponentPushToken[tablet]").await;
    app.register_device("bob", "ExponentPushToken[tablet]").await;
    let key = app.service_key();

    let (_, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT }),
        )
        .await;

    assert_eq!(body["messages"], 1);
    assert_eq!(body["events"][0]["tokens"], 1);
    assert_eq!(app.gateway.sent_messages().len(), 1);
}

#[tokio::test]
async fn test_opted_out_member_is_excluded() {
    let app = common::spawn().await;
    app.add_member("alice", MemberRole::Member).await;
    let event_id = app.create_event("Retreat", window_start()).await;
    app.rsvp_yes(&event_id, "alice").await;
    app.register_device("alice", "ExponentPushToken[alice]").await;
    app.ctx
        .preferences
        .upsert(
            &app.org_id,
            "alice",
            PreferencesPatch {
                events: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let key = app.service_key();

    let (_, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT }),
        )
        .await;

    assert_eq!(body["messages"], 0);
    assert_eq!(body["events"][0]["skipped_reason"], "no_tokens");
    assert!(app.gateway.sent_messages().is_empty());
}

#[tokio::test]
async fn test_batches_never_exceed_gateway_limit() {
    let app = common::spawn().await;
    let event_id = app.create_event("Conference", window_start()).await;
    for i in 0..181 {
        let user = format!("user-{}", i);
        app.add_member(&user, MemberRole::Member).await;
        app.rsvp_yes(&event_id, &user).await;
        app.register_device(&user, &format!("ExponentPushToken[{}]", i)).await;
    }
    let key = app.service_key();

    let (status, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], 181);
    let sizes: Vec<usize> = app.gateway.sent_batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![90, 90, 1]);
}

#[tokio::test]
async fn test_gateway_failure_is_bad_gateway() {
    let app = common::spawn().await;
    app.add_member("alice", MemberRole::Member).await;
    let event_id = app.create_event("Vigil", window_start()).await;
    app.rsvp_yes(&event_id, "alice").await;
    app.register_device("alice", "ExponentPushToken[alice]").await;
    app.gateway.fail_sends("Push send failed");
    let key = app.service_key();

    let (status, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Push send failed");
}

#[tokio::test]
async fn test_events_outside_window_are_ignored() {
    let app = common::spawn().await;
    app.create_event("Too late", window_start() + Duration::minutes(2)).await;
    let key = app.service_key();

    let (_, body) = app
        .post(
            "/functions/event_reminder",
            Some(&key),
            json!({ "invoked_at": INVOKED_AT }),
        )
        .await;

    assert!(body["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_receipts_disable_only_unregistered_devices() {
    let app = common::spawn().await;
    app.add_member("alice", MemberRole::Member).await;
    app.add_member("bob", MemberRole::Member).await;
    app.register_device("alice", "ExponentPushToken[alice]").await;
    app.register_device("bob", "ExponentPushToken[bob]").await;

    app.gateway.set_receipt(
        "t-1",
        PushReceipt {
            status: DeliveryStatus::Error,
            message: Some("gone".to_string()),
            details: Some(json!({ "error": "DeviceNotRegistered" })),
        },
    );
    app.gateway.set_receipt(
        "t-2",
        PushReceipt {
            status: DeliveryStatus::Error,
            message: Some("too big".to_string()),
            details: Some(json!({ "error": "MessageTooBig" })),
        },
    );
    let key = app.service_key();

    let (status, body) = app
        .post(
            "/functions/push_receipts",
            Some(&key),
            json!({
                "receipts": [
                    { "id": "t-1", "token": "ExponentPushToken[alice]" },
                    { "id": "t-2", "token": "ExponentPushToken[bob]" },
                    { "id": "t-3", "token": "ExponentPushToken[bob]" },
                    { "id": "t-4" },
                ]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 3);
    assert_eq!(body["disabled_tokens"], json!(["ExponentPushToken[alice]"]));
    assert_eq!(body["receipts"][2]["status"], "missing");

    let live = app
        .ctx
        .devices
        .active_tokens_for(&app.org_id, &["alice".to_string(), "bob".to_string()])
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].user_id, "bob");
}

#[tokio::test]
async fn test_empty_receipts_skip_the_gateway() {
    let app = common::spawn().await;
    let key = app.service_key();

    let (status, body) = app
        .post("/functions/push_receipts", Some(&key), json!({ "receipts": [] }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "processed": 0, "disabled_tokens": [] }));
    assert!(app.gateway.receipt_requests().is_empty());
}
