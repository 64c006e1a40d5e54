/// Router-level tests for org content: events, prayers, announcements and
/// devotionals, driven only through the HTTP surface
mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use steeple::org::MemberRole;

async fn seed(app: &common::TestApp) {
    app.add_member("owner", MemberRole::Owner).await;
    app.add_member("alice", MemberRole::Member).await;
    app.add_member("bob", MemberRole::Member).await;
}

#[tokio::test]
async fn test_published_event_is_reminded_end_to_end() {
    let app = common::spawn().await;
    seed(&app).await;
    let owner = app.token("owner");
    let alice = app.token("alice");

    let (status, body) = app
        .post(
            "/events",
            Some(&owner),
            json!({
                "org_id": app.org_id,
                "title": "Choir practice",
                "location": "Fellowship hall",
                "start_at": "2024-06-02T14:30:00Z",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let event_id = body["event"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["event"]["created_by"], "owner");

    let (status, _) = app
        .post(&format!("/events/{}/rsvp", event_id), Some(&alice), json!({ "status": "yes" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post(
            "/functions/save_device_token",
            Some(&alice),
            json!({
                "org_id": app.org_id,
                "token": "ExponentPushToken[alice]",
                "platform": "ios",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .get(&format!("/events/{}", event_id), Some(&alice))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attendee_count"], 1);
    assert_eq!(body["user_rsvp"], "yes");

    let (status, body) = app
        .post(
            "/functions/event_reminder",
            Some(&app.service_key()),
            json!({ "invoked_at": "2024-06-02T14:00:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], 1);
    assert_eq!(app.gateway.sent_messages()[0].to, "ExponentPushToken[alice]");
}

#[tokio::test]
async fn test_event_publishing_rules() {
    let app = common::spawn().await;
    seed(&app).await;

    let (status, body) = app
        .post("/events", Some(&app.token("owner")), json!({ "org_id": app.org_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["required"], json!(["org_id", "title", "start_at"]));

    let (status, body) = app
        .post(
            "/events",
            Some(&app.token("owner")),
            json!({
                "org_id": app.org_id,
                "title": "Picnic",
                "start_at": "2024-06-02T14:30:00Z",
                "end_at": "2024-06-02T13:30:00Z",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "end_at must not be before start_at");

    let (status, _) = app
        .post(
            "/events",
            Some(&app.token("alice")),
            json!({ "org_id": app.org_id, "title": "Picnic", "start_at": "2024-06-02T14:30:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_events_list_is_ordered_and_member_only() {
    let app = common::spawn().await;
    seed(&app).await;
    let now = Utc::now();
    app.create_event("Sunday service", now + Duration::days(3)).await;
    app.create_event("Youth night", now + Duration::days(1)).await;

    let uri = format!("/events?org_id={}", app.org_id);
    let (status, body) = app.get(&uri, Some(&app.token("bob"))).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Youth night", "Sunday service"]);

    let (status, _) = app.get(&uri, Some(&app.token("stranger"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/events/missing", Some(&app.token("bob"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Event not found");
}

#[tokio::test]
async fn test_prayer_wall() {
    let app = common::spawn().await;
    seed(&app).await;
    let alice = app.token("alice");
    let bob = app.token("bob");

    let (status, body) = app
        .post(
            "/prayers",
            Some(&alice),
            json!({ "org_id": app.org_id, "body": "  Pray for my new job  ", "is_anonymous": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let prayer_id = body["prayer"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["prayer"]["body"], "Pray for my new job");
    assert!(body["prayer"]["author_id"].is_null());

    let reactions_uri = format!("/prayers/{}/reactions", prayer_id);
    let (status, body) = app.post(&reactions_uri, Some(&bob), json!({ "emoji": "🙏" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reactions"], json!([{ "emoji": "🙏", "user_id": "bob" }]));

    let (_, body) = app
        .get(&format!("/prayers?org_id={}", app.org_id), Some(&alice))
        .await;
    assert_eq!(body["prayers"][0]["reaction_count"], 1);

    // Same emoji again takes the reaction back
    let (_, body) = app.post(&reactions_uri, Some(&bob), json!({ "emoji": "🙏" })).await;
    assert_eq!(body["reactions"], json!([]));

    let (status, body) = app
        .get(&format!("/prayers/{}", prayer_id), Some(&bob))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_anonymous"], true);
    assert_eq!(body["reactions"], json!([]));

    let (status, body) = app
        .post("/prayers", Some(&alice), json!({ "org_id": app.org_id, "body": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["required"], json!(["org_id", "body"]));
}

#[tokio::test]
async fn test_hidden_prayer_disappears() {
    let app = common::spawn().await;
    seed(&app).await;
    let prayer_id = app.insert_prayer("Please pray for my family").await;
    sqlx::query("UPDATE prayers SET hidden_at = '2024-06-01T00:00:00.000Z' WHERE id = ?")
        .bind(&prayer_id)
        .execute(&app.ctx.db)
        .await
        .unwrap();
    let alice = app.token("alice");

    let (_, body) = app
        .get(&format!("/prayers?org_id={}", app.org_id), Some(&alice))
        .await;
    assert_eq!(body["prayers"], json!([]));

    let (status, body) = app
        .get(&format!("/prayers/{}", prayer_id), Some(&alice))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Prayer not found");

    let (status, _) = app
        .post(
            &format!("/prayers/{}/reactions", prayer_id),
            Some(&alice),
            json!({ "emoji": "🙏" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_published_announcement_is_listed_and_searchable() {
    let app = common::spawn().await;
    seed(&app).await;
    let owner = app.token("owner");
    let alice = app.token("alice");

    let (status, _) = app
        .post(
            "/announcements",
            Some(&alice),
            json!({ "org_id": app.org_id, "title": "Hi", "body": "Members cannot publish" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/announcements",
            Some(&owner),
            json!({
                "org_id": app.org_id,
                "title": "Potluck Sunday",
                "body": "Bring a casserole to the fellowship hall",
                "pinned": true,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let announcement_id = body["announcement"]["id"].as_str().unwrap().to_string();

    let scheduled = (Utc::now() + Duration::days(1)).to_rfc3339();
    let (status, _) = app
        .post(
            "/announcements",
            Some(&owner),
            json!({
                "org_id": app.org_id,
                "title": "Next week",
                "body": "Not yet",
                "published_at": scheduled,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .get(&format!("/announcements?org_id={}", app.org_id), Some(&alice))
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["announcements"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], announcement_id.as_str());
    assert_eq!(listed[0]["pinned"], true);

    let (status, body) = app
        .get(
            &format!("/functions/search?q=casserole&org_id={}", app.org_id),
            Some(&alice),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["results"][0]["id"], announcement_id.as_str());

    let (status, body) = app
        .get(&format!("/announcements/{}", announcement_id), Some(&alice))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["announcement"]["title"], "Potluck Sunday");
}

#[tokio::test]
async fn test_latest_devotional() {
    let app = common::spawn().await;
    seed(&app).await;
    let owner = app.token("owner");
    let alice = app.token("alice");
    let uri = format!("/devotionals/latest?org_id={}", app.org_id);

    let (status, body) = app.get(&uri, Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["devotional"].is_null());

    for (title, published_at) in [
        ("Be still", Utc::now() - Duration::days(1)),
        ("Today's word", Utc::now() - Duration::minutes(5)),
    ] {
        let (status, _) = app
            .post(
                "/devotionals",
                Some(&owner),
                json!({
                    "org_id": app.org_id,
                    "title": title,
                    "body": "Read and reflect",
                    "scripture_reference": "Psalm 46:10",
                    "published_at": published_at.to_rfc3339(),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app.get(&uri, Some(&alice)).await;
    assert_eq!(body["devotional"]["title"], "Today's word");
    assert_eq!(body["devotional"]["scripture_reference"], "Psalm 46:10");
}
