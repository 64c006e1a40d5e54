//! Shared setup for router-level tests
#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use steeple::{
    auth::issue_access_token,
    config::ServerConfig,
    db::create_memory_pool,
    events::{NewEvent, RsvpStatus},
    notifications::Platform,
    org::{MemberRole, MemberStatus},
    push::MemoryGateway,
    server::build_router,
    AppContext,
};
use tower::ServiceExt;

pub struct TestApp {
    pub ctx: AppContext,
    pub gateway: Arc<MemoryGateway>,
    pub router: Router,
    pub org_id: String,
}

pub async fn spawn() -> TestApp {
    let pool = create_memory_pool().await.unwrap();
    let gateway = Arc::new(MemoryGateway::new());
    let ctx = AppContext::with_pool(ServerConfig::development(), pool, gateway.clone());
    let org = ctx
        .memberships
        .create_organization("Grace Chapel", "grace", "America/Chicago")
        .await
        .unwrap();

    TestApp {
        router: build_router(ctx.clone()),
        ctx,
        gateway,
        org_id: org.id,
    }
}

impl TestApp {
    pub async fn add_member(&self, user_id: &str, role: MemberRole) {
        self.ctx
            .memberships
            .upsert_membership(&self.org_id, user_id, role, MemberStatus::Active)
            .await
            .unwrap();
    }

    pub fn token(&self, user_id: &str) -> String {
        issue_access_token(user_id, &self.ctx.config.authentication, None).unwrap()
    }

    pub fn service_key(&self) -> String {
        self.ctx.config.authentication.service_role_key.clone()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    pub async fn post(&self, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, bearer, Some(body)).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, bearer, None).await
    }

    pub async fn create_event(&self, title: &str, start_at: DateTime<Utc>) -> String {
        self.ctx
            .events
            .create_event(NewEvent {
                org_id: self.org_id.clone(),
                title: title.to_string(),
                description: None,
                location: None,
                start_at,
                end_at: None,
                capacity: None,
                created_by: "owner".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn rsvp_yes(&self, event_id: &str, user_id: &str) {
        self.ctx
            .events
            .upsert_rsvp(event_id, user_id, RsvpStatus::Yes, None)
            .await
            .unwrap();
    }

    pub async fn register_device(&self, user_id: &str, token: &str) {
        self.ctx
            .devices
            .upsert(&self.org_id, user_id, token, Platform::Ios, Utc::now())
            .await
            .unwrap();
    }

    /// Insert a prayer directly and return its id
    pub async fn insert_prayer(&self, body: &str) -> String {
        let id = steeple::db::new_id();
        sqlx::query(
            "INSERT INTO prayers (id, org_id, author_id, body, created_at) VALUES (?, ?, 'member', ?, ?)",
        )
        .bind(&id)
        .bind(&self.org_id)
        .bind(body)
        .bind(steeple::db::format_timestamp(Utc::now()))
        .execute(&self.ctx.db)
        .await
        .unwrap();
        id
    }

    pub async fn insert_announcement(&self, title: &str, body: &str) -> String {
        let id = steeple::db::new_id();
        let now = steeple::db::format_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO announcements (id, org_id, author_id, title, body, published_at, created_at) VALUES (?, ?, 'owner', ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&self.org_id)
        .bind(title)
        .bind(body)
        .bind(&now)
        .bind(&now)
        .execute(&self.ctx.db)
        .await
        .unwrap();
        id
    }

    pub async fn prayer_hidden_at(&self, prayer_id: &str) -> Option<String> {
        sqlx::query_scalar("SELECT hidden_at FROM prayers WHERE id = ?")
            .bind(prayer_id)
            .fetch_one(&self.ctx.db)
            .await
            .unwrap()
    }
}
