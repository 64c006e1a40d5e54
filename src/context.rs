/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    content::{AnnouncementStore, DevotionalStore, PrayerStore},
    db,
    error::SteepleResult,
    events::EventStore,
    impersonation::{ImpersonationService, MagicLinkManager},
    moderation::{AuditLog, ModerationService, ReportManager},
    notifications::{DeviceTokenManager, PreferencesManager},
    org::MembershipManager,
    push::{ExpoGateway, MemoryGateway, PushGateway},
    rate_limit::RateLimiter,
    reminders::{PushTicketStore, ReceiptReconciler, ReminderDispatcher},
    search::SearchService,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub memberships: Arc<MembershipManager>,
    // Content
    pub events: Arc<EventStore>,
    pub prayers: Arc<PrayerStore>,
    pub announcements: Arc<AnnouncementStore>,
    pub devotionals: Arc<DevotionalStore>,
    // Moderation
    pub reports: Arc<ReportManager>,
    pub audit: Arc<AuditLog>,
    pub moderation: Arc<ModerationService>,
    pub impersonation: Arc<ImpersonationService>,
    pub magic_links: Arc<MagicLinkManager>,
    // Notifications
    pub devices: Arc<DeviceTokenManager>,
    pub preferences: Arc<PreferencesManager>,
    pub dispatcher: Arc<ReminderDispatcher>,
    pub reconciler: Arc<ReceiptReconciler>,
    pub push_tickets: Arc<PushTicketStore>,
    pub push: Arc<dyn PushGateway>,
    pub search: Arc<SearchService>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> SteepleResult<Self> {
        config.validate()?;

        let db = db::create_pool(
            &config.storage.database_path,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let push: Arc<dyn PushGateway> = if config.push.dry_run {
            tracing::warn!("Push dry run enabled - notifications are logged, not delivered");
            Arc::new(MemoryGateway::new())
        } else {
            Arc::new(ExpoGateway::new(&config.push)?)
        };

        Ok(Self::with_pool(config, db, push))
    }

    /// Wire every service onto an existing pool and gateway
    pub fn with_pool(config: ServerConfig, db: SqlitePool, push: Arc<dyn PushGateway>) -> Self {
        let memberships = MembershipManager::new(db.clone());
        let reports = ReportManager::new(db.clone());
        let audit = AuditLog::new(db.clone());
        let magic_links = MagicLinkManager::new(db.clone());
        let devices = DeviceTokenManager::new(db.clone());
        let preferences = PreferencesManager::new(db.clone());
        let events = EventStore::new(db.clone());

        let moderation = ModerationService::new(reports.clone(), audit.clone());
        let impersonation = ImpersonationService::new(
            memberships.clone(),
            magic_links.clone(),
            audit.clone(),
            config.authentication.clone(),
            config.service.public_url.clone(),
        );
        let dispatcher = ReminderDispatcher::new(
            events.clone(),
            devices.clone(),
            preferences.clone(),
            push.clone(),
            config.push.batch_size,
            config.push.deep_link_scheme.clone(),
        );
        let reconciler = ReceiptReconciler::new(devices.clone(), push.clone());
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            memberships: Arc::new(memberships),
            reports: Arc::new(reports),
            audit: Arc::new(audit),
            moderation: Arc::new(moderation),
            impersonation: Arc::new(impersonation),
            magic_links: Arc::new(magic_links),
            devices: Arc::new(devices),
            preferences: Arc::new(preferences),
            events: Arc::new(events),
            prayers: Arc::new(PrayerStore::new(db.clone())),
            announcements: Arc::new(AnnouncementStore::new(db.clone())),
            devotionals: Arc::new(DevotionalStore::new(db.clone())),
            dispatcher: Arc::new(dispatcher),
            reconciler: Arc::new(reconciler),
            push_tickets: Arc::new(PushTicketStore::new(db.clone())),
            search: Arc::new(SearchService::new(db.clone())),
            push,
            rate_limiter: Arc::new(rate_limiter),
            config: Arc::new(config),
            db,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.public_url
    }
}
