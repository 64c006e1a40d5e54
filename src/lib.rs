//! Steeple - community engagement backend
//!
//! Moderation of member reports, staff impersonation links, event reminder
//! push notifications with receipt reconciliation, device and preference
//! registration, org content (events, prayers, announcements, devotionals)
//! and ranked full-text search over it.

pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod impersonation;
pub mod jobs;
pub mod metrics;
pub mod moderation;
pub mod notifications;
pub mod org;
pub mod policy;
pub mod push;
pub mod rate_limit;
pub mod reminders;
pub mod search;
pub mod server;

pub use context::AppContext;
pub use error::{SteepleError, SteepleResult};
