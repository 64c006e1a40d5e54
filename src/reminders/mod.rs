/// Event reminder fan-out
///
/// Finds events starting `window_minutes` from the invocation instant,
/// resolves every eligible device token and submits one push message per
/// token. Delivery receipts are reconciled separately in [`receipts`].

pub mod message;
pub mod receipts;

pub use receipts::{PushTicketStore, ReceiptDescriptor, ReceiptReconciler, ReconcileReport};

use crate::{
    error::{StorageContext, SteepleError, SteepleResult},
    events::{EventStore, UpcomingEvent},
    notifications::{ActiveToken, DeviceTokenManager, PreferencesManager},
    push::{self, PushGateway, PushMessage, PushTicket},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Why an event produced no messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoRsvps,
    NoTokens,
}

/// Per-event outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventNotification {
    pub event_id: String,
    pub org_id: String,
    pub tokens: usize,
    pub sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<SkipReason>,
}

impl EventNotification {
    fn skipped(event: &UpcomingEvent, reason: SkipReason) -> Self {
        Self {
            event_id: event.id.clone(),
            org_id: event.org_id.clone(),
            tokens: 0,
            sent: 0,
            skipped_reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub events: Vec<EventNotification>,
    /// Submitted messages; `tickets[i]` acknowledges `messages[i]`
    pub messages: Vec<PushMessage>,
    pub tickets: Vec<PushTicket>,
}

impl DispatchReport {
    /// Ticket ids paired with the token and event they were issued for
    pub fn ticketed_tokens(&self) -> Vec<receipts::TicketRecord> {
        self.messages
            .iter()
            .zip(&self.tickets)
            .filter_map(|(message, ticket)| {
                let ticket_id = ticket.id.clone()?;
                let event_id = message
                    .data
                    .as_ref()
                    .and_then(|d| d.get("event_id"))
                    .and_then(|v| v.as_str())
                    .map(String::from);
                Some(receipts::TicketRecord {
                    ticket_id,
                    token: message.to.clone(),
                    event_id,
                })
            })
            .collect()
    }
}

/// Reminder dispatcher
#[derive(Clone)]
pub struct ReminderDispatcher {
    events: EventStore,
    devices: DeviceTokenManager,
    preferences: PreferencesManager,
    push: Arc<dyn PushGateway>,
    batch_size: usize,
    deep_link_scheme: String,
}

/// Half-width of the matching window around the target instant
const WINDOW_SLACK_MINUTES: i64 = 1;

/// Largest lead time a reminder can be requested for (one day)
pub const MAX_WINDOW_MINUTES: i64 = 1440;

/// Start-time range of the events one dispatch covers, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReminderWindow {
    /// `[target - 1 min, target + 1 min]` where target is `window_minutes` after `invoked_at`
    pub fn around(invoked_at: DateTime<Utc>, window_minutes: i64) -> SteepleResult<Self> {
        if !(1..=MAX_WINDOW_MINUTES).contains(&window_minutes) {
            return Err(SteepleError::invalid("Invalid window_minutes"));
        }

        let slack = Duration::minutes(WINDOW_SLACK_MINUTES);
        let target = invoked_at
            .checked_add_signed(Duration::minutes(window_minutes))
            .ok_or_else(|| SteepleError::invalid("Invalid invoked_at timestamp"))?;
        let start = target.checked_sub_signed(slack);
        let end = target.checked_add_signed(slack);

        match (start, end) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(SteepleError::invalid("Invalid invoked_at timestamp")),
        }
    }

    /// The window after one ending at `previous_end`.
    ///
    /// Starts one millisecond (the stored timestamp resolution) past the
    /// previous end so consecutive runs neither overlap nor leave a gap.
    /// Returns `None` when the clock has not moved past the previous window.
    pub fn following(
        previous_end: Option<DateTime<Utc>>,
        invoked_at: DateTime<Utc>,
        window_minutes: i64,
    ) -> SteepleResult<Option<Self>> {
        let nominal = Self::around(invoked_at, window_minutes)?;
        let Some(previous_end) = previous_end else {
            return Ok(Some(nominal));
        };

        if nominal.end <= previous_end {
            return Ok(None);
        }

        Ok(Some(Self {
            start: previous_end + Duration::milliseconds(1),
            end: nominal.end,
        }))
    }
}

impl ReminderDispatcher {
    pub fn new(
        events: EventStore,
        devices: DeviceTokenManager,
        preferences: PreferencesManager,
        push: Arc<dyn PushGateway>,
        batch_size: usize,
        deep_link_scheme: impl Into<String>,
    ) -> Self {
        Self {
            events,
            devices,
            preferences,
            push,
            batch_size,
            deep_link_scheme: deep_link_scheme.into(),
        }
    }

    /// Remind attendees of events starting `window_minutes` after `invoked_at`
    pub async fn dispatch(
        &self,
        invoked_at: DateTime<Utc>,
        window_minutes: i64,
    ) -> SteepleResult<DispatchReport> {
        let window = ReminderWindow::around(invoked_at, window_minutes)?;
        self.dispatch_window(window, window_minutes).await
    }

    pub async fn dispatch_window(
        &self,
        window: ReminderWindow,
        window_minutes: i64,
    ) -> SteepleResult<DispatchReport> {
        let ReminderWindow {
            start: window_start,
            end: window_end,
        } = window;

        let upcoming = self
            .events
            .events_starting_between(window_start, window_end)
            .await
            .storage_context("events.select", "Failed to load events")?;

        let mut notifications = Vec::with_capacity(upcoming.len());
        let mut messages = Vec::new();

        for event in &upcoming {
            let Some(tokens) = self.eligible_tokens(event, &mut notifications).await else {
                continue;
            };

            messages.extend(message::reminder_messages(
                event,
                &tokens,
                window_minutes,
                &self.deep_link_scheme,
            ));
            notifications.push(EventNotification {
                event_id: event.id.clone(),
                org_id: event.org_id.clone(),
                tokens: tokens.len(),
                sent: tokens.len(),
                skipped_reason: None,
            });
        }

        let tickets = push::send_all(self.push.as_ref(), &messages, self.batch_size).await?;

        tracing::info!(
            window_start = %window_start,
            window_end = %window_end,
            events = notifications.len(),
            messages = messages.len(),
            tickets = tickets.len(),
            "event reminders dispatched"
        );

        Ok(DispatchReport {
            window_start,
            window_end,
            events: notifications,
            messages,
            tickets,
        })
    }

    /// Deduplicated tokens to notify for `event`.
    ///
    /// Returns `None` when the event yields nothing to send; a skip entry is
    /// pushed for empty audiences, while lookup failures are only logged.
    async fn eligible_tokens(
        &self,
        event: &UpcomingEvent,
        notifications: &mut Vec<EventNotification>,
    ) -> Option<Vec<String>> {
        let attendees = match self.events.confirmed_attendees(&event.id).await {
            Ok(attendees) => attendees,
            Err(e) => {
                tracing::error!(operation = "rsvps.select", event_id = %event.id, error = %e, "skipping event");
                return None;
            }
        };

        if attendees.is_empty() {
            notifications.push(EventNotification::skipped(event, SkipReason::NoRsvps));
            return None;
        }

        let lookup = tokio::try_join!(
            self.devices.active_tokens_for(&event.org_id, &attendees),
            self.preferences.event_opt_outs(&event.org_id, &attendees),
        );
        let (tokens, opted_out) = match lookup {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(
                    operation = "device_tokens.select",
                    event_id = %event.id,
                    error = %e,
                    "skipping event"
                );
                return None;
            }
        };

        let unique = select_tokens(tokens, &opted_out);
        if unique.is_empty() {
            notifications.push(EventNotification::skipped(event, SkipReason::NoTokens));
            return None;
        }

        Some(unique)
    }
}

/// Drop opted-out users and repeated token values, keeping first-seen order
pub fn select_tokens(tokens: Vec<ActiveToken>, opted_out: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|t| !opted_out.contains(&t.user_id))
        .filter(|t| seen.insert(t.token.clone()))
        .map(|t| t.token)
        .collect()
}
