/// Reminder notification text
use crate::events::UpcomingEvent;
use crate::push::PushMessage;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;

const FALLBACK_ORG_NAME: &str = "Your community";

/// Render a start time as `h:mm AM` in the org's zone.
///
/// Unknown or missing zones fall back to UTC.
pub fn format_event_time(start_at: DateTime<Utc>, timezone: Option<&str>) -> String {
    const FORMAT: &str = "%-I:%M %p";

    match timezone.and_then(|name| name.parse::<Tz>().ok()) {
        Some(tz) => start_at.with_timezone(&tz).format(FORMAT).to_string(),
        None => {
            if let Some(name) = timezone {
                tracing::debug!(timezone = name, "unknown org timezone, using UTC");
            }
            start_at.format(FORMAT).to_string()
        }
    }
}

/// One message per token, all carrying the same text and deep link
pub fn reminder_messages(
    event: &UpcomingEvent,
    tokens: &[String],
    window_minutes: i64,
    deep_link_scheme: &str,
) -> Vec<PushMessage> {
    let org_name = event.org_name.as_deref().unwrap_or(FALLBACK_ORG_NAME);
    let title = format!("{} • {} minute reminder", event.title, window_minutes);
    let body = format!(
        "{}: {} begins at {}",
        org_name,
        event.title,
        format_event_time(event.start_at, event.org_timezone.as_deref())
    );
    let data = json!({
        "type": "event",
        "event_id": event.id,
        "org_id": event.org_id,
        "url": format!("{}://event/{}", deep_link_scheme, event.id),
    });

    tokens
        .iter()
        .map(|token| PushMessage {
            to: token.clone(),
            title: Some(title.clone()),
            body: Some(body.clone()),
            sound: Some("default".to_string()),
            data: Some(data.clone()),
        })
        .collect()
}
