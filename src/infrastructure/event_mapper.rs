//! Raw per-source event shapes and their normalization into `CalendarEvent`.
//!
//! Normalization never fails loudly: a raw event that cannot be placed on the
//! requested day (missing or unparseable times, no id, cancelled, outside the
//! day) is dropped and logged at debug level so one bad upstream record cannot
//! block the rest of the page.

use crate::domain::models::{CalendarEvent, DayWindow, local_midnight};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const UNTITLED: &str = "(No title)";

/// Event as held by the on-device calendar store. The store flags all-day
/// events explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalStoreEvent {
    pub identifier: String,
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_all_day: bool,
    pub calendar_title: String,
    pub calendar_color: String,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RemoteEventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl RemoteEventDateTime {
    pub fn timed(instant: DateTime<Utc>, time_zone: Option<&str>) -> Self {
        Self {
            date_time: Some(instant.to_rfc3339()),
            date: None,
            time_zone: time_zone.map(ToOwned::to_owned),
        }
    }

    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date_time: None,
            date: Some(date.format("%Y-%m-%d").to_string()),
            time_zone: None,
        }
    }

    /// `dateTime` wins over `date`; a bare date is local midnight in `timezone`.
    pub fn resolve(&self, timezone: Tz) -> Option<DateTime<Utc>> {
        if let Some(value) = self.date_time.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            return DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc));
        }
        let value = self.date.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .map(|date| local_midnight(date, timezone))
    }
}

/// Event as returned by the remote calendar API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RemoteCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "htmlLink", skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<RemoteEventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<RemoteEventDateTime>,
}

/// Which remote calendar a batch of events came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCalendar {
    pub name: String,
    pub color_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Local(LocalStoreEvent),
    Remote {
        calendar: SourceCalendar,
        event: RemoteCalendarEvent,
    },
}

/// Decodes each record on its own. Records that do not match the expected
/// shape are dropped so the rest of the batch still reaches the normalizer.
pub fn decode_records<T: DeserializeOwned>(records: Vec<Value>, source: &str) -> Vec<T> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(position, record)| match serde_json::from_value(record) {
            Ok(event) => Some(event),
            Err(error) => {
                debug!(source, position, error = %error, "dropping malformed raw event");
                None
            }
        })
        .collect()
}

struct Resolved {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_all_day: bool,
    color_token: String,
    source_calendar_name: String,
    location: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct EventNormalizer {
    timezone: Tz,
}

impl EventNormalizer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn day_window(&self, date: NaiveDate) -> DayWindow {
        DayWindow::for_date(date, self.timezone)
    }

    /// Returns `None` when `raw` cannot be shown on the day `[day_start, day_end)`.
    pub fn normalize(
        &self,
        raw: &RawEvent,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Option<CalendarEvent> {
        let resolved = match raw {
            RawEvent::Local(event) => self.resolve_local(event),
            RawEvent::Remote { calendar, event } => self.resolve_remote(calendar, event),
        }?;

        if resolved.end < resolved.start {
            debug!(event_id = %resolved.id, "dropping event that ends before it starts");
            return None;
        }
        let intersects = resolved.start < day_end
            && (resolved.end > day_start || resolved.start >= day_start);
        if !intersects {
            return None;
        }
        if !resolved.is_all_day {
            let start_day = resolved.start.with_timezone(&self.timezone).date_naive();
            let requested_day = day_start.with_timezone(&self.timezone).date_naive();
            if start_day != requested_day {
                // Timed events only render on the day they begin.
                return None;
            }
        }

        Some(CalendarEvent {
            id: resolved.id,
            title: resolved.title,
            start_date: resolved.start.max(day_start),
            end_date: resolved.end.min(day_end),
            is_all_day: resolved.is_all_day,
            color_token: resolved.color_token,
            source_calendar_name: resolved.source_calendar_name,
            location: resolved.location,
            notes: resolved.notes,
        })
    }

    /// Normalizes a day's worth of raw events, dropping what cannot be shown.
    pub fn normalize_day(&self, raw_events: &[RawEvent], window: &DayWindow) -> Vec<CalendarEvent> {
        let mut events: Vec<CalendarEvent> = raw_events
            .iter()
            .filter_map(|raw| self.normalize(raw, window.start, window.end))
            .collect();
        events.sort_by(|left, right| {
            left.start_date
                .cmp(&right.start_date)
                .then_with(|| left.id.cmp(&right.id))
        });
        events
    }

    fn resolve_local(&self, event: &LocalStoreEvent) -> Option<Resolved> {
        let id = non_empty(Some(event.identifier.as_str()))?;
        let (Some(start), Some(end)) = (event.start, event.end) else {
            debug!(event_id = %id, "dropping local event without start or end");
            return None;
        };

        Some(Resolved {
            id,
            title: non_empty(event.title.as_deref()).unwrap_or_else(|| UNTITLED.to_string()),
            start,
            end,
            is_all_day: event.is_all_day,
            color_token: event.calendar_color.clone(),
            source_calendar_name: event.calendar_title.clone(),
            location: non_empty(event.location.as_deref()),
            notes: non_empty(event.notes.as_deref()),
        })
    }

    fn resolve_remote(&self, calendar: &SourceCalendar, event: &RemoteCalendarEvent) -> Option<Resolved> {
        let Some(id) = non_empty(event.id.as_deref()) else {
            debug!("dropping remote event without id");
            return None;
        };
        let is_cancelled = event
            .status
            .as_deref()
            .map(|status| status.trim().eq_ignore_ascii_case("cancelled"))
            .unwrap_or(false);
        if is_cancelled {
            return None;
        }

        let start = event.start.as_ref().and_then(|start| start.resolve(self.timezone));
        let end = event.end.as_ref().and_then(|end| end.resolve(self.timezone));
        let (Some(start), Some(end)) = (start, end) else {
            debug!(event_id = %id, "dropping remote event with missing or unparseable start/end");
            return None;
        };

        Some(Resolved {
            id,
            title: non_empty(event.summary.as_deref()).unwrap_or_else(|| UNTITLED.to_string()),
            start,
            end,
            is_all_day: self.spans_whole_days(start, end),
            color_token: calendar.color_token.clone(),
            source_calendar_name: calendar.name.clone(),
            location: non_empty(event.location.as_deref()),
            notes: non_empty(event.description.as_deref()),
        })
    }

    // Both un-clamped endpoints must sit on local midnight.
    fn spans_whole_days(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let on_midnight =
            |instant: DateTime<Utc>| instant.with_timezone(&self.timezone).time() == NaiveTime::MIN;
        end > start && on_midnight(start) && on_midnight(end)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
