use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Canonical event shape every source is normalized into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_all_day: bool,
    pub color_token: String,
    pub source_calendar_name: String,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        if self.end_date < self.start_date {
            return Err("event.end_date must be >= event.start_date".to_string());
        }
        Ok(())
    }

    /// Half-open interval overlap: `a.start < b.end && b.start < a.end`.
    pub fn overlaps(&self, other: &CalendarEvent) -> bool {
        self.start_date < other.end_date && other.start_date < self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayoutSlot {
    pub event_id: String,
    pub column: usize,
    pub total_columns: usize,
}

/// The half-open instant range `[start, end)` covered by one calendar day in a
/// given timezone. Days are 23 or 25 hours long across DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: Tz,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate, timezone: Tz) -> Self {
        let next = date.succ_opt().unwrap_or(date);
        Self {
            date,
            start: local_midnight(date, timezone),
            end: local_midnight(next, timezone),
            timezone,
        }
    }

    pub fn contains_date_of(&self, instant: DateTime<Utc>) -> bool {
        instant.with_timezone(&self.timezone).date_naive() == self.date
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// First instant of `date` in `timezone`. Midnight can fall inside a DST gap in
/// a handful of zones; the day then starts at the first valid local time.
pub fn local_midnight(date: NaiveDate, timezone: Tz) -> DateTime<Utc> {
    let mut local: NaiveDateTime = date.and_time(NaiveTime::MIN);
    for _ in 0..4 {
        if let Some(resolved) = timezone.from_local_datetime(&local).earliest() {
            return resolved.with_timezone(&Utc);
        }
        local += Duration::minutes(30);
    }
    timezone
        .from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .with_timezone(&Utc)
}

/// New event requested by the conversational agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "draft.title")?;
        if self.end_date < self.start_date {
            return Err("draft.end_date must be >= draft.start_date".to_string());
        }
        Ok(())
    }
}

/// Partial update: only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.location.is_none()
            && self.notes.is_none()
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
