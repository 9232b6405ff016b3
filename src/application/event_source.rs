use crate::domain::models::{EventDraft, EventPatch};
use crate::infrastructure::config::{RetryConfig, SourceConfig, TimelineConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{
    LocalStoreEvent, RawEvent, RemoteCalendarEvent, RemoteEventDateTime, SourceCalendar,
};
use crate::infrastructure::local_event_store::{JsonFileEventStore, LocalEventStore};
use crate::infrastructure::remote_calendar_client::{
    ListEventsRequest, RemoteCalendarClient, ReqwestRemoteCalendarClient,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration as TokioDuration, sleep};
use tracing::{debug, info, warn};

const DEFAULT_LOCAL_CALENDAR_TITLE: &str = "Local";
const DEFAULT_LOCAL_CALENDAR_COLOR: &str = "local";
const DEFAULT_REMOTE_PAGE_SIZE: u32 = 250;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
        }
    }
}

/// Result of one day fetch. `error` carries a human-readable message for the
/// collaborator that displays fetch failures; `events` is empty in that case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub events: Vec<RawEvent>,
    pub error: Option<String>,
}

pub struct LocalEventSource {
    store: Arc<dyn LocalEventStore>,
    calendar_title: String,
    calendar_color: String,
}

impl LocalEventSource {
    pub fn new(store: Arc<dyn LocalEventStore>) -> Self {
        Self {
            store,
            calendar_title: DEFAULT_LOCAL_CALENDAR_TITLE.to_string(),
            calendar_color: DEFAULT_LOCAL_CALENDAR_COLOR.to_string(),
        }
    }

    /// Calendar that events created through this source are filed under.
    pub fn with_calendar(mut self, title: impl Into<String>, color: impl Into<String>) -> Self {
        self.calendar_title = title.into();
        self.calendar_color = color.into();
        self
    }

    fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> FetchOutcome {
        match self.store.events_between(start, end) {
            Ok(events) => FetchOutcome {
                events: events.into_iter().map(RawEvent::Local).collect(),
                error: None,
            },
            Err(error) => {
                warn!(%start, %end, error = %error, "local event store fetch failed");
                FetchOutcome::default()
            }
        }
    }

    fn create(&self, draft: &EventDraft) -> Result<String, InfraError> {
        let identifier = next_id("local");
        let event = LocalStoreEvent {
            identifier: identifier.clone(),
            title: Some(draft.title.trim().to_string()),
            start: Some(draft.start_date),
            end: Some(draft.end_date),
            is_all_day: draft.is_all_day,
            calendar_title: self.calendar_title.clone(),
            calendar_color: self.calendar_color.clone(),
            location: draft.location.clone(),
            notes: draft.notes.clone(),
        };
        self.store.upsert(&event)?;
        Ok(identifier)
    }

    fn update(&self, event_id: &str, patch: &EventPatch) -> Result<(), InfraError> {
        let mut event = self
            .store
            .get(event_id)?
            .ok_or_else(|| InfraError::EventNotFound(event_id.to_string()))?;

        if let Some(title) = &patch.title {
            event.title = Some(title.trim().to_string());
        }
        if let Some(start) = patch.start_date {
            event.start = Some(start);
        }
        if let Some(end) = patch.end_date {
            event.end = Some(end);
        }
        if let Some(location) = &patch.location {
            event.location = Some(location.clone());
        }
        if let Some(notes) = &patch.notes {
            event.notes = Some(notes.clone());
        }
        if let (Some(start), Some(end)) = (event.start, event.end) {
            ensure_ordered(start, end)?;
        }

        self.store.upsert(&event)
    }

    fn delete(&self, event_id: &str) -> Result<(), InfraError> {
        if self.store.remove(event_id)? {
            Ok(())
        } else {
            Err(InfraError::EventNotFound(event_id.to_string()))
        }
    }
}

pub struct RemoteEventSource {
    client: Arc<dyn RemoteCalendarClient>,
    access_token: String,
    calendar_id: String,
    calendar: SourceCalendar,
    page_size: u32,
    timezone: Tz,
    retry_policy: RetryPolicy,
}

impl RemoteEventSource {
    pub fn new(
        client: Arc<dyn RemoteCalendarClient>,
        access_token: impl Into<String>,
        calendar_id: impl Into<String>,
        color_token: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        let calendar_id = calendar_id.into();
        Self {
            client,
            access_token: access_token.into(),
            calendar: SourceCalendar {
                name: calendar_id.clone(),
                color_token: color_token.into(),
            },
            calendar_id,
            page_size: DEFAULT_REMOTE_PAGE_SIZE,
            timezone,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// All raw events in `[start, end)`, following every page.
    pub async fn fetch_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, InfraError> {
        let request = ListEventsRequest {
            time_min: start,
            time_max: end,
            page_size: self.page_size,
        };
        let events = self.list_events_with_retry(request).await?;
        Ok(events
            .into_iter()
            .map(|event| RawEvent::Remote {
                calendar: self.calendar.clone(),
                event,
            })
            .collect())
    }

    async fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> FetchOutcome {
        match self.fetch_range(start, end).await {
            Ok(events) => FetchOutcome {
                events,
                error: None,
            },
            Err(error) => {
                warn!(calendar_id = %self.calendar_id, %start, %end, error = %error, "remote fetch failed");
                FetchOutcome {
                    events: Vec::new(),
                    error: Some(error.to_string()),
                }
            }
        }
    }

    async fn list_events_with_retry(
        &self,
        request: ListEventsRequest,
    ) -> Result<Vec<RemoteCalendarEvent>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self
                .client
                .list_events(&self.access_token, &self.calendar_id, request.clone())
                .await
            {
                Ok(events) => return Ok(events),
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    warn!(attempt = attempt + 1, delay_ms = delay, error = %error, "retrying remote event list");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn create(&self, draft: &EventDraft) -> Result<String, InfraError> {
        let (start, end) = if draft.is_all_day {
            let (start, end) = all_day_dates(draft.start_date, draft.end_date, self.timezone);
            (
                RemoteEventDateTime::all_day(start),
                RemoteEventDateTime::all_day(end),
            )
        } else {
            (
                RemoteEventDateTime::timed(draft.start_date, Some(self.timezone.name())),
                RemoteEventDateTime::timed(draft.end_date, Some(self.timezone.name())),
            )
        };
        let event = RemoteCalendarEvent {
            summary: Some(draft.title.trim().to_string()),
            description: draft.notes.clone(),
            location: draft.location.clone(),
            start: Some(start),
            end: Some(end),
            ..RemoteCalendarEvent::default()
        };

        self.client
            .create_event(&self.access_token, &self.calendar_id, &event)
            .await
    }

    async fn update(&self, event_id: &str, patch: &EventPatch) -> Result<(), InfraError> {
        let mut event = self
            .client
            .get_event(&self.access_token, &self.calendar_id, event_id)
            .await?;

        if let Some(title) = &patch.title {
            event.summary = Some(title.trim().to_string());
        }
        if let Some(notes) = &patch.notes {
            event.description = Some(notes.clone());
        }
        if let Some(location) = &patch.location {
            event.location = Some(location.clone());
        }
        if let Some(start) = patch.start_date {
            event.start = Some(self.patched_time(event.start.as_ref(), start));
        }
        if let Some(end) = patch.end_date {
            event.end = Some(self.patched_time(event.end.as_ref(), end));
        }

        let start = event.start.as_ref().and_then(|value| value.resolve(self.timezone));
        let end = event.end.as_ref().and_then(|value| value.resolve(self.timezone));
        if let (Some(start), Some(end)) = (start, end) {
            ensure_ordered(start, end)?;
        }

        self.client
            .update_event(&self.access_token, &self.calendar_id, event_id, &event)
            .await
    }

    // An event stored with bare dates stays date-based after a patch.
    fn patched_time(
        &self,
        existing: Option<&RemoteEventDateTime>,
        instant: DateTime<Utc>,
    ) -> RemoteEventDateTime {
        let is_date_based =
            existing.is_some_and(|value| value.date_time.is_none() && value.date.is_some());
        if is_date_based {
            RemoteEventDateTime::all_day(instant.with_timezone(&self.timezone).date_naive())
        } else {
            RemoteEventDateTime::timed(instant, Some(self.timezone.name()))
        }
    }

    async fn delete(&self, event_id: &str) -> Result<(), InfraError> {
        self.client
            .delete_event(&self.access_token, &self.calendar_id, event_id)
            .await
    }
}

/// The two event sources the timeline can be backed by.
pub enum EventSourceAdapter {
    Local(LocalEventSource),
    Remote(RemoteEventSource),
}

impl EventSourceAdapter {
    /// Builds the configured source. `lookup` resolves environment variables.
    pub fn from_config<F>(config: &TimelineConfig, lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match &config.source {
            SourceConfig::Local { events_path } => Ok(Self::Local(LocalEventSource::new(Arc::new(
                JsonFileEventStore::new(events_path),
            )))),
            SourceConfig::Remote {
                calendar_id,
                api_base_url,
                page_size,
                color_token,
                access_token_env,
            } => {
                let access_token = lookup(access_token_env)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| {
                        InfraError::InvalidConfig(format!(
                            "missing remote access token (set {access_token_env})"
                        ))
                    })?;
                let client = ReqwestRemoteCalendarClient::with_base_url(api_base_url)?;
                Ok(Self::Remote(
                    RemoteEventSource::new(
                        Arc::new(client),
                        access_token,
                        calendar_id.clone(),
                        color_token.clone(),
                        config.timezone()?,
                    )
                    .with_page_size(*page_size)
                    .with_retry_policy(RetryPolicy::from(&config.retry)),
                ))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
        }
    }

    /// Raw events intersecting `[day_start, day_end)`. Never fails: the local
    /// source degrades to an empty list silently, the remote source also
    /// reports a message.
    pub async fn fetch_events(&self, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> FetchOutcome {
        let outcome = match self {
            Self::Local(source) => source.fetch(day_start, day_end),
            Self::Remote(source) => source.fetch(day_start, day_end).await,
        };
        debug!(
            source = self.kind(),
            %day_start,
            events = outcome.events.len(),
            failed = outcome.error.is_some(),
            "fetched raw events"
        );
        outcome
    }

    pub async fn create_event(&self, draft: &EventDraft) -> Result<String, InfraError> {
        draft.validate().map_err(InfraError::InvalidEvent)?;
        let event_id = match self {
            Self::Local(source) => source.create(draft)?,
            Self::Remote(source) => source.create(draft).await?,
        };
        info!(source = self.kind(), event_id = %event_id, "created event");
        Ok(event_id)
    }

    pub async fn update_event(&self, event_id: &str, patch: &EventPatch) -> Result<(), InfraError> {
        validate_patch(event_id, patch)?;
        match self {
            Self::Local(source) => source.update(event_id, patch)?,
            Self::Remote(source) => source.update(event_id, patch).await?,
        }
        info!(source = self.kind(), event_id, "updated event");
        Ok(())
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<(), InfraError> {
        if event_id.trim().is_empty() {
            return Err(InfraError::InvalidEvent("event id must not be empty".to_string()));
        }
        match self {
            Self::Local(source) => source.delete(event_id)?,
            Self::Remote(source) => source.delete(event_id).await?,
        }
        info!(source = self.kind(), event_id, "deleted event");
        Ok(())
    }
}

fn validate_patch(event_id: &str, patch: &EventPatch) -> Result<(), InfraError> {
    if event_id.trim().is_empty() {
        return Err(InfraError::InvalidEvent("event id must not be empty".to_string()));
    }
    if patch.is_empty() {
        return Err(InfraError::InvalidEvent("patch has no fields to update".to_string()));
    }
    if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
        return Err(InfraError::InvalidEvent("patch.title must not be empty".to_string()));
    }
    Ok(())
}

fn ensure_ordered(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), InfraError> {
    if end < start {
        return Err(InfraError::InvalidEvent(
            "event end must not be before its start".to_string(),
        ));
    }
    Ok(())
}

/// Local dates for an all-day draft. The end date is exclusive, so an end that
/// is not on local midnight rounds up to the following day.
fn all_day_dates(start: DateTime<Utc>, end: DateTime<Utc>, timezone: Tz) -> (NaiveDate, NaiveDate) {
    let start_date = start.with_timezone(&timezone).date_naive();
    let local_end = end.with_timezone(&timezone);
    let mut end_date = local_end.date_naive();
    if local_end.time() != NaiveTime::MIN || end_date <= start_date {
        end_date += Duration::days(1);
    }
    (start_date, end_date)
}
