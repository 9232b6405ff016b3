use crate::application::event_source::EventSourceAdapter;
use crate::domain::layout::{compute_layout, time_fractions};
use crate::domain::models::{CalendarEvent, DayWindow, LayoutSlot};
use crate::infrastructure::event_mapper::EventNormalizer;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Everything the presentation layer needs to draw one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayLoad {
    pub window: DayWindow,
    pub events: Vec<CalendarEvent>,
    pub layout: Vec<LayoutSlot>,
    pub error: Option<String>,
}

/// A normalized event with its column and its position within the day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedEvent {
    #[serde(flatten)]
    pub event: CalendarEvent,
    pub column: Option<usize>,
    pub total_columns: Option<usize>,
    pub start_fraction: f64,
    pub end_fraction: f64,
}

impl DayLoad {
    pub fn slot_for(&self, event_id: &str) -> Option<&LayoutSlot> {
        self.layout.iter().find(|slot| slot.event_id == event_id)
    }

    /// All-day events carry no column.
    pub fn placements(&self) -> Vec<PlacedEvent> {
        self.events
            .iter()
            .map(|event| {
                let slot = self.slot_for(&event.id);
                let (start_fraction, end_fraction) = time_fractions(event, &self.window);
                PlacedEvent {
                    event: event.clone(),
                    column: slot.map(|slot| slot.column),
                    total_columns: slot.map(|slot| slot.total_columns),
                    start_fraction,
                    end_fraction,
                }
            })
            .collect()
    }
}

/// Fetch, normalize and lay out a single day.
pub struct DayLoader {
    adapter: Arc<EventSourceAdapter>,
    normalizer: EventNormalizer,
}

impl DayLoader {
    pub fn new(adapter: Arc<EventSourceAdapter>, normalizer: EventNormalizer) -> Self {
        Self {
            adapter,
            normalizer,
        }
    }

    pub fn adapter(&self) -> &Arc<EventSourceAdapter> {
        &self.adapter
    }

    pub fn window_for(&self, date: NaiveDate) -> DayWindow {
        self.normalizer.day_window(date)
    }

    pub async fn load_day(&self, date: NaiveDate) -> DayLoad {
        let window = self.window_for(date);
        let outcome = self.adapter.fetch_events(window.start, window.end).await;
        let events = self.normalizer.normalize_day(&outcome.events, &window);
        let layout = compute_layout(&events);

        info!(
            %date,
            source = self.adapter.kind(),
            raw = outcome.events.len(),
            kept = events.len(),
            timed = layout.len(),
            failed = outcome.error.is_some(),
            "loaded day"
        );

        DayLoad {
            window,
            events,
            layout,
            error: outcome.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_source::{LocalEventSource, RemoteEventSource};
    use crate::infrastructure::error::InfraError;
    use crate::infrastructure::event_mapper::{LocalStoreEvent, RemoteCalendarEvent};
    use crate::infrastructure::local_event_store::{InMemoryLocalEventStore, JsonFileEventStore};
    use crate::infrastructure::remote_calendar_client::{ListEventsRequest, RemoteCalendarClient};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn local_event(identifier: &str, start: &str, end: Option<&str>, is_all_day: bool) -> LocalStoreEvent {
        LocalStoreEvent {
            identifier: identifier.to_string(),
            title: Some(identifier.to_uppercase()),
            start: Some(fixed_time(start)),
            end: end.map(fixed_time),
            is_all_day,
            calendar_title: "Home".to_string(),
            calendar_color: "#4285F4".to_string(),
            location: None,
            notes: None,
        }
    }

    fn local_loader(events: Vec<LocalStoreEvent>) -> DayLoader {
        let store = Arc::new(InMemoryLocalEventStore::with_events(events));
        DayLoader::new(
            Arc::new(EventSourceAdapter::Local(LocalEventSource::new(store))),
            EventNormalizer::new(chrono_tz::UTC),
        )
    }

    #[tokio::test]
    async fn overlapping_morning_is_split_into_columns() {
        let loader = local_loader(vec![
            local_event("a", "2026-02-16T09:00:00Z", Some("2026-02-16T10:00:00Z"), false),
            local_event("b", "2026-02-16T09:30:00Z", Some("2026-02-16T10:30:00Z"), false),
            local_event("c", "2026-02-16T10:15:00Z", Some("2026-02-16T11:00:00Z"), false),
            local_event("holiday", "2026-02-16T00:00:00Z", Some("2026-02-17T00:00:00Z"), true),
            local_event("broken", "2026-02-16T12:00:00Z", None, false),
        ]);

        let day = loader.load_day(date("2026-02-16")).await;

        assert_eq!(day.error, None);
        assert_eq!(day.events.len(), 4);
        let columns: Vec<(String, usize, usize)> = day
            .layout
            .iter()
            .map(|slot| (slot.event_id.clone(), slot.column, slot.total_columns))
            .collect();
        assert_eq!(
            columns,
            vec![
                ("a".to_string(), 0, 2),
                ("b".to_string(), 1, 2),
                ("c".to_string(), 0, 2),
            ]
        );
        assert!(day.slot_for("holiday").is_none());
    }

    #[tokio::test]
    async fn placements_carry_fractions_and_columns() {
        let loader = local_loader(vec![
            local_event("noon", "2026-02-16T12:00:00Z", Some("2026-02-16T18:00:00Z"), false),
            local_event("holiday", "2026-02-16T00:00:00Z", Some("2026-02-17T00:00:00Z"), true),
        ]);

        let day = loader.load_day(date("2026-02-16")).await;
        let placements = day.placements();

        let holiday = placements
            .iter()
            .find(|placed| placed.event.id == "holiday")
            .expect("holiday placed");
        assert_eq!(holiday.column, None);
        assert_eq!((holiday.start_fraction, holiday.end_fraction), (0.0, 1.0));

        let noon = placements
            .iter()
            .find(|placed| placed.event.id == "noon")
            .expect("noon placed");
        assert_eq!(noon.column, Some(0));
        assert_eq!(noon.total_columns, Some(1));
        assert_eq!((noon.start_fraction, noon.end_fraction), (0.5, 0.75));
    }

    #[tokio::test]
    async fn malformed_file_record_only_drops_itself() {
        let dir = std::env::temp_dir().join(format!("daytimeline-loader-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("events.json");
        let good = local_event("standup", "2026-02-16T09:00:00Z", Some("2026-02-16T10:00:00Z"), false);
        let records = serde_json::json!([
            good,
            {
                "identifier": "garbled",
                "title": "Garbled",
                "start": "not a date",
                "end": "2026-02-16T11:00:00Z",
                "isAllDay": false,
                "calendarTitle": "Home",
                "calendarColor": "#4285F4"
            }
        ]);
        std::fs::write(&path, records.to_string()).expect("seed events file");
        let loader = DayLoader::new(
            Arc::new(EventSourceAdapter::Local(LocalEventSource::new(Arc::new(
                JsonFileEventStore::new(&path),
            )))),
            EventNormalizer::new(chrono_tz::UTC),
        );

        let day = loader.load_day(date("2026-02-16")).await;

        assert_eq!(day.error, None);
        let ids: Vec<&str> = day.events.iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, vec!["standup"]);
    }

    struct UnreachableRemote;

    #[async_trait]
    impl RemoteCalendarClient for UnreachableRemote {
        async fn list_events(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            _request: ListEventsRequest,
        ) -> Result<Vec<RemoteCalendarEvent>, InfraError> {
            Err(InfraError::Forbidden)
        }

        async fn get_event(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            event_id: &str,
        ) -> Result<RemoteCalendarEvent, InfraError> {
            Err(InfraError::EventNotFound(event_id.to_string()))
        }

        async fn create_event(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            _event: &RemoteCalendarEvent,
        ) -> Result<String, InfraError> {
            Err(InfraError::Forbidden)
        }

        async fn update_event(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            _event_id: &str,
            _event: &RemoteCalendarEvent,
        ) -> Result<(), InfraError> {
            Err(InfraError::Forbidden)
        }

        async fn delete_event(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            _event_id: &str,
        ) -> Result<(), InfraError> {
            Err(InfraError::Forbidden)
        }
    }

    #[tokio::test]
    async fn remote_failure_renders_empty_day_with_message() {
        let source = RemoteEventSource::new(
            Arc::new(UnreachableRemote),
            "token",
            "primary",
            "remote",
            chrono_tz::UTC,
        );
        let loader = DayLoader::new(
            Arc::new(EventSourceAdapter::Remote(source)),
            EventNormalizer::new(chrono_tz::UTC),
        );

        let day = loader.load_day(date("2026-02-16")).await;

        assert!(day.events.is_empty());
        assert!(day.layout.is_empty());
        assert_eq!(
            day.error.as_deref(),
            Some("Insufficient permissions. Ensure the token has calendar scope.")
        );
    }
}
