use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{LocalStoreEvent, decode_records};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Synchronous on-device calendar store.
pub trait LocalEventStore: Send + Sync {
    /// Events touching `[start, end)`. Records without times are returned
    /// as-is so the normalizer can decide what to drop. A record that cannot
    /// be decoded at all is skipped on its own.
    fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalStoreEvent>, InfraError>;
    fn get(&self, identifier: &str) -> Result<Option<LocalStoreEvent>, InfraError>;
    fn upsert(&self, event: &LocalStoreEvent) -> Result<(), InfraError>;
    fn remove(&self, identifier: &str) -> Result<bool, InfraError>;
}

fn normalized_id(identifier: &str) -> Option<String> {
    let normalized = identifier.trim();
    if normalized.is_empty() {
        return None;
    }
    Some(normalized.to_string())
}

fn touches_range(event: &LocalStoreEvent, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    match (event.start, event.end) {
        (Some(event_start), Some(event_end)) => {
            event_start < end && (event_end > start || event_start >= start)
        }
        _ => true,
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLocalEventStore {
    events: Mutex<HashMap<String, LocalStoreEvent>>,
}

impl InMemoryLocalEventStore {
    pub fn with_events(events: Vec<LocalStoreEvent>) -> Self {
        let events = events
            .into_iter()
            .filter_map(|event| normalized_id(&event.identifier).map(|id| (id, event)))
            .collect();
        Self {
            events: Mutex::new(events),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, LocalStoreEvent>>, InfraError> {
        self.events
            .lock()
            .map_err(|error| InfraError::LocalStore(format!("local event store lock poisoned: {error}")))
    }
}

impl LocalEventStore for InMemoryLocalEventStore {
    fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalStoreEvent>, InfraError> {
        let events = self.lock()?;
        Ok(events
            .values()
            .filter(|event| touches_range(event, start, end))
            .cloned()
            .collect())
    }

    fn get(&self, identifier: &str) -> Result<Option<LocalStoreEvent>, InfraError> {
        let Some(identifier) = normalized_id(identifier) else {
            return Ok(None);
        };
        Ok(self.lock()?.get(&identifier).cloned())
    }

    fn upsert(&self, event: &LocalStoreEvent) -> Result<(), InfraError> {
        let identifier = normalized_id(&event.identifier).ok_or_else(|| {
            InfraError::LocalStore("event identifier is required for upsert".to_string())
        })?;
        self.lock()?.insert(identifier, event.clone());
        Ok(())
    }

    fn remove(&self, identifier: &str) -> Result<bool, InfraError> {
        let Some(identifier) = normalized_id(identifier) else {
            return Ok(false);
        };
        Ok(self.lock()?.remove(&identifier).is_some())
    }
}

/// Local store persisted as a JSON array of events. Every call re-reads the
/// file so edits made by other processes are picked up on the next fetch.
#[derive(Debug)]
pub struct JsonFileEventStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl JsonFileEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Vec<Value>, InfraError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|error| {
            InfraError::LocalStore(format!("invalid events file {}: {error}", self.path.display()))
        })
    }

    fn read_all(&self) -> Result<Vec<LocalStoreEvent>, InfraError> {
        Ok(decode_records(self.read_records()?, "local"))
    }

    fn write_records(&self, records: &[Value]) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let formatted = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, format!("{formatted}\n"))?;
        Ok(())
    }

    /// Records that fail to decode are written back untouched.
    fn modify<T>(&self, change: impl FnOnce(&mut Vec<Value>) -> T) -> Result<T, InfraError> {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|error| InfraError::LocalStore(format!("events file lock poisoned: {error}")))?;
        let mut records = self.read_records()?;
        let result = change(&mut records);
        self.write_records(&records)?;
        Ok(result)
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record
        .get("identifier")
        .and_then(Value::as_str)
        .map(str::trim)
}

impl LocalEventStore for JsonFileEventStore {
    fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalStoreEvent>, InfraError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|event| touches_range(event, start, end))
            .collect())
    }

    fn get(&self, identifier: &str) -> Result<Option<LocalStoreEvent>, InfraError> {
        let Some(identifier) = normalized_id(identifier) else {
            return Ok(None);
        };
        Ok(self
            .read_all()?
            .into_iter()
            .find(|event| event.identifier.trim() == identifier))
    }

    fn upsert(&self, event: &LocalStoreEvent) -> Result<(), InfraError> {
        let identifier = normalized_id(&event.identifier).ok_or_else(|| {
            InfraError::LocalStore("event identifier is required for upsert".to_string())
        })?;
        let record = serde_json::to_value(event)?;
        self.modify(|records| {
            match records
                .iter_mut()
                .find(|existing| record_id(existing) == Some(identifier.as_str()))
            {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        })
    }

    fn remove(&self, identifier: &str) -> Result<bool, InfraError> {
        let Some(identifier) = normalized_id(identifier) else {
            return Ok(false);
        };
        self.modify(|records| {
            let before = records.len();
            records.retain(|record| record_id(record) != Some(identifier.as_str()));
            records.len() != before
        })
    }
}
