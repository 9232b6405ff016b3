use crate::infrastructure::config::DEFAULT_API_BASE_URL;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{RemoteCalendarEvent, decode_records};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEventsRequest {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    pub page_size: u32,
}

/// Remote calendar API. `list_events` follows page cursors internally and
/// returns every page concatenated.
#[async_trait]
pub trait RemoteCalendarClient: Send + Sync {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<RemoteCalendarEvent>, InfraError>;

    async fn get_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<RemoteCalendarEvent, InfraError>;

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &RemoteCalendarEvent,
    ) -> Result<String, InfraError>;

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &RemoteCalendarEvent,
    ) -> Result<(), InfraError>;

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestRemoteCalendarClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<Value>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

impl ReqwestRemoteCalendarClient {
    pub fn new() -> Result<Self, InfraError> {
        Self::with_base_url(DEFAULT_API_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, InfraError> {
        let mut base_url = Url::parse(base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid calendar api base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(
                "calendar api base URL cannot be a base".to_string(),
            ));
        }
        // Segments are pushed after the base path, so drop any trailing slash.
        if let Ok(mut segments) = base_url.path_segments_mut() {
            segments.pop_if_empty();
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::RemoteApi(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn events_endpoint(&self, calendar_id: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("calendar api base URL cannot be a base".to_string())
            })?;
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }

    fn event_endpoint(&self, calendar_id: &str, event_id: &str) -> Result<Url, InfraError> {
        let mut url = self.events_endpoint(calendar_id)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("calendar events URL cannot be a base".to_string())
            })?;
            segments.push(event_id);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, access_token: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(access_token)
    }

    /// Sends `request` and returns the body of a successful response.
    async fn send(request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!("failed reading response while {action}: {error}"))
        })?;

        if !status.is_success() {
            return Err(InfraError::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }

    fn parse_event(body: &str, action: &str) -> Result<RemoteCalendarEvent, InfraError> {
        serde_json::from_str(body).map_err(|error| {
            InfraError::RemoteApi(format!("invalid event payload while {action}: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl RemoteCalendarClient for ReqwestRemoteCalendarClient {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<RemoteCalendarEvent>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = self.events_endpoint(calendar_id)?;
        let page_size = request.page_size.clamp(1, 2500).to_string();
        let time_min = request.time_min.to_rfc3339();
        let time_max = request.time_max.to_rfc3339();
        let mut page_token: Option<String> = None;
        let mut events = Vec::new();
        let mut pages = 0usize;

        loop {
            let mut req = self
                .request(Method::GET, endpoint.clone(), access_token)
                .query(&[
                    ("timeMin", time_min.as_str()),
                    ("timeMax", time_max.as_str()),
                    ("maxResults", page_size.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                ]);
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let body = Self::send(req, "listing calendar events").await?;
            let mut parsed: EventsPageResponse = serde_json::from_str(&body).map_err(|error| {
                InfraError::RemoteApi(format!("invalid events list payload: {error}; body={body}"))
            })?;
            pages += 1;
            events.extend(decode_records::<RemoteCalendarEvent>(
                parsed.items.take().unwrap_or_default(),
                "remote",
            ));

            match parsed.next_page_token.take().filter(|token| !token.is_empty()) {
                Some(next_page_token) => page_token = Some(next_page_token),
                None => break,
            }
        }

        debug!(calendar_id, pages, events = events.len(), "listed remote events");
        Ok(events)
    }

    async fn get_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<RemoteCalendarEvent, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;
        Self::ensure_non_empty(event_id, "event id")?;

        let endpoint = self.event_endpoint(calendar_id, event_id)?;
        let body = Self::send(
            self.request(Method::GET, endpoint, access_token),
            "fetching event",
        )
        .await?;
        Self::parse_event(&body, "fetching event")
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &RemoteCalendarEvent,
    ) -> Result<String, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = self.events_endpoint(calendar_id)?;
        let body = Self::send(
            self.request(Method::POST, endpoint, access_token).json(event),
            "creating event",
        )
        .await?;

        Self::parse_event(&body, "creating event")?
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::RemoteApi("event create response did not include id".to_string()))
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &RemoteCalendarEvent,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;
        Self::ensure_non_empty(event_id, "event id")?;

        let endpoint = self.event_endpoint(calendar_id, event_id)?;
        Self::send(
            self.request(Method::PUT, endpoint, access_token).json(event),
            "updating event",
        )
        .await?;
        Ok(())
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;
        Self::ensure_non_empty(event_id, "event id")?;

        let endpoint = self.event_endpoint(calendar_id, event_id)?;
        Self::send(
            self.request(Method::DELETE, endpoint, access_token),
            "deleting event",
        )
        .await?;
        Ok(())
    }
}
