use chrono::{DateTime, Utc};
use daytimeline::infrastructure::error::InfraError;
use daytimeline::infrastructure::event_mapper::{RemoteCalendarEvent, RemoteEventDateTime};
use daytimeline::infrastructure::remote_calendar_client::{
    ListEventsRequest, RemoteCalendarClient, ReqwestRemoteCalendarClient,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fixed_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid datetime")
        .with_timezone(&Utc)
}

fn client_for(server: &MockServer) -> ReqwestRemoteCalendarClient {
    ReqwestRemoteCalendarClient::with_base_url(&format!("{}/calendar/v3/", server.uri()))
        .expect("valid base url")
}

fn day_request() -> ListEventsRequest {
    ListEventsRequest {
        time_min: fixed_time("2026-02-16T06:00:00Z"),
        time_max: fixed_time("2026-02-17T06:00:00Z"),
        page_size: 2,
    }
}

fn event_json(id: &str, start: &str, end: &str) -> serde_json::Value {
    json!({
        "id": id,
        "summary": format!("event {id}"),
        "status": "confirmed",
        "htmlLink": format!("https://calendar.example.test/event?eid={id}"),
        "start": { "dateTime": start, "timeZone": "America/Chicago" },
        "end": { "dateTime": end, "timeZone": "America/Chicago" }
    })
}

#[tokio::test]
async fn list_events_follows_next_page_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(query_param("pageToken", "page-2"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [event_json("evt-3", "2026-02-16T14:00:00-06:00", "2026-02-16T15:00:00-06:00")]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .and(query_param("maxResults", "2"))
        .and(query_param("timeMin", "2026-02-16T06:00:00+00:00"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                event_json("evt-1", "2026-02-16T09:00:00-06:00", "2026-02-16T10:00:00-06:00"),
                event_json("evt-2", "2026-02-16T11:00:00-06:00", "2026-02-16T12:00:00-06:00")
            ],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let events = client_for(&server)
        .list_events("token-123", "primary", day_request())
        .await
        .expect("list events");

    let ids: Vec<&str> = events.iter().filter_map(|event| event.id.as_deref()).collect();
    assert_eq!(ids, vec!["evt-1", "evt-2", "evt-3"]);
    assert_eq!(
        events[0].start.as_ref().and_then(|start| start.time_zone.as_deref()),
        Some("America/Chicago")
    );
}

#[tokio::test]
async fn malformed_item_is_dropped_without_failing_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                event_json("evt-1", "2026-02-16T09:00:00-06:00", "2026-02-16T10:00:00-06:00"),
                { "id": "evt-bad", "summary": "flat start", "start": "2026-02-16", "end": 42 },
                event_json("evt-2", "2026-02-16T11:00:00-06:00", "2026-02-16T12:00:00-06:00")
            ]
        })))
        .mount(&server)
        .await;

    let events = client_for(&server)
        .list_events("token-123", "primary", day_request())
        .await
        .expect("list events");

    let ids: Vec<&str> = events.iter().filter_map(|event| event.id.as_deref()).collect();
    assert_eq!(ids, vec!["evt-1", "evt-2"]);
}

#[tokio::test]
async fn unauthorized_maps_to_reauthenticate_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"invalid_token\"}"))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .list_events("expired", "primary", day_request())
        .await
        .expect_err("401 surfaces");

    assert!(matches!(error, InfraError::Unauthorized));
    assert_eq!(
        error.to_string(),
        "Invalid or expired access token. Please re-authenticate."
    );
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .list_events("token-123", "primary", day_request())
        .await
        .expect_err("503 surfaces");

    assert!(error.is_transient());
    assert!(matches!(error, InfraError::RemoteStatus { status: 503, .. }));
}

#[tokio::test]
async fn missing_event_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .get_event("token-123", "primary", "gone")
        .await
        .expect_err("404 surfaces");

    assert!(matches!(error, InfraError::EventNotFound(_)));
}

#[tokio::test]
async fn create_posts_event_and_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(body_partial_json(json!({
            "summary": "Lunch",
            "start": { "date": "2026-02-16" },
            "end": { "date": "2026-02-17" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "new-evt" })))
        .expect(1)
        .mount(&server)
        .await;

    let event = RemoteCalendarEvent {
        summary: Some("Lunch".to_string()),
        start: Some(RemoteEventDateTime::all_day(
            chrono::NaiveDate::from_ymd_opt(2026, 2, 16).expect("date"),
        )),
        end: Some(RemoteEventDateTime::all_day(
            chrono::NaiveDate::from_ymd_opt(2026, 2, 17).expect("date"),
        )),
        ..RemoteCalendarEvent::default()
    };

    let event_id = client_for(&server)
        .create_event("token-123", "primary", &event)
        .await
        .expect("create");

    assert_eq!(event_id, "new-evt");
}

#[tokio::test]
async fn update_puts_and_delete_removes() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/calendar/v3/calendars/primary/events/evt-1"))
        .and(body_partial_json(json!({ "location": "Room 4" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendar/v3/calendars/primary/events/evt-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);
    let event = RemoteCalendarEvent {
        id: Some("evt-1".to_string()),
        location: Some("Room 4".to_string()),
        ..RemoteCalendarEvent::default()
    };

    client
        .update_event("token-123", "primary", "evt-1", &event)
        .await
        .expect("update");
    client
        .delete_event("token-123", "primary", "evt-1")
        .await
        .expect("delete");
}
