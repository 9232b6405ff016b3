pub mod config;
pub mod error;
pub mod event_mapper;
pub mod local_event_store;
pub mod logging;
pub mod remote_calendar_client;
