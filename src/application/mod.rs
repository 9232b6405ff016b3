pub mod day_loader;
pub mod day_pages;
pub mod event_source;
pub mod paging_controller;
pub mod timeline;
