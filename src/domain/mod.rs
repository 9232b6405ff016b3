pub mod layout;
pub mod models;
pub mod paging;
