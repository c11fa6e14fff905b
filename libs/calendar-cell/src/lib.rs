pub mod models;
pub mod services;

pub use models::{BusyInterval, CalendarError};
pub use services::google::GoogleCalendarClient;
pub use services::provider::CalendarProvider;
