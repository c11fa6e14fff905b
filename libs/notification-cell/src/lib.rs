pub mod models;
pub mod services;

pub use models::{Notice, NotifyError};
pub use services::mailer::HttpMailer;
pub use services::provider::NotificationDispatcher;
