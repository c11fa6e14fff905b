pub mod mailer;
pub mod provider;
