use async_trait::async_trait;

use crate::models::{Notice, NotifyError};

/// Port for the email/SMS collaborator. Callers log failures and move on;
/// a notification must never roll back a booking.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notice: &Notice) -> Result<(), NotifyError>;
}
