use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{MeetingRoom, RoomError};

/// Port for the meeting room collaborator. `ensure_room` is the idempotent
/// entry point the booking orchestrator uses: re-invoking it with the same
/// name must never produce a second room for the same logical booking.
#[async_trait]
pub trait RoomProvider: Send + Sync {
    /// Create or reuse the room keyed by `name`. A pre-existing room with
    /// mismatched visibility settings is deleted and recreated.
    async fn ensure_room(
        &self,
        name: &str,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<MeetingRoom, RoomError>;

    async fn get_room(&self, name: &str) -> Result<Option<MeetingRoom>, RoomError>;

    /// Delete a room. Returns false when the room was already gone.
    async fn delete_room(&self, name: &str) -> Result<bool, RoomError>;
}
