pub mod models;
pub mod services;

pub use models::{MeetingRoom, RoomError, RoomPrivacy};
pub use services::daily::DailyRoomClient;
pub use services::provider::RoomProvider;
