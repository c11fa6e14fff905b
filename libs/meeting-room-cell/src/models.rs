use serde::{Deserialize, Serialize};
use std::fmt;

/// A provisioned video room for one appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRoom {
    pub id: String,
    pub name: String,
    pub url: String,
    pub privacy: RoomPrivacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPrivacy {
    Private,
    Public,
}

impl fmt::Display for RoomPrivacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomPrivacy::Private => write!(f, "private"),
            RoomPrivacy::Public => write!(f, "public"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Meeting room provider not configured")]
    NotConfigured,

    #[error("Meeting room API error: {message}")]
    ApiError { message: String },

    #[error("Meeting room transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
