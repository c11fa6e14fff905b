use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A busy window reported by the external calendar for a therapist.
/// Transient - fetched fresh per conflict check, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: Option<String>,
}

impl BusyInterval {
    /// Half-open interval overlap against [start, end).
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar provider not configured")]
    NotConfigured,

    #[error("Calendar API error: {message}")]
    ApiError { message: String },

    #[error("Calendar transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 17, h, m, 0).unwrap()
    }

    #[test]
    fn overlap_is_half_open() {
        let busy = BusyInterval {
            start: at(12, 0),
            end: at(13, 0),
            summary: None,
        };

        assert!(busy.overlaps(at(12, 30), at(13, 30)));
        assert!(busy.overlaps(at(11, 30), at(12, 30)));
        // Touching boundaries do not overlap.
        assert!(!busy.overlaps(at(13, 0), at(14, 0)));
        assert!(!busy.overlaps(at(11, 0), at(12, 0)));
    }
}
