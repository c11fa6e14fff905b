use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use shared_config::AppConfig;

use crate::models::SchedulingError;

/// Converts between the service's home-timezone wall-clock times and the
/// absolute instants everything else operates on. The platform displays one
/// region's civil time but stores UTC.
#[derive(Debug, Clone)]
pub struct TimeModel {
    tz: Tz,
}

impl TimeModel {
    pub fn new(tz_name: &str) -> Result<Self, SchedulingError> {
        let tz: Tz = tz_name
            .parse()
            .map_err(|_| SchedulingError::Validation(format!("Unknown timezone: {}", tz_name)))?;
        Ok(Self { tz })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, SchedulingError> {
        Self::new(&config.home_timezone)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Combine a calendar date and "HH:MM" wall-clock time into an instant.
    /// A time inside a spring-forward gap does not exist and is rejected;
    /// callers must not silently coerce it. A fall-back ambiguity resolves
    /// to the earlier occurrence.
    pub fn to_absolute(&self, date: NaiveDate, time: &str) -> Result<DateTime<Utc>, SchedulingError> {
        let wall_clock = parse_wall_clock(time)?;
        self.resolve_local(date.and_time(wall_clock))
    }

    /// Same conversion for an already-combined local datetime (webhook
    /// metadata carries "YYYY-MM-DDTHH:MM" strings).
    pub fn resolve_local(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>, SchedulingError> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(SchedulingError::InvalidLocalTime(format!(
                "{} does not exist in {} (daylight saving gap)",
                naive, self.tz
            ))),
        }
    }

    /// Absolute instants for 00:00:00.000 through 23:59:59.999 local time on
    /// a given date, for "appointments on this day" queries.
    pub fn day_bounds(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), SchedulingError> {
        let start_naive = date.and_time(NaiveTime::MIN);
        let end_naive = date
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_else(|| date.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1));

        let start = self
            .tz
            .from_local_datetime(&start_naive)
            .earliest()
            .ok_or_else(|| {
                SchedulingError::InvalidLocalTime(format!("No valid start of day for {}", date))
            })?;
        let end = self
            .tz
            .from_local_datetime(&end_naive)
            .latest()
            .ok_or_else(|| {
                SchedulingError::InvalidLocalTime(format!("No valid end of day for {}", date))
            })?;

        Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }

    pub fn to_local_date_string(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format("%Y-%m-%d").to_string()
    }

    pub fn to_local_time_string(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format("%H:%M:%S").to_string()
    }
}

fn parse_wall_clock(time: &str) -> Result<NaiveTime, SchedulingError> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .map_err(|_| {
            SchedulingError::InvalidLocalTime(format!("Unparseable wall-clock time: {}", time))
        })
}
