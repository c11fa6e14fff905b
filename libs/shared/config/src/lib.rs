use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_url: String,
    pub storage_service_key: String,
    pub daily_api_key: String,
    pub daily_base_url: String,
    pub calendar_api_url: String,
    pub calendar_api_token: String,
    pub admin_calendar_id: String,
    pub secondary_calendar_id: String,
    pub admin_meeting_url: String,
    pub notify_url: String,
    pub notify_api_key: String,
    pub home_timezone: String,
    pub provider_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            storage_url: env::var("STORAGE_URL")
                .unwrap_or_else(|_| {
                    warn!("STORAGE_URL not set, using empty value");
                    String::new()
                }),
            storage_service_key: env::var("STORAGE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("STORAGE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            daily_api_key: env::var("DAILY_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("DAILY_API_KEY not set, using empty value");
                    String::new()
                }),
            daily_base_url: env::var("DAILY_BASE_URL")
                .unwrap_or_else(|_| "https://api.daily.co/v1".to_string()),
            calendar_api_url: env::var("CALENDAR_API_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            calendar_api_token: env::var("CALENDAR_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_API_TOKEN not set, using empty value");
                    String::new()
                }),
            admin_calendar_id: env::var("ADMIN_CALENDAR_ID")
                .unwrap_or_else(|_| {
                    warn!("ADMIN_CALENDAR_ID not set, using empty value");
                    String::new()
                }),
            secondary_calendar_id: env::var("SECONDARY_CALENDAR_ID")
                .unwrap_or_else(|_| {
                    warn!("SECONDARY_CALENDAR_ID not set, using empty value");
                    String::new()
                }),
            admin_meeting_url: env::var("ADMIN_MEETING_URL")
                .unwrap_or_else(|_| {
                    warn!("ADMIN_MEETING_URL not set, using empty value");
                    String::new()
                }),
            notify_url: env::var("NOTIFY_URL")
                .unwrap_or_else(|_| {
                    warn!("NOTIFY_URL not set, using empty value");
                    String::new()
                }),
            notify_api_key: env::var("NOTIFY_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("NOTIFY_API_KEY not set, using empty value");
                    String::new()
                }),
            home_timezone: env::var("HOME_TIMEZONE")
                .unwrap_or_else(|_| "Europe/London".to_string()),
            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.storage_url.is_empty() && !self.storage_service_key.is_empty()
    }

    pub fn is_meeting_rooms_configured(&self) -> bool {
        !self.daily_api_key.is_empty() && !self.daily_base_url.is_empty()
    }

    pub fn is_calendar_configured(&self) -> bool {
        !self.calendar_api_url.is_empty() && !self.calendar_api_token.is_empty()
    }

    pub fn is_notifications_configured(&self) -> bool {
        !self.notify_url.is_empty()
    }
}
