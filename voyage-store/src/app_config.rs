use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSinkKind {
    Kafka,
    #[default]
    Log,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub sink: NotificationSinkKind,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String { "voyage.notifications".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Tunables of the booking and waiting-list core
#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_max_upcoming_trips")]
    pub max_upcoming_trips: u32,
    #[serde(default = "default_offer_window_hours")]
    pub offer_window_hours: i64,
    #[serde(default = "default_expiry_sweep_seconds")]
    pub expiry_sweep_seconds: u64,
    #[serde(default = "default_reminder_lead_days")]
    pub reminder_lead_days: i64,
    #[serde(default = "default_reminder_sweep_seconds")]
    pub reminder_sweep_seconds: u64,
    /// Delete every remaining entry once nobody un-notified is left
    #[serde(default)]
    pub drain_serviced_waitlist: bool,
    #[serde(default = "default_notification_retries")]
    pub notification_retries: u32,
}

fn default_max_upcoming_trips() -> u32 { 3 }
fn default_offer_window_hours() -> i64 { 24 }
fn default_expiry_sweep_seconds() -> u64 { 60 }
fn default_reminder_lead_days() -> i64 { 5 }
fn default_reminder_sweep_seconds() -> u64 { 24 * 60 * 60 }
fn default_notification_retries() -> u32 { 3 }

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_upcoming_trips: default_max_upcoming_trips(),
            offer_window_hours: default_offer_window_hours(),
            expiry_sweep_seconds: default_expiry_sweep_seconds(),
            reminder_lead_days: default_reminder_lead_days(),
            reminder_sweep_seconds: default_reminder_sweep_seconds(),
            drain_serviced_waitlist: false,
            notification_retries: default_notification_retries(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. VOYAGE__BOOKING_RULES__OFFER_WINDOW_HOURS=12
            .add_source(config::Environment::with_prefix("VOYAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_rules_fall_back_to_defaults() {
        let raw = r#"
            [server]
            port = 8080

            [database]
            url = "postgres://localhost/voyage"

            [kafka]
            brokers = "localhost:9092"

            [auth]
            jwt_secret = "secret"

            [booking_rules]
            offer_window_hours = 12
        "#;

        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.booking_rules.offer_window_hours, 12);
        assert_eq!(cfg.booking_rules.max_upcoming_trips, 3);
        assert!(!cfg.booking_rules.drain_serviced_waitlist);
        assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
        assert_eq!(cfg.notifications.sink, NotificationSinkKind::Log);
        assert_eq!(cfg.kafka.topic, "voyage.notifications");
        assert_eq!(cfg.database.max_connections, 5);
    }
}
