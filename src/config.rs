use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::extractor::PriceBounds;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub request_timeout: u64,
    pub user_agent: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub recheck_interval_secs: u64,
    pub max_concurrent_checks: usize,
    pub max_delay_minutes: u64,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub dispatch_timeout: u64,
    pub whatsapp: WhatsAppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub default_recipient: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl ScraperConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn price_bounds(&self) -> PriceBounds {
        PriceBounds::new(self.min_price, self.max_price)
    }
}

impl SchedulerConfig {
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_minutes * 60)
    }
}

impl NotificationsConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout)
    }
}

impl WhatsAppConfig {
    /// True when every credential needed to reach the provider is present.
    pub fn is_configured(&self) -> bool {
        [&self.account_sid, &self.auth_token, &self.from_number]
            .iter()
            .all(|v| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false))
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Self::defaults()?
            // Optional file layers
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "PRICEWATCH__"
            .add_source(Environment::with_prefix("PRICEWATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.shutdown_timeout", 10)?
            .set_default("database.url", "sqlite://data/pricewatch.db?mode=rwc")?
            .set_default("database.max_connections", 5)?
            .set_default("scraper.request_timeout", 20)?
            .set_default("scraper.user_agent", DEFAULT_USER_AGENT)?
            .set_default("scraper.retry_attempts", 2)?
            .set_default("scraper.retry_delay_ms", 1000)?
            .set_default("scraper.min_price", "0.01")?
            .set_default("scraper.max_price", "10000000")?
            .set_default("scheduler.recheck_interval_secs", 6 * 60 * 60)?
            .set_default("scheduler.max_concurrent_checks", 2)?
            .set_default("scheduler.max_delay_minutes", 1440)?
            .set_default("scheduler.run_on_start", true)?
            .set_default("notifications.dispatch_timeout", 15)?
            .set_default("notifications.whatsapp.api_base", "https://api.twilio.com")?
            .set_default("logging.level", "info")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9001)
    }

    /// Plain variables used by earlier deployments fill any gaps left by the
    /// prefixed configuration.
    fn apply_legacy_env(&mut self) {
        let whatsapp = &mut self.notifications.whatsapp;
        fill_from_env(&mut whatsapp.account_sid, "SID");
        fill_from_env(&mut whatsapp.auth_token, "AUTH");
        fill_from_env(&mut whatsapp.from_number, "FROM_WHATSAPP");
        fill_from_env(&mut whatsapp.default_recipient, "TO_WHATSAPP");

        if let Ok(agent) = env::var("USER_AGENT") {
            self.scraper.user_agent = agent;
        }
        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper request_timeout must be greater than 0".into()));
        }

        if self.scraper.min_price <= Decimal::ZERO || self.scraper.min_price > self.scraper.max_price {
            return Err(ConfigError::Message(
                "Scraper price bounds must satisfy 0 < min_price <= max_price".into(),
            ));
        }

        if self.scheduler.recheck_interval_secs == 0 {
            return Err(ConfigError::Message("Scheduler recheck_interval_secs must be greater than 0".into()));
        }

        if self.scheduler.max_concurrent_checks == 0 {
            return Err(ConfigError::Message("Scheduler max_concurrent_checks must be greater than 0".into()));
        }

        if self.notifications.dispatch_timeout == 0 {
            return Err(ConfigError::Message("Notifications dispatch_timeout must be greater than 0".into()));
        }

        if let Some(recipient) = &self.notifications.whatsapp.default_recipient {
            if recipient.trim().is_empty() {
                return Err(ConfigError::Message("Default recipient must not be empty".into()));
            }
        }

        if url::Url::parse(&self.notifications.whatsapp.api_base).is_err() {
            return Err(ConfigError::Message("Invalid WhatsApp api_base URL".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    /// Same values as the built-in configuration layer, with no credentials.
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                shutdown_timeout: 10,
            },
            database: DatabaseConfig {
                url: "sqlite://data/pricewatch.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            scraper: ScraperConfig {
                request_timeout: 20,
                user_agent: DEFAULT_USER_AGENT.to_string(),
                retry_attempts: 2,
                retry_delay_ms: 1000,
                min_price: Decimal::new(1, 2),
                max_price: Decimal::from(10_000_000),
            },
            scheduler: SchedulerConfig {
                recheck_interval_secs: 6 * 60 * 60,
                max_concurrent_checks: 2,
                max_delay_minutes: 1440,
                run_on_start: true,
            },
            notifications: NotificationsConfig {
                dispatch_timeout: 15,
                whatsapp: WhatsAppConfig {
                    account_sid: None,
                    auth_token: None,
                    from_number: None,
                    default_recipient: None,
                    api_base: "https://api.twilio.com".to_string(),
                },
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: None,
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9001,
            },
        }
    }
}

fn fill_from_env(slot: &mut Option<String>, key: &str) {
    if slot.is_none() {
        *slot = env::var(key).ok().filter(|v| !v.trim().is_empty());
    }
}
