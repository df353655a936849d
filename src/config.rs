use crate::models::FeeSchedule;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub commission: CommissionSettings,
    #[serde(default)]
    pub auto_resolution: AutoResolutionSettings,
    #[serde(default)]
    pub fund_request: FundRequestSettings,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub log_source_location: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommissionSettings {
    /// Pay a missing hierarchy role to any active user holding it.
    pub fallback_to_any_active_user: bool,
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            fallback_to_any_active_user: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoResolutionSettings {
    pub timeout_minutes: i64,
    pub interval_seconds: u64,
}

impl Default for AutoResolutionSettings {
    fn default() -> Self {
        Self {
            timeout_minutes: 10,
            interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundRequestSettings {
    pub fee_rate: Decimal,
    pub min_fee: Decimal,
}

impl Default for FundRequestSettings {
    fn default() -> Self {
        let schedule = FeeSchedule::default();
        Self {
            fee_rate: schedule.rate,
            min_fee: schedule.min_fee,
        }
    }
}

impl FundRequestSettings {
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            rate: self.fee_rate,
            min_fee: self.min_fee,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
