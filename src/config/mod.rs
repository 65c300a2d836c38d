//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, GlobalOverrides, InvalidateArgs, MaintainArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "penwell";
const ENV_PREFIX: &str = "PENWELL";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_COLLECTION: &str = "cache";
const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_ENTITY_TTL_SECS: u64 = 15 * 60;
const DEFAULT_LIST_TTL_SECS: u64 = 10 * 60;
const DEFAULT_SEARCH_TTL_SECS: u64 = 5 * 60;
const DEFAULT_TX_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_TX_BACKOFF_MS: u64 = 20;
const DEFAULT_MAINTENANCE_CADENCE_SECS: u64 = 300;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub transactions: TransactionSettings,
    pub maintenance: MaintenanceSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_memory_tier: bool,
    pub collection: String,
    pub default_ttl: Duration,
    pub entity_ttl: Duration,
    pub list_ttl: Duration,
    pub search_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct TransactionSettings {
    pub max_attempts: NonZeroU32,
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct MaintenanceSettings {
    pub cadence: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_global_overrides(&cli.overrides);
    if let Command::Maintain(args) = &cli.command {
        raw.apply_maintain_overrides(args);
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    transactions: RawTransactionSettings,
    maintenance: RawMaintenanceSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_maintain_overrides(&mut self, overrides: &MaintainArgs) {
        if let Some(cadence) = overrides.cadence_seconds {
            self.maintenance.cadence_seconds = Some(cadence);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            transactions,
            maintenance,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            transactions: build_transaction_settings(transactions)?,
            maintenance: build_maintenance_settings(maintenance)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let collection = cache
        .collection
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CACHE_COLLECTION.to_string());
    if collection.is_empty() {
        return Err(LoadError::invalid(
            "cache.collection",
            "must not be empty",
        ));
    }

    Ok(CacheSettings {
        enable_memory_tier: cache.enable_memory_tier.unwrap_or(true),
        collection,
        default_ttl: positive_seconds(
            cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
            "cache.default_ttl_seconds",
        )?,
        entity_ttl: positive_seconds(
            cache.entity_ttl_seconds.unwrap_or(DEFAULT_ENTITY_TTL_SECS),
            "cache.entity_ttl_seconds",
        )?,
        list_ttl: positive_seconds(
            cache.list_ttl_seconds.unwrap_or(DEFAULT_LIST_TTL_SECS),
            "cache.list_ttl_seconds",
        )?,
        search_ttl: positive_seconds(
            cache.search_ttl_seconds.unwrap_or(DEFAULT_SEARCH_TTL_SECS),
            "cache.search_ttl_seconds",
        )?,
    })
}

fn build_transaction_settings(
    transactions: RawTransactionSettings,
) -> Result<TransactionSettings, LoadError> {
    let max_attempts = non_zero_u32(
        transactions
            .max_attempts
            .unwrap_or(DEFAULT_TX_MAX_ATTEMPTS)
            .into(),
        "transactions.max_attempts",
    )?;
    let backoff = Duration::from_millis(
        transactions
            .backoff_ms
            .unwrap_or(DEFAULT_TX_BACKOFF_MS),
    );

    Ok(TransactionSettings {
        max_attempts,
        backoff,
    })
}

fn build_maintenance_settings(
    maintenance: RawMaintenanceSettings,
) -> Result<MaintenanceSettings, LoadError> {
    let cadence = positive_seconds(
        maintenance
            .cadence_seconds
            .unwrap_or(DEFAULT_MAINTENANCE_CADENCE_SECS),
        "maintenance.cadence_seconds",
    )?;
    Ok(MaintenanceSettings { cadence })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_memory_tier: Option<bool>,
    collection: Option<String>,
    default_ttl_seconds: Option<u64>,
    entity_ttl_seconds: Option<u64>,
    list_ttl_seconds: Option<u64>,
    search_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTransactionSettings {
    max_attempts: Option<u32>,
    backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMaintenanceSettings {
    cadence_seconds: Option<u64>,
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
