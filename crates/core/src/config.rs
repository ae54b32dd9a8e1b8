use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpq::pricing::validate_percentage;
use crate::domain::catalog::validate_currency;

/// Files tried in order when no explicit path is given.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["quotedesk.toml", "config/quotedesk.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pricing: PricingConfig,
    pub concurrency: ConcurrencyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub currency: String,
    pub quotation_number_prefix: String,
    pub default_markup_percentage: Decimal,
    pub default_tax_percentage: Decimal,
}

#[derive(Clone, Debug)]
pub struct ConcurrencyConfig {
    pub max_write_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub quotation_number_prefix: Option<String>,
    pub max_write_attempts: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://quotedesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            pricing: PricingConfig {
                currency: "USD".to_string(),
                quotation_number_prefix: "QT".to_string(),
                default_markup_percentage: Decimal::ZERO,
                default_tax_percentage: Decimal::ZERO,
            },
            concurrency: ConcurrencyConfig { max_write_attempts: 3 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(currency) = pricing.currency {
                self.pricing.currency = currency;
            }
            if let Some(prefix) = pricing.quotation_number_prefix {
                self.pricing.quotation_number_prefix = prefix;
            }
            if let Some(markup) = pricing.default_markup_percentage {
                self.pricing.default_markup_percentage = markup;
            }
            if let Some(tax) = pricing.default_tax_percentage {
                self.pricing.default_tax_percentage = tax;
            }
        }

        if let Some(concurrency) = patch.concurrency {
            if let Some(max_write_attempts) = concurrency.max_write_attempts {
                self.concurrency.max_write_attempts = max_write_attempts;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("QUOTEDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("QUOTEDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("QUOTEDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("QUOTEDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("QUOTEDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QUOTEDESK_PRICING_CURRENCY") {
            self.pricing.currency = value;
        }
        if let Some(value) = read_env("QUOTEDESK_PRICING_QUOTATION_NUMBER_PREFIX") {
            self.pricing.quotation_number_prefix = value;
        }
        if let Some(value) = read_env("QUOTEDESK_PRICING_DEFAULT_MARKUP_PERCENTAGE") {
            self.pricing.default_markup_percentage =
                parse_decimal("QUOTEDESK_PRICING_DEFAULT_MARKUP_PERCENTAGE", &value)?;
        }
        if let Some(value) = read_env("QUOTEDESK_PRICING_DEFAULT_TAX_PERCENTAGE") {
            self.pricing.default_tax_percentage =
                parse_decimal("QUOTEDESK_PRICING_DEFAULT_TAX_PERCENTAGE", &value)?;
        }

        if let Some(value) = read_env("QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS") {
            self.concurrency.max_write_attempts =
                parse_u32("QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS", &value)?;
        }

        let log_level =
            read_env("QUOTEDESK_LOGGING_LEVEL").or_else(|| read_env("QUOTEDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUOTEDESK_LOGGING_FORMAT").or_else(|| read_env("QUOTEDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(prefix) = overrides.quotation_number_prefix {
            self.pricing.quotation_number_prefix = prefix;
        }
        if let Some(max_write_attempts) = overrides.max_write_attempts {
            self.concurrency.max_write_attempts = max_write_attempts;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_pricing(&self.pricing)?;
        validate_concurrency(&self.concurrency)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `AppConfig::load` would read for `explicit_path`, if any exists.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    validate_currency(&pricing.currency).map_err(|_| {
        ConfigError::Validation(format!(
            "pricing.currency must be a 3-letter uppercase code, got `{}`",
            pricing.currency
        ))
    })?;

    let prefix = pricing.quotation_number_prefix.as_str();
    let valid_prefix = !prefix.is_empty()
        && prefix.len() <= 20
        && prefix.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid_prefix {
        return Err(ConfigError::Validation(
            "pricing.quotation_number_prefix must be 1-20 characters of [A-Za-z0-9_-]"
                .to_string(),
        ));
    }

    validate_percentage("default_markup_percentage", pricing.default_markup_percentage)
        .map_err(|error| ConfigError::Validation(format!("pricing.{error}")))?;
    validate_percentage("default_tax_percentage", pricing.default_tax_percentage)
        .map_err(|error| ConfigError::Validation(format!("pricing.{error}")))?;

    Ok(())
}

fn validate_concurrency(concurrency: &ConcurrencyConfig) -> Result<(), ConfigError> {
    if concurrency.max_write_attempts == 0 || concurrency.max_write_attempts > 10 {
        return Err(ConfigError::Validation(
            "concurrency.max_write_attempts must be in range 1..=10".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    pricing: Option<PricingPatch>,
    concurrency: Option<ConcurrencyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    currency: Option<String>,
    quotation_number_prefix: Option<String>,
    default_markup_percentage: Option<Decimal>,
    default_tax_percentage: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ConcurrencyPatch {
    max_write_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_any_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.pricing.currency == "USD", "default currency should be USD")?;
        ensure(config.pricing.quotation_number_prefix == "QT", "default prefix should be QT")?;
        ensure(config.concurrency.max_write_attempts == 3, "default attempts should be 3")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_QUOTEDESK_DB_PATH", "/tmp/interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("quotedesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_QUOTEDESK_DB_PATH}"

[pricing]
currency = "EUR"
default_markup_percentage = "12.5"
default_tax_percentage = 19
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite:///tmp/interpolated.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.pricing.currency == "EUR", "currency should come from file")?;
            ensure(
                config.pricing.default_markup_percentage == Decimal::new(125, 1),
                "markup should parse from a string",
            )?;
            ensure(
                config.pricing.default_tax_percentage == Decimal::from(19),
                "tax should parse from an integer",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_QUOTEDESK_DB_PATH"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTEDESK_LOG_LEVEL", "warn");
        env::set_var("QUOTEDESK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["QUOTEDESK_LOG_LEVEL", "QUOTEDESK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTEDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("quotedesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[pricing]
quotation_number_prefix = "FILE"

[concurrency]
max_write_attempts = 2

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.concurrency.max_write_attempts == 5,
                "env write attempts should win over file",
            )?;
            ensure(
                config.pricing.quotation_number_prefix == "FILE",
                "file prefix should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&["QUOTEDESK_DATABASE_URL", "QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTEDESK_PRICING_DEFAULT_TAX_PERCENTAGE", "-3");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("default_tax_percentage")
            );
            ensure(has_message, "validation failure should mention default_tax_percentage")
        })();

        clear_vars(&["QUOTEDESK_PRICING_DEFAULT_TAX_PERCENTAGE"]);
        result
    }

    #[test]
    fn malformed_env_values_are_reported_with_their_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS", "many");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS"
                ),
                "error should name the offending env var",
            )
        })();

        clear_vars(&["QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS"]);
        result
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let error = AppConfig::load(LoadOptions {
            config_path: Some(missing),
            require_file: true,
            ..LoadOptions::default()
        })
        .err();

        ensure(
            matches!(error, Some(ConfigError::MissingConfigFile(_))),
            "missing required file should be reported",
        )
    }

    #[test]
    fn prefix_and_attempt_bounds_are_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let bad_prefix = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                quotation_number_prefix: Some("QT 2026".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(
            matches!(
                bad_prefix,
                Err(ConfigError::Validation(ref message)) if message.contains("prefix")
            ),
            "prefix with whitespace should fail",
        )?;

        let zero_attempts = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                max_write_attempts: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(
            matches!(zero_attempts, Err(ConfigError::Validation(_))),
            "zero write attempts should fail",
        )
    }
}
