use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use quotedesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = SourceLookup { doc: config_file_doc.as_ref(), path: config_file_path };

    let entries = [
        ("database.url", config.database.url.clone(), &["QUOTEDESK_DATABASE_URL"][..]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["QUOTEDESK_DATABASE_MAX_CONNECTIONS"][..],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["QUOTEDESK_DATABASE_TIMEOUT_SECS"][..],
        ),
        (
            "pricing.currency",
            config.pricing.currency.clone(),
            &["QUOTEDESK_PRICING_CURRENCY"][..],
        ),
        (
            "pricing.quotation_number_prefix",
            config.pricing.quotation_number_prefix.clone(),
            &["QUOTEDESK_PRICING_QUOTATION_NUMBER_PREFIX"][..],
        ),
        (
            "pricing.default_markup_percentage",
            config.pricing.default_markup_percentage.to_string(),
            &["QUOTEDESK_PRICING_DEFAULT_MARKUP_PERCENTAGE"][..],
        ),
        (
            "pricing.default_tax_percentage",
            config.pricing.default_tax_percentage.to_string(),
            &["QUOTEDESK_PRICING_DEFAULT_TAX_PERCENTAGE"][..],
        ),
        (
            "concurrency.max_write_attempts",
            config.concurrency.max_write_attempts.to_string(),
            &["QUOTEDESK_CONCURRENCY_MAX_WRITE_ATTEMPTS"][..],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["QUOTEDESK_LOGGING_LEVEL", "QUOTEDESK_LOG_LEVEL"][..],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["QUOTEDESK_LOGGING_FORMAT", "QUOTEDESK_LOG_FORMAT"][..],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(|(key, value, env_keys)| {
        render_line(key, value, sources.field_source(key, env_keys))
    }));
    lines.join("\n")
}

struct SourceLookup<'a> {
    doc: Option<&'a Value>,
    path: Option<PathBuf>,
}

impl SourceLookup<'_> {
    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        let set_env_key = env_keys
            .iter()
            .find(|key| env::var(key).map_or(false, |value| !value.trim().is_empty()));
        if let Some(env_key) = set_env_key {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, SourceLookup};

    #[test]
    fn nested_keys_are_found_in_the_file() {
        let doc: Value = "[pricing]\ncurrency = \"EUR\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "pricing.currency"));
        assert!(!contains_path(&doc, "pricing.default_tax_percentage"));
        assert!(!contains_path(&doc, "database.url"));
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let doc: Value = "[pricing]\ncurrency = \"EUR\"\n".parse().expect("toml");
        let lookup = SourceLookup { doc: Some(&doc), path: Some("quotedesk.toml".into()) };

        assert_eq!(
            lookup.field_source("pricing.currency", &["QUOTEDESK_TEST_UNSET_KEY"]),
            "file (quotedesk.toml)"
        );
        assert_eq!(lookup.field_source("pricing.quotation_number_prefix", &[]), "default");
    }
}
