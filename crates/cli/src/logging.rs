use anyhow::anyhow;
use quotedesk_core::config::{LogFormat, LoggingConfig};
use tracing::Level;

/// Installs the global subscriber. Events go to stderr so stdout carries only command output.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = config.level.trim().parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}

#[cfg(test)]
mod tests {
    use quotedesk_core::config::{LogFormat, LoggingConfig};

    use super::init_logging;

    #[test]
    fn second_install_reports_an_error() {
        let config = LoggingConfig { level: "debug".to_owned(), format: LogFormat::Json };
        let _ = init_logging(&config);

        let error = init_logging(&config).expect_err("global subscriber is already set");
        assert!(error.to_string().contains("tracing subscriber"));
    }
}
