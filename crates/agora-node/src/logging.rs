use crate::config_loader::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Level the CLI verbosity flag maps to, if any
pub fn verbosity_level(cli_verbose: u8) -> Option<&'static str> {
    match cli_verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Filter from `RUST_LOG`, else `agora=<level>` plus per-module directives
pub fn build_filter(config: &LoggingConfig, level: &str) -> anyhow::Result<EnvFilter> {
    let mut filter =
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| default_directives(level)));

    for (module, module_level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, module_level).parse()?);
    }
    Ok(filter)
}

fn default_directives(level: &str) -> String {
    // Crate targets are agora_types, agora_jobs, ...; the `agora` prefix alone
    // would not match them.
    [
        "agora",
        "agora_node",
        "agora_types",
        "agora_economics",
        "agora_vrf",
        "agora_consensus",
        "agora_jobs",
    ]
    .iter()
    .map(|target| format!("{}={}", target, level))
    .collect::<Vec<_>>()
    .join(",")
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let log_level = verbosity_level(cli_verbose).unwrap_or(config.level.as_str());
    let filter = build_filter(config, log_level)?;

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_writer(std::io::stderr);

            if let Some(file_path) = &config.file_output {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(file_path)?;
                let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);
                subscriber.with(json_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(json_layer).try_init()?;
            }
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_line_number(false)
                .with_file(false)
                .with_writer(std::io::stderr);

            if let Some(file_path) = &config.file_output {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(file_path)?;
                let file_layer = fmt::layer().compact().with_writer(file).with_ansi(false);
                subscriber.with(compact_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(compact_layer).try_init()?;
            }
        }
        _ => {
            // Source locations only at debug and below
            let show_location = matches!(log_level, "debug" | "trace");

            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_line_number(show_location)
                .with_file(show_location)
                .with_writer(std::io::stderr);

            if let Some(file_path) = &config.file_output {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(file_path)?;
                let file_layer = fmt::layer().with_writer(file).with_ansi(false);
                subscriber.with(pretty_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(pretty_layer).try_init()?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides() {
        assert_eq!(verbosity_level(0), None);
        assert_eq!(verbosity_level(1), Some("debug"));
        assert_eq!(verbosity_level(4), Some("trace"));
    }

    #[test]
    fn test_default_directives_cover_crates() {
        let directives = default_directives("warn");
        assert!(directives.contains("agora_jobs=warn"));
        assert!(directives.contains("agora_consensus=warn"));
    }

    #[test]
    fn test_bad_module_filter_is_an_error() {
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("agora_jobs".to_string(), "not a level!".to_string());
        assert!(build_filter(&config, "info").is_err());
    }
}
