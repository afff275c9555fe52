use harrier::cli::CliOverrides;
use harrier::config::AppConfig;
use harrier::logging::{init_logging, LoggingConfig};
use harrier::run_with_config;

fn main() {
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    let config_path = cli.config_path();
    let loaded = AppConfig::load(&config_path);
    let filter = loaded.as_ref().ok().and_then(|cfg| cfg.logging.filter.clone());
    init_logging(LoggingConfig::with_filter(filter.as_deref()));

    let mut config = loaded.unwrap_or_else(|err| {
        log::warn!("Config load error: {err:#}. Falling back to defaults.");
        AppConfig::default()
    });
    let overrides = cli.into_config_overrides();
    if !overrides.is_empty() {
        log::info!("CLI overrides applied: {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);

    if let Err(err) = pollster::block_on(run_with_config(config)) {
        log::error!("Application error: {err:?}");
        std::process::exit(1);
    }
}
