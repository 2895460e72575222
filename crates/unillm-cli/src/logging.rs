use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use unillm_config::LoggingConfig;

/// Install the global subscriber. `--debug` beats `RUST_LOG`, which beats the config level.
/// `log` records from the library crates are forwarded to the same subscriber.
pub fn init(config: &LoggingConfig, debug: bool) -> anyhow::Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()))
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = match config.file.as_deref().and_then(unillm_config::expand_tilde) {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}
