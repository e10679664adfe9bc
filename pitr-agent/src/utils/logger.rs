//! Logging configuration using tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the specified level.
///
/// `RUST_LOG` takes precedence over `level` when set. Logs go to stderr so
/// that dry-run restores can stream replay SQL on stdout.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}

/// Map a `-v` count onto a level name, falling back to the configured level.
pub fn level_for_verbosity(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
