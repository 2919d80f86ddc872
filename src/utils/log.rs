use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Open a fresh log file for this process, creating the log directory if it
/// doesn't exist.
///
/// # Arguments
///
/// * `log_dir` - Directory for log files
/// * `role` - Which process is logging (`control`, `service`, ...)
///
/// # Returns
///
/// * `io::Result<(File, PathBuf)>` - The opened file and its path
pub fn open_log_file(log_dir: &Path, role: &str) -> io::Result<(File, PathBuf)> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let path = log_dir.join(format!("{}-{}.log", role, timestamp));

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Install the global tracing subscriber: human-readable output on stderr and,
/// when `log_dir` is configured, a plain-text copy in a per-process file.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig, role: &str) -> io::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    let (file_layer, path) = match &config.log_dir {
        Some(dir) => {
            let (file, path) = open_log_file(dir, role)?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_in_missing_directory() {
        let dir = std::env::temp_dir().join(format!("breath-lamp-logs-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let (_file, path) = open_log_file(&dir, "service").unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("service-") && name.ends_with(".log")));

        let _ = fs::remove_dir_all(&dir);
    }
}
