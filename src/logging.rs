use std::path::Path;

use flexi_logger::{FileSpec, Logger, LoggerHandle, WriteMode};

use crate::error::AppError;

/// Initialize logging. In debug mode, logs to stdout + file.
/// In release mode, logs errors only to file with rotation.
///
/// `level` overrides the default spec; `RUST_LOG` still wins in debug builds.
pub fn init(log_dir: &Path, level: Option<&str>) -> Result<LoggerHandle, AppError> {
    let file_spec = FileSpec::default()
        .directory(log_dir)
        .basename("dialogs-search");

    let logger = if cfg!(debug_assertions) {
        Logger::try_with_env_or_str(level.unwrap_or("debug"))?
            .log_to_file(file_spec)
            .duplicate_to_stdout(flexi_logger::Duplicate::All)
    } else {
        Logger::try_with_str(level.unwrap_or("error"))?
            .log_to_file(file_spec)
            .rotate(
                flexi_logger::Criterion::Size(10_000_000), // 10MB
                flexi_logger::Naming::Numbers,
                flexi_logger::Cleanup::KeepLogFiles(3),
            )
    };

    Ok(logger.write_mode(WriteMode::BufferAndFlush).start()?)
}

/// Stderr-only logging for when the log directory is unusable.
pub fn init_fallback() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Switch a running logger to the level stored in the config. An explicit
/// `RUST_LOG` keeps precedence in debug builds, as in [`init`].
pub fn apply_level(handle: &LoggerHandle, level: &str) -> Result<(), AppError> {
    if cfg!(debug_assertions) && std::env::var_os("RUST_LOG").is_some() {
        return Ok(());
    }
    handle.parse_new_spec(level)?;
    log::info!("Log level set to {}", level);
    Ok(())
}
