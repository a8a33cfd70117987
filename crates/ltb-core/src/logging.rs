use std::path::{Path, PathBuf};

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{errors::Error, Result};

/// Where the persistent log goes: `dir/stem.<date>.ext`, rotated daily.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSink {
    pub dir: PathBuf,
    pub stem: String,
    pub extension: Option<String>,
    pub max_files: usize,
}

impl FileSink {
    /// Splits a configured log path such as `logs/bot.log` into directory,
    /// file stem and extension. A bare file name lands in the working directory.
    pub fn for_path(path: &Path, max_files: usize) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?.to_string();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string);
        Some(Self {
            dir,
            stem,
            extension,
            max_files,
        })
    }

    fn appender(&self) -> Result<RollingFileAppender> {
        std::fs::create_dir_all(&self.dir)?;
        let mut builder = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&self.stem);
        if let Some(ext) = &self.extension {
            builder = builder.filename_suffix(ext);
        }
        if self.max_files > 0 {
            builder = builder.max_log_files(self.max_files);
        }
        builder
            .build(&self.dir)
            .map_err(|e| Error::Config(format!("log file init failed: {e}")))
    }
}

/// Keeps the background log writer alive; logs still buffered are flushed on drop.
#[must_use = "dropping the guard stops the file log writer"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing for the bot: stderr always, plus a rotating file when
/// `file` is given.
///
/// `default_level` applies to our crates when `RUST_LOG` is unset; everything
/// else stays at `warn`.
pub fn init(service_name: &str, default_level: &str, file: Option<&FileSink>) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,ltb_core={default_level},ltb_openai={default_level},ltb_telegram={default_level},{service_name}={default_level}"
        ))
    });

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(true);

    let (file_layer, file_guard) = match file {
        Some(sink) => {
            let (writer, guard) = tracing_appender::non_blocking(sink.appender()?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging init failed: {e}")))?;

    Ok(LogGuard { _file: file_guard })
}
