//! Logging setup shared by the consortium tooling.
//!
//! Human-readable output goes to stderr; an ANSI-free copy of every event is appended to a
//! persisted log file so that operators can be pointed at it when a command fails.

pub use {tracing, tracing_appender, tracing_subscriber};

pub use env_filter::{BuildEnvFilterError, EnvFilterBuilder, DEFAULT_RUST_LOG};

use once_cell::sync::OnceCell;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

mod env_filter;

static LOG_FILE: OnceCell<PathBuf> = OnceCell::new();

/// The resource representing a registered subscriber.
///
/// Once dropped, the subscriber is unregistered, and the output is flushed. Any messages output
/// after this value is dropped will be delivered to a previously active subscriber, if any.
pub struct DefaultSubscriberGuard<S> {
    // NB: the field order matters here. The local guard has to go first so that no new
    // messages are delivered to this subscriber while the writers flush their queues.
    subscriber: Option<S>,
    local_subscriber_guard: Option<tracing::subscriber::DefaultGuard>,
    #[allow(dead_code)] // Never read, but flushes stderr on drop.
    stderr_guard: tracing_appender::non_blocking::WorkerGuard,
    #[allow(dead_code)] // Never read, but flushes the log file on drop.
    file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl<S: tracing::Subscriber + Send + Sync> DefaultSubscriberGuard<S> {
    /// Register this default subscriber globally, for all threads.
    ///
    /// Must not be called more than once. Mutually exclusive with `Self::local`.
    pub fn global(mut self) -> Result<Self, SubscriberError> {
        let subscriber = self.subscriber.take().ok_or(SubscriberError::AlreadyTaken)?;
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|_| SubscriberError::GlobalAlreadySet)?;
        Ok(self)
    }

    /// Register this default subscriber for the current thread.
    ///
    /// Must not be called more than once. Mutually exclusive with `Self::global`.
    pub fn local(mut self) -> Result<Self, SubscriberError> {
        let subscriber = self.subscriber.take().ok_or(SubscriberError::AlreadyTaken)?;
        self.local_subscriber_guard = Some(tracing::subscriber::set_default(subscriber));
        Ok(self)
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum SubscriberError {
    #[error("trying to set a default subscriber that has been already taken")]
    AlreadyTaken,
    #[error("a global subscriber has already been installed")]
    GlobalAlreadySet,
    #[error("could not open log file {}", .0.display())]
    LogFile(PathBuf, #[source] std::io::Error),
}

/// Whether to use colored log format.
/// Option `Auto` enables color output if the logging is done to a terminal, and disables color
/// output if logging is done to a non-terminal, such as a file or input of another process.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorOutput {
    Always,
    Never,
    #[default]
    Auto,
}

/// Builds the default subscriber: a stderr layer plus, if `log_file` is given, a plain-text
/// layer appending to that file.
///
/// The parent directory of `log_file` is created when missing. The path is remembered and can be
/// retrieved with [`log_file_path`] to point operators at it.
///
/// # Example
///
/// ```rust,no_run
/// let filter = consortium_o11y::EnvFilterBuilder::from_env().finish().unwrap();
/// let _subscriber = consortium_o11y::default_subscriber(
///     filter,
///     consortium_o11y::ColorOutput::Auto,
///     None,
/// )
/// .unwrap()
/// .global()
/// .unwrap();
/// consortium_o11y::tracing::info!(target: "netctl", "logging is set up");
/// ```
pub fn default_subscriber(
    env_filter: EnvFilter,
    color_output: ColorOutput,
    log_file: Option<&Path>,
) -> Result<DefaultSubscriberGuard<impl tracing::Subscriber + Send + Sync>, SubscriberError> {
    // Do not lock the `stderr` here to allow for things like `dbg!()` work during development.
    let stderr = std::io::stderr();
    let ansi = match color_output {
        ColorOutput::Always => true,
        ColorOutput::Never => false,
        ColorOutput::Auto => stderr.is_terminal(),
    };
    let (stderr_writer, stderr_guard) =
        tracing_appender::non_blocking(std::io::LineWriter::new(stderr));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_target(false)
        .without_time()
        .with_writer(stderr_writer);

    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| SubscriberError::LogFile(path.to_path_buf(), err))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| SubscriberError::LogFile(path.to_path_buf(), err))?;
            let (file_writer, file_guard) = tracing_appender::non_blocking(file);
            let _ = LOG_FILE.set(path.to_path_buf());
            let layer =
                tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer);
            (Some(layer), Some(file_guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    Ok(DefaultSubscriberGuard {
        subscriber: Some(subscriber),
        local_subscriber_guard: None,
        stderr_guard,
        file_guard,
    })
}

/// Path of the persisted log file, if a subscriber with a file layer has been built.
pub fn log_file_path() -> Option<&'static Path> {
    LOG_FILE.get().map(PathBuf::as_path)
}
