//! Log output for nextdav hosts.
//!
//! The protocol crates only emit events through the `tracing` macros. A host
//! process decides where they go by calling [`init_tracing`] once at startup;
//! tests can instead run a closure under [`capture_logs`] and inspect what was
//! written.
//!
//! ```ignore
//! use nextdav_core::tracing::{init_tracing, TracingConfig, TracingOutputFormat};
//!
//! init_tracing(TracingConfig::default().with_format(TracingOutputFormat::Json))?;
//! ```

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::LevelFilter,
    fmt::{self, MakeWriter, format::FmtSpan},
    layer::Filter,
    prelude::*,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber is already installed.
    #[error("tracing already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid filter directive {directive:?}: {source}")]
    InvalidFilter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
}

/// How each event is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, human-readable.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// JSON lines, for hosts that ship logs to a collector.
    Json,
}

/// Where logs go and how much of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for `nextdav*` targets when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Explicit filter directive; takes precedence over `RUST_LOG`.
    pub filter: Option<String>,
    pub show_target: bool,
    /// File and line of the emitting macro.
    pub show_location: bool,
    pub show_time: bool,
    /// Log span creation and close.
    pub span_events: bool,
    /// Color escapes in pretty and compact output.
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            filter: None,
            show_target: true,
            show_location: false,
            show_time: true,
            span_events: false,
            ansi: true,
        }
    }
}

impl TracingConfig {
    /// Compact trace-level output for inspecting generated and received XML.
    #[must_use]
    pub fn protocol_debug() -> Self {
        Self {
            level: Level::TRACE,
            format: TracingOutputFormat::Compact,
            show_location: true,
            show_time: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    /// The directive used when neither `filter` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        format!("nextdav={}", self.level)
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.filter {
            Some(directive) => {
                EnvFilter::try_new(directive).map_err(|source| TracingError::InvalidFilter {
                    directive: directive.clone(),
                    source,
                })
            }
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }

    fn output_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let span_events = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.ansi)
            .with_target(self.show_target)
            .with_file(self.show_location)
            .with_line_number(self.show_location)
            .with_span_events(span_events);

        match (self.format, self.show_time) {
            (TracingOutputFormat::Pretty, true) => layer.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => layer.compact().boxed(),
            (TracingOutputFormat::Compact, false) => layer.compact().without_time().boxed(),
            (TracingOutputFormat::Json, true) => layer.json().boxed(),
            (TracingOutputFormat::Json, false) => layer.json().without_time().boxed(),
        }
    }

    fn subscriber<W, F>(&self, writer: W, filter: F) -> impl Subscriber + Send + Sync + 'static
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
        F: Filter<Registry> + Send + Sync + 'static,
    {
        tracing_subscriber::registry().with(self.output_layer(writer).with_filter(filter))
    }
}

/// Installs the global subscriber, writing to stderr.
///
/// # Errors
///
/// Fails if the filter directive does not parse or a global subscriber is
/// already set.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    tracing::subscriber::set_global_default(config.subscriber(io::stderr, filter))?;
    Ok(())
}

/// Log lines written while a [`capture_logs`] closure ran.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a thread-local subscriber that records every event at
/// `level` or above as compact plain text.
pub fn capture_logs<T>(level: Level, f: impl FnOnce() -> T) -> (T, CapturedLogs) {
    let logs = CapturedLogs::default();
    let config = TracingConfig {
        level,
        format: TracingOutputFormat::Compact,
        show_time: false,
        ansi: false,
        ..TracingConfig::default()
    };
    let subscriber = config.subscriber(logs.clone(), LevelFilter::from_level(level));
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, logs)
}
