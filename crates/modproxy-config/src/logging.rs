use std::io;
use std::sync::{Mutex, Once};

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt, TestWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

impl LoggingConfig {
    /// `level` as `EnvFilter` directives. Bare level names are accepted in
    /// any case (plus `warning`); anything else passes through unchanged.
    pub(crate) fn directives(level: &str) -> String {
        let level = level.trim();
        if level.is_empty() {
            return Self::default_level();
        }
        if level.eq_ignore_ascii_case("warning") {
            return "warn".to_owned();
        }
        match level.parse::<Level>() {
            Ok(parsed) if !level.starts_with(|c: char| c.is_ascii_digit()) => {
                parsed.as_str().to_ascii_lowercase()
            }
            _ => level.to_owned(),
        }
    }

    fn configured_filter(&self) -> EnvFilter {
        EnvFilter::try_new(Self::directives(&self.level))
            .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }

    /// The effective filter: configured level, with `RUST_LOG` appended when
    /// set so its directives take precedence.
    pub fn env_filter(&self) -> EnvFilter {
        let from_env = std::env::var("RUST_LOG").unwrap_or_default();
        let from_env = from_env.trim();
        if from_env.is_empty() {
            return self.configured_filter();
        }

        let configured = Self::directives(&self.level);
        EnvFilter::try_new(format!("{configured},{from_env}"))
            .or_else(|_| EnvFilter::try_new(from_env))
            .unwrap_or_else(|_| self.configured_filter())
    }

    fn make_writer(&self) -> (BoxMakeWriter, Option<io::Error>) {
        let mut writer = BoxMakeWriter::new(io::sink);
        if self.stderr {
            // libtest only captures the print macros; debug builds route
            // through `TestWriter` so test output stays quiet.
            writer = if cfg!(debug_assertions) {
                BoxMakeWriter::new(writer.and(TestWriter::with_stderr))
            } else {
                BoxMakeWriter::new(writer.and(io::stderr))
            };
        }

        let Some(path) = &self.file else {
            return (writer, None);
        };
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => (BoxMakeWriter::new(writer.and(Mutex::new(file))), None),
            Err(err) => (writer, Some(err)),
        }
    }
}

static INIT: Once = Once::new();

/// Installs the process-wide `tracing` subscriber described by `config`.
///
/// Only the first call has an effect; returns whether this call installed
/// the subscriber.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let mut installed = false;

    INIT.call_once(|| {
        let (writer, file_error) = config.make_writer();
        let fmt = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        let fmt: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            fmt.json().boxed()
        } else {
            fmt.boxed()
        };

        let subscriber = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(fmt);
        installed = tracing::subscriber::set_global_default(subscriber).is_ok();

        if let (true, Some(err), Some(path)) = (installed, file_error, &config.file) {
            tracing::warn!(
                target: "modproxy.config",
                path = %path.display(),
                error = %err,
                "cannot open log file; logging to stderr only"
            );
        }
    });

    installed
}
