//! Process-wide tracing setup shared by both binaries.
//!
//! Environment switches:
//! - `LOG_LEVEL` (`info`), overridden entirely by `RUST_LOG` when set
//! - `FORCE_COLOR` (`1|true|yes` / `0|false|no`), otherwise TTY detection
//! - `LOG_SPAN_EVENTS` (`full`, `enter_exit`, default close only)

use std::{env, io::IsTerminal};

use tracing_subscriber::{filter::EnvFilter, fmt::format::FmtSpan};

/// AMQP client crates are noisy at `info`; keep them at `warn`.
const QUIET_DEPENDENCIES: &str = "lapin=warn,pinky_swear=warn";

// ---

/// Logging choices resolved from the environment before the subscriber exists.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    // ---
    /// `None` when `RUST_LOG` drives the filter.
    pub level: Option<&'static str>,
    /// `None` defers to TTY detection.
    pub color: Option<bool>,
    pub span_events: SpanEvents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanEvents {
    Close,
    EnterExit,
    Full,
}

impl SpanEvents {
    fn to_fmt_span(self) -> FmtSpan {
        match self {
            SpanEvents::Close => FmtSpan::CLOSE,
            SpanEvents::EnterExit => FmtSpan::ENTER | FmtSpan::EXIT,
            SpanEvents::Full => FmtSpan::FULL,
        }
    }
}

impl LogSettings {
    // ---
    pub fn from_env() -> Self {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup(var: &dyn Fn(&str) -> Option<String>) -> Self {
        // ---
        let level = match var("RUST_LOG") {
            Some(_) => None,
            None => Some(match var("LOG_LEVEL").as_deref().map(str::trim) {
                Some("trace") => "trace",
                Some("debug") => "debug",
                Some("warn") => "warn",
                Some("error") => "error",
                _ => "info",
            }),
        };

        let color = match var("FORCE_COLOR").as_deref() {
            Some("1" | "true" | "yes") => Some(true),
            Some("0" | "false" | "no") => Some(false),
            _ => None,
        };

        let span_events = match var("LOG_SPAN_EVENTS").as_deref() {
            Some("full") => SpanEvents::Full,
            Some("enter_exit") => SpanEvents::EnterExit,
            _ => SpanEvents::Close,
        };

        Self {
            level,
            color,
            span_events,
        }
    }

    /// Filter directive used when `RUST_LOG` is absent.
    pub fn directive(&self) -> Option<String> {
        self.level.map(|level| format!("{level},{QUIET_DEPENDENCIES}"))
    }
}

/// Install the global subscriber. Call once, before any logging.
pub fn init_tracing() {
    // ---
    let settings = LogSettings::from_env();

    let filter = match settings.directive() {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::from_default_env(),
    };
    let ansi = settings
        .color
        .unwrap_or_else(|| std::io::stdout().is_terminal());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(settings.span_events.to_fmt_span())
        .with_ansi(ansi)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .init();
}
