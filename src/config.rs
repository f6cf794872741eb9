//! Configuration loader for the `smoker-sentinel` consumer and producer.
//!
//! All runtime settings come from environment variables (with optional `.env`
//! support provided by the caller). Loading goes through a lookup function so
//! tests can feed a map instead of mutating the process environment.

use std::{collections::HashMap, env, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};

use crate::{
    broker::BrokerSettings,
    evaluator::{RuleSettings, MAX_CADENCE},
    models::Signal,
    notify::{EmailSettings, NotifierSettings},
};

const MAX_NOTIFY_TIMEOUT_SECS: u64 = 3600;

/// Parse an optional typed variable with a default value.
macro_rules! parse_var {
    ($lookup:ident, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a variable that must be present when its feature is enabled.
macro_rules! require_var {
    ($lookup:ident, $var_name:expr, $why:expr) => {
        $lookup($var_name).ok_or_else(|| anyhow!("{} must be set {}", $var_name, $why))?
    };
}

// ---

/// Consumer configuration, immutable after loading.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    pub signal: Signal,
    pub broker: BrokerSettings,
    /// Durable queue to consume from.
    pub queue: String,
    pub rules: RuleSettings,
    pub notifier: NotifierSettings,
    /// Upper bound on a single notification attempt.
    pub notify_timeout: Duration,
}

/// Producer configuration.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    // ---
    pub broker: BrokerSettings,
    pub csv_path: PathBuf,
    /// Smoker, Food A and Food B queues, in CSV column order.
    pub queues: [String; 3],
    pub cadence: Duration,
}

/// Load consumer configuration from the process environment.
///
/// Optional (defaults in parentheses):
/// - `SIGNAL` – `smoker` | `food-a` | `food-b` (`smoker`)
/// - `BROKER_HOST`, `BROKER_PORT`, `BROKER_USER`, `BROKER_PASSWORD`, `BROKER_VHOST`
///   (`localhost`, 5672, `guest`, `guest`, `/`)
/// - `QUEUE_NAME` (per signal: `01-smoker`, `02-food-A`, `03-food-B`)
/// - `HISTORY_SIZE`, `EVALUATION_WINDOW`, `ALERT_THRESHOLD` (per signal)
/// - `CADENCE_SECS` (30), `NOTIFY_TIMEOUT_SECS` (10)
/// - `SMTP_HOST` enables email and then requires `ALERT_EMAIL_FROM` and
///   `ALERT_EMAIL_TO`; `SMTP_PORT` (587), `SMTP_USERNAME`, `SMTP_PASSWORD`
/// - `ALERT_WEBHOOK_URL` enables the webhook notifier when email is off
pub fn load_from_env() -> Result<Config> {
    load_with(&|key| env::var(key).ok())
}

/// Load producer configuration from the process environment.
///
/// - `PRODUCER_CSV` (`smoker-temps.csv`)
/// - `PRODUCER_QUEUES` – three comma-separated names (`01-smoker,02-food-A,03-food-B`)
/// - `CADENCE_SECS` (30) and the `BROKER_*` variables
pub fn load_producer_from_env() -> Result<ProducerConfig> {
    load_producer_with(&|key| env::var(key).ok())
}

/// Load consumer configuration from a fixed set of variables.
pub fn load_from_map(vars: &HashMap<String, String>) -> Result<Config> {
    load_with(&|key| vars.get(key).cloned())
}

/// Load producer configuration from a fixed set of variables.
pub fn load_producer_from_map(vars: &HashMap<String, String>) -> Result<ProducerConfig> {
    load_producer_with(&|key| vars.get(key).cloned())
}

fn non_empty(lookup: &dyn Fn(&str) -> Option<String>) -> impl Fn(&str) -> Option<String> + '_ {
    move |key: &str| lookup(key).filter(|v| !v.trim().is_empty())
}

fn load_broker(lookup: &dyn Fn(&str) -> Option<String>) -> Result<BrokerSettings> {
    // ---
    let var = non_empty(lookup);
    let defaults = BrokerSettings::default();
    Ok(BrokerSettings {
        host: var("BROKER_HOST").unwrap_or(defaults.host),
        port: parse_var!(var, "BROKER_PORT", u16, defaults.port),
        user: var("BROKER_USER").unwrap_or(defaults.user),
        password: var("BROKER_PASSWORD").unwrap_or(defaults.password),
        vhost: var("BROKER_VHOST").unwrap_or(defaults.vhost),
    })
}

fn load_cadence(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Duration> {
    let var = non_empty(lookup);
    let secs = parse_var!(var, "CADENCE_SECS", u64, 30);
    if secs == 0 {
        return Err(anyhow!("CADENCE_SECS must be at least 1"));
    }
    if secs > MAX_CADENCE.as_secs() {
        return Err(anyhow!("CADENCE_SECS cannot exceed {}", MAX_CADENCE.as_secs()));
    }
    Ok(Duration::from_secs(secs))
}

fn load_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Config> {
    // ---
    let var = non_empty(lookup);

    let signal = match var("SIGNAL") {
        Some(s) => s.parse::<Signal>().map_err(|e| anyhow!("Invalid SIGNAL: {e}"))?,
        None => Signal::Smoker,
    };
    let broker = load_broker(lookup)?;
    let queue = var("QUEUE_NAME").unwrap_or_else(|| signal.default_queue().to_string());

    let defaults = RuleSettings::defaults(signal);
    let history_size = parse_var!(var, "HISTORY_SIZE", usize, defaults.history_size);
    // The smoker rule looks at its whole history, so its window follows
    // HISTORY_SIZE unless set explicitly.
    let default_window = match signal {
        Signal::Smoker => history_size,
        _ => defaults.evaluation_window,
    };
    let rules = RuleSettings {
        signal,
        history_size,
        evaluation_window: parse_var!(var, "EVALUATION_WINDOW", usize, default_window),
        threshold: parse_var!(var, "ALERT_THRESHOLD", f64, defaults.threshold),
        cadence: load_cadence(lookup)?,
    };
    rules.validate()?;

    let timeout_secs = parse_var!(var, "NOTIFY_TIMEOUT_SECS", u64, 10);
    if !(1..=MAX_NOTIFY_TIMEOUT_SECS).contains(&timeout_secs) {
        return Err(anyhow!(
            "NOTIFY_TIMEOUT_SECS must be between 1 and {MAX_NOTIFY_TIMEOUT_SECS}"
        ));
    }

    let notifier = if let Some(smtp_host) = var("SMTP_HOST") {
        let to = require_var!(var, "ALERT_EMAIL_TO", "when SMTP_HOST is set");
        NotifierSettings::Email(EmailSettings {
            smtp_host,
            smtp_port: parse_var!(var, "SMTP_PORT", u16, 587),
            username: var("SMTP_USERNAME"),
            password: var("SMTP_PASSWORD"),
            from: require_var!(var, "ALERT_EMAIL_FROM", "when SMTP_HOST is set"),
            to: to
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        })
    } else if let Some(url) = var("ALERT_WEBHOOK_URL") {
        NotifierSettings::Webhook { url }
    } else {
        NotifierSettings::Log
    };

    Ok(Config {
        signal,
        broker,
        queue,
        rules,
        notifier,
        notify_timeout: Duration::from_secs(timeout_secs),
    })
}

fn load_producer_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<ProducerConfig> {
    // ---
    let var = non_empty(lookup);

    let queues = match var("PRODUCER_QUEUES") {
        Some(list) => {
            let names: Vec<String> = list.split(',').map(|s| s.trim().to_string()).collect();
            <[String; 3]>::try_from(names).map_err(|names| {
                anyhow!(
                    "Invalid PRODUCER_QUEUES: expected 3 queue names, got {}",
                    names.len()
                )
            })?
        }
        None => Signal::ALL.map(|s| s.default_queue().to_string()),
    };
    if queues.iter().any(|q| q.is_empty()) {
        return Err(anyhow!("Invalid PRODUCER_QUEUES: empty queue name"));
    }

    Ok(ProducerConfig {
        broker: load_broker(lookup)?,
        csv_path: var("PRODUCER_CSV")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("smoker-temps.csv")),
        queues,
        cadence: load_cadence(lookup)?,
    })
}

impl Config {
    /// Log the loaded configuration, masking credentials.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  SIGNAL            : {}", self.signal);
        tracing::info!("  BROKER            : {}", self.broker.masked_uri());
        tracing::info!("  QUEUE_NAME        : {}", self.queue);
        tracing::info!("  HISTORY_SIZE      : {}", self.rules.history_size);
        tracing::info!("  EVALUATION_WINDOW : {}", self.rules.evaluation_window);
        tracing::info!("  ALERT_THRESHOLD   : {}", self.rules.threshold);
        tracing::info!("  CADENCE_SECS      : {}", self.rules.cadence.as_secs());
        tracing::info!("  NOTIFIER          : {}", self.notifier.kind());
        tracing::info!("  NOTIFY_TIMEOUT    : {:?}", self.notify_timeout);
        if let NotifierSettings::Email(email) = &self.notifier {
            tracing::info!(
                "  SMTP              : {}:{} (auth: {})",
                email.smtp_host,
                email.smtp_port,
                if email.password.is_some() { "****" } else { "none" }
            );
            tracing::info!("  ALERT_EMAIL_TO    : {}", email.to.join(", "));
        }
    }
}

impl ProducerConfig {
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  BROKER          : {}", self.broker.masked_uri());
        tracing::info!("  PRODUCER_CSV    : {}", self.csv_path.display());
        tracing::info!("  PRODUCER_QUEUES : {}", self.queues.join(", "));
        tracing::info!("  CADENCE_SECS    : {}", self.cadence.as_secs());
    }
}
