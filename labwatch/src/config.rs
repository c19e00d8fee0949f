//! Service configuration, read once from the environment at startup.
//!
//! Every variable has a default matching the lab deployment; anything set
//! but unparsable is a fatal [`ConfigError`] rather than a silent
//! fallback.

use std::collections::HashSet;
use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::alert::{Command, Comparator, SignalSpec};
use crate::sink::{TELEGRAM_API_BASE, TelegramConfig};

pub const DEFAULT_MQTT_HOST: &str = "broker.hivemq.com";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC_NS: &str = "lstiot/lab/room1";
pub const DEFAULT_API_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 7786));
pub const DEFAULT_LOCATION: &str = "Lab Room 1";

const DEFAULT_TEMP_HIGH_C: f64 = 35.0;
const DEFAULT_GAS_RAW_HIGH: f64 = 1800.0;
const DEFAULT_LUX_LOW: f64 = 500.0;
const DEFAULT_STREAK: u32 = 5;
const DEFAULT_COOLDOWN_MS: u64 = 10_000;

/// Records kept in memory for the status API.
const RECENT_EVENTS: usize = 500;

/// Samples kept in memory for the history API; about a month at one
/// sample per minute.
const DEFAULT_HISTORY_CAPACITY: usize = 50_000;

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const TRACKED_ACTUATORS: [&str; 2] = ["light", "fan"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid signal {signal:?}: {reason}")]
    InvalidSignal { signal: String, reason: String },

    #[error("signal {0:?} is defined more than once")]
    DuplicateSignal(String),

    #[error("no signals configured")]
    NoSignals,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub mqtt: MqttConfig,
    /// Topic prefix, e.g. `lstiot/lab/room1`.
    pub topic_namespace: String,
    /// Validated, with unique names.
    pub signals: Vec<SignalSpec>,
    pub tracked_actuators: Vec<String>,
    pub telegram: TelegramConfig,
    /// Optional JSON-lines audit file.
    pub event_log_path: Option<PathBuf>,
    pub recent_events: usize,
    /// Optional JSON-lines file receiving every sample.
    pub sample_log_path: Option<PathBuf>,
    pub history_capacity: usize,
    pub api_addr: SocketAddr,
    /// Upper bound on handing a command to the MQTT client.
    pub command_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable lookup. Empty
    /// values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };

        let mqtt = MqttConfig {
            host: env.string("MQTT_HOST", DEFAULT_MQTT_HOST),
            port: env.parse("MQTT_PORT", DEFAULT_MQTT_PORT)?,
            tls: env.flag("MQTT_TLS", false)?,
        };

        let streak: u32 = env.parse("STREAK_NEEDED", DEFAULT_STREAK)?;
        let cooldown = Duration::from_millis(env.parse("ALERT_COOLDOWN_MS", DEFAULT_COOLDOWN_MS)?);

        let signals = match env.get("LABWATCH_SIGNALS") {
            Some(path) => load_signals(&path, streak, cooldown)?,
            None => vec![
                SignalSpec::temperature(
                    env.parse("TEMP_HIGH_C", DEFAULT_TEMP_HIGH_C)?,
                    streak,
                    cooldown,
                ),
                SignalSpec::gas(
                    env.parse("GAS_RAW_HIGH", DEFAULT_GAS_RAW_HIGH)?,
                    streak,
                    cooldown,
                ),
                SignalSpec::low_light(env.parse("LUX_LOW", DEFAULT_LUX_LOW)?, streak, cooldown),
            ],
        };
        validate_signals(&signals)?;

        let telegram = TelegramConfig {
            bot_token: env.string("TELEGRAM_BOT_TOKEN", ""),
            chat_id: env.string("TELEGRAM_CHAT_ID", ""),
            location: env.string("ALERT_LOCATION", DEFAULT_LOCATION),
            api_base: env.string("TELEGRAM_API_BASE", TELEGRAM_API_BASE),
            timeout: TELEGRAM_TIMEOUT,
        };

        Ok(Self {
            mqtt,
            topic_namespace: env.string("TOPIC_NS", DEFAULT_TOPIC_NS),
            signals,
            tracked_actuators: TRACKED_ACTUATORS.iter().map(|a| a.to_string()).collect(),
            telegram,
            event_log_path: env.get("LABWATCH_EVENT_LOG").map(PathBuf::from),
            recent_events: RECENT_EVENTS,
            sample_log_path: env.get("LABWATCH_SAMPLE_LOG").map(PathBuf::from),
            history_capacity: env.parse("LABWATCH_HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY)?,
            api_addr: env.parse("LABWATCH_API_ADDR", DEFAULT_API_ADDR)?,
            command_timeout: COMMAND_TIMEOUT,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(var) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.get(var) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var,
                value,
                reason: "expected true or false".into(),
            }),
        }
    }
}

/// One entry of a `LABWATCH_SIGNALS` file. Omitted policy fields fall
/// back to the global `STREAK_NEEDED` and `ALERT_COOLDOWN_MS`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignalEntry {
    name: String,
    key: String,
    comparator: String,
    threshold: f64,
    streak_required: Option<u32>,
    cooldown_ms: Option<u64>,
    #[serde(default = "default_true")]
    resets_streak_after_fire: bool,
    event_type: String,
    detail_key: Option<String>,
    title: Option<String>,
    body: Option<String>,
    command: Option<Command>,
}

fn default_true() -> bool {
    true
}

impl SignalEntry {
    fn into_spec(self, streak: u32, cooldown: Duration) -> Result<SignalSpec, ConfigError> {
        let comparator =
            Comparator::from_str(&self.comparator).map_err(|_| ConfigError::InvalidSignal {
                signal: self.name.clone(),
                reason: format!("unknown comparator {:?}", self.comparator),
            })?;

        Ok(SignalSpec {
            detail_key: self.detail_key.unwrap_or_else(|| self.key.clone()),
            title: self.title.unwrap_or_else(|| self.event_type.clone()),
            body: self
                .body
                .unwrap_or_else(|| format!("{}: {{value}}", self.name)),
            name: self.name,
            key: self.key,
            comparator,
            threshold: self.threshold,
            streak_required: self.streak_required.unwrap_or(streak),
            cooldown: self.cooldown_ms.map(Duration::from_millis).unwrap_or(cooldown),
            resets_streak_after_fire: self.resets_streak_after_fire,
            event_type: self.event_type,
            command: self.command,
        })
    }
}

fn load_signals(path: &str, streak: u32, cooldown: Duration) -> Result<Vec<SignalSpec>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    parse_signals(path, &text, streak, cooldown)
}

fn parse_signals(
    path: &str,
    text: &str,
    streak: u32,
    cooldown: Duration,
) -> Result<Vec<SignalSpec>, ConfigError> {
    let entries: Vec<SignalEntry> =
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
    entries
        .into_iter()
        .map(|entry| entry.into_spec(streak, cooldown))
        .collect()
}

fn validate_signals(signals: &[SignalSpec]) -> Result<(), ConfigError> {
    if signals.is_empty() {
        return Err(ConfigError::NoSignals);
    }
    let mut names = HashSet::new();
    for spec in signals {
        spec.validate()?;
        if !names.insert(spec.name.as_str()) {
            return Err(ConfigError::DuplicateSignal(spec.name.clone()));
        }
    }
    Ok(())
}
