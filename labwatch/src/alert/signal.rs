//! Static per-signal configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use strum::{Display, EnumString};

use crate::config::ConfigError;

/// Actuator command published when a signal fires, e.g.
/// `{"trigger_alert": "blink"}`.
pub type Command = BTreeMap<String, String>;

/// How a reading is compared against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Comparator {
    /// Breach when `value >= threshold`.
    #[strum(to_string = ">=", serialize = "gte", serialize = "at_least")]
    AtLeast,

    /// Breach when `value <= threshold`.
    #[strum(to_string = "<=", serialize = "lte", serialize = "at_most")]
    AtMost,
}

impl Comparator {
    pub fn breached(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::AtLeast => value >= threshold,
            Comparator::AtMost => value <= threshold,
        }
    }
}

/// A monitored signal and the policy used to debounce it.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    /// Human-readable identifier used in logs.
    pub name: String,

    /// Field of the telemetry sample carrying this signal's value.
    pub key: String,

    pub comparator: Comparator,
    pub threshold: f64,

    /// Consecutive breaching samples needed before the signal may fire.
    pub streak_required: u32,

    /// Minimum time between two fires.
    pub cooldown: Duration,

    /// Whether a fire clears the streak. When false, a signal that stays
    /// in breach fires again as soon as the cooldown elapses.
    pub resets_streak_after_fire: bool,

    /// Audit event type written on fire, e.g. `ALERT_TEMP_HIGH`.
    pub event_type: String,

    /// Key under which the triggering value is stored in the audit
    /// record.
    pub detail_key: String,

    pub title: String,

    /// Notification body. `{value}` is replaced by the triggering value.
    pub body: String,

    /// Actuator command to publish on fire, if this signal drives one.
    pub command: Option<Command>,
}

impl SignalSpec {
    /// Reject settings that would make the debouncer meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSignal {
            signal: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.key.trim().is_empty() {
            return Err(invalid("sample key must not be empty"));
        }
        if !self.threshold.is_finite() {
            return Err(invalid("threshold must be a finite number"));
        }
        if self.streak_required == 0 {
            return Err(invalid("streak_required must be at least 1"));
        }
        if self.event_type.trim().is_empty() {
            return Err(invalid("event_type must not be empty"));
        }
        if self.command.as_ref().is_some_and(|cmd| cmd.is_empty()) {
            return Err(invalid("command must have at least one field"));
        }
        Ok(())
    }

    pub fn breached(&self, value: f64) -> bool {
        self.comparator.breached(value, self.threshold)
    }

    pub fn render_body(&self, value: f64) -> String {
        self.body.replace("{value}", &value.to_string())
    }

    /// High-temperature alert.
    pub fn temperature(threshold_c: f64, streak_required: u32, cooldown: Duration) -> Self {
        Self {
            name: "temperature".into(),
            key: "temp_c".into(),
            comparator: Comparator::AtLeast,
            threshold: threshold_c,
            streak_required,
            cooldown,
            resets_streak_after_fire: true,
            event_type: "ALERT_TEMP_HIGH".into(),
            detail_key: "temperature".into(),
            title: "🔥 HIGH TEMPERATURE ALERT".into(),
            body: "Temperature: {value}°C. Threshold exceeded!".into(),
            command: None,
        }
    }

    /// Dangerous gas concentration. Blinks the alert light on the
    /// device.
    pub fn gas(threshold_raw: f64, streak_required: u32, cooldown: Duration) -> Self {
        Self {
            name: "gas".into(),
            key: "gas".into(),
            comparator: Comparator::AtLeast,
            threshold: threshold_raw,
            streak_required,
            cooldown,
            resets_streak_after_fire: true,
            event_type: "ALERT_GAS_HIGH".into(),
            detail_key: "gas_level".into(),
            title: "☠️ GAS LEAK ALERT".into(),
            body: "Gas level: {value}. Dangerous gas concentration detected!".into(),
            command: Some(Command::from([("trigger_alert".into(), "blink".into())])),
        }
    }

    /// Low light. Switches the device into automatic lighting and keeps
    /// doing so while it stays dark.
    pub fn low_light(threshold_lux: f64, streak_required: u32, cooldown: Duration) -> Self {
        Self {
            name: "light".into(),
            key: "lux".into(),
            comparator: Comparator::AtMost,
            threshold: threshold_lux,
            streak_required,
            cooldown,
            resets_streak_after_fire: false,
            event_type: "EVENT_AUTO_LIGHT".into(),
            detail_key: "lux".into(),
            title: "🤖 Auto Light Mode".into(),
            body: "Automatic light control enabled because it is dark.".into(),
            command: Some(Command::from([("auto_light".into(), "on".into())])),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn spec() -> SignalSpec {
        SignalSpec::temperature(35.0, 5, Duration::from_secs(10))
    }

    #[test_case(Comparator::AtLeast, 35.0, true ; "at least, equal breaches")]
    #[test_case(Comparator::AtLeast, 34.9, false ; "at least, below is fine")]
    #[test_case(Comparator::AtMost, 35.0, true ; "at most, equal breaches")]
    #[test_case(Comparator::AtMost, 35.1, false ; "at most, above is fine")]
    fn comparator_includes_threshold(cmp: Comparator, value: f64, expected: bool) {
        assert_eq!(cmp.breached(value, 35.0), expected);
    }

    #[test_case("gte", Comparator::AtLeast)]
    #[test_case(">=", Comparator::AtLeast)]
    #[test_case("at_least", Comparator::AtLeast)]
    #[test_case("lte", Comparator::AtMost)]
    #[test_case("<=", Comparator::AtMost)]
    fn comparator_parses_aliases(s: &str, expected: Comparator) {
        assert_eq!(s.parse::<Comparator>().unwrap(), expected);
    }

    #[test]
    fn comparator_displays_as_operator() {
        assert_eq!(Comparator::AtLeast.to_string(), ">=");
        assert_eq!(Comparator::AtMost.to_string(), "<=");
    }

    #[test]
    fn defaults_are_valid() {
        let cooldown = Duration::from_secs(10);
        for spec in [
            SignalSpec::temperature(35.0, 5, cooldown),
            SignalSpec::gas(1800.0, 5, cooldown),
            SignalSpec::low_light(500.0, 5, cooldown),
        ] {
            spec.validate().unwrap();
        }
    }

    #[test]
    fn zero_streak_is_rejected() {
        let mut spec = spec();
        spec.streak_required = 0;
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::InvalidSignal { .. })
        ));
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let mut spec = spec();
        spec.threshold = f64::NAN;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn empty_command_is_rejected() {
        let mut spec = spec();
        spec.command = Some(Command::new());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn body_placeholder_is_replaced() {
        assert_eq!(
            spec().render_body(36.5),
            "Temperature: 36.5°C. Threshold exceeded!"
        );
    }
}
