//! Change detection for the device control channel.
//!
//! Presence and actuator updates are rare and not noisy, so they are not
//! debounced. Each tracker only remembers the last state it saw and
//! reports a value when it differs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Last known device presence. `None` until the first report.
#[derive(Debug, Default)]
pub struct OnlineTracker {
    last: Option<bool>,
}

impl OnlineTracker {
    /// Returns the new presence if it differs from the last known one.
    /// The first report after startup is always a transition.
    pub fn observe(&mut self, online: bool) -> Option<bool> {
        if self.last == Some(online) {
            return None;
        }
        self.last = Some(online);
        Some(online)
    }

    pub fn current(&self) -> Option<bool> {
        self.last
    }
}

/// Last known state of each tracked actuator.
#[derive(Debug)]
pub struct ActuatorTracker {
    states: BTreeMap<String, Option<String>>,
}

impl ActuatorTracker {
    pub fn new<I, S>(actuators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            states: actuators.into_iter().map(|a| (a.into(), None)).collect(),
        }
    }

    /// Record `state` for `actuator`. Returns true if it changed.
    /// Untracked actuators are ignored.
    pub fn observe(&mut self, actuator: &str, state: &str) -> bool {
        let Some(last) = self.states.get_mut(actuator) else {
            return false;
        };
        if last.as_deref() == Some(state) {
            return false;
        }
        *last = Some(state.to_string());
        true
    }

    /// Known states, skipping actuators not yet reported.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.states
            .iter()
            .filter_map(|(name, state)| state.clone().map(|s| (name.clone(), s)))
            .collect()
    }
}

/// Device presence and actuator states, as exposed by the status API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct DeviceSnapshot {
    /// `None` until the device has reported its presence.
    pub online: Option<bool>,
    pub actuators: BTreeMap<String, String>,
}
