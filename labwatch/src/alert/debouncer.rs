//! Streak-and-cooldown debouncer for a single signal.
//!
//! Turns a noisy stream of readings into rare, deduplicated fire
//! decisions. A signal must breach its threshold on `streak_required`
//! consecutive samples before it may fire, and two fires are always at
//! least `cooldown` apart.
//!
//! # State Machine
//!
//! ```text
//!               breach, streak < required
//!            ┌──────────────────────────────┐
//!            ▼                              │
//!  Normal ─────────► Accumulating ──────────┘
//!    ▲    breach          │
//!    │                    │ streak >= required
//!    │                    ▼
//!    │        cooldown elapsed? ── no ──► Suppressed
//!    │                    │ yes
//!    │                    ▼
//!    │                  Fire (last_fire = now,
//!    │                        streak = 0 if resets_streak_after_fire)
//!    │
//!    └──────── any non-breaching sample (streak = 0)
//! ```
//!
//! The debouncer never reads a clock. Callers pass `now`, which keeps
//! every decision a pure function of the prior state and its inputs.

use std::time::Duration;

use tokio::time::Instant;

use super::signal::SignalSpec;

/// Result of [`Debouncer::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Reading is within limits. The streak has been cleared.
    NoBreach,

    /// Reading breaches, but not for long enough yet.
    BreachBelowStreak { streak: u32, required: u32 },

    /// Streak satisfied but firing is held back.
    Suppressed(SuppressReason),

    /// Side effects should run now.
    Fire { streak: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The previous fire was less than `cooldown` ago.
    CooldownActive { remaining: Duration },
}

/// Mutable per-signal runtime state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DebounceState {
    consecutive_breach_count: u32,
    last_fire_time: Option<Instant>,
}

/// Debouncer for one [`SignalSpec`].
///
/// Owns its state exclusively; nothing outside `evaluate` mutates it.
#[derive(Debug)]
pub struct Debouncer {
    spec: SignalSpec,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(spec: SignalSpec) -> Self {
        Self {
            spec,
            state: DebounceState::default(),
        }
    }

    pub fn spec(&self) -> &SignalSpec {
        &self.spec
    }

    /// Consecutive breaching samples seen so far.
    pub fn streak(&self) -> u32 {
        self.state.consecutive_breach_count
    }

    pub fn last_fire(&self) -> Option<Instant> {
        self.state.last_fire_time
    }

    /// Feed one reading observed at `now`.
    ///
    /// | Reading | Streak | Cooldown | Result |
    /// |---------|--------|----------|--------|
    /// | ok | any | any | `NoBreach` (streak cleared) |
    /// | breach | < required | any | `BreachBelowStreak` |
    /// | breach | >= required | running | `Suppressed` |
    /// | breach | >= required | elapsed or never fired | `Fire` |
    pub fn evaluate(&mut self, value: f64, now: Instant) -> Decision {
        if !self.spec.breached(value) {
            self.state.consecutive_breach_count = 0;
            return Decision::NoBreach;
        }

        self.state.consecutive_breach_count = self.state.consecutive_breach_count.saturating_add(1);
        let streak = self.state.consecutive_breach_count;

        if streak < self.spec.streak_required {
            return Decision::BreachBelowStreak {
                streak,
                required: self.spec.streak_required,
            };
        }

        if let Some(last) = self.state.last_fire_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.spec.cooldown {
                return Decision::Suppressed(SuppressReason::CooldownActive {
                    remaining: self.spec.cooldown - elapsed,
                });
            }
        }

        // A caller-supplied `now` older than the last fire must not move
        // the fire time backwards.
        self.state.last_fire_time = Some(match self.state.last_fire_time {
            Some(last) if last > now => last,
            _ => now,
        });
        if self.spec.resets_streak_after_fire {
            self.state.consecutive_breach_count = 0;
        }

        Decision::Fire { streak }
    }
}
