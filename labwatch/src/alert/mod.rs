//! The alert engine: per-signal debouncing and the evaluator that turns
//! decisions into side effects.

mod debouncer;
mod device;
mod effect;
mod evaluator;
mod signal;

pub use debouncer::{Debouncer, Decision, SuppressReason};
pub use device::{ActuatorTracker, DeviceSnapshot, OnlineTracker};
pub use effect::Effect;
pub use evaluator::{AlertEvaluator, Evaluation, SignalDecision};
pub use signal::{Command, Comparator, SignalSpec};
