// src/config.rs
//! Link configuration.
//!
//! Deserializable so an embedding application can carry link settings in its
//! own configuration file. Defaults are sensible for a 60 Hz desktop.

use crate::display::DisplayInfo;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`RefreshLink`](crate::link::RefreshLink).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Refresh rate assumed for displays that do not report one, in Hz.
    pub fallback_refresh_hz: f64,
    /// Name given to the delivery thread.
    pub thread_name: String,
    /// Budget for one callback invocation, in milliseconds. Invocations that
    /// run longer are logged at `warn` level, since they execute on the
    /// time-critical delivery thread and delay subsequent ticks. `None`
    /// defaults to half the nominal refresh period.
    pub callback_budget_ms: Option<f64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            fallback_refresh_hz: 60.0,
            thread_name: "refresh-link".to_string(),
            callback_budget_ms: None,
        }
    }
}

impl LinkConfig {
    /// Nominal refresh period for `display`, falling back to
    /// `fallback_refresh_hz` when the display does not report a rate.
    pub fn nominal_period(&self, display: &DisplayInfo) -> Duration {
        let hz = display
            .refresh_hz
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .unwrap_or(self.fallback_refresh_hz);
        Duration::from_secs_f64(1.0 / hz)
    }

    /// Resolved callback budget given the nominal period.
    pub fn callback_budget(&self, nominal_period: Duration) -> Duration {
        match self.callback_budget_ms {
            Some(ms) => Duration::from_secs_f64(ms / 1000.0),
            None => nominal_period / 2,
        }
    }
}
