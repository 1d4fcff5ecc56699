//! Header-driven rate governance
//!
//! Providers report call-budget telemetry on every response. The governor
//! reads that telemetry after each call and pauses the caller before the
//! next one when utilization runs too high, which is proactive throttling
//! as opposed to the retry policy's reactive handling of 429-class errors.

use crate::types::StringMap;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Usage headers checked in precedence order
pub const USAGE_HEADERS: &[&str] = &[
    "x-business-use-case-usage",
    "x-app-usage",
    "x-ad-account-usage",
];

/// Call-budget telemetry derived from one response
///
/// Ephemeral: recomputed fresh from each response, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBudget {
    /// Utilization percentage of the call limit
    pub utilization: f64,
    /// Provider-suggested pause before further calls
    pub pause: Duration,
}

impl RateBudget {
    /// A budget indicating no pressure at all
    pub const ZERO: Self = Self {
        utilization: 0.0,
        pause: Duration::ZERO,
    };
}

/// Governs call rate from provider-reported usage telemetry
#[derive(Debug, Clone)]
pub struct RateGovernor {
    /// Maximum utilization percentage before pausing
    threshold: f64,
    /// Pause applied when the threshold is crossed but no explicit
    /// regain-access interval was reported
    default_pause: Duration,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self {
            threshold: 90.0,
            default_pause: Duration::from_secs(60),
        }
    }
}

impl RateGovernor {
    /// Create a governor with a custom threshold and default pause
    pub fn new(threshold: f64, default_pause: Duration) -> Self {
        Self {
            threshold,
            default_pause,
        }
    }

    /// Extract the call-rate budget from response headers
    ///
    /// Field precedence inside the usage header: `call_count`, then
    /// `acc_id_util_pct`, then zero; `estimated_time_to_regain_access`
    /// (minutes), then zero. Malformed content never fails a call, it
    /// degrades to [`RateBudget::ZERO`].
    pub fn parse_usage(headers: &StringMap) -> RateBudget {
        let Some(raw) = USAGE_HEADERS.iter().find_map(|h| headers.get(*h)) else {
            return RateBudget::ZERO;
        };
        let Ok(usage) = serde_json::from_str::<Value>(raw) else {
            return RateBudget::ZERO;
        };

        let utilization = number_field(&usage, "call_count")
            .or_else(|| number_field(&usage, "acc_id_util_pct"))
            .unwrap_or(0.0);
        let minutes = number_field(&usage, "estimated_time_to_regain_access").unwrap_or(0.0);
        let pause = if minutes > 0.0 {
            Duration::from_secs_f64(minutes * 60.0)
        } else {
            Duration::ZERO
        };

        RateBudget { utilization, pause }
    }

    /// The pause this governor would enforce for a budget, if any
    pub fn pause_for(&self, budget: &RateBudget) -> Option<Duration> {
        if !budget.pause.is_zero() {
            Some(budget.pause)
        } else if budget.utilization > self.threshold {
            Some(self.default_pause)
        } else {
            None
        }
    }

    /// Inspect response headers and sleep if the budget demands it
    ///
    /// Runs after every governed call, success or retry alike.
    pub async fn observe(&self, headers: &StringMap) {
        let budget = Self::parse_usage(headers);
        if let Some(pause) = self.pause_for(&budget) {
            warn!(
                utilization = budget.utilization,
                pause_secs = pause.as_secs_f64(),
                "Call rate utilization too high, pausing"
            );
            tokio::time::sleep(pause).await;
        }
    }
}

fn number_field(usage: &Value, field: &str) -> Option<f64> {
    let value = usage.get(field)?;
    match value {
        Value::Number(n) => n.as_f64().filter(|n| *n != 0.0),
        Value::String(s) => s.parse::<f64>().ok().filter(|n| *n != 0.0),
        _ => None,
    }
}
