//! Delay between attempts of the same item.

use std::time::Duration;

use crate::config::RetryPolicy;

/// Wait after failed attempt number `attempt` (from 1).
///
/// Grows linearly with the attempt number and never exceeds the cap.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let grown = policy.backoff_base_ms.saturating_mul(u64::from(attempt.max(1)));
    Duration::from_millis(grown.min(policy.backoff_cap_ms))
}
