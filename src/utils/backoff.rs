//! Exponential backoff arithmetic for retry operations.

use std::time::Duration;

/// Computes the delay before retry number `attempt` (0-based).
///
/// Implements exponential backoff: `initial`, `2 * initial`, `4 * initial`...
/// capped at `max`. Overflow saturates to `max`.
///
/// # Examples
///
/// ```rust
/// use appsync_cli::utils::backoff::exponential_delay;
/// use std::time::Duration;
///
/// let initial = Duration::from_millis(100);
/// let max = Duration::from_secs(1);
/// assert_eq!(exponential_delay(initial, max, 0), Duration::from_millis(100));
/// assert_eq!(exponential_delay(initial, max, 2), Duration::from_millis(400));
/// assert_eq!(exponential_delay(initial, max, 10), max);
/// ```
#[must_use]
pub fn exponential_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    initial.checked_mul(factor).map_or(max, |delay| delay.min(max))
}
