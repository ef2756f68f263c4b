use std::time::Duration;

use braid_core::config::Backoff;

/// Retry delay computation for [`Backoff`] policies.
pub trait BackoffExt {
    /// Delay before retry number `retry_count` (1-based).
    fn delay(&self, base_ms: u64, retry_count: u32) -> Duration;
}

impl BackoffExt for Backoff {
    fn delay(&self, base_ms: u64, retry_count: u32) -> Duration {
        let n = retry_count.max(1);
        let ms = match self {
            Backoff::None => base_ms,
            Backoff::Linear => base_ms.saturating_mul(u64::from(n)),
            Backoff::Exponential => {
                let factor = 2u64.checked_pow(n - 1).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor)
            }
        };
        Duration::from_millis(ms)
    }
}
