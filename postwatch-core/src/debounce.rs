use std::time::Duration;

use tokio::time::Instant;

/// Fixed cooldown between accepted refreshes of the same resource.
///
/// Plain elapsed-time comparison: no burst allowance, and suppressed
/// notifications are dropped rather than deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceGuard {
    cooldown: Duration,
}

impl Default for DebounceGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COOLDOWN)
    }
}

impl DebounceGuard {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// A resource that has never been refreshed is always allowed.
    pub fn allows(&self, last_refresh: Option<Instant>, now: Instant) -> bool {
        match last_refresh {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        }
    }
}
