//! Configuration for the floating-license client.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for lease renewal, clock validation and offline storage.
///
/// The defaults are conservative: renewal fires at 25% of the lease
/// duration before expiry, never closer to expiry than one retry interval,
/// so a single failed attempt can still be retried before the lease lapses.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Fraction of the lease duration used as the renewal safety margin.
    pub renewal_margin_fraction: f64,
    /// Retry interval after a transient renewal failure; also the floor of
    /// the safety margin.
    pub retry_interval: Duration,
    /// Maximum tolerated divergence between server-reported time and the
    /// local clock before a grant is refused with `TimeTampered`.
    pub clock_skew_tolerance: Duration,
    /// Maximum number of floating-client metadata fields, mirroring the
    /// server-enforced default.
    pub metadata_limit: usize,
    /// Directory for persisted offline-lease credentials. `None` disables
    /// persistence (offline leases then live only in memory).
    pub offline_store_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            renewal_margin_fraction: 0.25,
            retry_interval: Duration::from_secs(10),
            clock_skew_tolerance: Duration::from_secs(300),
            metadata_limit: 4,
            offline_store_dir: None,
        }
    }
}

impl ClientConfig {
    /// Safety margin before expiry at which renewal fires.
    #[must_use]
    pub fn renewal_margin(&self, lease_duration: Duration) -> Duration {
        let fraction = lease_duration.mul_f64(self.renewal_margin_fraction.clamp(0.0, 1.0));
        fraction.max(self.retry_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_is_fraction_of_duration() {
        let config = ClientConfig::default();
        let margin = config.renewal_margin(Duration::from_secs(600));
        assert_eq!(margin, Duration::from_secs(150));
    }

    #[test]
    fn test_margin_floored_at_retry_interval() {
        let config = ClientConfig::default();
        // 25% of 8s is 2s, below the 10s retry interval.
        let margin = config.renewal_margin(Duration::from_secs(8));
        assert_eq!(margin, config.retry_interval);
    }
}
