//! Per-attribute usage counters with bounded increment/decrement.
//!
//! Meter attributes are defined on the server license; the tracker holds
//! the client's view of them, seeded from the lease grant and replaced
//! wholesale on every successful refresh.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::status::StatusCode;

/// A usage counter tracked against an allowed quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterAttribute {
    /// Unique attribute name.
    pub name: String,
    /// Allowed uses; `-1` means unlimited.
    pub allowed_uses: i64,
    /// Current balance of uses.
    pub total_uses: u64,
    /// Lifetime uses; grows on every accepted increment and is unaffected
    /// by decrement and reset.
    pub gross_uses: u64,
}

impl MeterAttribute {
    /// New attribute with a bounded quota and zero uses.
    #[must_use]
    pub fn bounded(name: impl Into<String>, allowed_uses: u64) -> Self {
        Self {
            name: name.into(),
            allowed_uses: allowed_uses as i64,
            total_uses: 0,
            gross_uses: 0,
        }
    }

    /// New attribute with unlimited allowed uses.
    #[must_use]
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allowed_uses: -1,
            total_uses: 0,
            gross_uses: 0,
        }
    }

    /// Check if an increment of `n` would exceed the quota.
    #[must_use]
    pub fn would_exceed(&self, n: u64) -> bool {
        if self.allowed_uses < 0 {
            return false;
        }
        match self.total_uses.checked_add(n) {
            Some(next) => next > self.allowed_uses as u64,
            None => true,
        }
    }
}

/// Client-side view of the license's meter attributes.
#[derive(Debug, Clone, Default)]
pub struct MeterAttributeTracker {
    attributes: HashMap<String, MeterAttribute>,
}

impl MeterAttributeTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every attribute with a fresh snapshot from the server.
    pub fn replace_all(&mut self, attributes: Vec<MeterAttribute>) {
        trace!(count = attributes.len(), "meter: replacing attribute snapshot");
        self.attributes = attributes
            .into_iter()
            .map(|attr| (attr.name.clone(), attr))
            .collect();
    }

    /// Look up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MeterAttribute> {
        self.attributes.get(name)
    }

    /// Increment an attribute's uses by `n`.
    ///
    /// Returns the new balance. The attribute is left unchanged on
    /// rejection: there is no partial increment.
    ///
    /// # Errors
    ///
    /// `MeterAttributeNotFound` for an unknown name;
    /// `MeterAttributeLimitReached` when `allowed_uses >= 0` and the
    /// balance would exceed it.
    pub fn increment(&mut self, name: &str, n: u64) -> Result<u64, StatusCode> {
        let attr = self
            .attributes
            .get_mut(name)
            .ok_or(StatusCode::MeterAttributeNotFound)?;
        if attr.would_exceed(n) {
            debug!(
                name = %name,
                total_uses = attr.total_uses,
                allowed_uses = attr.allowed_uses,
                increment = n,
                "meter: increment rejected, usage limit reached"
            );
            return Err(StatusCode::MeterAttributeLimitReached);
        }
        attr.total_uses = attr.total_uses.saturating_add(n);
        attr.gross_uses = attr.gross_uses.saturating_add(n);
        trace!(name = %name, total_uses = attr.total_uses, "meter: incremented");
        Ok(attr.total_uses)
    }

    /// Decrement an attribute's uses by `n`, clamping the balance at zero.
    ///
    /// A decrement larger than the current balance resets it to 0 and
    /// still succeeds; this leniency is deliberate and matches the
    /// original client.
    ///
    /// # Errors
    ///
    /// `MeterAttributeNotFound` for an unknown name.
    pub fn decrement(&mut self, name: &str, n: u64) -> Result<u64, StatusCode> {
        let attr = self
            .attributes
            .get_mut(name)
            .ok_or(StatusCode::MeterAttributeNotFound)?;
        attr.total_uses = attr.total_uses.saturating_sub(n);
        trace!(name = %name, total_uses = attr.total_uses, "meter: decremented");
        Ok(attr.total_uses)
    }

    /// Reset an attribute's balance to zero. `gross_uses` is untouched.
    ///
    /// # Errors
    ///
    /// `MeterAttributeNotFound` for an unknown name.
    pub fn reset(&mut self, name: &str) -> Result<(), StatusCode> {
        let attr = self
            .attributes
            .get_mut(name)
            .ok_or(StatusCode::MeterAttributeNotFound)?;
        attr.total_uses = 0;
        debug!(name = %name, "meter: reset");
        Ok(())
    }

    /// Drop every attribute (lease teardown).
    pub fn clear(&mut self) {
        self.attributes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(attr: MeterAttribute) -> MeterAttributeTracker {
        let mut tracker = MeterAttributeTracker::new();
        tracker.replace_all(vec![attr]);
        tracker
    }

    #[test]
    fn test_increment_within_quota() {
        let mut tracker = tracker_with(MeterAttribute::bounded("seats", 3));
        assert_eq!(tracker.increment("seats", 2).unwrap(), 2);
        assert_eq!(tracker.increment("seats", 1).unwrap(), 3);
    }

    #[test]
    fn test_increment_over_quota_leaves_attribute_unchanged() {
        let mut tracker = tracker_with(MeterAttribute::bounded("seats", 3));
        tracker.increment("seats", 2).unwrap();
        assert_eq!(
            tracker.increment("seats", 5).unwrap_err(),
            StatusCode::MeterAttributeLimitReached
        );
        let attr = tracker.get("seats").unwrap();
        assert_eq!(attr.total_uses, 2);
        assert_eq!(attr.gross_uses, 2);
    }

    #[test]
    fn test_unlimited_attribute_never_limits() {
        let mut tracker = tracker_with(MeterAttribute::unlimited("api-calls"));
        assert_eq!(tracker.increment("api-calls", 1_000_000).unwrap(), 1_000_000);
    }

    #[test]
    fn test_decrement_clamps_at_zero() {
        let mut tracker = tracker_with(MeterAttribute::bounded("seats", 10));
        tracker.increment("seats", 2).unwrap();
        assert_eq!(tracker.decrement("seats", 100).unwrap(), 0);
    }

    #[test]
    fn test_gross_uses_survives_decrement_and_reset() {
        let mut tracker = tracker_with(MeterAttribute::bounded("seats", 10));
        tracker.increment("seats", 4).unwrap();
        tracker.decrement("seats", 3).unwrap();
        tracker.reset("seats").unwrap();
        let attr = tracker.get("seats").unwrap();
        assert_eq!(attr.total_uses, 0);
        assert_eq!(attr.gross_uses, 4);
    }

    #[test]
    fn test_unknown_attribute() {
        let mut tracker = MeterAttributeTracker::new();
        assert_eq!(
            tracker.increment("nope", 1).unwrap_err(),
            StatusCode::MeterAttributeNotFound
        );
        assert_eq!(
            tracker.decrement("nope", 1).unwrap_err(),
            StatusCode::MeterAttributeNotFound
        );
        assert_eq!(
            tracker.reset("nope").unwrap_err(),
            StatusCode::MeterAttributeNotFound
        );
    }

    #[test]
    fn test_replace_all_is_wholesale() {
        let mut tracker = tracker_with(MeterAttribute::bounded("old", 5));
        tracker.replace_all(vec![MeterAttribute::bounded("new", 1)]);
        assert!(tracker.get("old").is_none());
        assert!(tracker.get("new").is_some());
    }
}
