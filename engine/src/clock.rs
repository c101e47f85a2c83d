//! Vector clocks for causal ordering across devices.
//!
//! Unlike a single logical counter, a vector clock tracks one counter per
//! device, so the algebra can distinguish "happened before", "happened
//! after", and "concurrent" rather than collapsing concurrent writes into
//! an arbitrary total order.

use crate::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A vector clock: a mapping from device identifier to a monotonically
/// increasing counter. A missing key is equivalent to zero.
///
/// `BTreeMap` is used (rather than `HashMap`) so two clocks with the same
/// entries always serialize identically, which keeps checksums and conflict
/// payload comparisons stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<DeviceId, u64>);

/// The causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRelation {
    /// The clocks are identical.
    Equal,
    /// The left clock causally precedes the right.
    Before,
    /// The left clock causally follows the right.
    After,
    /// Neither clock dominates the other; a merge is required.
    Concurrent,
}

impl VectorClock {
    /// An empty clock (every device implicitly at zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock with a single device at counter 1, the state of a
    /// freshly created entity.
    pub fn origin(device_id: impl Into<DeviceId>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(device_id.into(), 1);
        Self(map)
    }

    /// Build a clock from an iterator of (device, counter) pairs.
    pub fn from_counters(counters: impl IntoIterator<Item = (DeviceId, u64)>) -> Self {
        Self(counters.into_iter().collect())
    }

    /// The counter for a device, or zero if the device is absent.
    pub fn get(&self, device_id: &str) -> u64 {
        self.0.get(device_id).copied().unwrap_or(0)
    }

    /// Iterate over the devices with a non-zero counter.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// True if every device is at counter zero.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// **Compare(A, B)** — the causal relationship of `self` to `other`.
    ///
    /// Keys absent on either side are treated as zero, so clocks with
    /// disjoint device sets can still be compared.
    pub fn compare(&self, other: &VectorClock) -> ClockRelation {
        let mut self_greater = false;
        let mut other_greater = false;

        for key in self.0.keys().chain(other.0.keys()) {
            let a = self.get(key);
            let b = other.get(key);
            match a.cmp(&b) {
                std::cmp::Ordering::Greater => self_greater = true,
                std::cmp::Ordering::Less => other_greater = true,
                std::cmp::Ordering::Equal => {}
            }
        }

        match (self_greater, other_greater) {
            (true, true) => ClockRelation::Concurrent,
            (true, false) => ClockRelation::After,
            (false, true) => ClockRelation::Before,
            (false, false) => ClockRelation::Equal,
        }
    }

    /// **Merge(A, B)** — the component-wise maximum of two clocks.
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut result = self.0.clone();
        for (device, counter) in &other.0 {
            let entry = result.entry(device.clone()).or_insert(0);
            if *counter > *entry {
                *entry = *counter;
            }
        }
        VectorClock(result)
    }

    /// **Increment(device, clock)** — a copy of `self` with `device`'s
    /// counter raised by one. Never mutates `self`.
    pub fn increment(&self, device_id: &str) -> VectorClock {
        let mut result = self.0.clone();
        *result.entry(device_id.to_string()).or_insert(0) += 1;
        VectorClock(result)
    }
}

impl From<BTreeMap<DeviceId, u64>> for VectorClock {
    fn from(map: BTreeMap<DeviceId, u64>) -> Self {
        Self(map)
    }
}

impl From<VectorClock> for BTreeMap<DeviceId, u64> {
    fn from(clock: VectorClock) -> Self {
        clock.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(pairs: &[(&str, u64)]) -> VectorClock {
        VectorClock::from_counters(pairs.iter().map(|(k, v)| (k.to_string(), *v)))
    }

    #[test]
    fn empty_clock_has_zero_for_any_device() {
        let c = VectorClock::new();
        assert_eq!(c.get("a"), 0);
        assert!(c.is_empty());
    }

    #[test]
    fn origin_clock_starts_device_at_one() {
        let c = VectorClock::origin("device-1");
        assert_eq!(c.get("device-1"), 1);
        assert_eq!(c.get("device-2"), 0);
    }

    #[test]
    fn compare_equal_clocks() {
        let a = clock(&[("a", 1), ("b", 2)]);
        let b = clock(&[("a", 1), ("b", 2)]);
        assert_eq!(a.compare(&b), ClockRelation::Equal);
    }

    #[test]
    fn compare_self_is_always_equal() {
        let a = clock(&[("a", 3)]);
        assert_eq!(a.compare(&a), ClockRelation::Equal);
    }

    #[test]
    fn compare_before_and_after_are_symmetric() {
        let a = clock(&[("a", 1)]);
        let b = clock(&[("a", 2)]);
        assert_eq!(a.compare(&b), ClockRelation::Before);
        assert_eq!(b.compare(&a), ClockRelation::After);
    }

    #[test]
    fn compare_concurrent_when_each_dominates_a_different_key() {
        let a = clock(&[("a", 2), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 2)]);
        assert_eq!(a.compare(&b), ClockRelation::Concurrent);
    }

    #[test]
    fn compare_treats_missing_keys_as_zero() {
        let a = clock(&[("a", 1)]);
        let b = clock(&[("a", 1), ("b", 1)]);
        assert_eq!(a.compare(&b), ClockRelation::Before);
    }

    #[test]
    fn merge_is_commutative() {
        let a = clock(&[("a", 3), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 5), ("c", 2)]);
        assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn merge_takes_componentwise_max() {
        let a = clock(&[("a", 3), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 5), ("c", 2)]);
        let merged = a.merge(&b);
        assert_eq!(merged.get("a"), 3);
        assert_eq!(merged.get("b"), 5);
        assert_eq!(merged.get("c"), 2);
    }

    #[test]
    fn merge_result_dominates_or_equals_both_inputs() {
        let a = clock(&[("a", 3), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 5)]);
        let merged = a.merge(&b);
        assert!(matches!(
            merged.compare(&a),
            ClockRelation::After | ClockRelation::Equal
        ));
        assert!(matches!(
            merged.compare(&b),
            ClockRelation::After | ClockRelation::Equal
        ));
    }

    #[test]
    fn increment_raises_only_the_named_device() {
        let a = clock(&[("a", 1), ("b", 4)]);
        let incremented = a.increment("a");
        assert_eq!(incremented.get("a"), 2);
        assert_eq!(incremented.get("b"), 4);
    }

    #[test]
    fn increment_introduces_new_device_at_one() {
        let a = clock(&[("a", 1)]);
        let incremented = a.increment("new-device");
        assert_eq!(incremented.get("new-device"), 1);
    }

    #[test]
    fn increment_does_not_mutate_original() {
        let a = clock(&[("a", 1)]);
        let _ = a.increment("a");
        assert_eq!(a.get("a"), 1);
    }

    #[test]
    fn serialization_is_a_flat_object() {
        let c = clock(&[("device-1", 2), ("device-2", 5)]);
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"device-1\":2"));
        assert!(json.contains("\"device-2\":5"));
    }

    #[test]
    fn serialization_roundtrip() {
        let c = clock(&[("a", 7), ("b", 0)]);
        let json = serde_json::to_string(&c).unwrap();
        let parsed: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(c, parsed);
    }

    #[test]
    fn deserializes_from_empty_object() {
        let parsed: VectorClock = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }

    // Property-based tests for the clock algebra's laws.
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_device() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("a".to_string()),
                Just("b".to_string()),
                Just("c".to_string()),
            ]
        }

        fn arb_clock() -> impl Strategy<Value = VectorClock> {
            prop::collection::btree_map(arb_device(), 0u64..100, 0..3)
                .prop_map(|counters| VectorClock::from_counters(counters))
        }

        proptest! {
            #[test]
            fn merge_is_commutative(a in arb_clock(), b in arb_clock()) {
                prop_assert_eq!(a.merge(&b), b.merge(&a));
            }

            #[test]
            fn merge_is_associative(a in arb_clock(), b in arb_clock(), c in arb_clock()) {
                prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&(b.merge(&c))));
            }

            #[test]
            fn merge_is_idempotent(a in arb_clock()) {
                prop_assert_eq!(a.merge(&a), a.clone());
            }

            #[test]
            fn merge_result_dominates_both_inputs(a in arb_clock(), b in arb_clock()) {
                let merged = a.merge(&b);
                prop_assert!(matches!(
                    merged.compare(&a),
                    ClockRelation::After | ClockRelation::Equal
                ));
                prop_assert!(matches!(
                    merged.compare(&b),
                    ClockRelation::After | ClockRelation::Equal
                ));
            }

            #[test]
            fn compare_is_reflexive(a in arb_clock()) {
                prop_assert_eq!(a.compare(&a), ClockRelation::Equal);
            }

            #[test]
            fn compare_is_antisymmetric(a in arb_clock(), b in arb_clock()) {
                let relation = match a.compare(&b) {
                    ClockRelation::Before => ClockRelation::After,
                    ClockRelation::After => ClockRelation::Before,
                    other => other,
                };
                prop_assert_eq!(b.compare(&a), relation);
            }
        }
    }
}
