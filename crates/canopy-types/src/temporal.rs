use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordering key of a block history row.
///
/// A hybrid logical timestamp packed into one integer: wall-clock
/// milliseconds since the UNIX epoch times [`InsertAt::LOGICAL_SPAN`], plus a
/// logical counter for versions written within the same millisecond. The
/// packed form is what the `insert_at` column stores, so SQL ordering and
/// `Ord` agree.
///
/// Ordering: `physical_ms` → `logical` (total order).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsertAt(i64);

impl InsertAt {
    /// Number of logical ticks available within one millisecond.
    pub const LOGICAL_SPAN: u32 = 1000;

    /// Create a version from its physical and logical components.
    ///
    /// `logical` must be below [`InsertAt::LOGICAL_SPAN`]; larger values
    /// carry into the physical component.
    pub fn new(physical_ms: u64, logical: u32) -> Self {
        let span = u64::from(Self::LOGICAL_SPAN);
        let physical = physical_ms + u64::from(logical) / span;
        let logical = u64::from(logical) % span;
        Self((physical * span + logical) as i64)
    }

    /// The zero version, older than anything a clock produces.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Rebuild a version from its stored column value.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The value stored in the `insert_at` column.
    pub const fn as_raw(&self) -> i64 {
        self.0
    }

    /// Wall-clock milliseconds component.
    pub fn physical_ms(&self) -> u64 {
        (self.0 as u64) / u64::from(Self::LOGICAL_SPAN)
    }

    /// Logical counter component.
    pub fn logical(&self) -> u32 {
        ((self.0 as u64) % u64::from(Self::LOGICAL_SPAN)) as u32
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for InsertAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InsertAt({}ms.{})", self.physical_ms(), self.logical())
    }
}

impl fmt::Display for InsertAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical_ms(), self.logical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_roundtrip() {
        let v = InsertAt::new(1_700_000_000_123, 42);
        assert_eq!(v.physical_ms(), 1_700_000_000_123);
        assert_eq!(v.logical(), 42);
        assert_eq!(InsertAt::from_raw(v.as_raw()), v);
    }

    #[test]
    fn ordering_physical_first() {
        let a = InsertAt::new(100, 999);
        let b = InsertAt::new(101, 0);
        assert!(a < b);
    }

    #[test]
    fn ordering_logical_second() {
        let a = InsertAt::new(100, 1);
        let b = InsertAt::new(100, 2);
        assert!(a < b);
    }

    #[test]
    fn logical_overflow_carries() {
        let v = InsertAt::new(100, 1000);
        assert_eq!(v, InsertAt::new(101, 0));
    }

    #[test]
    fn zero_is_smallest() {
        assert!(InsertAt::zero() < InsertAt::new(1, 0));
        assert!(InsertAt::zero().is_zero());
        assert_eq!(InsertAt::default(), InsertAt::zero());
    }

    #[test]
    fn serde_is_transparent() {
        let v = InsertAt::new(5, 7);
        assert_eq!(serde_json::to_string(&v).unwrap(), "5007");
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", InsertAt::new(1000, 5)), "1000.5");
        assert_eq!(format!("{:?}", InsertAt::new(1000, 5)), "InsertAt(1000ms.5)");
    }
}
