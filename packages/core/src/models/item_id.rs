//! Budget Item Identifiers
//!
//! Items are identified either by a durable id assigned by storage or by a
//! transient id generated on the client before the first save.
//!
//! Transient ids are derived from the current millisecond timestamp and are
//! strictly monotonic within the process, so a freshly created item always
//! compares greater than every transient item created before it.
//!
//! # Ordering
//!
//! Ids order by their numeric value regardless of origin; on equal values a
//! durable id sorts before a transient one. Sibling order and therefore
//! hierarchical numbering are derived from this ordering.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use crate::models::ValidationError;

/// Prefix used when a transient id is rendered or sent to storage as a client key
pub const TRANSIENT_PREFIX: &str = "tmp-";

/// Last transient value handed out, used to keep generation strictly monotonic
static LAST_TRANSIENT: AtomicI64 = AtomicI64::new(0);

/// Identifier of a [`BudgetItem`](crate::models::BudgetItem)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", content = "value", rename_all = "camelCase")]
pub enum ItemId {
    /// Identifier assigned by the persistence layer
    Durable(i64),

    /// Client-generated identifier for an item that was never persisted
    Transient(i64),
}

impl ItemId {
    /// Generate a fresh transient id
    ///
    /// Uses the current Unix time in milliseconds, bumped by one whenever two
    /// calls land in the same millisecond (or the clock goes backwards).
    pub fn next_transient() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut prev = LAST_TRANSIENT.load(AtomicOrdering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match LAST_TRANSIENT.compare_exchange_weak(
                prev,
                next,
                AtomicOrdering::Relaxed,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => return ItemId::Transient(next),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Numeric value used for ordering
    pub fn value(&self) -> i64 {
        match self {
            ItemId::Durable(v) | ItemId::Transient(v) => *v,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ItemId::Transient(_))
    }

    /// The storage id, if this item has been persisted
    pub fn as_durable(&self) -> Option<i64> {
        match self {
            ItemId::Durable(v) => Some(*v),
            ItemId::Transient(_) => None,
        }
    }

    /// Key identifying a transient item inside a write batch (`tmp-<n>`)
    pub fn client_key(&self) -> String {
        self.to_string()
    }

    fn origin_rank(&self) -> u8 {
        match self {
            ItemId::Durable(_) => 0,
            ItemId::Transient(_) => 1,
        }
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value()
            .cmp(&other.value())
            .then_with(|| self.origin_rank().cmp(&other.origin_rank()))
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Durable(v) => write!(f, "{}", v),
            ItemId::Transient(v) => write!(f, "{}{}", TRANSIENT_PREFIX, v),
        }
    }
}

impl FromStr for ItemId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (raw, transient) = match s.strip_prefix(TRANSIENT_PREFIX) {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let value = raw
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidId(s.to_string()))?;
        Ok(if transient {
            ItemId::Transient(value)
        } else {
            ItemId::Durable(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_ids_are_strictly_increasing() {
        let a = ItemId::next_transient();
        let b = ItemId::next_transient();
        let c = ItemId::next_transient();
        assert!(a < b);
        assert!(b < c);
        assert!(a.is_transient());
    }

    #[test]
    fn test_ordering_is_numeric_across_origins() {
        assert!(ItemId::Durable(9) < ItemId::Durable(10));
        assert!(ItemId::Durable(5) < ItemId::Transient(6));
        assert!(ItemId::Transient(4) < ItemId::Durable(5));
        assert!(ItemId::Durable(7) < ItemId::Transient(7));
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(ItemId::Durable(42).to_string(), "42");
        assert_eq!(ItemId::Transient(17).to_string(), "tmp-17");
        assert_eq!("42".parse::<ItemId>().unwrap(), ItemId::Durable(42));
        assert_eq!("tmp-17".parse::<ItemId>().unwrap(), ItemId::Transient(17));
        assert!("abc".parse::<ItemId>().is_err());
    }

    #[test]
    fn test_serialization_format() {
        let json = serde_json::to_value(ItemId::Transient(3)).unwrap();
        assert_eq!(json, serde_json::json!({"origin": "transient", "value": 3}));
    }
}
