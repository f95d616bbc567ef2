//! Register merge policies.
//!
//! A [`ValueFunction`] decides what a register slot holds after a second
//! contribution lands on it.  Upstream distribution logic does not guarantee
//! any insertion order, so every variant is commutative and associative over
//! the values ever inserted into a slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::sketch::SketchError;

/// Default value written to a "unique" slot when contributions disagree.
///
/// This is the `u64` image of the `-1` marker used by downstream aggregation.
pub const DEFAULT_UNIQUE_COLLISION: u64 = u64::MAX;

/// Serializable name of a merge policy, as it appears in a sketch config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Contributions are added together.
    Sum,
    /// Contributions must agree; disagreement marks the slot as collided.
    Unique,
}

impl Aggregator {
    /// Canonical lowercase name of the policy.
    pub fn name(self) -> &'static str {
        match self {
            Aggregator::Sum => "sum",
            Aggregator::Unique => "unique",
        }
    }

    /// Resolves the policy into a merge function.
    pub fn value_function(self, unique_collision: u64) -> ValueFunction {
        match self {
            Aggregator::Sum => ValueFunction::Sum,
            Aggregator::Unique => ValueFunction::Unique {
                collision: unique_collision,
            },
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts exactly the names written by serde and [`Aggregator::name`].
impl FromStr for Aggregator {
    type Err = SketchError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "sum" => Ok(Aggregator::Sum),
            "unique" => Ok(Aggregator::Unique),
            _ => Err(SketchError::UnknownAggregator(name.to_string())),
        }
    }
}

/// A pure merge function for one register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFunction {
    /// `old + new`, saturating at `u64::MAX`.
    Sum,
    /// `old` when both agree, otherwise `collision`.
    Unique {
        /// Marker stored once two contributions disagree.
        collision: u64,
    },
}

impl ValueFunction {
    /// Name used to look the function up from a config.
    pub fn name(&self) -> &'static str {
        match self {
            ValueFunction::Sum => Aggregator::Sum.name(),
            ValueFunction::Unique { .. } => Aggregator::Unique.name(),
        }
    }

    /// Value stored on the first insertion into an empty slot.
    #[inline]
    pub fn initial(&self, first: u64) -> u64 {
        first
    }

    /// Combines the stored value with a new contribution.
    #[inline]
    pub fn combine(&self, old: u64, new: u64) -> u64 {
        match *self {
            ValueFunction::Sum => old.saturating_add(new),
            ValueFunction::Unique { collision } => {
                if old == new {
                    old
                } else {
                    collision
                }
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn functions() -> impl Strategy<Value = ValueFunction> {
        prop_oneof![
            Just(ValueFunction::Sum),
            Just(ValueFunction::Unique {
                collision: DEFAULT_UNIQUE_COLLISION
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_combine_is_commutative(f in functions(), a in 0u64..8, b in 0u64..8) {
            prop_assert_eq!(f.combine(a, b), f.combine(b, a));
        }

        #[test]
        fn prop_combine_is_associative(
            f in functions(),
            a in 0u64..8,
            b in 0u64..8,
            c in 0u64..8,
        ) {
            prop_assert_eq!(f.combine(f.combine(a, b), c), f.combine(a, f.combine(b, c)));
        }

        #[test]
        fn prop_sum_associative_near_overflow(
            a in (u64::MAX - 16)..=u64::MAX,
            b in any::<u64>(),
            c in any::<u64>(),
        ) {
            let f = ValueFunction::Sum;
            prop_assert_eq!(f.combine(f.combine(a, b), c), f.combine(a, f.combine(b, c)));
        }
    }
}
