//! Strongly-typed identifiers used across the domain.
//!
//! Every persisted entity is keyed by a sequential `i64` assigned by its
//! repository on insert. The [`entity_id!`] macro stamps out one newtype per
//! entity so ids of different entities never mix; domain crates mint their own
//! ids with the same macro.

/// Declares an `i64`-backed identifier newtype with the shared conversions.
///
/// `0` is never a persisted id; repositories start counting at 1.
#[macro_export]
macro_rules! entity_id {
    ($(#[$meta:meta])* $vis:vis struct $t:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        $vis struct $t(i64);

        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>().map(Self).map_err(|e| {
                    $crate::error::DomainError::invalid_id(format!(
                        "{}: {}",
                        stringify!($t),
                        e
                    ))
                })
            }
        }
    };
}

crate::entity_id! {
    /// Identifier of a retail store (stock location).
    pub struct StoreId
}

crate::entity_id! {
    /// Identifier of a user (actor identity).
    pub struct UserId
}
