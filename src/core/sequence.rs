//! Wrap-aware TCP sequence number arithmetic.
//!
//! All comparisons of expected versus observed sequence and ack values go
//! through [`Sequence::diff`]; raw subtraction on the underlying `u32` is
//! wrong near the 2^32 wrap point.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-bit TCP sequence number, interpreted modulo 2^32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence(pub u32);

impl Sequence {
    /// Signed distance from `self` to `other` on the shortest arc.
    ///
    /// Positive when `other` lies ahead of `self`; zero iff they are equal.
    /// The result is exact for any pair less than 2^31 apart.
    pub fn diff(self, other: Sequence) -> i32 {
        other.0.wrapping_sub(self.0) as i32
    }

    /// The sequence number `n` bytes past `self`, wrapping modulo 2^32.
    pub fn add(self, n: i32) -> Sequence {
        Sequence(self.0.wrapping_add(n as u32))
    }
}

impl From<u32> for Sequence {
    fn from(val: u32) -> Self {
        Sequence(val)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
