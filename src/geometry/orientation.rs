//! Face orientations of a box: an (axis, side) pair with a fixed total order.
//!
//! Orientations index the per-face arrays of a flux register, so the order
//! is part of the contract: all low faces first (by axis), then all high
//! faces (by axis), i.e. `index = side * D + axis`.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Which end of an axis a face lies on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Low,
    High,
}

impl Side {
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Side::Low => Side::High,
            Side::High => Side::Low,
        }
    }
}

/// One of the `2 * D` logical faces of a box.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Orientation {
    axis: usize,
    side: Side,
}

impl Orientation {
    #[inline]
    pub const fn new(axis: usize, side: Side) -> Self {
        Self { axis, side }
    }

    #[inline]
    pub const fn low(axis: usize) -> Self {
        Self::new(axis, Side::Low)
    }

    #[inline]
    pub const fn high(axis: usize) -> Self {
        Self::new(axis, Side::High)
    }

    #[inline]
    pub fn axis(&self) -> usize {
        self.axis
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    #[inline]
    pub fn is_low(&self) -> bool {
        self.side == Side::Low
    }

    #[inline]
    pub fn is_high(&self) -> bool {
        self.side == Side::High
    }

    /// The face on the other end of the same axis.
    #[inline]
    pub fn flip(&self) -> Self {
        Self::new(self.axis, self.side.flip())
    }

    /// Position of this orientation in a `2 * D` face array.
    #[inline]
    pub fn index<const D: usize>(&self) -> usize {
        match self.side {
            Side::Low => self.axis,
            Side::High => D + self.axis,
        }
    }

    /// Inverse of [`index`](Self::index); `None` if `i >= 2 * D`.
    pub fn from_index<const D: usize>(i: usize) -> Option<Self> {
        if i < D {
            Some(Self::low(i))
        } else if i < 2 * D {
            Some(Self::high(i - D))
        } else {
            None
        }
    }

    /// All `2 * D` orientations in index order.
    pub fn all<const D: usize>() -> impl Iterator<Item = Orientation> {
        (0..2 * D).filter_map(Self::from_index::<D>)
    }
}

impl fmt::Debug for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::Low => "lo",
            Side::High => "hi",
        };
        write!(f, "{side}{}", self.axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_order_is_lows_then_highs() {
        let all: Vec<_> = Orientation::all::<3>().collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], Orientation::low(0));
        assert_eq!(all[2], Orientation::low(2));
        assert_eq!(all[3], Orientation::high(0));
        for (i, o) in all.iter().enumerate() {
            assert_eq!(o.index::<3>(), i);
        }
    }

    #[test]
    fn from_index_out_of_range() {
        assert_eq!(Orientation::from_index::<2>(4), None);
        assert_eq!(Orientation::from_index::<2>(3), Some(Orientation::high(1)));
    }

    #[test]
    fn flip_swaps_side() {
        assert_eq!(Orientation::low(1).flip(), Orientation::high(1));
    }
}
