//! Integer index vectors over a `D`-dimensional cell/face lattice.

use core::fmt;
use core::ops::{Add, AddAssign, Index, IndexMut, Mul, Neg, Sub, SubAssign};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A point of the integer lattice `Z^D`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntVect<const D: usize>(pub [i64; D]);

impl<const D: usize> IntVect<D> {
    #[inline]
    pub const fn new(v: [i64; D]) -> Self {
        Self(v)
    }

    #[inline]
    pub const fn zero() -> Self {
        Self([0; D])
    }

    #[inline]
    pub const fn splat(v: i64) -> Self {
        Self([v; D])
    }

    /// Unit vector along `axis`, or zero if `axis >= D`.
    #[inline]
    pub fn unit(axis: usize) -> Self {
        let mut v = [0; D];
        if axis < D {
            v[axis] = 1;
        }
        Self(v)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    /// Component-wise `self <= other`.
    #[inline]
    pub fn all_le(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b)
    }

    /// Component-wise minimum. Not `Ord::min`, which compares
    /// lexicographically.
    #[inline]
    pub fn component_min(&self, other: &Self) -> Self {
        Self(core::array::from_fn(|d| self.0[d].min(other.0[d])))
    }

    /// Component-wise maximum.
    #[inline]
    pub fn component_max(&self, other: &Self) -> Self {
        Self(core::array::from_fn(|d| self.0[d].max(other.0[d])))
    }

    /// Component-wise product.
    #[inline]
    pub fn scale(&self, ratio: &Self) -> Self {
        Self(core::array::from_fn(|d| self.0[d] * ratio.0[d]))
    }

    /// Component-wise floor division by a positive ratio.
    #[inline]
    pub fn coarsen(&self, ratio: &Self) -> Self {
        Self(core::array::from_fn(|d| self.0[d].div_euclid(ratio.0[d])))
    }

    #[inline]
    pub fn as_array(&self) -> &[i64; D] {
        &self.0
    }
}

impl<const D: usize> Default for IntVect<D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const D: usize> fmt::Debug for IntVect<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<const D: usize> fmt::Display for IntVect<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (d, x) in self.0.iter().enumerate() {
            if d > 0 {
                write!(f, ",")?;
            }
            write!(f, "{x}")?;
        }
        write!(f, ")")
    }
}

impl<const D: usize> Index<usize> for IntVect<D> {
    type Output = i64;
    #[inline]
    fn index(&self, d: usize) -> &i64 {
        &self.0[d]
    }
}

impl<const D: usize> IndexMut<usize> for IntVect<D> {
    #[inline]
    fn index_mut(&mut self, d: usize) -> &mut i64 {
        &mut self.0[d]
    }
}

impl<const D: usize> Add for IntVect<D> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|d| self.0[d] + rhs.0[d]))
    }
}

impl<const D: usize> AddAssign for IntVect<D> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<const D: usize> Sub for IntVect<D> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(core::array::from_fn(|d| self.0[d] - rhs.0[d]))
    }
}

impl<const D: usize> SubAssign for IntVect<D> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<const D: usize> Neg for IntVect<D> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self(core::array::from_fn(|d| -self.0[d]))
    }
}

impl<const D: usize> Mul<i64> for IntVect<D> {
    type Output = Self;
    #[inline]
    fn mul(self, k: i64) -> Self {
        Self(core::array::from_fn(|d| self.0[d] * k))
    }
}

impl<const D: usize> From<[i64; D]> for IntVect<D> {
    fn from(v: [i64; D]) -> Self {
        Self(v)
    }
}

// serde has no const-generic array impls; go through a sequence.
impl<const D: usize> Serialize for IntVect<D> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(s)
    }
}

impl<'de, const D: usize> Deserialize<'de> for IntVect<D> {
    fn deserialize<De: Deserializer<'de>>(de: De) -> Result<Self, De::Error> {
        let v = Vec::<i64>::deserialize(de)?;
        let len = v.len();
        let arr: [i64; D] = v
            .try_into()
            .map_err(|_| De::Error::invalid_length(len, &"one entry per axis"))?;
        Ok(Self(arr))
    }
}
