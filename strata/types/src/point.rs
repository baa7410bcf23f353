use std::fmt::{Debug, Display};
use std::ops::{Index, IndexMut};

use crate::Coord;

/// A point in an `N` dimensional integer index space.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point<const N: usize, T = i32> {
    coords: [T; N],
}

impl<const N: usize, T: Coord> Point<N, T> {
    pub const fn new(coords: [T; N]) -> Self {
        Self { coords }
    }

    pub fn splat(value: T) -> Self {
        Self { coords: [value; N] }
    }

    pub fn zeroes() -> Self {
        Self::splat(T::default())
    }

    pub fn coords(&self) -> &[T; N] {
        &self.coords
    }

    pub fn into_array(self) -> [T; N] {
        self.coords
    }

    /// Component-wise minimum.
    pub fn min(&self, other: &Self) -> Self {
        Self {
            coords: std::array::from_fn(|i| self.coords[i].min(other.coords[i])),
        }
    }

    /// Component-wise maximum.
    pub fn max(&self, other: &Self) -> Self {
        Self {
            coords: std::array::from_fn(|i| self.coords[i].max(other.coords[i])),
        }
    }

    /// Dot product with a stride vector, in wrapping machine-word arithmetic.
    #[inline(always)]
    pub fn dot_strides(&self, strides: &[usize; N]) -> usize {
        let mut acc = 0usize;
        for i in 0..N {
            acc = acc.wrapping_add(strides[i].wrapping_mul(self.coords[i].to_word()));
        }
        acc
    }
}

impl<const N: usize, T> From<[T; N]> for Point<N, T> {
    fn from(coords: [T; N]) -> Self {
        Self { coords }
    }
}

impl<const N: usize, T> Index<usize> for Point<N, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.coords[index]
    }
}

impl<const N: usize, T> IndexMut<usize> for Point<N, T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.coords[index]
    }
}

impl<const N: usize, T: Display> Display for Point<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<")?;
        for (i, c) in self.coords.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ">")
    }
}

impl<const N: usize, T: Debug> Debug for Point<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<")?;
        for (i, c) in self.coords.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{c:?}")?;
        }
        write!(f, ">")
    }
}

#[test]
fn test_dot_strides() {
    let p = Point::new([3, 2]);
    assert_eq!(p.dot_strides(&[1, 4]), 11);
    assert_eq!(format!("{p}"), "<3,2>");
}
