use std::fmt::{Debug, Display};

use crate::{Coord, Point};

/// An axis aligned box with inclusive bounds. A rectangle is empty when `hi[d] < lo[d]` in any
/// dimension.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect<const N: usize, T = i32> {
    pub lo: Point<N, T>,
    pub hi: Point<N, T>,
}

impl<const N: usize, T: Coord> Rect<N, T> {
    pub fn new(lo: impl Into<Point<N, T>>, hi: impl Into<Point<N, T>>) -> Self {
        Self {
            lo: lo.into(),
            hi: hi.into(),
        }
    }

    /// The canonical empty rectangle (`lo = 1`, `hi = 0` in every dimension).
    pub fn empty() -> Self {
        Self {
            lo: Point::splat(T::from_i64(1)),
            hi: Point::splat(T::from_i64(0)),
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..N).any(|d| self.hi[d] < self.lo[d])
    }

    #[inline(always)]
    pub fn contains(&self, p: &Point<N, T>) -> bool {
        for d in 0..N {
            if p[d] < self.lo[d] || p[d] > self.hi[d] {
                return false;
            }
        }
        true
    }

    /// Every point of `other` is inside `self`. An empty rectangle is contained by anything.
    pub fn contains_rect(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }
        (0..N).all(|d| other.lo[d] >= self.lo[d] && other.hi[d] <= self.hi[d])
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.max(&other.lo),
            hi: self.hi.min(&other.hi),
        }
    }

    /// Smallest rectangle containing both inputs. Empty inputs are ignored.
    pub fn union_bbox(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            lo: self.lo.min(&other.lo),
            hi: self.hi.max(&other.hi),
        }
    }

    /// Number of coordinates along `dim`, zero for an empty extent.
    pub fn extent(&self, dim: usize) -> u128 {
        let lo = self.lo[dim].to_i128();
        let hi = self.hi[dim].to_i128();
        if hi < lo { 0 } else { (hi - lo + 1) as u128 }
    }

    /// Number of points, or `None` when the count does not fit a `u128`.
    pub fn volume(&self) -> Option<u128> {
        if self.is_empty() {
            return Some(0);
        }
        (0..N).try_fold(1u128, |acc, d| acc.checked_mul(self.extent(d)))
    }

    /// Splits along `dim` into the part strictly below `plane` and the part at or above it.
    /// Either half may be empty.
    pub fn split(&self, dim: usize, plane: T) -> (Self, Self) {
        let mut below = *self;
        let mut above = *self;
        below.hi[dim] = self.hi[dim].min(T::from_i64(plane.to_i64().wrapping_sub(1)));
        above.lo[dim] = self.lo[dim].max(plane);
        if plane <= self.lo[dim] {
            below = Self::empty();
        }
        if plane > self.hi[dim] {
            above = Self::empty();
        }
        (below, above)
    }

    /// Iterate over every point, dimension 0 varying fastest.
    pub fn points(&self) -> PointsInRect<N, T> {
        PointsInRect {
            rect: *self,
            next: (!self.is_empty()).then_some(self.lo),
        }
    }
}

impl<const N: usize, T: Display> Display for Rect<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{}]", self.lo, self.hi)
    }
}

impl<const N: usize, T: Debug> Debug for Rect<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}..{:?}]", self.lo, self.hi)
    }
}

/// Iterator returned by [`Rect::points`].
pub struct PointsInRect<const N: usize, T> {
    rect: Rect<N, T>,
    next: Option<Point<N, T>>,
}

impl<const N: usize, T: Coord> Iterator for PointsInRect<N, T> {
    type Item = Point<N, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let mut following = current;
        let mut done = true;
        for d in 0..N {
            if following[d] < self.rect.hi[d] {
                following[d] = T::from_i64(following[d].to_i64() + 1);
                done = false;
                break;
            }
            following[d] = self.rect.lo[d];
        }
        self.next = (!done).then_some(following);
        Some(current)
    }
}

#[test]
fn test_split_and_volume() {
    let r = Rect::<2>::new([0, 0], [3, 3]);
    assert_eq!(r.volume(), Some(16));
    let (below, above) = r.split(0, 2);
    assert_eq!(below, Rect::new([0, 0], [1, 3]));
    assert_eq!(above, Rect::new([2, 0], [3, 3]));
    let (below, above) = r.split(1, 0);
    assert!(below.is_empty());
    assert_eq!(above, r);
}

#[test]
fn test_volume_overflow() {
    let full = Rect::<2, u64>::new([0, 0], [u64::MAX, u64::MAX]);
    assert!(!full.is_empty());
    assert_eq!(full.volume(), None);
    let half = Rect::<2, u64>::new([0, 0], [u64::MAX, u64::MAX / 2]);
    assert_eq!(half.volume(), Some(1 << 127));
    assert_eq!(Rect::<1, u64>::new([0], [u64::MAX]).volume(), Some(1 << 64));
}

#[test]
fn test_points_order() {
    let r = Rect::<2>::new([0, 5], [1, 6]);
    let points: Vec<_> = r.points().map(|p| p.into_array()).collect();
    assert_eq!(points, vec![[0, 5], [1, 5], [0, 6], [1, 6]]);
    assert_eq!(Rect::<2>::empty().points().count(), 0);
}

#[test]
fn test_contains_rect() {
    let outer = Rect::<1>::new([0], [9]);
    assert!(outer.contains_rect(&Rect::new([2], [4])));
    assert!(!outer.contains_rect(&Rect::new([8], [10])));
    assert!(outer.contains_rect(&Rect::empty()));
}
