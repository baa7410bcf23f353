use std::ops::Index;

use crate::{Coord, Point, Rect};

/// An `M` by `N` integer matrix mapping `N` dimensional points to `M` dimensional ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Matrix<const M: usize, const N: usize, T = i32> {
    rows: [Point<N, T>; M],
}

impl<const M: usize, const N: usize, T: Coord> Matrix<M, N, T> {
    pub fn new(rows: [[T; N]; M]) -> Self {
        Self {
            rows: rows.map(Point::new),
        }
    }

    /// Ones on the diagonal. Non-square identities drop or zero-fill dimensions.
    pub fn identity() -> Self {
        let one = T::from_i64(1);
        let zero = T::from_i64(0);
        Self::new(std::array::from_fn(|i| {
            std::array::from_fn(|j| if i == j { one } else { zero })
        }))
    }

    /// `self * p + offset`, or `None` when a component does not fit `T`.
    pub fn apply<S: Coord>(&self, p: &Point<N, S>, offset: &Point<M, T>) -> Option<Point<M, T>> {
        let mut out = *offset;
        for i in 0..M {
            let mut acc = offset[i].to_i128();
            for j in 0..N {
                acc = acc.checked_add(self.rows[i][j].to_i128().checked_mul(p[j].to_i128())?)?;
            }
            out[i] = narrow(acc)?;
        }
        Some(out)
    }

    /// Smallest rectangle holding the image of every point of `r` under `apply`.
    pub fn image_bounds<S: Coord>(&self, r: &Rect<N, S>, offset: &Point<M, T>) -> Option<Rect<M, T>> {
        if r.is_empty() {
            return Some(Rect::empty());
        }
        let mut lo = *offset;
        let mut hi = *offset;
        for i in 0..M {
            let mut min = offset[i].to_i128();
            let mut max = min;
            for j in 0..N {
                let a = self.rows[i][j].to_i128().checked_mul(r.lo[j].to_i128())?;
                let b = self.rows[i][j].to_i128().checked_mul(r.hi[j].to_i128())?;
                min = min.checked_add(a.min(b))?;
                max = max.checked_add(a.max(b))?;
            }
            lo[i] = narrow(min)?;
            hi[i] = narrow(max)?;
        }
        Some(Rect { lo, hi })
    }
}

fn narrow<T: Coord>(value: i128) -> Option<T> {
    let narrowed = T::from_i64(i64::try_from(value).ok()?);
    (narrowed.to_i128() == value).then_some(narrowed)
}

impl<const M: usize, const N: usize, T> Index<usize> for Matrix<M, N, T> {
    type Output = Point<N, T>;

    fn index(&self, row: usize) -> &Point<N, T> {
        &self.rows[row]
    }
}

#[test]
fn test_apply_and_image() {
    // transpose of a 2d point, then shift
    let swap = Matrix::<2, 2>::new([[0, 1], [1, 0]]);
    let offset = Point::new([10, 20]);
    assert_eq!(swap.apply(&Point::<2>::new([3, 4]), &offset), Some(Point::new([14, 23])));
    assert_eq!(
        swap.image_bounds(&Rect::<2>::new([0, 0], [3, 1]), &offset),
        Some(Rect::new([10, 20], [11, 23]))
    );

    let flip = Matrix::<1, 1>::new([[-1]]);
    assert_eq!(
        flip.image_bounds(&Rect::<1>::new([2], [5]), &Point::new([5])),
        Some(Rect::new([0], [3]))
    );
    let identity = Matrix::<2, 2>::identity();
    assert_eq!(identity.apply(&Point::<2>::new([7, 8]), &Point::zeroes()), Some(Point::new([7, 8])));
}

#[test]
fn test_out_of_range_image() {
    let scale = Matrix::<1, 1, u32>::new([[4]]);
    assert_eq!(scale.apply(&Point::<1, u32>::new([u32::MAX / 2]), &Point::zeroes()), None);
    // negative instance coordinates do not exist for an unsigned instance
    let unit = Matrix::<1, 1, u32>::new([[1]]);
    assert_eq!(unit.image_bounds(&Rect::<1>::new([-1], [1]), &Point::zeroes()), None);
    assert_eq!(
        unit.image_bounds(&Rect::<1>::new([0], [1]), &Point::new([7])),
        Some(Rect::new([7], [8]))
    );
}
