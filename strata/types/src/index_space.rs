use crate::{Coord, Point, Rect};

/// The set of points an instance is defined over: a bounding rectangle, optionally narrowed to an
/// explicit list of disjoint rectangles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSpace<const N: usize, T = i32> {
    bounds: Rect<N, T>,
    sparsity: Option<Box<[Rect<N, T>]>>,
}

impl<const N: usize, T: Coord> IndexSpace<N, T> {
    /// Every point of `bounds`.
    pub fn dense(bounds: Rect<N, T>) -> Self {
        Self {
            bounds,
            sparsity: None,
        }
    }

    /// The union of `rects`, which must be pairwise disjoint. Empty rectangles are dropped.
    pub fn sparse(rects: impl IntoIterator<Item = Rect<N, T>>) -> Self {
        let rects: Box<[_]> = rects.into_iter().filter(|r| !r.is_empty()).collect();
        debug_assert!(
            rects
                .iter()
                .enumerate()
                .all(|(i, a)| rects[i + 1..].iter().all(|b| !a.overlaps(b))),
            "sparse index space rectangles must be disjoint"
        );
        let bounds = rects
            .iter()
            .fold(Rect::empty(), |acc, r| acc.union_bbox(r));
        Self {
            bounds,
            sparsity: Some(rects),
        }
    }

    pub fn bounds(&self) -> &Rect<N, T> {
        &self.bounds
    }

    pub fn is_dense(&self) -> bool {
        self.sparsity.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.rects().iter().all(Rect::is_empty)
    }

    /// The rectangles making up the space: just the bounds for a dense space.
    pub fn rects(&self) -> &[Rect<N, T>] {
        match &self.sparsity {
            Some(rects) => rects,
            None => std::slice::from_ref(&self.bounds),
        }
    }

    pub fn contains(&self, p: &Point<N, T>) -> bool {
        match &self.sparsity {
            Some(rects) => rects.iter().any(|r| r.contains(p)),
            None => self.bounds.contains(p),
        }
    }

    /// Number of points, or `None` when the count does not fit a `u128`.
    pub fn volume(&self) -> Option<u128> {
        self.rects()
            .iter()
            .try_fold(0u128, |acc, r| acc.checked_add(r.volume()?))
    }
}

impl<const N: usize, T: Coord> From<Rect<N, T>> for IndexSpace<N, T> {
    fn from(bounds: Rect<N, T>) -> Self {
        Self::dense(bounds)
    }
}

#[test]
fn test_sparse_bounds() {
    let space = IndexSpace::<2>::sparse([
        Rect::new([0, 0], [1, 1]),
        Rect::new([4, 4], [5, 6]),
        Rect::empty(),
    ]);
    assert_eq!(*space.bounds(), Rect::new([0, 0], [5, 6]));
    assert_eq!(space.volume(), Some(4 + 6));
    assert!(space.contains(&Point::new([5, 6])));
    assert!(!space.contains(&Point::new([2, 2])));
    assert_eq!(space.rects().len(), 2);
    assert!(format!("{space:?}").contains("[<4,4>..<5,6>]"));
}

#[test]
fn test_huge_space_volume() {
    let full = IndexSpace::dense(Rect::<2, u64>::new([0, 0], [u64::MAX, u64::MAX]));
    assert!(!full.is_empty());
    assert_eq!(full.volume(), None);
    assert!(IndexSpace::<2>::dense(Rect::empty()).is_empty());
    assert!(IndexSpace::<2>::sparse([]).is_empty());
}
