use std::fmt::Display;

use strata_types::{Coord, Point, Rect};

use crate::InstanceLayoutPiece;

/// Disjoint pieces implementing one or more fields. Lookup is a linear scan in list order.
#[derive(Clone, PartialEq, Eq)]
pub struct InstancePieceList<const N: usize, T = i32> {
    pieces: Vec<InstanceLayoutPiece<N, T>>,
}

impl<const N: usize, T: Coord> std::fmt::Debug for InstancePieceList<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.pieces).finish()
    }
}

impl<const N: usize, T: Coord> Default for InstancePieceList<N, T> {
    fn default() -> Self {
        Self { pieces: Vec::new() }
    }
}

impl<const N: usize, T: Coord> InstancePieceList<N, T> {
    /// The pieces must have pairwise disjoint bounds. That is checked when the lookup program is
    /// compiled, not here.
    pub fn new(pieces: Vec<InstanceLayoutPiece<N, T>>) -> Self {
        Self { pieces }
    }

    pub fn pieces(&self) -> &[InstanceLayoutPiece<N, T>] {
        &self.pieces
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// The first piece whose bounds contain `p`.
    pub fn find_piece(&self, p: &Point<N, T>) -> Option<&InstanceLayoutPiece<N, T>> {
        self.pieces.iter().find(|piece| piece.bounds.contains(p))
    }

    pub fn find_piece_index(&self, p: &Point<N, T>) -> Option<usize> {
        self.pieces.iter().position(|piece| piece.bounds.contains(p))
    }

    /// Smallest rectangle containing every piece.
    pub fn bounds(&self) -> Rect<N, T> {
        self.pieces
            .iter()
            .fold(Rect::empty(), |acc, piece| acc.union_bbox(&piece.bounds))
    }

    pub fn relocate(&mut self, delta: usize) {
        for piece in &mut self.pieces {
            piece.relocate(delta);
        }
    }
}

impl<const N: usize, T: Coord> Display for InstancePieceList<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{piece}")?;
        }
        write!(f, "]")
    }
}

#[test]
fn test_find_piece() {
    let list = InstancePieceList::<1>::new(vec![
        InstanceLayoutPiece::affine(Rect::new([0], [4]), 0, [4]),
        InstanceLayoutPiece::affine(Rect::new([5], [9]), 100, [4]),
    ]);
    assert_eq!(list.find_piece_index(&Point::new([3])), Some(0));
    assert_eq!(list.find_piece_index(&Point::new([5])), Some(1));
    assert!(list.find_piece(&Point::new([10])).is_none());
    assert_eq!(list.bounds(), Rect::new([0], [9]));
    assert!(format!("{list:?}").contains("[<5>..<9>]:affine(offset=100"));
}
