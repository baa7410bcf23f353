use std::fmt::Display;

use bytemuck::Contiguous;
use strata_types::{Coord, Point, Rect};

use crate::lookup::Opcode;

/// Discriminant tagging each piece kind in serialized layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Contiguous)]
#[repr(u8)]
pub enum PieceLayoutType {
    Affine = 1,
}

impl PieceLayoutType {
    /// Reserved tag that never names a piece kind.
    pub const INVALID: u8 = 0;

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::from_integer(tag)
    }
}

/// `offset + Σ strides[i] * p[i]`, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AffineLayoutPiece<const N: usize> {
    pub offset: usize,
    pub strides: [usize; N],
}

impl<const N: usize> AffineLayoutPiece<N> {
    #[inline(always)]
    pub fn calculate_offset<T: Coord>(&self, p: &Point<N, T>) -> usize {
        self.offset.wrapping_add(p.dot_strides(&self.strides))
    }
}

/// How a piece maps points to offsets. Closed on purpose: every kind has a matching lookup
/// opcode, so a program consumer can enumerate what it must support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PieceLayout<const N: usize> {
    Affine(AffineLayoutPiece<N>),
}

impl<const N: usize> PieceLayout<N> {
    pub fn layout_type(&self) -> PieceLayoutType {
        match self {
            Self::Affine(_) => PieceLayoutType::Affine,
        }
    }

    /// The instruction this piece becomes in a lookup program.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Affine(_) => Opcode::AffinePiece,
        }
    }

    pub fn as_affine(&self) -> Option<&AffineLayoutPiece<N>> {
        match self {
            Self::Affine(affine) => Some(affine),
        }
    }
}

/// One rectangle of an instance together with its offset rule.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceLayoutPiece<const N: usize, T = i32> {
    pub bounds: Rect<N, T>,
    pub layout: PieceLayout<N>,
}

impl<const N: usize, T: Coord> InstanceLayoutPiece<N, T> {
    pub fn affine(bounds: Rect<N, T>, offset: usize, strides: [usize; N]) -> Self {
        Self {
            bounds,
            layout: PieceLayout::Affine(AffineLayoutPiece { offset, strides }),
        }
    }

    pub fn layout_type(&self) -> PieceLayoutType {
        self.layout.layout_type()
    }

    /// Byte offset of `p`, which must be inside `bounds`.
    #[inline(always)]
    pub fn calculate_offset(&self, p: &Point<N, T>) -> usize {
        debug_assert!(self.bounds.contains(p), "{p} is outside piece {}", self.bounds);
        match &self.layout {
            PieceLayout::Affine(affine) => affine.calculate_offset(p),
        }
    }

    pub fn relocate(&mut self, delta: usize) {
        match &mut self.layout {
            PieceLayout::Affine(affine) => affine.offset = affine.offset.wrapping_add(delta),
        }
    }

    /// The same rule restricted to a sub-rectangle.
    pub(crate) fn clipped(&self, bounds: Rect<N, T>) -> Self {
        Self {
            bounds,
            layout: self.layout,
        }
    }
}

impl<const N: usize, T: Coord> Display for InstanceLayoutPiece<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.layout {
            PieceLayout::Affine(affine) => {
                write!(f, "{}:affine(offset={}, strides=<", self.bounds, affine.offset)?;
                for (i, stride) in affine.strides.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{stride}")?;
                }
                write!(f, ">)")
            }
        }
    }
}

impl<const N: usize, T: Coord> std::fmt::Debug for InstanceLayoutPiece<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[test]
fn test_affine_offset_and_relocate() {
    // column-major 4x4 of 8 byte elements starting at byte 64
    let mut piece = InstanceLayoutPiece::<2>::affine(Rect::new([0, 0], [3, 3]), 64, [8, 32]);
    assert_eq!(piece.calculate_offset(&Point::new([1, 2])), 64 + 8 + 64);
    piece.relocate(1000);
    assert_eq!(piece.calculate_offset(&Point::new([0, 0])), 1064);
    assert_eq!(piece.layout_type(), PieceLayoutType::Affine);
    assert_eq!(PieceLayoutType::from_tag(PieceLayoutType::INVALID), None);
    assert_eq!(PieceLayoutType::from_tag(1), Some(PieceLayoutType::Affine));
}

#[test]
fn test_piece_display() {
    let piece = InstanceLayoutPiece::<2>::affine(Rect::new([0, 0], [1, 1]), 0, [4, 8]);
    assert_eq!(piece.to_string(), "[<0,0>..<1,1>]:affine(offset=0, strides=<4,8>)");
}
