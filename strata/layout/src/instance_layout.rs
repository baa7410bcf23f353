use std::fmt::Display;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use strata_types::{Coord, IndexSpace, Point};

use crate::error::CompileError;
use crate::lookup::{CompileOptions, CompiledProgram, HostProgramMemory, ProgramMemory};
use crate::{FieldId, InstancePieceList};

/// Where a field lives: which piece list, and at what offset inside each element of that list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    pub list_idx: usize,
    pub rel_offset: usize,
    pub size_in_bytes: usize,
}

/// The mapping from an index space and a set of fields to byte offsets inside an instance.
///
/// A layout is immutable once it is shared. The only mutation, [`InstanceLayout::relocate`],
/// needs exclusive access and discards the cached lookup program.
pub struct InstanceLayout<const N: usize, T = i32> {
    space: IndexSpace<N, T>,
    piece_lists: Vec<InstancePieceList<N, T>>,
    fields: FxHashMap<FieldId, FieldLayout>,
    bytes_used: usize,
    alignment_reqd: usize,
    program: OnceLock<Result<CompiledProgram<N, T>, CompileError>>,
}

impl<const N: usize, T: Coord> InstanceLayout<N, T> {
    pub fn from_parts(
        space: IndexSpace<N, T>,
        piece_lists: Vec<InstancePieceList<N, T>>,
        fields: FxHashMap<FieldId, FieldLayout>,
        bytes_used: usize,
        alignment_reqd: usize,
    ) -> Self {
        Self {
            space,
            piece_lists,
            fields,
            bytes_used,
            alignment_reqd,
            program: OnceLock::new(),
        }
    }

    pub fn space(&self) -> &IndexSpace<N, T> {
        &self.space
    }

    pub fn piece_lists(&self) -> &[InstancePieceList<N, T>] {
        &self.piece_lists
    }

    pub fn fields(&self) -> &FxHashMap<FieldId, FieldLayout> {
        &self.fields
    }

    pub fn field(&self, field_id: FieldId) -> Option<&FieldLayout> {
        self.fields.get(&field_id)
    }

    /// The piece list a field lives in.
    pub fn field_piece_list(&self, field_id: FieldId) -> Option<(&FieldLayout, &InstancePieceList<N, T>)> {
        let field = self.fields.get(&field_id)?;
        let list = self.piece_lists.get(field.list_idx)?;
        Some((field, list))
    }

    /// Total footprint of the instance in bytes.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn alignment_reqd(&self) -> usize {
        self.alignment_reqd
    }

    /// Byte offset of `field_id` at `p`, or `None` if the field is unknown or no piece contains
    /// `p`.
    ///
    /// This walks the piece list every time. Accessors are much faster for repeated access.
    pub fn calculate_offset(&self, p: &Point<N, T>, field_id: FieldId) -> Option<usize> {
        let (field, list) = self.field_piece_list(field_id)?;
        let piece = list.find_piece(p)?;
        Some(piece.calculate_offset(p).wrapping_add(field.rel_offset))
    }

    /// Shift every piece by `delta` bytes, for when the owning instance is placed at a base
    /// offset. The size of the instance does not change.
    pub fn relocate(&mut self, delta: usize) {
        for list in &mut self.piece_lists {
            list.relocate(delta);
        }
        self.program = OnceLock::new();
    }

    /// A relocated copy, for publishing a new layout while readers still hold the old one.
    pub fn relocated(&self, delta: usize) -> Self {
        let mut layout = self.clone();
        layout.relocate(delta);
        layout
    }

    /// Compile the piece lookup program into caller provided memory.
    pub fn compile_lookup_program<M: ProgramMemory>(
        &self,
        memory: M,
        options: &CompileOptions,
    ) -> Result<CompiledProgram<N, T, M>, CompileError> {
        crate::lookup::compile(self, memory, options)
    }

    /// The lookup program in host memory, compiled with default options on first use.
    pub fn lookup_program(&self) -> Result<&CompiledProgram<N, T>, CompileError> {
        self.program
            .get_or_init(|| {
                self.compile_lookup_program(HostProgramMemory::new(), &CompileOptions::default())
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl<const N: usize, T: Coord> Clone for InstanceLayout<N, T> {
    /// The clone recompiles its own lookup program when one is needed.
    fn clone(&self) -> Self {
        Self::from_parts(
            self.space.clone(),
            self.piece_lists.clone(),
            self.fields.clone(),
            self.bytes_used,
            self.alignment_reqd,
        )
    }
}

impl<const N: usize, T: Coord> PartialEq for InstanceLayout<N, T> {
    fn eq(&self, other: &Self) -> bool {
        self.space == other.space
            && self.piece_lists == other.piece_lists
            && self.fields == other.fields
            && self.bytes_used == other.bytes_used
            && self.alignment_reqd == other.alignment_reqd
    }
}

impl<const N: usize, T: Coord> Eq for InstanceLayout<N, T> {}

impl<const N: usize, T: Coord> Display for InstanceLayout<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Layout(bytes={}, align={}, space={}",
            self.bytes_used,
            self.alignment_reqd,
            self.space.bounds()
        )?;
        if !self.space.is_dense() {
            write!(f, " sparse({} rects)", self.space.rects().len())?;
        }
        write!(f, ", fields={{")?;
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_by_key(|(id, _)| **id);
        for (i, (id, field)) in fields.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{id}=list{}+{}:{}",
                field.list_idx, field.rel_offset, field.size_in_bytes
            )?;
        }
        write!(f, "}}, lists=[")?;
        for (i, list) in self.piece_lists.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{list}")?;
        }
        write!(f, "])")
    }
}

impl<const N: usize, T: Coord> std::fmt::Debug for InstanceLayout<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use strata_types::Rect;

    use super::*;
    use crate::InstanceLayoutPiece;

    fn two_field_layout() -> InstanceLayout<1> {
        let list = InstancePieceList::new(vec![
            InstanceLayoutPiece::affine(Rect::new([0], [3]), 0, [16]),
            InstanceLayoutPiece::affine(Rect::new([4], [7]), 64 - 4 * 16, [16]),
        ]);
        let mut fields = FxHashMap::default();
        fields.insert(
            1,
            FieldLayout {
                list_idx: 0,
                rel_offset: 0,
                size_in_bytes: 8,
            },
        );
        fields.insert(
            2,
            FieldLayout {
                list_idx: 0,
                rel_offset: 8,
                size_in_bytes: 8,
            },
        );
        InstanceLayout::from_parts(
            IndexSpace::dense(Rect::new([0], [7])),
            vec![list],
            fields,
            128,
            16,
        )
    }

    #[test]
    fn test_calculate_offset() {
        let layout = two_field_layout();
        assert_eq!(layout.calculate_offset(&Point::new([2]), 1), Some(32));
        assert_eq!(layout.calculate_offset(&Point::new([2]), 2), Some(40));
        assert_eq!(layout.calculate_offset(&Point::new([5]), 2), Some(64 + 16 + 8));
        assert_eq!(layout.calculate_offset(&Point::new([8]), 1), None);
        assert_eq!(layout.calculate_offset(&Point::new([0]), 3), None);
    }

    #[test]
    fn test_relocate_drops_cached_program() {
        let mut layout = two_field_layout();
        let before = layout.lookup_program().unwrap().lookup(1, &Point::new([5]));
        assert_eq!(before.map(|piece| piece.base), Some(0));
        layout.relocate(4096);
        assert_eq!(layout.calculate_offset(&Point::new([0]), 1), Some(4096));
        let program = layout.lookup_program().unwrap();
        let offset = program.calculate_offset(1, &Point::new([5])).unwrap();
        assert_eq!(offset, 4096 + 64 + 16);
        assert_eq!(layout.bytes_used(), 128);
    }

    #[test]
    fn test_clone_is_equal() {
        let layout = two_field_layout();
        let _ = layout.lookup_program().unwrap();
        let clone = layout.clone();
        assert_eq!(layout, clone);
        assert_ne!(layout, layout.relocated(16));
    }
}
