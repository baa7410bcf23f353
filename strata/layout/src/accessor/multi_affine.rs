use std::marker::PhantomData;
use std::ptr::NonNull;

use bytemuck::Pod;
use enumset::EnumSet;
use strata_types::{Coord, Point, Rect};

use super::{CHECK_BOUNDS, checked_element_offset, incompatible, log_incompatible, resolve_field};
use crate::error::AccessorError;
use crate::lookup::{AffinePiece, InstructionRef, Opcode};
use crate::{FieldId, InstancePieceList, RegionInstance};

/// Access to a field split over any number of affine pieces of local memory.
///
/// The piece of the last access is cached. A miss evaluates the compiled lookup program.
pub struct MultiAffineAccessor<'a, FT, const N: usize, T = i32> {
    program: &'a [u8],
    pieces: &'a InstancePieceList<N, T>,
    start_inst: usize,
    field_id: FieldId,
    base: NonNull<u8>,
    /// Field and subfield offset added to every piece offset.
    field_offset: usize,
    instance_size: usize,
    bounds: Rect<N, T>,
    piece_valid: bool,
    piece_bounds: Rect<N, T>,
    piece_base: usize,
    piece_strides: [usize; N],
    instance: PhantomData<&'a RegionInstance<N, T>>,
    element: PhantomData<FT>,
}

impl<'a, FT: Pod, const N: usize, T: Coord> MultiAffineAccessor<'a, FT, N, T> {
    /// Instructions this accessor knows how to evaluate.
    pub fn supported_instructions() -> EnumSet<Opcode> {
        Opcode::SplitPlane | Opcode::AffinePiece
    }

    pub fn is_compatible(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subfield_offset: usize,
    ) -> bool {
        Self::check(instance, field_id, None, subfield_offset).is_ok()
    }

    pub fn is_compatible_in(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> bool {
        Self::check(instance, field_id, Some(subrect), subfield_offset).is_ok()
    }

    pub fn try_new(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        Self::check(instance, field_id, None, subfield_offset)
            .inspect_err(|err| log_incompatible("multi-affine", field_id, err))
    }

    pub fn try_new_in(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        Self::check(instance, field_id, Some(subrect), subfield_offset)
            .inspect_err(|err| log_incompatible("multi-affine", field_id, err))
    }

    pub fn new(instance: &'a RegionInstance<N, T>, field_id: FieldId, subfield_offset: usize) -> Self {
        Self::check(instance, field_id, None, subfield_offset)
            .unwrap_or_else(|err| incompatible("multi-affine", field_id, err))
    }

    pub fn new_in(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Self {
        Self::check(instance, field_id, Some(subrect), subfield_offset)
            .unwrap_or_else(|err| incompatible("multi-affine", field_id, err))
    }

    fn check(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: Option<&Rect<N, T>>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        let base = instance.base_address().ok_or(AccessorError::NotLocal)?;
        let layout: &'a _ = instance.layout().as_ref();
        let (field, pieces, bounds) = resolve_field::<FT, N, T>(layout, field_id, subrect, subfield_offset)?;
        let program = layout.lookup_program()?;
        let entry = program
            .field(field_id)
            .ok_or(AccessorError::UnknownField(field_id))?;
        if !entry.supports(Self::supported_instructions()) {
            return Err(AccessorError::UnsupportedInstructions {
                field: field_id,
                used: entry.inst_usage_mask,
            });
        }
        let start_inst = entry
            .start_inst
            .ok_or(AccessorError::NotCovered { field: field_id })?;

        let mut accessor = Self {
            program: program.bytes(),
            pieces,
            start_inst,
            field_id,
            base,
            field_offset: field.rel_offset.wrapping_add(subfield_offset),
            instance_size: instance.size(),
            bounds,
            piece_valid: false,
            piece_bounds: Rect::empty(),
            piece_base: 0,
            piece_strides: [0; N],
            instance: PhantomData,
            element: PhantomData,
        };

        // a program that is one leaf covering everything never needs a lookup
        let single = InstructionRef::<N, T>::at(accessor.program, start_inst)
            .and_then(|inst| inst.affine_piece())
            .filter(|(piece, next)| *next == 0 && piece.bounds.contains_rect(&bounds));
        if let Some((piece, _)) = single {
            accessor.fill_cache(&piece);
        }
        Ok(accessor)
    }

    fn fill_cache(&mut self, piece: &AffinePiece<N, T>) {
        self.piece_valid = true;
        self.piece_bounds = piece.bounds;
        self.piece_base = piece.base;
        self.piece_strides = piece.strides;
    }

    #[inline(always)]
    fn cache_hit(&self, p: &Point<N, T>) -> bool {
        self.piece_valid && self.piece_bounds.contains(p)
    }

    fn lookup(&self, p: &Point<N, T>) -> AffinePiece<N, T> {
        let piece = InstructionRef::<N, T>::at(self.program, self.start_inst)
            .and_then(|inst| inst.lookup(p));
        match piece {
            Some(piece) => piece,
            None => panic!("{p} is not covered by any piece of field {}", self.field_id),
        }
    }

    #[inline(always)]
    fn check_point(&self, p: &Point<N, T>) {
        if CHECK_BOUNDS {
            assert!(
                self.bounds.contains(p),
                "{p} is outside the accessor bounds {}",
                self.bounds
            );
        }
    }

    #[inline(always)]
    fn element_ptr(&self, base: usize, strides: &[usize; N], p: &Point<N, T>) -> *mut FT {
        let offset = base
            .wrapping_add(p.dot_strides(strides))
            .wrapping_add(self.field_offset);
        let offset = checked_element_offset(offset, std::mem::size_of::<FT>(), self.instance_size);
        self.base.as_ptr().wrapping_add(offset).cast()
    }

    /// Address of the element at `p`, refilling the piece cache on a miss.
    #[inline]
    pub fn ptr(&mut self, p: &Point<N, T>) -> *mut FT {
        self.check_point(p);
        if !self.cache_hit(p) {
            let piece = self.lookup(p);
            tracing::trace!(field = self.field_id, bounds = %piece.bounds, "multi-affine cache refill");
            self.fill_cache(&piece);
        }
        self.element_ptr(self.piece_base, &self.piece_strides, p)
    }

    /// Address of the element at `p` without touching the cache.
    #[inline]
    pub fn ptr_shared(&self, p: &Point<N, T>) -> *mut FT {
        self.check_point(p);
        if self.cache_hit(p) {
            return self.element_ptr(self.piece_base, &self.piece_strides, p);
        }
        let piece = self.lookup(p);
        self.element_ptr(piece.base, &piece.strides, p)
    }

    /// Address of `r.lo` and the strides to walk `r`, if `r` lies inside one piece.
    pub fn ptr_rect(&mut self, r: &Rect<N, T>) -> Option<(*mut FT, [usize; N])> {
        if r.is_empty() {
            return None;
        }
        let ptr = self.ptr(&r.lo);
        if self.piece_bounds.contains_rect(r) {
            return Some((ptr, self.piece_strides));
        }
        // leaves can be clipped by split planes, the piece they came from is authoritative
        let piece = self.pieces.find_piece(&r.lo)?;
        piece
            .bounds
            .contains_rect(r)
            .then_some((ptr, self.piece_strides))
    }

    #[inline]
    pub fn read(&mut self, p: &Point<N, T>) -> FT {
        // SAFETY: the address was checked to lie inside the instance allocation, and any bit
        // pattern is a valid `FT`.
        unsafe { self.ptr(p).read_unaligned() }
    }

    #[inline]
    pub fn write(&mut self, p: &Point<N, T>, value: FT) {
        // SAFETY: see `read`. The borrowed instance is !Sync, so no other thread accesses it.
        unsafe { self.ptr(p).write_unaligned(value) }
    }

    #[inline]
    pub fn read_shared(&self, p: &Point<N, T>) -> FT {
        // SAFETY: see `read`.
        unsafe { self.ptr_shared(p).read_unaligned() }
    }

    #[inline]
    pub fn write_shared(&self, p: &Point<N, T>, value: FT) {
        // SAFETY: see `write`.
        unsafe { self.ptr_shared(p).write_unaligned(value) }
    }

    pub fn bounds(&self) -> &Rect<N, T> {
        &self.bounds
    }

    /// Bounds of the cached piece, if the cache is valid.
    pub fn cached_piece(&self) -> Option<&Rect<N, T>> {
        self.piece_valid.then_some(&self.piece_bounds)
    }
}

impl<FT, const N: usize, T: Coord> std::fmt::Debug for MultiAffineAccessor<'_, FT, N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiAffineAccessor")
            .field("field", &self.field_id)
            .field("start_inst", &self.start_inst)
            .field("bounds", &self.bounds)
            .field("piece_valid", &self.piece_valid)
            .field("piece_bounds", &self.piece_bounds)
            .finish_non_exhaustive()
    }
}
