use std::marker::PhantomData;

use bytemuck::Pod;
use strata_types::{Coord, Point, Rect};

use super::{CHECK_BOUNDS, incompatible, log_incompatible, resolve_field};
use crate::error::AccessorError;
use crate::{FieldId, InstancePieceList, RegionInstance};

/// Reads and writes a field of any instance, local or remote, by copying.
pub struct GenericAccessor<'a, FT, const N: usize, T = i32> {
    instance: &'a RegionInstance<N, T>,
    field_id: FieldId,
    pieces: &'a InstancePieceList<N, T>,
    rel_offset: usize,
    bounds: Rect<N, T>,
    prev_piece: Option<usize>,
    element: PhantomData<FT>,
}

impl<'a, FT: Pod, const N: usize, T: Coord> GenericAccessor<'a, FT, N, T> {
    pub fn is_compatible(
        instance: &RegionInstance<N, T>,
        field_id: FieldId,
        subfield_offset: usize,
    ) -> bool {
        resolve_field::<FT, N, T>(instance.layout(), field_id, None, subfield_offset).is_ok()
    }

    pub fn is_compatible_in(
        instance: &RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> bool {
        resolve_field::<FT, N, T>(instance.layout(), field_id, Some(subrect), subfield_offset)
            .is_ok()
    }

    pub fn try_new(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        Self::build(instance, field_id, None, subfield_offset)
    }

    pub fn try_new_in(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        Self::build(instance, field_id, Some(subrect), subfield_offset)
    }

    pub fn new(instance: &'a RegionInstance<N, T>, field_id: FieldId, subfield_offset: usize) -> Self {
        Self::try_new(instance, field_id, subfield_offset)
            .unwrap_or_else(|err| incompatible("generic", field_id, err))
    }

    pub fn new_in(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Self {
        Self::try_new_in(instance, field_id, subrect, subfield_offset)
            .unwrap_or_else(|err| incompatible("generic", field_id, err))
    }

    fn build(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: Option<&Rect<N, T>>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        let (field, pieces, bounds) =
            resolve_field::<FT, N, T>(instance.layout(), field_id, subrect, subfield_offset)
                .inspect_err(|err| log_incompatible("generic", field_id, err))?;
        Ok(Self {
            instance,
            field_id,
            pieces,
            rel_offset: field.rel_offset.wrapping_add(subfield_offset),
            bounds,
            prev_piece: None,
            element: PhantomData,
        })
    }

    /// Byte offset of the element at `p` within the instance.
    pub fn offset(&mut self, p: &Point<N, T>) -> usize {
        if CHECK_BOUNDS {
            assert!(
                self.bounds.contains(p),
                "{p} is outside the accessor bounds {}",
                self.bounds
            );
        }
        let pieces = self.pieces.pieces();
        let cached = self
            .prev_piece
            .filter(|&idx| pieces[idx].bounds.contains(p));
        let idx = match cached {
            Some(idx) => idx,
            None => {
                let Some(idx) = self.pieces.find_piece_index(p) else {
                    panic!("{p} is not covered by any piece of field {}", self.field_id);
                };
                tracing::trace!(field = self.field_id, piece = idx, "generic accessor cache refill");
                self.prev_piece = Some(idx);
                idx
            }
        };
        pieces[idx].calculate_offset(p).wrapping_add(self.rel_offset)
    }

    pub fn read(&mut self, p: &Point<N, T>) -> FT {
        let offset = self.offset(p);
        let mut value = FT::zeroed();
        self.instance
            .read_bytes(offset, bytemuck::bytes_of_mut(&mut value));
        value
    }

    pub fn write(&mut self, p: &Point<N, T>, value: FT) {
        let offset = self.offset(p);
        self.instance.write_bytes(offset, bytemuck::bytes_of(&value));
    }

    pub fn bounds(&self) -> &Rect<N, T> {
        &self.bounds
    }
}

impl<FT, const N: usize, T: Coord> std::fmt::Debug for GenericAccessor<'_, FT, N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericAccessor")
            .field("field", &self.field_id)
            .field("rel_offset", &self.rel_offset)
            .field("bounds", &self.bounds)
            .field("prev_piece", &self.prev_piece)
            .finish()
    }
}
