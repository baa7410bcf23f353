use std::marker::PhantomData;
use std::ptr::NonNull;

use bytemuck::Pod;
use strata_types::{Coord, Matrix, Point, Rect};

use super::{CHECK_BOUNDS, checked_element_offset, incompatible, log_incompatible, resolve_field};
use crate::error::AccessorError;
use crate::{FieldId, RegionInstance};

/// Direct access to a field stored in a single affine piece of local memory.
///
/// Accessor coordinates are usually instance coordinates. The `*_with_transform` constructors
/// instead map an accessor point `p` to the instance point `transform * p + offset`, folded into
/// the strides once at construction.
pub struct AffineAccessor<'a, FT, const N: usize, T = i32> {
    base: NonNull<u8>,
    /// Piece offset plus field and subfield offsets.
    offset: usize,
    strides: [usize; N],
    instance_size: usize,
    /// Unknown for a transformed accessor built without a subrect.
    bounds: Option<Rect<N, T>>,
    instance: PhantomData<&'a ()>,
    element: PhantomData<FT>,
}

/// The affine piece an accessor resolves to, in instance coordinates.
struct Located<const N: usize> {
    base: NonNull<u8>,
    offset: usize,
    strides: [usize; N],
    instance_size: usize,
}

fn locate<FT, const N: usize, T: Coord>(
    instance: &RegionInstance<N, T>,
    field_id: FieldId,
    subrect: Option<&Rect<N, T>>,
    subfield_offset: usize,
) -> Result<(Located<N>, Rect<N, T>), AccessorError> {
    let base = instance.base_address().ok_or(AccessorError::NotLocal)?;
    let (field, list, bounds) =
        resolve_field::<FT, N, T>(instance.layout(), field_id, subrect, subfield_offset)?;
    let piece = match subrect {
        Some(subrect) => list
            .pieces()
            .iter()
            .find(|piece| piece.bounds.contains_rect(subrect)),
        None if list.len() > 1 => {
            return Err(AccessorError::MultiplePieces {
                field: field_id,
                pieces: list.len(),
            });
        }
        None => list.pieces().first().filter(|piece| {
            let space = instance.layout().space();
            space.rects().iter().all(|r| piece.bounds.contains_rect(r))
        }),
    };
    let piece = piece.ok_or(AccessorError::NotCovered { field: field_id })?;
    let Some(affine) = piece.layout.as_affine() else {
        return Err(AccessorError::NotCovered { field: field_id });
    };
    let located = Located {
        base,
        offset: affine
            .offset
            .wrapping_add(field.rel_offset)
            .wrapping_add(subfield_offset),
        strides: affine.strides,
        instance_size: instance.size(),
    };
    Ok((located, bounds))
}

impl<'a, FT: Pod, const N: usize, T: Coord> AffineAccessor<'a, FT, N, T> {
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
            .inspect_err(|err| log_incompatible("affine", field_id, err))
    }

    pub fn try_new_in(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        Self::check(instance, field_id, Some(subrect), subfield_offset)
            .inspect_err(|err| log_incompatible("affine", field_id, err))
    }

    pub fn new(instance: &'a RegionInstance<N, T>, field_id: FieldId, subfield_offset: usize) -> Self {
        Self::check(instance, field_id, None, subfield_offset)
            .unwrap_or_else(|err| incompatible("affine", field_id, err))
    }

    pub fn new_in(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Self {
        Self::check(instance, field_id, Some(subrect), subfield_offset)
            .unwrap_or_else(|err| incompatible("affine", field_id, err))
    }

    fn check(
        instance: &'a RegionInstance<N, T>,
        field_id: FieldId,
        subrect: Option<&Rect<N, T>>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        let (located, bounds) = locate::<FT, N, T>(instance, field_id, subrect, subfield_offset)?;
        Ok(Self::from_located(
            located.base,
            located.offset,
            located.strides,
            located.instance_size,
            Some(bounds),
        ))
    }

    pub fn is_compatible_with_transform<const N2: usize, T2: Coord>(
        instance: &'a RegionInstance<N2, T2>,
        transform: &Matrix<N2, N, T2>,
        offset: &Point<N2, T2>,
        field_id: FieldId,
        subfield_offset: usize,
    ) -> bool {
        Self::check_transform(instance, transform, offset, field_id, None, subfield_offset).is_ok()
    }

    /// `subrect` is in accessor coordinates.
    pub fn is_compatible_with_transform_in<const N2: usize, T2: Coord>(
        instance: &'a RegionInstance<N2, T2>,
        transform: &Matrix<N2, N, T2>,
        offset: &Point<N2, T2>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> bool {
        Self::check_transform(instance, transform, offset, field_id, Some(subrect), subfield_offset)
            .is_ok()
    }

    pub fn try_new_with_transform<const N2: usize, T2: Coord>(
        instance: &'a RegionInstance<N2, T2>,
        transform: &Matrix<N2, N, T2>,
        offset: &Point<N2, T2>,
        field_id: FieldId,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        Self::check_transform(instance, transform, offset, field_id, None, subfield_offset)
            .inspect_err(|err| log_incompatible("affine", field_id, err))
    }

    pub fn try_new_with_transform_in<const N2: usize, T2: Coord>(
        instance: &'a RegionInstance<N2, T2>,
        transform: &Matrix<N2, N, T2>,
        offset: &Point<N2, T2>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        Self::check_transform(instance, transform, offset, field_id, Some(subrect), subfield_offset)
            .inspect_err(|err| log_incompatible("affine", field_id, err))
    }

    pub fn new_with_transform<const N2: usize, T2: Coord>(
        instance: &'a RegionInstance<N2, T2>,
        transform: &Matrix<N2, N, T2>,
        offset: &Point<N2, T2>,
        field_id: FieldId,
        subfield_offset: usize,
    ) -> Self {
        Self::check_transform(instance, transform, offset, field_id, None, subfield_offset)
            .unwrap_or_else(|err| incompatible("affine", field_id, err))
    }

    pub fn new_with_transform_in<const N2: usize, T2: Coord>(
        instance: &'a RegionInstance<N2, T2>,
        transform: &Matrix<N2, N, T2>,
        offset: &Point<N2, T2>,
        field_id: FieldId,
        subrect: &Rect<N, T>,
        subfield_offset: usize,
    ) -> Self {
        Self::check_transform(instance, transform, offset, field_id, Some(subrect), subfield_offset)
            .unwrap_or_else(|err| incompatible("affine", field_id, err))
    }

    fn check_transform<const N2: usize, T2: Coord>(
        instance: &'a RegionInstance<N2, T2>,
        transform: &Matrix<N2, N, T2>,
        offset: &Point<N2, T2>,
        field_id: FieldId,
        subrect: Option<&Rect<N, T>>,
        subfield_offset: usize,
    ) -> Result<Self, AccessorError> {
        let image = subrect
            .map(|subrect| {
                transform
                    .image_bounds(subrect, offset)
                    .ok_or(AccessorError::OutsideInstance)
            })
            .transpose()?;
        let (located, _) =
            locate::<FT, N2, T2>(instance, field_id, image.as_ref(), subfield_offset)?;
        // stride of accessor dimension j is the instance strides dotted with column j
        let strides = std::array::from_fn(|j| {
            (0..N2).fold(0usize, |acc, i| {
                acc.wrapping_add(located.strides[i].wrapping_mul(transform[i][j].to_word()))
            })
        });
        let base_offset = located.offset.wrapping_add(offset.dot_strides(&located.strides));
        Ok(Self::from_located(
            located.base,
            base_offset,
            strides,
            located.instance_size,
            subrect.copied(),
        ))
    }

    fn from_located(
        base: NonNull<u8>,
        offset: usize,
        strides: [usize; N],
        instance_size: usize,
        bounds: Option<Rect<N, T>>,
    ) -> Self {
        Self {
            base,
            offset,
            strides,
            instance_size,
            bounds,
            instance: PhantomData,
            element: PhantomData,
        }
    }

    /// Address of the element at `p`.
    #[inline(always)]
    pub fn ptr(&self, p: &Point<N, T>) -> *mut FT {
        if CHECK_BOUNDS {
            if let Some(bounds) = &self.bounds {
                assert!(bounds.contains(p), "{p} is outside the accessor bounds {bounds}");
            }
        }
        let offset = self.offset.wrapping_add(p.dot_strides(&self.strides));
        let offset = checked_element_offset(offset, std::mem::size_of::<FT>(), self.instance_size);
        self.base.as_ptr().wrapping_add(offset).cast()
    }

    #[inline(always)]
    pub fn read(&self, p: &Point<N, T>) -> FT {
        // SAFETY: `ptr` checked the element lies inside the instance allocation, and any bit
        // pattern is a valid `FT`.
        unsafe { self.ptr(p).read_unaligned() }
    }

    #[inline(always)]
    pub fn write(&self, p: &Point<N, T>, value: FT) {
        // SAFETY: see `read`. The borrowed instance is !Sync, so no other thread accesses it.
        unsafe { self.ptr(p).write_unaligned(value) }
    }

    pub fn strides(&self) -> &[usize; N] {
        &self.strides
    }

    /// Accessor bounds, unknown for a transformed accessor built without a subrect.
    pub fn bounds(&self) -> Option<&Rect<N, T>> {
        self.bounds.as_ref()
    }

    /// Elements of `bounds` are packed without gaps, last dimension fastest (C order).
    pub fn is_dense_row_major(&self, bounds: &Rect<N, T>) -> bool {
        let order: [usize; N] = std::array::from_fn(|i| N - 1 - i);
        self.is_dense_in_order(bounds, &order)
    }

    /// Elements of `bounds` are packed without gaps, first dimension fastest (Fortran order).
    pub fn is_dense_col_major(&self, bounds: &Rect<N, T>) -> bool {
        let order: [usize; N] = std::array::from_fn(|i| i);
        self.is_dense_in_order(bounds, &order)
    }

    /// Elements of `bounds` are packed without gaps in some dimension order.
    pub fn is_dense_arbitrary(&self, bounds: &Rect<N, T>) -> bool {
        let mut order: [usize; N] = std::array::from_fn(|i| i);
        order.sort_by_key(|&dim| (self.strides[dim], dim));
        self.is_dense_in_order(bounds, &order)
    }

    fn is_dense_in_order(&self, bounds: &Rect<N, T>, order: &[usize; N]) -> bool {
        let mut expected = std::mem::size_of::<FT>() as u128;
        for &dim in order {
            let extent = bounds.extent(dim);
            // dimensions with a single index never step
            if extent <= 1 {
                continue;
            }
            if self.strides[dim] as u128 != expected {
                return false;
            }
            expected *= extent;
        }
        true
    }
}

impl<FT, const N: usize, T: Coord> std::fmt::Debug for AffineAccessor<'_, FT, N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffineAccessor")
            .field("offset", &self.offset)
            .field("strides", &self.strides)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}
