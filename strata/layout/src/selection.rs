//! Layout selection: turn an index space and field constraints into affine pieces

use rustc_hash::FxHashMap;
use strata_types::{Coord, IndexSpace, Rect};

use crate::constraints::InstanceLayoutConstraints;
use crate::error::LayoutError;
use crate::{FieldLayout, InstanceLayout, InstanceLayoutPiece, InstancePieceList};

fn round_up(value: usize, alignment: usize) -> Result<usize, LayoutError> {
    value
        .checked_next_multiple_of(alignment)
        .ok_or(LayoutError::SizeOverflow)
}

fn validate_dim_order<const N: usize>(dim_order: &[usize; N]) -> Result<(), LayoutError> {
    let mut seen = [false; N];
    for &dim in dim_order {
        if dim >= N || seen[dim] {
            return Err(LayoutError::InvalidDimensionOrder(dim_order.to_vec()));
        }
        seen[dim] = true;
    }
    Ok(())
}

impl<const N: usize, T: Coord> InstanceLayout<N, T> {
    /// One affine piece per field group covering the bounds of `space`.
    ///
    /// `dim_order[0]` is the fastest varying dimension, so `[0, 1, ..]` is column major (Fortran)
    /// and `[.., 1, 0]` is row major (C).
    pub fn choose(
        space: IndexSpace<N, T>,
        constraints: &InstanceLayoutConstraints,
        dim_order: &[usize; N],
    ) -> Result<Self, LayoutError> {
        let covering: Vec<_> = if space.bounds().is_empty() {
            Vec::new()
        } else {
            vec![*space.bounds()]
        };
        Self::choose_with_covering(space, &covering, constraints, dim_order)
    }

    /// One affine piece per covering rectangle and field group.
    ///
    /// Fields in the same group are interleaved: each element of the group is padded to the
    /// largest field alignment and every piece of the group starts on that alignment. The
    /// covering rectangles must be disjoint and inside the space bounds; they may cover holes of a
    /// sparse space.
    pub fn choose_with_covering(
        space: IndexSpace<N, T>,
        covering: &[Rect<N, T>],
        constraints: &InstanceLayoutConstraints,
        dim_order: &[usize; N],
    ) -> Result<Self, LayoutError> {
        validate_dim_order(dim_order)?;
        for rect in covering {
            if !space.bounds().contains_rect(rect) {
                return Err(LayoutError::CoveringOutsideSpace {
                    rect: rect.to_string(),
                    bounds: space.bounds().to_string(),
                });
            }
        }

        let mut fields = FxHashMap::default();
        let mut piece_lists = Vec::with_capacity(constraints.field_groups.len());
        let mut bytes_used = 0usize;
        let mut alignment_reqd = 1usize;

        for (list_idx, group) in constraints.field_groups.iter().enumerate() {
            let mut element_size = 0usize;
            let mut element_alignment = 1usize;
            for field in group {
                if !field.alignment.is_power_of_two() {
                    return Err(LayoutError::InvalidAlignment {
                        field: field.field_id,
                        alignment: field.alignment,
                    });
                }
                let rel_offset = if field.fixed_offset {
                    if field.offset % field.alignment != 0 {
                        return Err(LayoutError::MisalignedOffset {
                            field: field.field_id,
                            offset: field.offset,
                            alignment: field.alignment,
                        });
                    }
                    field.offset
                } else {
                    round_up(element_size, field.alignment)?
                };
                let end = rel_offset
                    .checked_add(field.size)
                    .ok_or(LayoutError::SizeOverflow)?;
                element_size = element_size.max(end);
                element_alignment = element_alignment.max(field.alignment);
                let previous = fields.insert(
                    field.field_id,
                    FieldLayout {
                        list_idx,
                        rel_offset,
                        size_in_bytes: field.size,
                    },
                );
                if previous.is_some() {
                    return Err(LayoutError::DuplicateField(field.field_id));
                }
            }

            if group.is_empty() {
                piece_lists.push(InstancePieceList::default());
                continue;
            }

            let element_size = round_up(element_size, element_alignment)?;
            let mut pieces = Vec::with_capacity(covering.len());
            for rect in covering.iter().filter(|rect| !rect.is_empty()) {
                bytes_used = round_up(bytes_used, element_alignment)?;
                let mut strides = [0usize; N];
                let mut piece_size = element_size;
                for &dim in dim_order {
                    strides[dim] = piece_size;
                    let extent =
                        usize::try_from(rect.extent(dim)).map_err(|_| LayoutError::SizeOverflow)?;
                    piece_size = piece_size
                        .checked_mul(extent)
                        .ok_or(LayoutError::SizeOverflow)?;
                }
                // shift the base so the formula takes absolute coordinates
                let offset = bytes_used.wrapping_sub(rect.lo.dot_strides(&strides));
                pieces.push(InstanceLayoutPiece::affine(*rect, offset, strides));
                bytes_used = bytes_used
                    .checked_add(piece_size)
                    .ok_or(LayoutError::SizeOverflow)?;
            }
            piece_lists.push(InstancePieceList::new(pieces));
            alignment_reqd = alignment_reqd.max(element_alignment);
        }

        tracing::debug!(
            groups = constraints.field_groups.len(),
            pieces = covering.len(),
            bytes_used,
            alignment_reqd,
            "chose instance layout"
        );

        Ok(Self::from_parts(
            space,
            piece_lists,
            fields,
            bytes_used,
            alignment_reqd,
        ))
    }
}
