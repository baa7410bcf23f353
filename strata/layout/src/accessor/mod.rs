//! Field accessors for region instances
//!
//! Three tiers trade generality for speed:
//! - [`GenericAccessor`] works on any instance, including remote memory, by walking the piece
//!   list with a one piece cache.
//! - [`AffineAccessor`] needs the accessed bounds to sit in one affine piece of local memory and
//!   is a single dot product per access.
//! - [`MultiAffineAccessor`] evaluates the compiled lookup program on a cache miss, so it handles
//!   any number of pieces in local memory.
//!
//! Every tier offers `is_compatible`, a fallible `try_new` and a panicking `new`.

use strata_types::{Coord, Rect};

use crate::error::AccessorError;
use crate::{FieldId, FieldLayout, InstanceLayout, InstancePieceList};

mod affine;
mod generic;
mod multi_affine;

pub use affine::AffineAccessor;
pub use generic::GenericAccessor;
pub use multi_affine::MultiAffineAccessor;

/// Accessors record their bounds and assert every point against them.
pub(crate) const CHECK_BOUNDS: bool = cfg!(any(debug_assertions, feature = "accessor-debug"));

/// The field, its piece list, and the bounds the accessor may touch.
pub(crate) fn resolve_field<'a, FT, const N: usize, T: Coord>(
    layout: &'a InstanceLayout<N, T>,
    field_id: FieldId,
    subrect: Option<&Rect<N, T>>,
    subfield_offset: usize,
) -> Result<(&'a FieldLayout, &'a InstancePieceList<N, T>, Rect<N, T>), AccessorError> {
    let field = layout
        .field(field_id)
        .ok_or(AccessorError::UnknownField(field_id))?;
    let list = layout
        .piece_lists()
        .get(field.list_idx)
        .ok_or(AccessorError::MissingPieceList(field_id))?;
    let element = std::mem::size_of::<FT>();
    let fits = subfield_offset
        .checked_add(element)
        .is_some_and(|end| end <= field.size_in_bytes);
    if !fits {
        return Err(AccessorError::ElementSize {
            field: field_id,
            subfield_offset,
            element,
            field_size: field.size_in_bytes,
        });
    }
    let bounds = match subrect {
        Some(subrect) => {
            if !layout.space().bounds().contains_rect(subrect) {
                return Err(AccessorError::OutsideInstance);
            }
            *subrect
        }
        None => *layout.space().bounds(),
    };
    Ok((field, list, bounds))
}

/// Offset of an element access, checked against the instance allocation.
#[inline(always)]
pub(crate) fn checked_element_offset(offset: usize, element: usize, instance_size: usize) -> usize {
    let in_range = offset
        .checked_add(element)
        .is_some_and(|end| end <= instance_size);
    assert!(
        in_range,
        "element at offset {offset} is outside the {instance_size} byte instance"
    );
    offset
}

pub(crate) fn log_incompatible(kind: &str, field_id: FieldId, err: &AccessorError) {
    tracing::warn!(accessor = kind, field = field_id, %err, "accessor is not compatible");
}

pub(crate) fn incompatible(kind: &str, field_id: FieldId, err: AccessorError) -> ! {
    tracing::error!(accessor = kind, field = field_id, %err, "constructing incompatible accessor");
    panic!("{kind} accessor for field {field_id} is incompatible with the instance: {err}");
}
