//! Layout constraints handed to layout selection by the instance creator

use crate::FieldId;
use crate::error::LayoutError;

/// The largest alignment [`FieldInfo::new`] derives from a field size.
pub const MAX_NATURAL_ALIGNMENT: usize = 16;

/// Size, alignment and placement of one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub field_id: FieldId,
    /// Place the field at exactly `offset` within its group's element instead of packing it.
    pub fixed_offset: bool,
    pub offset: usize,
    pub size: usize,
    pub alignment: usize,
}

impl FieldInfo {
    /// A packed field aligned to the largest power of two dividing its size (capped at
    /// [`MAX_NATURAL_ALIGNMENT`]).
    pub fn new(field_id: FieldId, size: usize) -> Self {
        Self {
            field_id,
            fixed_offset: false,
            offset: 0,
            size,
            alignment: natural_alignment(size),
        }
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_fixed_offset(mut self, offset: usize) -> Self {
        self.fixed_offset = true;
        self.offset = offset;
        self
    }
}

fn natural_alignment(size: usize) -> usize {
    if size == 0 {
        return 1;
    }
    (1usize << size.trailing_zeros()).min(MAX_NATURAL_ALIGNMENT)
}

/// Fields that share one piece list, interleaved element by element.
pub type FieldGroup = Vec<FieldInfo>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceLayoutConstraints {
    pub field_groups: Vec<FieldGroup>,
}

impl InstanceLayoutConstraints {
    pub fn from_groups(field_groups: Vec<FieldGroup>) -> Self {
        Self { field_groups }
    }

    /// Group fields by a blocking factor: `0` gives every field its own piece list (struct of
    /// arrays), `1` puts all fields in one piece list (array of structs).
    pub fn from_field_sizes(
        fields: impl IntoIterator<Item = (FieldId, usize)>,
        block_size: usize,
    ) -> Result<Self, LayoutError> {
        let fields = fields
            .into_iter()
            .map(|(field_id, size)| FieldInfo::new(field_id, size));
        let field_groups = match block_size {
            0 => fields.map(|field| vec![field]).collect(),
            1 => vec![fields.collect()],
            other => return Err(LayoutError::UnsupportedBlocking(other)),
        };
        Ok(Self { field_groups })
    }

    pub fn field_count(&self) -> usize {
        self.field_groups.iter().map(Vec::len).sum()
    }
}

#[test]
fn test_blocking_factor_groups() {
    let soa = InstanceLayoutConstraints::from_field_sizes([(1, 8), (2, 4)], 0).unwrap();
    assert_eq!(soa.field_groups.len(), 2);
    let aos = InstanceLayoutConstraints::from_field_sizes([(1, 8), (2, 4)], 1).unwrap();
    assert_eq!(aos.field_groups.len(), 1);
    assert_eq!(aos.field_count(), 2);
    assert_eq!(
        InstanceLayoutConstraints::from_field_sizes([(1, 8)], 4),
        Err(LayoutError::UnsupportedBlocking(4))
    );
}

#[test]
fn test_natural_alignment() {
    assert_eq!(FieldInfo::new(0, 12).alignment, 4);
    assert_eq!(FieldInfo::new(0, 3).alignment, 1);
    assert_eq!(FieldInfo::new(0, 64).alignment, MAX_NATURAL_ALIGNMENT);
    assert_eq!(FieldInfo::new(0, 0).alignment, 1);
}
