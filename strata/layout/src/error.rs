//! Error types for layout construction, lookup compilation and accessor binding

use enumset::EnumSet;

use crate::FieldId;
use crate::lookup::Opcode;

/// Errors raised while choosing an instance layout from constraints.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("blocking factor {0} is not supported (0 is struct of arrays, 1 is array of structs)")]
    UnsupportedBlocking(usize),
    #[error("dimension order {0:?} is not a permutation of the instance dimensions")]
    InvalidDimensionOrder(Vec<usize>),
    #[error("field {field} has alignment {alignment}, which is not a power of two")]
    InvalidAlignment { field: FieldId, alignment: usize },
    #[error("field {field} has fixed offset {offset}, which is not a multiple of its alignment {alignment}")]
    MisalignedOffset {
        field: FieldId,
        offset: usize,
        alignment: usize,
    },
    #[error("field {0} appears more than once in the layout constraints")]
    DuplicateField(FieldId),
    #[error("covering rectangle {rect} is not inside the index space bounds {bounds}")]
    CoveringOutsideSpace { rect: String, bounds: String },
    #[error("instance size overflows the address space")]
    SizeOverflow,
}

/// Errors from the program memory a lookup program is compiled into.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("program needs {requested} bytes but only {available} are available")]
    Exhausted { requested: usize, available: usize },
    #[error("program memory can only be allocated once")]
    AlreadyAllocated,
}

/// Defects in a layout found while compiling its lookup program.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("pieces {first} and {second} of piece list {list} overlap")]
    Overlap {
        list: usize,
        first: usize,
        second: usize,
    },
    #[error("piece {piece} of piece list {list} extends outside the index space bounds")]
    OutsideBounds { list: usize, piece: usize },
    #[error("piece list {list} covers {covered} points of an index space with {expected} points")]
    CoverageMismatch {
        list: usize,
        covered: u128,
        expected: u128,
    },
    #[error("point count of piece list {list} or of the index space does not fit in 128 bits")]
    VolumeOverflow { list: usize },
    #[error("piece {piece} of piece list {list} needs opcode {opcode:?}, which is not allowed")]
    UnsupportedPieceKind {
        list: usize,
        piece: usize,
        opcode: Opcode,
    },
    #[error("jump of {delta} instructions does not fit the {opcode:?} encoding (max {max})")]
    JumpTooFar {
        opcode: Opcode,
        delta: usize,
        max: usize,
    },
    #[error("field {field} refers to piece list {list}, which does not exist")]
    MissingPieceList { field: FieldId, list: usize },
    #[error("dimension count {0} does not fit the split plane encoding")]
    TooManyDimensions(usize),
    #[error("allocation failed: {0}")]
    Allocation(#[from] AllocError),
}

/// Reasons an accessor cannot be bound to an instance field.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessorError {
    #[error("field {0} is not part of the instance layout")]
    UnknownField(FieldId),
    #[error("field {0} refers to a piece list that does not exist")]
    MissingPieceList(FieldId),
    #[error("instance memory is not directly addressable")]
    NotLocal,
    #[error("field {field} is split over {pieces} pieces")]
    MultiplePieces { field: FieldId, pieces: usize },
    #[error("no single piece of field {field} covers the requested bounds")]
    NotCovered { field: FieldId },
    #[error("requested bounds are outside the instance bounds")]
    OutsideInstance,
    #[error("{element} byte element at subfield offset {subfield_offset} does not fit field {field} of {field_size} bytes")]
    ElementSize {
        field: FieldId,
        subfield_offset: usize,
        element: usize,
        field_size: usize,
    },
    #[error("the lookup program for field {field} uses unsupported instructions {used:?}")]
    UnsupportedInstructions {
        field: FieldId,
        used: EnumSet<Opcode>,
    },
    #[error("lookup program compilation failed: {0}")]
    Compile(#[from] CompileError),
}
