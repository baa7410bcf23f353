//! Piecewise affine instance layouts
//!
//! An [`InstanceLayout`] maps every point of an index space and every field to a byte offset
//! inside an instance. The space is covered by disjoint pieces, each with its own affine rule:
//! - Layout selection builds pieces from field constraints and a dimension order.
//! - The piece lists can be compiled into a position independent lookup program
//!   ([`lookup::CompiledProgram`]) that any evaluator can run without this crate.
//! - Accessors ([`GenericAccessor`], [`AffineAccessor`], [`MultiAffineAccessor`]) read and write
//!   fields of a [`RegionInstance`].

mod accessor;
mod constraints;
mod error;
mod instance;
mod instance_layout;
pub mod lookup;
mod piece;
mod piece_list;
mod selection;
mod serialize;

pub use accessor::{AffineAccessor, GenericAccessor, MultiAffineAccessor};
pub use constraints::{FieldGroup, FieldInfo, InstanceLayoutConstraints, MAX_NATURAL_ALIGNMENT};
pub use error::{AccessorError, AllocError, CompileError, LayoutError};
pub use instance::{RegionInstance, RemoteMemory};
pub use instance_layout::{FieldLayout, InstanceLayout};
pub use lookup::{CompileOptions, CompiledProgram, HostProgramMemory, Opcode, ProgramMemory};
pub use piece::{AffineLayoutPiece, InstanceLayoutPiece, PieceLayout, PieceLayoutType};
pub use piece_list::InstancePieceList;
pub use serialize::{LAYOUT_FORMAT_VERSION, ReadError, WriteError};
pub use strata_types::{Coord, IndexSpace, Matrix, Point, Rect};

/// Identifies a field of an instance.
pub type FieldId = u32;
