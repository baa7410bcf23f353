//! Compiled piece lookup programs
//!
//! A lookup program is a small position independent bytecode that maps a point to the affine
//! piece containing it. It is compiled once per layout and can be copied into any memory an
//! evaluator can read.

use std::marker::PhantomData;

use enumset::{EnumSet, EnumSetType};
use rustc_hash::FxHashMap;
use strata_types::{Coord, Point};

use crate::FieldId;

mod compiler;
mod instruction;
mod memory;

pub use compiler::CompileOptions;
pub(crate) use compiler::compile;
pub use instruction::{
    AFFINE_PIECE_MAX_DELTA, AffinePiece, INSTRUCTION_ALIGNMENT, InstructionRef,
    SPLIT_PLANE_MAX_DELTA, SPLIT_PLANE_SIZE, SplitPlane, affine_piece_size,
};
pub use memory::{HostProgramMemory, ProgramMemory};

/// Instruction kinds. The discriminant is both the encoded opcode byte and the bit used in
/// instruction usage masks.
#[derive(EnumSetType, Debug, Hash)]
pub enum Opcode {
    SplitPlane = 1,
    AffinePiece = 2,
}

impl Opcode {
    /// Reserved opcode byte. Zeroed memory never decodes as an instruction.
    pub const INVALID: u8 = 0;

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::SplitPlane),
            2 => Some(Self::AffinePiece),
            _ => None,
        }
    }
}

/// Where evaluation for one field starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerField {
    /// Byte offset of the first instruction, `None` when the field has no pieces.
    pub start_inst: Option<usize>,
    /// Every opcode reachable from `start_inst`.
    pub inst_usage_mask: EnumSet<Opcode>,
    /// Added to the piece offset to get the field's offset.
    pub field_offset: usize,
}

impl PerField {
    /// Every instruction the field can reach is one the consumer evaluates.
    pub fn supports(&self, allowed: EnumSet<Opcode>) -> bool {
        self.inst_usage_mask.is_subset(allowed)
    }
}

/// A lookup program together with the memory holding it.
pub struct CompiledProgram<const N: usize, T = i32, M = HostProgramMemory> {
    memory: M,
    fields: FxHashMap<FieldId, PerField>,
    coord: PhantomData<T>,
}

impl<const N: usize, T: Coord, M: ProgramMemory> CompiledProgram<N, T, M> {
    pub(crate) fn new(memory: M, fields: FxHashMap<FieldId, PerField>) -> Self {
        Self {
            memory,
            fields,
            coord: PhantomData,
        }
    }

    pub fn fields(&self) -> &FxHashMap<FieldId, PerField> {
        &self.fields
    }

    pub fn field(&self, field_id: FieldId) -> Option<&PerField> {
        self.fields.get(&field_id)
    }

    /// The committed program bytes.
    pub fn bytes(&self) -> &[u8] {
        self.memory.committed_bytes().unwrap_or(&[])
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// The first instruction evaluated for `field_id`.
    pub fn entry(&self, field_id: FieldId) -> Option<InstructionRef<'_, N, T>> {
        let start = self.fields.get(&field_id)?.start_inst?;
        InstructionRef::at(self.bytes(), start)
    }

    /// The piece of `field_id` containing `p`.
    pub fn lookup(&self, field_id: FieldId, p: &Point<N, T>) -> Option<AffinePiece<N, T>> {
        self.entry(field_id)?.lookup(p)
    }

    /// Byte offset of `field_id` at `p`, matching [`crate::InstanceLayout::calculate_offset`].
    pub fn calculate_offset(&self, field_id: FieldId, p: &Point<N, T>) -> Option<usize> {
        let field = self.fields.get(&field_id)?;
        let piece = self.lookup(field_id, p)?;
        Some(piece.calculate_offset(p).wrapping_add(field.field_offset))
    }
}

impl<const N: usize, T, M> std::fmt::Debug for CompiledProgram<N, T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
