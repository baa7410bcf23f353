//! Compiles piece lists into lookup programs

use enumset::EnumSet;
use rustc_hash::FxHashMap;
use strata_types::{Coord, IndexSpace, Rect};

use super::instruction::{
    AFFINE_PIECE_MAX_DELTA, AffinePiece, INSTRUCTION_ALIGNMENT, SPLIT_PLANE_MAX_DELTA,
    SPLIT_PLANE_SIZE, affine_piece_size, encode_affine_piece, encode_split_plane,
};
use super::{CompiledProgram, Opcode, PerField, ProgramMemory};
use crate::error::CompileError;
use crate::{InstanceLayout, InstanceLayoutPiece, InstancePieceList, PieceLayout};

/// Knobs for lookup program compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Opcodes the consumer of the program can evaluate.
    pub allowed: EnumSet<Opcode>,
    /// Nodes with at most this many pieces become a chain of leaves instead of splitting further.
    pub chain_limit: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            allowed: EnumSet::all(),
            chain_limit: 1,
        }
    }
}

impl CompileOptions {
    pub fn with_allowed_opcodes(mut self, allowed: EnumSet<Opcode>) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn with_chain_limit(mut self, chain_limit: usize) -> Self {
        self.chain_limit = chain_limit.max(1);
        self
    }
}

enum Node<const N: usize, T> {
    Split {
        dim: usize,
        plane: T,
        below: Box<Node<N, T>>,
        above: Box<Node<N, T>>,
    },
    Chain(Vec<InstanceLayoutPiece<N, T>>),
}

fn validate_list<const N: usize, T: Coord>(
    list_idx: usize,
    list: &InstancePieceList<N, T>,
    space: &IndexSpace<N, T>,
    allowed: EnumSet<Opcode>,
) -> Result<(), CompileError> {
    let pieces = list.pieces();
    for (idx, piece) in pieces.iter().enumerate() {
        let opcode = piece.layout.opcode();
        if !allowed.contains(opcode) {
            return Err(CompileError::UnsupportedPieceKind {
                list: list_idx,
                piece: idx,
                opcode,
            });
        }
        if !space.bounds().contains_rect(&piece.bounds) {
            return Err(CompileError::OutsideBounds {
                list: list_idx,
                piece: idx,
            });
        }
    }

    for (first, a) in pieces.iter().enumerate() {
        for (offset, b) in pieces[first + 1..].iter().enumerate() {
            if a.bounds.overlaps(&b.bounds) {
                return Err(CompileError::Overlap {
                    list: list_idx,
                    first,
                    second: first + 1 + offset,
                });
            }
        }
    }

    // pieces are disjoint, so summing volumes counts every covered point once
    let overflow = CompileError::VolumeOverflow { list: list_idx };
    let covered = if space.is_dense() {
        pieces
            .iter()
            .try_fold(0u128, |acc, piece| acc.checked_add(piece.bounds.volume()?))
    } else {
        space
            .rects()
            .iter()
            .flat_map(|rect| pieces.iter().map(move |piece| piece.bounds.intersection(rect)))
            .try_fold(0u128, |acc, part| acc.checked_add(part.volume()?))
    }
    .ok_or(overflow.clone())?;
    let expected = space.volume().ok_or(overflow)?;
    if covered != expected {
        return Err(CompileError::CoverageMismatch {
            list: list_idx,
            covered,
            expected,
        });
    }
    Ok(())
}

fn bounding_box<const N: usize, T: Coord>(pieces: &[InstanceLayoutPiece<N, T>]) -> Rect<N, T> {
    pieces
        .iter()
        .fold(Rect::empty(), |acc, piece| acc.union_bbox(&piece.bounds))
}

/// The split plane that best balances `pieces`, if any plane separates them at all.
fn choose_split<const N: usize, T: Coord>(
    pieces: &[InstanceLayoutPiece<N, T>],
) -> Option<(usize, T)> {
    let bbox = bounding_box(pieces);
    let n = pieces.len();
    let mut best: Option<(usize, usize, usize, T)> = None;
    for dim in 0..N {
        let lower_edges = pieces.iter().map(|piece| piece.bounds.lo[dim]);
        let upper_edges = pieces
            .iter()
            .filter(|piece| piece.bounds.hi[dim] < bbox.hi[dim])
            .map(|piece| T::from_i64(piece.bounds.hi[dim].to_i64().wrapping_add(1)));
        for plane in lower_edges.chain(upper_edges) {
            if plane <= bbox.lo[dim] || plane > bbox.hi[dim] {
                continue;
            }
            let below = pieces
                .iter()
                .filter(|piece| piece.bounds.lo[dim] < plane)
                .count();
            let above = pieces
                .iter()
                .filter(|piece| piece.bounds.hi[dim] >= plane)
                .count();
            if below == n || above == n {
                continue;
            }
            let score = (below.max(above), below + above, dim, plane);
            if best.is_none_or(|best| score < best) {
                best = Some(score);
            }
        }
    }
    best.map(|(_, _, dim, plane)| (dim, plane))
}

fn build_tree<const N: usize, T: Coord>(
    pieces: Vec<InstanceLayoutPiece<N, T>>,
    options: &CompileOptions,
) -> Node<N, T> {
    if pieces.len() <= options.chain_limit || !options.allowed.contains(Opcode::SplitPlane) {
        return Node::Chain(pieces);
    }
    let Some((dim, plane)) = choose_split(&pieces) else {
        return Node::Chain(pieces);
    };

    let mut below = Vec::new();
    let mut above = Vec::new();
    for piece in &pieces {
        let (lower, upper) = piece.bounds.split(dim, plane);
        if !lower.is_empty() {
            below.push(piece.clipped(lower));
        }
        if !upper.is_empty() {
            above.push(piece.clipped(upper));
        }
    }
    tracing::trace!(
        dim,
        %plane,
        pieces = pieces.len(),
        below = below.len(),
        above = above.len(),
        "split piece list"
    );
    Node::Split {
        dim,
        plane,
        below: Box::new(build_tree(below, options)),
        above: Box::new(build_tree(above, options)),
    }
}

struct Emitter<const N: usize, T> {
    out: Vec<u8>,
    used: EnumSet<Opcode>,
    coord: std::marker::PhantomData<T>,
}

impl<const N: usize, T: Coord> Emitter<N, T> {
    fn reserve(&mut self, bytes: usize) -> usize {
        let pos = self.out.len();
        debug_assert_eq!(pos % INSTRUCTION_ALIGNMENT, 0);
        self.out.resize(pos + bytes, 0);
        pos
    }

    fn emit(&mut self, node: &Node<N, T>) -> Result<(), CompileError> {
        match node {
            Node::Split {
                dim,
                plane,
                below,
                above,
            } => {
                let pos = self.reserve(SPLIT_PLANE_SIZE);
                self.emit(below)?;
                let delta = (self.out.len() - pos) / INSTRUCTION_ALIGNMENT;
                if delta > SPLIT_PLANE_MAX_DELTA {
                    return Err(CompileError::JumpTooFar {
                        opcode: Opcode::SplitPlane,
                        delta,
                        max: SPLIT_PLANE_MAX_DELTA,
                    });
                }
                encode_split_plane(&mut self.out[pos..], *dim as u8, *plane, delta as u16);
                self.used.insert(Opcode::SplitPlane);
                self.emit(above)
            }
            Node::Chain(pieces) => {
                let leaf_size = affine_piece_size::<N, T>();
                let next = leaf_size / INSTRUCTION_ALIGNMENT;
                if next > AFFINE_PIECE_MAX_DELTA {
                    return Err(CompileError::JumpTooFar {
                        opcode: Opcode::AffinePiece,
                        delta: next,
                        max: AFFINE_PIECE_MAX_DELTA,
                    });
                }
                for (idx, piece) in pieces.iter().enumerate() {
                    let PieceLayout::Affine(affine) = &piece.layout;
                    let leaf = AffinePiece {
                        bounds: piece.bounds,
                        base: affine.offset,
                        strides: affine.strides,
                    };
                    let delta = if idx + 1 < pieces.len() { next } else { 0 };
                    let pos = self.reserve(leaf_size);
                    encode_affine_piece(&mut self.out[pos..], &leaf, delta as u32);
                    self.used.insert(Opcode::AffinePiece);
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn compile<const N: usize, T: Coord, M: ProgramMemory>(
    layout: &InstanceLayout<N, T>,
    mut memory: M,
    options: &CompileOptions,
) -> Result<CompiledProgram<N, T, M>, CompileError> {
    if N > u8::MAX as usize {
        return Err(CompileError::TooManyDimensions(N));
    }

    let mut list_entries: FxHashMap<usize, (Option<usize>, EnumSet<Opcode>)> =
        FxHashMap::default();
    let mut emitter = Emitter::<N, T> {
        out: Vec::new(),
        used: EnumSet::empty(),
        coord: std::marker::PhantomData,
    };

    let mut field_ids: Vec<_> = layout.fields().keys().copied().collect();
    field_ids.sort_unstable();

    let mut fields = FxHashMap::default();
    for field_id in field_ids {
        let Some((field, list)) = layout.field_piece_list(field_id) else {
            let list = layout.fields()[&field_id].list_idx;
            return Err(CompileError::MissingPieceList {
                field: field_id,
                list,
            });
        };
        let list_idx = field.list_idx;
        if !list_entries.contains_key(&list_idx) {
            validate_list(list_idx, list, layout.space(), options.allowed)?;
            let pieces: Vec<_> = list
                .pieces()
                .iter()
                .filter(|piece| !piece.bounds.is_empty())
                .copied()
                .collect();
            let entry = if pieces.is_empty() {
                (None, EnumSet::empty())
            } else {
                let start = emitter.out.len();
                emitter.used = EnumSet::empty();
                let tree = build_tree(pieces, options);
                emitter.emit(&tree)?;
                (Some(start), emitter.used)
            };
            list_entries.insert(list_idx, entry);
        }
        let (start_inst, inst_usage_mask) = list_entries[&list_idx];
        fields.insert(
            field_id,
            PerField {
                start_inst,
                inst_usage_mask,
                field_offset: field.rel_offset,
            },
        );
    }

    let bytes = memory.allocate_memory(emitter.out.len())?;
    bytes.copy_from_slice(&emitter.out);
    memory.commit_updates();

    tracing::debug!(
        fields = fields.len(),
        piece_lists = list_entries.len(),
        bytes = emitter.out.len(),
        "compiled lookup program"
    );

    Ok(CompiledProgram::new(memory, fields))
}
