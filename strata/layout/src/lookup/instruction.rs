//! Instruction encoding of piece lookup programs
//!
//! Every instruction starts on a 16 byte boundary with a little endian `u32` header whose low 8
//! bits hold the opcode. Instructions only refer to each other by forward jumps counted in 16
//! byte units, so a program can be copied anywhere and evaluated as is.
//!
//! ```text
//! SplitPlane   header = delta[31:16] | dim[15:8] | opcode[7:0]
//!              byte 8: plane (T, little endian)                         16 bytes total
//! AffinePiece  header = delta[31:8] | opcode[7:0]
//!              byte 8: base (u64), then strides (u64 x N),
//!              then bounds.lo (T x N) and bounds.hi (T x N)              padded to 16
//! ```

use std::marker::PhantomData;

use strata_types::{Coord, Point, Rect};

use super::Opcode;

/// Alignment and jump granularity of every instruction.
pub const INSTRUCTION_ALIGNMENT: usize = 16;

pub const SPLIT_PLANE_SIZE: usize = 16;

/// Largest jump a split plane can encode.
pub const SPLIT_PLANE_MAX_DELTA: usize = u16::MAX as usize;

/// Largest jump an affine piece can encode.
pub const AFFINE_PIECE_MAX_DELTA: usize = (1 << 24) - 1;

const PAYLOAD_START: usize = 8;

/// Encoded size of an affine piece instruction.
pub fn affine_piece_size<const N: usize, T: Coord>() -> usize {
    let raw = PAYLOAD_START + 8 * N + 2 * N * T::BYTES;
    raw.next_multiple_of(INSTRUCTION_ALIGNMENT)
}

/// A decoded split plane: points with `p[dim] < plane` continue with the next instruction, the
/// rest jump `delta` instructions ahead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitPlane<T> {
    pub dim: usize,
    pub plane: T,
    pub delta: u32,
}

impl<T: Coord> SplitPlane<T> {
    #[inline(always)]
    pub fn goes_below<const N: usize>(&self, p: &Point<N, T>) -> bool {
        p[self.dim] < self.plane
    }

    /// The plane cuts through `r`, so points of `r` take both branches.
    pub fn splits_rect<const N: usize>(&self, r: &Rect<N, T>) -> bool {
        r.lo[self.dim] < self.plane && r.hi[self.dim] >= self.plane
    }
}

/// A decoded affine leaf: the piece an evaluation ends in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AffinePiece<const N: usize, T = i32> {
    pub bounds: Rect<N, T>,
    pub base: usize,
    pub strides: [usize; N],
}

impl<const N: usize, T: Coord> AffinePiece<N, T> {
    #[inline(always)]
    pub fn calculate_offset(&self, p: &Point<N, T>) -> usize {
        self.base.wrapping_add(p.dot_strides(&self.strides))
    }
}

fn write_header(out: &mut [u8], header: u32) {
    out[..4].copy_from_slice(&header.to_le_bytes());
}

pub(crate) fn encode_split_plane<T: Coord>(out: &mut [u8], dim: u8, plane: T, delta: u16) {
    let header = (delta as u32) << 16 | (dim as u32) << 8 | Opcode::SplitPlane as u32;
    write_header(out, header);
    plane.write_le(&mut out[PAYLOAD_START..]);
}

pub(crate) fn encode_affine_piece<const N: usize, T: Coord>(
    out: &mut [u8],
    piece: &AffinePiece<N, T>,
    delta: u32,
) {
    debug_assert!(delta as usize <= AFFINE_PIECE_MAX_DELTA);
    write_header(out, delta << 8 | Opcode::AffinePiece as u32);
    let mut at = PAYLOAD_START;
    out[at..at + 8].copy_from_slice(&(piece.base as u64).to_le_bytes());
    at += 8;
    for stride in piece.strides {
        out[at..at + 8].copy_from_slice(&(stride as u64).to_le_bytes());
        at += 8;
    }
    for coord in piece.bounds.lo.coords().iter().chain(piece.bounds.hi.coords()) {
        coord.write_le(&mut out[at..]);
        at += T::BYTES;
    }
}

#[inline(always)]
fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let raw = bytes.get(at..at + 8)?;
    let mut word = [0; 8];
    word.copy_from_slice(raw);
    Some(u64::from_le_bytes(word))
}

/// A position inside a program buffer.
///
/// Every accessor returns `None` for a malformed or truncated program instead of reading out of
/// bounds.
#[derive(Clone, Copy)]
pub struct InstructionRef<'a, const N: usize, T = i32> {
    program: &'a [u8],
    pos: usize,
    coord: PhantomData<T>,
}

impl<'a, const N: usize, T: Coord> InstructionRef<'a, N, T> {
    pub fn at(program: &'a [u8], pos: usize) -> Option<Self> {
        if pos % INSTRUCTION_ALIGNMENT != 0 || pos + 4 > program.len() {
            return None;
        }
        Some(Self {
            program,
            pos,
            coord: PhantomData,
        })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    fn header(&self) -> u32 {
        let mut raw = [0; 4];
        raw.copy_from_slice(&self.program[self.pos..self.pos + 4]);
        u32::from_le_bytes(raw)
    }

    #[inline(always)]
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_byte(self.header() as u8)
    }

    /// The instruction `bytes` after this one.
    #[inline(always)]
    pub fn skip(&self, bytes: usize) -> Option<Self> {
        Self::at(self.program, self.pos + bytes)
    }

    /// Jump forward by `delta` 16 byte units. A delta of zero marks the end of the program.
    #[inline(always)]
    pub fn jump(&self, delta: u32) -> Option<Self> {
        if delta == 0 {
            return None;
        }
        self.skip(delta as usize * INSTRUCTION_ALIGNMENT)
    }

    pub fn split_plane(&self) -> Option<SplitPlane<T>> {
        let header = self.header();
        if header as u8 != Opcode::SplitPlane as u8 {
            return None;
        }
        let at = self.pos + PAYLOAD_START;
        let plane = self.program.get(at..at + T::BYTES)?;
        Some(SplitPlane {
            dim: (header >> 8) as u8 as usize,
            plane: T::read_le(plane),
            delta: header >> 16,
        })
    }

    /// The leaf stored here, and the jump to the next candidate leaf.
    pub fn affine_piece(&self) -> Option<(AffinePiece<N, T>, u32)> {
        let header = self.header();
        if header as u8 != Opcode::AffinePiece as u8 {
            return None;
        }
        let end = self.pos + affine_piece_size::<N, T>();
        let bytes = self.program.get(self.pos..end)?;
        let mut at = PAYLOAD_START;
        let base = read_u64(bytes, at)? as usize;
        at += 8;
        let mut strides = [0usize; N];
        for stride in &mut strides {
            *stride = read_u64(bytes, at)? as usize;
            at += 8;
        }
        let mut lo = Point::zeroes();
        let mut hi = Point::zeroes();
        for d in 0..N {
            lo[d] = T::read_le(&bytes[at..]);
            at += T::BYTES;
        }
        for d in 0..N {
            hi[d] = T::read_le(&bytes[at..]);
            at += T::BYTES;
        }
        let piece = AffinePiece {
            bounds: Rect { lo, hi },
            base,
            strides,
        };
        Some((piece, header >> 8))
    }

    /// Run the program from this instruction until a leaf containing `p` is found.
    ///
    /// Split planes either fall through or jump forward, so the loop ends after at most one step
    /// per instruction in the program.
    #[inline]
    pub fn lookup(self, p: &Point<N, T>) -> Option<AffinePiece<N, T>> {
        let mut inst = self;
        loop {
            match inst.opcode()? {
                Opcode::SplitPlane => {
                    let split = inst.split_plane()?;
                    if split.dim >= N {
                        return None;
                    }
                    inst = if split.goes_below(p) {
                        inst.skip(SPLIT_PLANE_SIZE)?
                    } else {
                        inst.jump(split.delta)?
                    };
                }
                Opcode::AffinePiece => {
                    let (piece, delta) = inst.affine_piece()?;
                    if piece.bounds.contains(p) {
                        return Some(piece);
                    }
                    inst = inst.jump(delta)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_piece_size() {
        assert_eq!(affine_piece_size::<1, i32>(), 32);
        assert_eq!(affine_piece_size::<2, i32>(), 48);
        assert_eq!(affine_piece_size::<3, i64>(), 80);
    }

    #[test]
    fn test_split_then_two_leaves() {
        let leaf = affine_piece_size::<1, i32>();
        let mut program = vec![0u8; SPLIT_PLANE_SIZE + 2 * leaf];
        let delta = ((SPLIT_PLANE_SIZE + leaf) / INSTRUCTION_ALIGNMENT) as u16;
        encode_split_plane(&mut program, 0, 10i32, delta);
        let below = AffinePiece {
            bounds: Rect::new([0], [9]),
            base: 0,
            strides: [4],
        };
        let above = AffinePiece {
            bounds: Rect::new([10], [19]),
            base: 1000,
            strides: [4],
        };
        encode_affine_piece(&mut program[SPLIT_PLANE_SIZE..], &below, 0);
        encode_affine_piece(&mut program[SPLIT_PLANE_SIZE + leaf..], &above, 0);

        let start = InstructionRef::<1>::at(&program, 0).unwrap();
        assert_eq!(start.opcode(), Some(Opcode::SplitPlane));
        assert_eq!(start.lookup(&Point::new([3])), Some(below));
        assert_eq!(start.lookup(&Point::new([12])).unwrap().calculate_offset(&Point::new([12])), 1048);
        assert_eq!(start.lookup(&Point::new([20])), None);
        assert_eq!(start.lookup(&Point::new([-1])), None);
    }

    #[test]
    fn test_truncated_program_is_rejected() {
        let mut program = vec![0u8; SPLIT_PLANE_SIZE];
        encode_split_plane(&mut program, 0, 5i32, 4);
        let start = InstructionRef::<1>::at(&program, 0).unwrap();
        assert_eq!(start.lookup(&Point::new([7])), None);
        assert!(InstructionRef::<1>::at(&program, 8).is_none());
        // opcode zero is never a valid instruction
        let zeroes = [0u8; 16];
        assert_eq!(InstructionRef::<1>::at(&zeroes, 0).unwrap().lookup(&Point::new([0])), None);
    }
}
