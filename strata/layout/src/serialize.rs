//! Binary encoding of instance layouts
//!
//! Everything is little endian. The header carries the dimension count and coordinate type so a
//! reader instantiated with different parameters fails instead of misreading the pieces.

use rustc_hash::FxHashMap;
use strata_types::{Coord, IndexSpace, Point, Rect};

use crate::{
    FieldId, FieldLayout, InstanceLayout, InstanceLayoutPiece, InstancePieceList, PieceLayout,
    PieceLayoutType,
};

const LAYOUT_MAGIC_BYTES: [u8; 4] = *b"SLAY";

/// Current version of the layout encoding.
pub const LAYOUT_FORMAT_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid magic bytes")]
    MagicBytesMismatch,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),
    #[error("layout has {found} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, found: u32 },
    #[error("layout uses coordinate type {found_tag} ({found_bytes} bytes), expected {expected_tag} ({expected_bytes} bytes)")]
    CoordinateMismatch {
        expected_tag: u8,
        expected_bytes: u8,
        found_tag: u8,
        found_bytes: u8,
    },
    #[error("invalid piece layout type {0}")]
    InvalidLayoutType(u8),
    #[error("field {field} refers to piece list {list}, but only {lists} exist")]
    InvalidFieldList {
        field: FieldId,
        list: usize,
        lists: usize,
    },
    #[error("sparse index space rectangles {first} and {second} overlap")]
    OverlappingSparseRects { first: usize, second: usize },
    #[error("value {0} does not fit in a machine word")]
    ValueTooLarge(u64),
}

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
}

fn check_magic<R: std::io::Read>(reader: &mut R) -> Result<(), ReadError> {
    let mut magic = [0; 4];
    reader.read_exact(&mut magic)?;
    if magic == LAYOUT_MAGIC_BYTES {
        Ok(())
    } else {
        Err(ReadError::MagicBytesMismatch)
    }
}

fn read_le_u8<R: std::io::Read>(reader: &mut R) -> Result<u8, ReadError> {
    let mut bytes = [0; 1];
    reader.read_exact(&mut bytes)?;
    Ok(u8::from_le_bytes(bytes))
}

fn read_le_u32<R: std::io::Read>(reader: &mut R) -> Result<u32, ReadError> {
    let mut bytes = [0; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_le_u64<R: std::io::Read>(reader: &mut R) -> Result<u64, ReadError> {
    let mut bytes = [0; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_le_usize<R: std::io::Read>(reader: &mut R) -> Result<usize, ReadError> {
    let value = read_le_u64(reader)?;
    usize::try_from(value).map_err(|_| ReadError::ValueTooLarge(value))
}

fn read_coord<T: Coord, R: std::io::Read>(reader: &mut R) -> Result<T, ReadError> {
    let mut bytes = [0; 8];
    reader.read_exact(&mut bytes[..T::BYTES])?;
    Ok(T::read_le(&bytes))
}

fn read_rect<const N: usize, T: Coord, R: std::io::Read>(
    reader: &mut R,
) -> Result<Rect<N, T>, ReadError> {
    let mut lo = Point::zeroes();
    let mut hi = Point::zeroes();
    for d in 0..N {
        lo[d] = read_coord(reader)?;
    }
    for d in 0..N {
        hi[d] = read_coord(reader)?;
    }
    Ok(Rect { lo, hi })
}

fn write_le_u8<W: std::io::Write>(writer: &mut W, value: u8) -> Result<(), WriteError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_le_u32<W: std::io::Write>(writer: &mut W, value: u32) -> Result<(), WriteError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_le_u64<W: std::io::Write>(writer: &mut W, value: u64) -> Result<(), WriteError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_coord<T: Coord, W: std::io::Write>(writer: &mut W, value: T) -> Result<(), WriteError> {
    let mut bytes = [0; 8];
    value.write_le(&mut bytes);
    writer.write_all(&bytes[..T::BYTES])?;
    Ok(())
}

fn write_rect<const N: usize, T: Coord, W: std::io::Write>(
    writer: &mut W,
    rect: &Rect<N, T>,
) -> Result<(), WriteError> {
    for coord in rect.lo.coords().iter().chain(rect.hi.coords()) {
        write_coord(writer, *coord)?;
    }
    Ok(())
}

impl<const N: usize, T: Coord> InstanceLayoutPiece<N, T> {
    /// Write the piece type tag, bounds and offset rule.
    pub fn write<W: std::io::Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        write_le_u8(writer, self.layout_type() as u8)?;
        write_rect(writer, &self.bounds)?;
        match &self.layout {
            PieceLayout::Affine(affine) => {
                write_le_u64(writer, affine.offset as u64)?;
                for stride in affine.strides {
                    write_le_u64(writer, stride as u64)?;
                }
            }
        }
        Ok(())
    }

    pub fn read<R: std::io::Read>(reader: &mut R) -> Result<Self, ReadError> {
        let tag = read_le_u8(reader)?;
        let layout_type = PieceLayoutType::from_tag(tag).ok_or(ReadError::InvalidLayoutType(tag))?;
        let bounds = read_rect(reader)?;
        match layout_type {
            PieceLayoutType::Affine => {
                let offset = read_le_usize(reader)?;
                let mut strides = [0; N];
                for stride in &mut strides {
                    *stride = read_le_usize(reader)?;
                }
                Ok(Self::affine(bounds, offset, strides))
            }
        }
    }
}

impl<const N: usize, T: Coord> InstanceLayout<N, T> {
    pub fn write<W: std::io::Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&LAYOUT_MAGIC_BYTES)?;
        write_le_u32(writer, LAYOUT_FORMAT_VERSION)?;
        write_le_u32(writer, N as u32)?;
        write_le_u8(writer, T::TAG)?;
        write_le_u8(writer, T::BYTES as u8)?;
        write_le_u64(writer, self.bytes_used() as u64)?;
        write_le_u64(writer, self.alignment_reqd() as u64)?;

        let space = self.space();
        write_le_u8(writer, space.is_dense() as u8)?;
        if space.is_dense() {
            write_rect(writer, space.bounds())?;
        } else {
            write_le_u64(writer, space.rects().len() as u64)?;
            for rect in space.rects() {
                write_rect(writer, rect)?;
            }
        }

        write_le_u64(writer, self.piece_lists().len() as u64)?;
        for list in self.piece_lists() {
            write_le_u64(writer, list.len() as u64)?;
            for piece in list.pieces() {
                piece.write(writer)?;
            }
        }

        let mut fields: Vec<_> = self.fields().iter().collect();
        fields.sort_by_key(|(id, _)| **id);
        write_le_u64(writer, fields.len() as u64)?;
        for (id, field) in fields {
            write_le_u32(writer, *id)?;
            write_le_u64(writer, field.list_idx as u64)?;
            write_le_u64(writer, field.rel_offset as u64)?;
            write_le_u64(writer, field.size_in_bytes as u64)?;
        }
        Ok(())
    }

    pub fn read<R: std::io::Read>(reader: &mut R) -> Result<Self, ReadError> {
        check_magic(reader)?;
        let version = read_le_u32(reader)?;
        if version != LAYOUT_FORMAT_VERSION {
            return Err(ReadError::UnsupportedVersion(version));
        }
        let dims = read_le_u32(reader)?;
        if dims as usize != N {
            return Err(ReadError::DimensionMismatch {
                expected: N,
                found: dims,
            });
        }
        let tag = read_le_u8(reader)?;
        let bytes = read_le_u8(reader)?;
        if tag != T::TAG || bytes as usize != T::BYTES {
            return Err(ReadError::CoordinateMismatch {
                expected_tag: T::TAG,
                expected_bytes: T::BYTES as u8,
                found_tag: tag,
                found_bytes: bytes,
            });
        }
        let bytes_used = read_le_usize(reader)?;
        let alignment_reqd = read_le_usize(reader)?;

        let space = if read_le_u8(reader)? != 0 {
            IndexSpace::dense(read_rect(reader)?)
        } else {
            let count = read_le_usize(reader)?;
            let rects = (0..count)
                .map(|_| read_rect(reader))
                .collect::<Result<Vec<_>, _>>()?;
            for (first, a) in rects.iter().enumerate() {
                if let Some(offset) = rects[first + 1..].iter().position(|b| a.overlaps(b)) {
                    return Err(ReadError::OverlappingSparseRects {
                        first,
                        second: first + 1 + offset,
                    });
                }
            }
            IndexSpace::sparse(rects)
        };

        let list_count = read_le_usize(reader)?;
        let mut piece_lists = Vec::new();
        for _ in 0..list_count {
            let piece_count = read_le_usize(reader)?;
            let pieces = (0..piece_count)
                .map(|_| InstanceLayoutPiece::read(reader))
                .collect::<Result<Vec<_>, _>>()?;
            piece_lists.push(InstancePieceList::new(pieces));
        }

        let field_count = read_le_usize(reader)?;
        let mut fields = FxHashMap::default();
        for _ in 0..field_count {
            let id = read_le_u32(reader)?;
            let list_idx = read_le_usize(reader)?;
            if list_idx >= piece_lists.len() {
                return Err(ReadError::InvalidFieldList {
                    field: id,
                    list: list_idx,
                    lists: piece_lists.len(),
                });
            }
            let rel_offset = read_le_usize(reader)?;
            let size_in_bytes = read_le_usize(reader)?;
            fields.insert(
                id,
                FieldLayout {
                    list_idx,
                    rel_offset,
                    size_in_bytes,
                },
            );
        }

        Ok(Self::from_parts(
            space,
            piece_lists,
            fields,
            bytes_used,
            alignment_reqd,
        ))
    }
}

#[test]
fn test_piece_round_trip() {
    let piece = InstanceLayoutPiece::<2, i64>::affine(
        Rect::new([-3, 0], [4, 9]),
        usize::MAX - 7,
        [8, 64],
    );
    let mut buf = Vec::new();
    piece.write(&mut buf).unwrap();
    assert_eq!(buf.len(), 1 + 4 * 8 + 3 * 8);
    assert_eq!(buf[0], PieceLayoutType::Affine as u8);
    let mut cursor = std::io::Cursor::new(&buf);
    assert_eq!(InstanceLayoutPiece::<2, i64>::read(&mut cursor).unwrap(), piece);
}

#[test]
fn test_invalid_piece_tag() {
    let mut buf = vec![PieceLayoutType::INVALID];
    buf.extend_from_slice(&[0; 64]);
    let mut cursor = std::io::Cursor::new(&buf);
    assert!(matches!(
        InstanceLayoutPiece::<1>::read(&mut cursor),
        Err(ReadError::InvalidLayoutType(0))
    ));
}
