use std::fmt::{Debug, Display};
use std::hash::Hash;

/// An integer coordinate type usable in points, rectangles and compiled lookup programs.
///
/// Every conversion is exact or wraps in the same way on every target, so an offset computed on
/// the host matches the one computed by any other evaluator of the same program.
pub trait Coord: Copy + Ord + Hash + Default + Debug + Display + Send + Sync + 'static {
    /// Width of the little endian encoding in bytes.
    const BYTES: usize;
    /// Tag written into serialized layouts so a reader can reject a mismatched coordinate type.
    const TAG: u8;

    /// Sign extend (or zero extend) into an `i64`.
    fn to_i64(self) -> i64;

    /// Exact widening, used for extents and volumes.
    fn to_i128(self) -> i128;

    /// Truncate an `i64` back into this coordinate type.
    fn from_i64(value: i64) -> Self;

    fn write_le(self, out: &mut [u8]);

    fn read_le(bytes: &[u8]) -> Self;

    /// The coordinate reinterpreted as a machine word for wrapping offset arithmetic.
    #[inline(always)]
    fn to_word(self) -> usize {
        self.to_i64() as usize
    }
}

macro_rules! impl_coord {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(
            impl Coord for $ty {
                const BYTES: usize = std::mem::size_of::<$ty>();
                const TAG: u8 = $tag;

                #[inline(always)]
                fn to_i64(self) -> i64 {
                    self as i64
                }

                #[inline(always)]
                fn to_i128(self) -> i128 {
                    self as i128
                }

                #[inline(always)]
                fn from_i64(value: i64) -> Self {
                    value as $ty
                }

                #[inline(always)]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::BYTES].copy_from_slice(&self.to_le_bytes());
                }

                #[inline(always)]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::BYTES]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_coord!(
    i32 => 1,
    i64 => 2,
    u32 => 3,
    u64 => 4,
);

#[test]
fn test_coord_le_round_trip() {
    let mut buf = [0u8; 8];
    (-7i32).write_le(&mut buf);
    assert_eq!(i32::read_le(&buf), -7);
    (u64::MAX - 3).write_le(&mut buf);
    assert_eq!(u64::read_le(&buf), u64::MAX - 3);
}

#[test]
fn test_negative_coord_wraps_as_word() {
    // stride * p for p = -2 must cancel with a base that was shifted by 2 * stride
    let base = 100usize.wrapping_add(8usize.wrapping_mul(2));
    let offset = base.wrapping_add(8usize.wrapping_mul((-2i32).to_word()));
    assert_eq!(offset, 100);
}
