//! Low-level, bounds-checked reads from a byte buffer.
//!
//! Every helper takes the whole buffer plus an absolute offset, so a pointer
//! read anywhere in a layout can address any other part of the buffer.
//!
//! ## Widths
//!
//! | kind                  | bytes |
//! |-----------------------|-------|
//! | `int8`, `uint8`       | 1     |
//! | `int16`, `uint16`     | 2     |
//! | `int32`, `uint32`     | 4     |
//! | `float32`             | 4     |
//! | `int64`, `uint64`     | 8     |
//! | `float64`             | 8     |
//! | pointer               | 4     |

use crate::error::{Error, Result};
use crate::value::Value;
use bytes::Buf;

/// Width of a stored pointer in bytes
pub const POINTER_WIDTH: usize = 4;

/// A string occupies the distance to its terminator rounded up to this
pub const STRING_ALIGNMENT: usize = 4;

/// Byte order of a multi-byte primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

/// Fixed-width primitive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer
    U64,
    /// IEEE 754 single precision
    F32,
    /// IEEE 754 double precision
    F64,
}

impl Primitive {
    /// Returns the encoded width in bytes
    pub fn width(self) -> usize {
        match self {
            Primitive::I8 | Primitive::U8 => 1,
            Primitive::I16 | Primitive::U16 => 2,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::U64 | Primitive::F64 => 8,
        }
    }

    /// Returns the short type name used in traces
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::I8 => "i8",
            Primitive::U8 => "u8",
            Primitive::I16 => "i16",
            Primitive::U16 => "u16",
            Primitive::I32 => "i32",
            Primitive::U32 => "u32",
            Primitive::I64 => "i64",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
        }
    }
}

/// Borrow `len` bytes starting at `offset`.
pub fn bytes_at(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buffer.get(offset..end))
        .ok_or_else(|| Error::out_of_bounds(offset, len, buffer.len()))
}

/// Decode one primitive at `offset`.
pub fn read_primitive(
    buffer: &[u8],
    offset: usize,
    kind: Primitive,
    endian: Endian,
) -> Result<Value> {
    let mut src = bytes_at(buffer, offset, kind.width())?;
    let little = endian == Endian::Little;

    let value = match kind {
        Primitive::I8 => Value::I8(src.get_i8()),
        Primitive::U8 => Value::U8(src.get_u8()),
        Primitive::I16 if little => Value::I16(src.get_i16_le()),
        Primitive::I16 => Value::I16(src.get_i16()),
        Primitive::U16 if little => Value::U16(src.get_u16_le()),
        Primitive::U16 => Value::U16(src.get_u16()),
        Primitive::I32 if little => Value::I32(src.get_i32_le()),
        Primitive::I32 => Value::I32(src.get_i32()),
        Primitive::U32 if little => Value::U32(src.get_u32_le()),
        Primitive::U32 => Value::U32(src.get_u32()),
        Primitive::I64 if little => Value::I64(src.get_i64_le()),
        Primitive::I64 => Value::I64(src.get_i64()),
        Primitive::U64 if little => Value::U64(src.get_u64_le()),
        Primitive::U64 => Value::U64(src.get_u64()),
        Primitive::F32 if little => Value::F32(src.get_f32_le()),
        Primitive::F32 => Value::F32(src.get_f32()),
        Primitive::F64 if little => Value::F64(src.get_f64_le()),
        Primitive::F64 => Value::F64(src.get_f64()),
    };

    Ok(value)
}

/// Read a single unsigned byte.
pub fn read_u8(buffer: &[u8], offset: usize) -> Result<u8> {
    Ok(bytes_at(buffer, offset, 1)?.get_u8())
}

/// Read a stored pointer: always 4 bytes, little-endian.
pub fn read_pointer(buffer: &[u8], offset: usize) -> Result<u32> {
    Ok(bytes_at(buffer, offset, POINTER_WIDTH)?.get_u32_le())
}

/// Read a zero-terminated UTF-8 string.
///
/// Returns the text and the bytes it occupies: the distance to the
/// terminator rounded up to [`STRING_ALIGNMENT`]. Invalid UTF-8 sequences are
/// replaced with U+FFFD.
pub fn read_c_string(buffer: &[u8], offset: usize) -> Result<(String, usize)> {
    let tail = buffer
        .get(offset..)
        .ok_or_else(|| Error::out_of_bounds(offset, 1, buffer.len()))?;

    let Some(terminator) = tail.iter().position(|&b| b == 0) else {
        return Err(Error::unterminated_string(offset));
    };

    let text = String::from_utf8_lossy(&tail[..terminator]).into_owned();
    Ok((text, align_up(terminator, STRING_ALIGNMENT)))
}

/// Round `n` up to the next multiple of `alignment`.
pub fn align_up(n: usize, alignment: usize) -> usize {
    match n % alignment {
        0 => n,
        rem => n + (alignment - rem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitive_little_endian() {
        let data = 0x1234_5678u32.to_le_bytes();
        let value = read_primitive(&data, 0, Primitive::U32, Endian::Little).unwrap();
        assert_eq!(value, Value::U32(0x1234_5678));
    }

    #[test]
    fn test_read_primitive_big_endian() {
        let data = (-1234i16).to_be_bytes();
        let value = read_primitive(&data, 0, Primitive::I16, Endian::Big).unwrap();
        assert_eq!(value, Value::I16(-1234));
    }

    #[test]
    fn test_read_primitive_out_of_bounds() {
        let data = [0u8; 6];
        let err = read_primitive(&data, 4, Primitive::U32, Endian::Little).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                offset: 4,
                len: 4,
                buffer_len: 6
            }
        ));
    }

    #[test]
    fn test_bytes_at_overflow() {
        let data = [0u8; 4];
        assert!(bytes_at(&data, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_read_pointer_ignores_endian() {
        let data = [0x01, 0x00, 0x00, 0x00];
        assert_eq!(read_pointer(&data, 0).unwrap(), 1);
    }

    #[test]
    fn test_read_c_string_aligned_width() {
        let data = b"hero\0\0\0\0abc\0";
        assert_eq!(read_c_string(data, 0).unwrap(), ("hero".to_string(), 4));
        assert_eq!(read_c_string(data, 8).unwrap(), ("abc".to_string(), 4));

        let data = b"hello\0\0\0";
        assert_eq!(read_c_string(data, 0).unwrap(), ("hello".to_string(), 8));
    }

    #[test]
    fn test_read_c_string_empty() {
        let data = [0u8; 4];
        assert_eq!(read_c_string(&data, 0).unwrap(), (String::new(), 0));
    }

    #[test]
    fn test_read_c_string_unterminated() {
        let data = b"abc";
        assert!(matches!(
            read_c_string(data, 0),
            Err(Error::UnterminatedString { offset: 0 })
        ));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(11, 4), 12);
    }
}
