//! Fixed-width primitive codec.
//!
//! Integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8 bytes. Booleans are one byte, `0` or `1`.

use std::io::Read;

use crate::error::{SerialError, SerialResult, StreamOffset};
use crate::stream::{InputStream, OutputStream};

/// Write one byte
pub fn write_u8(out: &mut dyn OutputStream, value: u8) -> SerialResult<()> {
    out.write_all(&[value])?;
    Ok(())
}

/// Read one byte
pub fn read_u8(input: &mut dyn InputStream) -> SerialResult<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Write a `u16`
pub fn write_u16(out: &mut dyn OutputStream, value: u16) -> SerialResult<()> {
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Read a `u16`
pub fn read_u16(input: &mut dyn InputStream) -> SerialResult<u16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Write a `u32`
pub fn write_u32(out: &mut dyn OutputStream, value: u32) -> SerialResult<()> {
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Read a `u32`
pub fn read_u32(input: &mut dyn InputStream) -> SerialResult<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Write an `i64`
pub fn write_i64(out: &mut dyn OutputStream, value: i64) -> SerialResult<()> {
    out.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Read an `i64`
pub fn read_i64(input: &mut dyn InputStream) -> SerialResult<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

/// Write a boolean
pub fn write_bool(out: &mut dyn OutputStream, value: bool) -> SerialResult<()> {
    write_u8(out, value as u8)
}

/// Read a boolean
pub fn read_bool(input: &mut dyn InputStream) -> SerialResult<bool> {
    let at = StreamOffset(input.position());
    match read_u8(input)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(SerialError::invalid_data(
            format!("invalid boolean byte 0x{other:02x}"),
            at,
        )),
    }
}

/// Write a length-prefixed UTF-8 string
pub fn write_string(out: &mut dyn OutputStream, value: &str) -> SerialResult<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        SerialError::invalid_data("string longer than 4 GiB", StreamOffset::default())
    })?;
    write_u32(out, len)?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

/// Read a length-prefixed UTF-8 string
pub fn read_string(input: &mut dyn InputStream) -> SerialResult<String> {
    let len = read_u32(input)? as u64;
    let at = StreamOffset(input.position());
    let mut bytes = Vec::new();
    // Bounded read: a corrupt length cannot force a huge allocation up front
    (&mut *input).take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(SerialError::invalid_data(
            format!("string truncated: expected {len} bytes, got {}", bytes.len()),
            at,
        ));
    }
    String::from_utf8(bytes).map_err(|_| SerialError::invalid_data("invalid UTF-8 in string", at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_big_endian_layout() {
        let mut out = Vec::new();
        write_u16(&mut out, 0x0102).unwrap();
        write_u32(&mut out, 0x0304_0506).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_primitives() {
        let mut out = Vec::new();
        write_u8(&mut out, 7).unwrap();
        write_i64(&mut out, -42).unwrap();
        write_bool(&mut out, true).unwrap();
        write_string(&mut out, "héllo").unwrap();

        let mut input = Cursor::new(out);
        assert_eq!(read_u8(&mut input).unwrap(), 7);
        assert_eq!(read_i64(&mut input).unwrap(), -42);
        assert!(read_bool(&mut input).unwrap());
        assert_eq!(read_string(&mut input).unwrap(), "héllo");
    }

    #[test]
    fn test_invalid_bool() {
        let mut input = Cursor::new(vec![0u8, 2]);
        assert!(!read_bool(&mut input).unwrap());
        let err = read_bool(&mut input).unwrap_err();
        assert!(matches!(
            err,
            SerialError::InvalidData { at: StreamOffset(Some(1)), .. }
        ));
    }

    #[test]
    fn test_truncated_string() {
        let mut out = Vec::new();
        write_u32(&mut out, 10).unwrap();
        out.extend_from_slice(b"abc");
        let mut input = Cursor::new(out);
        assert!(matches!(
            read_string(&mut input),
            Err(SerialError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut out = Vec::new();
        write_u32(&mut out, 2).unwrap();
        out.extend_from_slice(&[0xff, 0xfe]);
        let mut input = Cursor::new(out);
        let err = read_string(&mut input).unwrap_err();
        assert!(err.to_string().contains("invalid UTF-8"));
    }

    #[test]
    fn test_short_read_is_io_error() {
        let mut input = Cursor::new(vec![0u8]);
        assert!(matches!(read_u16(&mut input), Err(SerialError::Io(_))));
    }
}
