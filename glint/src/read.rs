//! A bounds-checked cursor over a byte slice, and the error taxonomy shared
//! by the whole decode side.

use crate::zag;
use chrono::{DateTime, TimeZone, Utc};
use std::{error::Error, fmt, str::Utf8Error};

type Result<T> = std::result::Result<T, ReadError>;

/// Which configured limit a [`ReadError::LimitExceeded`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LimitKind {
  StringLength,
  BytesLength,
  ArrayLength,
  MapSize,
  NestingDepth,
  SchemaLength,
}

impl fmt::Display for LimitKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::StringLength => write!(f, "string length"),
      Self::BytesLength => write!(f, "bytes length"),
      Self::ArrayLength => write!(f, "array length"),
      Self::MapSize => write!(f, "map size"),
      Self::NestingDepth => write!(f, "nesting depth"),
      Self::SchemaLength => write!(f, "schema length"),
    }
  }
}

/// An error while decoding a document. Any of these aborts the current
/// decode or walk; fields already assigned in the target keep their values,
/// but nothing half-constructed is ever exposed.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReadError {
  /// A read ran past the end of the buffer.
  Truncated,
  /// A varint ran past 10 bytes.
  VarintOverflow,
  /// A string's bytes are not valid UTF-8.
  InvalidUtf8(Utf8Error),
  /// An inbound field cannot be decoded into the target field with the same
  /// name. The wire bytes carry the base type and modifier flags.
  SchemaMismatch { field: String, expected: u8, found: u8 },
  /// A base type id outside `1..=18`.
  UnknownWireType(u8),
  /// A configured limit was breached.
  LimitExceeded { kind: LimitKind, value: u64, limit: u64 },
  /// The document is shorter than 5 bytes, the schema length is
  /// inconsistent with the buffer, or the fingerprint does not match the
  /// schema bytes.
  InvalidHeader,
}

impl fmt::Display for ReadError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Truncated => write!(f, "failed to read field: end of buffer reached"),
      Self::VarintOverflow => write!(f, "failed to read field: varint was longer than 10 bytes"),
      Self::InvalidUtf8(e) => write!(f, "invalid utf8: {e}"),
      Self::SchemaMismatch { field, expected, found } => {
        write!(f, "field `{field}`: cannot decode wire type {found:#04x} into {expected:#04x}")
      }
      Self::UnknownWireType(id) => write!(f, "unknown wire type id {id}"),
      Self::LimitExceeded { kind, value, limit } => {
        write!(f, "{kind} {value} exceeds the configured limit of {limit}")
      }
      Self::InvalidHeader => write!(f, "invalid document header"),
    }
  }
}

impl Error for ReadError {}

impl From<Utf8Error> for ReadError {
  fn from(e: Utf8Error) -> Self { ReadError::InvalidUtf8(e) }
}

/// A cursor over an immutable byte slice. Every read is bounds checked and
/// fails with [`ReadError::Truncated`] rather than running past the end.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
  data: &'a [u8],
  idx:  usize,
}

macro_rules! read_varint_as {
  ( $name:ident, $ret:ty ) => {
    /// Reads an unsigned varint and narrows it to the target width. A value
    /// that does not fit fails with [`ReadError::VarintOverflow`].
    pub fn $name(&mut self) -> Result<$ret> {
      self.read_varint()?.try_into().map_err(|_| ReadError::VarintOverflow)
    }
  };
}

macro_rules! read_zigzag_as {
  ( $name:ident, $ret:ty ) => {
    /// Reads a zigzag varint and narrows it to the target width. A value
    /// that does not fit fails with [`ReadError::VarintOverflow`].
    pub fn $name(&mut self) -> Result<$ret> {
      self.read_zigzag()?.try_into().map_err(|_| ReadError::VarintOverflow)
    }
  };
}

impl<'a> Reader<'a> {
  /// Creates a new reader over the given slice. An internal index tracks
  /// the next byte to read.
  #[inline(always)]
  pub fn new(data: &[u8]) -> Reader { Reader { data, idx: 0 } }

  /// Returns the current index. This byte has not been read yet.
  pub fn index(&self) -> usize { self.idx }

  /// Returns the number of unread bytes.
  pub fn remaining(&self) -> usize { self.data.len() - self.idx }

  /// Returns true if there are unread bytes left.
  pub fn can_read(&self) -> bool { self.idx < self.data.len() }

  /// Reads a single byte.
  #[inline(always)]
  pub fn read_byte(&mut self) -> Result<u8> {
    if self.idx >= self.data.len() {
      Err(ReadError::Truncated)
    } else {
      self.idx += 1;
      Ok(self.data[self.idx - 1])
    }
  }

  /// Reads the given number of bytes as a borrowed view of the input.
  pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
    if len > self.remaining() {
      Err(ReadError::Truncated)
    } else {
      let out = &self.data[self.idx..self.idx + len];
      self.idx += len;
      Ok(out)
    }
  }

  /// Advances past the given number of bytes.
  pub fn skip(&mut self, len: usize) -> Result<()> {
    if len > self.remaining() {
      Err(ReadError::Truncated)
    } else {
      self.idx += len;
      Ok(())
    }
  }

  /// Reads an unsigned varint. Rejects varints longer than 10 bytes.
  pub fn read_varint(&mut self) -> Result<u64> {
    let mut out = 0u64;
    for i in 0..10 {
      let b = self.read_byte()?;
      out |= ((b & 0x7f) as u64) << (i * 7);
      if b & 0x80 == 0 {
        return Ok(out);
      }
    }
    Err(ReadError::VarintOverflow)
  }

  /// Reads a zigzag varint as a signed value.
  pub fn read_zigzag(&mut self) -> Result<i64> { Ok(zag(self.read_varint()?)) }

  /// Reads a single byte as a bool. `0` is false, anything else is true.
  pub fn read_bool(&mut self) -> Result<bool> { Ok(self.read_byte()? != 0) }

  /// Reads a single raw byte.
  pub fn read_u8(&mut self) -> Result<u8> { self.read_byte() }

  /// Reads a single raw byte as a signed value.
  pub fn read_i8(&mut self) -> Result<i8> { Ok(self.read_byte()? as i8) }

  read_varint_as!(read_u16, u16);
  read_varint_as!(read_u32, u32);
  read_varint_as!(read_usize, usize);

  /// Reads an unsigned varint.
  pub fn read_u64(&mut self) -> Result<u64> { self.read_varint() }

  read_zigzag_as!(read_i16, i16);
  read_zigzag_as!(read_i32, i32);
  read_zigzag_as!(read_isize, isize);

  /// Reads an `i64` as the unsigned varint of its two's-complement bits.
  /// This is the one signed encoding that is not zigzag.
  pub fn read_i64(&mut self) -> Result<i64> { Ok(self.read_varint()? as i64) }

  /// Reads a float from the varint of its IEEE-754 bit pattern.
  pub fn read_f32(&mut self) -> Result<f32> {
    let bits: u32 = self.read_varint()?.try_into().map_err(|_| ReadError::VarintOverflow)?;
    Ok(f32::from_bits(bits))
  }

  /// Reads a double from the varint of its IEEE-754 bit pattern.
  pub fn read_f64(&mut self) -> Result<f64> { Ok(f64::from_bits(self.read_varint()?)) }

  /// Reads a varint length, then that many raw bytes.
  pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
    let len = self.read_usize()?;
    self.read_slice(len)
  }

  /// Reads a varint length, then that many bytes as UTF-8.
  pub fn read_str(&mut self) -> Result<&'a str> { Ok(std::str::from_utf8(self.read_bytes()?)?) }

  /// Reads a timestamp: Unix nanoseconds as a zigzag varint.
  pub fn read_time(&mut self) -> Result<DateTime<Utc>> {
    Ok(Utc.timestamp_nanos(self.read_zigzag()?))
  }
}
