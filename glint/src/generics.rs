//! [`ValueWrite`]/[`ValueRead`] implementations for every supported std
//! type, the [`Bytes`] wrapper for the raw byte-array wire type, and the
//! marker traits that bound what can appear inside slices and maps. The
//! derive macro adds the struct implementations.

use crate::{
  decode::{read_delta_slice, read_slice, DecodeState, ValueRead},
  encode::{write_slice, ValueWrite},
  read::{LimitKind, ReadError, Reader},
  schema::SchemaField,
  wire::{self, BaseType},
  Buffer,
};
use chrono::{DateTime, Utc};
use std::{
  collections::HashMap,
  hash::Hash,
  ops::{Deref, DerefMut},
};

type Result<T> = std::result::Result<T, ReadError>;

/// A type that can be a slice element. There is a single generic slice
/// implementation over this trait, so the derive only has to mark a struct
/// as an `Element` for `Vec<Struct>` fields to work.
///
/// `u8` deliberately does not implement this: a byte array is the Bytes
/// wire type, not a slice of Uint8, so byte-array fields use [`Bytes`].
pub trait Element: ValueWrite + ValueRead {
  /// Reads a delta-encoded slice of this element type. Only the
  /// varint-encoded integer types support the delta flag; everything else
  /// reports a mismatch.
  fn read_delta(field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Vec<Self>> {
    let _ = (r, st);
    Err(ReadError::SchemaMismatch {
      field:    field.name.clone(),
      expected: Self::WIRE | wire::SLICE,
      found:    field.wire,
    })
  }
}

/// A type that can be a map key.
pub trait MapKey: ValueWrite + ValueRead + Eq + Hash {}

/// A type that can be a map value. Slices cannot (a map descriptor cannot
/// describe their elements); wrap the slice in a struct instead.
pub trait MapValue: ValueWrite + ValueRead {}

/// An integer that can live in a delta-encoded slice. `to_bits` widens to
/// the 64-bit domain the deltas are computed in; `from_bits` narrows back.
pub trait DeltaElement: ValueWrite + ValueRead + Copy {
  fn to_bits(self) -> u64;
  fn from_bits(bits: u64) -> Self;
}

/// A raw byte-array value (the Bytes wire type). This is a distinct type
/// rather than `Vec<u8>` so that byte arrays and integer slices stay
/// distinct on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Deref for Bytes {
  type Target = Vec<u8>;

  fn deref(&self) -> &Vec<u8> { &self.0 }
}
impl DerefMut for Bytes {
  fn deref_mut(&mut self) -> &mut Vec<u8> { &mut self.0 }
}
impl From<Vec<u8>> for Bytes {
  fn from(data: Vec<u8>) -> Bytes { Bytes(data) }
}
impl From<&[u8]> for Bytes {
  fn from(data: &[u8]) -> Bytes { Bytes(data.to_vec()) }
}

impl ValueWrite for Bytes {
  const WIRE: u8 = BaseType::Bytes.id();
  fn write(&self, buf: &mut Buffer) {
    buf.put_varint(self.0.len() as u64);
    buf.extend_from_slice(&self.0);
  }
}
impl ValueRead for Bytes {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self> {
    let len = r.read_varint()?;
    st.check(LimitKind::BytesLength, len)?;
    Ok(Bytes(r.read_slice(len as usize)?.to_vec()))
  }
}

impl ValueWrite for bool {
  const WIRE: u8 = BaseType::Bool.id();
  fn write(&self, buf: &mut Buffer) { buf.push(*self as u8) }
}
impl ValueRead for bool {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
    r.read_bool()
  }
}

impl ValueWrite for u8 {
  const WIRE: u8 = BaseType::Uint8.id();
  fn write(&self, buf: &mut Buffer) { buf.push(*self) }
}
impl ValueRead for u8 {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
    r.read_u8()
  }
}

impl ValueWrite for i8 {
  const WIRE: u8 = BaseType::Int8.id();
  fn write(&self, buf: &mut Buffer) { buf.push(*self as u8) }
}
impl ValueRead for i8 {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
    r.read_i8()
  }
}

macro_rules! varint_impl {
  ( $ty:ty, $base:expr, $read:ident ) => {
    impl ValueWrite for $ty {
      const WIRE: u8 = $base.id();
      fn write(&self, buf: &mut Buffer) { buf.put_varint(*self as u64) }
    }
    impl ValueRead for $ty {
      fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
        r.$read()
      }
    }
  };
}

macro_rules! zigzag_impl {
  ( $ty:ty, $base:expr, $read:ident ) => {
    impl ValueWrite for $ty {
      const WIRE: u8 = $base.id();
      fn write(&self, buf: &mut Buffer) { buf.put_zigzag(*self as i64) }
    }
    impl ValueRead for $ty {
      fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
        r.$read()
      }
    }
  };
}

varint_impl!(u16, BaseType::Uint16, read_u16);
varint_impl!(u32, BaseType::Uint32, read_u32);
varint_impl!(u64, BaseType::Uint64, read_u64);
varint_impl!(usize, BaseType::Uint, read_usize);

zigzag_impl!(i16, BaseType::Int16, read_i16);
zigzag_impl!(i32, BaseType::Int32, read_i32);
zigzag_impl!(isize, BaseType::Int, read_isize);

// i64 is the odd one out: a plain varint of the two's-complement bits, so
// delta timestamps pay the 10 byte cost only on their first element.
impl ValueWrite for i64 {
  const WIRE: u8 = BaseType::Int64.id();
  fn write(&self, buf: &mut Buffer) { buf.put_varint(*self as u64) }
}
impl ValueRead for i64 {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
    r.read_i64()
  }
}

impl ValueWrite for f32 {
  const WIRE: u8 = BaseType::Float32.id();
  fn write(&self, buf: &mut Buffer) { buf.put_f32(*self) }
}
impl ValueRead for f32 {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
    r.read_f32()
  }
}

impl ValueWrite for f64 {
  const WIRE: u8 = BaseType::Float64.id();
  fn write(&self, buf: &mut Buffer) { buf.put_f64(*self) }
}
impl ValueRead for f64 {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
    r.read_f64()
  }
}

impl ValueWrite for String {
  const WIRE: u8 = BaseType::Str.id();
  fn write(&self, buf: &mut Buffer) {
    buf.put_varint(self.len() as u64);
    buf.extend_from_slice(self.as_bytes());
  }
}
impl ValueRead for String {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self> {
    let len = r.read_varint()?;
    st.check(LimitKind::StringLength, len)?;
    Ok(std::str::from_utf8(r.read_slice(len as usize)?)?.to_owned())
  }
}

impl ValueWrite for DateTime<Utc> {
  const WIRE: u8 = BaseType::Time.id();
  fn write(&self, buf: &mut Buffer) {
    // Nanosecond timestamps clamp at the year-2262 representable bound.
    buf.put_zigzag(self.timestamp_nanos_opt().unwrap_or(i64::MAX))
  }
}
impl ValueRead for DateTime<Utc> {
  fn read(_field: &SchemaField, r: &mut Reader<'_>, _st: &mut DecodeState) -> Result<Self> {
    r.read_time()
  }
}

macro_rules! delta_element_impl {
  ( $( $ty:ty ),* ) => { $(
    impl DeltaElement for $ty {
      // Casting through i64 sign-extends signed values and zero-extends
      // unsigned ones, which is what the running wrapping sum needs.
      fn to_bits(self) -> u64 { self as i64 as u64 }
      fn from_bits(bits: u64) -> Self { bits as $ty }
    }
    impl Element for $ty {
      fn read_delta(
        _field: &SchemaField,
        r: &mut Reader<'_>,
        st: &mut DecodeState,
      ) -> Result<Vec<Self>> {
        read_delta_slice(r, st)
      }
    }
  )* };
}

delta_element_impl!(i16, i32, i64, isize, u16, u32, u64, usize);

macro_rules! element_impl {
  ( $( $ty:ty ),* ) => { $( impl Element for $ty {} )* };
}
macro_rules! map_key_impl {
  ( $( $ty:ty ),* ) => { $( impl MapKey for $ty {} )* };
}
macro_rules! map_value_impl {
  ( $( $ty:ty ),* ) => { $( impl MapValue for $ty {} )* };
}

element_impl!(bool, i8, f32, f64, String, Bytes, DateTime<Utc>);
map_key_impl!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, String);
map_value_impl!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String);
map_value_impl!(Bytes, DateTime<Utc>);

impl<T: Element> ValueWrite for Vec<T> {
  const WIRE: u8 = T::WIRE | wire::SLICE;
  fn extra_schema(out: &mut Vec<u8>) { T::extra_schema(out) }
  fn write(&self, buf: &mut Buffer) { write_slice(self, buf) }
}
impl<T: Element> ValueRead for Vec<T> {
  fn read(field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self> {
    if wire::is_delta(field.wire) {
      T::read_delta(field, r, st)
    } else {
      read_slice(field, r, st)
    }
  }
}

impl<T: ValueWrite> ValueWrite for Option<T> {
  const WIRE: u8 = T::WIRE | wire::POINTER;
  fn extra_schema(out: &mut Vec<u8>) { T::extra_schema(out) }
  fn write(&self, buf: &mut Buffer) {
    match self {
      Some(v) => {
        buf.push(1);
        v.write(buf);
      }
      None => buf.push(0),
    }
  }
  fn write_entry(&self, buf: &mut Buffer) {
    match self {
      Some(v) => {
        buf.push(1);
        v.write_entry(buf);
      }
      None => buf.push(0),
    }
  }
}
impl<T: ValueRead> ValueRead for Option<T> {
  fn read(field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self> {
    // Any non-zero presence tag counts as present, mirroring Bool.
    if r.read_byte()? == 0 {
      Ok(None)
    } else {
      Ok(Some(T::read(field, r, st)?))
    }
  }
  fn read_entry(r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self> {
    if r.read_byte()? == 0 {
      Ok(None)
    } else {
      Ok(Some(T::read_entry(r, st)?))
    }
  }
}
impl<T: MapValue> MapValue for Option<T> {}

impl<K: MapKey, V: MapValue> ValueWrite for HashMap<K, V> {
  const WIRE: u8 = BaseType::Map.id();
  fn extra_schema(out: &mut Vec<u8>) {
    out.push(K::WIRE);
    out.push(V::WIRE);
  }
  fn write(&self, buf: &mut Buffer) {
    // The body repeats the key/value wire bytes so a map stays
    // self-describing even where no descriptor exists (map values).
    buf.push(K::WIRE);
    buf.push(V::WIRE);
    buf.put_varint(self.len() as u64);
    for (k, v) in self {
      k.write(buf);
      v.write_entry(buf);
    }
  }
}
impl<K: MapKey, V: MapValue> ValueRead for HashMap<K, V> {
  fn read(field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self> {
    let key = r.read_byte()?;
    let value = r.read_byte()?;
    if key != K::WIRE {
      return Err(ReadError::SchemaMismatch {
        field:    field.name.clone(),
        expected: K::WIRE,
        found:    key,
      });
    }
    if value != V::WIRE {
      return Err(ReadError::SchemaMismatch {
        field:    field.name.clone(),
        expected: V::WIRE,
        found:    value,
      });
    }
    let len = r.read_varint()?;
    st.check(LimitKind::MapSize, len)?;
    st.enter()?;
    let mut out = HashMap::with_capacity(len as usize);
    for _ in 0..len {
      let k = K::read_entry(r, st)?;
      let v = V::read_entry(r, st)?;
      out.insert(k, v);
    }
    st.leave();
    Ok(out)
  }
}
impl<K: MapKey, V: MapValue> MapValue for HashMap<K, V> {}
