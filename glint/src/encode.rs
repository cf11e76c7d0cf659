//! The encoder engine. Encoding a shape writes a fixed header (flags byte,
//! schema fingerprint, schema length, schema bytes) followed by the field
//! values in declared order. The schema bytes and fingerprint are computed
//! once per shape and cached for the life of the process.

use crate::{
  buffer::Buffer,
  generics::{DeltaElement, Element},
  schema, Record,
};
use parking_lot::RwLock;
use std::{
  any::{type_name, TypeId},
  collections::HashMap,
  sync::{Arc, OnceLock},
};

/// A value that can be written as a field of a document. Implemented for
/// every supported primitive, for `Option`/`Vec`/`HashMap` wrappers, and by
/// the derive macro for struct shapes.
pub trait ValueWrite {
  /// The wire byte for this type: base id plus slice/pointer flags. The
  /// delta flag is a per-field property and is added by the derive.
  const WIRE: u8;

  /// Appends type-specific descriptor extras: the length-prefixed inner
  /// schema for structs, the key/value wire bytes for maps. Most types have
  /// none.
  fn extra_schema(out: &mut Vec<u8>) { let _ = out; }

  /// Writes the body encoding of this value.
  fn write(&self, buf: &mut Buffer);

  /// Writes this value in a map-entry position, where no field descriptor
  /// describes it. Structs override this to inline their schema; everything
  /// else writes the same bytes as [`write`](Self::write).
  fn write_entry(&self, buf: &mut Buffer) { self.write(buf) }
}

/// The schema bytes and fingerprint of one shape, computed at the first
/// encode and reused for every document of that shape.
#[derive(Debug)]
pub struct CachedSchema {
  pub bytes:       Vec<u8>,
  pub fingerprint: u32,
}

fn schemas() -> &'static RwLock<HashMap<TypeId, Arc<CachedSchema>>> {
  static SCHEMAS: OnceLock<RwLock<HashMap<TypeId, Arc<CachedSchema>>>> = OnceLock::new();
  SCHEMAS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Returns the schema bytes and fingerprint for shape `T`, compiling them
/// on first use. A concurrent double-compute produces identical bytes, so
/// last-writer-wins publication is safe.
pub fn schema_of<T: Record>() -> Arc<CachedSchema> {
  let id = TypeId::of::<T>();
  if let Some(cached) = schemas().read().get(&id) {
    return cached.clone();
  }
  let mut bytes = Vec::new();
  T::append_schema(&mut bytes);
  let fingerprint = schema::fingerprint(&bytes);
  debug!(
    "compiled schema for {} ({} bytes, fingerprint {fingerprint:#010x})",
    type_name::<T>(),
    bytes.len(),
  );
  let cached = Arc::new(CachedSchema { bytes, fingerprint });
  schemas().write().insert(id, cached.clone());
  cached
}

/// Encodes a value as a self-contained document.
pub fn encode<T: Record>(value: &T) -> Vec<u8> {
  let mut buf = Buffer::new();
  encode_into(value, &mut buf);
  buf.take()
}

/// Encodes a value as a self-contained document, appending to the given
/// buffer. Pair with [`Buffer::from_pool`] to amortize allocations.
pub fn encode_into<T: Record>(value: &T, buf: &mut Buffer) {
  let schema = schema_of::<T>();
  buf.push(0);
  buf.extend_from_slice(&schema.fingerprint.to_le_bytes());
  buf.put_varint(schema.bytes.len() as u64);
  buf.extend_from_slice(&schema.bytes);
  value.write_body(buf);
}

/// Writes a slice body: a varint length, then each element's encoding.
pub fn write_slice<T: Element>(values: &[T], buf: &mut Buffer) {
  buf.put_varint(values.len() as u64);
  for v in values {
    v.write(buf);
  }
}

/// Writes a delta-encoded slice body: a varint length, element 0 in the
/// base encoding, then zigzag varints of each difference from the prior
/// element. Differences wrap in the 64-bit domain so full-range sequences
/// round-trip.
pub fn write_delta_slice<T: DeltaElement>(values: &[T], buf: &mut Buffer) {
  buf.put_varint(values.len() as u64);
  let mut prev = 0u64;
  for (i, v) in values.iter().enumerate() {
    if i == 0 {
      v.write(buf);
    } else {
      buf.put_zigzag(v.to_bits().wrapping_sub(prev) as i64);
    }
    prev = v.to_bits();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    decode::DecodeState,
    read::{ReadError, Reader},
    schema::SchemaField,
    ValueRead,
  };

  #[derive(Debug, Default, PartialEq)]
  struct Point {
    x: i32,
    y: i32,
  }

  impl Record for Point {
    fn append_schema(out: &mut Vec<u8>) {
      schema::append_field::<i32>(out, "x", 0);
      schema::append_field::<i32>(out, "y", 0);
    }
    fn write_body(&self, buf: &mut Buffer) {
      self.x.write(buf);
      self.y.write(buf);
    }
    fn field_index(name: &str) -> Option<usize> {
      match name {
        "x" => Some(0),
        "y" => Some(1),
        _ => None,
      }
    }
    fn field_wire(_index: usize) -> u8 { <i32 as ValueWrite>::WIRE }
    fn read_field(
      &mut self,
      index: usize,
      field: &SchemaField,
      r: &mut Reader,
      st: &mut DecodeState,
    ) -> Result<(), ReadError> {
      match index {
        0 => self.x = ValueRead::read(field, r, st)?,
        1 => self.y = ValueRead::read(field, r, st)?,
        _ => {}
      }
      Ok(())
    }
  }

  #[test]
  fn header_layout() {
    let doc = encode(&Point { x: -1, y: 300 });
    // Flags byte is always zero.
    assert_eq!(doc[0], 0);
    let schema = schema_of::<Point>();
    assert_eq!(&doc[1..5], &schema.fingerprint.to_le_bytes());
    // Both descriptors are 1 wire byte + 1 length byte + 1 name byte.
    assert_eq!(doc[5], 6);
    assert_eq!(&doc[6..12], &schema.bytes[..]);
    // Body: zigzag(-1), zigzag(300).
    assert_eq!(&doc[12..], &[1, 0xd8, 4]);
  }

  #[test]
  fn schema_cache_is_stable() {
    let a = schema_of::<Point>();
    let b = schema_of::<Point>();
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.bytes, b.bytes);
    assert_eq!(
      a.fingerprint,
      schema::fingerprint(&a.bytes),
      "fingerprint must be the CRC-32 of the schema bytes"
    );
  }

  #[test]
  fn fingerprint_is_value_independent() {
    let a = encode(&Point { x: 0, y: 0 });
    let b = encode(&Point { x: i32::MIN, y: i32::MAX });
    assert_eq!(a[1..5], b[1..5]);
  }

  #[test]
  fn delta_slice_bytes() {
    let mut buf = Buffer::new();
    write_delta_slice(&[100i64, 101, 99], &mut buf);
    // len, 100 as plain varint bits, zigzag(+1), zigzag(-2).
    assert_eq!(buf.bytes(), &[3, 100, 2, 3]);
  }

  #[test]
  fn delta_slice_wraps_at_extremes() {
    let mut buf = Buffer::new();
    write_delta_slice(&[u64::MAX, 0, u64::MAX], &mut buf);
    let bytes = buf.take();
    let mut r = Reader::new(&bytes);
    assert_eq!(r.read_varint().unwrap(), 3);
    assert_eq!(r.read_varint().unwrap(), u64::MAX);
    // Both wrapped differences are ±1 after wrapping.
    assert_eq!(r.read_zigzag().unwrap(), 1);
    assert_eq!(r.read_zigzag().unwrap(), -1);
  }

  #[test]
  fn empty_slice_is_just_a_length() {
    let mut buf = Buffer::new();
    write_slice::<u32>(&[], &mut buf);
    assert_eq!(buf.bytes(), &[0]);
  }
}
