//! End-to-end encode/decode scenarios driven through `#[derive(Glint)]`,
//! with byte-exact assertions where the wire format pins exact bytes.

use glint::{decode, encode, schema_fingerprint, Glint};
use std::collections::HashMap;

/// Byte offset of the value body: flags (1) + fingerprint (4) +
/// schema-length varint (1, for schemas under 128 bytes) + schema bytes.
fn body_of(doc: &[u8]) -> &[u8] {
  let schema_len = doc[5] as usize;
  assert!(doc[5] < 0x80, "test schemas stay under 128 bytes");
  &doc[6 + schema_len..]
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Simple {
  name: String,
  age:  isize,
}

#[test]
fn simple_record() {
  let doc = encode(&Simple { name: "Alice".into(), age: 30 });
  assert_eq!(doc[0], 0, "flags byte");
  // Body: "Alice" length-prefixed, then 30 zigzagged to 0x3c.
  assert_eq!(body_of(&doc), &[0x05, b'A', b'l', b'i', b'c', b'e', 0x3c]);
  assert_eq!(decode::<Simple>(&doc).unwrap(), Simple { name: "Alice".into(), age: 30 });
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Nick {
  nick: Option<String>,
}

#[test]
fn nullable_pointer() {
  let doc = encode(&Nick { nick: None });
  assert_eq!(body_of(&doc), &[0x00]);
  assert_eq!(decode::<Nick>(&doc).unwrap(), Nick { nick: None });

  let doc = encode(&Nick { nick: Some("TU".into()) });
  assert_eq!(body_of(&doc), &[0x01, 0x02, b'T', b'U']);
  assert_eq!(decode::<Nick>(&doc).unwrap(), Nick { nick: Some("TU".into()) });
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Tags {
  tags: Vec<String>,
}

#[test]
fn string_slice() {
  let v = Tags { tags: vec!["dev".into(), "go".into()] };
  let doc = encode(&v);
  assert_eq!(body_of(&doc), &[0x02, 0x03, b'd', b'e', b'v', 0x02, b'g', b'o']);
  assert_eq!(decode::<Tags>(&doc).unwrap(), v);

  let empty = Tags { tags: vec![] };
  assert_eq!(body_of(&encode(&empty)), &[0x00]);
  assert_eq!(decode::<Tags>(&encode(&empty)).unwrap(), empty);
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Stamps {
  #[glint(delta)]
  t: Vec<i64>,
}

#[test]
fn delta_timestamps() {
  let v = Stamps { t: vec![1_700_000_000, 1_700_000_001, 1_700_000_002] };
  let doc = encode(&v);
  // Length, first value as a plain varint of its bits, then two zigzag
  // varints each encoding +1.
  assert_eq!(body_of(&doc), &[0x03, 0x80, 0xe2, 0xcf, 0xaa, 0x06, 0x02, 0x02]);
  assert_eq!(decode::<Stamps>(&doc).unwrap(), v);
}

#[derive(Debug, Default, PartialEq, Glint)]
struct WideRecord {
  a:     isize,
  b:     String,
  extra: bool,
}

#[derive(Debug, Default, PartialEq, Glint)]
struct NarrowRecord {
  a: isize,
  b: String,
}

#[test]
fn struct_skip() {
  let doc = encode(&WideRecord { a: -4, b: "keep".into(), extra: true });
  let mut out = NarrowRecord::default();
  let used = glint::decode_into(&doc, &mut out).unwrap();
  assert_eq!(used, doc.len(), "the skipped bool must be consumed exactly");
  assert_eq!(out, NarrowRecord { a: -4, b: "keep".into() });
}

#[derive(Debug, Default, Clone, PartialEq, Glint)]
struct User {
  name: String,
  age:  isize,
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Directory {
  users: HashMap<String, User>,
}

#[test]
fn map_of_struct() {
  let mut users = HashMap::new();
  users.insert("alice".to_owned(), User { name: "Alice".into(), age: 30 });
  users.insert("bob".to_owned(), User { name: "Bob".into(), age: 900 });
  let v = Directory { users: users.clone() };
  let doc = encode(&v);
  // Entry order is whatever the map iterates; equality compares as a set.
  assert_eq!(decode::<Directory>(&doc).unwrap().users, users);
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Numbers {
  a: i8,
  b: i16,
  c: i32,
  d: i64,
  e: u8,
  f: u16,
  g: u32,
  h: u64,
  i: isize,
  j: usize,
}

#[test]
fn integer_extremes() {
  let v = Numbers {
    a: i8::MIN,
    b: i16::MIN,
    c: i32::MIN,
    d: i64::MIN,
    e: u8::MAX,
    f: u16::MAX,
    g: u32::MAX,
    h: u64::MAX,
    i: isize::MIN,
    j: usize::MAX,
  };
  assert_eq!(decode::<Numbers>(&encode(&v)).unwrap(), v);
  let v = Numbers {
    a: i8::MAX,
    b: i16::MAX,
    c: i32::MAX,
    d: i64::MAX,
    e: 0,
    f: 0,
    g: 0,
    h: 0,
    i: isize::MAX,
    j: 0,
  };
  assert_eq!(decode::<Numbers>(&encode(&v)).unwrap(), v);
}

#[derive(Debug, Default, Glint)]
struct Floats {
  x: f32,
  y: f64,
}

#[test]
fn float_specials_are_bit_exact() {
  for (x, y) in [
    (f32::NAN, f64::NAN),
    (f32::INFINITY, f64::NEG_INFINITY),
    (-0.0f32, 0.0f64),
    (f32::MIN_POSITIVE, f64::MIN_POSITIVE),
  ] {
    let out: Floats = decode(&encode(&Floats { x, y })).unwrap();
    assert_eq!(out.x.to_bits(), x.to_bits());
    assert_eq!(out.y.to_bits(), y.to_bits());
  }
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Blob {
  data: glint::Bytes,
  note: String,
}

#[test]
fn bytes_and_empty_values() {
  let v = Blob { data: glint::Bytes(vec![]), note: String::new() };
  let doc = encode(&v);
  assert_eq!(body_of(&doc), &[0x00, 0x00]);
  assert_eq!(decode::<Blob>(&doc).unwrap(), v);

  let v = Blob { data: glint::Bytes(vec![0, 1, 255]), note: "héllo wörld".into() };
  assert_eq!(decode::<Blob>(&encode(&v)).unwrap(), v);
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Nested {
  id:    u32,
  inner: Inner,
  items: Vec<Inner>,
}

#[derive(Debug, Default, Clone, PartialEq, Glint)]
struct Inner {
  label: String,
  on:    bool,
}

#[test]
fn nested_structs_and_struct_slices() {
  let v = Nested {
    id:    7,
    inner: Inner { label: "first".into(), on: true },
    items: vec![
      Inner { label: "a".into(), on: false },
      Inner { label: "b".into(), on: true },
    ],
  };
  assert_eq!(decode::<Nested>(&encode(&v)).unwrap(), v);
}

#[derive(Debug, Default, PartialEq, Glint)]
struct Moment {
  at:   chrono::DateTime<chrono::Utc>,
  also: Option<chrono::DateTime<chrono::Utc>>,
}

#[test]
fn time_round_trip() {
  use chrono::TimeZone;
  let at = chrono::Utc.timestamp_nanos(1_700_000_000_123_456_789);
  let v = Moment { at, also: Some(at) };
  assert_eq!(decode::<Moment>(&encode(&v)).unwrap(), v);
}

#[test]
fn fingerprint_is_stable_per_shape() {
  let a = encode(&Simple { name: "x".into(), age: 1 });
  let b = encode(&Simple { name: "completely different".into(), age: -9999 });
  assert_eq!(schema_fingerprint(&a).unwrap(), schema_fingerprint(&b).unwrap());

  let c = encode(&Tags { tags: vec![] });
  assert_ne!(schema_fingerprint(&a).unwrap(), schema_fingerprint(&c).unwrap());
}

#[test]
fn encode_into_pooled_buffer() {
  let mut buf = glint::Buffer::from_pool();
  glint::encode_into(&Simple { name: "pooled".into(), age: 2 }, &mut buf);
  let out: Simple = decode(buf.bytes()).unwrap();
  assert_eq!(out.name, "pooled");
  buf.return_to_pool();
}
