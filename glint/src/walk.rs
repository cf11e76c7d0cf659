//! Shape-agnostic document traversal. The walker reads a document using
//! only its embedded schema and emits structural events to a [`Visitor`].
//! Inspection tools, converters and stub generators are built on this.

use crate::{
  decode::{read_inline_schema, skip_wire, DecodeState, Decoder},
  read::{LimitKind, ReadError, Reader},
  schema::{self, SchemaField},
  wire::{self, BaseType},
};

type Result<T> = std::result::Result<T, ReadError>;

/// Structural events for one document. All hooks default to doing nothing,
/// so implementations override only what they care about.
///
/// Primitive fields hand the visitor a mutable reader borrow: the visitor
/// may consume the whole value with the matching typed read, or leave the
/// reader untouched and let the walker skip the value. Consuming part of a
/// value is not supported.
///
/// The first error returned from any hook aborts the walk and propagates.
pub trait Visitor<'a> {
  /// The reserved flags byte.
  fn flags(&mut self, flags: u8) -> Result<()> {
    let _ = flags;
    Ok(())
  }
  /// The schema fingerprint from the header.
  fn schema_fingerprint(&mut self, fingerprint: u32) -> Result<()> {
    let _ = fingerprint;
    Ok(())
  }
  /// A struct opens. The document root is a struct with name `""`; slice
  /// elements are structs with name `""`.
  fn struct_start(&mut self, name: &str) -> Result<()> {
    let _ = name;
    Ok(())
  }
  fn struct_end(&mut self, name: &str) -> Result<()> {
    let _ = name;
    Ok(())
  }
  /// A primitive field. Slice elements arrive with name `""` and the
  /// element wire byte from `array_start`, delta flag included: element 0
  /// uses the base encoding, later elements are zigzag varints of deltas.
  fn field(&mut self, name: &str, wire: u8, r: &mut Reader<'a>) -> Result<()> {
    let _ = (name, wire, r);
    Ok(())
  }
  /// A pointer field whose presence tag was `0`. No value bytes follow.
  fn null_field(&mut self, name: &str, wire: u8) -> Result<()> {
    let _ = (name, wire);
    Ok(())
  }
  fn array_start(&mut self, name: &str, element_wire: u8, len: u64) -> Result<()> {
    let _ = (name, element_wire, len);
    Ok(())
  }
  fn array_end(&mut self, name: &str) -> Result<()> {
    let _ = name;
    Ok(())
  }
  fn map_start(&mut self, name: &str, key_wire: u8, value_wire: u8, len: u64) -> Result<()> {
    let _ = (name, key_wire, value_wire, len);
    Ok(())
  }
  fn map_end(&mut self, name: &str) -> Result<()> {
    let _ = name;
    Ok(())
  }
}

/// Walks a document with the default limits.
pub fn walk<'a, V: Visitor<'a>>(bytes: &'a [u8], visitor: &mut V) -> Result<()> {
  Decoder::new().walk(bytes, visitor)
}

impl Decoder {
  /// Walks a document under this decoder's limits, emitting structural
  /// events to the visitor.
  pub fn walk<'a, V: Visitor<'a>>(&self, bytes: &'a [u8], visitor: &mut V) -> Result<()> {
    let mut r = Reader::new(bytes);
    let header = schema::read_header(&mut r, &self.limits)?;
    visitor.flags(header.flags)?;
    visitor.schema_fingerprint(header.fingerprint)?;
    let mut sr = Reader::new(r.read_slice(header.schema_len)?);
    let fields = schema::parse_fields(&mut sr, &self.limits, 0)?;
    let mut st = DecodeState::new(self.limits);
    visitor.struct_start("")?;
    for f in &fields {
      walk_field(&f.name, f.wire, Some(f), &mut r, visitor, &mut st)?;
    }
    visitor.struct_end("")?;
    Ok(())
  }
}

fn walk_field<'a, V: Visitor<'a>>(
  name: &str,
  wire_byte: u8,
  field: Option<&SchemaField>,
  r: &mut Reader<'a>,
  visitor: &mut V,
  st: &mut DecodeState,
) -> Result<()> {
  if wire::is_pointer(wire_byte) {
    if r.read_byte()? == 0 {
      return visitor.null_field(name, wire_byte);
    }
    return walk_field(name, wire_byte & !wire::POINTER, field, r, visitor, st);
  }
  let base = BaseType::from_id(wire::base(wire_byte))
    .ok_or(ReadError::UnknownWireType(wire::base(wire_byte)))?;
  if wire::is_slice(wire_byte) {
    let len = r.read_varint()?;
    st.check(LimitKind::ArrayLength, len)?;
    let elem = wire_byte & !wire::SLICE;
    visitor.array_start(name, elem, len)?;
    if base == BaseType::Struct {
      // Struct elements share the slice descriptor's inner schema. A
      // struct slice can only be reached through a descriptor.
      let f = field.ok_or(ReadError::InvalidHeader)?;
      st.enter()?;
      for _ in 0..len {
        visitor.struct_start("")?;
        for inner in &f.inner {
          walk_field(&inner.name, inner.wire, Some(inner), r, visitor, st)?;
        }
        visitor.struct_end("")?;
      }
      st.leave();
    } else {
      for i in 0..len {
        let start = r.index();
        visitor.field("", elem, r)?;
        if r.index() == start {
          if wire::is_delta(elem) && i > 0 {
            r.read_varint()?;
          } else {
            skip_wire(wire::base(elem), None, r, st)?;
          }
        }
      }
    }
    return visitor.array_end(name);
  }
  match base {
    BaseType::Struct => {
      st.enter()?;
      visitor.struct_start(name)?;
      match field {
        Some(f) => {
          for inner in &f.inner {
            walk_field(&inner.name, inner.wire, Some(inner), r, visitor, st)?;
          }
        }
        None => {
          // A struct with no descriptor (a map value) inlines its schema.
          let fields = read_inline_schema(r, st)?;
          for inner in &fields {
            walk_field(&inner.name, inner.wire, Some(inner), r, visitor, st)?;
          }
        }
      }
      visitor.struct_end(name)?;
      st.leave();
      Ok(())
    }
    BaseType::Map => {
      let key = r.read_byte()?;
      let value = r.read_byte()?;
      let len = r.read_varint()?;
      st.check(LimitKind::MapSize, len)?;
      visitor.map_start(name, key, value, len)?;
      st.enter()?;
      for _ in 0..len {
        walk_field("", key, None, r, visitor, st)?;
        walk_field("", value, None, r, visitor, st)?;
      }
      st.leave();
      visitor.map_end(name)
    }
    _ => {
      let start = r.index();
      visitor.field(name, wire_byte, r)?;
      if r.index() == start {
        skip_wire(wire_byte, field, r, st)?;
      }
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    buffer::put_varint,
    schema::append_field,
    Buffer,
  };

  #[derive(Default)]
  struct Events {
    log: Vec<String>,
  }

  impl<'a> Visitor<'a> for Events {
    fn flags(&mut self, flags: u8) -> Result<()> {
      self.log.push(format!("flags {flags}"));
      Ok(())
    }
    fn schema_fingerprint(&mut self, fingerprint: u32) -> Result<()> {
      self.log.push(format!("fingerprint {fingerprint:#010x}"));
      Ok(())
    }
    fn struct_start(&mut self, name: &str) -> Result<()> {
      self.log.push(format!("struct_start {name:?}"));
      Ok(())
    }
    fn struct_end(&mut self, name: &str) -> Result<()> {
      self.log.push(format!("struct_end {name:?}"));
      Ok(())
    }
    fn field(&mut self, name: &str, wire: u8, r: &mut Reader<'a>) -> Result<()> {
      // Consume strings to prove the reader hand-off; leave everything
      // else for the walker to skip.
      if wire::base(wire) == BaseType::Str.id() && !wire::is_slice(wire) {
        let s = r.read_str()?;
        self.log.push(format!("field {name:?} str {s:?}"));
      } else {
        self.log.push(format!("field {name:?} wire {wire:#04x}"));
      }
      Ok(())
    }
    fn null_field(&mut self, name: &str, _wire: u8) -> Result<()> {
      self.log.push(format!("null {name:?}"));
      Ok(())
    }
    fn array_start(&mut self, name: &str, element_wire: u8, len: u64) -> Result<()> {
      self.log.push(format!("array_start {name:?} elem {element_wire:#04x} len {len}"));
      Ok(())
    }
    fn array_end(&mut self, name: &str) -> Result<()> {
      self.log.push(format!("array_end {name:?}"));
      Ok(())
    }
    fn map_start(&mut self, name: &str, key_wire: u8, value_wire: u8, len: u64) -> Result<()> {
      self.log.push(format!("map_start {name:?} {key_wire}/{value_wire} len {len}"));
      Ok(())
    }
    fn map_end(&mut self, name: &str) -> Result<()> {
      self.log.push(format!("map_end {name:?}"));
      Ok(())
    }
  }

  fn doc(schema: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = vec![0];
    out.extend_from_slice(&schema::fingerprint(schema).to_le_bytes());
    put_varint(&mut out, schema.len() as u64);
    out.extend_from_slice(schema);
    out.extend_from_slice(body);
    out
  }

  #[test]
  fn walks_primitives_and_nulls() {
    let mut schema = Vec::new();
    append_field::<String>(&mut schema, "name", 0);
    append_field::<u32>(&mut schema, "age", 0);
    append_field::<Option<bool>>(&mut schema, "vip", 0);

    let mut body = Buffer::new();
    body.put_varint(2);
    body.extend_from_slice(b"Bo");
    body.put_varint(44);
    body.push(0);
    let bytes = doc(&schema, body.bytes());

    let mut events = Events::default();
    walk(&bytes, &mut events).unwrap();
    assert_eq!(
      events.log,
      vec![
        "flags 0".to_owned(),
        format!("fingerprint {:#010x}", schema::fingerprint(&schema)),
        "struct_start \"\"".to_owned(),
        "field \"name\" str \"Bo\"".to_owned(),
        "field \"age\" wire 0x0a".to_owned(),
        "null \"vip\"".to_owned(),
        "struct_end \"\"".to_owned(),
      ]
    );
  }

  #[test]
  fn walks_arrays_with_skip_if_unconsumed() {
    let mut schema = Vec::new();
    append_field::<Vec<u32>>(&mut schema, "ids", 0);
    let mut body = Buffer::new();
    crate::encode::write_slice(&[7u32, 300, 9], &mut body);
    let bytes = doc(&schema, body.bytes());

    let mut events = Events::default();
    walk(&bytes, &mut events).unwrap();
    // The visitor never consumes the u32 elements; the walker must skip
    // each one and still terminate cleanly.
    assert!(events.log.contains(&"array_start \"ids\" elem 0x0a len 3".to_owned()));
    assert_eq!(events.log.iter().filter(|l| l.starts_with("field")).count(), 3);
    assert!(events.log.contains(&"array_end \"ids\"".to_owned()));
  }

  #[test]
  fn walks_nested_structs_and_maps() {
    // users: map<string, struct{age: u32}> with one entry.
    let mut inner_schema = Vec::new();
    append_field::<u32>(&mut inner_schema, "age", 0);

    let mut schema = Vec::new();
    schema.push(BaseType::Map.id());
    schema.push("users".len() as u8);
    schema.extend_from_slice(b"users");
    schema.push(<String as crate::ValueWrite>::WIRE);
    schema.push(BaseType::Struct.id());

    let mut body = Buffer::new();
    body.push(<String as crate::ValueWrite>::WIRE);
    body.push(BaseType::Struct.id());
    body.put_varint(1);
    body.put_varint(3);
    body.extend_from_slice(b"ada");
    // Struct map-value: inline schema block, then the body.
    body.put_varint(inner_schema.len() as u64);
    body.extend_from_slice(&inner_schema);
    body.put_varint(36);
    let bytes = doc(&schema, body.bytes());

    let mut events = Events::default();
    walk(&bytes, &mut events).unwrap();
    assert_eq!(
      events.log[2..],
      [
        "struct_start \"\"".to_owned(),
        "map_start \"users\" 14/16 len 1".to_owned(),
        "field \"\" str \"ada\"".to_owned(),
        "struct_start \"\"".to_owned(),
        "field \"age\" wire 0x0a".to_owned(),
        "struct_end \"\"".to_owned(),
        "map_end \"users\"".to_owned(),
        "struct_end \"\"".to_owned(),
      ]
    );
  }

  #[test]
  fn walker_errors_propagate() {
    struct Bomb;
    impl<'a> Visitor<'a> for Bomb {
      fn field(&mut self, _name: &str, _wire: u8, _r: &mut Reader<'a>) -> Result<()> {
        Err(ReadError::Truncated)
      }
    }
    let mut schema = Vec::new();
    append_field::<u32>(&mut schema, "n", 0);
    let bytes = doc(&schema, &[5]);
    assert!(matches!(walk(&bytes, &mut Bomb).unwrap_err(), ReadError::Truncated));
  }

  #[test]
  fn delta_arrays_pass_the_flag_through() {
    let mut schema = Vec::new();
    append_field::<Vec<i64>>(&mut schema, "t", wire::DELTA);
    let mut body = Buffer::new();
    crate::encode::write_delta_slice(&[100i64, 101, 102], &mut body);
    let bytes = doc(&schema, body.bytes());

    let mut events = Events::default();
    walk(&bytes, &mut events).unwrap();
    let elem = BaseType::Int64.id() | wire::DELTA;
    assert!(events
      .log
      .contains(&format!("array_start \"t\" elem {elem:#04x} len 3")));
    assert_eq!(events.log.iter().filter(|l| l.starts_with("field")).count(), 3);
  }
}
