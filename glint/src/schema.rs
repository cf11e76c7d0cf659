//! The schema engine. The encoder direction turns a shape declaration into
//! schema bytes (see [`append_field`] and the derive macro); the decoder
//! direction parses inbound schema bytes into a [`SchemaField`] tree.
//!
//! A schema body is a flat sequence of field descriptors: one wire byte, a
//! one byte name length, the UTF-8 name, then type-specific extras (a
//! length-prefixed inner schema for structs, two wire bytes for maps).

use crate::{
  decode::Limits,
  encode::ValueWrite,
  read::{LimitKind, ReadError, Reader},
  wire::{self, BaseType},
};
use std::fmt;

type Result<T> = std::result::Result<T, ReadError>;

/// Computes the fingerprint of a schema body: the CRC-32 of its raw bytes.
/// This is a cache key, not a security digest.
pub fn fingerprint(schema_bytes: &[u8]) -> u32 { crc32fast::hash(schema_bytes) }

/// A parsed schema: the ordered field descriptors of a document, plus the
/// fingerprint its header carried.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
  pub fields:      Vec<SchemaField>,
  pub fingerprint: u32,
}

/// One parsed field descriptor. Struct fields own their inner schema; map
/// fields own their key and value wire bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
  pub name:   String,
  pub wire:   u8,
  /// Inner schema, for base type [`BaseType::Struct`] only.
  pub inner:  Vec<SchemaField>,
  /// Key and value wire bytes, for base type [`BaseType::Map`] only.
  pub map_kv: Option<(u8, u8)>,
}

impl SchemaField {
  /// A descriptor with no name and no extras, used where a value is decoded
  /// from a position that has no field descriptor of its own.
  pub(crate) fn synthetic(wire: u8) -> SchemaField {
    SchemaField { name: String::new(), wire, inner: Vec::new(), map_kv: None }
  }

  /// The base type of this field.
  pub fn base_type(&self) -> Option<BaseType> { BaseType::from_id(wire::base(self.wire)) }
}

/// Appends one field descriptor for a value of type `T` to a schema body.
/// `flags` carries modifier bits the type itself does not imply (the delta
/// flag, set by the derive from a field attribute).
pub fn append_field<T: ValueWrite>(out: &mut Vec<u8>, name: &str, flags: u8) {
  debug_assert!(name.len() <= 255);
  out.push(T::WIRE | flags);
  out.push(name.len() as u8);
  out.extend_from_slice(name.as_bytes());
  T::extra_schema(out);
}

/// The fixed-position part of a document header.
pub(crate) struct DocHeader {
  pub flags:       u8,
  pub fingerprint: u32,
  pub schema_len:  usize,
}

/// Reads the flags byte, fingerprint, and schema length, leaving the reader
/// at the first schema byte. The flags byte is reserved; any value is
/// tolerated on read.
pub(crate) fn read_header(r: &mut Reader, limits: &Limits) -> Result<DocHeader> {
  if r.remaining() < 5 {
    return Err(ReadError::InvalidHeader);
  }
  let flags = r.read_byte()?;
  let fp = r.read_slice(4)?;
  let fingerprint = u32::from_le_bytes([fp[0], fp[1], fp[2], fp[3]]);
  let schema_len = r.read_varint()?;
  if schema_len > limits.max_schema_length {
    return Err(ReadError::LimitExceeded {
      kind:  LimitKind::SchemaLength,
      value: schema_len,
      limit: limits.max_schema_length,
    });
  }
  let schema_len = schema_len as usize;
  if schema_len > r.remaining() {
    return Err(ReadError::InvalidHeader);
  }
  Ok(DocHeader { flags, fingerprint, schema_len })
}

/// Parses a schema body into a descriptor tree. `depth` counts struct
/// nesting so a hostile schema cannot recurse unboundedly.
pub(crate) fn parse_fields(r: &mut Reader, limits: &Limits, depth: usize) -> Result<Vec<SchemaField>> {
  let mut fields = Vec::new();
  while r.can_read() {
    fields.push(parse_field(r, limits, depth)?);
  }
  Ok(fields)
}

fn parse_field(r: &mut Reader, limits: &Limits, depth: usize) -> Result<SchemaField> {
  let wire = r.read_byte()?;
  let base = BaseType::from_id(wire::base(wire))
    .ok_or(ReadError::UnknownWireType(wire::base(wire)))?;
  let name_len = r.read_byte()? as usize;
  let name = std::str::from_utf8(r.read_slice(name_len)?)?.to_owned();
  let mut field = SchemaField { name, wire, inner: Vec::new(), map_kv: None };
  match base {
    BaseType::Struct => {
      if depth + 1 > limits.max_nesting_depth {
        return Err(ReadError::LimitExceeded {
          kind:  LimitKind::NestingDepth,
          value: depth as u64 + 1,
          limit: limits.max_nesting_depth as u64,
        });
      }
      let inner_len = r.read_varint()? as usize;
      let mut inner = Reader::new(r.read_slice(inner_len)?);
      field.inner = parse_fields(&mut inner, limits, depth + 1)?;
    }
    BaseType::Map => {
      let key = r.read_byte()?;
      let value = r.read_byte()?;
      for b in [key, value] {
        if BaseType::from_id(wire::base(b)).is_none() {
          return Err(ReadError::UnknownWireType(wire::base(b)));
        }
      }
      field.map_kv = Some((key, value));
    }
    _ => {}
  }
  Ok(field)
}

/// Parses the header and schema of a document without touching the value
/// body. The fingerprint is taken from the header as written; use
/// [`fingerprint`] on the schema bytes to cross-check it.
pub fn parse_schema(bytes: &[u8]) -> Result<Schema> {
  parse_schema_with(bytes, &Limits::default())
}

pub(crate) fn parse_schema_with(bytes: &[u8], limits: &Limits) -> Result<Schema> {
  let mut r = Reader::new(bytes);
  let header = read_header(&mut r, limits)?;
  let mut schema = Reader::new(r.read_slice(header.schema_len)?);
  let fields = parse_fields(&mut schema, limits, 0)?;
  Ok(Schema { fields, fingerprint: header.fingerprint })
}

/// Reads only the schema fingerprint from a document header. This is a
/// cheap fixed-offset read.
pub fn schema_fingerprint(bytes: &[u8]) -> Result<u32> {
  if bytes.len() < 5 {
    return Err(ReadError::InvalidHeader);
  }
  Ok(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]))
}

/// One type change in a [`Report`]: the dotted path of the field and its
/// wire byte on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
  pub path: String,
  pub from: u8,
  pub to:   u8,
}

/// A field-level diff between two schemas. `added` and `removed` are named
/// from the perspective of going from `old` to `new`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
  pub added:   Vec<String>,
  pub removed: Vec<String>,
  pub changed: Vec<FieldChange>,
}

impl Report {
  /// True if the two schemas describe the same fields with the same types.
  pub fn is_compatible(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
  }
}

impl fmt::Display for Report {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    if self.is_compatible() {
      return write!(f, "schemas are compatible");
    }
    for name in &self.added {
      writeln!(f, "added: {name}")?;
    }
    for name in &self.removed {
      writeln!(f, "removed: {name}")?;
    }
    for change in &self.changed {
      writeln!(f, "changed: {} ({:#04x} -> {:#04x})", change.path, change.from, change.to)?;
    }
    Ok(())
  }
}

/// Produces a field-level diff between two schemas: fields added in `new`,
/// fields removed from `old`, and fields whose wire type changed. Struct
/// fields recurse with dotted paths.
pub fn are_schemas_compatible(old: &Schema, new: &Schema) -> Report {
  let mut report = Report::default();
  diff_fields("", &old.fields, &new.fields, &mut report);
  report
}

fn diff_fields(prefix: &str, old: &[SchemaField], new: &[SchemaField], report: &mut Report) {
  let path = |name: &str| {
    if prefix.is_empty() {
      name.to_owned()
    } else {
      format!("{prefix}.{name}")
    }
  };
  for o in old {
    match new.iter().find(|n| n.name == o.name) {
      None => report.removed.push(path(&o.name)),
      Some(n) if n.wire != o.wire => {
        report.changed.push(FieldChange { path: path(&o.name), from: o.wire, to: n.wire });
      }
      Some(n) => {
        if o.base_type() == Some(BaseType::Struct) {
          diff_fields(&path(&o.name), &o.inner, &n.inner, report);
        } else if o.map_kv != n.map_kv {
          let (of, nf) = (o.map_kv.unwrap_or((0, 0)), n.map_kv.unwrap_or((0, 0)));
          if of.0 != nf.0 {
            report.changed.push(FieldChange { path: path(&o.name) + ".key", from: of.0, to: nf.0 });
          }
          if of.1 != nf.1 {
            report
              .changed
              .push(FieldChange { path: path(&o.name) + ".value", from: of.1, to: nf.1 });
          }
        }
      }
    }
  }
  for n in new {
    if !old.iter().any(|o| o.name == n.name) {
      report.added.push(path(&n.name));
    }
  }
}
