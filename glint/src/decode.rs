//! The decoder engine. Decoding parses the document header, then executes a
//! compiled instruction list for the `(target shape, schema fingerprint)`
//! pair: one copy instruction per inbound field that exists on the target,
//! one skip instruction per inbound field that does not. Instruction lists
//! are compiled at first sight of a fingerprint and cached for the life of
//! the process, so repeated documents of the same shape skip schema parsing
//! entirely.

use crate::{
  generics::{DeltaElement, Element},
  read::{LimitKind, ReadError, Reader},
  schema::{self, Schema, SchemaField},
  wire::{self, BaseType},
  Record,
};
use parking_lot::RwLock;
use std::{
  any::{type_name, TypeId},
  collections::HashMap,
  sync::{Arc, OnceLock},
};

type Result<T> = std::result::Result<T, ReadError>;

/// Decode-side resource limits. Every length prefix in a document is
/// checked against these before anything is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
  pub max_string_length:  u64,
  pub max_bytes_length:   u64,
  pub max_array_length:   u64,
  pub max_map_size:       u64,
  pub max_nesting_depth:  usize,
  pub max_schema_length:  u64,
}

impl Default for Limits {
  fn default() -> Limits {
    Limits {
      max_string_length: 10 << 20,
      max_bytes_length:  10 << 20,
      max_array_length:  1_000_000,
      max_map_size:      100_000,
      max_nesting_depth: 100,
      max_schema_length: 1 << 20,
    }
  }
}

/// Per-call decode state: the configured limits and the current container
/// nesting depth.
#[derive(Debug)]
pub struct DecodeState {
  limits: Limits,
  depth:  usize,
}

impl DecodeState {
  pub(crate) fn new(limits: Limits) -> DecodeState { DecodeState { limits, depth: 0 } }

  pub(crate) fn limits(&self) -> &Limits { &self.limits }

  /// Checks a length prefix against the matching limit.
  pub fn check(&self, kind: LimitKind, value: u64) -> Result<()> {
    let limit = match kind {
      LimitKind::StringLength => self.limits.max_string_length,
      LimitKind::BytesLength => self.limits.max_bytes_length,
      LimitKind::ArrayLength => self.limits.max_array_length,
      LimitKind::MapSize => self.limits.max_map_size,
      LimitKind::NestingDepth => self.limits.max_nesting_depth as u64,
      LimitKind::SchemaLength => self.limits.max_schema_length,
    };
    if value > limit {
      Err(ReadError::LimitExceeded { kind, value, limit })
    } else {
      Ok(())
    }
  }

  /// Enters one level of container nesting, failing once the configured
  /// depth is exceeded.
  pub fn enter(&mut self) -> Result<()> {
    self.depth += 1;
    self.check(LimitKind::NestingDepth, self.depth as u64)
  }

  /// Leaves one level of container nesting.
  pub fn leave(&mut self) { self.depth -= 1 }
}

/// A value that can be read from a field of a document. The inbound
/// [`SchemaField`] governs the layout: its modifier flags decide pointer
/// and delta handling, and its inner schema governs nested struct bodies.
pub trait ValueRead: Sized {
  fn read(field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self>;

  /// Reads this value from a map-entry position, where no field descriptor
  /// describes it. Structs override this to parse their inlined schema
  /// first; everything else reads the same bytes as [`read`](Self::read).
  fn read_entry(r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Self> {
    Self::read(&SchemaField::synthetic(0), r, st)
  }
}

/// Reads a slice body: a varint length, then that many element encodings.
pub fn read_slice<T: Element>(
  field: &SchemaField,
  r: &mut Reader<'_>,
  st: &mut DecodeState,
) -> Result<Vec<T>> {
  let len = r.read_varint()?;
  st.check(LimitKind::ArrayLength, len)?;
  let mut out = Vec::with_capacity(len as usize);
  for _ in 0..len {
    out.push(T::read(field, r, st)?);
  }
  Ok(out)
}

/// Reads a delta-encoded slice body, reconstructing absolute values by
/// running (wrapping) sum.
pub fn read_delta_slice<T: DeltaElement>(r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Vec<T>> {
  let len = r.read_varint()?;
  st.check(LimitKind::ArrayLength, len)?;
  let mut out = Vec::with_capacity(len as usize);
  let mut prev = 0u64;
  for i in 0..len {
    let v = if i == 0 {
      T::read_entry(r, st)?
    } else {
      T::from_bits(prev.wrapping_add(r.read_zigzag()? as u64))
    };
    prev = v.to_bits();
    out.push(v);
  }
  Ok(out)
}

/// Reads an inlined schema block (varint length, then schema bytes) from a
/// value body. Used for struct map-values, which have no descriptor to
/// carry their inner schema.
pub fn read_inline_schema(r: &mut Reader<'_>, st: &mut DecodeState) -> Result<Vec<SchemaField>> {
  let len = r.read_varint()?;
  st.check(LimitKind::SchemaLength, len)?;
  let bytes = r.read_slice(len as usize)?;
  let mut sr = Reader::new(bytes);
  schema::parse_fields(&mut sr, st.limits(), st.depth)
}

/// Reads a struct body into a fresh `T`, matching inbound fields to target
/// fields by name and skipping the rest. Fields the inbound schema does not
/// name keep their `Default` value.
pub fn read_struct_body<T: Record>(
  fields: &[SchemaField],
  r: &mut Reader<'_>,
  st: &mut DecodeState,
) -> Result<T> {
  st.enter()?;
  let mut out = T::default();
  for f in fields {
    match T::field_index(&f.name) {
      Some(i) if wire::compatible(f.wire, T::field_wire(i)) => out.read_field(i, f, r, st)?,
      Some(i) => {
        return Err(ReadError::SchemaMismatch {
          field:    f.name.clone(),
          expected: T::field_wire(i),
          found:    f.wire,
        });
      }
      None => skip_value(f, r, st)?,
    }
  }
  st.leave();
  Ok(out)
}

/// Consumes exactly the bytes of one value described by `field` without
/// materializing it.
pub(crate) fn skip_value(field: &SchemaField, r: &mut Reader<'_>, st: &mut DecodeState) -> Result<()> {
  skip_wire(field.wire, Some(field), r, st)
}

/// Skips one value given its wire byte, plus the descriptor when one exists
/// (struct skips need the inner schema; a struct with no descriptor parses
/// its inlined schema from the body instead).
pub(crate) fn skip_wire(
  wire_byte: u8,
  field: Option<&SchemaField>,
  r: &mut Reader<'_>,
  st: &mut DecodeState,
) -> Result<()> {
  let base = BaseType::from_id(wire::base(wire_byte))
    .ok_or(ReadError::UnknownWireType(wire::base(wire_byte)))?;
  if wire::is_pointer(wire_byte) && r.read_byte()? == 0 {
    return Ok(());
  }
  if wire::is_slice(wire_byte) {
    let len = r.read_varint()?;
    st.check(LimitKind::ArrayLength, len)?;
    if wire::is_delta(wire_byte) {
      if len > 0 {
        skip_base(base, field, r, st)?;
        for _ in 1..len {
          r.read_varint()?;
        }
      }
      return Ok(());
    }
    for _ in 0..len {
      skip_base(base, field, r, st)?;
    }
    return Ok(());
  }
  skip_base(base, field, r, st)
}

fn skip_base(
  base: BaseType,
  field: Option<&SchemaField>,
  r: &mut Reader<'_>,
  st: &mut DecodeState,
) -> Result<()> {
  match base {
    BaseType::Bool | BaseType::Int8 | BaseType::Uint8 => r.skip(1),
    BaseType::Str => {
      let len = r.read_varint()?;
      st.check(LimitKind::StringLength, len)?;
      r.skip(len as usize)
    }
    BaseType::Bytes => {
      let len = r.read_varint()?;
      st.check(LimitKind::BytesLength, len)?;
      r.skip(len as usize)
    }
    BaseType::Struct => {
      st.enter()?;
      match field {
        Some(f) => {
          for inner in &f.inner {
            skip_value(inner, r, st)?;
          }
        }
        None => {
          let fields = read_inline_schema(r, st)?;
          for inner in &fields {
            skip_value(inner, r, st)?;
          }
        }
      }
      st.leave();
      Ok(())
    }
    BaseType::Map => {
      let key = r.read_byte()?;
      let value = r.read_byte()?;
      let len = r.read_varint()?;
      st.check(LimitKind::MapSize, len)?;
      st.enter()?;
      for _ in 0..len {
        skip_wire(key, None, r, st)?;
        skip_wire(value, None, r, st)?;
      }
      st.leave();
      Ok(())
    }
    // Everything else is a single varint on the wire.
    _ => {
      r.read_varint()?;
      Ok(())
    }
  }
}

#[derive(Debug)]
enum Step {
  /// Read the inbound field into the target field at this index.
  Copy { target: usize, field: SchemaField },
  /// Consume the inbound field; the target has no field with this name.
  Skip { field: SchemaField },
}

/// A compiled instruction list for one `(target shape, fingerprint)` pair.
#[derive(Debug)]
struct Plan {
  steps: Vec<Step>,
}

fn plans() -> &'static RwLock<HashMap<TypeId, HashMap<u32, Arc<Plan>>>> {
  static PLANS: OnceLock<RwLock<HashMap<TypeId, HashMap<u32, Arc<Plan>>>>> = OnceLock::new();
  PLANS.get_or_init(|| RwLock::new(HashMap::new()))
}

fn compile<T: Record>(fields: Vec<SchemaField>) -> Result<Plan> {
  let mut steps = Vec::with_capacity(fields.len());
  for f in fields {
    match T::field_index(&f.name) {
      Some(i) if wire::compatible(f.wire, T::field_wire(i)) => {
        steps.push(Step::Copy { target: i, field: f })
      }
      Some(i) => {
        return Err(ReadError::SchemaMismatch {
          field:    f.name,
          expected: T::field_wire(i),
          found:    f.wire,
        });
      }
      None => steps.push(Step::Skip { field: f }),
    }
  }
  Ok(Plan { steps })
}

/// A decoder with its own limit configuration. The compiled-plan cache is
/// process-wide and shared between decoders.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
  pub(crate) limits: Limits,
}

impl Decoder {
  /// Creates a decoder with the default limits.
  pub fn new() -> Decoder { Decoder::default() }

  /// Creates a decoder with the given limits.
  pub fn with_limits(limits: Limits) -> Decoder { Decoder { limits } }

  /// The limits this decoder enforces.
  pub fn limits(&self) -> &Limits { &self.limits }

  /// Decodes a document into a fresh `T`. Fields the document does not
  /// carry come back as their `Default` values.
  pub fn decode<T: Record>(&self, bytes: &[u8]) -> Result<T> {
    let mut out = T::default();
    self.decode_into(bytes, &mut out)?;
    Ok(out)
  }

  /// Decodes a document into an existing `T`, returning the number of bytes
  /// consumed. Target fields the document does not name are left untouched.
  /// Trailing bytes past the value body are not an error; compare the
  /// return value with the input length to detect them.
  pub fn decode_into<T: Record>(&self, bytes: &[u8], out: &mut T) -> Result<usize> {
    let mut r = Reader::new(bytes);
    let header = schema::read_header(&mut r, &self.limits)?;
    let type_id = TypeId::of::<T>();

    let cached = plans().read().get(&type_id).and_then(|m| m.get(&header.fingerprint)).cloned();
    let plan = match cached {
      Some(plan) => {
        r.skip(header.schema_len)?;
        plan
      }
      None => {
        let schema_bytes = r.read_slice(header.schema_len)?;
        if schema::fingerprint(schema_bytes) != header.fingerprint {
          return Err(ReadError::InvalidHeader);
        }
        let mut sr = Reader::new(schema_bytes);
        let fields = schema::parse_fields(&mut sr, &self.limits, 0)?;
        let plan = Arc::new(compile::<T>(fields)?);
        debug!(
          "compiled decode plan for {} (fingerprint {:#010x}, {} steps)",
          type_name::<T>(),
          header.fingerprint,
          plan.steps.len(),
        );
        plans().write().entry(type_id).or_default().insert(header.fingerprint, plan.clone());
        plan
      }
    };

    let mut st = DecodeState::new(self.limits);
    for step in &plan.steps {
      match step {
        Step::Copy { target, field } => out.read_field(*target, field, &mut r, &mut st)?,
        Step::Skip { field } => skip_value(field, &mut r, &mut st)?,
      }
    }
    Ok(r.index())
  }

  /// Parses the header and schema of a document under this decoder's
  /// limits, without touching the value body.
  pub fn parse_schema(&self, bytes: &[u8]) -> Result<Schema> {
    schema::parse_schema_with(bytes, &self.limits)
  }
}

/// Decodes a document into a fresh `T` with the default limits.
pub fn decode<T: Record>(bytes: &[u8]) -> Result<T> { Decoder::new().decode(bytes) }

/// Decodes a document into an existing `T` with the default limits,
/// returning the number of bytes consumed.
pub fn decode_into<T: Record>(bytes: &[u8], out: &mut T) -> Result<usize> {
  Decoder::new().decode_into(bytes, out)
}
