//! A transient, non-owning view over one document. [`Document`] validates
//! the header once and then hands out the schema, fingerprint and body
//! without copying; its `Display` impl dumps the whole tree using only the
//! embedded schema, which makes unknown documents easy to eyeball.

use crate::{
  decode::Decoder,
  read::{ReadError, Reader},
  schema::{self, Schema},
  walk::Visitor,
  wire::{self, BaseType},
  Record,
};
use std::fmt;

/// A validated view over a caller-provided byte slice. The document does
/// not own the bytes; its lifetime is bounded by the caller's.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
  bytes:       &'a [u8],
  flags:       u8,
  fingerprint: u32,
  body_start:  usize,
  schema_len:  usize,
}

impl<'a> Document<'a> {
  /// Validates the header and returns a view. This reads the fixed header
  /// and schema length only; the schema itself is parsed on demand.
  pub fn new(bytes: &'a [u8]) -> Result<Document<'a>, ReadError> {
    let decoder = Decoder::new();
    let mut r = Reader::new(bytes);
    let header = schema::read_header(&mut r, decoder.limits())?;
    let schema_start = r.index();
    Ok(Document {
      bytes,
      flags: header.flags,
      fingerprint: header.fingerprint,
      body_start: schema_start + header.schema_len,
      schema_len: header.schema_len,
    })
  }

  /// The whole document.
  pub fn bytes(&self) -> &'a [u8] { self.bytes }

  /// The reserved flags byte.
  pub fn flags(&self) -> u8 { self.flags }

  /// The schema fingerprint from the header.
  pub fn fingerprint(&self) -> u32 { self.fingerprint }

  /// The raw schema body bytes.
  pub fn schema_bytes(&self) -> &'a [u8] {
    &self.bytes[self.body_start - self.schema_len..self.body_start]
  }

  /// The value body bytes.
  pub fn body(&self) -> &'a [u8] { &self.bytes[self.body_start..] }

  /// Parses the embedded schema into a tree.
  pub fn schema(&self) -> Result<Schema, ReadError> { schema::parse_schema(self.bytes) }

  /// Decodes the document into a fresh `T` with the default limits.
  pub fn decode<T: Record>(&self) -> Result<T, ReadError> { crate::decode(self.bytes) }
}

impl fmt::Display for Document<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut printer = Printer {
      out:         String::new(),
      indent:      0,
      delta_runs:  Vec::new(),
    };
    writeln!(f, "Document ({} bytes, fingerprint {:#010x}) {{", self.bytes.len(), self.fingerprint)?;
    let walked = crate::walk(self.bytes, &mut printer);
    f.write_str(&printer.out)?;
    if let Err(e) = walked {
      writeln!(f, "  Err({e})")?;
    }
    write!(f, "}}")
  }
}

/// The walker-driven printer behind `Display`. One line per field,
/// indented by nesting level.
struct Printer {
  out:        String,
  indent:     usize,
  /// Per-open-array flag: true while inside a delta-encoded slice, with
  /// the count of elements printed so far.
  delta_runs: Vec<(bool, u64)>,
}

impl Printer {
  fn line(&mut self, text: &str) {
    for _ in 0..self.indent {
      self.out.push_str("  ");
    }
    self.out.push_str(text);
    self.out.push('\n');
  }

  fn label(name: &str) -> String {
    if name.is_empty() {
      String::new()
    } else {
      format!("{name}: ")
    }
  }

  fn render<'a>(wire_byte: u8, r: &mut Reader<'a>) -> Result<String, ReadError> {
    let base = BaseType::from_id(wire::base(wire_byte))
      .ok_or(ReadError::UnknownWireType(wire::base(wire_byte)))?;
    Ok(match base {
      BaseType::Bool => format!("{}", r.read_bool()?),
      BaseType::Int => format!("{}", r.read_isize()?),
      BaseType::Int8 => format!("{}", r.read_i8()?),
      BaseType::Int16 => format!("{}", r.read_i16()?),
      BaseType::Int32 => format!("{}", r.read_i32()?),
      BaseType::Int64 => format!("{}", r.read_i64()?),
      BaseType::Uint => format!("{}", r.read_usize()?),
      BaseType::Uint8 => format!("{}", r.read_u8()?),
      BaseType::Uint16 => format!("{}", r.read_u16()?),
      BaseType::Uint32 => format!("{}", r.read_u32()?),
      BaseType::Uint64 => format!("{}", r.read_u64()?),
      BaseType::Float32 => format!("{}", r.read_f32()?),
      BaseType::Float64 => format!("{}", r.read_f64()?),
      BaseType::Str => format!("{:?}", r.read_str()?),
      BaseType::Bytes => {
        let data = r.read_bytes()?;
        if data.len() < 32 {
          format!("{data:02x?}")
        } else {
          format!("bytes(len: {})", data.len())
        }
      }
      BaseType::Time => format!("{}", r.read_time()?),
      BaseType::Struct | BaseType::Map => {
        // Containers arrive through their own hooks, never here.
        return Err(ReadError::UnknownWireType(wire::base(wire_byte)));
      }
    })
  }
}

impl<'a> Visitor<'a> for Printer {
  fn struct_start(&mut self, name: &str) -> Result<(), ReadError> {
    if !name.is_empty() || self.indent > 0 {
      self.line(&format!("{}{{", Self::label(name)));
    }
    self.indent += 1;
    Ok(())
  }

  fn struct_end(&mut self, name: &str) -> Result<(), ReadError> {
    self.indent -= 1;
    if !name.is_empty() || self.indent > 0 {
      self.line("}");
    }
    Ok(())
  }

  fn field(&mut self, name: &str, wire_byte: u8, r: &mut Reader<'a>) -> Result<(), ReadError> {
    let text = if let Some((true, printed)) = self.delta_runs.last_mut() {
      // Inside a delta slice: element 0 uses the base encoding, the rest
      // are printed as the signed offsets they are on the wire.
      let text = if *printed == 0 {
        Printer::render(wire_byte, r)?
      } else {
        format!("{:+}", r.read_zigzag()?)
      };
      *printed += 1;
      text
    } else {
      Printer::render(wire_byte, r)?
    };
    self.line(&format!("{}{text}", Self::label(name)));
    Ok(())
  }

  fn null_field(&mut self, name: &str, _wire: u8) -> Result<(), ReadError> {
    self.line(&format!("{}null", Self::label(name)));
    Ok(())
  }

  fn array_start(&mut self, name: &str, element_wire: u8, len: u64) -> Result<(), ReadError> {
    self.delta_runs.push((wire::is_delta(element_wire), 0));
    self.line(&format!("{}[len {len}]", Self::label(name)));
    self.indent += 1;
    Ok(())
  }

  fn array_end(&mut self, _name: &str) -> Result<(), ReadError> {
    self.delta_runs.pop();
    self.indent -= 1;
    Ok(())
  }

  fn map_start(&mut self, name: &str, _key: u8, _value: u8, len: u64) -> Result<(), ReadError> {
    self.line(&format!("{}[map len {len}]", Self::label(name)));
    self.indent += 1;
    Ok(())
  }

  fn map_end(&mut self, _name: &str) -> Result<(), ReadError> {
    self.indent -= 1;
    Ok(())
  }
}
