//! Glint is a self-describing binary serialization format. A document
//! carries its own schema in a header, followed by a body containing only
//! the field values in schema order. Compared with JSON it trades human
//! readability for much smaller payloads on structured data, strict type
//! information, and a cacheable schema fingerprint that lets a reader
//! compile a specialized decoder once and reuse it for every document of
//! the same shape.
//!
//! # Document layout
//!
//! 1. One reserved flags byte (written as `0`, any value tolerated on
//!    read).
//! 2. A 4 byte little-endian schema fingerprint: the CRC-32 of the schema
//!    body. A cache key, not a security digest.
//! 3. An unsigned varint schema length.
//! 4. The schema body: one descriptor per field, in declared order. A
//!    descriptor is a wire byte, a name length byte, the UTF-8 name, and
//!    type-specific extras (see [`schema`]).
//! 5. The value body: the field values in schema order, nothing else.
//!
//! Varints are the usual little-endian 7-bits-per-byte with MSB
//! continuation; a decoder rejects varints longer than 10 bytes. Signed
//! values are zigzag encoded (except `i64`, which writes its
//! two's-complement bits directly so delta sequences of timestamps stay
//! compact).
//!
//! # Usage
//!
//! Shapes derive [`Glint`]; encoding and decoding are free functions:
//!
//! ```ignore
//! #[derive(Debug, Default, PartialEq, Glint)]
//! struct Player {
//!   name:  String,
//!   score: i64,
//! }
//!
//! let bytes = glint::encode(&Player { name: "Alice".into(), score: 30 });
//! let back: Player = glint::decode(&bytes)?;
//! ```
//!
//! A decoder matches inbound fields to target fields *by name*: inbound
//! fields the target does not declare are skipped byte-exactly, target
//! fields the document does not carry keep their `Default` values, and
//! reordered fields land where they should. The per-fingerprint compiled
//! instruction lists making that cheap live in [`decode`](mod@decode).

#[macro_use]
extern crate log;

pub mod buffer;
pub mod decode;
pub mod document;
pub mod encode;
mod generics;
pub mod read;
pub mod schema;
pub mod walk;
pub mod wire;

pub use buffer::Buffer;
pub use decode::{decode, decode_into, DecodeState, Decoder, Limits, ValueRead};
pub use document::Document;
pub use encode::{encode, encode_into, schema_of, CachedSchema, ValueWrite};
pub use generics::{Bytes, DeltaElement, Element, MapKey, MapValue};
pub use glint_macros::Glint;
pub use read::{LimitKind, ReadError, Reader};
pub use schema::{
  are_schemas_compatible, parse_schema, schema_fingerprint, Report, Schema, SchemaField,
};
pub use walk::{walk, Visitor};

/// A struct shape that can be encoded as a document and decoded from one.
/// Implemented by `#[derive(Glint)]`; the methods form the field table the
/// decoder compiles its instruction lists against.
///
/// `Default` supplies the values for fields an inbound document does not
/// carry. `'static` is required because compiled decoders are cached per
/// `TypeId`.
pub trait Record: Default + 'static {
  /// Appends this shape's field descriptors, in declared order, to a
  /// schema body.
  fn append_schema(out: &mut Vec<u8>);

  /// Writes the field values in declared order.
  fn write_body(&self, buf: &mut Buffer);

  /// The index of the declared field with this name.
  fn field_index(name: &str) -> Option<usize>;

  /// The wire byte of the declared field at this index.
  fn field_wire(index: usize) -> u8;

  /// Reads one inbound field into the declared field at this index. The
  /// inbound descriptor governs the layout.
  fn read_field(
    &mut self,
    index: usize,
    field: &SchemaField,
    r: &mut Reader<'_>,
    st: &mut DecodeState,
  ) -> Result<(), ReadError>;
}

/// Encodes the number using zig zag encoding. See the [trait](ZigZag) docs
/// for more.
#[inline(always)]
pub fn zig<Z>(num: Z) -> Z::Unsigned
where
  Z: ZigZag,
{
  ZigZag::zig(num)
}

/// Decodes the number using zig zag encoding. See the [trait](ZigZag) docs
/// for more.
#[inline(always)]
pub fn zag<Z>(num: Z::Unsigned) -> Z
where
  Z: ZigZag,
{
  ZigZag::zag(num)
}

/// Zig-zag encoding maps signed values onto unsigned ones so that small
/// magnitudes of either sign produce small varints:
///
/// Original | Encoded
/// ---------|--------
/// 0        | 0
/// -1       | 1
/// 1        | 2
/// -2       | 3
///
/// The value is doubled and xored with its sign-fill: `(n << 1) ^ (n >>
/// 63)` for an `i64`. Decoding is `(n >> 1) ^ -(n & 1)`.
pub trait ZigZag {
  /// The unsigned version of this number (`u64` if Self is `i64`, etc).
  type Unsigned;

  /// Encodes the number using zig zag encoding.
  fn zig(n: Self) -> Self::Unsigned;
  /// Decodes the number using zig zag encoding.
  fn zag(n: Self::Unsigned) -> Self;
}

impl ZigZag for i16 {
  type Unsigned = u16;

  #[inline(always)]
  fn zig(n: i16) -> u16 { ((n << 1) ^ (n >> 15)) as u16 }
  #[inline(always)]
  fn zag(n: u16) -> i16 { (n >> 1) as i16 ^ -((n & 1) as i16) }
}

impl ZigZag for i32 {
  type Unsigned = u32;

  #[inline(always)]
  fn zig(n: i32) -> u32 { ((n << 1) ^ (n >> 31)) as u32 }
  #[inline(always)]
  fn zag(n: u32) -> i32 { (n >> 1) as i32 ^ -((n & 1) as i32) }
}

impl ZigZag for i64 {
  type Unsigned = u64;

  #[inline(always)]
  fn zig(n: i64) -> u64 { ((n << 1) ^ (n >> 63)) as u64 }
  #[inline(always)]
  fn zag(n: u64) -> i64 { (n >> 1) as i64 ^ -((n & 1) as i64) }
}
