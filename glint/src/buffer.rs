//! The byte sink used by the encoder. A [`Buffer`] is an append-only wrapper
//! around a `Vec<u8>` with the varint/zigzag/float-bit appends the wire
//! format needs, plus a process-wide pool so encode-heavy callers can avoid
//! a fresh allocation per document.

use crate::zig;
use parking_lot::Mutex;

/// Buffers handed back to the pool beyond this count are dropped instead.
const MAX_POOLED: usize = 16;

static POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());

/// Appends an unsigned varint to a plain byte vector. Little-endian, 7 bits
/// per byte, MSB continuation. A `u64` never needs more than 10 bytes.
pub fn put_varint(out: &mut Vec<u8>, mut v: u64) {
  while v >= 0x80 {
    out.push(v as u8 | 0x80);
    v >>= 7;
  }
  out.push(v as u8);
}

/// An append-only growable byte sink with position tracking.
///
/// Correctness never depends on which buffer a caller receives from the
/// pool; reuse is purely an allocator optimization.
#[derive(Debug, Default)]
pub struct Buffer {
  data: Vec<u8>,
}

impl Buffer {
  /// Creates an empty buffer.
  pub fn new() -> Buffer { Buffer { data: Vec::new() } }

  /// Creates a buffer with the given capacity.
  pub fn with_capacity(cap: usize) -> Buffer { Buffer { data: Vec::with_capacity(cap) } }

  /// Takes a cleared buffer from the process-wide pool, or creates a new one
  /// if the pool is empty.
  pub fn from_pool() -> Buffer {
    match POOL.lock().pop() {
      Some(data) => {
        trace!("reusing pooled buffer ({} bytes capacity)", data.capacity());
        Buffer { data }
      }
      None => Buffer::new(),
    }
  }

  /// Releases this buffer back to the process-wide pool. The contents are
  /// cleared; the capacity is retained for the next caller.
  pub fn return_to_pool(mut self) {
    self.data.clear();
    let mut pool = POOL.lock();
    if pool.len() < MAX_POOLED {
      pool.push(self.data);
    }
  }

  /// Clears the length but retains capacity.
  pub fn reset(&mut self) { self.data.clear() }

  /// Number of bytes written so far.
  pub fn len(&self) -> usize { self.data.len() }

  /// Returns true if nothing has been written.
  pub fn is_empty(&self) -> bool { self.data.is_empty() }

  /// A view of the bytes written so far.
  pub fn bytes(&self) -> &[u8] { &self.data }

  /// Transfers ownership of the written bytes out of the buffer.
  pub fn take(self) -> Vec<u8> { self.data }

  /// Appends a single byte.
  #[inline(always)]
  pub fn push(&mut self, b: u8) { self.data.push(b) }

  /// Appends a byte slice.
  #[inline(always)]
  pub fn extend_from_slice(&mut self, bytes: &[u8]) { self.data.extend_from_slice(bytes) }

  /// Appends an unsigned varint.
  #[inline]
  pub fn put_varint(&mut self, v: u64) { put_varint(&mut self.data, v) }

  /// Appends a signed value as a zigzag varint, so small magnitudes of
  /// either sign stay compact.
  #[inline]
  pub fn put_zigzag(&mut self, v: i64) { self.put_varint(zig(v)) }

  /// Appends a float as a varint of its IEEE-754 bit pattern.
  pub fn put_f32(&mut self, v: f32) { self.put_varint(v.to_bits() as u64) }

  /// Appends a double as a varint of its IEEE-754 bit pattern.
  pub fn put_f64(&mut self, v: f64) { self.put_varint(v.to_bits()) }
}
