use std::{convert::TryInto, mem::size_of};

use bit_vec::BitVec;

pub trait Encodeable {
    fn to_bytes(&self) -> Vec<u8>;
}

pub trait Decodeable {
    fn read_from<R: std::io::Read>(reader: &mut R) -> Self;
}

pub fn read_exact<R: std::io::Read>(reader: &mut R, bytes_count: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; bytes_count];
    reader
        .read_exact(&mut buffer)
        .unwrap_or_else(|e| panic!("io error, expect {} bytes: {}", bytes_count, e));
    buffer
}

/// An in-memory byte sink used to assemble page images.
pub struct PageWriter {
    buf: Vec<u8>,
}

impl PageWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) {
        self.buf.extend_from_slice(obj.to_bytes().as_slice());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Consume the writer, padding the image with zeroes up to `size`.
    /// Panics if the content is already larger, since that means the page
    /// arithmetic is broken.
    pub fn to_padded_bytes(&self, size: usize) -> Vec<u8> {
        let mut buf = self.buf.clone();
        if buf.len() > size {
            panic!(
                "page image larger than the page: {} > {}",
                buf.len(),
                size
            );
        }
        buf.resize(size, 0);
        buf
    }
}

macro_rules! impl_serialization {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn to_bytes(&self) -> Vec<u8> {
                    self.to_be_bytes().to_vec()
                }
            }

            impl Decodeable for $t {
                fn read_from<R: std::io::Read>(reader: &mut R) -> Self {
                    let bytes = read_exact(reader, size_of::<Self>());
                    Self::from_be_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_serialization!(for u8, u16, u32, u64, i8, i16, i32, i64);

/// Encode a slot bitmap into `bytes_count` bytes, bit `i` of the map going
/// to bit `i % 8` (LSB first) of byte `i / 8`.
pub fn encode_bitmap(bits: &BitVec, bytes_count: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; bytes_count];
    for i in 0..bits.len() {
        if bits[i] {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Inverse of `encode_bitmap`.
pub fn decode_bitmap(bytes: &[u8], bits_count: usize) -> BitVec {
    let mut bits = BitVec::from_elem(bits_count, false);
    for i in 0..bits_count {
        if bytes[i / 8] & (1 << (i % 8)) != 0 {
            bits.set(i, true);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_round_trip() {
        let mut bits = BitVec::from_elem(11, false);
        bits.set(0, true);
        bits.set(7, true);
        bits.set(8, true);
        bits.set(10, true);

        let bytes = encode_bitmap(&bits, 2);
        assert_eq!(bytes, vec![0b1000_0001, 0b0000_0101]);

        let decoded = decode_bitmap(&bytes, 11);
        assert_eq!(bits, decoded);
    }

    #[test]
    fn test_int_round_trip() {
        let v: i32 = -77;
        let bytes = v.to_bytes();
        let mut reader = std::io::Cursor::new(bytes);
        assert_eq!(v, i32::read_from(&mut reader));
    }
}
