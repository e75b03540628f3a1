use crate::error::{MuxError, Result};
use bytes::{BufMut, BytesMut};

/// A bit-level writer producing big-endian (MSB first) bit fields.
///
/// Used for the fields of the MPEG-4 SL header and other syntax elements
/// that are not byte aligned.
///
/// Example:
/// ```
/// use tsmux::utils::BitWriter;
///
/// let mut writer = BitWriter::new();
/// writer.write_bit(true);
/// writer.write_bits(0b011, 3);
/// writer.align_byte();
/// assert_eq!(&writer.finish()[..], &[0b1011_0000]);
/// ```
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: BytesMut,
    current: u8,
    used: u8,
}

impl BitWriter {
    /// Creates an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single bit
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current |= 0x80 >> self.used;
        }
        self.used += 1;
        if self.used == 8 {
            self.buf.put_u8(self.current);
            self.current = 0;
            self.used = 0;
        }
    }

    /// Appends the `n` low-order bits of `value`, most significant first.
    /// `n` is clamped to 64.
    pub fn write_bits(&mut self, value: u64, n: u32) {
        let n = n.min(64);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_byte(&mut self) {
        while self.used != 0 {
            self.write_bit(false);
        }
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8 + self.used as usize
    }

    /// Aligns and returns the written bytes
    pub fn finish(mut self) -> BytesMut {
        self.align_byte();
        self.buf
    }
}

/// A bit-level reader, the counterpart of [`BitWriter`].
///
/// Example:
/// ```
/// use tsmux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit. Returns error if end of data is reached.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(MuxError::InvalidData("reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits (at most 64) as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(MuxError::InvalidData("too many bits requested".into()));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value)
    }

    /// Skips to the next byte boundary
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Byte position of the reader, rounded down
    pub fn position(&self) -> usize {
        self.byte_offset
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len().saturating_sub(self.byte_offset)) * 8 - self.bit_offset as usize
    }
}
