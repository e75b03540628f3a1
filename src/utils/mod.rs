//! # Utility Functions and Types
//!
//! Bit-level writing/reading and the MPEG-2 CRC32 used to seal sections.
//!
//! ```rust
//! use tsmux::utils::{BitWriter, Crc32Mpeg2};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b101, 3);
//! let bytes = writer.finish();
//! let crc = Crc32Mpeg2::new().calculate(&bytes);
//! println!("CRC32: {:08x}", crc);
//! ```

/// Bit manipulation utilities
pub mod bits;

/// CRC calculation
pub mod crc;

pub use bits::{BitReader, BitWriter};
pub use crc::Crc32Mpeg2;
