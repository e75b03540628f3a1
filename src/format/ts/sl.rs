//! MPEG-4 Synchronization Layer headers (ISO/IEC 14496-1 §10.2) for
//! MPEG-4 systems streams carried in PES or in sections.

use crate::utils::BitWriter;
use bytes::BytesMut;
use serde::Deserialize;

/// Which optional SL header fields a stream signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlConfig {
    pub use_access_unit_start: bool,
    pub use_access_unit_end: bool,
    pub use_random_access_point: bool,
    pub use_timestamps: bool,
    /// Ticks per second of the SL timestamps
    pub timestamp_resolution: u32,
    /// Bits used for each timestamp, at most 64
    pub timestamp_length: u8,
    /// Bits of the accessUnitLength field, 0 when absent
    pub au_length_length: u8,
    /// Bits of the packetSequenceNumber field, 0 when absent
    pub packet_seq_num_length: u8,
}

impl Default for SlConfig {
    fn default() -> Self {
        Self {
            use_access_unit_start: true,
            use_access_unit_end: true,
            use_random_access_point: true,
            use_timestamps: true,
            timestamp_resolution: 1000,
            timestamp_length: 33,
            au_length_length: 0,
            packet_seq_num_length: 0,
        }
    }
}

/// Per-packet SL header values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlHeader {
    pub access_unit_start: bool,
    pub access_unit_end: bool,
    pub random_access_point: bool,
    pub packet_sequence_number: u32,
    pub decoding_time_stamp: Option<u64>,
    pub composition_time_stamp: Option<u64>,
    pub access_unit_length: u32,
}

impl SlHeader {
    /// Encodes the header for `config`, padded to a byte boundary.
    pub fn write(&self, config: &SlConfig) -> BytesMut {
        let mut w = BitWriter::new();
        if config.use_access_unit_start {
            w.write_bit(self.access_unit_start);
        }
        if config.use_access_unit_end {
            w.write_bit(self.access_unit_end);
        }
        if config.packet_seq_num_length > 0 {
            w.write_bits(
                self.packet_sequence_number as u64,
                config.packet_seq_num_length as u32,
            );
        }
        // fields below only follow the first packet of an access unit
        let au_start = self.access_unit_start || !config.use_access_unit_start;
        if au_start {
            if config.use_random_access_point {
                w.write_bit(self.random_access_point);
            }
            let ts_len = config.timestamp_length.min(64) as u32;
            if config.use_timestamps {
                w.write_bit(self.decoding_time_stamp.is_some());
                w.write_bit(self.composition_time_stamp.is_some());
                if let Some(dts) = self.decoding_time_stamp {
                    w.write_bits(dts, ts_len);
                }
                if let Some(cts) = self.composition_time_stamp {
                    w.write_bits(cts, ts_len);
                }
            }
            if config.au_length_length > 0 {
                w.write_bits(
                    self.access_unit_length as u64,
                    config.au_length_length as u32,
                );
            }
        }
        w.finish()
    }

    /// Encoded size in bytes without building the header
    pub fn size(&self, config: &SlConfig) -> usize {
        let mut bits = config.use_access_unit_start as usize
            + config.use_access_unit_end as usize
            + config.packet_seq_num_length as usize;
        if self.access_unit_start || !config.use_access_unit_start {
            bits += config.use_random_access_point as usize;
            if config.use_timestamps {
                let ts_len = config.timestamp_length.min(64) as usize;
                bits += 2;
                bits += ts_len * self.decoding_time_stamp.is_some() as usize;
                bits += ts_len * self.composition_time_stamp.is_some() as usize;
            }
            bits += config.au_length_length as usize;
        }
        bits.div_ceil(8)
    }
}
