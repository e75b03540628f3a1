use super::types::TIMESTAMP_MASK;
use crate::error::{MuxError, Result};
use bytes::{BufMut, BytesMut};

/// Size of the PES header up to and including `PES_header_data_length`
pub const PES_FIXED_HEADER_SIZE: usize = 9;
/// Size of one encoded PTS or DTS field
pub const PES_TIMESTAMP_SIZE: usize = 5;
/// Largest value `PES_packet_length` can signal
pub const PES_MAX_PACKET_LENGTH: usize = 0xffff;

/// Packetized Elementary Stream (PES) header structure
///
/// Timestamps are 33-bit values on the 90 kHz clock. Only the fields the
/// multiplexer actually signals are modeled; the optional ESCR, ES rate,
/// trick mode, CRC and extension fields are always absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Bytes following the `PES_packet_length` field, 0 when unbounded
    pub packet_length: u16,
    /// Set when the PES payload starts with an access unit
    pub data_alignment: bool,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits), only written alongside a PTS
    pub dts: Option<u64>,
}

impl PESHeader {
    /// Creates a new PES header with a specific stream ID.
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            packet_length: 0,
            data_alignment: false,
            pts: None,
            dts: None,
        }
    }

    /// Sets the Presentation Time Stamp, in 90 kHz ticks.
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts & TIMESTAMP_MASK);
        self
    }

    /// Sets the Decoding Time Stamp, in 90 kHz ticks.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts & TIMESTAMP_MASK);
        self
    }

    pub fn with_alignment(mut self, data_alignment: bool) -> Self {
        self.data_alignment = data_alignment;
        self
    }

    /// Derives `PES_packet_length` from the payload size that follows this
    /// header. Lengths that do not fit in 16 bits are signaled as 0.
    pub fn with_payload_len(mut self, payload_len: usize) -> Self {
        let len = self.len() - 6 + payload_len;
        self.packet_length = if len > PES_MAX_PACKET_LENGTH {
            0
        } else {
            len as u16
        };
        self
    }

    /// Value of the 2-bit `PTS_DTS_flags` field
    pub fn pts_dts_flags(&self) -> u8 {
        match (self.pts, self.dts) {
            (Some(_), Some(_)) => 0b11,
            (Some(_), None) => 0b10,
            _ => 0b00,
        }
    }

    /// Bytes of optional fields following `PES_header_data_length`
    pub fn header_data_length(&self) -> usize {
        match self.pts_dts_flags() {
            0b11 => 2 * PES_TIMESTAMP_SIZE,
            0b10 => PES_TIMESTAMP_SIZE,
            _ => 0,
        }
    }

    /// Total encoded header size in bytes
    pub fn len(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_length()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Writes the PES header to a BytesMut buffer.
    ///
    /// This method encodes all header fields into the buffer according to MPEG-TS PES syntax.
    pub fn write_to(&self, buf: &mut BytesMut) {
        // Start code prefix
        buf.put_slice(&[0x00, 0x00, 0x01]);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        // '10' marker, no scrambling, no priority
        let mut flags = 0x80u8;
        if self.data_alignment {
            flags |= 0x04;
        }
        buf.put_u8(flags);
        buf.put_u8(self.pts_dts_flags() << 6);
        buf.put_u8(self.header_data_length() as u8);

        match (self.pts, self.dts) {
            (Some(pts), Some(dts)) => {
                write_timestamp(buf, 0x30, pts);
                write_timestamp(buf, 0x10, dts);
            }
            (Some(pts), None) => write_timestamp(buf, 0x20, pts),
            _ => {}
        }
    }

    /// Parses a PES header, returning it together with its encoded size.
    pub fn parse(data: &[u8]) -> Result<(PESHeader, usize)> {
        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err(MuxError::InvalidData("PES header too short".into()));
        }
        if data[0..3] != [0x00, 0x00, 0x01] {
            return Err(MuxError::InvalidData("Invalid PES start code".into()));
        }
        let header_len = PES_FIXED_HEADER_SIZE + data[8] as usize;
        if data.len() < header_len {
            return Err(MuxError::InvalidData("PES header data too short".into()));
        }

        let mut header = PESHeader::new(data[3]);
        header.packet_length = u16::from_be_bytes([data[4], data[5]]);
        header.data_alignment = data[6] & 0x04 != 0;
        let flags = data[7] >> 6;
        if flags & 0b10 != 0 {
            header.pts = Some(read_timestamp(&data[9..14]));
        }
        if flags == 0b11 {
            header.dts = Some(read_timestamp(&data[14..19]));
        }
        Ok((header, header_len))
    }
}

/// Helper function to write PTS/DTS timestamps to a buffer.
fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & TIMESTAMP_MASK;

    // First byte: marker bits and 3 MSB of timestamp
    buf.put_u8(marker | ((ts >> 29) & 0x0e) as u8 | 0x01);

    // Middle 15 bits and marker
    buf.put_u16((((ts >> 14) & 0xfffe) | 0x01) as u16);

    // Final 15 bits and marker
    buf.put_u16((((ts << 1) & 0xfffe) | 0x01) as u16);
}

fn read_timestamp(data: &[u8]) -> u64 {
    (((data[0] >> 1) & 0x07) as u64) << 30
        | ((u16::from_be_bytes([data[1], data[2]]) >> 1) as u64) << 15
        | (u16::from_be_bytes([data[3], data[4]]) >> 1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pes_header_with_pts_only() {
        let header = PESHeader::new(0xe0)
            .with_pts(90_000)
            .with_alignment(true)
            .with_payload_len(100);
        assert_eq!(header.len(), 14);
        assert_eq!(header.packet_length, 108);

        let mut buf = BytesMut::new();
        header.write_to(&mut buf);
        assert_eq!(
            &buf[..],
            &[0x00, 0x00, 0x01, 0xe0, 0x00, 0x6c, 0x84, 0x80, 0x05, 0x21, 0x00, 0x05, 0xbf, 0x21]
        );
    }

    #[test]
    fn test_pes_header_parse_back() {
        let header = PESHeader::new(0xc0)
            .with_pts(0x1_2345_6789)
            .with_dts(0x1_2345_0000)
            .with_payload_len(10);
        let mut buf = BytesMut::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), 19);

        let (parsed, size) = PESHeader::parse(&buf).unwrap();
        assert_eq!(size, 19);
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_unbounded_packet_length() {
        let header = PESHeader::new(0xe0).with_pts(0).with_payload_len(70_000);
        assert_eq!(header.packet_length, 0);
    }

    #[test]
    fn test_parse_rejects_bad_start_code() {
        let data = [0x00, 0x00, 0x02, 0xe0, 0, 0, 0x80, 0, 0];
        assert!(PESHeader::parse(&data).is_err());
    }
}
