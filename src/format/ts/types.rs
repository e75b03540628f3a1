use crate::av::CodecType;
use crate::error::{MuxError, Result};
use bytes::{BufMut, BytesMut};
use std::time::Duration;

// Stream IDs
pub const STREAM_ID_VIDEO: u8 = 0xe0;
pub const STREAM_ID_AUDIO: u8 = 0xc0;
pub const STREAM_ID_PRIVATE_1: u8 = 0xbd;
pub const STREAM_ID_SL_PACKETIZED: u8 = 0xfa;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1fff;
pub const PID_MIN_ASSIGNABLE: u16 = 0x0010;
pub const PID_MAX_ASSIGNABLE: u16 = 0x1ffe;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_MPEG4_BIFS: u8 = 0x04;
pub const TABLE_ID_MPEG4_OD: u8 = 0x05;

// Descriptor tags
pub const DESC_REGISTRATION: u8 = 0x05;
pub const DESC_ISO_639_LANGUAGE: u8 = 0x0a;
pub const DESC_MPEG4_SL: u8 = 0x1e;
pub const DESC_MPEG4_IOD: u8 = 0x1d;
pub const DESC_DVB_EAC3: u8 = 0x7a;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG1_VIDEO: u8 = 0x01;
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_PRIVATE_DATA: u8 = 0x06;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_MPEG4_VISUAL: u8 = 0x10;
pub const STREAM_TYPE_MPEG4_SL_PES: u8 = 0x12;
pub const STREAM_TYPE_MPEG4_SL_SECTIONS: u8 = 0x13;
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_SVC: u8 = 0x1f;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_SHVC: u8 = 0x28;
pub const STREAM_TYPE_AC3: u8 = 0x81;
pub const STREAM_TYPE_EAC3: u8 = 0x87;
pub const STREAM_TYPE_VC1: u8 = 0xea;

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
pub const TS_PACKET_BITS: u64 = (TS_PACKET_SIZE * 8) as u64;
pub const SYNC_BYTE: u8 = 0x47;
/// adaptation_field_length byte + flags byte
pub const ADAPTATION_HEADER_SIZE: usize = 2;
pub const PCR_FIELD_SIZE: usize = 6;
pub const PTS_HZ: u64 = 90_000;
pub const PCR_HZ: u64 = 27_000_000;
/// PCR_base wraps at 2^33, so the full 27 MHz clock wraps at 2^33 * 300
pub const PCR_WRAP: u64 = (1u64 << 33) * 300;
pub const TIMESTAMP_MASK: u64 = 0x1_ffff_ffff;

/// Maps a codec to its ISO/IEC 13818-1 stream_type
pub fn stream_type_for(codec: CodecType) -> u8 {
    match codec {
        CodecType::H264 => STREAM_TYPE_H264,
        CodecType::Svc => STREAM_TYPE_SVC,
        CodecType::H265 => STREAM_TYPE_H265,
        CodecType::Shvc => STREAM_TYPE_SHVC,
        CodecType::Mpeg4Visual => STREAM_TYPE_MPEG4_VISUAL,
        CodecType::Mpeg1Video => STREAM_TYPE_MPEG1_VIDEO,
        CodecType::Mpeg2Video => STREAM_TYPE_MPEG2_VIDEO,
        CodecType::Vc1 => STREAM_TYPE_VC1,
        CodecType::Jpeg | CodecType::Png => STREAM_TYPE_MPEG4_SL_PES,
        CodecType::Aac => STREAM_TYPE_AAC,
        CodecType::Mpeg1Audio => STREAM_TYPE_MPEG1_AUDIO,
        CodecType::Mpeg2Audio => STREAM_TYPE_MPEG2_AUDIO,
        CodecType::Ac3 => STREAM_TYPE_AC3,
        CodecType::Eac3 => STREAM_TYPE_EAC3,
        CodecType::Mpeg4Systems => STREAM_TYPE_MPEG4_SL_SECTIONS,
        CodecType::Private => STREAM_TYPE_PRIVATE_DATA,
    }
}

/// A tag/length/value descriptor carried in a PMT loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

impl Descriptor {
    pub fn new(tag: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        2 + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tag);
        buf.put_u8(self.data.len() as u8);
        buf.put_slice(&self.data);
    }
}

/// Parsed view of an adaptation field
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr_flag: bool,
    pub opcr_flag: bool,
    pub splicing_point_flag: bool,
    pub private_data_flag: bool,
    pub extension_flag: bool,
    /// Full 27 MHz value (base * 300 + extension)
    pub pcr: Option<u64>,
    pub stuffing: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            sync_byte: SYNC_BYTE,
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl TSHeader {
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.sync_byte);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let mut b3 = (self.scrambling_control & 0x03) << 6;
        if self.adaptation_field_exists {
            b3 |= 0x20;
        }
        if self.contains_payload {
            b3 |= 0x10;
        }
        b3 |= self.continuity_counter & 0x0f;
        buf.put_u8(b3);
    }
}

/// What the adaptation field of an outgoing packet has to carry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationRequest {
    pub pcr: Option<u64>,
    pub random_access: bool,
    pub discontinuity: bool,
}

impl AdaptationRequest {
    /// Bytes the adaptation field occupies before any stuffing
    pub fn min_size(&self) -> usize {
        if self.pcr.is_some() {
            ADAPTATION_HEADER_SIZE + PCR_FIELD_SIZE
        } else if self.random_access || self.discontinuity {
            ADAPTATION_HEADER_SIZE
        } else {
            0
        }
    }
}

/// Serializes one complete 188-byte transport packet.
///
/// The adaptation field is sized so that header, adaptation field and
/// payload add up to exactly [`TS_PACKET_SIZE`], stuffing with 0xFF inside
/// the adaptation field when the payload is short. An empty payload produces
/// an adaptation-field-only packet. Returns the number of stuffing bytes.
///
/// Fails without writing anything when `payload` does not fit next to the
/// requested adaptation field.
pub fn write_packet(
    buf: &mut BytesMut,
    mut header: TSHeader,
    adaptation: AdaptationRequest,
    payload: &[u8],
) -> Result<usize> {
    let room = TS_PAYLOAD_SIZE - adaptation.min_size();
    if payload.len() > room {
        return Err(MuxError::InvalidData(format!(
            "PID {}: {} payload bytes do not fit in {} bytes of room",
            header.pid,
            payload.len(),
            room
        )));
    }
    let start = buf.len();

    header.contains_payload = !payload.is_empty();
    let af_total = TS_PAYLOAD_SIZE - payload.len();
    header.adaptation_field_exists = af_total > 0;
    header.write_to(buf);

    let mut stuffing = 0;
    if af_total == 1 {
        // adaptation_field_length = 0 is a single stuffing byte
        buf.put_u8(0);
        stuffing = 1;
    } else if af_total > 1 {
        buf.put_u8((af_total - 1) as u8);
        let mut flags = 0u8;
        if adaptation.discontinuity {
            flags |= 0x80;
        }
        if adaptation.random_access {
            flags |= 0x40;
        }
        if adaptation.pcr.is_some() {
            flags |= 0x10;
        }
        buf.put_u8(flags);
        let mut used = ADAPTATION_HEADER_SIZE;
        if let Some(pcr) = adaptation.pcr {
            write_pcr(buf, pcr);
            used += PCR_FIELD_SIZE;
        }
        stuffing = af_total - used;
        buf.put_bytes(0xff, stuffing);
    }

    buf.put_slice(payload);
    debug_assert_eq!(buf.len() - start, TS_PACKET_SIZE);
    Ok(stuffing)
}

/// Writes the 48-bit PCR field: 33-bit base, 6 reserved bits, 9-bit extension.
pub fn write_pcr(buf: &mut BytesMut, pcr: u64) {
    let pcr = pcr % PCR_WRAP;
    let base = pcr / 300;
    let ext = pcr % 300;
    let field = (base << 15) | (0x3f << 9) | ext;
    buf.put_u16((field >> 32) as u16);
    buf.put_u32(field as u32);
}

/// Decodes a 6-byte PCR field into the 27 MHz value
pub fn read_pcr(data: &[u8]) -> u64 {
    let base = ((data[0] as u64) << 25)
        | ((data[1] as u64) << 17)
        | ((data[2] as u64) << 9)
        | ((data[3] as u64) << 1)
        | ((data[4] as u64) >> 7);
    let ext = (((data[4] & 0x01) as u64) << 8) | data[5] as u64;
    base * 300 + ext
}

/// Forward distance between two PCR values, honoring the 2^33 wraparound
pub fn pcr_delta(from: u64, to: u64) -> u64 {
    (to + PCR_WRAP - from % PCR_WRAP) % PCR_WRAP
}

pub fn pcr_to_time(pcr: u64) -> Duration {
    Duration::from_nanos(((pcr as u128) * 1_000_000_000 / PCR_HZ as u128) as u64)
}

pub fn time_to_pcr(time: Duration) -> u64 {
    (time.as_nanos() * PCR_HZ as u128 / 1_000_000_000) as u64
}

pub fn pts_to_time(pts: u64) -> Duration {
    Duration::from_nanos(((pts as u128) * 1_000_000_000 / PTS_HZ as u128) as u64)
}

pub fn time_to_pts(time: Duration) -> u64 {
    (time.as_nanos() * PTS_HZ as u128 / 1_000_000_000) as u64
}
