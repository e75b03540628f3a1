//! PAT and PMT table bodies. Section framing is left to
//! [`build_sections`](super::section::build_sections).

use super::types::*;
use bytes::{BufMut, BytesMut};

/// What the PMT announces for one elementary stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtEntry {
    /// stream_type as chosen for the codec, before any private rewrite
    pub stream_type: u8,
    pub pid: u16,
    /// MPEG-4 ES_ID, announced through an SL descriptor when set
    pub es_id: Option<u16>,
    /// ISO 639-2 language code
    pub language: Option<[u8; 3]>,
    pub descriptors: Vec<Descriptor>,
}

impl PmtEntry {
    pub fn new(stream_type: u8, pid: u16) -> Self {
        Self {
            stream_type,
            pid,
            es_id: None,
            language: None,
            descriptors: Vec::new(),
        }
    }

    /// stream_type as written in the PMT
    pub fn signaled_stream_type(&self) -> u8 {
        match self.stream_type {
            STREAM_TYPE_AC3 | STREAM_TYPE_VC1 | STREAM_TYPE_EAC3 => STREAM_TYPE_PRIVATE_DATA,
            other => other,
        }
    }

    /// All ES-level descriptors in the order they are written
    pub fn es_descriptors(&self) -> Vec<Descriptor> {
        let mut out = Vec::new();
        if let Some(es_id) = self.es_id {
            out.push(Descriptor::new(DESC_MPEG4_SL, es_id.to_be_bytes()));
        }
        if let Some(lang) = self.language {
            if &lang != b"und" {
                out.push(Descriptor::new(DESC_ISO_639_LANGUAGE, lang));
            }
        }
        match self.stream_type {
            STREAM_TYPE_AC3 => out.push(Descriptor::new(DESC_REGISTRATION, *b"AC-3")),
            STREAM_TYPE_VC1 => out.push(Descriptor::new(DESC_REGISTRATION, *b"VC-1")),
            STREAM_TYPE_EAC3 => out.push(Descriptor::new(DESC_DVB_EAC3, Vec::<u8>::new())),
            _ => {}
        }
        out.extend(self.descriptors.iter().cloned());
        out
    }
}

/// Program loop of a PAT: (program_number, PMT PID) pairs
pub fn pat_payload(programs: &[(u16, u16)]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(programs.len() * 4);
    for &(number, pmt_pid) in programs {
        buf.put_u16(number);
        buf.put_u16(0xe000 | (pmt_pid & 0x1fff));
    }
    buf
}

/// Builds the IOD descriptor wrapping an encoded InitialObjectDescriptor
pub fn iod_descriptor(iod: &[u8]) -> Descriptor {
    let mut data = Vec::with_capacity(iod.len() + 2);
    // Scope_of_IOD_label and IOD_label
    data.push(2);
    data.push(2);
    data.extend_from_slice(iod);
    Descriptor::new(DESC_MPEG4_IOD, data)
}

/// PMT body: PCR_PID, program descriptors and the ES loop
pub fn pmt_payload(
    pcr_pid: u16,
    program_descriptors: &[Descriptor],
    entries: &[PmtEntry],
) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u16(0xe000 | (pcr_pid & 0x1fff));

    let info_length: usize = program_descriptors.iter().map(|d| d.len()).sum();
    buf.put_u16(0xf000 | (info_length as u16 & 0x0fff));
    for desc in program_descriptors {
        desc.write_to(&mut buf);
    }

    for entry in entries {
        let descriptors = entry.es_descriptors();
        let es_info_length: usize = descriptors.iter().map(|d| d.len()).sum();
        buf.put_u8(entry.signaled_stream_type());
        buf.put_u16(0xe000 | (entry.pid & 0x1fff));
        buf.put_u16(0xf000 | (es_info_length as u16 & 0x0fff));
        for desc in &descriptors {
            desc.write_to(&mut buf);
        }
    }
    buf
}
