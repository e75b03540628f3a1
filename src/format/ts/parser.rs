use super::types::*;
use crate::error::{MuxError, Result};
use crate::utils::Crc32Mpeg2;

/// A transport packet split into its parts
#[derive(Debug, Clone)]
pub struct ParsedPacket<'a> {
    pub header: TSHeader,
    pub adaptation: Option<AdaptationField>,
    pub payload: &'a [u8],
}

/// Generic PSI section header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub table_id: u8,
    pub syntax_indicator: bool,
    pub private_indicator: bool,
    pub section_length: usize,
    pub table_id_extension: u16,
    pub version: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub version: u8,
    pub entries: Vec<PatEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    pub program_number: u16,
    pub version: u8,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub streams: Vec<PmtStreamInfo>,
}

/// Reads back transport packets and the PSI sections they carry.
///
/// The multiplexer itself never parses; this is the inspection side used
/// to check its output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TsPacketParser;

impl TsPacketParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(MuxError::InvalidData("TS packet too short".into()));
        }

        if data[0] != SYNC_BYTE {
            return Err(MuxError::InvalidData("Invalid sync byte".into()));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Parses the adaptation field starting at `offset`, if the header
    /// announces one.
    pub fn parse_adaptation_field(
        &self,
        data: &[u8],
        offset: usize,
    ) -> Result<Option<AdaptationField>> {
        if (data[3] & 0x20) == 0 {
            return Ok(None);
        }
        if data.len() <= offset {
            return Err(MuxError::InvalidData("Adaptation field missing".into()));
        }

        let adaptation_field_length = data[offset] as usize;
        if adaptation_field_length == 0 {
            return Ok(Some(AdaptationField {
                stuffing: 1,
                ..Default::default()
            }));
        }

        if data.len() < offset + adaptation_field_length + 1 {
            return Err(MuxError::InvalidData("Adaptation field too short".into()));
        }

        let flags = data[offset + 1];
        let mut field = AdaptationField {
            length: adaptation_field_length,
            discontinuity: (flags & 0x80) != 0,
            random_access: (flags & 0x40) != 0,
            es_priority: (flags & 0x20) != 0,
            pcr_flag: (flags & 0x10) != 0,
            opcr_flag: (flags & 0x08) != 0,
            splicing_point_flag: (flags & 0x04) != 0,
            private_data_flag: (flags & 0x02) != 0,
            extension_flag: (flags & 0x01) != 0,
            ..Default::default()
        };

        let mut pos = offset + 2;

        if field.pcr_flag {
            if adaptation_field_length < 1 + PCR_FIELD_SIZE {
                return Err(MuxError::InvalidData("PCR data too short".into()));
            }
            field.pcr = Some(read_pcr(&data[pos..pos + PCR_FIELD_SIZE]));
            pos += PCR_FIELD_SIZE;
        }

        if field.opcr_flag {
            pos += PCR_FIELD_SIZE;
        }
        if field.splicing_point_flag {
            pos += 1;
        }

        let end = offset + 1 + adaptation_field_length;
        if !field.private_data_flag && !field.extension_flag && pos <= end {
            field.stuffing = data[pos..end].iter().take_while(|&&b| b == 0xff).count();
        }
        Ok(Some(field))
    }

    /// Splits a full 188-byte packet into header, adaptation field and payload.
    pub fn parse_packet<'a>(&self, data: &'a [u8]) -> Result<ParsedPacket<'a>> {
        if data.len() != TS_PACKET_SIZE {
            return Err(MuxError::InvalidData(format!(
                "TS packet must be {} bytes, got {}",
                TS_PACKET_SIZE,
                data.len()
            )));
        }
        let header = self.parse_header(data)?;
        let adaptation = self.parse_adaptation_field(data, TS_HEADER_SIZE)?;
        let payload_start = if header.adaptation_field_exists {
            TS_HEADER_SIZE + 1 + data[TS_HEADER_SIZE] as usize
        } else {
            TS_HEADER_SIZE
        };
        let payload = if header.contains_payload && payload_start <= TS_PACKET_SIZE {
            &data[payload_start..]
        } else {
            &[]
        };
        Ok(ParsedPacket {
            header,
            adaptation,
            payload,
        })
    }

    /// Parses the long-form section header and checks the CRC.
    ///
    /// Returns the header and the section body between the header and CRC.
    pub fn parse_section<'a>(&self, section: &'a [u8]) -> Result<(SectionHeader, &'a [u8])> {
        if section.len() < 3 {
            return Err(MuxError::InvalidData("Section too short".into()));
        }
        let section_length = (((section[1] & 0x0f) as usize) << 8) | section[2] as usize;
        let total = 3 + section_length;
        if section.len() < total || section_length < 9 {
            return Err(MuxError::InvalidData("Section truncated".into()));
        }
        let section = &section[..total];
        if !Crc32Mpeg2::new().verify(section) {
            return Err(MuxError::InvalidData("Section CRC mismatch".into()));
        }
        let header = SectionHeader {
            table_id: section[0],
            syntax_indicator: section[1] & 0x80 != 0,
            private_indicator: section[1] & 0x40 != 0,
            section_length,
            table_id_extension: u16::from_be_bytes([section[3], section[4]]),
            version: (section[5] >> 1) & 0x1f,
            current_next: section[5] & 0x01 != 0,
            section_number: section[6],
            last_section_number: section[7],
        };
        Ok((header, &section[8..total - 4]))
    }

    pub fn parse_pat(&self, section: &[u8]) -> Result<Pat> {
        let (header, body) = self.parse_section(section)?;
        if header.table_id != TABLE_ID_PAT {
            return Err(MuxError::InvalidData("Not a PAT section".into()));
        }
        let entries = body
            .chunks_exact(4)
            .map(|e| PatEntry {
                program_number: u16::from_be_bytes([e[0], e[1]]),
                pmt_pid: u16::from_be_bytes([e[2] & 0x1f, e[3]]),
            })
            .collect();
        Ok(Pat {
            transport_stream_id: header.table_id_extension,
            version: header.version,
            entries,
        })
    }

    pub fn parse_pmt(&self, section: &[u8]) -> Result<Pmt> {
        let (header, data) = self.parse_section(section)?;
        if header.table_id != TABLE_ID_PMT {
            return Err(MuxError::InvalidData("Not a PMT section".into()));
        }
        if data.len() < 4 {
            return Err(MuxError::InvalidData("PMT too short".into()));
        }

        let pcr_pid = ((data[0] as u16 & 0x1F) << 8) | data[1] as u16;
        let program_info_length = ((data[2] as usize & 0x0F) << 8) | data[3] as usize;
        let mut pos = 4;
        if pos + program_info_length > data.len() {
            return Err(MuxError::InvalidData("Program info data too short".into()));
        }
        let program_descriptors = self.parse_descriptors(&data[pos..pos + program_info_length])?;
        pos += program_info_length;

        let mut streams = Vec::new();
        while pos + 5 <= data.len() {
            let stream_type = data[pos];
            let elementary_pid = ((data[pos + 1] as u16 & 0x1F) << 8) | data[pos + 2] as u16;
            let es_info_length = ((data[pos + 3] as usize & 0x0F) << 8) | data[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > data.len() {
                return Err(MuxError::InvalidData("ES info data too short".into()));
            }

            let descriptors = self.parse_descriptors(&data[pos..pos + es_info_length])?;
            pos += es_info_length;

            streams.push(PmtStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(Pmt {
            program_number: header.table_id_extension,
            version: header.version,
            pcr_pid,
            program_descriptors,
            streams,
        })
    }

    fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(MuxError::InvalidData("Descriptor data too short".into()));
            }

            descriptors.push(Descriptor::new(tag, &data[pos..pos + length]));
            pos += length;
        }

        Ok(descriptors)
    }
}
