use super::clock::MuxTime;
use super::sl::{SlConfig, SlHeader};
use super::stream::{Fragment, FragmentSource};
use super::types::{TS_PACKET_BITS, TS_PAYLOAD_SIZE};
use crate::error::{MuxError, Result};
use crate::utils::Crc32Mpeg2;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};

/// table_id + flags + section_length
pub const SECTION_HEADER_LENGTH: usize = 3;
/// table_id_extension + version + section numbers
pub const SECTION_SYNTAX_HEADER_LENGTH: usize = 5;
pub const CRC_LENGTH: usize = 4;
/// Maximum total size of a PAT/PMT section
pub const PSI_MAX_SECTION_LENGTH: usize = 1024;
/// Maximum total size of a private section carrying MPEG-4 systems data
pub const MPEG4_MAX_SECTION_LENGTH: usize = 4096;

/// How the sections of a table are framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLayout {
    pub table_id: u8,
    pub table_id_extension: u16,
    pub syntax_indicator: bool,
    pub private_indicator: bool,
    pub max_section_length: usize,
}

impl SectionLayout {
    /// Layout of a standard PSI table (PAT/PMT)
    pub fn psi(table_id: u8, table_id_extension: u16) -> Self {
        Self {
            table_id,
            table_id_extension,
            syntax_indicator: true,
            private_indicator: false,
            max_section_length: PSI_MAX_SECTION_LENGTH,
        }
    }

    /// Layout of an MPEG-4 OD/BIFS section stream
    pub fn mpeg4(table_id: u8, table_id_extension: u16) -> Self {
        Self {
            table_id,
            table_id_extension,
            syntax_indicator: true,
            private_indicator: true,
            max_section_length: MPEG4_MAX_SECTION_LENGTH,
        }
    }

    fn overhead(&self) -> usize {
        if self.syntax_indicator {
            SECTION_HEADER_LENGTH + SECTION_SYNTAX_HEADER_LENGTH + CRC_LENGTH
        } else {
            SECTION_HEADER_LENGTH
        }
    }
}

/// Optional SL framing applied to every section of a table
#[derive(Debug, Clone, Copy)]
pub struct SectionSl<'a> {
    pub config: &'a SlConfig,
    pub header: SlHeader,
}

/// Splits `payload` into complete sections, CRC included.
///
/// With SL framing, every section starts with its own SL header; only the
/// first carries the access unit start flag and only the last the end flag.
pub fn build_sections(
    layout: &SectionLayout,
    version: u8,
    payload: &[u8],
    sl: Option<SectionSl<'_>>,
) -> Vec<Bytes> {
    let overhead = layout.overhead();
    let room = layout.max_section_length - overhead;

    // First pass sizes each section so last_section_number is known up front
    let mut spans = Vec::new();
    let mut offset = 0;
    let mut sl_header = sl.map(|s| s.header);
    loop {
        let sl_size = match (&sl, &mut sl_header) {
            (Some(s), Some(h)) => {
                let size = h.size(s.config);
                h.access_unit_start = false;
                size
            }
            _ => 0,
        };
        let take = (payload.len() - offset).min(room.saturating_sub(sl_size).max(1));
        spans.push((offset, take));
        offset += take;
        if offset >= payload.len() {
            break;
        }
    }

    let last_section_number = (spans.len() - 1).min(0xff) as u8;
    let crc = Crc32Mpeg2::new();
    let mut sections = Vec::with_capacity(spans.len());
    let mut sl_header = sl.map(|s| s.header);

    for (number, &(start, len)) in spans.iter().enumerate() {
        let sl_bytes = match (&sl, &mut sl_header) {
            (Some(s), Some(h)) => {
                let is_last = number + 1 == spans.len();
                let mut hdr = *h;
                hdr.access_unit_end = is_last && s.header.access_unit_end;
                h.access_unit_start = false;
                Some(hdr.write(s.config))
            }
            _ => None,
        };
        let sl_len = sl_bytes.as_ref().map_or(0, |b| b.len());
        let total = overhead + sl_len + len;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(layout.table_id);
        let mut b1 = 0x30u8; // reserved
        if layout.syntax_indicator {
            b1 |= 0x80;
        }
        if layout.private_indicator {
            b1 |= 0x40;
        }
        let section_length = total - SECTION_HEADER_LENGTH;
        buf.put_u8(b1 | ((section_length >> 8) & 0x0f) as u8);
        buf.put_u8((section_length & 0xff) as u8);

        if layout.syntax_indicator {
            buf.put_u16(layout.table_id_extension);
            // reserved, version, current_next_indicator = 1
            buf.put_u8(0xc0 | ((version & 0x1f) << 1) | 0x01);
            buf.put_u8(number.min(0xff) as u8);
            buf.put_u8(last_section_number);
        }
        if let Some(sl_bytes) = sl_bytes {
            buf.put_slice(&sl_bytes);
        }
        buf.put_slice(&payload[start..start + len]);
        if layout.syntax_indicator {
            let value = crc.calculate(&buf);
            buf.put_u32(value);
        }
        sections.push(buf.freeze());
    }
    sections
}

/// Number of transport packets a section occupies, pointer field included
pub fn packets_for_section(len: usize) -> usize {
    (len + 1).div_ceil(TS_PAYLOAD_SIZE)
}

/// One version of a table: its sections in emission order
#[derive(Debug, Clone, Default)]
struct Table {
    version: u8,
    sections: Vec<Bytes>,
}

/// A PSI carousel: repeats the current version of a table every
/// `refresh_ms` of mux time.
///
/// Sections live in an indexable arena swapped wholesale on rebuild. The
/// section being transmitted is held separately, so a rebuild in the
/// middle of it only takes effect once it has been fully sent.
#[derive(Debug)]
pub struct TableSource {
    layout: SectionLayout,
    table: Option<Table>,
    refresh_ms: u32,
    /// Index of the next section to start
    cursor: usize,
    in_flight: Option<(Bytes, usize)>,
    restart_cycle: bool,
    next_send: MuxTime,
    /// Set once a refresh-less table has been sent in full
    done: bool,
    cycles_sent: u64,
}

impl TableSource {
    pub fn new(layout: SectionLayout, refresh_ms: u32) -> Self {
        Self {
            layout,
            table: None,
            refresh_ms,
            cursor: 0,
            in_flight: None,
            restart_cycle: false,
            next_send: MuxTime::ZERO,
            done: false,
            cycles_sent: 0,
        }
    }

    pub fn table_id(&self) -> u8 {
        self.layout.table_id
    }

    pub fn refresh_ms(&self) -> u32 {
        self.refresh_ms
    }

    pub fn version(&self) -> Option<u8> {
        self.table.as_ref().map(|t| t.version)
    }

    /// Replaces the table content with a new version built from `payload`.
    ///
    /// The version number is bumped modulo 32 when a previous version
    /// exists. A rebuild makes the table due immediately.
    pub fn rebuild(&mut self, payload: &[u8], sl: Option<SectionSl<'_>>) {
        let version = match &self.table {
            Some(t) => (t.version + 1) & 0x1f,
            None => 0,
        };
        self.rebuild_with_version(version, payload, sl);
    }

    /// Like [`rebuild`](Self::rebuild) but with an explicit version number
    pub fn rebuild_with_version(&mut self, version: u8, payload: &[u8], sl: Option<SectionSl<'_>>) {
        let sections = build_sections(&self.layout, version & 0x1f, payload, sl);
        if sections.len() > 1 && self.layout.max_section_length == PSI_MAX_SECTION_LENGTH {
            warn!(
                "table 0x{:02x} needs {} sections",
                self.layout.table_id,
                sections.len()
            );
        }
        debug!(
            "table 0x{:02x} version {} rebuilt: {} sections, {} bytes",
            self.layout.table_id,
            version & 0x1f,
            sections.len(),
            sections.iter().map(|s| s.len()).sum::<usize>()
        );
        self.table = Some(Table {
            version: version & 0x1f,
            sections,
        });
        self.restart_cycle = true;
        self.cursor = 0;
        self.done = false;
        // a fresh version goes out right away
        self.next_send = MuxTime::ZERO;
    }

    /// Mux time at which the carousel wants to send, `None` when idle
    pub fn next_due(&self) -> Option<MuxTime> {
        if self.in_flight.is_some() {
            return Some(self.next_send);
        }
        if self.done {
            return None;
        }
        let table = self.table.as_ref()?;
        if table.sections.is_empty() {
            return None;
        }
        Some(self.next_send)
    }

    /// True while a section is partially transmitted
    pub fn is_mid_section(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Completed carousel cycles
    pub fn cycles_sent(&self) -> u64 {
        self.cycles_sent
    }

    /// Encoded sections of the current version
    pub fn sections(&self) -> &[Bytes] {
        self.table.as_ref().map_or(&[], |t| t.sections.as_slice())
    }

    /// Bandwidth the carousel reserves, in bits per second
    pub fn bitrate(&self) -> u64 {
        if self.refresh_ms == 0 {
            return 0;
        }
        let packets: usize = self
            .sections()
            .iter()
            .map(|s| packets_for_section(s.len()))
            .sum();
        packets as u64 * TS_PACKET_BITS * 1000 / self.refresh_ms as u64
    }

    /// Moves the schedule back to `now`, used when mux time is reset
    pub fn reset_time(&mut self, now: MuxTime) {
        self.next_send = now;
    }

    fn start_next_section(&mut self) -> Option<Bytes> {
        if self.restart_cycle {
            self.restart_cycle = false;
            self.cursor = 0;
        }
        let table = self.table.as_ref()?;
        let section = table.sections.get(self.cursor)?.clone();
        Some(section)
    }

    fn finish_section(&mut self, now: MuxTime) {
        if self.restart_cycle {
            // a newer version is waiting, its cycle starts from scratch
            return;
        }
        self.cursor += 1;
        if self.cursor < self.sections().len() {
            return;
        }
        self.cursor = 0;
        self.cycles_sent += 1;
        if self.refresh_ms == 0 {
            self.done = true;
        } else {
            self.next_send = now.add(MuxTime::from_millis(self.refresh_ms as u64));
        }
    }
}

impl FragmentSource for TableSource {
    fn next_fragment(&mut self, max_bytes: usize, now: MuxTime) -> Result<Fragment> {
        if max_bytes < 2 {
            return Err(MuxError::InvalidData(
                "no room for section data in packet".into(),
            ));
        }
        let (section, offset) = match self.in_flight.take() {
            Some(in_flight) => in_flight,
            None if self.done => return Err(MuxError::NoData),
            None => (self.start_next_section().ok_or(MuxError::NoData)?, 0),
        };

        let unit_start = offset == 0;
        let mut payload = BytesMut::with_capacity(max_bytes);
        if unit_start {
            // pointer_field: the section starts right away
            payload.put_u8(0);
        }
        let take = (max_bytes - payload.len()).min(section.len() - offset);
        payload.put_slice(&section[offset..offset + take]);

        if offset + take < section.len() {
            self.in_flight = Some((section, offset + take));
        } else {
            self.finish_section(now);
        }

        Ok(Fragment {
            payload: payload.freeze(),
            unit_start,
            random_access: false,
        })
    }

    fn next_is_random_access(&self) -> bool {
        false
    }
}
