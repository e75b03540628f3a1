use super::clock::MuxTime;
use super::packetizer::PacketizedSource;
use super::section::TableSource;
use super::types::*;
use crate::av::StreamKind;
use crate::error::Result;
use bytes::{Bytes, BytesMut};

/// A piece of payload ready to be placed in one transport packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Payload bytes, including the pointer field or PES header when a
    /// new unit starts here
    pub payload: Bytes,
    /// Value of payload_unit_start_indicator
    pub unit_start: bool,
    /// The fragment starts a unit beginning with a random access point
    pub random_access: bool,
}

/// Common pull contract of table carousels and access unit packetizers
pub trait FragmentSource {
    /// Returns at most `max_bytes` of the next payload, or
    /// [`MuxError::NoData`](crate::MuxError::NoData) when nothing is ready.
    fn next_fragment(&mut self, max_bytes: usize, now: MuxTime) -> Result<Fragment>;

    /// Whether the next fragment starts a random access unit
    fn next_is_random_access(&self) -> bool;
}

/// Where a PID gets its payload from
#[derive(Debug)]
pub enum StreamSource {
    Table(TableSource),
    Packetized(PacketizedSource),
}

impl StreamSource {
    pub fn as_fragment_source(&mut self) -> &mut dyn FragmentSource {
        match self {
            StreamSource::Table(t) => t,
            StreamSource::Packetized(p) => p,
        }
    }

    pub fn as_table(&self) -> Option<&TableSource> {
        match self {
            StreamSource::Table(t) => Some(t),
            StreamSource::Packetized(_) => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut TableSource> {
        match self {
            StreamSource::Table(t) => Some(t),
            StreamSource::Packetized(_) => None,
        }
    }

    pub fn as_packetized(&self) -> Option<&PacketizedSource> {
        match self {
            StreamSource::Packetized(p) => Some(p),
            StreamSource::Table(_) => None,
        }
    }

    pub fn as_packetized_mut(&mut self) -> Option<&mut PacketizedSource> {
        match self {
            StreamSource::Packetized(p) => Some(p),
            StreamSource::Table(_) => None,
        }
    }
}

/// Read-only view of a stream's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub pid: u16,
    pub packets_sent: u64,
    pub payload_bytes_sent: u64,
    pub continuity_counter: u8,
    pub bitrate: u64,
}

/// One PID of the multiplex together with its continuity counter.
///
/// The continuity counter is only touched here, when a packet is actually
/// serialized.
#[derive(Debug)]
pub struct Stream {
    pid: u16,
    continuity_counter: u8,
    kind: StreamKind,
    pub(crate) source: StreamSource,
    packets_sent: u64,
    payload_bytes_sent: u64,
}

impl Stream {
    pub fn new(pid: u16, kind: StreamKind, source: StreamSource) -> Self {
        Self {
            pid,
            continuity_counter: 0,
            kind,
            source,
            packets_sent: 0,
            payload_bytes_sent: 0,
        }
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut StreamSource {
        &mut self.source
    }

    pub fn next_is_random_access(&mut self) -> bool {
        self.source.as_fragment_source().next_is_random_access()
    }

    /// Pulls one fragment and serializes it as a complete packet into
    /// `buf`. Returns the fragment that was sent and the stuffing written.
    pub fn write_next_packet(
        &mut self,
        buf: &mut BytesMut,
        mut adaptation: AdaptationRequest,
        now: MuxTime,
    ) -> Result<(Fragment, usize)> {
        // the random access flag takes payload room
        adaptation.random_access |= self.next_is_random_access();
        let max = TS_PAYLOAD_SIZE - adaptation.min_size();
        let fragment = self
            .source
            .as_fragment_source()
            .next_fragment(max, now)?;
        adaptation.random_access |= fragment.random_access;

        let header = TSHeader {
            payload_unit_start: fragment.unit_start,
            pid: self.pid,
            continuity_counter: self.continuity_counter,
            ..Default::default()
        };
        let stuffing = write_packet(buf, header, adaptation, &fragment.payload)?;
        self.continuity_counter = (self.continuity_counter + 1) & 0x0f;
        self.packets_sent += 1;
        self.payload_bytes_sent += fragment.payload.len() as u64;
        Ok((fragment, stuffing))
    }

    /// Serializes an adaptation-field-only packet carrying `pcr`.
    ///
    /// No payload is sent, so the continuity counter keeps the value of the
    /// last payload packet of this PID.
    pub fn write_pcr_only_packet(&mut self, buf: &mut BytesMut, pcr: u64) -> Result<()> {
        let header = TSHeader {
            pid: self.pid,
            continuity_counter: (self.continuity_counter + 0x0f) & 0x0f,
            ..Default::default()
        };
        let adaptation = AdaptationRequest {
            pcr: Some(pcr),
            ..Default::default()
        };
        write_packet(buf, header, adaptation, &[])?;
        self.packets_sent += 1;
        Ok(())
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            pid: self.pid,
            packets_sent: self.packets_sent,
            payload_bytes_sent: self.payload_bytes_sent,
            continuity_counter: self.continuity_counter,
            bitrate: match &self.source {
                StreamSource::Table(t) => t.bitrate(),
                StreamSource::Packetized(p) => p.bitrate(),
            },
        }
    }
}
