use super::clock::MuxTime;
use super::pes::PESHeader;
use super::program::{ProgramClock, TimeBase};
use super::section::{SectionLayout, SectionSl, TableSource};
use super::sl::{SlConfig, SlHeader};
use super::stream::{Fragment, FragmentSource};
use super::types::{PTS_HZ, TS_PAYLOAD_SIZE};
use crate::av::{AccessUnit, AuPiece};
use crate::error::{MuxError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// DTS window of the bitrate estimator, one second at 90 kHz
pub const BITRATE_WINDOW: u64 = 90_000;
/// PES that must be sent before a window produces an estimate
const BITRATE_MIN_PES: u64 = 4;
/// Access units moved from the producer queue ahead of transmission
const LOOKAHEAD: usize = 2;

/// How access units are wrapped before transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carriage {
    /// Plain PES
    Pes,
    /// One SL packet per access unit, each in its own PES
    SlPes,
    /// Each access unit becomes a new version of an SL-framed section table
    SlSections,
}

#[derive(Debug)]
struct Partial {
    data: BytesMut,
    cts: u64,
    dts: u64,
    is_random_access: bool,
}

/// Producer side of one elementary stream: a bounded FIFO of access units.
#[derive(Debug)]
pub(crate) struct EsQueue {
    units: VecDeque<AccessUnit>,
    capacity: usize,
    partial: Option<Partial>,
    end_of_stream: bool,
    pushed: u64,
}

impl EsQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            units: VecDeque::new(),
            capacity: capacity.max(1),
            partial: None,
            end_of_stream: false,
            pushed: 0,
        }
    }
}

/// Handle through which a producer feeds one elementary stream.
///
/// Cloning is cheap; all clones share the stream's queue. Each stream has
/// its own lock, so a slow producer never blocks other PIDs.
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    pid: u16,
    queue: Arc<Mutex<EsQueue>>,
}

impl ProducerHandle {
    pub(crate) fn new(pid: u16, queue: Arc<Mutex<EsQueue>>) -> Self {
        Self { pid, queue }
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Enqueues one complete access unit.
    ///
    /// Fails with [`MuxError::QueueFull`] when the multiplexer has not
    /// consumed enough of the queue yet; the unit is not stored and may be
    /// pushed again later.
    pub fn push_access_unit(
        &self,
        data: impl Into<Bytes>,
        cts: u64,
        dts: u64,
        is_random_access: bool,
    ) -> Result<()> {
        self.push(
            AccessUnit::new(data)
                .with_cts(cts)
                .with_dts(dts)
                .with_random_access(is_random_access),
        )
    }

    pub fn push(&self, au: AccessUnit) -> Result<()> {
        if au.is_empty() {
            return Err(MuxError::InvalidData("empty access unit".into()));
        }
        let mut queue = self.queue.lock();
        if queue.end_of_stream {
            return Err(MuxError::EndOfStream { pid: self.pid });
        }
        if queue.units.len() >= queue.capacity {
            return Err(MuxError::QueueFull { pid: self.pid });
        }
        queue.units.push_back(au);
        queue.pushed += 1;
        Ok(())
    }

    /// Pushes part of an access unit. Pieces are concatenated until the
    /// piece flagged as the end arrives; timing and random access flag are
    /// taken from the starting piece.
    pub fn push_piece(
        &self,
        data: &[u8],
        piece: AuPiece,
        cts: u64,
        dts: u64,
        is_random_access: bool,
    ) -> Result<()> {
        let mut queue = self.queue.lock();
        if queue.end_of_stream {
            return Err(MuxError::EndOfStream { pid: self.pid });
        }
        if piece.end && queue.units.len() >= queue.capacity {
            return Err(MuxError::QueueFull { pid: self.pid });
        }
        if piece.start {
            if queue.partial.is_some() {
                warn!("PID {}: unterminated access unit dropped", self.pid);
            }
            queue.partial = Some(Partial {
                data: BytesMut::new(),
                cts,
                dts,
                is_random_access,
            });
        }
        let Some(partial) = queue.partial.as_mut() else {
            return Err(MuxError::InvalidData(
                "access unit piece without a start".into(),
            ));
        };
        partial.data.put_slice(data);

        if piece.end {
            if let Some(partial) = queue.partial.take() {
                if partial.data.is_empty() {
                    return Err(MuxError::InvalidData("empty access unit".into()));
                }
                queue.units.push_back(
                    AccessUnit::new(partial.data.freeze())
                        .with_cts(partial.cts)
                        .with_dts(partial.dts)
                        .with_random_access(partial.is_random_access),
                );
                queue.pushed += 1;
            }
        }
        Ok(())
    }

    /// Signals that no more access units will be pushed
    pub fn end_of_stream(&self) {
        self.queue.lock().end_of_stream = true;
    }

    /// Access units waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.lock().units.len()
    }

    /// Complete access units accepted so far
    pub fn pushed(&self) -> u64 {
        self.queue.lock().pushed
    }
}

/// Access unit taken off the producer queue, timestamps in 90 kHz
#[derive(Debug)]
struct PendingAu {
    data: Bytes,
    offset: usize,
    cts: u64,
    dts: u64,
    is_random_access: bool,
    is_repeat: bool,
    /// SL-over-PES unit still waiting for its SL header
    needs_sl_header: bool,
}

impl PendingAu {
    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

/// Static description of a packetized stream
#[derive(Debug, Clone)]
pub struct PacketizerConfig {
    pub pid: u16,
    pub stream_id: u8,
    /// Ticks per second of producer timestamps
    pub timescale: u64,
    pub carriage: Carriage,
    pub sl: SlConfig,
    /// End every PES with its access unit instead of packing the next one
    pub one_au_per_pes: bool,
    /// Section layout when the carriage is [`Carriage::SlSections`]
    pub section_layout: Option<SectionLayout>,
    /// Carousel period of section-carried streams
    pub repeat_rate_ms: u32,
}

/// Turns queued access units into transport payload fragments.
///
/// A PES is laid out when its first fragment is requested: the header goes
/// into that fragment and the remaining PES bytes are counted down by the
/// following ones. Continuity counters are left to the owning
/// [`Stream`](super::stream::Stream).
#[derive(Debug)]
pub struct PacketizedSource {
    config: PacketizerConfig,
    queue: Arc<Mutex<EsQueue>>,
    pending: VecDeque<PendingAu>,
    time_base: Option<TimeBase>,
    /// PES payload bytes still to send
    pes_remaining: usize,
    force_boundary: bool,
    sections: Option<TableSource>,
    sl_sequence: u32,
    last_dts: Option<u64>,
    dts_shift: u64,
    window_start: Option<u64>,
    window_bytes: u64,
    pes_sent: u64,
    bitrate: u64,
    bitrate_updated: bool,
}

impl PacketizedSource {
    pub fn new(config: PacketizerConfig, queue_capacity: usize) -> (Self, ProducerHandle) {
        let queue = Arc::new(Mutex::new(EsQueue::new(queue_capacity)));
        let handle = ProducerHandle::new(config.pid, queue.clone());
        let sections = match (config.carriage, config.section_layout) {
            (Carriage::SlSections, Some(layout)) => {
                Some(TableSource::new(layout, config.repeat_rate_ms))
            }
            _ => None,
        };
        let source = Self {
            config,
            queue,
            pending: VecDeque::new(),
            time_base: None,
            pes_remaining: 0,
            force_boundary: false,
            sections,
            sl_sequence: 0,
            last_dts: None,
            dts_shift: 0,
            window_start: None,
            window_bytes: 0,
            pes_sent: 0,
            bitrate: 0,
            bitrate_updated: false,
        };
        (source, handle)
    }

    pub fn pid(&self) -> u16 {
        self.config.pid
    }

    pub fn carriage(&self) -> Carriage {
        self.config.carriage
    }

    /// Estimated bitrate in bits per second, 0 until measured
    pub fn bitrate(&self) -> u64 {
        self.bitrate
    }

    /// Returns true once after each new bitrate estimate
    pub fn take_bitrate_update(&mut self) -> bool {
        std::mem::take(&mut self.bitrate_updated)
    }

    /// Ends PES packing at the next access unit boundary
    pub fn force_pes_boundary(&mut self) {
        self.force_boundary = true;
    }

    /// Section carousel of a section-carried stream
    pub fn sections(&self) -> Option<&TableSource> {
        self.sections.as_ref()
    }

    /// Moves the carousel schedule back to `now` after a time reset
    pub fn reset_time(&mut self, now: MuxTime) {
        if let Some(sections) = self.sections.as_mut() {
            sections.reset_time(now);
        }
        self.time_base = None;
    }

    fn to_90k(&self, ts: u64) -> u64 {
        if self.config.timescale == PTS_HZ || self.config.timescale == 0 {
            ts
        } else {
            (ts as u128 * PTS_HZ as u128 / self.config.timescale as u128) as u64
        }
    }

    /// Moves access units from the producer queue.
    fn refill(&mut self) {
        while self.pending.len() < LOOKAHEAD {
            let Some(au) = self.queue.lock().units.pop_front() else {
                break;
            };
            let mut dts = self.to_90k(au.dts) + self.dts_shift;
            let mut cts = self.to_90k(au.cts) + self.dts_shift;
            if let Some(last) = self.last_dts {
                if dts < last {
                    warn!(
                        "PID {}: DTS regression {} < {}, re-anchoring",
                        self.config.pid, dts, last
                    );
                    let shift = last - dts;
                    self.dts_shift += shift;
                    dts += shift;
                    cts += shift;
                }
            }
            self.last_dts = Some(dts);

            self.pending.push_back(PendingAu {
                data: au.data,
                offset: 0,
                cts,
                dts,
                is_random_access: au.is_random_access,
                is_repeat: au.is_repeat,
                needs_sl_header: self.config.carriage == Carriage::SlPes,
            });
        }
    }

    /// SL header of a whole access unit, timestamps on the program time
    /// base rescaled to the SL resolution
    fn sl_header(&mut self, au: &PendingAu, time_base: &TimeBase) -> SlHeader {
        let resolution = self.config.sl.timestamp_resolution;
        let header = SlHeader {
            access_unit_start: true,
            access_unit_end: true,
            random_access_point: au.is_random_access,
            packet_sequence_number: self.sl_sequence,
            decoding_time_stamp: (au.dts != au.cts)
                .then(|| sl_time(time_base.remap(au.dts), resolution)),
            composition_time_stamp: Some(sl_time(time_base.remap(au.cts), resolution)),
            access_unit_length: au.data.len() as u32,
        };
        self.sl_sequence = self.sl_sequence.wrapping_add(1);
        header
    }

    /// Prefixes the front unit with its SL header before its PES starts
    fn wrap_front_in_sl(&mut self, time_base: &TimeBase) {
        let Some(mut front) = self.pending.pop_front() else {
            return;
        };
        if front.needs_sl_header {
            let header = self.sl_header(&front, time_base);
            let mut buf = header.write(&self.config.sl);
            buf.put_slice(&front.data);
            front.data = buf.freeze();
            front.needs_sl_header = false;
        }
        self.pending.push_front(front);
    }

    /// DTS of the next queued access unit, 90 kHz
    pub fn front_dts(&mut self) -> Option<u64> {
        self.refill();
        self.pending.front().map(|au| au.dts)
    }

    /// Mux time at which the stream next wants to send, `None` when it has
    /// nothing. Fixes the program's time base from the first DTS seen.
    pub fn poll_due(&mut self, clock: &mut ProgramClock, now: MuxTime) -> Option<MuxTime> {
        self.refill();
        let table_due = self.sections.as_ref().and_then(|t| t.next_due());
        if self.sections.as_ref().is_some_and(|t| t.is_mid_section()) {
            return table_due;
        }
        let au_due = match self.pending.front() {
            Some(front) => {
                self.time_base = clock.time_base(self.config.pid, front.dts, now);
                self.time_base.map(|tb| tb.due(front.dts))
            }
            None => None,
        };
        match (au_due, table_due) {
            (Some(a), Some(t)) => Some(a.min(t)),
            (a, t) => a.or(t),
        }
    }

    /// Nothing left to send and the producer signaled end of stream
    pub fn is_finished(&self) -> bool {
        if !self.pending.is_empty() || self.pes_remaining > 0 {
            return false;
        }
        if self.sections.as_ref().is_some_and(|t| t.is_mid_section()) {
            return false;
        }
        let queue = self.queue.lock();
        queue.end_of_stream && queue.units.is_empty()
    }

    /// Payload left in the first packet for PES packing: how many bytes of
    /// the following unit fit before the last packet of this PES is full.
    fn packing_room(header_len: usize, len: usize, first_packet: usize) -> usize {
        let total = header_len + len;
        if total <= first_packet {
            first_packet - total
        } else {
            (TS_PAYLOAD_SIZE - (total - first_packet) % TS_PAYLOAD_SIZE) % TS_PAYLOAD_SIZE
        }
    }

    fn pes_header(&self, au: &PendingAu, time_base: &TimeBase) -> PESHeader {
        let header = PESHeader::new(self.config.stream_id).with_pts(time_base.remap(au.cts));
        if au.dts != au.cts {
            header.with_dts(time_base.remap(au.dts))
        } else {
            header
        }
    }

    /// Lays out the next PES and returns its encoded header
    fn start_pes(&mut self, max_bytes: usize) -> Result<BytesMut> {
        let time_base = self.time_base.ok_or(MuxError::NoData)?;
        self.wrap_front_in_sl(&time_base);
        let front = self.pending.front().ok_or(MuxError::NoData)?;
        let starts_unit = front.offset == 0;
        let mut len = front.remaining();

        let packing = self.config.carriage == Carriage::Pes
            && !self.config.one_au_per_pes
            && !self.force_boundary;

        let mut header = match (starts_unit, self.pending.get(1)) {
            (true, _) => self.pes_header(front, &time_base),
            (false, Some(next)) if packing => self.pes_header(next, &time_base),
            _ => PESHeader::new(self.config.stream_id),
        };

        if packing {
            let room = Self::packing_room(header.len(), len, max_bytes);
            match self.pending.get(1) {
                Some(next) if room > 0 => len += room.min(next.remaining()),
                _ if !starts_unit => header = PESHeader::new(self.config.stream_id),
                _ => {}
            }
        }
        self.force_boundary = false;

        let header = header.with_alignment(starts_unit).with_payload_len(len);
        if let (Some(dts), true) = (header.dts.or(header.pts), starts_unit) {
            debug!(
                "PID {}: PES of {} bytes, DTS {}",
                self.config.pid, len, dts
            );
        }
        self.track_bitrate(self.pending.front().map(|au| au.dts), len);
        self.pes_remaining = len;

        let mut buf = BytesMut::with_capacity(header.len());
        header.write_to(&mut buf);
        Ok(buf)
    }

    fn track_bitrate(&mut self, dts: Option<u64>, len: usize) {
        self.pes_sent += 1;
        let Some(dts) = dts else {
            return;
        };
        match self.window_start {
            None => {
                self.window_start = Some(dts);
                self.window_bytes = len as u64;
            }
            Some(start) => {
                let span = dts.saturating_sub(start);
                if span >= BITRATE_WINDOW && self.pes_sent > BITRATE_MIN_PES {
                    self.bitrate = self.window_bytes * 8 * PTS_HZ / span;
                    self.bitrate_updated = true;
                    self.window_start = Some(dts);
                    self.window_bytes = len as u64;
                    trace!(
                        "PID {}: bitrate estimate {} bps",
                        self.config.pid, self.bitrate
                    );
                } else {
                    self.window_bytes += len as u64;
                }
            }
        }
    }

    fn next_pes_fragment(&mut self, max_bytes: usize) -> Result<Fragment> {
        self.refill();
        let mut payload = BytesMut::with_capacity(max_bytes);
        let mut unit_start = false;
        let mut random_access = false;

        if self.pes_remaining == 0 {
            let header = self.start_pes(max_bytes)?;
            random_access = self
                .pending
                .front()
                .is_some_and(|au| au.offset == 0 && au.is_random_access);
            unit_start = true;
            payload.put_slice(&header);
        }

        while payload.len() < max_bytes && self.pes_remaining > 0 {
            let Some(front) = self.pending.front_mut() else {
                break;
            };
            let take = (max_bytes - payload.len())
                .min(self.pes_remaining)
                .min(front.remaining());
            payload.put_slice(&front.data[front.offset..front.offset + take]);
            front.offset += take;
            self.pes_remaining -= take;
            if front.remaining() == 0 {
                self.pending.pop_front();
                self.refill();
            }
        }

        if self.pes_remaining > 0 && self.pending.is_empty() {
            // packing only reaches into units already queued
            warn!("PID {}: PES truncated", self.config.pid);
            self.pes_remaining = 0;
        }

        Ok(Fragment {
            payload: payload.freeze(),
            unit_start,
            random_access,
        })
    }

    fn next_section_fragment(&mut self, max_bytes: usize, now: MuxTime) -> Result<Fragment> {
        let mid_section = self.sections.as_ref().is_some_and(|t| t.is_mid_section());
        let due_base = match (self.pending.front(), self.time_base) {
            (Some(front), Some(tb)) if tb.due(front.dts) <= now => Some(tb),
            _ => None,
        };
        if let (false, Some(time_base)) = (mid_section, due_base) {
            if let Some(au) = self.pending.pop_front() {
                self.publish_section_unit(au, &time_base);
            }
            self.refill();
        }
        let sections = self.sections.as_mut().ok_or(MuxError::NoData)?;
        sections.next_fragment(max_bytes, now)
    }

    fn publish_section_unit(&mut self, au: PendingAu, time_base: &TimeBase) {
        let header = self.sl_header(&au, time_base);
        self.track_bitrate(Some(au.dts), au.data.len());
        let sl = SectionSl {
            config: &self.config.sl,
            header,
        };
        let Some(sections) = self.sections.as_mut() else {
            return;
        };
        match (au.is_repeat, sections.version()) {
            (true, Some(version)) => sections.rebuild_with_version(version, &au.data, Some(sl)),
            _ => sections.rebuild(&au.data, Some(sl)),
        }
    }
}

/// Rescales a 90 kHz timestamp to an SL timestamp resolution
fn sl_time(ts: u64, resolution: u32) -> u64 {
    if resolution == 0 || resolution as u64 == PTS_HZ {
        return ts;
    }
    (ts as u128 * resolution as u128 / PTS_HZ as u128) as u64
}

impl FragmentSource for PacketizedSource {
    fn next_fragment(&mut self, max_bytes: usize, now: MuxTime) -> Result<Fragment> {
        match self.config.carriage {
            Carriage::SlSections => self.next_section_fragment(max_bytes, now),
            Carriage::Pes | Carriage::SlPes => self.next_pes_fragment(max_bytes),
        }
    }

    fn next_is_random_access(&self) -> bool {
        self.config.carriage != Carriage::SlSections
            && self.pes_remaining == 0
            && self
                .pending
                .front()
                .is_some_and(|au| au.offset == 0 && au.is_random_access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::section::SectionLayout;
    use crate::format::ts::types::{STREAM_ID_VIDEO, TABLE_ID_MPEG4_OD};
    use crate::utils::BitReader;
    use pretty_assertions::assert_eq;

    fn pes_config() -> PacketizerConfig {
        PacketizerConfig {
            pid: 0x100,
            stream_id: STREAM_ID_VIDEO,
            timescale: 90_000,
            carriage: Carriage::Pes,
            sl: SlConfig::default(),
            one_au_per_pes: false,
            section_layout: None,
            repeat_rate_ms: 0,
        }
    }

    fn running_clock() -> ProgramClock {
        let mut clock = ProgramClock::new(0);
        clock.init_pcr(1, 0, MuxTime::ZERO, 0);
        clock
    }

    #[test]
    fn test_queue_full_and_end_of_stream() {
        let (_source, handle) = PacketizedSource::new(pes_config(), 2);
        handle.push_access_unit(vec![1], 0, 0, true).unwrap();
        handle.push_access_unit(vec![2], 0, 0, false).unwrap();
        assert!(matches!(
            handle.push_access_unit(vec![3], 0, 0, false),
            Err(MuxError::QueueFull { pid: 0x100 })
        ));
        assert!(matches!(
            handle.push_access_unit(Vec::<u8>::new(), 0, 0, false),
            Err(MuxError::InvalidData(_))
        ));
        handle.end_of_stream();
        assert!(matches!(
            handle.push_access_unit(vec![3], 0, 0, false),
            Err(MuxError::EndOfStream { .. })
        ));
    }

    #[test]
    fn test_pieces_are_reassembled() {
        let (_source, handle) = PacketizedSource::new(pes_config(), 4);
        handle.push_piece(&[1, 2], AuPiece::FIRST, 10, 10, true).unwrap();
        assert_eq!(handle.queued(), 0);
        handle.push_piece(&[3], AuPiece::MIDDLE, 0, 0, false).unwrap();
        handle.push_piece(&[4], AuPiece::LAST, 0, 0, false).unwrap();
        assert_eq!(handle.queued(), 1);
        assert!(handle.push_piece(&[5], AuPiece::LAST, 0, 0, false).is_err());
    }

    #[test]
    fn test_single_unit_pes() {
        let (mut source, handle) = PacketizedSource::new(pes_config(), 4);
        let mut clock = running_clock();
        assert_eq!(source.poll_due(&mut clock, MuxTime::ZERO), None);

        handle.push_access_unit(vec![0xaa; 100], 3600, 3600, true).unwrap();
        assert_eq!(source.poll_due(&mut clock, MuxTime::ZERO), Some(MuxTime::ZERO));
        assert!(source.next_is_random_access());

        let frag = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        assert!(frag.unit_start);
        assert!(frag.random_access);
        let (header, size) = PESHeader::parse(&frag.payload).unwrap();
        assert_eq!(size, 14);
        assert!(header.data_alignment);
        // the first DTS of the program maps to the initial PCR
        assert_eq!(header.pts, Some(0));
        assert_eq!(header.packet_length as usize, 8 + 100);
        assert_eq!(&frag.payload[size..], &[0xaa; 100][..]);
        assert!(matches!(
            source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO),
            Err(MuxError::NoData)
        ));
    }

    #[test]
    fn test_large_unit_spans_packets() {
        let (mut source, handle) = PacketizedSource::new(pes_config(), 4);
        let mut clock = running_clock();
        handle.push_access_unit(vec![0x11; 1000], 0, 0, false).unwrap();
        source.poll_due(&mut clock, MuxTime::ZERO);

        let mut data = Vec::new();
        let first = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        data.extend_from_slice(&first.payload[14..]);
        while let Ok(frag) = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO) {
            assert!(!frag.unit_start);
            data.extend_from_slice(&frag.payload);
        }
        assert_eq!(data, vec![0x11; 1000]);
    }

    #[test]
    fn test_packing_fills_last_packet() {
        let (mut source, handle) = PacketizedSource::new(pes_config(), 4);
        let mut clock = running_clock();
        handle.push_access_unit(vec![0x01; 200], 0, 0, false).unwrap();
        handle.push_access_unit(vec![0x02; 500], 3000, 3000, false).unwrap();
        source.poll_due(&mut clock, MuxTime::ZERO);

        let first = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        assert_eq!(first.payload.len(), TS_PAYLOAD_SIZE);
        // 14 header + 200 bytes leaves 154 of the second unit in this PES
        let (header, _) = PESHeader::parse(&first.payload).unwrap();
        assert_eq!(header.packet_length as usize, 8 + 200 + 154);
        let second = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        assert_eq!(second.payload.len(), TS_PAYLOAD_SIZE);
        assert!(!second.unit_start);

        // the next PES starts inside the second unit without timestamps
        let third = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        assert!(third.unit_start);
        let (header, size) = PESHeader::parse(&third.payload).unwrap();
        assert_eq!(size, 9);
        assert!(!header.data_alignment);
        assert_eq!(header.pts, None);
        assert_eq!(header.packet_length as usize, 3 + 500 - 154);
    }

    #[test]
    fn test_one_unit_per_pes() {
        let mut config = pes_config();
        config.one_au_per_pes = true;
        let (mut source, handle) = PacketizedSource::new(config, 4);
        let mut clock = running_clock();
        handle.push_access_unit(vec![0x01; 10], 0, 0, false).unwrap();
        handle.push_access_unit(vec![0x02; 10], 3000, 3000, false).unwrap();
        source.poll_due(&mut clock, MuxTime::ZERO);

        let first = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        assert_eq!(first.payload.len(), 14 + 10);
        source.poll_due(&mut clock, MuxTime::ZERO);
        let second = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        let (header, _) = PESHeader::parse(&second.payload).unwrap();
        assert_eq!(header.pts, Some(3000));
    }

    #[test]
    fn test_dts_regression_reanchors() {
        let mut config = pes_config();
        config.one_au_per_pes = true;
        let (mut source, handle) = PacketizedSource::new(config, 4);
        let mut clock = running_clock();
        handle.push_access_unit(vec![0x01; 10], 9000, 9000, false).unwrap();
        handle.push_access_unit(vec![0x02; 10], 3000, 3000, false).unwrap();
        let first_due = source.poll_due(&mut clock, MuxTime::ZERO).unwrap();
        source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        let second_due = source.poll_due(&mut clock, MuxTime::ZERO).unwrap();
        assert!(second_due >= first_due);
    }

    #[test]
    fn test_sl_over_pes_prefixes_sl_header() {
        let mut config = pes_config();
        config.carriage = Carriage::SlPes;
        config.stream_id = 0xfa;
        config.sl = SlConfig {
            use_timestamps: false,
            ..Default::default()
        };
        let (mut source, handle) = PacketizedSource::new(config, 4);
        let mut clock = running_clock();
        handle.push_access_unit(vec![0x42; 4], 0, 0, true).unwrap();
        source.poll_due(&mut clock, MuxTime::ZERO);

        let frag = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        let (header, size) = PESHeader::parse(&frag.payload).unwrap();
        assert_eq!(header.stream_id, 0xfa);
        // start, end and RAP flags
        assert_eq!(frag.payload[size], 0b1110_0000);
        assert_eq!(&frag.payload[size + 1..], &[0x42; 4]);
    }

    #[test]
    fn test_sl_timestamps_share_the_pes_time_base() {
        let mut config = pes_config();
        config.carriage = Carriage::SlPes;
        config.stream_id = 0xfa;
        let (mut source, handle) = PacketizedSource::new(config, 4);
        // 100 ms of PCR offset
        let mut clock = ProgramClock::new(9000);
        clock.init_pcr(1, 0, MuxTime::ZERO, 0);
        handle.push_access_unit(vec![0x42; 4], 180_000, 180_000, true).unwrap();
        handle.push_access_unit(vec![0x43; 4], 189_000, 180_000, false).unwrap();
        source.poll_due(&mut clock, MuxTime::ZERO);

        let frag = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        let (header, size) = PESHeader::parse(&frag.payload).unwrap();
        assert_eq!(header.pts, Some(9000));
        let mut r = BitReader::new(&frag.payload[size..]);
        // start, end, RAP, no DTS, CTS
        assert_eq!(r.read_bits(5).unwrap(), 0b11101);
        assert_eq!(r.read_bits(33).unwrap(), 100);

        source.poll_due(&mut clock, MuxTime::ZERO);
        let frag = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        let (header, size) = PESHeader::parse(&frag.payload).unwrap();
        assert_eq!((header.pts, header.dts), (Some(18_000), Some(9000)));
        let mut r = BitReader::new(&frag.payload[size..]);
        assert_eq!(r.read_bits(5).unwrap(), 0b11011);
        assert_eq!(r.read_bits(33).unwrap(), 100);
        assert_eq!(r.read_bits(33).unwrap(), 200);
    }

    #[test]
    fn test_sl_sections_signal_dts_like_pes() {
        let mut config = pes_config();
        config.carriage = Carriage::SlSections;
        config.section_layout = Some(SectionLayout::mpeg4(TABLE_ID_MPEG4_OD, 1));
        let (mut source, handle) = PacketizedSource::new(config, 4);
        let mut clock = ProgramClock::new(9000);
        clock.init_pcr(1, 0, MuxTime::ZERO, 0);
        handle.push_access_unit(vec![0x42; 4], 9000, 0, true).unwrap();
        source.poll_due(&mut clock, MuxTime::ZERO);

        let frag = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        // pointer field, then an 8-byte long section header
        let mut r = BitReader::new(&frag.payload[9..]);
        assert_eq!(r.read_bits(5).unwrap(), 0b11111);
        assert_eq!(r.read_bits(33).unwrap(), 100);
        assert_eq!(r.read_bits(33).unwrap(), 200);
    }

    #[test]
    fn test_sl_sections_publish_new_versions() {
        let mut config = pes_config();
        config.carriage = Carriage::SlSections;
        config.section_layout = Some(SectionLayout::mpeg4(TABLE_ID_MPEG4_OD, 1));
        config.repeat_rate_ms = 500;
        let (mut source, handle) = PacketizedSource::new(config, 4);
        let mut clock = running_clock();
        handle.push_access_unit(vec![0x42; 20], 0, 0, true).unwrap();
        assert_eq!(source.poll_due(&mut clock, MuxTime::ZERO), Some(MuxTime::ZERO));

        let frag = source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        assert!(frag.unit_start);
        assert_eq!(frag.payload[1], TABLE_ID_MPEG4_OD);
        assert_eq!(source.sections().and_then(|t| t.version()), Some(0));
        // the carousel repeats the unit
        assert_eq!(
            source.poll_due(&mut clock, MuxTime::ZERO),
            Some(MuxTime::from_millis(500))
        );

        handle
            .push(AccessUnit::new(vec![0x43; 20]).with_time(90_000))
            .unwrap();
        let due = source.poll_due(&mut clock, MuxTime::ZERO).unwrap();
        assert_eq!(due, MuxTime::from_millis(500));
        source
            .next_fragment(TS_PAYLOAD_SIZE, MuxTime::from_millis(1000))
            .unwrap();
        assert_eq!(source.sections().and_then(|t| t.version()), Some(1));
    }

    #[test]
    fn test_finished_after_drain() {
        let (mut source, handle) = PacketizedSource::new(pes_config(), 4);
        let mut clock = running_clock();
        handle.push_access_unit(vec![1; 10], 0, 0, false).unwrap();
        handle.end_of_stream();
        assert!(!source.is_finished());
        source.poll_due(&mut clock, MuxTime::ZERO);
        source.next_fragment(TS_PAYLOAD_SIZE, MuxTime::ZERO).unwrap();
        assert!(source.is_finished());
    }
}
