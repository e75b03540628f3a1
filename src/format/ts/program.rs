use super::clock::MuxTime;
use super::psi::{iod_descriptor, pmt_payload, PmtEntry};
use super::section::{SectionLayout, TableSource};
use super::stream::{Stream, StreamSource};
use super::types::{
    Descriptor, PCR_HZ, PID_NULL, PTS_HZ, TABLE_ID_PMT, TIMESTAMP_MASK, TS_PACKET_BITS,
};
use crate::av::StreamKind;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use log::{info, warn};

/// PCR initialization state of a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcrState {
    Uninitialized,
    Running {
        /// PCR value at initialization, 27 MHz
        pcr_init: u64,
        mux_time_at_init: MuxTime,
        packets_at_init: u64,
    },
}

/// Mapping from producer DTS (90 kHz) to mux time and output timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub mux_time_at_init: MuxTime,
    pub initial_dts: u64,
    /// Added to every rebased timestamp: PCR offset plus initial PCR / 300
    pub pts_base: u64,
}

impl TimeBase {
    /// Mux time at which the access unit with this DTS is due
    pub fn due(&self, dts: u64) -> MuxTime {
        self.mux_time_at_init
            .add(MuxTime::from_ticks(dts.saturating_sub(self.initial_dts), PTS_HZ))
    }

    /// Rebases a producer timestamp onto the program clock
    pub fn remap(&self, ts: u64) -> u64 {
        (ts.saturating_sub(self.initial_dts) + self.pts_base) & TIMESTAMP_MASK
    }
}

/// Snapshot of a program's clock bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrDiagnostics {
    pub program_number: u16,
    pub pcr_init: Option<u64>,
    pub mux_time_at_init: Option<MuxTime>,
    pub packets_at_init: Option<u64>,
    pub last_pcr: Option<u64>,
    pub pcr_init_sys_clock: Option<DateTime<Utc>>,
    pub last_sys_clock: Option<DateTime<Utc>>,
    /// Wall clock elapsed minus modeled PCR elapsed, in milliseconds.
    /// Positive values mean the output runs slower than the model.
    pub drift_ms: Option<i64>,
}

/// PCR model of one program.
///
/// The PCR is not read from a clock: it is derived from the number of
/// packets sent at the target bitrate, or from the mux time when the output
/// is not padded. Wall clock instants are only kept for diagnostics.
#[derive(Debug, Clone)]
pub struct ProgramClock {
    state: PcrState,
    initial_dts: Option<u64>,
    /// 90 kHz
    pcr_offset: u64,
    last_pcr: Option<u64>,
    last_pcr_time: Option<MuxTime>,
    init_sys_clock: Option<DateTime<Utc>>,
    last_sys_clock: Option<DateTime<Utc>>,
    force_pcr: bool,
}

impl ProgramClock {
    pub fn new(pcr_offset: u64) -> Self {
        Self {
            state: PcrState::Uninitialized,
            initial_dts: None,
            pcr_offset,
            last_pcr: None,
            last_pcr_time: None,
            init_sys_clock: None,
            last_sys_clock: None,
            force_pcr: false,
        }
    }

    pub fn state(&self) -> PcrState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, PcrState::Running { .. })
    }

    pub fn init_pcr(&mut self, program_number: u16, pcr_init: u64, now: MuxTime, packets: u64) {
        self.state = PcrState::Running {
            pcr_init,
            mux_time_at_init: now,
            packets_at_init: packets,
        };
        self.force_pcr = true;
        self.init_sys_clock = Some(Utc::now());
        info!(
            "initializing PCR for program {}: PCR {} - mux time {}",
            program_number, pcr_init, now
        );
    }

    /// Restarts the model from the PCR reached at `now`, anchored at mux
    /// time `anchor`. The PCR keeps increasing across the rebase; producer
    /// timestamps are re-anchored on the next access unit.
    pub fn rebase(&mut self, now: MuxTime, anchor: MuxTime, packets: u64, bitrate: Option<u64>) {
        if let Some(pcr) = self.pcr_at(now, packets, bitrate) {
            self.state = PcrState::Running {
                pcr_init: pcr,
                mux_time_at_init: anchor,
                packets_at_init: packets,
            };
            self.initial_dts = None;
            self.last_pcr_time = None;
            self.force_pcr = true;
        }
    }

    /// Whether producer timestamps are anchored yet
    pub fn has_initial_dts(&self) -> bool {
        self.initial_dts.is_some()
    }

    /// Fixes the program's initial DTS from the earliest unit queued on any
    /// of its streams. Does nothing before PCR initialization or once the
    /// anchor is set.
    pub fn anchor(&mut self, earliest_dts: u64, now: MuxTime) {
        let PcrState::Running {
            mux_time_at_init, ..
        } = self.state
        else {
            return;
        };
        if self.initial_dts.is_none() {
            // a first unit arriving late is due right away
            let elapsed = now.saturating_sub(mux_time_at_init).to_ticks(PTS_HZ);
            self.initial_dts = Some(earliest_dts.saturating_sub(elapsed));
        }
    }

    /// Producer DTS to mux time mapping for the unit of `pid` with `dts`.
    /// `None` until the PCR is initialized.
    ///
    /// A DTS below the program's initial DTS lowers the anchor, which moves
    /// every stream of the program.
    pub fn time_base(&mut self, pid: u16, dts: u64, now: MuxTime) -> Option<TimeBase> {
        let PcrState::Running {
            pcr_init,
            mux_time_at_init,
            ..
        } = self.state
        else {
            return None;
        };
        let initial_dts = match self.initial_dts {
            Some(initial) if dts < initial => {
                warn!(
                    "PID {}: DTS {} is less than initial DTS {}, adjusting",
                    pid, dts, initial
                );
                self.initial_dts = Some(dts);
                dts
            }
            Some(initial) => initial,
            None => {
                self.anchor(dts, now);
                self.initial_dts.unwrap_or(dts)
            }
        };
        Some(TimeBase {
            mux_time_at_init,
            initial_dts,
            pts_base: self.pcr_offset + pcr_init / 300,
        })
    }

    /// Modeled PCR for a packet sent at `now`, being the `packets`-th of
    /// the multiplex. `bitrate` is set for fixed-rate output.
    pub fn pcr_at(&self, now: MuxTime, packets: u64, bitrate: Option<u64>) -> Option<u64> {
        let PcrState::Running {
            pcr_init,
            mux_time_at_init,
            packets_at_init,
        } = self.state
        else {
            return None;
        };
        let elapsed = match bitrate {
            Some(rate) if rate > 0 => {
                let sent = packets.saturating_sub(packets_at_init) as u128;
                (sent * TS_PACKET_BITS as u128 * PCR_HZ as u128 / rate as u128) as u64
            }
            _ => now.saturating_sub(mux_time_at_init).to_ticks(PCR_HZ),
        };
        let pcr = pcr_init + elapsed;
        Some(match self.last_pcr {
            Some(last) if last > pcr => last,
            _ => pcr,
        })
    }

    /// A PCR must be sent now
    pub fn pcr_due(&self, now: MuxTime, interval_ms: u32) -> bool {
        self.pcr_window_reached(now, interval_ms as u64)
    }

    /// A PCR may ride along on a packet of the PCR stream sent now
    pub fn pcr_early(&self, now: MuxTime, interval_ms: u32, tolerance_ms: u32) -> bool {
        self.pcr_window_reached(now, interval_ms.saturating_sub(tolerance_ms) as u64)
    }

    fn pcr_window_reached(&self, now: MuxTime, ms: u64) -> bool {
        if !self.is_running() {
            return false;
        }
        if self.force_pcr {
            return true;
        }
        match self.last_pcr_time {
            None => true,
            Some(last) => now.diff_nanos(last) >= ms as i128 * 1_000_000,
        }
    }

    pub fn force_pcr(&mut self) {
        self.force_pcr = true;
    }

    pub fn on_pcr_sent(&mut self, pcr: u64, now: MuxTime) {
        if let Some(last) = self.last_pcr {
            if pcr < last {
                warn!("PCR regression: {} after {}", pcr, last);
            }
        }
        self.last_pcr = Some(pcr);
        self.last_pcr_time = Some(now);
        self.last_sys_clock = Some(Utc::now());
        self.force_pcr = false;
    }

    pub fn last_pcr(&self) -> Option<u64> {
        self.last_pcr
    }

    pub fn diagnostics(&self, program_number: u16) -> PcrDiagnostics {
        let (pcr_init, mux_time_at_init, packets_at_init) = match self.state {
            PcrState::Running {
                pcr_init,
                mux_time_at_init,
                packets_at_init,
            } => (Some(pcr_init), Some(mux_time_at_init), Some(packets_at_init)),
            PcrState::Uninitialized => (None, None, None),
        };
        let drift_ms = match (
            self.init_sys_clock,
            self.last_sys_clock,
            pcr_init,
            self.last_pcr,
        ) {
            (Some(init), Some(last), Some(pcr_init), Some(pcr)) => {
                let wall = (last - init).num_milliseconds();
                let modeled = (pcr.saturating_sub(pcr_init) / (PCR_HZ / 1000)) as i64;
                Some(wall - modeled)
            }
            _ => None,
        };
        PcrDiagnostics {
            program_number,
            pcr_init,
            mux_time_at_init,
            packets_at_init,
            last_pcr: self.last_pcr,
            pcr_init_sys_clock: self.init_sys_clock,
            last_sys_clock: self.last_sys_clock,
            drift_ms,
        }
    }
}

/// Settings a program keeps after registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSettings {
    pub pcr_interval_ms: u32,
    pub pcr_tolerance_ms: u32,
    /// Encoded InitialObjectDescriptor announced in the PMT
    pub iod: Option<Vec<u8>>,
    pub mpeg4_signaling: bool,
    pub descriptors: Vec<Descriptor>,
}

/// One service: its PMT, its elementary streams and its PCR clock.
#[derive(Debug)]
pub struct Program {
    pub(crate) number: u16,
    pub(crate) pmt: Stream,
    pub(crate) streams: Vec<Stream>,
    /// PMT announcement of each stream, same order as `streams`
    pub(crate) entries: Vec<PmtEntry>,
    /// PID of the stream carrying the PCR, `None` until a stream exists
    pub(crate) pcr_pid: Option<u16>,
    pub(crate) clock: ProgramClock,
    pub(crate) settings: ProgramSettings,
    /// Stream composition changed, the PMT must be regenerated
    pub(crate) needs_reconfig: bool,
}

impl Program {
    pub(crate) fn new(
        number: u16,
        pmt_pid: u16,
        pmt_refresh_ms: u32,
        pcr_offset: u64,
        settings: ProgramSettings,
    ) -> Self {
        let table = TableSource::new(SectionLayout::psi(TABLE_ID_PMT, number), pmt_refresh_ms);
        Self {
            number,
            pmt: Stream::new(pmt_pid, StreamKind::Private, StreamSource::Table(table)),
            streams: Vec::new(),
            entries: Vec::new(),
            pcr_pid: None,
            clock: ProgramClock::new(pcr_offset),
            settings,
            needs_reconfig: true,
        }
    }

    /// Adds an elementary stream. The first stream carries the PCR unless
    /// a later one asks for it.
    pub(crate) fn push_stream(&mut self, stream: Stream, entry: PmtEntry, is_pcr: bool) {
        if is_pcr || self.pcr_pid.is_none() {
            self.pcr_pid = Some(stream.pid());
        }
        self.streams.push(stream);
        self.entries.push(entry);
        self.needs_reconfig = true;
    }

    /// PMT body for the current composition, PCR stream first
    pub fn pmt_payload(&self) -> BytesMut {
        let (mut entries, others): (Vec<PmtEntry>, Vec<PmtEntry>) = self
            .entries
            .iter()
            .cloned()
            .partition(|e| Some(e.pid) == self.pcr_pid);
        entries.extend(others);

        let mut descriptors = Vec::new();
        if self.settings.mpeg4_signaling {
            if let Some(iod) = &self.settings.iod {
                descriptors.push(iod_descriptor(iod));
            }
        } else {
            for entry in &mut entries {
                entry.es_id = None;
            }
        }
        descriptors.extend(self.settings.descriptors.iter().cloned());
        pmt_payload(self.pcr_pid.unwrap_or(PID_NULL), &descriptors, &entries)
    }

    /// Regenerates the PMT sections as a new table version
    pub(crate) fn rebuild_pmt(&mut self) {
        let payload = self.pmt_payload();
        if let Some(table) = self.pmt.source.as_table_mut() {
            table.rebuild(&payload, None);
        }
        self.needs_reconfig = false;
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn pmt_pid(&self) -> u16 {
        self.pmt.pid()
    }

    pub fn pcr_pid(&self) -> Option<u16> {
        self.pcr_pid
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn clock(&self) -> &ProgramClock {
        &self.clock
    }

    pub fn pcr_stream_index(&self) -> Option<usize> {
        let pid = self.pcr_pid?;
        self.streams.iter().position(|s| s.pid() == pid)
    }

    pub fn has_pid(&self, pid: u16) -> bool {
        self.pmt.pid() == pid || self.streams.iter().any(|s| s.pid() == pid)
    }
}
