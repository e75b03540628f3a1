use super::clock::MuxTime;
use super::packetizer::{Carriage, PacketizedSource, PacketizerConfig, ProducerHandle};
use super::program::{PcrDiagnostics, Program, ProgramSettings};
use super::psi::{pat_payload, PmtEntry};
use super::scheduler::{earliest, most_urgent, Candidate, Target};
use super::section::{SectionLayout, TableSource};
use super::stream::{Stream, StreamSource, StreamStats};
use super::types::*;
use crate::av::{CodecType, StreamKind};
use crate::config::{MuxConfig, ProgramConfig, StreamConfig};
use crate::error::{MuxError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, info, trace};

/// Span of mux time over which the output bitrate is averaged
const STATS_WINDOW_MS: u64 = 1000;

/// One serialized transport packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxPacket {
    pub data: Bytes,
    pub pid: u16,
    /// Mux time at which the packet is meant to leave
    pub time: MuxTime,
    /// PCR carried in the adaptation field
    pub pcr: Option<u64>,
}

/// Outcome of one [`TsMuxer::process`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// A packet carrying tables, elementary stream data or a PCR
    Data(MuxPacket),
    /// A null packet holding the target bitrate
    Padding(MuxPacket),
    /// Nothing to send yet; retry once producers pushed more data
    Idle,
    /// Every stream is exhausted, nothing will ever be produced again
    Eos,
}

impl ProcessResult {
    pub fn packet(&self) -> Option<&MuxPacket> {
        match self {
            ProcessResult::Data(p) | ProcessResult::Padding(p) => Some(p),
            ProcessResult::Idle | ProcessResult::Eos => None,
        }
    }
}

/// Read-only snapshot of the multiplex counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    pub packets_sent: u64,
    pub padding_sent: u64,
    /// Adaptation field stuffing in elementary stream packets
    pub pes_stuffing_bytes: u64,
    /// Output bitrate averaged over the last second of mux time
    pub average_bitrate_kbps: u64,
    /// Target rate in fixed-rate mode, else the sum of stream estimates
    pub mux_bitrate: u64,
    pub time: MuxTime,
}

/// MPEG-2 transport stream multiplexer.
///
/// Programs and streams are registered up front, producers feed access
/// units through their [`ProducerHandle`], and the caller pulls one 188-byte
/// packet per [`process`](Self::process) call.
///
/// ```
/// use tsmux::av::CodecType;
/// use tsmux::config::{MuxConfig, ProgramConfig, StreamConfig};
/// use tsmux::format::ts::{ProcessResult, TsMuxer, TS_PACKET_SIZE};
///
/// # fn main() -> tsmux::Result<()> {
/// let mut mux = TsMuxer::new(&MuxConfig::default());
/// let mut program = ProgramConfig::new(1, 0x1000);
/// program.streams.push(StreamConfig::new(0x100, CodecType::H264));
/// let handles = mux.add_program(&program)?;
///
/// handles[0].push_access_unit(vec![0, 0, 0, 1, 0x65], 0, 0, true)?;
/// handles[0].end_of_stream();
///
/// let mut output = Vec::new();
/// while let ProcessResult::Data(packet) = mux.process()? {
///     output.extend_from_slice(&packet.data);
/// }
/// assert_eq!(output.len() % TS_PACKET_SIZE, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TsMuxer {
    transport_stream_id: u16,
    pat: Stream,
    pat_dirty: bool,
    programs: Vec<Program>,
    time: MuxTime,
    /// Mux time and packet count from which fixed-rate time is counted
    rate_anchor: (MuxTime, u64),
    target_bitrate: u64,
    mux_bitrate: u64,
    fixed_rate: bool,
    real_time: bool,
    started: bool,
    initial_pcr: u64,
    one_au_per_pes: bool,
    queue_capacity: usize,
    packets_sent: u64,
    padding_sent: u64,
    pes_stuffing_bytes: u64,
    window_start: MuxTime,
    window_packets: u64,
    average_bitrate_kbps: u64,
    null_packet: Bytes,
}

impl TsMuxer {
    /// Creates an empty session. Programs listed in `config` are not
    /// registered; see [`from_config`](Self::from_config).
    pub fn new(config: &MuxConfig) -> Self {
        let pat = TableSource::new(
            SectionLayout::psi(TABLE_ID_PAT, config.transport_stream_id),
            config.pat_refresh_ms,
        );
        let fixed_rate = config.fixed_rate && config.rate > 0;
        Self {
            transport_stream_id: config.transport_stream_id,
            pat: Stream::new(PID_PAT, StreamKind::Private, StreamSource::Table(pat)),
            pat_dirty: true,
            programs: Vec::new(),
            time: MuxTime::ZERO,
            rate_anchor: (MuxTime::ZERO, 0),
            target_bitrate: config.rate,
            mux_bitrate: if fixed_rate { config.rate } else { 0 },
            fixed_rate,
            real_time: config.real_time,
            started: false,
            initial_pcr: config.initial_pcr % PCR_WRAP,
            one_au_per_pes: config.one_au_per_pes,
            queue_capacity: config.queue_capacity.max(1),
            packets_sent: 0,
            padding_sent: 0,
            pes_stuffing_bytes: 0,
            window_start: MuxTime::ZERO,
            window_packets: 0,
            average_bitrate_kbps: 0,
            null_packet: null_packet(),
        }
    }

    /// Builds a session with every program and stream of `config`.
    /// Handles are returned in configuration order.
    pub fn from_config(config: &MuxConfig) -> Result<(Self, Vec<ProducerHandle>)> {
        config.validate()?;
        let mut mux = Self::new(config);
        let mut handles = Vec::new();
        for program in &config.programs {
            handles.extend(mux.add_program(program)?);
        }
        Ok((mux, handles))
    }

    /// Registers a program together with the streams it lists.
    ///
    /// Fails with [`MuxError::AlreadyStarted`] once the first packet has
    /// been produced. Nothing is registered when any stream is rejected.
    pub fn add_program(&mut self, config: &ProgramConfig) -> Result<Vec<ProducerHandle>> {
        if self.started {
            return Err(MuxError::AlreadyStarted);
        }
        if config.number == 0 {
            return Err(MuxError::Config("program number 0 is reserved".into()));
        }
        if self.programs.iter().any(|p| p.number == config.number) {
            return Err(MuxError::DuplicateProgram(config.number));
        }
        self.check_pid(config.pmt_pid)?;

        let settings = ProgramSettings {
            pcr_interval_ms: config.pcr_interval_ms.max(1),
            pcr_tolerance_ms: config.pcr_tolerance_ms,
            iod: config.iod.clone(),
            mpeg4_signaling: config.mpeg4_signaling,
            descriptors: config.descriptors.clone(),
        };
        self.programs.push(Program::new(
            config.number,
            config.pmt_pid,
            config.pmt_refresh_ms,
            config.pcr_offset,
            settings,
        ));
        self.pat_dirty = true;
        info!(
            "added program {} with PMT on PID {}",
            config.number, config.pmt_pid
        );

        let mut handles = Vec::with_capacity(config.streams.len());
        for stream in &config.streams {
            match self.add_stream(config.number, stream) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.programs.pop();
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    /// Adds an elementary stream to a registered program.
    ///
    /// Streams may join a running session: the PMT gets a new version, a
    /// PCR is forced and the other streams of the program close their
    /// current PES at the next access unit boundary.
    pub fn add_stream(&mut self, program_number: u16, config: &StreamConfig) -> Result<ProducerHandle> {
        self.check_pid(config.pid)?;
        let language = config.language_code()?;
        let kind = config.kind();
        let carriage = carriage_for(config);
        let stream_type = match carriage {
            Carriage::Pes => stream_type_for(config.codec),
            Carriage::SlPes => STREAM_TYPE_MPEG4_SL_PES,
            Carriage::SlSections => STREAM_TYPE_MPEG4_SL_SECTIONS,
        };
        let stream_id = config.stream_id.unwrap_or(match (carriage, kind) {
            (Carriage::SlPes, _) => STREAM_ID_SL_PACKETIZED,
            (_, StreamKind::Video) => STREAM_ID_VIDEO,
            (_, StreamKind::Audio) => STREAM_ID_AUDIO,
            _ => STREAM_ID_PRIVATE_1,
        });
        let section_layout = (carriage == Carriage::SlSections).then(|| {
            let table_id = if kind == StreamKind::ObjectDescriptor {
                TABLE_ID_MPEG4_OD
            } else {
                TABLE_ID_MPEG4_BIFS
            };
            SectionLayout::mpeg4(table_id, self.transport_stream_id)
        });
        let packetizer = PacketizerConfig {
            pid: config.pid,
            stream_id,
            timescale: config.timescale,
            carriage,
            sl: config.sl,
            one_au_per_pes: self.one_au_per_pes || carriage != Carriage::Pes,
            section_layout,
            repeat_rate_ms: config.repeat_rate_ms,
        };

        let started = self.started;
        let queue_capacity = self.queue_capacity;
        let program = self
            .programs
            .iter_mut()
            .find(|p| p.number == program_number)
            .ok_or(MuxError::ProgramNotFound(program_number))?;

        let (source, handle) = PacketizedSource::new(packetizer, queue_capacity);
        let mut entry = PmtEntry::new(stream_type, config.pid);
        entry.es_id = config.es_id;
        entry.language = language;
        entry.descriptors = config.descriptors.clone();

        if started {
            for stream in &mut program.streams {
                if let Some(source) = stream.source_mut().as_packetized_mut() {
                    source.force_pes_boundary();
                }
            }
            program.clock.force_pcr();
        }
        program.push_stream(
            Stream::new(config.pid, kind, StreamSource::Packetized(source)),
            entry,
            config.is_pcr,
        );
        info!(
            "program {}: added PID {} ({:?}, stream_type 0x{:02x}, {:?})",
            program_number, config.pid, config.codec, stream_type, carriage
        );
        Ok(handle)
    }

    /// Tears a program down. The PAT is regenerated; once the last program
    /// is gone the session reports [`ProcessResult::Eos`].
    pub fn remove_program(&mut self, number: u16) -> Result<()> {
        let index = self
            .programs
            .iter()
            .position(|p| p.number == number)
            .ok_or(MuxError::ProgramNotFound(number))?;
        self.programs.remove(index);
        self.pat_dirty = true;
        info!("removed program {}", number);
        Ok(())
    }

    /// Sets the output bitrate. A non-zero rate turns on padding to that
    /// rate, 0 turns it off.
    pub fn set_target_bitrate(&mut self, bps: u64) {
        let previous = self.fixed_rate.then_some(self.target_bitrate);
        let (now, packets) = (self.time, self.packets_sent);
        for program in &mut self.programs {
            program.clock.rebase(now, now, packets, previous);
        }
        self.target_bitrate = bps;
        self.fixed_rate = bps > 0;
        self.rate_anchor = (now, packets);
        self.recompute_bitrate();
        info!("target bitrate set to {} bps", bps);
    }

    /// Overrides the initial PCR value (27 MHz). Only allowed before start.
    pub fn set_initial_pcr(&mut self, value: u64) -> Result<()> {
        if self.started {
            return Err(MuxError::AlreadyStarted);
        }
        self.initial_pcr = value % PCR_WRAP;
        Ok(())
    }

    /// Rewinds mux time to zero. Table carousels restart, program clocks
    /// are re-anchored without letting the PCR go backwards, and producer
    /// timestamps are re-based on their next access unit.
    pub fn reset_time(&mut self) {
        let bitrate = self.fixed_rate.then_some(self.target_bitrate);
        let (old, packets) = (self.time, self.packets_sent);
        if let Some(table) = self.pat.source_mut().as_table_mut() {
            table.reset_time(MuxTime::ZERO);
        }
        for program in &mut self.programs {
            program.clock.rebase(old, MuxTime::ZERO, packets, bitrate);
            if let Some(table) = program.pmt.source_mut().as_table_mut() {
                table.reset_time(MuxTime::ZERO);
            }
            for stream in &mut program.streams {
                if let Some(source) = stream.source_mut().as_packetized_mut() {
                    source.reset_time(MuxTime::ZERO);
                }
            }
        }
        self.time = MuxTime::ZERO;
        self.rate_anchor = (MuxTime::ZERO, packets);
        self.window_start = MuxTime::ZERO;
        self.window_packets = 0;
        info!("mux time reset at {}", old);
    }

    /// Produces the next transport packet.
    ///
    /// A due PCR is served first. Otherwise the most overdue PID wins, with
    /// padding or [`ProcessResult::Idle`] when nothing is due.
    pub fn process(&mut self) -> Result<ProcessResult> {
        if self.programs.is_empty() {
            return if self.started {
                Ok(ProcessResult::Eos)
            } else {
                Err(MuxError::NoProgram)
            };
        }
        if !self.real_time && self.all_streams_finished() {
            return Ok(ProcessResult::Eos);
        }
        if !self.started {
            self.started = true;
            info!(
                "starting multiplex: {} programs, {} bps{}",
                self.programs.len(),
                self.target_bitrate,
                if self.fixed_rate { " fixed rate" } else { "" }
            );
        }
        self.refresh_tables();
        if self.fixed_rate {
            self.time = self.fixed_rate_time();
        }

        let candidates = self.collect_candidates();
        if !self.fixed_rate && most_urgent(&candidates, self.time).is_none() {
            // without padding the clock jumps straight to the next data
            let es: Vec<Candidate> = candidates
                .iter()
                .filter(|c| matches!(c.target, Target::Es { .. }))
                .copied()
                .collect();
            if let Some(next) = earliest(&es) {
                if next.due > self.time {
                    trace!("mux time {} -> {}", self.time, next.due);
                    self.time = next.due;
                }
            }
        }
        let now = self.time;

        if let Some(packet) = self.send_due_pcr(&candidates, now)? {
            return Ok(self.account(packet));
        }
        if let Some(candidate) = most_urgent(&candidates, now) {
            if let Some(packet) = self.send_candidate(candidate, now)? {
                return Ok(self.account(packet));
            }
        }
        if self.fixed_rate {
            return Ok(self.send_padding(now));
        }
        Ok(ProcessResult::Idle)
    }

    fn check_pid(&self, pid: u16) -> Result<()> {
        if !(PID_MIN_ASSIGNABLE..=PID_MAX_ASSIGNABLE).contains(&pid) {
            return Err(MuxError::InvalidPid(pid));
        }
        if self.programs.iter().any(|p| p.has_pid(pid)) {
            return Err(MuxError::DuplicatePid(pid));
        }
        Ok(())
    }

    fn all_streams_finished(&self) -> bool {
        let mut streams = self
            .programs
            .iter()
            .flat_map(|p| p.streams.iter())
            .peekable();
        streams.peek().is_some()
            && streams.all(|s| s.source().as_packetized().map_or(true, |p| p.is_finished()))
    }

    fn refresh_tables(&mut self) {
        let mut rebuilt = false;
        if self.pat_dirty {
            let entries: Vec<(u16, u16)> = self
                .programs
                .iter()
                .map(|p| (p.number, p.pmt_pid()))
                .collect();
            if let Some(table) = self.pat.source_mut().as_table_mut() {
                table.rebuild(&pat_payload(&entries), None);
            }
            self.pat_dirty = false;
            rebuilt = true;
        }
        for program in &mut self.programs {
            if program.needs_reconfig {
                program.rebuild_pmt();
                rebuilt = true;
            }
        }
        if rebuilt {
            self.recompute_bitrate();
        }
    }

    fn fixed_rate_time(&self) -> MuxTime {
        let (anchor, anchor_packets) = self.rate_anchor;
        let sent = self.packets_sent.saturating_sub(anchor_packets) as u128;
        let nanos = sent * TS_PACKET_BITS as u128 * 1_000_000_000 / self.target_bitrate.max(1) as u128;
        anchor.add(MuxTime::from_nanos(nanos))
    }

    fn collect_candidates(&mut self) -> Vec<Candidate> {
        let now = self.time;
        let mut candidates = Vec::new();
        if let Some(due) = self.pat.source().as_table().and_then(|t| t.next_due()) {
            candidates.push(Candidate {
                target: Target::Pat,
                pid: PID_PAT,
                due,
                priority: false,
            });
        }

        let mut bitrate_changed = false;
        for (pi, program) in self.programs.iter_mut().enumerate() {
            if let Some(due) = program.pmt.source().as_table().and_then(|t| t.next_due()) {
                candidates.push(Candidate {
                    target: Target::Pmt { program: pi },
                    pid: program.pmt.pid(),
                    due,
                    priority: false,
                });
            }
            let Program { streams, clock, .. } = program;
            if clock.is_running() && !clock.has_initial_dts() {
                let earliest = streams
                    .iter_mut()
                    .filter_map(|s| s.source_mut().as_packetized_mut())
                    .filter_map(|source| source.front_dts())
                    .min();
                if let Some(dts) = earliest {
                    clock.anchor(dts, now);
                }
            }
            for (si, stream) in streams.iter_mut().enumerate() {
                let pid = stream.pid();
                let priority = stream.kind() == StreamKind::ObjectDescriptor;
                let Some(source) = stream.source_mut().as_packetized_mut() else {
                    continue;
                };
                bitrate_changed |= source.take_bitrate_update();
                if let Some(due) = source.poll_due(clock, now) {
                    candidates.push(Candidate {
                        target: Target::Es {
                            program: pi,
                            stream: si,
                        },
                        pid,
                        due,
                        priority,
                    });
                }
            }
        }
        if bitrate_changed {
            self.recompute_bitrate();
        }
        candidates
    }

    /// Sends the PCR of the first program whose PCR is overdue, on a data
    /// packet of its PCR stream when one is ready, else on its own.
    fn send_due_pcr(&mut self, candidates: &[Candidate], now: MuxTime) -> Result<Option<MuxPacket>> {
        let bitrate = self.fixed_rate.then_some(self.target_bitrate);
        let packets = self.packets_sent;
        for (pi, program) in self.programs.iter_mut().enumerate() {
            if !program.clock.pcr_due(now, program.settings.pcr_interval_ms) {
                continue;
            }
            let Some(si) = program.pcr_stream_index() else {
                continue;
            };
            let Some(pcr) = program.clock.pcr_at(now, packets, bitrate) else {
                continue;
            };
            let target = Target::Es {
                program: pi,
                stream: si,
            };
            let data_ready = candidates.iter().any(|c| c.target == target && c.due <= now);

            let stream = &mut program.streams[si];
            let pid = stream.pid();
            let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
            if data_ready {
                let adaptation = AdaptationRequest {
                    pcr: Some(pcr),
                    ..Default::default()
                };
                if let Some((_, stuffing)) =
                    none_on_no_data(stream.write_next_packet(&mut buf, adaptation, now))?
                {
                    self.pes_stuffing_bytes += stuffing as u64;
                }
            }
            if buf.is_empty() {
                stream.write_pcr_only_packet(&mut buf, pcr)?;
                trace!("PID {}: PCR-only packet, PCR {}", pid, pcr);
            }
            program.clock.on_pcr_sent(pcr, now);
            return Ok(Some(MuxPacket {
                data: buf.freeze(),
                pid,
                time: now,
                pcr: Some(pcr),
            }));
        }
        Ok(None)
    }

    fn send_candidate(&mut self, candidate: Candidate, now: MuxTime) -> Result<Option<MuxPacket>> {
        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        let packets = self.packets_sent;
        let mut pcr = None;
        match candidate.target {
            Target::Pat => {
                let sent = self
                    .pat
                    .write_next_packet(&mut buf, AdaptationRequest::default(), now);
                if none_on_no_data(sent)?.is_none() {
                    return Ok(None);
                }
            }
            Target::Pmt { program } => {
                let program = &mut self.programs[program];
                let sent = program
                    .pmt
                    .write_next_packet(&mut buf, AdaptationRequest::default(), now);
                if none_on_no_data(sent)?.is_none() {
                    return Ok(None);
                }
                if !program.clock.is_running() {
                    program
                        .clock
                        .init_pcr(program.number, self.initial_pcr, now, packets);
                }
            }
            Target::Es { program, stream } => {
                let bitrate = self.fixed_rate.then_some(self.target_bitrate);
                let program = &mut self.programs[program];
                let is_pcr_stream = program.pcr_stream_index() == Some(stream);
                let stream = &mut program.streams[stream];
                let settings = &program.settings;
                if is_pcr_stream
                    && (program.clock.pcr_early(
                        now,
                        settings.pcr_interval_ms,
                        settings.pcr_tolerance_ms,
                    ) || stream.next_is_random_access())
                {
                    pcr = program.clock.pcr_at(now, packets, bitrate);
                }
                let adaptation = AdaptationRequest {
                    pcr,
                    ..Default::default()
                };
                let Some((_, stuffing)) =
                    none_on_no_data(stream.write_next_packet(&mut buf, adaptation, now))?
                else {
                    return Ok(None);
                };
                self.pes_stuffing_bytes += stuffing as u64;
                if let Some(pcr) = pcr {
                    program.clock.on_pcr_sent(pcr, now);
                }
            }
        }
        trace!(
            "{}: PID {} due {} (urgency {} ns)",
            now,
            candidate.pid,
            candidate.due,
            candidate.urgency(now)
        );
        Ok(Some(MuxPacket {
            data: buf.freeze(),
            pid: candidate.pid,
            time: now,
            pcr,
        }))
    }

    fn send_padding(&mut self, now: MuxTime) -> ProcessResult {
        self.padding_sent += 1;
        let packet = MuxPacket {
            data: self.null_packet.clone(),
            pid: PID_NULL,
            time: now,
            pcr: None,
        };
        match self.account(packet) {
            ProcessResult::Data(packet) => ProcessResult::Padding(packet),
            other => other,
        }
    }

    fn account(&mut self, packet: MuxPacket) -> ProcessResult {
        self.packets_sent += 1;
        self.window_packets += 1;
        let elapsed = self.time.saturating_sub(self.window_start).as_millis();
        if elapsed >= STATS_WINDOW_MS {
            // bits per millisecond is kbps
            self.average_bitrate_kbps = self.window_packets * TS_PACKET_BITS / elapsed;
            self.window_start = self.time;
            self.window_packets = 0;
        }
        ProcessResult::Data(packet)
    }

    fn recompute_bitrate(&mut self) {
        if self.fixed_rate {
            self.mux_bitrate = self.target_bitrate;
            return;
        }
        let tables = self.pat.stats().bitrate
            + self
                .programs
                .iter()
                .map(|p| p.pmt.stats().bitrate)
                .sum::<u64>();
        let streams: u64 = self
            .programs
            .iter()
            .flat_map(|p| p.streams.iter())
            .map(|s| s.stats().bitrate)
            .sum();
        self.mux_bitrate = tables + streams;
        debug!("mux bitrate now {} bps", self.mux_bitrate);
    }

    pub fn transport_stream_id(&self) -> u16 {
        self.transport_stream_id
    }

    pub fn time(&self) -> MuxTime {
        self.time
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_fixed_rate(&self) -> bool {
        self.fixed_rate
    }

    pub fn is_real_time(&self) -> bool {
        self.real_time
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    pub fn program(&self, number: u16) -> Option<&Program> {
        self.programs.iter().find(|p| p.number == number)
    }

    pub fn stats(&self) -> MuxStats {
        MuxStats {
            packets_sent: self.packets_sent,
            padding_sent: self.padding_sent,
            pes_stuffing_bytes: self.pes_stuffing_bytes,
            average_bitrate_kbps: self.average_bitrate_kbps,
            mux_bitrate: self.mux_bitrate,
            time: self.time,
        }
    }

    /// Counters of every PID, PAT first
    pub fn stream_stats(&self) -> Vec<StreamStats> {
        let mut stats = vec![self.pat.stats()];
        for program in &self.programs {
            stats.push(program.pmt.stats());
            stats.extend(program.streams.iter().map(|s| s.stats()));
        }
        stats
    }

    pub fn program_diagnostics(&self, number: u16) -> Option<PcrDiagnostics> {
        self.program(number).map(|p| p.clock.diagnostics(p.number))
    }
}

fn carriage_for(config: &StreamConfig) -> Carriage {
    match config.codec {
        CodecType::Mpeg4Systems if config.sl_over_pes => Carriage::SlPes,
        CodecType::Mpeg4Systems => Carriage::SlSections,
        CodecType::Jpeg | CodecType::Png => Carriage::SlPes,
        _ => Carriage::Pes,
    }
}

fn none_on_no_data<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(MuxError::NoData) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Null packet: PID 0x1FFF, payload only, stuffed with 0xFF
fn null_packet() -> Bytes {
    let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
    let header = TSHeader {
        pid: PID_NULL,
        ..Default::default()
    };
    header.write_to(&mut buf);
    buf.put_bytes(0xff, TS_PAYLOAD_SIZE);
    buf.freeze()
}
