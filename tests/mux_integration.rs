#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;
    use std::collections::HashMap;
    use tsmux::av::{CodecType, StreamKind};
    use tsmux::config::{MuxConfig, ProgramConfig, StreamConfig};
    use tsmux::error::MuxError;
    use tsmux::format::ts::pes::PESHeader;
    use tsmux::format::ts::{
        MuxPacket, MuxTime, ProcessResult, ProducerHandle, TsMuxer, TsPacketParser, PID_NULL,
        PID_PAT, TS_PACKET_SIZE,
    };

    const VIDEO_PID: u16 = 0x100;
    const AUDIO_PID: u16 = 0x101;
    const PMT_PID: u16 = 0x1000;
    const MAX_CALLS: usize = 200_000;

    /// Packets produced until the session ends or goes idle
    struct Capture {
        packets: Vec<MuxPacket>,
        padding: usize,
        last: ProcessResult,
    }

    fn drain(mux: &mut TsMuxer) -> Capture {
        let mut capture = Capture {
            packets: Vec::new(),
            padding: 0,
            last: ProcessResult::Idle,
        };
        for _ in 0..MAX_CALLS {
            match mux.process().unwrap() {
                ProcessResult::Data(packet) => capture.packets.push(packet),
                ProcessResult::Padding(packet) => {
                    capture.padding += 1;
                    capture.packets.push(packet);
                }
                other => {
                    capture.last = other;
                    return capture;
                }
            }
        }
        panic!("multiplex did not settle after {} calls", MAX_CALLS);
    }

    fn av_program() -> ProgramConfig {
        let mut program = ProgramConfig::new(1, PMT_PID);
        program.pcr_interval_ms = 40;
        program.pcr_tolerance_ms = 10;
        let mut audio = StreamConfig::new(AUDIO_PID, CodecType::Aac);
        audio.language = Some("eng".into());
        program.streams.push(StreamConfig::new(VIDEO_PID, CodecType::H264));
        program.streams.push(audio);
        program
    }

    fn session(config: MuxConfig) -> (TsMuxer, ProducerHandle, ProducerHandle) {
        let config = MuxConfig {
            programs: vec![av_program()],
            queue_capacity: 256,
            ..config
        };
        let (mux, mut handles) = TsMuxer::from_config(&config).unwrap();
        let audio = handles.pop().unwrap();
        let video = handles.pop().unwrap();
        (mux, video, audio)
    }

    /// Distinct bytes per unit so misordering shows up
    fn unit(index: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| (index * 31 + i) as u8).collect()
    }

    /// Elementary stream bytes of `pid` with PES headers stripped
    fn es_payload(packets: &[MuxPacket], pid: u16) -> Vec<u8> {
        let parser = TsPacketParser::new();
        let mut data = Vec::new();
        for packet in packets.iter().filter(|p| p.pid == pid) {
            let parsed = parser.parse_packet(&packet.data).unwrap();
            if parsed.payload.is_empty() {
                continue;
            }
            if parsed.header.payload_unit_start {
                let (_, size) = PESHeader::parse(parsed.payload).unwrap();
                data.extend_from_slice(&parsed.payload[size..]);
            } else {
                data.extend_from_slice(parsed.payload);
            }
        }
        data
    }

    fn continuity_holds(packets: &[MuxPacket]) -> bool {
        let parser = TsPacketParser::new();
        let mut counters: HashMap<u16, u8> = HashMap::new();
        for packet in packets {
            let header = parser.parse_header(&packet.data).unwrap();
            if header.pid == PID_NULL || !header.contains_payload {
                continue;
            }
            if let Some(last) = counters.get(&header.pid) {
                if header.continuity_counter != (last + 1) & 0x0f {
                    return false;
                }
            }
            counters.insert(header.pid, header.continuity_counter);
        }
        true
    }

    fn pcr_values(packets: &[MuxPacket]) -> Vec<(MuxTime, u64)> {
        let parser = TsPacketParser::new();
        packets
            .iter()
            .filter_map(|p| {
                let parsed = parser.parse_packet(&p.data).ok()?;
                let pcr = parsed.adaptation?.pcr?;
                Some((p.time, pcr))
            })
            .collect()
    }

    /// 2 s of 4 Mbps video and 128 kbps audio, all queued up front
    fn push_av(video: &ProducerHandle, audio: &ProducerHandle) -> (Vec<u8>, Vec<u8>) {
        let mut video_data = Vec::new();
        for i in 0..50 {
            let data = unit(i, 20_000);
            video_data.extend_from_slice(&data);
            let dts = i as u64 * 3600;
            video.push_access_unit(data, dts, dts, i % 25 == 0).unwrap();
        }
        let mut audio_data = Vec::new();
        for i in 0..94 {
            let data = unit(i + 7, 341);
            audio_data.extend_from_slice(&data);
            let dts = i as u64 * 1920;
            audio.push_access_unit(data, dts, dts, true).unwrap();
        }
        video.end_of_stream();
        audio.end_of_stream();
        (video_data, audio_data)
    }

    #[test]
    fn test_fixed_rate_session() {
        let (mut mux, video, audio) = session(MuxConfig {
            rate: 5_200_000,
            fixed_rate: true,
            ..Default::default()
        });
        let (video_data, audio_data) = push_av(&video, &audio);
        let capture = drain(&mut mux);
        assert_eq!(capture.last, ProcessResult::Eos);
        let packets = &capture.packets;
        println!("{} packets, {} padding", packets.len(), capture.padding);

        assert!(packets.iter().all(|p| p.data.len() == TS_PACKET_SIZE));
        assert_eq!(packets[0].pid, PID_PAT);
        assert_eq!(packets[1].pid, PMT_PID);

        // signaling
        let parser = TsPacketParser::new();
        let pat = parser.parse_packet(&packets[0].data).unwrap();
        let pat = parser.parse_pat(&pat.payload[1..]).unwrap();
        assert_eq!(pat.entries.len(), 1);
        assert_eq!(pat.entries[0].program_number, 1);
        assert_eq!(pat.entries[0].pmt_pid, PMT_PID);
        let pmt = parser.parse_packet(&packets[1].data).unwrap();
        let pmt = parser.parse_pmt(&pmt.payload[1..]).unwrap();
        assert_eq!(pmt.pcr_pid, VIDEO_PID);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[0].stream_type, 0x1b);
        assert_eq!(pmt.streams[1].stream_type, 0x0f);
        assert_eq!(pmt.streams[1].descriptors[0].data, b"eng".to_vec());

        // every pushed byte comes back, in order
        assert_eq!(es_payload(packets, VIDEO_PID), video_data);
        assert_eq!(es_payload(packets, AUDIO_PID), audio_data);
        assert!(continuity_holds(packets));

        // PCR cadence: never further apart than the interval plus two packets
        let pcrs = pcr_values(packets);
        assert!(pcrs.len() >= 45);
        for pair in pcrs.windows(2) {
            let delta = pair[1].1 - pair[0].1;
            assert!(delta <= 1_080_000 + 2 * 7810, "PCR gap {} ticks", delta);
        }

        // packets per second of mux time match the rate within one packet
        let in_window = packets
            .iter()
            .filter(|p| {
                p.time >= MuxTime::from_millis(500) && p.time < MuxTime::from_millis(1500)
            })
            .count() as i64;
        let expected = 5_200_000 / 1504;
        assert!((in_window - expected).abs() <= 1, "{} packets", in_window);

        let stats = mux.stats();
        assert_eq!(stats.packets_sent, packets.len() as u64);
        assert_eq!(stats.padding_sent, capture.padding as u64);
        assert!(capture.padding > 0);
        assert!(
            (5150..=5250).contains(&stats.average_bitrate_kbps),
            "{} kbps",
            stats.average_bitrate_kbps
        );
    }

    #[test]
    fn test_pcr_is_monotonic_and_carousels_repeat() {
        let (mut mux, video, audio) = session(MuxConfig {
            rate: 5_200_000,
            fixed_rate: true,
            ..Default::default()
        });
        push_av(&video, &audio);
        let packets = drain(&mut mux).packets;

        let pcrs = pcr_values(&packets);
        assert!(pcrs.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(pcrs.windows(2).all(|w| w[0].0 <= w[1].0));

        for pid in [PID_PAT, PMT_PID] {
            let times: Vec<MuxTime> = packets
                .iter()
                .filter(|p| p.pid == pid)
                .map(|p| p.time)
                .collect();
            assert!(times.len() >= 15, "PID {} sent {} times", pid, times.len());
            for pair in times.windows(2) {
                let gap = pair[1].saturating_sub(pair[0]).as_millis();
                assert!((100..150).contains(&gap), "PID {} gap {} ms", pid, gap);
            }
        }
    }

    #[test]
    fn test_unconstrained_session_idles_then_ends() {
        let (mut mux, video, audio) = session(MuxConfig::default());
        let start = drain(&mut mux);
        assert_eq!(start.last, ProcessResult::Idle);
        // PAT, PMT and a PCR without payload
        assert_eq!(start.packets.len(), 3);
        assert_eq!(start.packets[2].pcr, Some(0));
        assert_eq!(start.padding, 0);

        video.push_access_unit(unit(0, 500), 0, 0, true).unwrap();
        let first = drain(&mut mux);
        assert_eq!(first.last, ProcessResult::Idle);
        assert_eq!(es_payload(&first.packets, VIDEO_PID), unit(0, 500));

        // the clock jumps forward to the next unit instead of padding
        video.push_access_unit(unit(1, 100), 9000, 9000, false).unwrap();
        let second = drain(&mut mux);
        assert_eq!(second.packets.last().map(|p| p.time), Some(MuxTime::from_millis(100)));

        video.end_of_stream();
        assert_eq!(mux.process().unwrap(), ProcessResult::Idle);
        audio.end_of_stream();
        assert_eq!(mux.process().unwrap(), ProcessResult::Eos);
    }

    #[test]
    fn test_real_time_session_never_ends() {
        let (mut mux, video, audio) = session(MuxConfig {
            real_time: true,
            ..Default::default()
        });
        video.end_of_stream();
        audio.end_of_stream();
        let capture = drain(&mut mux);
        assert_eq!(capture.last, ProcessResult::Idle);
    }

    #[test]
    fn test_identical_topology_gives_identical_pmt() {
        let (mut first, ..) = session(MuxConfig::default());
        let (mut second, ..) = session(MuxConfig::default());
        for _ in 0..2 {
            let a = first.process().unwrap();
            let b = second.process().unwrap();
            assert_eq!(a.packet().map(|p| &p.data), b.packet().map(|p| &p.data));
        }
    }

    #[test]
    fn test_back_pressure() {
        let config = MuxConfig {
            queue_capacity: 2,
            programs: vec![av_program()],
            ..Default::default()
        };
        let (mut mux, handles) = TsMuxer::from_config(&config).unwrap();
        let video = &handles[0];
        video.push_access_unit(unit(0, 10), 0, 0, true).unwrap();
        video.push_access_unit(unit(1, 10), 3600, 3600, false).unwrap();
        assert!(matches!(
            video.push_access_unit(unit(2, 10), 7200, 7200, false),
            Err(MuxError::QueueFull { pid: VIDEO_PID })
        ));

        // draining the queue makes room again
        drain(&mut mux);
        video.push_access_unit(unit(2, 10), 7200, 7200, false).unwrap();
    }

    #[test]
    fn test_session_errors() {
        let mut mux = TsMuxer::new(&MuxConfig::default());
        assert!(matches!(mux.process(), Err(MuxError::NoProgram)));

        let mut bad = ProgramConfig::new(1, 0x1000);
        bad.streams.push(StreamConfig::new(0x1000, CodecType::H264));
        assert!(matches!(
            mux.add_program(&bad),
            Err(MuxError::DuplicatePid(0x1000))
        ));
        assert!(matches!(
            mux.add_program(&ProgramConfig::new(1, 0x0001)),
            Err(MuxError::InvalidPid(0x0001))
        ));

        mux.add_program(&av_program()).unwrap();
        mux.process().unwrap();
        assert!(matches!(
            mux.add_program(&ProgramConfig::new(2, 0x1001)),
            Err(MuxError::AlreadyStarted)
        ));
        assert!(matches!(
            mux.remove_program(7),
            Err(MuxError::ProgramNotFound(7))
        ));
    }

    #[test]
    fn test_removing_programs() {
        let mut second = ProgramConfig::new(2, 0x1001);
        second.streams.push(StreamConfig::new(0x200, CodecType::Mpeg2Video));
        let config = MuxConfig {
            programs: vec![av_program(), second],
            ..Default::default()
        };
        let (mut mux, _handles) = TsMuxer::from_config(&config).unwrap();
        drain(&mut mux);

        mux.remove_program(1).unwrap();
        let parser = TsPacketParser::new();
        let packet = mux.process().unwrap();
        let packet = packet.packet().unwrap();
        assert_eq!(packet.pid, PID_PAT);
        let parsed = parser.parse_packet(&packet.data).unwrap();
        let pat = parser.parse_pat(&parsed.payload[1..]).unwrap();
        assert_eq!(pat.version, 1);
        assert_eq!(pat.entries.len(), 1);
        assert_eq!(pat.entries[0].program_number, 2);

        mux.remove_program(2).unwrap();
        assert_eq!(mux.process().unwrap(), ProcessResult::Eos);
    }

    #[test]
    fn test_mpeg4_object_descriptors_in_sections() {
        let mut program = ProgramConfig::new(1, PMT_PID);
        program.mpeg4_signaling = true;
        program.iod = Some(vec![0x02, 0x0b, 0x00]);
        let mut video = StreamConfig::new(VIDEO_PID, CodecType::H264);
        video.es_id = Some(1);
        let mut od = StreamConfig::new(0x110, CodecType::Mpeg4Systems);
        od.kind = Some(StreamKind::ObjectDescriptor);
        od.es_id = Some(2);
        od.repeat_rate_ms = 200;
        program.streams.push(video);
        program.streams.push(od);
        let config = MuxConfig {
            programs: vec![program],
            ..Default::default()
        };
        let (mut mux, handles) = TsMuxer::from_config(&config).unwrap();
        handles[0].push_access_unit(unit(0, 100), 0, 0, true).unwrap();
        handles[1].push_access_unit(unit(1, 30), 0, 0, true).unwrap();
        handles[0].end_of_stream();
        handles[1].end_of_stream();
        let packets = drain(&mut mux).packets;

        let parser = TsPacketParser::new();
        let pmt = parser.parse_packet(&packets[1].data).unwrap();
        let pmt = parser.parse_pmt(&pmt.payload[1..]).unwrap();
        assert_eq!(pmt.program_descriptors[0].tag, 0x1d);
        assert_eq!(pmt.streams[1].stream_type, 0x13);
        assert_eq!(pmt.streams[1].descriptors[0].tag, 0x1e);
        assert_eq!(pmt.streams[1].descriptors[0].data, vec![0x00, 0x02]);

        let od_packet = packets.iter().find(|p| p.pid == 0x110).unwrap();
        let parsed = parser.parse_packet(&od_packet.data).unwrap();
        assert!(parsed.header.payload_unit_start);
        let (header, body) = parser.parse_section(&parsed.payload[1..]).unwrap();
        assert_eq!(header.table_id, 0x05);
        assert!(header.private_indicator);
        assert_eq!(header.table_id_extension, 1);
        assert!(body.ends_with(&unit(1, 30)));
    }

    #[test]
    fn test_reset_time_keeps_pcr_increasing() {
        let (mut mux, video, _audio) = session(MuxConfig::default());
        for i in 0..10 {
            let dts = i * 3600;
            video.push_access_unit(unit(i as usize, 1000), dts, dts, i == 0).unwrap();
        }
        let mut packets = drain(&mut mux).packets;
        assert!(mux.time() > MuxTime::ZERO);

        mux.reset_time();
        assert_eq!(mux.time(), MuxTime::ZERO);
        for i in 10..20 {
            let dts = i * 3600;
            video.push_access_unit(unit(i as usize, 1000), dts, dts, false).unwrap();
        }
        packets.extend(drain(&mut mux).packets);
        let pcrs = pcr_values(&packets);
        assert!(pcrs.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(continuity_holds(&packets));
    }

    fn pes_timestamps(packets: &[MuxPacket], pid: u16) -> Vec<(Option<u64>, Option<u64>)> {
        let parser = TsPacketParser::new();
        packets
            .iter()
            .filter(|p| p.pid == pid)
            .filter_map(|p| {
                let parsed = parser.parse_packet(&p.data).ok()?;
                if !parsed.header.payload_unit_start {
                    return None;
                }
                let (header, _) = PESHeader::parse(parsed.payload).ok()?;
                Some((header.pts, header.dts))
            })
            .collect()
    }

    #[test]
    fn test_audio_starting_before_video_keeps_its_timestamps() {
        let (mut mux, video, audio) = session(MuxConfig {
            one_au_per_pes: true,
            ..Default::default()
        });
        video.push_access_unit(unit(0, 3000), 7200, 3600, true).unwrap();
        for i in 0..3u64 {
            audio
                .push_access_unit(unit(i as usize + 1, 400), i * 1920, i * 1920, true)
                .unwrap();
        }
        video.end_of_stream();
        audio.end_of_stream();

        let capture = drain(&mut mux);
        assert_eq!(capture.last, ProcessResult::Eos);
        assert_eq!(
            pes_timestamps(&capture.packets, AUDIO_PID),
            vec![(Some(0), None), (Some(1920), None), (Some(3840), None)]
        );
        assert_eq!(
            pes_timestamps(&capture.packets, VIDEO_PID),
            vec![(Some(7200), Some(3600))]
        );
        let expected: Vec<u8> = (1..4).flat_map(|i| unit(i, 400)).collect();
        assert_eq!(es_payload(&capture.packets, AUDIO_PID), expected);
        assert_eq!(es_payload(&capture.packets, VIDEO_PID), unit(0, 3000));
    }

    #[test]
    fn test_diagnostics_after_start() {
        let (mut mux, video, _audio) = session(MuxConfig::default());
        assert_eq!(mux.program_diagnostics(1).unwrap().pcr_init, None);
        video.push_access_unit(unit(0, 10), 0, 0, true).unwrap();
        drain(&mut mux);
        let diagnostics = mux.program_diagnostics(1).unwrap();
        assert_eq!(diagnostics.pcr_init, Some(0));
        assert_eq!(diagnostics.packets_at_init, Some(1));
        assert_eq!(diagnostics.last_pcr, Some(0));
        assert!(diagnostics.drift_ms.is_some());
        assert!(mux.program_diagnostics(5).is_none());
    }

    #[quickcheck]
    fn prop_any_unit_sizes_round_trip(sizes: Vec<u16>) -> bool {
        let (mut mux, video, audio) = session(MuxConfig::default());
        let mut expected = Vec::new();
        for (i, size) in sizes.iter().take(40).enumerate() {
            let data = unit(i, *size as usize % 5000 + 1);
            expected.extend_from_slice(&data);
            let dts = i as u64 * 3000;
            video.push_access_unit(data, dts + 3000, dts, i % 10 == 0).unwrap();
        }
        video.end_of_stream();
        audio.end_of_stream();
        let capture = drain(&mut mux);
        capture.last == ProcessResult::Eos
            && continuity_holds(&capture.packets)
            && es_payload(&capture.packets, VIDEO_PID) == expected
    }
}
