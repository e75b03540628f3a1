#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::Instant;
    use tsmux::av::CodecType;
    use tsmux::config::{MuxConfig, ProgramConfig, StreamConfig};
    use tsmux::format::pacing::PacingDriver;
    use tsmux::format::ts::{TsMuxer, TsPacketParser, PID_NULL, TS_PACKET_SIZE};
    use tsmux::format::{MemorySink, WriterSink};

    fn config(rate: u64, real_time: bool) -> MuxConfig {
        let mut program = ProgramConfig::new(1, 0x1000);
        program.streams.push(StreamConfig::new(0x100, CodecType::H264));
        MuxConfig {
            rate,
            fixed_rate: rate > 0,
            real_time,
            programs: vec![program],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_rate_output_is_paced() {
        // 1.504 Mbps: exactly one packet per millisecond
        let (mux, handles) = TsMuxer::from_config(&config(1_504_000, false)).unwrap();
        for i in 0..5u64 {
            let dts = i * 9000;
            handles[0]
                .push_access_unit(vec![i as u8; 3000], dts, dts, i == 0)
                .unwrap();
        }
        handles[0].end_of_stream();

        let start = Instant::now();
        let mut driver = PacingDriver::new(mux, MemorySink::new());
        let summary = driver.run().await.unwrap();
        let elapsed = start.elapsed();

        assert!(!summary.stopped);
        assert!(summary.padding > 0);
        let (mux, sink) = driver.into_parts();
        assert_eq!(sink.packets.len() as u64, summary.packets);
        assert_eq!(mux.stats().packets_sent, summary.packets);
        assert_eq!(sink.flushes, 1);

        // the last packet leaves (packets - 1) ms after the first
        assert!(elapsed >= Duration::from_millis(summary.packets - 1));

        let parser = TsPacketParser::new();
        let nulls = sink
            .packets
            .iter()
            .filter(|p| parser.parse_header(p).unwrap().pid == PID_NULL)
            .count() as u64;
        assert_eq!(nulls, summary.padding);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_handle_ends_live_session() {
        let (mux, _handles) = TsMuxer::from_config(&config(0, true)).unwrap();
        let mut driver = PacingDriver::new(mux, MemorySink::new());
        let stop = driver.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.store(true, Ordering::Relaxed);
        });

        let summary = driver.run().await.unwrap();
        assert!(summary.stopped);
        // PAT, PMT and the first PCR, then nothing to send
        assert_eq!(summary.packets, 3);
        assert!(summary.idle_waits >= 5);
    }

    #[tokio::test]
    async fn test_unpaced_run_to_writer() {
        let (mux, handles) = TsMuxer::from_config(&config(0, false)).unwrap();
        handles[0]
            .push_access_unit(vec![0x11; 1000], 0, 0, true)
            .unwrap();
        handles[0].end_of_stream();

        let mut driver = PacingDriver::new(mux, WriterSink::new(Vec::new()));
        let summary = driver.run().await.unwrap();
        let (_, sink) = driver.into_parts();
        assert_eq!(
            sink.bytes_written(),
            summary.packets * TS_PACKET_SIZE as u64
        );
        assert_eq!(sink.into_inner().len() as u64, summary.packets * 188);
    }
}
