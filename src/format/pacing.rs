//! Drives a [`TsMuxer`] against a [`PacketSink`], pacing packets to the
//! wall clock for live output.

use super::ts::{ProcessResult, TsMuxer};
use super::PacketSink;
use crate::Result;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

/// Wait after an [`ProcessResult::Idle`] before asking again
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// What a [`PacingDriver::run`] produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacingSummary {
    /// Packets handed to the sink, padding included
    pub packets: u64,
    pub padding: u64,
    pub idle_waits: u64,
    /// The loop ended because the stop flag was raised
    pub stopped: bool,
}

pub struct PacingDriver<S: PacketSink> {
    mux: TsMuxer,
    sink: S,
    stop: Arc<AtomicBool>,
    idle_backoff: Duration,
    paced: bool,
}

impl<S: PacketSink> PacingDriver<S> {
    /// Packets are paced when the session is fixed-rate or real-time
    pub fn new(mux: TsMuxer, sink: S) -> Self {
        let paced = mux.is_fixed_rate() || mux.is_real_time();
        Self {
            mux,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            paced,
        }
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    pub fn with_pacing(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Flag checked once per loop iteration; raising it ends [`run`](Self::run)
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn mux(&self) -> &TsMuxer {
        &self.mux
    }

    pub fn mux_mut(&mut self) -> &mut TsMuxer {
        &mut self.mux
    }

    pub fn into_parts(self) -> (TsMuxer, S) {
        (self.mux, self.sink)
    }

    /// Pulls packets until end of stream or until stopped, then flushes the
    /// sink.
    pub async fn run(&mut self) -> Result<PacingSummary> {
        let start = Instant::now();
        let mut summary = PacingSummary::default();
        info!("pacing driver started (paced: {})", self.paced);

        loop {
            if self.stop.load(Ordering::Relaxed) {
                summary.stopped = true;
                break;
            }
            let packet = match self.mux.process()? {
                ProcessResult::Data(packet) => packet,
                ProcessResult::Padding(packet) => {
                    summary.padding += 1;
                    packet
                }
                ProcessResult::Idle => {
                    summary.idle_waits += 1;
                    sleep(self.idle_backoff).await;
                    continue;
                }
                ProcessResult::Eos => break,
            };
            if self.paced {
                sleep_until(start + Duration::from(packet.time)).await;
            }
            self.sink.send_packet(&packet.data).await?;
            summary.packets += 1;
        }

        self.sink.flush().await?;
        debug!("pacing driver finished: {:?}", summary);
        Ok(summary)
    }
}
