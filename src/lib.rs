#![doc(html_root_url = "https://docs.rs/tsmux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsmux - MPEG-2 Transport Stream Multiplexer
//!
//! `tsmux` interleaves already-encoded elementary streams into an MPEG-2
//! transport stream: a sequence of 188-byte packets ready for a file, a UDP
//! socket or any other byte sink.
//!
//! ## Features
//!
//! ### Signaling
//! - PAT and PMT generation, split into sections and carouselled at a
//!   configurable refresh rate
//! - Language, registration (AC-3, VC-1), E-AC-3 and MPEG-4 SL / IOD
//!   descriptors
//!
//! ### Packetization
//! - PES packetization with PES packing or one access unit per PES
//! - MPEG-4 Synchronization Layer carriage over PES or sections
//! - Bounded per-stream producer queues with back-pressure
//!
//! ### Timing
//! - Per-program PCR model derived from the packet count or the mux clock
//! - Urgency-based packet scheduling, PCR first
//! - Fixed-rate output with null packet padding
//! - Async pacing driver for live output
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tsmux = "0.1.0"
//! ```
//!
//! ### Muxing to a file
//!
//! ```rust,no_run
//! use tsmux::config::MuxConfig;
//! use tsmux::format::pacing::PacingDriver;
//! use tsmux::format::ts::TsMuxer;
//! use tsmux::format::WriterSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MuxConfig::load()?;
//!     let (mux, handles) = TsMuxer::from_config(&config)?;
//!
//!     // hand the producer handles to the encoders
//!     for handle in &handles {
//!         handle.end_of_stream();
//!     }
//!
//!     let file = tokio::fs::File::create("output.ts").await?;
//!     let mut driver = PacingDriver::new(mux, WriterSink::new(file));
//!     let summary = driver.run().await?;
//!     println!("wrote {} packets", summary.packets);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: Access units and elementary stream descriptions
//!
//! - `config`: Session, program and stream settings
//!   - TOML files and environment overrides
//!
//! - `format`: Transport stream multiplexing
//!   - Packet sinks and the pacing driver
//!   - TS packets, PSI tables, PES and SL packetization
//!
//! - `error`: Error handling types and utilities
//!   - Custom error types for different failure scenarios
//!   - Result type alias for convenience
//!
//! - `utils`: Common utilities and helper functions
//!   - Bitstream reading/writing
//!   - CRC calculations
//!
/// Access units and elementary stream types
pub mod av;

/// Error types and utilities
pub mod error;

/// Transport stream multiplexing, sinks and pacing
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use config::MuxConfig;
pub use error::{MuxError, Result};
pub use format::ts::{ProcessResult, ProducerHandle, TsMuxer};
