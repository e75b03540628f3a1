//! # MPEG Transport Stream (TS) Multiplexing
//!
//! This module implements an MPEG-2 transport stream multiplexer:
//!
//! - PAT/PMT generation and carouselling
//! - PES packetization with PES packing, and MPEG-4 SL carriage over PES
//!   or sections
//! - Per-program PCR modeling and insertion
//! - Urgency-based packet scheduling with optional fixed-rate padding
//!
//! ## Example Usage
//!
//! ```rust
//! use tsmux::av::CodecType;
//! use tsmux::config::{MuxConfig, ProgramConfig, StreamConfig};
//! use tsmux::format::ts::{ProcessResult, TsMuxer, PID_PAT};
//!
//! # fn main() -> tsmux::Result<()> {
//! let mut program = ProgramConfig::new(1, 0x1000);
//! program.streams.push(StreamConfig::new(0x100, CodecType::H264));
//! program.streams.push(StreamConfig::new(0x101, CodecType::Aac));
//!
//! let config = MuxConfig {
//!     programs: vec![program],
//!     ..Default::default()
//! };
//! let (mut mux, handles) = TsMuxer::from_config(&config)?;
//! handles[0].push_access_unit(vec![0u8; 1000], 0, 0, true)?;
//!
//! match mux.process()? {
//!     ProcessResult::Data(packet) => assert_eq!(packet.pid, PID_PAT),
//!     other => panic!("unexpected {:?}", other),
//! }
//! # Ok(())
//! # }
//! ```

/// Virtual multiplex time
pub mod clock;

/// The multiplexer session and its scheduling pass
pub mod muxer;

/// Access unit queues and PES / SL packetization
pub mod packetizer;

/// Low-level TS packet parsing utilities
pub mod parser;

/// PES header handling
pub mod pes;

/// Programs and their PCR model
pub mod program;

/// PAT and PMT bodies
pub mod psi;

/// Packet slot ranking
pub mod scheduler;

/// Section framing and table carousels
pub mod section;

/// MPEG-4 SL headers
pub mod sl;

/// PID state and the fragment source contract
pub mod stream;

/// Core TS types and constants
pub mod types;

// Re-export commonly used types and constants
pub use clock::MuxTime;
pub use muxer::{MuxPacket, MuxStats, ProcessResult, TsMuxer};
pub use packetizer::{Carriage, ProducerHandle};
pub use parser::TsPacketParser;
pub use pes::PESHeader;
pub use program::{PcrDiagnostics, PcrState, Program};
pub use section::{SectionLayout, TableSource};
pub use sl::{SlConfig, SlHeader};
pub use stream::{Fragment, FragmentSource, StreamStats};
pub use types::{
    Descriptor, TSHeader, PID_NULL, PID_PAT, STREAM_TYPE_AAC, STREAM_TYPE_H264,
    STREAM_TYPE_H265, TS_PACKET_SIZE,
};
