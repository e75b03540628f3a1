use crate::av::{CodecType, StreamKind};
use crate::error::{MuxError, Result};
use crate::format::ts::{Descriptor, SlConfig};
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Files searched, in order, by [`MuxConfig::load`]
pub const CONFIG_PATHS: [&str; 2] = ["./tsmux.toml", "./config.toml"];

/// Session-wide multiplexer settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Target output bitrate in bits per second, 0 for unconstrained
    pub rate: u64,
    /// Pad the output with null packets to hold `rate`
    pub fixed_rate: bool,
    /// Data is produced live; the session never ends on its own
    pub real_time: bool,
    pub transport_stream_id: u16,
    pub pat_refresh_ms: u32,
    /// Initial PCR value on the 27 MHz clock
    pub initial_pcr: u64,
    /// Close every PES at the end of its access unit
    pub one_au_per_pes: bool,
    /// Access units a producer may queue ahead of the multiplexer
    pub queue_capacity: usize,
    pub programs: Vec<ProgramConfig>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            rate: 0,
            fixed_rate: false,
            real_time: false,
            transport_stream_id: 1,
            pat_refresh_ms: 100,
            initial_pcr: 0,
            one_au_per_pes: false,
            queue_capacity: 64,
            programs: Vec::new(),
        }
    }
}

/// One program of the multiplex
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    pub number: u16,
    pub pmt_pid: u16,
    pub pmt_refresh_ms: u32,
    /// Delay between arrival and decoding of the first unit, 90 kHz ticks
    pub pcr_offset: u64,
    /// Maximum spacing of PCR packets
    pub pcr_interval_ms: u32,
    /// How much earlier than `pcr_interval_ms` a PCR may ride along on a
    /// PCR stream packet that is sent anyway
    pub pcr_tolerance_ms: u32,
    /// Announce MPEG-4 systems (SL descriptors and IOD)
    pub mpeg4_signaling: bool,
    /// Encoded InitialObjectDescriptor
    pub iod: Option<Vec<u8>>,
    #[serde(skip)]
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<StreamConfig>,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            number: 1,
            pmt_pid: 0x1000,
            pmt_refresh_ms: 100,
            pcr_offset: 0,
            pcr_interval_ms: 40,
            pcr_tolerance_ms: 10,
            mpeg4_signaling: false,
            iod: None,
            descriptors: Vec::new(),
            streams: Vec::new(),
        }
    }
}

impl ProgramConfig {
    pub fn new(number: u16, pmt_pid: u16) -> Self {
        Self {
            number,
            pmt_pid,
            ..Default::default()
        }
    }
}

/// One elementary stream of a program
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub pid: u16,
    pub codec: CodecType,
    /// Overrides the kind derived from the codec
    pub kind: Option<StreamKind>,
    /// Ticks per second of the producer's timestamps
    pub timescale: u64,
    /// ISO 639-2 code, e.g. "eng"
    pub language: Option<String>,
    /// MPEG-4 ES_ID
    pub es_id: Option<u16>,
    /// Carry the program's PCR; the first stream is used when none is set
    pub is_pcr: bool,
    /// Overrides the PES stream_id
    pub stream_id: Option<u8>,
    pub sl: SlConfig,
    /// Send MPEG-4 systems units in PES instead of sections
    pub sl_over_pes: bool,
    /// Carousel period of section-carried streams, 0 to send once
    pub repeat_rate_ms: u32,
    #[serde(skip)]
    pub descriptors: Vec<Descriptor>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pid: 0x100,
            codec: CodecType::Private,
            kind: None,
            timescale: 90_000,
            language: None,
            es_id: None,
            is_pcr: false,
            stream_id: None,
            sl: SlConfig::default(),
            sl_over_pes: false,
            repeat_rate_ms: 0,
            descriptors: Vec::new(),
        }
    }
}

impl StreamConfig {
    pub fn new(pid: u16, codec: CodecType) -> Self {
        Self {
            pid,
            codec,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind.unwrap_or_else(|| self.codec.default_kind())
    }

    /// Language as the three bytes written in the PMT
    pub fn language_code(&self) -> Result<Option<[u8; 3]>> {
        match &self.language {
            None => Ok(None),
            Some(lang) => {
                let bytes: [u8; 3] = lang.as_bytes().try_into().map_err(|_| {
                    MuxError::Config(format!("language code must be 3 letters: {:?}", lang))
                })?;
                Ok(Some(bytes))
            }
        }
    }
}

impl MuxConfig {
    /// Loads the configuration: defaults, then the first config file
    /// found, then environment overrides (`TSMUX_RATE`, `TSMUX_REAL_TIME`,
    /// `TSMUX_PAT_REFRESH_MS`).
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                config = Self::from_file(path)?;
                break;
            }
        }
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MuxConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the environment overrides on top of the current values
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(rate) = env::var("TSMUX_RATE") {
            self.rate = parse_env("TSMUX_RATE", &rate)?;
            self.fixed_rate = self.rate > 0;
        }
        if let Ok(real_time) = env::var("TSMUX_REAL_TIME") {
            self.real_time = matches!(real_time.trim(), "1" | "true" | "yes" | "on");
        }
        if let Ok(refresh) = env::var("TSMUX_PAT_REFRESH_MS") {
            self.pat_refresh_ms = parse_env("TSMUX_PAT_REFRESH_MS", &refresh)?;
        }
        Ok(())
    }

    /// Checks the settings that can be checked without building a session
    pub fn validate(&self) -> Result<()> {
        if self.fixed_rate && self.rate == 0 {
            return Err(MuxError::Config("fixed_rate needs a non-zero rate".into()));
        }
        if self.queue_capacity == 0 {
            return Err(MuxError::Config("queue_capacity must be positive".into()));
        }
        for program in &self.programs {
            if program.number == 0 {
                return Err(MuxError::Config("program number 0 is reserved".into()));
            }
            for stream in &program.streams {
                stream.language_code()?;
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MuxError::Config(format!("invalid value for {}: {:?}", name, value)))
}

/// Commented configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# tsmux configuration
# This is a template. Replace the values with your actual configuration.

# Target output bitrate in bits per second (0 = unconstrained)
rate = 0
# Pad the output with null packets to hold the rate
fixed_rate = false
# Live session: never reports end of stream
real_time = false
transport_stream_id = 1
pat_refresh_ms = 100
initial_pcr = 0
one_au_per_pes = false
queue_capacity = 64

[[programs]]
number = 1
pmt_pid = 4096
pmt_refresh_ms = 100
pcr_offset = 0
pcr_interval_ms = 40
pcr_tolerance_ms = 10

[[programs.streams]]
pid = 256
codec = "h264"
is_pcr = true

[[programs.streams]]
pid = 257
codec = "aac"
language = "eng"
"#;

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    }
    Ok(())
}
