use bytes::Bytes;

/// One encoded access unit handed to the multiplexer by a producer.
///
/// Timestamps are expressed in the timescale of the stream they are pushed
/// to (90 kHz unless configured otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub data: Bytes,
    pub cts: u64,
    pub dts: u64,
    pub is_random_access: bool,
    /// Content identical to the previous unit (MPEG-4 section carousels keep
    /// their version number for repeats)
    pub is_repeat: bool,
}

impl AccessUnit {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            cts: 0,
            dts: 0,
            is_random_access: false,
            is_repeat: false,
        }
    }

    /// Sets both composition and decoding time
    pub fn with_time(mut self, ts: u64) -> Self {
        self.cts = ts;
        self.dts = ts;
        self
    }

    pub fn with_cts(mut self, cts: u64) -> Self {
        self.cts = cts;
        self
    }

    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = dts;
        self
    }

    pub fn with_random_access(mut self, is_random_access: bool) -> Self {
        self.is_random_access = is_random_access;
        self
    }

    pub fn with_repeat(mut self, is_repeat: bool) -> Self {
        self.is_repeat = is_repeat;
        self
    }

    /// A separate DTS only needs signaling when it differs from the CTS
    pub fn has_dts(&self) -> bool {
        self.dts != self.cts
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Position of a piece inside an access unit pushed in several calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuPiece {
    pub start: bool,
    pub end: bool,
}

impl AuPiece {
    pub const WHOLE: AuPiece = AuPiece {
        start: true,
        end: true,
    };
    pub const FIRST: AuPiece = AuPiece {
        start: true,
        end: false,
    };
    pub const MIDDLE: AuPiece = AuPiece {
        start: false,
        end: false,
    };
    pub const LAST: AuPiece = AuPiece {
        start: false,
        end: true,
    };
}
