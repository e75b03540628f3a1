use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("multiplex already started")]
    AlreadyStarted,

    #[error("no program registered")]
    NoProgram,

    #[error("program {0} not found")]
    ProgramNotFound(u16),

    #[error("program {0} already registered")]
    DuplicateProgram(u16),

    #[error("PID 0x{0:04x} already in use")]
    DuplicatePid(u16),

    #[error("PID 0x{0:04x} outside of the assignable range")]
    InvalidPid(u16),

    #[error("queue full on PID 0x{pid:04x}")]
    QueueFull { pid: u16 },

    #[error("no data available")]
    NoData,

    #[error("end of stream already signaled on PID 0x{pid:04x}")]
    EndOfStream { pid: u16 },
}

pub type Result<T> = std::result::Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            MuxError::QueueFull { pid: 0x100 }.to_string(),
            "queue full on PID 0x0100"
        );
        assert_eq!(
            MuxError::DuplicatePid(0x1fff).to_string(),
            "PID 0x1fff already in use"
        );
    }
}
