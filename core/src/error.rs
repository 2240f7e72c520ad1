use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModemError {
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(i64),

    #[error("Unsupported protocol id: {0}")]
    UnsupportedProtocol(i32),

    #[error("Protocol {protocol} needs {max_freq:.0} Hz but operating rate is {sample_rate} Hz")]
    ProtocolAboveNyquist {
        protocol: i32,
        max_freq: f32,
        sample_rate: u32,
    },

    #[error("Empty payload")]
    EmptyPayload,

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),

    #[error("No pending transmission")]
    NothingToEncode,

    #[error("Waveform synthesis produced no samples")]
    SynthesisFailed,

    #[error("Output buffer too small: required {required}, provided {provided}")]
    OutputBufferTooSmall { required: usize, provided: usize },

    #[error("CRC mismatch in frame header")]
    HeaderCrcMismatch,

    #[error("CRC mismatch in frame payload")]
    PayloadCrcMismatch,

    #[error("Invalid input size")]
    InvalidInputSize,
}

pub type Result<T> = std::result::Result<T, ModemError>;
