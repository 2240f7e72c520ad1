//! Session and transcode core for the wavebridge audio data-modem bindings
//!
//! The host runtimes (JNI, Objective-C via the C ABI) only ever see opaque
//! session handles plus text and sample buffers. This crate owns the handle
//! arena, the panic-isolating transcode bridge and a reference multi-tone FSK
//! engine that satisfies the [`Engine`] contract.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod framing;
pub mod fsk;
pub mod level;
pub mod modem;
pub mod outcome;
pub mod protocol;
pub mod resample;
pub mod session;
pub mod sync;

pub use bridge::{Bridge, BridgeError};
pub use config::Parameters;
pub use engine::Engine;
pub use error::{ModemError, Result};
pub use level::AudioLevel;
pub use modem::Modem;
pub use outcome::{guarded, LastOutcome, Status};
pub use protocol::{Family, ProtocolId};
pub use session::{Session, SessionHandle, SessionRegistry};

// Sample rate configuration
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const SAMPLE_RATE_MIN: u32 = 1000;
pub const SAMPLE_RATE_MAX: u32 = 96000;

// Tone grid: 1024-sample frames at 48 kHz, scaled to the operating rate
pub const BASE_SAMPLE_RATE: u32 = 48000;
pub const BASE_FRAME_SAMPLES: usize = 1024;

// Multi-tone FSK layout
pub const FSK_BYTES_PER_SYMBOL: usize = 3;
pub const FSK_NIBBLES_PER_SYMBOL: usize = 6;
pub const FSK_BINS_PER_BAND: usize = 16;
pub const FSK_NUM_BINS: usize = FSK_NIBBLES_PER_SYMBOL * FSK_BINS_PER_BAND; // 96

// Transmission layout
pub const MARKER_FRAMES: usize = 16;
pub const HEADER_FRAMES: usize = 6;
pub const HEADER_SIZE: usize = FSK_BYTES_PER_SYMBOL; // protocol + length + CRC-8
pub const PAYLOAD_CRC_SIZE: usize = 2;

// Payload and gain limits
pub const MAX_PAYLOAD_SIZE: usize = 140;
pub const MAX_VOLUME: f32 = 100.0;
pub const DEFAULT_VOLUME: f32 = 50.0;
