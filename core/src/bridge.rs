//! Transcode bridge between host-facing values and an [`Engine`]
//!
//! Every engine call runs under `catch_unwind` with the session lock held.
//! A panic is reported as [`BridgeError::Panicked`] and the session is
//! reset so the handle stays usable.

use crate::config::Parameters;
use crate::engine::Engine;
use crate::error::ModemError;
use crate::modem::Modem;
use crate::outcome::Status;
use crate::protocol::ProtocolId;
use crate::session::{lock_session, Session, SessionHandle, SessionRegistry};
use log::{debug, error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Invalid or destroyed session handle: {0:#x}")]
    InvalidHandle(u64),

    #[error("Marshalling failed: {0}")]
    Marshalling(String),

    #[error("Engine rejected request: {0}")]
    EngineRejected(#[from] ModemError),

    #[error("Engine panicked: {0}")]
    Panicked(String),
}

impl BridgeError {
    pub fn status(&self) -> Status {
        Status::from(self)
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Bridge<E = Modem> {
    sessions: SessionRegistry<E>,
}

impl<E: Engine> Bridge<E> {
    pub fn new() -> Self {
        Self {
            sessions: SessionRegistry::new(),
        }
    }

    /// Create a session using one rate for capture and playback
    pub fn initialize(&self, sample_rate: i32) -> Result<SessionHandle, BridgeError> {
        self.create(sample_rate as i64, sample_rate as i64)
    }

    /// Create a session with separate capture and playback rates
    pub fn create(&self, sample_rate_inp: i64, sample_rate_out: i64) -> Result<SessionHandle, BridgeError> {
        let result = Parameters::new(sample_rate_inp, sample_rate_out)
            .map_err(BridgeError::from)
            .and_then(|params| {
                panic::catch_unwind(AssertUnwindSafe(|| self.sessions.create(params)))
                    .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())))?
                    .map_err(BridgeError::from)
            });

        match &result {
            Ok(handle) => info!(
                "Created session {} (input {} Hz, output {} Hz)",
                handle, sample_rate_inp, sample_rate_out
            ),
            Err(e) => error!("Failed to create session: {}", e),
        }
        result
    }

    /// Render `text` as audio samples at the session's output rate
    pub fn encode(&self, handle: u64, text: &str, protocol: i32, volume: f32) -> Result<Vec<f32>, BridgeError> {
        let result = self.with_session(handle, "encode", |session| {
            let payload = text.as_bytes().to_vec();
            let protocol = ProtocolId::try_from(protocol)?;

            session.engine.init(&payload, protocol, volume)?;
            let count = session.engine.encode()?;
            if count == 0 {
                return Err(ModemError::SynthesisFailed.into());
            }

            let mut samples = vec![0.0f32; count];
            let written = session.engine.output(&mut samples)?;
            samples.truncate(written);
            Ok(samples)
        });

        match &result {
            Ok(samples) => info!(
                "Encoded {} bytes as {} samples (protocol {})",
                text.len(),
                samples.len(),
                protocol
            ),
            Err(e) => error!("Encode failed: {}", e),
        }
        result
    }

    /// Feed captured samples; `Ok(None)` until a full payload is received
    ///
    /// Returns at most one payload. Another transmission already complete in
    /// the buffered input comes out on the next call with more samples.
    pub fn decode(&self, handle: u64, samples: &[f32]) -> Result<Option<String>, BridgeError> {
        let result = self.with_session(handle, "decode", |session| {
            if samples.is_empty() {
                return Ok(None);
            }

            let count = session.engine.decode(samples)?;
            if count == 0 {
                return Ok(None);
            }

            let bytes = session.engine.take_rx_data();
            String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| BridgeError::Marshalling(format!("decoded payload is not valid UTF-8: {}", e)))
        });

        match &result {
            Ok(Some(text)) => info!("Decoded {} bytes", text.len()),
            Ok(None) => debug!("No payload yet after {} samples", samples.len()),
            Err(e) => error!("Decode failed: {}", e),
        }
        result
    }

    /// Release a session; `false` when the handle was not live
    pub fn destroy(&self, handle: u64) -> bool {
        let destroyed = SessionHandle::from_raw(handle)
            .map(|h| self.sessions.destroy(h))
            .unwrap_or(false);

        if destroyed {
            info!("Destroyed session {:#x}", handle);
        } else {
            debug!("Ignoring destroy of unknown session {:#x}", handle);
        }
        destroyed
    }

    pub fn available_protocols(&self) -> Vec<i32> {
        E::protocols().iter().map(|p| p.id()).collect()
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.live_count()
    }

    fn with_session<T>(
        &self,
        handle: u64,
        op: &str,
        f: impl FnOnce(&mut Session<E>) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let session = SessionHandle::from_raw(handle)
            .and_then(|h| self.sessions.get(h))
            .ok_or(BridgeError::InvalidHandle(handle))?;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut guard = lock_session(&session);
            f(&mut guard)
        }));

        result.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!("Engine panicked during {} on session {:#x}: {}", op, handle, message);
            // Recover the poisoned lock now so the next call starts clean
            drop(lock_session(&session));
            Err(BridgeError::Panicked(message))
        })
    }
}

impl<E: Engine> Default for Bridge<E> {
    fn default() -> Self {
        Self::new()
    }
}
