//! # wavebridge-ffi
//!
//! C ABI over the wavebridge session bridge, for Objective-C/Swift hosts and
//! anything else that links C libraries.
//!
//! Build the library:
//! ```sh
//! cargo build -p wavebridge-ffi --release
//! ```
//!
//! Include the generated header (`include/wavebridge.h`). Sessions are plain
//! `uint64_t` handles; `0` is never a valid session. Functions report failure
//! through a null/zero return and record a status code plus message that
//! `wavebridge_last_status()` and `wavebridge_last_error()` read back on the
//! same thread.

#![allow(clippy::missing_safety_doc)]

use log::info;
use std::ffi::{c_char, CStr, CString};
use std::sync::OnceLock;
use wavebridge_core::{guarded, AudioLevel, Bridge, BridgeError, LastOutcome};

// ============================================================================
// Status codes
// ============================================================================

pub const WAVEBRIDGE_STATUS_OK: i32 = 0;
/// The call succeeded without producing a result (decode still listening)
pub const WAVEBRIDGE_STATUS_EMPTY: i32 = 1;
pub const WAVEBRIDGE_STATUS_INVALID_HANDLE: i32 = 2;
pub const WAVEBRIDGE_STATUS_MARSHALLING: i32 = 3;
pub const WAVEBRIDGE_STATUS_ENGINE_REJECTED: i32 = 4;
pub const WAVEBRIDGE_STATUS_PANICKED: i32 = 5;

/// Input level of a block of samples
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WavebridgeAudioLevel {
    pub rms: f32,
    pub peak: f32,
}

impl From<AudioLevel> for WavebridgeAudioLevel {
    fn from(level: AudioLevel) -> Self {
        Self {
            rms: level.rms,
            peak: level.peak,
        }
    }
}

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(Bridge::new)
}

fn marshalling(message: &str) -> BridgeError {
    BridgeError::Marshalling(message.to_string())
}

/// Borrow `length` samples from a host pointer; null is only allowed when empty
unsafe fn borrow_samples<'a>(samples: *const f32, length: usize) -> Result<&'a [f32], BridgeError> {
    if length == 0 {
        return Ok(&[]);
    }
    if samples.is_null() {
        return Err(marshalling("samples is null"));
    }
    Ok(std::slice::from_raw_parts(samples, length))
}

// ============================================================================
// Library utilities
// ============================================================================

/// Install the logger (`RUST_LOG`, default `warn`).
///
/// Optional; safe to call more than once.
///
/// # Returns
///
/// Always `0`.
#[no_mangle]
pub extern "C" fn wavebridge_init() -> i32 {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).try_init();
    info!("wavebridge {} initialised", env!("CARGO_PKG_VERSION"));
    LastOutcome::ok();
    WAVEBRIDGE_STATUS_OK
}

/// Library version as a static, null-terminated string. Do not free.
#[no_mangle]
pub extern "C" fn wavebridge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Status code of the last call on this thread (`WAVEBRIDGE_STATUS_*`).
#[no_mangle]
pub extern "C" fn wavebridge_last_status() -> i32 {
    LastOutcome::status().code()
}

/// Message describing the last failure on this thread, or null.
///
/// The pointer stays valid until the next wavebridge call on the same thread
/// and must not be freed.
///
/// # Example (C)
///
/// ```c
/// uint64_t engine = wavebridge_engine_create(48000);
/// if (engine == 0) {
///     fprintf(stderr, "create failed: %s\n", wavebridge_last_error());
/// }
/// ```
#[no_mangle]
pub extern "C" fn wavebridge_last_error() -> *const c_char {
    LastOutcome::message_ptr()
}

// ============================================================================
// Sessions
// ============================================================================

/// Create a session that captures and plays back at `sample_rate` Hz.
///
/// # Returns
///
/// A non-zero handle, or `0` on failure.
#[no_mangle]
pub extern "C" fn wavebridge_engine_create(sample_rate: i32) -> u64 {
    guarded("wavebridge_engine_create", || {
        bridge().initialize(sample_rate).map(|handle| Some(handle.to_raw()))
    })
    .unwrap_or(0)
}

/// Create a session with separate capture and playback rates.
#[no_mangle]
pub extern "C" fn wavebridge_engine_create_with_rates(sample_rate_inp: i32, sample_rate_out: i32) -> u64 {
    guarded("wavebridge_engine_create_with_rates", || {
        bridge()
            .create(sample_rate_inp as i64, sample_rate_out as i64)
            .map(|handle| Some(handle.to_raw()))
    })
    .unwrap_or(0)
}

/// Release a session.
///
/// Unknown, stale and already destroyed handles are ignored.
///
/// # Returns
///
/// `true` if a live session was released.
#[no_mangle]
pub extern "C" fn wavebridge_engine_destroy(handle: u64) -> bool {
    guarded("wavebridge_engine_destroy", || {
        if bridge().destroy(handle) {
            Ok(Some(()))
        } else {
            Err(BridgeError::InvalidHandle(handle))
        }
    })
    .is_some()
}

// ============================================================================
// Transcoding
// ============================================================================

/// Encode null-terminated UTF-8 `text` into audio samples.
///
/// On success `*out_len` receives the sample count and the returned buffer
/// must be released with `wavebridge_samples_free(ptr, *out_len)`.
///
/// # Returns
///
/// The sample buffer, or null on failure (`*out_len` is set to 0).
///
/// # Safety
///
/// `text` must be null or a valid null-terminated string; `out_len` must be
/// null or point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wavebridge_encode(
    handle: u64,
    text: *const c_char,
    protocol: i32,
    volume: f32,
    out_len: *mut usize,
) -> *mut f32 {
    if !out_len.is_null() {
        *out_len = 0;
    }

    guarded("wavebridge_encode", || {
        if out_len.is_null() {
            return Err(marshalling("out_len is null"));
        }
        if text.is_null() {
            return Err(marshalling("text is null"));
        }
        let text = CStr::from_ptr(text)
            .to_str()
            .map_err(|e| BridgeError::Marshalling(format!("text is not valid UTF-8: {}", e)))?;

        let samples = bridge().encode(handle, text, protocol, volume)?.into_boxed_slice();
        *out_len = samples.len();
        Ok(Some(Box::into_raw(samples) as *mut f32))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Feed `length` captured samples to a session.
///
/// Returns the decoded text once a complete transmission has been received;
/// release it with `wavebridge_string_free`. Null otherwise:
/// `wavebridge_last_status()` is `WAVEBRIDGE_STATUS_EMPTY` while the session
/// is still listening.
///
/// # Safety
///
/// `samples` must point to `length` readable floats (or be null when
/// `length` is 0).
#[no_mangle]
pub unsafe extern "C" fn wavebridge_decode(handle: u64, samples: *const f32, length: usize) -> *mut c_char {
    guarded("wavebridge_decode", || {
        let samples = borrow_samples(samples, length)?;
        match bridge().decode(handle, samples)? {
            Some(text) => CString::new(text)
                .map(|s| Some(s.into_raw()))
                .map_err(|_| marshalling("decoded text contains a NUL byte")),
            None => Ok(None),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Copy the supported protocol ids into `out`.
///
/// # Returns
///
/// The total number of protocols, which may exceed `capacity`. Pass a null
/// `out` to query the count.
///
/// # Safety
///
/// `out` must be null or point to `capacity` writable `int32_t`.
#[no_mangle]
pub unsafe extern "C" fn wavebridge_available_protocols(out: *mut i32, capacity: usize) -> usize {
    guarded("wavebridge_available_protocols", || {
        let ids = bridge().available_protocols();
        if !out.is_null() {
            let written = ids.len().min(capacity);
            std::ptr::copy_nonoverlapping(ids.as_ptr(), out, written);
        }
        Ok(Some(ids.len()))
    })
    .unwrap_or(0)
}

/// Measure RMS and peak of a block of samples into `*out`.
///
/// # Returns
///
/// A `WAVEBRIDGE_STATUS_*` code.
///
/// # Safety
///
/// `samples` must point to `length` readable floats; `out` must point to a
/// writable `WavebridgeAudioLevel`.
#[no_mangle]
pub unsafe extern "C" fn wavebridge_audio_level(
    samples: *const f32,
    length: usize,
    out: *mut WavebridgeAudioLevel,
) -> i32 {
    guarded("wavebridge_audio_level", || {
        if out.is_null() {
            return Err(marshalling("out is null"));
        }
        let samples = borrow_samples(samples, length)?;
        *out = AudioLevel::measure(samples).into();
        Ok(Some(()))
    });
    LastOutcome::status().code()
}

// ============================================================================
// Memory
// ============================================================================

/// Free a sample buffer returned by `wavebridge_encode`.
///
/// # Safety
///
/// `samples` and `length` must come from the same `wavebridge_encode` call,
/// and the buffer must not be freed twice. Null is ignored.
#[no_mangle]
pub unsafe extern "C" fn wavebridge_samples_free(samples: *mut f32, length: usize) {
    if !samples.is_null() {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(samples, length)));
    }
}

/// Free a string returned by `wavebridge_decode`. Null is ignored.
///
/// # Safety
///
/// `s` must come from `wavebridge_decode` and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn wavebridge_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
