//! Conversions between JNI values and the bridge's Rust types

use jni::objects::{JFloatArray, ReleaseMode};
use jni::JNIEnv;
use wavebridge_core::BridgeError;

pub fn marshalling(err: jni::errors::Error) -> BridgeError {
    BridgeError::Marshalling(err.to_string())
}

/// Validate a host-supplied element count against the array's real length
pub fn checked_length(requested: i32, available: usize) -> Result<usize, BridgeError> {
    usize::try_from(requested)
        .ok()
        .filter(|&count| count <= available)
        .ok_or_else(|| {
            BridgeError::Marshalling(format!(
                "sample count {} outside array of length {}",
                requested, available
            ))
        })
}

/// Run `f` over the first `length` samples of a Java `float[]`
///
/// Elements are pinned or copied for the duration of `f` only and released
/// without copying back, on success and failure alike.
pub fn with_samples<T>(
    env: &mut JNIEnv,
    array: &JFloatArray,
    length: Option<i32>,
    f: impl FnOnce(&[f32]) -> Result<T, BridgeError>,
) -> Result<T, BridgeError> {
    if array.is_null() {
        return Err(BridgeError::Marshalling("sample array is null".to_string()));
    }

    // SAFETY: the array is not accessed through any other alias while the
    // elements are held, and they are released before returning.
    let elements = unsafe { env.get_array_elements(array, ReleaseMode::NoCopyBack) }.map_err(marshalling)?;
    let count = match length {
        Some(requested) => checked_length(requested, elements.len())?,
        None => elements.len(),
    };
    f(&elements[..count])
}

pub fn float_array<'local>(env: &mut JNIEnv<'local>, samples: &[f32]) -> Result<JFloatArray<'local>, BridgeError> {
    let len = i32::try_from(samples.len())
        .map_err(|_| BridgeError::Marshalling(format!("{} samples exceed a Java array", samples.len())))?;
    let array = env.new_float_array(len).map_err(marshalling)?;
    env.set_float_array_region(&array, 0, samples).map_err(marshalling)?;
    Ok(array)
}

/// Clear a Java exception left behind by a failed JNI call
pub fn clear_pending_exception(env: &mut JNIEnv) {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_clear();
    }
}
