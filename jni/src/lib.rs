//! JNI entry points for `com.wavebridge.NativeEngine`
//!
//! Handles travel to Java as `long`; `0` means "no session". Every entry
//! point returns null/0 on failure and records the reason, which Java reads
//! back with `nativeLastStatus()`.

mod marshal;

use jni::objects::{JClass, JFloatArray, JString};
use jni::sys::{jfloat, jfloatArray, jint, jintArray, jlong, jstring, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};
use log::info;
use marshal::{clear_pending_exception, float_array, marshalling, with_samples};
use std::ffi::c_void;
use std::sync::OnceLock;
use wavebridge_core::{guarded, AudioLevel, Bridge, BridgeError, LastOutcome};

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(Bridge::new)
}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).try_init();
    info!("wavebridge {} loaded", env!("CARGO_PKG_VERSION"));
    JNI_VERSION_1_6
}

#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeInit<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    sample_rate: jint,
) -> jlong {
    guarded("nativeInit", || {
        bridge()
            .initialize(sample_rate)
            .map(|handle| Some(handle.to_raw() as jlong))
    })
    .unwrap_or(0)
}

#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeInitWithRates<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    sample_rate_inp: jint,
    sample_rate_out: jint,
) -> jlong {
    guarded("nativeInitWithRates", || {
        bridge()
            .create(sample_rate_inp as i64, sample_rate_out as i64)
            .map(|handle| Some(handle.to_raw() as jlong))
    })
    .unwrap_or(0)
}

#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeEncode<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
    text: JString<'local>,
    protocol: jint,
    volume: jfloat,
) -> jfloatArray {
    let result = guarded("nativeEncode", || {
        if text.is_null() {
            return Err(BridgeError::Marshalling("text is null".to_string()));
        }
        let text: String = env.get_string(&text).map_err(marshalling)?.into();
        let samples = bridge().encode(handle as u64, &text, protocol, volume)?;
        float_array(&mut env, &samples).map(|array| Some(array.into_raw()))
    });

    clear_pending_exception(&mut env);
    result.unwrap_or(std::ptr::null_mut())
}

#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeDecode<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
    samples: JFloatArray<'local>,
    length: jint,
) -> jstring {
    let result = guarded("nativeDecode", || {
        let decoded = with_samples(&mut env, &samples, Some(length), |samples| {
            bridge().decode(handle as u64, samples)
        })?;
        match decoded {
            Some(text) => env
                .new_string(text)
                .map(|s| Some(s.into_raw()))
                .map_err(marshalling),
            None => Ok(None),
        }
    });

    clear_pending_exception(&mut env);
    result.unwrap_or(std::ptr::null_mut())
}

#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeDestroy<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
) {
    guarded("nativeDestroy", || {
        if bridge().destroy(handle as u64) {
            Ok(Some(()))
        } else {
            Err(BridgeError::InvalidHandle(handle as u64))
        }
    });
}

#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeAvailableProtocols<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jintArray {
    let result = guarded("nativeAvailableProtocols", || {
        let ids = bridge().available_protocols();
        let array = env.new_int_array(ids.len() as i32).map_err(marshalling)?;
        env.set_int_array_region(&array, 0, &ids).map_err(marshalling)?;
        Ok(Some(array.into_raw()))
    });

    clear_pending_exception(&mut env);
    result.unwrap_or(std::ptr::null_mut())
}

/// Returns `[rms, peak]` of the given block
#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeAudioLevel<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    samples: JFloatArray<'local>,
) -> jfloatArray {
    let result = guarded("nativeAudioLevel", || {
        let level = with_samples(&mut env, &samples, None, |samples| Ok(AudioLevel::measure(samples)))?;
        float_array(&mut env, &[level.rms, level.peak]).map(|array| Some(array.into_raw()))
    });

    clear_pending_exception(&mut env);
    result.unwrap_or(std::ptr::null_mut())
}

#[no_mangle]
pub extern "system" fn Java_com_wavebridge_NativeEngine_nativeLastStatus<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    LastOutcome::status().code()
}
