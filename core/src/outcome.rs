//! Tagged result of the most recent boundary call on the current thread
//!
//! Boundary functions return null/absent on every failure, which alone does
//! not tell the host whether a decode is merely incomplete or the handle was
//! stale. Each entry point records a [`Status`] here before returning.

use crate::bridge::{panic_message, BridgeError};
use log::error;
use std::cell::RefCell;
use std::ffi::{c_char, CString};
use std::panic::{self, AssertUnwindSafe};

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    /// Call succeeded but produced nothing (decode not complete yet)
    Empty = 1,
    InvalidHandle = 2,
    Marshalling = 3,
    EngineRejected = 4,
    Panicked = 5,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&BridgeError> for Status {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::InvalidHandle(_) => Status::InvalidHandle,
            BridgeError::Marshalling(_) => Status::Marshalling,
            BridgeError::EngineRejected(_) => Status::EngineRejected,
            BridgeError::Panicked(_) => Status::Panicked,
        }
    }
}

struct Slot {
    status: Status,
    message: Option<CString>,
}

thread_local! {
    static LAST: RefCell<Slot> = const {
        RefCell::new(Slot {
            status: Status::Ok,
            message: None,
        })
    };
}

/// Accessors for the thread-local last outcome
pub struct LastOutcome;

impl LastOutcome {
    pub fn record(status: Status, message: Option<&str>) {
        // Interior NULs would truncate the C string; drop them
        let message = message.and_then(|m| CString::new(m.replace('\0', "")).ok());
        LAST.with(|slot| {
            let mut slot = slot.borrow_mut();
            slot.status = status;
            slot.message = message;
        });
    }

    pub fn ok() {
        Self::record(Status::Ok, None);
    }

    pub fn empty() {
        Self::record(Status::Empty, None);
    }

    pub fn error(err: &BridgeError) {
        Self::record(Status::from(err), Some(&err.to_string()));
    }

    /// Record `result` and collapse it to the boundary's nullable shape
    pub fn settle<T>(result: Result<Option<T>, BridgeError>) -> Option<T> {
        match result {
            Ok(Some(value)) => {
                Self::ok();
                Some(value)
            }
            Ok(None) => {
                Self::empty();
                None
            }
            Err(err) => {
                Self::error(&err);
                None
            }
        }
    }

    pub fn status() -> Status {
        LAST.with(|slot| slot.borrow().status)
    }

    pub fn message() -> Option<String> {
        LAST.with(|slot| {
            slot.borrow()
                .message
                .as_ref()
                .map(|m| m.to_string_lossy().into_owned())
        })
    }

    /// Pointer to the last error message, or null
    ///
    /// Valid until the next boundary call on the same thread.
    pub fn message_ptr() -> *const c_char {
        LAST.with(|slot| match slot.borrow().message.as_ref() {
            Some(message) => message.as_ptr(),
            None => std::ptr::null(),
        })
    }
}

/// Run a boundary entry point so that nothing unwinds into the host
///
/// The outcome of `f` (or the panic it raised) is recorded before the
/// nullable result is returned.
pub fn guarded<T>(entry: &str, f: impl FnOnce() -> Result<Option<T>, BridgeError>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => LastOutcome::settle(result),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Panic in {}: {}", entry, message);
            LastOutcome::error(&BridgeError::Panicked(message));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModemError;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Empty.code(), 1);
        assert_eq!(Status::InvalidHandle.code(), 2);
        assert_eq!(Status::Marshalling.code(), 3);
        assert_eq!(Status::EngineRejected.code(), 4);
        assert_eq!(Status::Panicked.code(), 5);
    }

    #[test]
    fn test_error_recorded_with_message() {
        LastOutcome::error(&BridgeError::EngineRejected(ModemError::EmptyPayload));
        assert_eq!(LastOutcome::status(), Status::EngineRejected);
        assert!(LastOutcome::message().unwrap().contains("Empty payload"));
        assert!(!LastOutcome::message_ptr().is_null());

        LastOutcome::ok();
        assert_eq!(LastOutcome::status(), Status::Ok);
        assert!(LastOutcome::message().is_none());
        assert!(LastOutcome::message_ptr().is_null());
    }

    #[test]
    fn test_guarded_records_each_shape() {
        assert_eq!(guarded("ok", || Ok(Some(3))), Some(3));
        assert_eq!(LastOutcome::status(), Status::Ok);

        assert_eq!(guarded::<i32>("empty", || Ok(None)), None);
        assert_eq!(LastOutcome::status(), Status::Empty);

        assert_eq!(guarded::<i32>("bad", || Err(BridgeError::InvalidHandle(0))), None);
        assert_eq!(LastOutcome::status(), Status::InvalidHandle);

        assert_eq!(guarded::<i32>("boom", || panic!("host boundary")), None);
        assert_eq!(LastOutcome::status(), Status::Panicked);
        assert!(LastOutcome::message().unwrap().contains("host boundary"));
    }

    #[test]
    fn test_outcome_is_per_thread() {
        LastOutcome::empty();
        std::thread::spawn(|| {
            assert_eq!(LastOutcome::status(), Status::Ok);
            LastOutcome::error(&BridgeError::InvalidHandle(7));
        })
        .join()
        .unwrap();
        assert_eq!(LastOutcome::status(), Status::Empty);
    }
}
