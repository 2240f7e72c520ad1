//! Session handle manager
//!
//! Handles are generation-checked arena keys rather than pointers: the low
//! 32 bits select a slot, the high 32 bits must match the slot's current
//! generation. Destroying a session bumps the generation, so a stale handle
//! fails a cheap comparison instead of reaching freed memory. Raw value `0`
//! is never issued and always invalid.

use crate::config::Parameters;
use crate::engine::Engine;
use crate::error::Result;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle value of generation 1 at index 0
const GENERATION_UNIT: NonZeroU64 = match NonZeroU64::new(1 << 32) {
    Some(unit) => unit,
    None => panic!("generation unit is non-zero"),
};

/// Opaque, non-zero session identifier handed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(NonZeroU64);

impl SessionHandle {
    fn new(index: u32, generation: NonZeroU32) -> Self {
        // A 32-bit generation times 2^32 cannot saturate
        Self(NonZeroU64::from(generation).saturating_mul(GENERATION_UNIT) | index as u64)
    }

    /// Parse a host-side value; the sentinel `0` yields `None`
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn to_raw(self) -> u64 {
        self.0.get()
    }

    fn index(self) -> usize {
        (self.0.get() & 0xFFFF_FFFF) as usize
    }

    fn generation(self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.index(), self.generation())
    }
}

/// One live engine plus its rate configuration
pub struct Session<E> {
    handle: SessionHandle,
    params: Parameters,
    pub engine: E,
}

impl<E> Session<E> {
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn sample_rate_inp(&self) -> u32 {
        self.params.sample_rate_inp
    }

    pub fn sample_rate_out(&self) -> u32 {
        self.params.sample_rate_out
    }
}

pub type SharedSession<E> = Arc<Mutex<Session<E>>>;

/// Lock a session, recovering from a panic in an earlier call
///
/// A poisoned session had its engine interrupted mid-operation, so the
/// engine is reset before the guard is handed out.
pub fn lock_session<E: Engine>(session: &SharedSession<E>) -> MutexGuard<'_, Session<E>> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            let mut guard = poisoned.into_inner();
            guard.engine.reset();
            session.clear_poison();
            guard
        }
    }
}

struct Slot<E> {
    generation: NonZeroU32,
    session: Option<SharedSession<E>>,
}

struct Arena<E> {
    slots: Vec<Slot<E>>,
    free: Vec<u32>,
    live: usize,
}

/// Arena of engine sessions keyed by [`SessionHandle`]
///
/// The registry lock only guards slot bookkeeping. Each session carries its
/// own mutex, so calls on different handles never wait on each other.
pub struct SessionRegistry<E> {
    arena: Mutex<Arena<E>>,
}

impl<E: Engine> SessionRegistry<E> {
    pub fn new() -> Self {
        Self {
            arena: Mutex::new(Arena {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    fn arena(&self) -> MutexGuard<'_, Arena<E>> {
        // Bookkeeping is updated atomically under the lock, so a poisoned
        // guard still holds a consistent arena.
        self.arena.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Construct an engine and register it
    ///
    /// The engine is built before any slot is touched, so a construction
    /// failure leaves the registry unchanged.
    pub fn create(&self, params: Parameters) -> Result<SessionHandle> {
        let engine = E::new(&params)?;

        let mut arena = self.arena();
        let index = match arena.free.pop() {
            Some(index) => index,
            None => {
                arena.slots.push(Slot {
                    generation: NonZeroU32::MIN,
                    session: None,
                });
                (arena.slots.len() - 1) as u32
            }
        };

        let slot = &mut arena.slots[index as usize];
        let handle = SessionHandle::new(index, slot.generation);
        slot.session = Some(Arc::new(Mutex::new(Session {
            handle,
            params,
            engine,
        })));
        arena.live += 1;

        Ok(handle)
    }

    /// Look up a live session
    pub fn get(&self, handle: SessionHandle) -> Option<SharedSession<E>> {
        let arena = self.arena();
        let slot = arena.slots.get(handle.index())?;
        if slot.generation.get() != handle.generation() {
            return None;
        }
        slot.session.clone()
    }

    /// Release a session; returns `false` for unknown or stale handles
    ///
    /// A call already running on the session keeps it alive until it
    /// returns; the engine is dropped with the last reference.
    pub fn destroy(&self, handle: SessionHandle) -> bool {
        let released = {
            let mut arena = self.arena();
            let index = handle.index();
            let Some(slot) = arena.slots.get_mut(index) else {
                return false;
            };
            if slot.generation.get() != handle.generation() || slot.session.is_none() {
                return false;
            }

            let session = slot.session.take();
            slot.generation = slot.generation.checked_add(1).unwrap_or(NonZeroU32::MIN);
            arena.free.push(index as u32);
            arena.live -= 1;
            session
        };

        // Drop outside the registry lock
        drop(released);
        true
    }

    pub fn live_count(&self) -> usize {
        self.arena().live
    }
}

impl<E: Engine> Default for SessionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
