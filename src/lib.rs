//! Per-object synchronization core for a managed-runtime VM.
//!
//! Every heap object gets a monitor with mutual exclusion, recursive
//! locking, and condition-variable wait/notify semantics. Uncontended
//! locking is encoded entirely in a bit-packed lock word living in the
//! object header ("thin" locking); on contention, or when a thread needs
//! to block in [`object_wait`], the lock word is inflated to reference a
//! heavyweight [`Monitor`] backed by an OS mutex and condition variable
//! ("fat" locking).
//!
//! The allocator, the object header layout beyond the lock word, the
//! thread registry, the safepoint/suspend mechanism, and exception
//! raising are all external collaborators: this crate only consumes the
//! narrow contracts it needs from them through the [`Runtime`], [`Thread`]
//! and [`SyncObject`] traits.

pub mod config;
pub mod error;
pub mod facade;
pub mod lockword;
pub mod monitor;
pub mod pool;

use pool::MonitorPool;

pub mod mock;

pub use error::SyncException;
pub use facade::{object_lock, object_notify, object_notify_all, object_unlock, object_wait};
pub use monitor::{Monitor, MonitorRef, WaitOutcome};

use std::sync::atomic::AtomicUsize;

/// The set of external collaborators this core needs from the embedding VM.
///
/// Mirrors the shape of a typical VM-binding trait (associated `Thread`
/// and `Object` types, a `current_thread()` accessor, a handful of
/// defaulted hooks) rather than threading every dependency through
/// function parameters.
pub trait Runtime: 'static + Sized {
    type Thread: Thread;
    type Object: SyncObject;

    /// The thread currently executing. Called at the start of every
    /// facade-level operation; never cached across a blocking point.
    fn current_thread() -> Self::Thread;

    /// The process-wide monitor cache (`SPEC_FULL.md` `# 4.5`). Expected
    /// to be backed by a `'static` constructed once, e.g. via a
    /// `std::sync::OnceLock` primed by a `#[ctor::ctor]` function, as
    /// `crate::mock` demonstrates.
    fn monitor_pool() -> &'static MonitorPool<Self>;

    /// Signal a named VM-level exception. The caller of the facade
    /// operation that triggered this is expected to see it return
    /// normally and unwind on its own terms (see `# 7` in `SPEC_FULL.md`).
    fn signal_exception(exception: SyncException, message: &str);

    /// Cooperative yield used by the `object_unlock` post-release
    /// hand-off retry loop.
    fn yield_now() {
        std::thread::yield_now();
    }
}

/// Thread-state transitions the core drives around blocking points, so
/// that an external safepoint coordinator can tell a parked thread's
/// stack is safe to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Waiting,
}

/// The external thread contract consumed by this core.
///
/// An implementation is expected to be a thin wrapper around whatever
/// thread-local/TLS structure the embedding VM already maintains; every
/// method here is expected to be cheap and non-blocking except where
/// documented.
pub trait Thread: Copy + Eq {
    /// A small, non-zero, per-thread integer id. Ids must not be reused
    /// until the owning thread has been fully unregistered from the VM
    /// (see `# 9` design notes).
    fn id(&self) -> u32;

    fn set_state(&self, state: ThreadState);

    /// Bracket the start of a potentially long-blocking OS call.
    fn disable_suspend(&self);
    /// Bracket the end of a potentially long-blocking OS call.
    fn enable_suspend(&self);

    /// Sticky flag set by the thread subsystem when this thread has been
    /// asked to stop what it's doing. Consumed, not produced, by this core
    /// (except that a completed interrupted wait clears it).
    fn is_interrupted(&self) -> bool;
    fn clear_interrupted(&self);

    /// Set by [`monitor::interrupt_waiting`] under the target monitor's
    /// lock; consumed by [`Monitor::wait`] on wakeup.
    fn take_interrupting(&self) -> bool;
    fn set_interrupting(&self);

    /// Backref to the monitor this thread is currently parked on, or
    /// `None`. Used by the external thread-interruption entry point to
    /// find which monitor's lock to acquire.
    fn set_wait_mon(&self, mon: Option<usize>);
    fn wait_mon(&self) -> Option<usize>;
}

/// The external per-object contract consumed by this core: a lock word
/// and the FLC ("fat-lock contended") side-channel bit.
pub trait SyncObject {
    /// The lock word. All transitions on it happen via atomic
    /// compare-and-swap/load/store; the core never takes a lock to read
    /// or write it directly.
    fn lockword(&self) -> &AtomicUsize;

    fn set_flc_bit(&self);
    fn clear_flc_bit(&self);
    fn test_flc_bit(&self) -> bool;

    /// An identity key for the monitor cache. Two distinct live objects
    /// must never compare equal; in a real VM this is the object's
    /// address. Non-goal: this core does not itself allocate or move
    /// objects, so it takes this on faith from the embedder.
    fn identity(&self) -> usize;
}
