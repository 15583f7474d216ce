//! A minimal [`Runtime`]/[`Thread`]/[`SyncObject`] implementation used by
//! this crate's own test suite, mirroring the shape of the grounding
//! source's `mock::MockVM`/`MockThread` (same file name, same purpose:
//! a throwaway embedding just real enough to drive the facade under
//! `std::thread`). Not part of the public contract, but left as an
//! unconditionally compiled `pub mod` rather than `#[cfg(test)]`-gated,
//! the same way `vmkit::mock` ships — integration tests under `tests/`
//! link against the library's non-test profile, so a `cfg(test)` gate
//! would hide it from exactly the callers that need it.

use crate::monitor::{interrupt_waiting, MonitorRef};
use crate::pool::MonitorPool;
use crate::{Runtime, SyncException, SyncObject, Thread, ThreadState};
use easy_bitfield::{AtomicBitfieldContainer, BitField};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// The single bit in [`MockObject`]'s header that stands in for the FLC
/// side channel. A real embedder would steal a spare bit from its own
/// header word instead of dedicating a whole byte to it; the header
/// here exists only to demonstrate the bitfield idiom, not to model a
/// realistic layout.
type FlcBit = BitField<u8, u8, 0, 1, false>;

pub struct MockObject {
    lockword: AtomicUsize,
    header: AtomicBitfieldContainer<u8>,
}

impl MockObject {
    /// Objects in this mock are never freed or moved, same as a monitor:
    /// the sole requirement [`SyncObject::identity`] has is a stable
    /// address, and leaking is the cheapest way to guarantee one in a
    /// test harness.
    pub fn new() -> &'static MockObject {
        Box::leak(Box::new(MockObject {
            lockword: AtomicUsize::new(0),
            header: AtomicBitfieldContainer::new(0),
        }))
    }
}

impl SyncObject for MockObject {
    fn lockword(&self) -> &AtomicUsize {
        &self.lockword
    }

    fn set_flc_bit(&self) {
        self.header.update_synchronized::<FlcBit>(1);
    }

    fn clear_flc_bit(&self) {
        self.header.update_synchronized::<FlcBit>(0);
    }

    fn test_flc_bit(&self) -> bool {
        self.header.read::<FlcBit>() != 0
    }

    fn identity(&self) -> usize {
        self as *const Self as usize
    }
}

struct MockThreadState {
    id: u32,
    interrupted: AtomicBool,
    interrupting: AtomicBool,
    wait_mon: AtomicUsize,
}

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static CURRENT: Cell<Option<&'static MockThreadState>> = const { Cell::new(None) };
}

#[derive(Clone, Copy)]
pub struct MockThread(&'static MockThreadState);

impl PartialEq for MockThread {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}
impl Eq for MockThread {}

impl MockThread {
    fn current() -> Self {
        CURRENT.with(|cell| {
            if let Some(state) = cell.get() {
                return MockThread(state);
            }
            let state = Box::leak(Box::new(MockThreadState {
                id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
                interrupted: AtomicBool::new(false),
                interrupting: AtomicBool::new(false),
                wait_mon: AtomicUsize::new(0),
            }));
            cell.set(Some(state));
            MockThread(state)
        })
    }
}

impl Thread for MockThread {
    fn id(&self) -> u32 {
        self.0.id
    }

    fn set_state(&self, _state: ThreadState) {}

    fn disable_suspend(&self) {}
    fn enable_suspend(&self) {}

    fn is_interrupted(&self) -> bool {
        self.0.interrupted.load(Ordering::Acquire)
    }

    fn clear_interrupted(&self) {
        self.0.interrupted.store(false, Ordering::Release);
    }

    fn take_interrupting(&self) -> bool {
        self.0.interrupting.swap(false, Ordering::AcqRel)
    }

    fn set_interrupting(&self) {
        self.0.interrupting.store(true, Ordering::Release);
    }

    fn set_wait_mon(&self, mon: Option<usize>) {
        self.0.wait_mon.store(mon.unwrap_or(0), Ordering::Release);
    }

    fn wait_mon(&self) -> Option<usize> {
        match self.0.wait_mon.load(Ordering::Acquire) {
            0 => None,
            addr => Some(addr),
        }
    }
}

/// The external interruption entry point a real thread subsystem would
/// expose; exercised directly by the interrupted-wait test.
pub fn interrupt(target: MockThread) {
    target.0.interrupted.store(true, Ordering::Release);
    if let Some(addr) = target.wait_mon() {
        let mon = unsafe { MonitorRef::<MockRuntime>::from_usize(addr) };
        interrupt_waiting(mon, &target);
    }
}

#[derive(Default)]
pub struct MockRuntime;

static POOL: OnceLock<MonitorPool<MockRuntime>> = OnceLock::new();

// Mirrors the grounding source's `initialiseMonitor()`: the pool must
// exist before any thread can touch a monitor, so it is constructed
// once, eagerly, at process start rather than lazily on first use.
#[ctor::ctor]
fn init_pool() {
    let _ = POOL.set(MonitorPool::new());
}

impl Runtime for MockRuntime {
    type Thread = MockThread;
    type Object = MockObject;

    fn current_thread() -> Self::Thread {
        MockThread::current()
    }

    fn monitor_pool() -> &'static MonitorPool<Self> {
        POOL.get().expect("monitor pool initialized by #[ctor::ctor] before main")
    }

    fn signal_exception(exception: SyncException, message: &str) {
        panic!("{exception}: {message}");
    }
}
