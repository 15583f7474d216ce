//! The heavyweight monitor and the primitives that operate on it.
//!
//! A [`Monitor`] pairs an OS mutex and condition variable with the
//! bookkeeping counters `SPEC_FULL.md` `# 3` requires (`waiting`,
//! `notifying`, `interrupting`, `entering`) plus the free-list/`in_use`
//! fields the pool (`crate::pool`) needs. Recursive ownership is
//! implemented on top of a *non*-recursive `parking_lot` mutex by
//! tracking the owning thread id and a recursion count ourselves and
//! driving the mutex's raw lock/unlock API directly — the same technique
//! the teacher repo's `vmkit::sync::Monitor`/`MonitorGuard` uses (compare
//! `lock_no_handshake`'s owner-match fast path and its
//! `make_guard_unchecked`/`MutexGuard::leak` dance), adapted here to the
//! JamVM-style field set (`owner`/`count`/`waiting`/`notifying`/
//! `interrupting`/`entering`) instead of the teacher's simpler
//! `holder`/`rec_count` pair.

use crate::{Runtime, Thread, ThreadState};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a [`Monitor::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The caller did not hold the monitor; caller should signal
    /// `IllegalMonitorState`.
    NotOwner,
    /// Returned normally: either notified, spuriously-then-notified, or
    /// (if a deadline was given) timed out. Per `SPEC_FULL.md` `# 7` a
    /// timeout is not distinguished from a normal wakeup at this layer.
    Completed,
    /// Woken by an interrupt; caller should signal `Interrupted` and has
    /// already had the thread's sticky `interrupted` flag cleared.
    Interrupted,
}

pub struct Monitor<R: Runtime> {
    lock: Mutex<()>,
    cv: Condvar,
    owner: AtomicU32,
    count: AtomicUsize,
    waiting: AtomicUsize,
    notifying: AtomicUsize,
    interrupting: AtomicUsize,
    entering: AtomicUsize,
    pub(crate) in_use: AtomicBool,
    pub(crate) next: AtomicPtr<Monitor<R>>,
    _marker: PhantomData<fn() -> R>,
}

// Monitor is accessed through raw pointers shared across threads; every
// field is itself a thread-safe primitive regardless of `R`.
unsafe impl<R: Runtime> Send for Monitor<R> {}
unsafe impl<R: Runtime> Sync for Monitor<R> {}

impl<R: Runtime> Monitor<R> {
    /// A freshly constructed, unowned, idle monitor. See `SPEC_FULL.md`
    /// `# 4.2`: "Newly created monitors carry `owner=none`, `count=0`,
    /// all counters zero, `in_use=true`."
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cv: Condvar::new(),
            owner: AtomicU32::new(0),
            count: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            notifying: AtomicUsize::new(0),
            interrupting: AtomicUsize::new(0),
            entering: AtomicUsize::new(0),
            in_use: AtomicBool::new(true),
            next: AtomicPtr::new(std::ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    /// Reset a scavenged/reused monitor back to the freshly-constructed
    /// state before handing it out again. Only called by the pool while
    /// holding its own lock, on a monitor that is provably idle.
    pub(crate) fn reinit(&self) {
        self.owner.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        self.waiting.store(0, Ordering::Relaxed);
        self.notifying.store(0, Ordering::Relaxed);
        self.interrupting.store(0, Ordering::Relaxed);
        self.entering.store(0, Ordering::Relaxed);
        self.in_use.store(true, Ordering::Release);
    }

    pub fn is_owned_by(&self, thread: &R::Thread) -> bool {
        self.owner.load(Ordering::Acquire) == thread.id()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    pub fn entering(&self) -> usize {
        self.entering.load(Ordering::Acquire)
    }

    pub fn notifying(&self) -> usize {
        self.notifying.load(Ordering::Acquire)
    }

    pub fn interrupting(&self) -> usize {
        self.interrupting.load(Ordering::Acquire)
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Directly set `count`, used when transferring a recursion count in
    /// from a thin lock word during inflation (`SPEC_FULL.md` `# 4.4`).
    pub(crate) fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::Release);
    }

    /// `lock(mon, self)`: recursive re-entry bumps `count`; otherwise
    /// blocks on the OS mutex, bracketed by the suspend gate.
    pub fn lock(&self, thread: &R::Thread) {
        if self.owner.load(Ordering::Acquire) == thread.id() {
            self.count.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.entering.fetch_add(1, Ordering::AcqRel);
        thread.set_state(ThreadState::Waiting);
        thread.disable_suspend();
        let guard = self.lock.lock();
        thread.set_state(ThreadState::Running);
        thread.enable_suspend();
        self.entering.fetch_sub(1, Ordering::AcqRel);
        self.owner.store(thread.id(), Ordering::Release);
        // Ownership of the critical section is now tracked by `owner`
        // and `count`, not by this guard's lifetime; leak it so `Drop`
        // doesn't unlock underneath us.
        MutexGuard::leak(guard);
    }

    /// `try_lock(mon, self)`: non-blocking. Does not touch `entering`,
    /// since a non-blocking attempt never needs to announce itself to
    /// the deflation-safety bookkeeping.
    pub fn try_lock(&self, thread: &R::Thread) -> bool {
        if self.owner.load(Ordering::Acquire) == thread.id() {
            self.count.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        match self.lock.try_lock() {
            Some(guard) => {
                self.owner.store(thread.id(), Ordering::Release);
                MutexGuard::leak(guard);
                true
            }
            None => false,
        }
    }

    /// `unlock(mon, self)`: a non-owner call is a silent no-op — the
    /// facade above this layer guarantees it never happens in a correct
    /// program, so we only catch it with a `debug_assert!`.
    pub fn unlock(&self, thread: &R::Thread) {
        if self.owner.load(Ordering::Acquire) != thread.id() {
            debug_assert!(false, "monitor unlock by non-owner");
            return;
        }

        if self.count.load(Ordering::Acquire) == 0 {
            self.owner.store(0, Ordering::Release);
            // Safety: `owner == thread.id()` just confirmed above means
            // this thread is the one holding `self.lock`, via a guard we
            // (or a previous recursive entry) leaked in `lock`/`try_lock`.
            unsafe {
                self.lock.force_unlock();
            }
        } else {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// `wait(mon, self, timeout)`. See `SPEC_FULL.md` `# 4.3` for the
    /// full wakeup-credit protocol this implements.
    pub fn wait(&self, thread: &R::Thread, timeout: Option<Duration>) -> WaitOutcome {
        if self.owner.load(Ordering::Acquire) != thread.id() {
            return WaitOutcome::NotOwner;
        }

        let old_count = self.count.swap(0, Ordering::AcqRel);
        self.owner.store(0, Ordering::Release);
        self.waiting.fetch_add(1, Ordering::AcqRel);
        thread.set_wait_mon(Some(self as *const Self as usize));
        thread.set_state(ThreadState::Waiting);
        thread.disable_suspend();

        let mut interrupted = thread.is_interrupted();

        if !interrupted {
            let deadline = timeout.map(|d| Instant::now() + d);
            // Safety: `self.lock` is already locked by this thread (it is
            // the mutex backing `self.owner == thread.id()`, which we
            // just confirmed above), so producing a guard for it without
            // re-locking is sound; we leak it below to avoid unlocking
            // out from under the still-held OS mutex.
            let mut guard: MutexGuard<'_, ()> = unsafe { self.lock.make_guard_unchecked() };

            loop {
                let timed_out = match deadline {
                    Some(dl) => self.cv.wait_until(&mut guard, dl).timed_out(),
                    None => {
                        self.cv.wait(&mut guard);
                        false
                    }
                };

                if thread.take_interrupting() {
                    self.interrupting.fetch_sub(1, Ordering::AcqRel);
                    interrupted = true;
                    break;
                }
                if self.notifying.load(Ordering::Acquire) > 0 {
                    self.notifying.fetch_sub(1, Ordering::AcqRel);
                    break;
                }
                if timed_out {
                    break;
                }
                // else: spurious wakeup, re-wait.
            }

            MutexGuard::leak(guard);
        }

        thread.set_state(ThreadState::Running);
        thread.set_wait_mon(None);
        self.owner.store(thread.id(), Ordering::Release);
        self.count.store(old_count, Ordering::Release);
        self.waiting.fetch_sub(1, Ordering::AcqRel);
        thread.enable_suspend();

        if interrupted {
            thread.clear_interrupted();
            WaitOutcome::Interrupted
        } else {
            WaitOutcome::Completed
        }
    }

    /// `notify(mon, self)`. Releases exactly one waiter's worth of
    /// credit, never broadcasts. Returns `false` if `self` is not owner.
    pub fn notify(&self, thread: &R::Thread) -> bool {
        if self.owner.load(Ordering::Acquire) != thread.id() {
            return false;
        }

        let waiting = self.waiting.load(Ordering::Acquire);
        let outstanding =
            self.notifying.load(Ordering::Acquire) + self.interrupting.load(Ordering::Acquire);
        if outstanding < waiting {
            self.notifying.fetch_add(1, Ordering::AcqRel);
            self.cv.notify_one();
        }
        true
    }

    /// `notifyAll(mon, self)`. Returns `false` if `self` is not owner.
    pub fn notify_all(&self, thread: &R::Thread) -> bool {
        if self.owner.load(Ordering::Acquire) != thread.id() {
            return false;
        }

        let waiting = self.waiting.load(Ordering::Acquire);
        let interrupting = self.interrupting.load(Ordering::Acquire);
        self.notifying
            .store(waiting.saturating_sub(interrupting), Ordering::Release);
        self.cv.notify_all();
        true
    }
}

/// A stable, never-freed pointer to a [`Monitor`]. Monitors live in the
/// pool for the lifetime of the process (see `SPEC_FULL.md` "Lifecycle"),
/// so dereferencing one is always sound once obtained from
/// [`crate::pool::MonitorPool`].
pub struct MonitorRef<R: Runtime>(NonNull<Monitor<R>>);

impl<R: Runtime> Clone for MonitorRef<R> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<R: Runtime> Copy for MonitorRef<R> {}

unsafe impl<R: Runtime> Send for MonitorRef<R> {}
unsafe impl<R: Runtime> Sync for MonitorRef<R> {}

impl<R: Runtime> MonitorRef<R> {
    pub(crate) fn leak_new(monitor: Monitor<R>) -> Self {
        let boxed = Box::leak(Box::new(monitor));
        Self(NonNull::from(boxed))
    }

    pub fn as_usize(&self) -> usize {
        self.0.as_ptr() as usize
    }

    /// # Safety
    /// `addr` must have previously come from [`MonitorRef::as_usize`] on
    /// a still-live monitor (i.e. decoded out of a fat lock word whose
    /// publication this thread has acquire-synchronized with).
    pub unsafe fn from_usize(addr: usize) -> Self {
        Self(NonNull::new_unchecked(addr as *mut Monitor<R>))
    }

    pub fn get(&self) -> &Monitor<R> {
        unsafe { self.0.as_ref() }
    }
}

impl<R: Runtime> std::ops::Deref for MonitorRef<R> {
    type Target = Monitor<R>;
    fn deref(&self) -> &Monitor<R> {
        self.get()
    }
}

/// The external thread-interruption entry point (`SPEC_FULL.md` `# 4.3`,
/// "Thread interruption"). Called by the thread subsystem — not by this
/// crate — when interrupting a thread that happens to be parked on
/// `mon`.
pub fn interrupt_waiting<R: Runtime>(mon: MonitorRef<R>, target: &R::Thread) {
    let mon = mon.get();
    let guard = mon.lock.lock();
    log::debug!(target: "vmsync::monitor", "delivering interrupt, tid={}", target.id());
    mon.interrupting.fetch_add(1, Ordering::AcqRel);
    target.set_interrupting();
    mon.cv.notify_all();
    drop(guard);
}
