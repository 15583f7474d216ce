//! The monitor pool: free list + an open-addressed cache keyed by object
//! identity, allocating monitors lazily and scavenging unused ones
//! opportunistically during lookup.
//!
//! Grounded directly in the original C implementation's `findMonitor`/
//! `allocMonitor`/`initialiseMonitor` (`examples/original_source/src/lock.c`)
//! and its `resizeHash` (`examples/original_source/src/hash.c`): linear
//! probing, doubling resize that reinserts by stored hash, and a
//! `HASH(obj) = identity(obj) >> LOG_OBJECT_GRAIN` that doubles as both
//! hash and key (grain-aligned addresses never collide post-shift, so
//! the original's `COMPARE` macro only ever compares hashes). The table
//! and free list share one lock, per `SPEC_FULL.md` `# 4.2`/`# 5`.

use crate::config::{
    INITIAL_CACHE_CAPACITY, LOG_OBJECT_GRAIN, RESIZE_LOAD_FACTOR_DEN, RESIZE_LOAD_FACTOR_NUM,
};
use crate::monitor::{Monitor, MonitorRef};
use crate::Runtime;
use parking_lot::Mutex;

struct Slot<R: Runtime> {
    hash: usize,
    monitor: MonitorRef<R>,
}

struct Table<R: Runtime> {
    slots: Vec<Option<Slot<R>>>,
    len: usize,
    free_list: Option<MonitorRef<R>>,
}

impl<R: Runtime> Table<R> {
    fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            len: 0,
            free_list: None,
        }
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    fn pop_free(&mut self) -> Option<MonitorRef<R>> {
        let head = self.free_list.take()?;
        let next = head.get().next.load(std::sync::atomic::Ordering::Acquire);
        self.free_list = if next.is_null() {
            None
        } else {
            Some(unsafe { MonitorRef::from_usize(next as usize) })
        };
        head.get()
            .next
            .store(std::ptr::null_mut(), std::sync::atomic::Ordering::Relaxed);
        Some(head)
    }

    fn push_free(&mut self, mon: MonitorRef<R>) {
        let next_ptr = match self.free_list {
            Some(head) => head.get() as *const Monitor<R> as *mut Monitor<R>,
            None => std::ptr::null_mut(),
        };
        mon.get()
            .next
            .store(next_ptr, std::sync::atomic::Ordering::Release);
        self.free_list = Some(mon);
    }

    /// Scan the slot at `index`; if it holds a monitor that is no longer
    /// `in_use`, scavenge it into the free list and report the slot as
    /// now empty.
    fn scavenge_at(&mut self, index: usize) {
        let should_clear = match &self.slots[index] {
            Some(slot) => !slot.monitor.get().is_in_use(),
            None => false,
        };
        if should_clear {
            let slot = self.slots[index].take().unwrap();
            self.len -= 1;
            self.push_free(slot.monitor);
        }
    }

    fn maybe_grow(&mut self) {
        if self.len * RESIZE_LOAD_FACTOR_DEN < self.slots.len() * RESIZE_LOAD_FACTOR_NUM {
            return;
        }
        let new_capacity = self.slots.len() * 2;
        let mut new_slots: Vec<Option<Slot<R>>> = Vec::with_capacity(new_capacity);
        new_slots.resize_with(new_capacity, || None);
        let new_mask = new_capacity - 1;

        for slot in self.slots.drain(..).flatten() {
            let mut index = slot.hash & new_mask;
            while new_slots[index].is_some() {
                index = (index + 1) & new_mask;
            }
            new_slots[index] = Some(slot);
        }

        self.slots = new_slots;
    }
}

/// Keyed, scavenging cache of heavyweight monitors. One instance backs
/// every thin-to-fat transition in a running VM; see [`crate::config`]
/// for its initial size and resize threshold.
pub struct MonitorPool<R: Runtime> {
    table: Mutex<Table<R>>,
}

impl<R: Runtime> MonitorPool<R> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            table: Mutex::new(Table::with_capacity(capacity)),
        }
    }

    fn hash_of(obj: &R::Object) -> usize {
        use crate::SyncObject;
        obj.identity() >> LOG_OBJECT_GRAIN
    }

    /// `findMonitor`: if the object is already fat, decode the embedded
    /// pointer directly with no cache touch. Otherwise probe the table,
    /// scavenging stale entries along the way, allocating on miss.
    pub fn find_monitor(&self, obj: &R::Object) -> MonitorRef<R> {
        use crate::lockword;
        use crate::SyncObject;

        let word = obj.lockword().load(std::sync::atomic::Ordering::Acquire);
        if lockword::is_fat(word) {
            return unsafe { MonitorRef::from_usize(lockword::as_monitor(word)) };
        }

        self.find_or_alloc(Self::hash_of(obj))
    }

    /// `allocMonitor`: the half of `# 4.2`'s two named pool operations
    /// that `find_monitor` itself reaches for on a cache miss. Exposed
    /// here as a public method for parity with the spec's contract, but
    /// this crate's own facade never needs it directly — every facade
    /// call site already wants "find, allocating if absent," which
    /// `find_monitor` provides in one step, so it is what `facade.rs`
    /// calls throughout instead.
    pub fn alloc_monitor(&self, obj: &R::Object) -> MonitorRef<R> {
        self.find_or_alloc(Self::hash_of(obj))
    }

    fn find_or_alloc(&self, hash: usize) -> MonitorRef<R> {
        let mut table = self.table.lock();
        table.maybe_grow();

        let mask = table.mask();
        let mut index = hash & mask;

        loop {
            table.scavenge_at(index);

            match &table.slots[index] {
                Some(slot) if slot.hash == hash => {
                    slot.monitor.get().in_use.store(true, std::sync::atomic::Ordering::Release);
                    return slot.monitor;
                }
                Some(_) => {
                    index = (index + 1) & mask;
                }
                None => {
                    let monitor = Self::take_or_create(&mut table);
                    table.slots[index] = Some(Slot { hash, monitor });
                    table.len += 1;
                    return monitor;
                }
            }
        }
    }

    fn take_or_create(table: &mut Table<R>) -> MonitorRef<R> {
        if let Some(reused) = table.pop_free() {
            reused.get().reinit();
            reused
        } else {
            MonitorRef::leak_new(Monitor::new())
        }
    }
}

impl<R: Runtime> Default for MonitorPool<R> {
    fn default() -> Self {
        Self::new()
    }
}
