//! End-to-end exercises of the object-level facade against
//! [`vmsync::mock::MockRuntime`], covering the scenarios `SPEC_FULL.md`
//! `# 8` calls out: uncontended round trips, recursion saturation,
//! contended acquisition, the wait/notify handshake, interruption, and
//! timed-wait expiry.

use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vmsync::mock::{interrupt, MockObject, MockRuntime};
use vmsync::{object_lock, object_notify, object_notify_all, object_unlock, object_wait, Runtime};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn uncontended_lock_unlock_round_trip() {
    init();
    let obj = MockObject::new();
    object_lock::<MockRuntime>(obj);
    object_unlock::<MockRuntime>(obj);
    // A second, independent round trip should behave identically: the
    // lock word must be back to fully unlocked, not stuck thin-owned.
    object_lock::<MockRuntime>(obj);
    object_unlock::<MockRuntime>(obj);
}

#[test]
fn recursive_locking_saturates_and_inflates() {
    init();
    let obj = MockObject::new();
    // One past the 8-bit thin recursion count's max is enough to force
    // an inflation on the next acquire.
    let depth = 257;
    for _ in 0..depth {
        object_lock::<MockRuntime>(obj);
    }
    for _ in 0..depth {
        object_unlock::<MockRuntime>(obj);
    }
    // Fully released and still usable afterwards.
    object_lock::<MockRuntime>(obj);
    object_unlock::<MockRuntime>(obj);
}

#[test]
fn contended_acquisition_hands_off_in_order() {
    init();
    let obj = MockObject::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    object_lock::<MockRuntime>(obj);

    let order2 = order.clone();
    let handle = std::thread::spawn(move || {
        object_lock::<MockRuntime>(obj);
        order2.lock().unwrap().push("contender");
        object_unlock::<MockRuntime>(obj);
    });

    std::thread::sleep(Duration::from_millis(50));
    order.lock().unwrap().push("holder");
    object_unlock::<MockRuntime>(obj);

    handle.join().unwrap();

    let seen = order.lock().unwrap().clone();
    assert_eq!(seen, vec!["holder", "contender"]);
}

#[test]
fn wait_notify_handshake() {
    init();
    let obj = MockObject::new();
    let ready = Arc::new(AtomicBool::new(false));
    let woke = Arc::new(AtomicBool::new(false));

    let ready2 = ready.clone();
    let woke2 = woke.clone();
    let waiter = std::thread::spawn(move || {
        object_lock::<MockRuntime>(obj);
        ready2.store(true, Ordering::Release);
        object_wait::<MockRuntime>(obj, None);
        woke2.store(true, Ordering::Release);
        object_unlock::<MockRuntime>(obj);
    });

    while !ready.load(Ordering::Acquire) {
        std::thread::yield_now();
    }
    // Give the waiter a head start to actually park before notifying.
    std::thread::sleep(Duration::from_millis(50));

    object_lock::<MockRuntime>(obj);
    object_notify::<MockRuntime>(obj);
    object_unlock::<MockRuntime>(obj);

    waiter.join().unwrap();
    assert!(woke.load(Ordering::Acquire));
}

#[test]
fn notify_all_wakes_every_waiter() {
    init();
    let obj = MockObject::new();
    let woke_count = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let woke_count = woke_count.clone();
            std::thread::spawn(move || {
                object_lock::<MockRuntime>(obj);
                object_wait::<MockRuntime>(obj, None);
                woke_count.fetch_add(1, Ordering::AcqRel);
                object_unlock::<MockRuntime>(obj);
            })
        })
        .collect();

    // Let all three threads get a chance to park.
    std::thread::sleep(Duration::from_millis(100));

    object_lock::<MockRuntime>(obj);
    object_notify_all::<MockRuntime>(obj);
    object_unlock::<MockRuntime>(obj);

    for w in waiters {
        w.join().unwrap();
    }
    assert_eq!(woke_count.load(Ordering::Acquire), 3);
}

#[test]
fn interrupted_wait_raises_interrupted_exception() {
    init();
    let obj = MockObject::new();
    let ready = Arc::new(AtomicBool::new(false));
    let ready2 = ready.clone();

    let (tx, rx) = std::sync::mpsc::channel();

    let waiter = std::thread::spawn(move || {
        let this = MockRuntime::current_thread();
        tx.send(this).unwrap();

        object_lock::<MockRuntime>(obj);
        ready2.store(true, Ordering::Release);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            object_wait::<MockRuntime>(obj, None);
        }));
        object_unlock::<MockRuntime>(obj);
        result
    });

    let target = rx.recv().unwrap();
    while !ready.load(Ordering::Acquire) {
        std::thread::yield_now();
    }
    std::thread::sleep(Duration::from_millis(50));

    interrupt(target);

    let result = waiter.join().unwrap();
    assert!(result.is_err(), "interrupted wait should signal an exception");
}

#[test]
fn timed_wait_expires_without_notify() {
    init();
    let obj = MockObject::new();
    object_lock::<MockRuntime>(obj);

    let started = Instant::now();
    object_wait::<MockRuntime>(obj, Some(Duration::from_millis(100)));
    let elapsed = started.elapsed();

    object_unlock::<MockRuntime>(obj);

    assert!(elapsed >= Duration::from_millis(90));
}

#[test]
fn notify_without_ownership_is_illegal_monitor_state() {
    init();
    let obj = MockObject::new();
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        object_notify::<MockRuntime>(obj);
    }));
    assert!(result.is_err());
}
