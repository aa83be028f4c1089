//! Integration test: atomic and futex fields shared across threads.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use kiln_core::{AddressSpace, WaitOutcome};
use kiln_layout::define_heap_struct;
use kiln_test_utils::fixtures::{counting_memory, memory_with, small_memory, COUNTER_FIELDS};

#[test]
fn concurrent_increments_are_not_lost() {
    const THREADS: u32 = 8;
    const ITERS: u32 = 10_000;

    let mut mem = small_memory();
    let ty = define_heap_struct(&mem, &[("hits", "au32")]).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();
    let hits = ty.atomic::<u32>("hits").unwrap();
    let base = obj.ptr();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let space = AddressSpace::from_shared(mem.shared_buffer(), None).unwrap();
            thread::spawn(move || {
                for _ in 0..ITERS {
                    hits.fetch_add(&space, base, 1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(hits.load(mem.space(), base), THREADS * ITERS);
    obj.deallocate(&mut mem).unwrap();
}

#[test]
fn compare_exchange_spinlock_serialises_writers() {
    const THREADS: usize = 4;
    const ITERS: usize = 500;

    let mut mem = small_memory();
    let ty = define_heap_struct(&mem, &[("lock", "ai32"), ("total", "u64")]).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();
    let lock = ty.atomic::<i32>("lock").unwrap();
    let total = ty.scalar::<u64>("total").unwrap();
    let base = obj.ptr();

    thread::scope(|s| {
        for _ in 0..THREADS {
            let space = mem.space().clone();
            s.spawn(move || {
                for _ in 0..ITERS {
                    while lock.compare_exchange(&space, base, 0, 1).is_err() {
                        std::hint::spin_loop();
                    }
                    let v = total.load(&space, base);
                    total.store(&space, base, v + 1);
                    lock.store(&space, base, 0);
                }
            });
        }
    });

    assert_eq!(total.load(mem.space(), base), (THREADS * ITERS) as u64);
    obj.deallocate(&mut mem).unwrap();
}

#[test]
fn notify_wakes_blocked_waiter() {
    let mut mem = small_memory();
    let ty = define_heap_struct(&mem, COUNTER_FIELDS).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();
    let count = ty.futex::<i32>("count").unwrap();
    let base = obj.ptr();

    let (ready_tx, ready_rx) = bounded(1);
    let (done_tx, done_rx) = bounded(1);
    let space = mem.space().clone();
    let waiting = count.clone();
    let waiter = thread::spawn(move || {
        ready_tx.send(()).unwrap();
        let outcome = waiting.wait(&space, base, 0, Some(Duration::from_secs(10)));
        done_tx.send(outcome).unwrap();
    });

    ready_rx.recv().unwrap();
    let counter = count.value().offset();
    while mem.space().waiter_count(base.add(counter)) == 0 {
        thread::yield_now();
    }
    count.value().store(mem.space(), base, 1);
    assert_eq!(count.notify(mem.space(), base, None), 1);

    let outcome = done_rx.recv().unwrap();
    assert_eq!(outcome, Ok(WaitOutcome::Woken));
    waiter.join().unwrap();
    obj.deallocate(&mut mem).unwrap();
}

#[test]
fn wait_on_stale_value_returns_not_equal() {
    let mut mem = small_memory();
    let ty = define_heap_struct(&mem, COUNTER_FIELDS).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();
    let count = ty.futex::<i32>("count").unwrap();
    count.value().store(mem.space(), obj.ptr(), 5);
    assert_eq!(
        count.wait(mem.space(), obj.ptr(), 4, None),
        Ok(WaitOutcome::NotEqual)
    );
    obj.deallocate(&mut mem).unwrap();
}

#[test]
fn wait_times_out_without_notify() {
    let mut mem = small_memory();
    let ty = define_heap_struct(&mem, &[("word", "au32")]).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();
    let word = ty.futex::<u32>("word").unwrap();
    let outcome = word.wait(mem.space(), obj.ptr(), 0, Some(Duration::from_millis(20)));
    assert_eq!(outcome, Ok(WaitOutcome::TimedOut));
    assert_eq!(WaitOutcome::TimedOut.code(), -1);
    obj.deallocate(&mut mem).unwrap();
}

#[test]
fn non_blocking_context_refuses_wait_but_notifies() {
    let caps = kiln_core::Capabilities {
        can_block: false,
        ..Default::default()
    };
    let mut mem = memory_with(1024, 256, caps);
    let ty = define_heap_struct(&mem, COUNTER_FIELDS).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();
    let count = ty.futex::<i32>("count").unwrap();
    assert_eq!(
        count.wait(mem.space(), obj.ptr(), 0, None),
        Err(kiln_core::MemError::BlockingDisallowed)
    );
    assert_eq!(count.notify(mem.space(), obj.ptr(), Some(1)), 0);
    obj.deallocate(&mut mem).unwrap();
}

#[test]
fn refused_futex_operations_reach_handler() {
    let caps = kiln_core::Capabilities {
        can_block: false,
        ..Default::default()
    };
    let (mut mem, hits) = counting_memory(1024, 256, caps);
    let ty = define_heap_struct(&mem, COUNTER_FIELDS).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();

    assert!(matches!(
        ty.futex::<u32>("flag"),
        Err(kiln_core::MemError::FutexIneligible { .. })
    ));
    let count = ty.futex::<i32>("count").unwrap();
    assert_eq!(
        count.wait(mem.space(), obj.ptr(), 0, None),
        Err(kiln_core::MemError::BlockingDisallowed)
    );
    assert!(matches!(
        obj.get(mem.space(), "missing"),
        Err(kiln_core::MemError::UnknownField { .. })
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    obj.deallocate(&mut mem).unwrap();
}
