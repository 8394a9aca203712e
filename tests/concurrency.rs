// ==============================================
// MEMOIZER CONCURRENCY TESTS (integration)
// ==============================================
//
// Memoizers shared between threads. The store lock is released while the
// wrapped function runs, so racing misses may compute more than once, but
// every caller must see a correct value and the store must stay consistent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use memokit::{MemoizeBuilder, isolate, memoize};

// ==============================================
// Shared Memoizer
// ==============================================

mod shared_memoizer {
    use super::*;

    #[test]
    fn racing_threads_agree_on_values() {
        let num_threads = 8;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let square = Arc::new(memoize(move |(k, n): &(Arc<u64>, u64)| {
            counter.fetch_add(1, Ordering::Relaxed);
            **k * n
        }));
        let key = Arc::new(3u64);
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let square = Arc::clone(&square);
                let key = Arc::clone(&key);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..50u64)
                        .map(|n| square.call((Arc::clone(&key), n % 10)).unwrap())
                        .sum::<u64>()
                })
            })
            .collect();

        let expected: u64 = (0..50u64).map(|n| 3 * (n % 10)).sum();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }

        // Every distinct argument list was computed at least once and the
        // store ended up holding each of them.
        let computed = calls.load(Ordering::Relaxed);
        assert!(computed >= 10);
        square.call((Arc::clone(&key), 4)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), computed);
    }

    #[test]
    fn limit_holds_under_contention() {
        let num_threads = 6;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let f = Arc::new(MemoizeBuilder::new().limit(4).build(move |(_k, n): &(Arc<()>, u32)| {
            counter.fetch_add(1, Ordering::Relaxed);
            *n
        }));
        let key = Arc::new(());
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads as u32)
            .map(|tid| {
                let f = Arc::clone(&f);
                let key = Arc::clone(&key);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..100u32 {
                        let n = (tid * 100 + i) % 16;
                        assert_eq!(f.call((Arc::clone(&key), n)), Ok(n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // At most four values survive, so the last four distinct inserts
        // must all still hit.
        let before = calls.load(Ordering::Relaxed);
        for n in 100..104 {
            f.call((Arc::clone(&key), n)).unwrap();
        }
        assert_eq!(calls.load(Ordering::Relaxed), before + 4);
        for n in 100..104 {
            f.call((Arc::clone(&key), n)).unwrap();
        }
        assert_eq!(calls.load(Ordering::Relaxed), before + 4);
        assert!(f.metrics().store.evictions > 0);
    }

    #[test]
    fn keys_dropped_on_other_threads_are_reclaimed() {
        let num_threads = 4;
        let f = Arc::new(memoize(|(k,): &(Arc<Vec<u8>>,)| k.len()));
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|tid| {
                let f = Arc::clone(&f);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..25 {
                        let temp = Arc::new(vec![0u8; tid + i]);
                        assert_eq!(f.call((temp,)), Ok(tid + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        f.purge();
        let metrics = f.metrics();
        assert_eq!(metrics.misses, 100);
        assert_eq!(metrics.store.reclaimed, 100);
    }
}

// ==============================================
// Per-Thread Regions
// ==============================================
//
// The default stack model keeps one stack per thread, so isolated regions on
// different threads never see each other.

mod per_thread_regions {
    use super::*;

    #[test]
    fn regions_on_different_threads_do_not_share() {
        let num_threads = 4;
        let make = Arc::new(memoize(|(_k,): &(Arc<()>,)| Arc::new(())));
        let key = Arc::new(());
        let outside = make.call((Arc::clone(&key),)).unwrap();
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let make = Arc::clone(&make);
                let key = Arc::clone(&key);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    isolate(|| {
                        barrier.wait();
                        let a = make.call((Arc::clone(&key),)).unwrap();
                        let b = make.call((Arc::clone(&key),)).unwrap();
                        assert!(Arc::ptr_eq(&a, &b));
                        a
                    })
                    .unwrap()
                })
            })
            .collect();

        let seen: Vec<Arc<()>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (i, a) in seen.iter().enumerate() {
            assert!(!Arc::ptr_eq(a, &outside));
            for b in &seen[i + 1..] {
                assert!(!Arc::ptr_eq(a, b));
            }
        }

        assert!(Arc::ptr_eq(&outside, &make.call((key,)).unwrap()));
    }
}
