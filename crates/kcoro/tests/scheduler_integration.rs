//! Cores driven through their run-loop contexts

use kcoro::hal::{SpinLock, Switched};
use kcoro::{yield_now, Generator, Runtime, RuntimeConfig, Task, WaitList, WaitQueue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn runtime(cores: usize) -> Runtime {
    Runtime::new(
        RuntimeConfig::default()
            .with_cores(cores)
            .with_stack_size(128 * 1024),
    )
}

#[test]
fn test_await_result_through_runtime() {
    init_logging();
    let rt = runtime(1);
    let seen = Arc::new(AtomicU64::new(0));
    let sink = seen.clone();

    rt.scheduler(0).schedule(Task::new(async move {
        let y = Task::new(async { Ok(5u64) });
        sink.store(y.await.unwrap_or(0), Ordering::SeqCst);
        Ok(())
    }));

    assert_eq!(rt.tick(0), Switched::Yielded);
    assert_eq!(seen.load(Ordering::SeqCst), 5);
    let stats = rt.scheduler(0).stats();
    assert_eq!(stats.tasks_scheduled, 1);
    assert!(stats.idle_switches >= 1);
    rt.shutdown();
}

#[test]
fn test_yield_interleaves_within_one_tick() {
    init_logging();
    let rt = runtime(1);
    let trace = Arc::new(Mutex::new(Vec::new()));

    for tag in ["a", "b"] {
        let trace = trace.clone();
        rt.scheduler(0).schedule(Task::new(async move {
            for i in 0..3 {
                trace.lock().push(format!("{}{}", tag, i));
                yield_now().await;
            }
            Ok(())
        }));
    }
    rt.tick(0);

    assert_eq!(*trace.lock(), vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
}

#[test]
fn test_cross_core_wakeup() {
    init_logging();
    let rt = runtime(2);
    let gate = Arc::new(SpinLock::new("gate", false));
    let queue = Arc::new(WaitQueue::new());
    let trace = Arc::new(Mutex::new(Vec::new()));

    let (g, q, t) = (gate.clone(), queue.clone(), trace.clone());
    rt.scheduler(0).schedule(Task::new(async move {
        let mut open = g.lock();
        while !*open {
            open = q.done(open).await;
        }
        drop(open);
        t.lock().push("waiter on core 0");
        Ok(())
    }));

    let (g, q, t) = (gate.clone(), queue.clone(), trace.clone());
    rt.scheduler(1).schedule(Task::new(async move {
        *g.lock() = true;
        t.lock().push("waker on core 1");
        q.wake_up();
        Ok(())
    }));

    rt.tick(0);
    assert_eq!(queue.len(), 1);
    rt.tick(1);
    // The wakeup went onto core 0's queue
    assert_eq!(rt.scheduler(0).len(), 1);
    rt.tick(0);

    assert_eq!(*trace.lock(), vec!["waker on core 1", "waiter on core 0"]);
    rt.shutdown();
}

#[test]
fn test_generator_on_runtime() {
    init_logging();
    let rt = runtime(1);
    let total = Arc::new(AtomicU64::new(0));
    let sink = total.clone();

    rt.scheduler(0).schedule(Task::new(async move {
        let mut squares = Generator::new(|y| async move {
            for i in 1..=4u64 {
                y.yield_value(i * i).await;
            }
            Ok(())
        });
        while let Some(n) = squares.next().await {
            sink.fetch_add(n, Ordering::SeqCst);
        }
        Ok(())
    }));
    rt.tick(0);

    assert_eq!(total.load(Ordering::SeqCst), 1 + 4 + 9 + 16);
}

#[test]
fn test_shutdown_exits_every_run_loop() {
    init_logging();
    let rt = runtime(2);
    let a = rt.boot(0);
    let b = rt.boot(1);
    assert_eq!(rt.tick(0), Switched::Yielded);
    rt.shutdown();
    assert!(a.has_exited());
    assert!(b.has_exited());
    assert!(rt.scheduler(0).is_halted());
    assert!(rt.scheduler(1).is_halted());
}
