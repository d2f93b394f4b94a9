use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use surgepool::{Config, TaskError, WorkerPool, NO_TIMEOUT};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

async fn measure<F, Fut, T>(name: &str, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let start = Instant::now();
    let result = f().await;
    println!("  {name}: {:?}", start.elapsed());
    result
}

#[tokio::test(flavor = "multi_thread")]
async fn load_thousand_fast_tasks() {
    let pool = WorkerPool::new(8);
    let completed = Arc::new(AtomicUsize::new(0));

    measure("1k tasks @ 1ms on 8 workers", || async {
        let mut outcomes = Vec::with_capacity(1_000);
        for _ in 0..1_000 {
            let completed = Arc::clone(&completed);
            let rx = pool
                .submit(
                    None,
                    async move {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        completed.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    },
                    NO_TIMEOUT,
                )
                .await;
            outcomes.push(rx);
        }
        for rx in outcomes {
            assert!(rx.await.expect("task should publish").is_ok());
        }
    })
    .await;

    assert_eq!(completed.load(Ordering::Relaxed), 1_000);
    assert!(pool.worker_count() <= 8);
    pool.stop_wait().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn load_mixed_deadline_outcomes() {
    let pool = WorkerPool::new(4);

    let mut outcomes = Vec::with_capacity(200);
    for i in 0..200u32 {
        let rx = if i % 2 == 0 {
            pool.submit(
                None,
                async {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    Ok(())
                },
                NO_TIMEOUT,
            )
            .await
        } else {
            // Sleeps well past its deadline; the timeout must win even for
            // tasks whose deadline elapsed while they sat in the queue.
            pool.submit(
                None,
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                },
                Duration::from_millis(10),
            )
            .await
        };
        outcomes.push(rx);
    }

    let mut successes = 0;
    let mut timeouts = 0;
    for rx in outcomes {
        match rx.await.expect("task should publish") {
            Ok(()) => successes += 1,
            Err(TaskError::Timeout) => timeouts += 1,
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }
    println!("  {successes} succeeded, {timeouts} timed out");
    assert_eq!(successes, 100);
    assert_eq!(timeouts, 100);
    pool.stop_wait().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn load_repeated_pause_resume_cycles() {
    let pool = WorkerPool::new(4);
    let completed = Arc::new(AtomicUsize::new(0));

    for cycle in 0..3usize {
        let release = CancellationToken::new();
        pool.pause(release.clone()).await;

        let mut gated = Vec::new();
        for _ in 0..20 {
            let completed = Arc::clone(&completed);
            let rx = pool
                .submit(
                    None,
                    async move {
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                    NO_TIMEOUT,
                )
                .await;
            gated.push(rx);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            completed.load(Ordering::SeqCst),
            cycle * 20,
            "no work may run while paused"
        );

        release.cancel();
        for rx in gated {
            assert!(rx.await.expect("task should publish").is_ok());
        }
        assert_eq!(completed.load(Ordering::SeqCst), (cycle + 1) * 20);
    }

    pool.stop_wait().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn load_bursts_with_idle_reaping_between() {
    let pool = WorkerPool::with_config(Config {
        max_workers: 4,
        idle_timeout: Duration::from_millis(25),
    });
    let completed = Arc::new(AtomicUsize::new(0));

    for burst in 0..3usize {
        let mut outcomes = Vec::new();
        for _ in 0..50 {
            let completed = Arc::clone(&completed);
            let rx = pool
                .submit(
                    None,
                    async move {
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        completed.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    },
                    NO_TIMEOUT,
                )
                .await;
            outcomes.push(rx);
        }
        for rx in outcomes {
            assert!(rx.await.expect("task should publish").is_ok());
        }
        assert_eq!(completed.load(Ordering::Relaxed), (burst + 1) * 50);

        // Long enough for several idle ticks to retire the fleet.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            pool.worker_count() <= 1,
            "idle gap should have reaped the burst's workers, {} remain",
            pool.worker_count()
        );
    }

    pool.stop_wait().await;
    assert_eq!(pool.worker_count(), 0);
    assert_eq!(completed.load(Ordering::Relaxed), 150);
}
