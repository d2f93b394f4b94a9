use std::time::Instant;

use surgepool::{WorkerPool, NO_TIMEOUT};
use tokio::runtime::Builder;
use tokio::time::Duration;

fn main() {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    rt.block_on(async {
        let pool = WorkerPool::new(4);
        let started = Instant::now();

        let mut outcomes = Vec::new();
        for i in 0..64u64 {
            let rx = pool
                .submit(
                    None,
                    async move {
                        tokio::time::sleep(Duration::from_millis(5 * (i % 4))).await;
                        Ok(())
                    },
                    NO_TIMEOUT,
                )
                .await;
            outcomes.push(rx);
        }
        for rx in outcomes {
            let _ = rx.await;
        }

        let metrics = pool.metrics();
        println!(
            "ran 64 tasks in {:?} on {}/{} workers (peak queue {})",
            started.elapsed(),
            metrics.live_workers,
            metrics.max_workers,
            metrics.waiting_tasks,
        );

        pool.stop_wait().await;
    });
}
