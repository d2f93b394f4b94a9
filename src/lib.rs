//! A bounded, elastic worker pool.
//!
//! A single dispatcher routes submitted units of work to a fleet of
//! workers that grows on demand up to a fixed ceiling and shrinks again
//! while idle. Work beyond the fleet's capacity waits in an unbounded
//! FIFO queue, so submission never blocks on execution. Each task
//! carries a cancellation scope, an optional deadline, and a single-shot
//! result channel; the pool as a whole supports a full-fleet pause
//! barrier and both draining and abandoning shutdown.
//!
//! ```ignore
//! use surgepool::{WorkerPool, NO_TIMEOUT};
//!
//! let pool = WorkerPool::new(4);
//! let outcome = pool
//!     .submit(None, async { Ok(()) }, NO_TIMEOUT)
//!     .await;
//! assert!(outcome.await.unwrap().is_ok());
//! pool.stop_wait().await;
//! ```

pub mod errors;
pub mod model;
pub mod pool;

mod dispatch;
mod task;
mod worker;

pub use errors::{BoxError, TaskError, TaskResult};
pub use model::PoolMetrics;
pub use pool::{Config, WorkerPool, NO_TIMEOUT};
pub use task::OutcomeReceiver;
