//! # Hourglass Runtime
//!
//! The moving parts of the hourglass scheduler: the polling loop, the
//! deferred executor, the worker pool, the execution handoff and the
//! recovery loops. Persistence and fire-time arithmetic live in
//! `hourglass-core`.
//!
//! ## Architecture
//!
//! ```text
//!  Scheduler API ──► JobStore ──schedulingChange──► LoopSignaler
//!                       ▲                               │ wake
//!                       │ acquire                       ▼
//!                       └──────────────────────── scheduler loop
//!                                                       │ arm
//!                                                       ▼
//!               trigger_fired ◄── WaitingTask ◄── DeferredExecutor
//!                                     │ submit(job key)
//!                                     ▼
//!            trigger_completed ◄── JobRunTask ◄── WorkerPool
//!
//!  misfire loop ── WAITING too long ──┐
//!  lost loop ───── ACQUIRED too long ─┴──► recompute + re-store
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hourglass_core::{FnHandler, HandlerRegistry, JobContext, JobInfo, MemoryJobStore, Trigger};
//! use hourglass_runtime::{Scheduler, SchedulerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handlers = Arc::new(HandlerRegistry::new());
//!     handlers.register("hello", Arc::new(FnHandler::new(|ctx: JobContext| async move {
//!         println!("fired {}", ctx.trigger_key);
//!         Ok::<_, anyhow::Error>(())
//!     })))?;
//!
//!     let scheduler = Scheduler::builder(Arc::new(MemoryJobStore::new()), handlers)
//!         .with_config(SchedulerConfig::default().with_idle_wait(Duration::from_secs(1)))
//!         .build();
//!     scheduler.start().await?;
//!     scheduler
//!         .schedule_job(
//!             JobInfo::new("greeter", "hello"),
//!             Trigger::fixed_rate("every-second", "greeter", Duration::from_secs(1)),
//!         )
//!         .await?;
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```

mod armed;
mod handoff;
mod scheduler_loop;

pub mod config;
pub mod deferred;
pub mod metrics;
pub mod pool;
pub mod recovery;
pub mod scheduler;
pub mod signal;

pub use armed::ArmedTasks;
pub use config::{SchedulerConfig, WorkerPoolConfig};
pub use deferred::{DeferredExecutor, DeferredHandle};
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use pool::{ExecutionPool, JobFuture, WorkerPool};
pub use recovery::{RecoveryKind, RecoveryReport, recover_once};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use signal::{LoopSignaler, WakeReason};
