//! # Hourglass Core
//!
//! Scheduling primitives shared by every part of the hourglass scheduler:
//!
//! - [`Trigger`]: a schedule (one-shot, fixed rate, fixed delay, cron) plus
//!   its fire-time bookkeeping
//! - [`JobStore`]: the persistence and state-machine contract, with the
//!   in-memory [`MemoryJobStore`]
//! - [`Signaler`]: the callback surface the store uses to wake the loop
//! - [`JobHandler`] / [`HandlerRegistry`]: job bodies resolved by name
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use chrono::Utc;
//! use hourglass_core::{JobInfo, JobStore, MemoryJobStore, Trigger, TriggerState};
//!
//! # async fn demo() -> hourglass_core::SchedulerResult<()> {
//! let store = MemoryJobStore::new();
//! store.store_job(JobInfo::new("cleanup", "noop"), false).await?;
//!
//! let mut trigger = Trigger::fixed_rate("cleanup-every-minute", "cleanup", Duration::from_secs(60));
//! trigger.compute_next_fire_time(Utc::now());
//! store.store_trigger(trigger, TriggerState::Waiting, false).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handler;
pub mod job;
pub mod signaler;
pub mod store;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use handler::{FnHandler, HandlerRegistry, HandlerResolver, JobHandler};
pub use job::{JobContext, JobInfo};
pub use signaler::{NoopSignaler, Signaler};
pub use store::{
    CompletedExecutionInstruction, DueEntry, DueIndex, JobStore, MemoryJobStore, TriggerFiredResult,
};
pub use trigger::{
    CronSchedule, DelayOrRateSchedule, NEVER, Trigger, TriggerKind, TriggerState, millis_to_time,
    time_to_millis,
};
