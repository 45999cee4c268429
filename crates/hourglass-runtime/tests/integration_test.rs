//! End-to-end scheduler tests over the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hourglass_core::{
    HandlerRegistry, JobContext, JobHandler, JobInfo, JobStore, MemoryJobStore, Trigger,
    TriggerState,
};
use hourglass_runtime::{Scheduler, SchedulerConfig};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Panic,
}

struct CountingHandler {
    count: Arc<AtomicUsize>,
    behavior: Behavior,
}

#[async_trait]
impl JobHandler for CountingHandler {
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => anyhow::bail!("job {} always fails", ctx.job.key),
            Behavior::Panic => panic!("job {} blew up", ctx.job.key),
        }
    }
}

/// Tracks how many runs overlap.
#[derive(Default)]
struct SlowHandler {
    active: AtomicUsize,
    peak: AtomicUsize,
    runs: AtomicUsize,
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn execute(&self, _ctx: &JobContext) -> anyhow::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    scheduler: Scheduler,
    count: Arc<AtomicUsize>,
}

fn config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_idle_wait(Duration::from_millis(50))
        .with_workers(4, 64)
}

async fn harness() -> Harness {
    let count = Arc::new(AtomicUsize::new(0));
    let handlers = Arc::new(HandlerRegistry::new());
    for (name, behavior) in [
        ("count", Behavior::Succeed),
        ("fail", Behavior::Fail),
        ("panic", Behavior::Panic),
    ] {
        let handler = CountingHandler {
            count: count.clone(),
            behavior,
        };
        handlers.register(name, Arc::new(handler)).unwrap();
    }

    let scheduler = Scheduler::builder(Arc::new(MemoryJobStore::new()), handlers)
        .with_config(config())
        .build();
    scheduler.start().await.unwrap();

    Harness { scheduler, count }
}

fn fired(harness: &Harness) -> usize {
    harness.count.load(Ordering::SeqCst)
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ============================================================================
// Firing
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rate_trigger_fires_repeatedly() {
    let h = harness().await;
    h.scheduler
        .schedule_job(
            JobInfo::new("j1", "count"),
            Trigger::fixed_rate("t1", "j1", Duration::from_millis(100)),
        )
        .await
        .unwrap();

    sleep_ms(750).await;
    assert!(fired(&h) >= 3, "fired {} times", fired(&h));

    let trigger = h.scheduler.store().trigger("t1").await.unwrap().unwrap();
    assert!(trigger.rounds >= 3);
    assert!(trigger.previous_fire_time.is_some());

    let metrics = h.scheduler.metrics();
    assert!(metrics.triggers_fired >= 3);
    assert!(metrics.jobs_completed >= 3);
    h.scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trigger_job_runs_once() {
    let h = harness().await;
    h.scheduler
        .add_job(JobInfo::new("j1", "count"), false)
        .await
        .unwrap();

    let key = h.scheduler.trigger_job("j1").await.unwrap();
    sleep_ms(300).await;

    assert_eq!(fired(&h), 1);
    assert!(h.scheduler.store().trigger(&key).await.unwrap().is_none());
    assert!(h.scheduler.store().job_triggers("j1").await.unwrap().is_empty());
    assert_eq!(h.scheduler.armed_count(), 0);
    h.scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delay_trigger_waits_for_completion() {
    let slow = Arc::new(SlowHandler::default());
    let handlers = Arc::new(HandlerRegistry::new());
    handlers.register("slow", slow.clone()).unwrap();

    let scheduler = Scheduler::builder(Arc::new(MemoryJobStore::new()), handlers)
        .with_config(config())
        .build();
    scheduler.start().await.unwrap();
    scheduler
        .schedule_job(
            JobInfo::new("j1", "slow"),
            Trigger::fixed_delay("t1", "j1", Duration::from_millis(10)),
        )
        .await
        .unwrap();

    sleep_ms(1000).await;
    scheduler.shutdown().await;

    assert!(slow.runs.load(Ordering::SeqCst) >= 2);
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Pause and resume
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_stops_and_resume_restarts() {
    let h = harness().await;
    h.scheduler
        .schedule_job(
            JobInfo::new("j1", "count"),
            Trigger::fixed_rate("t1", "j1", Duration::from_millis(50)),
        )
        .await
        .unwrap();

    sleep_ms(300).await;
    h.scheduler.pause_job("j1").await.unwrap();
    sleep_ms(100).await;
    let paused_at = fired(&h);
    assert!(paused_at > 0);

    sleep_ms(300).await;
    assert_eq!(fired(&h), paused_at);
    let trigger = h.scheduler.store().trigger("t1").await.unwrap().unwrap();
    assert_eq!(trigger.state, TriggerState::Paused);

    h.scheduler.resume_job("j1").await.unwrap();
    sleep_ms(300).await;
    assert!(fired(&h) > paused_at);
    h.scheduler.shutdown().await;
}

// ============================================================================
// Failure containment
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_handler_keeps_scheduler_alive() {
    let h = harness().await;
    h.scheduler
        .schedule_job(
            JobInfo::new("j1", "fail"),
            Trigger::fixed_rate("t1", "j1", Duration::from_millis(50)),
        )
        .await
        .unwrap();
    h.scheduler
        .schedule_job(
            JobInfo::new("j2", "panic"),
            Trigger::fixed_rate("t2", "j2", Duration::from_millis(50)),
        )
        .await
        .unwrap();

    sleep_ms(500).await;
    let metrics = h.scheduler.metrics();
    assert!(metrics.jobs_failed >= 4, "failed {}", metrics.jobs_failed);
    assert_eq!(metrics.jobs_completed, 0);

    let t1 = h.scheduler.store().trigger("t1").await.unwrap().unwrap();
    assert!(t1.rounds >= 2);
    h.scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_handler_releases_trigger() {
    let h = harness().await;
    h.scheduler
        .schedule_job(
            JobInfo::new("j1", "missing"),
            Trigger::fixed_rate("t1", "j1", Duration::from_millis(50)),
        )
        .await
        .unwrap();

    sleep_ms(200).await;
    let metrics = h.scheduler.metrics();
    assert!(metrics.triggers_released >= 1);
    assert_eq!(metrics.triggers_fired, 0);
    assert_eq!(fired(&h), 0);
    assert!(h.scheduler.store().trigger("t1").await.unwrap().is_some());
    h.scheduler.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_firing() {
    let h = harness().await;
    h.scheduler
        .schedule_job(
            JobInfo::new("j1", "count"),
            Trigger::fixed_rate("t1", "j1", Duration::from_millis(50)),
        )
        .await
        .unwrap();

    sleep_ms(200).await;
    h.scheduler.shutdown().await;
    let stopped_at = fired(&h);

    sleep_ms(200).await;
    assert_eq!(fired(&h), stopped_at);
    assert_eq!(h.scheduler.armed_count(), 0);
    assert!(h.scheduler.is_shutdown());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trigger_stored_directly_fires() {
    let h = harness().await;
    let store = h.scheduler.store().clone();
    store
        .store_job(JobInfo::new("j1", "count"), false)
        .await
        .unwrap();

    let mut trigger = Trigger::fixed_time("t1", "j1", chrono::Utc::now());
    trigger.compute_next_fire_time(chrono::Utc::now());
    store
        .store_trigger(trigger, TriggerState::Waiting, false)
        .await
        .unwrap();

    sleep_ms(200).await;
    assert_eq!(fired(&h), 1);
    h.scheduler.shutdown().await;
}
