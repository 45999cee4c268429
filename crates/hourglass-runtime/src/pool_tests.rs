    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    fn pool(pool_size: usize, queue_depth: usize) -> WorkerPool {
        let pool = WorkerPool::new(WorkerPoolConfig {
            pool_size,
            queue_depth,
        });
        pool.start();
        pool
    }

    #[tokio::test]
    async fn test_submit_runs_job() {
        let pool = pool(2, 4);
        let (tx, rx) = oneshot::channel();

        pool.submit("job", async move {
            let _ = tx.send(42);
        }
        .boxed())
        .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(pool.total_processed(), 1);
    }

    #[tokio::test]
    async fn test_rejects_when_stopped() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let result = pool.submit("job", async {}.boxed());
        assert!(matches!(result, Err(SchedulerError::PoolRejected(_))));
        assert_eq!(pool.total_rejected(), 1);
    }

    #[tokio::test]
    async fn test_rejects_when_saturated() {
        let pool = pool(1, 1);
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        for _ in 0..2 {
            let mut rx = release_rx.clone();
            pool.submit("slow", async move {
                let _ = rx.wait_for(|released| *released).await;
            }
            .boxed())
            .unwrap();
        }

        let result = pool.submit("slow", async {}.boxed());
        assert!(matches!(result, Err(SchedulerError::PoolRejected(_))));

        release_tx.send(true).unwrap();
        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(pool.total_processed(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = pool(2, 16);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let active = active.clone();
            let peak = peak.clone();
            pool.submit("job", async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
            .boxed())
            .unwrap();
        }

        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(pool.total_processed(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available_workers(), 2);
    }
