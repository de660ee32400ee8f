use std::sync::Arc;
use storage_gateway_rs::queue::memory::MemoryQueue;
use storage_gateway_rs::worker::pool::WorkerPool;
use storage_gateway_rs::GatewayError;
use tokio::time::Duration;

#[tokio::test]
async fn test_worker_pool_creation() {
    let pool = WorkerPool::new(4);
    assert_eq!(pool.worker_count(), 4);
    assert!(!pool.is_running());
}

#[tokio::test]
async fn test_worker_pool_rejects_second_start() {
    let queue = Arc::new(MemoryQueue::with_capacity(8));
    let mut pool = WorkerPool::new(2);

    pool.start(Arc::clone(&queue)).unwrap();
    assert!(pool.is_running());

    let err = pool.start(Arc::clone(&queue)).unwrap_err();
    assert!(matches!(err, GatewayError::WorkerPoolError(_)));

    pool.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_idle_workers_stop_on_shutdown() {
    let queue = Arc::new(MemoryQueue::with_capacity(8));
    let mut pool = WorkerPool::new(3);
    pool.start(Arc::clone(&queue)).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(!pool.is_running());

    // a stopped pool can be started again
    pool.start(queue).unwrap();
    pool.shutdown(Duration::from_secs(5)).await.unwrap();
}
