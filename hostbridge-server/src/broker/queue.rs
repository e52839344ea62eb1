//! Per-executor request queue
//!
//! FIFO of tool calls waiting for the owning executor's next `/pull`. Each
//! queue has its own lock, so one client's long-poll never contends with
//! another client's traffic.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use hostbridge_protocol::ToolCallRequest;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<ToolCallRequest>,
    /// Set once the owning client is superseded or expired
    closed: bool,
}

/// FIFO of undelivered requests for one executor
#[derive(Debug, Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request and wake a waiting pull
    ///
    /// Returns the new depth, or hands the request back if the queue is
    /// closed so the caller can route it elsewhere.
    pub fn enqueue(&self, request: ToolCallRequest) -> Result<usize, ToolCallRequest> {
        let depth = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(request);
            }
            state.items.push_back(request);
            state.items.len()
        };
        self.notify.notify_one();
        Ok(depth)
    }

    /// Remove and return everything queued, in enqueue order
    pub fn drain_all(&self) -> Vec<ToolCallRequest> {
        let mut state = self.state.lock();
        state.items.drain(..).collect()
    }

    /// Close the queue and return whatever was still undelivered
    ///
    /// Later enqueues are refused; waiting pulls are woken.
    pub fn close(&self) -> Vec<ToolCallRequest> {
        let orphans = {
            let mut state = self.state.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.notify.notify_waiters();
        orphans
    }

    /// Wait up to `max_wait` for an enqueue (or close) signal
    ///
    /// Returns `true` when signalled. Wakeups can be spurious, so callers
    /// re-check the queue either way.
    pub async fn wait(&self, max_wait: Duration) -> bool {
        tokio::time::timeout(max_wait, self.notify.notified())
            .await
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn request(tool: &str) -> ToolCallRequest {
        ToolCallRequest::new(tool, json!({}))
    }

    #[test]
    fn test_fifo_order() {
        let queue = RequestQueue::new();
        let a = request("a");
        let b = request("b");
        let c = request("c");
        queue.enqueue(a.clone()).unwrap();
        queue.enqueue(b.clone()).unwrap();
        assert_eq!(queue.enqueue(c.clone()).unwrap(), 3);

        assert_eq!(queue.drain_all(), vec![a, b, c]);
    }

    #[test]
    fn test_drain_is_exhaustive() {
        let queue = RequestQueue::new();
        queue.enqueue(request("a")).unwrap();
        queue.enqueue(request("b")).unwrap();

        assert_eq!(queue.drain_all().len(), 2);
        assert!(queue.drain_all().is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_close_returns_orphans_and_refuses_enqueue() {
        let queue = RequestQueue::new();
        let a = request("a");
        queue.enqueue(a.clone()).unwrap();

        let orphans = queue.close();
        assert_eq!(orphans, vec![a]);

        let rejected = queue.enqueue(request("late")).unwrap_err();
        assert_eq!(rejected.tool_name, "late");
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_when_idle() {
        let queue = RequestQueue::new();
        assert!(!queue.wait(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_enqueue_before_wait_is_not_lost() {
        let queue = RequestQueue::new();
        queue.enqueue(request("a")).unwrap();
        // The stored permit completes the wait immediately
        assert!(queue.wait(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let queue = Arc::new(RequestQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait(Duration::from_secs(30)).await })
        };
        tokio::task::yield_now().await;

        queue.enqueue(request("a")).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_concurrent_drains_never_duplicate() {
        let queue = Arc::new(RequestQueue::new());
        for i in 0..1000 {
            queue.enqueue(request(&format!("t{i}"))).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        let batch = queue.drain_all();
                        if batch.is_empty() {
                            break;
                        }
                        seen.extend(batch.into_iter().map(|r| r.request_id));
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(all.len(), 1000);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
