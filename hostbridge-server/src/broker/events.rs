//! Executor event fan-out
//!
//! Events pushed by executors are kept in a bounded ring for later queries and
//! broadcast to live subscribers (the stdio front forwards them as
//! notifications).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use hostbridge_protocol::{BridgeEvent, ClientId};

/// Capacity of the live broadcast channel; slow subscribers see `Lagged`
const BROADCAST_CAPACITY: usize = 256;

/// An event as recorded by the broker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorEvent {
    /// Monotonic sequence number, starting at 1
    pub seq: u64,
    pub event_type: String,
    pub origin_client_id: ClientId,
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

/// Buffered events in `seq` order and the next number to hand out
#[derive(Debug)]
struct Ring {
    events: VecDeque<ExecutorEvent>,
    next_seq: u64,
}

/// Bounded event history plus live fan-out
#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<ExecutorEvent>,
    ring: Mutex<Ring>,
    capacity: usize,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            ring: Mutex::new(Ring {
                events: VecDeque::with_capacity(capacity.min(1024)),
                next_seq: 1,
            }),
            capacity,
        }
    }

    /// Record an event and notify subscribers; returns its sequence number
    ///
    /// Numbering, buffering and broadcast happen under one lock, so both the
    /// ring and every subscriber see events in `seq` order.
    pub fn publish(&self, origin: ClientId, event: BridgeEvent) -> u64 {
        let mut ring = self.ring.lock();
        let seq = ring.next_seq;
        ring.next_seq += 1;
        let event = ExecutorEvent {
            seq,
            event_type: event.event_type,
            origin_client_id: origin,
            data: event.data,
            received_at: Utc::now(),
        };

        if self.capacity > 0 {
            if ring.events.len() == self.capacity {
                ring.events.pop_front();
            }
            ring.events.push_back(event.clone());
        }

        // No subscribers is fine
        let receivers = self.sender.send(event).unwrap_or(0);
        drop(ring);
        trace!(seq, receivers, "Event published");
        seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.sender.subscribe()
    }

    /// Buffered events with `seq > since`, oldest first, at most `limit`
    ///
    /// When more than `limit` match, the newest `limit` are returned.
    pub fn recent(&self, since: u64, limit: usize) -> Vec<ExecutorEvent> {
        let ring = self.ring.lock();
        let matching: Vec<&ExecutorEvent> = ring.events.iter().filter(|e| e.seq > since).collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.ring.lock().events.len()
    }
}
