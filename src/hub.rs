//! A bounded, drop-oldest broadcast channel: every subscriber gets its own
//! queue, and a queue that fills up silently drops its oldest entry to make
//! room for the newest one rather than blocking the publisher. Grounded on
//! the original's condition-variable notify pattern in `SignalCenter::newObs`
//! (`m_condObsReady.notify_one()`) but implemented without a global
//! instance: callers construct and share an `Arc<Broadcast<T>>` explicitly.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

struct Subscriber<T> {
    queue: Mutex<VecDeque<T>>,
    ready: Condvar,
}

/// A bounded fan-out channel. `publish` never blocks: once a subscriber's
/// queue reaches `capacity`, its oldest entry is dropped to admit the new
/// one, so a downstream consumer that falls behind loses old data rather
/// than stalling the publisher.
pub struct Broadcast<T> {
    capacity: usize,
    subscribers: Mutex<Vec<Arc<Subscriber<T>>>>,
}

impl<T: Clone> Broadcast<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let sub = Arc::new(Subscriber {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        });
        self.subscribers.lock().unwrap().push(sub.clone());
        Receiver { sub }
    }

    /// Pushes `value` onto every live subscriber's queue, dropping the
    /// oldest entry first if a queue is already at capacity.
    pub fn publish(&self, value: T) {
        let subs = self.subscribers.lock().unwrap();
        for sub in subs.iter() {
            let mut q = sub.queue.lock().unwrap();
            if q.len() >= self.capacity {
                q.pop_front();
            }
            q.push_back(value.clone());
            sub.ready.notify_one();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

pub struct Receiver<T> {
    sub: Arc<Subscriber<T>>,
}

impl<T> Receiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.sub.queue.lock().unwrap().pop_front()
    }

    /// Blocks until an item is available or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<T> {
        let q = self.sub.queue.lock().unwrap();
        let (mut q, _timed_out) = self
            .sub
            .ready
            .wait_timeout_while(q, timeout, |q| q.is_empty())
            .unwrap();
        q.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn subscriber_receives_published_values() {
        let hub: Broadcast<u32> = Broadcast::new(4);
        let rx = hub.subscribe();
        hub.publish(1);
        hub.publish(2);
        assert_eq!(rx.try_recv(), Some(1));
        assert_eq!(rx.try_recv(), Some(2));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn drops_oldest_entry_once_capacity_is_reached() {
        let hub: Broadcast<u32> = Broadcast::new(2);
        let rx = hub.subscribe();
        hub.publish(1);
        hub.publish(2);
        hub.publish(3);
        assert_eq!(rx.try_recv(), Some(2));
        assert_eq!(rx.try_recv(), Some(3));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn recv_timeout_returns_none_when_nothing_arrives() {
        let hub: Broadcast<u32> = Broadcast::new(2);
        let rx = hub.subscribe();
        assert_eq!(rx.recv_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn each_subscriber_gets_its_own_independent_queue() {
        let hub: Broadcast<u32> = Broadcast::new(4);
        let rx_a = hub.subscribe();
        hub.publish(1);
        let rx_b = hub.subscribe();
        hub.publish(2);
        assert_eq!(rx_a.try_recv(), Some(1));
        assert_eq!(rx_a.try_recv(), Some(2));
        assert_eq!(rx_b.try_recv(), Some(2));
    }
}
