use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use flightcore_packet::Packet;

/// A bounded FIFO of packets guarded by one mutex.
///
/// Pushing onto a full queue evicts the oldest packet. Producers are never
/// told: fresh telemetry matters more than complete history.
#[derive(Debug)]
pub struct ChannelQueue {
    name: &'static str,
    capacity: usize,
    items: Mutex<VecDeque<Packet>>,
    evicted: AtomicU64,
}

impl ChannelQueue {
    /// Create a queue; capacity is at least one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Packet>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a packet, evicting the oldest entry if the queue is full.
    pub fn push(&self, packet: Packet) {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            if let Some(old) = items.pop_front() {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    queue = self.name,
                    packet_type = %old.packet_type,
                    "queue full, evicted oldest packet"
                );
            }
        }
        items.push_back(packet);
    }

    /// Remove and return the oldest packet.
    pub fn pop(&self) -> Option<Packet> {
        self.lock().pop_front()
    }

    /// Drop every queued packet, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let removed = items.len();
        items.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Packets evicted by overflow since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use flightcore_packet::{NodeId, PacketType};

    use super::*;

    fn tagged(tag: u8) -> Packet {
        Packet::new(PacketType::DATA_OBC_RESPONSE, NodeId::Obc, NodeId::Ground)
            .with_payload(vec![tag])
    }

    fn tags(queue: &ChannelQueue) -> Vec<u8> {
        std::iter::from_fn(|| queue.pop())
            .map(|p| p.payload[0])
            .collect()
    }

    #[test]
    fn fifo_order_within_capacity() {
        let queue = ChannelQueue::new("radio", 4);
        for tag in 0..3 {
            queue.push(tagged(tag));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(tags(&queue), vec![0, 1, 2]);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn overflow_keeps_last_n_in_order() {
        for capacity in [1usize, 2, 8, 50] {
            let queue = ChannelQueue::new("main", capacity);
            for tag in 0..=capacity as u8 {
                queue.push(tagged(tag));
            }
            assert_eq!(queue.len(), capacity);
            assert_eq!(queue.evicted(), 1);
            let expected: Vec<u8> = (1..=capacity as u8).collect();
            assert_eq!(tags(&queue), expected);
        }
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let queue = ChannelQueue::new("pdu", 0);
        queue.push(tagged(1));
        queue.push(tagged(2));
        assert_eq!(queue.capacity(), 1);
        assert_eq!(tags(&queue), vec![2]);
    }

    #[test]
    fn clear_reports_removed_count() {
        let queue = ChannelQueue::new("companion", 8);
        queue.push(tagged(1));
        queue.push(tagged(2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let queue = Arc::new(ChannelQueue::new("main", 16));
        let producers: Vec<_> = (0..4)
            .map(|id| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for _ in 0..100 {
                        queue.push(tagged(id));
                        assert!(queue.len() <= 16);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(queue.len(), 16);
        assert_eq!(queue.evicted(), 400 - 16);
    }
}
