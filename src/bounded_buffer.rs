//! Fixed-capacity circular buffer shared by producers and consumers.
//!
//! Two counting semaphores gate availability (`empty` counts free slots,
//! `full` counts filled ones) and a mutex protects the cursors and slots
//! themselves, so concurrent producers never race on `in` and concurrent
//! consumers never race on `out`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use std_semaphore::Semaphore;
use tracing::debug;

use crate::error::{Result, SimulationError};

struct Slots<T> {
    buffer: Vec<T>,
    // `in` is a keyword
    write: usize,
    read: usize,
    filled: usize,
}

pub struct BoundedBuffer<T> {
    slots: Mutex<Slots<T>>,
    empty: Semaphore,
    full: Semaphore,
    capacity: usize,
}

impl<T: Clone + Default> BoundedBuffer<T> {
    /// Creates a buffer with `capacity` slots, all free.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SimulationError::Initialization(
                "the buffer: capacity must be at least one slot".to_owned(),
            ));
        }
        let permits = isize::try_from(capacity).map_err(|_| {
            SimulationError::Initialization(format!("the buffer: capacity {} is too large", capacity))
        })?;

        Ok(BoundedBuffer {
            slots: Mutex::new(Slots {
                buffer: vec![T::default(); capacity],
                write: 0,
                read: 0,
                filled: 0,
            }),
            empty: Semaphore::new(permits),
            full: Semaphore::new(0),
            capacity,
        })
    }

    /// Blocks until a slot is free, then writes `item` at the write cursor.
    pub fn put(&self, item: T) {
        self.empty.acquire();
        {
            let mut slots = self.lock();
            debug_assert!(slots.filled < self.capacity, "overwriting an unread slot");
            let at = slots.write;
            slots.buffer[at] = item;
            slots.write = (at + 1) % self.capacity;
            slots.filled += 1;
            debug!("In: {}", slots.write);
        }
        self.full.release();
    }

    /// Blocks until a slot is filled, then reads it and frees it.
    pub fn take(&self) -> T {
        self.full.acquire();
        let item = {
            let mut slots = self.lock();
            debug_assert!(slots.filled > 0, "reading an empty slot");
            let at = slots.read;
            let item = std::mem::take(&mut slots.buffer[at]);
            slots.read = (at + 1) % self.capacity;
            slots.filled -= 1;
            debug!("Out: {}", slots.read);
            item
        };
        self.empty.release();
        item
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of written but not yet taken items.
    pub fn len(&self) -> usize {
        self.lock().filled
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Every critical section above is panic free, so a poisoned lock still
    // guards consistent cursors.
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedBuffer::<i32>::new(0),
            Err(SimulationError::Initialization(_))
        ));
    }

    #[test]
    fn items_come_out_in_slot_order_across_wraparound() {
        let buffer = BoundedBuffer::new(3).unwrap();
        for round in 0..4 {
            buffer.put(round * 2);
            buffer.put(round * 2 + 1);
            assert_eq!(buffer.len(), 2);
            assert_eq!(buffer.take(), round * 2);
            assert_eq!(buffer.take(), round * 2 + 1);
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn owned_items_are_moved_out_of_their_slot() {
        let buffer = BoundedBuffer::new(2).unwrap();
        buffer.put(String::from("primero"));
        buffer.put(String::from("segundo"));
        assert_eq!(buffer.take(), "primero");
        buffer.put(String::from("tercero"));
        assert_eq!(buffer.take(), "segundo");
        assert_eq!(buffer.take(), "tercero");
        assert!(buffer.is_empty());
    }

    #[test]
    fn put_blocks_while_full() {
        let buffer = Arc::new(BoundedBuffer::new(2).unwrap());
        buffer.put(1);
        buffer.put(2);

        let producer_buffer = buffer.clone();
        let producer = thread::spawn(move || producer_buffer.put(3));

        thread::sleep(Duration::from_millis(50));
        // the producer is still waiting for a free slot
        assert_eq!(buffer.len(), 2);
        assert!(!producer.is_finished());

        assert_eq!(buffer.take(), 1);
        producer.join().unwrap();
        assert_eq!(buffer.take(), 2);
        assert_eq!(buffer.take(), 3);
    }

    #[test]
    fn take_blocks_until_something_is_put() {
        let buffer = Arc::new(BoundedBuffer::new(1).unwrap());
        let consumer_buffer = buffer.clone();
        let consumer = thread::spawn(move || consumer_buffer.take());

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());

        buffer.put(7);
        assert_eq!(consumer.join().unwrap(), 7);
    }
}
