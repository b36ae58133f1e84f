//! Producer/consumer simulation over a [`BoundedBuffer`].
//!
//! Producers claim the integers `0..items` from a shared counter and stop once
//! every item is claimed. The consumers keep taking until they read the
//! end-of-production sentinel (`None`), which the coordinator puts once per
//! consumer after the producers are joined.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::actors::{join_actor, spawn_actor};
use crate::bounded_buffer::BoundedBuffer;
use crate::error::{Result, SimulationError};

pub const BUFFER_SIZE: usize = 10;
pub const ITEMS_TO_PRODUCE: usize = 20;
pub const CONSUMERS: usize = 2;

/// What travels through the buffer: an item, or `None` once production ended.
pub type Delivery = Option<i32>;

#[derive(Debug, Clone)]
pub struct ProductionConfig {
    pub capacity: usize,
    pub items: usize,
    pub consumers: usize,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        ProductionConfig {
            capacity: BUFFER_SIZE,
            items: ITEMS_TO_PRODUCE,
            consumers: CONSUMERS,
        }
    }
}

/// State shared by every actor of one run, handed to each at spawn time.
pub struct ProductionContext {
    buffer: BoundedBuffer<Delivery>,
    produced: AtomicUsize,
    items: usize,
}

impl ProductionContext {
    pub fn new(capacity: usize, items: usize) -> Result<Self> {
        if i32::try_from(items).is_err() {
            return Err(SimulationError::Initialization(format!(
                "the producer: {} items do not fit the item type",
                items
            )));
        }
        Ok(ProductionContext {
            buffer: BoundedBuffer::new(capacity)?,
            produced: AtomicUsize::new(0),
            items,
        })
    }

    pub fn buffer(&self) -> &BoundedBuffer<Delivery> {
        &self.buffer
    }

    /// How many items producers have claimed so far. Never exceeds the item
    /// count.
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    fn claim_next(&self) -> Option<usize> {
        self.produced
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |claimed| {
                (claimed < self.items).then_some(claimed + 1)
            })
            .ok()
    }

    /// Ends production: one sentinel per consumer, queued behind every item.
    pub fn close(&self, consumers: usize) {
        for _ in 0..consumers {
            self.buffer.put(None);
        }
    }
}

/// Producer body. Returns the items in the order they were put.
///
/// Several producers may share one context: each item is claimed from the
/// counter before it is put, so no value is written twice.
pub fn producer(context: &ProductionContext) -> Vec<i32> {
    let mut produced = Vec::new();
    while let Some(claimed) = context.claim_next() {
        // the item count was checked against i32 when the context was built
        let item = claimed as i32;
        context.buffer.put(Some(item));
        info!("Produced: {}", item);
        produced.push(item);
    }
    debug!("producer done after {} items", produced.len());
    produced
}

/// Consumer body. Returns what this consumer took, in order.
pub fn consumer(id: usize, context: &ProductionContext) -> Vec<i32> {
    let mut consumed = Vec::new();
    while let Some(item) = context.buffer.take() {
        info!("Consumer {} consumed: {}", id, item);
        consumed.push(item);
    }
    debug!("consumer {} saw the end of production", id);
    consumed
}

#[derive(Debug)]
pub struct ProductionReport {
    pub produced: Vec<i32>,
    /// `(consumer id, items it consumed)` for every consumer.
    pub consumed: Vec<(usize, Vec<i32>)>,
}

impl ProductionReport {
    /// Every consumed item across consumers, sorted.
    pub fn all_consumed(&self) -> Vec<i32> {
        let mut all: Vec<i32> = self
            .consumed
            .iter()
            .flat_map(|(_, items)| items.iter().copied())
            .collect();
        all.sort_unstable();
        all
    }
}

type ConsumerHandle = JoinHandle<(usize, Vec<i32>)>;

/// Runs one producer and `config.consumers` consumers to completion.
///
/// Consumers start first. If a later thread cannot be spawned, or the
/// producer panics, the consumers already running still get their sentinels
/// and are joined before the error is returned.
pub fn run_production(config: &ProductionConfig) -> Result<ProductionReport> {
    if config.consumers == 0 {
        return Err(SimulationError::Initialization(
            "the consumers: at least one is needed to drain the buffer".to_owned(),
        ));
    }
    let context = Arc::new(ProductionContext::new(config.capacity, config.items)?);

    let mut consumer_handles: Vec<ConsumerHandle> = Vec::with_capacity(config.consumers);
    for id in 1..=config.consumers {
        let consumer_context = context.clone();
        let spawned = spawn_actor(format!("consumer-{}", id), move || {
            (id, consumer(id, &consumer_context))
        });
        match spawned {
            Ok(handle) => consumer_handles.push(handle),
            Err(e) => {
                stop_consumers(&context, consumer_handles);
                return Err(e);
            }
        }
    }

    let producer_context = context.clone();
    let producer_handle = match spawn_actor("producer", move || producer(&producer_context)) {
        Ok(handle) => handle,
        Err(e) => {
            stop_consumers(&context, consumer_handles);
            return Err(e);
        }
    };

    let produced = join_actor(producer_handle);
    context.close(consumer_handles.len());
    let consumed = consumer_handles
        .into_iter()
        .map(join_actor)
        .collect::<Result<Vec<_>>>()?;

    Ok(ProductionReport {
        produced: produced?,
        consumed,
    })
}

fn stop_consumers(context: &ProductionContext, consumers: Vec<ConsumerHandle>) {
    context.close(consumers.len());
    for handle in consumers {
        if let Err(e) = join_actor(handle) {
            warn!("{}", e);
        }
    }
}
