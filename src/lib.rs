//! Two classic semaphore exercises on real OS threads: a bounded buffer shared
//! by a producer and several consumers, and the sleeping barber.

pub mod actors;
pub mod barber_shop;
pub mod bounded_buffer;
pub mod error;
pub mod producer_consumer;
pub mod trace;

pub use barber_shop::{
    run_shop, BarberShop, CustomerId, EntryOutcome, RoomSnapshot, ShopConfig, ShopReport,
    ShopSimulation,
};
pub use bounded_buffer::BoundedBuffer;
pub use error::{Result, SimulationError};
pub use producer_consumer::{run_production, ProductionConfig, ProductionContext, ProductionReport};
