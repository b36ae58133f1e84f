//! Sleeping barber problem.
//!
//! Three semaphores and a mutex coordinate the barber and the customers:
//! - `waiting_room` counts chairs and bounds how many customers examine the
//!   room at the same time.
//! - `check_waiting_room` is binary, so the barber deciding to sleep and a
//!   customer deciding to wake the barber never interleave.
//! - `wake_up_barber` is where the barber waits while the queue is empty.
//! - `modify_queue` protects occupancy, the queue and both counters.
//!
//! The barber only falls asleep after re-reading the queue while holding
//! `check_waiting_room`, and a customer only posts `wake_up_barber` while
//! holding it too, clearing `is_sleeping` as it does. Each sleep is therefore
//! woken exactly once and never misses a customer queued in between.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::{thread_rng, Rng};
use std_semaphore::Semaphore;
use tracing::{debug, info, warn};

use crate::actors::{join_actor, spawn_actor};
use crate::error::{Result, SimulationError};

pub type CustomerId = u64;

/// Raw value meaning "pick the default" in [`ShopConfig::from_raw`].
pub const UNSPECIFIED: i64 = -1;
pub const DEFAULT_MAX_SERVICE: Duration = Duration::from_millis(6000);
pub const DEFAULT_MAX_ARRIVAL: Duration = Duration::from_millis(4000);
pub const DEFAULT_OPENING_DELAY: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopConfig {
    pub chairs: usize,
    /// Upper bound (exclusive) of the random haircut time.
    pub max_service: Duration,
    /// `None` keeps the shop open forever.
    pub expected_customers: Option<u64>,
}

impl ShopConfig {
    /// Builds a config from the classic `(chairs, seconds, customers)` triple,
    /// where `-1` seconds means the default maximum and `-1` customers means
    /// unbounded.
    pub fn from_raw(chairs: i64, service_time_seconds: i64, expected_customers: i64) -> Result<Self> {
        let chairs = usize::try_from(chairs)
            .ok()
            .filter(|&chairs| chairs > 0)
            .ok_or_else(|| {
                SimulationError::Initialization(format!(
                    "the waiting area: {} chairs, at least one is needed",
                    chairs
                ))
            })?;

        let max_service = match service_time_seconds {
            UNSPECIFIED => DEFAULT_MAX_SERVICE,
            seconds => u64::try_from(seconds).map(Duration::from_secs).map_err(|_| {
                SimulationError::Initialization(format!("the haircut time: {} seconds", seconds))
            })?,
        };

        let expected_customers = match expected_customers {
            UNSPECIFIED => None,
            customers => Some(u64::try_from(customers).map_err(|_| {
                SimulationError::Initialization(format!("the customer count: {}", customers))
            })?),
        };

        Ok(ShopConfig {
            chairs,
            max_service,
            expected_customers,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarberState {
    Idle,
    Serving(CustomerId),
    Closed,
}

struct WaitingRoom {
    occupied_count: usize,
    customer_queue: VecDeque<CustomerId>,
    customers_serviced: u64,
    customers_expected: Option<u64>,
}

impl WaitingRoom {
    // Customers turned away lower the expected count, and extra arrivals can
    // push it under what was already served, hence `>=`.
    fn can_close(&self) -> bool {
        self.customer_queue.is_empty()
            && self
                .customers_expected
                .is_some_and(|expected| self.customers_serviced >= expected)
    }
}

/// Point-in-time copy of the waiting room taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub occupied_count: usize,
    pub queued: Vec<CustomerId>,
    pub customers_serviced: u64,
    pub customers_expected: Option<u64>,
}

pub struct BarberShop {
    chairs_count: usize,
    max_service: Duration,
    waiting_room: Semaphore,
    check_waiting_room: Semaphore,
    wake_up_barber: Semaphore,
    modify_queue: Mutex<WaitingRoom>,
    // only written while holding check_waiting_room
    is_sleeping: AtomicBool,
    opened: AtomicBool,
}

impl BarberShop {
    /// Builds an empty shop. The barber does not work until [`BarberShop::open`].
    pub fn new(config: &ShopConfig) -> Result<Arc<Self>> {
        let chairs = isize::try_from(config.chairs)
            .ok()
            .filter(|&chairs| chairs > 0)
            .ok_or_else(|| {
                SimulationError::Initialization(format!(
                    "the waiting area semaphore with {} chairs",
                    config.chairs
                ))
            })?;

        Ok(Arc::new(BarberShop {
            chairs_count: config.chairs,
            max_service: config.max_service,
            waiting_room: Semaphore::new(chairs),
            check_waiting_room: Semaphore::new(1),
            wake_up_barber: Semaphore::new(0),
            modify_queue: Mutex::new(WaitingRoom {
                occupied_count: 0,
                customer_queue: VecDeque::with_capacity(config.chairs),
                customers_serviced: 0,
                customers_expected: config.expected_customers,
            }),
            is_sleeping: AtomicBool::new(false),
            opened: AtomicBool::new(false),
        }))
    }

    /// Starts the barber thread. It returns the served customers, in order,
    /// once the shop closes.
    pub fn open(self: &Arc<Self>) -> Result<JoinHandle<Vec<CustomerId>>> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(SimulationError::Initialization(
                "the barber: the shop is already open".to_owned(),
            ));
        }
        let shop = self.clone();
        spawn_actor("barber", move || shop.cut_hair_or_sleep())
    }

    pub fn chairs(&self) -> usize {
        self.chairs_count
    }

    pub fn is_barber_sleeping(&self) -> bool {
        let _check = self.check_waiting_room.access();
        self.is_sleeping.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let room = self.room();
        RoomSnapshot {
            occupied_count: room.occupied_count,
            queued: room.customer_queue.iter().copied().collect(),
            customers_serviced: room.customers_serviced,
            customers_expected: room.customers_expected,
        }
    }

    /// A customer's whole visit: take a seat and wake the barber if needed,
    /// or leave because every chair is taken.
    pub fn try_enter(&self, id: CustomerId) -> EntryOutcome {
        let _access = self.waiting_room.access();

        match self.enter_shop(id) {
            EntryOutcome::Accepted => {
                info!("Customer {} entered the barber shop.", id);
                let _check = self.check_waiting_room.access();
                if self.is_sleeping.swap(false, Ordering::SeqCst) {
                    debug!("customer {} wakes the barber up", id);
                    self.wake_up_barber.release();
                }
                EntryOutcome::Accepted
            }
            EntryOutcome::Rejected => {
                self.turn_away(id);
                EntryOutcome::Rejected
            }
        }
    }

    /// No more customers will arrive: the barber serves whoever is seated and
    /// then closes, even when the expected count was unbounded. Call it once
    /// every customer's attempt has returned.
    pub fn close_doors(&self) {
        let _check = self.check_waiting_room.access();
        let can_close = {
            let mut room = self.room();
            room.customers_expected = Some(room.customers_serviced + room.customer_queue.len() as u64);
            room.can_close()
        };
        if can_close && self.is_sleeping.swap(false, Ordering::SeqCst) {
            self.wake_up_barber.release();
        }
    }

    fn turn_away(&self, id: CustomerId) {
        info!("Customer {} left the shop because it is full.", id);
        let _check = self.check_waiting_room.access();
        let can_close = {
            let mut room = self.room();
            if let Some(expected) = room.customers_expected.as_mut() {
                *expected = expected.saturating_sub(1);
            }
            room.can_close()
        };
        // nobody else wakes the barber if this was the last expected customer
        if can_close && self.is_sleeping.swap(false, Ordering::SeqCst) {
            self.wake_up_barber.release();
        }
    }

    fn enter_shop(&self, id: CustomerId) -> EntryOutcome {
        let mut room = self.room();
        if room.occupied_count == self.chairs_count {
            return EntryOutcome::Rejected;
        }
        room.occupied_count += 1;
        room.customer_queue.push_back(id);
        EntryOutcome::Accepted
    }

    fn cut_hair_or_sleep(&self) -> Vec<CustomerId> {
        let mut served = Vec::new();
        loop {
            match self.next_state() {
                BarberState::Closed => {
                    info!("Serviced expected number of customers. Closing shop.");
                    return served;
                }
                BarberState::Idle => {
                    info!("Barber is sleeping.");
                    self.wake_up_barber.acquire();
                }
                BarberState::Serving(id) => {
                    info!("Cutting hair of Customer {}.", id);
                    std::thread::sleep(random_delay(self.max_service));
                    self.room().customers_serviced += 1;
                    info!("Customer {} left the shop after haircut.", id);
                    served.push(id);
                }
            }
        }
    }

    fn next_state(&self) -> BarberState {
        let _check = self.check_waiting_room.access();
        let mut room = self.room();
        match room.customer_queue.pop_front() {
            Some(id) => {
                room.occupied_count -= 1;
                BarberState::Serving(id)
            }
            None if room.can_close() => BarberState::Closed,
            None => {
                self.is_sleeping.store(true, Ordering::SeqCst);
                BarberState::Idle
            }
        }
    }

    fn room(&self) -> MutexGuard<'_, WaitingRoom> {
        self.modify_queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Timing of a full simulation around a [`BarberShop`].
#[derive(Debug, Clone)]
pub struct ShopSimulation {
    pub shop: ShopConfig,
    /// Upper bound (exclusive) of the random gap between two arrivals.
    pub max_arrival: Duration,
    pub opening_delay: Duration,
}

impl ShopSimulation {
    pub fn new(shop: ShopConfig) -> Self {
        ShopSimulation {
            shop,
            max_arrival: DEFAULT_MAX_ARRIVAL,
            opening_delay: DEFAULT_OPENING_DELAY,
        }
    }
}

#[derive(Debug, Default)]
pub struct ShopReport {
    /// Customers in the order the barber served them.
    pub served: Vec<CustomerId>,
    /// Customers that found every chair taken, sorted by id.
    pub rejected: Vec<CustomerId>,
}

type CustomerHandle = JoinHandle<(CustomerId, EntryOutcome)>;

/// Opens a shop and sends customers `0, 1, 2, ...` at random intervals until
/// the expected count is reached. With an unbounded count it never returns
/// and finished customers are joined and forgotten as it goes.
///
/// If a customer thread cannot be spawned, the customers already sent are
/// joined and the doors are closed so the barber finishes before the error
/// is returned.
pub fn run_shop(simulation: &ShopSimulation) -> Result<ShopReport> {
    info!("A barbershop with {} chairs is created", simulation.shop.chairs);
    let shop = BarberShop::new(&simulation.shop)?;
    let barber = shop.open()?;
    // opening the shop takes a while
    std::thread::sleep(simulation.opening_delay);

    let mut customers: Vec<CustomerHandle> = Vec::new();
    let mut id: CustomerId = 0;

    while simulation.shop.expected_customers.map_or(true, |expected| id < expected) {
        std::thread::sleep(random_delay(simulation.max_arrival));
        let customer_shop = shop.clone();
        let spawned = spawn_actor(format!("customer-{}", id), move || {
            (id, customer_shop.try_enter(id))
        });
        match spawned {
            Ok(customer) => customers.push(customer),
            Err(e) => {
                wind_down(&shop, barber, customers);
                return Err(e);
            }
        }
        id += 1;

        if simulation.shop.expected_customers.is_none() {
            reap_finished(&mut customers)?;
        }
    }

    let served = join_actor(barber)?;
    let mut rejected = Vec::new();
    for customer in customers {
        record_outcome(join_actor(customer)?, &mut rejected);
    }
    rejected.sort_unstable();

    Ok(ShopReport { served, rejected })
}

fn reap_finished(customers: &mut Vec<CustomerHandle>) -> Result<()> {
    let (finished, running): (Vec<_>, Vec<_>) =
        customers.drain(..).partition(|customer| customer.is_finished());
    *customers = running;
    for customer in finished {
        let (id, outcome) = join_actor(customer)?;
        debug!("customer {} done: {:?}", id, outcome);
    }
    Ok(())
}

fn wind_down(shop: &BarberShop, barber: JoinHandle<Vec<CustomerId>>, customers: Vec<CustomerHandle>) {
    for customer in customers {
        if let Err(e) = join_actor(customer) {
            warn!("{}", e);
        }
    }
    shop.close_doors();
    if let Err(e) = join_actor(barber) {
        warn!("{}", e);
    }
}

fn record_outcome((id, outcome): (CustomerId, EntryOutcome), rejected: &mut Vec<CustomerId>) {
    if outcome == EntryOutcome::Rejected {
        rejected.push(id);
    }
}

/// Uniform delay in `[0, max)` with millisecond resolution.
fn random_delay(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(thread_rng().gen_range(0..max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(chairs: usize, expected: Option<u64>) -> ShopConfig {
        ShopConfig {
            chairs,
            max_service: Duration::ZERO,
            expected_customers: expected,
        }
    }

    #[test]
    fn raw_config_maps_minus_one_to_defaults() {
        let config = ShopConfig::from_raw(3, -1, -1).unwrap();
        assert_eq!(config.chairs, 3);
        assert_eq!(config.max_service, DEFAULT_MAX_SERVICE);
        assert_eq!(config.expected_customers, None);

        let config = ShopConfig::from_raw(1, 2, 5).unwrap();
        assert_eq!(config.max_service, Duration::from_secs(2));
        assert_eq!(config.expected_customers, Some(5));
    }

    #[test]
    fn raw_config_rejects_bad_values() {
        for (chairs, seconds, customers) in [(0, 1, 1), (-4, 1, 1), (2, -2, 1), (2, 1, -7)] {
            assert!(
                matches!(
                    ShopConfig::from_raw(chairs, seconds, customers),
                    Err(SimulationError::Initialization(_))
                ),
                "({}, {}, {}) should be rejected",
                chairs,
                seconds,
                customers
            );
        }
    }

    #[test]
    fn full_room_rejects_without_touching_the_queue() {
        let shop = BarberShop::new(&quick_config(2, Some(10))).unwrap();
        assert_eq!(shop.try_enter(0), EntryOutcome::Accepted);
        assert_eq!(shop.try_enter(1), EntryOutcome::Accepted);

        let before = shop.snapshot();
        assert_eq!(shop.try_enter(2), EntryOutcome::Rejected);
        let after = shop.snapshot();

        assert_eq!(after.occupied_count, before.occupied_count);
        assert_eq!(after.queued, vec![0, 1]);
        assert_eq!(after.customers_expected, Some(9));
    }

    #[test]
    fn queue_length_matches_occupancy() {
        let shop = BarberShop::new(&quick_config(4, None)).unwrap();
        for id in 0..3 {
            shop.try_enter(id);
            let snapshot = shop.snapshot();
            assert_eq!(snapshot.queued.len(), snapshot.occupied_count);
        }
    }

    #[test]
    fn idle_barber_is_woken_by_the_next_customer() {
        let shop = BarberShop::new(&quick_config(1, Some(1))).unwrap();
        let barber = shop.open().unwrap();

        while !shop.is_barber_sleeping() {
            std::thread::yield_now();
        }
        assert_eq!(shop.try_enter(42), EntryOutcome::Accepted);

        assert_eq!(join_actor(barber).unwrap(), vec![42]);
        let snapshot = shop.snapshot();
        assert_eq!(snapshot.occupied_count, 0);
        assert_eq!(snapshot.customers_serviced, 1);
    }

    #[test]
    fn last_rejection_lets_a_sleeping_barber_close() {
        let shop = BarberShop::new(&quick_config(1, Some(2))).unwrap();
        assert_eq!(shop.try_enter(0), EntryOutcome::Accepted);

        // customer 1 finds the only chair taken...
        assert_eq!(shop.enter_shop(1), EntryOutcome::Rejected);

        // ...and before it leaves the barber serves 0 and falls asleep
        let barber = shop.open().unwrap();
        while !shop.is_barber_sleeping() {
            std::thread::yield_now();
        }
        let snapshot = shop.snapshot();
        assert_eq!(snapshot.customers_serviced, 1);
        assert_eq!(snapshot.occupied_count, 0);
        assert!(snapshot.queued.is_empty());

        shop.turn_away(1);
        assert_eq!(join_actor(barber).unwrap(), vec![0]);
        assert_eq!(shop.snapshot().customers_expected, Some(1));
    }

    #[test]
    fn closing_the_doors_stops_an_unbounded_shop() {
        let shop = BarberShop::new(&quick_config(2, None)).unwrap();
        let barber = shop.open().unwrap();
        while !shop.is_barber_sleeping() {
            std::thread::yield_now();
        }

        shop.close_doors();
        assert!(join_actor(barber).unwrap().is_empty());
    }

    #[test]
    fn closing_the_doors_still_serves_seated_customers() {
        let shop = BarberShop::new(&quick_config(2, None)).unwrap();
        shop.try_enter(3);
        shop.try_enter(4);
        shop.close_doors();

        let barber = shop.open().unwrap();
        assert_eq!(join_actor(barber).unwrap(), vec![3, 4]);
        assert_eq!(shop.snapshot().customers_expected, Some(2));
    }

    #[test]
    fn finished_customers_are_reaped() {
        let shop = BarberShop::new(&quick_config(1, None)).unwrap();
        let mut customers: Vec<CustomerHandle> = (0..3)
            .map(|id| {
                let shop = shop.clone();
                spawn_actor(format!("customer-{}", id), move || (id, shop.try_enter(id))).unwrap()
            })
            .collect();
        while !customers.iter().all(|customer| customer.is_finished()) {
            std::thread::yield_now();
        }

        reap_finished(&mut customers).unwrap();
        assert!(customers.is_empty());
    }

    #[test]
    fn opening_twice_is_an_error() {
        let shop = BarberShop::new(&quick_config(1, Some(0))).unwrap();
        let barber = shop.open().unwrap();
        assert!(matches!(shop.open(), Err(SimulationError::Initialization(_))));
        assert!(join_actor(barber).unwrap().is_empty());
    }
}
