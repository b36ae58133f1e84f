//! Helpers to run each actor on its own named OS thread.

use std::thread::{self, JoinHandle};

use tracing::trace;

use crate::error::{Result, SimulationError};

/// Spawns `body` on a thread named `name`, reporting spawn failures as
/// [`SimulationError::ThreadSpawn`] instead of panicking like `thread::spawn`.
pub fn spawn_actor<F, T>(name: impl Into<String>, body: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    trace!("spawning {}", name);
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| SimulationError::ThreadSpawn { actor: name, source })
}

/// Joins an actor, turning a panic into [`SimulationError::ActorPanicked`].
pub fn join_actor<T>(handle: JoinHandle<T>) -> Result<T> {
    let name = handle.thread().name().unwrap_or("unnamed").to_owned();
    handle.join().map_err(|_| SimulationError::ActorPanicked(name))
}
