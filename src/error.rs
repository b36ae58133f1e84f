//! Errors raised while setting up or running a simulation.

use thiserror::Error;

/// Fatal infrastructure failures. Nothing here is retried: callers get the
/// error and decide whether to abort.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// A synchronization primitive or the shared state could not be built
    /// from the given parameters.
    #[error("unable to initialize {0}")]
    Initialization(String),

    /// The OS refused to create an actor thread.
    #[error("unable to create the {actor} thread: {source}")]
    ThreadSpawn {
        actor: String,
        #[source]
        source: std::io::Error,
    },

    /// An actor thread panicked before finishing its protocol.
    #[error("{0} thread panicked")]
    ActorPanicked(String),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
