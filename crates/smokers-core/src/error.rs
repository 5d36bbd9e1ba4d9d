//! Error types for the smokers core
//!
//! Every failure an actor can hit is fatal for that actor and nothing here
//! is retried. Observing the closing flag is not an error and never surfaces
//! through this type.

//-----------------------------------------------------------------------------
// Error Types
//-----------------------------------------------------------------------------

use thiserror::Error;

use crate::state::Ingredient;

/// Main error type for the smokers core.
#[derive(Error, Debug)]
pub enum SmokerError {
    /// An actor identifier outside `[0, NUM_SMOKERS)`.
    #[error("Smoker process identification is wrong: {id} (expected < {max})")]
    InvalidSmokerId { id: usize, max: usize },

    /// The mutex guarding the shared state was poisoned by a panicking holder.
    #[error("error on the mutex guarding the shared state: poisoned while held")]
    MutexPoisoned,

    /// A wake-up semaphore was closed while an actor waited on it.
    #[error("error on the down operation for semaphore `{name}`: semaphore closed")]
    SemaphoreClosed { name: String },

    /// A smoker was woken for a supply that is not on the table. Raised only
    /// when the agent breaks the protocol.
    #[error("smoker {id} was woken without {ingredient} on the table")]
    MissingIngredient { id: usize, ingredient: Ingredient },

    /// The state logger could not persist a snapshot.
    #[error("State log error: {0}")]
    StateLog(#[from] StateLogError),
}

/// Errors raised by [`crate::logger::StateLogger`] implementations.
#[derive(Error, Debug)]
pub enum StateLogError {
    /// The underlying sink rejected the write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The logger's own bookkeeping lock was poisoned.
    #[error("logger lock poisoned")]
    Poisoned,
}

impl SmokerError {
    /// Whether the error came from a synchronisation primitive rather than
    /// from configuration or logging.
    pub fn is_ipc_failure(&self) -> bool {
        matches!(
            self,
            SmokerError::MutexPoisoned | SmokerError::SemaphoreClosed { .. }
        )
    }
}

/// Result type alias for smokers core operations.
pub type SmokerResult<T> = Result<T, SmokerError>;
