//! Smokers Core
//!
//! The synchronisation protocol of the cigarette smokers problem: three
//! smokers, each holding one of tobacco, paper and matches, wait for an agent
//! to put the other two on the table, roll, smoke and go back to waiting,
//! until the agent closes the factory.
//!
//! ## Core Components
//!
//! - **SharedState**: the record every actor mutates under the mutex
//! - **SynchronizationSet**: the mutex plus the `ingredients_ready` and
//!   `cigarette_ready` wake-up semaphores
//! - **StateLogger**: durable snapshot sink called inside every critical section
//! - **SmokerActor**: the wait / roll / smoke state machine
//! - **AgentActor**: supplies ingredients and performs the closing handshake
//!
//! ## Shutdown
//!
//! Cancellation is two-phase: the closing flag is set under the mutex, then
//! every smoker's semaphore is signalled once. A smoker blocked on its
//! semaphore cannot observe the flag until it is woken.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smokers_core::{
//!     AgentActor, DelayModel, InMemoryStateLogger, SeededRng, SmokerActor, SmokerId,
//!     SynchronizationSet,
//! };
//!
//! # async fn demo() -> smokers_core::SmokerResult<()> {
//! let sync = Arc::new(SynchronizationSet::new());
//! let logger = Arc::new(InMemoryStateLogger::new());
//! for id in SmokerId::all() {
//!     let smoker = SmokerActor::new(
//!         id, sync.clone(), logger.clone(), SeededRng::new(id.index() as u64), DelayModel::default(),
//!     );
//!     tokio::spawn(smoker.run());
//! }
//! let (_stop, stop_rx) = tokio::sync::watch::channel(false);
//! AgentActor::new(sync, logger, SeededRng::new(99), 10).run(stop_rx).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod error;
pub mod logger;
pub mod randomness;
pub mod smoker;
pub mod state;
pub mod sync;

pub use agent::{AgentActor, AgentSummary};
pub use error::*;
pub use logger::{FileStateLogger, InMemoryStateLogger, SnapshotFormat, SnapshotRecord, StateLogger};
pub use randomness::{normal_rand, DelayModel, SeededRng, TimeUnit};
pub use smoker::{SmokerActor, SmokerSummary};
pub use state::*;
pub use sync::SynchronizationSet;
