// Purpose: Implements the agent that supplies ingredients and closes the factory.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::SmokerResult;
use crate::logger::StateLogger;
use crate::randomness::SeededRng;
use crate::state::{AgentStatus, SmokerId, NUM_SMOKERS};
use crate::sync::SynchronizationSet;

/// Totals reported by the agent once the factory is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentSummary {
    /// Supply rounds whose cigarette was reported back.
    pub rounds: u64,
    /// Supplies handed to each smoker.
    pub supplied: [u64; NUM_SMOKERS],
    /// Whether the run was cut short by a stop request.
    pub interrupted: bool,
}

/// Producer side of the protocol: puts two ingredients on the table, wakes
/// the one smoker holding the third, and waits for its cigarette before the
/// next round. With at most one supply outstanding, counts never go
/// negative.
pub struct AgentActor {
    sync: Arc<SynchronizationSet>,
    logger: Arc<dyn StateLogger>,
    rng: SeededRng,
    rounds: u64,
}

impl AgentActor {
    pub fn new(
        sync: Arc<SynchronizationSet>,
        logger: Arc<dyn StateLogger>,
        rng: SeededRng,
        rounds: u64,
    ) -> Self {
        Self {
            sync,
            logger,
            rng,
            rounds,
        }
    }

    /// Supply the complements of a randomly chosen smoker and wake it.
    pub fn prepare_ingredients(&mut self) -> SmokerResult<SmokerId> {
        let target = SmokerId::new(self.rng.gen_range(0..NUM_SMOKERS))?;
        self.supply(target)?;
        Ok(target)
    }

    /// Supply the complements of `target` and wake it.
    pub fn supply(&self, target: SmokerId) -> SmokerResult<()> {
        self.sync.critical_section(self.logger.as_ref(), |state| {
            state.agent_status = AgentStatus::PreparingIngredients;
            for ingredient in target.needs() {
                state.ingredient_count[ingredient.index()] += 1;
            }
        })?;
        debug!(smoker = %target, ingredients = ?target.needs(), "ingredients on the table");
        self.sync.signal_ingredients(target);
        Ok(())
    }

    /// Announce the wait and block on `cigarette_ready`.
    pub async fn wait_cigarette(&self) -> SmokerResult<()> {
        self.sync.critical_section(self.logger.as_ref(), |state| {
            state.agent_status = AgentStatus::WaitingCigarette;
        })?;
        self.sync.wait_cigarette().await
    }

    /// Set the closing flag and wake every smoker once.
    pub fn close_factory(&self) -> SmokerResult<()> {
        info!("closing the factory");
        self.sync.close_factory(self.logger.as_ref())
    }

    /// Run `rounds` supply rounds, or fewer if `stop` flips to `true`, then
    /// close the factory. A dropped stop sender is not a stop request.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> SmokerResult<AgentSummary> {
        info!(rounds = self.rounds, seed = self.rng.get_seed(), "agent started");
        let mut summary = AgentSummary::default();

        for _ in 0..self.rounds {
            if *stop.borrow() {
                summary.interrupted = true;
                break;
            }
            let target = self.prepare_ingredients()?;
            summary.supplied[target.index()] += 1;

            tokio::select! {
                result = self.wait_cigarette() => result?,
                Ok(()) = async { stop.wait_for(|stopped| *stopped).await.map(|_| ()) } => {
                    warn!(smoker = %target, "stop requested while a cigarette was being rolled");
                    summary.interrupted = true;
                    break;
                }
            }
            summary.rounds += 1;
        }

        self.close_factory()?;
        info!(rounds = summary.rounds, supplied = ?summary.supplied, "agent closed");
        Ok(summary)
    }
}

impl std::fmt::Debug for AgentActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentActor")
            .field("rounds", &self.rounds)
            .field("seed", &self.rng.get_seed())
            .finish()
    }
}
