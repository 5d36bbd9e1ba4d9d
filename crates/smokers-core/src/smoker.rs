// Purpose: Implements the smoker actor and its wait/roll/smoke state machine.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{SmokerError, SmokerResult};
use crate::logger::StateLogger;
use crate::randomness::{DelayModel, SeededRng};
use crate::state::{SmokerId, SmokerStatus};
use crate::sync::SynchronizationSet;

/// What a smoker did before it observed the closing flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmokerSummary {
    pub id: SmokerId,
    pub cigarettes: u64,
}

/// One smoker. Holds ingredient `id` forever and loops
/// `WaitingForIngredients -> Rolling -> Smoking` until the factory closes.
///
/// All shared-state access goes through the handles given at construction;
/// the actor owns nothing global.
pub struct SmokerActor {
    id: SmokerId,
    sync: Arc<SynchronizationSet>,
    logger: Arc<dyn StateLogger>,
    rng: SeededRng,
    delay: DelayModel,
}

impl SmokerActor {
    pub fn new(
        id: SmokerId,
        sync: Arc<SynchronizationSet>,
        logger: Arc<dyn StateLogger>,
        rng: SeededRng,
        delay: DelayModel,
    ) -> Self {
        Self {
            id,
            sync,
            logger,
            rng,
            delay,
        }
    }

    pub fn id(&self) -> SmokerId {
        self.id
    }

    /// Announce the wait, block on `ingredients_ready[id]`, then either take
    /// the two complementary ingredients (`Ok(true)`) or, if the factory is
    /// closing, move to `Closing` (`Ok(false)`).
    ///
    /// The closing check and the consumption happen in the same critical
    /// section, so a smoker never consumes after closing was observed.
    pub async fn wait_for_ingredients(&mut self) -> SmokerResult<bool> {
        let id = self.id;
        self.sync.critical_section(self.logger.as_ref(), |state| {
            state.smoker_status[id.index()] = SmokerStatus::WaitingForIngredients;
        })?;
        debug!(smoker = %id, status = ?SmokerStatus::WaitingForIngredients, "waiting for ingredients");

        self.sync.wait_ingredients(id).await?;

        let proceed = self.sync.critical_section(self.logger.as_ref(), |state| {
            if state.closing {
                state.smoker_status[id.index()] = SmokerStatus::Closing;
                return Ok(false);
            }
            let needs = id.needs();
            // Both units must be on the table; take both or neither.
            if let Some(missing) = needs.iter().find(|i| state.ingredient_count[i.index()] < 1) {
                return Err(SmokerError::MissingIngredient {
                    id: id.index(),
                    ingredient: *missing,
                });
            }
            for ingredient in needs {
                state.ingredient_count[ingredient.index()] -= 1;
            }
            Ok(true)
        })??;

        if proceed {
            debug!(smoker = %id, needs = ?id.needs(), "took ingredients");
        } else {
            debug!(smoker = %id, status = ?SmokerStatus::Closing, "factory closing");
        }
        Ok(proceed)
    }

    /// Mark `Rolling`, work outside the lock, then notify the agent.
    pub async fn rolling_cigarette(&mut self) -> SmokerResult<()> {
        let id = self.id;
        let rolling_time = self.delay.sample(&mut self.rng);

        self.sync.critical_section(self.logger.as_ref(), |state| {
            state.smoker_status[id.index()] = SmokerStatus::Rolling;
        })?;
        debug!(smoker = %id, status = ?SmokerStatus::Rolling, ?rolling_time, "rolling");

        tokio::time::sleep(rolling_time).await;

        self.sync.signal_cigarette();
        Ok(())
    }

    /// Mark `Smoking`, work outside the lock, then count the cigarette.
    pub async fn smoke(&mut self) -> SmokerResult<()> {
        let id = self.id;

        self.sync.critical_section(self.logger.as_ref(), |state| {
            state.smoker_status[id.index()] = SmokerStatus::Smoking;
        })?;
        let smoking_time = self.delay.sample(&mut self.rng);
        debug!(smoker = %id, status = ?SmokerStatus::Smoking, ?smoking_time, "smoking");

        tokio::time::sleep(smoking_time).await;

        let total = self.sync.critical_section(self.logger.as_ref(), |state| {
            state.cigarette_count[id.index()] += 1;
            state.cigarette_count[id.index()]
        })?;
        debug!(smoker = %id, cigarettes = total, "finished cigarette");
        Ok(())
    }

    /// Life cycle of the smoker. Terminates only on the closing signal or on
    /// a fatal synchronisation error.
    pub async fn run(mut self) -> SmokerResult<SmokerSummary> {
        info!(smoker = %self.id, holds = %self.id.held(), seed = self.rng.get_seed(), "smoker started");

        let mut cigarettes = 0;
        while self.wait_for_ingredients().await? {
            self.rolling_cigarette().await?;
            self.smoke().await?;
            cigarettes += 1;
        }

        info!(smoker = %self.id, cigarettes, "smoker closed");
        Ok(SmokerSummary {
            id: self.id,
            cigarettes,
        })
    }
}

impl std::fmt::Debug for SmokerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmokerActor")
            .field("id", &self.id)
            .field("seed", &self.rng.get_seed())
            .field("delay", &self.delay)
            .finish()
    }
}
