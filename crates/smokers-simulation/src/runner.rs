// Purpose: Implements the supervisor that owns the shared resources and runs every actor.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use smokers_core::{
    AgentActor, AgentSummary, FileStateLogger, SeededRng, SharedState, SmokerActor, SmokerError,
    SmokerId, SmokerSummary, StateLogger, SynchronizationSet, NUM_SMOKERS,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

use crate::config::{AccessKey, SimulationConfig};
use crate::invariant::{InvariantObserver, InvariantViolation};

/// Outcome of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub key: AccessKey,
    /// Base seed; smoker `i` used `seed + i`, the agent `seed + NUM_SMOKERS`.
    pub seed: u64,
    pub final_state: SharedState,
    /// Per-smoker summaries in id order.
    pub smokers: Vec<SmokerSummary>,
    pub agent: AgentSummary,
    pub snapshots: u64,
    pub violations: Vec<InvariantViolation>,
}

impl SimulationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation {} (seed {})", self.key, self.seed)?;
        writeln!(
            f,
            "  agent: {} rounds{}",
            self.agent.rounds,
            if self.agent.interrupted { " (interrupted)" } else { "" }
        )?;
        for smoker in &self.smokers {
            writeln!(
                f,
                "  smoker {} ({}): {} cigarettes",
                smoker.id,
                smoker.id.held(),
                smoker.cigarettes
            )?;
        }
        writeln!(f, "  ingredients left: {:?}", self.final_state.ingredient_count)?;
        writeln!(f, "  snapshots: {}", self.snapshots)?;
        write!(f, "  invariant violations: {}", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n    {violation}")?;
        }
        Ok(())
    }
}

enum ActorExit {
    Smoker(SmokerId, Result<SmokerSummary, SmokerError>),
    Agent(Result<AgentSummary, SmokerError>),
}

/// Owns the synchronisation set and the logger stack for one run.
///
/// Resources are created before any actor starts and live until every actor
/// has returned.
pub struct Simulation {
    config: SimulationConfig,
    sync: Arc<SynchronizationSet>,
    observer: Arc<InvariantObserver>,
}

impl Simulation {
    /// Validate the configuration and create the state log file it names.
    pub fn from_config(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let logger = FileStateLogger::create(&config.log.path, config.key.value(), config.log.format)
            .with_context(|| format!("failed to create state log {}", config.log.path.display()))?;
        Self::with_logger(config, Arc::new(logger))
    }

    /// Like [`Simulation::from_config`] but snapshots go to `logger`.
    pub fn with_logger(config: SimulationConfig, logger: Arc<dyn StateLogger>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sync: Arc::new(SynchronizationSet::new()),
            observer: Arc::new(InvariantObserver::with_default_checkers(logger)),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Handle on the synchronisation set, e.g. to inspect state mid-run.
    pub fn sync(&self) -> Arc<SynchronizationSet> {
        Arc::clone(&self.sync)
    }

    /// Run every actor to completion. Setting `stop` to `true` makes the
    /// agent close the factory early.
    ///
    /// If any actor fails, every semaphore is destroyed so the others return
    /// too, and the first failure is returned.
    pub async fn run(self, stop: watch::Receiver<bool>) -> Result<SimulationReport> {
        let key = self.config.key;
        let seed = self
            .config
            .seed
            .unwrap_or_else(|| SeededRng::from_entropy().get_seed());
        let span = info_span!("simulation", %key);
        info!(parent: &span, seed, cigarettes = self.config.cigarettes, "starting simulation");

        let logger: Arc<dyn StateLogger> = self.observer.clone();
        let mut actors = JoinSet::new();

        for id in SmokerId::all() {
            let smoker = SmokerActor::new(
                id,
                Arc::clone(&self.sync),
                Arc::clone(&logger),
                SeededRng::new(seed.wrapping_add(id.index() as u64)),
                self.config.delay,
            );
            actors.spawn(
                async move { ActorExit::Smoker(id, smoker.run().await) }
                    .instrument(info_span!(parent: &span, "smoker", id = id.index())),
            );
        }

        let agent = AgentActor::new(
            Arc::clone(&self.sync),
            Arc::clone(&logger),
            SeededRng::new(seed.wrapping_add(NUM_SMOKERS as u64)),
            self.config.cigarettes,
        );
        actors.spawn(
            async move { ActorExit::Agent(agent.run(stop).await) }
                .instrument(info_span!(parent: &span, "agent")),
        );

        let mut smokers = Vec::with_capacity(NUM_SMOKERS);
        let mut agent_summary = None;
        let mut failure: Option<anyhow::Error> = None;

        while let Some(joined) = actors.join_next().await {
            let exit = match joined {
                Ok(exit) => exit,
                Err(join_error) => {
                    error!(parent: &span, error = %join_error, "actor task aborted");
                    self.fail(&mut failure, anyhow!("actor task aborted: {join_error}"));
                    continue;
                }
            };
            match exit {
                ActorExit::Smoker(_, Ok(summary)) => smokers.push(summary),
                ActorExit::Smoker(id, Err(err)) => {
                    error!(parent: &span, smoker = %id, error = %err, "smoker terminated");
                    self.fail(&mut failure, anyhow::Error::new(err).context(format!("smoker {id} terminated")));
                }
                ActorExit::Agent(Ok(summary)) => agent_summary = Some(summary),
                ActorExit::Agent(Err(err)) => {
                    error!(parent: &span, error = %err, "agent terminated");
                    self.fail(&mut failure, anyhow::Error::new(err).context("agent terminated"));
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        smokers.sort_by_key(|summary| summary.id);
        let report = SimulationReport {
            key,
            seed,
            final_state: self.sync.snapshot()?,
            smokers,
            agent: agent_summary.ok_or_else(|| anyhow!("agent did not report"))?,
            snapshots: self.observer.snapshot_count(),
            violations: self.observer.violations(),
        };
        info!(parent: &span, snapshots = report.snapshots, violations = report.violations.len(), "simulation finished");
        Ok(report)
    }

    /// Record the first failure and release every blocked actor.
    fn fail(&self, failure: &mut Option<anyhow::Error>, err: anyhow::Error) {
        if !self.sync.is_destroyed() {
            self.sync.destroy();
        }
        failure.get_or_insert(err);
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .finish()
    }
}
