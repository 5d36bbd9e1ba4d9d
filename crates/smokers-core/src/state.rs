//! Shared state record for the smokers problem
//!
//! [`SharedState`] is plain data: ingredient counts, per-smoker lifecycle
//! status and cigarette counters, the agent's status and the closing flag.
//! It is only ever read or written while the mutex in
//! [`crate::sync::SynchronizationSet`] is held.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SmokerError, SmokerResult};

/// Number of distinct ingredient kinds.
pub const NUM_INGREDIENTS: usize = 3;

/// Number of smokers; smoker `k` permanently holds ingredient `k`.
pub const NUM_SMOKERS: usize = NUM_INGREDIENTS;

//-----------------------------------------------------------------------------
// Identifiers
//-----------------------------------------------------------------------------

/// Ingredient kinds, indexed the same way as smoker ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ingredient {
    Tobacco,
    Paper,
    Matches,
}

impl Ingredient {
    pub const ALL: [Ingredient; NUM_INGREDIENTS] =
        [Ingredient::Tobacco, Ingredient::Paper, Ingredient::Matches];

    pub fn index(self) -> usize {
        match self {
            Ingredient::Tobacco => 0,
            Ingredient::Paper => 1,
            Ingredient::Matches => 2,
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ingredient::Tobacco => write!(f, "tobacco"),
            Ingredient::Paper => write!(f, "paper"),
            Ingredient::Matches => write!(f, "matches"),
        }
    }
}

/// Validated smoker identifier in `[0, NUM_SMOKERS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SmokerId(usize);

impl SmokerId {
    pub fn new(id: usize) -> SmokerResult<Self> {
        if id >= NUM_SMOKERS {
            return Err(SmokerError::InvalidSmokerId {
                id,
                max: NUM_SMOKERS,
            });
        }
        Ok(Self(id))
    }

    /// All smoker ids in ascending order.
    pub fn all() -> impl Iterator<Item = SmokerId> {
        (0..NUM_SMOKERS).map(SmokerId)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// The ingredient this smoker holds permanently.
    pub fn held(self) -> Ingredient {
        Ingredient::ALL[self.0]
    }

    /// The two ingredients this smoker has to be supplied with.
    pub fn needs(self) -> [Ingredient; 2] {
        let mut needed = Ingredient::ALL
            .into_iter()
            .filter(|ingredient| ingredient.index() != self.0);
        // NUM_INGREDIENTS == 3, so exactly two remain.
        match (needed.next(), needed.next()) {
            (Some(a), Some(b)) => [a, b],
            _ => unreachable!("three ingredient kinds leave two complements"),
        }
    }
}

impl fmt::Display for SmokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//-----------------------------------------------------------------------------
// Lifecycle states
//-----------------------------------------------------------------------------

/// Smoker lifecycle. `Closing` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SmokerStatus {
    #[default]
    WaitingForIngredients,
    Rolling,
    Smoking,
    Closing,
}

impl SmokerStatus {
    /// Four-letter mnemonic used by the table log format.
    pub fn mnemonic(self) -> &'static str {
        match self {
            SmokerStatus::WaitingForIngredients => "WAIT",
            SmokerStatus::Rolling => "ROLL",
            SmokerStatus::Smoking => "SMOK",
            SmokerStatus::Closing => "CLOS",
        }
    }
}

/// Agent lifecycle. `Closing` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    #[default]
    PreparingIngredients,
    WaitingCigarette,
    Closing,
}

impl AgentStatus {
    pub fn mnemonic(self) -> &'static str {
        match self {
            AgentStatus::PreparingIngredients => "PREP",
            AgentStatus::WaitingCigarette => "WCIG",
            AgentStatus::Closing => "CLOS",
        }
    }
}

//-----------------------------------------------------------------------------
// Shared record
//-----------------------------------------------------------------------------

/// The single record every actor mutates under the mutex.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharedState {
    /// Units of each ingredient on the table, indexed by [`Ingredient::index`].
    pub ingredient_count: [i64; NUM_INGREDIENTS],
    /// Per-smoker status; each slot is written only by its owner.
    pub smoker_status: [SmokerStatus; NUM_SMOKERS],
    /// Completed roll+smoke cycles per smoker.
    pub cigarette_count: [u64; NUM_SMOKERS],
    pub agent_status: AgentStatus,
    /// One-way shutdown signal.
    pub closing: bool,
}

impl SharedState {
    /// Fresh state: every smoker waiting, nothing on the table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, id: SmokerId) -> SmokerStatus {
        self.smoker_status[id.index()]
    }

    pub fn cigarettes_of(&self, id: SmokerId) -> u64 {
        self.cigarette_count[id.index()]
    }

    pub fn count_of(&self, ingredient: Ingredient) -> i64 {
        self.ingredient_count[ingredient.index()]
    }

    pub fn total_cigarettes(&self) -> u64 {
        self.cigarette_count.iter().sum()
    }

    /// Whether every smoker has reached `Closing`.
    pub fn all_closed(&self) -> bool {
        self.smoker_status
            .iter()
            .all(|status| *status == SmokerStatus::Closing)
    }
}
