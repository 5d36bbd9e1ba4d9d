// Purpose: Defines the invariant checking system applied to every state snapshot
//
// Checkers compare each snapshot with the one before it. The observer sits in
// front of the real state logger, so every critical section is checked in the
// order it happened.

use std::fmt;
use std::sync::{Arc, Mutex};

use smokers_core::{
    SharedState, SmokerStatus, StateLogError, StateLogger, NUM_INGREDIENTS, NUM_SMOKERS,
};
use tracing::warn;

/// Type of invariant being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvariantType {
    /// No ingredient count ever drops below zero
    NonNegativeIngredients,
    /// Cigarette counters only grow, one at a time, while smoking
    MonotonicCigarettes,
    /// Neither the closing flag nor a `Closing` status is ever left
    ClosingIsTerminal,
    /// Consumption removes exactly one unit of each of a smoker's two complements
    PairedConsumption,
}

impl fmt::Display for InvariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonNegativeIngredients => write!(f, "NonNegativeIngredients"),
            Self::MonotonicCigarettes => write!(f, "MonotonicCigarettes"),
            Self::ClosingIsTerminal => write!(f, "ClosingIsTerminal"),
            Self::PairedConsumption => write!(f, "PairedConsumption"),
        }
    }
}

/// Result of an invariant check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Satisfied,
    Violated(String),
}

/// A violation recorded by [`InvariantObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub invariant_type: InvariantType,
    /// Position of the offending snapshot in the log, starting at zero.
    pub snapshot: u64,
    pub message: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} violated at snapshot {}: {}",
            self.invariant_type, self.snapshot, self.message
        )
    }
}

/// Trait defining an invariant checker
pub trait InvariantChecker: Send + Sync + fmt::Debug {
    fn invariant_type(&self) -> InvariantType;

    /// Check `current` given the snapshot taken just before it, if any.
    fn check(&self, previous: Option<&SharedState>, current: &SharedState) -> InvariantResult;
}

//-----------------------------------------------------------------------------
// Checkers
//-----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct NonNegativeIngredients;

impl InvariantChecker for NonNegativeIngredients {
    fn invariant_type(&self) -> InvariantType {
        InvariantType::NonNegativeIngredients
    }

    fn check(&self, _previous: Option<&SharedState>, current: &SharedState) -> InvariantResult {
        match current.ingredient_count.iter().position(|count| *count < 0) {
            Some(kind) => InvariantResult::Violated(format!(
                "ingredient {kind} count is {}",
                current.ingredient_count[kind]
            )),
            None => InvariantResult::Satisfied,
        }
    }
}

#[derive(Debug, Default)]
pub struct MonotonicCigarettes;

impl InvariantChecker for MonotonicCigarettes {
    fn invariant_type(&self) -> InvariantType {
        InvariantType::MonotonicCigarettes
    }

    fn check(&self, previous: Option<&SharedState>, current: &SharedState) -> InvariantResult {
        let Some(previous) = previous else {
            return InvariantResult::Satisfied;
        };
        for id in 0..NUM_SMOKERS {
            let (before, after) = (previous.cigarette_count[id], current.cigarette_count[id]);
            if after < before {
                return InvariantResult::Violated(format!(
                    "smoker {id} count went from {before} to {after}"
                ));
            }
            if after - before > 1 {
                return InvariantResult::Violated(format!(
                    "smoker {id} count jumped from {before} to {after}"
                ));
            }
            if after > before && previous.smoker_status[id] != SmokerStatus::Smoking {
                return InvariantResult::Violated(format!(
                    "smoker {id} finished a cigarette while {:?}",
                    previous.smoker_status[id]
                ));
            }
        }
        InvariantResult::Satisfied
    }
}

#[derive(Debug, Default)]
pub struct ClosingIsTerminal;

impl InvariantChecker for ClosingIsTerminal {
    fn invariant_type(&self) -> InvariantType {
        InvariantType::ClosingIsTerminal
    }

    fn check(&self, previous: Option<&SharedState>, current: &SharedState) -> InvariantResult {
        let Some(previous) = previous else {
            return InvariantResult::Satisfied;
        };
        if previous.closing && !current.closing {
            return InvariantResult::Violated("closing flag was cleared".to_string());
        }
        for id in 0..NUM_SMOKERS {
            if previous.smoker_status[id] == SmokerStatus::Closing
                && current.smoker_status[id] != SmokerStatus::Closing
            {
                return InvariantResult::Violated(format!(
                    "smoker {id} left Closing for {:?}",
                    current.smoker_status[id]
                ));
            }
        }
        InvariantResult::Satisfied
    }
}

#[derive(Debug, Default)]
pub struct PairedConsumption;

impl InvariantChecker for PairedConsumption {
    fn invariant_type(&self) -> InvariantType {
        InvariantType::PairedConsumption
    }

    fn check(&self, previous: Option<&SharedState>, current: &SharedState) -> InvariantResult {
        let Some(previous) = previous else {
            return InvariantResult::Satisfied;
        };
        let deltas: Vec<i64> = (0..NUM_INGREDIENTS)
            .map(|k| current.ingredient_count[k] - previous.ingredient_count[k])
            .collect();
        if deltas.iter().all(|delta| *delta >= 0) {
            return InvariantResult::Satisfied;
        }

        let untouched: Vec<usize> = (0..NUM_INGREDIENTS).filter(|&k| deltas[k] == 0).collect();
        let taken_once = deltas.iter().filter(|delta| **delta == -1).count();
        if untouched.len() != 1 || taken_once != 2 {
            return InvariantResult::Violated(format!(
                "ingredient deltas {deltas:?} are not one unit of each of two kinds"
            ));
        }

        // The smoker holding the untouched kind is the consumer.
        let consumer = untouched[0];
        if current.smoker_status[consumer] != SmokerStatus::WaitingForIngredients {
            return InvariantResult::Violated(format!(
                "smoker {consumer} consumed while {:?}",
                current.smoker_status[consumer]
            ));
        }
        InvariantResult::Satisfied
    }
}

/// Every built-in checker.
pub fn default_checkers() -> Vec<Box<dyn InvariantChecker>> {
    vec![
        Box::new(NonNegativeIngredients),
        Box::new(MonotonicCigarettes),
        Box::new(ClosingIsTerminal),
        Box::new(PairedConsumption),
    ]
}

//-----------------------------------------------------------------------------
// Observer
//-----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ObserverState {
    previous: Option<SharedState>,
    seen: u64,
    violations: Vec<InvariantViolation>,
}

/// [`StateLogger`] decorator that checks each snapshot, records violations,
/// and forwards the snapshot to the wrapped logger.
pub struct InvariantObserver {
    checkers: Vec<Box<dyn InvariantChecker>>,
    inner: Arc<dyn StateLogger>,
    state: Mutex<ObserverState>,
}

impl fmt::Debug for InvariantObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvariantObserver")
            .field("checkers", &self.checkers)
            .finish()
    }
}

impl InvariantObserver {
    pub fn new(inner: Arc<dyn StateLogger>, checkers: Vec<Box<dyn InvariantChecker>>) -> Self {
        Self {
            checkers,
            inner,
            state: Mutex::new(ObserverState::default()),
        }
    }

    pub fn with_default_checkers(inner: Arc<dyn StateLogger>) -> Self {
        Self::new(inner, default_checkers())
    }

    pub fn violations(&self) -> Vec<InvariantViolation> {
        self.state
            .lock()
            .map(|state| state.violations.clone())
            .unwrap_or_default()
    }

    /// Number of snapshots observed so far.
    pub fn snapshot_count(&self) -> u64 {
        self.state.lock().map(|state| state.seen).unwrap_or_default()
    }
}

impl StateLogger for InvariantObserver {
    fn save_state(&self, state: &SharedState) -> Result<(), StateLogError> {
        {
            let mut observed = self.state.lock().map_err(|_| StateLogError::Poisoned)?;
            let index = observed.seen;
            for checker in &self.checkers {
                if let InvariantResult::Violated(message) =
                    checker.check(observed.previous.as_ref(), state)
                {
                    let violation = InvariantViolation {
                        invariant_type: checker.invariant_type(),
                        snapshot: index,
                        message,
                    };
                    warn!(%violation, "invariant violated");
                    observed.violations.push(violation);
                }
            }
            observed.previous = Some(state.clone());
            observed.seen += 1;
        }
        self.inner.save_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smokers_core::InMemoryStateLogger;

    fn observer() -> (InvariantObserver, Arc<InMemoryStateLogger>) {
        let inner = Arc::new(InMemoryStateLogger::new());
        (InvariantObserver::with_default_checkers(inner.clone()), inner)
    }

    #[test]
    fn test_valid_cycle_has_no_violations() {
        let (observer, inner) = observer();
        let mut state = SharedState::new();
        observer.save_state(&state).unwrap();

        state.ingredient_count = [0, 1, 1];
        observer.save_state(&state).unwrap();
        state.ingredient_count = [0, 0, 0];
        observer.save_state(&state).unwrap();
        state.smoker_status[0] = SmokerStatus::Rolling;
        observer.save_state(&state).unwrap();
        state.smoker_status[0] = SmokerStatus::Smoking;
        observer.save_state(&state).unwrap();
        state.cigarette_count[0] = 1;
        observer.save_state(&state).unwrap();

        assert!(observer.violations().is_empty(), "{:?}", observer.violations());
        assert_eq!(observer.snapshot_count(), 6);
        assert_eq!(inner.len(), 6);
    }

    #[test]
    fn test_negative_count_is_flagged() {
        let result = NonNegativeIngredients.check(None, &SharedState {
            ingredient_count: [0, -1, 0],
            ..SharedState::new()
        });
        assert!(matches!(result, InvariantResult::Violated(_)));
    }

    #[test]
    fn test_single_ingredient_consumption_is_flagged() {
        let previous = SharedState {
            ingredient_count: [1, 1, 1],
            ..SharedState::new()
        };
        let current = SharedState {
            ingredient_count: [1, 0, 1],
            ..SharedState::new()
        };
        assert!(matches!(
            PairedConsumption.check(Some(&previous), &current),
            InvariantResult::Violated(_)
        ));
    }

    #[test]
    fn test_cigarette_without_smoking_is_flagged() {
        let previous = SharedState::new();
        let current = SharedState {
            cigarette_count: [0, 1, 0],
            ..SharedState::new()
        };
        assert!(matches!(
            MonotonicCigarettes.check(Some(&previous), &current),
            InvariantResult::Violated(_)
        ));
    }

    #[test]
    fn test_leaving_closing_is_flagged_by_observer() {
        let (observer, _inner) = observer();
        let mut state = SharedState::new();
        state.closing = true;
        state.smoker_status[2] = SmokerStatus::Closing;
        observer.save_state(&state).unwrap();

        state.smoker_status[2] = SmokerStatus::Rolling;
        observer.save_state(&state).unwrap();

        let violations = observer.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant_type, InvariantType::ClosingIsTerminal);
        assert_eq!(violations[0].snapshot, 1);
    }
}
