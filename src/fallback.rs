//! Fallback chain over a strategy plan.
//!
//! Each strategy attempt yields a tagged [`AttemptOutcome`]. The chain state
//! advances through [`ChainState::advance`], a pure transition function, so
//! the sequencing rules are independent of how attempts are executed:
//!
//! `Pending -> Trying(0) -> { Succeeded(i) | Trying(i + 1) | Exhausted | Aborted(i) }`

use std::future::Future;

use tracing::{debug, info, warn};

use crate::error::{ExtractError, FailureClass, StrategyAttempt};
use crate::strategy::{Strategy, StrategyPlan};

/// Tagged result of one strategy attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    /// The strategy cannot succeed; the next one may.
    Fatal(ExtractError),
    /// No strategy can succeed.
    Terminal(ExtractError),
}

impl<T> AttemptOutcome<T> {
    /// Tag a raw result. Transient errors that reach this point have already
    /// exhausted their retries, so they count as fatal to the strategy.
    pub fn from_result(result: Result<T, ExtractError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => match e.class() {
                FailureClass::Terminal => Self::Terminal(e),
                FailureClass::StrategyFatal | FailureClass::Transient => Self::Fatal(e),
            },
        }
    }

    fn tag(&self) -> OutcomeTag {
        match self {
            Self::Success(_) => OutcomeTag::Success,
            Self::Fatal(_) => OutcomeTag::Fatal,
            Self::Terminal(_) => OutcomeTag::Terminal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeTag {
    Success,
    Fatal,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Trying(usize),
    Succeeded(usize),
    Exhausted,
    Aborted(usize),
}

impl ChainState {
    /// Start the chain for a plan of `plan_len` strategies.
    pub fn start(plan_len: usize) -> Self {
        if plan_len == 0 {
            ChainState::Exhausted
        } else {
            ChainState::Trying(0)
        }
    }

    /// Transition after the current attempt settles with `outcome`.
    pub fn advance(self, outcome: OutcomeTag, plan_len: usize) -> Self {
        match self {
            ChainState::Pending => Self::start(plan_len),
            ChainState::Trying(i) => match outcome {
                OutcomeTag::Success => ChainState::Succeeded(i),
                OutcomeTag::Terminal => ChainState::Aborted(i),
                OutcomeTag::Fatal if i + 1 < plan_len => ChainState::Trying(i + 1),
                OutcomeTag::Fatal => ChainState::Exhausted,
            },
            done => done,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self,
            ChainState::Succeeded(_) | ChainState::Exhausted | ChainState::Aborted(_)
        )
    }
}

/// Result of a successful chain run.
#[derive(Debug)]
pub struct ChainSuccess<T> {
    pub value: T,
    /// The strategy that produced `value`.
    pub strategy: Strategy,
    /// Strategies that failed before it, in order.
    pub failed: Vec<StrategyAttempt>,
}

/// Try each strategy in `plan` in order until one succeeds.
///
/// A terminal error stops the chain immediately and is returned unchanged.
/// Exhausting the plan returns `AllStrategiesFailed` with the last cause.
pub async fn run_chain<T, F, Fut>(
    plan: &StrategyPlan,
    mut attempt: F,
) -> Result<ChainSuccess<T>, ExtractError>
where
    F: FnMut(Strategy) -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let strategies = plan.strategies();
    let mut state = ChainState::start(strategies.len());
    let mut failed: Vec<StrategyAttempt> = Vec::new();
    let mut last_error: Option<ExtractError> = None;

    while let ChainState::Trying(i) = state {
        let strategy = strategies[i];
        debug!(strategy = %strategy, position = i + 1, of = strategies.len(), "Trying strategy");

        let outcome = AttemptOutcome::from_result(attempt(strategy).await);
        state = state.advance(outcome.tag(), strategies.len());

        match outcome {
            AttemptOutcome::Success(value) => {
                info!(strategy = %strategy, fallbacks = failed.len(), "Strategy succeeded");
                return Ok(ChainSuccess {
                    value,
                    strategy,
                    failed,
                });
            }
            AttemptOutcome::Terminal(e) => {
                warn!(strategy = %strategy, "Terminal failure, abandoning chain: {}", e);
                return Err(e);
            }
            AttemptOutcome::Fatal(e) => {
                warn!(strategy = %strategy, "Strategy failed: {}", e);
                failed.push(StrategyAttempt {
                    strategy,
                    error: e.to_string(),
                });
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last) => Err(ExtractError::AllStrategiesFailed {
            attempts: failed,
            last: Box::new(last),
        }),
        None => Err(ExtractError::Config(
            "no extraction strategies available".to_string(),
        )),
    }
}
