//! Per-step transaction lifecycles.
//!
//! Each checkout step (approve, deposit, subscribe and the batched
//! deposit-and-subscribe) owns a [`StepExecutor`] whose state only moves
//! through [`LifecycleState::apply`]. Transitions are pure; side effects
//! live in the controller that feeds events in.
//!
//! ```text
//! Idle -> Simulating -> AwaitingSignature -> AwaitingConfirmation -> Confirmed
//!                |              |                     |
//!                +--------------+---------------------+--> Failed(reason)
//!                               +--> Cancelled (signer rejected)
//! ```
//!
//! `Failed` and `Cancelled` accept a new `Start` for a user-initiated retry.
//! `Reset` returns any state to `Idle`.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::chain::ContractCall;
use crate::networks::TokenConfig;
use crate::readiness::ReadinessVerdict;
use crate::terms::SubscriptionTerms;
use crate::view::StepView;

/// A checkout step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// ERC-20 approval of the custody contract.
    Approve,
    /// Deposit into the custody contract.
    Deposit,
    /// Subscription creation.
    Subscribe,
    /// Deposit and subscription in one batched call.
    DepositAndSubscribe,
}

impl Step {
    /// All steps, in display order.
    pub const ALL: [Self; 4] = [
        Self::Approve,
        Self::Deposit,
        Self::Subscribe,
        Self::DepositAndSubscribe,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Approve => 0,
            Self::Deposit => 1,
            Self::Subscribe => 2,
            Self::DepositAndSubscribe => 3,
        }
    }

    /// Button label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Approve => "Approve",
            Self::Deposit => "Deposit",
            Self::Subscribe => "Subscribe",
            Self::DepositAndSubscribe => "Deposit & Subscribe",
        }
    }

    /// Error title shown when the step fails.
    #[must_use]
    pub const fn failure_title(self) -> &'static str {
        match self {
            Self::Approve => "Failed to approve",
            Self::Deposit => "Failed to deposit",
            Self::Subscribe => "Failed to subscribe",
            Self::DepositAndSubscribe => "Failed to deposit and subscribe",
        }
    }

    /// Whether the call is dry-run before asking for a signature.
    ///
    /// The batched call skips simulation: its subscribe leg depends on the
    /// deposit leg, which a simulation against current state cannot see.
    #[must_use]
    pub const fn simulates(self) -> bool {
        !matches!(self, Self::DepositAndSubscribe)
    }

    /// Whether confirming this step creates the subscription.
    #[must_use]
    pub const fn completes_subscription(self) -> bool {
        matches!(self, Self::Subscribe | Self::DepositAndSubscribe)
    }

    /// Builds the contract call for this step.
    #[must_use]
    pub fn call(
        self,
        token: &TokenConfig,
        terms: &SubscriptionTerms,
        verdict: &ReadinessVerdict,
    ) -> ContractCall {
        let custody = token.custody_address;
        let project_id = U256::from(terms.project_id);
        match self {
            Self::Approve => ContractCall::Approve {
                token: token.erc20_address,
                spender: custody,
                amount: verdict.deposit_shortfall,
            },
            Self::Deposit => ContractCall::Deposit {
                custody,
                amount: verdict.deposit_shortfall,
            },
            Self::Subscribe => ContractCall::Subscribe {
                custody,
                author: terms.payee,
                rate: verdict.subscription_rate,
                project_id,
            },
            Self::DepositAndSubscribe => ContractCall::DepositAndSubscribe {
                custody,
                amount: verdict.deposit_shortfall,
                author: terms.payee,
                rate: verdict.subscription_rate,
                project_id,
            },
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a step's transaction currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum LifecycleState {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Dry-running the call.
    Simulating,
    /// Waiting for the signer.
    AwaitingSignature,
    /// Broadcast, waiting for inclusion.
    AwaitingConfirmation,
    /// Included successfully.
    Confirmed,
    /// Failed with a user-facing reason.
    Failed(String),
    /// The signer rejected the request.
    Cancelled,
}

/// Inputs that drive [`LifecycleState`] transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A run begins; `simulate` selects whether a dry run comes first.
    Start {
        /// Dry-run before signing.
        simulate: bool,
    },
    /// The dry run succeeded.
    Simulated,
    /// The transaction was signed and broadcast.
    Submitted,
    /// The transaction was included successfully.
    Included,
    /// The signer declined.
    Rejected,
    /// Anything else went wrong.
    Failed(String),
    /// Return to idle.
    Reset,
}

/// Returned when an event does not apply to the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid lifecycle transition: {event:?} in state {state:?}")]
pub struct InvalidTransition {
    /// State at the time of the event.
    pub state: LifecycleState,
    /// Rejected event.
    pub event: LifecycleEvent,
}

impl LifecycleState {
    /// Computes the next state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if `event` is not valid in this state.
    pub fn apply(&self, event: &LifecycleEvent) -> Result<Self, InvalidTransition> {
        use LifecycleEvent as E;
        let next = match (self, event) {
            (_, E::Reset) => Some(Self::Idle),
            (Self::Idle | Self::Failed(_) | Self::Cancelled, E::Start { simulate }) => {
                Some(if *simulate {
                    Self::Simulating
                } else {
                    Self::AwaitingSignature
                })
            }
            (Self::Simulating, E::Simulated) => Some(Self::AwaitingSignature),
            (Self::AwaitingSignature, E::Submitted) => Some(Self::AwaitingConfirmation),
            (Self::AwaitingSignature, E::Rejected) => Some(Self::Cancelled),
            (Self::AwaitingConfirmation, E::Included) => Some(Self::Confirmed),
            (
                Self::Simulating | Self::AwaitingSignature | Self::AwaitingConfirmation,
                E::Failed(reason),
            ) => Some(Self::Failed(reason.clone())),
            _ => None,
        };
        next.ok_or_else(|| InvalidTransition {
            state: self.clone(),
            event: event.clone(),
        })
    }

    /// Whether a transaction is being prepared, signed or confirmed.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Simulating | Self::AwaitingSignature | Self::AwaitingConfirmation
        )
    }

    /// Whether a new run may start from this state.
    #[must_use]
    pub const fn accepts_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed(_) | Self::Cancelled)
    }
}

/// Lifecycle of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepExecutor {
    step: Step,
    state: LifecycleState,
}

impl StepExecutor {
    /// Creates an idle executor.
    #[must_use]
    pub const fn new(step: Step) -> Self {
        Self {
            step,
            state: LifecycleState::Idle,
        }
    }

    /// The step this executor runs.
    #[must_use]
    pub const fn step(&self) -> Step {
        self.step
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Whether a run may start now.
    ///
    /// `enabled` is the verdict's choice of this step; `slot_busy` is true
    /// while any executor has a transaction in flight.
    #[must_use]
    pub const fn can_run(&self, enabled: bool, slot_busy: bool) -> bool {
        enabled && !slot_busy && self.state.accepts_start()
    }

    /// Applies an event.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the state unchanged if the
    /// event does not apply.
    pub fn apply(&mut self, event: &LifecycleEvent) -> Result<&LifecycleState, InvalidTransition> {
        self.state = self.state.apply(event)?;
        Ok(&self.state)
    }

    /// Projects the executor for rendering.
    ///
    /// `completed` marks a step that is no longer needed, shown with a tick.
    #[must_use]
    pub fn render(&self, enabled: bool, slot_busy: bool, completed: bool) -> StepView {
        StepView {
            step: self.step,
            label: if self.state.is_busy() {
                "Processing..."
            } else {
                self.step.label()
            },
            state: self.state.clone(),
            enabled: self.can_run(enabled, slot_busy),
            completed: completed || self.state == LifecycleState::Confirmed,
        }
    }
}

/// The four step executors of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepExecutors([StepExecutor; 4]);

impl Default for StepExecutors {
    fn default() -> Self {
        Self(Step::ALL.map(StepExecutor::new))
    }
}

impl StepExecutors {
    /// Executor for `step`.
    #[must_use]
    pub const fn get(&self, step: Step) -> &StepExecutor {
        &self.0[step.index()]
    }

    /// Mutable executor for `step`.
    pub const fn get_mut(&mut self, step: Step) -> &mut StepExecutor {
        &mut self.0[step.index()]
    }

    /// The step with a transaction in flight, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<Step> {
        self.0
            .iter()
            .find(|e| e.state.is_busy())
            .map(StepExecutor::step)
    }

    /// Returns every settled executor to idle. In-flight ones are untouched.
    pub fn reset_settled(&mut self) {
        for executor in &mut self.0 {
            if !executor.state.is_busy() {
                executor.state = LifecycleState::Idle;
            }
        }
    }

    /// Iterates in display order.
    pub fn iter(&self) -> impl Iterator<Item = &StepExecutor> {
        self.0.iter()
    }
}
