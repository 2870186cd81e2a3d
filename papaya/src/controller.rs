//! Stateful orchestration of a checkout session.
//!
//! [`OrchestrationController`] owns the current verdict and fee quote,
//! chooses the single step the payer can take next, and runs that step's
//! transaction. All methods take `&self`: session state sits behind a short
//! lock that is never held across an `.await`, so a refresh and a step run
//! may interleave freely.
//!
//! Asynchronous results carry the request id and session epoch they were
//! started under. A readiness refresh is applied only if it is still the
//! latest request; a step completion is applied only if the session has not
//! been closed or had its inputs changed in the meantime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chain::{ChainClient, ChainError, ChainId, Confirmation, ContractCall};
use crate::error::ErrorKind;
use crate::fee::{
    Clock, DEFAULT_FIAT_RATE_TTL, FeeEstimator, FeeQuote, FeeRequest, FiatPriceSource, SystemClock,
};
use crate::lifecycle::{LifecycleEvent, Step, StepExecutors};
use crate::networks::NetworkRegistry;
use crate::readiness::{
    DEFAULT_SAFETY_BUFFER_SECS, OnChainSnapshot, ReadinessError, ReadinessEvaluator,
    ReadinessVerdict,
};
use crate::terms::SubscriptionTerms;
use crate::view::{Banner, BannerKind, ControllerView, Phase};

const fn default_batch() -> bool {
    true
}

const fn default_buffer() -> u64 {
    DEFAULT_SAFETY_BUFFER_SECS
}

const fn default_ttl() -> u64 {
    DEFAULT_FIAT_RATE_TTL.as_secs()
}

/// Tunables for a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Combine deposit and subscribe into one batched call when both are
    /// needed.
    #[serde(default = "default_batch")]
    pub batch_deposit_and_subscribe: bool,
    /// Seconds of the subscription rate required on top of the cost.
    #[serde(default = "default_buffer")]
    pub safety_buffer_secs: u64,
    /// Lifetime of a cached fiat rate.
    #[serde(default = "default_ttl")]
    pub fiat_rate_ttl_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            batch_deposit_and_subscribe: default_batch(),
            safety_buffer_secs: default_buffer(),
            fiat_rate_ttl_secs: default_ttl(),
        }
    }
}

impl OrchestrationConfig {
    /// Fiat rate TTL as a [`Duration`].
    #[must_use]
    pub const fn fiat_rate_ttl(&self) -> Duration {
        Duration::from_secs(self.fiat_rate_ttl_secs)
    }
}

/// Externally supplied inputs of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInputs {
    /// Connected wallet.
    pub account: Option<Address>,
    /// Connected chain.
    pub chain_id: Option<ChainId>,
    /// Terms offered by the payee.
    pub terms: Option<SubscriptionTerms>,
}

/// Result of a readiness refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The result became the current verdict.
    Applied,
    /// A newer request or a session change superseded the result.
    Stale,
    /// The session was closed while the refresh was in flight.
    Cancelled,
    /// Nothing to refresh: closed, subscribed, or inputs missing.
    Skipped,
    /// The input did not change.
    Unchanged,
}

/// Terminal event of a step run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    /// The transaction confirmed.
    Succeeded(Step),
    /// The run failed; `title` and `message` are shown to the payer.
    Failed {
        /// Step that failed.
        step: Step,
        /// Error heading, e.g. `"Failed to approve"`.
        title: String,
        /// Readable explanation.
        message: String,
    },
}

/// Result of a `run_*` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The step could not run now; nothing was submitted.
    Skipped,
    /// The signer rejected; the step is idle again and no error is shown.
    Cancelled,
    /// The run ended with a terminal event.
    Finished(StepEvent),
    /// The session was closed or its inputs changed mid-run; the late
    /// result was dropped.
    Detached,
}

#[derive(Debug)]
struct Session {
    open: bool,
    epoch: u64,
    latest_request: u64,
    inputs: SessionInputs,
    verdict: Option<ReadinessVerdict>,
    fee: Option<FeeQuote>,
    loading: bool,
    executors: StepExecutors,
    runs: u64,
    active_run: Option<u64>,
    banner: Option<Banner>,
    subscribed: bool,
    cancel: CancellationToken,
}

impl Session {
    fn new() -> Self {
        Self {
            open: false,
            epoch: 0,
            latest_request: 0,
            inputs: SessionInputs::default(),
            verdict: None,
            fee: None,
            loading: false,
            executors: StepExecutors::default(),
            runs: 0,
            active_run: None,
            banner: None,
            subscribed: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Starts a new generation: pending refreshes and runs become stale.
    ///
    /// A step with a transaction in flight keeps its slot until that run
    /// returns, so no second step can start meanwhile.
    fn invalidate(&mut self) {
        self.epoch += 1;
        self.latest_request += 1;
        self.verdict = None;
        self.fee = None;
        self.loading = false;
        self.executors.reset_settled();
        self.banner = None;
        self.subscribed = false;
    }

    /// Forgets every executor, including one still waiting on a receipt.
    fn detach_all(&mut self) {
        self.invalidate();
        self.executors = StepExecutors::default();
        self.active_run = None;
    }

    /// Applies `event` to `step`, logging a transition the state machine
    /// refuses.
    fn apply(&mut self, step: Step, event: &LifecycleEvent) -> bool {
        match self.executors.get_mut(step).apply(event) {
            Ok(_) => true,
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(%step, error = %_e, "unexpected lifecycle event");
                false
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.open && self.epoch == epoch
    }
}

#[derive(Debug)]
struct RefreshTicket {
    request_id: u64,
    epoch: u64,
    chain_id: ChainId,
    account: Address,
    terms: SubscriptionTerms,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Resolved {
    verdict: Result<ReadinessVerdict, ReadinessError>,
    fee: Option<FeeQuote>,
}

#[derive(Debug)]
struct StepJob {
    run_id: u64,
    epoch: u64,
    chain_id: ChainId,
    account: Address,
    call: ContractCall,
}

#[derive(Debug)]
enum StepError {
    Detached,
    Chain(ChainError),
}

impl From<ChainError> for StepError {
    fn from(e: ChainError) -> Self {
        Self::Chain(e)
    }
}

/// Coordinates one checkout session.
///
/// # Example
///
/// ```ignore
/// let controller = OrchestrationController::new(client, registry, prices, &config);
/// controller.set_account(Some(payer)).await;
/// controller.set_network(Some(137)).await;
/// controller.set_terms(Some(terms)).await;
/// controller.open().await;
///
/// while let Some(step) = controller.view().active_step {
///     controller.run_step(step).await;
/// }
/// ```
#[derive(Debug)]
pub struct OrchestrationController<C, P, K = SystemClock> {
    client: C,
    registry: Arc<NetworkRegistry>,
    evaluator: ReadinessEvaluator,
    estimator: FeeEstimator<P, K>,
    batch: bool,
    session: Mutex<Session>,
    view: watch::Sender<ControllerView>,
}

impl<C, P> OrchestrationController<C, P>
where
    C: ChainClient,
    P: FiatPriceSource,
{
    /// Creates a closed controller on the system clock.
    pub fn new(
        client: C,
        registry: Arc<NetworkRegistry>,
        prices: P,
        config: &OrchestrationConfig,
    ) -> Self {
        let estimator = FeeEstimator::new(prices, config.fiat_rate_ttl());
        Self::with_estimator(client, registry, estimator, config)
    }
}

impl<C, P, K> OrchestrationController<C, P, K>
where
    C: ChainClient,
    P: FiatPriceSource,
    K: Clock,
{
    /// Creates a closed controller with a prepared fee estimator.
    pub fn with_estimator(
        client: C,
        registry: Arc<NetworkRegistry>,
        estimator: FeeEstimator<P, K>,
        config: &OrchestrationConfig,
    ) -> Self {
        let (view, _) = watch::channel(ControllerView::default());
        Self {
            client,
            registry,
            evaluator: ReadinessEvaluator::new(config.safety_buffer_secs),
            estimator,
            batch: config.batch_deposit_and_subscribe,
            session: Mutex::new(Session::new()),
            view,
        }
    }

    /// Receives a fresh [`ControllerView`] on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerView> {
        self.view.subscribe()
    }

    /// The current render projection.
    pub fn view(&self) -> ControllerView {
        self.view.borrow().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the session and publishes the resulting view.
    fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.lock();
        let result = f(&mut session);
        self.view.send_replace(self.project(&session));
        result
    }

    /// Opens a fresh session and fetches readiness.
    pub async fn open(&self) -> RefreshOutcome {
        self.update(|s| {
            s.cancel.cancel();
            s.detach_all();
            s.open = true;
            s.cancel = CancellationToken::new();
        });
        #[cfg(feature = "telemetry")]
        tracing::debug!("checkout session opened");
        self.refresh().await
    }

    /// Tears the session down.
    ///
    /// In-flight refreshes are cancelled. Submitted transactions are not,
    /// but their completions are ignored.
    pub fn close(&self) {
        self.update(|s| {
            s.cancel.cancel();
            s.detach_all();
            s.open = false;
        });
        #[cfg(feature = "telemetry")]
        tracing::debug!("checkout session closed");
    }

    /// Sets the connected wallet. Refreshes only if the value changed.
    pub async fn set_account(&self, account: Option<Address>) -> RefreshOutcome {
        self.set_input(|inputs| {
            let changed = inputs.account != account;
            inputs.account = account;
            changed
        })
        .await
    }

    /// Sets the connected chain. Refreshes only if the value changed.
    pub async fn set_network(&self, chain_id: Option<ChainId>) -> RefreshOutcome {
        self.set_input(|inputs| {
            let changed = inputs.chain_id != chain_id;
            inputs.chain_id = chain_id;
            changed
        })
        .await
    }

    /// Sets the subscription terms. Refreshes only if the value changed.
    pub async fn set_terms(&self, terms: Option<SubscriptionTerms>) -> RefreshOutcome {
        self.set_input(move |inputs| {
            let changed = inputs.terms != terms;
            inputs.terms = terms;
            changed
        })
        .await
    }

    async fn set_input(&self, f: impl FnOnce(&mut SessionInputs) -> bool) -> RefreshOutcome {
        let changed = {
            let mut s = self.lock();
            let changed = f(&mut s.inputs);
            if changed {
                s.invalidate();
                self.view.send_replace(self.project(&s));
            }
            changed
        };
        if changed {
            self.refresh().await
        } else {
            RefreshOutcome::Unchanged
        }
    }

    /// Clears a dismissible error banner.
    pub fn dismiss_error(&self) {
        self.update(|s| {
            if s.banner.as_ref().is_some_and(|b| b.kind == BannerKind::Dismissible) {
                s.banner = None;
            }
        });
    }

    /// Re-reads balances and recomputes the verdict and fee quote.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(ticket) = self.begin_refresh() else {
            return RefreshOutcome::Skipped;
        };
        let cancel = ticket.cancel.clone();
        match cancel.run_until_cancelled(self.resolve(&ticket)).await {
            Some(resolved) => self.apply_refresh(&ticket, resolved),
            None => RefreshOutcome::Cancelled,
        }
    }

    fn begin_refresh(&self) -> Option<RefreshTicket> {
        self.update(|s| {
            if !s.open || s.subscribed {
                return None;
            }
            let (Some(account), Some(chain_id), Some(terms)) =
                (s.inputs.account, s.inputs.chain_id, s.inputs.terms.clone())
            else {
                return None;
            };
            s.latest_request += 1;
            s.loading = true;
            s.fee = None;
            Some(RefreshTicket {
                request_id: s.latest_request,
                epoch: s.epoch,
                chain_id,
                account,
                terms,
                cancel: s.cancel.clone(),
            })
        })
    }

    async fn resolve(&self, ticket: &RefreshTicket) -> Resolved {
        let snapshot = match self.registry.resolve_token(ticket.chain_id, &ticket.terms.token) {
            Ok((_, token)) => {
                OnChainSnapshot::fetch(&self.client, ticket.chain_id, token, ticket.account).await
            }
            Err(_) => OnChainSnapshot::default(),
        };
        let verdict = self.evaluator.evaluate(
            &self.registry,
            ticket.chain_id,
            ticket.account,
            &ticket.terms,
            &snapshot,
        );
        let fee = match &verdict {
            Ok(verdict) => self.quote(ticket, verdict).await,
            Err(_) => None,
        };
        Resolved { verdict, fee }
    }

    async fn quote(&self, ticket: &RefreshTicket, verdict: &ReadinessVerdict) -> Option<FeeQuote> {
        let step = verdict.next_step(self.batch)?;
        let (_, token) = self
            .registry
            .resolve_token(ticket.chain_id, &ticket.terms.token)
            .ok()?;
        let request = FeeRequest {
            chain_id: ticket.chain_id,
            account: ticket.account,
            call: step.call(token, &ticket.terms, verdict),
            request_id: ticket.request_id,
        };
        Some(
            self.estimator
                .estimate(&self.client, &self.registry, &request)
                .await,
        )
    }

    fn apply_refresh(&self, ticket: &RefreshTicket, resolved: Resolved) -> RefreshOutcome {
        self.update(|s| {
            if !s.is_current(ticket.epoch) || s.latest_request != ticket.request_id || s.subscribed
            {
                #[cfg(feature = "telemetry")]
                tracing::debug!(request_id = ticket.request_id, "discarding stale readiness result");
                return RefreshOutcome::Stale;
            }
            s.loading = false;
            s.executors.reset_settled();
            match resolved.verdict {
                Ok(verdict) => {
                    match Banner::unsupported(
                        verdict.is_unsupported_network,
                        verdict.is_unsupported_token,
                    ) {
                        Some(banner) => s.banner = Some(banner),
                        None => {
                            if s.banner.as_ref().is_some_and(|b| b.kind == BannerKind::Blocking) {
                                s.banner = None;
                            }
                        }
                    }
                    s.verdict = Some(verdict);
                    s.fee = resolved.fee;
                }
                Err(e) => {
                    s.verdict = None;
                    s.fee = None;
                    s.banner = Some(Banner::blocking(
                        "Invalid subscription",
                        e.to_string(),
                    ));
                }
            }
            #[cfg(feature = "telemetry")]
            tracing::info!(
                request_id = ticket.request_id,
                chain_id = ticket.chain_id,
                account = %ticket.account,
                verdict = ?s.verdict,
                "readiness updated"
            );
            RefreshOutcome::Applied
        })
    }

    /// Runs the approval step if it is the enabled step.
    pub async fn run_approve(&self) -> RunOutcome {
        self.run_step(Step::Approve).await
    }

    /// Runs the deposit step if it is the enabled step.
    pub async fn run_deposit(&self) -> RunOutcome {
        self.run_step(Step::Deposit).await
    }

    /// Runs the subscribe step if it is the enabled step.
    pub async fn run_subscribe(&self) -> RunOutcome {
        self.run_step(Step::Subscribe).await
    }

    /// Runs the batched deposit and subscribe step if it is the enabled step.
    pub async fn run_deposit_and_subscribe(&self) -> RunOutcome {
        self.run_step(Step::DepositAndSubscribe).await
    }

    /// Runs `step` through simulate, submit and confirmation.
    ///
    /// Returns [`RunOutcome::Skipped`] without side effects when the step is
    /// not the enabled one or another step has a transaction in flight.
    pub async fn run_step(&self, step: Step) -> RunOutcome {
        let Some(job) = self.claim(step) else {
            #[cfg(feature = "telemetry")]
            tracing::debug!(%step, "step cannot run now");
            return RunOutcome::Skipped;
        };
        #[cfg(feature = "telemetry")]
        tracing::info!(%step, chain_id = job.chain_id, function = job.call.function_name(), "running step");

        let outcome = match self.execute(step, &job).await {
            Ok(()) => self.finish_confirmed(step, &job).await,
            Err(StepError::Detached) => RunOutcome::Detached,
            Err(StepError::Chain(e)) => match e.kind() {
                ErrorKind::UserRejection => self.finish_rejected(step, &job),
                ErrorKind::Configuration
                | ErrorKind::TransientChain
                | ErrorKind::RevertedExecution => self.finish_failed(step, &job, &e),
            },
        };
        if outcome == RunOutcome::Detached {
            self.release(step, &job);
        }
        outcome
    }

    /// Frees the slot a detached run still holds, unless the session was
    /// closed since the run was claimed.
    fn release(&self, step: Step, job: &StepJob) {
        self.update(|s| {
            if s.active_run == Some(job.run_id) {
                s.active_run = None;
                s.apply(step, &LifecycleEvent::Reset);
                #[cfg(feature = "telemetry")]
                tracing::debug!(%step, "detached run released its slot");
            }
        });
    }

    fn claim(&self, step: Step) -> Option<StepJob> {
        self.update(|s| {
            if !s.open || s.subscribed {
                return None;
            }
            let verdict = s.verdict.as_ref()?;
            let enabled = verdict.next_step(self.batch) == Some(step);
            let slot_busy = s.executors.in_flight().is_some();
            if !s.executors.get(step).can_run(enabled, slot_busy) {
                return None;
            }
            let (account, chain_id) = (s.inputs.account?, s.inputs.chain_id?);
            let terms = s.inputs.terms.as_ref()?;
            let (_, token) = self.registry.resolve_token(chain_id, &terms.token).ok()?;
            let call = step.call(token, terms, verdict);
            s.executors
                .get_mut(step)
                .apply(&LifecycleEvent::Start {
                    simulate: step.simulates(),
                })
                .ok()?;
            s.runs += 1;
            s.active_run = Some(s.runs);
            Some(StepJob {
                run_id: s.runs,
                epoch: s.epoch,
                chain_id,
                account,
                call,
            })
        })
    }

    async fn execute(&self, step: Step, job: &StepJob) -> Result<(), StepError> {
        if step.simulates() {
            self.client
                .simulate(job.chain_id, job.account, job.call)
                .await?;
            self.transition(step, job, &LifecycleEvent::Simulated)?;
        }
        let handle = self
            .client
            .submit(job.chain_id, job.account, job.call)
            .await?;
        #[cfg(feature = "telemetry")]
        tracing::info!(%step, tx = %handle.hash, "transaction submitted");
        self.transition(step, job, &LifecycleEvent::Submitted)?;

        match self.client.await_confirmation(handle).await? {
            Confirmation::Success => self.transition(step, job, &LifecycleEvent::Included),
            Confirmation::Reverted => Err(StepError::Chain(ChainError::Reverted(
                "transaction reverted on-chain".to_owned(),
            ))),
        }
    }

    fn transition(&self, step: Step, job: &StepJob, event: &LifecycleEvent) -> Result<(), StepError> {
        self.update(|s| {
            if !s.is_current(job.epoch) {
                return Err(StepError::Detached);
            }
            if s.apply(step, event) {
                Ok(())
            } else {
                Err(StepError::Detached)
            }
        })
    }

    async fn finish_confirmed(&self, step: Step, job: &StepJob) -> RunOutcome {
        let applied = self.update(|s| {
            if !s.is_current(job.epoch) {
                return false;
            }
            s.active_run = None;
            s.banner = None;
            if step.completes_subscription() {
                s.subscribed = true;
                s.fee = None;
            }
            true
        });
        if !applied {
            return RunOutcome::Detached;
        }
        #[cfg(feature = "telemetry")]
        tracing::info!(%step, "step confirmed");
        if !step.completes_subscription() {
            self.refresh().await;
        }
        RunOutcome::Finished(StepEvent::Succeeded(step))
    }

    fn finish_rejected(&self, step: Step, job: &StepJob) -> RunOutcome {
        let applied = self.update(|s| {
            if !s.is_current(job.epoch) {
                return false;
            }
            s.active_run = None;
            if s.apply(step, &LifecycleEvent::Rejected) {
                self.view.send_replace(self.project(s));
            }
            s.apply(step, &LifecycleEvent::Reset);
            true
        });
        if !applied {
            return RunOutcome::Detached;
        }
        #[cfg(feature = "telemetry")]
        tracing::debug!(%step, "signature request rejected by user");
        RunOutcome::Cancelled
    }

    fn finish_failed(&self, step: Step, job: &StepJob, error: &ChainError) -> RunOutcome {
        let title = step.failure_title().to_owned();
        let message = error.user_message().to_owned();
        let applied = self.update(|s| {
            if !s.is_current(job.epoch) {
                return false;
            }
            s.active_run = None;
            if s.apply(step, &LifecycleEvent::Failed(message.clone())) {
                self.view.send_replace(self.project(s));
            }
            s.apply(step, &LifecycleEvent::Reset);
            s.banner = Some(Banner::dismissible(title.clone(), message.clone()));
            true
        });
        if !applied {
            return RunOutcome::Detached;
        }
        #[cfg(feature = "telemetry")]
        tracing::warn!(%step, %error, "step failed");
        RunOutcome::Finished(StepEvent::Failed {
            step,
            title,
            message,
        })
    }

    fn project(&self, s: &Session) -> ControllerView {
        if !s.open {
            return ControllerView::default();
        }
        let missing =
            s.inputs.account.is_none() || s.inputs.chain_id.is_none() || s.inputs.terms.is_none();
        let phase = if s.subscribed {
            Phase::Subscribed
        } else if missing {
            Phase::MissingInputs
        } else if s.loading {
            Phase::Loading
        } else {
            Phase::Ready
        };

        let verdict = s.verdict.as_ref();
        let active_step = if s.subscribed || s.loading {
            None
        } else {
            verdict.and_then(|v| v.next_step(self.batch))
        };
        let slot_busy = s.executors.in_flight().is_some();
        let supported = verdict.is_some_and(|v| !v.is_unsupported());
        let steps = s
            .executors
            .iter()
            .filter(|e| match e.step() {
                Step::Deposit => !self.batch,
                Step::DepositAndSubscribe => self.batch,
                Step::Approve | Step::Subscribe => true,
            })
            .map(|e| {
                let completed = match e.step() {
                    Step::Approve => supported && verdict.is_some_and(|v| !v.needs_approval),
                    Step::Deposit => supported && verdict.is_some_and(|v| !v.needs_deposit),
                    Step::Subscribe | Step::DepositAndSubscribe => s.subscribed,
                };
                e.render(active_step == Some(e.step()), slot_busy, completed)
            })
            .collect();

        ControllerView {
            phase,
            verdict: s.verdict.clone(),
            fee: s.fee.clone(),
            fee_loading: s.loading,
            active_step,
            steps,
            banner: s.banner.clone(),
            insufficient_balance: !s.subscribed
                && verdict.is_some_and(ReadinessVerdict::insufficient_balance),
        }
    }
}
