//! Render projection for the presentation layer.
//!
//! The controller publishes a fresh [`ControllerView`] on every state
//! change. Nothing here mutates state; a host renders it however it likes.

use serde::Serialize;

use crate::fee::FeeQuote;
use crate::lifecycle::{LifecycleState, Step};
use crate::readiness::ReadinessVerdict;

/// Coarse session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// No session is open.
    #[default]
    Closed,
    /// Account, network or terms are missing.
    MissingInputs,
    /// A readiness refresh is in flight.
    Loading,
    /// A verdict is available.
    Ready,
    /// The subscription was created.
    Subscribed,
}

/// How an error banner may be cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BannerKind {
    /// Persists until inputs change.
    Blocking,
    /// The payer may dismiss it.
    Dismissible,
}

/// An error shown above the steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Banner {
    /// Short heading.
    pub title: String,
    /// Readable explanation.
    pub description: String,
    /// How the banner may be cleared.
    pub kind: BannerKind,
}

impl Banner {
    /// A dismissible banner.
    #[must_use]
    pub fn dismissible(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: BannerKind::Dismissible,
        }
    }

    /// A blocking banner.
    #[must_use]
    pub fn blocking(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: BannerKind::Blocking,
        }
    }

    /// Banner for an unsupported network and/or token, `None` if both are
    /// supported.
    #[must_use]
    pub fn unsupported(network: bool, token: bool) -> Option<Self> {
        match (network, token) {
            (true, false) => Some(Self::blocking(
                "Unsupported network",
                "The selected network is not supported. Please switch to a supported network.",
            )),
            (false, true) => Some(Self::blocking(
                "Unsupported token",
                "The selected token is not supported on this network. Please select a different token.",
            )),
            (true, true) => Some(Self::blocking(
                "Unsupported network and token",
                "The selected network and token are not supported.",
            )),
            (false, false) => None,
        }
    }
}

/// One step button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    /// Which step.
    pub step: Step,
    /// Button text, `"Processing..."` while busy.
    pub label: &'static str,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Whether pressing the button would start a run.
    pub enabled: bool,
    /// Confirmed or no longer needed.
    pub completed: bool,
}

/// Everything the presentation layer needs to render a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerView {
    /// Session phase.
    pub phase: Phase,
    /// Latest applied verdict.
    pub verdict: Option<ReadinessVerdict>,
    /// Fee quote for the active step.
    pub fee: Option<FeeQuote>,
    /// A fee quote is being computed.
    pub fee_loading: bool,
    /// The single step the payer can take next.
    pub active_step: Option<Step>,
    /// Per-step buttons, in display order.
    pub steps: Vec<StepView>,
    /// Current error, if any.
    pub banner: Option<Banner>,
    /// The wallet cannot fund the required deposit.
    pub insufficient_balance: bool,
}
