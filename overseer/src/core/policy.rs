//! Supervisor states, autonomy levels, and the action-gating policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::directive::{DirectiveResult, Severity};

/// Most turns a recalibration dialogue may take before the session is forced
/// back to monitoring.
pub const MAX_RECALIBRATION_TURNS: u32 = 5;

/// How much the supervisor may do without a human in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Autonomy {
    /// Act on every directive immediately.
    Full,
    /// Ask for approval before touching the worker.
    Supervised,
    /// Record findings, never intervene.
    Observe,
}

impl fmt::Display for Autonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Full => "full",
            Self::Supervised => "supervised",
            Self::Observe => "observe",
        };
        f.write_str(s)
    }
}

impl FromStr for Autonomy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "supervised" => Ok(Self::Supervised),
            "observe" => Ok(Self::Observe),
            other => anyhow::bail!("unknown autonomy level: {other} (expected full, supervised, or observe)"),
        }
    }
}

/// Where the supervisor is in its intervention lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Monitoring,
    Alert,
    Inject,
    Interrupt,
    Recalibrate,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Monitoring => "MONITORING",
            Self::Alert => "ALERT",
            Self::Inject => "INJECT",
            Self::Interrupt => "INTERRUPT",
            Self::Recalibrate => "RECALIBRATE",
        };
        f.write_str(s)
    }
}

/// What the supervisor should do in response to a parsed reviewer reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Stop the worker and open a recalibration dialogue.
    Interrupt(String),
    /// Send corrective guidance without stopping the worker.
    Inject(String),
    /// The reviewer asked to interrupt but no finding was severe enough.
    SuppressedInterrupt(String),
    /// Nothing to do beyond logging the findings.
    LogOnly,
}

/// Gate reviewer directives by finding severity.
///
/// An interrupt needs a CRITICAL finding in the same reply; an inject needs
/// CRITICAL or WARNING. When the interrupt gate fails but the inject gate
/// passes, the inject wins and the suppression is not reported.
pub fn plan_action(result: &DirectiveResult) -> PlannedAction {
    let has_critical = result
        .findings
        .iter()
        .any(|f| f.severity == Severity::Critical);
    let has_warning = result
        .findings
        .iter()
        .any(|f| f.severity == Severity::Warning);

    if let Some(reason) = &result.interrupt
        && has_critical
    {
        return PlannedAction::Interrupt(reason.clone());
    }
    if let Some(message) = &result.inject
        && (has_critical || has_warning)
    {
        return PlannedAction::Inject(message.clone());
    }
    if let Some(reason) = &result.interrupt {
        return PlannedAction::SuppressedInterrupt(reason.clone());
    }
    PlannedAction::LogOnly
}
