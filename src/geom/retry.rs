//! Retry policy for triangulation attempts as an explicit state machine.
//!
//! The pipeline runs one attempt per non-terminal state and feeds the outcome
//! back through [`RetryState::next`]. Transitions are pure, so the policy and
//! its termination can be checked without running any geometry.

use serde::Serialize;

/// Whether the attempt made in the current state produced a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// The knobs the transition function depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of progressive ratios available.
    pub ratio_count: usize,
    /// Whether the bounding-box corner fallback runs after the last ratio.
    pub corner_fallback: bool,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(ratio_count: usize, corner_fallback: bool) -> Self {
        Self {
            ratio_count,
            corner_fallback,
        }
    }

    /// Upper bound on attempts: the initial one, one per ratio, the fallback.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.ratio_count + 1 + if self.corner_fallback { 1 } else { 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state")]
pub enum RetryState {
    /// First attempt on the full validated set.
    Initial,
    /// Progressive attempt `attempt` (1-based) at `ratios[attempt - 1]`.
    Downsampled { attempt: usize },
    /// Corner-augmented attempt on the last attempted set.
    FallbackAttempted,
    Succeeded,
    Exhausted,
}

impl RetryState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }

    /// Index into the ratio list for a progressive state.
    #[must_use]
    pub fn ratio_index(self) -> Option<usize> {
        match self {
            Self::Downsampled { attempt } => attempt.checked_sub(1),
            _ => None,
        }
    }

    fn after_ratios(policy: &RetryPolicy) -> Self {
        if policy.corner_fallback {
            Self::FallbackAttempted
        } else {
            Self::Exhausted
        }
    }

    /// The state following an attempt made in `self`.
    #[must_use]
    pub fn next(self, outcome: AttemptOutcome, policy: &RetryPolicy) -> Self {
        if self.is_terminal() {
            return self;
        }
        if outcome == AttemptOutcome::Success {
            return Self::Succeeded;
        }

        match self {
            Self::Initial if policy.ratio_count > 0 => Self::Downsampled { attempt: 1 },
            Self::Initial => Self::after_ratios(policy),
            Self::Downsampled { attempt } if attempt < policy.ratio_count => Self::Downsampled {
                attempt: attempt + 1,
            },
            Self::Downsampled { .. } => Self::after_ratios(policy),
            Self::FallbackAttempted | Self::Succeeded | Self::Exhausted => Self::Exhausted,
        }
    }
}
