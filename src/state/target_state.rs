/// Per-target fetch state machine
///
/// The fetch controller walks every target through these states and rejects
/// any move the machine does not allow.
use crate::LadleError;
use std::fmt;

/// Represents where a target is in its fetch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    // ===== Active States =====
    /// Dequeued but no load attempted yet
    Pending,

    /// A watchdog-bounded load is in flight
    Attempting,

    /// The last attempt failed and another one is allowed
    Retrying,

    /// An anti-bot interstitial is being resolved
    ChallengeHandling,

    // ===== Terminal States =====
    /// The page loaded without an interstitial
    Success,

    /// The attempt budget is exhausted
    GivenUp,
}

impl TargetState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::GivenUp)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: TargetState) -> bool {
        use TargetState::*;
        matches!(
            (self, next),
            (Pending, Attempting)
                | (Attempting, Success)
                | (Attempting, Retrying)
                | (Attempting, ChallengeHandling)
                | (ChallengeHandling, Success)
                | (ChallengeHandling, Retrying)
                | (Retrying, Attempting)
                | (Retrying, GivenUp)
        )
    }

    /// Moves to `next`, or reports the illegal transition
    pub fn transition(&mut self, next: TargetState) -> Result<(), LadleError> {
        if !self.can_transition_to(next) {
            return Err(LadleError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attempting => "attempting",
            Self::Retrying => "retrying",
            Self::ChallengeHandling => "challenge_handling",
            Self::Success => "success",
            Self::GivenUp => "given_up",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
