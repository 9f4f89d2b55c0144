use std::fmt;

use crate::error::CensusError;

/// The states of a census lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CensusState {
    /// Census record exists but is not yet accepting registrations.
    /// Creation activates atomically, so a stored census is never in this state.
    Created,
    /// Census accepts registrations and root publications.
    Active,
    /// Census no longer accepts anything. Final state.
    Closed,
}

impl CensusState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for CensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Active => write!(f, "Active"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Events that trigger census state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CensusEvent {
    /// The census starts accepting registrations.
    Activate,
    /// The creator closes the census.
    Close,
}

/// Census lifecycle transitions.
///
/// Valid transitions:
/// - Created → Active (Activate)
/// - Active → Closed (Close)
pub struct CensusStateMachine;

impl CensusStateMachine {
    /// Attempt a state transition based on an event.
    pub fn transition(current: CensusState, event: CensusEvent) -> Result<CensusState, CensusError> {
        let new_state = match (current, event) {
            (CensusState::Created, CensusEvent::Activate) => CensusState::Active,
            (CensusState::Active, CensusEvent::Close) => CensusState::Closed,
            _ => {
                let target = match event {
                    CensusEvent::Activate => CensusState::Active,
                    CensusEvent::Close => CensusState::Closed,
                };
                return Err(CensusError::InvalidStateTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "census state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: CensusState, event: CensusEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
