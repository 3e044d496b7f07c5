// Converter lifecycle state management

use crate::error::{ResampleError, Result};

/// Converter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConverterState {
    /// Accepting input and producing output
    #[default]
    Active,
    /// End of input was signalled, flushing the remaining output
    Draining,
    /// Every valid output sample has been written
    Ended,
}

/// Tracks the converter state and rejects invalid transitions
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: ConverterState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConverterState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ConverterState::Active
    }

    /// Move to `to`, failing when the transition is not allowed
    pub fn transition(&mut self, to: ConverterState) -> Result<()> {
        validate_state_transition(self.state, to)?;
        log::trace!("Converter state changed: {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Return to `Active` from any state
    pub fn reset(&mut self) {
        if self.state != ConverterState::Active {
            log::debug!("Converter state reset from {:?}", self.state);
        }
        self.state = ConverterState::Active;
    }
}

pub fn validate_state_transition(from: ConverterState, to: ConverterState) -> Result<()> {
    match (from, to) {
        // From Active
        (ConverterState::Active, ConverterState::Draining) => Ok(()),

        // From Draining
        (ConverterState::Draining, ConverterState::Ended) => Ok(()),

        // Reset
        (_, ConverterState::Active) => Ok(()),

        // Invalid transitions
        _ => Err(ResampleError::internal(format!(
            "Invalid state transition from {:?} to {:?}",
            from, to
        ))),
    }
}
