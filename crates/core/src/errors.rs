use thiserror::Error;

use crate::workflow::machine::TransitionError;

/// Failures produced by the pure domain layer. Persistence and
/// integration failures live with the components that own them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use crate::domain::ticket::TicketStatus;
    use crate::workflow::actions::ActionType;
    use crate::workflow::machine::TransitionError;

    use super::DomainError;

    #[test]
    fn transition_errors_convert_transparently() {
        let domain: DomainError = TransitionError::InvalidTransition {
            from: TicketStatus::Open,
            action: ActionType::Finish,
        }
        .into();

        assert_eq!(domain.to_string(), "action `finish` is not valid from status `open`");
    }
}
