use crate::models::{AppointmentStatus, SchedulingError};

/// Validate a status transition before persisting it. Terminal states are
/// immutable; cancelling an already-cancelled appointment is handled as a
/// no-op by the caller before reaching this check.
pub fn validate_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), SchedulingError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(SchedulingError::InvalidStatusTransition { from, to })
    }
}

fn is_allowed(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use AppointmentStatus::*;

    match (from, to) {
        (Scheduled, Confirmed | InProgress | Cancelled | NoShow) => true,
        (Confirmed, InProgress | Cancelled | NoShow) => true,
        (InProgress, Completed | Cancelled) => true,
        // Completed, Cancelled and NoShow are terminal.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use AppointmentStatus::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        for (from, to) in [
            (Scheduled, Confirmed),
            (Confirmed, InProgress),
            (InProgress, Completed),
            (Scheduled, Cancelled),
            (Confirmed, NoShow),
        ] {
            assert!(validate_transition(from, to).is_ok(), "{from} -> {to}");
        }
    }

    #[test]
    fn terminal_states_are_immutable() {
        for terminal in [Completed, Cancelled, NoShow] {
            for target in [Scheduled, Confirmed, InProgress, Completed, Cancelled] {
                assert_matches!(
                    validate_transition(terminal, target),
                    Err(SchedulingError::InvalidStatusTransition { .. })
                );
            }
        }
    }

    #[test]
    fn completion_requires_a_session_in_progress() {
        assert_matches!(
            validate_transition(Scheduled, Completed),
            Err(SchedulingError::InvalidStatusTransition { .. })
        );
    }
}
