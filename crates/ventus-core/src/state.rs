//! Run state machine for a single attestation

use std::fmt;

use crate::error::ErrorKind;

/// Stage of one attestation run
///
/// Runs move strictly forward through the stages. `Proved` and `Failed`
/// are terminal and nothing leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    AwaitingBiometric,
    Signing,
    Signed,
    Decoding,
    InputsBuilt,
    Proving,
    /// Only entered when verification after proving is enabled
    Verifying,
    Proved,
    Failed(ErrorKind),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Proved | RunState::Failed(_))
    }

    fn ordinal(&self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::AwaitingBiometric => 1,
            RunState::Signing => 2,
            RunState::Signed => 3,
            RunState::Decoding => 4,
            RunState::InputsBuilt => 5,
            RunState::Proving => 6,
            RunState::Verifying => 7,
            RunState::Proved => 8,
            RunState::Failed(_) => u8::MAX,
        }
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(&self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunState::Failed(_) => true,
            RunState::Idle => false,
            // Verification is optional, so Proving may skip straight to Proved
            RunState::Proved => matches!(self, RunState::Proving | RunState::Verifying),
            _ => next.ordinal() == self.ordinal() + 1,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::AwaitingBiometric => write!(f, "awaiting_biometric"),
            RunState::Signing => write!(f, "signing"),
            RunState::Signed => write!(f, "signed"),
            RunState::Decoding => write!(f, "decoding"),
            RunState::InputsBuilt => write!(f, "inputs_built"),
            RunState::Proving => write!(f, "proving"),
            RunState::Verifying => write!(f, "verifying"),
            RunState::Proved => write!(f, "proved"),
            RunState::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_order() {
        let path = [
            RunState::Idle,
            RunState::AwaitingBiometric,
            RunState::Signing,
            RunState::Signed,
            RunState::Decoding,
            RunState::InputsBuilt,
            RunState::Proving,
            RunState::Proved,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(RunState::Proving.can_advance_to(RunState::Verifying));
        assert!(RunState::Verifying.can_advance_to(RunState::Proved));
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!RunState::Idle.can_advance_to(RunState::Signing));
        assert!(!RunState::Signed.can_advance_to(RunState::Signing));
        assert!(!RunState::Decoding.can_advance_to(RunState::Idle));
        assert!(!RunState::InputsBuilt.can_advance_to(RunState::Proved));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        let fail = RunState::Failed(ErrorKind::AuthDenied);
        for state in [
            RunState::Idle,
            RunState::AwaitingBiometric,
            RunState::Signing,
            RunState::Proving,
            RunState::Verifying,
        ] {
            assert!(state.can_advance_to(fail));
        }
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        let failed = RunState::Failed(ErrorKind::ProvingError);
        assert!(failed.is_terminal());
        assert!(RunState::Proved.is_terminal());
        assert!(!RunState::Proved.can_advance_to(failed));
        assert!(!failed.can_advance_to(RunState::Proved));
    }

    #[test]
    fn test_display() {
        assert_eq!(RunState::AwaitingBiometric.to_string(), "awaiting_biometric");
        assert_eq!(
            RunState::Failed(ErrorKind::MalformedSignature).to_string(),
            "failed(malformed_signature)"
        );
    }
}
