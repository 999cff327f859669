use thiserror::Error;

/// Malformed bytecode. `offset` is the index of the offending instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontendError {
    #[error("method `{0}` is not declared in this unit")]
    UnknownMethod(String),

    #[error("instruction {offset}: stack underflow")]
    StackUnderflow { offset: usize },

    #[error("instruction {offset}: branch target {target} is out of range")]
    BranchTargetOutOfRange { offset: usize, target: usize },

    #[error("instruction {offset}: argument index {index} is out of range")]
    ArgumentOutOfRange { offset: usize, index: usize },

    #[error("instruction {offset}: local index {index} is out of range")]
    LocalOutOfRange { offset: usize, index: usize },

    #[error("instruction {offset}: control falls off the end of the method")]
    FallsOffEnd { offset: usize },

    #[error("instruction {offset}: expected a value of type `{expected}`, found `{found}`")]
    TypeMismatch {
        offset: usize,
        expected: String,
        found: String,
    },
}
