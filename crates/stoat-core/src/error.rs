/// All recoverable errors that can occur within Stoat.
///
/// Only faults the caller can act on live here: by-name dispatch failures
/// and misuse of the backward entry point. Shape mismatches and access to
/// released nodes indicate correctness bugs and panic instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// By-name dispatch received a name outside the operator enumeration.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// By-name dispatch received the wrong number of operands.
    #[error("operator {op} expects {expected} operand(s), got {got}")]
    WrongOperandCount {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// The operator's constructor needs non-node parameters (indices,
    /// probabilities, exponents) and cannot be built from operands alone.
    #[error("operator {0} is not invocable by name")]
    NotInvocableByName(&'static str),

    /// `backward` was called on a non-scalar root without a seed gradient.
    #[error("backward on a non-scalar root requires a seed gradient")]
    NonScalarRootWithoutSeed,

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Stoat.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
