use thiserror::Error;

use crate::value::Kind;

/// Errors raised by the runtime.
///
/// None of these are recovered inside the interpreter: the first error ends
/// the evaluation session and is reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LispError {
    /// Allocation impossible even after a collection, or the arena is still
    /// fuller than the admission threshold once a collection has finished.
    #[error("out of memory: {live} of {capacity} slots live after collection")]
    OutOfMemory { live: usize, capacity: usize },

    /// The symbol table is full.
    #[error("out of symbols: table holds at most {capacity} names")]
    OutOfSymbols { capacity: usize },

    #[error("`{0}` is unbound")]
    UnboundVariable(String),

    /// An accessor was invoked against a mismatched variant.
    #[error("wrong kind: expected {expected}, found {found}")]
    WrongKind { expected: Kind, found: Kind },

    /// A reclaimed slot was dereferenced. Always a runtime bug.
    #[error("use after free: slot {index} was collected while still in use")]
    UseAfterFree { index: u32 },

    #[error("definitions cannot be shadowed: `{0}` is already bound")]
    Redefinition(String),

    #[error("malformed form: {0}")]
    MalformedForm(String),

    /// A representation invariant was violated.
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("symbol name `{name}` exceeds {max} bytes")]
    NameTooLong { name: String, max: usize },

    #[error("builtin registry full: at most {max} natives")]
    TooManyNatives { max: usize },

    #[error("evaluation nested deeper than {max} levels")]
    RecursionLimit { max: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl LispError {
    /// Errors that point at a bug in the runtime rather than in the program.
    pub fn is_internal(&self) -> bool {
        matches!(self, LispError::UseAfterFree { .. } | LispError::Unreachable(_))
    }
}

impl From<std::io::Error> for LispError {
    fn from(err: std::io::Error) -> Self {
        LispError::Io(err.to_string())
    }
}

pub type LispResult<T> = Result<T, LispError>;
