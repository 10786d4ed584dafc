//! Core results and error types

use thiserror::Error;

/// Core error type encompassing all IR and evaluator errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A symbol with this name already exists in the module.
    #[error("duplicate symbol '{0}'")]
    DuplicateSymbol(String),

    /// The evaluator ran out of fuel (likely an unbounded loop).
    #[error("evaluation exceeded {0} steps")]
    FuelExhausted(u64),

    /// Invalid hexadecimal in seed.
    #[error("invalid hexadecimal in seed")]
    InvalidSeedHex,

    /// Invalid seed length.
    #[error("invalid seed length: expected 64 hex chars, got {0}")]
    InvalidSeedLength(usize),

    /// A function body violates a structural invariant.
    #[error("malformed function '{func}': {reason}")]
    MalformedFunction {
        /// The function containing the defect.
        func: String,
        /// Description of the violated invariant.
        reason: String,
    },

    /// The evaluator trapped on undefined behavior.
    #[error("trap in '{func}': {reason}")]
    Trap {
        /// The function executing when the trap fired.
        func: String,
        /// Description of the trap.
        reason: String,
    },

    /// An operand or initializer has a type inconsistent with its use.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A referenced basic block does not exist in the function.
    #[error("unknown block '{block}' in function '{func}'")]
    UnknownBlock {
        /// The function searched.
        func: String,
        /// The missing block label.
        block: String,
    },

    /// A referenced function does not exist in the module.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A referenced global variable does not exist in the module.
    #[error("unknown global '{0}'")]
    UnknownGlobal(String),
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
