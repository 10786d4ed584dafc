pub mod indirect_branch;
pub mod ipo;
pub mod options;
pub mod pipeline;
pub mod string_encryption;

use goron_core::ir::Module;
use goron_core::seed::Prng;
use thiserror::Error;

pub use indirect_branch::IndirectBranch;
pub use ipo::{IpoContext, IpoInfo};
pub use options::ObfuscationOptions;
pub use pipeline::{obfuscate_module, ObfuscationConfig, ObfuscationSummary};
pub use string_encryption::StringEncryption;

/// Transform error type encompassing all transform module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// IR-level operation failed.
    #[error("core operation failed: {0}")]
    Core(#[from] goron_core::Error),

    /// A structural invariant a pass depends on was violated after its
    /// survey accepted the target. Always fatal.
    #[error("{pass}: invariant violated on '{symbol}': {reason}")]
    InvariantViolation {
        /// The pass that detected the violation.
        pass: &'static str,
        /// The offending symbol.
        symbol: String,
        /// What went wrong.
        reason: String,
    },

    /// Options could not be parsed.
    #[error("invalid obfuscation options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}

/// Transform result type
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for module obfuscation transforms.
///
/// A transform mutates the module in place and reports whether anything
/// changed; an unchanged module means every analysis is preserved.
pub trait Transform {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to the module, returning whether changes were made.
    fn apply(&mut self, module: &mut Module, prng: &mut Prng) -> Result<bool>;
}
