//! The module obfuscation pipeline.
//!
//! Dependency order is fixed: secret threading first (both later passes
//! consume its per-function bookkeeping), then string encryption at module
//! scope, then branch rewriting per function — so decryptor loops
//! synthesized by string encryption are themselves eligible for branch
//! rewriting.

use goron_core::ir::Module;
use goron_core::seed::{Prng, Seed};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indirect_branch::IndirectBranch;
use crate::ipo::IpoContext;
use crate::options::ObfuscationOptions;
use crate::string_encryption::StringEncryption;
use crate::{Result, Transform};

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct ObfuscationConfig {
    /// Seed for the deterministic PRNG shared by all passes.
    pub seed: Seed,
    /// Pass selection and function filters.
    pub options: ObfuscationOptions,
}

impl ObfuscationConfig {
    /// Config with a specific seed and default options.
    pub fn with_seed(seed: Seed) -> Self {
        Self {
            seed,
            options: ObfuscationOptions::default(),
        }
    }

    /// Config from options alone: the seed phrase if one is set, otherwise a
    /// random seed (builds stop being reproducible).
    pub fn from_options(options: ObfuscationOptions) -> Self {
        let seed = match &options.seed_phrase {
            Some(phrase) => Seed::from_phrase(phrase),
            None => Seed::generate(),
        };
        Self { seed, options }
    }
}

/// What one pipeline run did to the module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObfuscationSummary {
    /// Functions that gained a secret argument.
    pub functions_resignatured: usize,
    /// Conditional branches rewritten through encrypted tables.
    pub branches_rewritten: usize,
    /// Constant strings interned into the encrypted pool.
    pub strings_encrypted: usize,
    /// Names of the passes that changed the module.
    pub passes_applied: Vec<String>,
    /// Whether any pass changed the module.
    pub changed: bool,
}

/// Run the full pipeline over one module.
pub fn obfuscate_module(
    module: &mut Module,
    config: &ObfuscationConfig,
) -> Result<ObfuscationSummary> {
    let mut prng = Prng::from_seed(&config.seed);
    let mut summary = ObfuscationSummary::default();

    let mut ipo = IpoContext::new();
    if config.options.enable_ipo {
        let changed = ipo.apply(module, &mut prng)?;
        summary.functions_resignatured = ipo.resignatured().len();
        record(&mut summary, ipo.name(), changed);
    }

    if config.options.enable_string_encryption {
        let mut cse = StringEncryption::new(config.options.clone());
        let changed = cse.apply(module, &mut prng)?;
        summary.strings_encrypted = cse.encrypted_count();
        record(&mut summary, cse.name(), changed);
    }

    if config.options.enable_indirect_branch {
        let ipo_ref = config.options.enable_ipo.then_some(&ipo);
        let indbr = IndirectBranch::new(ipo_ref, &config.options);
        let names: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
        let mut rewritten = 0;
        for name in names {
            rewritten += indbr.run_on_function(module, &name, &mut prng)?;
        }
        summary.branches_rewritten = rewritten;
        record(&mut summary, "IndirectBranch", rewritten > 0);
    }

    info!(
        resignatured = summary.functions_resignatured,
        branches = summary.branches_rewritten,
        strings = summary.strings_encrypted,
        "obfuscation pipeline finished"
    );
    Ok(summary)
}

fn record(summary: &mut ObfuscationSummary, pass: &str, changed: bool) {
    info!("{:>16} changed={}", pass, changed);
    if changed {
        summary.passes_applied.push(pass.to_string());
        summary.changed = true;
    }
}
