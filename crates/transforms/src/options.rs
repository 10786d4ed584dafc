//! Obfuscation options: which passes run, and on which functions.

use goron_core::ir::Function;
use serde::{Deserialize, Serialize};

/// Configuration for the obfuscation pipeline.
///
/// Deserializes from JSON with every field optional, so a config file only
/// names what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationOptions {
    /// Thread per-function secrets through call chains.
    pub enable_ipo: bool,
    /// Rewrite conditional branches through encrypted target tables.
    pub enable_indirect_branch: bool,
    /// Encrypt constant strings and decrypt lazily at use sites.
    pub enable_string_encryption: bool,
    /// Functions never obfuscated, by exact name.
    pub skip_functions: Vec<String>,
    /// If non-empty, only these functions are obfuscated.
    pub only_functions: Vec<String>,
    /// Optional seed phrase; the pipeline falls back to a random seed.
    pub seed_phrase: Option<String>,
}

impl Default for ObfuscationOptions {
    fn default() -> Self {
        Self {
            enable_ipo: true,
            enable_indirect_branch: true,
            enable_string_encryption: true,
            skip_functions: Vec::new(),
            only_functions: Vec::new(),
            seed_phrase: None,
        }
    }
}

impl ObfuscationOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether the named function is excluded by the allow/deny lists.
    pub fn skip_function(&self, name: &str) -> bool {
        if self.skip_functions.iter().any(|f| f == name) {
            return true;
        }
        !self.only_functions.is_empty() && !self.only_functions.iter().any(|f| f == name)
    }

    /// The gate every pass consults first: pass-level enable flag, function
    /// attributes (`no<tag>` wins over everything), and the allow/deny
    /// lists.
    pub fn to_obfuscate(&self, enable: bool, func: &Function, tag: &str) -> bool {
        if !enable || func.is_declaration() {
            return false;
        }
        let deny = format!("no{tag}");
        if func.attrs.iter().any(|a| *a == deny) {
            return false;
        }
        !self.skip_function(&func.name)
    }
}
