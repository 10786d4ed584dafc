//! Integration test suite for the goron workspace.
//!
//! Mirrors the crate layout: `core` exercises the IR, evaluator and PRNG;
//! `transforms` exercises each pass in isolation; `e2e` runs the whole
//! pipeline over the scenario modules in `fixtures` and compares observable
//! behavior before and after.

pub mod fixtures;

#[cfg(test)]
mod core {
    mod interp;
    mod printer;
    mod seed;
}

#[cfg(test)]
mod transforms {
    mod indirect_branch;
    mod ipo;
    mod pipeline;
    mod string_encryption;
}

#[cfg(test)]
mod e2e;
