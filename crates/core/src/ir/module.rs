//! The module: ordered function and global lists plus retention metadata.
//!
//! Functions and globals live in `Vec`s and are iterated in insertion order
//! everywhere, so a fixed seed produces a byte-identical module (hash maps
//! are used only for lookup, never to choose emission order).

use super::consts::Const;
use super::function::{Function, Linkage};
use super::inst::{Callee, Inst, Term};
use super::types::Ty;
use crate::result::{Error, Result};

/// A module-level variable.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    /// The value type (not the pointer type of the symbol).
    pub ty: Ty,
    /// Initializer; `None` for external declarations.
    pub init: Option<Const>,
    pub is_const: bool,
    pub linkage: Linkage,
    pub align: u32,
    pub section: Option<String>,
    /// Set by runtimes that patch the value before first use (ObjC selector
    /// references).
    pub externally_initialized: bool,
}

impl Global {
    /// A private constant with an initializer.
    pub fn private_const(name: impl Into<String>, ty: Ty, init: Const) -> Self {
        Self {
            name: name.into(),
            ty,
            init: Some(init),
            is_const: true,
            linkage: Linkage::Private,
            align: 1,
            section: None,
            externally_initialized: false,
        }
    }

    /// A private mutable variable with an initializer.
    pub fn private_mut(name: impl Into<String>, ty: Ty, init: Const) -> Self {
        Self {
            is_const: false,
            ..Self::private_const(name, ty, init)
        }
    }
}

/// A compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    /// Symbols retained against link-time dead-stripping.
    pub compiler_used: Vec<String>,
}

impl Module {
    /// An empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Find a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Find a function by name, mutably.
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Require a function by name.
    pub fn expect_function(&self, name: &str) -> Result<&Function> {
        self.function(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Find a global by name.
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Find a global by name, mutably.
    pub fn global_mut(&mut self, name: &str) -> Option<&mut Global> {
        self.globals.iter_mut().find(|g| g.name == name)
    }

    /// Require a global by name.
    pub fn expect_global(&self, name: &str) -> Result<&Global> {
        self.global(name)
            .ok_or_else(|| Error::UnknownGlobal(name.to_string()))
    }

    /// Append a function, rejecting duplicate names.
    pub fn add_function(&mut self, func: Function) -> Result<()> {
        if self.function(&func.name).is_some() {
            return Err(Error::DuplicateSymbol(func.name));
        }
        self.functions.push(func);
        Ok(())
    }

    /// Append a global, rejecting duplicate names.
    pub fn add_global(&mut self, global: Global) -> Result<()> {
        if self.global(&global.name).is_some() {
            return Err(Error::DuplicateSymbol(global.name));
        }
        self.globals.push(global);
        Ok(())
    }

    /// Remove a function by name, returning it.
    pub fn take_function(&mut self, name: &str) -> Result<Function> {
        let pos = self
            .functions
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))?;
        Ok(self.functions.remove(pos))
    }

    /// Remove a global by name.
    pub fn remove_global(&mut self, name: &str) -> Result<Global> {
        let pos = self
            .globals
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| Error::UnknownGlobal(name.to_string()))?;
        Ok(self.globals.remove(pos))
    }

    /// Retain the named globals against link-time dead-stripping.
    pub fn append_to_compiler_used(&mut self, names: &[&str]) {
        for name in names {
            if !self.compiler_used.iter().any(|n| n == name) {
                self.compiler_used.push((*name).to_string());
            }
        }
    }

    /// Count references to global `name` from instruction operands, other
    /// globals' initializers, and the retention list.
    pub fn count_global_uses(&self, name: &str) -> usize {
        let mut n = 0;
        for func in &self.functions {
            func.for_each_operand(&mut |op| {
                if let super::inst::Operand::Const(c) = op {
                    if c.references_global(name) {
                        n += 1;
                    }
                }
            });
        }
        for global in &self.globals {
            if global.name != name
                && global
                    .init
                    .as_ref()
                    .is_some_and(|c| c.references_global(name))
            {
                n += 1;
            }
        }
        n + self.compiler_used.iter().filter(|u| *u == name).count()
    }

    /// Count references to function `name`: direct call sites plus
    /// address-taking constant uses anywhere in the module.
    pub fn count_function_uses(&self, name: &str) -> usize {
        self.call_sites_of(name).len() + self.address_uses_of(name)
    }

    /// Locate every direct call or invoke of `name`, as
    /// (caller index, block index, instruction index) triples; the
    /// instruction index equals the block's instruction count when the use
    /// is the block's invoke terminator.
    pub fn call_sites_of(&self, name: &str) -> Vec<(usize, usize, usize)> {
        let mut sites = Vec::new();
        for (fi, func) in self.functions.iter().enumerate() {
            for (bi, block) in func.blocks.iter().enumerate() {
                for (ii, inst) in block.insts.iter().enumerate() {
                    if let Inst::Call {
                        callee: Callee::Direct(callee),
                        ..
                    } = inst
                    {
                        if callee == name {
                            sites.push((fi, bi, ii));
                        }
                    }
                }
                if let Term::Invoke {
                    callee: Callee::Direct(callee),
                    ..
                } = &block.term
                {
                    if callee == name {
                        sites.push((fi, bi, block.insts.len()));
                    }
                }
            }
        }
        sites
    }

    /// Count address-taking (non-callee) references to function `name`:
    /// `Const::Func` occurrences in operands or global initializers.
    pub fn address_uses_of(&self, name: &str) -> usize {
        let mut n = 0;
        for func in &self.functions {
            func.for_each_operand(&mut |op| {
                if let super::inst::Operand::Const(c) = op {
                    if c.references_func(name) {
                        n += 1;
                    }
                }
            });
        }
        for global in &self.globals {
            if global
                .init
                .as_ref()
                .is_some_and(|c| c.references_func(name))
            {
                n += 1;
            }
        }
        n
    }
}
