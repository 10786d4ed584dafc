//! Functions: signature, linkage, attributes and body.

use std::collections::HashMap;

use super::inst::{BasicBlock, Operand, ValueId};
use super::types::{FnSig, Ty};
use crate::result::{Error, Result};

/// Symbol visibility of a function or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Visible outside the module.
    #[default]
    External,
    /// Visible only inside the module.
    Internal,
    /// Module-local and renamable.
    Private,
    /// Merged with identically named definitions at link time.
    Linkonce,
}

impl Linkage {
    /// Whether the symbol is confined to the module. Prerequisite for any
    /// transformation that alters a signature or calling convention.
    pub fn is_local(self) -> bool {
        matches!(self, Linkage::Internal | Linkage::Private)
    }
}

/// A formal parameter: its type plus name and attribute strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    pub attrs: Vec<String>,
}

impl Param {
    /// A plain parameter with no attributes.
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
            attrs: Vec::new(),
        }
    }
}

/// A function definition or declaration.
///
/// A function with no blocks is a declaration. Block order is layout order;
/// the first block is the entry block.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Ty,
    pub varargs: bool,
    pub linkage: Linkage,
    pub cconv: super::inst::CallConv,
    pub section: Option<String>,
    pub comdat: Option<String>,
    /// Function-level attribute strings.
    pub attrs: Vec<String>,
    /// Return-slot attribute strings.
    pub ret_attrs: Vec<String>,
    pub blocks: Vec<BasicBlock>,
    next_value: u32,
    /// SSA names for printing; purely cosmetic.
    value_names: HashMap<u32, String>,
}

impl Function {
    /// A new empty definition.
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret: Ty) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            varargs: false,
            linkage: Linkage::default(),
            cconv: super::inst::CallConv::default(),
            section: None,
            comdat: None,
            attrs: Vec::new(),
            ret_attrs: Vec::new(),
            blocks: Vec::new(),
            next_value: 0,
            value_names: HashMap::new(),
        }
    }

    /// A declaration: an external signature with no body.
    pub fn declaration(name: impl Into<String>, params: Vec<Param>, ret: Ty) -> Self {
        Self::new(name, params, ret)
    }

    /// Whether this function has no body in this module.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The function signature.
    pub fn sig(&self) -> FnSig {
        FnSig {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: self.ret.clone(),
            varargs: self.varargs,
        }
    }

    /// Allocate a fresh SSA definition id.
    pub fn new_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    /// Allocate a fresh SSA definition id with a printer-visible name.
    pub fn new_named_value(&mut self, name: impl Into<String>) -> ValueId {
        let id = self.new_value();
        self.value_names.insert(id.0, name.into());
        id
    }

    /// The printer-visible name of a definition, if one was assigned.
    pub fn value_name(&self, v: ValueId) -> Option<&str> {
        self.value_names.get(&v.0).map(String::as_str)
    }

    /// Carry over SSA numbering and names from a function whose body this
    /// function absorbed.
    pub fn adopt_values_from(&mut self, other: &Function) {
        self.next_value = self.next_value.max(other.next_value);
        for (k, v) in &other.value_names {
            self.value_names.insert(*k, v.clone());
        }
    }

    /// The entry block.
    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// The entry block, mutably.
    pub fn entry_mut(&mut self) -> Option<&mut BasicBlock> {
        self.blocks.first_mut()
    }

    /// Find a block by label.
    pub fn block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Find a block by label, mutably.
    pub fn block_mut(&mut self, label: &str) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    /// Find a block's position in layout order.
    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// Require a block by label.
    pub fn expect_block_mut(&mut self, label: &str) -> Result<&mut BasicBlock> {
        let func = self.name.clone();
        self.block_mut(label).ok_or(Error::UnknownBlock {
            func,
            block: label.to_string(),
        })
    }

    /// A block label not yet used in this function, derived from `base`.
    pub fn fresh_label(&self, base: &str) -> String {
        if self.block(base).is_none() {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}{n}");
            if self.block(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Visit every operand of every instruction and terminator.
    pub fn for_each_operand(&self, f: &mut dyn FnMut(&Operand)) {
        for block in &self.blocks {
            for inst in &block.insts {
                inst.for_each_operand(f);
            }
            block.term.for_each_operand(f);
        }
    }

    /// Visit every operand of every instruction and terminator, mutably.
    pub fn for_each_operand_mut(&mut self, f: &mut dyn FnMut(&mut Operand)) {
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                inst.for_each_operand_mut(f);
            }
            block.term.for_each_operand_mut(f);
        }
    }

    /// Replace every use of SSA definition `from` with `to`.
    pub fn replace_all_uses(&mut self, from: ValueId, to: Operand) {
        self.for_each_operand_mut(&mut |op| {
            if op.as_value() == Some(from) {
                *op = to.clone();
            }
        });
    }

    /// Shift every argument reference by `delta` positions. Used when a
    /// signature gains leading parameters.
    pub fn shift_args(&mut self, delta: u32) {
        self.for_each_operand_mut(&mut |op| {
            if let Operand::Arg(i) = op {
                *i += delta;
            }
        });
    }

    /// Number of operands referencing SSA definition `v`.
    pub fn count_uses(&self, v: ValueId) -> usize {
        let mut n = 0;
        self.for_each_operand(&mut |op| {
            if op.as_value() == Some(v) {
                n += 1;
            }
        });
        n
    }

    /// Erase the instruction defining `v`, if it exists. Returns whether an
    /// instruction was removed.
    pub fn erase_def(&mut self, v: ValueId) -> bool {
        for block in &mut self.blocks {
            if let Some(pos) = block.insts.iter().position(|i| i.dest() == Some(v)) {
                block.insts.remove(pos);
                return true;
            }
        }
        false
    }

    /// Erase every instruction that uses `v` as an operand, then the
    /// definition of `v` itself. Only safe when those users are themselves
    /// dead (their results unused), which the caller guarantees.
    pub fn erase_value_and_users(&mut self, v: ValueId) {
        for block in &mut self.blocks {
            block.insts.retain(|inst| {
                let mut uses = false;
                inst.for_each_operand(&mut |op| {
                    if op.as_value() == Some(v) {
                        uses = true;
                    }
                });
                !uses && inst.dest() != Some(v)
            });
        }
    }
}
