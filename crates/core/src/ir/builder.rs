//! A small insertion-point builder for synthesizing functions.
//!
//! Passes that generate whole routines (decryptors, lazy initializers) and
//! tests that assemble input modules both go through this; direct `Vec`
//! surgery on existing blocks stays in the passes themselves.

use super::consts::Const;
use super::function::{Function, Linkage, Param};
use super::inst::{
    AttrList, BasicBlock, BinOp, CallConv, Callee, CmpOp, Inst, Operand, Term, ValueId,
};
use super::types::Ty;

/// Builds one function, appending to one block at a time.
pub struct FuncBuilder {
    func: Function,
    current: usize,
}

impl FuncBuilder {
    /// Start a function with an initial block named `entry`.
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret: Ty) -> Self {
        Self::with_entry(name, params, ret, "entry")
    }

    /// Start a function with an explicitly named entry block.
    pub fn with_entry(
        name: impl Into<String>,
        params: Vec<Param>,
        ret: Ty,
        entry: impl Into<String>,
    ) -> Self {
        let mut func = Function::new(name, params, ret);
        func.blocks.push(BasicBlock::new(entry));
        Self { func, current: 0 }
    }

    /// Set linkage.
    pub fn linkage(mut self, linkage: Linkage) -> Self {
        self.func.linkage = linkage;
        self
    }

    /// Append a new block and make it current.
    pub fn block(&mut self, label: impl Into<String>) -> &mut Self {
        self.func.blocks.push(BasicBlock::new(label));
        self.current = self.func.blocks.len() - 1;
        self
    }

    /// Make an existing block current.
    pub fn switch_to(&mut self, label: &str) -> &mut Self {
        self.current = self
            .func
            .block_index(label)
            .unwrap_or_else(|| panic!("no block '{label}' in '{}'", self.func.name));
        self
    }

    fn push(&mut self, inst: Inst) {
        self.func.blocks[self.current].insts.push(inst);
    }

    /// Stack slot of the given type.
    pub fn alloca(&mut self, ty: Ty, align: u32, name: &str) -> ValueId {
        let dest = self.func.new_named_value(name);
        self.push(Inst::Alloca { dest, ty, align });
        dest
    }

    /// Typed load.
    pub fn load(&mut self, ty: Ty, ptr: Operand) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Load { dest, ty, ptr });
        dest
    }

    /// Typed load with a printer-visible name.
    pub fn load_named(&mut self, ty: Ty, ptr: Operand, name: &str) -> ValueId {
        let dest = self.func.new_named_value(name);
        self.push(Inst::Load { dest, ty, ptr });
        dest
    }

    /// Store through a pointer.
    pub fn store(&mut self, val: Operand, ptr: Operand) {
        self.push(Inst::Store { val, ptr });
    }

    /// Wrapping binary arithmetic.
    pub fn bin(&mut self, op: BinOp, bits: u16, lhs: Operand, rhs: Operand) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Bin {
            dest,
            op,
            bits,
            lhs,
            rhs,
        });
        dest
    }

    /// Integer comparison.
    pub fn icmp(&mut self, op: CmpOp, bits: u16, lhs: Operand, rhs: Operand) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Icmp {
            dest,
            op,
            bits,
            lhs,
            rhs,
        });
        dest
    }

    /// Two-way select.
    pub fn select(&mut self, ty: Ty, cond: Operand, on_true: Operand, on_false: Operand) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Select {
            dest,
            ty,
            cond,
            on_true,
            on_false,
        });
        dest
    }

    /// A phi with its initial incoming list; further edges are added with
    /// [`FuncBuilder::add_incoming`].
    pub fn phi(&mut self, ty: Ty, incoming: Vec<(Operand, String)>) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Phi { dest, ty, incoming });
        dest
    }

    /// Add an incoming edge to an existing phi.
    pub fn add_incoming(&mut self, phi: ValueId, val: Operand, pred: impl Into<String>) {
        for block in &mut self.func.blocks {
            for inst in &mut block.insts {
                if let Inst::Phi { dest, incoming, .. } = inst {
                    if *dest == phi {
                        incoming.push((val, pred.into()));
                        return;
                    }
                }
            }
        }
        panic!("no phi {phi:?} in '{}'", self.func.name);
    }

    /// Address arithmetic.
    pub fn gep(&mut self, elem_ty: Ty, base: Operand, indices: Vec<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Gep {
            dest,
            elem_ty,
            base,
            indices,
            inbounds: true,
        });
        dest
    }

    /// Bit cast.
    pub fn cast(&mut self, to: Ty, val: Operand) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Cast { dest, to, val });
        dest
    }

    /// Call returning a value.
    pub fn call(&mut self, callee: impl Into<String>, ret_ty: Ty, args: Vec<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Call {
            dest: Some(dest),
            callee: Callee::Direct(callee.into()),
            args,
            ret_ty,
            cconv: CallConv::C,
            attrs: AttrList::default(),
            tail: false,
            dbg: None,
        });
        dest
    }

    /// Call with no result.
    pub fn call_void(&mut self, callee: impl Into<String>, args: Vec<Operand>) {
        self.push(Inst::Call {
            dest: None,
            callee: Callee::Direct(callee.into()),
            args,
            ret_ty: Ty::Void,
            cconv: CallConv::C,
            attrs: AttrList::default(),
            tail: false,
            dbg: None,
        });
    }

    /// Call through a function pointer.
    pub fn call_indirect(&mut self, ptr: Operand, ret_ty: Ty, args: Vec<Operand>) -> ValueId {
        let dest = self.func.new_value();
        self.push(Inst::Call {
            dest: Some(dest),
            callee: Callee::Indirect(ptr),
            args,
            ret_ty,
            cconv: CallConv::C,
            attrs: AttrList::default(),
            tail: false,
            dbg: None,
        });
        dest
    }

    /// Unconditional branch terminator.
    pub fn br(&mut self, dest: impl Into<String>) {
        self.func.blocks[self.current].term = Term::Br { dest: dest.into() };
    }

    /// Conditional branch terminator.
    pub fn cond_br(&mut self, cond: Operand, on_true: impl Into<String>, on_false: impl Into<String>) {
        self.func.blocks[self.current].term = Term::CondBr {
            cond,
            on_true: on_true.into(),
            on_false: on_false.into(),
        };
    }

    /// Return terminator.
    pub fn ret(&mut self, val: Operand) {
        self.func.blocks[self.current].term = Term::Ret(Some(val));
    }

    /// Void return terminator.
    pub fn ret_void(&mut self) {
        self.func.blocks[self.current].term = Term::Ret(None);
    }

    /// Integer constant operand helper.
    pub fn const_i32(value: u32) -> Operand {
        Operand::Const(Const::i32(value))
    }

    /// Finish and take the function.
    pub fn finish(self) -> Function {
        self.func
    }
}
