//! Instructions, terminators and basic blocks.
//!
//! Every SSA definition is a function-local `ValueId`. Operands reference a
//! definition, a function argument by position, or an inline constant, so
//! moving blocks between functions never renumbers anything except argument
//! positions, which shift explicitly.

use super::consts::Const;
use super::types::Ty;

/// A function-local SSA definition id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// An instruction or terminator operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Result of another instruction in the same function.
    Value(ValueId),
    /// The function argument at this position.
    Arg(u32),
    /// An inline constant.
    Const(Const),
}

impl Operand {
    /// The referenced SSA definition, if any.
    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// The referenced global name, for direct or folded global operands.
    pub fn as_global(&self) -> Option<&str> {
        match self {
            Operand::Const(Const::Global(name)) => Some(name),
            _ => None,
        }
    }
}

/// Binary integer operations. All arithmetic wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    URem,
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// Calling conventions carried on functions and call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallConv {
    /// The platform C convention.
    #[default]
    C,
    Fast,
    Cold,
}

/// Source location attached to call sites and preserved across rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugLoc {
    pub line: u32,
    pub col: u32,
}

/// The callee of a call or invoke.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A direct call to a module function by name.
    Direct(String),
    /// A call through a function pointer.
    Indirect(Operand),
}

/// Attributes attached to a call site: function-level, return-slot and
/// per-argument attribute strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttrList {
    pub fn_attrs: Vec<String>,
    pub ret_attrs: Vec<String>,
    pub params: Vec<Vec<String>>,
}

/// A non-terminator instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Stack allocation producing a pointer to `ty`.
    Alloca {
        dest: ValueId,
        ty: Ty,
        align: u32,
    },
    /// Typed load through a pointer.
    Load {
        dest: ValueId,
        ty: Ty,
        ptr: Operand,
    },
    /// Store a value through a pointer.
    Store { val: Operand, ptr: Operand },
    /// Wrapping binary arithmetic on `bits`-wide integers.
    Bin {
        dest: ValueId,
        op: BinOp,
        bits: u16,
        lhs: Operand,
        rhs: Operand,
    },
    /// Integer comparison producing an `i1`.
    Icmp {
        dest: ValueId,
        op: CmpOp,
        bits: u16,
        lhs: Operand,
        rhs: Operand,
    },
    /// Two-way select on an `i1` condition.
    Select {
        dest: ValueId,
        ty: Ty,
        cond: Operand,
        on_true: Operand,
        on_false: Operand,
    },
    /// SSA merge of per-predecessor incoming values.
    Phi {
        dest: ValueId,
        ty: Ty,
        /// (incoming value, predecessor block label) pairs.
        incoming: Vec<(Operand, String)>,
    },
    /// Address arithmetic: the first index steps over `elem_ty`, further
    /// indices descend into aggregates. Indices are sign-interpreted.
    Gep {
        dest: ValueId,
        elem_ty: Ty,
        base: Operand,
        indices: Vec<Operand>,
        inbounds: bool,
    },
    /// Pointer-preserving bit cast.
    Cast {
        dest: ValueId,
        to: Ty,
        val: Operand,
    },
    /// Function call. `dest` is `None` for void calls.
    Call {
        dest: Option<ValueId>,
        callee: Callee,
        args: Vec<Operand>,
        ret_ty: Ty,
        cconv: CallConv,
        attrs: AttrList,
        tail: bool,
        dbg: Option<DebugLoc>,
    },
}

/// A block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Return, with a value unless the function is void.
    Ret(Option<Operand>),
    /// Unconditional branch.
    Br { dest: String },
    /// Two-way conditional branch on an `i1`.
    CondBr {
        cond: Operand,
        on_true: String,
        on_false: String,
    },
    /// Branch to a runtime-computed block address drawn from `dests`.
    IndirectBr { addr: Operand, dests: Vec<String> },
    /// Call with explicit unwind edge.
    Invoke {
        dest: Option<ValueId>,
        callee: Callee,
        args: Vec<Operand>,
        ret_ty: Ty,
        cconv: CallConv,
        attrs: AttrList,
        normal: String,
        unwind: String,
        dbg: Option<DebugLoc>,
    },
    /// Control cannot reach this point.
    Unreachable,
}

/// A basic block: a label, straight-line instructions, one terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub insts: Vec<Inst>,
    pub term: Term,
}

impl BasicBlock {
    /// An empty block ending in `unreachable`, to be filled by a builder.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            insts: Vec::new(),
            term: Term::Unreachable,
        }
    }
}

impl Inst {
    /// The SSA definition this instruction produces, if any.
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Inst::Alloca { dest, .. }
            | Inst::Load { dest, .. }
            | Inst::Bin { dest, .. }
            | Inst::Icmp { dest, .. }
            | Inst::Select { dest, .. }
            | Inst::Phi { dest, .. }
            | Inst::Gep { dest, .. }
            | Inst::Cast { dest, .. } => Some(*dest),
            Inst::Call { dest, .. } => *dest,
            Inst::Store { .. } => None,
        }
    }

    /// Visit every operand.
    pub fn for_each_operand(&self, f: &mut dyn FnMut(&Operand)) {
        match self {
            Inst::Alloca { .. } => {}
            Inst::Load { ptr, .. } => f(ptr),
            Inst::Store { val, ptr } => {
                f(val);
                f(ptr);
            }
            Inst::Bin { lhs, rhs, .. } | Inst::Icmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Inst::Select {
                cond,
                on_true,
                on_false,
                ..
            } => {
                f(cond);
                f(on_true);
                f(on_false);
            }
            Inst::Phi { incoming, .. } => {
                for (op, _) in incoming {
                    f(op);
                }
            }
            Inst::Gep { base, indices, .. } => {
                f(base);
                for idx in indices {
                    f(idx);
                }
            }
            Inst::Cast { val, .. } => f(val),
            Inst::Call { callee, args, .. } => {
                if let Callee::Indirect(op) = callee {
                    f(op);
                }
                for arg in args {
                    f(arg);
                }
            }
        }
    }

    /// Visit every operand mutably.
    pub fn for_each_operand_mut(&mut self, f: &mut dyn FnMut(&mut Operand)) {
        match self {
            Inst::Alloca { .. } => {}
            Inst::Load { ptr, .. } => f(ptr),
            Inst::Store { val, ptr } => {
                f(val);
                f(ptr);
            }
            Inst::Bin { lhs, rhs, .. } | Inst::Icmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Inst::Select {
                cond,
                on_true,
                on_false,
                ..
            } => {
                f(cond);
                f(on_true);
                f(on_false);
            }
            Inst::Phi { incoming, .. } => {
                for (op, _) in incoming {
                    f(op);
                }
            }
            Inst::Gep { base, indices, .. } => {
                f(base);
                for idx in indices {
                    f(idx);
                }
            }
            Inst::Cast { val, .. } => f(val),
            Inst::Call { callee, args, .. } => {
                if let Callee::Indirect(op) = callee {
                    f(op);
                }
                for arg in args {
                    f(arg);
                }
            }
        }
    }
}

impl Term {
    /// The SSA definition this terminator produces (invokes only).
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Term::Invoke { dest, .. } => *dest,
            _ => None,
        }
    }

    /// Labels of all successor blocks, in IR order.
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Term::Ret(_) | Term::Unreachable => Vec::new(),
            Term::Br { dest } => vec![dest.as_str()],
            Term::CondBr {
                on_true, on_false, ..
            } => vec![on_true.as_str(), on_false.as_str()],
            Term::IndirectBr { dests, .. } => dests.iter().map(String::as_str).collect(),
            Term::Invoke { normal, unwind, .. } => vec![normal.as_str(), unwind.as_str()],
        }
    }

    /// Rewrite every successor label equal to `from` into `to`.
    pub fn replace_successor(&mut self, from: &str, to: &str) {
        let patch = |label: &mut String| {
            if label == from {
                *label = to.to_string();
            }
        };
        match self {
            Term::Ret(_) | Term::Unreachable => {}
            Term::Br { dest } => patch(dest),
            Term::CondBr {
                on_true, on_false, ..
            } => {
                patch(on_true);
                patch(on_false);
            }
            Term::IndirectBr { dests, .. } => dests.iter_mut().for_each(patch),
            Term::Invoke { normal, unwind, .. } => {
                patch(normal);
                patch(unwind);
            }
        }
    }

    /// Visit every operand.
    pub fn for_each_operand(&self, f: &mut dyn FnMut(&Operand)) {
        match self {
            Term::Ret(Some(op)) => f(op),
            Term::CondBr { cond, .. } => f(cond),
            Term::IndirectBr { addr, .. } => f(addr),
            Term::Invoke { callee, args, .. } => {
                if let Callee::Indirect(op) = callee {
                    f(op);
                }
                for arg in args {
                    f(arg);
                }
            }
            _ => {}
        }
    }

    /// Visit every operand mutably.
    pub fn for_each_operand_mut(&mut self, f: &mut dyn FnMut(&mut Operand)) {
        match self {
            Term::Ret(Some(op)) => f(op),
            Term::CondBr { cond, .. } => f(cond),
            Term::IndirectBr { addr, .. } => f(addr),
            Term::Invoke { callee, args, .. } => {
                if let Callee::Indirect(op) = callee {
                    f(op);
                }
                for arg in args {
                    f(arg);
                }
            }
            _ => {}
        }
    }
}
