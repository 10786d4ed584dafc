//! The typed, SSA-form mid-level IR the obfuscation passes rewrite.
//!
//! A [`Module`] owns ordered lists of [`Function`]s and [`Global`]s;
//! functions own labeled [`BasicBlock`]s of instructions ending in a single
//! terminator. All containers iterate in insertion order so that rewriting
//! under a fixed seed is reproducible byte for byte.

pub mod builder;
pub mod consts;
pub mod function;
pub mod inst;
pub mod module;
pub mod printer;
pub mod types;

pub use builder::FuncBuilder;
pub use consts::Const;
pub use function::{Function, Linkage, Param};
pub use inst::{
    AttrList, BasicBlock, BinOp, CallConv, Callee, CmpOp, DebugLoc, Inst, Operand, Term, ValueId,
};
pub use module::{Global, Module};
pub use printer::{print_function, print_module};
pub use types::{FnSig, Ty};
