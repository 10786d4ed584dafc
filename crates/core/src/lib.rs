pub mod cfg;
pub mod interp;
pub mod ir;
pub mod lower;
pub mod result;
pub mod seed;

pub use ir::{Const, Function, Global, Linkage, Module, Operand, Ty};
pub use result::{Error, Result};

/// Returns true if the linkage permits signature-altering transformations.
///
/// Only module-confined symbols may be resignatured; anything visible to the
/// linker keeps its ABI.
#[inline]
pub fn is_resignaturable_linkage(linkage: Linkage) -> bool {
    linkage.is_local()
}

/// Render a value id as the printer would, for diagnostics.
pub fn display_value(func: &Function, v: ir::ValueId) -> String {
    match func.value_name(v) {
        Some(name) => format!("%{name}"),
        None => format!("%v{}", v.0),
    }
}
