//! Constants and constant expressions.
//!
//! Globals are initialized by a `Const` tree; instruction operands may also
//! carry folded `gep`/`cast` constant expressions until `lower_constant_expr`
//! materializes them into real instructions.

use super::types::Ty;

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// An integer of the given bit width. The value is stored zero-extended.
    Int {
        /// Bit width of the integer.
        bits: u16,
        /// Value, wrapped to `bits`.
        value: u64,
    },
    /// The null pointer of the given pointer type.
    Null(Ty),
    /// The all-zero value of any type (aggregate zero).
    Zero(Ty),
    /// A constant data array of packed integers (string initializers).
    Bytes {
        /// Element width in bits: 8, 16 or 32.
        elem_bits: u16,
        /// Element values, zero-extended.
        data: Vec<u64>,
    },
    /// An array of arbitrary constants.
    Array {
        /// Element type.
        elem: Ty,
        /// Element values.
        elems: Vec<Const>,
    },
    /// A struct of arbitrary constants.
    Struct {
        /// Struct tag, if named.
        name: Option<String>,
        /// Field values in order.
        fields: Vec<Const>,
    },
    /// The address of a global variable.
    Global(String),
    /// The address of a function.
    Func(String),
    /// The address of a basic block within a function.
    BlockAddr {
        /// Owning function.
        func: String,
        /// Block label.
        block: String,
    },
    /// A folded `getelementptr` over a constant base.
    Gep {
        /// The type the first index steps over.
        elem_ty: Ty,
        /// Base address.
        base: Box<Const>,
        /// Constant indices, sign-interpreted.
        indices: Vec<i64>,
    },
    /// A folded bitcast.
    Cast {
        /// Destination type.
        to: Ty,
        /// Source constant.
        val: Box<Const>,
    },
}

impl Const {
    /// An `i32` constant.
    pub fn i32(value: u32) -> Const {
        Const::Int {
            bits: 32,
            value: value as u64,
        }
    }

    /// Whether this constant transitively references the named global.
    pub fn references_global(&self, name: &str) -> bool {
        match self {
            Const::Global(g) => g == name,
            Const::Gep { base, .. } => base.references_global(name),
            Const::Cast { val, .. } => val.references_global(name),
            Const::Array { elems, .. } => elems.iter().any(|c| c.references_global(name)),
            Const::Struct { fields, .. } => fields.iter().any(|c| c.references_global(name)),
            _ => false,
        }
    }

    /// Whether this constant transitively references the named function.
    pub fn references_func(&self, name: &str) -> bool {
        match self {
            Const::Func(f) => f == name,
            Const::BlockAddr { func, .. } => func == name,
            Const::Gep { base, .. } => base.references_func(name),
            Const::Cast { val, .. } => val.references_func(name),
            Const::Array { elems, .. } => elems.iter().any(|c| c.references_func(name)),
            Const::Struct { fields, .. } => fields.iter().any(|c| c.references_func(name)),
            _ => false,
        }
    }

    /// Rewrite every reference to global `from` into `to`, in place.
    pub fn replace_global(&mut self, from: &str, to: &str) {
        match self {
            Const::Global(g) => {
                if g == from {
                    *g = to.to_string();
                }
            }
            Const::Gep { base, .. } => base.replace_global(from, to),
            Const::Cast { val, .. } => val.replace_global(from, to),
            Const::Array { elems, .. } => {
                for c in elems {
                    c.replace_global(from, to);
                }
            }
            Const::Struct { fields, .. } => {
                for c in fields {
                    c.replace_global(from, to);
                }
            }
            _ => {}
        }
    }

    /// Whether a constant data array is a well-formed C string: non-empty,
    /// terminated by exactly one null which is the final element.
    pub fn is_c_string(&self) -> bool {
        let Const::Bytes { elem_bits, data } = self else {
            return false;
        };
        if !matches!(elem_bits, 8 | 16 | 32) {
            return false;
        }
        for (i, &elt) in data.iter().enumerate() {
            if elt == 0 {
                return i == data.len() - 1;
            }
        }
        false
    }

    /// Whether erasing this constant cannot invalidate other symbols.
    ///
    /// Addresses of globals, functions and blocks are shared; pure data is
    /// always destroyable.
    pub fn is_safe_to_destroy(&self) -> bool {
        match self {
            Const::Global(_) | Const::Func(_) | Const::BlockAddr { .. } => false,
            Const::Gep { base, .. } => base.is_safe_to_destroy(),
            Const::Cast { val, .. } => val.is_safe_to_destroy(),
            Const::Array { elems, .. } => elems.iter().all(Const::is_safe_to_destroy),
            Const::Struct { fields, .. } => fields.iter().all(Const::is_safe_to_destroy),
            _ => true,
        }
    }
}
