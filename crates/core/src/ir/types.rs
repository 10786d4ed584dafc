//! Types of the mid-level IR.
//!
//! Pointers are typed: every `Ty::Ptr` knows its pointee, and passes that
//! walk memory (GEPs, loads, global layouts) query element types from here
//! rather than from a side channel.

/// A first-class IR type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    /// The empty type of instructions that produce no value.
    Void,
    /// An integer of the given bit width (1, 8, 16, 32, 64).
    Int(u16),
    /// A typed pointer.
    Ptr(Box<Ty>),
    /// A fixed-length array.
    Array(Box<Ty>, usize),
    /// A struct, optionally carrying its source-level tag name.
    Struct {
        /// Source tag (e.g. `struct.__NSConstantString_tag`), if named.
        name: Option<String>,
        /// Field types in declaration order.
        fields: Vec<Ty>,
    },
    /// A function signature, only meaningful behind a pointer.
    Fn(Box<FnSig>),
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnSig {
    /// Parameter types in order.
    pub params: Vec<Ty>,
    /// Return type.
    pub ret: Ty,
    /// Whether further variadic arguments are accepted.
    pub varargs: bool,
}

impl Ty {
    /// Shorthand for `i8`.
    pub fn i8() -> Ty {
        Ty::Int(8)
    }

    /// Shorthand for `i32`.
    pub fn i32() -> Ty {
        Ty::Int(32)
    }

    /// A pointer to `self`.
    pub fn ptr_to(&self) -> Ty {
        Ty::Ptr(Box::new(self.clone()))
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self) -> Option<&Ty> {
        match self {
            Ty::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Allocation size in bytes. Aggregates are packed; pointers are 8 bytes.
    pub fn size_of(&self) -> usize {
        match self {
            Ty::Void | Ty::Fn(_) => 0,
            Ty::Int(bits) => (*bits as usize).div_ceil(8),
            Ty::Ptr(_) => 8,
            Ty::Array(elem, len) => elem.size_of() * len,
            Ty::Struct { fields, .. } => fields.iter().map(Ty::size_of).sum(),
        }
    }

    /// Byte offset of struct field `idx` under the packed layout.
    pub fn field_offset(&self, idx: usize) -> Option<usize> {
        match self {
            Ty::Struct { fields, .. } if idx < fields.len() => {
                Some(fields[..idx].iter().map(Ty::size_of).sum())
            }
            _ => None,
        }
    }
}
