//! Hash-consed IR types.
//!
//! Pointer and struct types recur (a struct field can itself be a pointer to
//! the same struct), so types are interned the same way the teacher crate's
//! `lir` types are: a hash-consing table hands out cheaply comparable,
//! cheaply cloneable handles instead of each occurrence allocating its own
//! tree.

use std::fmt;

use hashconsing::{consign, HConsed, HashConsign};

/// Floating-point precisions the analysis distinguishes. Precisions are not
/// joinable across variants (§3.1): an `f32` fact and an `f64` fact at the
/// same offset are a contradiction, not a widening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precision {
    Half,
    Single,
    Double,
    X86Extended,
    Quad,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Precision::Half => "half",
            Precision::Single => "float",
            Precision::Double => "double",
            Precision::X86Extended => "x86_fp80",
            Precision::Quad => "fp128",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActualTy {
    Int { bits: u32 },
    Float(Precision),
    Pointer(Ty),
    Struct(Vec<Ty>),
    Function { params: Vec<Ty>, ret: Option<Ty> },
}

consign! {
    /// Interning table for IR types.
    let FACTORY = consign(97) for ActualTy;
}

/// A hash-consed type handle. Cloning is a refcount bump; equality is a
/// pointer comparison under the hood.
pub type Ty = HConsed<ActualTy>;

pub fn int_ty(bits: u32) -> Ty {
    FACTORY.mk(ActualTy::Int { bits })
}

pub fn i64_ty() -> Ty {
    int_ty(64)
}

pub fn i32_ty() -> Ty {
    int_ty(32)
}

pub fn i1_ty() -> Ty {
    int_ty(1)
}

pub fn float_ty(p: Precision) -> Ty {
    FACTORY.mk(ActualTy::Float(p))
}

pub fn pointer_ty(pointee: Ty) -> Ty {
    FACTORY.mk(ActualTy::Pointer(pointee))
}

pub fn struct_ty(fields: Vec<Ty>) -> Ty {
    FACTORY.mk(ActualTy::Struct(fields))
}

pub fn function_ty(params: Vec<Ty>, ret: Option<Ty>) -> Ty {
    FACTORY.mk(ActualTy::Function { params, ret })
}

/// Size in bits of a type under the default data layout used by tests and
/// the `bin/analyze` front door; a real host would delegate this to
/// `DataLayout` (see `ir::data_layout`), which is why every size-sensitive
/// lattice operation takes the size as a parameter rather than calling this
/// directly.
pub fn naive_size_in_bits(ty: &Ty) -> u64 {
    match ty.get() {
        ActualTy::Int { bits } => *bits as u64,
        ActualTy::Float(Precision::Half) => 16,
        ActualTy::Float(Precision::Single) => 32,
        ActualTy::Float(Precision::Double) => 64,
        ActualTy::Float(Precision::X86Extended) => 80,
        ActualTy::Float(Precision::Quad) => 128,
        ActualTy::Pointer(_) => 64,
        ActualTy::Struct(fields) => fields.iter().map(naive_size_in_bits).sum(),
        ActualTy::Function { .. } => 64,
    }
}

pub fn is_int(ty: &Ty) -> bool {
    matches!(ty.get(), ActualTy::Int { .. })
}

pub fn is_pointer(ty: &Ty) -> bool {
    matches!(ty.get(), ActualTy::Pointer(_))
}

pub fn pointee(ty: &Ty) -> Option<Ty> {
    match ty.get() {
        ActualTy::Pointer(inner) => Some(inner.clone()),
        _ => None,
    }
}

impl fmt::Display for ActualTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActualTy::Int { bits } => write!(f, "i{bits}"),
            ActualTy::Float(p) => write!(f, "{p}"),
            ActualTy::Pointer(inner) => write!(f, "{}*", inner.get()),
            ActualTy::Struct(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field.get())?;
                }
                write!(f, "}}")
            }
            ActualTy::Function { params, ret } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.get())?;
                }
                write!(f, ") -> ")?;
                match ret {
                    Some(r) => write!(f, "{}", r.get()),
                    None => write!(f, "void"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn interning_shares_identical_pointer_types() {
        let a = pointer_ty(i32_ty());
        let b = pointer_ty(i32_ty());
        assert_eq!(a, b);
    }

    #[test]
    fn sizes_match_expected_bit_widths() {
        assert_eq!(naive_size_in_bits(&i32_ty()), 32);
        assert_eq!(naive_size_in_bits(&float_ty(Precision::Double)), 64);
        assert_eq!(naive_size_in_bits(&pointer_ty(i64_ty())), 64);
    }
}
