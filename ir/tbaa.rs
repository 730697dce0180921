//! Type-based alias analysis tags.
//!
//! The original spec's TBAA reader (§6) "given an instruction, a set of
//! candidate type names, returns the first matching tag name or empty";
//! here instructions simply carry an optional `TbaaTag` looked up from
//! `Function::tbaa` by `InstId`, since this crate's host IR has no separate
//! metadata graph to walk.

use derive_more::Display;

#[derive(Display, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TbaaTag {
    #[display(fmt = "long long")]
    LongLong,
    #[display(fmt = "long")]
    Long,
    #[display(fmt = "int")]
    Int,
    #[display(fmt = "bool")]
    Bool,
    #[display(fmt = "any pointer")]
    AnyPointer,
    #[display(fmt = "vtable pointer")]
    VTablePointer,
    #[display(fmt = "float")]
    Float,
    #[display(fmt = "double")]
    Double,
}

impl TbaaTag {
    pub fn is_integral(self) -> bool {
        matches!(self, TbaaTag::LongLong | TbaaTag::Long | TbaaTag::Int | TbaaTag::Bool)
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, TbaaTag::AnyPointer | TbaaTag::VTablePointer)
    }
}
