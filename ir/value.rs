//! SSA value identities.
//!
//! Values are referred to by a stable small integer handle rather than by a
//! raw pointer the way the original analyzer keys its caches off `Value*`.
//! §9's design note calls this out directly: "a reimplementation should use
//! stable SSA-value identifiers (indices into a per-function value table)
//! ... so that re-enqueueing never invalidates outstanding references."

use std::fmt;

use super::types::Ty;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A literal constant. Constants are never placed on the worklist (§4.3.2,
/// "skip constant values and function handles") but still have a scalar
/// classification used when an operand happens to be one (§4.4's
/// `query` rule for literals).
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int { value: i64, ty: Ty },
    Float { value: f64, precision: crate::ir::types::Precision },
    Null { ty: Ty },
    /// A reference to a callable function; never carries a scalar kind.
    FunctionHandle { name: String },
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { value, .. } => write!(f, "{value}"),
            Constant::Float { value, .. } => write!(f, "{value}"),
            Constant::Null { .. } => write!(f, "null"),
            Constant::FunctionHandle { name } => write!(f, "@{name}"),
        }
    }
}

/// An instruction operand: either a previously-defined SSA value (argument,
/// block parameter, or instruction result) or an inline constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Value(ValueId),
    Constant(Constant),
}

impl Operand {
    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(v) => Some(*v),
            Operand::Constant(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{v}"),
            Operand::Constant(c) => write!(f, "{c}"),
        }
    }
}
