//! The host IR this analysis runs over. See SPEC_FULL.md §0 for why this
//! module exists at all (the original spec treats its host IR as an
//! external collaborator; this crate has no outside host to depend on, so
//! it provides a minimal one of its own, in the teacher crate's own
//! `lir`-module style).

pub mod builder;
pub mod data_layout;
pub mod function;
pub mod instruction;
pub mod tbaa;
pub mod types;
pub mod value;

pub use data_layout::DataLayout;
pub use function::{Cfg, DominatorTree, Function, InstId};
pub use instruction::{ArithOp, Callee, FloatOp, IcmpOp, Instruction, Terminator};
pub use tbaa::TbaaTag;
pub use types::{Precision, Ty};
pub use value::{BlockId, Constant, Operand, ValueId};
