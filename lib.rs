//! Intra- and inter-procedural type (scalar-kind) analysis over a small
//! SSA IR, plus a reverse-mode block-structure rewriter built on top of its
//! dominator tree.
//!
//! See `SPEC_FULL.md` for the full specification this crate implements and
//! `DESIGN.md` for how each module is grounded.

pub mod analyzer;
pub mod cache;
pub mod demo;
pub mod diagnostics;
pub mod ir;
pub mod lattice;
pub mod reverse;
pub mod summary;
