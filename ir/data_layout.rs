//! The data-layout oracle named in §6: `sizeOfInBits(T)`,
//! `indexSizeInBits(AS)`, and GEP constant-offset accumulation.
//!
//! A real host IR provides this (target-specific struct padding, address
//! space widths); this crate's own `ir::types::naive_size_in_bits` stands in
//! for a fully general one, matching SPEC_FULL.md §0's note that size
//! queries are parameterized rather than hardwired so a real layout can be
//! substituted without touching the lattice.

use super::types::{naive_size_in_bits, Ty};

#[derive(Clone, Copy, Debug)]
pub struct DataLayout {
    pub pointer_index_bits: u32,
}

impl Default for DataLayout {
    fn default() -> Self {
        DataLayout { pointer_index_bits: 64 }
    }
}

impl DataLayout {
    pub fn size_of_bits(&self, ty: &Ty) -> u64 {
        naive_size_in_bits(ty)
    }

    pub fn size_of_bytes(&self, ty: &Ty) -> u64 {
        self.size_of_bits(ty) / 8
    }

    pub fn index_size_in_bits(&self, _address_space: u32) -> u32 {
        self.pointer_index_bits
    }
}
