//! Deterministic tie-breaking.
//!
//! RULE: Nothing in the engine may call any platform RNG.
//! Ties in candidate ranking are broken by a per-staff key drawn from a
//! PCG stream seeded from (configured seed, clinic month, phase slot).
//! The same inputs always rank staff in the same order, so a run can be
//! reproduced exactly; changing the seed reshuffles ties without touching
//! the scores themselves.

use crate::types::EntityId;
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::HashMap;

/// Stable stream assignments.
/// NEVER reorder or remove entries; only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum PhaseSlot {
    Fill = 0,
    Balance = 1,
}

pub struct TieBreaker {
    inner: Pcg64Mcg,
}

impl TieBreaker {
    pub fn new(master_seed: u64, year: i32, month: u32, slot: PhaseSlot) -> Self {
        let period = (year as u64) * 100 + month as u64;
        let derived = master_seed
            ^ period.wrapping_mul(0xbf58_476d_1ce4_e5b9)
            ^ (slot as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived),
        }
    }

    /// One key per staff id. Keys are drawn in sorted-id order so the
    /// mapping does not depend on the caller's iteration order.
    pub fn keys_for<'a, I>(mut self, staff_ids: I) -> HashMap<EntityId, u64>
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let mut ids: Vec<&EntityId> = staff_ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        ids.into_iter()
            .map(|id| (id.clone(), self.inner.next_u64()))
            .collect()
    }
}
