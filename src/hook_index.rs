//! Tiered island index answering "is any byte of this access hooked?".
//!
//! Built once per registration change, queried on every emulated memory access. The broad tier is a
//! single island spanning every hooked byte, the mid tier merges bytes closer than
//! [`MID_TIER_GAP`], and the narrow tier holds exact runs of hooked bytes. A miss in any tier is
//! final.

/// Gap tolerated between hooked bytes of the same mid-tier island.
pub const MID_TIER_GAP: u64 = 0x1000;

const BROAD_TIER_GAP: u64 = u64::MAX;
const NARROW_TIER_GAP: u64 = 0;

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Island {
    pub start: u64,
    pub end: u64,
}

impl Island {
    #[inline]
    pub fn overlaps(&self, address: u64, size: u64) -> bool {
        address < self.end && address + size > self.start
    }
}

#[derive(Debug, Clone, Default)]
struct Tier<const MAX_GAP: u64> {
    islands: Vec<Island>,
}

impl<const MAX_GAP: u64> Tier<MAX_GAP> {
    fn rebuild(&mut self, sorted: &[u32]) {
        self.islands.clear();
        for &addr in sorted {
            let addr = u64::from(addr);
            match self.islands.last_mut() {
                Some(island) if addr >= island.end && addr <= island.end.saturating_add(MAX_GAP) => {
                    island.end = addr + 1;
                }
                _ => self.islands.push(Island { start: addr, end: addr + 1 }),
            }
        }
    }

    #[inline]
    fn contains(&self, address: u64, size: u64) -> bool {
        // Islands are disjoint and ascending: the first island ending after `address` is the only
        // candidate that can start before `address + size`.
        let idx = self.islands.partition_point(|island| island.end <= address);
        self.islands.get(idx).is_some_and(|island| island.overlaps(address, size))
    }
}

/// Hook membership index for one hook kind.
#[derive(Debug, Clone, Default)]
pub struct HookIndex {
    broad: Tier<{ BROAD_TIER_GAP }>,
    mid: Tier<{ MID_TIER_GAP }>,
    narrow: Tier<{ NARROW_TIER_GAP }>,
}

impl HookIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from an arbitrary (unsorted, possibly repeating) set of hooked bytes.
    pub fn build<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut bytes: Vec<u32> = addresses.into_iter().collect();
        bytes.sort_unstable();
        bytes.dedup();
        let mut index = Self::default();
        index.rebuild_sorted(&bytes);
        index
    }

    fn rebuild_sorted(&mut self, bytes: &[u32]) {
        self.broad.rebuild(bytes);
        self.mid.rebuild(bytes);
        self.narrow.rebuild(bytes);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.broad.islands.is_empty()
    }

    /// True when any byte of `[address, address + size)` is hooked.
    #[inline]
    pub fn contains(&self, address: u32, size: u32) -> bool {
        if self.is_empty() {
            return false;
        }
        let (address, size) = (u64::from(address), u64::from(size));
        self.broad.islands[0].overlaps(address, size)
            && self.mid.contains(address, size)
            && self.narrow.contains(address, size)
    }

    pub fn broad_islands(&self) -> &[Island] {
        &self.broad.islands
    }

    pub fn mid_islands(&self) -> &[Island] {
        &self.mid.islands
    }

    pub fn narrow_islands(&self) -> &[Island] {
        &self.narrow.islands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    #[test]
    fn empty_index_rejects_everything() {
        let index = HookIndex::build(std::iter::empty());
        assert!(index.is_empty());
        assert!(!index.contains(0, 1));
        assert!(!index.contains(u32::MAX, 1));
        assert!(!index.contains(0, u32::MAX));
    }

    #[test]
    fn tiers_merge_with_their_gap() {
        let index = HookIndex::build([0x100, 0x101, 0x102, 0x200, 0x5000]);
        assert_eq!(index.broad_islands(), &[Island { start: 0x100, end: 0x5001 }]);
        assert_eq!(
            index.mid_islands(),
            &[Island { start: 0x100, end: 0x201 }, Island { start: 0x5000, end: 0x5001 }]
        );
        assert_eq!(
            index.narrow_islands(),
            &[
                Island { start: 0x100, end: 0x103 },
                Island { start: 0x200, end: 0x201 },
                Island { start: 0x5000, end: 0x5001 },
            ]
        );
    }

    #[test]
    fn mid_gap_boundary_is_inclusive() {
        let index = HookIndex::build([0x0, 0x1001]);
        assert_eq!(index.mid_islands().len(), 1, "next byte at end + gap stays in the island");
        let index = HookIndex::build([0x0, 0x1002]);
        assert_eq!(index.mid_islands().len(), 2);
    }

    #[test]
    fn multi_byte_access_overlapping_a_hook_hits() {
        let index = HookIndex::build([0x103]);
        assert!(index.contains(0x100, 4));
        assert!(!index.contains(0x100, 3));
        assert!(index.contains(0x103, 1));
        assert!(!index.contains(0x104, 4));
    }

    #[test]
    fn top_of_address_space_does_not_overflow() {
        let index = HookIndex::build([u32::MAX]);
        assert!(index.contains(u32::MAX, 1));
        assert!(index.contains(u32::MAX - 1, 2));
        assert!(!index.contains(u32::MAX - 1, 1));
    }

    #[test]
    fn single_byte_membership_matches_hooked_set() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..64 {
            let count = rng.gen_range(0..48);
            let set: BTreeSet<u32> = (0..count).map(|_| rng.gen_range(0..0x4000)).collect();
            let index = HookIndex::build(set.iter().copied());
            for addr in 0..0x4100u32 {
                assert_eq!(
                    index.contains(addr, 1),
                    set.contains(&addr),
                    "address {addr:#x} disagrees with hooked set {set:?}"
                );
            }
        }
    }
}
