use serde::{Deserialize, Serialize};

use super::RomRegistry;
use crate::{AddressSpace, Pa};

/// A free range inside a search window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomGap {
    /// First free address.
    pub base: Pa,

    /// Number of free bytes.
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    // Ends sort before starts at the same address, so adjacent regions
    // leave no empty gap between them.
    End,
    Start,
}

impl RomRegistry {
    /// Finds the largest free range of `[base, base + size)` in the system
    /// address space.
    pub fn find_largest_gap(&self, base: impl Into<Pa>, size: u64) -> RomGap {
        self.find_largest_gap_in(AddressSpace::SYSTEM, base, size)
    }

    /// Finds the largest free range of `[base, base + size)` in `space`.
    ///
    /// Regions delivered as firmware files or placed into external regions
    /// do not occupy the window. Among equally sized gaps, the lowest one
    /// wins. A fully occupied window yields a gap of size zero.
    pub fn find_largest_gap_in(
        &self,
        space: AddressSpace,
        base: impl Into<Pa>,
        size: u64,
    ) -> RomGap {
        let base = base.into().0;
        let limit = base.saturating_add(size);

        let mut edges = Vec::new();
        for (rom, address) in self.placed_in(space) {
            let start = address.0;
            let end = start.saturating_add(rom.rom_size);

            if start >= end || end <= base || start >= limit {
                continue;
            }

            edges.push((start.max(base), Edge::Start));
            edges.push((end.min(limit), Edge::End));
        }

        edges.sort_unstable();

        let mut best = RomGap {
            base: Pa(base),
            size: 0,
        };

        let mut consider = |start: u64, end: u64| {
            if end - start > best.size {
                best = RomGap {
                    base: Pa(start),
                    size: end - start,
                };
            }
        };

        let mut depth = 0usize;
        let mut free = base;

        for (address, edge) in edges {
            match edge {
                Edge::Start => {
                    if depth == 0 && address > free {
                        consider(free, address);
                    }

                    depth += 1;
                }
                Edge::End => {
                    depth -= 1;

                    if depth == 0 {
                        free = address;
                    }
                }
            }
        }

        if limit > free {
            consider(free, limit);
        }

        best
    }
}
