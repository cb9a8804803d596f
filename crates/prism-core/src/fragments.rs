//! Per-pixel fragment list data model.
//!
//! The GPU side stores translucent fragments in a flat node pool plus a
//! per-pixel head table: inserting splices a node onto the front of the
//! pixel's singly linked chain, so traversal order is newest-first. This
//! module defines the node layout shared with the WGSL shaders and a host
//! mirror of the whole protocol (insert, walk, sort, composite). The
//! mirror is what the unit tests drive; the shaders in `prism-shaders`
//! implement the same steps against the same bit layouts.

use bytemuck::{Pod, Zeroable};

/// Head-table value meaning "no fragments for this pixel".
pub const SENTINEL: u32 = u32::MAX;

/// One fragment list node, layout-identical to the WGSL `Node` struct.
/// `next` holds the head value observed at insertion time, so chains read
/// in reverse insertion order. Nodes are write-once within a frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentNode {
    pub next: u32,
    pub color: u32,
    pub depth: u32,
    pub coverage: u32,
}

/// Pack straight-alpha RGBA into 8-bit channels, matching WGSL
/// `pack4x8unorm` (component 0 in the low byte).
pub fn pack_rgba8(color: [f32; 4]) -> u32 {
    let mut packed = 0u32;
    for (i, c) in color.iter().enumerate() {
        let q = (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        packed |= q << (8 * i);
    }
    packed
}

/// Inverse of [`pack_rgba8`], matching WGSL `unpack4x8unorm`.
pub fn unpack_rgba8(packed: u32) -> [f32; 4] {
    let mut color = [0.0f32; 4];
    for (i, c) in color.iter_mut().enumerate() {
        *c = ((packed >> (8 * i)) & 0xff) as f32 / 255.0;
    }
    color
}

/// Normalized device depth as a monotonically comparable unsigned integer.
/// For depths in [0, 1] the IEEE bit pattern preserves ordering.
pub fn depth_bits(depth: f32) -> u32 {
    depth.clamp(0.0, 1.0).to_bits()
}

pub fn depth_from_bits(bits: u32) -> f32 {
    f32::from_bits(bits)
}

/// Per-sample occlusion rejection, mirroring the accumulation shader:
/// clears every coverage bit whose opaque depth sample is at or in front
/// of the fragment. A zero result means the fragment is recorded nowhere.
pub fn visible_coverage(coverage: u32, depth: f32, opaque_depths: &[f32]) -> u32 {
    let mut mask = coverage;
    for (s, &opaque) in opaque_depths.iter().enumerate() {
        if mask & (1 << s) != 0 && depth >= opaque {
            mask &= !(1 << s);
        }
    }
    mask
}

/// Host mirror of the GPU fragment lists for one frame.
///
/// Buffer sizes, the allocation protocol, and both truncation rules are
/// identical to the shader path: overflow at insertion drops the newest
/// fragment (no node written, head untouched); overflow at resolve stops
/// the walk after the traversal budget, dropping the oldest-inserted
/// reachable fragments.
pub struct FragmentLists {
    width: u32,
    height: u32,
    heads: Vec<u32>,
    nodes: Vec<FragmentNode>,
    cursor: u32,
}

impl FragmentLists {
    pub fn new(width: u32, height: u32, layers: u32) -> Self {
        let capacity = (width * height * layers) as usize;
        Self {
            width,
            height,
            heads: vec![SENTINEL; (width * height) as usize],
            nodes: vec![FragmentNode::zeroed(); capacity],
            cursor: 0,
        }
    }

    /// Node pool capacity: `width * height * layers`.
    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Number of slots actually written this frame.
    pub fn allocated(&self) -> u32 {
        self.cursor.min(self.capacity())
    }

    /// Frame-start clear: heads to the sentinel, counter rewound. Node
    /// payloads are deliberately left stale; the sentinel guards them.
    pub fn reset(&mut self) {
        self.heads.fill(SENTINEL);
        self.cursor = 0;
    }

    fn slot(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y * self.width + x) as usize
    }

    pub fn head(&self, x: u32, y: u32) -> u32 {
        self.heads[self.slot(x, y)]
    }

    /// Record one translucent fragment, mirroring the accumulation shader:
    /// reserve a slot from the counter, write the payload, exchange the
    /// head, store the previous head as `next`. Returns the node index, or
    /// `None` if the pool is exhausted (the fragment is dropped).
    pub fn insert(
        &mut self,
        x: u32,
        y: u32,
        color: [f32; 4],
        depth: f32,
        coverage: u32,
    ) -> Option<u32> {
        let index = self.cursor;
        self.cursor += 1;
        if index >= self.capacity() {
            return None;
        }
        let slot = self.slot(x, y);
        let prev = std::mem::replace(&mut self.heads[slot], index);
        self.nodes[index as usize] = FragmentNode {
            next: prev,
            color: pack_rgba8(color),
            depth: depth_bits(depth),
            coverage,
        };
        Some(index)
    }

    /// Walk a pixel's chain head-first, yielding at most `budget` node
    /// indices. The budget doubles as a cycle guard.
    pub fn chain_indices(&self, x: u32, y: u32, budget: u32) -> Vec<u32> {
        let mut indices = Vec::new();
        let mut head = self.head(x, y);
        while head != SENTINEL && (indices.len() as u32) < budget {
            indices.push(head);
            head = self.nodes[head as usize].next;
        }
        indices
    }

    /// Collect up to `budget` fragments for a pixel, newest first.
    pub fn collect(&self, x: u32, y: u32, budget: u32) -> Vec<FragmentNode> {
        self.chain_indices(x, y, budget)
            .into_iter()
            .map(|i| self.nodes[i as usize])
            .collect()
    }

    /// Resolve one pixel exactly as the compute shader does: collect up to
    /// `budget` fragments, sort ascending by depth bits, then for each of
    /// `samples` sub-positions composite back-to-front over `backdrop`
    /// (skipping fragments whose coverage mask misses the sub-position),
    /// and average the per-sample results.
    pub fn resolve_pixel(
        &self,
        x: u32,
        y: u32,
        backdrop: [f32; 3],
        budget: u32,
        samples: u32,
    ) -> [f32; 3] {
        let mut collected = self.collect(x, y, budget);
        collected.sort_by_key(|node| node.depth);

        let mut sum = [0.0f32; 3];
        for s in 0..samples {
            let mut acc = backdrop;
            for node in collected.iter().rev() {
                if node.coverage & (1 << s) == 0 {
                    continue;
                }
                let c = unpack_rgba8(node.color);
                for ch in 0..3 {
                    acc[ch] = acc[ch] * (1.0 - c[3]) + c[ch] * c[3];
                }
            }
            for ch in 0..3 {
                sum[ch] += acc[ch];
            }
        }
        sum.map(|v| v / samples as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: u32 = 0xf; // all four sub-samples covered

    fn assert_rgb_close(actual: [f32; 3], expected: [f32; 3]) {
        for ch in 0..3 {
            assert!(
                (actual[ch] - expected[ch]).abs() < 0.01,
                "channel {ch}: {actual:?} vs {expected:?}"
            );
        }
    }

    #[test]
    fn pack_matches_wgsl_byte_order() {
        assert_eq!(pack_rgba8([1.0, 0.0, 0.0, 0.0]), 0x0000_00ff);
        assert_eq!(pack_rgba8([0.0, 0.0, 0.0, 1.0]), 0xff00_0000);
        let c = unpack_rgba8(pack_rgba8([0.25, 0.5, 0.75, 1.0]));
        assert!((c[0] - 0.25).abs() < 1.0 / 255.0);
        assert!((c[2] - 0.75).abs() < 1.0 / 255.0);
    }

    #[test]
    fn depth_bits_are_monotonic() {
        let depths = [0.0, 0.1, 0.25, 0.5, 0.999, 1.0];
        for pair in depths.windows(2) {
            assert!(depth_bits(pair[0]) < depth_bits(pair[1]));
        }
        assert_eq!(depth_from_bits(depth_bits(0.5)), 0.5);
    }

    #[test]
    fn capacity_is_never_exceeded_and_other_pixels_survive() {
        // 2x2 pixels, one layer each: pool of 4 nodes.
        let mut lists = FragmentLists::new(2, 2, 1);
        assert_eq!(lists.capacity(), 4);

        lists.insert(1, 1, [0.0, 1.0, 0.0, 0.5], 0.3, FULL).unwrap();
        // Flood pixel (0,0) far past capacity.
        for i in 0..10 {
            let _ = lists.insert(0, 0, [1.0, 0.0, 0.0, 0.5], 0.1 + 0.01 * i as f32, FULL);
        }
        assert_eq!(lists.allocated(), lists.capacity());

        // The overflow fragments were dropped newest-first; the earlier
        // pixel's chain is untouched.
        let survivor = lists.collect(1, 1, 8);
        assert_eq!(survivor.len(), 1);
        assert_eq!(survivor[0].depth, depth_bits(0.3));
        // (0,0) got the remaining three slots.
        assert_eq!(lists.chain_indices(0, 0, 32).len(), 3);
    }

    #[test]
    fn chains_terminate_and_are_disjoint() {
        let mut lists = FragmentLists::new(4, 4, 4);
        for y in 0..4 {
            for x in 0..4 {
                for layer in 0..3 {
                    lists.insert(x, y, [0.5; 4], 0.2 + 0.1 * layer as f32, FULL).unwrap();
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for y in 0..4 {
            for x in 0..4 {
                // Budget one past the inserted count: a cycle would yield 4.
                let indices = lists.chain_indices(x, y, 4);
                assert_eq!(indices.len(), 3);
                for index in indices {
                    assert!(seen.insert(index), "node {index} shared between pixels");
                }
            }
        }
    }

    #[test]
    fn resolve_matches_analytic_back_to_front_blend() {
        let mut lists = FragmentLists::new(1, 1, 8);
        // Inserted in scrambled depth order; resolve must sort.
        lists.insert(0, 0, [0.0, 0.0, 1.0, 0.5], 0.6, FULL).unwrap();
        lists.insert(0, 0, [1.0, 0.0, 0.0, 0.25], 0.2, FULL).unwrap();
        lists.insert(0, 0, [0.0, 1.0, 0.0, 0.5], 0.4, FULL).unwrap();

        let backdrop = [0.1, 0.1, 0.1];
        // Farthest to nearest: blue(0.5) at 0.6, green(0.5) at 0.4, red(0.25) at 0.2.
        let mut expected = backdrop;
        for (rgb, a) in [
            ([0.0, 0.0, 1.0], 0.5),
            ([0.0, 1.0, 0.0], 0.5),
            ([1.0, 0.0, 0.0], 0.25),
        ] {
            for ch in 0..3 {
                expected[ch] = expected[ch] * (1.0 - a) + rgb[ch] * a;
            }
        }
        let resolved = lists.resolve_pixel(0, 0, backdrop, 32, 4);
        assert_rgb_close(resolved, expected);
    }

    #[test]
    fn reset_isolates_frames() {
        let mut lists = FragmentLists::new(2, 2, 2);
        for y in 0..2 {
            for x in 0..2 {
                lists.insert(x, y, [1.0, 1.0, 1.0, 1.0], 0.5, FULL).unwrap();
            }
        }
        lists.reset();

        let backdrop = [0.3, 0.2, 0.1];
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(lists.head(x, y), SENTINEL);
                assert_rgb_close(lists.resolve_pixel(x, y, backdrop, 32, 4), backdrop);
            }
        }
        // The stale node payloads are unreachable, which is all the clear
        // guarantees; the pool itself is not zeroed.
        assert_eq!(lists.allocated(), 0);
    }

    #[test]
    fn coverage_mask_limits_compositing_to_covered_samples() {
        let mut lists = FragmentLists::new(1, 1, 4);
        // White fragment covering only sub-samples 0 and 1 of four.
        lists.insert(0, 0, [1.0, 1.0, 1.0, 1.0], 0.5, 0b0011).unwrap();

        let backdrop = [0.0, 0.0, 0.0];
        // Two samples fully white, two keep the backdrop.
        let resolved = lists.resolve_pixel(0, 0, backdrop, 32, 4);
        assert_rgb_close(resolved, [0.5, 0.5, 0.5]);

        // A mask that misses every sample leaves the pixel untouched.
        lists.reset();
        lists.insert(0, 0, [1.0, 1.0, 1.0, 1.0], 0.5, 0).unwrap();
        assert_rgb_close(lists.resolve_pixel(0, 0, backdrop, 32, 4), backdrop);
    }

    #[test]
    fn occluded_samples_never_reach_the_lists() {
        // Opaque geometry at 0.4 covers sub-samples 0 and 1; the far plane
        // covers the rest.
        let opaque = [0.4, 0.4, 1.0, 1.0];
        assert_eq!(visible_coverage(FULL, 0.6, &opaque), 0b1100);
        assert_eq!(visible_coverage(FULL, 0.2, &opaque), FULL);
        // Ties lose to the opaque surface, matching compare Less.
        assert_eq!(visible_coverage(FULL, 0.4, &opaque), 0b1100);

        // A fragment behind opaque geometry on every sample allocates no
        // node and cannot tint the pixel.
        let mut lists = FragmentLists::new(1, 1, 4);
        let mask = visible_coverage(FULL, 0.6, &[0.4; 4]);
        assert_eq!(mask, 0);
        if mask != 0 {
            lists.insert(0, 0, [1.0, 0.0, 0.0, 0.9], 0.6, mask).unwrap();
        }
        let backdrop = [0.3, 0.3, 0.3];
        assert_rgb_close(lists.resolve_pixel(0, 0, backdrop, 32, 4), backdrop);
        assert_eq!(lists.allocated(), 0);
    }

    #[test]
    fn traversal_budget_keeps_newest_inserted() {
        let mut lists = FragmentLists::new(1, 1, 8);
        // Oldest insert is opaque black; if the budget of two drops it, the
        // result must ignore it entirely.
        lists.insert(0, 0, [0.0, 0.0, 0.0, 1.0], 0.9, FULL).unwrap();
        lists.insert(0, 0, [1.0, 0.0, 0.0, 0.5], 0.5, FULL).unwrap();
        lists.insert(0, 0, [0.0, 1.0, 0.0, 0.5], 0.3, FULL).unwrap();

        let backdrop = [1.0, 1.0, 1.0];
        let mut expected = backdrop;
        for (rgb, a) in [([1.0, 0.0, 0.0], 0.5), ([0.0, 1.0, 0.0], 0.5)] {
            for ch in 0..3 {
                expected[ch] = expected[ch] * (1.0 - a) + rgb[ch] * a;
            }
        }
        assert_rgb_close(lists.resolve_pixel(0, 0, backdrop, 2, 4), expected);

        // With the full budget the opaque backdrop fragment dominates.
        let full = lists.resolve_pixel(0, 0, backdrop, 32, 4);
        assert!(full[2] < expected[2]);
    }
}
