//! SIMD culling kernels. Every kernel handles four items per step.
//!
//! The box test follows the clip space approach of "Culling the Battlefield"
//! (DICE, GDC 2011): all eight corners are brought into clip space and a box
//! is culled if every corner is outside of the same plane.

use std::ops::BitAnd;

use glam::{Mat4, Vec4};

use crate::{
    culling::item_set::{BoxLanes, SphereLanes},
    util::{
        frustum::{SimdFrustum, SimdPlane},
        lanes::{store_mask, LANE_COUNT, VISIBLE},
    },
};

/// Sphere test for the groups `first_group..first_group + out.len() / 4`.
///
/// An item is visible if its signed distance to every plane is larger than
/// its negative radius.
pub fn cull_spheres(frustum: &SimdFrustum, spheres: &SphereLanes, first_group: usize, out: &mut [u32]) {
    debug_assert_eq!(out.len() % LANE_COUNT, 0);

    for (local, flags) in out.chunks_exact_mut(LANE_COUNT).enumerate() {
        let group = first_group + local;
        let x = spheres.x.group(group);
        let y = spheres.y.group(group);
        let z = spheres.z.group(group);
        let neg_radius = spheres.neg_radius.group(group);

        let [first, rest @ ..] = &frustum.planes;
        let distance = |plane: &SimdPlane| plane.x * x + plane.y * y + plane.z * z + plane.d;
        let inside = rest
            .iter()
            .fold(distance(first).cmpgt(neg_radius), |inside, plane| {
                inside & distance(plane).cmpgt(neg_radius)
            });

        store_mask(inside.bitmask(), flags);
    }
}

/// One row of a clip matrix applied to all eight corners of four boxes.
///
/// Corner `i` takes the max of axis `a` if bit `a` of `i` is set. Each axis
/// only ever contributes one of two products, so only six multiplies are
/// needed instead of eight full dot products.
#[inline]
fn transform_box_corners(row: [Vec4; 4], min: &[Vec4; 3], max: &[Vec4; 3]) -> [Vec4; 8] {
    let x = [row[0] * min[0], row[0] * max[0]];
    let y = [row[1] * min[1], row[1] * max[1]];
    let z = [row[2] * min[2] + row[3], row[2] * max[2] + row[3]];
    std::array::from_fn(|corner| x[corner & 1] + y[(corner >> 1) & 1] + z[corner >> 2])
}

#[inline]
fn all_corners<M: BitAnd<Output = M>>(test: impl Fn(usize) -> M) -> M {
    (1..8).fold(test(0), |acc, corner| acc & test(corner))
}

/// Box test for the items named by `indices`, whose length is a multiple of
/// four. Writes one flag per index into `out`.
///
/// Conservative: a box is only culled when it lies entirely outside of a
/// single plane.
pub fn cull_boxes(view_proj: &Mat4, boxes: &BoxLanes, indices: &[u32], out: &mut [u32]) {
    debug_assert_eq!(indices.len(), out.len());
    debug_assert_eq!(indices.len() % LANE_COUNT, 0);

    // vp[row][k], broadcast
    let vp_cols = view_proj.to_cols_array_2d();
    let vp: [[Vec4; 4]; 4] = std::array::from_fn(|row| std::array::from_fn(|k| Vec4::splat(vp_cols[k][row])));

    for (items, flags) in indices.chunks_exact(LANE_COUNT).zip(out.chunks_exact_mut(LANE_COUNT)) {
        let items = [items[0], items[1], items[2], items[3]];

        let world: [Vec4; 16] = std::array::from_fn(|element| boxes.world[element].gather(items));
        let min: [Vec4; 3] = std::array::from_fn(|axis| boxes.min[axis].gather(items));
        let max: [Vec4; 3] = std::array::from_fn(|axis| boxes.max[axis].gather(items));

        // clip = view_proj * world
        let clip = |row: usize, col: usize| {
            vp[row][0] * world[col * 4]
                + vp[row][1] * world[col * 4 + 1]
                + vp[row][2] * world[col * 4 + 2]
                + vp[row][3] * world[col * 4 + 3]
        };
        let [cx, cy, cz, cw]: [[Vec4; 8]; 4] = std::array::from_fn(|row| {
            let clip_row = [clip(row, 0), clip(row, 1), clip(row, 2), clip(row, 3)];
            transform_box_corners(clip_row, &min, &max)
        });

        let culled = all_corners(|i| cx[i].cmplt(-cw[i]))
            | all_corners(|i| cx[i].cmpgt(cw[i]))
            | all_corners(|i| cy[i].cmplt(-cw[i]))
            | all_corners(|i| cy[i].cmpgt(cw[i]))
            | all_corners(|i| cz[i].cmplt(Vec4::ZERO))
            | all_corners(|i| cz[i].cmpgt(cw[i]));

        store_mask(!culled.bitmask() & 0b1111, flags);
    }
}

/// Writes the position of every visible item into `indirection`, padded to
/// whole lanes by repeating the last survivor. Returns the survivor count.
pub fn compact_visible(flags: &[u32], indirection: &mut Vec<u32>) -> usize {
    profiling::scope!("compact_visible");

    indirection.clear();
    indirection.extend(
        flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag == VISIBLE)
            .map(|(idx, _)| idx as u32),
    );
    pad_indirection(indirection)
}

/// Compacts the first `count` entries of `indirection` in place, keeping the
/// entries whose positional flag is set. Items that are dropped get their flag
/// in `item_flags` cleared. Returns the survivor count.
pub fn compact_survivors(
    indirection: &mut Vec<u32>,
    count: usize,
    position_flags: &[u32],
    item_flags: &mut [u32],
) -> usize {
    profiling::scope!("compact_survivors");

    let mut kept = 0;
    for position in 0..count {
        let item = indirection[position];
        if position_flags[position] == VISIBLE {
            indirection[kept] = item;
            kept += 1;
        } else {
            item_flags[item as usize] = 0;
        }
    }
    indirection.truncate(kept);
    pad_indirection(indirection)
}

fn pad_indirection(indirection: &mut Vec<u32>) -> usize {
    let count = indirection.len();
    if let Some(&last) = indirection.last() {
        indirection.resize(crate::util::lanes::align_to_lane_count(count), last);
    }
    count
}
