//! Four wide float lanes for structure-of-arrays data.

use glam::Vec4;

/// Number of items processed together by one SIMD operation.
pub const LANE_COUNT: usize = 4;

/// Rounds `count` up to a whole number of lanes.
pub fn align_to_lane_count(count: usize) -> usize {
    crate::util::math::round_up_pot(count, LANE_COUNT)
}

/// Value of a visibility flag for a visible item. Loads directly as a lane
/// mask.
pub const VISIBLE: u32 = u32::MAX;
/// Value of a visibility flag for a culled item.
pub const CULLED: u32 = 0;

/// Array of f32 values stored as groups of four lanes.
///
/// Item `i` lives in lane `i % 4` of group `i / 4`, so every group is a
/// 16 byte aligned SIMD load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneArray {
    groups: Vec<Vec4>,
}

impl LaneArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items the array can hold, always a multiple of [`LANE_COUNT`].
    pub fn len(&self) -> usize {
        self.groups.len() * LANE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Resizes the array to hold at least `items` values. New lanes are zero.
    pub fn resize(&mut self, items: usize) {
        self.groups
            .resize(crate::util::math::round_up_div(items, LANE_COUNT), Vec4::ZERO);
    }

    #[inline]
    pub fn get(&self, item: usize) -> f32 {
        self.groups[item / LANE_COUNT][item % LANE_COUNT]
    }

    #[inline]
    pub fn set(&mut self, item: usize, value: f32) {
        self.groups[item / LANE_COUNT][item % LANE_COUNT] = value;
    }

    /// Loads the group holding items `4 * group .. 4 * group + 4`.
    #[inline]
    pub fn group(&self, group: usize) -> Vec4 {
        self.groups[group]
    }

    /// Gathers four arbitrary items into one group.
    #[inline]
    pub fn gather(&self, items: [u32; LANE_COUNT]) -> Vec4 {
        Vec4::new(
            self.get(items[0] as usize),
            self.get(items[1] as usize),
            self.get(items[2] as usize),
            self.get(items[3] as usize),
        )
    }

    /// Copies the value of item `from` into item `to`.
    #[inline]
    pub fn copy_item(&mut self, from: usize, to: usize) {
        let value = self.get(from);
        self.set(to, value);
    }
}

/// Writes a lane mask, as returned by `bitmask()`, into four visibility flags.
#[inline]
pub fn store_mask(bitmask: u32, out: &mut [u32]) {
    for (lane, flag) in out.iter_mut().enumerate().take(LANE_COUNT) {
        *flag = if bitmask & (1 << lane) != 0 { VISIBLE } else { CULLED };
    }
}

#[cfg(test)]
mod test {
    use glam::Vec4;

    use super::{align_to_lane_count, store_mask, LaneArray, CULLED, VISIBLE};

    #[test]
    fn lane_addressing() {
        let mut array = LaneArray::new();
        array.resize(5);
        assert_eq!(array.len(), 8);
        for i in 0..8 {
            array.set(i, i as f32);
        }
        assert_eq!(array.group(1), Vec4::new(4.0, 5.0, 6.0, 7.0));
        assert_eq!(array.gather([7, 0, 3, 3]), Vec4::new(7.0, 0.0, 3.0, 3.0));
        array.copy_item(2, 6);
        assert_eq!(array.get(6), 2.0);
    }

    #[test]
    fn alignment() {
        assert_eq!(align_to_lane_count(0), 0);
        assert_eq!(align_to_lane_count(1), 4);
        assert_eq!(align_to_lane_count(257), 260);
    }

    #[test]
    fn mask_bits() {
        let mut flags = [7_u32; 4];
        store_mask(0b1010, &mut flags);
        assert_eq!(flags, [CULLED, VISIBLE, CULLED, VISIBLE]);
    }
}
