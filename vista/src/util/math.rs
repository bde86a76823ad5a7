//! Math utilites.

use num_traits::PrimInt;

/// Rounds up `src` to the power of two `factor`.
pub fn round_up_pot<T: PrimInt>(src: T, factor: T) -> T {
    debug_assert_eq!(factor.count_ones(), 1); // .is_power_of_two()
    let minus1 = factor - T::one();
    (src + minus1) & !minus1
}

/// Rounds down `src` to the power of two `factor`.
pub fn round_down_pot<T: PrimInt>(src: T, factor: T) -> T {
    debug_assert_eq!(factor.count_ones(), 1);
    src & !(factor - T::one())
}

/// Performs integer division between a and b rounding up, instead of down
pub fn round_up_div<T: PrimInt>(a: T, b: T) -> T {
    (a + (b - T::one())) / b
}

#[cfg(test)]
mod test {
    use super::{round_down_pot, round_up_div, round_up_pot};

    #[test]
    fn rounding() {
        assert_eq!(round_up_pot(0_u32, 4), 0);
        assert_eq!(round_up_pot(5_u32, 4), 8);
        assert_eq!(round_up_pot(8_usize, 4), 8);
        assert_eq!(round_down_pot(7_u64, 4), 4);
        assert_eq!(round_up_div(257_usize, 4), 65);
        assert_eq!(round_up_div(256_usize, 4), 64);
    }
}
