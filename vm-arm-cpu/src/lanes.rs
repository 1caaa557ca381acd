//! 向量通道原语
//!
//! NEON 与 MVE 共用。每个操作是一个对 [`Lane`] 泛型的函数，元素宽度与
//! 符号性由类型参数决定；回绕、饱和与舍入作为参数传入。向量以小端字节
//! 序列表示，第 i 个元素占据 `[i * BYTES, (i + 1) * BYTES)`。

use std::fmt::Debug;

use num_traits::{PrimInt, WrappingAdd, WrappingMul, WrappingSub};

pub trait Lane: PrimInt + WrappingAdd + WrappingSub + WrappingMul + Debug + 'static {
    const BYTES: usize;
    const SIGNED: bool;

    /// 截断取低位
    fn from_bits(v: u64) -> Self;
    /// 零扩展的原始位
    fn to_bits(self) -> u64;

    fn widen(self) -> i128;

    fn wrap_from(v: i128) -> Self {
        Self::from_bits(v as u64)
    }

    fn min_i128() -> i128;
    fn max_i128() -> i128;

    const BITS: u32 = (Self::BYTES * 8) as u32;
}

macro_rules! impl_lane {
    ($($t:ty, $u:ty, $signed:expr);*) => {$(
        impl Lane for $t {
            const BYTES: usize = std::mem::size_of::<$t>();
            const SIGNED: bool = $signed;

            fn from_bits(v: u64) -> Self {
                v as $u as $t
            }

            fn to_bits(self) -> u64 {
                self as $u as u64
            }

            fn widen(self) -> i128 {
                self as i128
            }

            fn min_i128() -> i128 {
                <$t>::MIN as i128
            }

            fn max_i128() -> i128 {
                <$t>::MAX as i128
            }
        }
    )*};
}

impl_lane!(i8, u8, true; u8, u8, false; i16, u16, true; u16, u16, false;
           i32, u32, true; u32, u32, false; i64, u64, true; u64, u64, false);

pub fn get<L: Lane>(v: &[u8], i: usize) -> L {
    let off = i * L::BYTES;
    let raw = v[off..off + L::BYTES]
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    L::from_bits(raw)
}

pub fn set<L: Lane>(v: &mut [u8], i: usize, x: L) {
    let off = i * L::BYTES;
    let raw = x.to_bits();
    for (b, byte) in v[off..off + L::BYTES].iter_mut().enumerate() {
        *byte = (raw >> (8 * b)) as u8;
    }
}

pub fn count<L: Lane>(v: &[u8]) -> usize {
    v.len() / L::BYTES
}

/// 把 i128 结果钳位到元素范围，返回是否饱和
pub fn saturate<L: Lane>(v: i128) -> (L, bool) {
    if v < L::min_i128() {
        (L::wrap_from(L::min_i128()), true)
    } else if v > L::max_i128() {
        (L::wrap_from(L::max_i128()), true)
    } else {
        (L::wrap_from(v), false)
    }
}

pub fn sat_add<L: Lane>(a: L, b: L) -> (L, bool) {
    saturate(a.widen() + b.widen())
}

pub fn sat_sub<L: Lane>(a: L, b: L) -> (L, bool) {
    saturate(a.widen() - b.widen())
}

/// (a + b) >> 1，`round` 时先加 1
pub fn halving_add<L: Lane>(a: L, b: L, round: bool) -> L {
    L::wrap_from((a.widen() + b.widen() + i128::from(round)) >> 1)
}

pub fn halving_sub<L: Lane>(a: L, b: L) -> L {
    L::wrap_from((a.widen() - b.widen()) >> 1)
}

pub fn abs_diff<L: Lane>(a: L, b: L) -> L {
    L::wrap_from((a.widen() - b.widen()).abs())
}

pub fn sat_abs<L: Lane>(a: L) -> (L, bool) {
    saturate(a.widen().abs())
}

pub fn sat_neg<L: Lane>(a: L) -> (L, bool) {
    saturate(-a.widen())
}

/// 按有符号移位量移位 (正数左移，负数右移)
///
/// `round` 对右移结果舍入；`sat` 对左移溢出饱和。返回 (结果, 是否饱和)。
pub fn shift_by<L: Lane>(a: L, amount: i32, round: bool, sat: bool) -> (L, bool) {
    let bits = L::BITS as i32;
    let x = a.widen();
    if amount >= 0 {
        if x == 0 {
            return (L::zero(), false);
        }
        if amount >= bits {
            if sat {
                return (L::wrap_from(if x < 0 { L::min_i128() } else { L::max_i128() }), true);
            }
            return (L::zero(), false);
        }
        let shifted = x << amount;
        if sat {
            saturate(shifted)
        } else {
            (L::wrap_from(shifted), false)
        }
    } else {
        let n = -amount;
        if n > bits {
            return (L::wrap_from(if x < 0 && !round { -1 } else { 0 }), false);
        }
        let r = if round { (x + (1i128 << (n - 1))) >> n } else { x >> n };
        (L::wrap_from(r), false)
    }
}

/// 无符号饱和左移有符号输入 (VQSHLU)
pub fn sat_shl_unsigned<L: Lane>(a: L, amount: u32) -> (L, bool) {
    let x = a.widen();
    if x < 0 {
        return (L::zero(), true);
    }
    let max = (1i128 << L::BITS) - 1;
    let v = x << amount;
    if v > max { (L::from_bits(max as u64), true) } else { (L::wrap_from(v), false) }
}

/// 饱和加倍乘高半 (VQDMULH / VQRDMULH)
pub fn sat_doubling_mul_high<L: Lane>(a: L, b: L, round: bool) -> (L, bool) {
    let bits = L::BITS;
    let p = 2 * a.widen() * b.widen() + if round { 1i128 << (bits - 1) } else { 0 };
    saturate(p >> bits)
}

/// 计数前导符号位 (不含符号位本身)
pub fn cls<L: Lane>(a: L) -> L {
    let x = if a.widen() < 0 { !a } else { a };
    L::wrap_from(i128::from(x.leading_zeros()) - 1)
}

pub fn clz<L: Lane>(a: L) -> L {
    L::wrap_from(i128::from(a.leading_zeros()))
}

pub fn popcount<L: Lane>(a: L) -> L {
    L::wrap_from(i128::from(a.count_ones()))
}

/// 多项式乘法 (GF(2)，截断到元素宽度)
pub fn poly_mul<L: Lane>(a: L, b: L) -> L {
    let (a, b) = (a.to_bits(), b.to_bits());
    let mut r = 0u64;
    for i in 0..L::BITS {
        if (b >> i) & 1 != 0 {
            r ^= a << i;
        }
    }
    L::from_bits(r)
}

/// 移位插入的目的掩码；移位量超出 ±63 时掩码为 0
pub fn insert_mask(esize: u32, shift: i32) -> u64 {
    let full = if esize >= 64 { u64::MAX } else { (1u64 << esize) - 1 };
    if shift.unsigned_abs() > 63 {
        return 0;
    }
    let m = if shift >= 0 { full << shift } else { full >> (-shift) };
    m & full
}

/// 逐元素二元运算
pub fn map2<L: Lane>(d: &mut [u8], a: &[u8], b: &[u8], mut f: impl FnMut(L, L) -> L) {
    for i in 0..count::<L>(d) {
        let r = f(get(a, i), get(b, i));
        set(d, i, r);
    }
}

pub fn map1<L: Lane>(d: &mut [u8], a: &[u8], mut f: impl FnMut(L) -> L) {
    for i in 0..count::<L>(d) {
        let r = f(get(a, i));
        set(d, i, r);
    }
}

/// 相邻元素对运算 (VPADD/VPMAX/VPMIN)，结果前半取自 a，后半取自 b
pub fn pairwise<L: Lane>(d: &mut [u8], a: &[u8], b: &[u8], mut f: impl FnMut(L, L) -> L) {
    let n = count::<L>(d);
    let half = n / 2;
    let mut out = vec![0u8; d.len()];
    for i in 0..half {
        set(&mut out, i, f(get(a, 2 * i), get(a, 2 * i + 1)));
        set(&mut out, half + i, f(get(b, 2 * i), get(b, 2 * i + 1)));
    }
    d.copy_from_slice(&out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_get_set_little_endian() {
        let mut v = [0u8; 8];
        set::<u16>(&mut v, 1, 0xbeef);
        assert_eq!(v[2..4], [0xef, 0xbe]);
        assert_eq!(get::<i16>(&v, 1), 0xbeefu16 as i16);
    }

    #[test]
    fn test_saturating_ops() {
        assert_eq!(sat_add::<i8>(100, 100), (127, true));
        assert_eq!(sat_sub::<u8>(3, 5), (0, true));
        assert_eq!(sat_add::<u16>(1, 2), (3, false));
        assert_eq!(sat_neg::<i8>(-128), (127, true));
        assert_eq!(sat_doubling_mul_high::<i16>(i16::MIN, i16::MIN, false), (i16::MAX, true));
    }

    #[test]
    fn test_shift_by_register() {
        assert_eq!(shift_by::<u8>(0x81, 1, false, false), (0x02, false));
        assert_eq!(shift_by::<u8>(0x81, 1, false, true), (0xff, true));
        assert_eq!(shift_by::<i8>(-8, -2, false, false), (-2, false));
        assert_eq!(shift_by::<u8>(3, -1, true, false), (2, false));
        assert_eq!(shift_by::<i8>(-1, -9, false, false), (-1, false));
        assert_eq!(shift_by::<u32>(1, 32, false, false), (0, false));
    }

    #[test]
    fn test_count_ops() {
        assert_eq!(cls::<i8>(-1), 7);
        assert_eq!(cls::<i8>(1), 6);
        assert_eq!(clz::<u16>(1), 15);
        assert_eq!(popcount::<u8>(0xf1), 5);
        assert_eq!(poly_mul::<u8>(0x03, 0x03), 0x05);
    }

    #[test]
    fn test_insert_mask_bounds() {
        assert_eq!(insert_mask(8, 3), 0xf8);
        assert_eq!(insert_mask(8, -3), 0x1f);
        assert_eq!(insert_mask(8, 8), 0);
        assert_eq!(insert_mask(64, 64), 0);
        assert_eq!(insert_mask(64, -64), 0);
        assert_eq!(insert_mask(32, 63), 0);
    }

    #[test]
    fn test_pairwise() {
        let a = [1u8, 2, 3, 4];
        let b = [10u8, 20, 30, 40];
        let mut d = [0u8; 4];
        pairwise::<u8>(&mut d, &a, &b, |x, y| x.wrapping_add(y));
        assert_eq!(d, [3, 7, 30, 70]);
    }

    proptest! {
        #[test]
        fn prop_halving_add_matches_wide(a in any::<i16>(), b in any::<i16>()) {
            let expect = ((i32::from(a) + i32::from(b)) >> 1) as i16;
            prop_assert_eq!(halving_add(a, b, false), expect);
        }

        #[test]
        fn prop_sat_add_u32(a in any::<u32>(), b in any::<u32>()) {
            let (r, sat) = sat_add(a, b);
            prop_assert_eq!(r, a.saturating_add(b));
            prop_assert_eq!(sat, a.checked_add(b).is_none());
        }
    }
}
