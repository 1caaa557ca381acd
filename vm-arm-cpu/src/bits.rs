//! 位域与条件原语
//!
//! 条件码求值、桶形移位器（含进位输出）、带进位加法、饱和运算、
//! 立即数展开以及 ARMv6 SIMD32 并行加减。全部是纯函数，翻译器与运行时
//! 辅助函数共用。

use serde::{Deserialize, Serialize};
use vm_core::{ExecutionError, VmError};

#[inline]
pub const fn bit(v: u32, n: u32) -> bool {
    (v >> n) & 1 != 0
}

/// 提取 `v[hi:lo]`
#[inline]
pub const fn bits(v: u32, hi: u32, lo: u32) -> u32 {
    (v >> lo) & (u32::MAX >> (31 - (hi - lo)))
}

#[inline]
pub const fn sign_extend(v: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((v << shift) as i32) >> shift
}

/// ARM 条件码
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Cond {
    Eq = 0,
    Ne = 1,
    Cs = 2,
    Cc = 3,
    Mi = 4,
    Pl = 5,
    Vs = 6,
    Vc = 7,
    Hi = 8,
    Ls = 9,
    Ge = 10,
    Lt = 11,
    Gt = 12,
    Le = 13,
    Al = 14,
    Nv = 15,
}

impl Cond {
    const ALL: [Cond; 16] = [
        Cond::Eq,
        Cond::Ne,
        Cond::Cs,
        Cond::Cc,
        Cond::Mi,
        Cond::Pl,
        Cond::Vs,
        Cond::Vc,
        Cond::Hi,
        Cond::Ls,
        Cond::Ge,
        Cond::Lt,
        Cond::Gt,
        Cond::Le,
        Cond::Al,
        Cond::Nv,
    ];

    pub fn from_bits(code: u32) -> Result<Cond, VmError> {
        Cond::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| ExecutionError::InvalidCondition { code }.into())
    }

    /// 取 4 位编码（调用方保证 `code <= 15`）
    pub fn from_nibble(code: u32) -> Cond {
        Cond::ALL[(code & 0xf) as usize]
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    /// 逻辑取反，AL/NV 互换
    pub fn invert(self) -> Cond {
        Cond::from_nibble(self.bits() ^ 1)
    }

    pub fn passed(self, f: Nzcv) -> bool {
        let base = match self.bits() >> 1 {
            0 => f.z,
            1 => f.c,
            2 => f.n,
            3 => f.v,
            4 => f.c && !f.z,
            5 => f.n == f.v,
            6 => !f.z && f.n == f.v,
            _ => return self == Cond::Al,
        };
        if self.bits() & 1 == 1 { !base } else { base }
    }

    pub fn mnemonic(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "eq", "ne", "cs", "cc", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le", "", "nv",
        ];
        NAMES[self as usize]
    }
}

/// 条件标志
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nzcv {
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
}

impl Nzcv {
    /// 从 PSR 的 [31:28] 取标志
    pub fn from_psr(psr: u32) -> Self {
        Self {
            n: bit(psr, 31),
            z: bit(psr, 30),
            c: bit(psr, 29),
            v: bit(psr, 28),
        }
    }

    pub fn to_psr(self) -> u32 {
        (u32::from(self.n) << 31) | (u32::from(self.z) << 30) | (u32::from(self.c) << 29) | (u32::from(self.v) << 28)
    }

    pub fn from_result(result: u32, c: bool, v: bool) -> Self {
        Self {
            n: bit(result, 31),
            z: result == 0,
            c,
            v,
        }
    }
}

/// 条件码求值；NV 恒假，AL 恒真，越界编码为致命解码错误
pub fn evaluate_condition_code(code: u32, flags: Nzcv) -> Result<bool, VmError> {
    Ok(Cond::from_bits(code)?.passed(flags))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftType {
    Lsl,
    Lsr,
    Asr,
    Ror,
    Rrx,
}

impl ShiftType {
    pub fn from_bits(ty: u32) -> ShiftType {
        match ty & 3 {
            0 => ShiftType::Lsl,
            1 => ShiftType::Lsr,
            2 => ShiftType::Asr,
            _ => ShiftType::Ror,
        }
    }
}

/// 立即数移位编码：LSR/ASR #0 表示 #32，ROR #0 表示 RRX
pub fn decode_imm_shift(ty: u32, imm5: u32) -> (ShiftType, u32) {
    match ShiftType::from_bits(ty) {
        ShiftType::Lsl => (ShiftType::Lsl, imm5),
        ShiftType::Lsr => (ShiftType::Lsr, if imm5 == 0 { 32 } else { imm5 }),
        ShiftType::Asr => (ShiftType::Asr, if imm5 == 0 { 32 } else { imm5 }),
        _ if imm5 == 0 => (ShiftType::Rrx, 1),
        _ => (ShiftType::Ror, imm5),
    }
}

/// 带进位输出的移位
///
/// `amount` 是架构上的移位量（寄存器形式为 Rs[7:0]），不做 5 位截断。
/// 移位量为 0 时值与进位都不变。
pub fn shift_c(value: u32, ty: ShiftType, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 {
        return (value, carry_in);
    }
    match ty {
        ShiftType::Lsl => match amount {
            1..=31 => (value << amount, bit(value, 32 - amount)),
            32 => (0, bit(value, 0)),
            _ => (0, false),
        },
        ShiftType::Lsr => match amount {
            1..=31 => (value >> amount, bit(value, amount - 1)),
            32 => (0, bit(value, 31)),
            _ => (0, false),
        },
        ShiftType::Asr => match amount {
            1..=31 => (((value as i32) >> amount) as u32, bit(value, amount - 1)),
            _ => (((value as i32) >> 31) as u32, bit(value, 31)),
        },
        ShiftType::Ror => {
            let result = value.rotate_right(amount & 31);
            (result, bit(result, 31))
        }
        ShiftType::Rrx => rrx_c(value, carry_in),
    }
}

pub fn shift(value: u32, ty: ShiftType, amount: u32, carry_in: bool) -> u32 {
    shift_c(value, ty, amount, carry_in).0
}

pub fn rrx_c(value: u32, carry_in: bool) -> (u32, bool) {
    ((u32::from(carry_in) << 31) | (value >> 1), bit(value, 0))
}

/// 寄存器指定移位量，只使用 Rs[7:0]
pub fn shift_reg_c(value: u32, ty: ShiftType, rs: u32, carry_in: bool) -> (u32, bool) {
    shift_c(value, ty, rs & 0xff, carry_in)
}

/// AddWithCarry，返回结果和全部四个标志
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, Nzcv) {
    let unsigned_sum = u64::from(a) + u64::from(b) + u64::from(carry_in);
    let signed_sum = i64::from(a as i32) + i64::from(b as i32) + i64::from(carry_in);
    let result = unsigned_sum as u32;
    let c = u64::from(result) != unsigned_sum;
    let v = i64::from(result as i32) != signed_sum;
    (result, Nzcv::from_result(result, c, v))
}

/// A32 修改立即数：imm8 循环右移 2*rotate
pub fn arm_expand_imm_c(imm12: u32, carry_in: bool) -> (u32, bool) {
    let rot = bits(imm12, 11, 8) * 2;
    let value = (imm12 & 0xff).rotate_right(rot);
    if rot == 0 { (value, carry_in) } else { (value, bit(value, 31)) }
}

/// T32 修改立即数；重复模式中 imm8 为 0 属于 UNPREDICTABLE，返回 `None`
pub fn thumb_expand_imm_c(imm12: u32, carry_in: bool) -> Option<(u32, bool)> {
    let imm8 = imm12 & 0xff;
    if bits(imm12, 11, 10) == 0 {
        let value = match bits(imm12, 9, 8) {
            0 => imm8,
            1 => (imm8 << 16) | imm8,
            2 => (imm8 << 24) | (imm8 << 8),
            _ => imm8 * 0x0101_0101,
        };
        if imm8 == 0 && bits(imm12, 9, 8) != 0 {
            return None;
        }
        Some((value, carry_in))
    } else {
        let value = (0x80 | (imm12 & 0x7f)).rotate_right(bits(imm12, 11, 7));
        Some((value, bit(value, 31)))
    }
}

/// 有符号饱和到 `n` 位，返回 (结果, 是否饱和)
pub fn signed_sat_q(value: i64, n: u32) -> (i32, bool) {
    let max = (1i64 << (n - 1)) - 1;
    let min = -(1i64 << (n - 1));
    if value > max {
        (max as i32, true)
    } else if value < min {
        (min as i32, true)
    } else {
        (value as i32, false)
    }
}

/// 无符号饱和到 `n` 位（`n` 可为 0）
pub fn unsigned_sat_q(value: i64, n: u32) -> (u32, bool) {
    let max = (1i64 << n) - 1;
    if value > max {
        (max as u32, true)
    } else if value < 0 {
        (0, true)
    } else {
        (value as u32, false)
    }
}

pub fn sat_add_i32(a: i32, b: i32) -> (i32, bool) {
    signed_sat_q(i64::from(a) + i64::from(b), 32)
}

pub fn sat_sub_i32(a: i32, b: i32) -> (i32, bool) {
    signed_sat_q(i64::from(a) - i64::from(b), 32)
}

pub fn rev16(v: u32) -> u32 {
    ((v & 0x00ff_00ff) << 8) | ((v >> 8) & 0x00ff_00ff)
}

/// REVSH：低半字字节交换后符号扩展
pub fn revsh(v: u32) -> u32 {
    i32::from((v as u16).swap_bytes() as i16) as u32
}

/// ARMv6 SIMD32 并行加减操作
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParOp {
    Add16,
    Asx,
    Sax,
    Sub16,
    Add8,
    Sub8,
}

impl ParOp {
    /// A32 op2 / T32 op 字段
    pub fn from_a32(op2: u32) -> Option<ParOp> {
        match op2 {
            0 => Some(ParOp::Add16),
            1 => Some(ParOp::Asx),
            2 => Some(ParOp::Sax),
            3 => Some(ParOp::Sub16),
            4 => Some(ParOp::Add8),
            7 => Some(ParOp::Sub8),
            _ => None,
        }
    }
}

/// 并行运算的数值类型前缀 (S/Q/SH/U/UQ/UH)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParKind {
    Signed,
    SignedSat,
    SignedHalving,
    Unsigned,
    UnsignedSat,
    UnsignedHalving,
}

impl ParKind {
    fn signed(self) -> bool {
        matches!(self, ParKind::Signed | ParKind::SignedSat | ParKind::SignedHalving)
    }

    pub fn sets_ge(self) -> bool {
        matches!(self, ParKind::Signed | ParKind::Unsigned)
    }
}

/// 执行一次并行加减，返回 (结果, GE 位)；只有 S/U 前缀会更新 GE
pub fn parallel_add_sub(op: ParOp, kind: ParKind, a: u32, b: u32) -> (u32, u8) {
    let (lanes, width) = match op {
        ParOp::Add8 | ParOp::Sub8 => (4u32, 8u32),
        _ => (2, 16),
    };
    let mask = (1u32 << width) - 1;
    let lane = |v: u32, i: u32| -> i64 {
        let raw = (v >> (i * width)) & mask;
        if kind.signed() {
            i64::from(sign_extend(raw, width))
        } else {
            i64::from(raw)
        }
    };
    let mut result = 0u32;
    let mut ge = 0u8;
    for i in 0..lanes {
        let (x, y, sub) = match op {
            ParOp::Add16 | ParOp::Add8 => (lane(a, i), lane(b, i), false),
            ParOp::Sub16 | ParOp::Sub8 => (lane(a, i), lane(b, i), true),
            ParOp::Asx => (lane(a, i), lane(b, 1 - i), i == 0),
            ParOp::Sax => (lane(a, i), lane(b, 1 - i), i == 1),
        };
        let wide = if sub { x - y } else { x + y };
        let value = match kind {
            ParKind::Signed | ParKind::Unsigned => wide,
            ParKind::SignedSat => i64::from(signed_sat_q(wide, width).0),
            ParKind::UnsignedSat => i64::from(unsigned_sat_q(wide, width).0),
            ParKind::SignedHalving | ParKind::UnsignedHalving => wide >> 1,
        };
        let lane_ge = match kind {
            ParKind::Signed => wide >= 0,
            ParKind::Unsigned if sub => wide >= 0,
            ParKind::Unsigned => wide >= i64::from(mask) + 1,
            _ => false,
        };
        result |= ((value as u32) & mask) << (i * width);
        if lane_ge {
            let ge_bits = if width == 16 { 0b11u8 << (i * 2) } else { 1u8 << i };
            ge |= ge_bits;
        }
    }
    (result, ge)
}

/// SEL：按 GE 位逐字节选择
pub fn select_bytes(ge: u8, a: u32, b: u32) -> u32 {
    (0..4).fold(0u32, |acc, i| {
        let src = if ge & (1 << i) != 0 { a } else { b };
        acc | (src & (0xff << (i * 8)))
    })
}

/// USAD8 绝对差之和
pub fn usad8(a: u32, b: u32) -> u32 {
    (0..4)
        .map(|i| {
            let x = (a >> (i * 8)) & 0xff;
            let y = (b >> (i * 8)) & 0xff;
            x.abs_diff(y)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn truth(code: u32, f: Nzcv) -> bool {
        let (n, z, c, v) = (f.n, f.z, f.c, f.v);
        match code {
            0 => z,
            1 => !z,
            2 => c,
            3 => !c,
            4 => n,
            5 => !n,
            6 => v,
            7 => !v,
            8 => c && !z,
            9 => !c || z,
            10 => n == v,
            11 => n != v,
            12 => !z && n == v,
            13 => z || n != v,
            14 => true,
            _ => false,
        }
    }

    #[test]
    fn test_condition_truth_table() {
        for code in 0..16 {
            for nzcv in 0..16u32 {
                let flags = Nzcv::from_psr(nzcv << 28);
                assert_eq!(
                    evaluate_condition_code(code, flags).unwrap(),
                    truth(code, flags),
                    "cond {code} flags {nzcv:04b}"
                );
            }
        }
    }

    #[test]
    fn test_condition_out_of_range() {
        let err = evaluate_condition_code(16, Nzcv::default()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_shift_boundaries() {
        let v = 0x8000_0001;
        assert_eq!(shift_c(v, ShiftType::Lsl, 32, false), (0, true));
        assert_eq!(shift_c(v, ShiftType::Lsl, 33, true), (0, false));
        assert_eq!(shift_c(v, ShiftType::Lsr, 32, false), (0, true));
        assert_eq!(shift_c(v, ShiftType::Lsr, 33, true), (0, false));
        assert_eq!(shift_c(v, ShiftType::Asr, 32, false), (0xffff_ffff, true));
        assert_eq!(shift_c(v, ShiftType::Asr, 200, false), (0xffff_ffff, true));
        assert_eq!(shift_c(0x7fff_ffff, ShiftType::Asr, 40, true), (0, false));
        assert_eq!(shift_c(v, ShiftType::Ror, 32, false), (v, true));
        assert_eq!(shift_c(v, ShiftType::Ror, 0, false), (v, false));
    }

    #[test]
    fn test_register_shift_uses_low_byte() {
        // Rs = 0x101: amount 1, not 257
        assert_eq!(shift_reg_c(0x4, ShiftType::Lsr, 0x101, false), (0x2, false));
    }

    #[test]
    fn test_imm_shift_decoding() {
        assert_eq!(decode_imm_shift(1, 0), (ShiftType::Lsr, 32));
        assert_eq!(decode_imm_shift(2, 0), (ShiftType::Asr, 32));
        assert_eq!(decode_imm_shift(3, 0), (ShiftType::Rrx, 1));
        assert_eq!(decode_imm_shift(0, 0), (ShiftType::Lsl, 0));
        assert_eq!(shift_c(0x3, ShiftType::Rrx, 1, true), (0x8000_0001, true));
    }

    #[test]
    fn test_add_with_carry_flags() {
        let (r, f) = add_with_carry(0xffff_ffff, 2, false);
        assert_eq!(r, 1);
        assert_eq!(f, Nzcv { n: false, z: false, c: true, v: false });
        let (r, f) = add_with_carry(0x7fff_ffff, 1, false);
        assert_eq!(r, 0x8000_0000);
        assert!(f.n && f.v && !f.c);
        // SUBS 5 - 5 == AddWithCarry(5, !5, 1)
        let (r, f) = add_with_carry(5, !5, true);
        assert_eq!(r, 0);
        assert!(f.z && f.c);
    }

    #[test]
    fn test_expand_imm() {
        assert_eq!(arm_expand_imm_c(0x4ff, false), (0xff00_0000, true));
        assert_eq!(arm_expand_imm_c(0x0ff, true), (0xff, true));
        assert_eq!(thumb_expand_imm_c(0x1ab, false), Some((0x00ab_00ab, false)));
        assert_eq!(thumb_expand_imm_c(0x3ab, false), Some((0xabab_abab, false)));
        assert_eq!(thumb_expand_imm_c(0x100, false), None);
        assert_eq!(thumb_expand_imm_c(0x4ff, false), Some((0x7f80_0000, false)));
    }

    #[test]
    fn test_saturation() {
        assert_eq!(signed_sat_q(200, 8), (127, true));
        assert_eq!(signed_sat_q(-200, 8), (-128, true));
        assert_eq!(unsigned_sat_q(-1, 8), (0, true));
        assert_eq!(unsigned_sat_q(17, 0), (0, true));
        assert_eq!(sat_add_i32(i32::MAX, 1), (i32::MAX, true));
    }

    #[test]
    fn test_parallel_add_sub() {
        assert_eq!(parallel_add_sub(ParOp::Add16, ParKind::Unsigned, 0xffff_0001, 0x0001_0001), (0x0000_0002, 0b1100));
        assert_eq!(parallel_add_sub(ParOp::Sub8, ParKind::Signed, 0x0102_0304, 0x0101_0505), (0x0001_feff, 0b1100));
        assert_eq!(parallel_add_sub(ParOp::Add8, ParKind::UnsignedSat, 0xff00_0000, 0x0200_0000).0, 0xff00_0000);
        assert_eq!(parallel_add_sub(ParOp::Add16, ParKind::SignedHalving, 0x0003_0005, 0x0001_0001).0, 0x0002_0003);
        // ASX: low = a.lo - b.hi, high = a.hi + b.lo
        assert_eq!(parallel_add_sub(ParOp::Asx, ParKind::Unsigned, 0x0010_0010, 0x0001_0002).0, 0x0012_000f);
        assert_eq!(select_bytes(0b0101, 0xaabb_ccdd, 0x1122_3344), 0x11bb_33dd);
        assert_eq!(usad8(0x0105_0a00, 0x0300_0a10), 2 + 5 + 0 + 16);
    }

    proptest! {
        #[test]
        fn prop_small_shifts_match_native(v in any::<u32>(), n in 1u32..32) {
            prop_assert_eq!(shift_c(v, ShiftType::Lsl, n, false).0, v << n);
            prop_assert_eq!(shift_c(v, ShiftType::Lsr, n, false).0, v >> n);
            prop_assert_eq!(shift_c(v, ShiftType::Asr, n, false).0, ((v as i32) >> n) as u32);
            prop_assert_eq!(shift_c(v, ShiftType::Ror, n, false).0, v.rotate_right(n));
        }

        #[test]
        fn prop_large_shifts_are_not_masked(v in any::<u32>(), n in 33u32..256, c in any::<bool>()) {
            prop_assert_eq!(shift_c(v, ShiftType::Lsl, n, c), (0, false));
            prop_assert_eq!(shift_c(v, ShiftType::Lsr, n, c), (0, false));
            let fill = if v >> 31 == 1 { u32::MAX } else { 0 };
            prop_assert_eq!(shift_c(v, ShiftType::Asr, n, c), (fill, v >> 31 == 1));
        }

        #[test]
        fn prop_add_with_carry_matches_wide_math(a in any::<u32>(), b in any::<u32>(), c in any::<bool>()) {
            let (r, f) = add_with_carry(a, b, c);
            let wide = u64::from(a) + u64::from(b) + u64::from(c);
            prop_assert_eq!(r, wide as u32);
            prop_assert_eq!(f.c, wide > u64::from(u32::MAX));
            prop_assert_eq!(f.z, r == 0);
        }
    }
}
