//! 浮点运算原语
//!
//! 在宿主 IEEE 运算之上实现 ARM 的 FPSCR 契约：累积异常标志、默认 NaN、
//! 输入/输出清零、signalling NaN 静默化与操作数优先级、定向舍入。
//! 宿主按就近偶数舍入，定向舍入通过无误差变换求出舍入误差的符号后
//! 再调整一个 ulp。

use bitflags::bitflags;
use num_traits::Float;
use std::cmp::Ordering;
use std::fmt::Debug;

bitflags! {
    /// 浮点异常，位置与 FPSCR 累积位一致
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FpExc: u8 {
        const INVALID        = 1 << 0;
        const DIVBYZERO      = 1 << 1;
        const OVERFLOW       = 1 << 2;
        const UNDERFLOW      = 1 << 3;
        const INEXACT        = 1 << 4;
        const INPUT_DENORMAL = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundingMode {
    #[default]
    NearestEven,
    PlusInf,
    MinusInf,
    Zero,
}

impl RoundingMode {
    /// FPSCR.RMode 编码
    pub fn from_rmode(rmode: u32) -> Self {
        match rmode & 3 {
            0 => RoundingMode::NearestEven,
            1 => RoundingMode::PlusInf,
            2 => RoundingMode::MinusInf,
            _ => RoundingMode::Zero,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FloatStatus {
    pub flags: FpExc,
    pub rounding: RoundingMode,
    pub default_nan: bool,
    pub flush_to_zero: bool,
}

impl FloatStatus {
    /// NEON 使用的 "standard FPSCR"
    pub fn standard() -> Self {
        Self {
            flags: FpExc::empty(),
            rounding: RoundingMode::NearestEven,
            default_nan: true,
            flush_to_zero: true,
        }
    }

    pub fn raise(&mut self, exc: FpExc) {
        self.flags |= exc;
    }
}

/// IEEE 二进制格式
pub trait FpFormat: Float + Debug {
    const FRAC_BITS: u32;
    const EXP_BITS: u32;

    fn raw(self) -> u64;
    fn from_raw(raw: u64) -> Self;
}

impl FpFormat for f32 {
    const FRAC_BITS: u32 = 23;
    const EXP_BITS: u32 = 8;

    fn raw(self) -> u64 {
        u64::from(self.to_bits())
    }

    fn from_raw(raw: u64) -> Self {
        f32::from_bits(raw as u32)
    }
}

impl FpFormat for f64 {
    const FRAC_BITS: u32 = 52;
    const EXP_BITS: u32 = 11;

    fn raw(self) -> u64 {
        self.to_bits()
    }

    fn from_raw(raw: u64) -> Self {
        f64::from_bits(raw)
    }
}

fn sign_bit<F: FpFormat>() -> u64 {
    1 << (F::FRAC_BITS + F::EXP_BITS)
}

fn exp_mask<F: FpFormat>() -> u64 {
    ((1 << F::EXP_BITS) - 1) << F::FRAC_BITS
}

fn frac_mask<F: FpFormat>() -> u64 {
    (1 << F::FRAC_BITS) - 1
}

fn quiet_bit<F: FpFormat>() -> u64 {
    1 << (F::FRAC_BITS - 1)
}

/// ARM 默认 NaN：正号、静默位置位、其余尾数为 0
pub fn default_nan<F: FpFormat>() -> F {
    F::from_raw(exp_mask::<F>() | quiet_bit::<F>())
}

pub fn is_snan<F: FpFormat>(x: F) -> bool {
    let r = x.raw();
    r & exp_mask::<F>() == exp_mask::<F>() && r & frac_mask::<F>() != 0 && r & quiet_bit::<F>() == 0
}

pub fn is_denormal<F: FpFormat>(x: F) -> bool {
    let r = x.raw();
    r & exp_mask::<F>() == 0 && r & frac_mask::<F>() != 0
}

fn signed_zero<F: FpFormat>(negative: bool) -> F {
    if negative { F::neg_zero() } else { F::zero() }
}

pub fn neg<F: FpFormat>(x: F) -> F {
    F::from_raw(x.raw() ^ sign_bit::<F>())
}

pub fn abs<F: FpFormat>(x: F) -> F {
    F::from_raw(x.raw() & !sign_bit::<F>())
}

fn flush_input<F: FpFormat>(x: F, st: &mut FloatStatus) -> F {
    if st.flush_to_zero && is_denormal(x) {
        st.raise(FpExc::INPUT_DENORMAL);
        signed_zero(x.is_sign_negative())
    } else {
        x
    }
}

/// NaN 操作数处理：signalling NaN 优先于 quiet NaN，同类按操作数顺序
fn pick_nan<F: FpFormat>(ops: &[F], st: &mut FloatStatus) -> Option<F> {
    if !ops.iter().any(|x| x.is_nan()) {
        return None;
    }
    let snan = ops.iter().copied().find(|x| is_snan(*x));
    if snan.is_some() {
        st.raise(FpExc::INVALID);
    }
    if st.default_nan {
        return Some(default_nan());
    }
    match snan {
        Some(s) => Some(F::from_raw(s.raw() | quiet_bit::<F>())),
        None => ops.iter().copied().find(|x| x.is_nan()),
    }
}

fn invalid<F: FpFormat>(st: &mut FloatStatus) -> F {
    st.raise(FpExc::INVALID);
    default_nan()
}

fn next_toward<F: FpFormat>(x: F, up: bool) -> F {
    if x.is_nan() {
        return x;
    }
    if x == F::zero() {
        let tiny = F::from_raw(1);
        return if up { tiny } else { neg(tiny) };
    }
    if (up && x == F::infinity()) || (!up && x == F::neg_infinity()) {
        return x;
    }
    let raw = x.raw();
    let away_from_zero = up == x.is_sign_positive();
    F::from_raw(if away_from_zero { raw + 1 } else { raw - 1 })
}

fn overflow<F: FpFormat>(negative: bool, st: &mut FloatStatus) -> F {
    st.raise(FpExc::OVERFLOW | FpExc::INEXACT);
    let to_max = match st.rounding {
        RoundingMode::NearestEven => false,
        RoundingMode::PlusInf => negative,
        RoundingMode::MinusInf => !negative,
        RoundingMode::Zero => true,
    };
    match (to_max, negative) {
        (false, false) => F::infinity(),
        (false, true) => F::neg_infinity(),
        (true, false) => F::max_value(),
        (true, true) => F::min_value(),
    }
}

/// `err` 是精确值与就近舍入结果 `r` 的比较
fn round_result<F: FpFormat>(r: F, err: Ordering, st: &mut FloatStatus) -> F {
    if err == Ordering::Equal {
        return finish(r, false, st);
    }
    let adjusted = match st.rounding {
        RoundingMode::NearestEven => r,
        RoundingMode::PlusInf if err == Ordering::Greater => next_toward(r, true),
        RoundingMode::MinusInf if err == Ordering::Less => next_toward(r, false),
        RoundingMode::Zero if err == Ordering::Less && r > F::zero() => next_toward(r, false),
        RoundingMode::Zero if err == Ordering::Greater && r < F::zero() => next_toward(r, true),
        _ => r,
    };
    if adjusted.is_infinite() {
        return overflow(adjusted.is_sign_negative(), st);
    }
    finish(adjusted, true, st)
}

fn finish<F: FpFormat>(r: F, inexact: bool, st: &mut FloatStatus) -> F {
    if st.flush_to_zero && is_denormal(r) {
        st.raise(FpExc::UNDERFLOW);
        return signed_zero(r.is_sign_negative());
    }
    if inexact {
        st.raise(FpExc::INEXACT);
        if is_denormal(r) || r == F::zero() {
            st.raise(FpExc::UNDERFLOW);
        }
    }
    r
}

fn sign_of<F: FpFormat>(x: F) -> Ordering {
    x.partial_cmp(&F::zero()).unwrap_or(Ordering::Equal)
}

pub fn add<F: FpFormat>(a: F, b: F, st: &mut FloatStatus) -> F {
    let a = flush_input(a, st);
    let b = flush_input(b, st);
    if let Some(n) = pick_nan(&[a, b], st) {
        return n;
    }
    if a.is_infinite() && b.is_infinite() && a.is_sign_negative() != b.is_sign_negative() {
        return invalid(st);
    }
    let r = a + b;
    if r.is_infinite() {
        return if a.is_finite() && b.is_finite() { overflow(r.is_sign_negative(), st) } else { r };
    }
    let bb = r - a;
    let err = (a - (r - bb)) + (b - bb);
    // x + (-x) 在向负无穷舍入时为 -0
    if r == F::zero()
        && err == F::zero()
        && st.rounding == RoundingMode::MinusInf
        && a.is_sign_negative() != b.is_sign_negative()
    {
        return F::neg_zero();
    }
    round_result(r, sign_of(err), st)
}

pub fn sub<F: FpFormat>(a: F, b: F, st: &mut FloatStatus) -> F {
    if b.is_nan() {
        // 取反会改变 NaN 的符号位，先按原操作数处理
        let a = flush_input(a, st);
        if let Some(n) = pick_nan(&[a, b], st) {
            return n;
        }
    }
    add(a, neg(b), st)
}

pub fn mul<F: FpFormat>(a: F, b: F, st: &mut FloatStatus) -> F {
    let a = flush_input(a, st);
    let b = flush_input(b, st);
    if let Some(n) = pick_nan(&[a, b], st) {
        return n;
    }
    if (a.is_infinite() && b == F::zero()) || (a == F::zero() && b.is_infinite()) {
        return invalid(st);
    }
    let r = a * b;
    if r.is_infinite() {
        return if a.is_finite() && b.is_finite() { overflow(r.is_sign_negative(), st) } else { r };
    }
    let err = a.mul_add(b, -r);
    round_result(r, sign_of(err), st)
}

pub fn div<F: FpFormat>(a: F, b: F, st: &mut FloatStatus) -> F {
    let a = flush_input(a, st);
    let b = flush_input(b, st);
    if let Some(n) = pick_nan(&[a, b], st) {
        return n;
    }
    if (a == F::zero() && b == F::zero()) || (a.is_infinite() && b.is_infinite()) {
        return invalid(st);
    }
    let negative = a.is_sign_negative() != b.is_sign_negative();
    if b == F::zero() {
        st.raise(FpExc::DIVBYZERO);
        return if negative { F::neg_infinity() } else { F::infinity() };
    }
    let r = a / b;
    if r.is_infinite() {
        return if a.is_finite() { overflow(negative, st) } else { r };
    }
    let rem = (-r).mul_add(b, a);
    let err = if b > F::zero() { sign_of(rem) } else { sign_of(rem).reverse() };
    round_result(r, err, st)
}

pub fn sqrt<F: FpFormat>(a: F, st: &mut FloatStatus) -> F {
    let a = flush_input(a, st);
    if let Some(n) = pick_nan(&[a], st) {
        return n;
    }
    if a < F::zero() {
        return invalid(st);
    }
    if a == F::zero() || a.is_infinite() {
        return a;
    }
    let r = a.sqrt();
    let rem = (-r).mul_add(r, a);
    round_result(r, sign_of(rem), st)
}

/// 融合乘加 `addend + op1 * op2`，只在最后舍入一次
///
/// 调用方负责在调用前完成 VFNMA/VFMS 等变体的操作数取反。
pub fn mul_add<F: FpFormat>(addend: F, op1: F, op2: F, st: &mut FloatStatus) -> F {
    let addend = flush_input(addend, st);
    let op1 = flush_input(op1, st);
    let op2 = flush_input(op2, st);
    let inf_zero = (op1.is_infinite() && op2 == F::zero()) || (op1 == F::zero() && op2.is_infinite());
    if addend.is_nan() && !is_snan(addend) && inf_zero {
        return invalid(st);
    }
    if let Some(n) = pick_nan(&[addend, op1, op2], st) {
        return n;
    }
    if inf_zero {
        return invalid(st);
    }
    let product_inf = op1.is_infinite() || op2.is_infinite();
    let product_negative = op1.is_sign_negative() != op2.is_sign_negative();
    if product_inf && addend.is_infinite() && addend.is_sign_negative() != product_negative {
        return invalid(st);
    }
    let r = op1.mul_add(op2, addend);
    if r.is_infinite() {
        let finite = op1.is_finite() && op2.is_finite() && addend.is_finite();
        return if finite { overflow(r.is_sign_negative(), st) } else { r };
    }
    let p = op1 * op2;
    let pe = op1.mul_add(op2, -p);
    let s = p + addend;
    let bb = s - p;
    let se = (p - (s - bb)) + (addend - bb);
    let err = ((s - r) + se) + pe;
    round_result(r, sign_of(err), st)
}

/// VCMP/VCMPE，返回写入 FPSCR[31:28] 的 NZCV
pub fn compare<F: FpFormat>(a: F, b: F, signal_nans: bool, st: &mut FloatStatus) -> u32 {
    let a = flush_input(a, st);
    let b = flush_input(b, st);
    if a.is_nan() || b.is_nan() {
        if signal_nans || is_snan(a) || is_snan(b) {
            st.raise(FpExc::INVALID);
        }
        return 0b0011 << 28;
    }
    match a.partial_cmp(&b) {
        Some(Ordering::Equal) => 0b0110 << 28,
        Some(Ordering::Less) => 0b1000 << 28,
        _ => 0b0010 << 28,
    }
}

/// NEON VMAX/VMIN
pub fn min_max<F: FpFormat>(a: F, b: F, is_max: bool, st: &mut FloatStatus) -> F {
    let a = flush_input(a, st);
    let b = flush_input(b, st);
    if let Some(n) = pick_nan(&[a, b], st) {
        return n;
    }
    if a == F::zero() && b == F::zero() {
        let pick_negative = if is_max {
            a.is_sign_negative() && b.is_sign_negative()
        } else {
            a.is_sign_negative() || b.is_sign_negative()
        };
        return signed_zero(pick_negative);
    }
    let a_wins = if is_max { a > b } else { a < b };
    if a_wins { a } else { b }
}

/// VRECPS: 2 - a*b
pub fn recip_step<F: FpFormat>(a: F, b: F, st: &mut FloatStatus) -> F {
    let a = flush_input(a, st);
    let b = flush_input(b, st);
    if let Some(n) = pick_nan(&[a, b], st) {
        return n;
    }
    if (a.is_infinite() && b == F::zero()) || (a == F::zero() && b.is_infinite()) {
        return F::one() + F::one();
    }
    mul_add(F::one() + F::one(), neg(a), b, st)
}

/// VRSQRTS: (3 - a*b) / 2
pub fn rsqrt_step<F: FpFormat>(a: F, b: F, st: &mut FloatStatus) -> F {
    let a = flush_input(a, st);
    let b = flush_input(b, st);
    let two = F::one() + F::one();
    let three = two + F::one();
    if let Some(n) = pick_nan(&[a, b], st) {
        return n;
    }
    if (a.is_infinite() && b == F::zero()) || (a == F::zero() && b.is_infinite()) {
        return three / two;
    }
    let t = mul_add(three, neg(a), b, st);
    t / two
}

pub fn f32_to_f64(x: f32, st: &mut FloatStatus) -> f64 {
    let x = flush_input(x, st);
    if x.is_nan() {
        if is_snan(x) {
            st.raise(FpExc::INVALID);
        }
        if st.default_nan {
            return default_nan();
        }
        let sign = (x.raw() >> 31) << 63;
        let frac = (x.raw() & frac_mask::<f32>()) << (52 - 23);
        return f64::from_raw(sign | exp_mask::<f64>() | quiet_bit::<f64>() | frac);
    }
    f64::from(x)
}

pub fn f64_to_f32(x: f64, st: &mut FloatStatus) -> f32 {
    let x = flush_input(x, st);
    if x.is_nan() {
        if is_snan(x) {
            st.raise(FpExc::INVALID);
        }
        if st.default_nan {
            return default_nan();
        }
        let sign = (x.raw() >> 63) << 31;
        let frac = (x.raw() & frac_mask::<f64>()) >> (52 - 23);
        return f32::from_raw(sign | exp_mask::<f32>() | quiet_bit::<f32>() | frac);
    }
    let r = x as f32;
    if r.is_infinite() && x.is_finite() {
        return overflow(x.is_sign_negative(), st);
    }
    let err = x.partial_cmp(&f64::from(r)).unwrap_or(Ordering::Equal);
    round_result(r, err, st)
}

fn round_to_integral(x: f64, mode: RoundingMode) -> f64 {
    match mode {
        RoundingMode::NearestEven => {
            let f = x.floor();
            let diff = x - f;
            if diff > 0.5 || (diff == 0.5 && f % 2.0 != 0.0) { f + 1.0 } else { f }
        }
        RoundingMode::PlusInf => x.ceil(),
        RoundingMode::MinusInf => x.floor(),
        RoundingMode::Zero => x.trunc(),
    }
}

/// 浮点到 32 位整数，越界饱和并置 Invalid
pub fn to_int<F: FpFormat>(x: F, signed: bool, mode: RoundingMode, st: &mut FloatStatus) -> u32 {
    let x = flush_input(x, st);
    if x.is_nan() {
        st.raise(FpExc::INVALID);
        return 0;
    }
    let v = x.to_f64().unwrap_or(0.0);
    let r = round_to_integral(v, mode);
    let (min, max) = if signed {
        (f64::from(i32::MIN), f64::from(i32::MAX))
    } else {
        (0.0, f64::from(u32::MAX))
    };
    if r < min {
        st.raise(FpExc::INVALID);
        return if signed { i32::MIN as u32 } else { 0 };
    }
    if r > max {
        st.raise(FpExc::INVALID);
        return if signed { i32::MAX as u32 } else { u32::MAX };
    }
    if r != v {
        st.raise(FpExc::INEXACT);
    }
    if signed { (r as i32) as u32 } else { r as u32 }
}

/// 32 位整数到浮点
pub fn from_int<F: FpFormat>(v: u32, signed: bool, st: &mut FloatStatus) -> F {
    let exact = if signed { i64::from(v as i32) } else { i64::from(v) };
    let r: F = num_traits::NumCast::from(exact).unwrap_or_else(F::zero);
    let back = r.to_f64().unwrap_or(0.0);
    let err = (exact as f64).partial_cmp(&back).unwrap_or(Ordering::Equal);
    round_result(r, err, st)
}
