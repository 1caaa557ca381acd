//! NEON 运算辅助函数
//!
//! 寄存器号均为 D 寄存器编号；Q 形式按相邻两个 D 寄存器处理。
//! 浮点运算使用 "standard FPSCR" (就近舍入、默认 NaN、清零)，产生的
//! 异常累积到 FPSCR。

use smallvec::SmallVec;
use vm_core::VmResult;

use crate::lanes::{self, Lane};
use crate::softfp::{self, FloatStatus};
use crate::state::ArmCpu;

type Bytes = SmallVec<[u8; 32]>;

/// 与零比较的条件 (VCEQ/VCGE/VCGT/VCLE/VCLT #0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZeroCmp {
    Gt,
    Ge,
    Eq,
    Le,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeonOp {
    // 三寄存器同长整数
    Hadd,
    Rhadd,
    Qadd,
    Hsub,
    Qsub,
    Cgt,
    Cge,
    Shl,
    Rshl,
    Qshl,
    Qrshl,
    Max,
    Min,
    Abd,
    Aba,
    Add,
    Sub,
    Tst,
    Ceq,
    Mla,
    Mls,
    Mul,
    Pmul,
    Pmax,
    Pmin,
    Padd,
    Qdmulh,
    Qrdmulh,

    // 按位逻辑
    And,
    Bic,
    Orr,
    Orn,
    Eor,
    Bsl,
    Bit,
    Bif,

    // 单精度浮点
    Fadd,
    Fsub,
    Fpadd,
    Fabd,
    Fmla,
    Fmls,
    Fmul,
    Fceq,
    Fcge,
    Fcgt,
    Facge,
    Facgt,
    Fmax,
    Fmin,
    Fpmax,
    Fpmin,
    Frecps,
    Frsqrts,
    Fma,
    Fms,

    // 双寄存器杂项
    /// 在 `container` 字节的容器内反转元素顺序
    Rev { container: u8 },
    Cls,
    Clz,
    Cnt,
    Mvn,
    Qabs,
    Qneg,
    Abs,
    Neg,
    Fabs,
    Fneg,
    CmpZero { cond: ZeroCmp, float: bool },
    Swp,
    Trn,
    Zip,
    Uzp,
    /// Q -> D 截断
    Movn,

    // 移位立即数
    Shr { shift: u8, round: bool, accumulate: bool },
    Sri { shift: u8 },
    ShlImm { shift: u8 },
    Sli { shift: u8 },
    /// `to_unsigned` 为 VQSHLU
    QshlImm { shift: u8, to_unsigned: bool },
    /// Q -> D 窄化右移；`size` 指目的元素
    Shrn { shift: u8, round: bool },
    /// D -> Q 加宽左移 (VMOVL 即移位 0)；`size` 指源元素
    Shll { shift: u8 },

    DupScalar { index: u8 },
    Ext { imm: u8 },
    /// 表长 1-4 个 D 寄存器；`extension` 为 VTBX
    Tbl { len: u8, extension: bool },
}

/// 一次 NEON 运算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeonCall {
    pub op: NeonOp,
    /// 元素大小 log2(字节)
    pub size: u8,
    pub q: bool,
    pub unsigned: bool,
    pub vd: u8,
    pub vn: u8,
    pub vm: u8,
}

fn load(cpu: &ArmCpu, reg: u8, nregs: usize) -> Bytes {
    let mut out = Bytes::new();
    for i in 0..nregs {
        let d = cpu.vfp.d[(usize::from(reg) + i) % 32];
        out.extend_from_slice(&d.to_le_bytes());
    }
    out
}

fn store(cpu: &mut ArmCpu, reg: u8, bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(8).enumerate() {
        let mut b = [0u8; 8];
        b.copy_from_slice(chunk);
        cpu.vfp.d[(usize::from(reg) + i) % 32] = u64::from_le_bytes(b);
    }
}

pub(super) fn raw_get(v: &[u8], i: usize, bytes: usize) -> u64 {
    v[i * bytes..(i + 1) * bytes]
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

pub(super) fn raw_set(v: &mut [u8], i: usize, bytes: usize, x: u64) {
    for (b, byte) in v[i * bytes..(i + 1) * bytes].iter_mut().enumerate() {
        *byte = (x >> (8 * b)) as u8;
    }
}

fn shift_amount<L: Lane>(b: L) -> i32 {
    i32::from(b.to_bits() as u8 as i8)
}

/// 三寄存器整数运算，返回是否饱和
fn int3<L: Lane>(op: NeonOp, d: &mut [u8], n: &[u8], m: &[u8]) -> bool {
    match op {
        NeonOp::Padd => {
            lanes::pairwise::<L>(d, n, m, |a, b| a.wrapping_add(&b));
            return false;
        }
        NeonOp::Pmax => {
            lanes::pairwise::<L>(d, n, m, |a, b| a.max(b));
            return false;
        }
        NeonOp::Pmin => {
            lanes::pairwise::<L>(d, n, m, |a, b| a.min(b));
            return false;
        }
        _ => {}
    }
    let ones = L::wrap_from(-1);
    let mask = |c: bool| if c { ones } else { L::zero() };
    let mut qc = false;
    for i in 0..lanes::count::<L>(d) {
        let a: L = lanes::get(n, i);
        let b: L = lanes::get(m, i);
        let acc: L = lanes::get(d, i);
        let mut sat = |(r, s): (L, bool)| {
            qc |= s;
            r
        };
        let r = match op {
            NeonOp::Hadd => lanes::halving_add(a, b, false),
            NeonOp::Rhadd => lanes::halving_add(a, b, true),
            NeonOp::Hsub => lanes::halving_sub(a, b),
            NeonOp::Qadd => sat(lanes::sat_add(a, b)),
            NeonOp::Qsub => sat(lanes::sat_sub(a, b)),
            NeonOp::Cgt => mask(a > b),
            NeonOp::Cge => mask(a >= b),
            NeonOp::Ceq => mask(a == b),
            NeonOp::Tst => mask(a & b != L::zero()),
            NeonOp::Shl => lanes::shift_by(a, shift_amount(b), false, false).0,
            NeonOp::Rshl => lanes::shift_by(a, shift_amount(b), true, false).0,
            NeonOp::Qshl => sat(lanes::shift_by(a, shift_amount(b), false, true)),
            NeonOp::Qrshl => sat(lanes::shift_by(a, shift_amount(b), true, true)),
            NeonOp::Max => a.max(b),
            NeonOp::Min => a.min(b),
            NeonOp::Abd => lanes::abs_diff(a, b),
            NeonOp::Aba => acc.wrapping_add(&lanes::abs_diff(a, b)),
            NeonOp::Add => a.wrapping_add(&b),
            NeonOp::Sub => a.wrapping_sub(&b),
            NeonOp::Mul => a.wrapping_mul(&b),
            NeonOp::Mla => acc.wrapping_add(&a.wrapping_mul(&b)),
            NeonOp::Mls => acc.wrapping_sub(&a.wrapping_mul(&b)),
            NeonOp::Pmul => lanes::poly_mul(a, b),
            NeonOp::Qdmulh => sat(lanes::sat_doubling_mul_high(a, b, false)),
            NeonOp::Qrdmulh => sat(lanes::sat_doubling_mul_high(a, b, true)),
            _ => acc,
        };
        lanes::set(d, i, r);
    }
    qc
}

fn logic(op: NeonOp, d: &mut [u8], n: &[u8], m: &[u8]) {
    for ((d, &a), &b) in d.iter_mut().zip(n).zip(m) {
        *d = match op {
            NeonOp::And => a & b,
            NeonOp::Bic => a & !b,
            NeonOp::Orr => a | b,
            NeonOp::Orn => a | !b,
            NeonOp::Eor => a ^ b,
            NeonOp::Bsl => (a & *d) | (b & !*d),
            NeonOp::Bit => (a & b) | (*d & !b),
            NeonOp::Bif => (*d & b) | (a & !b),
            _ => *d,
        };
    }
}

fn f32_lane(v: &[u8], i: usize) -> f32 {
    f32::from_bits(lanes::get::<u32>(v, i))
}

fn is_ge(nzcv: u32) -> bool {
    matches!(nzcv >> 28, 0b0110 | 0b0010)
}

fn float3(op: NeonOp, d: &mut [u8], n: &[u8], m: &[u8], st: &mut FloatStatus) {
    let pair = |d: &mut [u8], st: &mut FloatStatus, f: &dyn Fn(f32, f32, &mut FloatStatus) -> f32| {
        let mut out = [0u8; 8];
        let mut results = [0f32; 2];
        results[0] = f(f32_lane(n, 0), f32_lane(n, 1), st);
        results[1] = f(f32_lane(m, 0), f32_lane(m, 1), st);
        for (i, r) in results.iter().enumerate() {
            lanes::set::<u32>(&mut out, i, r.to_bits());
        }
        d[..8].copy_from_slice(&out);
    };
    match op {
        NeonOp::Fpadd => return pair(d, st, &|a: f32, b: f32, st: &mut FloatStatus| softfp::add(a, b, st)),
        NeonOp::Fpmax => return pair(d, st, &|a: f32, b: f32, st: &mut FloatStatus| softfp::min_max(a, b, true, st)),
        NeonOp::Fpmin => return pair(d, st, &|a: f32, b: f32, st: &mut FloatStatus| softfp::min_max(a, b, false, st)),
        _ => {}
    }
    for i in 0..lanes::count::<u32>(d) {
        let a = f32_lane(n, i);
        let b = f32_lane(m, i);
        let acc = f32_lane(d, i);
        let mask = |c: bool| f32::from_bits(if c { u32::MAX } else { 0 });
        let r = match op {
            NeonOp::Fadd => softfp::add(a, b, st),
            NeonOp::Fsub => softfp::sub(a, b, st),
            NeonOp::Fabd => softfp::abs(softfp::sub(a, b, st)),
            NeonOp::Fmul => softfp::mul(a, b, st),
            NeonOp::Fmla => {
                let p = softfp::mul(a, b, st);
                softfp::add(acc, p, st)
            }
            NeonOp::Fmls => {
                let p = softfp::mul(a, b, st);
                softfp::sub(acc, p, st)
            }
            NeonOp::Fma => softfp::mul_add(acc, a, b, st),
            NeonOp::Fms => softfp::mul_add(acc, softfp::neg(a), b, st),
            NeonOp::Fceq => mask(softfp::compare(a, b, false, st) >> 28 == 0b0110),
            NeonOp::Fcge => mask(is_ge(softfp::compare(a, b, true, st))),
            NeonOp::Fcgt => mask(softfp::compare(a, b, true, st) >> 28 == 0b0010),
            NeonOp::Facge => mask(is_ge(softfp::compare(softfp::abs(a), softfp::abs(b), true, st))),
            NeonOp::Facgt => mask(softfp::compare(softfp::abs(a), softfp::abs(b), true, st) >> 28 == 0b0010),
            NeonOp::Fmax => softfp::min_max(a, b, true, st),
            NeonOp::Fmin => softfp::min_max(a, b, false, st),
            NeonOp::Frecps => softfp::recip_step(a, b, st),
            NeonOp::Frsqrts => softfp::rsqrt_step(a, b, st),
            _ => acc,
        };
        lanes::set::<u32>(d, i, r.to_bits());
    }
}

/// 双寄存器杂项 (单操作数)，返回是否饱和
fn misc<L: Lane>(op: NeonOp, d: &mut [u8], m: &[u8]) -> bool {
    let ones = L::wrap_from(-1);
    let mask = |c: bool| if c { ones } else { L::zero() };
    let mut qc = false;
    for i in 0..lanes::count::<L>(d) {
        let a: L = lanes::get(m, i);
        let x = a.widen();
        let r = match op {
            NeonOp::Cls => lanes::cls(a),
            NeonOp::Clz => lanes::clz(a),
            NeonOp::Cnt => lanes::popcount(a),
            NeonOp::Mvn => !a,
            NeonOp::Abs => L::wrap_from(x.abs()),
            NeonOp::Neg => L::wrap_from(-x),
            NeonOp::Qabs => {
                let (r, s) = lanes::sat_abs(a);
                qc |= s;
                r
            }
            NeonOp::Qneg => {
                let (r, s) = lanes::sat_neg(a);
                qc |= s;
                r
            }
            NeonOp::CmpZero { cond, float: false } => mask(match cond {
                ZeroCmp::Gt => x > 0,
                ZeroCmp::Ge => x >= 0,
                ZeroCmp::Eq => x == 0,
                ZeroCmp::Le => x <= 0,
                ZeroCmp::Lt => x < 0,
            }),
            _ => a,
        };
        lanes::set(d, i, r);
    }
    qc
}

fn float_misc(op: NeonOp, d: &mut [u8], m: &[u8], st: &mut FloatStatus) {
    for i in 0..lanes::count::<u32>(d) {
        let a = f32_lane(m, i);
        let r = match op {
            NeonOp::Fabs => softfp::abs(a),
            NeonOp::Fneg => softfp::neg(a),
            NeonOp::CmpZero { cond, .. } => {
                let nzcv = softfp::compare(a, 0.0, cond != ZeroCmp::Eq, st) >> 28;
                let hit = match cond {
                    ZeroCmp::Gt => nzcv == 0b0010,
                    ZeroCmp::Ge => matches!(nzcv, 0b0010 | 0b0110),
                    ZeroCmp::Eq => nzcv == 0b0110,
                    ZeroCmp::Le => matches!(nzcv, 0b1000 | 0b0110),
                    ZeroCmp::Lt => nzcv == 0b1000,
                };
                f32::from_bits(if hit { u32::MAX } else { 0 })
            }
            _ => a,
        };
        lanes::set::<u32>(d, i, r.to_bits());
    }
}

fn rev(d: &mut [u8], m: &[u8], esize: usize, container: usize) {
    let per = container / esize;
    for i in 0..m.len() / esize {
        let j = (i / per) * per + (per - 1 - i % per);
        raw_set(d, j, esize, raw_get(m, i, esize));
    }
}

/// VTRN/VZIP/VUZP，同时改写两个操作数
fn permute(op: NeonOp, d: &mut [u8], m: &mut [u8], esize: usize) {
    let n = d.len() / esize;
    let (a, b): (Vec<u64>, Vec<u64>) =
        (0..n).map(|i| (raw_get(d, i, esize), raw_get(m, i, esize))).unzip();
    let (mut x, mut y) = (a.clone(), b.clone());
    match op {
        NeonOp::Trn => {
            for i in (0..n).step_by(2) {
                x[i + 1] = b[i];
                y[i] = a[i + 1];
            }
        }
        NeonOp::Zip => {
            for i in 0..n {
                let (src, k) = (i / 2, i % 2);
                let lo = if k == 0 { a[src] } else { b[src] };
                let hi = if k == 0 { a[n / 2 + src] } else { b[n / 2 + src] };
                x[i] = lo;
                y[i] = hi;
            }
        }
        NeonOp::Uzp => {
            let cat: Vec<u64> = a.iter().chain(b.iter()).copied().collect();
            for i in 0..n {
                x[i] = cat[2 * i];
                y[i] = cat[2 * i + 1];
            }
        }
        _ => {}
    }
    for i in 0..n {
        raw_set(d, i, esize, x[i]);
        raw_set(m, i, esize, y[i]);
    }
}

fn esize_mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// 移位立即数族 (不改变元素宽度的部分)
fn shift_imm<L: Lane>(op: NeonOp, d: &mut [u8], m: &[u8]) -> bool {
    let bits = L::BITS;
    let full = esize_mask(bits);
    let mut qc = false;
    for i in 0..lanes::count::<L>(d) {
        let a: L = lanes::get(m, i);
        let acc: L = lanes::get(d, i);
        let r = match op {
            NeonOp::Shr { shift, round, accumulate } => {
                let (r, _) = lanes::shift_by(a, -i32::from(shift), round, false);
                if accumulate { acc.wrapping_add(&r) } else { r }
            }
            NeonOp::ShlImm { shift } => L::from_bits(if u32::from(shift) >= bits { 0 } else { a.to_bits() << shift }),
            NeonOp::Sri { shift } => {
                let mask = lanes::insert_mask(bits, -i32::from(shift));
                let v = if u32::from(shift) >= bits { 0 } else { a.to_bits() >> shift };
                L::from_bits((acc.to_bits() & !mask & full) | (v & mask))
            }
            NeonOp::Sli { shift } => {
                let mask = lanes::insert_mask(bits, i32::from(shift));
                let v = if u32::from(shift) >= bits { 0 } else { a.to_bits() << shift };
                L::from_bits((acc.to_bits() & !mask & full) | (v & mask))
            }
            NeonOp::QshlImm { shift, to_unsigned: true } => {
                let (r, s) = lanes::sat_shl_unsigned(a, u32::from(shift));
                qc |= s;
                r
            }
            NeonOp::QshlImm { shift, to_unsigned: false } => {
                let (r, s) = lanes::shift_by(a, i32::from(shift), false, true);
                qc |= s;
                r
            }
            _ => acc,
        };
        lanes::set(d, i, r);
    }
    qc
}

/// 执行一次 NEON 运算
pub fn execute(cpu: &mut ArmCpu, call: &NeonCall, _args: &[u64]) -> VmResult<()> {
    let nregs = if call.q { 2 } else { 1 };
    let esize = 1usize << call.size;
    let n = load(cpu, call.vn, nregs);
    let mut m = load(cpu, call.vm, nregs);
    let mut d = load(cpu, call.vd, nregs);
    let mut st = FloatStatus::standard();
    let mut qc = false;

    match call.op {
        NeonOp::Hadd
        | NeonOp::Rhadd
        | NeonOp::Qadd
        | NeonOp::Hsub
        | NeonOp::Qsub
        | NeonOp::Cgt
        | NeonOp::Cge
        | NeonOp::Shl
        | NeonOp::Rshl
        | NeonOp::Qshl
        | NeonOp::Qrshl
        | NeonOp::Max
        | NeonOp::Min
        | NeonOp::Abd
        | NeonOp::Aba
        | NeonOp::Add
        | NeonOp::Sub
        | NeonOp::Tst
        | NeonOp::Ceq
        | NeonOp::Mla
        | NeonOp::Mls
        | NeonOp::Mul
        | NeonOp::Pmul
        | NeonOp::Pmax
        | NeonOp::Pmin
        | NeonOp::Padd
        | NeonOp::Qdmulh
        | NeonOp::Qrdmulh => {
            qc = with_lane!(call.size, call.unsigned, int3(call.op, &mut d, &n, &m))?;
        }
        NeonOp::And
        | NeonOp::Bic
        | NeonOp::Orr
        | NeonOp::Orn
        | NeonOp::Eor
        | NeonOp::Bsl
        | NeonOp::Bit
        | NeonOp::Bif => logic(call.op, &mut d, &n, &m),
        NeonOp::Fadd
        | NeonOp::Fsub
        | NeonOp::Fpadd
        | NeonOp::Fabd
        | NeonOp::Fmla
        | NeonOp::Fmls
        | NeonOp::Fmul
        | NeonOp::Fceq
        | NeonOp::Fcge
        | NeonOp::Fcgt
        | NeonOp::Facge
        | NeonOp::Facgt
        | NeonOp::Fmax
        | NeonOp::Fmin
        | NeonOp::Fpmax
        | NeonOp::Fpmin
        | NeonOp::Frecps
        | NeonOp::Frsqrts
        | NeonOp::Fma
        | NeonOp::Fms => float3(call.op, &mut d, &n, &m, &mut st),
        NeonOp::Rev { container } => rev(&mut d, &m, esize, usize::from(container)),
        NeonOp::Fabs | NeonOp::Fneg | NeonOp::CmpZero { float: true, .. } => {
            float_misc(call.op, &mut d, &m, &mut st)
        }
        NeonOp::Cls
        | NeonOp::Clz
        | NeonOp::Cnt
        | NeonOp::Mvn
        | NeonOp::Qabs
        | NeonOp::Qneg
        | NeonOp::Abs
        | NeonOp::Neg
        | NeonOp::CmpZero { float: false, .. } => {
            // 计数类按无符号处理，其余按有符号
            let unsigned = matches!(call.op, NeonOp::Clz | NeonOp::Cnt | NeonOp::Mvn);
            qc = with_lane!(call.size, unsigned, misc(call.op, &mut d, &m))?;
        }
        NeonOp::Swp => {
            store(cpu, call.vd, &m);
            store(cpu, call.vm, &d);
            return Ok(());
        }
        NeonOp::Trn | NeonOp::Zip | NeonOp::Uzp => {
            permute(call.op, &mut d, &mut m, esize);
            store(cpu, call.vd, &d);
            store(cpu, call.vm, &m);
            return Ok(());
        }
        NeonOp::Movn => {
            let wide = load(cpu, call.vm, 2);
            let mut out = [0u8; 8];
            for i in 0..8 / esize {
                raw_set(&mut out, i, esize, raw_get(&wide, i, esize * 2));
            }
            store(cpu, call.vd, &out);
            return Ok(());
        }
        NeonOp::Shr { .. }
        | NeonOp::Sri { .. }
        | NeonOp::ShlImm { .. }
        | NeonOp::Sli { .. }
        | NeonOp::QshlImm { .. } => {
            qc = with_lane!(call.size, call.unsigned, shift_imm(call.op, &mut d, &m))?;
        }
        NeonOp::Shrn { shift, round } => {
            let wide = load(cpu, call.vm, 2);
            let mut out = [0u8; 8];
            let narrow_mask = esize_mask(8 * esize as u32);
            for i in 0..8 / esize {
                let mut v = u128::from(raw_get(&wide, i, esize * 2));
                if round && shift > 0 {
                    v += 1u128 << (shift - 1);
                }
                raw_set(&mut out, i, esize, (v >> shift) as u64 & narrow_mask);
            }
            store(cpu, call.vd, &out);
            return Ok(());
        }
        NeonOp::Shll { shift } => {
            let narrow = load(cpu, call.vm, 1);
            let mut out = [0u8; 16];
            let bits = 8 * esize as u32;
            for i in 0..8 / esize {
                let raw = raw_get(&narrow, i, esize);
                let v = if call.unsigned {
                    i128::from(raw)
                } else {
                    i128::from(crate::bits::sign_extend(raw as u32, bits))
                };
                raw_set(&mut out, i, esize * 2, ((v << shift) as u64) & esize_mask(bits * 2));
            }
            store(cpu, call.vd, &out);
            return Ok(());
        }
        NeonOp::DupScalar { index } => {
            let src = load(cpu, call.vm, 1);
            let v = raw_get(&src, usize::from(index), esize);
            for i in 0..d.len() / esize {
                raw_set(&mut d, i, esize, v);
            }
        }
        NeonOp::Ext { imm } => {
            let cat: Bytes = n.iter().chain(m.iter()).copied().collect();
            let imm = usize::from(imm);
            for (i, b) in d.iter_mut().enumerate() {
                *b = cat[i + imm];
            }
        }
        NeonOp::Tbl { len, extension } => {
            let table = load(cpu, call.vn, usize::from(len));
            let idx = load(cpu, call.vm, 1);
            let mut out = load(cpu, call.vd, 1);
            for (o, &k) in out.iter_mut().zip(idx.iter()) {
                match table.get(usize::from(k)) {
                    Some(&v) => *o = v,
                    None if !extension => *o = 0,
                    None => {}
                }
            }
            store(cpu, call.vd, &out);
            return Ok(());
        }
    }

    store(cpu, call.vd, &d);
    if qc {
        cpu.vfp.set_qc();
    }
    cpu.vfp.accumulate(&st);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CpuModel;

    fn cpu() -> ArmCpu {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        cpu.set_fpu_enabled(true).unwrap();
        cpu
    }

    fn call(op: NeonOp, size: u8, q: bool, unsigned: bool) -> NeonCall {
        NeonCall { op, size, q, unsigned, vd: 0, vn: 2, vm: 4 }
    }

    #[test]
    fn test_vqadd_u8_saturates_and_sets_qc() {
        let mut c = cpu();
        c.vfp.d[2] = 0x0102_0304_0506_07f0;
        c.vfp.d[4] = 0x0101_0101_0101_0120;
        execute(&mut c, &call(NeonOp::Qadd, 0, false, true), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x0203_0405_0607_08ff);
        assert_ne!(c.vfp.fpscr(false) & crate::fpregs::FPSCR_QC, 0);
    }

    #[test]
    fn test_q_form_writes_both_halves() {
        let mut c = cpu();
        c.vfp.set_q(1, [1, 2]);
        c.vfp.set_q(2, [10, 20]);
        execute(&mut c, &call(NeonOp::Add, 3, true, false), &[]).unwrap();
        assert_eq!(c.vfp.q(0), [11, 22]);
    }

    #[test]
    fn test_compare_and_bitwise_select() {
        let mut c = cpu();
        c.vfp.d[2] = 0x0000_0005_ffff_fffe;
        c.vfp.d[4] = 0x0000_0003_0000_0001;
        execute(&mut c, &call(NeonOp::Cgt, 2, false, false), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0xffff_ffff_0000_0000);
        execute(&mut c, &call(NeonOp::Cgt, 2, false, true), &[]).unwrap();
        assert_eq!(c.vfp.d[0], u64::MAX);

        c.vfp.d[0] = 0x0000_0000_ffff_ffff;
        execute(&mut c, &call(NeonOp::Bsl, 0, false, false), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x0000_0003_ffff_fffe);
    }

    #[test]
    fn test_float_add_uses_standard_fpscr() {
        let mut c = cpu();
        c.vfp.d[2] = u64::from(1.5f32.to_bits()) | u64::from(2.0f32.to_bits()) << 32;
        c.vfp.d[4] = u64::from(0.25f32.to_bits()) | u64::from((-2.0f32).to_bits()) << 32;
        execute(&mut c, &call(NeonOp::Fadd, 2, false, false), &[]).unwrap();
        assert_eq!(f32::from_bits(c.vfp.d[0] as u32), 1.75);
        assert_eq!(f32::from_bits((c.vfp.d[0] >> 32) as u32), 0.0);
    }

    #[test]
    fn test_rev_and_zip() {
        let mut c = cpu();
        c.vfp.d[4] = 0x0807_0605_0403_0201;
        execute(&mut c, &call(NeonOp::Rev { container: 4 }, 0, false, false), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x0506_0708_0102_0304);

        c.vfp.d[0] = 0x0706_0504_0302_0100;
        c.vfp.d[4] = 0x1716_1514_1312_1110;
        execute(&mut c, &call(NeonOp::Zip, 0, false, false), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x1303_1202_1101_1000);
        assert_eq!(c.vfp.d[4], 0x1707_1606_1505_1404);
    }

    #[test]
    fn test_shift_insert_and_narrow() {
        let mut c = cpu();
        c.vfp.d[0] = 0xffff_ffff_ffff_ffff;
        c.vfp.d[4] = 0x0000_0000_0000_0001;
        execute(&mut c, &call(NeonOp::Sli { shift: 4 }, 0, false, true), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x0f0f_0f0f_0f0f_0f1f);

        c.vfp.set_q(2, [0x0000_0180_0000_0100, 0x0000_7f00_ffff_ff00]);
        execute(&mut c, &call(NeonOp::Shrn { shift: 8, round: true }, 1, false, false), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x007f_ffff_0002_0001);

        c.vfp.d[4] = 0x0000_0000_0000_80ff;
        execute(&mut c, &call(NeonOp::Shll { shift: 0 }, 0, false, false), &[]).unwrap();
        assert_eq!(c.vfp.q(0), [0x0000_0000_ff80_ffff, 0]);
    }

    #[test]
    fn test_vtbl_and_vtbx() {
        let mut c = cpu();
        c.vfp.d[2] = 0x0706_0504_0302_0100;
        c.vfp.d[4] = 0x0000_0000_ff00_0701;
        c.vfp.d[0] = 0xaaaa_aaaa_aaaa_aaaa;
        execute(&mut c, &call(NeonOp::Tbl { len: 1, extension: true }, 0, false, false), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x0000_0000_aa00_0701);
        execute(&mut c, &call(NeonOp::Tbl { len: 1, extension: false }, 0, false, false), &[]).unwrap();
        assert_eq!(c.vfp.d[0], 0x0000_0000_0000_0701);
    }
}
