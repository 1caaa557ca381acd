//! VFP 解码与翻译
//!
//! A32 与 T32 的 VFP 编码布局一致 (T32 只是没有条件域)，这里统一按
//! 32 位字解码成 [`VfpInsn`]。算术运算逐元素调用 `ArmHelper::Vfp`，
//! 传统短向量 (FPSCR.LEN/STRIDE) 在翻译期按组展开成多次调用。

use vm_arm_cpu::helpers::{FpSysReg, VfpCall, VfpOp};
use vm_arm_cpu::state::slot;
use vm_arm_cpu::{ArmFeatures, ArmHelper};
use vm_core::VmResult;

use crate::context::DisasContext;
use crate::decode::{DecodeEnv, bit, bits};

/// VMRS/VMSR 访问的寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpReg {
    Fpscr,
    Sys(FpSysReg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfpInsn {
    /// 寄存器号的含义见 [`VfpCall`]
    DataProc { op: VfpOp, dp: bool, vd: u8, vn: u8, vm: u8 },
    /// VMOV 立即数，`imm` 已按精度展开
    MovImm { dp: bool, vd: u8, imm: u64 },
    /// VLDR/VSTR
    LoadStore { load: bool, dp: bool, vd: u8, rn: u8, add: bool, imm: u32 },
    /// VLDM/VSTM/VPUSH/VPOP；`words` 为传输的字数 (FLDMX 比寄存器多一个字)
    Multiple { load: bool, dp: bool, vd: u8, count: u8, words: u8, rn: u8, add: bool, wback: bool },
    /// VMOV Rt <-> Sn
    CoreSingle { to_core: bool, rt: u8, sn: u8 },
    /// VMOV Rt, Rt2 <-> Sm, Sm+1
    CoreSinglePair { to_core: bool, rt: u8, rt2: u8, sm: u8 },
    /// VMOV Rt, Rt2 <-> Dm
    CoreDouble { to_core: bool, rt: u8, rt2: u8, dm: u8 },
    /// VMOV Rt <-> Dn[x]；`size` 为 log2 字节
    CoreScalar { to_core: bool, rt: u8, dn: u8, size: u8, index: u8, unsigned: bool },
    /// VDUP 核心寄存器
    Dup { rt: u8, vd: u8, q: bool, size: u8 },
    Vmrs { rt: u8, reg: FpReg },
    Vmsr { rt: u8, reg: FpReg },
}

/// S 寄存器：Vx:x
fn sreg(v: u32, x: bool) -> u8 {
    ((v << 1) | u32::from(x)) as u8
}

/// D 寄存器：x:Vx
fn dreg(v: u32, x: bool) -> u8 {
    ((u32::from(x) << 4) | v) as u8
}

/// 只有带 NEON 的核心有 D16-D31
fn dreg_ok(env: &DecodeEnv, d: u8) -> bool {
    d < 16 || env.has(ArmFeatures::NEON)
}

fn vd_of(i: u32, dp: bool) -> u8 {
    if dp { dreg(bits(i, 15, 12), bit(i, 22)) } else { sreg(bits(i, 15, 12), bit(i, 22)) }
}

fn vn_of(i: u32, dp: bool) -> u8 {
    if dp { dreg(bits(i, 19, 16), bit(i, 7)) } else { sreg(bits(i, 19, 16), bit(i, 7)) }
}

fn vm_of(i: u32, dp: bool) -> u8 {
    if dp { dreg(bits(i, 3, 0), bit(i, 5)) } else { sreg(bits(i, 3, 0), bit(i, 5)) }
}

/// VFPExpandImm
pub fn expand_imm(imm8: u32, dp: bool) -> u64 {
    let sign = u64::from(imm8 >> 7);
    let b6 = imm8 & 0x40 != 0;
    let frac = u64::from(imm8 & 0x3f);
    if dp {
        let exp = if b6 { 0x3fc0_0000_0000_0000 } else { 0x4000_0000_0000_0000 };
        (sign << 63) | exp | (frac << 48)
    } else {
        let exp = if b6 { 0x3e00_0000 } else { 0x4000_0000 };
        (sign << 31) | exp | (frac << 19)
    }
}

/// 解码 VFP 编码 (位 11:9 为 101 的协处理器空间)
pub fn decode(i: u32, env: &DecodeEnv) -> Option<VfpInsn> {
    let insn = if bits(i, 27, 21) == 0b1100010 {
        decode_transfer64(i, env)
    } else if bits(i, 27, 25) == 0b110 {
        decode_load_store(i, env)
    } else if bits(i, 27, 24) == 0b1110 {
        if bit(i, 4) { decode_transfer(i, env) } else { decode_dp(i, env) }
    } else {
        None
    }?;
    if let VfpInsn::DataProc { dp: true, vd, vn, vm, op } = insn {
        let regs_ok = match op {
            VfpOp::ToInt { .. } | VfpOp::CvtPrecision => dreg_ok(env, vm),
            VfpOp::FromInt { .. } => dreg_ok(env, vd),
            _ => dreg_ok(env, vd) && dreg_ok(env, vn) && dreg_ok(env, vm),
        };
        if !regs_ok {
            return None;
        }
    }
    if let VfpInsn::DataProc { op: VfpOp::CvtPrecision, dp: false, vd, .. } = insn {
        if !dreg_ok(env, vd) {
            return None;
        }
    }
    Some(insn)
}

fn decode_dp(i: u32, env: &DecodeEnv) -> Option<VfpInsn> {
    let dp = bit(i, 8);
    let op6 = bit(i, 6);
    let opc1 = (bits(i, 23, 23) << 2) | bits(i, 21, 20);
    let (vd, vn, vm) = (vd_of(i, dp), vn_of(i, dp), vm_of(i, dp));
    let arith = |op| Some(VfpInsn::DataProc { op, dp, vd, vn, vm });
    let vfp4 = env.has(ArmFeatures::VFP4);
    match opc1 {
        0b000 => arith(if op6 { VfpOp::Mls } else { VfpOp::Mla }),
        0b001 => arith(if op6 { VfpOp::Nmla } else { VfpOp::Nmls }),
        0b010 => arith(if op6 { VfpOp::Nmul } else { VfpOp::Mul }),
        0b011 => arith(if op6 { VfpOp::Sub } else { VfpOp::Add }),
        0b100 if !op6 => arith(VfpOp::Div),
        0b101 if vfp4 => arith(if op6 { VfpOp::Fnma } else { VfpOp::Fnms }),
        0b110 if vfp4 => arith(if op6 { VfpOp::Fms } else { VfpOp::Fma }),
        0b111 => decode_dp_other(i, env, dp),
        _ => None,
    }
}

/// opc1 = 1x11：VMOV 立即数、单操作数运算、比较与转换
fn decode_dp_other(i: u32, env: &DecodeEnv, dp: bool) -> Option<VfpInsn> {
    if !bit(i, 6) {
        if !env.has(ArmFeatures::VFP3) || bits(i, 7, 4) & 0b1011 != 0 {
            return None;
        }
        let imm8 = (bits(i, 19, 16) << 4) | bits(i, 3, 0);
        return Some(VfpInsn::MovImm { dp, vd: vd_of(i, dp), imm: expand_imm(imm8, dp) });
    }
    let opc2 = bits(i, 19, 16);
    let b7 = bit(i, 7);
    let (vd, vm) = (vd_of(i, dp), vm_of(i, dp));
    let unary = |op| Some(VfpInsn::DataProc { op, dp, vd, vn: 0, vm });
    match opc2 {
        0b0000 => unary(if b7 { VfpOp::Abs } else { VfpOp::Mov }),
        0b0001 => unary(if b7 { VfpOp::Sqrt } else { VfpOp::Neg }),
        0b0100 => unary(VfpOp::Cmp { signal_nans: b7, with_zero: false }),
        0b0101 => {
            if bits(i, 5, 5) != 0 || bits(i, 3, 0) != 0 {
                return None;
            }
            unary(VfpOp::Cmp { signal_nans: b7, with_zero: true })
        }
        0b0111 if b7 => {
            // 目的寄存器是另一种精度
            let vd = vd_of(i, !dp);
            Some(VfpInsn::DataProc { op: VfpOp::CvtPrecision, dp, vd, vn: 0, vm })
        }
        0b1000 => {
            let vm = vm_of(i, false);
            Some(VfpInsn::DataProc { op: VfpOp::FromInt { signed: b7 }, dp, vd, vn: 0, vm })
        }
        0b1100 | 0b1101 => {
            let vd = vd_of(i, false);
            let op = VfpOp::ToInt { signed: opc2 & 1 != 0, round_zero: b7 };
            Some(VfpInsn::DataProc { op, dp, vd, vn: 0, vm })
        }
        _ => None,
    }
}

fn decode_load_store(i: u32, env: &DecodeEnv) -> Option<VfpInsn> {
    let (p, u, w, load) = (bit(i, 24), bit(i, 23), bit(i, 21), bit(i, 20));
    let dp = bit(i, 8);
    let rn = bits(i, 19, 16) as u8;
    let vd = vd_of(i, dp);
    let imm8 = bits(i, 7, 0);
    if p && !w {
        if dp && !dreg_ok(env, vd) {
            return None;
        }
        return Some(VfpInsn::LoadStore { load, dp, vd, rn, add: u, imm: imm8 << 2 });
    }
    // 剩下的是 VLDM/VSTM：IA (P=0 U=1) 或 DB! (P=1 U=0 W=1)
    if p == u || (p && !w) {
        return None;
    }
    if rn == 15 && (w || env.m_profile()) {
        return None;
    }
    let (count, words) = if dp { (imm8 / 2, imm8) } else { (imm8, imm8) };
    let limit = if dp && env.has(ArmFeatures::NEON) { 32 } else if dp { 16 } else { 32 };
    if count == 0 || (dp && count > 16) || u32::from(vd) + count > limit {
        return None;
    }
    Some(VfpInsn::Multiple { load, dp, vd, count: count as u8, words: words as u8, rn, add: u, wback: w })
}

fn decode_transfer64(i: u32, env: &DecodeEnv) -> Option<VfpInsn> {
    if bits(i, 7, 6) != 0 || !bit(i, 4) {
        return None;
    }
    let to_core = bit(i, 20);
    let rt = bits(i, 15, 12) as u8;
    let rt2 = bits(i, 19, 16) as u8;
    if rt == 15 || rt2 == 15 || (to_core && rt == rt2) {
        return None;
    }
    if env.m_profile() && (rt == 13 || rt2 == 13) {
        return None;
    }
    if bit(i, 8) {
        let dm = vm_of(i, true);
        if !dreg_ok(env, dm) {
            return None;
        }
        Some(VfpInsn::CoreDouble { to_core, rt, rt2, dm })
    } else {
        let sm = vm_of(i, false);
        if sm == 31 {
            return None;
        }
        Some(VfpInsn::CoreSinglePair { to_core, rt, rt2, sm })
    }
}

fn fp_reg(sel: u32, env: &DecodeEnv) -> Option<FpReg> {
    let m = env.m_profile();
    let reg = match sel {
        0b0001 => FpReg::Fpscr,
        0b0000 if !m => FpReg::Sys(FpSysReg::Fpsid),
        0b1000 if !m => FpReg::Sys(FpSysReg::Fpexc),
        0b0110 if !m => FpReg::Sys(FpSysReg::Mvfr1),
        0b0111 if !m => FpReg::Sys(FpSysReg::Mvfr0),
        0b0101 if !m && env.has(ArmFeatures::V8) => FpReg::Sys(FpSysReg::Mvfr2),
        0b0010 if m && env.has(ArmFeatures::V8_1M) => FpReg::Sys(FpSysReg::FpscrNzcvqc),
        0b1100 if env.has(ArmFeatures::MVE) => FpReg::Sys(FpSysReg::Vpr),
        0b1101 if env.has(ArmFeatures::MVE) => FpReg::Sys(FpSysReg::P0),
        _ => return None,
    };
    Some(reg)
}

fn decode_transfer(i: u32, env: &DecodeEnv) -> Option<VfpInsn> {
    let to_core = bit(i, 20);
    let rt = bits(i, 15, 12) as u8;
    let opa = bits(i, 23, 21);
    if !bit(i, 8) {
        if bits(i, 6, 5) != 0 || bits(i, 3, 0) != 0 {
            return None;
        }
        return match opa {
            0b000 => {
                if rt == 15 || (env.m_profile() && rt == 13) {
                    return None;
                }
                Some(VfpInsn::CoreSingle { to_core, rt, sn: vn_of(i, false) })
            }
            0b111 => {
                let reg = fp_reg(bits(i, 19, 16), env)?;
                if to_core {
                    // Rt=15 只允许 VMRS APSR_nzcv, FPSCR
                    if rt == 15 && reg != FpReg::Fpscr {
                        return None;
                    }
                    Some(VfpInsn::Vmrs { rt, reg })
                } else {
                    if rt == 15 {
                        return None;
                    }
                    Some(VfpInsn::Vmsr { rt, reg })
                }
            }
            _ => None,
        };
    }
    if bits(i, 3, 0) != 0 || rt == 15 {
        return None;
    }
    let simd = env.has(ArmFeatures::NEON) || env.has(ArmFeatures::MVE);
    if !to_core && bit(i, 23) {
        // VDUP
        if !env.has(ArmFeatures::NEON) || bit(i, 6) {
            return None;
        }
        let size = match (bit(i, 22), bit(i, 5)) {
            (true, false) => 0,
            (false, true) => 1,
            (false, false) => 2,
            (true, true) => return None,
        };
        let q = bit(i, 21);
        let vd = dreg(bits(i, 19, 16), bit(i, 7));
        if q && vd & 1 != 0 {
            return None;
        }
        return Some(VfpInsn::Dup { rt, vd, q, size });
    }
    let opc = (bits(i, 22, 21) << 2) | bits(i, 6, 5);
    let (size, index) = if opc & 0b1000 != 0 {
        (0, opc & 0b111)
    } else if opc & 0b0001 != 0 {
        (1, opc >> 1 & 0b11)
    } else if opc & 0b0011 == 0 {
        (2, opc >> 2 & 1)
    } else {
        return None;
    };
    if size < 2 && !simd {
        return None;
    }
    let unsigned = to_core && bit(i, 23);
    if unsigned && size == 2 {
        return None;
    }
    let dn = dreg(bits(i, 19, 16), bit(i, 7));
    if !dreg_ok(env, dn) {
        return None;
    }
    Some(VfpInsn::CoreScalar { to_core, rt, dn, size, index: index as u8, unsigned })
}

// ---- 翻译 ----

/// 短向量展开时的寄存器推进：在组内回绕
fn advance(reg: u8, delta: u8, dp: bool) -> u8 {
    let wrap = if dp { 3 } else { 7 };
    (reg & !wrap) | (reg.wrapping_add(delta) & wrap)
}

/// 需要按 FPSCR.LEN 展开的运算
fn is_vector_capable(op: VfpOp) -> bool {
    !matches!(op, VfpOp::Cmp { .. } | VfpOp::CvtPrecision | VfpOp::ToInt { .. } | VfpOp::FromInt { .. })
}

/// 展开后的 (vd, vn, vm) 序列
pub fn expand_short_vector(ctx_len: u8, stride: u8, dp: bool, vd: u8, vn: u8, vm: u8) -> Vec<(u8, u8, u8)> {
    let bank = if dp { 0x0c } else { 0x18 };
    if ctx_len <= 1 || vd & bank == 0 {
        return vec![(vd, vn, vm)];
    }
    let delta_m = if vm & bank == 0 { 0 } else { stride };
    let (mut d, mut n, mut m) = (vd, vn, vm);
    let mut out = Vec::with_capacity(usize::from(ctx_len));
    for _ in 0..ctx_len {
        out.push((d, n, m));
        d = advance(d, stride, dp);
        n = advance(n, stride, dp);
        if delta_m != 0 {
            m = advance(m, delta_m, dp);
        }
    }
    out
}

/// 非特权也能在 FPU 关闭时访问的寄存器 (A/R 档案的 FPSID/FPEXC/MVFR)
fn bypasses_enable(ctx: &DisasContext<'_>, insn: &VfpInsn) -> bool {
    let reg = match insn {
        VfpInsn::Vmrs { reg, .. } | VfpInsn::Vmsr { reg, .. } => *reg,
        _ => return false,
    };
    !ctx.flags.m_profile && ctx.flags.privileged && matches!(reg, FpReg::Sys(_))
}

pub(crate) fn translate(ctx: &mut DisasContext<'_>, insn: &VfpInsn) -> VmResult<()> {
    // A/R 档案的系统寄存器 (FPSCR 以外) 只有特权级可访问
    if let VfpInsn::Vmrs { reg: FpReg::Sys(_), .. } | VfpInsn::Vmsr { reg: FpReg::Sys(_), .. } = insn {
        if !ctx.flags.m_profile && !ctx.flags.privileged {
            ctx.undef();
            return Ok(());
        }
    }
    if !ctx.flags.vfp_enabled && !bypasses_enable(ctx, insn) {
        ctx.fp_disabled();
        return Ok(());
    }
    match *insn {
        VfpInsn::DataProc { op, dp, vd, vn, vm } => {
            let seq = if is_vector_capable(op) && !ctx.flags.m_profile {
                expand_short_vector(ctx.flags.vec_len, ctx.flags.vec_stride, dp, vd, vn, vm)
            } else {
                vec![(vd, vn, vm)]
            };
            for (vd, vn, vm) in seq {
                ctx.call_void(ArmHelper::Vfp(VfpCall { op, dp, vd, vn, vm }), &[]);
            }
        }
        VfpInsn::MovImm { dp, vd, imm } => {
            let seq = if ctx.flags.m_profile {
                vec![(vd, 0, 0)]
            } else {
                expand_short_vector(ctx.flags.vec_len, ctx.flags.vec_stride, dp, vd, 0, 0)
            };
            for (vd, _, _) in seq {
                let v = ctx.imm64(imm);
                if dp { ctx.set_d(vd, v) } else { ctx.write_s(vd, v) }
            }
        }
        VfpInsn::LoadStore { load, dp, vd, rn, add, imm } => {
            let base = ctx.load_reg_aligned(rn);
            let off = if add { imm as i32 } else { -(imm as i32) };
            let addr = ctx.add_imm32(base, off);
            let flags = ctx.mem_flags(false);
            match (load, dp) {
                (true, true) => {
                    let v = ctx.load64(addr, flags);
                    ctx.set_d(vd, v);
                }
                (true, false) => {
                    let v = ctx.load(addr, 4, false, flags);
                    ctx.write_s(vd, v);
                }
                (false, true) => {
                    let v = ctx.get_d(vd);
                    ctx.store64(v, addr, flags);
                }
                (false, false) => {
                    let v = ctx.read_s(vd);
                    ctx.store(v, addr, 4, flags);
                }
            }
        }
        VfpInsn::Multiple { load, dp, vd, count, words, rn, add, wback } => {
            let base = ctx.load_reg(rn);
            let span = i32::from(words) * 4;
            let start = if add { base } else { ctx.add_imm32(base, -span) };
            let flags = ctx.mem_flags(false);
            let step = if dp { 8 } else { 4 };
            for k in 0..count {
                let addr = ctx.add_imm32(start, i32::from(k) * step);
                let r = vd + k;
                match (load, dp) {
                    (true, true) => {
                        let v = ctx.load64(addr, flags);
                        ctx.set_d(r, v);
                    }
                    (true, false) => {
                        let v = ctx.load(addr, 4, false, flags);
                        ctx.write_s(r, v);
                    }
                    (false, true) => {
                        let v = ctx.get_d(r);
                        ctx.store64(v, addr, flags);
                    }
                    (false, false) => {
                        let v = ctx.read_s(r);
                        ctx.store(v, addr, 4, flags);
                    }
                }
            }
            if wback {
                let nb = if add { ctx.add_imm32(base, span) } else { start };
                ctx.store_reg(rn, nb);
            }
        }
        VfpInsn::CoreSingle { to_core, rt, sn } => {
            if to_core {
                let v = ctx.read_s(sn);
                ctx.store_reg(rt, v);
            } else {
                let v = ctx.load_reg(rt);
                ctx.write_s(sn, v);
            }
        }
        VfpInsn::CoreSinglePair { to_core, rt, rt2, sm } => {
            if to_core {
                let a = ctx.read_s(sm);
                let b = ctx.read_s(sm + 1);
                ctx.store_reg(rt, a);
                ctx.store_reg(rt2, b);
            } else {
                let a = ctx.load_reg(rt);
                let b = ctx.load_reg(rt2);
                ctx.write_s(sm, a);
                ctx.write_s(sm + 1, b);
            }
        }
        VfpInsn::CoreDouble { to_core, rt, rt2, dm } => {
            if to_core {
                let v = ctx.get_d(dm);
                let lo = ctx.zext32(v);
                let hi = ctx.shr_imm(v, 32);
                ctx.store_reg(rt, lo);
                ctx.store_reg(rt2, hi);
            } else {
                let lo = ctx.load_reg(rt);
                let hi = ctx.load_reg(rt2);
                let hi = ctx.shl_imm(hi, 32);
                let v = ctx.or(hi, lo);
                ctx.set_d(dm, v);
            }
        }
        VfpInsn::CoreScalar { to_core, rt, dn, size, index, unsigned } => {
            let ebits = 8u8 << size;
            let shift = index * ebits;
            let d = ctx.get_d(dn);
            if to_core {
                let v = ctx.shr_imm(d, shift);
                let v = if size == 2 {
                    ctx.zext32(v)
                } else if unsigned {
                    ctx.zext(v, ebits)
                } else {
                    let s = ctx.sext(v, ebits);
                    ctx.zext32(s)
                };
                ctx.store_reg(rt, v);
            } else {
                let emask = (1u64 << ebits) - 1;
                let kept = ctx.and_imm(d, !(emask << shift));
                let r = ctx.load_reg(rt);
                let r = ctx.and_imm(r, emask);
                let r = ctx.shl_imm(r, shift);
                let v = ctx.or(kept, r);
                ctx.set_d(dn, v);
            }
        }
        VfpInsn::Dup { rt, vd, q, size } => {
            let rep: u64 = match size {
                0 => 0x0101_0101_0101_0101,
                1 => 0x0001_0001_0001_0001,
                _ => 0x0000_0001_0000_0001,
            };
            let r = ctx.load_reg(rt);
            let e = ctx.zext(r, 8 << size);
            let k = ctx.imm64(rep);
            let v = ctx.mul(e, k);
            ctx.set_d(vd, v);
            if q {
                ctx.set_d(vd + 1, v);
            }
        }
        VfpInsn::Vmrs { rt, reg } => {
            let v = match reg {
                FpReg::Fpscr => ctx.call(ArmHelper::FpscrRead, &[]),
                FpReg::Sys(r) => ctx.call(ArmHelper::FpSysRead(r), &[]),
            };
            if rt == 15 {
                for (n, s) in [(31, slot::NF), (30, slot::ZF), (29, slot::CF), (28, slot::VF)] {
                    let b = ctx.bit(v, n);
                    ctx.set_slot(s, b);
                }
            } else {
                ctx.store_reg(rt, v);
            }
        }
        VfpInsn::Vmsr { rt, reg } => {
            let v = ctx.load_reg(rt);
            match reg {
                FpReg::Fpscr => {
                    ctx.call_void(ArmHelper::FpscrWrite, &[v]);
                    // LEN/STRIDE 是块标志的一部分
                    ctx.end_after_state_change();
                }
                FpReg::Sys(FpSysReg::Fpexc) => {
                    ctx.call_void(ArmHelper::FpSysWrite(FpSysReg::Fpexc), &[v]);
                    ctx.end_after_state_change();
                }
                FpReg::Sys(r) => ctx.call_void(ArmHelper::FpSysWrite(r), &[v]),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::CpuModel;

    fn a9() -> DecodeEnv {
        DecodeEnv::new(CpuModel::CortexA9.features())
    }

    #[test]
    fn test_decode_arith() {
        // vadd.f32 s0, s1, s2
        assert_eq!(
            decode(0xee30_0a81, &a9()),
            Some(VfpInsn::DataProc { op: VfpOp::Add, dp: false, vd: 0, vn: 1, vm: 2 })
        );
        // vmul.f64 d0, d1, d2
        assert_eq!(
            decode(0xee21_0b02, &a9()),
            Some(VfpInsn::DataProc { op: VfpOp::Mul, dp: true, vd: 0, vn: 1, vm: 2 })
        );
        // vfma.f32 s0, s1, s2
        assert_eq!(
            decode(0xeea0_0a81, &DecodeEnv::new(CpuModel::CortexA15.features())),
            Some(VfpInsn::DataProc { op: VfpOp::Fma, dp: false, vd: 0, vn: 1, vm: 2 })
        );
    }

    #[test]
    fn test_decode_fma_needs_vfp4() {
        assert_eq!(decode(0xeea0_0a81, &a9()), None);
    }

    #[test]
    fn test_decode_mov_imm_and_cvt() {
        // vmov.f32 s0, #1.0
        assert_eq!(decode(0xeeb7_0a00, &a9()), Some(VfpInsn::MovImm { dp: false, vd: 0, imm: 0x3f80_0000 }));
        // vcvt.f64.f32 d0, s1
        assert_eq!(
            decode(0xeeb7_0ae0, &a9()),
            Some(VfpInsn::DataProc { op: VfpOp::CvtPrecision, dp: false, vd: 0, vn: 0, vm: 1 })
        );
        // vcvt.s32.f32 s0, s1 (round to zero)
        assert_eq!(
            decode(0xeebd_0ae0, &a9()),
            Some(VfpInsn::DataProc {
                op: VfpOp::ToInt { signed: true, round_zero: true },
                dp: false,
                vd: 0,
                vn: 0,
                vm: 1
            })
        );
    }

    #[test]
    fn test_expand_imm() {
        assert_eq!(expand_imm(0x70, false), 0x3f80_0000);
        assert_eq!(expand_imm(0x00, true), 0x4000_0000_0000_0000);
        assert_eq!(expand_imm(0xf0, true), 0xbff0_0000_0000_0000);
    }

    #[test]
    fn test_decode_load_store_multiple() {
        // vpush {d8-d15}
        assert_eq!(
            decode(0xed2d_8b10, &a9()),
            Some(VfpInsn::Multiple {
                load: false,
                dp: true,
                vd: 8,
                count: 8,
                words: 16,
                rn: 13,
                add: false,
                wback: true
            })
        );
        // vldr s0, [r1, #-8]
        assert_eq!(
            decode(0xed11_0a02, &a9()),
            Some(VfpInsn::LoadStore { load: true, dp: false, vd: 0, rn: 1, add: false, imm: 8 })
        );
        // vldm r0, {} 的空列表
        assert_eq!(decode(0xec90_0a00, &a9()), None);
    }

    #[test]
    fn test_decode_transfers() {
        // vmov r0, s1
        assert_eq!(decode(0xee10_0a90, &a9()), Some(VfpInsn::CoreSingle { to_core: true, rt: 0, sn: 1 }));
        // vmov d0, r2, r3
        assert_eq!(
            decode(0xec43_2b10, &a9()),
            Some(VfpInsn::CoreDouble { to_core: false, rt: 2, rt2: 3, dm: 0 })
        );
        // vmrs APSR_nzcv, fpscr
        assert_eq!(decode(0xeef1_fa10, &a9()), Some(VfpInsn::Vmrs { rt: 15, reg: FpReg::Fpscr }));
        // vmov.u8 r0, d1[3]
        assert_eq!(
            decode(0xeed1_0b70, &a9()),
            Some(VfpInsn::CoreScalar { to_core: true, rt: 0, dn: 1, size: 0, index: 3, unsigned: true })
        );
        // vdup.16 q1, r0
        assert_eq!(decode(0xeea2_0b30, &a9()), Some(VfpInsn::Dup { rt: 0, vd: 2, q: true, size: 1 }));
    }

    #[test]
    fn test_m_profile_register_map() {
        let env = DecodeEnv::new(CpuModel::CortexM4.features());
        // FPEXC 不存在
        assert_eq!(decode(0xeef8_0a10, &env), None);
        assert_eq!(decode(0xeef1_0a10, &env), Some(VfpInsn::Vmrs { rt: 0, reg: FpReg::Fpscr }));
    }

    #[test]
    fn test_short_vector_expansion() {
        // LEN=4 STRIDE=1，s8 组：vd 与 vn 推进，vm 在组 0 保持标量
        let seq = expand_short_vector(4, 1, false, 8, 16, 0);
        assert_eq!(seq, vec![(8, 16, 0), (9, 17, 0), (10, 18, 0), (11, 19, 0)]);
        // 组内回绕
        let seq = expand_short_vector(3, 2, false, 12, 20, 28);
        assert_eq!(seq, vec![(12, 20, 28), (14, 22, 30), (8, 16, 24)]);
        // 目的在组 0 时是标量
        assert_eq!(expand_short_vector(4, 1, true, 2, 5, 6), vec![(2, 5, 6)]);
    }
}
