//! Advanced SIMD (NEON) 解码与翻译
//!
//! 解码器只接受 A32 形式 (`1111 001U` 数据处理、`1111 0100` 元素访存)，
//! T32 编码由 thumb32 换位后送进来。每组指令都有自己的元素大小合法性
//! 规则，非法组合与奇数编号的 Q 寄存器直接解码失败。
//!
//! 运算本身交给 `ArmHelper::Neon`；修改立即数与 VLD1/VST1 直接展开成 IR。

use vm_arm_cpu::helpers::neon::ZeroCmp;
use vm_arm_cpu::helpers::{NeonCall, NeonOp};
use vm_arm_cpu::{ArmFeatures, ArmHelper};
use vm_core::VmResult;
use vm_ir::MemFlags;

use crate::context::DisasContext;
use crate::decode::{DecodeEnv, bit, bits};

/// 单寄存器修改立即数的运算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModImmOp {
    Mov,
    Mvn,
    Orr,
    Bic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeonInsn {
    /// 由辅助函数整体完成的运算
    Op(NeonCall),
    /// VMOV/VMVN/VORR/VBIC 立即数；`imm` 为展开后的 64 位值
    ModImm { op: ModImmOp, q: bool, vd: u8, imm: u64 },
    /// VLD1/VST1 (多个单元素)；`rm` 为 15 表示不写回，13 表示按传输长度写回
    Ld1St1 { load: bool, vd: u8, regs: u8, size: u8, align: u8, rn: u8, rm: u8 },
}

fn vd(i: u32) -> u8 {
    ((bits(i, 22, 22) << 4) | bits(i, 15, 12)) as u8
}

fn vn(i: u32) -> u8 {
    ((bits(i, 7, 7) << 4) | bits(i, 19, 16)) as u8
}

fn vm(i: u32) -> u8 {
    ((bits(i, 5, 5) << 4) | bits(i, 3, 0)) as u8
}

fn odd_q(q: bool, regs: &[u8]) -> bool {
    q && regs.iter().any(|r| r & 1 != 0)
}

pub fn decode(i: u32, env: &DecodeEnv) -> Option<NeonInsn> {
    if !env.has(ArmFeatures::NEON) {
        return None;
    }
    if bits(i, 31, 24) == 0b1111_0100 {
        return decode_load_store(i);
    }
    if bits(i, 31, 25) != 0b1111_001 {
        return None;
    }
    let u = bit(i, 24);
    let a = bits(i, 23, 19);
    let c = bits(i, 7, 4);
    if a & 0b10000 == 0 {
        return decode_three_same(i, env);
    }
    if c & 1 == 1 {
        if a & 0b10111 == 0b10000 && !bit(i, 7) {
            return decode_mod_imm(i);
        }
        return decode_shift(i);
    }
    if a & 0b10110 == 0b10110 {
        if !u {
            return decode_ext(i);
        }
        return match bits(i, 11, 10) {
            0b00 | 0b01 => decode_two_misc(i),
            0b10 => decode_tbl(i),
            _ if bits(i, 11, 7) == 0b11000 => decode_dup_scalar(i),
            _ => None,
        };
    }
    // 三寄存器长度不同、两寄存器加标量：未实现
    None
}

fn call(op: NeonOp, size: u8, q: bool, unsigned: bool, vd: u8, vn: u8, vm: u8) -> Option<NeonInsn> {
    Some(NeonInsn::Op(NeonCall { op, size, q, unsigned, vd, vn, vm }))
}

fn decode_three_same(i: u32, env: &DecodeEnv) -> Option<NeonInsn> {
    let u = bit(i, 24);
    let size = bits(i, 21, 20) as u8;
    let q = bit(i, 6);
    let b4 = bit(i, 4);
    let (d, n, m) = (vd(i), vn(i), vm(i));
    if odd_q(q, &[d, n, m]) {
        return None;
    }
    let opc = bits(i, 11, 8);
    if opc >= 0b1100 {
        return decode_three_same_float(i, env, u, q, d, n, m);
    }
    // (运算, 允许 64 位元素)
    let (op, allow64) = match (opc, b4, u) {
        (0b0000, false, _) => (NeonOp::Hadd, false),
        (0b0000, true, _) => (NeonOp::Qadd, true),
        (0b0001, false, _) => (NeonOp::Rhadd, false),
        (0b0001, true, _) => {
            let op = match (u, size) {
                (false, 0) => NeonOp::And,
                (false, 1) => NeonOp::Bic,
                (false, 2) => NeonOp::Orr,
                (false, _) => NeonOp::Orn,
                (true, 0) => NeonOp::Eor,
                (true, 1) => NeonOp::Bsl,
                (true, 2) => NeonOp::Bit,
                (true, _) => NeonOp::Bif,
            };
            return call(op, 0, q, u, d, n, m);
        }
        (0b0010, false, _) => (NeonOp::Hsub, false),
        (0b0010, true, _) => (NeonOp::Qsub, true),
        (0b0011, false, _) => (NeonOp::Cgt, false),
        (0b0011, true, _) => (NeonOp::Cge, false),
        (0b0100 | 0b0101, _, _) => {
            let op = match (opc & 1 != 0, b4) {
                (false, false) => NeonOp::Shl,
                (false, true) => NeonOp::Qshl,
                (true, false) => NeonOp::Rshl,
                (true, true) => NeonOp::Qrshl,
            };
            // 被移位的是 Vm，移位量在 Vn
            return call(op, size, q, u, d, m, n);
        }
        (0b0110, false, _) => (NeonOp::Max, false),
        (0b0110, true, _) => (NeonOp::Min, false),
        (0b0111, false, _) => (NeonOp::Abd, false),
        (0b0111, true, _) => (NeonOp::Aba, false),
        (0b1000, false, false) => (NeonOp::Add, true),
        (0b1000, false, true) => (NeonOp::Sub, true),
        (0b1000, true, false) => (NeonOp::Tst, false),
        (0b1000, true, true) => (NeonOp::Ceq, false),
        (0b1001, false, false) => (NeonOp::Mla, false),
        (0b1001, false, true) => (NeonOp::Mls, false),
        (0b1001, true, false) => (NeonOp::Mul, false),
        (0b1001, true, true) => {
            if size != 0 {
                return None;
            }
            (NeonOp::Pmul, false)
        }
        (0b1010, _, _) | (0b1011, true, false) => {
            let op = match (opc, b4) {
                (0b1010, false) => NeonOp::Pmax,
                (0b1010, true) => NeonOp::Pmin,
                _ => NeonOp::Padd,
            };
            if q || size == 3 {
                return None;
            }
            (op, false)
        }
        (0b1011, false, _) => {
            if size == 0 || size == 3 {
                return None;
            }
            (if u { NeonOp::Qrdmulh } else { NeonOp::Qdmulh }, false)
        }
        _ => return None,
    };
    if size == 3 && !allow64 {
        return None;
    }
    call(op, size, q, u, d, n, m)
}

fn decode_three_same_float(i: u32, env: &DecodeEnv, u: bool, q: bool, d: u8, n: u8, m: u8) -> Option<NeonInsn> {
    if bit(i, 20) {
        return None;
    }
    let opc = bits(i, 11, 8);
    let hi = bit(i, 21);
    let op = match (opc, bit(i, 4), u, hi) {
        (0b1100, true, false, false) if env.has(ArmFeatures::VFP4) => NeonOp::Fma,
        (0b1100, true, false, true) if env.has(ArmFeatures::VFP4) => NeonOp::Fms,
        (0b1101, false, false, false) => NeonOp::Fadd,
        (0b1101, false, false, true) => NeonOp::Fsub,
        (0b1101, false, true, false) => NeonOp::Fpadd,
        (0b1101, false, true, true) => NeonOp::Fabd,
        (0b1101, true, false, false) => NeonOp::Fmla,
        (0b1101, true, false, true) => NeonOp::Fmls,
        (0b1101, true, true, false) => NeonOp::Fmul,
        (0b1110, false, false, false) => NeonOp::Fceq,
        (0b1110, false, true, false) => NeonOp::Fcge,
        (0b1110, false, true, true) => NeonOp::Fcgt,
        (0b1110, true, true, false) => NeonOp::Facge,
        (0b1110, true, true, true) => NeonOp::Facgt,
        (0b1111, false, false, false) => NeonOp::Fmax,
        (0b1111, false, false, true) => NeonOp::Fmin,
        (0b1111, false, true, false) => NeonOp::Fpmax,
        (0b1111, false, true, true) => NeonOp::Fpmin,
        (0b1111, true, false, false) => NeonOp::Frecps,
        (0b1111, true, false, true) => NeonOp::Frsqrts,
        _ => return None,
    };
    if q && matches!(op, NeonOp::Fpadd | NeonOp::Fpmax | NeonOp::Fpmin) {
        return None;
    }
    call(op, 2, q, false, d, n, m)
}

/// AdvSIMDExpandImm；`None` 为未分配编码
pub fn expand_mod_imm(op: bool, cmode: u32, imm8: u32) -> Option<u64> {
    let imm8 = u64::from(imm8);
    let rep32 = |v: u64| (v << 32) | v;
    let rep16 = |v: u64| v * 0x0001_0001_0001_0001;
    let v = match cmode >> 1 {
        0b000 => rep32(imm8),
        0b001 => rep32(imm8 << 8),
        0b010 => rep32(imm8 << 16),
        0b011 => rep32(imm8 << 24),
        0b100 => rep16(imm8),
        0b101 => rep16(imm8 << 8),
        0b110 if cmode & 1 == 0 => rep32((imm8 << 8) | 0xff),
        0b110 => rep32((imm8 << 16) | 0xffff),
        _ if cmode & 1 == 0 && !op => imm8 * 0x0101_0101_0101_0101,
        _ if cmode & 1 == 0 => (0..8u32)
            .filter(|b| imm8 & (1u64 << b) != 0)
            .fold(0u64, |acc, b| acc | (0xffu64 << (8 * b))),
        _ if !op => rep32(crate::vfp::expand_imm(imm8 as u32, false)),
        _ => return None,
    };
    Some(v)
}

fn decode_mod_imm(i: u32) -> Option<NeonInsn> {
    let q = bit(i, 6);
    let d = vd(i);
    if odd_q(q, &[d]) {
        return None;
    }
    let cmode = bits(i, 11, 8);
    let op = bit(i, 5);
    let imm8 = (bits(i, 24, 24) << 7) | (bits(i, 18, 16) << 4) | bits(i, 3, 0);
    let imm = expand_mod_imm(op, cmode, imm8)?;
    // cmode 0xx1/10x1 是 VORR/VBIC，其余是 VMOV/VMVN
    let logical = cmode & 1 == 1 && cmode < 0b1100;
    let kind = match (op, logical) {
        (false, false) => ModImmOp::Mov,
        (false, true) => ModImmOp::Orr,
        (true, true) => ModImmOp::Bic,
        // op=1 的 cmode 1110 是 64 位 VMOV
        (true, false) if cmode == 0b1110 => ModImmOp::Mov,
        (true, false) => ModImmOp::Mvn,
    };
    Some(NeonInsn::ModImm { op: kind, q, vd: d, imm })
}

/// 由 L:imm6 得到元素大小 (log2 字节)
fn shift_size(l: bool, imm6: u32) -> Option<u8> {
    if l {
        Some(3)
    } else if imm6 & 0b100000 != 0 {
        Some(2)
    } else if imm6 & 0b010000 != 0 {
        Some(1)
    } else if imm6 & 0b001000 != 0 {
        Some(0)
    } else {
        None
    }
}

fn decode_shift(i: u32) -> Option<NeonInsn> {
    let u = bit(i, 24);
    let l = bit(i, 7);
    let q = bit(i, 6);
    let imm6 = bits(i, 21, 16);
    let size = shift_size(l, imm6)?;
    let esize = 8u32 << size;
    // L=1 时 imm6 直接是左移量，右移量为 64 - imm6
    let right = (if l { 64 } else { 2 * esize } - imm6) as u8;
    let left = (if l { imm6 } else { imm6 - esize }) as u8;
    let (d, m) = (vd(i), vm(i));
    let opc = bits(i, 11, 8);
    let op = match (opc, u) {
        (0b0000, _) => NeonOp::Shr { shift: right, round: false, accumulate: false },
        (0b0001, _) => NeonOp::Shr { shift: right, round: false, accumulate: true },
        (0b0010, _) => NeonOp::Shr { shift: right, round: true, accumulate: false },
        (0b0011, _) => NeonOp::Shr { shift: right, round: true, accumulate: true },
        (0b0100, true) => NeonOp::Sri { shift: right },
        (0b0101, false) => NeonOp::ShlImm { shift: left },
        (0b0101, true) => NeonOp::Sli { shift: left },
        (0b0110, true) => NeonOp::QshlImm { shift: left, to_unsigned: true },
        (0b0111, _) => NeonOp::QshlImm { shift: left, to_unsigned: false },
        (0b1000, false) => {
            // VSHRN/VRSHRN：元素大小指目的，位 6 选择舍入
            if l || m & 1 != 0 {
                return None;
            }
            return call(NeonOp::Shrn { shift: right, round: q }, size, false, true, d, 0, m);
        }
        (0b1010, _) => {
            // VSHLL/VMOVL：元素大小指源
            if l || q || d & 1 != 0 {
                return None;
            }
            return call(NeonOp::Shll { shift: left }, size, false, u, d, 0, m);
        }
        _ => return None,
    };
    if odd_q(q, &[d, m]) {
        return None;
    }
    call(op, size, q, u, d, 0, m)
}

fn decode_two_misc(i: u32) -> Option<NeonInsn> {
    let size = bits(i, 19, 18) as u8;
    let q = bit(i, 6);
    let (d, m) = (vd(i), vm(i));
    let opc = bits(i, 10, 7);
    let op = match bits(i, 17, 16) {
        0b00 => match opc {
            0b0000 if size < 3 => NeonOp::Rev { container: 8 },
            0b0001 if size < 2 => NeonOp::Rev { container: 4 },
            0b0010 if size < 1 => NeonOp::Rev { container: 2 },
            0b1000 if size < 3 => NeonOp::Cls,
            0b1001 if size < 3 => NeonOp::Clz,
            0b1010 if size == 0 => NeonOp::Cnt,
            0b1011 if size == 0 => NeonOp::Mvn,
            0b1110 if size < 3 => NeonOp::Qabs,
            0b1111 if size < 3 => NeonOp::Qneg,
            _ => return None,
        },
        0b01 => {
            let float = opc & 0b1000 != 0;
            if (float && size != 2) || size == 3 {
                return None;
            }
            match opc & 0b111 {
                0b000 => NeonOp::CmpZero { cond: ZeroCmp::Gt, float },
                0b001 => NeonOp::CmpZero { cond: ZeroCmp::Ge, float },
                0b010 => NeonOp::CmpZero { cond: ZeroCmp::Eq, float },
                0b011 => NeonOp::CmpZero { cond: ZeroCmp::Le, float },
                0b100 => NeonOp::CmpZero { cond: ZeroCmp::Lt, float },
                0b110 if float => NeonOp::Fabs,
                0b111 if float => NeonOp::Fneg,
                0b110 => NeonOp::Abs,
                0b111 => NeonOp::Neg,
                _ => return None,
            }
        }
        0b10 => match opc {
            0b0000 if size == 0 => NeonOp::Swp,
            0b0001 if size < 3 => NeonOp::Trn,
            0b0010 | 0b0011 if size < 3 && (q || size < 2) => {
                if opc == 0b0010 { NeonOp::Uzp } else { NeonOp::Zip }
            }
            0b0100 if !q && size < 3 => {
                // VMOVN：源为 Q，目的为 D
                if m & 1 != 0 {
                    return None;
                }
                return call(NeonOp::Movn, size, false, true, d, 0, m);
            }
            _ => return None,
        },
        _ => return None,
    };
    if odd_q(q, &[d, m]) {
        return None;
    }
    call(op, size, q, false, d, 0, m)
}

fn decode_ext(i: u32) -> Option<NeonInsn> {
    let q = bit(i, 6);
    let imm4 = bits(i, 11, 8) as u8;
    let (d, n, m) = (vd(i), vn(i), vm(i));
    if (!q && imm4 > 7) || odd_q(q, &[d, n, m]) {
        return None;
    }
    call(NeonOp::Ext { imm: imm4 }, 0, q, true, d, n, m)
}

fn decode_tbl(i: u32) -> Option<NeonInsn> {
    let len = bits(i, 9, 8) as u8 + 1;
    let n = vn(i);
    if u32::from(n) + u32::from(len) > 32 {
        return None;
    }
    call(NeonOp::Tbl { len, extension: bit(i, 6) }, 0, false, true, vd(i), n, vm(i))
}

fn decode_dup_scalar(i: u32) -> Option<NeonInsn> {
    let q = bit(i, 6);
    let imm4 = bits(i, 19, 16);
    let (size, index) = if imm4 & 1 != 0 {
        (0, imm4 >> 1)
    } else if imm4 & 0b11 == 0b10 {
        (1, imm4 >> 2)
    } else if imm4 & 0b111 == 0b100 {
        (2, imm4 >> 3)
    } else {
        return None;
    };
    let d = vd(i);
    if odd_q(q, &[d]) {
        return None;
    }
    call(NeonOp::DupScalar { index: index as u8 }, size, q, true, d, 0, vm(i))
}

fn decode_load_store(i: u32) -> Option<NeonInsn> {
    // 只实现多个单元素形式 (VLD1/VST1)
    if bit(i, 23) || bit(i, 20) {
        return None;
    }
    let regs = match bits(i, 11, 8) {
        0b0111 => 1,
        0b1010 => 2,
        0b0110 => 3,
        0b0010 => 4,
        _ => return None,
    };
    let align = bits(i, 5, 4) as u8;
    let illegal_align = match regs {
        1 | 3 => align & 0b10 != 0,
        2 => align == 0b11,
        _ => false,
    };
    let d = vd(i);
    let rn = bits(i, 19, 16) as u8;
    if illegal_align || rn == 15 || u32::from(d) + regs > 32 {
        return None;
    }
    Some(NeonInsn::Ld1St1 {
        load: bit(i, 21),
        vd: d,
        regs: regs as u8,
        size: bits(i, 7, 6) as u8,
        align,
        rn,
        rm: bits(i, 3, 0) as u8,
    })
}

// ---- 翻译 ----

pub(crate) fn translate(ctx: &mut DisasContext<'_>, insn: &NeonInsn) -> VmResult<()> {
    if !ctx.flags.vfp_enabled {
        ctx.fp_disabled();
        return Ok(());
    }
    match *insn {
        NeonInsn::Op(c) => ctx.call_void(ArmHelper::Neon(c), &[]),
        NeonInsn::ModImm { op, q, vd, imm } => {
            for r in 0..if q { 2 } else { 1 } {
                let v = match op {
                    ModImmOp::Mov => ctx.imm64(imm),
                    ModImmOp::Mvn => ctx.imm64(!imm),
                    ModImmOp::Orr => {
                        let cur = ctx.get_d(vd + r);
                        let k = ctx.imm64(imm);
                        ctx.or(cur, k)
                    }
                    ModImmOp::Bic => {
                        let cur = ctx.get_d(vd + r);
                        ctx.and_imm(cur, !imm)
                    }
                };
                ctx.set_d(vd + r, v);
            }
        }
        NeonInsn::Ld1St1 { load, vd, regs, size, align, rn, rm } => {
            translate_ld1st1(ctx, load, vd, regs, size, align, rn, rm);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn translate_ld1st1(ctx: &mut DisasContext<'_>, load: bool, vd: u8, regs: u8, size: u8, align: u8, rn: u8, rm: u8) {
    let base = ctx.load_reg(rn);
    let esize = 1u8 << size;
    let flags = ctx.mem_flags(false);
    let mut first = true;
    for r in 0..regs {
        let reg_off = i32::from(r) * 8;
        if size == 3 {
            let addr = ctx.add_imm32(base, reg_off);
            let f = first_flags(flags, align, &mut first);
            if load {
                let v = ctx.load64(addr, f);
                ctx.set_d(vd + r, v);
            } else {
                let v = ctx.get_d(vd + r);
                ctx.store64(v, addr, f);
            }
            continue;
        }
        let cur = if load { None } else { Some(ctx.get_d(vd + r)) };
        let mut built = None;
        for e in 0..8 / esize {
            let addr = ctx.add_imm32(base, reg_off + i32::from(e * esize));
            let f = first_flags(flags, align, &mut first);
            let shift = e * esize * 8;
            if let Some(cur) = cur {
                let v = ctx.shr_imm(cur, shift);
                ctx.store(v, addr, esize, f);
            } else {
                let v = ctx.load(addr, esize, false, f);
                let v = if shift == 0 { v } else { ctx.shl_imm(v, shift) };
                built = Some(match built {
                    Some(prev) => ctx.or(prev, v),
                    None => v,
                });
            }
        }
        if let Some(v) = built {
            ctx.set_d(vd + r, v);
        }
    }
    match rm {
        15 => {}
        13 => {
            let nb = ctx.add_imm32(base, i32::from(regs) * 8);
            ctx.store_reg(rn, nb);
        }
        _ => {
            let off = ctx.load_reg(rm);
            let sum = ctx.add(base, off);
            let nb = ctx.zext32(sum);
            ctx.store_reg(rn, nb);
        }
    }
}

/// 对齐检查只作用于第一次访问 (起始地址)
fn first_flags(flags: MemFlags, align: u8, first: &mut bool) -> MemFlags {
    if *first && align != 0 {
        *first = false;
        MemFlags { align: 4 << align, ..flags }
    } else {
        *first = false;
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::CpuModel;

    fn env() -> DecodeEnv {
        DecodeEnv::new(CpuModel::CortexA9.features())
    }

    fn op(i: u32) -> Option<NeonCall> {
        match decode(i, &env()) {
            Some(NeonInsn::Op(c)) => Some(c),
            _ => None,
        }
    }

    #[test]
    fn test_three_same_integer() {
        // vadd.i32 q0, q1, q2
        let c = op(0xf222_0844).unwrap();
        assert_eq!((c.op, c.size, c.q, c.vd, c.vn, c.vm), (NeonOp::Add, 2, true, 0, 2, 4));
        // vadd.i64 d0, d1, d2 允许 64 位元素
        assert_eq!(op(0xf231_0802).map(|c| c.size), Some(3));
        // vmul.i64 不存在
        assert_eq!(op(0xf231_0912), None);
        // vshl.s8 d0, d1, d2：Vm 是被移位的值
        let c = op(0xf202_0401).unwrap();
        assert_eq!((c.op, c.vn, c.vm), (NeonOp::Shl, 1, 2));
    }

    #[test]
    fn test_odd_q_register_rejected() {
        // vadd.i32 q0, q1, "q2" 但 Vm 为 d5
        assert_eq!(op(0xf222_0845), None);
    }

    #[test]
    fn test_logic_and_pairwise() {
        // veor d0, d1, d2
        assert_eq!(op(0xf301_0112).map(|c| c.op), Some(NeonOp::Eor));
        // vpadd.i16 d0, d1, d2
        assert_eq!(op(0xf211_0b12).map(|c| (c.op, c.size)), Some((NeonOp::Padd, 1)));
        // Q 形式的 vpadd 未分配
        assert_eq!(op(0xf212_0b54), None);
    }

    #[test]
    fn test_mod_imm() {
        // vmov.i32 q0, #0xff
        assert_eq!(
            decode(0xf387_005f, &env()),
            Some(NeonInsn::ModImm { op: ModImmOp::Mov, q: true, vd: 0, imm: 0x0000_00ff_0000_00ff })
        );
        // vmov.i64 d0, #0xff00ff00ff00ff00
        assert_eq!(expand_mod_imm(true, 0b1110, 0xaa), Some(0xff00_ff00_ff00_ff00));
        assert_eq!(expand_mod_imm(true, 0b1111, 0), None);
    }

    #[test]
    fn test_shift_immediates() {
        // vshr.u8 d0, d1, #3
        let c = op(0xf38d_0011).unwrap();
        assert_eq!(c.op, NeonOp::Shr { shift: 3, round: false, accumulate: false });
        assert!(c.unsigned);
        assert_eq!(c.size, 0);
        // vshl.i32 q0, q1, #5
        let c = op(0xf2a5_0552).unwrap();
        assert_eq!((c.op, c.size), (NeonOp::ShlImm { shift: 5 }, 2));
        // vmovl.u16 q0, d2
        let c = op(0xf390_0a12).unwrap();
        assert_eq!((c.op, c.size, c.vd, c.vm), (NeonOp::Shll { shift: 0 }, 1, 0, 2));
    }

    #[test]
    fn test_two_misc_sizes() {
        // vcnt.8 d0, d1
        assert_eq!(op(0xf3b0_0501).map(|c| c.op), Some(NeonOp::Cnt));
        // vcnt.16 非法
        assert_eq!(op(0xf3b4_0501), None);
        // vrev32.16 d0, d1
        assert_eq!(op(0xf3b4_0081).map(|c| c.op), Some(NeonOp::Rev { container: 4 }));
        // vzip.32 d0, d1 非法 (D 形式 32 位)
        assert_eq!(op(0xf3ba_0181), None);
    }

    #[test]
    fn test_ext_tbl_dup() {
        // vext.8 d0, d1, d2, #3
        assert_eq!(op(0xf2b1_0302).map(|c| c.op), Some(NeonOp::Ext { imm: 3 }));
        // vtbl.8 d0, {d1, d2}, d3
        assert_eq!(op(0xf3b1_0903).map(|c| c.op), Some(NeonOp::Tbl { len: 2, extension: false }));
        // vdup.16 d0, d1[2]
        let c = op(0xf3ba_0c01).unwrap();
        assert_eq!((c.op, c.size), (NeonOp::DupScalar { index: 2 }, 1));
    }

    #[test]
    fn test_vld1() {
        // vld1.32 {d0-d1}, [r0]!
        assert_eq!(
            decode(0xf420_0a8d, &env()),
            Some(NeonInsn::Ld1St1 { load: true, vd: 0, regs: 2, size: 2, align: 0, rn: 0, rm: 13 })
        );
        // 单寄存器的 align=1x 非法
        assert_eq!(decode(0xf420_07af, &env()), None);
        // 没有 NEON 的核心
        assert_eq!(decode(0xf420_0a8d, &DecodeEnv::new(CpuModel::CortexR5.features())), None);
    }
}
