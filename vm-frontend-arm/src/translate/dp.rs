//! 数据处理、乘除法与媒体指令

use smallvec::SmallVec;
use vm_arm_cpu::bits::{ParKind, ParOp, ShiftType};
use vm_arm_cpu::helpers::{DspMulOp, SatOp};
use vm_arm_cpu::state::slot;
use vm_arm_cpu::ArmHelper;
use vm_ir::{IROp, RegId, Terminator};

use super::branch;
use crate::context::{BlockEnd, DisasContext};
use crate::decode::{BitfieldOp, DpOp, ExtendSize, MulOp, Operand2, RevKind};

/// 32 位立即数循环右移
pub(crate) fn ror_imm(ctx: &mut DisasContext<'_>, v: RegId, n: u8) -> RegId {
    let n = n & 31;
    if n == 0 {
        return v;
    }
    let lo = ctx.shr_imm(v, n);
    let hi = ctx.shl_imm(v, 32 - n);
    let r = ctx.or(lo, hi);
    ctx.zext32(r)
}

/// 不关心进位的立即数移位 (访存偏移、SSAT/USAT)
pub(crate) fn shift_imm(ctx: &mut DisasContext<'_>, v: RegId, shift: ShiftType, amount: u8) -> RegId {
    shift_imm_c(ctx, v, shift, amount, false).0
}

/// 立即数移位
///
/// `amount` 已按编码规则展开 (LSR/ASR #0 即 #32，RRX 单独成类)。
/// `want_carry` 时返回移位器进位；LSL #0 返回 `None`，C 保持不变。
pub(crate) fn shift_imm_c(
    ctx: &mut DisasContext<'_>,
    v: RegId,
    shift: ShiftType,
    amount: u8,
    want_carry: bool,
) -> (RegId, Option<RegId>) {
    match shift {
        ShiftType::Lsl if amount == 0 => (v, None),
        ShiftType::Lsl => {
            let s = ctx.shl_imm(v, amount);
            let r = ctx.zext32(s);
            let c = want_carry.then(|| ctx.bit(v, 32 - amount));
            (r, c)
        }
        ShiftType::Lsr => {
            let r = if amount >= 32 { ctx.imm(0) } else { ctx.shr_imm(v, amount) };
            let c = want_carry.then(|| ctx.bit(v, amount.clamp(1, 32) - 1));
            (r, c)
        }
        ShiftType::Asr => {
            let sv = ctx.sext(v, 32);
            let s = ctx.sar_imm(sv, amount.min(31));
            let r = ctx.zext32(s);
            let c = want_carry.then(|| ctx.bit(v, amount.clamp(1, 32) - 1));
            (r, c)
        }
        ShiftType::Ror => {
            let r = ror_imm(ctx, v, amount);
            let c = want_carry.then(|| ctx.bit(r, 31));
            (r, c)
        }
        ShiftType::Rrx => {
            let cin = ctx.get_slot(slot::CF);
            let hi = ctx.shl_imm(cin, 31);
            let lo = ctx.shr_imm(v, 1);
            let r = ctx.or(hi, lo);
            let c = want_carry.then(|| ctx.bit(v, 0));
            (r, c)
        }
    }
}

/// 第二操作数与移位器进位
fn operand2(ctx: &mut DisasContext<'_>, op2: Operand2, want_carry: bool) -> (RegId, Option<RegId>) {
    match op2 {
        Operand2::Imm { value, carry } => {
            let v = ctx.imm(value);
            let c = if want_carry { carry.map(|c| ctx.imm(u32::from(c))) } else { None };
            (v, c)
        }
        Operand2::Shifted { rm, shift, amount } => {
            let v = ctx.load_reg(rm);
            shift_imm_c(ctx, v, shift, amount, want_carry)
        }
        Operand2::RegShift { rm, shift, rs } => {
            let v = ctx.load_reg(rm);
            let s = ctx.load_reg(rs);
            let cin = ctx.get_slot(slot::CF);
            let r = ctx.call(ArmHelper::ShiftC(shift), &[v, s, cin]);
            let lo = ctx.zext32(r);
            let c = want_carry.then(|| ctx.shr_imm(r, 32));
            (lo, c)
        }
    }
}

pub(crate) fn data_proc(ctx: &mut DisasContext<'_>, op: DpOp, s: bool, rd: u8, rn: u8, op2: Operand2) {
    // A32 中 S 位且 Rd 为 PC：从 SPSR 恢复 CPSR
    let exc_return = s && rd == 15 && !ctx.thumb() && !op.is_test();
    let set = s && !exc_return;
    let (b, carry) = operand2(ctx, op2, set && op.is_logical());
    let a = if op.is_move() { b } else { ctx.load_reg(rn) };

    let r = match op {
        DpOp::And | DpOp::Tst => ctx.and(a, b),
        DpOp::Eor | DpOp::Teq => ctx.xor(a, b),
        DpOp::Orr => ctx.or(a, b),
        DpOp::Orn => {
            let nb = ctx.not32(b);
            ctx.or(a, nb)
        }
        DpOp::Bic => {
            let nb = ctx.not32(b);
            ctx.and(a, nb)
        }
        DpOp::Mov => b,
        DpOp::Mvn => ctx.not32(b),
        DpOp::Add | DpOp::Cmn => {
            let zero = ctx.imm(0);
            ctx.add_with_carry(a, b, zero, set)
        }
        DpOp::Adc => {
            let c = ctx.get_slot(slot::CF);
            ctx.add_with_carry(a, b, c, set)
        }
        DpOp::Sub | DpOp::Cmp => {
            let one = ctx.imm(1);
            ctx.sub_with_carry(a, b, one, set)
        }
        DpOp::Sbc => {
            let c = ctx.get_slot(slot::CF);
            ctx.sub_with_carry(a, b, c, set)
        }
        DpOp::Rsb => {
            let one = ctx.imm(1);
            ctx.sub_with_carry(b, a, one, set)
        }
        DpOp::Rsc => {
            let c = ctx.get_slot(slot::CF);
            ctx.sub_with_carry(b, a, c, set)
        }
    };
    if set && op.is_logical() {
        ctx.set_nz(r);
        if let Some(c) = carry {
            ctx.set_slot(slot::CF, c);
        }
    }
    if op.is_test() {
        return;
    }
    if rd != 15 {
        ctx.store_reg(rd, r);
    } else if exc_return {
        ctx.call_void(ArmHelper::ExceptionReturn, &[r]);
        let target = ctx.get_slot(slot::PC);
        ctx.jump(Terminator::JmpReg { target }, BlockEnd::StateChange);
    } else {
        branch::alu_write_pc(ctx, r);
    }
}

pub(crate) fn mov_imm16(ctx: &mut DisasContext<'_>, top: bool, rd: u8, imm: u16) {
    let v = if top {
        let old = ctx.load_reg(rd);
        let lo = ctx.and_imm(old, 0xffff);
        let hi = ctx.imm(u32::from(imm) << 16);
        ctx.or(hi, lo)
    } else {
        ctx.imm(u32::from(imm))
    };
    ctx.store_reg(rd, v);
}

pub(crate) fn adr(ctx: &mut DisasContext<'_>, rd: u8, offset: i32) {
    let base = ctx.pc_read() & !3;
    let v = ctx.imm(base.wrapping_add(offset as u32));
    ctx.store_reg(rd, v);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn mul(ctx: &mut DisasContext<'_>, op: MulOp, s: bool, rd: u8, rn: u8, rm: u8, ra: u8) {
    let a = ctx.load_reg(rn);
    let b = ctx.load_reg(rm);
    let p = ctx.mul(a, b);
    let r = match op {
        MulOp::Mul => p,
        MulOp::Mla => {
            let acc = ctx.load_reg(ra);
            ctx.add(p, acc)
        }
        MulOp::Mls => {
            let acc = ctx.load_reg(ra);
            ctx.sub(acc, p)
        }
    };
    let r = ctx.zext32(r);
    if s {
        ctx.set_nz(r);
    }
    ctx.store_reg(rd, r);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn mul_long(
    ctx: &mut DisasContext<'_>,
    signed: bool,
    accumulate: bool,
    s: bool,
    rdlo: u8,
    rdhi: u8,
    rn: u8,
    rm: u8,
) {
    let mut a = ctx.load_reg(rn);
    let mut b = ctx.load_reg(rm);
    if signed {
        a = ctx.sext(a, 32);
        b = ctx.sext(b, 32);
    }
    let mut p = ctx.mul(a, b);
    if accumulate {
        let lo = ctx.load_reg(rdlo);
        let hi = ctx.load_reg(rdhi);
        let hi = ctx.shl_imm(hi, 32);
        let acc = ctx.or(hi, lo);
        p = ctx.add(p, acc);
    }
    if s {
        let n = ctx.bit(p, 63);
        ctx.set_slot(slot::NF, n);
        let zero = ctx.imm(0);
        let z = ctx.cmp_eq(p, zero);
        ctx.set_slot(slot::ZF, z);
    }
    let lo = ctx.zext32(p);
    let hi = ctx.shr_imm(p, 32);
    ctx.store_reg(rdlo, lo);
    ctx.store_reg(rdhi, hi);
}

/// 64 位结果的形式中 `rd` 为 RdHi、`ra` 为 RdLo
pub(crate) fn dsp_mul(ctx: &mut DisasContext<'_>, op: DspMulOp, rd: u8, rn: u8, rm: u8, ra: u8) {
    let a = ctx.load_reg(rn);
    let b = ctx.load_reg(rm);
    let mut args: SmallVec<[RegId; 4]> = SmallVec::from_slice(&[a, b]);
    let wide = matches!(op, DspMulOp::Smlalxy { .. } | DspMulOp::Smlald { .. } | DspMulOp::Umaal);
    match op {
        DspMulOp::Smlaxy { .. } | DspMulOp::Smlawy { .. } | DspMulOp::Smlad { .. } | DspMulOp::Smmla { .. } => {
            args.push(ctx.load_reg(ra));
        }
        _ if wide => {
            args.push(ctx.load_reg(ra));
            args.push(ctx.load_reg(rd));
        }
        _ => {}
    }
    let r = ctx.call(ArmHelper::DspMul(op), &args);
    if wide {
        let lo = ctx.zext32(r);
        let hi = ctx.shr_imm(r, 32);
        ctx.store_reg(ra, lo);
        ctx.store_reg(rd, hi);
    } else {
        let r = ctx.zext32(r);
        ctx.store_reg(rd, r);
    }
}

/// SDIV/UDIV：除数为 0 时结果为 0
pub(crate) fn div(ctx: &mut DisasContext<'_>, signed: bool, rd: u8, rn: u8, rm: u8) {
    let mut a = ctx.load_reg(rn);
    let mut b = ctx.load_reg(rm);
    if signed {
        a = ctx.sext(a, 32);
        b = ctx.sext(b, 32);
    }
    let q = ctx.binop(|dst, src1, src2| IROp::Div { dst, src1, src2, signed }, a, b);
    let r = ctx.zext32(q);
    ctx.store_reg(rd, r);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn sat(ctx: &mut DisasContext<'_>, signed: bool, bits: u8, rd: u8, rn: u8, shift: ShiftType, amount: u8) {
    let v = ctx.load_reg(rn);
    let v = shift_imm(ctx, v, shift, amount);
    let helper = if signed { ArmHelper::SignedSat { bits } } else { ArmHelper::UnsignedSat { bits } };
    let r = ctx.call(helper, &[v]);
    ctx.store_reg(rd, r);
}

pub(crate) fn sat16(ctx: &mut DisasContext<'_>, signed: bool, bits: u8, rd: u8, rn: u8) {
    let v = ctx.load_reg(rn);
    let helper = if signed { ArmHelper::SignedSat16 { bits } } else { ArmHelper::UnsignedSat16 { bits } };
    let r = ctx.call(helper, &[v]);
    ctx.store_reg(rd, r);
}

/// QADD Rd, Rm, Rn 等：运算为 Rm op Rn
pub(crate) fn sat_arith(ctx: &mut DisasContext<'_>, op: SatOp, rd: u8, rn: u8, rm: u8) {
    let m = ctx.load_reg(rm);
    let n = ctx.load_reg(rn);
    let r = ctx.call(ArmHelper::SatArith(op), &[m, n]);
    ctx.store_reg(rd, r);
}

pub(crate) fn parallel(ctx: &mut DisasContext<'_>, op: ParOp, kind: ParKind, rd: u8, rn: u8, rm: u8) {
    let a = ctx.load_reg(rn);
    let b = ctx.load_reg(rm);
    let r = ctx.call(ArmHelper::Parallel { op, kind }, &[a, b]);
    ctx.store_reg(rd, r);
}

pub(crate) fn sel(ctx: &mut DisasContext<'_>, rd: u8, rn: u8, rm: u8) {
    let a = ctx.load_reg(rn);
    let b = ctx.load_reg(rm);
    let r = ctx.call(ArmHelper::Sel, &[a, b]);
    ctx.store_reg(rd, r);
}

pub(crate) fn usad8(ctx: &mut DisasContext<'_>, rd: u8, rn: u8, rm: u8, ra: Option<u8>) {
    let a = ctx.load_reg(rn);
    let b = ctx.load_reg(rm);
    let mut r = ctx.call(ArmHelper::Usad8, &[a, b]);
    if let Some(ra) = ra {
        let acc = ctx.load_reg(ra);
        let s = ctx.add(r, acc);
        r = ctx.zext32(s);
    }
    ctx.store_reg(rd, r);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn extend(
    ctx: &mut DisasContext<'_>,
    signed: bool,
    size: ExtendSize,
    rd: u8,
    rn: Option<u8>,
    rm: u8,
    rotate: u8,
) {
    let v = ctx.load_reg(rm);
    let v = ror_imm(ctx, v, rotate);
    let e = match size {
        ExtendSize::Byte | ExtendSize::Half => {
            let bits = if size == ExtendSize::Byte { 8 } else { 16 };
            if signed {
                let s = ctx.sext(v, bits);
                ctx.zext32(s)
            } else {
                ctx.zext(v, bits)
            }
        }
        ExtendSize::Byte16 if !signed => ctx.and_imm(v, 0x00ff_00ff),
        ExtendSize::Byte16 => {
            let lo = ctx.sext(v, 8);
            let lo = ctx.and_imm(lo, 0xffff);
            let hi = ctx.shr_imm(v, 16);
            let hi = ctx.sext(hi, 8);
            let hi = ctx.shl_imm(hi, 16);
            let hi = ctx.and_imm(hi, 0xffff_0000);
            ctx.or(hi, lo)
        }
    };
    let r = match rn {
        None => e,
        Some(rn) if size == ExtendSize::Byte16 => {
            // 两个半字分别相加，进位不跨越半字
            let a = ctx.load_reg(rn);
            let lo = ctx.add(a, e);
            let lo = ctx.and_imm(lo, 0xffff);
            let ah = ctx.and_imm(a, 0xffff_0000);
            let eh = ctx.and_imm(e, 0xffff_0000);
            let hi = ctx.add(ah, eh);
            let hi = ctx.and_imm(hi, 0xffff_0000);
            ctx.or(hi, lo)
        }
        Some(rn) => {
            let a = ctx.load_reg(rn);
            let s = ctx.add(a, e);
            ctx.zext32(s)
        }
    };
    ctx.store_reg(rd, r);
}

/// PKHBT 取 Rn 低半与 Rm<<n 高半；PKHTB 取 Rn 高半与 Rm>>n 低半 (#0 即 #32)
pub(crate) fn pkh(ctx: &mut DisasContext<'_>, tb: bool, rd: u8, rn: u8, rm: u8, amount: u8) {
    let a = ctx.load_reg(rn);
    let b = ctx.load_reg(rm);
    let (hi, lo) = if tb {
        let sb = ctx.sext(b, 32);
        let sh = ctx.sar_imm(sb, if amount == 0 { 31 } else { amount });
        let lo = ctx.and_imm(sh, 0xffff);
        (ctx.and_imm(a, 0xffff_0000), lo)
    } else {
        let sh = ctx.shl_imm(b, amount);
        let hi = ctx.and_imm(sh, 0xffff_0000);
        (hi, ctx.and_imm(a, 0xffff))
    };
    let r = ctx.or(hi, lo);
    ctx.store_reg(rd, r);
}

pub(crate) fn rev(ctx: &mut DisasContext<'_>, kind: RevKind, rd: u8, rm: u8) {
    let v = ctx.load_reg(rm);
    let helper = match kind {
        RevKind::Rev => ArmHelper::Rev,
        RevKind::Rev16 => ArmHelper::Rev16,
        RevKind::Revsh => ArmHelper::Revsh,
        RevKind::Rbit => ArmHelper::Rbit,
    };
    let r = ctx.call(helper, &[v]);
    ctx.store_reg(rd, r);
}

pub(crate) fn clz(ctx: &mut DisasContext<'_>, rd: u8, rm: u8) {
    let v = ctx.load_reg(rm);
    let r = ctx.call(ArmHelper::Clz, &[v]);
    ctx.store_reg(rd, r);
}

pub(crate) fn bitfield(ctx: &mut DisasContext<'_>, op: BitfieldOp, rd: u8, rn: u8, lsb: u8, width: u8) {
    let field = if width >= 32 { u64::from(u32::MAX) } else { (1u64 << width) - 1 };
    let placed = (field << lsb) & 0xffff_ffff;
    let r = match op {
        BitfieldOp::Bfc => {
            let d = ctx.load_reg(rd);
            ctx.and_imm(d, !placed & 0xffff_ffff)
        }
        BitfieldOp::Bfi => {
            let d = ctx.load_reg(rd);
            let n = ctx.load_reg(rn);
            let ins = ctx.shl_imm(n, lsb);
            let ins = ctx.and_imm(ins, placed);
            let keep = ctx.and_imm(d, !placed & 0xffff_ffff);
            ctx.or(keep, ins)
        }
        BitfieldOp::Ubfx => {
            let n = ctx.load_reg(rn);
            let s = ctx.shr_imm(n, lsb);
            ctx.and_imm(s, field)
        }
        BitfieldOp::Sbfx => {
            let n = ctx.load_reg(rn);
            let s = ctx.shr_imm(n, lsb);
            let s = ctx.sext(s, width);
            ctx.zext32(s)
        }
    };
    ctx.store_reg(rd, r);
}
