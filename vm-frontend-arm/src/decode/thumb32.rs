//! 32 位 Thumb-2 解码
//!
//! 指令按 `hw1:hw2` 拼成一个字再解码。Thumb-2 之前的核只有 BL/BLX 前后缀对
//! 是 32 位的，这里按 J1=J2=1 的 T4 编码统一处理。

use vm_arm_cpu::bits::{Cond, ParKind, ParOp, ShiftType, decode_imm_shift, thumb_expand_imm_c};
use vm_arm_cpu::helpers::{DspMulOp, SatOp};
use vm_arm_cpu::ArmFeatures;
use vm_core::VmResult;

use super::{
    AddrMode, BarrierKind, BitfieldOp, BlockMode, DecodeEnv, DecodedInsn, DpOp, ExtendSize, HintOp, Insn, MemAccess,
    MemOffset, MsrSrc, MulOp, Operand2, RevKind, bit, bits, finish, msr_mask, reg, sext,
};

/// 解码一条 32 位 Thumb 指令
pub fn decode(hw1: u16, hw2: u16, pc: u32, env: &DecodeEnv, it_cond: Cond) -> VmResult<DecodedInsn> {
    let i = (u32::from(hw1) << 16) | u32::from(hw2);
    if env.has(ArmFeatures::THUMB2)
        && bits(i, 31, 27) == 0b11110
        && bits(i, 15, 14) == 0b10
        && !bit(i, 12)
        && bits(i, 25, 23) != 0b111
    {
        // B<cond>.W：条件在编码里，IT 块中不可用
        let insn = (!env.in_it).then(|| Insn::Branch { link: false, offset: cond_branch_offset(i) });
        return finish(pc, i, 4, Cond::from_nibble(bits(i, 25, 22)), insn);
    }
    finish(pc, i, 4, it_cond, decode_insn(i, env))
}

/// T3 条件分支：S:J2:J1:imm6:imm11:0
fn cond_branch_offset(i: u32) -> i32 {
    let v = ((bit(i, 26) as u32) << 20)
        | ((bit(i, 11) as u32) << 19)
        | ((bit(i, 13) as u32) << 18)
        | (bits(i, 21, 16) << 12)
        | (bits(i, 10, 0) << 1);
    sext(v, 21)
}

/// T4 无条件分支 / BL / BLX：S:I1:I2:imm10:imm11:0
fn branch_offset(i: u32) -> i32 {
    let s = bit(i, 26);
    let i1 = !(bit(i, 13) ^ s);
    let i2 = !(bit(i, 11) ^ s);
    let v = ((s as u32) << 24)
        | ((i1 as u32) << 23)
        | ((i2 as u32) << 22)
        | (bits(i, 25, 16) << 12)
        | (bits(i, 10, 0) << 1);
    sext(v, 25)
}

fn decode_insn(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if !env.has(ArmFeatures::THUMB2) {
        if bits(i, 31, 27) == 0b11110 && bit(i, 15) && bit(i, 14) && bit(i, 13) && bit(i, 11) {
            return decode_branch_misc(i, env);
        }
        return None;
    }
    match bits(i, 28, 27) {
        0b01 => {
            if bit(i, 26) {
                decode_coproc_space(i, env)
            } else if bit(i, 25) {
                decode_dp_shifted(i, env)
            } else if bit(i, 22) {
                decode_dual_exclusive(i, env)
            } else {
                decode_block(i, env)
            }
        }
        0b10 => {
            if bit(i, 15) {
                decode_branch_misc(i, env)
            } else if bit(i, 25) {
                decode_dp_plain_imm(i, env)
            } else {
                decode_dp_mod_imm(i)
            }
        }
        0b11 => {
            if bit(i, 26) {
                return decode_coproc_space(i, env);
            }
            let load = bit(i, 20);
            match bits(i, 26, 24) {
                0b000 if !load => decode_load_store_single(i, env),
                0b001 if !load => {
                    // Advanced SIMD 元素/结构访存：0xf9 -> 0xf4
                    if !env.has(ArmFeatures::NEON) {
                        return None;
                    }
                    crate::neon::decode((i & 0x00ff_ffff) | 0xf400_0000, env).map(Insn::Neon)
                }
                0b000 | 0b001 => decode_load_store_single(i, env),
                0b010 => decode_dp_register(i, env),
                _ if !bit(i, 23) => decode_multiply(i, env),
                _ => decode_long_multiply(i, env),
            }
        }
        _ => None,
    }
}

fn decode_block(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let mode = match bits(i, 24, 23) {
        0b01 => BlockMode::Ia,
        0b10 => BlockMode::Db,
        // SRS/RFE
        _ => return None,
    };
    let wback = bit(i, 21);
    let load = bit(i, 20);
    let rn = reg(i, 16);
    let regs = bits(i, 15, 0) as u16;
    if rn == 15 || regs == 0 || regs & (1 << 13) != 0 {
        return None;
    }
    if load {
        if regs & 0xc000 == 0xc000 || (regs & 0x8000 != 0 && !env.outside_or_last_in_it()) {
            return None;
        }
    } else if regs & 0x8000 != 0 {
        return None;
    }
    if wback && regs & (1 << rn) != 0 {
        return None;
    }
    Some(Insn::Block { load, rn, regs, mode, wback, user: false })
}

fn decode_dual_exclusive(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let p = bit(i, 24);
    let u = bit(i, 23);
    let w = bit(i, 21);
    let load = bit(i, 20);
    let rn = reg(i, 16);
    let rt = reg(i, 12);
    let rt2 = reg(i, 8);
    if p || w {
        let mode = AddrMode::from_puw(p, u, w);
        if rt >= 13 || rt2 >= 13 || (load && rt == rt2) {
            return None;
        }
        if mode.wback && (rn == 15 || rn == rt || rn == rt2) {
            return None;
        }
        if !load && rn == 15 {
            return None;
        }
        let offset = MemOffset::Imm(bits(i, 7, 0) << 2);
        return Some(Insn::MemDual { load, rt, rt2, rn, offset, mode });
    }
    if rn == 15 {
        return None;
    }
    if !u {
        // LDREX/STREX 字
        let offset = bits(i, 7, 0) << 2;
        if load {
            if rt >= 13 || rt2 != 15 {
                return None;
            }
            return Some(Insn::Exclusive { load, size: 4, rd: 0, rt, rt2: None, rn, offset, ordered: false });
        }
        let rd = rt2;
        if rd >= 13 || rt >= 13 || rd == rn || rd == rt {
            return None;
        }
        return Some(Insn::Exclusive { load, size: 4, rd, rt, rt2: None, rn, offset, ordered: false });
    }

    let op3 = bits(i, 7, 4);
    if load && op3 <= 1 {
        let rm = reg(i, 0);
        if bits(i, 15, 8) != 0xf0 || rm >= 13 || !env.outside_or_last_in_it() {
            return None;
        }
        return Some(Insn::TableBranch { half: op3 == 1, rn, rm });
    }
    let ordered = op3 & 0b1000 != 0;
    if ordered && !env.has(ArmFeatures::V8) {
        return None;
    }
    let size = match op3 & 0b11 {
        0b00 => 1,
        0b01 => 2,
        0b10 if ordered => 4,
        0b11 => 8,
        _ => return None,
    };
    if ordered && op3 & 0b0100 == 0 {
        // LDA/STL
        if size == 8 || rt >= 13 {
            return None;
        }
        return Some(Insn::Ordered { load, size, rt, rn });
    }
    if op3 & 0b0100 == 0 {
        return None;
    }
    if size == 8 && env.m_profile() {
        return None;
    }
    let rd = reg(i, 0);
    let rt2 = if size == 8 { Some(rt2) } else { None };
    if rt >= 13 || rt2.is_some_and(|r| r >= 13 || (load && r == rt)) {
        return None;
    }
    if load {
        if rd != 15 || (size != 8 && bits(i, 11, 8) != 0xf) {
            return None;
        }
        return Some(Insn::Exclusive { load, size, rd: 0, rt, rt2, rn, offset: 0, ordered });
    }
    if size != 8 && bits(i, 11, 8) != 0xf {
        return None;
    }
    if rd >= 13 || rd == rn || rd == rt || rt2 == Some(rd) {
        return None;
    }
    Some(Insn::Exclusive { load, size, rd, rt, rt2, rn, offset: 0, ordered })
}

/// 数据处理公共部分：处理 Rd=15 的比较形式与 Rn=15 的 MOV/MVN 形式
fn t32_dp(op: u32, s: bool, rd: u8, rn: u8, op2: Operand2) -> Option<Insn> {
    let test_form = rd == 15 && s;
    let op = match op {
        0b0000 if test_form => DpOp::Tst,
        0b0000 => DpOp::And,
        0b0001 => DpOp::Bic,
        0b0010 if rn == 15 => DpOp::Mov,
        0b0010 => DpOp::Orr,
        0b0011 if rn == 15 => DpOp::Mvn,
        0b0011 => DpOp::Orn,
        0b0100 if test_form => DpOp::Teq,
        0b0100 => DpOp::Eor,
        0b1000 if test_form => DpOp::Cmn,
        0b1000 => DpOp::Add,
        0b1010 => DpOp::Adc,
        0b1011 => DpOp::Sbc,
        0b1101 if test_form => DpOp::Cmp,
        0b1101 => DpOp::Sub,
        0b1110 => DpOp::Rsb,
        _ => return None,
    };
    if op.is_test() {
        if rn == 15 {
            return None;
        }
        return Some(Insn::DataProc { op, s: true, rd: 0, rn, op2 });
    }
    if rd == 15 || (rn == 15 && !op.is_move()) {
        return None;
    }
    let rn = if op.is_move() { 0 } else { rn };
    Some(Insn::DataProc { op, s, rd, rn, op2 })
}

fn decode_dp_shifted(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if bit(i, 15) {
        return None;
    }
    let op = bits(i, 24, 21);
    let s = bit(i, 20);
    let rn = reg(i, 16);
    let rd = reg(i, 8);
    let rm = reg(i, 0);
    if rm == 15 {
        return None;
    }
    let imm5 = (bits(i, 14, 12) << 2) | bits(i, 7, 6);
    if op == 0b0110 {
        // PKHBT/PKHTB
        if !env.has(ArmFeatures::THUMB_DSP) || s || bit(i, 4) || rd == 15 || rn == 15 {
            return None;
        }
        let tb = bit(i, 5);
        let (_, amount) = decode_imm_shift(if tb { 2 } else { 0 }, imm5);
        return Some(Insn::Pkh { tb, rd, rn, rm, amount: amount as u8 });
    }
    let (shift, amount) = decode_imm_shift(bits(i, 5, 4), imm5);
    t32_dp(op, s, rd, rn, Operand2::Shifted { rm, shift, amount: amount as u8 })
}

fn decode_dp_mod_imm(i: u32) -> Option<Insn> {
    let imm12 = ((bit(i, 26) as u32) << 11) | (bits(i, 14, 12) << 8) | bits(i, 7, 0);
    let (value, c) = thumb_expand_imm_c(imm12, false)?;
    let carry = (bits(imm12, 11, 10) != 0).then_some(c);
    t32_dp(bits(i, 24, 21), bit(i, 20), reg(i, 8), reg(i, 16), Operand2::Imm { value, carry })
}

fn decode_dp_plain_imm(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let op = bits(i, 24, 20);
    let rn = reg(i, 16);
    let rd = reg(i, 8);
    let imm12 = ((bit(i, 26) as u32) << 11) | (bits(i, 14, 12) << 8) | bits(i, 7, 0);
    let imm5 = (bits(i, 14, 12) << 2) | bits(i, 7, 6);
    if rd == 15 {
        return None;
    }
    match op {
        0b00000 if rn == 15 => Some(Insn::Adr { rd, offset: imm12 as i32 }),
        0b00000 => Some(Insn::DataProc { op: DpOp::Add, s: false, rd, rn, op2: Operand2::imm(imm12) }),
        0b01010 if rn == 15 => Some(Insn::Adr { rd, offset: -(imm12 as i32) }),
        0b01010 => Some(Insn::DataProc { op: DpOp::Sub, s: false, rd, rn, op2: Operand2::imm(imm12) }),
        0b00100 | 0b01100 => {
            let imm = ((bits(i, 19, 16) << 12) | imm12) as u16;
            Some(Insn::MovImm16 { top: op == 0b01100, rd, imm })
        }
        0b10000 | 0b10010 | 0b11000 | 0b11010 => {
            if rn == 15 {
                return None;
            }
            let signed = op & 0b01000 == 0;
            let sh = bit(i, 21);
            let sat = bits(i, 4, 0);
            if sh && imm5 == 0 {
                if !env.has(ArmFeatures::THUMB_DSP) || bit(i, 4) {
                    return None;
                }
                let sat = sat & 0xf;
                return Some(Insn::Sat16 { signed, bits: (if signed { sat + 1 } else { sat }) as u8, rd, rn });
            }
            let (shift, amount) = decode_imm_shift(if sh { 2 } else { 0 }, imm5);
            Some(Insn::Sat {
                signed,
                bits: (if signed { sat + 1 } else { sat }) as u8,
                rd,
                rn,
                shift,
                amount: amount as u8,
            })
        }
        0b10100 | 0b11100 => {
            let width = bits(i, 4, 0) + 1;
            if rn == 15 || imm5 + width > 32 {
                return None;
            }
            let op = if op == 0b11100 { BitfieldOp::Ubfx } else { BitfieldOp::Sbfx };
            Some(Insn::Bitfield { op, rd, rn, lsb: imm5 as u8, width: width as u8 })
        }
        0b10110 => {
            let msb = bits(i, 4, 0);
            if msb < imm5 {
                return None;
            }
            let op = if rn == 15 { BitfieldOp::Bfc } else { BitfieldOp::Bfi };
            Some(Insn::Bitfield { op, rd, rn, lsb: imm5 as u8, width: (msb - imm5 + 1) as u8 })
        }
        _ => None,
    }
}

fn decode_branch_misc(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let op1 = bits(i, 14, 12);
    let op = bits(i, 26, 20);
    match op1 {
        0b000 | 0b010 => decode_misc_control(i, op, env),
        0b001 | 0b011 => {
            if !env.outside_or_last_in_it() {
                return None;
            }
            Some(Insn::Branch { link: false, offset: branch_offset(i) })
        }
        0b100 | 0b110 => {
            if bit(i, 0) {
                // BLX 的 H 位为 1 的编码空间给了低开销循环
                if env.has(ArmFeatures::LOB) && bits(i, 26, 23) == 0 {
                    return crate::mve::decode_lob(i, env);
                }
                return None;
            }
            if !env.has(ArmFeatures::V5) || env.m_profile() || !env.outside_or_last_in_it() {
                return None;
            }
            Some(Insn::BranchLinkExchange { offset: branch_offset(i) })
        }
        _ => {
            if !env.outside_or_last_in_it() {
                return None;
            }
            Some(Insn::Branch { link: true, offset: branch_offset(i) })
        }
    }
}

fn decode_misc_control(i: u32, op: u32, env: &DecodeEnv) -> Option<Insn> {
    let m = env.m_profile();
    if op == 0b1111111 {
        return match bits(i, 14, 12) {
            0b000 if !m && env.has(ArmFeatures::EL3) && bits(i, 11, 0) == 0 => Some(Insn::Smc),
            0b010 => Some(Insn::Udf { imm: (bits(i, 19, 16) << 12) | bits(i, 11, 0) }),
            _ => None,
        };
    }
    if bits(i, 14, 12) != 0 {
        return None;
    }
    match op {
        0b0111000 | 0b0111001 => {
            let rn = reg(i, 16);
            if rn >= 13 {
                return None;
            }
            if m {
                let mask = bits(i, 11, 10) as u8;
                if bits(i, 9, 8) != 0 || mask == 0 {
                    return None;
                }
                return Some(Insn::V7mMsr { rn, sysm: bits(i, 7, 0) as u8, mask });
            }
            let r = bit(i, 20);
            if bit(i, 5) {
                if !env.has(ArmFeatures::V7VE) {
                    return None;
                }
                let sysm = ((bit(i, 4) as u8) << 4) | bits(i, 11, 8) as u8;
                return Some(Insn::MsrBanked { rn, r, sysm });
            }
            let fields = bits(i, 11, 8);
            if fields == 0 {
                return None;
            }
            Some(Insn::Msr { spsr: r, mask: msr_mask(fields), src: MsrSrc::Reg(rn) })
        }
        0b0111010 => {
            if bits(i, 10, 8) == 0 {
                return Some(Insn::Hint(match bits(i, 7, 0) {
                    1 => HintOp::Yield,
                    2 => HintOp::Wfe,
                    3 => HintOp::Wfi,
                    4 => HintOp::Sev,
                    _ => HintOp::Nop,
                }));
            }
            if m || env.in_it {
                return None;
            }
            let imod = match bits(i, 10, 9) {
                0b10 => Some(false),
                0b11 => Some(true),
                0b00 => None,
                _ => return None,
            };
            let change_mode = bit(i, 8);
            let (a, ii, f) = (bit(i, 7), bit(i, 6), bit(i, 5));
            if imod.is_some() != (a || ii || f) || (imod.is_none() && !change_mode) {
                return None;
            }
            Some(Insn::Cps { imod, a, i: ii, f, mode: change_mode.then(|| bits(i, 4, 0) as u8) })
        }
        0b0111011 => match bits(i, 7, 4) {
            0b0010 => Some(Insn::Clrex),
            0b0100 => Some(Insn::Barrier(BarrierKind::Dsb)),
            0b0101 => Some(Insn::Barrier(BarrierKind::Dmb)),
            0b0110 => Some(Insn::Barrier(BarrierKind::Isb)),
            _ => None,
        },
        0b0111100 if !m => {
            // BXJ
            let rm = reg(i, 16);
            if rm == 15 || !env.outside_or_last_in_it() {
                return None;
            }
            Some(Insn::BranchReg { link: false, rm })
        }
        0b0111110 | 0b0111111 => {
            let rd = reg(i, 8);
            if rd >= 13 {
                return None;
            }
            if m {
                return Some(Insn::V7mMrs { rd, sysm: bits(i, 7, 0) as u8 });
            }
            let r = bit(i, 20);
            if bit(i, 5) {
                if !env.has(ArmFeatures::V7VE) {
                    return None;
                }
                let sysm = ((bit(i, 4) as u8) << 4) | reg(i, 16);
                return Some(Insn::MrsBanked { rd, r, sysm });
            }
            Some(Insn::Mrs { rd, spsr: r })
        }
        // SUBS PC, LR / ERET 不支持
        0b0111101 => None,
        _ => None,
    }
}

fn decode_load_store_single(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let load = bit(i, 20);
    let signed = bit(i, 24);
    let size_bits = bits(i, 22, 21);
    if size_bits == 0b11 || (signed && (!load || size_bits == 0b10)) {
        return None;
    }
    let size = 1u8 << size_bits;
    let rn = reg(i, 16);
    let rt = reg(i, 12);
    let mut unpriv = false;
    let (offset, mode) = if rn == 15 {
        if !load {
            return None;
        }
        (MemOffset::Imm(bits(i, 11, 0)), AddrMode { index: true, add: bit(i, 23), wback: false })
    } else if bit(i, 23) {
        (MemOffset::Imm(bits(i, 11, 0)), AddrMode::OFFSET)
    } else if bit(i, 11) {
        let (p, u, w) = (bit(i, 10), bit(i, 9), bit(i, 8));
        if !p && !w {
            return None;
        }
        unpriv = p && u && !w;
        (MemOffset::Imm(bits(i, 7, 0)), AddrMode::from_puw(p, u, w))
    } else {
        let rm = reg(i, 0);
        if bits(i, 10, 6) != 0 || rm >= 13 {
            return None;
        }
        (MemOffset::Reg { rm, shift: ShiftType::Lsl, amount: bits(i, 5, 4) as u8 }, AddrMode::OFFSET)
    };
    if rt == 15 {
        if load && size != 4 {
            // PLD/PLI
            return Some(Insn::Hint(HintOp::Nop));
        }
        if !load || unpriv || !env.outside_or_last_in_it() {
            return None;
        }
    }
    if mode.wback && rn == rt {
        return None;
    }
    Some(Insn::Mem(MemAccess { load, size, signed, rt, rn, offset, mode, unpriv }))
}

fn decode_dp_register(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if bits(i, 15, 12) != 0b1111 {
        return None;
    }
    let op1 = bits(i, 23, 20);
    let op2 = bits(i, 7, 4);
    let rn = reg(i, 16);
    let rd = reg(i, 8);
    let rm = reg(i, 0);
    if rd == 15 || rm == 15 {
        return None;
    }
    let dsp = env.has(ArmFeatures::THUMB_DSP);
    if op1 & 0b1000 == 0 && op2 == 0 {
        if rn == 15 {
            return None;
        }
        let shift = ShiftType::from_bits(bits(i, 22, 21));
        let op2 = Operand2::RegShift { rm: rn, shift, rs: rm };
        return Some(Insn::DataProc { op: DpOp::Mov, s: bit(i, 20), rd, rn: 0, op2 });
    }
    if op1 & 0b1000 == 0 && op2 & 0b1000 != 0 {
        let (signed, size) = match bits(i, 22, 20) {
            0b000 => (true, ExtendSize::Half),
            0b001 => (false, ExtendSize::Half),
            0b010 => (true, ExtendSize::Byte16),
            0b011 => (false, ExtendSize::Byte16),
            0b100 => (true, ExtendSize::Byte),
            0b101 => (false, ExtendSize::Byte),
            _ => return None,
        };
        if bit(i, 6) || ((size == ExtendSize::Byte16 || rn != 15) && !dsp) {
            return None;
        }
        let rotate = (bits(i, 5, 4) * 8) as u8;
        return Some(Insn::Extend { signed, size, rd, rn: (rn != 15).then_some(rn), rm, rotate });
    }
    if op1 & 0b1000 != 0 && op2 & 0b1000 == 0 {
        if !dsp || rn == 15 {
            return None;
        }
        let op = match bits(i, 22, 20) {
            0b000 => ParOp::Add8,
            0b001 => ParOp::Add16,
            0b010 => ParOp::Asx,
            0b100 => ParOp::Sub8,
            0b101 => ParOp::Sub16,
            0b110 => ParOp::Sax,
            _ => return None,
        };
        let kind = match (bit(i, 6), bits(i, 5, 4)) {
            (false, 0b00) => ParKind::Signed,
            (false, 0b01) => ParKind::SignedSat,
            (false, 0b10) => ParKind::SignedHalving,
            (true, 0b00) => ParKind::Unsigned,
            (true, 0b01) => ParKind::UnsignedSat,
            (true, 0b10) => ParKind::UnsignedHalving,
            _ => return None,
        };
        return Some(Insn::Parallel { op, kind, rd, rn, rm });
    }
    if op1 & 0b1100 == 0b1000 && op2 & 0b1100 == 0b1000 {
        if rn == 15 {
            return None;
        }
        return match (bits(i, 21, 20), bits(i, 5, 4)) {
            (0b00, x) => {
                if !dsp {
                    return None;
                }
                let op = match x {
                    0b00 => SatOp::Add,
                    0b01 => SatOp::DoubleAdd,
                    0b10 => SatOp::Sub,
                    _ => SatOp::DoubleSub,
                };
                Some(Insn::SatArith { op, rd, rn, rm })
            }
            (0b01, x) => {
                // 编码里 Rm 出现两次，两处必须一致
                if rn != rm {
                    return None;
                }
                let kind = match x {
                    0b00 => RevKind::Rev,
                    0b01 => RevKind::Rev16,
                    0b10 => RevKind::Rbit,
                    _ => RevKind::Revsh,
                };
                Some(Insn::Rev { kind, rd, rm })
            }
            (0b10, 0b00) if dsp => Some(Insn::Sel { rd, rn, rm }),
            (0b11, 0b00) if rn == rm => Some(Insn::Clz { rd, rm }),
            _ => None,
        };
    }
    None
}

fn decode_multiply(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if bits(i, 7, 6) != 0 {
        return None;
    }
    let op1 = bits(i, 22, 20);
    let op2 = bits(i, 5, 4);
    let rn = reg(i, 16);
    let ra = reg(i, 12);
    let rd = reg(i, 8);
    let rm = reg(i, 0);
    if rd >= 13 || rn >= 13 || rm >= 13 || ra == 13 {
        return None;
    }
    if op1 == 0 {
        return match op2 {
            0b00 if ra == 15 => Some(Insn::Mul { op: MulOp::Mul, s: false, rd, rn, rm, ra: 0 }),
            0b00 => Some(Insn::Mul { op: MulOp::Mla, s: false, rd, rn, rm, ra }),
            0b01 if ra != 15 => Some(Insn::Mul { op: MulOp::Mls, s: false, rd, rn, rm, ra }),
            _ => None,
        };
    }
    if !env.has(ArmFeatures::THUMB_DSP) {
        return None;
    }
    let no_acc = ra == 15;
    let flag = bit(i, 4);
    let op = match op1 {
        0b001 => {
            let (n_top, m_top) = (bit(i, 5), flag);
            if no_acc { DspMulOp::Smulxy { n_top, m_top } } else { DspMulOp::Smlaxy { n_top, m_top } }
        }
        0b010 | 0b100 if op2 & 0b10 == 0 => {
            let sub = op1 == 0b100;
            if no_acc { DspMulOp::Smuad { swap: flag, sub } } else { DspMulOp::Smlad { swap: flag, sub } }
        }
        0b011 if op2 & 0b10 == 0 => {
            if no_acc { DspMulOp::Smulwy { m_top: flag } } else { DspMulOp::Smlawy { m_top: flag } }
        }
        0b101 if op2 & 0b10 == 0 => {
            if no_acc { DspMulOp::Smmul { round: flag } } else { DspMulOp::Smmla { round: flag, sub: false } }
        }
        0b110 if op2 & 0b10 == 0 && !no_acc => DspMulOp::Smmla { round: flag, sub: true },
        0b111 if op2 == 0 => return Some(Insn::Usad8 { rd, rn, rm, ra: (!no_acc).then_some(ra) }),
        _ => return None,
    };
    Some(Insn::DspMul { op, rd, rn, rm, ra })
}

fn decode_long_multiply(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let op1 = bits(i, 22, 20);
    let op2 = bits(i, 7, 4);
    let rn = reg(i, 16);
    let rdlo = reg(i, 12);
    let rdhi = reg(i, 8);
    let rm = reg(i, 0);
    if rn >= 13 || rm >= 13 {
        return None;
    }
    if matches!(op1, 0b001 | 0b011) && op2 == 0b1111 {
        if !env.has(ArmFeatures::THUMB_DIV) || rdlo != 15 || rdhi >= 13 {
            return None;
        }
        return Some(Insn::Div { signed: op1 == 0b001, rd: rdhi, rn, rm });
    }
    if rdlo >= 13 || rdhi >= 13 || rdlo == rdhi {
        return None;
    }
    let mul_long = |signed, accumulate| {
        Some(Insn::MulLong { signed, accumulate, s: false, rdlo, rdhi, rn, rm })
    };
    let dsp = |op| env.has(ArmFeatures::THUMB_DSP).then_some(Insn::DspMul { op, rd: rdhi, rn, rm, ra: rdlo });
    match (op1, op2) {
        (0b000, 0) => mul_long(true, false),
        (0b010, 0) => mul_long(false, false),
        (0b100, 0) => mul_long(true, true),
        (0b110, 0) => mul_long(false, true),
        (0b100, 0b1000..=0b1011) => dsp(DspMulOp::Smlalxy { n_top: bit(i, 5), m_top: bit(i, 4) }),
        (0b100, 0b1100 | 0b1101) => dsp(DspMulOp::Smlald { swap: bit(i, 4), sub: false }),
        (0b101, 0b1100 | 0b1101) => dsp(DspMulOp::Smlald { swap: bit(i, 4), sub: true }),
        (0b110, 0b0110) => dsp(DspMulOp::Umaal),
        _ => None,
    }
}

/// 协处理器、浮点与向量编码空间 (hw1 = 111x 11xx)
fn decode_coproc_space(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if env.has(ArmFeatures::MVE) {
        if let Some(m) = crate::mve::decode(i, env) {
            return Some(Insn::Mve(m));
        }
    }
    if bits(i, 25, 24) == 0b11 {
        // 111U 1111 -> 1111 001U
        if !env.has(ArmFeatures::NEON) {
            return None;
        }
        let a32 = (i & 0xe2ff_ffff) | ((i & (1 << 28)) >> 4) | (1 << 28);
        return crate::neon::decode(a32, env).map(Insn::Neon);
    }
    if bit(i, 28) {
        // MCR2/MRC2/LDC2/STC2/CDP2
        return None;
    }
    if bits(i, 11, 9) == 0b101 {
        if !env.has(ArmFeatures::VFP) {
            return None;
        }
        return crate::vfp::decode(i, env).map(Insn::Vfp);
    }
    // 与 cond=1110 的 A32 布局相同
    super::arm::decode_coproc_transfer(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::CpuModel;

    fn env() -> DecodeEnv {
        DecodeEnv::new(CpuModel::CortexM4.features())
    }

    fn dec(hw1: u16, hw2: u16) -> Insn {
        decode(hw1, hw2, 0x1000, &env(), Cond::Al).unwrap().insn
    }

    #[test]
    fn test_dp_shifted_and_immediate() {
        // add.w r0, r1, r2
        assert_eq!(
            dec(0xeb01, 0x0002),
            Insn::DataProc { op: DpOp::Add, s: false, rd: 0, rn: 1, op2: Operand2::reg(2) }
        );
        // mov.w r0, #0xff00ff00
        assert_eq!(
            dec(0xf04f, 0x20ff),
            Insn::DataProc { op: DpOp::Mov, s: false, rd: 0, rn: 0, op2: Operand2::Imm { value: 0xff00_ff00, carry: None } }
        );
    }

    #[test]
    fn test_branches() {
        // bl +0x1000
        assert_eq!(dec(0xf001, 0xf800), Insn::Branch { link: true, offset: 0x1000 });
        // bne.w -4
        let d = decode(0xf47f, 0xaffe, 0, &env(), Cond::Al).unwrap();
        assert_eq!(d.cond, Cond::Ne);
        assert_eq!(d.insn, Insn::Branch { link: false, offset: -4 });
        // tbb [r0, r1]
        assert_eq!(dec(0xe8d0, 0xf001), Insn::TableBranch { half: false, rn: 0, rm: 1 });
    }

    #[test]
    fn test_loads_and_exclusives() {
        assert!(matches!(
            dec(0xf8d1, 0x0004),
            Insn::Mem(MemAccess { load: true, size: 4, rt: 0, rn: 1, offset: MemOffset::Imm(4), .. })
        ));
        assert_eq!(
            dec(0xe851, 0x0f00),
            Insn::Exclusive { load: true, size: 4, rd: 0, rt: 0, rt2: None, rn: 1, offset: 0, ordered: false }
        );
    }

    #[test]
    fn test_push_multiple() {
        assert_eq!(
            dec(0xe92d, 0x4ff0),
            Insn::Block { load: false, rn: 13, regs: 0x4ff0, mode: BlockMode::Db, wback: true, user: false }
        );
    }

    #[test]
    fn test_divide_and_bitfield() {
        assert_eq!(dec(0xfbb1, 0xf0f2), Insn::Div { signed: false, rd: 0, rn: 1, rm: 2 });
        assert_eq!(dec(0xf3c1, 0x1007), Insn::Bitfield { op: BitfieldOp::Ubfx, rd: 0, rn: 1, lsb: 4, width: 8 });
    }

    #[test]
    fn test_m_profile_special_registers() {
        assert_eq!(dec(0xf3ef, 0x8010), Insn::V7mMrs { rd: 0, sysm: 0x10 });
        // msr primask, r0
        assert_eq!(dec(0xf380, 0x8810), Insn::V7mMsr { rn: 0, sysm: 0x10, mask: 2 });
    }

    #[test]
    fn test_thumb1_core_only_has_bl_pairs() {
        let v5 = DecodeEnv::new(CpuModel::Arm926.features());
        assert!(decode(0xf001, 0xf800, 0, &v5, Cond::Al).is_ok());
        assert!(decode(0xeb01, 0x0002, 0, &v5, Cond::Al).is_err());
    }
}
