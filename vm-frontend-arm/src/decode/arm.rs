//! A32 解码

use vm_arm_cpu::bits::{Cond, ParKind, ParOp, ShiftType, arm_expand_imm_c, decode_imm_shift};
use vm_arm_cpu::helpers::{DspMulOp, SatOp};
use vm_arm_cpu::ArmFeatures;
use vm_core::VmResult;

use super::{
    AddrMode, BarrierKind, BitfieldOp, BlockMode, CoprocInsn, DecodeEnv, DecodedInsn, DpOp, ExtendSize, HintOp, Insn,
    MemAccess, MemOffset, MsrSrc, MulOp, Operand2, RevKind, bit, bits, finish, msr_mask, reg, sext,
};

/// 解码一条 A32 指令
pub fn decode(raw: u32, pc: u32, env: &DecodeEnv) -> VmResult<DecodedInsn> {
    let cond = bits(raw, 31, 28);
    if cond == 0xf {
        return finish(pc, raw, 4, Cond::Al, decode_unconditional(raw, env));
    }
    finish(pc, raw, 4, Cond::from_nibble(cond), decode_conditional(raw, env))
}

fn decode_conditional(i: u32, env: &DecodeEnv) -> Option<Insn> {
    match bits(i, 27, 25) {
        0b000 | 0b001 => decode_dp_misc(i, env),
        0b010 => decode_load_store(i, env),
        0b011 if !bit(i, 4) => decode_load_store(i, env),
        0b011 => decode_media(i, env),
        0b100 => decode_block(i),
        0b101 => Some(Insn::Branch { link: bit(i, 24), offset: sext(bits(i, 23, 0) << 2, 26) }),
        _ => decode_coproc(i, env),
    }
}

fn decode_unconditional(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if bits(i, 27, 25) == 0b001 || bits(i, 27, 24) == 0b0100 {
        if !env.has(ArmFeatures::NEON) {
            return None;
        }
        return crate::neon::decode(i, env).map(Insn::Neon);
    }
    match bits(i, 27, 20) {
        0b0001_0000 => {
            if bit(i, 16) {
                // SETEND
                if bits(i, 7, 4) != 0 || !env.has(ArmFeatures::V6) {
                    return None;
                }
                Some(Insn::Setend { big: bit(i, 9) })
            } else {
                decode_cps(i, env)
            }
        }
        0b0101_0111 => match bits(i, 7, 4) {
            0b0001 if env.has(ArmFeatures::V6K) => Some(Insn::Clrex),
            0b0100 if env.has(ArmFeatures::V7) => Some(Insn::Barrier(BarrierKind::Dsb)),
            0b0101 if env.has(ArmFeatures::V7) => Some(Insn::Barrier(BarrierKind::Dmb)),
            0b0110 if env.has(ArmFeatures::V7) => Some(Insn::Barrier(BarrierKind::Isb)),
            _ => None,
        },
        // PLD/PLDW/PLI 不影响客户机状态
        op if op & 0b1101_0111 == 0b0101_0101 || op & 0b1111_0111 == 0b0100_0101 => {
            env.has(ArmFeatures::V5TE).then_some(Insn::Hint(HintOp::Nop))
        }
        op if op & 0b1111_0111 == 0b0110_0101 || op & 0b1111_0111 == 0b0111_0101 => {
            (!bit(i, 4)).then_some(Insn::Hint(HintOp::Nop))
        }
        op if op >> 5 == 0b101 => {
            // BLX imm：H 位给出半字偏移
            if !env.has(ArmFeatures::V5) {
                return None;
            }
            let offset = sext(bits(i, 23, 0) << 2, 26) | ((bit(i, 24) as i32) << 1);
            Some(Insn::BranchLinkExchange { offset })
        }
        // SRS/RFE 与 *2 形式的协处理器指令不支持
        _ => None,
    }
}

fn decode_cps(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if !env.has(ArmFeatures::V6) || bit(i, 5) {
        return None;
    }
    let imod = bits(i, 19, 18);
    let m = bit(i, 17);
    let imod = match imod {
        0b10 => Some(false),
        0b11 => Some(true),
        0b00 if m => None,
        _ => return None,
    };
    let (a, ii, f) = (bit(i, 8), bit(i, 7), bit(i, 6));
    if imod.is_none() && (a || ii || f) {
        return None;
    }
    if imod.is_some() && !(a || ii || f) {
        return None;
    }
    let mode = m.then(|| bits(i, 4, 0) as u8);
    Some(Insn::Cps { imod, a, i: ii, f, mode })
}

fn shifted_reg(i: u32) -> Operand2 {
    let (shift, amount) = decode_imm_shift(bits(i, 6, 5), bits(i, 11, 7));
    Operand2::Shifted { rm: reg(i, 0), shift, amount: amount as u8 }
}

fn decode_dp_misc(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let imm = bit(i, 25);
    let op1 = bits(i, 24, 20);
    let op2 = bits(i, 7, 4);
    if !imm {
        if op1 & 0b11001 == 0b10000 {
            if op2 & 0b1000 == 0 {
                return decode_misc(i, env);
            }
            if op2 & 0b1001 == 0b1000 {
                return decode_halfword_mul(i, env);
            }
        }
        if op2 == 0b1001 {
            return if op1 & 0b10000 == 0 { decode_multiply(i, env) } else { decode_sync(i, env) };
        }
        if op2 & 0b1001 == 0b1001 {
            return decode_extra_load_store(i, env);
        }
    } else {
        match op1 {
            0b10000 | 0b10100 => {
                if !env.has(ArmFeatures::V6T2) {
                    return None;
                }
                let rd = reg(i, 12);
                if rd == 15 {
                    return None;
                }
                let imm = ((bits(i, 19, 16) << 12) | bits(i, 11, 0)) as u16;
                return Some(Insn::MovImm16 { top: op1 == 0b10100, rd, imm });
            }
            0b10010 | 0b10110 => return decode_msr_imm_hint(i, env),
            _ => {}
        }
    }

    let op = DpOp::from_a32(bits(i, 24, 21));
    let s = bit(i, 20);
    let rd = reg(i, 12);
    let rn = reg(i, 16);
    if op.is_test() && !s {
        return None;
    }
    let op2 = if imm {
        let (value, c) = arm_expand_imm_c(bits(i, 11, 0), false);
        let carry = (bits(i, 11, 8) != 0).then_some(c);
        Operand2::Imm { value, carry }
    } else if bit(i, 4) {
        let rm = reg(i, 0);
        let rs = reg(i, 8);
        if rd == 15 || rn == 15 || rm == 15 || rs == 15 {
            return None;
        }
        Operand2::RegShift { rm, shift: ShiftType::from_bits(bits(i, 6, 5)), rs }
    } else {
        shifted_reg(i)
    };
    Some(Insn::DataProc { op, s, rd, rn, op2 })
}

fn decode_msr_imm_hint(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let spsr = bit(i, 22);
    let fields = bits(i, 19, 16);
    if !spsr && fields == 0 {
        return match bits(i, 7, 0) {
            0 => Some(Insn::Hint(HintOp::Nop)),
            1 if env.has(ArmFeatures::V6K) => Some(Insn::Hint(HintOp::Yield)),
            2 if env.has(ArmFeatures::V6K) => Some(Insn::Hint(HintOp::Wfe)),
            3 if env.has(ArmFeatures::V6K) => Some(Insn::Hint(HintOp::Wfi)),
            4 if env.has(ArmFeatures::V6K) => Some(Insn::Hint(HintOp::Sev)),
            // DBG 与保留的提示
            _ => Some(Insn::Hint(HintOp::Nop)),
        };
    }
    let (value, _) = arm_expand_imm_c(bits(i, 11, 0), false);
    Some(Insn::Msr { spsr, mask: msr_mask(fields), src: MsrSrc::Imm(value) })
}

fn decode_misc(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let op = bits(i, 22, 21);
    let rd = reg(i, 12);
    let rm = reg(i, 0);
    match bits(i, 6, 4) {
        0b000 => {
            let banked = bit(i, 9);
            let r = bit(i, 22);
            if banked {
                if !env.has(ArmFeatures::V7VE) {
                    return None;
                }
                let sysm = ((bit(i, 8) as u8) << 4) | reg(i, 16);
                if op & 1 == 0 {
                    if rd == 15 {
                        return None;
                    }
                    Some(Insn::MrsBanked { rd, r, sysm })
                } else {
                    if rm == 15 {
                        return None;
                    }
                    Some(Insn::MsrBanked { rn: rm, r, sysm })
                }
            } else if op & 1 == 0 {
                if rd == 15 {
                    return None;
                }
                Some(Insn::Mrs { rd, spsr: r })
            } else {
                let fields = bits(i, 19, 16);
                if fields == 0 || rm == 15 {
                    return None;
                }
                Some(Insn::Msr { spsr: r, mask: msr_mask(fields), src: MsrSrc::Reg(rm) })
            }
        }
        0b001 if op == 0b01 => env.has(ArmFeatures::V4T).then_some(Insn::BranchReg { link: false, rm }),
        0b001 if op == 0b11 => {
            if !env.has(ArmFeatures::V5) || rd == 15 || rm == 15 {
                return None;
            }
            Some(Insn::Clz { rd, rm })
        }
        // BXJ：没有 Jazelle，行为同 BX
        0b010 if op == 0b01 => env.has(ArmFeatures::V5TE).then_some(Insn::BranchReg { link: false, rm }),
        0b011 if op == 0b01 => {
            if !env.has(ArmFeatures::V5) || rm == 15 {
                return None;
            }
            Some(Insn::BranchReg { link: true, rm })
        }
        0b101 => {
            if !env.has(ArmFeatures::V5TE) {
                return None;
            }
            let rn = reg(i, 16);
            if rd == 15 || rn == 15 || rm == 15 {
                return None;
            }
            let sat = match op {
                0b00 => SatOp::Add,
                0b01 => SatOp::Sub,
                0b10 => SatOp::DoubleAdd,
                _ => SatOp::DoubleSub,
            };
            Some(Insn::SatArith { op: sat, rd, rn, rm })
        }
        0b111 if op == 0b01 => {
            if !env.has(ArmFeatures::V5) {
                return None;
            }
            Some(Insn::Bkpt { imm: ((bits(i, 19, 8) << 4) | bits(i, 3, 0)) as u16 })
        }
        0b111 if op == 0b11 => env.has(ArmFeatures::EL3).then_some(Insn::Smc),
        // ERET/HVC
        _ => None,
    }
}

fn decode_halfword_mul(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if !env.has(ArmFeatures::V5TE) {
        return None;
    }
    let rd = reg(i, 16);
    let ra = reg(i, 12);
    let rm = reg(i, 8);
    let rn = reg(i, 0);
    let n_top = bit(i, 5);
    let m_top = bit(i, 6);
    if rd == 15 || rm == 15 || rn == 15 {
        return None;
    }
    let op = match bits(i, 22, 21) {
        0b00 => DspMulOp::Smlaxy { n_top, m_top },
        0b01 if n_top => DspMulOp::Smulwy { m_top },
        0b01 => DspMulOp::Smlawy { m_top },
        0b10 => {
            if ra == 15 || ra == rd {
                return None;
            }
            DspMulOp::Smlalxy { n_top, m_top }
        }
        _ => DspMulOp::Smulxy { n_top, m_top },
    };
    if matches!(op, DspMulOp::Smlaxy { .. } | DspMulOp::Smlawy { .. }) && ra == 15 {
        return None;
    }
    Some(Insn::DspMul { op, rd, rn, rm, ra })
}

fn decode_multiply(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let s = bit(i, 20);
    let rd = reg(i, 16);
    let ra = reg(i, 12);
    let rm = reg(i, 8);
    let rn = reg(i, 0);
    if rd == 15 || rm == 15 || rn == 15 {
        return None;
    }
    match bits(i, 23, 21) {
        0b000 => Some(Insn::Mul { op: MulOp::Mul, s, rd, rn, rm, ra: 0 }),
        0b001 => (ra != 15).then_some(Insn::Mul { op: MulOp::Mla, s, rd, rn, rm, ra }),
        0b010 if !s && env.has(ArmFeatures::V6) => {
            if ra == 15 || ra == rd {
                return None;
            }
            Some(Insn::DspMul { op: DspMulOp::Umaal, rd, rn, rm, ra })
        }
        0b011 if !s && env.has(ArmFeatures::V6T2) => {
            (ra != 15).then_some(Insn::Mul { op: MulOp::Mls, s: false, rd, rn, rm, ra })
        }
        op @ 0b100..=0b111 => {
            if ra == 15 || ra == rd {
                return None;
            }
            Some(Insn::MulLong {
                signed: op & 0b010 != 0,
                accumulate: op & 0b001 != 0,
                s,
                rdlo: ra,
                rdhi: rd,
                rn,
                rm,
            })
        }
        _ => None,
    }
}

fn decode_sync(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let rn = reg(i, 16);
    let rt = reg(i, 12);
    let rt2 = reg(i, 0);
    if !bit(i, 23) {
        // SWP/SWPB (ARMv8 起移除)
        if bits(i, 21, 20) != 0 || env.has(ArmFeatures::V8) {
            return None;
        }
        if rt == 15 || rt2 == 15 || rn == 15 || rn == rt || rn == rt2 {
            return None;
        }
        return Some(Insn::Swp { byte: bit(i, 22), rt, rt2, rn });
    }
    if !env.has(ArmFeatures::V6) {
        return None;
    }
    let load = bit(i, 20);
    let size = match bits(i, 22, 21) {
        0b00 => 4,
        0b01 => 8,
        0b10 => 1,
        _ => 2,
    };
    if size != 4 && !env.has(ArmFeatures::V6K) {
        return None;
    }
    let exclusive = bit(i, 9);
    let ordered = !bit(i, 8);
    if ordered && !env.has(ArmFeatures::V8) {
        return None;
    }
    if !exclusive {
        if !ordered || size == 8 {
            return None;
        }
        let rt = if load { rt } else { rt2 };
        if rt == 15 || rn == 15 {
            return None;
        }
        return Some(Insn::Ordered { load, size, rt, rn });
    }
    if load {
        if rn == 15 || rt == 15 {
            return None;
        }
        let rt2 = if size == 8 {
            if rt & 1 != 0 || rt == 14 {
                return None;
            }
            Some(rt + 1)
        } else {
            None
        };
        Some(Insn::Exclusive { load, size, rd: 0, rt, rt2, rn, offset: 0, ordered })
    } else {
        // STREX Rd, Rt, [Rn]
        let rd = rt;
        let rt = rt2;
        if rd == 15 || rt == 15 || rn == 15 || rd == rn || rd == rt {
            return None;
        }
        let rt2 = if size == 8 {
            if rt & 1 != 0 || rt == 14 || rd == rt + 1 {
                return None;
            }
            Some(rt + 1)
        } else {
            None
        };
        Some(Insn::Exclusive { load, size, rd, rt, rt2, rn, offset: 0, ordered })
    }
}

fn decode_extra_load_store(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let p = bit(i, 24);
    let u = bit(i, 23);
    let w = bit(i, 21);
    let l = bit(i, 20);
    let rn = reg(i, 16);
    let rt = reg(i, 12);
    let offset = if bit(i, 22) {
        MemOffset::Imm((bits(i, 11, 8) << 4) | bits(i, 3, 0))
    } else {
        let rm = reg(i, 0);
        if rm == 15 {
            return None;
        }
        MemOffset::Reg { rm, shift: ShiftType::Lsl, amount: 0 }
    };
    let mode = AddrMode::from_puw(p, u, w);
    let unpriv = !p && w;
    let op2 = bits(i, 6, 5);

    if !l && op2 & 0b10 != 0 {
        // LDRD/STRD
        if !env.has(ArmFeatures::V5TE) || unpriv || rt & 1 != 0 || rt == 14 {
            return None;
        }
        let load = op2 == 0b10;
        if let MemOffset::Reg { rm, .. } = offset {
            if load && (rm == rt || rm == rt + 1) {
                return None;
            }
        }
        if mode.wback && (rn == 15 || rn == rt || rn == rt + 1) {
            return None;
        }
        return Some(Insn::MemDual { load, rt, rt2: rt + 1, rn, offset, mode });
    }
    let (size, signed) = match (op2, l) {
        (0b01, _) => (2, false),
        (0b10, true) => (1, true),
        (0b11, true) => (2, true),
        _ => return None,
    };
    if unpriv && !env.has(ArmFeatures::V6T2) {
        return None;
    }
    if rt == 15 || (mode.wback && (rn == 15 || rn == rt)) {
        return None;
    }
    Some(Insn::Mem(MemAccess { load: l, size, signed, rt, rn, offset, mode, unpriv }))
}

fn decode_load_store(i: u32, _env: &DecodeEnv) -> Option<Insn> {
    let p = bit(i, 24);
    let u = bit(i, 23);
    let byte = bit(i, 22);
    let w = bit(i, 21);
    let load = bit(i, 20);
    let rn = reg(i, 16);
    let rt = reg(i, 12);
    let offset = if bit(i, 25) {
        let (shift, amount) = decode_imm_shift(bits(i, 6, 5), bits(i, 11, 7));
        let rm = reg(i, 0);
        if rm == 15 {
            return None;
        }
        MemOffset::Reg { rm, shift, amount: amount as u8 }
    } else {
        MemOffset::Imm(bits(i, 11, 0))
    };
    let mode = AddrMode::from_puw(p, u, w);
    let unpriv = !p && w;
    if mode.wback && (rn == 15 || (load && rn == rt)) {
        return None;
    }
    if byte && rt == 15 {
        return None;
    }
    Some(Insn::Mem(MemAccess { load, size: if byte { 1 } else { 4 }, signed: false, rt, rn, offset, mode, unpriv }))
}

fn decode_media(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if !env.has(ArmFeatures::V6) {
        return None;
    }
    let op1 = bits(i, 24, 20);
    let op2 = bits(i, 7, 5);
    let rd = reg(i, 12);
    let rn = reg(i, 16);
    let rm = reg(i, 0);
    match op1 >> 3 {
        0b00 => {
            let kind = match op1 & 0b111 {
                0b001 => ParKind::Signed,
                0b010 => ParKind::SignedSat,
                0b011 => ParKind::SignedHalving,
                0b101 => ParKind::Unsigned,
                0b110 => ParKind::UnsignedSat,
                0b111 => ParKind::UnsignedHalving,
                _ => return None,
            };
            let op = ParOp::from_a32(op2)?;
            if rd == 15 || rn == 15 || rm == 15 {
                return None;
            }
            Some(Insn::Parallel { op, kind, rd, rn, rm })
        }
        0b01 => decode_pack_sat_rev(i, env),
        0b10 => decode_signed_mul(i, env),
        _ => match op1 {
            0b11000 if op2 == 0 => {
                let ra = reg(i, 12);
                let rd = reg(i, 16);
                let rn = reg(i, 0);
                let rm = reg(i, 8);
                if rd == 15 || rn == 15 || rm == 15 {
                    return None;
                }
                Some(Insn::Usad8 { rd, rn, rm, ra: (ra != 15).then_some(ra) })
            }
            0b11010 | 0b11011 | 0b11110 | 0b11111 if op2 & 0b011 == 0b010 => {
                if !env.has(ArmFeatures::V6T2) {
                    return None;
                }
                let lsb = bits(i, 11, 7);
                let width = bits(i, 20, 16) + 1;
                let rn = reg(i, 0);
                if rd == 15 || rn == 15 || lsb + width > 32 {
                    return None;
                }
                let op = if op1 & 0b00100 != 0 { BitfieldOp::Ubfx } else { BitfieldOp::Sbfx };
                Some(Insn::Bitfield { op, rd, rn, lsb: lsb as u8, width: width as u8 })
            }
            0b11100 | 0b11101 if op2 & 0b011 == 0b000 => {
                if !env.has(ArmFeatures::V6T2) {
                    return None;
                }
                let lsb = bits(i, 11, 7);
                let msb = bits(i, 20, 16);
                let rn = reg(i, 0);
                if rd == 15 || msb < lsb {
                    return None;
                }
                let op = if rn == 15 { BitfieldOp::Bfc } else { BitfieldOp::Bfi };
                Some(Insn::Bitfield { op, rd, rn, lsb: lsb as u8, width: (msb - lsb + 1) as u8 })
            }
            0b11111 if op2 == 0b111 && bits(i, 31, 28) == 0b1110 => {
                Some(Insn::Udf { imm: (bits(i, 19, 8) << 4) | bits(i, 3, 0) })
            }
            _ => None,
        },
    }
}

fn decode_pack_sat_rev(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let op1 = bits(i, 22, 20);
    let op2 = bits(i, 7, 5);
    let rd = reg(i, 12);
    let rn = reg(i, 16);
    let rm = reg(i, 0);
    if rd == 15 || rm == 15 {
        return None;
    }
    let extend = |signed, size| {
        Some(Insn::Extend {
            signed,
            size,
            rd,
            rn: (rn != 15).then_some(rn),
            rm,
            rotate: (bits(i, 11, 10) * 8) as u8,
        })
    };
    match (op1, op2) {
        (0b000, op) if op & 1 == 0 => {
            if rn == 15 {
                return None;
            }
            let tb = bit(i, 6);
            let (shift, amount) = decode_imm_shift(if tb { 2 } else { 0 }, bits(i, 11, 7));
            debug_assert!(matches!(shift, ShiftType::Lsl | ShiftType::Asr));
            Some(Insn::Pkh { tb, rd, rn, rm, amount: amount as u8 })
        }
        (0b000, 0b011) => extend(true, ExtendSize::Byte16),
        (0b000, 0b101) => {
            if rn == 15 {
                return None;
            }
            Some(Insn::Sel { rd, rn, rm })
        }
        (0b010 | 0b011 | 0b110 | 0b111, op) if op & 1 == 0 => {
            let signed = op1 & 0b100 == 0;
            let sat = bits(i, 20, 16);
            let (shift, amount) = decode_imm_shift(if bit(i, 6) { 2 } else { 0 }, bits(i, 11, 7));
            Some(Insn::Sat {
                signed,
                bits: (if signed { sat + 1 } else { sat }) as u8,
                rd,
                rn: rm,
                shift,
                amount: amount as u8,
            })
        }
        (0b010, 0b001) | (0b110, 0b001) => {
            let signed = op1 == 0b010;
            let sat = bits(i, 19, 16);
            Some(Insn::Sat16 { signed, bits: (if signed { sat + 1 } else { sat }) as u8, rd, rn: rm })
        }
        (0b010, 0b011) => extend(true, ExtendSize::Byte),
        (0b011, 0b001) => Some(Insn::Rev { kind: RevKind::Rev, rd, rm }),
        (0b011, 0b011) => extend(true, ExtendSize::Half),
        (0b011, 0b101) => Some(Insn::Rev { kind: RevKind::Rev16, rd, rm }),
        (0b100, 0b011) => extend(false, ExtendSize::Byte16),
        (0b110, 0b011) => extend(false, ExtendSize::Byte),
        (0b111, 0b001) if env.has(ArmFeatures::V6T2) => Some(Insn::Rev { kind: RevKind::Rbit, rd, rm }),
        (0b111, 0b011) => extend(false, ExtendSize::Half),
        (0b111, 0b101) => Some(Insn::Rev { kind: RevKind::Revsh, rd, rm }),
        _ => None,
    }
}

fn decode_signed_mul(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let op1 = bits(i, 22, 20);
    let op2 = bits(i, 7, 5);
    let rd = reg(i, 16);
    let ra = reg(i, 12);
    let rm = reg(i, 8);
    let rn = reg(i, 0);
    if rd == 15 || rm == 15 || rn == 15 {
        return None;
    }
    let swap = bit(i, 5);
    let op = match (op1, op2 >> 1) {
        (0b000, 0b00) => {
            if ra == 15 {
                DspMulOp::Smuad { swap, sub: false }
            } else {
                DspMulOp::Smlad { swap, sub: false }
            }
        }
        (0b000, 0b01) => {
            if ra == 15 {
                DspMulOp::Smuad { swap, sub: true }
            } else {
                DspMulOp::Smlad { swap, sub: true }
            }
        }
        (0b001 | 0b011, 0b00) if op2 == 0 => {
            if !env.has(ArmFeatures::ARM_DIV) || ra != 15 {
                return None;
            }
            return Some(Insn::Div { signed: op1 == 0b001, rd, rn, rm });
        }
        (0b100, 0b00 | 0b01) => {
            if ra == 15 || ra == rd {
                return None;
            }
            DspMulOp::Smlald { swap, sub: op2 >> 1 == 0b01 }
        }
        (0b101, 0b00) => {
            if ra == 15 {
                DspMulOp::Smmul { round: swap }
            } else {
                DspMulOp::Smmla { round: swap, sub: false }
            }
        }
        (0b101, 0b11) => {
            if ra == 15 {
                return None;
            }
            DspMulOp::Smmla { round: swap, sub: true }
        }
        _ => return None,
    };
    Some(Insn::DspMul { op, rd, rn, rm, ra })
}

fn decode_block(i: u32) -> Option<Insn> {
    let p = bit(i, 24);
    let u = bit(i, 23);
    let user = bit(i, 22);
    let wback = bit(i, 21);
    let load = bit(i, 20);
    let rn = reg(i, 16);
    let regs = bits(i, 15, 0) as u16;
    if rn == 15 || regs == 0 {
        return None;
    }
    if load && wback && regs & (1 << rn) != 0 {
        return None;
    }
    // 用户寄存器组形式不能写回
    if user && wback && !(load && regs & 0x8000 != 0) {
        return None;
    }
    Some(Insn::Block { load, rn, regs, mode: BlockMode::from_pu(p, u), wback, user })
}

fn decode_coproc(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if bits(i, 27, 24) == 0b1111 {
        return Some(Insn::Svc { imm: bits(i, 23, 0) });
    }
    let cp = bits(i, 11, 8);
    if cp == 10 || cp == 11 {
        if !env.has(ArmFeatures::VFP) {
            return None;
        }
        return crate::vfp::decode(i, env).map(Insn::Vfp);
    }
    decode_coproc_transfer(i)
}

/// MCR/MRC/MCRR/MRRC (A32 与 T32 共用同一布局)
pub(crate) fn decode_coproc_transfer(i: u32) -> Option<Insn> {
    let cp = bits(i, 11, 8) as u8;
    let rt = reg(i, 12);
    if bits(i, 27, 21) == 0b1100010 {
        let rt2 = reg(i, 16);
        let read = bit(i, 20);
        if rt == 15 || rt2 == 15 || (read && rt == rt2) {
            return None;
        }
        return Some(Insn::Coproc(CoprocInsn {
            read,
            cp,
            opc1: bits(i, 7, 4) as u8,
            crn: 0,
            crm: bits(i, 3, 0) as u8,
            opc2: 0,
            rt,
            rt2: Some(rt2),
        }));
    }
    if bits(i, 27, 24) == 0b1110 && bit(i, 4) {
        let read = bit(i, 20);
        // MRC 的 Rt=15 传输到 APSR 标志
        if !read && rt == 15 {
            return None;
        }
        return Some(Insn::Coproc(CoprocInsn {
            read,
            cp,
            opc1: bits(i, 23, 21) as u8,
            crn: bits(i, 19, 16) as u8,
            crm: bits(i, 3, 0) as u8,
            opc2: bits(i, 7, 5) as u8,
            rt,
            rt2: None,
        }));
    }
    // CDP/LDC/STC：没有实现其他协处理器
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::CpuModel;

    fn env() -> DecodeEnv {
        DecodeEnv::new(CpuModel::CortexA15.features())
    }

    fn dec(raw: u32) -> Insn {
        decode(raw, 0x8000, &env()).unwrap().insn
    }

    #[test]
    fn test_adds_register() {
        // adds r0, r1, r2
        assert_eq!(
            dec(0xe091_0002),
            Insn::DataProc { op: DpOp::Add, s: true, rd: 0, rn: 1, op2: Operand2::reg(2) }
        );
    }

    #[test]
    fn test_mov_rotated_immediate_carry() {
        // movs r0, #0x80000000 (rot 2)
        match dec(0xe3b0_0102) {
            Insn::DataProc { op: DpOp::Mov, op2: Operand2::Imm { value, carry }, .. } => {
                assert_eq!(value, 0x8000_0000);
                assert_eq!(carry, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_conditional_branch() {
        let d = decode(0x1a00_0004, 0x100, &env()).unwrap();
        assert_eq!(d.cond, Cond::Ne);
        assert_eq!(d.insn, Insn::Branch { link: false, offset: 16 });
    }

    #[test]
    fn test_ldr_writeback_collision_is_illegal() {
        // ldr r1, [r1, #4]!
        assert!(decode(0xe5b1_1004, 0, &env()).is_err());
        // ldr r1, [r2, #4]!
        assert!(decode(0xe5b2_1004, 0, &env()).is_ok());
    }

    #[test]
    fn test_ldrd_rejects_odd_rt() {
        // ldrd r1, r2, [r0]
        assert!(decode(0xe1c0_10d0, 0, &env()).is_err());
        // ldrd r2, r3, [r0]
        assert!(matches!(dec(0xe1c0_20d0), Insn::MemDual { load: true, rt: 2, rt2: 3, .. }));
    }

    #[test]
    fn test_ldrt_is_unprivileged() {
        // ldrt r0, [r1], #4
        match dec(0xe4b1_0004) {
            Insn::Mem(m) => {
                assert!(m.unpriv);
                assert!(m.mode.wback && !m.mode.index);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_block_transfers() {
        // push {r4, lr}
        assert_eq!(
            dec(0xe92d_4010),
            Insn::Block { load: false, rn: 13, regs: 0x4010, mode: BlockMode::Db, wback: true, user: false }
        );
        // ldm r0!, {r0, r1}
        assert!(decode(0xe8b0_0003, 0, &env()).is_err());
        // ldm r0, {}
        assert!(decode(0xe890_0000, 0, &env()).is_err());
    }

    #[test]
    fn test_strex_status_collision() {
        // strex r0, r1, [r2]
        assert!(matches!(dec(0xe182_0f91), Insn::Exclusive { load: false, rd: 0, rt: 1, rn: 2, .. }));
        // strex r1, r1, [r2]
        assert!(decode(0xe182_1f91, 0, &env()).is_err());
    }

    #[test]
    fn test_misc_encodings() {
        assert_eq!(dec(0xe12f_ff1e), Insn::BranchReg { link: false, rm: 14 });
        assert_eq!(dec(0xe16f_0f11), Insn::Clz { rd: 0, rm: 1 });
        assert_eq!(dec(0xe120_0070), Insn::Bkpt { imm: 0 });
        assert_eq!(dec(0xef00_0011), Insn::Svc { imm: 0x11 });
        assert_eq!(dec(0xe320_f003), Insn::Hint(HintOp::Wfi));
        assert_eq!(dec(0xf57f_f05f), Insn::Barrier(BarrierKind::Dmb));
        assert_eq!(dec(0xe30a_0bcd), Insn::MovImm16 { top: false, rd: 0, imm: 0xabcd });
        assert_eq!(dec(0xf101_0200), Insn::Setend { big: true });
    }

    #[test]
    fn test_media_encodings() {
        // uxtb r0, r1
        assert_eq!(
            dec(0xe6ef_0071),
            Insn::Extend { signed: false, size: ExtendSize::Byte, rd: 0, rn: None, rm: 1, rotate: 0 }
        );
        // ubfx r0, r1, #4, #8
        assert_eq!(dec(0xe7e7_0251), Insn::Bitfield { op: BitfieldOp::Ubfx, rd: 0, rn: 1, lsb: 4, width: 8 });
        // sdiv r0, r1, r2
        assert_eq!(dec(0xe710_f211), Insn::Div { signed: true, rd: 0, rn: 1, rm: 2 });
        // usat r0, #8, r1
        assert!(matches!(dec(0xe6e8_0011), Insn::Sat { signed: false, bits: 8, rd: 0, rn: 1, .. }));
    }

    #[test]
    fn test_coprocessor_transfer() {
        // mrc p15, 0, r0, c1, c0, 0
        assert_eq!(
            dec(0xee11_0f10),
            Insn::Coproc(CoprocInsn { read: true, cp: 15, opc1: 0, crn: 1, crm: 0, opc2: 0, rt: 0, rt2: None })
        );
    }

    #[test]
    fn test_missing_feature_is_illegal() {
        let v4 = DecodeEnv::new(CpuModel::Arm926.features() - ArmFeatures::V5 - ArmFeatures::V5TE);
        assert!(decode(0xe16f_0f11, 0, &v4).is_err());
    }
}
