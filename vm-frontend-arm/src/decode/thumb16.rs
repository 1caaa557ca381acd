//! 16 位 Thumb 解码
//!
//! IT 块之外大多数数据处理指令会设置标志，块内则不设置；`DecodeEnv::in_it`
//! 决定 `s` 位。

use vm_arm_cpu::bits::{Cond, ShiftType};
use vm_arm_cpu::ArmFeatures;
use vm_core::VmResult;

use super::{
    AddrMode, BlockMode, DecodeEnv, DecodedInsn, DpOp, ExtendSize, HintOp, Insn, MemAccess, MemOffset, MulOp,
    Operand2, RevKind, bit, bits, finish, sext,
};

/// 解码一条 16 位 Thumb 指令；`it_cond` 为 IT 块给出的条件 (块外为 AL)
pub fn decode(hw: u16, pc: u32, env: &DecodeEnv, it_cond: Cond) -> VmResult<DecodedInsn> {
    let i = u32::from(hw);
    if bits(i, 15, 12) == 0b1101 && bits(i, 11, 9) != 0b111 {
        // B<cond>：IT 块内不可用
        let insn = (!env.in_it).then(|| Insn::Branch { link: false, offset: sext(bits(i, 7, 0) << 1, 9) });
        return finish(pc, i, 2, Cond::from_nibble(bits(i, 11, 8)), insn);
    }
    finish(pc, i, 2, it_cond, decode_insn(i, env))
}

fn lo(i: u32, at: u32) -> u8 {
    bits(i, at + 2, at) as u8
}

fn dp(op: DpOp, s: bool, rd: u8, rn: u8, op2: Operand2) -> Option<Insn> {
    Some(Insn::DataProc { op, s, rd, rn, op2 })
}

fn mem(load: bool, size: u8, signed: bool, rt: u8, rn: u8, offset: MemOffset) -> Option<Insn> {
    Some(Insn::Mem(MemAccess { load, size, signed, rt, rn, offset, mode: AddrMode::OFFSET, unpriv: false }))
}

fn decode_insn(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let s = !env.in_it;
    match bits(i, 15, 11) {
        0b00000..=0b00010 => {
            let ty = bits(i, 12, 11);
            let (shift, amount) = vm_arm_cpu::bits::decode_imm_shift(ty, bits(i, 10, 6));
            let rd = lo(i, 0);
            let rm = lo(i, 3);
            if ty == 0 && amount == 0 && env.in_it {
                // MOVS Rd, Rm 不能出现在 IT 块中
                return None;
            }
            dp(DpOp::Mov, s, rd, 0, Operand2::Shifted { rm, shift, amount: amount as u8 })
        }
        0b00011 => {
            let rd = lo(i, 0);
            let rn = lo(i, 3);
            let op = if bit(i, 9) { DpOp::Sub } else { DpOp::Add };
            let op2 = if bit(i, 10) { Operand2::imm(bits(i, 8, 6)) } else { Operand2::reg(lo(i, 6)) };
            dp(op, s, rd, rn, op2)
        }
        0b00100 => dp(DpOp::Mov, s, lo(i, 8), 0, Operand2::imm(bits(i, 7, 0))),
        0b00101 => dp(DpOp::Cmp, true, 0, lo(i, 8), Operand2::imm(bits(i, 7, 0))),
        0b00110 => dp(DpOp::Add, s, lo(i, 8), lo(i, 8), Operand2::imm(bits(i, 7, 0))),
        0b00111 => dp(DpOp::Sub, s, lo(i, 8), lo(i, 8), Operand2::imm(bits(i, 7, 0))),
        0b01000 if !bit(i, 10) => decode_alu(i, s),
        0b01000 => decode_special(i, env),
        0b01001 => mem(true, 4, false, lo(i, 8), 15, MemOffset::Imm(bits(i, 7, 0) << 2)),
        0b01010 | 0b01011 => {
            let rt = lo(i, 0);
            let rn = lo(i, 3);
            let off = MemOffset::Reg { rm: lo(i, 6), shift: ShiftType::Lsl, amount: 0 };
            let (load, size, signed) = match bits(i, 11, 9) {
                0b000 => (false, 4, false),
                0b001 => (false, 2, false),
                0b010 => (false, 1, false),
                0b011 => (true, 1, true),
                0b100 => (true, 4, false),
                0b101 => (true, 2, false),
                0b110 => (true, 1, false),
                _ => (true, 2, true),
            };
            mem(load, size, signed, rt, rn, off)
        }
        0b01100 | 0b01101 => mem(bit(i, 11), 4, false, lo(i, 0), lo(i, 3), MemOffset::Imm(bits(i, 10, 6) << 2)),
        0b01110 | 0b01111 => mem(bit(i, 11), 1, false, lo(i, 0), lo(i, 3), MemOffset::Imm(bits(i, 10, 6))),
        0b10000 | 0b10001 => mem(bit(i, 11), 2, false, lo(i, 0), lo(i, 3), MemOffset::Imm(bits(i, 10, 6) << 1)),
        0b10010 | 0b10011 => mem(bit(i, 11), 4, false, lo(i, 8), 13, MemOffset::Imm(bits(i, 7, 0) << 2)),
        0b10100 => Some(Insn::Adr { rd: lo(i, 8), offset: (bits(i, 7, 0) << 2) as i32 }),
        0b10101 => dp(DpOp::Add, false, lo(i, 8), 13, Operand2::imm(bits(i, 7, 0) << 2)),
        0b10110 | 0b10111 => decode_misc(i, env),
        0b11000 | 0b11001 => {
            let load = bit(i, 11);
            let rn = lo(i, 8);
            let regs = bits(i, 7, 0) as u16;
            if regs == 0 {
                return None;
            }
            // LDM 在 Rn 位于列表中时不写回
            let wback = !load || regs & (1 << rn) == 0;
            Some(Insn::Block { load, rn, regs, mode: BlockMode::Ia, wback, user: false })
        }
        0b11010 | 0b11011 => match bits(i, 11, 8) {
            0b1110 => Some(Insn::Udf { imm: bits(i, 7, 0) }),
            0b1111 => Some(Insn::Svc { imm: bits(i, 7, 0) }),
            _ => None,
        },
        0b11100 => {
            if !env.outside_or_last_in_it() {
                return None;
            }
            Some(Insn::Branch { link: false, offset: sext(bits(i, 10, 0) << 1, 12) })
        }
        _ => None,
    }
}

fn decode_alu(i: u32, s: bool) -> Option<Insn> {
    let rdn = lo(i, 0);
    let rm = lo(i, 3);
    let reg_shift = |shift| Operand2::RegShift { rm: rdn, shift, rs: rm };
    match bits(i, 9, 6) {
        0b0000 => dp(DpOp::And, s, rdn, rdn, Operand2::reg(rm)),
        0b0001 => dp(DpOp::Eor, s, rdn, rdn, Operand2::reg(rm)),
        0b0010 => dp(DpOp::Mov, s, rdn, 0, reg_shift(ShiftType::Lsl)),
        0b0011 => dp(DpOp::Mov, s, rdn, 0, reg_shift(ShiftType::Lsr)),
        0b0100 => dp(DpOp::Mov, s, rdn, 0, reg_shift(ShiftType::Asr)),
        0b0101 => dp(DpOp::Adc, s, rdn, rdn, Operand2::reg(rm)),
        0b0110 => dp(DpOp::Sbc, s, rdn, rdn, Operand2::reg(rm)),
        0b0111 => dp(DpOp::Mov, s, rdn, 0, reg_shift(ShiftType::Ror)),
        0b1000 => dp(DpOp::Tst, true, 0, rdn, Operand2::reg(rm)),
        0b1001 => dp(DpOp::Rsb, s, rdn, rm, Operand2::imm(0)),
        0b1010 => dp(DpOp::Cmp, true, 0, rdn, Operand2::reg(rm)),
        0b1011 => dp(DpOp::Cmn, true, 0, rdn, Operand2::reg(rm)),
        0b1100 => dp(DpOp::Orr, s, rdn, rdn, Operand2::reg(rm)),
        0b1101 => Some(Insn::Mul { op: MulOp::Mul, s, rd: rdn, rn: rm, rm: rdn, ra: 0 }),
        0b1110 => dp(DpOp::Bic, s, rdn, rdn, Operand2::reg(rm)),
        _ => dp(DpOp::Mvn, s, rdn, 0, Operand2::reg(rm)),
    }
}

fn decode_special(i: u32, env: &DecodeEnv) -> Option<Insn> {
    let rdn = ((bit(i, 7) as u8) << 3) | lo(i, 0);
    let rm = bits(i, 6, 3) as u8;
    match bits(i, 9, 8) {
        0b00 => {
            if rdn == 15 && (rm == 15 || !env.outside_or_last_in_it()) {
                return None;
            }
            dp(DpOp::Add, false, rdn, rdn, Operand2::reg(rm))
        }
        0b01 => {
            if (rdn < 8 && rm < 8) || rdn == 15 || rm == 15 {
                return None;
            }
            dp(DpOp::Cmp, true, 0, rdn, Operand2::reg(rm))
        }
        0b10 => {
            if rdn == 15 && !env.outside_or_last_in_it() {
                return None;
            }
            dp(DpOp::Mov, false, rdn, 0, Operand2::reg(rm))
        }
        _ => {
            if bits(i, 2, 0) != 0 || !env.outside_or_last_in_it() {
                return None;
            }
            let link = bit(i, 7);
            if link && (rm == 15 || !env.has(ArmFeatures::V5)) {
                return None;
            }
            Some(Insn::BranchReg { link, rm })
        }
    }
}

fn decode_misc(i: u32, env: &DecodeEnv) -> Option<Insn> {
    match bits(i, 11, 8) {
        0b0000 => {
            let imm = bits(i, 6, 0) << 2;
            let op = if bit(i, 7) { DpOp::Sub } else { DpOp::Add };
            dp(op, false, 13, 13, Operand2::imm(imm))
        }
        0b0001 | 0b0011 | 0b1001 | 0b1011 => {
            if !env.has(ArmFeatures::THUMB2) || env.in_it {
                return None;
            }
            let offset = ((bit(i, 9) as u32) << 6) | (bits(i, 7, 3) << 1);
            Some(Insn::Cbz { nonzero: bit(i, 11), rn: lo(i, 0), offset })
        }
        0b0010 => {
            if !env.has(ArmFeatures::V6) {
                return None;
            }
            let (signed, size) = match bits(i, 7, 6) {
                0b00 => (true, ExtendSize::Half),
                0b01 => (true, ExtendSize::Byte),
                0b10 => (false, ExtendSize::Half),
                _ => (false, ExtendSize::Byte),
            };
            Some(Insn::Extend { signed, size, rd: lo(i, 0), rn: None, rm: lo(i, 3), rotate: 0 })
        }
        0b0100 | 0b0101 => {
            let regs = (bits(i, 7, 0) | ((bit(i, 8) as u32) << 14)) as u16;
            if regs == 0 {
                return None;
            }
            Some(Insn::Block { load: false, rn: 13, regs, mode: BlockMode::Db, wback: true, user: false })
        }
        0b0110 => {
            if !env.has(ArmFeatures::V6) {
                return None;
            }
            match bits(i, 7, 5) {
                0b010 if !env.m_profile() => {
                    if bits(i, 4, 0) & 0b10111 != 0 {
                        return None;
                    }
                    Some(Insn::Setend { big: bit(i, 3) })
                }
                0b011 => {
                    if env.in_it {
                        return None;
                    }
                    let disable = bit(i, 4);
                    let (a, ii, f) = (bit(i, 2), bit(i, 1), bit(i, 0));
                    if env.m_profile() && a {
                        return None;
                    }
                    Some(Insn::Cps { imod: Some(disable), a, i: ii, f, mode: None })
                }
                _ => None,
            }
        }
        0b1010 => {
            if !env.has(ArmFeatures::V6) {
                return None;
            }
            let kind = match bits(i, 7, 6) {
                0b00 => RevKind::Rev,
                0b01 => RevKind::Rev16,
                0b11 => RevKind::Revsh,
                _ => return None,
            };
            Some(Insn::Rev { kind, rd: lo(i, 0), rm: lo(i, 3) })
        }
        0b1100 | 0b1101 => {
            let regs = (bits(i, 7, 0) | ((bit(i, 8) as u32) << 15)) as u16;
            if regs == 0 || (regs & 0x8000 != 0 && !env.outside_or_last_in_it()) {
                return None;
            }
            Some(Insn::Block { load: true, rn: 13, regs, mode: BlockMode::Ia, wback: true, user: false })
        }
        0b1110 => env.has(ArmFeatures::V5).then(|| Insn::Bkpt { imm: bits(i, 7, 0) as u16 }),
        0b1111 => {
            let mask = bits(i, 3, 0);
            if mask == 0 {
                return Some(Insn::Hint(match bits(i, 7, 4) {
                    1 => HintOp::Yield,
                    2 => HintOp::Wfe,
                    3 => HintOp::Wfi,
                    4 => HintOp::Sev,
                    _ => HintOp::Nop,
                }));
            }
            let firstcond = bits(i, 7, 4);
            if !env.has(ArmFeatures::THUMB2) || env.in_it || firstcond == 0b1111 {
                return None;
            }
            // AL 条件下掩码只能是 "全部 then"
            if firstcond == 0b1110 && mask.count_ones() != 1 {
                return None;
            }
            Some(Insn::It { firstcond: firstcond as u8, mask: mask as u8 })
        }
        _ => None,
    }
}
