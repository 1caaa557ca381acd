//! MVE (Helium) 与低开销循环的解码和翻译
//!
//! 向量指令全部交给 `ArmHelper::Mve`，由运行时按元素掩码合并结果并推进
//! 谓词状态；翻译期只负责取标量操作数、计算访存地址和写回。
//!
//! 低开销循环 (DLS/WLS/LE 及尾部谓词形式) 直接展开成 IR：LE 在块内比较
//! LR 与本次迭代消耗的元素数，决定回跳还是落到下一条。

use vm_arm_cpu::fpregs::LTPSIZE_NONE;
use vm_arm_cpu::helpers::mve::VptCond;
use vm_arm_cpu::helpers::{MveCall, MveOp};
use vm_arm_cpu::state::slot;
use vm_arm_cpu::{ArmFeatures, ArmHelper};
use vm_core::{GuestAddr, VmResult};
use vm_ir::{IROp, Terminator};

use crate::context::DisasContext;
use crate::decode::{DecodeEnv, Insn, bit, bits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MveInsn {
    /// 只读写向量寄存器与 VPR
    Vector(MveCall),
    /// 带一个通用寄存器操作数：标量形式运算、VDUP、VPT 标量比较、VCTP
    Scalar { call: MveCall, rm: u8 },
    /// VADDV；`accumulate` 时累加 Rda 原值
    Addv { call: MveCall, rda: u8, accumulate: bool },
    /// VLDR/VSTR 连续访存
    Mem { call: MveCall, rn: u8, offset: u32, add: bool, index: bool, wback: bool },
}

impl MveInsn {
    pub fn call(&self) -> &MveCall {
        match self {
            MveInsn::Vector(c) => c,
            MveInsn::Scalar { call, .. } | MveInsn::Addv { call, .. } | MveInsn::Mem { call, .. } => call,
        }
    }

    /// 能在 ECI 非零时继续执行 (按节拍执行的指令)
    pub fn is_beatwise(&self) -> bool {
        // 这里实现的向量指令都按节拍执行
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobInsn {
    /// DLS/DLSTP；`size` 为尾部谓词的元素大小
    Dls { rn: u8, size: Option<u8> },
    /// WLS/WLSTP；Rn 为 0 时跳过循环体
    Wls { rn: u8, size: Option<u8>, offset: u32 },
    /// LE/LETP；`decrement` 为假时无条件回跳
    Le { tp: bool, decrement: bool, offset: u32 },
    Lctp,
}

impl LobInsn {
    pub fn is_loop_end(&self) -> bool {
        matches!(self, LobInsn::Le { .. })
    }
}

fn bad_gpr(r: u8) -> bool {
    r == 13 || r == 15
}

/// T32 分支空间中 hw2 位 0 为 1 的低开销循环编码
pub fn decode_lob(i: u32, env: &DecodeEnv) -> Option<Insn> {
    if env.in_it {
        return None;
    }
    let hw2 = i & 0xffff;
    let rn = bits(i, 19, 16) as u8;
    let size = bits(i, 21, 20) as u8;
    let plain = bit(i, 22);
    let mve = env.has(ArmFeatures::MVE);
    let tp_size = |plain: bool| if plain { Some(None) } else if mve { Some(Some(size)) } else { None };
    let offset = bits(i, 11, 1) << 1;
    if hw2 == 0xe001 {
        if rn == 15 && !plain && size == 0 && mve {
            return Some(Insn::Lob(LobInsn::Lctp));
        }
        if bad_gpr(rn) {
            return None;
        }
        return Some(Insn::Lob(LobInsn::Dls { rn, size: tp_size(plain)? }));
    }
    if hw2 == 0xe801 {
        if !mve || plain || bad_gpr(rn) {
            return None;
        }
        let call = MveCall { op: MveOp::Vctp, size, unsigned: true, scalar: true, qd: 0, qn: 0, qm: 0 };
        return Some(Insn::Mve(MveInsn::Scalar { call, rm: rn }));
    }
    if bits(i, 15, 12) != 0b1100 {
        return None;
    }
    if rn == 15 {
        // hw1 位 5 为 LE/LETP，位 4 为是否递减 LR
        let tp = !bit(i, 21);
        if plain || (tp && !mve) {
            return None;
        }
        return Some(Insn::Lob(LobInsn::Le { tp, decrement: bit(i, 20), offset }));
    }
    if rn == 13 {
        return None;
    }
    Some(Insn::Lob(LobInsn::Wls { rn, size: tp_size(plain)?, offset }))
}

fn qreg(v: u32) -> u8 {
    (v & 7) as u8
}

fn mcall(op: MveOp, size: u8, unsigned: bool, qd: u8, qn: u8, qm: u8) -> MveCall {
    MveCall { op, size, unsigned, scalar: false, qd, qn, qm }
}

/// 解码协处理器空间中的 MVE 编码；不是 MVE 编码时返回 `None`
pub fn decode(i: u32, env: &DecodeEnv) -> Option<MveInsn> {
    if !env.has(ArmFeatures::MVE) || env.in_it {
        return None;
    }
    let u = bit(i, 28);
    if bits(i, 31, 29) != 0b111 {
        return None;
    }
    match bits(i, 27, 24) {
        0b1111 if !bit(i, 23) => decode_vector(i, u),
        0b1111 => decode_shift(i, u),
        0b1110 if bits(i, 31, 28) == 0b1111 && !bit(i, 23) && bit(i, 16) => decode_predicate(i),
        0b1110 if !bit(i, 23) => decode_scalar(i, u),
        0b1110 if bits(i, 23, 20) == 0b1111 && bits(i, 17, 16) == 0b01 => decode_addv(i, u),
        0b1110 if !u && bits(i, 11, 8) == 0b1011 => decode_dup(i),
        0b1100 | 0b1101 if bits(i, 11, 9) == 0b111 => decode_mem(i, u),
        _ => None,
    }
}

fn decode_vector(i: u32, u: bool) -> Option<MveInsn> {
    if bit(i, 22) || bit(i, 16) || bit(i, 12) || bit(i, 7) || !bit(i, 6) || bit(i, 5) || bit(i, 0) {
        return None;
    }
    let size = bits(i, 21, 20) as u8;
    let (qd, qn, qm) = (qreg(bits(i, 15, 13)), qreg(bits(i, 19, 17)), qreg(bits(i, 3, 1)));
    let o1 = bit(i, 4);
    if bits(i, 11, 8) == 0b0001 && o1 {
        let op = match (u, size) {
            (false, 0) => MveOp::And,
            (false, 1) => MveOp::Bic,
            (false, 2) => MveOp::Orr,
            (false, _) => MveOp::Orn,
            (true, 0) => MveOp::Eor,
            _ => return None,
        };
        return Some(MveInsn::Vector(mcall(op, 0, true, qd, qn, qm)));
    }
    if size == 3 {
        return None;
    }
    let op = match (bits(i, 11, 8), o1, u) {
        (0b0000, false, _) => MveOp::Hadd,
        (0b0000, true, _) => MveOp::Qadd,
        (0b0010, false, _) => MveOp::Hsub,
        (0b0010, true, _) => MveOp::Qsub,
        (0b0110, false, _) => MveOp::Max,
        (0b0110, true, _) => MveOp::Min,
        (0b1000, false, false) => MveOp::Add,
        (0b1000, false, true) => MveOp::Sub,
        (0b1001, true, false) => MveOp::Mul,
        _ => return None,
    };
    Some(MveInsn::Vector(mcall(op, size, u, qd, qn, qm)))
}

fn decode_scalar(i: u32, u: bool) -> Option<MveInsn> {
    if bit(i, 22) || bit(i, 16) || bit(i, 7) || bit(i, 5) {
        return None;
    }
    let size = bits(i, 21, 20) as u8;
    let sub = bit(i, 12);
    let op = match (bits(i, 11, 8), bits(i, 6, 4), sub) {
        (0b1111, 0b100, false) => MveOp::Add,
        (0b1111, 0b100, true) => MveOp::Sub,
        (0b1111, 0b110, false) => MveOp::Mul,
        (0b1110, 0b100, false) => MveOp::Hadd,
        (0b1110, 0b100, true) => MveOp::Hsub,
        (0b1110, 0b110, false) => MveOp::Qadd,
        (0b1110, 0b110, true) => MveOp::Qsub,
        _ => return None,
    };
    let rm = bits(i, 3, 0) as u8;
    if size == 3 || bad_gpr(rm) {
        return None;
    }
    let mut call = mcall(op, size, u, qreg(bits(i, 15, 13)), qreg(bits(i, 19, 17)), 0);
    call.scalar = true;
    Some(MveInsn::Scalar { call, rm })
}

/// 比较条件：`lo` 在向量形式取位 0，标量形式取位 5
fn vpt_cond(i: u32, lo: bool) -> VptCond {
    let hi7 = bit(i, 7);
    if !bit(i, 12) {
        match (lo, hi7) {
            (false, false) => VptCond::Eq,
            (false, true) => VptCond::Ne,
            (true, false) => VptCond::Cs,
            (true, true) => VptCond::Hi,
        }
    } else {
        match (hi7, lo) {
            (false, false) => VptCond::Ge,
            (false, true) => VptCond::Lt,
            (true, false) => VptCond::Gt,
            (true, true) => VptCond::Le,
        }
    }
}

/// VPT/VCMP/VPST/VPNOT/VPSEL (hw1 = 1111 1110 0xxx xxx1)
fn decode_predicate(i: u32) -> Option<MveInsn> {
    if bits(i, 11, 8) != 0b1111 || bit(i, 4) {
        return None;
    }
    let size = bits(i, 21, 20) as u8;
    let mask = ((bits(i, 22, 22) << 3) | bits(i, 15, 13)) as u8;
    let qn = qreg(bits(i, 19, 17));
    let scalar = bit(i, 6);
    if size == 3 {
        if scalar {
            if bits(i, 3, 0) != 0b1101 || bits(i, 19, 16) != 0b0001 || bit(i, 12) || bit(i, 7) || bit(i, 5) {
                return None;
            }
            let op = if mask == 0 { MveOp::Vpnot } else { MveOp::Vpst { mask } };
            return Some(MveInsn::Vector(mcall(op, 0, true, 0, 0, 0)));
        }
        if !bit(i, 0) || bit(i, 22) || bit(i, 12) || bit(i, 7) || bit(i, 5) {
            return None;
        }
        let call = mcall(MveOp::Vpsel, 0, true, qreg(bits(i, 15, 13)), qn, qreg(bits(i, 3, 1)));
        return Some(MveInsn::Vector(call));
    }
    if scalar {
        let cond = vpt_cond(i, bit(i, 5));
        let rm = bits(i, 3, 0) as u8;
        if bad_gpr(rm) {
            return None;
        }
        let mut call = mcall(MveOp::Vpt { cond, mask }, size, cond.unsigned(), 0, qn, 0);
        call.scalar = true;
        return Some(MveInsn::Scalar { call, rm });
    }
    if bit(i, 5) {
        return None;
    }
    let cond = vpt_cond(i, bit(i, 0));
    let call = mcall(MveOp::Vpt { cond, mask }, size, cond.unsigned(), 0, qn, qreg(bits(i, 3, 1)));
    Some(MveInsn::Vector(call))
}

fn decode_addv(i: u32, u: bool) -> Option<MveInsn> {
    let size = bits(i, 19, 18) as u8;
    if size == 3 || bit(i, 12) || bits(i, 11, 8) != 0b1111 || bits(i, 7, 6) != 0 || bit(i, 4) || bit(i, 0) {
        return None;
    }
    let rda = (bits(i, 15, 13) << 1) as u8;
    let call = mcall(MveOp::Addv, size, u, 0, 0, qreg(bits(i, 3, 1)));
    Some(MveInsn::Addv { call, rda, accumulate: bit(i, 5) })
}

fn decode_dup(i: u32) -> Option<MveInsn> {
    if !bit(i, 21) || bit(i, 20) || bit(i, 16) || bit(i, 7) || bit(i, 6) || !bit(i, 4) || bits(i, 3, 0) != 0 {
        return None;
    }
    let size = match (bit(i, 22), bit(i, 5)) {
        (true, false) => 0,
        (false, true) => 1,
        (false, false) => 2,
        (true, true) => return None,
    };
    let rt = bits(i, 15, 12) as u8;
    if bad_gpr(rt) {
        return None;
    }
    let mut call = mcall(MveOp::Dup, size, true, qreg(bits(i, 19, 17)), 0, 0);
    call.scalar = true;
    Some(MveInsn::Scalar { call, rm: rt })
}

/// VSHL/VSHR/VSLI/VSRI 立即数 (Q=1 的两寄存器移位布局)
fn decode_shift(i: u32, u: bool) -> Option<MveInsn> {
    if bit(i, 22) || bit(i, 12) || bit(i, 7) || !bit(i, 6) || bit(i, 5) || !bit(i, 4) || bit(i, 0) {
        return None;
    }
    let imm6 = bits(i, 21, 16);
    let size = if imm6 & 0b100000 != 0 {
        2
    } else if imm6 & 0b010000 != 0 {
        1
    } else if imm6 & 0b001000 != 0 {
        0
    } else {
        return None;
    };
    let esize = 8u32 << size;
    let right = (2 * esize - imm6) as u8;
    let left = (imm6 - esize) as u8;
    let op = match (bits(i, 11, 8), u) {
        (0b0000, _) => MveOp::Shr { shift: right },
        (0b0101, false) => MveOp::Shl { shift: left },
        (0b0100, true) => MveOp::Sri { shift: right },
        (0b0101, true) => MveOp::Sli { shift: left },
        _ => return None,
    };
    Some(MveInsn::Vector(mcall(op, size, u, qreg(bits(i, 15, 13)), 0, qreg(bits(i, 3, 1)))))
}

/// VLDR/VSTR：位 12 为 1 是同宽访存，为 0 是加宽/窄化 (Rn 只有 3 位)
fn decode_mem(i: u32, u: bool) -> Option<MveInsn> {
    let (p, add, w, load) = (bit(i, 24), bit(i, 23), bit(i, 21), bit(i, 20));
    if bit(i, 22) || (!p && !w) {
        return None;
    }
    let size = bits(i, 8, 7) as u8;
    let imm7 = bits(i, 6, 0);
    let qd = qreg(bits(i, 15, 13));
    let (rn, msize) = if bit(i, 12) {
        if u {
            return None;
        }
        (bits(i, 19, 16) as u8, size)
    } else {
        let msize = bits(i, 19, 19) as u8;
        if size <= msize || (!load && u) {
            return None;
        }
        (bits(i, 18, 16) as u8, msize)
    };
    if size == 3 || rn == 15 {
        return None;
    }
    let op = if load { MveOp::Ldr { msize: 1 << msize } } else { MveOp::Str { msize: 1 << msize } };
    let call = mcall(op, size, u || bit(i, 12), qd, 0, 0);
    Some(MveInsn::Mem { call, rn, offset: imm7 << msize, add, index: p, wback: w })
}

// ---- 翻译 ----

pub(crate) fn translate(ctx: &mut DisasContext<'_>, insn: &MveInsn) -> VmResult<()> {
    if !ctx.flags.vfp_enabled {
        ctx.fp_disabled();
        return Ok(());
    }
    match *insn {
        MveInsn::Vector(call) => ctx.call_void(ArmHelper::Mve(call), &[]),
        MveInsn::Scalar { call, rm } => {
            let v = ctx.load_reg(rm);
            ctx.call_void(ArmHelper::Mve(call), &[v]);
        }
        MveInsn::Addv { call, rda, accumulate } => {
            let acc = if accumulate { ctx.load_reg(rda) } else { ctx.imm(0) };
            let r = ctx.call(ArmHelper::Mve(call), &[acc]);
            ctx.store_reg(rda, r);
        }
        MveInsn::Mem { call, rn, offset, add, index, wback } => {
            let base = ctx.load_reg(rn);
            let off = if add { offset as i32 } else { -(offset as i32) };
            let moved = ctx.add_imm32(base, off);
            let addr = if index { moved } else { base };
            ctx.call_void(ArmHelper::Mve(call), &[addr]);
            if wback {
                ctx.store_reg(rn, moved);
            }
        }
    }
    Ok(())
}

pub(crate) fn translate_lob(ctx: &mut DisasContext<'_>, insn: &LobInsn) -> VmResult<()> {
    let needs_fp = match insn {
        LobInsn::Dls { size, .. } | LobInsn::Wls { size, .. } => size.is_some(),
        LobInsn::Le { tp, .. } => *tp,
        LobInsn::Lctp => true,
    };
    if needs_fp && !ctx.flags.vfp_enabled {
        ctx.fp_disabled();
        return Ok(());
    }
    match *insn {
        LobInsn::Dls { rn, size } => {
            let v = ctx.load_reg(rn);
            ctx.store_reg(14, v);
            if let Some(s) = size {
                let t = ctx.imm(u32::from(s));
                ctx.set_slot(slot::LTPSIZE, t);
            }
        }
        LobInsn::Wls { rn, size, offset } => {
            let v = ctx.load_reg(rn);
            let zero = ctx.imm(0);
            let nonzero = ctx.cmp_ne(v, zero);
            let enter = ctx.b.new_label();
            ctx.push(IROp::BrCond { cond: nonzero, label: enter });
            let skip = ctx.pc.wrapping_add(4).wrapping_add(offset);
            ctx.push(IROp::Exit(Terminator::Jmp { target: GuestAddr(u64::from(skip)) }));
            ctx.push(IROp::Label(enter));
            ctx.store_reg(14, v);
            if let Some(s) = size {
                let t = ctx.imm(u32::from(s));
                ctx.set_slot(slot::LTPSIZE, t);
            }
            let next = ctx.next_pc;
            ctx.jump_to(next);
        }
        LobInsn::Le { tp, decrement, offset } => {
            if ctx.eci != 0 {
                let zero = ctx.imm(0);
                ctx.set_slot(slot::CONDEXEC, zero);
            }
            let target = ctx.pc.wrapping_add(4).wrapping_sub(offset);
            if !decrement {
                ctx.jump_to(target);
                return Ok(());
            }
            let lr = ctx.get_slot(slot::LR);
            // 每次迭代消耗的元素数：TP 形式为 16 >> LTPSIZE
            let step = if tp {
                let ltp = ctx.get_slot(slot::LTPSIZE);
                let sixteen = ctx.imm(16);
                ctx.binop(|dst, src, shreg| IROp::Srl { dst, src, shreg }, sixteen, ltp)
            } else {
                ctx.imm(1)
            };
            let last = ctx.binop(|dst, lhs, rhs| IROp::CmpGeU { dst, lhs, rhs }, step, lr);
            let exit = ctx.b.new_label();
            ctx.push(IROp::BrCond { cond: last, label: exit });
            let rest = ctx.sub(lr, step);
            let rest = ctx.zext32(rest);
            ctx.store_reg(14, rest);
            ctx.push(IROp::Exit(Terminator::Jmp { target: GuestAddr(u64::from(target)) }));
            ctx.push(IROp::Label(exit));
            if tp {
                let none = ctx.imm(u32::from(LTPSIZE_NONE));
                ctx.set_slot(slot::LTPSIZE, none);
            }
            let next = ctx.next_pc;
            ctx.jump_to(next);
        }
        LobInsn::Lctp => {
            let none = ctx.imm(u32::from(LTPSIZE_NONE));
            ctx.set_slot(slot::LTPSIZE, none);
        }
    }
    Ok(())
}
