//! 访存指令

use smallvec::SmallVec;
use vm_arm_cpu::state::slot;
use vm_arm_cpu::{ArmFeatures, ArmHelper};
use vm_ir::{IROp, MemFlags, MemOrder, RegId, Terminator};

use super::{branch, dp};
use crate::context::{BlockEnd, DisasContext};
use crate::decode::{AddrMode, BlockMode, MemAccess, MemOffset};

fn offset_value(ctx: &mut DisasContext<'_>, offset: MemOffset) -> RegId {
    match offset {
        MemOffset::Imm(v) => ctx.imm(v),
        MemOffset::Reg { rm, shift, amount } => {
            let v = ctx.load_reg(rm);
            dp::shift_imm(ctx, v, shift, amount)
        }
    }
}

/// 返回 (访问地址, 写回值)
fn address(ctx: &mut DisasContext<'_>, rn: u8, offset: MemOffset, mode: AddrMode) -> (RegId, RegId) {
    let base = ctx.load_reg_aligned(rn);
    let off = offset_value(ctx, offset);
    let r = if mode.add { ctx.add(base, off) } else { ctx.sub(base, off) };
    let indexed = ctx.zext32(r);
    let addr = if mode.index { indexed } else { base };
    (addr, indexed)
}

pub(crate) fn single(ctx: &mut DisasContext<'_>, m: &MemAccess) {
    let (addr, wb) = address(ctx, m.rn, m.offset, m.mode);
    let flags = ctx.mem_flags(m.unpriv);
    if m.load {
        let v = if m.size == 4 && !ctx.flags.features.contains(ArmFeatures::V6) {
            // ARMv6 之前非对齐的字读取按低位循环移位
            let aligned = ctx.and_imm(addr, 0xffff_fffc);
            let raw = ctx.load(aligned, 4, false, flags);
            let low = ctx.and_imm(addr, 3);
            let sh = ctx.shl_imm(low, 3);
            ctx.binop(|dst, src, shreg| IROp::Ror32 { dst, src, shreg }, raw, sh)
        } else {
            ctx.load(addr, m.size, m.signed, flags)
        };
        if m.mode.wback {
            ctx.store_reg(m.rn, wb);
        }
        if m.rt == 15 {
            branch::load_write_pc(ctx, v);
        } else {
            ctx.store_reg(m.rt, v);
        }
    } else {
        let v = ctx.load_reg(m.rt);
        ctx.store(v, addr, m.size, flags);
        if m.mode.wback {
            ctx.store_reg(m.rn, wb);
        }
    }
}

/// LDRD/STRD：要求字对齐
pub(crate) fn dual(ctx: &mut DisasContext<'_>, load: bool, rt: u8, rt2: u8, rn: u8, offset: MemOffset, mode: AddrMode) {
    let (addr, wb) = address(ctx, rn, offset, mode);
    let flags = MemFlags { align: 4, ..ctx.mem_flags(false) };
    let addr2 = ctx.add_imm32(addr, 4);
    if load {
        let lo = ctx.load(addr, 4, false, flags);
        let hi = ctx.load(addr2, 4, false, flags);
        if mode.wback {
            ctx.store_reg(rn, wb);
        }
        ctx.store_reg(rt, lo);
        ctx.store_reg(rt2, hi);
    } else {
        let lo = ctx.load_reg(rt);
        let hi = ctx.load_reg(rt2);
        ctx.store(lo, addr, 4, flags);
        ctx.store(hi, addr2, 4, flags);
        if mode.wback {
            ctx.store_reg(rn, wb);
        }
    }
}

/// LDM/STM
///
/// 读取的值先放在临时寄存器里，全部访问完成后才写回基址与目标寄存器，
/// 中途的数据中止不会留下部分更新。`user` 且列表含 PC 的 LDM 为异常返回，
/// 否则 `user` 表示访问用户模式寄存器组。
#[allow(clippy::too_many_arguments)]
pub(crate) fn block(ctx: &mut DisasContext<'_>, load: bool, rn: u8, regs: u16, mode: BlockMode, wback: bool, user: bool) {
    let n = regs.count_ones() as i32;
    let base = ctx.load_reg(rn);
    let start = match mode {
        BlockMode::Ia => 0,
        BlockMode::Ib => 4,
        BlockMode::Da => -4 * n + 4,
        BlockMode::Db => -4 * n,
    };
    let flags = MemFlags { align: 4, ..ctx.mem_flags(false) };
    let exc_return = user && load && regs & 0x8000 != 0;
    let user_bank = user && !exc_return;

    let mut addr = ctx.add_imm32(base, start);
    let mut loaded: SmallVec<[(u8, RegId); 16]> = SmallVec::new();
    for r in (0..16u8).filter(|r| regs & (1 << r) != 0) {
        if load {
            let v = ctx.load(addr, 4, false, flags);
            loaded.push((r, v));
        } else {
            let v = if user_bank && (8..15).contains(&r) {
                ctx.call(ArmHelper::UserRegRead(r), &[])
            } else {
                ctx.load_reg(r)
            };
            ctx.store(v, addr, 4, flags);
        }
        addr = ctx.add_imm32(addr, 4);
    }

    // 基址在加载列表中时以加载值为准
    if wback && !(load && regs & (1 << rn) != 0) {
        let delta = match mode {
            BlockMode::Ia | BlockMode::Ib => 4 * n,
            BlockMode::Da | BlockMode::Db => -4 * n,
        };
        let nb = ctx.add_imm32(base, delta);
        ctx.store_reg(rn, nb);
    }

    for (r, v) in loaded {
        if r == 15 {
            if exc_return {
                ctx.call_void(ArmHelper::ExceptionReturn, &[v]);
                let target = ctx.get_slot(slot::PC);
                ctx.jump(Terminator::JmpReg { target }, BlockEnd::StateChange);
            } else {
                branch::load_write_pc(ctx, v);
            }
        } else if user_bank && r >= 8 {
            ctx.call_void(ArmHelper::UserRegWrite(r), &[v]);
        } else {
            ctx.store_reg(r, v);
        }
    }
}

/// LDREX/STREX 族，监视器由辅助函数维护
#[allow(clippy::too_many_arguments)]
pub(crate) fn exclusive(
    ctx: &mut DisasContext<'_>,
    load: bool,
    size: u8,
    rd: u8,
    rt: u8,
    rt2: Option<u8>,
    rn: u8,
    offset: u32,
    ordered: bool,
) {
    let base = ctx.load_reg(rn);
    let addr = ctx.add_imm32(base, offset as i32);
    if load {
        let v = ctx.call(ArmHelper::LoadExclusive { size }, &[addr]);
        if ordered {
            ctx.push(IROp::Fence { order: MemOrder::Acquire });
        }
        match rt2 {
            Some(rt2) => {
                let lo = ctx.zext32(v);
                let hi = ctx.shr_imm(v, 32);
                ctx.store_reg(rt, lo);
                ctx.store_reg(rt2, hi);
            }
            None => ctx.store_reg(rt, v),
        }
    } else {
        if ordered {
            ctx.push(IROp::Fence { order: MemOrder::Release });
        }
        let lo = ctx.load_reg(rt);
        let status = match rt2 {
            Some(rt2) => {
                let hi = ctx.load_reg(rt2);
                ctx.call(ArmHelper::StoreExclusive { size }, &[addr, lo, hi])
            }
            None => ctx.call(ArmHelper::StoreExclusive { size }, &[addr, lo]),
        };
        ctx.store_reg(rd, status);
    }
}

/// LDA/STL
pub(crate) fn ordered(ctx: &mut DisasContext<'_>, load: bool, size: u8, rt: u8, rn: u8) {
    let addr = ctx.load_reg(rn);
    let order = if load { MemOrder::Acquire } else { MemOrder::Release };
    let flags = MemFlags { align: size, order, ..ctx.mem_flags(false) };
    if load {
        let v = ctx.load(addr, size, false, flags);
        ctx.store_reg(rt, v);
    } else {
        let v = ctx.load_reg(rt);
        ctx.store(v, addr, size, flags);
    }
}

pub(crate) fn clrex(ctx: &mut DisasContext<'_>) {
    ctx.call_void(ArmHelper::ClearExclusive, &[]);
}

/// SWP/SWPB：读旧值、写新值
pub(crate) fn swp(ctx: &mut DisasContext<'_>, byte: bool, rt: u8, rt2: u8, rn: u8) {
    let size = if byte { 1 } else { 4 };
    let addr = ctx.load_reg(rn);
    let flags = MemFlags { order: MemOrder::AcqRel, ..ctx.mem_flags(false) };
    let old = ctx.load(addr, size, false, flags);
    let new = ctx.load_reg(rt2);
    ctx.store(new, addr, size, flags);
    ctx.store_reg(rt, old);
}
