//! 状态寄存器、异常产生、提示与屏障

use smallvec::SmallVec;
use vm_arm_cpu::exception::{EXCP_BKPT, EXCP_SMC, EXCP_SWI};
use vm_arm_cpu::psr::{CPSR_A, CPSR_E, CPSR_F, CPSR_GE, CPSR_I, CPSR_M, CPSR_NZCV, CPSR_Q};
use vm_arm_cpu::state::{slot, CpsrWriteKind};
use vm_arm_cpu::v7m;
use vm_arm_cpu::{ArmFeatures, ArmHelper};
use vm_core::GuestAddr;
use vm_ir::{IROp, MemOrder, Terminator};

use crate::context::{BlockEnd, DisasContext};
use crate::decode::{BarrierKind, HintOp, MsrSrc};

pub(crate) fn mrs(ctx: &mut DisasContext<'_>, rd: u8, spsr: bool) {
    let helper = if spsr { ArmHelper::SpsrRead } else { ArmHelper::CpsrRead };
    let v = ctx.call(helper, &[]);
    ctx.store_reg(rd, v);
}

pub(crate) fn msr(ctx: &mut DisasContext<'_>, spsr: bool, mask: u32, src: MsrSrc) {
    let v = match src {
        MsrSrc::Imm(imm) => ctx.imm(imm),
        MsrSrc::Reg(rn) => ctx.load_reg(rn),
    };
    if spsr {
        ctx.call_void(ArmHelper::SpsrWrite { mask }, &[v]);
        return;
    }
    ctx.call_void(ArmHelper::CpsrWrite { mask, kind: CpsrWriteKind::Instruction }, &[v]);
    // 只改标志位时块标志不变
    if mask & !(CPSR_NZCV | CPSR_Q | CPSR_GE) != 0 {
        ctx.end_after_state_change();
    }
}

pub(crate) fn mrs_banked(ctx: &mut DisasContext<'_>, rd: u8, r: bool, sysm: u8) {
    let v = ctx.call(ArmHelper::BankedRead { r, sysm }, &[]);
    ctx.store_reg(rd, v);
}

pub(crate) fn msr_banked(ctx: &mut DisasContext<'_>, rn: u8, r: bool, sysm: u8) {
    let v = ctx.load_reg(rn);
    ctx.call_void(ArmHelper::BankedWrite { r, sysm }, &[v]);
    ctx.end_after_state_change();
}

pub(crate) fn v7m_mrs(ctx: &mut DisasContext<'_>, rd: u8, sysm: u8) {
    let v = ctx.call(ArmHelper::V7mMrs(sysm), &[]);
    ctx.store_reg(rd, v);
}

/// xPSR 以外的特殊寄存器 (栈指针、屏蔽、CONTROL) 写入后结束块
pub(crate) fn v7m_msr(ctx: &mut DisasContext<'_>, rn: u8, sysm: u8, mask: u8) {
    let v = ctx.load_reg(rn);
    ctx.call_void(ArmHelper::V7mMsr { sysm, mask }, &[v]);
    if u32::from(sysm) > v7m::sysm::IEPSR {
        ctx.end_after_state_change();
    }
}

/// CPS；M-profile 上改写 PRIMASK/FAULTMASK，用户模式下为空操作
pub(crate) fn cps(ctx: &mut DisasContext<'_>, imod: Option<bool>, a: bool, i: bool, f: bool, mode: Option<u8>) {
    if ctx.flags.m_profile {
        let Some(disable) = imod else {
            return;
        };
        let v = ctx.imm(u32::from(disable));
        if i {
            ctx.call_void(ArmHelper::V7mMsr { sysm: v7m::sysm::PRIMASK as u8, mask: 0 }, &[v]);
        }
        if f {
            ctx.call_void(ArmHelper::V7mMsr { sysm: v7m::sysm::FAULTMASK as u8, mask: 0 }, &[v]);
        }
        ctx.end_after_state_change();
        return;
    }
    if !ctx.flags.privileged {
        return;
    }

    let mut mask = 0;
    let mut val = 0;
    if let Some(disable) = imod {
        for (bit, set) in [(CPSR_A, a), (CPSR_I, i), (CPSR_F, f)] {
            if set {
                mask |= bit;
                if disable {
                    val |= bit;
                }
            }
        }
    }
    if let Some(m) = mode {
        mask |= CPSR_M;
        val |= u32::from(m);
    }
    if mask != 0 {
        let v = ctx.imm(val);
        ctx.call_void(ArmHelper::CpsrWrite { mask, kind: CpsrWriteKind::Instruction }, &[v]);
    }
    ctx.end_after_state_change();
}

pub(crate) fn svc(ctx: &mut DisasContext<'_>, imm: u32) {
    ctx.exception(EXCP_SWI, imm, true);
}

/// BKPT 报告的是自身地址
pub(crate) fn bkpt(ctx: &mut DisasContext<'_>, imm: u16) {
    ctx.exception(EXCP_BKPT, u32::from(imm), false);
}

pub(crate) fn smc(ctx: &mut DisasContext<'_>) {
    if ctx.flags.features.contains(ArmFeatures::EL3) && ctx.flags.privileged {
        ctx.exception(EXCP_SMC, 0, true);
    } else {
        ctx.undef();
    }
}

pub(crate) fn hint(ctx: &mut DisasContext<'_>, op: HintOp) {
    match op {
        HintOp::Nop => {}
        HintOp::Yield => {
            let pc = GuestAddr(u64::from(ctx.next_pc));
            ctx.jump(Terminator::Exit { pc }, BlockEnd::Wait);
        }
        HintOp::Wfi => wait_for_interrupt(ctx),
        HintOp::Wfe => wait(ctx, ArmHelper::Wfe),
        HintOp::Sev => ctx.call_void(ArmHelper::Sev, &[]),
    }
}

/// WFI；被 cp15 的等待寄存器复用
pub(crate) fn wait_for_interrupt(ctx: &mut DisasContext<'_>) {
    wait(ctx, ArmHelper::Wfi);
}

/// 等待类指令：唤醒后从下一条继续，PC 先写为 next_pc
fn wait(ctx: &mut DisasContext<'_>, helper: ArmHelper) {
    let next = ctx.imm(ctx.next_pc);
    ctx.set_slot(slot::PC, next);
    ctx.push(IROp::Call { helper, args: SmallVec::new(), dst: None });
    let pc = GuestAddr(u64::from(ctx.next_pc));
    ctx.jump(Terminator::Exit { pc }, BlockEnd::Wait);
}

/// ISB 之后重新取指
pub(crate) fn barrier(ctx: &mut DisasContext<'_>, kind: BarrierKind) {
    ctx.push(IROp::Fence { order: MemOrder::AcqRel });
    if kind == BarrierKind::Isb {
        let target = GuestAddr(u64::from(ctx.next_pc));
        ctx.jump(Terminator::Jmp { target }, BlockEnd::StateChange);
    }
}

pub(crate) fn setend(ctx: &mut DisasContext<'_>, big: bool) {
    if big == ctx.flags.big_endian_data {
        return;
    }
    let v = ctx.imm(if big { CPSR_E } else { 0 });
    ctx.call_void(ArmHelper::CpsrWrite { mask: CPSR_E, kind: CpsrWriteKind::Instruction }, &[v]);
    ctx.end_after_state_change();
}

/// IT：只更新翻译期状态，由翻译循环在块出口写回
pub(crate) fn it(ctx: &mut DisasContext<'_>, firstcond: u8, mask: u8) {
    ctx.condexec_cond = firstcond & 0xe;
    ctx.condexec_mask = ((firstcond & 1) << 4) | (mask & 0xf);
}
