//! MCR/MRC/MCRR/MRRC 的翻译
//!
//! 描述符在翻译期解析：特权级许可在这里静态判定，带访问谓词的寄存器
//! 另外发射运行时检查。没有描述符的 cp15 访问落到旧式处理；其余未知键
//! 由分发表记录一次日志，读为 0、写忽略。

use smallvec::SmallVec;
use vm_arm_cpu::cpreg::{CpRegKey, CpRegType, LegacyOp, Resolution};
use vm_arm_cpu::state::slot;
use vm_arm_cpu::ArmHelper;
use vm_core::{GuestAddr, VmResult};
use vm_ir::{IROp, MemOrder, RegId, Terminator};

use crate::context::{BlockEnd, DisasContext};
use crate::decode::CoprocInsn;

pub(crate) fn translate(ctx: &mut DisasContext<'_>, c: &CoprocInsn) -> VmResult<()> {
    let key = CpRegKey::new(c.cp, c.rt2.is_some(), ctx.flags.secure, c.crn, c.crm, c.opc1, c.opc2);
    let el = ctx.flags.el();
    let table = ctx.cpregs;
    let desc = match table.resolve(&key) {
        Ok(Resolution::Register(desc)) => desc,
        Ok(Resolution::Legacy(op)) => {
            if el == 0 {
                ctx.undef();
                return Ok(());
            }
            legacy(ctx, c, key, op);
            return Ok(());
        }
        Err(e) if !e.is_fatal() => {
            if c.read {
                let zero = ctx.imm(0);
                write_result(ctx, c, zero);
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if !desc.access.allows(el, c.read) {
        log::debug!("{:#010x}: {} denied at EL{el}", ctx.pc, desc.name);
        ctx.undef();
        return Ok(());
    }
    if desc.accessfn.is_some() {
        ctx.call_void(ArmHelper::CpAccessCheck { key, is_read: c.read }, &[]);
    }

    if desc.ty.contains(CpRegType::NOP) {
        return Ok(());
    }
    if desc.ty.contains(CpRegType::WFI) {
        crate::translate::system::wait_for_interrupt(ctx);
        return Ok(());
    }
    if desc.ty.contains(CpRegType::BARRIER) {
        ctx.push(IROp::Fence { order: MemOrder::AcqRel });
        return Ok(());
    }

    if c.read {
        let v = ctx.call(ArmHelper::CpRead(key), &[]);
        write_result(ctx, c, v);
        if desc.read_ends_block() {
            end_block(ctx);
        }
    } else {
        let args = source_args(ctx, c);
        ctx.call_void(ArmHelper::CpWrite(key), &args);
        if desc.write_ends_block() {
            end_block(ctx);
        }
    }
    Ok(())
}

fn legacy(ctx: &mut DisasContext<'_>, c: &CoprocInsn, key: CpRegKey, op: LegacyOp) {
    match (op, c.read) {
        (LegacyOp::TlbInvalidate, false) => {
            let args = source_args(ctx, c);
            ctx.call_void(ArmHelper::CpWrite(key), &args);
            end_block(ctx);
        }
        (_, true) => {
            let zero = ctx.imm(0);
            write_result(ctx, c, zero);
        }
        (_, false) => {}
    }
}

fn source_args(ctx: &mut DisasContext<'_>, c: &CoprocInsn) -> SmallVec<[RegId; 2]> {
    let lo = ctx.load_reg(c.rt);
    match c.rt2 {
        Some(rt2) => {
            let hi = ctx.load_reg(rt2);
            SmallVec::from_slice(&[lo, hi])
        }
        None => SmallVec::from_slice(&[lo]),
    }
}

/// MRC 的 Rt 为 15 时只取高 4 位写 NZCV
fn write_result(ctx: &mut DisasContext<'_>, c: &CoprocInsn, v: RegId) {
    if let Some(rt2) = c.rt2 {
        let lo = ctx.zext32(v);
        let hi = ctx.shr_imm(v, 32);
        let hi = ctx.zext32(hi);
        ctx.store_reg(c.rt, lo);
        ctx.store_reg(rt2, hi);
    } else if c.rt == 15 {
        for (n, s) in [(31u8, slot::NF), (30, slot::ZF), (29, slot::CF), (28, slot::VF)] {
            let f = ctx.bit(v, n);
            ctx.set_slot(s, f);
        }
    } else {
        let v = ctx.zext32(v);
        ctx.store_reg(c.rt, v);
    }
}

/// 系统寄存器写可能改变模式或映射，回到调度循环重新计算块标志
fn end_block(ctx: &mut DisasContext<'_>) {
    let pc = GuestAddr(u64::from(ctx.next_pc));
    ctx.jump(Terminator::Exit { pc }, BlockEnd::CoprocWrite);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::cpreg::{CpAccess, CpRegDesc, CpRegTable};
    use vm_arm_cpu::{ArmCpu, CpuModel};

    fn ctx_for(table: &CpRegTable, privileged: bool) -> DisasContext<'_> {
        let mut flags = ArmCpu::new(CpuModel::CortexA9).unwrap().block_flags();
        flags.privileged = privileged;
        let mut ctx = DisasContext::new(0x8000, flags, table);
        ctx.next_pc = 0x8004;
        ctx
    }

    fn mcr(read: bool, crn: u8) -> CoprocInsn {
        CoprocInsn { read, cp: 15, opc1: 0, crn, crm: 0, opc2: 0, rt: 0, rt2: None }
    }

    fn calls(ctx: &DisasContext<'_>) -> Vec<ArmHelper> {
        ctx.b
            .ops()
            .iter()
            .filter_map(|op| match op {
                IROp::Call { helper, .. } => Some(*helper),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_write_ends_block() {
        let mut b = CpRegTable::builder();
        b.register(CpRegDesc::new("TEST", 15, 1, 0, 0, 0).access(CpAccess::PL1_RW)).unwrap();
        let table = b.freeze();
        let mut ctx = ctx_for(&table, true);
        translate(&mut ctx, &mcr(false, 1)).unwrap();
        assert_eq!(ctx.end, Some(BlockEnd::CoprocWrite));
        assert_eq!(ctx.term, Some(Terminator::Exit { pc: GuestAddr(0x8004) }));
        assert!(matches!(calls(&ctx)[..], [ArmHelper::CpWrite(_)]));

        // 读不结束块
        let mut ctx = ctx_for(&table, true);
        translate(&mut ctx, &mcr(true, 1)).unwrap();
        assert_eq!(ctx.end, None);
    }

    #[test]
    fn test_unprivileged_access_is_undefined() {
        let mut b = CpRegTable::builder();
        b.register(CpRegDesc::new("TEST", 15, 1, 0, 0, 0).access(CpAccess::PL1_RW)).unwrap();
        let table = b.freeze();
        let mut ctx = ctx_for(&table, false);
        translate(&mut ctx, &mcr(true, 1)).unwrap();
        assert_eq!(ctx.end, Some(BlockEnd::Trap));
        assert!(calls(&ctx).is_empty());
    }

    #[test]
    fn test_unknown_register_reads_zero() {
        let table = CpRegTable::builder().freeze();
        let mut ctx = ctx_for(&table, true);
        let c = CoprocInsn { read: true, cp: 14, opc1: 7, crn: 3, crm: 3, opc2: 7, rt: 2, rt2: None };
        translate(&mut ctx, &c).unwrap();
        assert_eq!(ctx.end, None);
        assert!(matches!(ctx.b.ops().last(), Some(IROp::SetReg { reg: 2, .. })));
    }

    #[test]
    fn test_legacy_tlb_invalidate() {
        let table = CpRegTable::builder().freeze();
        let mut ctx = ctx_for(&table, true);
        translate(&mut ctx, &mcr(false, 8)).unwrap();
        assert_eq!(ctx.end, Some(BlockEnd::CoprocWrite));
    }
}
