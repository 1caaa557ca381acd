//! 分支

use vm_arm_cpu::state::slot;
use vm_arm_cpu::ArmFeatures;
use vm_core::GuestAddr;
use vm_ir::{IROp, RegId, Terminator};

use crate::context::{BlockEnd, DisasContext};

/// 数据处理指令写 PC：ARMv7 起 ARM 状态下按 BX 处理
pub(crate) fn alu_write_pc(ctx: &mut DisasContext<'_>, v: RegId) {
    if !ctx.thumb() && ctx.flags.features.contains(ArmFeatures::V7) {
        ctx.bx(v);
    } else {
        ctx.branch_reg(v);
    }
}

/// 加载指令写 PC：ARMv5 起按 BX 处理
pub(crate) fn load_write_pc(ctx: &mut DisasContext<'_>, v: RegId) {
    if ctx.flags.features.contains(ArmFeatures::V5) {
        ctx.bx(v);
    } else {
        ctx.branch_reg(v);
    }
}

/// LR 指向下一条指令，Thumb 下带 bit 0
fn write_link(ctx: &mut DisasContext<'_>) {
    let lr = if ctx.thumb() { ctx.next_pc | 1 } else { ctx.next_pc };
    let v = ctx.imm(lr);
    ctx.store_reg(14, v);
}

pub(crate) fn branch(ctx: &mut DisasContext<'_>, link: bool, offset: i32) {
    let target = ctx.pc_read().wrapping_add(offset as u32);
    if link {
        write_link(ctx);
    }
    ctx.jump_to(target);
}

/// BLX imm：切换指令集，目标块的标志不同，不做直接链接
pub(crate) fn blx_imm(ctx: &mut DisasContext<'_>, offset: i32) {
    let base = if ctx.thumb() { ctx.pc_read() & !3 } else { ctx.pc_read() };
    let target = base.wrapping_add(offset as u32);
    write_link(ctx);
    let t = ctx.imm(u32::from(!ctx.thumb()));
    ctx.set_slot(slot::THUMB, t);
    let target = ctx.imm(target);
    ctx.set_slot(slot::PC, target);
    ctx.jump(Terminator::JmpReg { target }, BlockEnd::Branch);
}

/// BX/BLX 寄存器；先读 Rm 再写 LR (BLX LR)
pub(crate) fn branch_reg(ctx: &mut DisasContext<'_>, link: bool, rm: u8) {
    let v = ctx.load_reg(rm);
    if link {
        write_link(ctx);
    }
    ctx.bx(v);
}

pub(crate) fn cbz(ctx: &mut DisasContext<'_>, nonzero: bool, rn: u8, offset: u32) {
    let v = ctx.load_reg(rn);
    let zero = ctx.imm(0);
    let taken = if nonzero { ctx.cmp_ne(v, zero) } else { ctx.cmp_eq(v, zero) };
    let label = ctx.b.new_label();
    ctx.push(IROp::BrCond { cond: taken, label });
    ctx.push(IROp::Exit(Terminator::Jmp { target: GuestAddr(u64::from(ctx.next_pc)) }));
    ctx.push(IROp::Label(label));
    ctx.jump_to(ctx.pc_read().wrapping_add(offset));
}

/// TBB/TBH：PC + 2 * 表项
pub(crate) fn table_branch(ctx: &mut DisasContext<'_>, half: bool, rn: u8, rm: u8) {
    let base = ctx.load_reg(rn);
    let idx = ctx.load_reg(rm);
    let off = if half { ctx.shl_imm(idx, 1) } else { idx };
    let sum = ctx.add(base, off);
    let addr = ctx.zext32(sum);
    let flags = ctx.mem_flags(false);
    let entry = ctx.load(addr, if half { 2 } else { 1 }, false, flags);
    let delta = ctx.shl_imm(entry, 1);
    let pc = ctx.imm(ctx.pc_read());
    let target = ctx.add(pc, delta);
    let target = ctx.zext32(target);
    ctx.branch_reg(target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::cpreg::CpRegTable;
    use vm_arm_cpu::{ArmCpu, CpuModel};

    fn ctx_for(table: &CpRegTable, model: CpuModel, thumb: bool) -> DisasContext<'_> {
        let mut flags = ArmCpu::new(model).unwrap().block_flags();
        flags.thumb = thumb;
        let mut ctx = DisasContext::new(0x2000, flags, table);
        ctx.next_pc = if thumb { 0x2002 } else { 0x2004 };
        ctx
    }

    #[test]
    fn test_bl_links_and_chains() {
        let table = CpRegTable::builder().freeze();
        let mut ctx = ctx_for(&table, CpuModel::CortexA9, false);
        branch(&mut ctx, true, 0x100);
        assert_eq!(ctx.term, Some(Terminator::Jmp { target: GuestAddr(0x2108) }));
        assert!(matches!(ctx.b.ops()[..], [IROp::MovImm { imm: 0x2004, .. }, IROp::SetReg { reg: 14, .. }]));
    }

    #[test]
    fn test_blx_from_thumb_aligns_base() {
        let table = CpRegTable::builder().freeze();
        let mut ctx = ctx_for(&table, CpuModel::CortexA9, true);
        ctx.pc = 0x2002;
        ctx.next_pc = 0x2006;
        blx_imm(&mut ctx, 0x10);
        // Align(0x2006, 4) + 0x10
        assert!(ctx.b.ops().iter().any(|op| matches!(op, IROp::MovImm { imm: 0x2014, .. })));
        assert!(ctx.b.ops().iter().any(|op| matches!(op, IROp::MovImm { imm: 0x2007, .. })));
        assert!(matches!(ctx.term, Some(Terminator::JmpReg { .. })));
    }

    #[test]
    fn test_cbz_has_two_exits() {
        let table = CpRegTable::builder().freeze();
        let mut ctx = ctx_for(&table, CpuModel::CortexM3, true);
        cbz(&mut ctx, false, 0, 0x20);
        assert!(ctx.b.ops().iter().any(|op| matches!(op, IROp::Exit(Terminator::Jmp { target }) if target.0 == 0x2002)));
        assert_eq!(ctx.term, Some(Terminator::Jmp { target: GuestAddr(0x2024) }));
    }

    #[test]
    fn test_alu_pc_write_interworks_on_v7() {
        let table = CpRegTable::builder().freeze();
        let mut ctx = ctx_for(&table, CpuModel::CortexA9, false);
        let v = ctx.imm(0x3001);
        alu_write_pc(&mut ctx, v);
        assert!(ctx.b.ops().iter().any(|op| matches!(op, IROp::SetReg { reg: slot::THUMB, .. })));

        let mut ctx = ctx_for(&table, CpuModel::Arm926, false);
        let v = ctx.imm(0x3001);
        alu_write_pc(&mut ctx, v);
        assert!(!ctx.b.ops().iter().any(|op| matches!(op, IROp::SetReg { reg: slot::THUMB, .. })));
    }
}
