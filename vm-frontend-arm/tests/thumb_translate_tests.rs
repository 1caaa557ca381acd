//! Thumb (T16/T32) 与 M-profile 块翻译测试


use test_mmu::*;
use vm_arm_cpu::exception::{EXCP_BKPT, EXCP_INVSTATE};
use vm_arm_cpu::state::slot;
use vm_arm_cpu::{ArmHelper, CpuModel, TranslationOptions};
use vm_core::{Decoder, GuestAddr};
use vm_frontend_arm::Insn;
use vm_ir::{ExitKind, IROp, Terminator};

const BASE: u64 = 0x8000;

fn mmu_with(halves: &[u16]) -> TestMmu {
    let mut mmu = TestMmu::new(BASE, 0x2000);
    mmu.load_halfwords(BASE, halves);
    mmu
}

fn count_brcond(ops: &[IROp<ArmHelper>]) -> usize {
    ops.iter().filter(|op| matches!(op, IROp::BrCond { .. })).count()
}

#[test]
fn test_thumb16_block() {
    // movs r0, #1; adds r0, r0, r1; bx lr
    let mmu = mmu_with(&[0x2001, 0x1840, 0x4770]);
    let block = translator(CpuModel::CortexM3, true).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 3);
    assert_eq!(block.tb.size, 6);
    assert_eq!(block.tb.exit, ExitKind::IndirectLookup);
}

#[test]
fn test_ite_block_conditions_both_arms() {
    // ite eq; moveq r0, #1; movne r0, #2; b .
    let mmu = mmu_with(&[0xbf0c, 0x2001, 0x2002, 0xe7fe]);
    let block = translator(CpuModel::CortexA9, true).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 4);
    assert_eq!(count_brcond(&block.ir.ops), 2);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8006) });
    // 块出口写回 IT 状态
    assert!(block.ir.ops.iter().any(|op| matches!(op, IROp::SetReg { reg, .. } if *reg == slot::CONDEXEC)));
}

#[test]
fn test_block_resumes_inside_it() {
    // 上一个块停在 IT EQ 的最后一条之前
    let mmu = mmu_with(&[0x2001, 0x2101, 0xe7fe]);
    let t = translator_with(CpuModel::CortexA9, TranslationOptions::default(), |f| {
        f.thumb = true;
        f.condexec = 0x08;
    });
    let block = t.translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 3);
    assert_eq!(count_brcond(&block.ir.ops), 1);
}

#[test]
fn test_cbz_has_two_exits() {
    // cbz r0, 1f
    let mmu = mmu_with(&[0xb110, 0xbf00, 0xbf00, 0xbf00]);
    let block = translator(CpuModel::CortexM3, true).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 1);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8008) });
    assert!(block.ir.ops.iter().any(|op| matches!(
        op,
        IROp::Exit(Terminator::Jmp { target }) if *target == GuestAddr(0x8002)
    )));
}

#[test]
fn test_bl_links_with_thumb_bit() {
    let mmu = mmu_with(&[0xf000, 0xf800]);
    let block = translator(CpuModel::CortexM3, true).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 1);
    assert_eq!(block.tb.size, 4);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8004) });
    assert!(block.ir.ops.iter().any(|op| matches!(op, IROp::MovImm { imm: 0x8005, .. })));
}

#[test]
fn test_bkpt_in_it_block_is_unconditional() {
    // it eq; bkpt #0
    let mmu = mmu_with(&[0xbf08, 0xbe00]);
    let block = translator(CpuModel::CortexM3, true).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(count_brcond(&block.ir.ops), 0);
    assert_eq!(
        block.ir.term,
        Terminator::Exception { excp: EXCP_BKPT, syndrome: 0, pc: GuestAddr(0x8002) }
    );
}

#[test]
fn test_v7m_special_registers() {
    // mrs r0, primask; msr primask, r0; nop
    let mmu = mmu_with(&[0xf3ef, 0x8010, 0xf380, 0x8810, 0xbf00]);
    let block = translator(CpuModel::CortexM4, true).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 2);
    assert_eq!(block.tb.exit, ExitKind::IndirectLookup);
    let calls = helper_calls(&block.ir.ops);
    assert_eq!(calls, vec![ArmHelper::V7mMrs(16), ArmHelper::V7mMsr { sysm: 16, mask: 2 }]);
}

#[test]
fn test_cpsid_on_m_profile() {
    let mmu = mmu_with(&[0xb672, 0xbf00]);
    let block = translator(CpuModel::CortexM3, true).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 1);
    assert!(helper_calls(&block.ir.ops).contains(&ArmHelper::V7mMsr { sysm: 16, mask: 0 }));
}

#[test]
fn test_m_profile_without_thumb_bit_faults() {
    let mmu = mmu_with(&[0xbf00]);
    let block = translator(CpuModel::CortexM3, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 0);
    assert_eq!(
        block.ir.term,
        Terminator::Exception { excp: EXCP_INVSTATE, syndrome: 0, pc: GuestAddr(BASE) }
    );
}

#[test]
fn test_thumb32_across_page_starts_next_block() {
    let mut mmu = mmu_with(&[]);
    mmu.load_halfwords(0x8ffc, &[0xbf00, 0xf000, 0xf800]);
    let block = translator(CpuModel::CortexM3, true).translate_block(&mmu, GuestAddr(0x8ffc)).unwrap();

    assert_eq!(block.tb.icount, 1);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8ffe) });
}

#[test]
fn test_decode_thumb32_load() {
    // ldr.w r0, [r1, #4]
    let mmu = mmu_with(&[0xf8d1, 0x0004]);
    let mut t = translator(CpuModel::CortexM3, true);
    let d = t.decode_insn(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(d.len, 4);
    assert!(matches!(d.insn, Insn::Mem(_)));
}
