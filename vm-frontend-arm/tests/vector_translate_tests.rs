//! VFP、NEON、MVE 与低开销循环的块翻译测试


use test_mmu::*;
use vm_arm_cpu::exception::{EXCP_INVSTATE, EXCP_NOCP, EXCP_UDEF};
use vm_arm_cpu::state::slot;
use vm_arm_cpu::{ArmHelper, CpuModel, TranslationOptions};
use vm_core::GuestAddr;
use vm_ir::{IROp, Terminator};

const BASE: u64 = 0x8000;

fn arm_block(model: CpuModel, words: &[u32], vfp: bool) -> vm_frontend_arm::ArmBlock {
    let mut mmu = TestMmu::new(BASE, 0x2000);
    mmu.load_words(BASE, words);
    translator_with(model, TranslationOptions::default(), |f| f.vfp_enabled = vfp)
        .translate_block(&mmu, GuestAddr(BASE))
        .unwrap()
}

fn m55_block(halves: &[u16], adjust: impl FnOnce(&mut vm_arm_cpu::BlockFlags)) -> vm_frontend_arm::ArmBlock {
    let mut mmu = TestMmu::new(BASE, 0x2000);
    mmu.load_halfwords(BASE, halves);
    translator_with(CpuModel::CortexM55, TranslationOptions::default(), |f| {
        f.thumb = true;
        f.vfp_enabled = true;
        adjust(f);
    })
    .translate_block(&mmu, GuestAddr(BASE))
    .unwrap()
}

fn vfp_calls(ops: &[IROp<ArmHelper>]) -> usize {
    helper_calls(ops).iter().filter(|h| matches!(h, ArmHelper::Vfp(_))).count()
}

#[test]
fn test_vfp_add_calls_helper() {
    // vadd.f32 s0, s1, s2; b .
    let block = arm_block(CpuModel::CortexA9, &[0xee300a81, 0xeafffffe], true);
    assert_eq!(block.tb.icount, 2);
    assert_eq!(vfp_calls(&block.ir.ops), 1);
}

#[test]
fn test_vfp_disabled_is_undef() {
    let block = arm_block(CpuModel::CortexA9, &[0xee300a81], false);
    assert_eq!(
        block.ir.term,
        Terminator::Exception { excp: EXCP_UDEF, syndrome: 0, pc: GuestAddr(BASE) }
    );
}

#[test]
fn test_short_vector_expands() {
    // vadd.f32 s8, s16, s24，LEN=2 STRIDE=1
    let mut mmu = TestMmu::new(BASE, 0x2000);
    mmu.load_words(BASE, &[0xee384a0c]);
    let block = translator_with(CpuModel::CortexA9, TranslationOptions::default(), |f| {
        f.vfp_enabled = true;
        f.vec_len = 2;
        f.vec_stride = 1;
    })
    .translate_block(&mmu, GuestAddr(BASE))
    .unwrap();
    assert_eq!(vfp_calls(&block.ir.ops), 2);
}

#[test]
fn test_fma_needs_vfp4() {
    // vfma.f32 s0, s1, s2
    let a9 = arm_block(CpuModel::CortexA9, &[0xeea00a81], true);
    assert!(matches!(a9.ir.term, Terminator::Exception { excp: EXCP_UDEF, .. }));

    let a15 = arm_block(CpuModel::CortexA15, &[0xeea00a81, 0xeafffffe], true);
    assert_eq!(vfp_calls(&a15.ir.ops), 1);
}

#[test]
fn test_neon_add_calls_helper() {
    // vadd.i32 q0, q1, q2
    let block = arm_block(CpuModel::CortexA9, &[0xf2220844, 0xeafffffe], true);
    assert!(helper_calls(&block.ir.ops).iter().any(|h| matches!(h, ArmHelper::Neon(_))));
}

#[test]
fn test_mve_add_calls_helper() {
    // vadd.i32 q0, q1, q2; b .
    let block = m55_block(&[0xef22, 0x0844, 0xe7fe], |_| {});
    assert_eq!(block.tb.icount, 2);
    assert!(helper_calls(&block.ir.ops).iter().any(|h| matches!(h, ArmHelper::Mve(_))));
}

#[test]
fn test_mve_with_fpu_off_is_nocp() {
    let block = m55_block(&[0xef22, 0x0844], |f| f.vfp_enabled = false);
    assert_eq!(
        block.ir.term,
        Terminator::Exception { excp: EXCP_NOCP, syndrome: 0, pc: GuestAddr(BASE) }
    );
}

#[test]
fn test_eci_rejects_non_beatwise_insn() {
    // ECI=1 之后的 NOP
    let block = m55_block(&[0xbf00], |f| f.condexec = 0x10);
    assert!(matches!(block.ir.term, Terminator::Exception { excp: EXCP_INVSTATE, .. }));
}

#[test]
fn test_eci_cleared_after_beatwise_insn() {
    let block = m55_block(&[0xef22, 0x0844, 0xe7fe], |f| f.condexec = 0x10);
    assert!(helper_calls(&block.ir.ops).iter().any(|h| matches!(h, ArmHelper::Mve(_))));
    assert!(block.ir.ops.iter().any(|op| matches!(op, IROp::SetReg { reg, .. } if *reg == slot::CONDEXEC)));
}

#[test]
fn test_dls_sets_lr() {
    // dls lr, r0; b .
    let block = m55_block(&[0xf040, 0xe001, 0xe7fe], |_| {});
    assert_eq!(block.tb.icount, 2);
    assert!(block.ir.ops.iter().any(|op| matches!(op, IROp::SetReg { reg, .. } if *reg == slot::LR)));
}

#[test]
fn test_wls_skips_loop_when_zero() {
    // wls lr, r1, #0x20
    let block = m55_block(&[0xf041, 0xc021], |_| {});
    assert_eq!(block.tb.icount, 1);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8004) });
    assert!(block.ir.ops.iter().any(|op| matches!(
        op,
        IROp::Exit(Terminator::Jmp { target }) if *target == GuestAddr(0x8024)
    )));
}

#[test]
fn test_le_branches_back() {
    // le lr, #-0x20
    let block = m55_block(&[0xf03f, 0xc021], |_| {});
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8004) });
    assert!(block.ir.ops.iter().any(|op| matches!(
        op,
        IROp::Exit(Terminator::Jmp { target }) if *target == GuestAddr(0x7fe4)
    )));
}

#[test]
fn test_letp_needs_fpu() {
    let block = m55_block(&[0xf01f, 0xc021], |f| f.vfp_enabled = false);
    assert!(matches!(block.ir.term, Terminator::Exception { excp: EXCP_NOCP, .. }));

    // 普通 LE 不需要
    let block = m55_block(&[0xf03f, 0xc021], |f| f.vfp_enabled = false);
    assert!(matches!(block.ir.term, Terminator::Jmp { .. }));
}
