//! A32 块翻译测试


use proptest::prelude::*;
use test_mmu::*;
use vm_arm_cpu::bits::Cond;
use vm_arm_cpu::exception::{EXCP_PREFETCH_ABORT, EXCP_SWI, EXCP_UDEF};
use vm_arm_cpu::{ArmHelper, CpuModel, TranslationOptions};
use vm_core::{Decoder, GuestAddr};
use vm_frontend_arm::Insn;
use vm_frontend_arm::decode::DpOp;
use vm_ir::{ExitKind, IROp, Terminator};

const BASE: u64 = 0x8000;

fn mmu_with(words: &[u32]) -> TestMmu {
    let mut mmu = TestMmu::new(BASE, 0x2000);
    mmu.load_words(BASE, words);
    mmu
}

#[test]
fn test_straight_line_block() {
    // mov r0, #1; add r1, r0, #2; b .
    let mmu = mmu_with(&[0xe3a00001, 0xe2801002, 0xeafffffe]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.pc, GuestAddr(BASE));
    assert_eq!(block.tb.icount, 3);
    assert_eq!(block.tb.size, 12);
    assert_eq!(block.tb.exit, ExitKind::DirectChain);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8008) });
    let starts = block.ir.ops.iter().filter(|op| matches!(op, IROp::InsnStart { .. })).count();
    assert_eq!(starts, 3);
    assert!(block.ir.validate().is_ok());
}

#[test]
fn test_conditional_insn_skips_over_label() {
    // mov r0, #1; addeq r0, r0, #1; b .
    let mmu = mmu_with(&[0xe3a00001, 0x02800001, 0xeafffffe]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    let ops = &block.ir.ops;
    let br = ops.iter().position(|op| matches!(op, IROp::BrCond { .. })).unwrap();
    let label = ops.iter().position(|op| matches!(op, IROp::Label(_))).unwrap();
    assert!(br < label);
    assert_eq!(block.tb.icount, 3);
}

#[test]
fn test_svc_ends_block_with_exception() {
    // mov r0, #1; svc #0x12; nop
    let mmu = mmu_with(&[0xe3a00001, 0xef000012, 0xe1a00000]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 2);
    assert_eq!(block.tb.exit, ExitKind::Exception);
    assert_eq!(
        block.ir.term,
        Terminator::Exception { excp: EXCP_SWI, syndrome: 0x12, pc: GuestAddr(0x8008) }
    );
}

#[test]
fn test_unmapped_pc_is_prefetch_abort() {
    let mmu = mmu_with(&[]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(0x20000)).unwrap();

    assert_eq!(block.tb.icount, 0);
    assert_eq!(
        block.ir.term,
        Terminator::Exception { excp: EXCP_PREFETCH_ABORT, syndrome: 0x20000, pc: GuestAddr(0x20000) }
    );
}

#[test]
fn test_fetch_fault_after_first_insn_ends_block() {
    // RAM 在 0x9800 处结束，不在页边界上
    let mut mmu = TestMmu::new(BASE, 0x1800);
    mmu.load_words(0x97f8, &[0xe1a00000, 0xe1a00000]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(0x97f8)).unwrap();

    assert_eq!(block.tb.icount, 2);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x9800) });
}

#[test]
fn test_insn_limit() {
    let mmu = mmu_with(&[0xe1a00000; 8]);
    let options = TranslationOptions { max_insns: 2, ..Default::default() };
    let block = translator_with(CpuModel::CortexA9, options, |_| {})
        .translate_block(&mmu, GuestAddr(BASE))
        .unwrap();

    assert_eq!(block.tb.icount, 2);
    assert_eq!(block.tb.size, 8);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x8008) });
}

#[test]
fn test_block_stops_at_page_boundary() {
    let mut mmu = mmu_with(&[]);
    mmu.load_words(0x8ff8, &[0xe1a00000; 4]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(0x8ff8)).unwrap();

    assert_eq!(block.tb.icount, 2);
    assert_eq!(block.ir.term, Terminator::Jmp { target: GuestAddr(0x9000) });
}

#[test]
fn test_udf_raises_undef_at_own_pc() {
    let mmu = mmu_with(&[0xe7f000f0]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(
        block.ir.term,
        Terminator::Exception { excp: EXCP_UDEF, syndrome: 0, pc: GuestAddr(BASE) }
    );
}

#[test]
fn test_msr_control_field_ends_block() {
    // msr cpsr_c, r0; nop
    let mmu = mmu_with(&[0xe121f000, 0xe1a00000]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 1);
    assert_eq!(block.tb.exit, ExitKind::IndirectLookup);
    assert!(helper_calls(&block.ir.ops).iter().any(|h| matches!(h, ArmHelper::CpsrWrite { .. })));
}

#[test]
fn test_load_into_pc_is_indirect() {
    // pop {pc} 的 LDR 形式：ldr pc, [sp], #4
    let mmu = mmu_with(&[0xe49df004]);
    let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(block.tb.icount, 1);
    assert!(matches!(block.ir.term, Terminator::JmpReg { .. }));
    assert!(block.ir.ops.iter().any(|op| matches!(op, IROp::Load { size: 4, .. })));
}

#[test]
fn test_bx_lr_is_indirect() {
    let mmu = mmu_with(&[0xe12fff1e]);
    let block = translator(CpuModel::Arm926, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();
    assert_eq!(block.tb.exit, ExitKind::IndirectLookup);
}

#[test]
fn test_decode_insn_reports_condition() {
    let mmu = mmu_with(&[0x02800001]);
    let mut t = translator(CpuModel::CortexA9, false);
    let d = t.decode_insn(&mmu, GuestAddr(BASE)).unwrap();

    assert_eq!(d.cond, Cond::Eq);
    assert_eq!(d.len, 4);
    assert!(matches!(d.insn, Insn::DataProc { op: DpOp::Add, rd: 0, rn: 0, .. }));
}

#[test]
fn test_flags_recorded_in_descriptor() {
    let mmu = mmu_with(&[0xeafffffe]);
    let t = translator(CpuModel::CortexA9, false);
    let block = t.translate_block(&mmu, GuestAddr(BASE)).unwrap();
    assert_eq!(block.tb.flags, t.flags().to_bits());
}

proptest! {
    #[test]
    fn prop_mov_immediate_materialises_rotated_value(rd in 0u32..15, rot in 0u32..16, imm8 in 0u32..256) {
        // mov rd, #imm8 ror (2 * rot); b .
        let word = 0xe3a0_0000 | rd << 12 | rot << 8 | imm8;
        let mmu = mmu_with(&[word, 0xeafffffe]);
        let block = translator(CpuModel::CortexA9, false).translate_block(&mmu, GuestAddr(BASE)).unwrap();

        let value = u64::from(imm8.rotate_right(2 * rot));
        prop_assert_eq!(block.tb.icount, 2);
        prop_assert!(block.ir.ops.iter().any(|op| matches!(op, IROp::MovImm { imm, .. } if *imm == value)));
        prop_assert!(block.ir.validate().is_ok());
    }
}
