//! 翻译-执行循环

use vm_core::{ExecResult, ExecStats, ExecStatus, ExecutionEngine, GuestAddr, MMU, VmResult};
use vm_frontend_arm::ArmTranslator;

use crate::Interpreter;

/// 从当前 PC 起反复翻译并执行块，最多 `max_blocks` 个
///
/// 每个块按执行前的 CPU 状态重新计算块标志。遇到客户机异常、等待或
/// 块数用尽时返回；异常的分发留给调用方。
pub fn run_chain(
    translator: &mut ArmTranslator,
    interp: &mut Interpreter,
    mmu: &mut dyn MMU,
    max_blocks: usize,
) -> VmResult<ExecResult> {
    let mut total = ExecStats::default();
    let mut last = ExecResult {
        status: ExecStatus::Continue,
        next_pc: GuestAddr(u64::from(interp.cpu().regs[15])),
        stats: total,
    };
    for _ in 0..max_blocks {
        translator.set_flags(interp.cpu().block_flags());
        let pc = GuestAddr(u64::from(interp.cpu().regs[15]));
        let block = translator.translate_block(&*mmu, pc)?;
        log::trace!("exec {:#010x}: {} insns", pc.0, block.tb.icount);

        last = interp.run(mmu, &block.ir)?;
        total.executed_ops += last.stats.executed_ops;
        total.executed_insns += last.stats.executed_insns;
        if last.status != ExecStatus::Continue {
            break;
        }
    }
    last.stats = total;
    Ok(last)
}
