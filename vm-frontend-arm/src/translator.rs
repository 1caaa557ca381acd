//! 块翻译循环
//!
//! 从给定 PC 开始逐条取指、解码并发射 IR，直到遇到块终止条件：改变控制流
//! 或处理器状态的指令、指令数上限、页边界。块的 `flags` 记录翻译时依赖的
//! CPU 状态，状态变化后调用方应以新的标志重新翻译。

use std::sync::Arc;

use vm_arm_cpu::bits::Cond;
use vm_arm_cpu::cpreg::CpRegTable;
use vm_arm_cpu::exception::{EXCP_INVSTATE, EXCP_PREFETCH_ABORT};
use vm_arm_cpu::state::{BlockFlags, slot};
use vm_arm_cpu::{ArmHelper, TranslationOptions};
use vm_core::{Decoder, GuestAddr, MMU, VmResult};
use vm_ir::{IRBlock, IROp, Terminator, TranslationBlock};

use crate::context::{BlockEnd, DisasContext};
use crate::decode::{self, DecodeEnv, DecodedInsn};
use crate::translate;

/// 翻译结果：IR 与块描述符
#[derive(Debug, Clone, PartialEq)]
pub struct ArmBlock {
    pub ir: IRBlock<ArmHelper>,
    pub tb: TranslationBlock,
}

/// 取到的原始编码
#[derive(Debug, Clone, Copy)]
enum Fetched {
    Arm(u32),
    Thumb16(u16),
    Thumb32(u16, u16),
}

impl Fetched {
    fn len(self) -> u32 {
        match self {
            Fetched::Thumb16(_) => 2,
            _ => 4,
        }
    }
}

/// 第一个半字的高 5 位为 0b11101/0b11110/0b11111 时是 32 位 Thumb 指令
fn is_thumb32(hw1: u16) -> bool {
    hw1 >> 11 >= 0b11101
}

/// ARM/Thumb 翻译器
///
/// 每个 vCPU 一个实例；系统寄存器表在核之间共享。
pub struct ArmTranslator {
    flags: BlockFlags,
    cpregs: Arc<CpRegTable>,
    options: TranslationOptions,
}

impl ArmTranslator {
    pub fn new(flags: BlockFlags, cpregs: Arc<CpRegTable>, options: TranslationOptions) -> Self {
        Self { flags, cpregs, options }
    }

    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    /// 更新块标志 (通常取自 [`vm_arm_cpu::ArmCpu::block_flags`])
    pub fn set_flags(&mut self, flags: BlockFlags) {
        self.flags = flags;
    }

    pub fn options(&self) -> &TranslationOptions {
        &self.options
    }

    fn fetch(&self, mmu: &dyn MMU, pc: u32) -> VmResult<Fetched> {
        let at = |addr: u32| GuestAddr(u64::from(addr));
        if !self.flags.thumb {
            return Ok(Fetched::Arm(mmu.fetch_insn(at(pc), 4)? as u32));
        }
        let hw1 = mmu.fetch_insn(at(pc), 2)? as u16;
        if !is_thumb32(hw1) {
            return Ok(Fetched::Thumb16(hw1));
        }
        let hw2 = mmu.fetch_insn(at(pc.wrapping_add(2)), 2)? as u16;
        Ok(Fetched::Thumb32(hw1, hw2))
    }

    fn decode_fetched(f: Fetched, pc: u32, env: &DecodeEnv, it_cond: Cond) -> VmResult<DecodedInsn> {
        match f {
            Fetched::Arm(raw) => decode::arm::decode(raw, pc, env),
            Fetched::Thumb16(hw) => decode::thumb16::decode(hw, pc, env, it_cond),
            Fetched::Thumb32(hw1, hw2) => decode::thumb32::decode(hw1, hw2, pc, env, it_cond),
        }
    }

    /// 翻译从 `pc` 开始的一个块
    ///
    /// 取指失败不会返回错误：块首指令取指失败时整个块就是一个预取中止，
    /// 否则块在该指令之前结束。只有致命错误 (配置、内部错误) 才返回 `Err`。
    pub fn translate_block(&self, mmu: &dyn MMU, pc: GuestAddr) -> VmResult<ArmBlock> {
        let start = pc.0 as u32;
        let page_size = self.options.page_size.max(4);
        let page = u64::from(start) & !(page_size - 1);
        let max_insns = self.options.max_insns.max(1);
        let mut ctx = DisasContext::new(start, self.flags, &self.cpregs);
        let mut tb = TranslationBlock::new(GuestAddr(u64::from(start)), self.flags.to_bits());
        let mut icount = 0u32;
        let mut it_seen = ctx.in_it();

        if self.flags.m_profile && !self.flags.thumb {
            // M-profile 没有 ARM 状态
            ctx.exception(EXCP_INVSTATE, 0, false);
        }

        while ctx.end.is_none() {
            let pc = ctx.pc;
            let fetched = match self.fetch(mmu, pc) {
                Ok(f) => f,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if icount == 0 => {
                    log::debug!("{pc:#010x}: prefetch abort: {e}");
                    ctx.exception(EXCP_PREFETCH_ABORT, pc, false);
                    break;
                }
                Err(_) => {
                    ctx.end_block(BlockEnd::PageBoundary);
                    break;
                }
            };
            let len = fetched.len();
            // 跨页的 32 位 Thumb 指令留给下一个块
            if icount > 0 && u64::from(pc.wrapping_add(len - 1)) & !(page_size - 1) != page {
                ctx.end_block(BlockEnd::PageBoundary);
                break;
            }

            ctx.next_pc = pc.wrapping_add(len);
            icount += 1;
            ctx.push(IROp::InsnStart { pc: GuestAddr(u64::from(pc)) });
            it_seen |= ctx.in_it();
            self.translate_insn(&mut ctx, fetched)?;
            it_seen |= ctx.in_it();

            if ctx.thumb() {
                ctx.advance_condexec();
            }
            if ctx.eci != 0 && !matches!(ctx.term, Some(Terminator::Exception { .. })) {
                // A0A1A2B0 之后只剩 A0，其余情况执行完本条即清零
                ctx.eci = if ctx.eci == 5 { 1 } else { 0 };
                let v = ctx.imm(u32::from(ctx.eci) << 4);
                ctx.set_slot(slot::CONDEXEC, v);
            }
            ctx.pc = ctx.next_pc;

            if ctx.end.is_some() {
                break;
            }
            if icount >= max_insns {
                ctx.end_block(BlockEnd::InsnLimit);
            } else if u64::from(ctx.pc) & !(page_size - 1) != page {
                ctx.end_block(BlockEnd::PageBoundary);
            }
        }

        let exception_exit = matches!(ctx.term, Some(Terminator::Exception { .. }));
        if !exception_exit && it_seen {
            // 顺序出口写回推进后的 IT 状态
            let v = if ctx.condexec_mask != 0 {
                (ctx.condexec_cond << 4) | (ctx.condexec_mask >> 1)
            } else {
                0
            };
            let t = ctx.imm(u32::from(v));
            ctx.set_slot(slot::CONDEXEC, t);
        }
        let term = ctx.term.unwrap_or(Terminator::Jmp { target: GuestAddr(u64::from(ctx.pc)) });

        tb.size = ctx.pc.wrapping_sub(start);
        tb.icount = icount;
        tb.exit = term.exit_kind();
        log::debug!(
            "translated {:#010x}..{:#010x}: {} insns, {:?}, end {:?}",
            start,
            ctx.pc,
            icount,
            tb.exit,
            ctx.end
        );

        let mut b = ctx.b;
        b.set_term(term);
        let ir = b.build();
        if cfg!(debug_assertions) {
            check_block(&ir)?;
        }
        Ok(ArmBlock { ir, tb })
    }

    fn translate_insn(&self, ctx: &mut DisasContext<'_>, fetched: Fetched) -> VmResult<()> {
        let pc = ctx.pc;
        let in_it = ctx.in_it();
        let env = DecodeEnv {
            in_it,
            last_in_it: ctx.condexec_mask == 0x10,
            ..DecodeEnv::new(self.flags.features)
        };
        let it_cond = if in_it { Cond::from_nibble(u32::from(ctx.condexec_cond)) } else { Cond::Al };
        let d = match Self::decode_fetched(fetched, pc, &env, it_cond) {
            Ok(d) => d,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::debug!("{pc:#010x}: {e}");
                ctx.undef();
                return Ok(());
            }
        };
        if ctx.eci != 0 && !d.insn.allowed_in_eci() {
            ctx.exception(EXCP_INVSTATE, 0, false);
            return Ok(());
        }

        let cond = if d.insn.is_unconditional() { Cond::Al } else { d.cond };
        ctx.skip_unless(cond);
        translate::translate(ctx, &d.insn)?;
        if let Some(label) = ctx.condlabel.take() {
            ctx.push(IROp::Label(label));
            if ctx.end.is_some() && ctx.term.is_none() {
                // 条件不成立的路径顺序执行
                ctx.term = Some(Terminator::Jmp { target: GuestAddr(u64::from(ctx.next_pc)) });
            }
        }
        Ok(())
    }

    /// 解码单条指令，不发射 IR
    pub fn decode_one(&self, mmu: &dyn MMU, pc: GuestAddr) -> VmResult<DecodedInsn> {
        let pc = pc.0 as u32;
        let fetched = self.fetch(mmu, pc)?;
        let ce = self.flags.condexec;
        let in_it = ce & 0xf != 0;
        let env = DecodeEnv { in_it, last_in_it: ce & 0xf == 0x8, ..DecodeEnv::new(self.flags.features) };
        let it_cond = if in_it { Cond::from_nibble(u32::from(ce >> 4)) } else { Cond::Al };
        Self::decode_fetched(fetched, pc, &env, it_cond)
    }
}

impl Decoder for ArmTranslator {
    type Instruction = DecodedInsn;
    type Block = ArmBlock;

    fn decode_insn(&mut self, mmu: &dyn MMU, pc: GuestAddr) -> VmResult<DecodedInsn> {
        self.decode_one(mmu, pc)
    }

    fn decode(&mut self, mmu: &dyn MMU, pc: GuestAddr) -> VmResult<ArmBlock> {
        self.translate_block(mmu, pc)
    }
}

/// 结构检查失败说明翻译器自身有缺陷
fn check_block(ir: &IRBlock<ArmHelper>) -> VmResult<()> {
    ir.validate().map_err(|e| {
        log::error!("{:#010x}: malformed IR block: {e}", ir.start_pc.0);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumb32_prefixes() {
        assert!(is_thumb32(0xf000));
        assert!(is_thumb32(0xe800));
        assert!(is_thumb32(0xf8df));
        assert!(!is_thumb32(0xe7fe));
        assert!(!is_thumb32(0x4770));
    }

    #[test]
    fn test_malformed_block_reports_reason() {
        let mut ir: IRBlock<ArmHelper> = IRBlock {
            start_pc: GuestAddr(0x8000),
            ops: vec![IROp::Br { label: 0 }],
            term: Terminator::Exit { pc: GuestAddr(0x8004) },
            num_temps: 0,
            num_labels: 1,
        };
        let err = check_block(&ir).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("unplaced label 0"), "{err}");

        ir.ops.push(IROp::Label(0));
        assert!(check_block(&ir).is_ok());
    }
}
