//! # vm-engine-interpreter - IR 参考解释器
//!
//! 直接执行 `vm-frontend-arm` 产生的 [`IRBlock`]，状态读写落到
//! [`ArmCpu`]，辅助函数调用经 [`call_helper`] 分发。用于在没有代码生成器
//! 的情况下验证翻译结果。
//!
//! 临时值按 64 位保存；移位量取模 64，除数为 0 时商为 0。

use std::sync::Arc;

use vm_arm_cpu::cpreg::CpRegTable;
use vm_arm_cpu::exception::EXCP_EXCEPTION_EXIT;
use vm_arm_cpu::memory::{self, MemFault};
use vm_arm_cpu::{
    call_helper, ArmCpu, ArmFeatures, ArmHelper, ExclusiveMonitor, HelperEnv, HelperResult, InterruptController,
    NoInterrupts,
};
use vm_core::{CoreError, ExecResult, ExecStats, ExecStatus, ExecutionEngine, GuestAddr, MMU, VmError, VmResult};
use vm_ir::{IRBlock, IROp, LabelId, MemFlags, RegId, Terminator};

mod driver;

pub use driver::run_chain;

/// 解释器：持有一个核的架构状态及其外部协作者
pub struct Interpreter {
    cpu: ArmCpu,
    cpregs: Arc<CpRegTable>,
    monitor: Arc<ExclusiveMonitor>,
    intc: Box<dyn InterruptController>,
    temps: Vec<u64>,
}

fn internal(message: String) -> VmError {
    CoreError::Internal { message, module: "vm-engine-interpreter".to_string() }.into()
}

fn sign_extend(val: u64, bits: u8) -> u64 {
    if bits == 0 || bits >= 64 {
        return val;
    }
    let shift = 64 - u32::from(bits);
    (((val << shift) as i64) >> shift) as u64
}

fn zero_extend(val: u64, bits: u8) -> u64 {
    if bits >= 64 { val } else { val & ((1u64 << bits) - 1) }
}

impl Interpreter {
    pub fn new(cpu: ArmCpu, cpregs: Arc<CpRegTable>) -> Self {
        Self {
            cpu,
            cpregs,
            monitor: ExclusiveMonitor::global(),
            intc: Box::new(NoInterrupts),
            temps: Vec::new(),
        }
    }

    /// 使用独立的独占监视器 (多核测试时共享同一个)
    pub fn with_monitor(mut self, monitor: Arc<ExclusiveMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_interrupts(mut self, intc: Box<dyn InterruptController>) -> Self {
        self.intc = intc;
        self
    }

    pub fn cpu(&self) -> &ArmCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut ArmCpu {
        &mut self.cpu
    }

    pub fn cpregs(&self) -> &Arc<CpRegTable> {
        &self.cpregs
    }

    fn temp(&self, r: RegId) -> VmResult<u64> {
        self.temps.get(r as usize).copied().ok_or_else(|| internal(format!("temp t{r} out of range")))
    }

    fn set_temp(&mut self, r: RegId, v: u64) -> VmResult<()> {
        let slot = self.temps.get_mut(r as usize).ok_or_else(|| internal(format!("temp t{r} out of range")))?;
        *slot = v;
        Ok(())
    }

    fn load(&mut self, mmu: &mut dyn MMU, va: u32, size: u8, flags: &MemFlags) -> Result<u64, MemFault> {
        memory::read(&mut self.cpu, mmu, va, size, flags)
    }

    fn store(&mut self, mmu: &mut dyn MMU, va: u32, size: u8, value: u64, flags: &MemFlags) -> Result<(), MemFault> {
        memory::write(&mut self.cpu, mmu, &self.monitor, va, size, value, flags)
    }

    /// M-profile 分支到 EXC_RETURN / FNC_RETURN 魔数时进入异常返回
    fn is_magic_return(&self, pc: u32) -> bool {
        if !self.cpu.is_m_profile() {
            return false;
        }
        let exc_return = pc >= 0xff00_0000 && self.cpu.handler_mode();
        let fnc_return = pc & !1 == 0xfeff_fffe && self.cpu.has_feature(ArmFeatures::M_SECURITY);
        exc_return || fnc_return
    }

    fn exit(&mut self, term: &Terminator, stats: ExecStats) -> VmResult<ExecResult> {
        let (status, next) = match *term {
            Terminator::Jmp { target } => (ExecStatus::Continue, target.0 as u32),
            Terminator::Exit { pc } => (ExecStatus::Continue, pc.0 as u32),
            Terminator::JmpReg { target } => {
                let pc = self.temp(target)? as u32;
                if self.is_magic_return(pc) {
                    log::debug!("exception return via {pc:#010x}");
                    (ExecStatus::Exception { excp: EXCP_EXCEPTION_EXIT, syndrome: pc }, pc)
                } else {
                    (ExecStatus::Continue, pc)
                }
            }
            Terminator::Exception { excp, syndrome, pc } => {
                (ExecStatus::Exception { excp, syndrome }, pc.0 as u32)
            }
        };
        self.cpu.regs[15] = next;
        Ok(ExecResult { status, next_pc: GuestAddr(u64::from(next)), stats })
    }

    fn guest_fault(&mut self, excp: u32, addr: u32, insn_pc: u32, stats: ExecStats) -> ExecResult {
        log::debug!("{insn_pc:#010x}: memory fault {excp} at {addr:#010x}");
        self.cpu.regs[15] = insn_pc;
        ExecResult {
            status: ExecStatus::Exception { excp, syndrome: addr },
            next_pc: GuestAddr(u64::from(insn_pc)),
            stats,
        }
    }

    fn call(&mut self, mmu: &mut dyn MMU, helper: &ArmHelper, args: &[u64]) -> VmResult<HelperResult> {
        let mut env = HelperEnv {
            cpu: &mut self.cpu,
            mmu: &mut *mmu,
            cpregs: &self.cpregs,
            monitor: &self.monitor,
            intc: self.intc.as_mut(),
        };
        let result = call_helper(&mut env, helper, args);
        // TLBIALL 等协处理器写入只留下标记
        if self.cpu.take_tlb_flush() {
            log::trace!("tlb flush after {helper:?}");
            mmu.flush_tlb();
        }
        result
    }
}

/// 标签到指令下标的映射
fn resolve_labels(block: &IRBlock<ArmHelper>) -> VmResult<Vec<usize>> {
    let mut labels = vec![usize::MAX; block.num_labels as usize];
    for (i, op) in block.ops.iter().enumerate() {
        if let IROp::Label(l) = op {
            let slot = labels.get_mut(*l as usize).ok_or_else(|| internal(format!("label L{l} out of range")))?;
            *slot = i;
        }
    }
    Ok(labels)
}

fn target(labels: &[usize], l: LabelId) -> VmResult<usize> {
    match labels.get(l as usize) {
        Some(&i) if i != usize::MAX => Ok(i),
        _ => Err(internal(format!("branch to unplaced label L{l}"))),
    }
}

impl ExecutionEngine<IRBlock<ArmHelper>> for Interpreter {
    fn run(&mut self, mmu: &mut dyn MMU, block: &IRBlock<ArmHelper>) -> VmResult<ExecResult> {
        let labels = resolve_labels(block)?;
        self.temps.clear();
        self.temps.resize(block.num_temps as usize, 0);
        let mut stats = ExecStats::default();
        let mut insn_pc = block.start_pc.0 as u32;
        let mut ip = 0;

        while let Some(op) = block.ops.get(ip) {
            ip += 1;
            stats.executed_ops += 1;
            match op {
                IROp::Nop | IROp::Label(_) => {}
                IROp::InsnStart { pc } => {
                    insn_pc = pc.0 as u32;
                    stats.executed_insns += 1;
                }
                IROp::MovImm { dst, imm } => self.set_temp(*dst, *imm)?,
                IROp::Mov { dst, src } => {
                    let v = self.temp(*src)?;
                    self.set_temp(*dst, v)?;
                }
                IROp::Add { dst, src1, src2 } => {
                    let v = self.temp(*src1)?.wrapping_add(self.temp(*src2)?);
                    self.set_temp(*dst, v)?;
                }
                IROp::Sub { dst, src1, src2 } => {
                    let v = self.temp(*src1)?.wrapping_sub(self.temp(*src2)?);
                    self.set_temp(*dst, v)?;
                }
                IROp::Mul { dst, src1, src2 } => {
                    let v = self.temp(*src1)?.wrapping_mul(self.temp(*src2)?);
                    self.set_temp(*dst, v)?;
                }
                IROp::Div { dst, src1, src2, signed } => {
                    let (a, b) = (self.temp(*src1)?, self.temp(*src2)?);
                    let v = if b == 0 {
                        0
                    } else if *signed {
                        (a as i64).wrapping_div(b as i64) as u64
                    } else {
                        a / b
                    };
                    self.set_temp(*dst, v)?;
                }
                IROp::And { dst, src1, src2 } => {
                    let v = self.temp(*src1)? & self.temp(*src2)?;
                    self.set_temp(*dst, v)?;
                }
                IROp::Or { dst, src1, src2 } => {
                    let v = self.temp(*src1)? | self.temp(*src2)?;
                    self.set_temp(*dst, v)?;
                }
                IROp::Xor { dst, src1, src2 } => {
                    let v = self.temp(*src1)? ^ self.temp(*src2)?;
                    self.set_temp(*dst, v)?;
                }
                IROp::Not { dst, src } => {
                    let v = !self.temp(*src)?;
                    self.set_temp(*dst, v)?;
                }
                IROp::AddImm { dst, src, imm } => {
                    let v = self.temp(*src)?.wrapping_add(*imm as u64);
                    self.set_temp(*dst, v)?;
                }
                IROp::AndImm { dst, src, imm } => {
                    let v = self.temp(*src)? & *imm;
                    self.set_temp(*dst, v)?;
                }
                IROp::Sll { dst, src, shreg } => {
                    let v = self.temp(*src)? << (self.temp(*shreg)? & 63);
                    self.set_temp(*dst, v)?;
                }
                IROp::Srl { dst, src, shreg } => {
                    let v = self.temp(*src)? >> (self.temp(*shreg)? & 63);
                    self.set_temp(*dst, v)?;
                }
                IROp::Sra { dst, src, shreg } => {
                    let v = (self.temp(*src)? as i64) >> (self.temp(*shreg)? & 63);
                    self.set_temp(*dst, v as u64)?;
                }
                IROp::SllImm { dst, src, sh } => {
                    let v = self.temp(*src)? << (sh & 63);
                    self.set_temp(*dst, v)?;
                }
                IROp::SrlImm { dst, src, sh } => {
                    let v = self.temp(*src)? >> (sh & 63);
                    self.set_temp(*dst, v)?;
                }
                IROp::SraImm { dst, src, sh } => {
                    let v = (self.temp(*src)? as i64) >> (sh & 63);
                    self.set_temp(*dst, v as u64)?;
                }
                IROp::Ror32 { dst, src, shreg } => {
                    let v = (self.temp(*src)? as u32).rotate_right((self.temp(*shreg)? & 31) as u32);
                    self.set_temp(*dst, u64::from(v))?;
                }
                IROp::Sext { dst, src, bits } => {
                    let v = sign_extend(self.temp(*src)?, *bits);
                    self.set_temp(*dst, v)?;
                }
                IROp::Zext { dst, src, bits } => {
                    let v = zero_extend(self.temp(*src)?, *bits);
                    self.set_temp(*dst, v)?;
                }
                IROp::CmpEq { dst, lhs, rhs } => {
                    let v = self.temp(*lhs)? == self.temp(*rhs)?;
                    self.set_temp(*dst, u64::from(v))?;
                }
                IROp::CmpNe { dst, lhs, rhs } => {
                    let v = self.temp(*lhs)? != self.temp(*rhs)?;
                    self.set_temp(*dst, u64::from(v))?;
                }
                IROp::CmpLt { dst, lhs, rhs } => {
                    let v = (self.temp(*lhs)? as i64) < (self.temp(*rhs)? as i64);
                    self.set_temp(*dst, u64::from(v))?;
                }
                IROp::CmpLtU { dst, lhs, rhs } => {
                    let v = self.temp(*lhs)? < self.temp(*rhs)?;
                    self.set_temp(*dst, u64::from(v))?;
                }
                IROp::CmpGe { dst, lhs, rhs } => {
                    let v = (self.temp(*lhs)? as i64) >= (self.temp(*rhs)? as i64);
                    self.set_temp(*dst, u64::from(v))?;
                }
                IROp::CmpGeU { dst, lhs, rhs } => {
                    let v = self.temp(*lhs)? >= self.temp(*rhs)?;
                    self.set_temp(*dst, u64::from(v))?;
                }
                IROp::Select { dst, cond, true_val, false_val } => {
                    let v = if self.temp(*cond)? != 0 { self.temp(*true_val)? } else { self.temp(*false_val)? };
                    self.set_temp(*dst, v)?;
                }
                IROp::Load { dst, addr, size, signed, flags } => {
                    let va = self.temp(*addr)? as u32;
                    match self.load(mmu, va, *size, flags) {
                        Ok(v) => {
                            let v = if *signed { sign_extend(v, size * 8) } else { v };
                            self.set_temp(*dst, v)?;
                        }
                        Err(MemFault::Host(e)) => return Err(e),
                        Err(MemFault::Guest { excp, addr }) => return Ok(self.guest_fault(excp, addr, insn_pc, stats)),
                    }
                }
                IROp::Store { src, addr, size, flags } => {
                    let va = self.temp(*addr)? as u32;
                    let v = self.temp(*src)?;
                    match self.store(mmu, va, *size, v, flags) {
                        Ok(()) => {}
                        Err(MemFault::Host(e)) => return Err(e),
                        Err(MemFault::Guest { excp, addr }) => return Ok(self.guest_fault(excp, addr, insn_pc, stats)),
                    }
                }
                // 单线程解释执行，屏障没有可观察的效果
                IROp::Fence { .. } => {}
                IROp::GetReg { dst, reg } => {
                    let v = self.cpu.get_slot(*reg)?;
                    self.set_temp(*dst, v)?;
                }
                IROp::SetReg { reg, src } => {
                    let v = self.temp(*src)?;
                    self.cpu.set_slot(*reg, v)?;
                }
                IROp::GetVec { dst, idx } => {
                    let v = self.cpu.vfp.d[usize::from(*idx) & 31];
                    self.set_temp(*dst, v)?;
                }
                IROp::SetVec { idx, src } => {
                    let v = self.temp(*src)?;
                    self.cpu.vfp.d[usize::from(*idx) & 31] = v;
                }
                IROp::Call { helper, args, dst } => {
                    let values = args.iter().map(|a| self.temp(*a)).collect::<VmResult<Vec<u64>>>()?;
                    match self.call(mmu, helper, &values)? {
                        HelperResult::Value(v) => {
                            if let Some(d) = dst {
                                self.set_temp(*d, v)?;
                            }
                        }
                        HelperResult::Raise { excp, syndrome } => {
                            // PC 已由翻译代码写回
                            let pc = self.cpu.regs[15];
                            log::debug!("{insn_pc:#010x}: {helper:?} raised {excp}");
                            return Ok(ExecResult {
                                status: ExecStatus::Exception { excp, syndrome },
                                next_pc: GuestAddr(u64::from(pc)),
                                stats,
                            });
                        }
                        HelperResult::Halt => {
                            let pc = self.cpu.regs[15];
                            return Ok(ExecResult { status: ExecStatus::Halted, next_pc: GuestAddr(u64::from(pc)), stats });
                        }
                    }
                }
                IROp::Br { label } => ip = target(&labels, *label)?,
                IROp::BrCond { cond, label } => {
                    if self.temp(*cond)? != 0 {
                        ip = target(&labels, *label)?;
                    }
                }
                IROp::Exit(term) => return self.exit(term, stats),
            }
        }
        self.exit(&block.term, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::exception::EXCP_DATA_ABORT;
    use vm_arm_cpu::state::slot;
    use vm_arm_cpu::CpuModel;
    use vm_core::AccessType;
    use vm_ir::IRBuilder;

    struct NoMemory;

    impl vm_core::AddressTranslator for NoMemory {
        fn translate(&mut self, va: GuestAddr, _access: AccessType) -> Result<vm_core::GuestPhysAddr, VmError> {
            Err(vm_core::MemoryError::Unmapped(va).into())
        }

        fn flush_tlb(&mut self) {}
    }

    impl vm_core::MemoryAccess for NoMemory {
        fn read(&self, pa: GuestAddr, _size: u8) -> Result<u64, VmError> {
            Err(vm_core::MemoryError::Unmapped(pa).into())
        }

        fn write(&mut self, pa: GuestAddr, _val: u64, _size: u8) -> Result<(), VmError> {
            Err(vm_core::MemoryError::Unmapped(pa).into())
        }
    }

    #[derive(Default)]
    struct FlushCounter(u32);

    impl vm_core::AddressTranslator for FlushCounter {
        fn translate(&mut self, va: GuestAddr, _access: AccessType) -> Result<vm_core::GuestPhysAddr, VmError> {
            Ok(vm_core::GuestPhysAddr(va.0))
        }

        fn flush_tlb(&mut self) {
            self.0 += 1;
        }
    }

    impl vm_core::MemoryAccess for FlushCounter {
        fn read(&self, _pa: GuestAddr, _size: u8) -> Result<u64, VmError> {
            Ok(0)
        }

        fn write(&mut self, _pa: GuestAddr, _val: u64, _size: u8) -> Result<(), VmError> {
            Ok(())
        }
    }

    fn interp() -> Interpreter {
        let cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        Interpreter::new(cpu, CpRegTable::builder().freeze())
    }

    #[test]
    fn test_sign_and_zero_extend() {
        assert_eq!(sign_extend(0x80, 8), u64::MAX - 0x7f);
        assert_eq!(sign_extend(0x7f, 8), 0x7f);
        assert_eq!(zero_extend(0x1_2345_6789, 32), 0x2345_6789);
    }

    #[test]
    fn test_divide_by_zero_is_zero() {
        let mut b: IRBuilder<ArmHelper> = IRBuilder::new(GuestAddr(0x100));
        let (a, z, q) = (b.alloc_temp(), b.alloc_temp(), b.alloc_temp());
        b.push(IROp::MovImm { dst: a, imm: 7 });
        b.push(IROp::MovImm { dst: z, imm: 0 });
        b.push(IROp::Div { dst: q, src1: a, src2: z, signed: true });
        b.push(IROp::SetReg { reg: slot::reg(0), src: q });
        b.set_term(Terminator::Jmp { target: GuestAddr(0x104) });
        let block = b.build();

        let mut it = interp();
        it.cpu_mut().regs[0] = 99;
        let res = it.run(&mut NoMemory, &block).unwrap();
        assert_eq!(res.status, ExecStatus::Continue);
        assert_eq!(res.next_pc, GuestAddr(0x104));
        assert_eq!(it.cpu().regs[0], 0);
        assert_eq!(it.cpu().regs[15], 0x104);
    }

    #[test]
    fn test_branch_to_label() {
        let mut b: IRBuilder<ArmHelper> = IRBuilder::new(GuestAddr(0));
        let (one, v) = (b.alloc_temp(), b.alloc_temp());
        let skip = b.new_label();
        b.push(IROp::MovImm { dst: one, imm: 1 });
        b.push(IROp::MovImm { dst: v, imm: 5 });
        b.push(IROp::BrCond { cond: one, label: skip });
        b.push(IROp::MovImm { dst: v, imm: 6 });
        b.push(IROp::Label(skip));
        b.push(IROp::SetReg { reg: slot::reg(1), src: v });
        b.set_term(Terminator::Exit { pc: GuestAddr(8) });
        let block = b.build();

        let mut it = interp();
        it.run(&mut NoMemory, &block).unwrap();
        assert_eq!(it.cpu().regs[1], 5);
    }

    #[test]
    fn test_unmapped_load_is_data_abort_at_insn() {
        let mut b: IRBuilder<ArmHelper> = IRBuilder::new(GuestAddr(0x200));
        let (a, v) = (b.alloc_temp(), b.alloc_temp());
        b.push(IROp::InsnStart { pc: GuestAddr(0x200) });
        b.push(IROp::MovImm { dst: a, imm: 0x4000 });
        b.push(IROp::Load { dst: v, addr: a, size: 4, signed: false, flags: MemFlags::default() });
        b.set_term(Terminator::Jmp { target: GuestAddr(0x204) });
        let block = b.build();

        let mut it = interp();
        let res = it.run(&mut NoMemory, &block).unwrap();
        assert_eq!(res.status, ExecStatus::Exception { excp: EXCP_DATA_ABORT, syndrome: 0x4000 });
        assert_eq!(res.next_pc, GuestAddr(0x200));
        assert_eq!(res.stats.executed_insns, 1);
    }

    #[test]
    fn test_tlb_invalidate_flushes_mmu() {
        let mut b: IRBuilder<ArmHelper> = IRBuilder::new(GuestAddr(0x300));
        let v = b.alloc_temp();
        b.push(IROp::MovImm { dst: v, imm: 0 });
        let key = vm_arm_cpu::CpRegKey::new(15, false, false, 8, 7, 0, 0);
        b.push(IROp::Call { helper: ArmHelper::CpWrite(key), args: vm_ir::HelperArgs::from_slice(&[v]), dst: None });
        b.set_term(Terminator::Jmp { target: GuestAddr(0x304) });
        let block = b.build();

        let mut it = interp();
        let mut mmu = FlushCounter::default();
        it.run(&mut mmu, &block).unwrap();
        assert_eq!(mmu.0, 1);
        assert!(!it.cpu_mut().take_tlb_flush());
        // 普通块不触发刷新
        it.run(&mut mmu, &block_without_helpers()).unwrap();
        assert_eq!(mmu.0, 1);
    }

    fn block_without_helpers() -> IRBlock<ArmHelper> {
        let mut b: IRBuilder<ArmHelper> = IRBuilder::new(GuestAddr(0x400));
        b.set_term(Terminator::Jmp { target: GuestAddr(0x404) });
        b.build()
    }
}
