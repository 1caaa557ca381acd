//! 端到端测试用的平坦内存与机器装配

#![allow(dead_code)]

use std::sync::Arc;

use vm_arm_cpu::{ArmCpu, CpRegTable, CpuModel, ExclusiveMonitor, TranslationOptions};
use vm_core::{AccessType, AddressTranslator, ExecResult, GuestAddr, GuestPhysAddr, MemoryAccess, MemoryError, VmError};
use vm_engine_interpreter::{run_chain, Interpreter};
use vm_frontend_arm::ArmTranslator;

pub const RAM_BASE: u64 = 0x8000;
pub const RAM_SIZE: usize = 0x4000;

pub struct TestMmu {
    base: u64,
    mem: Vec<u8>,
}

impl TestMmu {
    pub fn new(base: u64, size: usize) -> Self {
        Self { base, mem: vec![0; size] }
    }

    fn offset(&self, addr: u64, size: u8) -> Result<usize, VmError> {
        if addr < self.base || addr + u64::from(size) > self.base + self.mem.len() as u64 {
            return Err(MemoryError::Unmapped(GuestAddr(addr)).into());
        }
        Ok((addr - self.base) as usize)
    }
}

impl AddressTranslator for TestMmu {
    fn translate(&mut self, va: GuestAddr, _access: AccessType) -> Result<GuestPhysAddr, VmError> {
        self.offset(va.0, 1)?;
        Ok(GuestPhysAddr(va.0))
    }

    fn flush_tlb(&mut self) {}
}

impl MemoryAccess for TestMmu {
    fn read(&self, pa: GuestAddr, size: u8) -> Result<u64, VmError> {
        let off = self.offset(pa.0, size)?;
        Ok(self.mem[off..off + size as usize].iter().rev().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn write(&mut self, pa: GuestAddr, val: u64, size: u8) -> Result<(), VmError> {
        let off = self.offset(pa.0, size)?;
        for (i, b) in self.mem[off..off + size as usize].iter_mut().enumerate() {
            *b = (val >> (8 * i)) as u8;
        }
        Ok(())
    }
}

/// 一个核、一段 RAM、一个翻译器
pub struct Machine {
    pub mmu: TestMmu,
    pub translator: ArmTranslator,
    pub interp: Interpreter,
}

impl Machine {
    pub fn new(model: CpuModel) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut cpu = ArmCpu::new(model).unwrap();
        cpu.regs[15] = RAM_BASE as u32;
        cpu.thumb = cpu.is_m_profile();
        let cpregs = CpRegTable::for_cpu(&cpu).unwrap();
        let translator = ArmTranslator::new(cpu.block_flags(), Arc::clone(&cpregs), TranslationOptions::default());
        let interp = Interpreter::new(cpu, cpregs).with_monitor(Arc::new(ExclusiveMonitor::new()));
        Self { mmu: TestMmu::new(RAM_BASE, RAM_SIZE), translator, interp }
    }

    pub fn cpu(&mut self) -> &mut ArmCpu {
        self.interp.cpu_mut()
    }

    pub fn load_arm(&mut self, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            self.mmu.write(GuestAddr(RAM_BASE + 4 * i as u64), u64::from(*w), 4).unwrap();
        }
    }

    pub fn load_thumb(&mut self, halves: &[u16]) {
        for (i, h) in halves.iter().enumerate() {
            self.mmu.write(GuestAddr(RAM_BASE + 2 * i as u64), u64::from(*h), 2).unwrap();
        }
    }

    pub fn read_u32(&self, addr: u64) -> u32 {
        self.mmu.read(GuestAddr(addr), 4).unwrap() as u32
    }

    pub fn write_u32(&mut self, addr: u64, v: u32) {
        self.mmu.write(GuestAddr(addr), u64::from(v), 4).unwrap();
    }

    /// 执行直到异常、等待或 `max_blocks` 个块
    pub fn run(&mut self, max_blocks: usize) -> ExecResult {
        run_chain(&mut self.translator, &mut self.interp, &mut self.mmu, max_blocks).unwrap()
    }
}
