//! 经典架构的模式分组寄存器
//!
//! r13/r14/SPSR 每个模式组一份，FIQ 另有 r8-r12。活动模式的值总是在
//! `ArmCpu::regs` / `ArmCpu::spsr` 中，这里保存其余模式的副本。

use vm_core::{VmError, VmResult};

use crate::psr::{BankMode, CPSR_M, Mode, NUM_BANKS};
use crate::state::ArmCpu;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankedRegs {
    pub r13: [u32; NUM_BANKS],
    pub r14: [u32; NUM_BANKS],
    pub spsr: [u32; NUM_BANKS],
    /// 非 FIQ 模式的 r8-r12
    pub usr_r8_12: [u32; 5],
    pub fiq_r8_12: [u32; 5],
}

/// MRS/MSR (banked) 可访问的寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankedReg {
    R(u8),
    Spsr,
}

/// 解码 MRS/MSR (banked) 的 R:SYSm 字段
pub fn decode_banked_sysm(r: bool, sysm: u32) -> Option<(Mode, BankedReg)> {
    if r {
        return match sysm {
            0x0e => Some((Mode::Fiq, BankedReg::Spsr)),
            0x10 => Some((Mode::Irq, BankedReg::Spsr)),
            0x12 => Some((Mode::Svc, BankedReg::Spsr)),
            0x14 => Some((Mode::Abt, BankedReg::Spsr)),
            0x16 => Some((Mode::Und, BankedReg::Spsr)),
            0x1c => Some((Mode::Mon, BankedReg::Spsr)),
            _ => None,
        };
    }
    match sysm {
        0x00..=0x06 => Some((Mode::Usr, BankedReg::R(8 + sysm as u8))),
        0x08..=0x0e => Some((Mode::Fiq, BankedReg::R(sysm as u8))),
        0x10 => Some((Mode::Irq, BankedReg::R(14))),
        0x11 => Some((Mode::Irq, BankedReg::R(13))),
        0x12 => Some((Mode::Svc, BankedReg::R(14))),
        0x13 => Some((Mode::Svc, BankedReg::R(13))),
        0x14 => Some((Mode::Abt, BankedReg::R(14))),
        0x15 => Some((Mode::Abt, BankedReg::R(13))),
        0x16 => Some((Mode::Und, BankedReg::R(14))),
        0x17 => Some((Mode::Und, BankedReg::R(13))),
        0x1c => Some((Mode::Mon, BankedReg::R(14))),
        0x1d => Some((Mode::Mon, BankedReg::R(13))),
        _ => None,
    }
}

impl ArmCpu {
    /// 切换模式：活动值存入旧模式的组，再载入新模式的组
    pub fn switch_mode(&mut self, new: Mode) -> VmResult<()> {
        if new == Mode::Hyp {
            return Err(VmError::unsupported("hypervisor mode", "vm-arm-cpu"));
        }
        let old = self.mode();
        if old == new {
            return Ok(());
        }
        if old == Mode::Fiq {
            self.banked.fiq_r8_12.copy_from_slice(&self.regs[8..13]);
            self.regs[8..13].copy_from_slice(&self.banked.usr_r8_12);
        } else if new == Mode::Fiq {
            self.banked.usr_r8_12.copy_from_slice(&self.regs[8..13]);
            self.regs[8..13].copy_from_slice(&self.banked.fiq_r8_12);
        }

        let i = old.bank() as usize;
        self.banked.r13[i] = self.regs[13];
        self.banked.r14[i] = self.regs[14];
        self.banked.spsr[i] = self.spsr;

        let i = new.bank() as usize;
        self.regs[13] = self.banked.r13[i];
        self.regs[14] = self.banked.r14[i];
        self.spsr = self.banked.spsr[i];

        self.uncached_cpsr = (self.uncached_cpsr & !CPSR_M) | new.bits();
        log::trace!("mode switch {old:?} -> {new:?}");
        Ok(())
    }

    /// 读取指定模式下的 r8-r14
    pub fn read_banked(&self, mode: Mode, n: u32) -> VmResult<u32> {
        let cur = self.mode();
        match n {
            0..=7 | 15 => Ok(self.regs[n as usize]),
            8..=12 => {
                let idx = n as usize - 8;
                Ok(match (cur == Mode::Fiq, mode == Mode::Fiq) {
                    (false, true) => self.banked.fiq_r8_12[idx],
                    (true, false) => self.banked.usr_r8_12[idx],
                    _ => self.regs[n as usize],
                })
            }
            13 | 14 => {
                if mode.bank() == cur.bank() {
                    return Ok(self.regs[n as usize]);
                }
                let i = mode.bank() as usize;
                Ok(if n == 13 { self.banked.r13[i] } else { self.banked.r14[i] })
            }
            _ => Err(VmError::config("register", format!("r{n} does not exist"))),
        }
    }

    pub fn write_banked(&mut self, mode: Mode, n: u32, value: u32) -> VmResult<()> {
        let cur = self.mode();
        match n {
            0..=7 | 15 => self.regs[n as usize] = value,
            8..=12 => {
                let idx = n as usize - 8;
                match (cur == Mode::Fiq, mode == Mode::Fiq) {
                    (false, true) => self.banked.fiq_r8_12[idx] = value,
                    (true, false) => self.banked.usr_r8_12[idx] = value,
                    _ => self.regs[n as usize] = value,
                }
            }
            13 | 14 => {
                if mode.bank() == cur.bank() {
                    self.regs[n as usize] = value;
                } else {
                    let i = mode.bank() as usize;
                    if n == 13 {
                        self.banked.r13[i] = value;
                    } else {
                        self.banked.r14[i] = value;
                    }
                }
            }
            _ => return Err(VmError::config("register", format!("r{n} does not exist"))),
        }
        Ok(())
    }

    pub fn read_spsr_banked(&self, mode: Mode) -> u32 {
        if mode.bank() == self.mode().bank() { self.spsr } else { self.banked.spsr[mode.bank() as usize] }
    }

    pub fn write_spsr_banked(&mut self, mode: Mode, value: u32) {
        if mode.bank() == self.mode().bank() {
            self.spsr = value;
        } else {
            self.banked.spsr[mode.bank() as usize] = value;
        }
    }

    /// LDM/STM `^` 形式使用的用户模式寄存器
    pub fn user_reg(&self, n: u32) -> VmResult<u32> {
        self.read_banked(Mode::Usr, n)
    }

    pub fn set_user_reg(&mut self, n: u32, value: u32) -> VmResult<()> {
        self.write_banked(Mode::Usr, n, value)
    }

    /// MRS (banked)
    pub fn mrs_banked(&self, mode: Mode, reg: BankedReg) -> VmResult<u32> {
        match reg {
            BankedReg::Spsr => Ok(self.read_spsr_banked(mode)),
            BankedReg::R(n) => self.read_banked(mode, u32::from(n)),
        }
    }

    /// MSR (banked)
    pub fn msr_banked(&mut self, mode: Mode, reg: BankedReg, value: u32) -> VmResult<()> {
        match reg {
            BankedReg::Spsr => {
                self.write_spsr_banked(mode, value);
                Ok(())
            }
            BankedReg::R(n) => self.write_banked(mode, u32::from(n), value),
        }
    }

    /// 当前模式组
    pub fn bank(&self) -> BankMode {
        self.mode().bank()
    }
}
