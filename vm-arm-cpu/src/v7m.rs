//! M-profile 特殊寄存器 (MRS/MSR)
//!
//! SP、PRIMASK、BASEPRI、FAULTMASK、CONTROL 按安全状态分组。
//! CONTROL.FPCA 与 CONTROL.SFPA 只保存在 Non-secure 组中，Secure 视图
//! 读取时合并进来，Non-secure 视图中 SFPA 读为 0。

use crate::features::ArmFeatures;
use crate::psr::*;
use crate::state::ArmCpu;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct V7mState {
    /// 非活动栈指针 `[安全状态][0 = MSP, 1 = PSP]`
    pub other_sp: [[u32; 2]; 2],
    pub primask: [u32; 2],
    pub basepri: [u32; 2],
    pub faultmask: [u32; 2],
    pub control: [u32; 2],
    pub vtor: [u32; 2],
    pub msplim: [u32; 2],
    pub psplim: [u32; 2],
    pub cfsr: [u32; 2],
    pub mmfar: [u32; 2],
    pub bfar: u32,
    /// IPSR
    pub exception: u32,
}

/// MRS/MSR 的 SYSm 编码
pub mod sysm {
    pub const APSR: u32 = 0;
    pub const IAPSR: u32 = 1;
    pub const EAPSR: u32 = 2;
    pub const XPSR: u32 = 3;
    pub const IPSR: u32 = 5;
    pub const EPSR: u32 = 6;
    pub const IEPSR: u32 = 7;
    pub const MSP: u32 = 8;
    pub const PSP: u32 = 9;
    pub const MSPLIM: u32 = 10;
    pub const PSPLIM: u32 = 11;
    pub const PRIMASK: u32 = 16;
    pub const BASEPRI: u32 = 17;
    pub const BASEPRI_MAX: u32 = 18;
    pub const FAULTMASK: u32 = 19;
    pub const CONTROL: u32 = 20;
    pub const MSP_NS: u32 = 0x88;
    pub const PSP_NS: u32 = 0x89;
    pub const MSPLIM_NS: u32 = 0x8a;
    pub const PSPLIM_NS: u32 = 0x8b;
    pub const PRIMASK_NS: u32 = 0x90;
    pub const BASEPRI_NS: u32 = 0x91;
    pub const FAULTMASK_NS: u32 = 0x93;
    pub const CONTROL_NS: u32 = 0x94;
    pub const SP_NS: u32 = 0x98;
}

/// 不能设置 FAULTMASK 的 NMI 异常号
const NMI_EXCEPTION: u32 = 2;

impl ArmCpu {
    /// 指定安全状态在线程模式下是否使用 PSP
    pub(crate) fn v7m_thread_uses_psp(&self, sec: SecurityState) -> bool {
        !self.handler_mode() && self.v7m.control[sec.index()] & CONTROL_SPSEL != 0
    }

    pub fn v7m_using_psp(&self) -> bool {
        self.v7m_thread_uses_psp(self.security())
    }

    /// 指定分组的栈指针；活动的那个在 `regs[13]` 中
    fn v7m_sp(&mut self, sec: SecurityState, process: bool) -> &mut u32 {
        if sec == self.security() && process == self.v7m_using_psp() {
            &mut self.regs[13]
        } else {
            &mut self.v7m.other_sp[sec.index()][usize::from(process)]
        }
    }

    fn v7m_sp_value(&self, sec: SecurityState, process: bool) -> u32 {
        if sec == self.security() && process == self.v7m_using_psp() {
            self.regs[13]
        } else {
            self.v7m.other_sp[sec.index()][usize::from(process)]
        }
    }

    /// 写 CONTROL.SPSEL 并在线程模式下切换活动栈
    fn v7m_write_spsel(&mut self, sec: SecurityState, spsel: bool) {
        let was_psp = self.v7m_thread_uses_psp(sec);
        let bit = &mut self.v7m.control[sec.index()];
        if spsel {
            *bit |= CONTROL_SPSEL;
        } else {
            *bit &= !CONTROL_SPSEL;
        }
        let now_psp = self.v7m_thread_uses_psp(sec);
        if sec == self.security() && was_psp != now_psp {
            let slot = &mut self.v7m.other_sp[sec.index()];
            slot[usize::from(was_psp)] = self.regs[13];
            self.regs[13] = slot[usize::from(now_psp)];
        }
    }

    /// 切换当前安全状态，同时换入对应的栈指针
    pub fn v7m_set_security(&mut self, new: SecurityState) {
        if new == self.security() {
            return;
        }
        let old = self.security();
        let old_psp = self.v7m_using_psp();
        self.v7m.other_sp[old.index()][usize::from(old_psp)] = self.regs[13];
        self.secure = new.is_secure();
        let new_psp = self.v7m_using_psp();
        self.regs[13] = self.v7m.other_sp[new.index()][usize::from(new_psp)];
    }

    /// CONTROL 的合成视图
    pub fn v7m_control(&self, sec: SecurityState) -> u32 {
        let ns = self.v7m.control[SecurityState::NonSecure.index()];
        match sec {
            SecurityState::Secure => {
                self.v7m.control[SecurityState::Secure.index()] & !(CONTROL_FPCA | CONTROL_SFPA)
                    | (ns & (CONTROL_FPCA | CONTROL_SFPA))
            }
            SecurityState::NonSecure => ns & !CONTROL_SFPA,
        }
    }

    fn v7m_write_control(&mut self, sec: SecurityState, val: u32) {
        let main = self.has_feature(ArmFeatures::M_MAIN);
        if main && !self.handler_mode() {
            self.v7m_write_spsel(sec, val & CONTROL_SPSEL != 0);
        }
        if main {
            let c = &mut self.v7m.control[sec.index()];
            *c = (*c & !CONTROL_NPRIV) | (val & CONTROL_NPRIV);
        }
        if self.features().has_fpu() {
            let ns = &mut self.v7m.control[SecurityState::NonSecure.index()];
            *ns = (*ns & !CONTROL_FPCA) | (val & CONTROL_FPCA);
            if sec.is_secure() {
                *ns = (*ns & !CONTROL_SFPA) | (val & CONTROL_SFPA);
            }
        }
    }

    /// MRS：非特权读取除 xPSR 与 CONTROL 外的寄存器得到 0
    pub fn v7m_mrs(&self, reg: u32) -> u32 {
        let sec = self.security();
        match reg {
            0..=7 => {
                let mut mask = 0;
                if reg & 1 != 0 {
                    mask |= XPSR_EXCP;
                }
                if reg & 4 == 0 {
                    mask |= XPSR_NZCV | XPSR_Q;
                    if self.has_feature(ArmFeatures::THUMB_DSP) {
                        mask |= XPSR_GE;
                    }
                }
                // EPSR 读为 0
                return self.xpsr() & mask;
            }
            sysm::CONTROL => return self.v7m_control(sec),
            sysm::CONTROL_NS => {
                return if sec.is_secure() { self.v7m_control(SecurityState::NonSecure) } else { 0 };
            }
            _ => {}
        }

        if !self.is_privileged() {
            return 0;
        }

        if reg & 0x80 != 0 {
            if !sec.is_secure() || !self.has_feature(ArmFeatures::M_SECURITY) {
                return 0;
            }
            let ns = SecurityState::NonSecure;
            return match reg {
                sysm::MSP_NS => self.v7m_sp_value(ns, false),
                sysm::PSP_NS => self.v7m_sp_value(ns, true),
                sysm::MSPLIM_NS => self.v7m.msplim[ns.index()],
                sysm::PSPLIM_NS => self.v7m.psplim[ns.index()],
                sysm::PRIMASK_NS => self.v7m.primask[ns.index()],
                sysm::BASEPRI_NS => self.v7m.basepri[ns.index()],
                sysm::FAULTMASK_NS => self.v7m.faultmask[ns.index()],
                sysm::SP_NS => self.v7m_sp_value(ns, self.v7m_thread_uses_psp(ns)),
                _ => {
                    log::warn!("MRS of unknown special register {reg:#x}");
                    0
                }
            };
        }

        let i = sec.index();
        match reg {
            sysm::MSP => self.v7m_sp_value(sec, false),
            sysm::PSP => self.v7m_sp_value(sec, true),
            sysm::MSPLIM if self.has_feature(ArmFeatures::V8) => self.v7m.msplim[i],
            sysm::PSPLIM if self.has_feature(ArmFeatures::V8) => self.v7m.psplim[i],
            sysm::PRIMASK => self.v7m.primask[i],
            sysm::BASEPRI | sysm::BASEPRI_MAX if self.has_feature(ArmFeatures::M_MAIN) => self.v7m.basepri[i],
            sysm::FAULTMASK if self.has_feature(ArmFeatures::M_MAIN) => self.v7m.faultmask[i],
            _ => {
                log::warn!("MRS of unknown special register {reg:#x}");
                0
            }
        }
    }

    /// MSR；`mask` 为指令中的 APSR 写掩码 (bit 3 = nzcvq, bit 2 = g)
    pub fn v7m_msr(&mut self, reg: u32, mask: u32, val: u32) {
        let sec = self.security();
        if reg <= 7 {
            if reg & 4 == 0 {
                let mut apsr = 0;
                if mask & 8 != 0 {
                    apsr |= XPSR_NZCV | XPSR_Q;
                }
                if mask & 4 != 0 && self.has_feature(ArmFeatures::THUMB_DSP) {
                    apsr |= XPSR_GE;
                }
                self.xpsr_write(val, apsr);
            }
            return;
        }

        if !self.is_privileged() {
            return;
        }

        if reg & 0x80 != 0 {
            if !sec.is_secure() || !self.has_feature(ArmFeatures::M_SECURITY) {
                return;
            }
            let ns = SecurityState::NonSecure;
            match reg {
                sysm::MSP_NS => *self.v7m_sp(ns, false) = val & !3,
                sysm::PSP_NS => *self.v7m_sp(ns, true) = val & !3,
                sysm::MSPLIM_NS => self.v7m.msplim[ns.index()] = val & !7,
                sysm::PSPLIM_NS => self.v7m.psplim[ns.index()] = val & !7,
                sysm::PRIMASK_NS => {
                    self.v7m.primask[ns.index()] = val & 1;
                    self.irq_recheck = true;
                }
                sysm::BASEPRI_NS => {
                    self.v7m.basepri[ns.index()] = val & 0xff;
                    self.irq_recheck = true;
                }
                sysm::FAULTMASK_NS => {
                    self.v7m.faultmask[ns.index()] = val & 1;
                    self.irq_recheck = true;
                }
                sysm::CONTROL_NS => self.v7m_write_control(ns, val),
                sysm::SP_NS => {
                    let process = self.v7m_thread_uses_psp(ns);
                    *self.v7m_sp(ns, process) = val & !3;
                }
                _ => log::warn!("MSR to unknown special register {reg:#x}"),
            }
            return;
        }

        let i = sec.index();
        let main = self.has_feature(ArmFeatures::M_MAIN);
        match reg {
            sysm::MSP => *self.v7m_sp(sec, false) = val & !3,
            sysm::PSP => *self.v7m_sp(sec, true) = val & !3,
            sysm::MSPLIM if self.has_feature(ArmFeatures::V8) => self.v7m.msplim[i] = val & !7,
            sysm::PSPLIM if self.has_feature(ArmFeatures::V8) => self.v7m.psplim[i] = val & !7,
            sysm::PRIMASK => {
                self.v7m.primask[i] = val & 1;
                self.irq_recheck = true;
            }
            sysm::BASEPRI if main => {
                self.v7m.basepri[i] = val & 0xff;
                self.irq_recheck = true;
            }
            sysm::BASEPRI_MAX if main => {
                let v = val & 0xff;
                let cur = self.v7m.basepri[i];
                if v != 0 && (v < cur || cur == 0) {
                    self.v7m.basepri[i] = v;
                    self.irq_recheck = true;
                }
            }
            sysm::FAULTMASK if main => {
                if val & 1 != 0 && self.v7m.exception == NMI_EXCEPTION {
                    return;
                }
                self.v7m.faultmask[i] = val & 1;
                self.irq_recheck = true;
            }
            sysm::CONTROL => self.v7m_write_control(sec, val),
            _ => log::warn!("MSR to unknown special register {reg:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CpuModel;

    fn m33() -> ArmCpu {
        let mut cpu = ArmCpu::new(CpuModel::CortexM33).unwrap();
        cpu.set_fpu_enabled(true).unwrap();
        cpu
    }

    #[test]
    fn test_spsel_switches_stack() {
        let mut cpu = m33();
        cpu.regs[13] = 0x2000_1000;
        cpu.v7m_msr(sysm::PSP, 0, 0x2000_0800);
        assert_eq!(cpu.regs[13], 0x2000_1000);
        cpu.v7m_msr(sysm::CONTROL, 0, CONTROL_SPSEL);
        assert_eq!(cpu.regs[13], 0x2000_0800);
        assert_eq!(cpu.v7m_mrs(sysm::MSP), 0x2000_1000);
        assert!(cpu.v7m_using_psp());
    }

    #[test]
    fn test_control_composite_view() {
        let mut cpu = m33();
        assert!(cpu.is_secure());
        cpu.v7m_msr(sysm::CONTROL, 0, CONTROL_FPCA | CONTROL_SFPA);
        let ns = cpu.v7m.control[SecurityState::NonSecure.index()];
        assert_eq!(ns & (CONTROL_FPCA | CONTROL_SFPA), CONTROL_FPCA | CONTROL_SFPA);
        assert_eq!(cpu.v7m.control[SecurityState::Secure.index()] & (CONTROL_FPCA | CONTROL_SFPA), 0);
        assert_eq!(cpu.v7m_mrs(sysm::CONTROL) & (CONTROL_FPCA | CONTROL_SFPA), CONTROL_FPCA | CONTROL_SFPA);
        // SFPA 在 Non-secure 视图中读为 0
        assert_eq!(cpu.v7m_mrs(sysm::CONTROL_NS) & (CONTROL_FPCA | CONTROL_SFPA), CONTROL_FPCA);
        cpu.v7m_set_security(SecurityState::NonSecure);
        assert_eq!(cpu.v7m_mrs(sysm::CONTROL) & CONTROL_SFPA, 0);
    }

    #[test]
    fn test_primask_requests_recheck() {
        let mut cpu = m33();
        assert!(!cpu.take_irq_recheck());
        cpu.v7m_msr(sysm::PRIMASK, 0, 1);
        assert_eq!(cpu.v7m_mrs(sysm::PRIMASK), 1);
        assert!(cpu.take_irq_recheck());
        assert!(!cpu.take_irq_recheck());
        cpu.v7m_msr(sysm::BASEPRI, 0, 0x40);
        cpu.v7m_msr(sysm::BASEPRI_MAX, 0, 0x80);
        assert_eq!(cpu.v7m_mrs(sysm::BASEPRI), 0x40);
        cpu.v7m_msr(sysm::BASEPRI_MAX, 0, 0x20);
        assert_eq!(cpu.v7m_mrs(sysm::BASEPRI), 0x20);
    }

    #[test]
    fn test_banked_primask_by_security() {
        let mut cpu = m33();
        cpu.v7m_msr(sysm::PRIMASK_NS, 0, 1);
        assert_eq!(cpu.v7m_mrs(sysm::PRIMASK), 0);
        assert_eq!(cpu.v7m_mrs(sysm::PRIMASK_NS), 1);
        cpu.v7m_set_security(SecurityState::NonSecure);
        assert_eq!(cpu.v7m_mrs(sysm::PRIMASK), 1);
        // NS 不能访问别名
        assert_eq!(cpu.v7m_mrs(sysm::PRIMASK_NS), 0);
    }

    #[test]
    fn test_unprivileged_access() {
        let mut cpu = m33();
        cpu.set_nzcv(0x8000_0000);
        cpu.v7m_msr(sysm::CONTROL, 0, CONTROL_NPRIV);
        assert!(!cpu.is_privileged());
        assert_eq!(cpu.v7m_mrs(sysm::PRIMASK), 0);
        cpu.v7m_msr(sysm::PRIMASK, 0, 1);
        assert_eq!(cpu.v7m.primask[1], 0);
        assert_eq!(cpu.v7m_mrs(sysm::APSR), 0x8000_0000);
        cpu.v7m_msr(sysm::APSR, 8, 0x4000_0000);
        assert_eq!(cpu.nzcv(), 0x4000_0000);
    }

    #[test]
    fn test_security_override_reads_other_sp() {
        let mut cpu = m33();
        cpu.regs[13] = 0x3000_0000;
        cpu.v7m_msr(sysm::MSP_NS, 0, 0x2000_0000);
        assert_eq!(cpu.read_register(13, Some(SecurityState::NonSecure)).unwrap(), 0x2000_0000);
        assert_eq!(cpu.read_register(13, Some(SecurityState::Secure)).unwrap(), 0x3000_0000);
        cpu.write_register(13, 0x2000_0100, Some(SecurityState::NonSecure)).unwrap();
        cpu.v7m_set_security(SecurityState::NonSecure);
        assert_eq!(cpu.regs[13], 0x2000_0100);
        assert_eq!(cpu.read_register(13, Some(SecurityState::Secure)).unwrap(), 0x3000_0000);
    }

    #[test]
    fn test_handler_mode_override_uses_other_msp() {
        let mut cpu = m33();
        let ns = SecurityState::NonSecure.index();
        cpu.v7m.control[ns] |= CONTROL_SPSEL;
        cpu.v7m.other_sp[ns] = [0x2000_0000, 0x2100_0000];
        cpu.v7m.exception = 3;
        assert!(cpu.handler_mode() && cpu.is_secure());
        // Handler 模式下 Non-secure 一侧的活动栈是 MSP_NS，与其 SPSEL 无关
        assert_eq!(cpu.read_register(13, Some(SecurityState::NonSecure)).unwrap(), 0x2000_0000);
        cpu.write_register(13, 0x2000_0103, Some(SecurityState::NonSecure)).unwrap();
        assert_eq!(cpu.v7m.other_sp[ns], [0x2000_0100, 0x2100_0000]);

        // 回到线程模式后改用 PSP_NS
        cpu.v7m.exception = 0;
        assert_eq!(cpu.read_register(13, Some(SecurityState::NonSecure)).unwrap(), 0x2100_0000);
    }
}
