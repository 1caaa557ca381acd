//! CPU 架构状态
//!
//! 每个客户机核心拥有一个 [`ArmCpu`]。通用寄存器、标志与执行状态按
//! 经典架构或 M-profile 的分组规则保存：任何时刻每个分组寄存器只有一个
//! 活动值位于 `regs` 中，非活动副本只能通过显式的切换路径访问。

use vm_core::{CoreError, MemoryAccess, VmError, VmResult};
use vm_ir::StateReg;

use crate::banked::BankedRegs;
use crate::cp15::{self, Cp15State};
use crate::exception::*;
use crate::features::{ArmFeatures, CpuModel, Profile};
use crate::fpregs::FpRegs;
use crate::intc::InterruptController;
use crate::mpu::{AccessContext, AccessResult, BackgroundPolicy, MpuState, MPU_CTRL_ENABLE, MPU_CTRL_PRIVDEFENA};
use crate::pmu::Pmu;
use crate::psr::*;
use crate::v7m::V7mState;
use vm_core::AccessType;

/// IR 状态槽位编号
pub mod slot {
    use vm_ir::StateReg;

    pub const R0: StateReg = 0;
    pub const SP: StateReg = 13;
    pub const LR: StateReg = 14;
    pub const PC: StateReg = 15;
    pub const NF: StateReg = 16;
    pub const ZF: StateReg = 17;
    pub const CF: StateReg = 18;
    pub const VF: StateReg = 19;
    pub const QF: StateReg = 20;
    pub const GE: StateReg = 21;
    pub const THUMB: StateReg = 22;
    pub const CONDEXEC: StateReg = 23;
    pub const VPR: StateReg = 24;
    pub const LTPSIZE: StateReg = 25;

    pub fn reg(n: u32) -> StateReg {
        debug_assert!(n < 16);
        n as StateReg
    }
}

/// TCM 接口数
pub const NUM_TCM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcmRegion {
    pub base: u32,
    pub size: u32,
}

impl TcmRegion {
    pub fn contains(&self, addr: u32) -> bool {
        addr.wrapping_sub(self.base) < self.size
    }
}

/// 宿主可见的故障状态/地址寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultRegister {
    DataStatus,
    DataAddress,
    InstructionStatus,
    InstructionAddress,
}

/// CPSR 写入来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpsrWriteKind {
    /// MSR / CPS：不能改变执行状态位，非特权只能写标志
    Instruction,
    /// 异常返回：所有位都写入
    ExceptionReturn,
    /// 宿主直接写入
    Raw,
}

/// WFI/WFE 等待状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitState {
    #[default]
    Running,
    WaitForInterrupt,
    WaitForEvent,
}

/// 翻译器可以据以特化的状态子集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockFlags {
    pub thumb: bool,
    pub privileged: bool,
    pub secure: bool,
    pub handler: bool,
    pub m_profile: bool,
    pub vfp_enabled: bool,
    /// FPSCR.LEN + 1
    pub vec_len: u8,
    pub vec_stride: u8,
    /// IT 状态或 (ECI << 4)
    pub condexec: u8,
    pub big_endian_data: bool,
    pub features: ArmFeatures,
}

impl BlockFlags {
    /// 当前异常级 (AArch32 下 EL3 存在时 Secure 特权模式即 EL3)
    pub fn el(&self) -> u8 {
        el_from(self.privileged, self.secure, self.m_profile, self.features)
    }

    /// 打包进翻译块描述符；特性集按核心固定，不参与打包
    pub fn to_bits(&self) -> u64 {
        u64::from(self.thumb)
            | u64::from(self.privileged) << 1
            | u64::from(self.secure) << 2
            | u64::from(self.handler) << 3
            | u64::from(self.m_profile) << 4
            | u64::from(self.vfp_enabled) << 5
            | u64::from(self.big_endian_data) << 6
            | u64::from(self.vec_len.saturating_sub(1) & 7) << 8
            | u64::from(self.vec_stride.saturating_sub(1) & 3) << 11
            | u64::from(self.condexec) << 16
    }
}

#[derive(Debug, Clone)]
pub struct ArmCpu {
    pub regs: [u32; 16],
    pub nf: bool,
    pub zf: bool,
    pub cf: bool,
    pub vf: bool,
    pub qf: bool,
    /// APSR.GE[3:0]
    pub ge: u8,
    pub thumb: bool,
    /// IT 状态；M-profile MVE 下低 4 位为 0 时高 4 位是 ECI
    pub condexec: u8,
    /// M/A/I/F/E 位
    pub(crate) uncached_cpsr: u32,
    pub spsr: u32,
    pub(crate) banked: BankedRegs,
    pub v7m: V7mState,
    pub vfp: FpRegs,
    pub cp15: Cp15State,
    pub mpu: MpuState,
    pub pmu: Pmu,
    pub wait: WaitState,
    pub event_register: bool,
    /// cp15 TLB 维护操作请求的刷新，由执行端取走后转给地址转换器
    pub tlb_flush_pending: bool,
    tcm: [Option<TcmRegion>; NUM_TCM],
    model: CpuModel,
    features: ArmFeatures,
    midr: u32,
    vector_base: u32,
    pub(crate) secure: bool,
    pub(crate) irq_recheck: bool,
}

fn el_from(privileged: bool, secure: bool, m_profile: bool, features: ArmFeatures) -> u8 {
    if !privileged {
        0
    } else if secure && !m_profile && features.contains(ArmFeatures::EL3) {
        3
    } else {
        1
    }
}

fn fatal_internal(message: String) -> VmError {
    CoreError::Internal {
        message,
        module: "vm-arm-cpu".to_string(),
    }
    .into()
}

impl ArmCpu {
    pub fn new(model: CpuModel) -> VmResult<Self> {
        Self::with_features(model, model.features())
    }

    pub fn with_features(model: CpuModel, features: ArmFeatures) -> VmResult<Self> {
        let mpu = MpuState::new(model.default_mpu_regions(), model.default_sau_regions())?;
        let mut cpu = Self {
            regs: [0; 16],
            nf: false,
            zf: false,
            cf: false,
            vf: false,
            qf: false,
            ge: 0,
            thumb: false,
            condexec: 0,
            uncached_cpsr: 0,
            spsr: 0,
            banked: BankedRegs::default(),
            v7m: V7mState::default(),
            vfp: FpRegs::default(),
            cp15: Cp15State::default(),
            mpu,
            pmu: Pmu::default(),
            wait: WaitState::Running,
            event_register: false,
            tlb_flush_pending: false,
            tcm: [None; NUM_TCM],
            model,
            features,
            midr: model.midr(),
            vector_base: 0,
            secure: false,
            irq_recheck: false,
        };
        cpu.reset();
        Ok(cpu)
    }

    /// 复位到架构定义的初始状态；配置项 (区域数、TCM、向量基址) 保留
    pub fn reset(&mut self) {
        self.regs = [0; 16];
        self.nf = false;
        self.zf = false;
        self.cf = false;
        self.vf = false;
        self.qf = false;
        self.ge = 0;
        self.condexec = 0;
        self.spsr = 0;
        self.banked = BankedRegs::default();
        self.v7m = V7mState::default();
        self.vfp = FpRegs::default();
        self.cp15 = Cp15State::default();
        self.pmu = Pmu::default();
        self.wait = WaitState::Running;
        self.event_register = false;
        self.irq_recheck = false;
        self.vfp.fpsid = if self.features.has_fpu() { 0x4102_3090 } else { 0 };
        self.vfp.mvfr0 = if self.features.contains(ArmFeatures::VFP3) { 0x1011_0222 } else { 0 };
        self.vfp.mvfr1 = if self.features.contains(ArmFeatures::NEON) { 0x1111_1111 } else { 0 };
        self.mpu.invalidate();

        if self.features.is_m_profile() {
            // M-profile 复位进入线程模式、特权、带安全扩展时处于 Secure
            self.uncached_cpsr = 0;
            self.thumb = true;
            self.secure = self.features.contains(ArmFeatures::M_SECURITY);
            self.v7m.vtor = [self.vector_base & !0x7f; 2];
        } else {
            self.uncached_cpsr = Mode::Svc.bits() | CPSR_A | CPSR_I | CPSR_F;
            self.thumb = false;
            self.secure = self.features.contains(ArmFeatures::EL3);
            self.regs[15] = self.vector_base;
        }
    }

    /// M-profile 从向量表读取初始 SP 与复位向量
    pub fn load_reset_vector(&mut self, mem: &dyn MemoryAccess) -> VmResult<()> {
        if !self.is_m_profile() {
            return Err(VmError::unsupported("vector table reset on classic profile", "vm-arm-cpu"));
        }
        let base = u64::from(self.v7m.vtor[self.security().index()]);
        let sp = mem.read(vm_core::GuestAddr(base), 4)? as u32;
        let pc = mem.read(vm_core::GuestAddr(base + 4), 4)? as u32;
        self.regs[13] = sp & !3;
        self.regs[15] = pc & !1;
        self.thumb = pc & 1 != 0;
        Ok(())
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    pub fn features(&self) -> ArmFeatures {
        self.features
    }

    pub fn has_feature(&self, f: ArmFeatures) -> bool {
        self.features.contains(f)
    }

    pub fn profile(&self) -> Profile {
        if self.is_m_profile() { Profile::M } else { self.model.profile() }
    }

    pub fn is_m_profile(&self) -> bool {
        self.features.is_m_profile()
    }

    pub fn midr(&self) -> u32 {
        self.midr
    }

    /// 设置 MIDR/CPUID；implementer 字段不能为 0
    pub fn set_model_id(&mut self, midr: u32) -> VmResult<()> {
        if midr >> 24 == 0 {
            return Err(VmError::config("model_id", format!("{midr:#x} has no implementer code")));
        }
        self.midr = midr;
        Ok(())
    }

    pub fn security(&self) -> SecurityState {
        SecurityState::from_secure(self.secure)
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn mode(&self) -> Mode {
        Mode::from_bits(self.uncached_cpsr).unwrap_or(Mode::Usr)
    }

    pub fn handler_mode(&self) -> bool {
        self.is_m_profile() && self.v7m.exception != 0
    }

    pub fn is_privileged(&self) -> bool {
        if self.is_m_profile() {
            self.handler_mode() || self.v7m.control[self.security().index()] & CONTROL_NPRIV == 0
        } else {
            self.mode().is_privileged()
        }
    }

    pub fn current_el(&self) -> u8 {
        el_from(self.is_privileged(), self.secure, self.is_m_profile(), self.features)
    }

    pub fn take_tlb_flush(&mut self) -> bool {
        std::mem::take(&mut self.tlb_flush_pending)
    }

    /// 取走中断重检请求
    pub fn take_irq_recheck(&mut self) -> bool {
        std::mem::take(&mut self.irq_recheck)
    }

    /// M-profile ECI 状态 (IT 位为 0 时有效)
    pub fn eci(&self) -> u8 {
        if self.condexec & 0xf == 0 { self.condexec >> 4 } else { 0 }
    }

    pub fn set_eci(&mut self, eci: u8) {
        self.condexec = eci << 4;
    }

    // ---- 通用寄存器 ----

    /// 读通用寄存器；`security` 可显式指定要读取的 SP 安全分组
    pub fn read_register(&self, n: u32, security: Option<SecurityState>) -> VmResult<u32> {
        if n >= 16 {
            return Err(VmError::config("register", format!("r{n} does not exist")));
        }
        if n == 13 && self.is_m_profile() {
            if let Some(sec) = security.filter(|s| *s != self.security()) {
                let process = self.v7m_thread_uses_psp(sec);
                return Ok(self.v7m.other_sp[sec.index()][usize::from(process)]);
            }
        }
        Ok(self.regs[n as usize])
    }

    pub fn write_register(&mut self, n: u32, value: u32, security: Option<SecurityState>) -> VmResult<()> {
        if n >= 16 {
            return Err(VmError::config("register", format!("r{n} does not exist")));
        }
        if n == 13 && self.is_m_profile() {
            if let Some(sec) = security.filter(|s| *s != self.security()) {
                let process = self.v7m_thread_uses_psp(sec);
                self.v7m.other_sp[sec.index()][usize::from(process)] = value & !3;
                return Ok(());
            }
        }
        self.regs[n as usize] = value;
        Ok(())
    }

    // ---- 标志与 CPSR ----

    pub fn nzcv(&self) -> u32 {
        u32::from(self.nf) << 31 | u32::from(self.zf) << 30 | u32::from(self.cf) << 29 | u32::from(self.vf) << 28
    }

    pub fn set_nzcv(&mut self, v: u32) {
        self.nf = v & (1 << 31) != 0;
        self.zf = v & (1 << 30) != 0;
        self.cf = v & (1 << 29) != 0;
        self.vf = v & (1 << 28) != 0;
    }

    pub fn cpsr(&self) -> u32 {
        self.nzcv()
            | if self.qf { CPSR_Q } else { 0 }
            | u32::from(self.ge & 0xf) << 16
            | it_to_psr(self.condexec)
            | if self.thumb { CPSR_T } else { 0 }
            | self.uncached_cpsr
    }

    /// 按掩码写 CPSR
    ///
    /// 模式字段为 HYP 时返回 `UnsupportedFeature`；非法模式值被忽略。
    pub fn cpsr_write(&mut self, val: u32, mut mask: u32, kind: CpsrWriteKind) -> VmResult<()> {
        if self.is_m_profile() {
            self.xpsr_write(val, mask & (XPSR_NZCV | XPSR_Q | XPSR_GE));
            return Ok(());
        }
        if kind == CpsrWriteKind::Instruction {
            mask &= !CPSR_EXEC;
            if !self.is_privileged() {
                mask &= CPSR_USER;
            }
        }

        if mask & CPSR_M != 0 {
            match Mode::from_bits(val) {
                Some(Mode::Hyp) => return Err(VmError::unsupported("hypervisor mode", "vm-arm-cpu")),
                Some(Mode::Mon) if !self.has_feature(ArmFeatures::EL3) => {
                    log::warn!("CPSR write selecting monitor mode without EL3, ignored");
                }
                Some(new) => {
                    if new != self.mode() {
                        self.switch_mode(new)?;
                    }
                }
                None => log::warn!("CPSR write with illegal mode {:#x}, ignored", val & CPSR_M),
            }
            mask &= !CPSR_M;
        }

        if mask & CPSR_NZCV != 0 {
            let keep = self.nzcv() & !mask;
            self.set_nzcv(keep | (val & mask & CPSR_NZCV));
        }
        if mask & CPSR_Q != 0 {
            self.qf = val & CPSR_Q != 0;
        }
        if mask & CPSR_GE != 0 {
            self.ge = ((val & CPSR_GE) >> 16) as u8;
        }
        if mask & CPSR_T != 0 {
            self.thumb = val & CPSR_T != 0;
        }
        if mask & CPSR_IT != 0 {
            let cur = it_to_psr(self.condexec);
            self.condexec = it_from_psr((cur & !mask) | (val & mask));
        }
        let plain = mask & (CPSR_A | CPSR_I | CPSR_F | CPSR_E);
        if (self.uncached_cpsr ^ val) & plain & (CPSR_A | CPSR_I | CPSR_F) != 0 {
            self.irq_recheck = true;
        }
        self.uncached_cpsr = (self.uncached_cpsr & !plain) | (val & plain);
        Ok(())
    }

    /// 异常返回：CPSR 取自当前模式的 SPSR
    pub fn exception_return(&mut self, new_pc: u32) -> VmResult<()> {
        if !self.mode().has_spsr() {
            log::warn!("exception return from mode without SPSR");
            self.regs[15] = new_pc;
            return Ok(());
        }
        let spsr = self.spsr;
        self.cpsr_write(spsr, u32::MAX, CpsrWriteKind::ExceptionReturn)?;
        self.regs[15] = if self.thumb { new_pc & !1 } else { new_pc & !3 };
        Ok(())
    }

    pub fn xpsr(&self) -> u32 {
        self.nzcv()
            | if self.qf { XPSR_Q } else { 0 }
            | u32::from(self.ge & 0xf) << 16
            | it_to_psr(self.condexec)
            | if self.thumb { XPSR_T } else { 0 }
            | (self.v7m.exception & XPSR_EXCP)
    }

    pub fn xpsr_write(&mut self, val: u32, mask: u32) {
        if mask & XPSR_NZCV != 0 {
            let keep = self.nzcv() & !mask;
            self.set_nzcv(keep | (val & mask & XPSR_NZCV));
        }
        if mask & XPSR_Q != 0 {
            self.qf = val & XPSR_Q != 0;
        }
        if mask & XPSR_GE != 0 && self.has_feature(ArmFeatures::THUMB_DSP) {
            self.ge = ((val & XPSR_GE) >> 16) as u8;
        }
        if mask & XPSR_T != 0 {
            self.thumb = val & XPSR_T != 0;
        }
        if mask & (XPSR_IT_0_1 | XPSR_IT_2_7) != 0 {
            self.condexec = it_from_psr(val);
        }
        if mask & XPSR_EXCP != 0 {
            self.v7m.exception = val & XPSR_EXCP;
        }
    }

    // ---- 翻译相关 ----

    pub fn vfp_enabled(&self) -> bool {
        if !self.features.has_fpu() {
            return false;
        }
        let cp10 = (self.cp15.cpacr >> cp15::CPACR_CP10_SHIFT) & 3;
        let access = match cp10 {
            0b01 => self.is_privileged(),
            0b11 => true,
            _ => false,
        };
        if self.is_m_profile() { access } else { access && self.vfp.enabled() }
    }

    pub fn block_flags(&self) -> BlockFlags {
        BlockFlags {
            thumb: self.thumb,
            privileged: self.is_privileged(),
            secure: self.secure,
            handler: self.handler_mode(),
            m_profile: self.is_m_profile(),
            vfp_enabled: self.vfp_enabled(),
            vec_len: self.vfp.vec_len(),
            vec_stride: self.vfp.vec_stride(),
            condexec: self.condexec,
            big_endian_data: self.uncached_cpsr & CPSR_E != 0,
            features: self.features,
        }
    }

    /// IR 状态槽位读取
    pub fn get_slot(&self, s: StateReg) -> VmResult<u64> {
        Ok(match s {
            0..=15 => u64::from(self.regs[s as usize]),
            slot::NF => u64::from(self.nf),
            slot::ZF => u64::from(self.zf),
            slot::CF => u64::from(self.cf),
            slot::VF => u64::from(self.vf),
            slot::QF => u64::from(self.qf),
            slot::GE => u64::from(self.ge),
            slot::THUMB => u64::from(self.thumb),
            slot::CONDEXEC => u64::from(self.condexec),
            slot::VPR => u64::from(self.vfp.vpr),
            slot::LTPSIZE => u64::from(self.vfp.ltpsize),
            _ => return Err(fatal_internal(format!("unknown state slot {s}"))),
        })
    }

    pub fn set_slot(&mut self, s: StateReg, v: u64) -> VmResult<()> {
        match s {
            0..=15 => self.regs[s as usize] = v as u32,
            slot::NF => self.nf = v & 1 != 0,
            slot::ZF => self.zf = v & 1 != 0,
            slot::CF => self.cf = v & 1 != 0,
            slot::VF => self.vf = v & 1 != 0,
            slot::QF => self.qf = v & 1 != 0,
            slot::GE => self.ge = (v & 0xf) as u8,
            slot::THUMB => self.thumb = v & 1 != 0,
            slot::CONDEXEC => self.condexec = v as u8,
            slot::VPR => self.vfp.vpr = v as u32,
            slot::LTPSIZE => self.vfp.ltpsize = (v & 7) as u8,
            _ => return Err(fatal_internal(format!("unknown state slot {s}"))),
        }
        Ok(())
    }

    // ---- 宿主配置接口 ----

    pub fn set_fpu_enabled(&mut self, enabled: bool) -> VmResult<()> {
        if !self.features.has_fpu() {
            return Err(VmError::config("fpu", format!("{:?} has no floating-point unit", self.model)));
        }
        if enabled {
            self.cp15.cpacr |= cp15::CPACR_FULL_FP;
            self.vfp.fpexc |= crate::fpregs::FPEXC_EN;
        } else {
            self.cp15.cpacr &= !cp15::CPACR_FULL_FP;
            self.vfp.fpexc &= !crate::fpregs::FPEXC_EN;
        }
        Ok(())
    }

    pub fn configure_mpu_regions(&mut self, count: u32) -> VmResult<()> {
        if count > 0 && !self.has_feature(ArmFeatures::PMSA) {
            return Err(VmError::config("mpu.regions", "CPU has no protection unit"));
        }
        self.mpu.resize(count)
    }

    pub fn configure_sau_regions(&mut self, count: u32) -> VmResult<()> {
        if count > 0 && !self.has_feature(ArmFeatures::M_SECURITY) {
            return Err(VmError::config("sau.regions", "CPU has no security extension"));
        }
        self.mpu.resize_sau(count)
    }

    /// 登记一个 TCM 区域；`index` 为接口号 (0 = ITCM, 1 = DTCM)
    pub fn register_tcm(&mut self, index: usize, base: u32, size: u32) -> VmResult<()> {
        if index >= NUM_TCM {
            return Err(VmError::config("tcm.index", format!("interface {index} out of range")));
        }
        if !size.is_power_of_two() || size < 0x1000 {
            return Err(VmError::config("tcm.size", format!("{size:#x} is not a power of two >= 4KB")));
        }
        if base & (size - 1) != 0 {
            return Err(VmError::config("tcm.base", format!("{base:#x} not aligned to {size:#x}")));
        }
        self.tcm[index] = Some(TcmRegion { base, size });
        Ok(())
    }

    pub fn unregister_tcm(&mut self, index: usize) -> VmResult<()> {
        match self.tcm.get_mut(index) {
            Some(slot) => {
                *slot = None;
                Ok(())
            }
            None => Err(VmError::config("tcm.index", format!("interface {index} out of range"))),
        }
    }

    pub fn tcm(&self, index: usize) -> Option<TcmRegion> {
        self.tcm.get(index).copied().flatten()
    }

    /// 地址所在的 TCM 接口
    pub fn tcm_lookup(&self, addr: u32) -> Option<usize> {
        self.tcm.iter().position(|r| r.is_some_and(|r| r.contains(addr)))
    }

    /// 设置异常向量基址；经典架构要求 32 字节对齐，M-profile 128 字节
    pub fn set_vector_base(&mut self, base: u32) -> VmResult<()> {
        let align = if self.is_m_profile() { 0x7f } else { 0x1f };
        if base & align != 0 {
            return Err(VmError::config("vector_base", format!("{base:#x} is misaligned")));
        }
        self.vector_base = base;
        if self.is_m_profile() {
            self.v7m.vtor[self.security().index()] = base;
        }
        Ok(())
    }

    pub fn vector_base(&self) -> u32 {
        self.vector_base
    }

    pub fn fault_register(&self, reg: FaultRegister) -> VmResult<u32> {
        if self.is_m_profile() {
            let sec = self.security().index();
            return match reg {
                FaultRegister::DataStatus => Ok(self.v7m.cfsr[sec]),
                FaultRegister::DataAddress => Ok(self.v7m.mmfar[sec]),
                FaultRegister::InstructionAddress => Ok(self.v7m.bfar),
                FaultRegister::InstructionStatus => {
                    Err(VmError::config("fault_register", "no instruction fault status on M-profile"))
                }
            };
        }
        Ok(match reg {
            FaultRegister::DataStatus => self.cp15.dfsr,
            FaultRegister::DataAddress => self.cp15.dfar,
            FaultRegister::InstructionStatus => self.cp15.ifsr,
            FaultRegister::InstructionAddress => self.cp15.ifar,
        })
    }

    pub fn set_fault_register(&mut self, reg: FaultRegister, value: u32) -> VmResult<()> {
        if self.is_m_profile() {
            let sec = self.security().index();
            match reg {
                FaultRegister::DataStatus => self.v7m.cfsr[sec] = value,
                FaultRegister::DataAddress => self.v7m.mmfar[sec] = value,
                FaultRegister::InstructionAddress => self.v7m.bfar = value,
                FaultRegister::InstructionStatus => {
                    return Err(VmError::config("fault_register", "no instruction fault status on M-profile"));
                }
            }
            return Ok(());
        }
        match reg {
            FaultRegister::DataStatus => self.cp15.dfsr = value,
            FaultRegister::DataAddress => self.cp15.dfar = value,
            FaultRegister::InstructionStatus => self.cp15.ifsr = value,
            FaultRegister::InstructionAddress => self.cp15.ifar = value,
        }
        Ok(())
    }

    // ---- 内存保护 ----

    /// 当前上下文下的 MPU/SAU 访问判定
    pub fn evaluate_access(
        &mut self,
        addr: u32,
        kind: AccessType,
        security: SecurityState,
        privileged: bool,
    ) -> AccessResult {
        let m_profile = self.is_m_profile();
        let (mpu_enabled, background) = if m_profile {
            let ctrl = self.mpu.ctrl(security);
            (
                ctrl & MPU_CTRL_ENABLE != 0,
                BackgroundPolicy {
                    enabled: ctrl & MPU_CTRL_PRIVDEFENA != 0,
                    user_accessible: false,
                },
            )
        } else {
            (
                self.has_feature(ArmFeatures::PMSA) && self.cp15.sctlr & cp15::SCTLR_M != 0,
                BackgroundPolicy {
                    enabled: self.cp15.sctlr & cp15::SCTLR_BR != 0,
                    user_accessible: false,
                },
            )
        };
        let ctx = AccessContext {
            security,
            privileged,
            m_profile,
            pmsav8: m_profile && self.has_feature(ArmFeatures::V8),
            security_ext: self.has_feature(ArmFeatures::M_SECURITY),
            mpu_enabled,
            background,
        };
        self.mpu.evaluate_access(addr, kind, &ctx)
    }

    // ---- 等待与唤醒 ----

    /// 是否有理由离开 WFI/WFE
    pub fn cpu_has_work(&self, intc: &dyn InterruptController) -> bool {
        match self.wait {
            WaitState::Running => true,
            WaitState::WaitForInterrupt => intc.has_pending(),
            WaitState::WaitForEvent => self.event_register || intc.has_pending() || intc.pending_masked_irq(),
        }
    }

    /// WFE：事件寄存器已置位时清除并继续，否则进入等待
    pub fn wait_for_event(&mut self) {
        if std::mem::take(&mut self.event_register) {
            return;
        }
        self.wait = WaitState::WaitForEvent;
    }

    pub fn wake(&mut self) {
        if self.wait == WaitState::WaitForEvent {
            self.event_register = false;
        }
        self.wait = WaitState::Running;
    }

    // ---- 经典架构异常入口 ----

    /// 进入异常：保存 SPSR、切换模式、设置 LR 并跳到向量
    ///
    /// 调用前 `regs[15]` 需按异常类型指向出错指令 (UDEF/BKPT/中止)
    /// 或下一条指令 (SWI/SMC/IRQ/FIQ)。
    pub fn take_exception(&mut self, excp: u32) -> VmResult<()> {
        if self.is_m_profile() {
            return Err(VmError::unsupported("M-profile exception entry", "vm-arm-cpu"));
        }
        let (mode, vector, mask, offset) = match excp {
            EXCP_UDEF => (Mode::Und, 0x04, CPSR_I, if self.thumb { 2 } else { 4 }),
            EXCP_SWI => (Mode::Svc, 0x08, CPSR_I, 0),
            EXCP_BKPT | EXCP_PREFETCH_ABORT => (Mode::Abt, 0x0c, CPSR_A | CPSR_I, 4),
            EXCP_DATA_ABORT => (Mode::Abt, 0x10, CPSR_A | CPSR_I, 8),
            EXCP_IRQ => (Mode::Irq, 0x18, CPSR_A | CPSR_I, 4),
            EXCP_FIQ => (Mode::Fiq, 0x1c, CPSR_A | CPSR_I | CPSR_F, 4),
            EXCP_SMC if self.has_feature(ArmFeatures::EL3) => (Mode::Mon, 0x08, CPSR_A | CPSR_I | CPSR_F, 0),
            other => {
                return Err(VmError::unsupported(
                    format!("exception {} on classic profile", name(other)),
                    "vm-arm-cpu",
                ));
            }
        };

        let base = if self.cp15.sctlr & cp15::SCTLR_V != 0 {
            0xffff_0000
        } else if mode == Mode::Mon {
            self.cp15.mvbar
        } else if self.has_feature(ArmFeatures::VBAR) {
            self.cp15.vbar
        } else {
            self.vector_base
        };

        let old_cpsr = self.cpsr();
        let return_pc = self.regs[15].wrapping_add(offset);
        self.switch_mode(mode)?;
        self.spsr = old_cpsr;
        self.condexec = 0;
        self.uncached_cpsr &= !CPSR_E;
        if self.cp15.sctlr & cp15::SCTLR_EE != 0 {
            self.uncached_cpsr |= CPSR_E;
        }
        self.uncached_cpsr |= mask;
        self.thumb = self.cp15.sctlr & cp15::SCTLR_TE != 0;
        if mode == Mode::Mon {
            self.secure = true;
        }
        self.regs[14] = return_pc;
        self.regs[15] = base.wrapping_add(vector);
        self.wait = WaitState::Running;
        log::debug!("exception {} -> {:?} at {:#x}", name(excp), mode, self.regs[15]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_reset_state() {
        let cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        assert_eq!(cpu.mode(), Mode::Svc);
        assert!(cpu.is_privileged());
        assert_eq!(cpu.cpsr() & (CPSR_I | CPSR_F | CPSR_A), CPSR_I | CPSR_F | CPSR_A);
    }

    #[test]
    fn test_cpsr_write_modes() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        cpu.cpsr_write(Mode::Irq.bits(), CPSR_M, CpsrWriteKind::Instruction).unwrap();
        assert_eq!(cpu.mode(), Mode::Irq);
        // 非法模式值被忽略
        cpu.cpsr_write(0x14, CPSR_M, CpsrWriteKind::Instruction).unwrap();
        assert_eq!(cpu.mode(), Mode::Irq);
        let err = cpu.cpsr_write(Mode::Hyp.bits(), CPSR_M, CpsrWriteKind::Instruction).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(cpu.mode(), Mode::Irq);
    }

    #[test]
    fn test_user_msr_only_writes_flags() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        cpu.cpsr_write(Mode::Usr.bits(), CPSR_M, CpsrWriteKind::Instruction).unwrap();
        cpu.cpsr_write(0xf000_0000 | Mode::Svc.bits() | CPSR_T, u32::MAX, CpsrWriteKind::Instruction).unwrap();
        assert_eq!(cpu.mode(), Mode::Usr);
        assert!(!cpu.thumb);
        assert_eq!(cpu.nzcv(), 0xf000_0000);
    }

    #[test]
    fn test_take_exception_undef() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        cpu.cp15.vbar = 0x8000_0000;
        cpu.regs[15] = 0x1000;
        cpu.set_nzcv(0x4000_0000);
        cpu.take_exception(EXCP_UDEF).unwrap();
        assert_eq!(cpu.mode(), Mode::Und);
        assert_eq!(cpu.regs[14], 0x1004);
        assert_eq!(cpu.regs[15], 0x8000_0004);
        assert_eq!(cpu.spsr & CPSR_M, Mode::Svc.bits());
        assert_eq!(cpu.spsr & CPSR_NZCV, 0x4000_0000);

        cpu.cp15.sctlr |= cp15::SCTLR_V | cp15::SCTLR_TE;
        cpu.regs[15] = 0x2000;
        cpu.take_exception(EXCP_DATA_ABORT).unwrap();
        assert_eq!(cpu.regs[15], 0xffff_0010);
        assert_eq!(cpu.regs[14], 0x2008);
        assert!(cpu.thumb);
    }

    #[test]
    fn test_configuration_validation() {
        let mut cpu = ArmCpu::new(CpuModel::CortexR5).unwrap();
        assert!(cpu.configure_mpu_regions(16).is_ok());
        assert!(cpu.configure_mpu_regions(257).unwrap_err().is_fatal());
        assert!(cpu.configure_sau_regions(1).is_err());
        assert!(cpu.register_tcm(1, 0x2000_0000, 0x1_0000).is_ok());
        assert_eq!(cpu.tcm_lookup(0x2000_8000), Some(1));
        assert!(cpu.register_tcm(2, 0, 0x1000).is_err());
        assert!(cpu.register_tcm(0, 0x800, 0x1000).is_err());
        assert!(cpu.unregister_tcm(1).is_ok());
        assert_eq!(cpu.tcm_lookup(0x2000_8000), None);
        assert!(cpu.set_vector_base(0x104).is_err());
        assert!(cpu.set_model_id(0x0000_c150).is_err());

        let mut m3 = ArmCpu::new(CpuModel::CortexM3).unwrap();
        assert!(m3.set_fpu_enabled(true).is_err());
    }

    #[test]
    fn test_block_flags_track_state() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA15).unwrap();
        assert!(!cpu.block_flags().vfp_enabled);
        cpu.set_fpu_enabled(true).unwrap();
        let flags = cpu.block_flags();
        assert!(flags.vfp_enabled);
        assert!(flags.privileged);
        cpu.thumb = true;
        assert_ne!(cpu.block_flags().to_bits(), flags.to_bits());
    }

    #[test]
    fn test_fault_registers() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        cpu.set_fault_register(FaultRegister::DataAddress, 0xdead_0000).unwrap();
        assert_eq!(cpu.cp15.dfar, 0xdead_0000);
        let mut m = ArmCpu::new(CpuModel::CortexM4).unwrap();
        m.set_fault_register(FaultRegister::DataStatus, 0x82).unwrap();
        assert_eq!(m.fault_register(FaultRegister::DataStatus).unwrap(), 0x82);
        assert!(m.fault_register(FaultRegister::InstructionStatus).is_err());
    }
}
