//! cp15 系统控制寄存器存储

pub const SCTLR_M: u32 = 1 << 0;
pub const SCTLR_A: u32 = 1 << 1;
pub const SCTLR_C: u32 = 1 << 2;
pub const SCTLR_Z: u32 = 1 << 11;
pub const SCTLR_I: u32 = 1 << 12;
pub const SCTLR_V: u32 = 1 << 13;
/// PMSA 背景区域使能
pub const SCTLR_BR: u32 = 1 << 17;
pub const SCTLR_EE: u32 = 1 << 25;
pub const SCTLR_TE: u32 = 1 << 30;

pub const SCR_NS: u32 = 1 << 0;

/// CPACR 中 cp10/cp11 的访问字段
pub const CPACR_CP10_SHIFT: u32 = 20;
pub const CPACR_CP11_SHIFT: u32 = 22;
pub const CPACR_FULL_FP: u32 = (3 << CPACR_CP10_SHIFT) | (3 << CPACR_CP11_SHIFT);

/// 以存储字段形式保存的 cp15 寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpField {
    Sctlr,
    Actlr,
    Cpacr,
    Ttbr0,
    Ttbr1,
    Ttbcr,
    Dacr,
    Dfsr,
    Ifsr,
    Dfar,
    Ifar,
    Vbar,
    Mvbar,
    Scr,
    Nsacr,
    Contextidr,
    Fcseidr,
    Tpidrurw,
    Tpidruro,
    Tpidrprw,
    Par,
    Csselr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cp15State {
    pub sctlr: u32,
    pub actlr: u32,
    pub cpacr: u32,
    pub ttbr0: u64,
    pub ttbr1: u64,
    pub ttbcr: u32,
    pub dacr: u32,
    pub dfsr: u32,
    pub ifsr: u32,
    pub dfar: u32,
    pub ifar: u32,
    pub vbar: u32,
    pub mvbar: u32,
    pub scr: u32,
    pub nsacr: u32,
    pub contextidr: u32,
    pub fcseidr: u32,
    pub tpidrurw: u32,
    pub tpidruro: u32,
    pub tpidrprw: u32,
    pub par: u64,
    pub csselr: u32,
}

impl Cp15State {
    pub fn get(&self, field: CpField) -> u64 {
        match field {
            CpField::Sctlr => u64::from(self.sctlr),
            CpField::Actlr => u64::from(self.actlr),
            CpField::Cpacr => u64::from(self.cpacr),
            CpField::Ttbr0 => self.ttbr0,
            CpField::Ttbr1 => self.ttbr1,
            CpField::Ttbcr => u64::from(self.ttbcr),
            CpField::Dacr => u64::from(self.dacr),
            CpField::Dfsr => u64::from(self.dfsr),
            CpField::Ifsr => u64::from(self.ifsr),
            CpField::Dfar => u64::from(self.dfar),
            CpField::Ifar => u64::from(self.ifar),
            CpField::Vbar => u64::from(self.vbar),
            CpField::Mvbar => u64::from(self.mvbar),
            CpField::Scr => u64::from(self.scr),
            CpField::Nsacr => u64::from(self.nsacr),
            CpField::Contextidr => u64::from(self.contextidr),
            CpField::Fcseidr => u64::from(self.fcseidr),
            CpField::Tpidrurw => u64::from(self.tpidrurw),
            CpField::Tpidruro => u64::from(self.tpidruro),
            CpField::Tpidrprw => u64::from(self.tpidrprw),
            CpField::Par => self.par,
            CpField::Csselr => u64::from(self.csselr),
        }
    }

    pub fn set(&mut self, field: CpField, v: u64) {
        let w = v as u32;
        match field {
            CpField::Sctlr => self.sctlr = w,
            CpField::Actlr => self.actlr = w,
            CpField::Cpacr => self.cpacr = w,
            CpField::Ttbr0 => self.ttbr0 = v,
            CpField::Ttbr1 => self.ttbr1 = v,
            CpField::Ttbcr => self.ttbcr = w,
            CpField::Dacr => self.dacr = w,
            CpField::Dfsr => self.dfsr = w,
            CpField::Ifsr => self.ifsr = w,
            CpField::Dfar => self.dfar = w,
            CpField::Ifar => self.ifar = w,
            CpField::Vbar => self.vbar = w & !0x1f,
            CpField::Mvbar => self.mvbar = w & !0x1f,
            CpField::Scr => self.scr = w,
            CpField::Nsacr => self.nsacr = w,
            CpField::Contextidr => self.contextidr = w,
            CpField::Fcseidr => self.fcseidr = w & 0xfe00_0000,
            CpField::Tpidrurw => self.tpidrurw = w,
            CpField::Tpidruro => self.tpidruro = w,
            CpField::Tpidrprw => self.tpidrprw = w,
            CpField::Par => self.par = v,
            CpField::Csselr => self.csselr = w & 0xf,
        }
    }
}
