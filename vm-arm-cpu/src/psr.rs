//! 程序状态寄存器布局与处理器模式

use serde::{Deserialize, Serialize};

pub const CPSR_M: u32 = 0x1f;
pub const CPSR_T: u32 = 1 << 5;
pub const CPSR_F: u32 = 1 << 6;
pub const CPSR_I: u32 = 1 << 7;
pub const CPSR_A: u32 = 1 << 8;
pub const CPSR_E: u32 = 1 << 9;
pub const CPSR_IT_2_7: u32 = 0xfc00;
pub const CPSR_GE: u32 = 0xf << 16;
pub const CPSR_J: u32 = 1 << 24;
pub const CPSR_IT_0_1: u32 = 3 << 25;
pub const CPSR_Q: u32 = 1 << 27;
pub const CPSR_NZCV: u32 = 0xf << 28;
pub const CPSR_IT: u32 = CPSR_IT_0_1 | CPSR_IT_2_7;
/// 非特权 MSR 可写的位
pub const CPSR_USER: u32 = CPSR_NZCV | CPSR_Q | CPSR_GE | CPSR_E;
/// 执行状态位，MSR 不可写
pub const CPSR_EXEC: u32 = CPSR_T | CPSR_IT | CPSR_J;

pub const XPSR_EXCP: u32 = 0x1ff;
pub const XPSR_IT_2_7: u32 = CPSR_IT_2_7;
pub const XPSR_GE: u32 = CPSR_GE;
pub const XPSR_T: u32 = 1 << 24;
pub const XPSR_IT_0_1: u32 = CPSR_IT_0_1;
pub const XPSR_Q: u32 = CPSR_Q;
pub const XPSR_NZCV: u32 = CPSR_NZCV;

pub const CONTROL_NPRIV: u32 = 1 << 0;
pub const CONTROL_SPSEL: u32 = 1 << 1;
pub const CONTROL_FPCA: u32 = 1 << 2;
pub const CONTROL_SFPA: u32 = 1 << 3;

/// 经典模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Mode {
    Usr = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Svc = 0x13,
    Mon = 0x16,
    Abt = 0x17,
    Hyp = 0x1a,
    Und = 0x1b,
    Sys = 0x1f,
}

impl Mode {
    pub fn from_bits(m: u32) -> Option<Mode> {
        Some(match m & CPSR_M {
            0x10 => Mode::Usr,
            0x11 => Mode::Fiq,
            0x12 => Mode::Irq,
            0x13 => Mode::Svc,
            0x16 => Mode::Mon,
            0x17 => Mode::Abt,
            0x1a => Mode::Hyp,
            0x1b => Mode::Und,
            0x1f => Mode::Sys,
            _ => return None,
        })
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn bank(self) -> BankMode {
        match self {
            Mode::Usr | Mode::Sys => BankMode::Usr,
            Mode::Svc => BankMode::Svc,
            Mode::Abt => BankMode::Abt,
            Mode::Und => BankMode::Und,
            Mode::Irq => BankMode::Irq,
            Mode::Fiq => BankMode::Fiq,
            Mode::Hyp => BankMode::Hyp,
            Mode::Mon => BankMode::Mon,
        }
    }

    pub fn is_privileged(self) -> bool {
        self != Mode::Usr
    }

    pub fn has_spsr(self) -> bool {
        !matches!(self, Mode::Usr | Mode::Sys)
    }
}

/// r13/r14/SPSR 的存储组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BankMode {
    Usr = 0,
    Svc = 1,
    Abt = 2,
    Und = 3,
    Irq = 4,
    Fiq = 5,
    Hyp = 6,
    Mon = 7,
}

pub const NUM_BANKS: usize = 8;

/// M-profile 安全状态，用作寄存器组下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum SecurityState {
    NonSecure = 0,
    Secure = 1,
}

impl SecurityState {
    pub fn from_secure(secure: bool) -> Self {
        if secure { SecurityState::Secure } else { SecurityState::NonSecure }
    }

    pub fn is_secure(self) -> bool {
        self == SecurityState::Secure
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn other(self) -> Self {
        match self {
            SecurityState::Secure => SecurityState::NonSecure,
            SecurityState::NonSecure => SecurityState::Secure,
        }
    }
}

/// ITSTATE 按 CPSR 排列 (IT[7:2] 在 [15:10]，IT[1:0] 在 [26:25])
pub fn it_from_psr(psr: u32) -> u8 {
    (((psr >> 25) & 3) | ((psr >> 8) & 0xfc)) as u8
}

pub fn it_to_psr(it: u8) -> u32 {
    ((u32::from(it) & 3) << 25) | ((u32::from(it) & 0xfc) << 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_it_bits_round_trip() {
        for it in [0u8, 0x08, 0x1c, 0xa5, 0xff] {
            assert_eq!(it_from_psr(it_to_psr(it)), it);
        }
        assert_eq!(it_to_psr(0xff) & !CPSR_IT, 0);
    }

    #[test]
    fn test_mode_banks() {
        assert_eq!(Mode::Sys.bank(), BankMode::Usr);
        assert_eq!(Mode::from_bits(0x1b), Some(Mode::Und));
        assert_eq!(Mode::from_bits(0x14), None);
        assert!(!Mode::Sys.has_spsr());
    }
}
