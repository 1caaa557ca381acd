//! 异常编号
//!
//! 由翻译器写入 `Terminator::Exception`，宿主据此分发。编号与客户机无关，
//! 只在本工作区内部使用。

pub const EXCP_UDEF: u32 = 1;
pub const EXCP_SWI: u32 = 2;
pub const EXCP_PREFETCH_ABORT: u32 = 3;
pub const EXCP_DATA_ABORT: u32 = 4;
pub const EXCP_IRQ: u32 = 5;
pub const EXCP_FIQ: u32 = 6;
pub const EXCP_BKPT: u32 = 7;
/// M-profile 异常返回 (向 EXC_RETURN 魔数地址跳转)
pub const EXCP_EXCEPTION_EXIT: u32 = 8;
pub const EXCP_SMC: u32 = 13;
/// 协处理器不可用 (M-profile UsageFault NOCP)
pub const EXCP_NOCP: u32 = 17;
/// 非法执行状态 (M-profile INVSTATE)
pub const EXCP_INVSTATE: u32 = 18;
pub const EXCP_UNALIGNED: u32 = 22;
pub const EXCP_DIVBYZERO: u32 = 23;
/// 安全属性违例 (SecureFault)
pub const EXCP_SECURE_FAULT: u32 = 24;
/// 内存保护违例 (MemManage)
pub const EXCP_MEM_MANAGE: u32 = 25;

/// M-profile 中 EXC_RETURN 与 FNC_RETURN 的起始地址
pub const EXC_RETURN_MIN_MAGIC: u32 = 0xff00_0000;
pub const FNC_RETURN_MIN_MAGIC: u32 = 0xfeff_fffe;

pub fn name(excp: u32) -> &'static str {
    match excp {
        EXCP_UDEF => "undefined instruction",
        EXCP_SWI => "supervisor call",
        EXCP_PREFETCH_ABORT => "prefetch abort",
        EXCP_DATA_ABORT => "data abort",
        EXCP_IRQ => "irq",
        EXCP_FIQ => "fiq",
        EXCP_BKPT => "breakpoint",
        EXCP_EXCEPTION_EXIT => "exception return",
        EXCP_SMC => "secure monitor call",
        EXCP_NOCP => "coprocessor unavailable",
        EXCP_INVSTATE => "invalid state",
        EXCP_UNALIGNED => "unaligned access",
        EXCP_DIVBYZERO => "divide by zero",
        EXCP_SECURE_FAULT => "secure fault",
        EXCP_MEM_MANAGE => "memory management fault",
        _ => "unknown",
    }
}
