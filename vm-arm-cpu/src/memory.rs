//! 客户机数据访存
//!
//! 解释器的 `Load`/`Store` 与辅助函数 (独占访问、MVE 向量访存) 共用同一条
//! 路径：对齐检查、MPU/SAU 判定、地址转换，最后才访问内存。失败分成两类：
//! 客户机可见的异常，以及只能交给宿主的致命错误。

use vm_core::{AccessType, GuestAddr, MMU, VmError, VmResult, mmu_traits::check_access_size};
use vm_ir::MemFlags;

use crate::exception::{EXCP_DATA_ABORT, EXCP_MEM_MANAGE, EXCP_SECURE_FAULT, EXCP_UNALIGNED};
use crate::exclusive::ExclusiveMonitor;
use crate::helpers::HelperResult;
use crate::mpu::AccessResult;
use crate::psr::SecurityState;
use crate::state::ArmCpu;

/// 一次访存失败
#[derive(Debug)]
pub enum MemFault {
    /// 客户机异常；`addr` 为出错的虚拟地址
    Guest { excp: u32, addr: u32 },
    Host(VmError),
}

impl MemFault {
    /// 非致命的内存错误对客户机表现为数据中止
    pub fn classify(e: VmError, addr: u32) -> Self {
        if e.is_fatal() { MemFault::Host(e) } else { MemFault::Guest { excp: EXCP_DATA_ABORT, addr } }
    }

    /// 辅助函数的返回形式
    pub fn into_helper_result(self) -> VmResult<HelperResult> {
        match self {
            MemFault::Guest { excp, addr } => Ok(HelperResult::Raise { excp, syndrome: addr }),
            MemFault::Host(e) => Err(e),
        }
    }
}

/// 以核当前的特权级与安全状态访问
pub fn current_flags(cpu: &ArmCpu, align: u8) -> MemFlags {
    MemFlags { unprivileged: !cpu.is_privileged(), secure: cpu.is_secure(), align, ..MemFlags::default() }
}

/// 对齐、MPU/SAU 判定后经 MMU 转换
pub fn translate(
    cpu: &mut ArmCpu,
    mmu: &mut dyn MMU,
    va: u32,
    kind: AccessType,
    flags: &MemFlags,
) -> Result<GuestAddr, MemFault> {
    let m = cpu.is_m_profile();
    if flags.align > 1 && va % u32::from(flags.align) != 0 {
        let excp = if m { EXCP_UNALIGNED } else { EXCP_DATA_ABORT };
        return Err(MemFault::Guest { excp, addr: va });
    }
    let security = SecurityState::from_secure(flags.secure);
    let excp = match cpu.evaluate_access(va, kind, security, !flags.unprivileged) {
        AccessResult::Permitted => None,
        AccessResult::SecurityFault => Some(EXCP_SECURE_FAULT),
        AccessResult::BackgroundFault | AccessResult::PermissionFault if m => Some(EXCP_MEM_MANAGE),
        AccessResult::BackgroundFault | AccessResult::PermissionFault => Some(EXCP_DATA_ABORT),
    };
    if let Some(excp) = excp {
        let what = if kind.is_write() { "store" } else { "load" };
        log::trace!("{what} {va:#010x} denied: {}", crate::exception::name(excp));
        return Err(MemFault::Guest { excp, addr: va });
    }
    mmu.translate(GuestAddr(u64::from(va)), kind)
        .map(GuestAddr::from)
        .map_err(|e| MemFault::classify(e, va))
}

pub fn read(cpu: &mut ArmCpu, mmu: &mut dyn MMU, va: u32, size: u8, flags: &MemFlags) -> Result<u64, MemFault> {
    check_access_size(size).map_err(MemFault::Host)?;
    let pa = translate(cpu, mmu, va, AccessType::Read, flags)?;
    mmu.read(pa, size).map_err(|e| MemFault::classify(e, va))
}

/// 写入并让独占监视器看到这次存储
pub fn write(
    cpu: &mut ArmCpu,
    mmu: &mut dyn MMU,
    monitor: &ExclusiveMonitor,
    va: u32,
    size: u8,
    value: u64,
    flags: &MemFlags,
) -> Result<(), MemFault> {
    check_access_size(size).map_err(MemFault::Host)?;
    let pa = translate(cpu, mmu, va, AccessType::Write, flags)?;
    monitor.snoop_store(pa.0, size);
    let value = if size >= 8 { value } else { value & ((1u64 << (size * 8)) - 1) };
    mmu.write(pa, value, size).map_err(|e| MemFault::classify(e, va))
}
