//! MMU Trait 细粒度拆分
//!
//! 地址翻译只暴露通过/失败契约，页表遍历由外部实现。

use crate::{AccessType, GuestAddr, GuestPhysAddr, MemoryError, VmError};

/// 地址翻译器
///
/// 负责虚拟地址到物理地址的翻译 (`get_phys_addr` 契约)。
pub trait AddressTranslator: Send + Sync {
    /// 虚拟地址翻译，失败时返回对应的故障
    fn translate(&mut self, va: GuestAddr, access: AccessType) -> Result<GuestPhysAddr, VmError>;

    /// TLB 刷新
    fn flush_tlb(&mut self);
}

/// 内存访问接口
pub trait MemoryAccess: Send + Sync {
    /// 从给定物理地址读取内存
    ///
    /// # 参数
    /// - `pa`: 物理地址
    /// - `size`: 读取大小（1/2/4/8 字节）
    fn read(&self, pa: GuestAddr, size: u8) -> Result<u64, VmError>;

    /// 向给定物理地址写入内存
    fn write(&mut self, pa: GuestAddr, val: u64, size: u8) -> Result<(), VmError>;

    /// 从给定 PC 取出指令（Thumb 按半字取）
    fn fetch_insn(&self, pc: GuestAddr, size: u8) -> Result<u64, VmError> {
        self.read(pc, size)
    }
}

/// 检查访问大小
pub fn check_access_size(size: u8) -> Result<(), VmError> {
    match size {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(MemoryError::InvalidSize { size }.into()),
    }
}

/// 统一的MMU trait
///
/// 组合所有必要接口
pub trait MMU: AddressTranslator + MemoryAccess + Send + 'static {}

impl<T> MMU for T where T: AddressTranslator + MemoryAccess + Send + 'static {}
