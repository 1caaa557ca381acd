//! # vm-core - 虚拟机核心库
//!
//! 提供翻译器各 crate 共享的核心类型定义、Trait 抽象和错误模型。
//!
//! ## 主要组件
//!
//! - **类型定义**: [`GuestAddr`], [`GuestPhysAddr`] 地址类型
//! - **内存管理**: [`MMU`] trait 组合 [`AddressTranslator`] 与 [`MemoryAccess`]
//! - **解码器**: [`Decoder`] trait 定义指令解码器接口
//! - **执行抽象**: [`ExecutionEngine`] trait 定义执行引擎接口
//! - **错误模型**: [`VmError`] 及其分类 [`CoreError`], [`MemoryError`], [`ExecutionError`]
//! - **配置**: [`config::Config`] 统一配置 trait

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;
pub mod error;
pub mod mmu_traits;

pub use error::{CoreError, ExecutionError, FatalExt, MemoryError, VmError};
pub use mmu_traits::{AddressTranslator, MemoryAccess, MMU};

// ============================================================================
// 基础类型定义
// ============================================================================

/// 客户机虚拟地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GuestAddr(pub u64);

impl GuestAddr {
    /// Wrapping addition
    pub fn wrapping_add(self, rhs: u64) -> Self {
        GuestAddr(self.0.wrapping_add(rhs))
    }

    /// Wrapping subtraction
    pub fn wrapping_sub(self, rhs: GuestAddr) -> u64 {
        self.0.wrapping_sub(rhs.0)
    }

    /// 页内偏移
    pub fn page_offset(self, page_size: u64) -> u64 {
        self.0 & (page_size - 1)
    }

    /// 页起始地址
    pub fn page_base(self, page_size: u64) -> GuestAddr {
        GuestAddr(self.0 & !(page_size - 1))
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// 客户机物理地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GuestPhysAddr(pub u64);

impl From<GuestPhysAddr> for GuestAddr {
    fn from(addr: GuestPhysAddr) -> Self {
        GuestAddr(addr.0)
    }
}

impl From<GuestAddr> for GuestPhysAddr {
    fn from(addr: GuestAddr) -> Self {
        GuestPhysAddr(addr.0)
    }
}

/// 访问类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    /// 读取
    Read,
    /// 写入
    Write,
    /// 执行
    Execute,
    /// 原子操作
    Atomic,
}

impl AccessType {
    pub fn is_write(self) -> bool {
        matches!(self, AccessType::Write | AccessType::Atomic)
    }
}

/// 虚拟机结果类型
pub type VmResult<T> = Result<T, VmError>;

/// 指令解码器trait
///
/// 负责将客户机机器码解码为可执行的指令表示。JIT 模式下以基本块为单位
/// 调用 [`Decoder::decode`]，调试与测试场景下可以单条解码。
///
/// # 示例
/// ```ignore
/// let mut decoder = ArmTranslator::new(options);
/// let block = decoder.decode(&mmu, GuestAddr(0x1000))?;
/// ```
pub trait Decoder {
    /// 指令类型关联类型
    type Instruction;

    /// 基本块类型关联类型
    type Block;

    /// 解码单条指令
    fn decode_insn(&mut self, mmu: &dyn MMU, pc: GuestAddr) -> VmResult<Self::Instruction>;

    /// 解码指令块，直到遇到块终止条件
    fn decode(&mut self, mmu: &dyn MMU, pc: GuestAddr) -> VmResult<Self::Block>;
}

/// 执行状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    /// 正常结束，继续从 `next_pc` 执行
    Continue,
    /// 客户机异常，由外层分发
    Exception { excp: u32, syndrome: u32 },
    /// 处理器进入低功耗等待 (WFI/WFE)
    Halted,
}

/// 执行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub executed_ops: u64,
    pub executed_insns: u64,
}

/// 执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub status: ExecStatus,
    pub next_pc: GuestAddr,
    pub stats: ExecStats,
}

/// 执行引擎trait
///
/// 执行解码器产生的基本块。引擎持有 vCPU 状态，内存通过 [`MMU`] 访问。
pub trait ExecutionEngine<BlockType> {
    /// 执行一个基本块
    fn run(&mut self, mmu: &mut dyn MMU, block: &BlockType) -> VmResult<ExecResult>;
}
