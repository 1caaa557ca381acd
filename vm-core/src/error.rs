//! 统一错误模型
//!
//! 错误分为三类：可在翻译器内部恢复的（非法指令、未处理的系统寄存器）、
//! 必须终止宿主进程的（不支持的特性、配置错误），以及内存回调错误。
//! [`VmError::is_fatal`] 给出分类，[`FatalExt::or_abort`] 在 CPU 模型
//! 初始化层把致命错误转换为进程终止。

use crate::config::ConfigError;
use crate::{AccessType, GuestAddr};

/// 统一的虚拟机错误类型
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    /// 核心/基础架构错误
    #[error(transparent)]
    Core(#[from] CoreError),
    /// 内存管理错误
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// 执行引擎错误
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// 带上下文的错误包装器
    #[error("{context}: {error}")]
    WithContext {
        error: Box<VmError>,
        context: String,
    },
}

/// 核心系统错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// 宿主对配置接口的误用（区域数、接口编号、寄存器编号越界等）
    #[error("configuration error in `{field}`: {message}")]
    Config { message: String, field: String },
    /// 架构上合法但未实现的特性
    #[error("unsupported feature `{feature}` in {module}")]
    UnsupportedFeature { feature: String, module: String },
    /// 描述符表中的键冲突
    #[error("duplicate register definition for {key}")]
    DuplicateRegister { key: String },
    /// 查找失败
    #[error("{what} not found")]
    NotFound { what: String },
    /// 内部错误
    #[error("internal error in {module}: {message}")]
    Internal { message: String, module: String },
}

/// 内存管理错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// 访问违规
    #[error("access violation at {addr}")]
    AccessViolation {
        addr: GuestAddr,
        access_type: Option<AccessType>,
    },
    /// 未映射地址
    #[error("unmapped address {0}")]
    Unmapped(GuestAddr),
    /// 非法访问大小
    #[error("invalid access size {size}")]
    InvalidSize { size: u8 },
    /// 对齐错误
    #[error("misaligned access at {addr} (size {size})")]
    AlignmentError { addr: GuestAddr, size: u8 },
}

/// 执行引擎错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// 非法/未定义编码
    #[error("illegal instruction {insn:#010x} at {pc}")]
    IllegalInstruction { pc: GuestAddr, insn: u32 },
    /// 没有描述符的系统寄存器
    #[error("unhandled system register {key}")]
    UnhandledRegister { key: String },
    /// 条件码越界
    #[error("invalid condition code {code}")]
    InvalidCondition { code: u32 },
    /// 取指失败
    #[error("instruction fetch failed at {pc}: {message}")]
    FetchFailed { pc: GuestAddr, message: String },
}

impl VmError {
    /// 宿主是否必须终止
    ///
    /// 非法指令与未处理的系统寄存器会被转换为客户机异常或日志，
    /// 不会导致宿主崩溃。
    pub fn is_fatal(&self) -> bool {
        match self {
            VmError::Core(CoreError::Config { .. })
            | VmError::Core(CoreError::UnsupportedFeature { .. })
            | VmError::Core(CoreError::Internal { .. }) => true,
            VmError::Core(_) => false,
            VmError::Memory(_) => false,
            VmError::Execution(ExecutionError::InvalidCondition { .. }) => true,
            VmError::Execution(_) => false,
            VmError::WithContext { error, .. } => error.is_fatal(),
        }
    }

    /// 附加上下文
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VmError::WithContext {
            error: Box::new(self),
            context: context.into(),
        }
    }

    /// 去掉上下文包装
    pub fn root(&self) -> &VmError {
        match self {
            VmError::WithContext { error, .. } => error.root(),
            other => other,
        }
    }

    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Config {
            message: message.into(),
            field: field.into(),
        }
        .into()
    }

    pub fn unsupported(feature: impl Into<String>, module: impl Into<String>) -> Self {
        CoreError::UnsupportedFeature {
            feature: feature.into(),
            module: module.into(),
        }
        .into()
    }

    pub fn illegal(pc: GuestAddr, insn: u32) -> Self {
        ExecutionError::IllegalInstruction { pc, insn }.into()
    }
}

impl From<ConfigError> for VmError {
    fn from(err: ConfigError) -> Self {
        VmError::config("config", err.to_string())
    }
}

/// 初始化层对致命错误的处理
pub trait FatalExt<T> {
    /// 成功时返回值，失败时记录错误并终止进程
    fn or_abort(self) -> T;
}

impl<T> FatalExt<T> for Result<T, VmError> {
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                log::error!("fatal: {err}");
                std::process::abort()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(VmError::config("mpu.regions", "too many").is_fatal());
        assert!(VmError::unsupported("hyp mode", "psr").is_fatal());
        assert!(!VmError::illegal(GuestAddr(0x100), 0xe7f0_00f0).is_fatal());
        let unhandled: VmError = ExecutionError::UnhandledRegister {
            key: "cp7".to_string(),
        }
        .into();
        assert!(!unhandled.is_fatal());
    }

    #[test]
    fn test_context_keeps_classification() {
        let err = VmError::config("tcm", "bad index").with_context("bring-up");
        assert!(err.is_fatal());
        assert!(matches!(err.root(), VmError::Core(CoreError::Config { .. })));
        assert!(err.to_string().starts_with("bring-up: "));
    }
}
