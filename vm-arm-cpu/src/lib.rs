//! # vm-arm-cpu - ARM 客户机核心状态
//!
//! 经典架构 (ARMv4-ARMv8 AArch32，A/R 档案) 与 M-profile (含 TrustZone-M)
//! 的架构状态、系统寄存器分发表、内存保护单元以及翻译代码调用的运行时
//! 辅助函数。
//!
//! ## 主要组件
//!
//! - **状态**: [`ArmCpu`] 通用寄存器、标志、模式分组与 M-profile 分组
//! - **原语**: [`bits`] 条件码、移位器、饱和与并行运算；[`softfp`] 浮点
//! - **系统寄存器**: [`cpreg::CpRegTable`] 协处理器寄存器描述符表
//! - **内存保护**: [`mpu`] PMSAv7/PMSAv8/SAU 判定与缓存
//! - **MVE**: [`mve`] 谓词执行引擎
//! - **辅助函数**: [`helpers::ArmHelper`] 目录与 [`helpers::call_helper`]
//! - **配置**: [`config::ArmCpuConfig`] 从 TOML/JSON 构造核心
//!
//! ## 示例
//!
//! ```rust,ignore
//! use vm_arm_cpu::{ArmCpu, config::ArmCpuConfig, features::CpuModel};
//!
//! let cpu = ArmCpu::from_config(&ArmCpuConfig::for_model(CpuModel::CortexM33))?;
//! ```

pub mod banked;
pub mod bits;
pub mod config;
pub mod cp15;
pub mod cpreg;
pub mod exception;
pub mod exclusive;
pub mod features;
pub mod fpregs;
pub mod helpers;
pub mod intc;
pub mod lanes;
pub mod mpu;
pub mod memory;
pub mod mve;
pub mod pmu;
pub mod psr;
pub mod softfp;
pub mod state;
pub mod v7m;

pub use bits::{Cond, Nzcv, ShiftType, evaluate_condition_code};
pub use config::{ArmCpuConfig, TranslationOptions};
pub use cpreg::{CpRegDesc, CpRegKey, CpRegTable};
pub use exclusive::ExclusiveMonitor;
pub use features::{ArmFeatures, CpuModel, Profile};
pub use helpers::{ArmHelper, HelperEnv, HelperResult, call_helper};
pub use intc::{InterruptController, NoInterrupts};
pub use psr::{Mode, SecurityState};
pub use state::{ArmCpu, BlockFlags, WaitState, slot};
