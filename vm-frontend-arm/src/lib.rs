//! # vm-frontend-arm - ARM/Thumb 解码与 IR 翻译
//!
//! 把 A32、T16/T32 (含 Thumb-2)、VFP、NEON 与 M-profile MVE/低开销循环指令
//! 解码为 [`Insn`]，再翻译为 [`vm_ir::IRBlock`]。翻译依赖的 CPU 状态通过
//! [`vm_arm_cpu::BlockFlags`] 传入，运行时才能确定的部分 (异常、系统寄存器
//! 访问、浮点运算) 落到 [`vm_arm_cpu::ArmHelper`] 调用。
//!
//! ## 主要组件
//!
//! - **解码**: [`decode::arm`]、[`decode::thumb16`]、[`decode::thumb32`]
//! - **翻译**: [`ArmTranslator`] 块翻译循环，实现 [`vm_core::Decoder`]
//! - **扩展**: [`vfp`]、[`neon`]、[`mve`] 的指令表示与发射
//!
//! ## 示例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vm_frontend_arm::ArmTranslator;
//!
//! let translator = ArmTranslator::new(cpu.block_flags(), Arc::new(cpregs), Default::default());
//! let block = translator.translate_block(&mmu, GuestAddr(0x8000))?;
//! ```

pub mod context;
mod coproc;
pub mod decode;
pub mod mve;
pub mod neon;
mod translate;
mod translator;
pub mod vfp;

pub use context::{BlockEnd, DisasContext};
pub use decode::{DecodeEnv, DecodedInsn, Insn};
pub use mve::{LobInsn, MveInsn};
pub use neon::NeonInsn;
pub use translator::{ArmBlock, ArmTranslator};
pub use vfp::VfpInsn;
