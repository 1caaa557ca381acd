//! 运行时辅助函数目录
//!
//! 前端把无法或不值得内联成 IR 的语义编码为 `IROp::Call { helper: ArmHelper, .. }`。
//! 描述符 (移位类型、掩码、寄存器编号、向量运算描述) 在翻译期固定在
//! 枚举值里，运行时参数通过临时寄存器传入。执行端用 [`call_helper`]
//! 分发，所有辅助函数都显式接收目标核心的状态。

/// 按元素大小与符号性选择具体的 [`Lane`](crate::lanes::Lane) 类型
macro_rules! with_lane {
    ($size:expr, $unsigned:expr, $f:ident ( $($arg:expr),* )) => {
        match ($size, $unsigned) {
            (0, false) => Ok($f::<i8>($($arg),*)),
            (0, true) => Ok($f::<u8>($($arg),*)),
            (1, false) => Ok($f::<i16>($($arg),*)),
            (1, true) => Ok($f::<u16>($($arg),*)),
            (2, false) => Ok($f::<i32>($($arg),*)),
            (2, true) => Ok($f::<u32>($($arg),*)),
            (3, false) => Ok($f::<i64>($($arg),*)),
            (3, true) => Ok($f::<u64>($($arg),*)),
            (s, _) => Err($crate::helpers::bad_size(s)),
        }
    };
}

pub mod mve;
pub mod neon;
pub mod vfp;

use vm_core::{AccessType, MMU, VmError, VmResult};

use crate::banked::decode_banked_sysm;
use crate::bits::{
    self, ParKind, ParOp, ShiftType, parallel_add_sub, sat_add_i32, sat_sub_i32, select_bytes, shift_reg_c,
    signed_sat_q, unsigned_sat_q, usad8,
};
use crate::cpreg::{CpAccessResult, CpRegKey, CpRegTable, Resolution};
use crate::exception::{EXCP_NOCP, EXCP_UDEF};
use crate::exclusive::ExclusiveMonitor;
use crate::intc::InterruptController;
use crate::memory::{self, MemFault};
use crate::state::{ArmCpu, CpsrWriteKind, WaitState};

pub use mve::{MveCall, MveOp};
pub use neon::{NeonCall, NeonOp};
pub use vfp::{FpSysReg, VfpCall, VfpOp};

/// 饱和算术 (QADD 系列)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SatOp {
    Add,
    Sub,
    DoubleAdd,
    DoubleSub,
}

/// DSP 乘法族；`n_top`/`m_top` 选择 16 位半字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DspMulOp {
    /// SMULxy: [a, b]
    Smulxy { n_top: bool, m_top: bool },
    /// SMLAxy: [a, b, acc]
    Smlaxy { n_top: bool, m_top: bool },
    /// SMULWy: [a, b]
    Smulwy { m_top: bool },
    /// SMLAWy: [a, b, acc]
    Smlawy { m_top: bool },
    /// SMLALxy: [a, b, lo, hi] -> 64 位
    Smlalxy { n_top: bool, m_top: bool },
    /// SMUAD/SMUSD: [a, b]
    Smuad { swap: bool, sub: bool },
    /// SMLAD/SMLSD: [a, b, acc]
    Smlad { swap: bool, sub: bool },
    /// SMLALD/SMLSLD: [a, b, lo, hi] -> 64 位
    Smlald { swap: bool, sub: bool },
    /// SMMUL: [a, b]
    Smmul { round: bool },
    /// SMMLA/SMMLS: [a, b, acc]
    Smmla { round: bool, sub: bool },
    /// UMAAL: [a, b, lo, hi] -> 64 位
    Umaal,
}

/// 辅助函数目录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmHelper {
    // ---- 标量 ----
    /// 寄存器指定移位：[value, rs, carry_in] -> carry << 32 | result
    ShiftC(ShiftType),
    Clz,
    Rbit,
    Rev,
    Rev16,
    Revsh,
    /// SSAT：[value] -> result，饱和时置 Q
    SignedSat { bits: u8 },
    UnsignedSat { bits: u8 },
    SignedSat16 { bits: u8 },
    UnsignedSat16 { bits: u8 },
    /// [a, b]，饱和时置 Q
    SatArith(SatOp),
    /// [a, b]，S/U 前缀更新 GE
    Parallel { op: ParOp, kind: ParKind },
    /// [a, b]，按 GE 选择
    Sel,
    Usad8,
    DspMul(DspMulOp),

    // ---- 系统 ----
    CpsrRead,
    /// [value]
    CpsrWrite { mask: u32, kind: CpsrWriteKind },
    SpsrRead,
    SpsrWrite { mask: u32 },
    /// [new_pc]：CPSR <- SPSR，PC <- new_pc
    ExceptionReturn,
    /// LDM/STM 的 `^` 形式
    UserRegRead(u8),
    UserRegWrite(u8),
    BankedRead { r: bool, sysm: u8 },
    BankedWrite { r: bool, sysm: u8 },
    V7mMrs(u8),
    V7mMsr { sysm: u8, mask: u8 },
    /// [addr] -> value
    LoadExclusive { size: u8 },
    /// [addr, value] 或 [addr, lo, hi] (size 8) -> 0 成功 / 1 失败
    StoreExclusive { size: u8 },
    ClearExclusive,
    /// 运行时访问谓词；拒绝时产生未定义指令异常
    CpAccessCheck { key: CpRegKey, is_read: bool },
    CpRead(CpRegKey),
    /// [value] 或 [lo, hi]
    CpWrite(CpRegKey),
    Wfi,
    Wfe,
    Sev,

    // ---- 浮点与向量 ----
    /// FPU 被禁用时产生异常
    FpAccessCheck,
    Vfp(VfpCall),
    ReadS(u8),
    WriteS(u8),
    FpscrRead,
    FpscrWrite,
    FpSysRead(FpSysReg),
    FpSysWrite(FpSysReg),
    Neon(NeonCall),
    Mve(MveCall),
}

impl ArmHelper {
    /// 可能以客户机异常或等待结束执行
    pub fn may_raise(&self) -> bool {
        matches!(
            self,
            ArmHelper::CpAccessCheck { .. }
                | ArmHelper::FpAccessCheck
                | ArmHelper::Wfi
                | ArmHelper::Wfe
                | ArmHelper::Mve(_)
                | ArmHelper::SpsrRead
                | ArmHelper::SpsrWrite { .. }
                | ArmHelper::BankedRead { .. }
                | ArmHelper::BankedWrite { .. }
                | ArmHelper::LoadExclusive { .. }
                | ArmHelper::StoreExclusive { .. }
        )
    }
}

/// 辅助函数的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperResult {
    Value(u64),
    /// 客户机异常；PC 已由翻译器写回
    Raise { excp: u32, syndrome: u32 },
    /// 进入 WFI/WFE 等待
    Halt,
}

/// 辅助函数运行所需的核心外部协作者
pub struct HelperEnv<'a> {
    pub cpu: &'a mut ArmCpu,
    pub mmu: &'a mut dyn MMU,
    pub cpregs: &'a CpRegTable,
    pub monitor: &'a ExclusiveMonitor,
    pub intc: &'a mut dyn InterruptController,
}

impl HelperEnv<'_> {
    /// 以当前特权级与安全状态读；`align` 为 0 时不检查对齐
    pub fn read(&mut self, addr: u32, size: u8, align: u8) -> Result<u64, MemFault> {
        let flags = memory::current_flags(self.cpu, align);
        memory::read(self.cpu, self.mmu, addr, size, &flags)
    }

    pub fn write(&mut self, addr: u32, size: u8, value: u64, align: u8) -> Result<(), MemFault> {
        let flags = memory::current_flags(self.cpu, align);
        memory::write(self.cpu, self.mmu, self.monitor, addr, size, value, &flags)
    }
}

pub(crate) fn bad_size(size: u8) -> VmError {
    vm_core::CoreError::Internal {
        message: format!("invalid vector element size {size}"),
        module: "vm-arm-cpu::helpers".to_string(),
    }
    .into()
}

pub(crate) fn arg(args: &[u64], i: usize) -> VmResult<u64> {
    args.get(i).copied().ok_or_else(|| {
        vm_core::CoreError::Internal {
            message: format!("helper argument {i} missing"),
            module: "vm-arm-cpu::helpers".to_string(),
        }
        .into()
    })
}

fn arg32(args: &[u64], i: usize) -> VmResult<u32> {
    arg(args, i).map(|v| v as u32)
}

fn value(v: u32) -> VmResult<HelperResult> {
    Ok(HelperResult::Value(u64::from(v)))
}

fn undef() -> VmResult<HelperResult> {
    Ok(HelperResult::Raise { excp: EXCP_UDEF, syndrome: 0 })
}

fn half(v: u32, top: bool) -> i64 {
    i64::from(if top { (v >> 16) as i16 } else { v as i16 })
}

fn pair64(args: &[u64], lo: usize) -> VmResult<u64> {
    Ok(arg(args, lo)? & 0xffff_ffff | arg(args, lo + 1)? << 32)
}

fn dsp_mul(cpu: &mut ArmCpu, op: DspMulOp, args: &[u64]) -> VmResult<u64> {
    let a = arg32(args, 0)?;
    let b = arg32(args, 1)?;
    let mut q = false;
    let mut acc32 = |base: i64, acc: u32| {
        let (r, o) = (base as i32).overflowing_add(acc as i32);
        q |= o;
        u64::from(r as u32)
    };
    let r = match op {
        DspMulOp::Smulxy { n_top, m_top } => u64::from((half(a, n_top) * half(b, m_top)) as u32),
        DspMulOp::Smlaxy { n_top, m_top } => acc32(half(a, n_top) * half(b, m_top), arg32(args, 2)?),
        DspMulOp::Smulwy { m_top } => u64::from(((i64::from(a as i32) * half(b, m_top)) >> 16) as u32),
        DspMulOp::Smlawy { m_top } => acc32((i64::from(a as i32) * half(b, m_top)) >> 16, arg32(args, 2)?),
        DspMulOp::Smlalxy { n_top, m_top } => {
            (pair64(args, 2)? as i64).wrapping_add(half(a, n_top) * half(b, m_top)) as u64
        }
        DspMulOp::Smuad { swap, sub } => {
            let b = if swap { b.rotate_right(16) } else { b };
            let p1 = half(a, false) * half(b, false);
            let p2 = half(a, true) * half(b, true);
            if sub {
                u64::from((p1 - p2) as u32)
            } else {
                // 只有 0x8000*0x8000 两次相加会溢出
                let s = p1 + p2;
                q |= s > i64::from(i32::MAX);
                u64::from(s as u32)
            }
        }
        DspMulOp::Smlad { swap, sub } => {
            let b = if swap { b.rotate_right(16) } else { b };
            let p1 = half(a, false) * half(b, false);
            let p2 = half(a, true) * half(b, true);
            let s = if sub { p1 - p2 } else { p1 + p2 };
            let acc = i64::from(arg32(args, 2)? as i32);
            let total = s + acc;
            q |= total != i64::from(total as i32) || s != i64::from(s as i32);
            u64::from(total as u32)
        }
        DspMulOp::Smlald { swap, sub } => {
            let b = if swap { b.rotate_right(16) } else { b };
            let p1 = half(a, false) * half(b, false);
            let p2 = half(a, true) * half(b, true);
            let s = if sub { p1 - p2 } else { p1 + p2 };
            (pair64(args, 2)? as i64).wrapping_add(s) as u64
        }
        DspMulOp::Smmul { round } => {
            let p = i64::from(a as i32) * i64::from(b as i32) + if round { 0x8000_0000 } else { 0 };
            u64::from((p >> 32) as u32)
        }
        DspMulOp::Smmla { round, sub } => {
            let acc = i64::from(arg32(args, 2)? as i32) << 32;
            let p = i64::from(a as i32) * i64::from(b as i32);
            let r = if sub { acc.wrapping_sub(p) } else { acc.wrapping_add(p) };
            let r = r.wrapping_add(if round { 0x8000_0000 } else { 0 });
            u64::from((r >> 32) as u32)
        }
        DspMulOp::Umaal => {
            u64::from(a) * u64::from(b) + (arg(args, 2)? & 0xffff_ffff) + (arg(args, 3)? & 0xffff_ffff)
        }
    };
    if q {
        cpu.qf = true;
    }
    Ok(r)
}

fn sat16(value: u32, bits: u8, signed: bool) -> (u32, bool) {
    let mut q = false;
    let mut out = 0u32;
    for i in 0..2 {
        let h = i64::from(((value >> (16 * i)) as u16) as i16);
        let (r, sat) = if signed {
            let (r, s) = signed_sat_q(h, u32::from(bits));
            (r as u32, s)
        } else {
            unsigned_sat_q(h, u32::from(bits))
        };
        q |= sat;
        out |= (r & 0xffff) << (16 * i);
    }
    (out, q)
}

fn exclusive_addr(env: &mut HelperEnv<'_>, addr: u32, size: u8) -> Result<u64, MemFault> {
    let flags = memory::current_flags(env.cpu, size);
    let pa = memory::translate(env.cpu, env.mmu, addr, AccessType::Atomic, &flags)?;
    Ok(pa.0)
}

/// 执行一个辅助函数
pub fn call_helper(env: &mut HelperEnv<'_>, helper: &ArmHelper, args: &[u64]) -> VmResult<HelperResult> {
    match *helper {
        ArmHelper::ShiftC(ty) => {
            let (r, c) = shift_reg_c(arg32(args, 0)?, ty, arg32(args, 1)?, arg(args, 2)? & 1 != 0);
            Ok(HelperResult::Value(u64::from(r) | u64::from(c) << 32))
        }
        ArmHelper::Clz => value(arg32(args, 0)?.leading_zeros()),
        ArmHelper::Rbit => value(arg32(args, 0)?.reverse_bits()),
        ArmHelper::Rev => value(arg32(args, 0)?.swap_bytes()),
        ArmHelper::Rev16 => value(bits::rev16(arg32(args, 0)?)),
        ArmHelper::Revsh => value(bits::revsh(arg32(args, 0)?)),
        ArmHelper::SignedSat { bits } => {
            let (r, q) = signed_sat_q(i64::from(arg32(args, 0)? as i32), u32::from(bits));
            env.cpu.qf |= q;
            value(r as u32)
        }
        ArmHelper::UnsignedSat { bits } => {
            let (r, q) = unsigned_sat_q(i64::from(arg32(args, 0)? as i32), u32::from(bits));
            env.cpu.qf |= q;
            value(r)
        }
        ArmHelper::SignedSat16 { bits } => {
            let (r, q) = sat16(arg32(args, 0)?, bits, true);
            env.cpu.qf |= q;
            value(r)
        }
        ArmHelper::UnsignedSat16 { bits } => {
            let (r, q) = sat16(arg32(args, 0)?, bits, false);
            env.cpu.qf |= q;
            value(r)
        }
        ArmHelper::SatArith(op) => {
            let a = arg32(args, 0)? as i32;
            let b = arg32(args, 1)? as i32;
            let (r, q) = match op {
                SatOp::Add => sat_add_i32(a, b),
                SatOp::Sub => sat_sub_i32(a, b),
                SatOp::DoubleAdd | SatOp::DoubleSub => {
                    let (d, q1) = sat_add_i32(b, b);
                    let (r, q2) = if op == SatOp::DoubleAdd { sat_add_i32(a, d) } else { sat_sub_i32(a, d) };
                    (r, q1 || q2)
                }
            };
            env.cpu.qf |= q;
            value(r as u32)
        }
        ArmHelper::Parallel { op, kind } => {
            let (r, ge) = parallel_add_sub(op, kind, arg32(args, 0)?, arg32(args, 1)?);
            if kind.sets_ge() {
                env.cpu.ge = ge;
            }
            value(r)
        }
        ArmHelper::Sel => value(select_bytes(env.cpu.ge, arg32(args, 0)?, arg32(args, 1)?)),
        ArmHelper::Usad8 => value(usad8(arg32(args, 0)?, arg32(args, 1)?)),
        ArmHelper::DspMul(op) => Ok(HelperResult::Value(dsp_mul(env.cpu, op, args)?)),

        ArmHelper::CpsrRead => value(env.cpu.cpsr() & !(crate::psr::CPSR_EXEC)),
        ArmHelper::CpsrWrite { mask, kind } => {
            env.cpu.cpsr_write(arg32(args, 0)?, mask, kind)?;
            Ok(HelperResult::Value(0))
        }
        ArmHelper::SpsrRead => {
            if !env.cpu.mode().has_spsr() {
                return undef();
            }
            value(env.cpu.spsr)
        }
        ArmHelper::SpsrWrite { mask } => {
            if !env.cpu.mode().has_spsr() {
                return undef();
            }
            let v = arg32(args, 0)?;
            env.cpu.spsr = (env.cpu.spsr & !mask) | (v & mask);
            Ok(HelperResult::Value(0))
        }
        ArmHelper::ExceptionReturn => {
            env.cpu.exception_return(arg32(args, 0)?)?;
            Ok(HelperResult::Value(0))
        }
        ArmHelper::UserRegRead(n) => value(env.cpu.user_reg(u32::from(n))?),
        ArmHelper::UserRegWrite(n) => {
            env.cpu.set_user_reg(u32::from(n), arg32(args, 0)?)?;
            Ok(HelperResult::Value(0))
        }
        ArmHelper::BankedRead { r, sysm } => match decode_banked_sysm(r, u32::from(sysm)) {
            Some((mode, reg)) if mode != env.cpu.mode() || reg == crate::banked::BankedReg::Spsr => {
                value(env.cpu.mrs_banked(mode, reg)?)
            }
            _ => undef(),
        },
        ArmHelper::BankedWrite { r, sysm } => match decode_banked_sysm(r, u32::from(sysm)) {
            Some((mode, reg)) if mode != env.cpu.mode() || reg == crate::banked::BankedReg::Spsr => {
                env.cpu.msr_banked(mode, reg, arg32(args, 0)?)?;
                Ok(HelperResult::Value(0))
            }
            _ => undef(),
        },
        ArmHelper::V7mMrs(sysm) => value(env.cpu.v7m_mrs(u32::from(sysm))),
        ArmHelper::V7mMsr { sysm, mask } => {
            env.cpu.v7m_msr(u32::from(sysm), u32::from(mask), arg32(args, 0)?);
            Ok(HelperResult::Value(0))
        }

        ArmHelper::LoadExclusive { size } => {
            let addr = arg32(args, 0)?;
            let pa = match exclusive_addr(env, addr, size) {
                Ok(pa) => pa,
                Err(fault) => return fault.into_helper_result(),
            };
            match env.monitor.load_exclusive(&*env.mmu, pa, size) {
                Ok(v) => Ok(HelperResult::Value(v)),
                Err(e) => MemFault::classify(e, addr).into_helper_result(),
            }
        }
        ArmHelper::StoreExclusive { size } => {
            let addr = arg32(args, 0)?;
            let data = if size == 8 { pair64(args, 1)? } else { arg(args, 1)? };
            let pa = match exclusive_addr(env, addr, size) {
                Ok(pa) => pa,
                Err(fault) => {
                    env.monitor.clear_exclusive();
                    return fault.into_helper_result();
                }
            };
            match env.monitor.store_exclusive(&mut *env.mmu, pa, size, data) {
                Ok(ok) => Ok(HelperResult::Value(u64::from(!ok))),
                Err(e) => MemFault::classify(e, addr).into_helper_result(),
            }
        }
        ArmHelper::ClearExclusive => {
            env.monitor.clear_exclusive();
            Ok(HelperResult::Value(0))
        }

        ArmHelper::CpAccessCheck { key, is_read } => {
            let el = env.cpu.current_el();
            match env.cpregs.resolve(&key) {
                Ok(Resolution::Register(d)) => match d.check_access(env.cpu, el, is_read) {
                    CpAccessResult::Ok => Ok(HelperResult::Value(0)),
                    CpAccessResult::TrapUndefined => undef(),
                    CpAccessResult::TrapUnsupported => {
                        Err(VmError::unsupported(format!("trapped access to {}", d.name), "vm-arm-cpu::cpreg"))
                    }
                },
                _ => Ok(HelperResult::Value(0)),
            }
        }
        ArmHelper::CpRead(key) => {
            let v = match env.cpregs.resolve(&key) {
                Ok(Resolution::Register(d)) => d.read_value(env.cpu),
                Ok(Resolution::Legacy(_)) => 0,
                Err(e) if !e.is_fatal() => 0,
                Err(e) => return Err(e),
            };
            Ok(HelperResult::Value(v))
        }
        ArmHelper::CpWrite(key) => {
            let v = if key.is64 { pair64(args, 0)? } else { arg(args, 0)? };
            match env.cpregs.resolve(&key) {
                Ok(Resolution::Register(d)) => d.write_value(env.cpu, v),
                Ok(Resolution::Legacy(crate::cpreg::LegacyOp::TlbInvalidate)) => env.cpu.tlb_flush_pending = true,
                Ok(Resolution::Legacy(_)) => {}
                Err(e) if !e.is_fatal() => {}
                Err(e) => return Err(e),
            }
            Ok(HelperResult::Value(0))
        }
        ArmHelper::Wfi => {
            if env.intc.has_pending() {
                return Ok(HelperResult::Value(0));
            }
            env.cpu.wait = WaitState::WaitForInterrupt;
            Ok(HelperResult::Halt)
        }
        ArmHelper::Wfe => {
            env.cpu.wait_for_event();
            if env.cpu.wait == WaitState::Running {
                Ok(HelperResult::Value(0))
            } else {
                Ok(HelperResult::Halt)
            }
        }
        ArmHelper::Sev => {
            env.cpu.event_register = true;
            env.intc.send_event();
            Ok(HelperResult::Value(0))
        }

        ArmHelper::FpAccessCheck => {
            if env.cpu.vfp_enabled() {
                Ok(HelperResult::Value(0))
            } else if env.cpu.is_m_profile() {
                Ok(HelperResult::Raise { excp: EXCP_NOCP, syndrome: 0 })
            } else {
                undef()
            }
        }
        ArmHelper::Vfp(call) => {
            vfp::execute(env.cpu, &call);
            Ok(HelperResult::Value(0))
        }
        ArmHelper::ReadS(n) => value(env.cpu.vfp.s(usize::from(n))),
        ArmHelper::WriteS(n) => {
            env.cpu.vfp.set_s(usize::from(n), arg32(args, 0)?);
            Ok(HelperResult::Value(0))
        }
        ArmHelper::FpscrRead => value(vfp::read_fpscr(env.cpu)),
        ArmHelper::FpscrWrite => {
            vfp::write_fpscr(env.cpu, arg32(args, 0)?);
            Ok(HelperResult::Value(0))
        }
        ArmHelper::FpSysRead(reg) => value(vfp::read_sys(env.cpu, reg)),
        ArmHelper::FpSysWrite(reg) => {
            vfp::write_sys(env.cpu, reg, arg32(args, 0)?);
            Ok(HelperResult::Value(0))
        }
        ArmHelper::Neon(call) => {
            neon::execute(env.cpu, &call, args)?;
            Ok(HelperResult::Value(0))
        }
        ArmHelper::Mve(call) => mve::execute(env, &call, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CpuModel;

    #[test]
    fn test_dsp_mul_saturation() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        // SMLABB 溢出置 Q
        let r = dsp_mul(&mut cpu, DspMulOp::Smlaxy { n_top: false, m_top: false }, &[0x7fff, 0x7fff, 0x7fff_ffff])
            .unwrap();
        assert_eq!(r as u32, 0x7fff_ffffu32.wrapping_add(0x3fff_0001));
        assert!(cpu.qf);

        cpu.qf = false;
        let r = dsp_mul(&mut cpu, DspMulOp::Smuad { swap: false, sub: false }, &[0x8000_8000, 0x8000_8000]).unwrap();
        assert_eq!(r as u32, 0x8000_0000);
        assert!(cpu.qf);

        let r = dsp_mul(&mut cpu, DspMulOp::Umaal, &[0xffff_ffff, 0xffff_ffff, 0xffff_ffff, 0xffff_ffff]).unwrap();
        assert_eq!(r, u64::MAX);

        let r = dsp_mul(&mut cpu, DspMulOp::Smmul { round: true }, &[0x4000_0000, 0x0000_0003]).unwrap();
        assert_eq!(r as u32, 1);
    }

    #[test]
    fn test_sat16() {
        assert_eq!(sat16(0x7fff_8000, 8, true), (0x007f_ff80, true));
        assert_eq!(sat16(0x0005_fffb, 4, false), (0x0005_0000, true));
    }
}
