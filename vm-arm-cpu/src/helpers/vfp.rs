//! VFP 标量运算
//!
//! 每次调用只处理一个元素；短向量 (FPSCR.LEN/STRIDE) 由翻译器展开成
//! 多次调用，寄存器编号在翻译期已按组回绕。

use crate::features::ArmFeatures;
use crate::fpregs::{FPEXC_EN, FPSCR_NZCV, FPSCR_QC};
use crate::softfp::{self, FloatStatus, FpFormat, RoundingMode};
use crate::state::ArmCpu;

/// FPSCR 中可写的位
const FPSCR_WRITABLE: u32 = 0xfff7_009f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfpOp {
    Add,
    Sub,
    Mul,
    Nmul,
    Div,
    /// 非融合 Vd + Vn*Vm
    Mla,
    Mls,
    Nmla,
    Nmls,
    /// 融合乘加族
    Fma,
    Fms,
    Fnma,
    Fnms,
    Abs,
    Neg,
    Sqrt,
    Mov,
    /// Vd 与 Vm (或 0) 比较，结果写 FPSCR.NZCV
    Cmp { signal_nans: bool, with_zero: bool },
    /// 源精度由 `dp` 给出，目的是另一种精度
    CvtPrecision,
    /// Sd <- int(Vm)
    ToInt { signed: bool, round_zero: bool },
    /// Vd <- float(Sm)
    FromInt { signed: bool },
}

/// 一次 VFP 运算；`dp` 为真时寄存器号指 D 寄存器，否则指 S 寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VfpCall {
    pub op: VfpOp,
    pub dp: bool,
    pub vd: u8,
    pub vn: u8,
    pub vm: u8,
}

/// VMRS/VMSR 可访问的其他浮点系统寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpSysReg {
    Fpsid,
    Fpexc,
    Mvfr0,
    Mvfr1,
    Mvfr2,
    /// FPSCR_nzcvqc
    FpscrNzcvqc,
    Vpr,
    P0,
}

fn get<F: FpFormat>(cpu: &ArmCpu, dp: bool, idx: u8) -> F {
    let idx = usize::from(idx);
    if dp { F::from_raw(cpu.vfp.d[idx]) } else { F::from_raw(u64::from(cpu.vfp.s(idx))) }
}

fn set<F: FpFormat>(cpu: &mut ArmCpu, dp: bool, idx: u8, v: F) {
    let idx = usize::from(idx);
    if dp {
        cpu.vfp.d[idx] = v.raw();
    } else {
        cpu.vfp.set_s(idx, v.raw() as u32);
    }
}

fn arith<F: FpFormat>(cpu: &mut ArmCpu, call: &VfpCall, st: &mut FloatStatus) {
    let dp = call.dp;
    let n: F = get(cpu, dp, call.vn);
    let m: F = get(cpu, dp, call.vm);
    let d: F = get(cpu, dp, call.vd);
    let r = match call.op {
        VfpOp::Add => softfp::add(n, m, st),
        VfpOp::Sub => softfp::sub(n, m, st),
        VfpOp::Mul => softfp::mul(n, m, st),
        VfpOp::Nmul => softfp::neg(softfp::mul(n, m, st)),
        VfpOp::Div => softfp::div(n, m, st),
        VfpOp::Mla => {
            let p = softfp::mul(n, m, st);
            softfp::add(d, p, st)
        }
        VfpOp::Mls => {
            let p = softfp::mul(n, m, st);
            softfp::add(d, softfp::neg(p), st)
        }
        VfpOp::Nmla => {
            let p = softfp::mul(n, m, st);
            softfp::add(softfp::neg(d), softfp::neg(p), st)
        }
        VfpOp::Nmls => {
            let p = softfp::mul(n, m, st);
            softfp::add(softfp::neg(d), p, st)
        }
        VfpOp::Fma => softfp::mul_add(d, n, m, st),
        VfpOp::Fms => softfp::mul_add(d, softfp::neg(n), m, st),
        VfpOp::Fnma => softfp::mul_add(softfp::neg(d), softfp::neg(n), m, st),
        VfpOp::Fnms => softfp::mul_add(softfp::neg(d), n, m, st),
        VfpOp::Abs => softfp::abs(m),
        VfpOp::Neg => softfp::neg(m),
        VfpOp::Sqrt => softfp::sqrt(m, st),
        VfpOp::Mov => m,
        VfpOp::Cmp { signal_nans, with_zero } => {
            let b = if with_zero { F::zero() } else { m };
            let nzcv = softfp::compare(d, b, signal_nans, st);
            cpu.vfp.set_nzcv(nzcv);
            return;
        }
        VfpOp::ToInt { signed, round_zero } => {
            let mode = if round_zero { RoundingMode::Zero } else { st.rounding };
            let v = softfp::to_int(m, signed, mode, st);
            cpu.vfp.set_s(usize::from(call.vd), v);
            return;
        }
        VfpOp::FromInt { signed } => {
            let v = cpu.vfp.s(usize::from(call.vm));
            softfp::from_int(v, signed, st)
        }
        VfpOp::CvtPrecision => return,
    };
    set(cpu, dp, call.vd, r);
}

pub fn execute(cpu: &mut ArmCpu, call: &VfpCall) {
    let mut st = cpu.vfp.float_status(false);
    match (call.op, call.dp) {
        (VfpOp::CvtPrecision, true) => {
            let x: f64 = get(cpu, true, call.vm);
            let r = softfp::f64_to_f32(x, &mut st);
            set(cpu, false, call.vd, r);
        }
        (VfpOp::CvtPrecision, false) => {
            let x: f32 = get(cpu, false, call.vm);
            let r = softfp::f32_to_f64(x, &mut st);
            set(cpu, true, call.vd, r);
        }
        (_, true) => arith::<f64>(cpu, call, &mut st),
        (_, false) => arith::<f32>(cpu, call, &mut st),
    }
    cpu.vfp.accumulate(&st);
}

fn ltpsize_in_fpscr(cpu: &ArmCpu) -> bool {
    cpu.is_m_profile() && cpu.has_feature(ArmFeatures::LOB)
}

pub fn read_fpscr(cpu: &ArmCpu) -> u32 {
    cpu.vfp.fpscr(ltpsize_in_fpscr(cpu))
}

pub fn write_fpscr(cpu: &mut ArmCpu, value: u32) {
    let ltp = ltpsize_in_fpscr(cpu);
    cpu.vfp.set_fpscr(value & FPSCR_WRITABLE, ltp);
}

pub fn read_sys(cpu: &ArmCpu, reg: FpSysReg) -> u32 {
    match reg {
        FpSysReg::Fpsid => cpu.vfp.fpsid,
        FpSysReg::Fpexc => cpu.vfp.fpexc,
        FpSysReg::Mvfr0 => cpu.vfp.mvfr0,
        FpSysReg::Mvfr1 => cpu.vfp.mvfr1,
        FpSysReg::Mvfr2 => cpu.vfp.mvfr2,
        FpSysReg::FpscrNzcvqc => read_fpscr(cpu) & (FPSCR_NZCV | FPSCR_QC),
        FpSysReg::Vpr => cpu.vfp.vpr,
        FpSysReg::P0 => u32::from(cpu.vfp.vpr_p0()),
    }
}

pub fn write_sys(cpu: &mut ArmCpu, reg: FpSysReg, value: u32) {
    match reg {
        // 只读
        FpSysReg::Fpsid | FpSysReg::Mvfr0 | FpSysReg::Mvfr1 | FpSysReg::Mvfr2 => {}
        FpSysReg::Fpexc => cpu.vfp.fpexc = (cpu.vfp.fpexc & !FPEXC_EN) | (value & FPEXC_EN),
        FpSysReg::FpscrNzcvqc => {
            let mask = FPSCR_NZCV | FPSCR_QC;
            let v = (read_fpscr(cpu) & !mask) | (value & mask);
            write_fpscr(cpu, v);
        }
        FpSysReg::Vpr => cpu.vfp.vpr = value & 0x00ff_ffff,
        FpSysReg::P0 => cpu.vfp.vpr = (cpu.vfp.vpr & !0xffff) | (value & 0xffff),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CpuModel;
    use crate::fpregs::{FPSCR_IOC, FPSCR_IXC};

    fn cpu() -> ArmCpu {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        cpu.set_fpu_enabled(true).unwrap();
        cpu
    }

    fn call(op: VfpOp, dp: bool, vd: u8, vn: u8, vm: u8) -> VfpCall {
        VfpCall { op, dp, vd, vn, vm }
    }

    #[test]
    fn test_single_precision_add() {
        let mut c = cpu();
        c.vfp.set_s(1, 1.5f32.to_bits());
        c.vfp.set_s(2, 2.25f32.to_bits());
        execute(&mut c, &call(VfpOp::Add, false, 0, 1, 2));
        assert_eq!(f32::from_bits(c.vfp.s(0)), 3.75);
        // S1 是 D0 的高半，不应被写到
        assert_eq!(c.vfp.s(1), 1.5f32.to_bits());
    }

    #[test]
    fn test_nmla_and_fnms_double() {
        let mut c = cpu();
        c.vfp.d[0] = 10.0f64.to_bits();
        c.vfp.d[1] = 2.0f64.to_bits();
        c.vfp.d[2] = 3.0f64.to_bits();
        execute(&mut c, &call(VfpOp::Nmla, true, 0, 1, 2));
        assert_eq!(f64::from_bits(c.vfp.d[0]), -16.0);

        c.vfp.d[0] = 10.0f64.to_bits();
        execute(&mut c, &call(VfpOp::Fnms, true, 0, 1, 2));
        assert_eq!(f64::from_bits(c.vfp.d[0]), -4.0);
    }

    #[test]
    fn test_compare_sets_fpscr_flags() {
        let mut c = cpu();
        c.vfp.set_s(0, 1.0f32.to_bits());
        execute(&mut c, &call(VfpOp::Cmp { signal_nans: false, with_zero: true }, false, 0, 0, 0));
        assert_eq!(c.vfp.nzcv() >> 28, 0b0010);

        c.vfp.set_s(1, f32::NAN.to_bits());
        execute(&mut c, &call(VfpOp::Cmp { signal_nans: true, with_zero: false }, false, 0, 0, 1));
        assert_eq!(c.vfp.nzcv() >> 28, 0b0011);
        assert_ne!(read_fpscr(&c) & FPSCR_IOC, 0);
    }

    #[test]
    fn test_conversions() {
        let mut c = cpu();
        c.vfp.set_s(2, (-2.75f32).to_bits());
        execute(&mut c, &call(VfpOp::ToInt { signed: true, round_zero: true }, false, 0, 0, 2));
        assert_eq!(c.vfp.s(0) as i32, -2);
        assert_ne!(read_fpscr(&c) & FPSCR_IXC, 0);

        c.vfp.set_s(4, 7);
        execute(&mut c, &call(VfpOp::FromInt { signed: false }, true, 5, 0, 4));
        assert_eq!(f64::from_bits(c.vfp.d[5]), 7.0);

        execute(&mut c, &call(VfpOp::CvtPrecision, true, 6, 0, 5));
        assert_eq!(f32::from_bits(c.vfp.s(6)), 7.0);
    }

    #[test]
    fn test_fpscr_write_mask() {
        let mut c = cpu();
        write_fpscr(&mut c, 0xffff_ffff);
        assert_eq!(read_fpscr(&c), FPSCR_WRITABLE);
        write_sys(&mut c, FpSysReg::FpscrNzcvqc, 0);
        assert_eq!(read_fpscr(&c) & (FPSCR_NZCV | FPSCR_QC), 0);
        write_sys(&mut c, FpSysReg::Fpsid, 0x1234);
        assert_ne!(read_sys(&c, FpSysReg::Fpsid), 0x1234);
    }
}
