//! 浮点/向量寄存器文件
//!
//! 32 个 64 位 D 寄存器，S 寄存器与 Q 寄存器是它的别名视图。
//! FPSCR 的累积异常位与控制位单独保存，读时拼装。

use crate::softfp::{FloatStatus, FpExc, RoundingMode};

pub const FPSCR_IOC: u32 = 1 << 0;
pub const FPSCR_DZC: u32 = 1 << 1;
pub const FPSCR_OFC: u32 = 1 << 2;
pub const FPSCR_UFC: u32 = 1 << 3;
pub const FPSCR_IXC: u32 = 1 << 4;
pub const FPSCR_IDC: u32 = 1 << 7;
pub const FPSCR_LEN_SHIFT: u32 = 16;
pub const FPSCR_STRIDE_SHIFT: u32 = 20;
pub const FPSCR_RMODE_SHIFT: u32 = 22;
pub const FPSCR_FZ: u32 = 1 << 24;
pub const FPSCR_DN: u32 = 1 << 25;
pub const FPSCR_AHP: u32 = 1 << 26;
pub const FPSCR_QC: u32 = 1 << 27;
pub const FPSCR_NZCV: u32 = 0xf << 28;
const FPSCR_CUMULATIVE: u32 = FPSCR_IOC | FPSCR_DZC | FPSCR_OFC | FPSCR_UFC | FPSCR_IXC | FPSCR_IDC;

pub const FPEXC_EN: u32 = 1 << 30;

pub const VPR_P0_MASK: u32 = 0xffff;
pub const VPR_MASK01_SHIFT: u32 = 16;
pub const VPR_MASK23_SHIFT: u32 = 20;

/// 循环尾部预测关闭时的 LTPSIZE
pub const LTPSIZE_NONE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpRegs {
    pub d: [u64; 32],
    /// 除累积异常位之外的 FPSCR
    fpscr: u32,
    cumulative: FpExc,
    pub fpexc: u32,
    pub fpsid: u32,
    pub mvfr0: u32,
    pub mvfr1: u32,
    pub mvfr2: u32,
    /// MVE 向量谓词寄存器
    pub vpr: u32,
    /// v8.1-M 尾部预测元素大小
    pub ltpsize: u8,
}

impl Default for FpRegs {
    fn default() -> Self {
        Self {
            d: [0; 32],
            fpscr: 0,
            cumulative: FpExc::empty(),
            fpexc: 0,
            fpsid: 0,
            mvfr0: 0,
            mvfr1: 0,
            mvfr2: 0,
            vpr: 0,
            ltpsize: LTPSIZE_NONE,
        }
    }
}

impl FpRegs {
    pub fn s(&self, n: usize) -> u32 {
        let d = self.d[n >> 1];
        if n & 1 == 0 { d as u32 } else { (d >> 32) as u32 }
    }

    pub fn set_s(&mut self, n: usize, v: u32) {
        let d = &mut self.d[n >> 1];
        if n & 1 == 0 {
            *d = (*d & 0xffff_ffff_0000_0000) | u64::from(v);
        } else {
            *d = (*d & 0xffff_ffff) | (u64::from(v) << 32);
        }
    }

    pub fn q(&self, n: usize) -> [u64; 2] {
        [self.d[2 * n], self.d[2 * n + 1]]
    }

    pub fn set_q(&mut self, n: usize, v: [u64; 2]) {
        self.d[2 * n] = v[0];
        self.d[2 * n + 1] = v[1];
    }

    /// 完整 FPSCR；`ltpsize_in_fpscr` 为 M-profile LOB 时 LTPSIZE 出现在 [18:16]
    pub fn fpscr(&self, ltpsize_in_fpscr: bool) -> u32 {
        let mut v = self.fpscr | exc_to_fpscr(self.cumulative);
        if ltpsize_in_fpscr {
            v = (v & !(7 << 16)) | (u32::from(self.ltpsize) << 16);
        }
        v
    }

    pub fn set_fpscr(&mut self, v: u32, ltpsize_in_fpscr: bool) {
        self.cumulative = fpscr_to_exc(v);
        self.fpscr = v & !FPSCR_CUMULATIVE;
        if ltpsize_in_fpscr {
            self.ltpsize = ((v >> 16) & 7) as u8;
            self.fpscr &= !(7 << 16);
        }
    }

    pub fn nzcv(&self) -> u32 {
        self.fpscr & FPSCR_NZCV
    }

    pub fn set_nzcv(&mut self, nzcv: u32) {
        self.fpscr = (self.fpscr & !FPSCR_NZCV) | (nzcv & FPSCR_NZCV);
    }

    pub fn set_qc(&mut self) {
        self.fpscr |= FPSCR_QC;
    }

    /// 旧式短向量长度 (LEN+1)
    pub fn vec_len(&self) -> u8 {
        (((self.fpscr >> FPSCR_LEN_SHIFT) & 7) + 1) as u8
    }

    /// 旧式短向量步长 (1 或 2)
    pub fn vec_stride(&self) -> u8 {
        if (self.fpscr >> FPSCR_STRIDE_SHIFT) & 3 == 3 { 2 } else { 1 }
    }

    pub fn enabled(&self) -> bool {
        self.fpexc & FPEXC_EN != 0
    }

    /// 由 FPSCR 控制位构造运算状态
    pub fn float_status(&self, standard: bool) -> FloatStatus {
        let rounding = if standard {
            RoundingMode::NearestEven
        } else {
            RoundingMode::from_rmode((self.fpscr >> FPSCR_RMODE_SHIFT) & 3)
        };
        FloatStatus {
            flags: FpExc::empty(),
            rounding,
            default_nan: standard || self.fpscr & FPSCR_DN != 0,
            flush_to_zero: standard || self.fpscr & FPSCR_FZ != 0,
        }
    }

    /// 合并一次运算产生的异常到累积位
    pub fn accumulate(&mut self, status: &FloatStatus) {
        self.cumulative |= status.flags;
    }

    pub fn vpr_p0(&self) -> u16 {
        (self.vpr & VPR_P0_MASK) as u16
    }

    pub fn vpr_mask01(&self) -> u32 {
        (self.vpr >> VPR_MASK01_SHIFT) & 0xf
    }

    pub fn vpr_mask23(&self) -> u32 {
        (self.vpr >> VPR_MASK23_SHIFT) & 0xf
    }
}

fn exc_to_fpscr(exc: FpExc) -> u32 {
    let mut v = 0;
    if exc.contains(FpExc::INVALID) {
        v |= FPSCR_IOC;
    }
    if exc.contains(FpExc::DIVBYZERO) {
        v |= FPSCR_DZC;
    }
    if exc.contains(FpExc::OVERFLOW) {
        v |= FPSCR_OFC;
    }
    if exc.contains(FpExc::UNDERFLOW) {
        v |= FPSCR_UFC;
    }
    if exc.contains(FpExc::INEXACT) {
        v |= FPSCR_IXC;
    }
    if exc.contains(FpExc::INPUT_DENORMAL) {
        v |= FPSCR_IDC;
    }
    v
}

fn fpscr_to_exc(v: u32) -> FpExc {
    let mut exc = FpExc::empty();
    exc.set(FpExc::INVALID, v & FPSCR_IOC != 0);
    exc.set(FpExc::DIVBYZERO, v & FPSCR_DZC != 0);
    exc.set(FpExc::OVERFLOW, v & FPSCR_OFC != 0);
    exc.set(FpExc::UNDERFLOW, v & FPSCR_UFC != 0);
    exc.set(FpExc::INEXACT, v & FPSCR_IXC != 0);
    exc.set(FpExc::INPUT_DENORMAL, v & FPSCR_IDC != 0);
    exc
}
