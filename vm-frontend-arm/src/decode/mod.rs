//! 指令解码
//!
//! 三种编码 (A32、T16、T32) 都解码为同一个带标签的 [`Insn`]，IR 发射只
//! 依赖 `Insn` 而不关心原始编码。解码失败 (未分配编码、UNPREDICTABLE 的
//! 写回冲突、特性缺失) 统一报告为 `IllegalInstruction`。

pub mod arm;
pub mod thumb16;
pub mod thumb32;

use vm_arm_cpu::bits::{Cond, ParKind, ParOp, ShiftType};
use vm_arm_cpu::helpers::{DspMulOp, SatOp};
use vm_arm_cpu::ArmFeatures;
use vm_core::{GuestAddr, VmError, VmResult};

use crate::mve::{LobInsn, MveInsn};
use crate::neon::NeonInsn;
use crate::vfp::VfpInsn;

/// 数据处理操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DpOp {
    And,
    Eor,
    Sub,
    Rsb,
    Add,
    Adc,
    Sbc,
    Rsc,
    Tst,
    Teq,
    Cmp,
    Cmn,
    Orr,
    Mov,
    Bic,
    Mvn,
    /// 仅 Thumb-2
    Orn,
}

impl DpOp {
    pub fn from_a32(op: u32) -> DpOp {
        const OPS: [DpOp; 16] = [
            DpOp::And,
            DpOp::Eor,
            DpOp::Sub,
            DpOp::Rsb,
            DpOp::Add,
            DpOp::Adc,
            DpOp::Sbc,
            DpOp::Rsc,
            DpOp::Tst,
            DpOp::Teq,
            DpOp::Cmp,
            DpOp::Cmn,
            DpOp::Orr,
            DpOp::Mov,
            DpOp::Bic,
            DpOp::Mvn,
        ];
        OPS[(op & 0xf) as usize]
    }

    /// 只设置标志、不写 Rd
    pub fn is_test(self) -> bool {
        matches!(self, DpOp::Tst | DpOp::Teq | DpOp::Cmp | DpOp::Cmn)
    }

    /// 逻辑运算，C 取移位器进位
    pub fn is_logical(self) -> bool {
        matches!(
            self,
            DpOp::And | DpOp::Eor | DpOp::Tst | DpOp::Teq | DpOp::Orr | DpOp::Mov | DpOp::Bic | DpOp::Mvn | DpOp::Orn
        )
    }

    /// 不读 Rn
    pub fn is_move(self) -> bool {
        matches!(self, DpOp::Mov | DpOp::Mvn)
    }
}

/// 第二操作数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand2 {
    /// 已展开的立即数；`carry` 为旋转后的移位器进位，不旋转时为 `None`
    Imm { value: u32, carry: Option<bool> },
    /// 立即数移位的寄存器 (RRX 的 amount 为 1)
    Shifted { rm: u8, shift: ShiftType, amount: u8 },
    /// 寄存器指定移位量
    RegShift { rm: u8, shift: ShiftType, rs: u8 },
}

impl Operand2 {
    pub fn reg(rm: u8) -> Self {
        Operand2::Shifted { rm, shift: ShiftType::Lsl, amount: 0 }
    }

    pub fn imm(value: u32) -> Self {
        Operand2::Imm { value, carry: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MulOp {
    Mul,
    Mla,
    Mls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendSize {
    Byte,
    Half,
    /// 两个半字各取低字节
    Byte16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevKind {
    Rev,
    Rev16,
    Revsh,
    Rbit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitfieldOp {
    Bfc,
    Bfi,
    Ubfx,
    Sbfx,
}

/// 访存偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemOffset {
    Imm(u32),
    Reg { rm: u8, shift: ShiftType, amount: u8 },
}

/// P/U/W 三位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrMode {
    /// 先加偏移再访问
    pub index: bool,
    pub add: bool,
    pub wback: bool,
}

impl AddrMode {
    pub const OFFSET: AddrMode = AddrMode { index: true, add: true, wback: false };

    pub fn from_puw(p: bool, u: bool, w: bool) -> Self {
        // 后变址总是写回
        Self { index: p, add: u, wback: !p || w }
    }
}

/// 单寄存器访存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemAccess {
    pub load: bool,
    /// 字节数
    pub size: u8,
    pub signed: bool,
    pub rt: u8,
    pub rn: u8,
    pub offset: MemOffset,
    pub mode: AddrMode,
    /// LDRT/STRT 族
    pub unpriv: bool,
}

/// 多寄存器访存的地址方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMode {
    /// 后增
    Ia,
    /// 先增
    Ib,
    /// 后减
    Da,
    /// 先减
    Db,
}

impl BlockMode {
    pub fn from_pu(p: bool, u: bool) -> Self {
        match (p, u) {
            (false, true) => BlockMode::Ia,
            (true, true) => BlockMode::Ib,
            (false, false) => BlockMode::Da,
            (true, false) => BlockMode::Db,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsrSrc {
    Imm(u32),
    Reg(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintOp {
    Nop,
    Yield,
    Wfe,
    Wfi,
    Sev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    Dsb,
    Dmb,
    Isb,
}

/// MCR/MRC/MCRR/MRRC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoprocInsn {
    /// MRC/MRRC
    pub read: bool,
    pub cp: u8,
    pub opc1: u8,
    pub crn: u8,
    pub crm: u8,
    pub opc2: u8,
    pub rt: u8,
    /// 64 位传输的第二个寄存器
    pub rt2: Option<u8>,
}

/// 解码结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Insn {
    DataProc { op: DpOp, s: bool, rd: u8, rn: u8, op2: Operand2 },
    /// MOVW/MOVT
    MovImm16 { top: bool, rd: u8, imm: u16 },
    /// Thumb ADR，基址为字对齐的 PC
    Adr { rd: u8, offset: i32 },
    Mul { op: MulOp, s: bool, rd: u8, rn: u8, rm: u8, ra: u8 },
    MulLong { signed: bool, accumulate: bool, s: bool, rdlo: u8, rdhi: u8, rn: u8, rm: u8 },
    /// 64 位形式中 `rd` 为 RdHi、`ra` 为 RdLo
    DspMul { op: DspMulOp, rd: u8, rn: u8, rm: u8, ra: u8 },
    Div { signed: bool, rd: u8, rn: u8, rm: u8 },
    /// SSAT/USAT；`bits` 为饱和位宽
    Sat { signed: bool, bits: u8, rd: u8, rn: u8, shift: ShiftType, amount: u8 },
    Sat16 { signed: bool, bits: u8, rd: u8, rn: u8 },
    SatArith { op: SatOp, rd: u8, rn: u8, rm: u8 },
    Parallel { op: ParOp, kind: ParKind, rd: u8, rn: u8, rm: u8 },
    Sel { rd: u8, rn: u8, rm: u8 },
    Usad8 { rd: u8, rn: u8, rm: u8, ra: Option<u8> },
    /// SXT*/UXT*；`rn` 为累加形式的加数
    Extend { signed: bool, size: ExtendSize, rd: u8, rn: Option<u8>, rm: u8, rotate: u8 },
    /// PKHBT (`tb` 为假) / PKHTB
    Pkh { tb: bool, rd: u8, rn: u8, rm: u8, amount: u8 },
    Rev { kind: RevKind, rd: u8, rm: u8 },
    Clz { rd: u8, rm: u8 },
    Bitfield { op: BitfieldOp, rd: u8, rn: u8, lsb: u8, width: u8 },
    Mem(MemAccess),
    MemDual { load: bool, rt: u8, rt2: u8, rn: u8, offset: MemOffset, mode: AddrMode },
    /// LDM/STM/PUSH/POP；`user` 为 `^` 形式
    Block { load: bool, rn: u8, regs: u16, mode: BlockMode, wback: bool, user: bool },
    /// LDREX/STREX 族；`rd` 为存储的状态寄存器，`ordered` 为 LDAEX/STLEX
    Exclusive { load: bool, size: u8, rd: u8, rt: u8, rt2: Option<u8>, rn: u8, offset: u32, ordered: bool },
    /// LDA/STL
    Ordered { load: bool, size: u8, rt: u8, rn: u8 },
    Clrex,
    Swp { byte: bool, rt: u8, rt2: u8, rn: u8 },
    /// B/BL；目标为 PC 读值加 `offset`
    Branch { link: bool, offset: i32 },
    /// BLX 立即数 (切换指令集)
    BranchLinkExchange { offset: i32 },
    /// BX/BLX 寄存器
    BranchReg { link: bool, rm: u8 },
    Cbz { nonzero: bool, rn: u8, offset: u32 },
    TableBranch { half: bool, rn: u8, rm: u8 },
    Mrs { rd: u8, spsr: bool },
    /// `mask` 为按字节展开的写掩码
    Msr { spsr: bool, mask: u32, src: MsrSrc },
    MrsBanked { rd: u8, r: bool, sysm: u8 },
    MsrBanked { rn: u8, r: bool, sysm: u8 },
    V7mMrs { rd: u8, sysm: u8 },
    V7mMsr { rn: u8, sysm: u8, mask: u8 },
    /// `imod` 为 `Some(true)` 时屏蔽 (CPSID)
    Cps { imod: Option<bool>, a: bool, i: bool, f: bool, mode: Option<u8> },
    Svc { imm: u32 },
    Bkpt { imm: u16 },
    Udf { imm: u32 },
    Smc,
    Hint(HintOp),
    Barrier(BarrierKind),
    Setend { big: bool },
    It { firstcond: u8, mask: u8 },
    Coproc(CoprocInsn),
    Vfp(VfpInsn),
    Neon(NeonInsn),
    Mve(MveInsn),
    Lob(LobInsn),
}

impl Insn {
    /// ECI 非零时允许执行的指令
    pub fn allowed_in_eci(&self) -> bool {
        match self {
            Insn::Mve(m) => m.is_beatwise(),
            Insn::Lob(l) => l.is_loop_end(),
            _ => false,
        }
    }

    /// 不受条件码影响的指令 (IT 块中的 BKPT)
    pub fn is_unconditional(&self) -> bool {
        matches!(self, Insn::Bkpt { .. } | Insn::It { .. })
    }
}

/// 一条解码完的指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedInsn {
    pub pc: u32,
    /// 字节数：2 或 4
    pub len: u8,
    pub raw: u32,
    pub cond: Cond,
    pub insn: Insn,
}

/// 解码所需的块级信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeEnv {
    pub features: ArmFeatures,
    /// 处在 IT 块中 (影响 T16 的标志设置与若干编码的合法性)
    pub in_it: bool,
    /// IT 块的最后一条
    pub last_in_it: bool,
}

impl DecodeEnv {
    pub fn new(features: ArmFeatures) -> Self {
        Self { features, in_it: false, last_in_it: false }
    }

    pub fn has(&self, f: ArmFeatures) -> bool {
        self.features.contains(f)
    }

    pub fn m_profile(&self) -> bool {
        self.features.is_m_profile()
    }

    /// IT 块中只允许作为最后一条出现的指令
    pub fn outside_or_last_in_it(&self) -> bool {
        !self.in_it || self.last_in_it
    }
}

pub(crate) fn illegal(pc: u32, raw: u32) -> VmError {
    VmError::illegal(GuestAddr(u64::from(pc)), raw)
}

/// 把内部的 `Option` 解码结果转成 `IllegalInstruction`
pub(crate) fn finish(pc: u32, raw: u32, len: u8, cond: Cond, insn: Option<Insn>) -> VmResult<DecodedInsn> {
    let insn = insn.ok_or_else(|| illegal(pc, raw))?;
    log::trace!("{pc:#010x}: {raw:#010x} {insn:?}");
    Ok(DecodedInsn { pc, len, raw, cond, insn })
}

/// 按位取字段
#[inline]
pub(crate) fn bits(v: u32, hi: u32, lo: u32) -> u32 {
    (v >> lo) & ((1u32 << (hi - lo + 1)) - 1)
}

#[inline]
pub(crate) fn bit(v: u32, n: u32) -> bool {
    (v >> n) & 1 != 0
}

#[inline]
pub(crate) fn reg(v: u32, lo: u32) -> u8 {
    bits(v, lo + 3, lo) as u8
}

/// 取低 `width` 位并符号扩展
#[inline]
pub(crate) fn sext(v: u32, width: u32) -> i32 {
    let sh = 32 - width;
    ((v << sh) as i32) >> sh
}

/// 把 MSR 的 4 位字段掩码展开为字节掩码
pub(crate) fn msr_mask(fields: u32) -> u32 {
    (0..4).filter(|i| fields & (1 << i) != 0).fold(0, |m, i| m | (0xff << (8 * i)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_helpers() {
        assert_eq!(bits(0xe0812003, 15, 12), 2);
        assert!(bit(0x0010_0000, 20));
        assert_eq!(sext(0xffffff, 24), -1);
        assert_eq!(sext(0x7f, 8), 127);
        assert_eq!(msr_mask(0b1001), 0xff00_00ff);
    }

    #[test]
    fn test_addr_mode_post_index_writes_back() {
        let m = AddrMode::from_puw(false, true, false);
        assert!(m.wback);
        assert!(!m.index);
        assert_eq!(DpOp::from_a32(0b0100), DpOp::Add);
        assert!(DpOp::Tst.is_test());
        assert!(DpOp::Mvn.is_logical());
    }
}
