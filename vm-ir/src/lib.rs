//! 架构无关的中间表示
//!
//! 前端把客户机指令翻译为 [`IROp`] 序列，后端（JIT 或解释器）消费它。
//! 值保存在块内临时寄存器 [`RegId`] 中，宽度为 64 位；客户机状态只能通过
//! `GetReg`/`SetReg` 等状态操作访问，编号由前端定义。运行时辅助函数以
//! 泛型参数 `H` 表示，由前端提供具体的目录类型。

use smallvec::SmallVec;
use vm_core::{CoreError, GuestAddr, VmError, VmResult};

mod block;

pub use block::{ExitKind, TranslationBlock};

/// 块内临时寄存器
pub type RegId = u32;
/// 块内标签
pub type LabelId = u32;
/// 客户机状态槽位
pub type StateReg = u16;

pub type HelperArgs = SmallVec<[RegId; 4]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemOrder {
    #[default]
    None,
    Acquire,
    Release,
    AcqRel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemFlags {
    /// 以非特权身份访问 (LDRT/STRT)
    pub unprivileged: bool,
    pub secure: bool,
    /// 要求的对齐，0 表示不检查
    pub align: u8,
    pub order: MemOrder,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IROp<H> {
    Nop,
    /// 指令边界
    InsnStart { pc: GuestAddr },

    // Arithmetic / Logic
    MovImm { dst: RegId, imm: u64 },
    Mov { dst: RegId, src: RegId },
    Add { dst: RegId, src1: RegId, src2: RegId },
    Sub { dst: RegId, src1: RegId, src2: RegId },
    Mul { dst: RegId, src1: RegId, src2: RegId },
    /// 除数为 0 时结果为 0，溢出时回绕
    Div { dst: RegId, src1: RegId, src2: RegId, signed: bool },
    And { dst: RegId, src1: RegId, src2: RegId },
    Or { dst: RegId, src1: RegId, src2: RegId },
    Xor { dst: RegId, src1: RegId, src2: RegId },
    Not { dst: RegId, src: RegId },
    AddImm { dst: RegId, src: RegId, imm: i64 },
    AndImm { dst: RegId, src: RegId, imm: u64 },

    // Shifts, amount taken modulo 64
    Sll { dst: RegId, src: RegId, shreg: RegId },
    Srl { dst: RegId, src: RegId, shreg: RegId },
    Sra { dst: RegId, src: RegId, shreg: RegId },
    SllImm { dst: RegId, src: RegId, sh: u8 },
    SrlImm { dst: RegId, src: RegId, sh: u8 },
    SraImm { dst: RegId, src: RegId, sh: u8 },
    /// 32 位循环右移，移位量取模 32
    Ror32 { dst: RegId, src: RegId, shreg: RegId },

    // Width changes
    Sext { dst: RegId, src: RegId, bits: u8 },
    Zext { dst: RegId, src: RegId, bits: u8 },

    // Comparisons, result is 0 or 1
    CmpEq { dst: RegId, lhs: RegId, rhs: RegId },
    CmpNe { dst: RegId, lhs: RegId, rhs: RegId },
    CmpLt { dst: RegId, lhs: RegId, rhs: RegId },
    CmpLtU { dst: RegId, lhs: RegId, rhs: RegId },
    CmpGe { dst: RegId, lhs: RegId, rhs: RegId },
    CmpGeU { dst: RegId, lhs: RegId, rhs: RegId },

    Select { dst: RegId, cond: RegId, true_val: RegId, false_val: RegId },

    // Memory
    Load { dst: RegId, addr: RegId, size: u8, signed: bool, flags: MemFlags },
    Store { src: RegId, addr: RegId, size: u8, flags: MemFlags },
    Fence { order: MemOrder },

    // Guest state
    GetReg { dst: RegId, reg: StateReg },
    SetReg { reg: StateReg, src: RegId },
    /// 64 位向量/浮点寄存器元素
    GetVec { dst: RegId, idx: u8 },
    SetVec { idx: u8, src: RegId },

    /// 运行时辅助函数调用
    Call { helper: H, args: HelperArgs, dst: Option<RegId> },

    // Control flow inside the block
    Label(LabelId),
    Br { label: LabelId },
    /// `cond != 0` 时跳转
    BrCond { cond: RegId, label: LabelId },
    /// 立即离开当前块
    Exit(Terminator),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    /// 直接链接到已知目标
    Jmp { target: GuestAddr },
    /// 目标在运行时计算，经查找进入下一个块
    JmpReg { target: RegId },
    /// 回到调度循环，不做链接
    Exit { pc: GuestAddr },
    /// 触发客户机异常
    Exception { excp: u32, syndrome: u32, pc: GuestAddr },
}

impl Terminator {
    pub fn exit_kind(&self) -> ExitKind {
        match self {
            Terminator::Jmp { .. } => ExitKind::DirectChain,
            Terminator::JmpReg { .. } => ExitKind::IndirectLookup,
            Terminator::Exit { .. } => ExitKind::FixedTarget,
            Terminator::Exception { .. } => ExitKind::Exception,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IRBlock<H> {
    pub start_pc: GuestAddr,
    pub ops: Vec<IROp<H>>,
    pub term: Terminator,
    pub num_temps: u32,
    pub num_labels: u32,
}

impl<H> IRBlock<H> {
    /// 检查临时寄存器与标签引用是否都在范围内、标签是否都已放置
    pub fn validate(&self) -> VmResult<()> {
        let mut placed = vec![false; self.num_labels as usize];
        for op in &self.ops {
            if let IROp::Label(l) = op {
                let slot = placed.get_mut(*l as usize).ok_or_else(|| invalid(format!("label {l} out of range")))?;
                if *slot {
                    return Err(invalid(format!("label {l} placed twice")));
                }
                *slot = true;
            }
        }
        for op in &self.ops {
            match op {
                IROp::Br { label } | IROp::BrCond { label, .. } => {
                    if !placed.get(*label as usize).copied().unwrap_or(false) {
                        return Err(invalid(format!("branch to unplaced label {label}")));
                    }
                }
                IROp::Call { args, dst, .. } => {
                    for r in args.iter().chain(dst.iter()) {
                        self.check_temp(*r)?;
                    }
                }
                _ => {}
            }
        }
        if let Terminator::JmpReg { target } = self.term {
            self.check_temp(target)?;
        }
        Ok(())
    }

    fn check_temp(&self, r: RegId) -> VmResult<()> {
        if r < self.num_temps {
            Ok(())
        } else {
            Err(invalid(format!("temp t{r} out of range")))
        }
    }
}

fn invalid(message: String) -> VmError {
    CoreError::Internal {
        message,
        module: "vm-ir".to_string(),
    }
    .into()
}

pub struct IRBuilder<H> {
    block: IRBlock<H>,
}

impl<H> IRBuilder<H> {
    pub fn new(pc: GuestAddr) -> Self {
        Self {
            block: IRBlock {
                start_pc: pc,
                ops: Vec::new(),
                term: Terminator::Exit { pc },
                num_temps: 0,
                num_labels: 0,
            },
        }
    }

    pub fn push(&mut self, op: IROp<H>) {
        self.block.ops.push(op);
    }

    pub fn alloc_temp(&mut self) -> RegId {
        let t = self.block.num_temps;
        self.block.num_temps += 1;
        t
    }

    pub fn new_label(&mut self) -> LabelId {
        let l = self.block.num_labels;
        self.block.num_labels += 1;
        l
    }

    pub fn set_term(&mut self, term: Terminator) {
        self.block.term = term;
    }

    pub fn start_pc(&self) -> GuestAddr {
        self.block.start_pc
    }

    pub fn ops(&self) -> &[IROp<H>] {
        &self.block.ops
    }

    /// 丢弃 `len` 之后的操作 (一条指令翻译失败时回滚)
    pub fn truncate(&mut self, len: usize) {
        self.block.ops.truncate(len);
    }

    pub fn term(&self) -> &Terminator {
        &self.block.term
    }

    pub fn build(self) -> IRBlock<H> {
        self.block
    }
}
