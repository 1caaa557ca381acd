//! 单个翻译块的解码上下文
//!
//! 每个块创建一个 [`DisasContext`]，块结束即丢弃。它持有 IR 构造器、
//! 块标志、IT 状态与条件跳过标签，所有 IR 发射辅助函数都挂在这里。

use smallvec::SmallVec;
use vm_arm_cpu::bits::Cond;
use vm_arm_cpu::cpreg::CpRegTable;
use vm_arm_cpu::exception::{EXCP_NOCP, EXCP_UDEF};
use vm_arm_cpu::state::{BlockFlags, slot};
use vm_arm_cpu::ArmHelper;
use vm_core::GuestAddr;
use vm_ir::{IRBuilder, IROp, LabelId, MemFlags, RegId, StateReg, Terminator};

/// 翻译块结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockEnd {
    /// 无条件跳转或交换
    Branch,
    /// 产生异常的指令
    Trap,
    /// 协处理器写
    CoprocWrite,
    /// 下一条指令跨页
    PageBoundary,
    /// 达到指令数上限
    InsnLimit,
    /// CPSR/模式/CONTROL 写入
    StateChange,
    /// WFI/WFE/YIELD
    Wait,
}

pub struct DisasContext<'a> {
    pub b: IRBuilder<ArmHelper>,
    pub flags: BlockFlags,
    pub cpregs: &'a CpRegTable,
    /// 当前指令地址
    pub pc: u32,
    /// 下一条指令地址
    pub next_pc: u32,
    /// IT 状态：基本条件与 5 位掩码
    pub condexec_cond: u8,
    pub condexec_mask: u8,
    /// 块开始时的 ECI (M-profile 节拍状态)
    pub eci: u8,
    /// 条件不满足时跳到的标签
    pub condlabel: Option<LabelId>,
    /// 指令显式给出的块出口
    pub term: Option<Terminator>,
    pub end: Option<BlockEnd>,
}

impl<'a> DisasContext<'a> {
    pub fn new(pc: u32, flags: BlockFlags, cpregs: &'a CpRegTable) -> Self {
        let mut ctx = Self {
            b: IRBuilder::new(GuestAddr(u64::from(pc))),
            flags,
            cpregs,
            pc,
            next_pc: pc,
            condexec_cond: 0,
            condexec_mask: 0,
            eci: 0,
            condlabel: None,
            term: None,
            end: None,
        };
        let ce = flags.condexec;
        if flags.m_profile && ce & 0xf == 0 {
            ctx.eci = ce >> 4;
        } else if ce != 0 {
            ctx.condexec_cond = ce >> 4;
            ctx.condexec_mask = (ce & 0xf) << 1;
            // 块内由翻译器跟踪，异常前再写回
            let zero = ctx.imm(0);
            ctx.set_slot(slot::CONDEXEC, zero);
        }
        ctx
    }

    pub fn thumb(&self) -> bool {
        self.flags.thumb
    }

    pub fn in_it(&self) -> bool {
        self.condexec_mask != 0
    }

    /// 读取 PC 得到的值 (ARM +8，Thumb +4)
    pub fn pc_read(&self) -> u32 {
        self.pc.wrapping_add(if self.thumb() { 4 } else { 8 })
    }

    // ---- 临时寄存器与基本运算 ----

    pub fn temp(&mut self) -> RegId {
        self.b.alloc_temp()
    }

    pub fn push(&mut self, op: IROp<ArmHelper>) {
        self.b.push(op);
    }

    pub fn imm(&mut self, v: u32) -> RegId {
        self.imm64(u64::from(v))
    }

    pub fn imm64(&mut self, v: u64) -> RegId {
        let dst = self.temp();
        self.push(IROp::MovImm { dst, imm: v });
        dst
    }

    pub fn get_slot(&mut self, reg: StateReg) -> RegId {
        let dst = self.temp();
        self.push(IROp::GetReg { dst, reg });
        dst
    }

    pub fn set_slot(&mut self, reg: StateReg, src: RegId) {
        self.push(IROp::SetReg { reg, src });
    }

    /// 读通用寄存器；r15 读出的是 `pc_read()`
    pub fn load_reg(&mut self, n: u8) -> RegId {
        if n == 15 {
            let v = self.pc_read();
            self.imm(v)
        } else {
            self.get_slot(slot::reg(u32::from(n)))
        }
    }

    /// 字对齐的 PC 读 (Thumb 的字面量寻址)
    pub fn load_reg_aligned(&mut self, n: u8) -> RegId {
        if n == 15 {
            let v = self.pc_read() & !3;
            self.imm(v)
        } else {
            self.load_reg(n)
        }
    }

    /// 写 r0-r14；r15 必须走分支路径
    pub fn store_reg(&mut self, n: u8, v: RegId) {
        debug_assert!(n < 15);
        self.set_slot(slot::reg(u32::from(n)), v);
    }

    pub fn binop(&mut self, f: impl FnOnce(RegId, RegId, RegId) -> IROp<ArmHelper>, a: RegId, b: RegId) -> RegId {
        let dst = self.temp();
        self.push(f(dst, a, b));
        dst
    }

    pub fn add(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, src1, src2| IROp::Add { dst, src1, src2 }, a, b)
    }

    pub fn sub(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, src1, src2| IROp::Sub { dst, src1, src2 }, a, b)
    }

    pub fn and(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, src1, src2| IROp::And { dst, src1, src2 }, a, b)
    }

    pub fn or(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, src1, src2| IROp::Or { dst, src1, src2 }, a, b)
    }

    pub fn xor(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, src1, src2| IROp::Xor { dst, src1, src2 }, a, b)
    }

    pub fn mul(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, src1, src2| IROp::Mul { dst, src1, src2 }, a, b)
    }

    pub fn cmp_eq(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, lhs, rhs| IROp::CmpEq { dst, lhs, rhs }, a, b)
    }

    pub fn cmp_ne(&mut self, a: RegId, b: RegId) -> RegId {
        self.binop(|dst, lhs, rhs| IROp::CmpNe { dst, lhs, rhs }, a, b)
    }

    pub fn add_imm(&mut self, a: RegId, imm: i64) -> RegId {
        let dst = self.temp();
        self.push(IROp::AddImm { dst, src: a, imm });
        dst
    }

    /// 32 位回绕加立即数
    pub fn add_imm32(&mut self, a: RegId, imm: i32) -> RegId {
        if imm == 0 {
            return a;
        }
        let r = self.add_imm(a, i64::from(imm));
        self.zext32(r)
    }

    pub fn and_imm(&mut self, a: RegId, imm: u64) -> RegId {
        let dst = self.temp();
        self.push(IROp::AndImm { dst, src: a, imm });
        dst
    }

    pub fn xor_imm(&mut self, a: RegId, imm: u64) -> RegId {
        let k = self.imm64(imm);
        self.xor(a, k)
    }

    pub fn shl_imm(&mut self, a: RegId, sh: u8) -> RegId {
        let dst = self.temp();
        self.push(IROp::SllImm { dst, src: a, sh });
        dst
    }

    pub fn shr_imm(&mut self, a: RegId, sh: u8) -> RegId {
        let dst = self.temp();
        self.push(IROp::SrlImm { dst, src: a, sh });
        dst
    }

    pub fn sar_imm(&mut self, a: RegId, sh: u8) -> RegId {
        let dst = self.temp();
        self.push(IROp::SraImm { dst, src: a, sh });
        dst
    }

    pub fn zext(&mut self, a: RegId, bits: u8) -> RegId {
        let dst = self.temp();
        self.push(IROp::Zext { dst, src: a, bits });
        dst
    }

    pub fn sext(&mut self, a: RegId, bits: u8) -> RegId {
        let dst = self.temp();
        self.push(IROp::Sext { dst, src: a, bits });
        dst
    }

    pub fn zext32(&mut self, a: RegId) -> RegId {
        self.zext(a, 32)
    }

    /// 32 位按位取反
    pub fn not32(&mut self, a: RegId) -> RegId {
        self.xor_imm(a, 0xffff_ffff)
    }

    pub fn select(&mut self, cond: RegId, t: RegId, f: RegId) -> RegId {
        let dst = self.temp();
        self.push(IROp::Select { dst, cond, true_val: t, false_val: f });
        dst
    }

    /// 取 `v` 的第 `n` 位
    pub fn bit(&mut self, v: RegId, n: u8) -> RegId {
        let s = if n == 0 { v } else { self.shr_imm(v, n) };
        self.and_imm(s, 1)
    }

    /// 访存最多 4 字节；大端数据 (SETEND BE) 在寄存器侧做字节交换
    pub fn load(&mut self, addr: RegId, size: u8, signed: bool, flags: MemFlags) -> RegId {
        debug_assert!(size <= 4);
        let swap = self.flags.big_endian_data && size > 1;
        let dst = self.temp();
        self.push(IROp::Load { dst, addr, size, signed: signed && !swap, flags });
        let v = if swap {
            let s = self.bswap(dst, size);
            if signed { self.sext(s, size * 8) } else { s }
        } else {
            dst
        };
        if signed { self.zext32(v) } else { v }
    }

    pub fn store(&mut self, src: RegId, addr: RegId, size: u8, flags: MemFlags) {
        debug_assert!(size <= 4);
        let v = if self.flags.big_endian_data && size > 1 { self.bswap(src, size) } else { src };
        self.push(IROp::Store { src: v, addr, size, flags });
    }

    fn bswap(&mut self, v: RegId, size: u8) -> RegId {
        let r = self.call(ArmHelper::Rev, &[v]);
        if size == 2 { self.shr_imm(r, 16) } else { r }
    }

    /// 64 位双字访存，低地址的字在小端下是低半
    pub fn load64(&mut self, addr: RegId, flags: MemFlags) -> RegId {
        let first = self.load(addr, 4, false, flags);
        let a4 = self.add_imm32(addr, 4);
        let second = self.load(a4, 4, false, flags);
        let (lo, hi) = if self.flags.big_endian_data { (second, first) } else { (first, second) };
        let hi = self.shl_imm(hi, 32);
        self.or(hi, lo)
    }

    pub fn store64(&mut self, v: RegId, addr: RegId, flags: MemFlags) {
        let lo = self.zext32(v);
        let hi = self.shr_imm(v, 32);
        let (first, second) = if self.flags.big_endian_data { (hi, lo) } else { (lo, hi) };
        self.store(first, addr, 4, flags);
        let a4 = self.add_imm32(addr, 4);
        self.store(second, a4, 4, flags);
    }

    // ---- 浮点/向量寄存器 ----

    pub fn get_d(&mut self, idx: u8) -> RegId {
        let dst = self.temp();
        self.push(IROp::GetVec { dst, idx });
        dst
    }

    pub fn set_d(&mut self, idx: u8, src: RegId) {
        self.push(IROp::SetVec { idx, src });
    }

    pub fn read_s(&mut self, n: u8) -> RegId {
        self.call(ArmHelper::ReadS(n), &[])
    }

    pub fn write_s(&mut self, n: u8, v: RegId) {
        self.call_void(ArmHelper::WriteS(n), &[v]);
    }

    /// 当前特权下的访存标志
    pub fn mem_flags(&self, unprivileged: bool) -> MemFlags {
        MemFlags {
            unprivileged: unprivileged || !self.flags.privileged,
            secure: self.flags.secure,
            ..MemFlags::default()
        }
    }

    // ---- 标志 ----

    /// 由 32 位结果设置 N 与 Z
    pub fn set_nz(&mut self, r: RegId) {
        let n = self.bit(r, 31);
        self.set_slot(slot::NF, n);
        let zero = self.imm(0);
        let z = self.cmp_eq(r, zero);
        self.set_slot(slot::ZF, z);
    }

    /// AddWithCarry；`set_flags` 时写全部四个标志
    pub fn add_with_carry(&mut self, a: RegId, b: RegId, carry: RegId, set_flags: bool) -> RegId {
        let s = self.add(a, b);
        let sum = self.add(s, carry);
        let r = self.zext32(sum);
        if set_flags {
            self.set_nz(r);
            let c = self.shr_imm(sum, 32);
            self.set_slot(slot::CF, c);
            // V = ((a ^ r) & (b ^ r)) >> 31
            let x = self.xor(a, r);
            let y = self.xor(b, r);
            let v = self.and(x, y);
            let v = self.bit(v, 31);
            self.set_slot(slot::VF, v);
        }
        r
    }

    /// a - b - !carry，即 a + !b + carry
    pub fn sub_with_carry(&mut self, a: RegId, b: RegId, carry: RegId, set_flags: bool) -> RegId {
        let nb = self.not32(b);
        self.add_with_carry(a, nb, carry, set_flags)
    }

    /// 条件成立时为 1 的临时寄存器
    pub fn test_cond(&mut self, cond: Cond) -> RegId {
        let base = match cond {
            Cond::Eq | Cond::Ne => self.get_slot(slot::ZF),
            Cond::Cs | Cond::Cc => self.get_slot(slot::CF),
            Cond::Mi | Cond::Pl => self.get_slot(slot::NF),
            Cond::Vs | Cond::Vc => self.get_slot(slot::VF),
            Cond::Hi | Cond::Ls => {
                let c = self.get_slot(slot::CF);
                let z = self.get_slot(slot::ZF);
                let nz = self.xor_imm(z, 1);
                self.and(c, nz)
            }
            Cond::Ge | Cond::Lt => {
                let n = self.get_slot(slot::NF);
                let v = self.get_slot(slot::VF);
                self.cmp_eq(n, v)
            }
            Cond::Gt | Cond::Le => {
                let n = self.get_slot(slot::NF);
                let v = self.get_slot(slot::VF);
                let ge = self.cmp_eq(n, v);
                let z = self.get_slot(slot::ZF);
                let nz = self.xor_imm(z, 1);
                self.and(ge, nz)
            }
            Cond::Al => return self.imm(1),
            Cond::Nv => return self.imm(0),
        };
        if cond.bits() & 1 != 0 { self.xor_imm(base, 1) } else { base }
    }

    /// 条件不满足时跳过本条指令
    pub fn skip_unless(&mut self, cond: Cond) {
        if cond == Cond::Al {
            return;
        }
        let fail = self.test_cond(cond.invert());
        let label = self.b.new_label();
        self.push(IROp::BrCond { cond: fail, label });
        self.condlabel = Some(label);
    }

    // ---- 辅助函数调用 ----

    /// 调用辅助函数；可能产生异常的辅助函数调用前先写回 PC 与 IT 状态
    pub fn call(&mut self, helper: ArmHelper, args: &[RegId]) -> RegId {
        if helper.may_raise() {
            self.sync_pc();
            self.sync_condexec();
        }
        let dst = self.temp();
        self.push(IROp::Call { helper, args: SmallVec::from_slice(args), dst: Some(dst) });
        dst
    }

    pub fn call_void(&mut self, helper: ArmHelper, args: &[RegId]) {
        if helper.may_raise() {
            self.sync_pc();
            self.sync_condexec();
        }
        self.push(IROp::Call { helper, args: SmallVec::from_slice(args), dst: None });
    }

    pub fn sync_pc(&mut self) {
        let pc = self.imm(self.pc);
        self.set_slot(slot::PC, pc);
    }

    /// 把当前指令的 IT 状态写回 CONDEXEC
    pub fn sync_condexec(&mut self) {
        if self.condexec_mask != 0 {
            let v = (self.condexec_cond << 4) | (self.condexec_mask >> 1);
            let t = self.imm(u32::from(v));
            self.set_slot(slot::CONDEXEC, t);
        }
    }

    /// 推进之后的 CONDEXEC 编码
    pub fn next_condexec(&self) -> u8 {
        let mask = (self.condexec_mask << 1) & 0x1f;
        if mask == 0 {
            return 0;
        }
        let cond = (self.condexec_cond & 0xe) | ((self.condexec_mask >> 4) & 1);
        (cond << 4) | (mask >> 1)
    }

    /// 每条 Thumb 指令之后推进 IT 状态
    pub fn advance_condexec(&mut self) {
        if self.condexec_mask != 0 {
            self.condexec_cond = (self.condexec_cond & 0xe) | ((self.condexec_mask >> 4) & 1);
            self.condexec_mask = (self.condexec_mask << 1) & 0x1f;
            if self.condexec_mask == 0 {
                self.condexec_cond = 0;
            }
        }
    }

    // ---- 块出口 ----

    /// 结束块并设置出口；条件执行的指令把出口放进 IR 流
    pub fn jump(&mut self, term: Terminator, reason: BlockEnd) {
        // 正常出口带走本条指令之后的 IT 状态，异常出口已写回当前状态
        if self.condexec_mask != 0 && !matches!(term, Terminator::Exception { .. }) {
            let t = self.imm(u32::from(self.next_condexec()));
            self.set_slot(slot::CONDEXEC, t);
        }
        if self.condlabel.is_some() {
            self.push(IROp::Exit(term));
        } else {
            self.term = Some(term);
        }
        self.end = Some(reason);
    }

    /// 跳到固定地址 (可链接)
    pub fn jump_to(&mut self, target: u32) {
        self.jump(Terminator::Jmp { target: GuestAddr(u64::from(target)) }, BlockEnd::Branch);
    }

    /// 写 PC 的分支 (BranchWritePC)：不改变指令集
    pub fn branch_reg(&mut self, v: RegId) {
        let mask = if self.thumb() { !1u64 } else { !3u64 };
        let target = self.and_imm(v, mask & 0xffff_ffff);
        self.set_slot(slot::PC, target);
        self.jump(Terminator::JmpReg { target }, BlockEnd::Branch);
    }

    /// BXWritePC：bit 0 选择 Thumb
    pub fn bx(&mut self, v: RegId) {
        let t = self.and_imm(v, 1);
        self.set_slot(slot::THUMB, t);
        let thumb_target = self.and_imm(v, 0xffff_fffe);
        let arm_target = self.and_imm(v, 0xffff_fffc);
        let target = if self.flags.m_profile { thumb_target } else { self.select(t, thumb_target, arm_target) };
        self.set_slot(slot::PC, target);
        self.jump(Terminator::JmpReg { target }, BlockEnd::Branch);
    }

    /// 同步状态后以客户机异常结束
    ///
    /// `next` 为真时异常返回地址是下一条指令 (SVC/SMC)。
    pub fn exception(&mut self, excp: u32, syndrome: u32, next: bool) {
        self.sync_condexec();
        let pc = if next { self.next_pc } else { self.pc };
        self.jump(
            Terminator::Exception { excp, syndrome, pc: GuestAddr(u64::from(pc)) },
            BlockEnd::Trap,
        );
    }

    pub fn undef(&mut self) {
        self.exception(EXCP_UDEF, 0, false);
    }

    /// FPU 不可用时的异常
    pub fn fp_disabled(&mut self) {
        let excp = if self.flags.m_profile { EXCP_NOCP } else { EXCP_UDEF };
        self.exception(excp, 0, false);
    }

    /// 以动态 PC 查找结束块 (状态改变之后)
    pub fn end_after_state_change(&mut self) {
        let next = self.imm(self.next_pc);
        self.set_slot(slot::PC, next);
        self.jump(Terminator::JmpReg { target: next }, BlockEnd::StateChange);
    }

    /// 不改变控制流地结束块
    pub fn end_block(&mut self, reason: BlockEnd) {
        self.end = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_arm_cpu::{ArmCpu, CpuModel};

    fn flags(thumb: bool, condexec: u8) -> BlockFlags {
        let mut f = ArmCpu::new(CpuModel::CortexA9).unwrap().block_flags();
        f.thumb = thumb;
        f.condexec = condexec;
        f
    }

    #[test]
    fn test_it_state_advances() {
        let table = CpRegTable::builder().freeze();
        // ITTE EQ: cond 0000, mask 0110
        let mut ctx = DisasContext::new(0x100, flags(true, 0x06), &table);
        assert!(ctx.in_it());
        assert_eq!(ctx.condexec_cond, 0);
        ctx.advance_condexec();
        assert_eq!(ctx.condexec_cond, 0);
        ctx.advance_condexec();
        assert_eq!(ctx.condexec_cond, 1);
        ctx.advance_condexec();
        assert!(!ctx.in_it());
        assert!(matches!(ctx.b.ops()[1], IROp::SetReg { reg: slot::CONDEXEC, .. }));
    }

    #[test]
    fn test_pc_read_offsets() {
        let table = CpRegTable::builder().freeze();
        let arm = DisasContext::new(0x1000, flags(false, 0), &table);
        assert_eq!(arm.pc_read(), 0x1008);
        let thumb = DisasContext::new(0x1002, flags(true, 0), &table);
        assert_eq!(thumb.pc_read(), 0x1006);
    }

    #[test]
    fn test_conditional_jump_goes_inline() {
        let table = CpRegTable::builder().freeze();
        let mut ctx = DisasContext::new(0, flags(false, 0), &table);
        ctx.skip_unless(Cond::Ne);
        ctx.jump_to(0x40);
        assert!(ctx.term.is_none());
        assert!(matches!(ctx.b.ops().last(), Some(IROp::Exit(Terminator::Jmp { .. }))));
        assert_eq!(ctx.end, Some(BlockEnd::Branch));
    }
}
