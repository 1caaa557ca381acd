//! IR 发射
//!
//! 按 [`Insn`] 变体分派到各指令组。条件跳过、IT 推进与块出口的收尾由
//! 翻译循环负责，这里只发射单条指令自身的效果。

pub(crate) mod branch;
pub(crate) mod dp;
pub(crate) mod mem;
pub(crate) mod system;

use vm_core::VmResult;

use crate::context::DisasContext;
use crate::decode::Insn;

/// 发射一条已解码指令
pub(crate) fn translate(ctx: &mut DisasContext<'_>, insn: &Insn) -> VmResult<()> {
    match *insn {
        Insn::DataProc { op, s, rd, rn, op2 } => dp::data_proc(ctx, op, s, rd, rn, op2),
        Insn::MovImm16 { top, rd, imm } => dp::mov_imm16(ctx, top, rd, imm),
        Insn::Adr { rd, offset } => dp::adr(ctx, rd, offset),
        Insn::Mul { op, s, rd, rn, rm, ra } => dp::mul(ctx, op, s, rd, rn, rm, ra),
        Insn::MulLong { signed, accumulate, s, rdlo, rdhi, rn, rm } => {
            dp::mul_long(ctx, signed, accumulate, s, rdlo, rdhi, rn, rm)
        }
        Insn::DspMul { op, rd, rn, rm, ra } => dp::dsp_mul(ctx, op, rd, rn, rm, ra),
        Insn::Div { signed, rd, rn, rm } => dp::div(ctx, signed, rd, rn, rm),
        Insn::Sat { signed, bits, rd, rn, shift, amount } => dp::sat(ctx, signed, bits, rd, rn, shift, amount),
        Insn::Sat16 { signed, bits, rd, rn } => dp::sat16(ctx, signed, bits, rd, rn),
        Insn::SatArith { op, rd, rn, rm } => dp::sat_arith(ctx, op, rd, rn, rm),
        Insn::Parallel { op, kind, rd, rn, rm } => dp::parallel(ctx, op, kind, rd, rn, rm),
        Insn::Sel { rd, rn, rm } => dp::sel(ctx, rd, rn, rm),
        Insn::Usad8 { rd, rn, rm, ra } => dp::usad8(ctx, rd, rn, rm, ra),
        Insn::Extend { signed, size, rd, rn, rm, rotate } => dp::extend(ctx, signed, size, rd, rn, rm, rotate),
        Insn::Pkh { tb, rd, rn, rm, amount } => dp::pkh(ctx, tb, rd, rn, rm, amount),
        Insn::Rev { kind, rd, rm } => dp::rev(ctx, kind, rd, rm),
        Insn::Clz { rd, rm } => dp::clz(ctx, rd, rm),
        Insn::Bitfield { op, rd, rn, lsb, width } => dp::bitfield(ctx, op, rd, rn, lsb, width),

        Insn::Mem(m) => mem::single(ctx, &m),
        Insn::MemDual { load, rt, rt2, rn, offset, mode } => mem::dual(ctx, load, rt, rt2, rn, offset, mode),
        Insn::Block { load, rn, regs, mode, wback, user } => mem::block(ctx, load, rn, regs, mode, wback, user),
        Insn::Exclusive { load, size, rd, rt, rt2, rn, offset, ordered } => {
            mem::exclusive(ctx, load, size, rd, rt, rt2, rn, offset, ordered)
        }
        Insn::Ordered { load, size, rt, rn } => mem::ordered(ctx, load, size, rt, rn),
        Insn::Clrex => mem::clrex(ctx),
        Insn::Swp { byte, rt, rt2, rn } => mem::swp(ctx, byte, rt, rt2, rn),

        Insn::Branch { link, offset } => branch::branch(ctx, link, offset),
        Insn::BranchLinkExchange { offset } => branch::blx_imm(ctx, offset),
        Insn::BranchReg { link, rm } => branch::branch_reg(ctx, link, rm),
        Insn::Cbz { nonzero, rn, offset } => branch::cbz(ctx, nonzero, rn, offset),
        Insn::TableBranch { half, rn, rm } => branch::table_branch(ctx, half, rn, rm),

        Insn::Mrs { rd, spsr } => system::mrs(ctx, rd, spsr),
        Insn::Msr { spsr, mask, src } => system::msr(ctx, spsr, mask, src),
        Insn::MrsBanked { rd, r, sysm } => system::mrs_banked(ctx, rd, r, sysm),
        Insn::MsrBanked { rn, r, sysm } => system::msr_banked(ctx, rn, r, sysm),
        Insn::V7mMrs { rd, sysm } => system::v7m_mrs(ctx, rd, sysm),
        Insn::V7mMsr { rn, sysm, mask } => system::v7m_msr(ctx, rn, sysm, mask),
        Insn::Cps { imod, a, i, f, mode } => system::cps(ctx, imod, a, i, f, mode),
        Insn::Svc { imm } => system::svc(ctx, imm),
        Insn::Bkpt { imm } => system::bkpt(ctx, imm),
        Insn::Udf { .. } => ctx.undef(),
        Insn::Smc => system::smc(ctx),
        Insn::Hint(op) => system::hint(ctx, op),
        Insn::Barrier(kind) => system::barrier(ctx, kind),
        Insn::Setend { big } => system::setend(ctx, big),
        Insn::It { firstcond, mask } => system::it(ctx, firstcond, mask),

        Insn::Coproc(c) => return crate::coproc::translate(ctx, &c),
        Insn::Vfp(v) => return crate::vfp::translate(ctx, &v),
        Insn::Neon(n) => return crate::neon::translate(ctx, &n),
        Insn::Mve(m) => return crate::mve::translate(ctx, &m),
        Insn::Lob(l) => return crate::mve::translate_lob(ctx, &l),
    }
    Ok(())
}
