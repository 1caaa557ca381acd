//! MVE 指令辅助函数
//!
//! 每个函数先计算元素掩码，再按掩码合并结果，最后恰好调用一次
//! [`advance_predication`]。标量操作数与访存地址从参数传入。

use vm_core::VmResult;

use super::neon::{raw_get, raw_set};
use super::{HelperEnv, HelperResult, arg};
use crate::lanes::{self, Lane};
use crate::mve::{
    advance_predication, current_eci, element_mask, expand_pred, merge, merge_load, update_eci, update_p0, vpst,
    vpst_at,
};
use crate::state::ArmCpu;

/// VPT/VCMP 比较条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VptCond {
    Eq,
    Ne,
    /// 无符号 >=
    Cs,
    /// 无符号 >
    Hi,
    Ge,
    Lt,
    Gt,
    Le,
}

impl VptCond {
    /// 条件是否按无符号比较
    pub fn unsigned(self) -> bool {
        matches!(self, VptCond::Cs | VptCond::Hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MveOp {
    Add,
    Sub,
    Mul,
    Hadd,
    Hsub,
    Qadd,
    Qsub,
    Max,
    Min,
    And,
    Bic,
    Orr,
    Orn,
    Eor,
    /// [rt]
    Dup,
    /// [acc] -> acc + sum
    Addv,
    Shl { shift: u8 },
    Shr { shift: u8 },
    Sli { shift: u8 },
    Sri { shift: u8 },
    /// [addr]；`msize` 为内存元素字节数，`size` 为寄存器元素
    Ldr { msize: u8 },
    Str { msize: u8 },
    /// `mask` 为 0 时即 VCMP
    Vpt { cond: VptCond, mask: u8 },
    Vpst { mask: u8 },
    Vpnot,
    /// [rn]
    Vctp,
    Vpsel,
}

/// 一次 MVE 运算；`scalar` 时第二操作数取自参数 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MveCall {
    pub op: MveOp,
    pub size: u8,
    pub unsigned: bool,
    pub scalar: bool,
    pub qd: u8,
    pub qn: u8,
    pub qm: u8,
}

fn qreg(cpu: &ArmCpu, q: u8) -> [u8; 16] {
    let [lo, hi] = cpu.vfp.q(usize::from(q & 7));
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&lo.to_le_bytes());
    out[8..].copy_from_slice(&hi.to_le_bytes());
    out
}

fn set_qreg(cpu: &mut ArmCpu, q: u8, v: &[u8; 16]) {
    let mut lo = [0u8; 8];
    let mut hi = [0u8; 8];
    lo.copy_from_slice(&v[..8]);
    hi.copy_from_slice(&v[8..]);
    cpu.vfp.set_q(usize::from(q & 7), [u64::from_le_bytes(lo), u64::from_le_bytes(hi)]);
}

fn replicate(value: u64, esize: usize) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 / esize {
        raw_set(&mut out, i, esize, value);
    }
    out
}

/// 逐元素运算，返回结果与是否有活动元素饱和
fn lane_op<L: Lane>(op: MveOp, d: &[u8; 16], n: &[u8; 16], m: &[u8; 16], mask: u16) -> ([u8; 16], bool) {
    let mut out = *d;
    let mut qc = false;
    let bits = L::BITS;
    for i in 0..16 / L::BYTES {
        let a: L = lanes::get(n, i);
        let b: L = lanes::get(m, i);
        let acc: L = lanes::get(d, i);
        let active = mask & (1 << (i * L::BYTES)) != 0;
        let mut sat = |(r, s): (L, bool)| {
            qc |= s && active;
            r
        };
        let insert = |v: u64, ins: u64| L::from_bits((acc.to_bits() & !ins) | (v & ins));
        let r = match op {
            MveOp::Add => a.wrapping_add(&b),
            MveOp::Sub => a.wrapping_sub(&b),
            MveOp::Mul => a.wrapping_mul(&b),
            MveOp::Hadd => lanes::halving_add(a, b, false),
            MveOp::Hsub => lanes::halving_sub(a, b),
            MveOp::Qadd => sat(lanes::sat_add(a, b)),
            MveOp::Qsub => sat(lanes::sat_sub(a, b)),
            MveOp::Max => a.max(b),
            MveOp::Min => a.min(b),
            MveOp::And => a & b,
            MveOp::Bic => a & !b,
            MveOp::Orr => a | b,
            MveOp::Orn => a | !b,
            MveOp::Eor => a ^ b,
            MveOp::Shl { shift } => {
                L::from_bits(if u32::from(shift) >= bits { 0 } else { a.to_bits() << shift })
            }
            MveOp::Shr { shift } => lanes::shift_by(a, -i32::from(shift), false, false).0,
            MveOp::Sli { shift } => {
                let v = if u32::from(shift) >= bits { 0 } else { a.to_bits() << shift };
                insert(v, lanes::insert_mask(bits, i32::from(shift)))
            }
            MveOp::Sri { shift } => {
                let v = if u32::from(shift) >= bits { 0 } else { a.to_bits() >> shift };
                insert(v, lanes::insert_mask(bits, -i32::from(shift)))
            }
            _ => acc,
        };
        lanes::set(&mut out, i, r);
    }
    (out, qc)
}

fn compare<L: Lane>(cond: VptCond, n: &[u8; 16], m: &[u8; 16]) -> u16 {
    let mut bits = 0u16;
    for i in 0..16 / L::BYTES {
        let a: L = lanes::get(n, i);
        let b: L = lanes::get(m, i);
        let hit = match cond {
            VptCond::Eq => a == b,
            VptCond::Ne => a != b,
            VptCond::Cs | VptCond::Ge => a >= b,
            VptCond::Hi | VptCond::Gt => a > b,
            VptCond::Lt => a < b,
            VptCond::Le => a <= b,
        };
        if hit {
            bits |= 1 << i;
        }
    }
    bits
}

fn add_across<L: Lane>(n: &[u8; 16], mask: u16) -> i128 {
    (0..16 / L::BYTES)
        .filter(|i| mask & (1 << (i * L::BYTES)) != 0)
        .map(|i| lanes::get::<L>(n, i).widen())
        .sum()
}

fn extend(raw: u64, bytes: usize, signed: bool) -> u64 {
    let bits = 8 * bytes as u32;
    if !signed || bits >= 64 {
        return raw;
    }
    let shift = 64 - bits;
    (((raw << shift) as i64) >> shift) as u64
}

/// 执行一条 MVE 指令
pub fn execute(env: &mut HelperEnv<'_>, call: &MveCall, args: &[u64]) -> VmResult<HelperResult> {
    let esize = 1usize << call.size;
    let mask = element_mask(env.cpu);
    let eci = current_eci(env.cpu);
    let eci_mask = eci.mask();

    match call.op {
        MveOp::Vpst { mask: m } => {
            vpst(env.cpu, u32::from(m));
            update_eci(env.cpu);
            return Ok(HelperResult::Value(0));
        }
        MveOp::Vpnot => {
            let beatpred = !env.cpu.vfp.vpr_p0() & mask;
            update_p0(env.cpu, beatpred);
            advance_predication(env.cpu);
            return Ok(HelperResult::Value(0));
        }
        MveOp::Vctp => {
            let rn = arg(args, 0)?;
            let lanes_per_vec = (16 / esize) as u64;
            let masklen = if rn >= lanes_per_vec { 16 } else { (rn as u32) << call.size };
            let newmask = if masklen >= 16 { 0xffff } else { ((1u32 << masklen) - 1) as u16 };
            update_p0(env.cpu, newmask & mask);
            advance_predication(env.cpu);
            return Ok(HelperResult::Value(0));
        }
        MveOp::Vpt { cond, mask: vpt_mask } => {
            let n = qreg(env.cpu, call.qn);
            let m = if call.scalar { replicate(arg(args, 0)?, esize) } else { qreg(env.cpu, call.qm) };
            let bits = with_lane!(call.size, cond.unsigned(), compare(cond, &n, &m))?;
            update_p0(env.cpu, expand_pred(bits, esize) & mask);
            advance_predication(env.cpu);
            if vpt_mask != 0 {
                vpst_at(env.cpu, eci, u32::from(vpt_mask));
            }
            return Ok(HelperResult::Value(0));
        }
        MveOp::Addv => {
            let n = qreg(env.cpu, call.qm);
            let sum = with_lane!(call.size, call.unsigned, add_across(&n, mask))?;
            let acc = arg(args, 0)? as u32;
            advance_predication(env.cpu);
            return Ok(HelperResult::Value(u64::from(acc.wrapping_add(sum as u32))));
        }
        MveOp::Ldr { msize } => {
            let addr = arg(args, 0)? as u32;
            let msize = usize::from(msize);
            let mut loaded = [0u8; 16];
            for e in 0..16 / esize {
                if mask & (1 << (e * esize)) != 0 {
                    let a = addr.wrapping_add((e * msize) as u32);
                    let raw = match env.read(a, msize as u8, msize as u8) {
                        Ok(raw) => raw,
                        Err(fault) => return fault.into_helper_result(),
                    };
                    raw_set(&mut loaded, e, esize, extend(raw, msize, !call.unsigned));
                }
            }
            let mut staged = [0u8; 16];
            merge_load(&mut staged, &loaded, mask);
            let mut d = qreg(env.cpu, call.qd);
            merge(&mut d, &staged, eci_mask);
            set_qreg(env.cpu, call.qd, &d);
            advance_predication(env.cpu);
            return Ok(HelperResult::Value(0));
        }
        MveOp::Str { msize } => {
            let addr = arg(args, 0)? as u32;
            let msize = usize::from(msize);
            let v = qreg(env.cpu, call.qd);
            for e in 0..16 / esize {
                if mask & (1 << (e * esize)) != 0 {
                    let a = addr.wrapping_add((e * msize) as u32);
                    if let Err(fault) = env.write(a, msize as u8, raw_get(&v, e, esize), msize as u8) {
                        return fault.into_helper_result();
                    }
                }
            }
            advance_predication(env.cpu);
            return Ok(HelperResult::Value(0));
        }
        _ => {}
    }

    let cpu = &mut *env.cpu;
    let mut d = qreg(cpu, call.qd);
    let result = match call.op {
        MveOp::Dup => replicate(arg(args, 0)?, esize),
        MveOp::Vpsel => {
            let n = qreg(cpu, call.qn);
            let m = qreg(cpu, call.qm);
            let p0 = cpu.vfp.vpr_p0();
            let mut r = [0u8; 16];
            for (i, b) in r.iter_mut().enumerate() {
                *b = if p0 & (1 << i) != 0 { n[i] } else { m[i] };
            }
            merge(&mut d, &r, eci_mask);
            set_qreg(cpu, call.qd, &d);
            advance_predication(cpu);
            return Ok(HelperResult::Value(0));
        }
        _ => {
            let n = qreg(cpu, call.qn);
            let m = if call.scalar { replicate(arg(args, 0)?, esize) } else { qreg(cpu, call.qm) };
            let (r, qc) = with_lane!(call.size, call.unsigned, lane_op(call.op, &d, &n, &m, mask))?;
            if qc {
                cpu.vfp.set_qc();
            }
            r
        }
    };
    merge(&mut d, &result, mask);
    set_qreg(cpu, call.qd, &d);
    advance_predication(cpu);
    Ok(HelperResult::Value(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpreg::CpRegTable;
    use crate::exclusive::ExclusiveMonitor;
    use crate::features::CpuModel;
    use crate::fpregs::LTPSIZE_NONE;
    use crate::intc::NoInterrupts;
    use crate::mve::Eci;
    use vm_core::{AccessType, AddressTranslator, GuestAddr, GuestPhysAddr, MemoryAccess, VmError};

    struct FlatMem(Vec<u8>);

    impl AddressTranslator for FlatMem {
        fn translate(&mut self, va: GuestAddr, _access: AccessType) -> Result<GuestPhysAddr, VmError> {
            Ok(GuestPhysAddr(va.0))
        }

        fn flush_tlb(&mut self) {}
    }

    impl MemoryAccess for FlatMem {
        fn read(&self, pa: GuestAddr, size: u8) -> Result<u64, VmError> {
            let a = pa.0 as usize;
            Ok(self.0[a..a + usize::from(size)].iter().rev().fold(0, |acc, b| acc << 8 | u64::from(*b)))
        }

        fn write(&mut self, pa: GuestAddr, val: u64, size: u8) -> Result<(), VmError> {
            let a = pa.0 as usize;
            for i in 0..usize::from(size) {
                self.0[a + i] = (val >> (8 * i)) as u8;
            }
            Ok(())
        }
    }

    fn run(cpu: &mut ArmCpu, mem: &mut FlatMem, call: MveCall, args: &[u64]) -> HelperResult {
        let table = CpRegTable::builder().freeze();
        let monitor = ExclusiveMonitor::new();
        let mut intc = NoInterrupts;
        let mut env = HelperEnv { cpu, mmu: mem, cpregs: &table, monitor: &monitor, intc: &mut intc };
        execute(&mut env, &call, args).unwrap()
    }

    fn mve(op: MveOp, size: u8) -> MveCall {
        MveCall { op, size, unsigned: false, scalar: false, qd: 0, qn: 1, qm: 2 }
    }

    fn cpu() -> ArmCpu {
        let mut c = ArmCpu::new(CpuModel::CortexM55).unwrap();
        c.set_fpu_enabled(true).unwrap();
        c
    }

    #[test]
    fn test_tail_predicated_add_preserves_inactive_lanes() {
        let mut c = cpu();
        let mut mem = FlatMem(vec![0; 64]);
        c.vfp.set_q(0, [0xaaaa_aaaa_aaaa_aaaa; 2]);
        c.vfp.set_q(1, [0x0000_0002_0000_0001, 0x0000_0004_0000_0003]);
        c.vfp.set_q(2, [0x0000_0010_0000_0010, 0x0000_0010_0000_0010]);
        c.vfp.ltpsize = 2;
        c.regs[14] = 3;
        run(&mut c, &mut mem, mve(MveOp::Add, 2), &[]);
        assert_eq!(c.vfp.q(0), [0x0000_0012_0000_0011, 0xaaaa_aaaa_0000_0013]);
    }

    #[test]
    fn test_predicated_load_zeroes_and_store_skips() {
        let mut c = cpu();
        let mut mem = FlatMem((0u8..64).collect());
        c.vfp.set_q(0, [u64::MAX; 2]);
        c.vfp.ltpsize = 1;
        c.regs[14] = 2;
        let mut call = mve(MveOp::Ldr { msize: 1 }, 1);
        call.unsigned = true;
        run(&mut c, &mut mem, call, &[8]);
        // 两个 16 位元素由 8、9 号字节加宽而来，其余清零
        assert_eq!(c.vfp.q(0), [0x0000_0000_0009_0008, 0]);

        c.vfp.set_q(0, [0x1111_2222_3333_4444, 0x5555_6666_7777_8888]);
        run(&mut c, &mut mem, mve(MveOp::Str { msize: 2 }, 1), &[32]);
        assert_eq!(mem.0[32..36], [0x44, 0x44, 0x33, 0x33]);
        assert_eq!(mem.0[36], 36);
    }

    #[test]
    fn test_store_denied_by_mpu_raises_memmanage() {
        let mut c = cpu();
        let sec = c.security();
        c.mpu.set_ctrl(sec, crate::mpu::MPU_CTRL_ENABLE);
        let mut mem = FlatMem(vec![0; 64]);
        c.vfp.set_q(0, [u64::MAX; 2]);
        let r = run(&mut c, &mut mem, mve(MveOp::Str { msize: 4 }, 2), &[16]);
        assert_eq!(r, HelperResult::Raise { excp: crate::exception::EXCP_MEM_MANAGE, syndrome: 16 });
        assert!(mem.0.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_misaligned_element_load_is_unaligned() {
        let mut c = cpu();
        let mut mem = FlatMem(vec![0; 64]);
        let r = run(&mut c, &mut mem, mve(MveOp::Ldr { msize: 4 }, 2), &[6]);
        assert_eq!(r, HelperResult::Raise { excp: crate::exception::EXCP_UNALIGNED, syndrome: 6 });
    }

    #[test]
    fn test_vpt_then_predicated_op() {
        let mut c = cpu();
        let mut mem = FlatMem(vec![0; 16]);
        c.vfp.set_q(1, [0x0000_0005_0000_0001, 0x0000_0007_0000_0000]);
        let mut vpt = mve(MveOp::Vpt { cond: VptCond::Gt, mask: 0b1000 }, 2);
        vpt.scalar = true;
        run(&mut c, &mut mem, vpt, &[2]);
        assert_eq!(c.vfp.vpr_p0(), 0xf0f0);

        c.vfp.set_q(0, [0; 2]);
        let mut dup = mve(MveOp::Dup, 2);
        dup.scalar = true;
        run(&mut c, &mut mem, dup, &[0x99]);
        assert_eq!(c.vfp.q(0), [0x0000_0099_0000_0000, 0x0000_0099_0000_0000]);
        // VPT 块结束后不再受谓词控制
        assert_eq!(c.vfp.vpr_mask01(), 0);
        assert_eq!(element_mask(&c), 0xffff);
    }

    #[test]
    fn test_vctp_and_addv() {
        let mut c = cpu();
        let mut mem = FlatMem(vec![0; 16]);
        run(&mut c, &mut mem, mve(MveOp::Vctp, 1), &[3]);
        assert_eq!(c.vfp.vpr_p0(), 0x003f);

        c.vfp.set_q(2, [0x0004_0003_0002_0001, 0x0008_0007_0006_0005]);
        let r = run(&mut c, &mut mem, mve(MveOp::Addv, 1), &[100]);
        assert_eq!(r, HelperResult::Value(136));
    }

    #[test]
    fn test_eci_skips_completed_beats() {
        let mut c = cpu();
        let mut mem = FlatMem(vec![0; 16]);
        c.vfp.ltpsize = LTPSIZE_NONE;
        c.set_eci(Eci::A0A1.bits());
        c.vfp.set_q(1, [0x0101_0101_0101_0101; 2]);
        c.vfp.set_q(2, [0x0101_0101_0101_0101; 2]);
        run(&mut c, &mut mem, mve(MveOp::Add, 0), &[]);
        assert_eq!(c.vfp.q(0), [0, 0x0202_0202_0202_0202]);
        assert_eq!(c.eci(), 0);
    }

    #[test]
    fn test_qadd_only_counts_active_lanes() {
        let mut c = cpu();
        let mut mem = FlatMem(vec![0; 16]);
        c.vfp.set_q(1, [0, 0x7f00_0000_0000_0000]);
        c.vfp.set_q(2, [0, 0x0100_0000_0000_0000]);
        c.vfp.ltpsize = 0;
        c.regs[14] = 8;
        run(&mut c, &mut mem, mve(MveOp::Qadd, 0), &[]);
        assert_eq!(c.vfp.fpscr(false) & crate::fpregs::FPSCR_QC, 0);
    }
}
