//! 架构规律的属性测试
//!
//! 条件码真值表、移位边界、独占访问、MVE 掩码合并、协处理器访问控制与
//! MPU 区域优先级。

use std::collections::HashMap;

use proptest::prelude::*;
use vm_arm_cpu::bits::{add_with_carry, shift_c, Cond, Nzcv, ShiftType};
use vm_arm_cpu::cpreg::{CpAccess, CpAccessResult, CpRegDesc};
use vm_arm_cpu::mpu::MpuState;
use vm_arm_cpu::mve::{self, Eci};
use vm_arm_cpu::{evaluate_condition_code, ArmCpu, CpuModel, ExclusiveMonitor};
use vm_core::{GuestAddr, MemoryAccess, VmError};

#[derive(Default)]
struct Ram(HashMap<u64, u8>);

impl MemoryAccess for Ram {
    fn read(&self, pa: GuestAddr, size: u8) -> Result<u64, VmError> {
        Ok((0..u64::from(size)).fold(0, |acc, i| acc | u64::from(*self.0.get(&(pa.0 + i)).unwrap_or(&0)) << (8 * i)))
    }

    fn write(&mut self, pa: GuestAddr, val: u64, size: u8) -> Result<(), VmError> {
        for i in 0..u64::from(size) {
            self.0.insert(pa.0 + i, (val >> (8 * i)) as u8);
        }
        Ok(())
    }
}

fn flags(bits: u32) -> Nzcv {
    Nzcv { n: bits & 8 != 0, z: bits & 4 != 0, c: bits & 2 != 0, v: bits & 1 != 0 }
}

/// 条件码的参考定义
fn reference(code: u32, f: Nzcv) -> bool {
    let base = match code >> 1 {
        0 => f.z,
        1 => f.c,
        2 => f.n,
        3 => f.v,
        4 => f.c && !f.z,
        5 => f.n == f.v,
        6 => !f.z && f.n == f.v,
        _ => true,
    };
    if code & 1 != 0 && code != 0xf { !base } else { base }
}

#[test]
fn test_condition_truth_table() {
    for code in 0..16u32 {
        for bits in 0..16u32 {
            let f = flags(bits);
            let got = evaluate_condition_code(code, f).unwrap();
            if code == 0xf {
                assert!(!got, "NV must never pass");
            } else {
                assert_eq!(got, reference(code, f), "cond {code:#x} flags {bits:#06b}");
            }
        }
        assert_eq!(Cond::from_nibble(code).bits(), code);
    }
}

#[test]
fn test_adds_flags_example() {
    let (r, f) = add_with_carry(0xffff_ffff, 2, false);
    assert_eq!(r, 1);
    assert_eq!(f, Nzcv { n: false, z: false, c: true, v: false });
}

proptest! {
    #[test]
    fn prop_shift_by_32_and_beyond(v in any::<u32>(), extra in 0u32..200, carry in any::<bool>()) {
        let top = v >> 31 != 0;
        prop_assert_eq!(shift_c(v, ShiftType::Lsl, 32, carry), (0, v & 1 != 0));
        prop_assert_eq!(shift_c(v, ShiftType::Lsr, 32, carry), (0, top));
        prop_assert_eq!(shift_c(v, ShiftType::Asr, 32, carry), (if top { u32::MAX } else { 0 }, top));

        let amount = 33 + extra;
        prop_assert_eq!(shift_c(v, ShiftType::Lsl, amount, carry), (0, false));
        prop_assert_eq!(shift_c(v, ShiftType::Lsr, amount, carry), (0, false));
        prop_assert_eq!(shift_c(v, ShiftType::Asr, amount, carry), (if top { u32::MAX } else { 0 }, top));
    }

    #[test]
    fn prop_exclusive_round_trip(addr in (0u64..0x1000).prop_map(|a| a & !3), old in any::<u32>(), new in any::<u32>()) {
        let mon = ExclusiveMonitor::new();
        let mut ram = Ram::default();
        ram.write(GuestAddr(addr), u64::from(old), 4).unwrap();

        prop_assert_eq!(mon.load_exclusive(&ram, addr, 4).unwrap(), u64::from(old));
        prop_assert!(mon.store_exclusive(&mut ram, addr, 4, u64::from(new)).unwrap());
        prop_assert_eq!(ram.read(GuestAddr(addr), 4).unwrap(), u64::from(new));
    }

    #[test]
    fn prop_intervening_store_breaks_exclusive(addr in (0u64..0x1000).prop_map(|a| a & !3), other in any::<u32>(), new in any::<u32>()) {
        let mon = ExclusiveMonitor::new();
        let mut ram = Ram::default();
        mon.load_exclusive(&ram, addr, 4).unwrap();

        // 另一个观察者的写
        mon.snoop_store(addr, 4);
        ram.write(GuestAddr(addr), u64::from(other), 4).unwrap();

        prop_assert!(!mon.store_exclusive(&mut ram, addr, 4, u64::from(new)).unwrap());
        prop_assert_eq!(ram.read(GuestAddr(addr), 4).unwrap(), u64::from(other));
    }

    #[test]
    fn prop_mve_merge_is_bytewise(dest in any::<[u8; 16]>(), value in any::<[u8; 16]>(), lanes in any::<u8>(), esize_log in 0usize..3) {
        let esize = 1usize << esize_log;
        // 每个元素的所有字节共用一个掩码位
        let mut mask = 0u16;
        for lane in 0..16 / esize {
            if lanes & (1 << (lane % 8)) != 0 {
                mask |= (((1u32 << esize) - 1) << (lane * esize)) as u16;
            }
        }
        let mut merged = dest;
        mve::merge(&mut merged, &value, mask);
        let mut loaded = dest;
        mve::merge_load(&mut loaded, &value, mask);
        for i in 0..16 {
            let on = mask & (1 << i) != 0;
            prop_assert_eq!(merged[i], if on { value[i] } else { dest[i] });
            prop_assert_eq!(loaded[i], if on { value[i] } else { 0 });
        }
    }

    #[test]
    fn prop_advance_predication_without_vpt_keeps_vpr(p0 in 0u32..0x10000, eci in prop::sample::select(vec![0u8, 1, 2, 4, 5])) {
        let mut cpu = ArmCpu::new(CpuModel::CortexM55).unwrap();
        cpu.vfp.vpr = p0;
        cpu.set_eci(eci);
        mve::advance_predication(&mut cpu);
        prop_assert_eq!(cpu.vfp.vpr, p0);
        prop_assert_eq!(cpu.eci(), Eci::from_bits(eci).unwrap().next().bits());
    }

    #[test]
    fn prop_privileged_register_rejects_el0(opc2 in 0u8..8, is_read in any::<bool>()) {
        let cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        let d = CpRegDesc::new("P", 15, 13, 0, 0, opc2).access(CpAccess::PL1_RW);
        prop_assert_eq!(d.check_access(&cpu, 0, is_read), CpAccessResult::TrapUndefined);
        prop_assert_eq!(d.check_access(&cpu, 1, is_read), CpAccessResult::Ok);

        // 只读与只写互斥，与自定义读写函数无关
        let ro = CpRegDesc::new("RO", 15, 0, 0, 0, opc2).access(CpAccess::PL1_R).read(|_, _| 1);
        let wo = CpRegDesc::new("WO", 15, 7, 0, 5, opc2).access(CpAccess::PL1_W).write(|_, _, _| {});
        for el in 1..=3 {
            prop_assert_eq!(ro.check_access(&cpu, el, false), CpAccessResult::TrapUndefined);
            prop_assert_eq!(wo.check_access(&cpu, el, true), CpAccessResult::TrapUndefined);
        }
    }

    #[test]
    fn prop_mpu_highest_region_wins(enabled in 1u16..=u16::MAX, addr in any::<u32>()) {
        let mut mpu = MpuState::new(16, 0).unwrap();
        for n in 0..16u32 {
            if enabled & (1 << n) != 0 {
                // 4GB 区域，全部覆盖 addr
                mpu.set_pmsav7_region(n, 0, (31 << 1) | 1, 0b011 << 8).unwrap();
            }
        }
        let expected = 15 - enabled.leading_zeros();
        prop_assert_eq!(mpu.pmsav7_lookup(addr), Some(expected));
    }
}
