//! 各型号的系统寄存器表

use super::{CpAccess, CpAccessResult, CpRegDesc, CpRegTableBuilder, CpRegType, CpSecurity};
use crate::cp15::{CpField, SCTLR_BR, SCTLR_M};
use crate::features::{ArmFeatures, Profile};
use crate::mpu::RegionReg;
use crate::pmu::{PMUSERENR_CR, PMUSERENR_EN, PMUSERENR_ER, PMUSERENR_SW};
use crate::psr::SecurityState;
use crate::state::ArmCpu;
use vm_core::VmResult;

const PL1_R: CpAccess = CpAccess::PL1_R;
const PL1_RW: CpAccess = CpAccess::PL1_RW;
const PL1_W: CpAccess = CpAccess::PL1_W;
const PL0_R: CpAccess = CpAccess::PL0_R;
const PL0_W: CpAccess = CpAccess::PL0_W;
const PL0_RW: CpAccess = CpAccess::PL0_RW;

/// 按特性登记型号需要的所有寄存器
pub fn register_model_regs(b: &mut CpRegTableBuilder, cpu: &ArmCpu) -> VmResult<()> {
    let f = cpu.features();
    if f.is_m_profile() {
        // M-profile 的系统寄存器在 PPB 内存映射空间
        return Ok(());
    }
    b.register_all(common_regs())?;
    if f.contains(ArmFeatures::V6) {
        b.register_all(v6_regs())?;
    }
    if f.contains(ArmFeatures::V6K) {
        b.register_all(v6k_regs())?;
    }
    if f.contains(ArmFeatures::V7) {
        b.register_all(v7_regs())?;
        b.register_all(cp14_debug_regs())?;
    }
    if cpu.profile() == Profile::R || f.contains(ArmFeatures::PMSA) {
        b.register_all(pmsav7_regs())?;
    } else {
        b.register_all(vmsa_regs(f))?;
    }
    if f.contains(ArmFeatures::VBAR) {
        b.register(CpRegDesc::new("VBAR", 15, 12, 0, 0, 0).field(CpField::Vbar))?;
    }
    if f.contains(ArmFeatures::EL3) {
        b.register_all(el3_regs())?;
    }
    if f.contains(ArmFeatures::PMU) {
        b.register_all(pmu_regs())?;
    }
    Ok(())
}

fn read_midr(cpu: &ArmCpu, _: &CpRegDesc) -> u64 {
    u64::from(cpu.midr())
}

fn write_sctlr(cpu: &mut ArmCpu, _: &CpRegDesc, v: u64) {
    let old = cpu.cp15.sctlr;
    cpu.cp15.sctlr = v as u32;
    if (old ^ cpu.cp15.sctlr) & (SCTLR_M | SCTLR_BR) != 0 {
        cpu.mpu.invalidate();
    }
}

fn reset_sctlr(cpu: &mut ArmCpu, _: &CpRegDesc) {
    // v7 之前 SCTLR 的若干位读为 1
    cpu.cp15.sctlr = if cpu.has_feature(ArmFeatures::V7) { 0x00c5_0078 } else { 0x0005_0078 };
}

fn write_tlb_flush(cpu: &mut ArmCpu, _: &CpRegDesc, _: u64) {
    cpu.tlb_flush_pending = true;
}

fn write_mapping(cpu: &mut ArmCpu, d: &CpRegDesc, v: u64) {
    if let Some(field) = d.field {
        cpu.cp15.set(field, v);
    }
    cpu.tlb_flush_pending = true;
}

/// 所有经典核心都有的寄存器
fn common_regs() -> Vec<CpRegDesc> {
    vec![
        CpRegDesc::new("MIDR", 15, 0, 0, 0, 0).access(PL1_R).read(read_midr).ty(CpRegType::NO_RAW),
        CpRegDesc::new("CTR", 15, 0, 0, 0, 1).constant(0x1d15_2152),
        CpRegDesc::new("SCTLR", 15, 1, 0, 0, 0)
            .field(CpField::Sctlr)
            .write(write_sctlr)
            .resetfn(reset_sctlr),
        CpRegDesc::new("DACR", 15, 3, 0, 0, 0).field(CpField::Dacr).write(write_mapping),
        CpRegDesc::new("DFSR", 15, 5, 0, 0, 0).field(CpField::Dfsr),
        CpRegDesc::new("IFSR", 15, 5, 0, 0, 1).field(CpField::Ifsr),
        CpRegDesc::new("DFAR", 15, 6, 0, 0, 0).field(CpField::Dfar),
        CpRegDesc::new("FCSEIDR", 15, 13, 0, 0, 0).field(CpField::Fcseidr).write(write_mapping),
        CpRegDesc::new("CONTEXTIDR", 15, 13, 0, 0, 1).field(CpField::Contextidr),
    ]
}

fn v6_regs() -> Vec<CpRegDesc> {
    vec![
        CpRegDesc::new("CPACR", 15, 1, 0, 0, 2).field(CpField::Cpacr).ty(CpRegType::FORCE_TB_END),
        CpRegDesc::new("IFAR", 15, 6, 0, 0, 2).field(CpField::Ifar),
        CpRegDesc::new("TCMTR", 15, 0, 0, 0, 2).constant(0),
    ]
}

fn v6k_regs() -> Vec<CpRegDesc> {
    let barrier = CpRegType::BARRIER | CpRegType::NO_RAW;
    vec![
        CpRegDesc::new("TPIDRURW", 15, 13, 0, 0, 2)
            .access(PL0_RW)
            .field(CpField::Tpidrurw)
            .ty(CpRegType::SUPPRESS_TB_END),
        CpRegDesc::new("TPIDRURO", 15, 13, 0, 0, 3)
            .access(CpAccess::from_bits_truncate(PL0_R.bits() | PL1_W.bits()))
            .field(CpField::Tpidruro)
            .ty(CpRegType::SUPPRESS_TB_END),
        CpRegDesc::new("TPIDRPRW", 15, 13, 0, 0, 4)
            .field(CpField::Tpidrprw)
            .ty(CpRegType::SUPPRESS_TB_END),
        CpRegDesc::new("CP15ISB", 15, 7, 0, 5, 4).access(PL0_W).ty(barrier),
        CpRegDesc::new("CP15DSB", 15, 7, 0, 10, 4).access(PL0_W).ty(barrier),
        CpRegDesc::new("CP15DMB", 15, 7, 0, 10, 5).access(PL0_W).ty(barrier),
        CpRegDesc::new("WFI", 15, 7, 0, 0, 4).access(PL1_W).ty(CpRegType::WFI | CpRegType::NO_RAW),
    ]
}

fn v7_regs() -> Vec<CpRegDesc> {
    let nop = CpRegType::NOP | CpRegType::NO_RAW;
    let mut regs = vec![
        CpRegDesc::new("ID_PFR0", 15, 0, 0, 1, 0).constant(0x0000_1031),
        CpRegDesc::new("ID_PFR1", 15, 0, 0, 1, 1).constant(0x0000_0011),
        CpRegDesc::new("ID_DFR0", 15, 0, 0, 1, 2).constant(0x0001_0444),
        CpRegDesc::new("ID_AFR0", 15, 0, 0, 1, 3).constant(0),
        CpRegDesc::new("ID_MMFR0", 15, 0, 0, 1, 4).constant(0x0010_0103),
        CpRegDesc::new("ID_MMFR1", 15, 0, 0, 1, 5).constant(0x2000_0000),
        CpRegDesc::new("ID_MMFR2", 15, 0, 0, 1, 6).constant(0x0123_0000),
        CpRegDesc::new("ID_MMFR3", 15, 0, 0, 1, 7).constant(0x0000_2111),
        CpRegDesc::new("ID_ISAR0", 15, 0, 0, 2, 0).constant(0x0010_1111),
        CpRegDesc::new("ID_ISAR1", 15, 0, 0, 2, 1).constant(0x1311_2111),
        CpRegDesc::new("ID_ISAR2", 15, 0, 0, 2, 2).constant(0x2123_2041),
        CpRegDesc::new("ID_ISAR3", 15, 0, 0, 2, 3).constant(0x1111_2131),
        CpRegDesc::new("ID_ISAR4", 15, 0, 0, 2, 4).constant(0x0011_1142),
        CpRegDesc::new("ID_ISAR5", 15, 0, 0, 2, 5).constant(0),
        CpRegDesc::new("CCSIDR", 15, 0, 1, 0, 0).constant(0xe00f_e019),
        CpRegDesc::new("CLIDR", 15, 0, 1, 0, 1).constant(0x0a20_0023),
        CpRegDesc::new("AIDR", 15, 0, 1, 0, 7).constant(0),
        CpRegDesc::new("CSSELR", 15, 0, 2, 0, 0).field(CpField::Csselr),
        CpRegDesc::new("ACTLR", 15, 1, 0, 0, 1).field(CpField::Actlr),
        CpRegDesc::new("PAR", 15, 7, 0, 4, 0).field(CpField::Par),
    ];
    // 缓存维护：无缓存模型，全部无效果
    for (name, crm, opc2) in [
        ("ICIALLUIS", 1, 0),
        ("BPIALLIS", 1, 6),
        ("ICIALLU", 5, 0),
        ("ICIMVAU", 5, 1),
        ("BPIALL", 5, 6),
        ("BPIMVA", 5, 7),
        ("DCIMVAC", 6, 1),
        ("DCISW", 6, 2),
        ("DCCMVAC", 10, 1),
        ("DCCSW", 10, 2),
        ("DCCMVAU", 11, 1),
        ("DCCIMVAC", 14, 1),
        ("DCCISW", 14, 2),
    ] {
        regs.push(CpRegDesc::new(name, 15, 7, 0, crm, opc2).access(PL1_W).ty(nop));
    }
    regs
}

/// VMSA 地址转换寄存器
fn vmsa_regs(f: ArmFeatures) -> Vec<CpRegDesc> {
    let mut regs = vec![
        CpRegDesc::new("TTBR0", 15, 2, 0, 0, 0).field(CpField::Ttbr0).write(write_mapping),
        CpRegDesc::new("TLBIALL", 15, 8, 0, 7, 0).access(PL1_W).write(write_tlb_flush).ty(CpRegType::NO_RAW),
        CpRegDesc::new("TLBIMVA", 15, 8, 0, 7, 1).access(PL1_W).write(write_tlb_flush).ty(CpRegType::NO_RAW),
        CpRegDesc::new("TLBIASID", 15, 8, 0, 7, 2).access(PL1_W).write(write_tlb_flush).ty(CpRegType::NO_RAW),
    ];
    if f.contains(ArmFeatures::V6) {
        regs.push(CpRegDesc::new("TTBR1", 15, 2, 0, 0, 1).field(CpField::Ttbr1).write(write_mapping));
        regs.push(CpRegDesc::new("TTBCR", 15, 2, 0, 0, 2).field(CpField::Ttbcr).write(write_mapping));
    }
    if f.contains(ArmFeatures::V7) {
        regs.push(CpRegDesc::new64("TTBR0_64", 15, 0, 2).field(CpField::Ttbr0).write(write_mapping));
        regs.push(CpRegDesc::new64("TTBR1_64", 15, 1, 2).field(CpField::Ttbr1).write(write_mapping));
        regs.push(CpRegDesc::new64("PAR_64", 15, 0, 7).field(CpField::Par));
        for (name, opc2) in [("TLBIALLIS", 0), ("TLBIMVAIS", 1), ("TLBIASIDIS", 2), ("TLBIMVAAIS", 3)] {
            regs.push(
                CpRegDesc::new(name, 15, 8, 0, 3, opc2)
                    .access(PL1_W)
                    .write(write_tlb_flush)
                    .ty(CpRegType::NO_RAW),
            );
        }
    }
    regs
}

fn el3_regs() -> Vec<CpRegDesc> {
    vec![
        CpRegDesc::new("SCR", 15, 1, 0, 1, 0)
            .access(CpAccess::PL3_RW)
            .security(CpSecurity::Secure)
            .field(CpField::Scr)
            .ty(CpRegType::FORCE_TB_END),
        CpRegDesc::new("NSACR", 15, 1, 0, 1, 2)
            .access(CpAccess::from_bits_truncate(CpAccess::PL3_RW.bits() | PL1_R.bits()))
            .field(CpField::Nsacr),
        CpRegDesc::new("MVBAR", 15, 12, 0, 0, 1)
            .access(CpAccess::PL3_RW)
            .security(CpSecurity::Secure)
            .field(CpField::Mvbar),
    ]
}

// ---- PMSAv7 ----

fn read_mpuir(cpu: &ArmCpu, _: &CpRegDesc) -> u64 {
    u64::from(cpu.mpu.num_regions()) << 8
}

fn read_rgnr(cpu: &ArmCpu, _: &CpRegDesc) -> u64 {
    u64::from(cpu.mpu.rnr(SecurityState::NonSecure))
}

fn write_rgnr(cpu: &mut ArmCpu, _: &CpRegDesc, v: u64) {
    cpu.mpu.set_rnr(SecurityState::NonSecure, v as u32);
}

fn region_reg(d: &CpRegDesc) -> RegionReg {
    match d.opc2 {
        0 => RegionReg::Drbar,
        2 => RegionReg::Drsr,
        _ => RegionReg::Dracr,
    }
}

fn read_region(cpu: &ArmCpu, d: &CpRegDesc) -> u64 {
    u64::from(cpu.mpu.read_region(SecurityState::NonSecure, region_reg(d)))
}

fn write_region(cpu: &mut ArmCpu, d: &CpRegDesc, v: u64) {
    // 区域写入同时使缓存的判定失效
    cpu.mpu.write_region(SecurityState::NonSecure, region_reg(d), v as u32);
}

fn pmsav7_regs() -> Vec<CpRegDesc> {
    vec![
        CpRegDesc::new("MPUIR", 15, 0, 0, 0, 4).access(PL1_R).read(read_mpuir).ty(CpRegType::NO_RAW),
        CpRegDesc::new("RGNR", 15, 6, 0, 2, 0).read(read_rgnr).write(write_rgnr),
        CpRegDesc::new("DRBAR", 15, 6, 0, 1, 0).read(read_region).write(write_region),
        CpRegDesc::new("DRSR", 15, 6, 0, 1, 2).read(read_region).write(write_region),
        CpRegDesc::new("DRACR", 15, 6, 0, 1, 4).read(read_region).write(write_region),
    ]
}

// ---- PMU ----

/// PMUSERENR 控制 EL0 能否访问性能计数器
fn pmreg_access(cpu: &ArmCpu, _: &CpRegDesc, _: bool) -> CpAccessResult {
    if cpu.current_el() == 0 && cpu.pmu.userenr & PMUSERENR_EN == 0 {
        CpAccessResult::TrapUndefined
    } else {
        CpAccessResult::Ok
    }
}

fn pmreg_access_swinc(cpu: &ArmCpu, d: &CpRegDesc, is_read: bool) -> CpAccessResult {
    if cpu.current_el() == 0 && cpu.pmu.userenr & (PMUSERENR_EN | PMUSERENR_SW) != 0 {
        return CpAccessResult::Ok;
    }
    pmreg_access(cpu, d, is_read)
}

fn pmreg_access_ccntr(cpu: &ArmCpu, d: &CpRegDesc, is_read: bool) -> CpAccessResult {
    if cpu.current_el() == 0 && is_read && cpu.pmu.userenr & PMUSERENR_CR != 0 {
        return CpAccessResult::Ok;
    }
    pmreg_access(cpu, d, is_read)
}

fn pmreg_access_xevcntr(cpu: &ArmCpu, d: &CpRegDesc, is_read: bool) -> CpAccessResult {
    if cpu.current_el() == 0 && is_read && cpu.pmu.userenr & PMUSERENR_ER != 0 {
        return CpAccessResult::Ok;
    }
    pmreg_access(cpu, d, is_read)
}

fn pmu_read(cpu: &ArmCpu, d: &CpRegDesc) -> u64 {
    let p = &cpu.pmu;
    u64::from(match (d.crm, d.opc2) {
        (12, 0) => p.pmcr(),
        (12, 1) | (12, 2) => p.cnten,
        (12, 3) => p.ovs,
        (12, 5) => p.selr,
        (13, 0) => p.cycle_count() as u32,
        (13, 1) => p.selected_event_type(),
        (13, 2) => p.selected_counter(),
        (14, 0) => p.userenr,
        (14, 1) | (14, 2) => p.inten,
        _ => 0,
    })
}

fn pmu_write(cpu: &mut ArmCpu, d: &CpRegDesc, v: u64) {
    let v = v as u32;
    let p = &mut cpu.pmu;
    match (d.crm, d.opc2) {
        (12, 0) => p.set_pmcr(v),
        (12, 1) => p.cnten |= v,
        (12, 2) => p.cnten &= !v,
        (12, 3) => p.ovs &= !v,
        (12, 4) => p.software_increment(v),
        (12, 5) => p.selr = v & 0x1f,
        (13, 0) => p.set_cycle_count(u64::from(v)),
        (13, 1) => p.set_selected_event_type(v),
        (13, 2) => p.set_selected_counter(v),
        (14, 0) => p.userenr = v & 0xf,
        (14, 1) => p.inten |= v,
        (14, 2) => p.inten &= !v,
        _ => {}
    }
}

fn pmu_regs() -> Vec<CpRegDesc> {
    let pm = |name, crm, opc2| {
        CpRegDesc::new(name, 15, 9, 0, crm, opc2)
            .access(PL0_RW)
            .accessfn(pmreg_access)
            .read(pmu_read)
            .write(pmu_write)
    };
    vec![
        pm("PMCR", 12, 0).ty(CpRegType::IO),
        pm("PMCNTENSET", 12, 1),
        pm("PMCNTENCLR", 12, 2).ty(CpRegType::NO_RAW),
        pm("PMOVSR", 12, 3),
        pm("PMSWINC", 12, 4).access(PL0_W).accessfn(pmreg_access_swinc).ty(CpRegType::NO_RAW),
        pm("PMSELR", 12, 5),
        CpRegDesc::new("PMCEID0", 15, 9, 0, 12, 6)
            .access(PL0_R)
            .accessfn(pmreg_access)
            .ty(CpRegType::CONST)
            .reset(0x0002_0101),
        CpRegDesc::new("PMCEID1", 15, 9, 0, 12, 7)
            .access(PL0_R)
            .accessfn(pmreg_access)
            .ty(CpRegType::CONST),
        pm("PMCCNTR", 13, 0).accessfn(pmreg_access_ccntr).ty(CpRegType::IO),
        pm("PMXEVTYPER", 13, 1),
        pm("PMXEVCNTR", 13, 2).accessfn(pmreg_access_xevcntr).ty(CpRegType::IO),
        CpRegDesc::new("PMUSERENR", 15, 9, 0, 14, 0)
            .access(CpAccess::from_bits_truncate(PL0_R.bits() | PL1_RW.bits()))
            .read(pmu_read)
            .write(pmu_write),
        CpRegDesc::new("PMINTENSET", 15, 9, 0, 14, 1).read(pmu_read).write(pmu_write),
        CpRegDesc::new("PMINTENCLR", 15, 9, 0, 14, 2)
            .read(pmu_read)
            .write(pmu_write)
            .ty(CpRegType::NO_RAW),
    ]
}

/// cp14 调试 ID 寄存器：只暴露常量，不实现调试逻辑
fn cp14_debug_regs() -> Vec<CpRegDesc> {
    vec![
        CpRegDesc::new("DBGDIDR", 14, 0, 0, 0, 0).constant(0x3515_f005).access(PL0_R),
        CpRegDesc::new("DBGDSCRint", 14, 0, 0, 1, 0).constant(0).access(PL0_R),
        CpRegDesc::new("DBGDRAR", 14, 1, 0, 0, 0).constant(0).access(PL0_R),
        CpRegDesc::new("DBGDSAR", 14, 2, 0, 0, 0).constant(0).access(PL0_R),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::{CpRegTable, Resolution};
    use super::*;
    use crate::features::CpuModel;

    #[test]
    fn test_a9_table_builds_without_duplicates() {
        let cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        let t = CpRegTable::for_cpu(&cpu).unwrap();
        assert!(!t.is_empty());
        let midr = t.lookup(15, false, true, 0, 0, 0, 0).unwrap();
        assert_eq!(midr.read_value(&cpu), 0x410f_c090);
        assert!(t.lookup(15, false, false, 12, 0, 0, 0).is_ok());
        // SCR 只存在于 Secure 分组
        assert!(t.lookup(15, false, false, 1, 1, 0, 0).is_err());
        assert!(t.lookup(15, false, true, 1, 1, 0, 0).is_ok());
    }

    #[test]
    fn test_r5_has_pmsav7_regions() {
        let mut cpu = ArmCpu::new(CpuModel::CortexR5).unwrap();
        let t = CpRegTable::for_cpu(&cpu).unwrap();
        assert!(t.lookup(15, false, false, 2, 0, 0, 0).is_err());
        let mpuir = t.lookup(15, false, false, 0, 0, 0, 4).unwrap();
        assert_eq!(mpuir.read_value(&cpu), 12 << 8);
        let rgnr = t.lookup(15, false, false, 6, 2, 0, 0).unwrap().clone();
        let drbar = t.lookup(15, false, false, 6, 1, 0, 0).unwrap().clone();
        rgnr.write_value(&mut cpu, 3);
        let r#gen = cpu.mpu.generation();
        drbar.write_value(&mut cpu, 0x2000_0000);
        assert_eq!(drbar.read_value(&cpu), 0x2000_0000);
        assert!(cpu.mpu.generation() > r#gen);
    }

    #[test]
    fn test_pmuserenr_gates_user_access() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA9).unwrap();
        let t = CpRegTable::for_cpu(&cpu).unwrap();
        cpu.cpsr_write(crate::psr::Mode::Usr.bits(), crate::psr::CPSR_M, crate::state::CpsrWriteKind::Raw)
            .unwrap();
        assert_eq!(cpu.current_el(), 0);
        let ccnt = t.lookup(15, false, true, 9, 13, 0, 0).unwrap();
        assert_eq!(ccnt.check_access(&cpu, 0, true), CpAccessResult::TrapUndefined);
        cpu.pmu.userenr = PMUSERENR_CR;
        assert_eq!(ccnt.check_access(&cpu, 0, true), CpAccessResult::Ok);
        assert_eq!(ccnt.check_access(&cpu, 0, false), CpAccessResult::TrapUndefined);
        cpu.pmu.userenr = PMUSERENR_EN;
        assert_eq!(ccnt.check_access(&cpu, 0, false), CpAccessResult::Ok);
    }

    #[test]
    fn test_m_profile_table_is_empty_and_legacy_fallback() {
        let cpu = ArmCpu::new(CpuModel::CortexM3).unwrap();
        let t = CpRegTable::for_cpu(&cpu).unwrap();
        assert!(t.is_empty());
        let arm926 = ArmCpu::new(CpuModel::Arm926).unwrap();
        let t = CpRegTable::for_cpu(&arm926).unwrap();
        let key = super::super::CpRegKey::new(15, false, false, 7, 10, 0, 4);
        assert!(matches!(t.resolve(&key).unwrap(), Resolution::Legacy(_)));
    }

    #[test]
    fn test_reset_all_restores_sctlr() {
        let mut cpu = ArmCpu::new(CpuModel::CortexA15).unwrap();
        let t = CpRegTable::for_cpu(&cpu).unwrap();
        cpu.cp15.sctlr = 0;
        cpu.cp15.tpidrurw = 9;
        t.reset_all(&mut cpu);
        assert_eq!(cpu.cp15.sctlr, 0x00c5_0078);
        assert_eq!(cpu.cp15.tpidrurw, 0);
    }
}
