//! MVE 谓词执行引擎
//!
//! 每条 MVE 指令的字节级有效掩码是三部分的与：VPR 谓词、循环尾部谓词、
//! 以及 ECI 标记的已完成节拍。掩码有 16 位，每位对应 Q 寄存器的一个字节。

use crate::fpregs::{LTPSIZE_NONE, VPR_MASK01_SHIFT, VPR_MASK23_SHIFT, VPR_P0_MASK};
use crate::state::ArmCpu;

/// 节拍执行状态 (EPSR.ECI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Eci {
    #[default]
    None = 0,
    A0 = 1,
    A0A1 = 2,
    A0A1A2 = 4,
    A0A1A2B0 = 5,
}

impl Eci {
    pub fn from_bits(v: u8) -> Option<Eci> {
        Some(match v {
            0 => Eci::None,
            1 => Eci::A0,
            2 => Eci::A0A1,
            4 => Eci::A0A1A2,
            5 => Eci::A0A1A2B0,
            _ => return None,
        })
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    /// 尚未执行的节拍对应的字节掩码
    pub fn mask(self) -> u16 {
        match self {
            Eci::None => 0xffff,
            Eci::A0 => 0xfff0,
            Eci::A0A1 => 0xff00,
            Eci::A0A1A2 | Eci::A0A1A2B0 => 0xf000,
        }
    }

    /// 一条指令执行完后的 ECI
    pub fn next(self) -> Eci {
        if self == Eci::A0A1A2B0 { Eci::A0 } else { Eci::None }
    }
}

/// 由 VPR、ECI、LTPSIZE 与 LR 计算有效掩码
pub fn element_mask_from(vpr: u32, eci: Eci, ltpsize: u8, lr: u32) -> u16 {
    let mut mask = (vpr & VPR_P0_MASK) as u16;
    if (vpr >> VPR_MASK01_SHIFT) & 0xf == 0 {
        mask |= 0x00ff;
    }
    if (vpr >> VPR_MASK23_SHIFT) & 0xf == 0 {
        mask |= 0xff00;
    }
    if ltpsize < LTPSIZE_NONE && lr <= 1 << (4 - ltpsize) {
        // 尾部谓词处于最后一次迭代
        let len = lr << ltpsize;
        let ltpmask = if len >= 16 { 0xffff } else { ((1u32 << len) - 1) as u16 };
        mask &= ltpmask;
    }
    mask & eci.mask()
}

pub fn current_eci(cpu: &ArmCpu) -> Eci {
    Eci::from_bits(cpu.eci()).unwrap_or_default()
}

pub fn element_mask(cpu: &ArmCpu) -> u16 {
    element_mask_from(cpu.vfp.vpr, current_eci(cpu), cpu.vfp.ltpsize, cpu.regs[14])
}

/// 只推进节拍计数 (VPST 等不消耗谓词的指令)
pub fn update_eci(cpu: &mut ArmCpu) {
    if cpu.condexec & 0xf == 0 {
        let eci = current_eci(cpu);
        cpu.set_eci(eci.next().bits());
    }
}

/// 推进 ECI 与 VPT 状态；每条受谓词控制的指令恰好调用一次
pub fn advance_predication(cpu: &mut ArmCpu) {
    let eci = current_eci(cpu);
    update_eci(cpu);
    let vpr = cpu.vfp.vpr;
    let mut mask01 = (vpr >> VPR_MASK01_SHIFT) & 0xf;
    let mut mask23 = (vpr >> VPR_MASK23_SHIFT) & 0xf;
    if mask01 == 0 && mask23 == 0 {
        return;
    }
    let eci_mask = eci.mask();
    let mut inv = eci_mask;
    if mask01 <= 8 {
        inv &= !0x00ff;
    }
    if mask23 <= 8 {
        inv &= !0xff00;
    }
    let mut vpr = vpr ^ u32::from(inv);
    if eci_mask & 0xf0 != 0 {
        mask01 = (mask01 << 1) & 0xf;
    }
    mask23 = (mask23 << 1) & 0xf;
    vpr &= !((0xf << VPR_MASK01_SHIFT) | (0xf << VPR_MASK23_SHIFT));
    vpr |= (mask01 << VPR_MASK01_SHIFT) | (mask23 << VPR_MASK23_SHIFT);
    cpu.vfp.vpr = vpr;
}

/// 按掩码写入：每个字节只在掩码位置位时更新
pub fn merge(dest: &mut [u8; 16], value: &[u8; 16], mask: u16) {
    for (i, (d, v)) in dest.iter_mut().zip(value.iter()).enumerate() {
        if mask & (1 << i) != 0 {
            *d = *v;
        }
    }
}

/// 谓词掉的加载目的字节清零
pub fn merge_load(dest: &mut [u8; 16], value: &[u8; 16], mask: u16) {
    for (i, (d, v)) in dest.iter_mut().zip(value.iter()).enumerate() {
        *d = if mask & (1 << i) != 0 { *v } else { 0 };
    }
}

/// 用新的谓词位更新 VPR.P0 中未完成节拍的部分
pub fn update_p0(cpu: &mut ArmCpu, beatpred: u16) {
    let eci_mask = u32::from(current_eci(cpu).mask());
    cpu.vfp.vpr = (cpu.vfp.vpr & !eci_mask) | (u32::from(beatpred) & eci_mask);
}

/// VPST：设置 MASK01/MASK23。ECI 显示节拍 1 已完成时只更新 MASK23
pub fn vpst(cpu: &mut ArmCpu, mask: u32) {
    let eci = current_eci(cpu);
    vpst_at(cpu, eci, mask);
}

/// 以指令开始时的 ECI 设置 VPT 掩码 (VPT 在比较推进节拍后调用)
pub fn vpst_at(cpu: &mut ArmCpu, eci: Eci, mask: u32) {
    let mask = mask & 0xf;
    let vpr = cpu.vfp.vpr;
    cpu.vfp.vpr = match eci {
        Eci::None | Eci::A0 => {
            (vpr & !((0xf << VPR_MASK01_SHIFT) | (0xf << VPR_MASK23_SHIFT)))
                | (mask << VPR_MASK01_SHIFT)
                | (mask << VPR_MASK23_SHIFT)
        }
        _ => (vpr & !(0xf << VPR_MASK23_SHIFT)) | (mask << VPR_MASK23_SHIFT),
    };
}

/// 把每元素一位的比较结果展开成字节掩码
pub fn expand_pred(bits: u16, esize: usize) -> u16 {
    let mut out = 0u16;
    for e in 0..16 / esize {
        if bits & (1 << e) != 0 {
            out |= (((1u32 << esize) - 1) << (e * esize)) as u16;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CpuModel;
    use proptest::prelude::*;

    fn cpu() -> ArmCpu {
        ArmCpu::new(CpuModel::CortexM55).unwrap()
    }

    #[test]
    fn test_tail_predication() {
        // 32 位元素，剩余 3 个
        assert_eq!(element_mask_from(0, Eci::None, 2, 3), 0x0fff);
        assert_eq!(element_mask_from(0, Eci::None, 2, 5), 0xffff);
        assert_eq!(element_mask_from(0, Eci::None, 0, 16), 0xffff);
        assert_eq!(element_mask_from(0, Eci::None, 0, 0), 0);
        assert_eq!(element_mask_from(0, Eci::None, LTPSIZE_NONE, 1), 0xffff);
    }

    #[test]
    fn test_eci_masks_completed_beats() {
        assert_eq!(element_mask_from(0, Eci::A0A1, LTPSIZE_NONE, 0), 0xff00);
        let mut c = cpu();
        c.set_eci(Eci::A0A1A2B0.bits());
        advance_predication(&mut c);
        assert_eq!(current_eci(&c), Eci::A0);
        advance_predication(&mut c);
        assert_eq!(current_eci(&c), Eci::None);
    }

    #[test]
    fn test_vpt_then_else_inversion() {
        let mut c = cpu();
        // VPTE：第一条 then，第二条 else
        c.vfp.vpr = 0x00ff;
        vpst(&mut c, 0b1100);
        assert_eq!(element_mask(&c), 0x00ff);
        advance_predication(&mut c);
        assert_eq!(c.vfp.vpr & 0xffff, 0xff00);
        assert_eq!(element_mask(&c), 0xff00);
        advance_predication(&mut c);
        assert_eq!(c.vfp.vpr >> 16, 0);
        assert_eq!(element_mask(&c), 0xffff);
    }

    #[test]
    fn test_merge_and_load_zeroing() {
        let mut d = [0xaau8; 16];
        let v = [0x11u8; 16];
        merge(&mut d, &v, expand_pred(0b0101, 4));
        assert_eq!(d[0..8], [0x11, 0x11, 0x11, 0x11, 0xaa, 0xaa, 0xaa, 0xaa]);
        let mut l = [0xaau8; 16];
        merge_load(&mut l, &v, 0x000f);
        assert_eq!(l[0..8], [0x11, 0x11, 0x11, 0x11, 0, 0, 0, 0]);
    }

    proptest! {
        #[test]
        fn prop_no_vpt_predicate_is_all_ones(p0 in 0u32..0x10000, eci in prop::sample::select(vec![0u8, 1, 2, 4, 5])) {
            let eci = Eci::from_bits(eci).unwrap();
            // VPT 关闭时 P0 不影响掩码
            prop_assert_eq!(element_mask_from(p0, eci, LTPSIZE_NONE, 0), eci.mask());
            let mut c = cpu();
            c.vfp.vpr = p0;
            c.set_eci(eci.bits());
            advance_predication(&mut c);
            prop_assert_eq!(c.vfp.vpr, p0);
        }

        #[test]
        fn prop_merge_respects_element_mask(bits in 0u16..16, esize in prop::sample::select(vec![1usize, 2, 4])) {
            let mask = expand_pred(bits, esize);
            let mut d = [0u8; 16];
            merge(&mut d, &[0xff; 16], mask);
            for e in 0..16 / esize {
                let set = mask & (1 << (e * esize)) != 0;
                for b in 0..esize {
                    prop_assert_eq!(d[e * esize + b] == 0xff, set);
                }
            }
        }
    }
}
