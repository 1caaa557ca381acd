//! CPU 特性与型号

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// 架构特性集合，翻译器据此拒绝不支持的编码
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ArmFeatures: u64 {
        const V4T        = 1 << 0;
        const V5         = 1 << 1;
        const V5TE       = 1 << 2;
        const V6         = 1 << 3;
        const V6K        = 1 << 4;
        const V6T2       = 1 << 5;
        const V7         = 1 << 6;
        const V7VE       = 1 << 7;
        const V8         = 1 << 8;
        const THUMB2     = 1 << 9;
        const THUMB_DSP  = 1 << 10;
        const ARM_DIV    = 1 << 11;
        const THUMB_DIV  = 1 << 12;
        const VFP        = 1 << 13;
        const VFP3       = 1 << 14;
        const VFP4       = 1 << 15;
        const NEON       = 1 << 16;
        const M_PROFILE  = 1 << 17;
        const M_MAIN     = 1 << 18;
        const M_SECURITY = 1 << 19;
        const MVE        = 1 << 20;
        const LOB        = 1 << 21;
        const PMSA       = 1 << 22;
        const PMU        = 1 << 23;
        const VBAR       = 1 << 24;
        const EL3        = 1 << 25;
        const V7MP       = 1 << 26;
        const V8_1M      = 1 << 27;
    }
}

impl ArmFeatures {
    pub fn is_m_profile(self) -> bool {
        self.contains(ArmFeatures::M_PROFILE)
    }

    /// 是否有浮点寄存器文件
    pub fn has_fpu(self) -> bool {
        self.contains(ArmFeatures::VFP)
    }

    /// 按名字解析单个特性（配置文件使用小写名字）
    pub fn from_name(name: &str) -> Option<ArmFeatures> {
        ArmFeatures::all()
            .iter_names()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Profile {
    /// 应用处理器
    A,
    /// 实时处理器 (PMSA)
    R,
    /// 微控制器
    M,
}

/// 支持的 CPU 型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CpuModel {
    Arm926,
    Arm1176,
    CortexA9,
    CortexA15,
    CortexR5,
    CortexM3,
    CortexM4,
    CortexM33,
    CortexM55,
}

impl CpuModel {
    pub fn profile(self) -> Profile {
        match self {
            CpuModel::Arm926 | CpuModel::Arm1176 | CpuModel::CortexA9 | CpuModel::CortexA15 => Profile::A,
            CpuModel::CortexR5 => Profile::R,
            CpuModel::CortexM3 | CpuModel::CortexM4 | CpuModel::CortexM33 | CpuModel::CortexM55 => Profile::M,
        }
    }

    /// MIDR / CPUID 复位值
    pub fn midr(self) -> u32 {
        match self {
            CpuModel::Arm926 => 0x4106_9265,
            CpuModel::Arm1176 => 0x410f_b767,
            CpuModel::CortexA9 => 0x410f_c090,
            CpuModel::CortexA15 => 0x412f_c0f1,
            CpuModel::CortexR5 => 0x411f_c153,
            CpuModel::CortexM3 => 0x410f_c231,
            CpuModel::CortexM4 => 0x410f_c240,
            CpuModel::CortexM33 => 0x410f_d213,
            CpuModel::CortexM55 => 0x410f_d220,
        }
    }

    pub fn features(self) -> ArmFeatures {
        use ArmFeatures as F;
        let v5te = F::V4T | F::V5 | F::V5TE;
        let v6k = v5te | F::V6 | F::V6K;
        let v7 = v6k | F::V6T2 | F::V7 | F::THUMB2 | F::THUMB_DSP;
        let v7m = F::V4T | F::V5 | F::V6 | F::V6T2 | F::V7 | F::THUMB2 | F::M_PROFILE | F::M_MAIN | F::THUMB_DIV;
        match self {
            CpuModel::Arm926 => v5te,
            CpuModel::Arm1176 => v6k | F::VFP | F::EL3,
            CpuModel::CortexA9 => v7 | F::VFP | F::VFP3 | F::NEON | F::VBAR | F::EL3 | F::PMU | F::V7MP,
            CpuModel::CortexA15 => {
                v7 | F::V7VE | F::VFP | F::VFP3 | F::VFP4 | F::NEON | F::VBAR | F::EL3 | F::PMU | F::ARM_DIV | F::THUMB_DIV | F::V7MP
            }
            CpuModel::CortexR5 => v7 | F::VFP | F::VFP3 | F::PMSA | F::PMU | F::ARM_DIV | F::THUMB_DIV,
            CpuModel::CortexM3 => v7m | F::PMSA,
            CpuModel::CortexM4 => v7m | F::PMSA | F::THUMB_DSP | F::VFP | F::VFP3 | F::VFP4,
            CpuModel::CortexM33 => {
                v7m | F::V8 | F::PMSA | F::THUMB_DSP | F::VFP | F::VFP3 | F::VFP4 | F::M_SECURITY
            }
            CpuModel::CortexM55 => {
                v7m | F::V8 | F::V8_1M | F::PMSA | F::THUMB_DSP | F::VFP | F::VFP3 | F::VFP4 | F::M_SECURITY | F::MVE | F::LOB
            }
        }
    }

    /// 默认 MPU 区域数
    pub fn default_mpu_regions(self) -> u32 {
        match self {
            CpuModel::CortexR5 => 12,
            CpuModel::CortexM3 | CpuModel::CortexM4 | CpuModel::CortexM33 | CpuModel::CortexM55 => 8,
            _ => 0,
        }
    }

    pub fn default_sau_regions(self) -> u32 {
        match self {
            CpuModel::CortexM33 | CpuModel::CortexM55 => 8,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_profiles() {
        assert_eq!(CpuModel::CortexM55.profile(), Profile::M);
        assert!(CpuModel::CortexM55.features().contains(ArmFeatures::MVE | ArmFeatures::LOB));
        assert!(!CpuModel::CortexM3.features().has_fpu());
        assert!(CpuModel::CortexA15.features().contains(ArmFeatures::VFP4));
    }

    #[test]
    fn test_feature_names() {
        assert_eq!(ArmFeatures::from_name("neon"), Some(ArmFeatures::NEON));
        assert_eq!(ArmFeatures::from_name("M_SECURITY"), Some(ArmFeatures::M_SECURITY));
        assert_eq!(ArmFeatures::from_name("sve"), None);
    }
}
