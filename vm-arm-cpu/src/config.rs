//! CPU 型号配置
//!
//! 从 TOML/JSON 加载，校验后用 [`ArmCpu::from_config`] 构造核心。

use serde::{Deserialize, Serialize};
use vm_core::config::{Config, ConfigError};
use vm_core::VmResult;

use crate::features::{ArmFeatures, CpuModel, Profile};
use crate::mpu::MAX_REGIONS;
use crate::state::ArmCpu;

/// 单个翻译块的最大指令数上限
pub const MAX_INSNS_LIMIT: u32 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationOptions {
    /// 每块最多翻译的指令数
    pub max_insns: u32,
    /// 翻译块不跨越的页大小
    pub page_size: u64,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            max_insns: MAX_INSNS_LIMIT,
            page_size: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmCpuConfig {
    pub model: CpuModel,
    /// 可选的档案声明，必须与型号一致
    pub profile: Option<Profile>,
    /// 在型号默认特性之上追加的特性名
    pub extra_features: Vec<String>,
    /// 从型号默认特性中去掉的特性名
    pub disabled_features: Vec<String>,
    pub model_id: Option<u32>,
    pub mpu_regions: Option<u32>,
    pub sau_regions: Option<u32>,
    /// 复位后打开 FPU 访问
    pub fpu_enabled: bool,
    pub vector_base: u32,
    pub translation: TranslationOptions,
}

impl Default for ArmCpuConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

fn parse_features(names: &[String]) -> Result<ArmFeatures, ConfigError> {
    names.iter().try_fold(ArmFeatures::empty(), |acc, name| {
        ArmFeatures::from_name(name)
            .map(|f| acc | f)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown feature `{name}`")))
    })
}

impl ArmCpuConfig {
    pub fn for_model(model: CpuModel) -> Self {
        Self {
            model,
            ..Self::defaults()
        }
    }

    /// 型号默认特性加上增删项
    pub fn features(&self) -> Result<ArmFeatures, ConfigError> {
        let extra = parse_features(&self.extra_features)?;
        let disabled = parse_features(&self.disabled_features)?;
        Ok((self.model.features() | extra) & !disabled)
    }
}

impl Config for ArmCpuConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let features = self.features()?;
        if let Some(p) = self.profile {
            if p != self.model.profile() {
                return Err(ConfigError::Invalid(format!(
                    "profile {p:?} does not match model {:?}",
                    self.model
                )));
            }
        }
        if features.is_m_profile() != (self.model.profile() == Profile::M) {
            return Err(ConfigError::Invalid("M_PROFILE feature cannot be toggled".to_string()));
        }
        for (name, count) in [("mpu_regions", self.mpu_regions), ("sau_regions", self.sau_regions)] {
            if count.is_some_and(|n| n > MAX_REGIONS) {
                return Err(ConfigError::Invalid(format!("{name} exceeds {MAX_REGIONS}")));
            }
        }
        if self.fpu_enabled && !features.has_fpu() {
            return Err(ConfigError::Invalid(format!("{:?} has no FPU", self.model)));
        }
        let t = &self.translation;
        if t.max_insns == 0 || t.max_insns > MAX_INSNS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "translation.max_insns must be in 1..={MAX_INSNS_LIMIT}"
            )));
        }
        if !t.page_size.is_power_of_two() || t.page_size < 1024 {
            return Err(ConfigError::Invalid(
                "translation.page_size must be a power of two >= 1024".to_string(),
            ));
        }
        Ok(())
    }

    fn defaults() -> Self {
        Self {
            model: CpuModel::CortexA9,
            profile: None,
            extra_features: Vec::new(),
            disabled_features: Vec::new(),
            model_id: None,
            mpu_regions: None,
            sau_regions: None,
            fpu_enabled: false,
            vector_base: 0,
            translation: TranslationOptions::default(),
        }
    }

    fn merge(&self, other: &Self) -> Result<Self, ConfigError> {
        if self.model != other.model {
            return Err(ConfigError::MergeConflict(format!(
                "model {:?} vs {:?}",
                self.model, other.model
            )));
        }
        let mut merged = other.clone();
        merged.profile = other.profile.or(self.profile);
        merged.model_id = other.model_id.or(self.model_id);
        merged.mpu_regions = other.mpu_regions.or(self.mpu_regions);
        merged.sau_regions = other.sau_regions.or(self.sau_regions);
        merged.extra_features = self.extra_features.clone();
        merged.extra_features.extend(other.extra_features.iter().cloned());
        merged.disabled_features = self.disabled_features.clone();
        merged.disabled_features.extend(other.disabled_features.iter().cloned());
        Ok(merged)
    }
}

impl ArmCpu {
    /// 按配置构造并复位一个核心
    pub fn from_config(config: &ArmCpuConfig) -> VmResult<ArmCpu> {
        config.validate()?;
        let mut cpu = ArmCpu::with_features(config.model, config.features()?)?;
        if let Some(id) = config.model_id {
            cpu.set_model_id(id)?;
        }
        if let Some(n) = config.mpu_regions {
            cpu.configure_mpu_regions(n)?;
        }
        if let Some(n) = config.sau_regions {
            cpu.configure_sau_regions(n)?;
        }
        cpu.set_vector_base(config.vector_base)?;
        cpu.reset();
        if config.fpu_enabled {
            cpu.set_fpu_enabled(true)?;
        }
        log::debug!("created {:?} with features {:?}", config.model, cpu.features());
        Ok(cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_core::VmError;

    #[test]
    fn test_parse_toml() {
        let cfg = ArmCpuConfig::from_toml(
            r#"
model = "cortex-m55"
mpu_regions = 16
fpu_enabled = true
vector_base = 0x10000000

[translation]
max_insns = 64
"#,
        )
        .unwrap();
        assert_eq!(cfg.model, CpuModel::CortexM55);
        assert_eq!(cfg.translation.max_insns, 64);
        assert_eq!(cfg.translation.page_size, 4096);

        let cpu = ArmCpu::from_config(&cfg).unwrap();
        assert_eq!(cpu.mpu.num_regions(), 16);
        assert!(cpu.vfp_enabled());
        assert_eq!(cpu.v7m.vtor[cpu.security().index()], 0x1000_0000);
    }

    #[test]
    fn test_validation_errors() {
        let mut cfg = ArmCpuConfig::for_model(CpuModel::CortexM3);
        cfg.mpu_regions = Some(257);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = ArmCpuConfig::for_model(CpuModel::CortexM3);
        cfg.fpu_enabled = true;
        assert!(cfg.validate().is_err());

        let mut cfg = ArmCpuConfig::for_model(CpuModel::CortexA9);
        cfg.extra_features = vec!["warp_drive".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = ArmCpuConfig::for_model(CpuModel::CortexA9);
        cfg.profile = Some(Profile::M);
        assert!(cfg.validate().is_err());

        let mut cfg = ArmCpuConfig::for_model(CpuModel::CortexA9);
        cfg.translation.max_insns = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_feature_overrides() {
        let mut cfg = ArmCpuConfig::for_model(CpuModel::CortexA9);
        cfg.disabled_features = vec!["neon".to_string()];
        cfg.extra_features = vec!["arm_div".to_string()];
        let f = cfg.features().unwrap();
        assert!(!f.contains(ArmFeatures::NEON));
        assert!(f.contains(ArmFeatures::ARM_DIV));
    }

    #[test]
    fn test_from_config_rejects_bad_vector_base() {
        let mut cfg = ArmCpuConfig::for_model(CpuModel::CortexA9);
        cfg.vector_base = 0x1004;
        let err = ArmCpu::from_config(&cfg).unwrap_err();
        assert!(matches!(err, VmError::Core(vm_core::CoreError::Config { .. })));
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = ArmCpuConfig::for_model(CpuModel::CortexR5);
        let mut over = ArmCpuConfig::for_model(CpuModel::CortexR5);
        over.mpu_regions = Some(16);
        let m = base.merge(&over).unwrap();
        assert_eq!(m.mpu_regions, Some(16));
        assert!(base.merge(&ArmCpuConfig::for_model(CpuModel::CortexA9)).is_err());
    }
}
