//! 内存保护求值 (PMSAv7 / PMSAv8 / SAU)
//!
//! 区域寄存器通过区域号寄存器 (RNR) 选择访问。任何区域控制寄存器的写入
//! 都会清空判定缓存并推进代数，外部的地址翻译缓存据此整体失效。

use std::collections::HashMap;
use std::sync::Arc;

use crate::psr::SecurityState;
use vm_core::{AccessType, VmError, VmResult};

/// 每类区域的上限
pub const MAX_REGIONS: u32 = 256;

/// 判定缓存的最大项数
pub const CACHE_LIMIT: usize = 1024;

/// MPU_CTRL / SCTLR 的相关位
pub const MPU_CTRL_ENABLE: u32 = 1 << 0;
pub const MPU_CTRL_HFNMIENA: u32 = 1 << 1;
pub const MPU_CTRL_PRIVDEFENA: u32 = 1 << 2;

pub const SAU_CTRL_ENABLE: u32 = 1 << 0;
pub const SAU_CTRL_ALLNS: u32 = 1 << 1;
pub const SAU_RLAR_ENABLE: u32 = 1 << 0;
pub const SAU_RLAR_NSC: u32 = 1 << 1;

/// 访问判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessResult {
    Permitted,
    /// 未命中任何区域且背景区域不允许
    BackgroundFault,
    PermissionFault,
    /// 安全属性不允许当前安全状态访问
    SecurityFault,
}

/// 安全属性，按安全程度递增排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityAttr {
    NonSecure,
    SecureNsc,
    Secure,
}

/// IDAU 查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdauResponse {
    /// 实现定义的豁免区域，不做安全检查
    pub exempt: bool,
    /// `None` 表示 IDAU 对该地址不给出属性
    pub attr: Option<SecurityAttr>,
}

/// 实现定义属性单元
pub trait Idau: Send + Sync {
    fn lookup(&self, addr: u32) -> IdauResponse;
}

/// 背景区域策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BackgroundPolicy {
    /// PRIVDEFENA / SCTLR.BR
    pub enabled: bool,
    /// 背景区域本身允许非特权访问
    pub user_accessible: bool,
}

/// 一次求值需要的 CPU 上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessContext {
    pub security: SecurityState,
    pub privileged: bool,
    pub m_profile: bool,
    /// 使用 base/limit 格式 (PMSAv8)
    pub pmsav8: bool,
    /// 实现了安全扩展
    pub security_ext: bool,
    pub mpu_enabled: bool,
    pub background: BackgroundPolicy,
}

/// 通过 RNR 访问的区域寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionReg {
    Drbar,
    Drsr,
    Dracr,
    Rbar,
    Rlar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SauReg {
    Ctrl,
    Rnr,
    Rbar,
    Rlar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    granule: u32,
    kind: AccessType,
    privileged: bool,
    security: SecurityState,
    mpu_enabled: bool,
    background: BackgroundPolicy,
}

#[derive(Clone, Default)]
pub struct MpuState {
    num_regions: u32,
    num_sau_regions: u32,
    rnr: [u32; 2],
    sau_rnr: u32,
    drbar: Vec<u32>,
    drsr: Vec<u32>,
    dracr: Vec<u32>,
    rbar: [Vec<u32>; 2],
    rlar: [Vec<u32>; 2],
    pub mair0: [u32; 2],
    pub mair1: [u32; 2],
    /// M-profile MPU_CTRL，按安全状态分组
    ctrl: [u32; 2],
    sau_rbar: Vec<u32>,
    sau_rlar: Vec<u32>,
    sau_ctrl: u32,
    /// 背景区域是否允许非特权访问，由宿主配置
    pub background_user_accessible: bool,
    generation: u64,
    cache: HashMap<CacheKey, AccessResult>,
    idau: Option<Arc<dyn Idau>>,
}

impl std::fmt::Debug for MpuState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpuState")
            .field("num_regions", &self.num_regions)
            .field("num_sau_regions", &self.num_sau_regions)
            .field("rnr", &self.rnr)
            .field("ctrl", &self.ctrl)
            .field("sau_ctrl", &self.sau_ctrl)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

fn check_count(count: u32, what: &str) -> VmResult<()> {
    if count > MAX_REGIONS {
        return Err(VmError::config(
            what,
            format!("{count} regions requested, at most {MAX_REGIONS} supported"),
        ));
    }
    Ok(())
}

/// 系统地址空间 (0xE0000000 起) 永远不可执行
fn m_system_space(addr: u32) -> bool {
    addr >= 0xe000_0000
}

/// 私有外设总线
fn m_ppb(addr: u32) -> bool {
    (0xe000_0000..=0xe00f_ffff).contains(&addr)
}

/// 安全属性检查豁免的地址范围
fn sau_exempt(addr: u32) -> bool {
    matches!(addr,
        0xe000_0000..=0xe000_2fff
        | 0xe000_e000..=0xe000_efff
        | 0xe002_e000..=0xe002_efff
        | 0xe004_0000..=0xe004_1fff
        | 0xe00f_f000..=0xe00f_ffff)
}

/// (读, 写) 权限
fn pmsav7_ap(ap: u32, privileged: bool) -> (bool, bool) {
    match (ap, privileged) {
        (0b001, true) | (0b010, true) | (0b011, _) => (true, true),
        (0b010, false) => (true, false),
        (0b101, true) | (0b110, _) | (0b111, _) => (true, false),
        _ => (false, false),
    }
}

fn pmsav8_ap(ap: u32, privileged: bool) -> (bool, bool) {
    match (ap, privileged) {
        (0b00, true) | (0b01, _) => (true, true),
        (0b10, true) | (0b11, _) => (true, false),
        _ => (false, false),
    }
}

fn check_perms((read, write): (bool, bool), xn: bool, kind: AccessType) -> AccessResult {
    let ok = match kind {
        AccessType::Read => read,
        AccessType::Write | AccessType::Atomic => write,
        AccessType::Execute => read && !xn,
    };
    if ok { AccessResult::Permitted } else { AccessResult::PermissionFault }
}

impl MpuState {
    pub fn new(num_regions: u32, num_sau_regions: u32) -> VmResult<Self> {
        let mut state = Self::default();
        state.resize(num_regions)?;
        state.resize_sau(num_sau_regions)?;
        Ok(state)
    }

    pub fn num_regions(&self) -> u32 {
        self.num_regions
    }

    pub fn num_sau_regions(&self) -> u32 {
        self.num_sau_regions
    }

    /// 重新配置 MPU 区域数，已有区域内容清零
    pub fn resize(&mut self, count: u32) -> VmResult<()> {
        check_count(count, "mpu.regions")?;
        let n = count as usize;
        self.num_regions = count;
        self.drbar = vec![0; n];
        self.drsr = vec![0; n];
        self.dracr = vec![0; n];
        self.rbar = [vec![0; n], vec![0; n]];
        self.rlar = [vec![0; n], vec![0; n]];
        self.rnr = [0; 2];
        self.invalidate();
        Ok(())
    }

    pub fn resize_sau(&mut self, count: u32) -> VmResult<()> {
        check_count(count, "sau.regions")?;
        self.num_sau_regions = count;
        self.sau_rbar = vec![0; count as usize];
        self.sau_rlar = vec![0; count as usize];
        self.sau_rnr = 0;
        self.invalidate();
        Ok(())
    }

    pub fn set_idau(&mut self, idau: Option<Arc<dyn Idau>>) {
        self.idau = idau;
        self.invalidate();
    }

    /// 丢弃所有缓存的判定
    pub fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.cache.clear();
    }

    /// 每次区域控制写入后递增
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rnr(&self, sec: SecurityState) -> u32 {
        self.rnr[sec.index()]
    }

    /// 写区域号寄存器；越界值按客户机错误忽略
    pub fn set_rnr(&mut self, sec: SecurityState, n: u32) {
        if n >= self.num_regions {
            log::warn!("MPU region number {n} out of range ({} regions)", self.num_regions);
            return;
        }
        self.rnr[sec.index()] = n;
    }

    pub fn ctrl(&self, sec: SecurityState) -> u32 {
        self.ctrl[sec.index()]
    }

    pub fn set_ctrl(&mut self, sec: SecurityState, v: u32) {
        self.ctrl[sec.index()] = v & (MPU_CTRL_ENABLE | MPU_CTRL_HFNMIENA | MPU_CTRL_PRIVDEFENA);
        self.invalidate();
    }

    pub fn read_region(&self, sec: SecurityState, reg: RegionReg) -> u32 {
        let n = self.rnr[sec.index()] as usize;
        if n >= self.num_regions as usize {
            return 0;
        }
        match reg {
            RegionReg::Drbar => self.drbar[n],
            RegionReg::Drsr => self.drsr[n],
            RegionReg::Dracr => self.dracr[n],
            RegionReg::Rbar => self.rbar[sec.index()][n],
            RegionReg::Rlar => self.rlar[sec.index()][n],
        }
    }

    pub fn write_region(&mut self, sec: SecurityState, reg: RegionReg, value: u32) {
        let n = self.rnr[sec.index()] as usize;
        if n >= self.num_regions as usize {
            log::warn!("MPU region write with no regions configured");
            return;
        }
        match reg {
            RegionReg::Drbar => self.drbar[n] = value,
            RegionReg::Drsr => self.drsr[n] = value,
            RegionReg::Dracr => self.dracr[n] = value,
            RegionReg::Rbar => self.rbar[sec.index()][n] = value,
            RegionReg::Rlar => self.rlar[sec.index()][n] = value,
        }
        self.invalidate();
    }

    /// 直接设置一个 PMSAv7 区域 (宿主与测试使用)
    pub fn set_pmsav7_region(&mut self, n: u32, base: u32, drsr: u32, dracr: u32) -> VmResult<()> {
        if n >= self.num_regions {
            return Err(VmError::config("mpu.region", format!("region {n} out of range")));
        }
        let i = n as usize;
        self.drbar[i] = base;
        self.drsr[i] = drsr;
        self.dracr[i] = dracr;
        self.invalidate();
        Ok(())
    }

    pub fn set_pmsav8_region(&mut self, sec: SecurityState, n: u32, rbar: u32, rlar: u32) -> VmResult<()> {
        if n >= self.num_regions {
            return Err(VmError::config("mpu.region", format!("region {n} out of range")));
        }
        self.rbar[sec.index()][n as usize] = rbar;
        self.rlar[sec.index()][n as usize] = rlar;
        self.invalidate();
        Ok(())
    }

    pub fn read_sau(&self, reg: SauReg) -> u32 {
        let n = self.sau_rnr as usize;
        match reg {
            SauReg::Ctrl => self.sau_ctrl,
            SauReg::Rnr => self.sau_rnr,
            SauReg::Rbar => self.sau_rbar.get(n).copied().unwrap_or(0),
            SauReg::Rlar => self.sau_rlar.get(n).copied().unwrap_or(0),
        }
    }

    pub fn write_sau(&mut self, reg: SauReg, value: u32) {
        let n = self.sau_rnr as usize;
        match reg {
            SauReg::Ctrl => self.sau_ctrl = value & (SAU_CTRL_ENABLE | SAU_CTRL_ALLNS),
            SauReg::Rnr => {
                if value >= self.num_sau_regions {
                    log::warn!("SAU region number {value} out of range");
                    return;
                }
                self.sau_rnr = value;
            }
            SauReg::Rbar => match self.sau_rbar.get_mut(n) {
                Some(slot) => *slot = value & !0x1f,
                None => return,
            },
            SauReg::Rlar => match self.sau_rlar.get_mut(n) {
                Some(slot) => *slot = value & !0x1c,
                None => return,
            },
        }
        self.invalidate();
    }

    /// 地址的安全属性：SAU、IDAU 与默认属性中最安全者
    ///
    /// 第二个返回值为真表示地址豁免安全检查。
    pub fn security_attribution(&self, addr: u32, ctx: &AccessContext) -> (SecurityAttr, bool) {
        let current = if ctx.security.is_secure() { SecurityAttr::Secure } else { SecurityAttr::NonSecure };
        if !ctx.security_ext {
            return (current, true);
        }
        if sau_exempt(addr) {
            return (current, true);
        }
        let idau = self.idau.as_ref().map(|i| i.lookup(addr)).unwrap_or_default();
        if idau.exempt {
            return (current, true);
        }

        let sau_attr = if self.sau_ctrl & SAU_CTRL_ENABLE == 0 {
            if self.sau_ctrl & SAU_CTRL_ALLNS != 0 { SecurityAttr::NonSecure } else { SecurityAttr::Secure }
        } else {
            let mut hit = None;
            let mut multiple = false;
            for n in 0..self.num_sau_regions as usize {
                let rlar = self.sau_rlar[n];
                if rlar & SAU_RLAR_ENABLE == 0 {
                    continue;
                }
                let base = self.sau_rbar[n] & !0x1f;
                let limit = rlar | 0x1f;
                if (base..=limit).contains(&addr) {
                    multiple |= hit.is_some();
                    hit = Some(if rlar & SAU_RLAR_NSC != 0 { SecurityAttr::SecureNsc } else { SecurityAttr::NonSecure });
                }
            }
            match hit {
                Some(attr) if !multiple => attr,
                _ => SecurityAttr::Secure,
            }
        };
        let idau_attr = idau.attr.unwrap_or(SecurityAttr::NonSecure);
        (sau_attr.max(idau_attr), false)
    }

    /// 访问判定，结果按 32 字节粒度缓存
    ///
    /// 没有 MPU 也没有安全扩展时判定只剩几次比较，不进缓存。缓存满
    /// [`CACHE_LIMIT`] 项后整体清空。
    pub fn evaluate_access(&mut self, addr: u32, kind: AccessType, ctx: &AccessContext) -> AccessResult {
        if !ctx.mpu_enabled && !ctx.security_ext {
            return self.evaluate_uncached(addr, kind, ctx);
        }
        let key = CacheKey {
            granule: addr & !0x1f,
            kind,
            privileged: ctx.privileged,
            security: ctx.security,
            mpu_enabled: ctx.mpu_enabled,
            background: ctx.background,
        };
        if let Some(result) = self.cache.get(&key) {
            return *result;
        }
        let result = self.evaluate_uncached(addr, kind, ctx);
        if self.cache.len() >= CACHE_LIMIT {
            self.cache.clear();
        }
        self.cache.insert(key, result);
        result
    }

    fn evaluate_uncached(&self, addr: u32, kind: AccessType, ctx: &AccessContext) -> AccessResult {
        if ctx.security_ext {
            let (attr, exempt) = self.security_attribution(addr, ctx);
            if !exempt {
                let denied = match ctx.security {
                    SecurityState::NonSecure => attr != SecurityAttr::NonSecure,
                    SecurityState::Secure => kind == AccessType::Execute && attr == SecurityAttr::NonSecure,
                };
                if denied {
                    return AccessResult::SecurityFault;
                }
            }
        }

        if ctx.m_profile {
            if kind == AccessType::Execute && m_system_space(addr) {
                return AccessResult::PermissionFault;
            }
            if m_ppb(addr) {
                return if ctx.privileged { AccessResult::Permitted } else { AccessResult::PermissionFault };
            }
        }

        if !ctx.mpu_enabled {
            return AccessResult::Permitted;
        }

        let hit = if ctx.pmsav8 {
            self.pmsav8_lookup(addr, ctx.security)
        } else {
            self.pmsav7_lookup(addr).map(Ok)
        };
        match hit {
            None => {
                let bg = ctx.background;
                let allowed = bg.enabled && (ctx.privileged || bg.user_accessible || self.background_user_accessible);
                if allowed { AccessResult::Permitted } else { AccessResult::BackgroundFault }
            }
            Some(Err(())) => AccessResult::PermissionFault,
            Some(Ok(n)) => {
                let n = n as usize;
                if ctx.pmsav8 {
                    let rbar = self.rbar[ctx.security.index()][n];
                    check_perms(pmsav8_ap((rbar >> 1) & 3, ctx.privileged), rbar & 1 != 0, kind)
                } else {
                    let dracr = self.dracr[n];
                    check_perms(pmsav7_ap((dracr >> 8) & 7, ctx.privileged), dracr & (1 << 12) != 0, kind)
                }
            }
        }
    }

    /// 最高编号的匹配区域胜出
    pub fn pmsav7_lookup(&self, addr: u32) -> Option<u32> {
        for n in (0..self.num_regions as usize).rev() {
            let drsr = self.drsr[n];
            if drsr & 1 == 0 {
                continue;
            }
            let size_field = (drsr >> 1) & 0x1f;
            if size_field < 4 {
                log::warn!("DRSR[{n}]: region size field {size_field} is too small");
                continue;
            }
            let rsize = size_field + 1;
            let rmask = (1u64 << rsize) - 1;
            let base = u64::from(self.drbar[n]);
            if base & rmask != 0 {
                log::warn!("DRBAR[{n}] {base:#x} misaligned for size 2^{rsize}");
                continue;
            }
            let a = u64::from(addr);
            if a < base || a > base + rmask {
                continue;
            }
            if rsize >= 8 {
                let subregion = ((a - base) >> (rsize - 3)) & 7;
                if (drsr >> (8 + subregion)) & 1 != 0 {
                    continue;
                }
            }
            return Some(n as u32);
        }
        None
    }

    /// 唯一匹配的区域；多重命中返回 `Err`
    pub fn pmsav8_lookup(&self, addr: u32, sec: SecurityState) -> Option<Result<u32, ()>> {
        let mut hit = None;
        for n in 0..self.num_regions as usize {
            let rlar = self.rlar[sec.index()][n];
            if rlar & 1 == 0 {
                continue;
            }
            let base = self.rbar[sec.index()][n] & !0x1f;
            let limit = rlar | 0x1f;
            if (base..=limit).contains(&addr) {
                if hit.is_some() {
                    return Some(Err(()));
                }
                hit = Some(n as u32);
            }
        }
        hit.map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(privileged: bool) -> AccessContext {
        AccessContext {
            security: SecurityState::NonSecure,
            privileged,
            m_profile: false,
            pmsav8: false,
            security_ext: false,
            mpu_enabled: true,
            background: BackgroundPolicy {
                enabled: true,
                user_accessible: false,
            },
        }
    }

    /// DRSR for an enabled region of 2^(field+1) bytes
    fn drsr(size_field: u32) -> u32 {
        (size_field << 1) | 1
    }

    #[test]
    fn test_highest_region_wins() {
        let mut mpu = MpuState::new(4, 0).unwrap();
        // region 0: 4GB RW/RW, region 2: 4KB no access, overlapping
        mpu.set_pmsav7_region(0, 0, drsr(31), 0b011 << 8).unwrap();
        mpu.set_pmsav7_region(2, 0x2000_0000, drsr(11), 0).unwrap();
        assert_eq!(mpu.pmsav7_lookup(0x2000_0010), Some(2));
        assert_eq!(mpu.evaluate_access(0x2000_0010, AccessType::Read, &ctx(true)), AccessResult::PermissionFault);
        assert_eq!(mpu.evaluate_access(0x3000_0000, AccessType::Read, &ctx(false)), AccessResult::Permitted);
    }

    #[test]
    fn test_subregion_disable_falls_through() {
        let mut mpu = MpuState::new(2, 0).unwrap();
        mpu.set_pmsav7_region(0, 0, drsr(31), 0b011 << 8).unwrap();
        // 256 byte region at 0x1000, subregion 1 (0x1020..0x103f) disabled
        mpu.set_pmsav7_region(1, 0x1000, drsr(7) | (1 << 9), 0b101 << 8).unwrap();
        assert_eq!(mpu.pmsav7_lookup(0x1000), Some(1));
        assert_eq!(mpu.pmsav7_lookup(0x1024), Some(0));
    }

    #[test]
    fn test_background_policy() {
        let mut mpu = MpuState::new(1, 0).unwrap();
        assert_eq!(mpu.evaluate_access(0x100, AccessType::Read, &ctx(true)), AccessResult::Permitted);
        assert_eq!(mpu.evaluate_access(0x100, AccessType::Read, &ctx(false)), AccessResult::BackgroundFault);
        let mut user_bg = ctx(false);
        user_bg.background.user_accessible = true;
        assert_eq!(mpu.evaluate_access(0x100, AccessType::Read, &user_bg), AccessResult::Permitted);
        let mut off = ctx(true);
        off.background.enabled = false;
        assert_eq!(mpu.evaluate_access(0x100, AccessType::Read, &off), AccessResult::BackgroundFault);
    }

    #[test]
    fn test_execute_never() {
        let mut mpu = MpuState::new(1, 0).unwrap();
        mpu.set_pmsav7_region(0, 0, drsr(31), (0b011 << 8) | (1 << 12)).unwrap();
        assert_eq!(mpu.evaluate_access(0x400, AccessType::Execute, &ctx(true)), AccessResult::PermissionFault);
        assert_eq!(mpu.evaluate_access(0x400, AccessType::Write, &ctx(false)), AccessResult::Permitted);
    }

    #[test]
    fn test_cache_stays_bounded() {
        let mut mpu = MpuState::new(1, 0).unwrap();
        let c = ctx(true);
        for granule in 0..(CACHE_LIMIT as u32 * 3) {
            assert_eq!(mpu.evaluate_access(granule << 5, AccessType::Read, &c), AccessResult::Permitted);
        }
        assert!(mpu.cache.len() <= CACHE_LIMIT);

        // MPU 关闭且无安全扩展：不缓存
        mpu.invalidate();
        let mut off = ctx(true);
        off.mpu_enabled = false;
        for granule in 0..64u32 {
            mpu.evaluate_access(granule << 5, AccessType::Write, &off);
        }
        assert!(mpu.cache.is_empty());
    }

    #[test]
    fn test_write_invalidates_cache() {
        let mut mpu = MpuState::new(1, 0).unwrap();
        let c = ctx(false);
        assert_eq!(mpu.evaluate_access(0x100, AccessType::Read, &c), AccessResult::BackgroundFault);
        let generation = mpu.generation();
        mpu.set_rnr(SecurityState::NonSecure, 0);
        mpu.write_region(SecurityState::NonSecure, RegionReg::Drbar, 0);
        mpu.write_region(SecurityState::NonSecure, RegionReg::Drsr, drsr(31));
        mpu.write_region(SecurityState::NonSecure, RegionReg::Dracr, 0b110 << 8);
        assert!(mpu.generation() > generation);
        assert_eq!(mpu.evaluate_access(0x100, AccessType::Read, &c), AccessResult::Permitted);
        assert_eq!(mpu.evaluate_access(0x100, AccessType::Write, &c), AccessResult::PermissionFault);
    }

    #[test]
    fn test_pmsav8_overlap_faults() {
        let mut mpu = MpuState::new(2, 0).unwrap();
        let ns = SecurityState::NonSecure;
        mpu.set_pmsav8_region(ns, 0, 0x2000_0000 | (0b01 << 1), 0x2000_ffe0 | 1).unwrap();
        mpu.set_pmsav8_region(ns, 1, 0x2000_8000 | (0b01 << 1), 0x2001_ffe0 | 1).unwrap();
        let mut c = ctx(false);
        c.pmsav8 = true;
        assert_eq!(mpu.evaluate_access(0x2000_0100, AccessType::Write, &c), AccessResult::Permitted);
        assert_eq!(mpu.evaluate_access(0x2000_9000, AccessType::Read, &c), AccessResult::PermissionFault);
        assert_eq!(mpu.pmsav8_lookup(0x2001_0000, ns), Some(Ok(1)));
    }

    #[test]
    fn test_region_count_limit() {
        assert!(MpuState::new(256, 256).is_ok());
        let err = MpuState::new(257, 0).unwrap_err();
        assert!(err.is_fatal());
    }

    struct SecureRom;

    impl Idau for SecureRom {
        fn lookup(&self, addr: u32) -> IdauResponse {
            IdauResponse {
                exempt: false,
                attr: (addr < 0x1000_0000).then_some(SecurityAttr::Secure),
            }
        }
    }

    #[test]
    fn test_sau_most_secure_wins() {
        let mut mpu = MpuState::new(0, 2).unwrap();
        mpu.write_sau(SauReg::Rnr, 0);
        mpu.write_sau(SauReg::Rbar, 0);
        mpu.write_sau(SauReg::Rlar, 0x3fff_ffe0 | SAU_RLAR_ENABLE);
        mpu.write_sau(SauReg::Rnr, 1);
        mpu.write_sau(SauReg::Rbar, 0x2000_0000);
        mpu.write_sau(SauReg::Rlar, 0x2000_0fe0 | SAU_RLAR_ENABLE | SAU_RLAR_NSC);
        mpu.write_sau(SauReg::Ctrl, SAU_CTRL_ENABLE);
        mpu.set_idau(Some(Arc::new(SecureRom)));

        let mut c = ctx(true);
        c.security_ext = true;
        c.mpu_enabled = false;
        // SAU says NS, IDAU says Secure
        assert_eq!(mpu.security_attribution(0x0800_0000, &c).0, SecurityAttr::Secure);
        assert_eq!(mpu.security_attribution(0x1800_0000, &c).0, SecurityAttr::NonSecure);
        // overlapping SAU regions are Secure
        assert_eq!(mpu.security_attribution(0x2000_0100, &c).0, SecurityAttr::Secure);
        assert_eq!(mpu.security_attribution(0x4000_0000, &c).0, SecurityAttr::Secure);
        assert_eq!(mpu.evaluate_access(0x0800_0000, AccessType::Read, &c), AccessResult::SecurityFault);
        assert_eq!(mpu.evaluate_access(0x1800_0000, AccessType::Read, &c), AccessResult::Permitted);
        // exempt system space
        assert_eq!(mpu.evaluate_access(0xe000_e010, AccessType::Read, &c), AccessResult::Permitted);
    }
}
