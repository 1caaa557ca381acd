//! 协处理器系统寄存器分发表
//!
//! 描述符在初始化时一次性登记进表，按 `(协处理器, 宽度, 安全状态, CRn,
//! CRm, opc1, opc2)` 建立索引，`freeze()` 之后不可修改并以 `Arc` 共享。
//! 找不到描述符的 cp15 访问走旧式回退 (缓存/TLB 维护与实现定义空间)，
//! 其他协处理器只记录一次日志并按读 0 写忽略处理。

pub mod defs;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use thiserror::Error;
use vm_core::{CoreError, ExecutionError, VmError, VmResult};

use crate::cp15::CpField;
use crate::state::ArmCpu;

bitflags! {
    /// 描述符类型标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CpRegType: u16 {
        /// 访问无任何效果
        const NOP = 1 << 0;
        /// 等待中断
        const WFI = 1 << 1;
        /// 内存屏障
        const BARRIER = 1 << 2;
        /// 读返回复位值，写忽略
        const CONST = 1 << 3;
        /// 读写有外部可见副作用，读也结束翻译块
        const IO = 1 << 4;
        /// 不参与原始值的保存/迁移
        const NO_RAW = 1 << 5;
        /// 读写都结束翻译块
        const FORCE_TB_END = 1 << 6;
        /// 写不结束翻译块
        const SUPPRESS_TB_END = 1 << 7;
    }
}

bitflags! {
    /// 各特权级的读写许可；高特权级继承低特权级的许可
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CpAccess: u8 {
        const PL3_R = 0x80;
        const PL3_W = 0x40;
        const PL2_R = 0x20 | Self::PL3_R.bits();
        const PL2_W = 0x10 | Self::PL3_W.bits();
        const PL1_R = 0x08 | Self::PL2_R.bits();
        const PL1_W = 0x04 | Self::PL2_W.bits();
        const PL0_R = 0x02 | Self::PL1_R.bits();
        const PL0_W = 0x01 | Self::PL1_W.bits();
        const PL3_RW = Self::PL3_R.bits() | Self::PL3_W.bits();
        const PL2_RW = Self::PL2_R.bits() | Self::PL2_W.bits();
        const PL1_RW = Self::PL1_R.bits() | Self::PL1_W.bits();
        const PL0_RW = Self::PL0_R.bits() | Self::PL0_W.bits();
    }
}

impl CpAccess {
    /// `el` 下的读或写是否被允许
    pub fn allows(self, el: u8, is_read: bool) -> bool {
        let bit = u32::from(el) * 2 + u32::from(is_read);
        (self.bits() >> bit) & 1 != 0
    }
}

/// 描述符登记的安全分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpSecurity {
    NonSecure,
    Secure,
    /// 两个安全状态共用
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpRegKey {
    pub cp: u8,
    pub is64: bool,
    /// 只会是 `NonSecure` 或 `Secure`
    pub security: CpSecurity,
    pub crn: u8,
    pub crm: u8,
    pub opc1: u8,
    pub opc2: u8,
}

impl CpRegKey {
    pub fn new(cp: u8, is64: bool, secure: bool, crn: u8, crm: u8, opc1: u8, opc2: u8) -> Self {
        Self {
            cp,
            is64,
            security: if secure { CpSecurity::Secure } else { CpSecurity::NonSecure },
            crn,
            crm,
            opc1,
            opc2,
        }
    }
}

impl fmt::Display for CpRegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sec = if self.security == CpSecurity::Secure { "S" } else { "NS" };
        if self.is64 {
            write!(f, "p{}, {}, c{} (64-bit, {sec})", self.cp, self.opc1, self.crm)
        } else {
            write!(f, "p{}, {}, c{}, c{}, {} ({sec})", self.cp, self.opc1, self.crn, self.crm, self.opc2)
        }
    }
}

/// 访问谓词的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpAccessResult {
    Ok,
    /// 客户机未定义指令异常
    TrapUndefined,
    /// 陷入未实现的更高异常级
    TrapUnsupported,
}

pub type ReadFn = fn(&ArmCpu, &CpRegDesc) -> u64;
pub type WriteFn = fn(&mut ArmCpu, &CpRegDesc, u64);
pub type AccessFn = fn(&ArmCpu, &CpRegDesc, bool) -> CpAccessResult;
pub type ResetFn = fn(&mut ArmCpu, &CpRegDesc);

#[derive(Clone)]
pub struct CpRegDesc {
    pub name: &'static str,
    pub cp: u8,
    pub is64: bool,
    pub security: CpSecurity,
    pub crn: u8,
    pub crm: u8,
    pub opc1: u8,
    pub opc2: u8,
    pub access: CpAccess,
    pub ty: CpRegType,
    pub reset: u64,
    pub field: Option<CpField>,
    pub readfn: Option<ReadFn>,
    pub writefn: Option<WriteFn>,
    pub accessfn: Option<AccessFn>,
    pub resetfn: Option<ResetFn>,
}

impl fmt::Debug for CpRegDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpRegDesc")
            .field("name", &self.name)
            .field("key", &self.key(self.security))
            .field("access", &self.access)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

impl CpRegDesc {
    /// 32 位 MRC/MCR 寄存器
    pub const fn new(name: &'static str, cp: u8, crn: u8, opc1: u8, crm: u8, opc2: u8) -> Self {
        Self {
            name,
            cp,
            is64: false,
            security: CpSecurity::Both,
            crn,
            crm,
            opc1,
            opc2,
            access: CpAccess::PL1_RW,
            ty: CpRegType::empty(),
            reset: 0,
            field: None,
            readfn: None,
            writefn: None,
            accessfn: None,
            resetfn: None,
        }
    }

    /// 64 位 MRRC/MCRR 寄存器
    pub const fn new64(name: &'static str, cp: u8, opc1: u8, crm: u8) -> Self {
        let mut d = Self::new(name, cp, 0, opc1, crm, 0);
        d.is64 = true;
        d
    }

    pub const fn access(mut self, access: CpAccess) -> Self {
        self.access = access;
        self
    }

    pub const fn ty(mut self, ty: CpRegType) -> Self {
        self.ty = ty;
        self
    }

    pub const fn reset(mut self, reset: u64) -> Self {
        self.reset = reset;
        self
    }

    pub const fn field(mut self, field: CpField) -> Self {
        self.field = Some(field);
        self
    }

    pub const fn read(mut self, f: ReadFn) -> Self {
        self.readfn = Some(f);
        self
    }

    pub const fn write(mut self, f: WriteFn) -> Self {
        self.writefn = Some(f);
        self
    }

    pub const fn accessfn(mut self, f: AccessFn) -> Self {
        self.accessfn = Some(f);
        self
    }

    pub const fn resetfn(mut self, f: ResetFn) -> Self {
        self.resetfn = Some(f);
        self
    }

    pub const fn security(mut self, security: CpSecurity) -> Self {
        self.security = security;
        self
    }

    /// 常量寄存器：只读，读返回 `value`
    pub const fn constant(self, value: u64) -> Self {
        self.ty(CpRegType::CONST).reset(value).access(CpAccess::PL1_R)
    }

    pub fn key(&self, security: CpSecurity) -> CpRegKey {
        CpRegKey {
            cp: self.cp,
            is64: self.is64,
            security,
            crn: self.crn,
            crm: self.crm,
            opc1: self.opc1,
            opc2: self.opc2,
        }
    }

    fn keys(&self) -> Vec<CpRegKey> {
        match self.security {
            CpSecurity::Both => vec![self.key(CpSecurity::NonSecure), self.key(CpSecurity::Secure)],
            s => vec![self.key(s)],
        }
    }

    /// 特权级与谓词检查
    pub fn check_access(&self, cpu: &ArmCpu, el: u8, is_read: bool) -> CpAccessResult {
        if !self.access.allows(el, is_read) {
            return CpAccessResult::TrapUndefined;
        }
        match self.accessfn {
            Some(f) => f(cpu, self, is_read),
            None => CpAccessResult::Ok,
        }
    }

    /// 写是否结束翻译块
    pub fn write_ends_block(&self) -> bool {
        !self.ty.contains(CpRegType::SUPPRESS_TB_END)
    }

    /// 读是否结束翻译块
    pub fn read_ends_block(&self) -> bool {
        self.ty.intersects(CpRegType::IO | CpRegType::FORCE_TB_END)
    }

    /// 运行时读取
    pub fn read_value(&self, cpu: &ArmCpu) -> u64 {
        if self.ty.contains(CpRegType::CONST) {
            return self.reset;
        }
        if let Some(f) = self.readfn {
            return f(cpu, self);
        }
        match self.field {
            Some(field) => cpu.cp15.get(field),
            None => 0,
        }
    }

    /// 运行时写入
    pub fn write_value(&self, cpu: &mut ArmCpu, value: u64) {
        if self.ty.intersects(CpRegType::CONST | CpRegType::NOP) {
            return;
        }
        if let Some(f) = self.writefn {
            f(cpu, self, value);
        } else if let Some(field) = self.field {
            cpu.cp15.set(field, value);
        }
    }
}

/// 表构建错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CpRegError {
    #[error("duplicate system register {name} at {key}")]
    Duplicate { name: &'static str, key: CpRegKey },
}

impl From<CpRegError> for VmError {
    fn from(e: CpRegError) -> Self {
        match e {
            CpRegError::Duplicate { name, key } => CoreError::DuplicateRegister {
                key: format!("{name} @ {key}"),
            }
            .into(),
        }
    }
}

/// cp15 中没有描述符时的旧式处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyOp {
    /// 缓存维护等无效果操作
    Nop,
    TlbInvalidate,
    /// 读 0 写忽略 (锁定与实现定义空间)
    RazWi,
}

/// 旧式 cp15 空间分类
pub fn legacy_cp15(key: &CpRegKey) -> Option<LegacyOp> {
    if key.cp != 15 || key.is64 {
        return None;
    }
    match key.crn {
        7 => Some(LegacyOp::Nop),
        8 => Some(LegacyOp::TlbInvalidate),
        9 | 10 | 11 | 15 => Some(LegacyOp::RazWi),
        _ => None,
    }
}

/// 一次访问的解析结果
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Register(&'a CpRegDesc),
    Legacy(LegacyOp),
}

#[derive(Default)]
pub struct CpRegTableBuilder {
    regs: HashMap<CpRegKey, Arc<CpRegDesc>>,
}

impl CpRegTableBuilder {
    pub fn register(&mut self, desc: CpRegDesc) -> Result<(), CpRegError> {
        let keys = desc.keys();
        if let Some(key) = keys.iter().find(|k| self.regs.contains_key(k)) {
            return Err(CpRegError::Duplicate { name: desc.name, key: *key });
        }
        let desc = Arc::new(desc);
        for key in keys {
            self.regs.insert(key, desc.clone());
        }
        Ok(())
    }

    pub fn register_all(&mut self, descs: impl IntoIterator<Item = CpRegDesc>) -> Result<(), CpRegError> {
        for d in descs {
            self.register(d)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn freeze(self) -> Arc<CpRegTable> {
        Arc::new(CpRegTable {
            regs: self.regs,
            logged: Mutex::new(HashSet::new()),
        })
    }
}

pub struct CpRegTable {
    regs: HashMap<CpRegKey, Arc<CpRegDesc>>,
    /// 已经记录过日志的未处理寄存器
    logged: Mutex<HashSet<CpRegKey>>,
}

impl fmt::Debug for CpRegTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpRegTable").field("regs", &self.regs.len()).finish_non_exhaustive()
    }
}

impl CpRegTable {
    pub fn builder() -> CpRegTableBuilder {
        CpRegTableBuilder::default()
    }

    /// 按 CPU 的特性集构建表
    pub fn for_cpu(cpu: &ArmCpu) -> VmResult<Arc<CpRegTable>> {
        let mut b = Self::builder();
        defs::register_model_regs(&mut b, cpu)?;
        log::debug!("system register table for {:?}: {} keys", cpu.model(), b.len());
        Ok(b.freeze())
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn get(&self, key: &CpRegKey) -> VmResult<&CpRegDesc> {
        self.regs.get(key).map(|d| d.as_ref()).ok_or_else(|| {
            CoreError::NotFound {
                what: format!("system register {key}"),
            }
            .into()
        })
    }

    pub fn lookup(&self, cp: u8, is64: bool, secure: bool, crn: u8, crm: u8, opc1: u8, opc2: u8) -> VmResult<&CpRegDesc> {
        self.get(&CpRegKey::new(cp, is64, secure, crn, crm, opc1, opc2))
    }

    /// 解析一次协处理器访问
    ///
    /// 既没有描述符也不属于旧式 cp15 空间时返回 `UnhandledRegister`，
    /// 每个键只记录一次日志。
    pub fn resolve(&self, key: &CpRegKey) -> VmResult<Resolution<'_>> {
        if let Some(d) = self.regs.get(key) {
            return Ok(Resolution::Register(d));
        }
        if let Some(op) = legacy_cp15(key) {
            return Ok(Resolution::Legacy(op));
        }
        if self.logged.lock().insert(*key) {
            log::warn!("unhandled system register {key}");
        }
        Err(ExecutionError::UnhandledRegister { key: key.to_string() }.into())
    }

    /// 把所有寄存器恢复到复位值
    pub fn reset_all(&self, cpu: &mut ArmCpu) {
        let mut seen = HashSet::new();
        for d in self.regs.values() {
            if !seen.insert(Arc::as_ptr(d)) {
                continue;
            }
            if let Some(f) = d.resetfn {
                f(cpu, d);
            } else if let Some(field) = d.field {
                cpu.cp15.set(field, d.reset);
            }
        }
    }
}
