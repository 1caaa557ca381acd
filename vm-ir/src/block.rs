use vm_core::GuestAddr;

/// 块出口策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitKind {
    /// 回到调度循环，目标固定
    FixedTarget,
    /// 运行时查找目标块
    IndirectLookup,
    /// 直接链接到后继块
    DirectChain,
    /// 以客户机异常结束
    Exception,
}

/// 翻译块描述符
///
/// 解码器在块结束时写入大小、指令数和出口策略；缓存由后端管理。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationBlock {
    pub pc: GuestAddr,
    /// 翻译时依赖的 CPU 状态摘要
    pub flags: u64,
    /// 字节数
    pub size: u32,
    pub icount: u32,
    pub exit: ExitKind,
}

impl TranslationBlock {
    pub fn new(pc: GuestAddr, flags: u64) -> Self {
        Self {
            pc,
            flags,
            size: 0,
            icount: 0,
            exit: ExitKind::FixedTarget,
        }
    }

    pub fn end_pc(&self) -> GuestAddr {
        self.pc.wrapping_add(u64::from(self.size))
    }

    pub fn contains(&self, addr: GuestAddr) -> bool {
        addr >= self.pc && addr < self.end_pc()
    }
}
