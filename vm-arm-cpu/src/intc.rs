//! 中断控制器查询接口
//!
//! 控制器本身在本 crate 之外实现 (GIC / NVIC)；这里只定义 WFI、WFE 与 SEV
//! 语义需要的查询。

pub trait InterruptController: Send {
    /// 存在待处理且当前未被屏蔽的中断
    fn has_pending(&self) -> bool;

    /// 下一个将被接受的异常号
    fn find_next_pending(&self) -> Option<u32>;

    /// 存在被 PRIMASK/BASEPRI 屏蔽的待处理中断 (SEVONPEND 唤醒 WFE)
    fn pending_masked_irq(&self) -> bool;

    /// 向其他核广播事件
    fn send_event(&mut self) {}
}

/// 没有任何中断源的控制器
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterrupts;

impl InterruptController for NoInterrupts {
    fn has_pending(&self) -> bool {
        false
    }

    fn find_next_pending(&self) -> Option<u32> {
        None
    }

    fn pending_masked_irq(&self) -> bool {
        false
    }
}
