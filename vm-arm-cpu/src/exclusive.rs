//! 全局独占监视器
//!
//! 只跟踪一个保留。检查与清除在同一把锁内完成；锁不跨越宿主 I/O
//! 之外的任何等待。

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use vm_core::{GuestAddr, MemoryAccess, VmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub addr: u64,
    pub size: u8,
    pub value: u64,
}

impl Reservation {
    fn overlaps(&self, addr: u64, size: u8) -> bool {
        addr < self.addr + u64::from(self.size) && self.addr < addr + u64::from(size)
    }
}

#[derive(Debug, Default)]
pub struct ExclusiveMonitor {
    reservation: Mutex<Option<Reservation>>,
}

static GLOBAL_MONITOR: OnceLock<Arc<ExclusiveMonitor>> = OnceLock::new();

impl ExclusiveMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程范围的默认监视器
    pub fn global() -> Arc<ExclusiveMonitor> {
        GLOBAL_MONITOR.get_or_init(|| Arc::new(ExclusiveMonitor::new())).clone()
    }

    pub fn reservation(&self) -> Option<Reservation> {
        *self.reservation.lock()
    }

    /// LDREX：读内存并记录保留
    pub fn load_exclusive(&self, mem: &dyn MemoryAccess, addr: u64, size: u8) -> VmResult<u64> {
        let mut guard = self.reservation.lock();
        let value = mem.read(GuestAddr(addr), size)?;
        *guard = Some(Reservation { addr, size, value });
        Ok(value)
    }

    /// STREX：成功返回 true。无论结果如何保留都被清除
    pub fn store_exclusive(&self, mem: &mut dyn MemoryAccess, addr: u64, size: u8, value: u64) -> VmResult<bool> {
        let mut guard = self.reservation.lock();
        let Some(res) = guard.take() else {
            return Ok(false);
        };
        if res.addr != addr || res.size != size {
            return Ok(false);
        }
        let current = mem.read(GuestAddr(addr), size)?;
        if current != res.value {
            return Ok(false);
        }
        mem.write(GuestAddr(addr), value, size)?;
        Ok(true)
    }

    /// CLREX
    pub fn clear_exclusive(&self) {
        *self.reservation.lock() = None;
    }

    /// 普通存储：写到保留字节上时清除保留
    pub fn snoop_store(&self, addr: u64, size: u8) {
        let mut guard = self.reservation.lock();
        if guard.is_some_and(|r| r.overlaps(addr, size)) {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vm_core::VmError;

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

    #[test]
    fn test_store_after_load_succeeds() {
        let mon = ExclusiveMonitor::new();
        let mut ram = Ram::default();
        ram.write(GuestAddr(0x100), 7, 4).unwrap();
        assert_eq!(mon.load_exclusive(&ram, 0x100, 4).unwrap(), 7);
        assert!(mon.store_exclusive(&mut ram, 0x100, 4, 9).unwrap());
        assert_eq!(ram.read(GuestAddr(0x100), 4).unwrap(), 9);
        // 保留已被消耗
        assert!(!mon.store_exclusive(&mut ram, 0x100, 4, 10).unwrap());
        assert_eq!(ram.read(GuestAddr(0x100), 4).unwrap(), 9);
    }

    #[test]
    fn test_mismatch_fails_and_clears() {
        let mon = ExclusiveMonitor::new();
        let mut ram = Ram::default();
        mon.load_exclusive(&ram, 0x100, 4).unwrap();
        assert!(!mon.store_exclusive(&mut ram, 0x100, 2, 1).unwrap());
        assert!(mon.reservation().is_none());
        mon.load_exclusive(&ram, 0x100, 4).unwrap();
        mon.clear_exclusive();
        assert!(!mon.store_exclusive(&mut ram, 0x100, 4, 1).unwrap());
        assert_eq!(ram.read(GuestAddr(0x100), 4).unwrap(), 0);
    }

    #[test]
    fn test_snooped_store_breaks_reservation() {
        let mon = ExclusiveMonitor::new();
        let mut ram = Ram::default();
        mon.load_exclusive(&ram, 0x100, 4).unwrap();
        mon.snoop_store(0x1fc, 4);
        assert!(mon.reservation().is_some());
        mon.snoop_store(0x103, 1);
        assert!(!mon.store_exclusive(&mut ram, 0x100, 4, 1).unwrap());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&ExclusiveMonitor::global(), &ExclusiveMonitor::global()));
    }
}
